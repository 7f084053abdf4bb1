//! Declaration AST nodes.

use crate::{Block, Expr, Ident, NodeId, TypeExpr};
use sable_lexer::Span;
use sable_types::Variance;

/// A top-level or nested declaration.
#[derive(Clone, Debug)]
pub enum Decl {
    Function(FunctionDecl),
    Class(ClassDecl),
    Trait(TraitDecl),
    Object(ObjectDecl),
    Extension(ExtensionDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Function(f) => f.span,
            Decl::Class(c) => c.span,
            Decl::Trait(t) => t.span,
            Decl::Object(o) => o.span,
            Decl::Extension(e) => e.span,
        }
    }

    /// The declared name; extensions are named after their target.
    pub fn name(&self) -> &str {
        match self {
            Decl::Function(f) => &f.name.name,
            Decl::Class(c) => &c.name.name,
            Decl::Trait(t) => &t.name.name,
            Decl::Object(o) => &o.name.name,
            Decl::Extension(e) => &e.target_name,
        }
    }
}

/// A function declaration.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Parameter>,
    pub return_annotation: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
    pub id: NodeId,
}

/// A class declaration with an optional primary constructor.
#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub superclass: Option<TypeExpr>,
    pub traits: Vec<TypeExpr>,
    pub constructor: Option<Constructor>,
    pub members: Vec<ClassMember>,
    pub span: Span,
    pub id: NodeId,
}

/// A trait declaration. Concrete methods use `fun`; abstract signatures
/// use `def`.
#[derive(Clone, Debug)]
pub struct TraitDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub super_traits: Vec<TypeExpr>,
    pub members: Vec<TraitMember>,
    pub span: Span,
    pub id: NodeId,
}

/// A singleton object declaration.
#[derive(Clone, Debug)]
pub struct ObjectDecl {
    pub name: Ident,
    pub superclass: Option<TypeExpr>,
    pub traits: Vec<TypeExpr>,
    pub members: Vec<ClassMember>,
    pub span: Span,
    pub id: NodeId,
}

/// An extension declaration: methods added to an existing target type.
#[derive(Clone, Debug)]
pub struct ExtensionDecl {
    pub target: TypeExpr,
    /// The flat name of the target, used for the generated carrier class.
    pub target_name: String,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
    pub id: NodeId,
}

/// A primary constructor: parameters and an optional body.
#[derive(Clone, Debug)]
pub struct Constructor {
    pub params: Vec<Parameter>,
    pub body: Option<Block>,
    pub span: Span,
}

/// A member of a class or object body.
#[derive(Clone, Debug)]
pub enum ClassMember {
    Method(FunctionDecl),
    Field {
        name: Ident,
        annotation: Option<TypeExpr>,
        init: Option<Expr>,
        mutable: bool,
        span: Span,
    },
}

impl ClassMember {
    pub fn name(&self) -> &str {
        match self {
            ClassMember::Method(m) => &m.name.name,
            ClassMember::Field { name, .. } => &name.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ClassMember::Method(m) => m.span,
            ClassMember::Field { span, .. } => *span,
        }
    }
}

/// A member of a trait body.
#[derive(Clone, Debug)]
pub enum TraitMember {
    /// A concrete method with a body (`fun`)
    Method(FunctionDecl),
    /// An abstract method signature (`def`)
    AbstractMethod {
        name: Ident,
        params: Vec<Parameter>,
        return_annotation: Option<TypeExpr>,
        span: Span,
    },
}

impl TraitMember {
    pub fn name(&self) -> &str {
        match self {
            TraitMember::Method(m) => &m.name.name,
            TraitMember::AbstractMethod { name, .. } => &name.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TraitMember::Method(m) => m.span,
            TraitMember::AbstractMethod { span, .. } => *span,
        }
    }
}

/// A function or lambda parameter.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: Ident,
    pub annotation: Option<TypeExpr>,
    pub default: Option<Expr>,
    pub span: Span,
}

/// A declared type parameter with variance and optional bounds.
#[derive(Clone, Debug)]
pub struct TypeParam {
    pub name: Ident,
    pub variance: Variance,
    pub upper: Option<TypeExpr>,
    pub lower: Option<TypeExpr>,
    pub span: Span,
}
