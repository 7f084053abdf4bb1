//! The main parser implementation: declarations and type annotations.

use crate::error::{ParseError, ParseResult};
use sable_ast::*;
use sable_lexer::{Span, Token, TokenKind};
use sable_types::Variance;

/// The Sable parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_node_id: u32,
}

impl Parser {
    /// Creates a new parser over a token sequence. Trivia tokens are
    /// filtered out; the lexer emits them only for callers that need the
    /// raw stream.
    pub fn new(tokens: Vec<Token>) -> Self {
        let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_trivia()).collect();
        Self {
            tokens,
            pos: 0,
            next_node_id: 0,
        }
    }

    /// Parses a complete program: a sequence of top-level declarations.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let start = self.current_span();
        let mut decls = Vec::new();

        while !self.is_at_end() {
            decls.push(self.parse_decl()?);
        }

        let end = decls.last().map(|d| d.span()).unwrap_or(start);
        Ok(Program {
            decls,
            span: start.merge(end),
        })
    }

    /// Parses a top-level declaration.
    pub fn parse_decl(&mut self) -> ParseResult<Decl> {
        match self.peek_kind() {
            TokenKind::Fun => Ok(Decl::Function(self.parse_function()?)),
            TokenKind::Class => Ok(Decl::Class(self.parse_class()?)),
            TokenKind::Trait => Ok(Decl::Trait(self.parse_trait()?)),
            TokenKind::Object => Ok(Decl::Object(self.parse_object()?)),
            TokenKind::Extension => Ok(Decl::Extension(self.parse_extension()?)),
            TokenKind::Import => Err(self.unsupported("import")),
            TokenKind::Package => Err(self.unsupported("package")),
            _ => Err(ParseError::unexpected_token(
                "fun, class, trait, object, or extension",
                &self.peek_kind(),
                self.current_span(),
            )),
        }
    }

    // ========== Helper methods ==========

    pub(crate) fn next_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        NodeId(id)
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub(crate) fn peek(&self) -> Token {
        self.tokens.get(self.pos).cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            span: Span::dummy(),
        })
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    pub(crate) fn peek_nth(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// The span of the most recently consumed token.
    pub(crate) fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return self.current_span();
        }
        self.tokens
            .get(self.pos - 1)
            .map(|t| t.span)
            .unwrap_or_else(Span::dummy)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek();
        if !self.is_at_end() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek_kind()) == std::mem::discriminant(kind)
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::unexpected_token(
                kind.as_str(),
                &self.peek_kind(),
                self.current_span(),
            ))
        }
    }

    pub(crate) fn expect_ident(&mut self) -> ParseResult<Ident> {
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Ok(Ident::new(name, span))
            }
            _ => Err(ParseError::ExpectedIdent {
                span: self.current_span(),
            }),
        }
    }

    pub(crate) fn unsupported(&self, construct: &'static str) -> ParseError {
        ParseError::Unsupported {
            construct,
            span: self.current_span(),
        }
    }

    // ========== Declaration parsing ==========

    pub(crate) fn parse_function(&mut self) -> ParseResult<FunctionDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Fun)?;

        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;

        self.expect(TokenKind::LParen)?;
        let params = self.parse_parameters()?;
        self.expect(TokenKind::RParen)?;

        let return_annotation = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;
        let id = self.next_id();

        Ok(FunctionDecl {
            name,
            type_params,
            params,
            return_annotation,
            body,
            span: start.merge(self.prev_span()),
            id,
        })
    }

    /// Parses an optional `<...>` type parameter list with variance marks
    /// and bounds: `<+T, -U <: Upper, V >: Lower>`.
    fn parse_type_params(&mut self) -> ParseResult<Vec<TypeParam>> {
        if !self.match_token(&TokenKind::Lt) {
            return Ok(Vec::new());
        }

        let mut params = Vec::new();
        loop {
            let start = self.current_span();
            let variance = if self.match_token(&TokenKind::Plus) {
                Variance::Covariant
            } else if self.match_token(&TokenKind::Minus) {
                Variance::Contravariant
            } else {
                Variance::Invariant
            };

            let name = self.expect_ident()?;

            let upper = if self.match_token(&TokenKind::SubtypeOf) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let lower = if self.match_token(&TokenKind::SupertypeOf) {
                Some(self.parse_type()?)
            } else {
                None
            };

            params.push(TypeParam {
                name,
                variance,
                upper,
                lower,
                span: start.merge(self.prev_span()),
            });

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::Gt)?;
        Ok(params)
    }

    pub(crate) fn parse_parameters(&mut self) -> ParseResult<Vec<Parameter>> {
        let mut params = Vec::new();

        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }

        loop {
            params.push(self.parse_parameter()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    fn parse_parameter(&mut self) -> ParseResult<Parameter> {
        let start = self.current_span();
        let name = self.expect_ident()?;

        let annotation = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let default = if self.match_token(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Parameter {
            name,
            annotation,
            default,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_class(&mut self) -> ParseResult<ClassDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Class)?;

        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;

        let constructor = if self.check(&TokenKind::LParen) {
            let ctor_start = self.current_span();
            self.advance();
            let params = self.parse_parameters()?;
            self.expect(TokenKind::RParen)?;
            Some(Constructor {
                params,
                body: None,
                span: ctor_start.merge(self.prev_span()),
            })
        } else {
            None
        };

        let (superclass, traits) = self.parse_supertypes()?;

        let mut members = Vec::new();
        if self.match_token(&TokenKind::LBrace) {
            while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
                members.push(self.parse_class_member()?);
            }
            self.expect(TokenKind::RBrace)?;
        }

        let id = self.next_id();
        Ok(ClassDecl {
            name,
            type_params,
            superclass,
            traits,
            constructor,
            members,
            span: start.merge(self.prev_span()),
            id,
        })
    }

    /// Parses `extends Super` and any number of `with Trait` clauses.
    fn parse_supertypes(&mut self) -> ParseResult<(Option<TypeExpr>, Vec<TypeExpr>)> {
        let superclass = if self.match_token(&TokenKind::Extends) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let mut traits = Vec::new();
        while self.match_token(&TokenKind::With) {
            traits.push(self.parse_type()?);
        }

        Ok((superclass, traits))
    }

    fn parse_class_member(&mut self) -> ParseResult<ClassMember> {
        match self.peek_kind() {
            TokenKind::Fun => Ok(ClassMember::Method(self.parse_function()?)),
            TokenKind::Val | TokenKind::Var => self.parse_field(),
            _ => Err(ParseError::unexpected_token(
                "fun, val, or var",
                &self.peek_kind(),
                self.current_span(),
            )),
        }
    }

    fn parse_field(&mut self) -> ParseResult<ClassMember> {
        let start = self.current_span();
        let mutable = match self.peek_kind() {
            TokenKind::Val => false,
            TokenKind::Var => true,
            _ => unreachable!("caller checked val/var"),
        };
        self.advance();

        let name = self.expect_ident()?;

        let annotation = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let init = if self.match_token(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(ClassMember::Field {
            name,
            annotation,
            init,
            mutable,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_trait(&mut self) -> ParseResult<TraitDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Trait)?;

        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;

        let mut super_traits = Vec::new();
        if self.match_token(&TokenKind::Extends) {
            super_traits.push(self.parse_type()?);
        }
        while self.match_token(&TokenKind::With) {
            super_traits.push(self.parse_type()?);
        }

        let mut members = Vec::new();
        if self.match_token(&TokenKind::LBrace) {
            while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
                members.push(self.parse_trait_member()?);
            }
            self.expect(TokenKind::RBrace)?;
        }

        let id = self.next_id();
        Ok(TraitDecl {
            name,
            type_params,
            super_traits,
            members,
            span: start.merge(self.prev_span()),
            id,
        })
    }

    fn parse_trait_member(&mut self) -> ParseResult<TraitMember> {
        match self.peek_kind() {
            TokenKind::Fun => Ok(TraitMember::Method(self.parse_function()?)),
            TokenKind::Def => {
                let start = self.current_span();
                self.advance();
                let name = self.expect_ident()?;
                self.expect(TokenKind::LParen)?;
                let params = self.parse_parameters()?;
                self.expect(TokenKind::RParen)?;
                let return_annotation = if self.match_token(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                Ok(TraitMember::AbstractMethod {
                    name,
                    params,
                    return_annotation,
                    span: start.merge(self.prev_span()),
                })
            }
            _ => Err(ParseError::unexpected_token(
                "fun or def",
                &self.peek_kind(),
                self.current_span(),
            )),
        }
    }

    fn parse_object(&mut self) -> ParseResult<ObjectDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Object)?;

        let name = self.expect_ident()?;
        let (superclass, traits) = self.parse_supertypes()?;

        let mut members = Vec::new();
        if self.match_token(&TokenKind::LBrace) {
            while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
                members.push(self.parse_class_member()?);
            }
            self.expect(TokenKind::RBrace)?;
        }

        let id = self.next_id();
        Ok(ObjectDecl {
            name,
            superclass,
            traits,
            members,
            span: start.merge(self.prev_span()),
            id,
        })
    }

    fn parse_extension(&mut self) -> ParseResult<ExtensionDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Extension)?;

        let target = self.parse_type()?;
        let target_name = match &target.kind {
            TypeExprKind::Named { name, .. } => name.name.clone(),
            _ => return Err(self.unsupported("extension on a non-named type")),
        };

        self.expect(TokenKind::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            methods.push(self.parse_function()?);
        }
        self.expect(TokenKind::RBrace)?;

        let id = self.next_id();
        Ok(ExtensionDecl {
            target,
            target_name,
            methods,
            span: start.merge(self.prev_span()),
            id,
        })
    }

    // ========== Type annotation parsing ==========

    /// Parses a type annotation: a simple or generic name, a function type
    /// `(A, B) => R` (with the single-parameter shorthand `A => R`), or a
    /// structural type `{ name: Type, ... }`.
    pub fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current_span();

        let ty = match self.peek_kind() {
            TokenKind::LParen => {
                if self.paren_is_function_type() {
                    self.parse_function_type()?
                } else {
                    self.advance();
                    let inner = self.parse_type()?;
                    self.expect(TokenKind::RParen)?;
                    inner
                }
            }
            TokenKind::LBrace => self.parse_structural_type()?,
            _ => self.parse_named_type()?,
        };

        // Single-parameter shorthand: `Int => Int` is `(Int) => Int`.
        if self.match_token(&TokenKind::FatArrow) {
            let ret = self.parse_type()?;
            return Ok(TypeExpr::new(
                TypeExprKind::Function {
                    params: vec![ty],
                    ret: Box::new(ret),
                },
                start.merge(self.prev_span()),
            ));
        }

        Ok(ty)
    }

    /// Scans past the matching `)` and reports whether `=>` follows,
    /// deciding function type versus parenthesised type.
    fn paren_is_function_type(&self) -> bool {
        let mut depth = 0usize;
        let mut n = 0usize;
        loop {
            match self.peek_nth(n) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_nth(n + 1) == TokenKind::FatArrow;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            n += 1;
        }
    }

    fn parse_function_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current_span();
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.parse_type()?);
            while self.match_token(&TokenKind::Comma) {
                params.push(self.parse_type()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::FatArrow)?;

        let ret = self.parse_type()?;
        Ok(TypeExpr::new(
            TypeExprKind::Function {
                params,
                ret: Box::new(ret),
            },
            start.merge(self.prev_span()),
        ))
    }

    fn parse_structural_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace)?;

        let mut members = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let name = self.expect_ident()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                members.push((name, ty));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(TypeExpr::new(
            TypeExprKind::Structural(members),
            start.merge(self.prev_span()),
        ))
    }

    fn parse_named_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current_span();

        let name = match self.peek_kind() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Ident::new(name, span)
            }
            TokenKind::IntTy
            | TokenKind::DoubleTy
            | TokenKind::StringTy
            | TokenKind::BooleanTy
            | TokenKind::UnitTy
            | TokenKind::AnyTy
            | TokenKind::AnyRefTy
            | TokenKind::NothingTy => {
                let token = self.advance();
                Ident::new(token.kind.as_str(), token.span)
            }
            _ => {
                return Err(ParseError::ExpectedType {
                    span: self.current_span(),
                })
            }
        };

        let args = if self.match_token(&TokenKind::Lt) {
            let mut args = vec![self.parse_type()?];
            while self.match_token(&TokenKind::Comma) {
                args.push(self.parse_type()?);
            }
            self.expect(TokenKind::Gt)?;
            args
        } else {
            Vec::new()
        };

        Ok(TypeExpr::new(
            TypeExprKind::Named { name, args },
            start.merge(self.prev_span()),
        ))
    }

    // ========== Block parsing ==========

    pub fn parse_block(&mut self) -> ParseResult<Block> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace)?;

        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            stmts.push(self.parse_stmt()?);
        }

        self.expect(TokenKind::RBrace)?;

        Ok(Block {
            stmts,
            span: start.merge(self.prev_span()),
        })
    }
}
