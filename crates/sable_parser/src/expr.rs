//! Expression parsing: the precedence ladder, postfix forms, and the two
//! lookahead disambiguations (lambda parameter lists and trailing lambdas).

use crate::error::{ParseError, ParseResult};
use crate::parser::Parser;
use sable_ast::*;
use sable_lexer::TokenKind;

impl Parser {
    /// Parses an expression.
    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_assignment()
    }

    /// Assignment is right-associative and lowest precedence. Compound
    /// assignments desugar to plain assignment over the binary operation.
    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let expr = self.parse_or()?;

        if self.match_token(&TokenKind::Eq) {
            let value = self.parse_assignment()?;
            let id = self.next_id();
            return Ok(Expr::new(
                ExprKind::Assign {
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                start.merge(self.prev_span()),
                id,
            ));
        }

        if let Some(op) = self.match_compound_assign() {
            let value = self.parse_assignment()?;
            let op_id = self.next_id();
            let value_span = value.span;
            let combined = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(expr.clone()),
                    right: Box::new(value),
                },
                expr.span.merge(value_span),
                op_id,
            );
            let id = self.next_id();
            return Ok(Expr::new(
                ExprKind::Assign {
                    target: Box::new(expr),
                    value: Box::new(combined),
                },
                start.merge(self.prev_span()),
                id,
            ));
        }

        Ok(expr)
    }

    fn match_compound_assign(&mut self) -> Option<BinaryOp> {
        let op = match self.peek_kind() {
            TokenKind::PlusEq => BinaryOp::Add,
            TokenKind::MinusEq => BinaryOp::Sub,
            TokenKind::StarEq => BinaryOp::Mul,
            TokenKind::SlashEq => BinaryOp::Div,
            TokenKind::PercentEq => BinaryOp::Mod,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut left = self.parse_and()?;

        while self.match_token(&TokenKind::OrOr) {
            let right = self.parse_and()?;
            let id = self.next_id();
            left = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start.merge(self.prev_span()),
                id,
            );
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut left = self.parse_equality()?;

        while self.match_token(&TokenKind::AndAnd) {
            let right = self.parse_equality()?;
            let id = self.next_id();
            left = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start.merge(self.prev_span()),
                id,
            );
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut left = self.parse_relational()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();

            let right = self.parse_relational()?;
            let id = self.next_id();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start.merge(self.prev_span()),
                id,
            );
        }

        Ok(left)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();

            let right = self.parse_additive()?;
            let id = self.next_id();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start.merge(self.prev_span()),
                id,
            );
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();

            let right = self.parse_multiplicative()?;
            let id = self.next_id();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start.merge(self.prev_span()),
                id,
            );
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();

            let right = self.parse_unary()?;
            let id = self.next_id();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start.merge(self.prev_span()),
                id,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();

        let op = match self.peek_kind() {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let id = self.next_id();
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                start.merge(self.prev_span()),
                id,
            ));
        }

        self.parse_postfix()
    }

    /// Postfix forms: call `(...)`, member `.name`, and trailing lambda
    /// `{ params => body }` after a call or an identifier-valued primary.
    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    expr = self.make_call(expr, args, start)?;
                }

                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_ident()?;
                    let id = self.next_id();
                    expr = Expr::new(
                        ExprKind::FieldAccess {
                            object: Box::new(expr),
                            field,
                        },
                        start.merge(self.prev_span()),
                        id,
                    );
                }

                TokenKind::LBrace
                    if matches!(
                        expr.kind,
                        ExprKind::Ident(_)
                            | ExprKind::FieldAccess { .. }
                            | ExprKind::MethodCall { .. }
                    ) =>
                {
                    let lambda = self.parse_trailing_lambda()?;
                    expr = self.attach_trailing_lambda(expr, lambda, start)?;
                }

                _ => break,
            }
        }

        Ok(expr)
    }

    /// Builds the uniform call shape: `obj.m(args)` keeps its method name,
    /// anything else becomes a call of the synthetic `apply`.
    fn make_call(
        &mut self,
        callee: Expr,
        args: Vec<Expr>,
        start: sable_lexer::Span,
    ) -> ParseResult<Expr> {
        let id = self.next_id();
        let span = callee.span;
        let callee_id = callee.id;
        let kind = match callee.kind {
            ExprKind::FieldAccess { object, field } => ExprKind::MethodCall {
                receiver: Some(object),
                method: field,
                args,
                type_args: Vec::new(),
            },
            other => ExprKind::MethodCall {
                receiver: Some(Box::new(Expr::new(other, span, callee_id))),
                method: Ident::new(APPLY, start),
                args,
                type_args: Vec::new(),
            },
        };
        Ok(Expr::new(kind, start.merge(self.prev_span()), id))
    }

    /// Attaches a trailing lambda: appended as an extra argument on a call,
    /// or as the sole argument of a fresh call on an identifier or member.
    fn attach_trailing_lambda(
        &mut self,
        expr: Expr,
        lambda: Expr,
        start: sable_lexer::Span,
    ) -> ParseResult<Expr> {
        let id = self.next_id();
        let span = expr.span;
        let expr_id = expr.id;
        let kind = match expr.kind {
            ExprKind::MethodCall {
                receiver,
                method,
                mut args,
                type_args,
            } => {
                args.push(lambda);
                ExprKind::MethodCall {
                    receiver,
                    method,
                    args,
                    type_args,
                }
            }
            ExprKind::FieldAccess { object, field } => ExprKind::MethodCall {
                receiver: Some(object),
                method: field,
                args: vec![lambda],
                type_args: Vec::new(),
            },
            ident @ ExprKind::Ident(_) => ExprKind::MethodCall {
                receiver: Some(Box::new(Expr::new(ident, span, expr_id))),
                method: Ident::new(APPLY, start),
                args: vec![lambda],
                type_args: Vec::new(),
            },
            _ => unreachable!("caller checked the trailing-lambda shapes"),
        };
        Ok(Expr::new(kind, start.merge(self.prev_span()), id))
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    /// Parses `{ params => body }`. Params may be absent (leading `=>`),
    /// bare or typed names, or a parenthesised parameter list.
    fn parse_trailing_lambda(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace)?;

        let params = if self.match_token(&TokenKind::FatArrow) {
            Vec::new()
        } else if self.match_token(&TokenKind::LParen) {
            let params = self.parse_parameters()?;
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::FatArrow)?;
            params
        } else {
            let mut params = Vec::new();
            loop {
                let p_start = self.current_span();
                let name = self.expect_ident()?;
                let annotation = if self.match_token(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                params.push(Parameter {
                    name,
                    annotation,
                    default: None,
                    span: p_start.merge(self.prev_span()),
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::FatArrow)?;
            params
        };

        let body_start = self.current_span();
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;

        let body_span = body_start.merge(self.prev_span());
        let body_id = self.next_id();
        let body = Expr::new(
            ExprKind::Block(Block {
                stmts,
                span: body_span,
            }),
            body_span,
            body_id,
        );

        let id = self.next_id();
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            start.merge(self.prev_span()),
            id,
        ))
    }

    /// Scans past the matching `)` and reports whether `=>` follows; this
    /// is the lambda-vs-parenthesised-expression disambiguation.
    fn paren_is_lambda(&self) -> bool {
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

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::LParen)?;
        let params = self.parse_parameters()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::FatArrow)?;

        let body = self.parse_expr()?;
        let id = self.next_id();
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            start.merge(self.prev_span()),
            id,
        ))
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();

        match self.peek_kind() {
            TokenKind::IntLiteral(n) => {
                self.advance();
                let id = self.next_id();
                Ok(Expr::new(ExprKind::Literal(Literal::Int(n)), start, id))
            }

            TokenKind::DoubleLiteral(n) => {
                self.advance();
                let id = self.next_id();
                Ok(Expr::new(ExprKind::Literal(Literal::Double(n)), start, id))
            }

            TokenKind::StringLiteral(s) => {
                self.advance();
                let id = self.next_id();
                Ok(Expr::new(ExprKind::Literal(Literal::Str(s)), start, id))
            }

            TokenKind::BoolLiteral(b) => {
                self.advance();
                let id = self.next_id();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(b)), start, id))
            }

            TokenKind::Null => {
                self.advance();
                let id = self.next_id();
                Ok(Expr::new(ExprKind::Literal(Literal::Null), start, id))
            }

            TokenKind::This => {
                self.advance();
                let id = self.next_id();
                Ok(Expr::new(ExprKind::This, start, id))
            }

            TokenKind::Ident(name) => {
                self.advance();
                let id = self.next_id();
                Ok(Expr::new(
                    ExprKind::Ident(Ident::new(name, start)),
                    start,
                    id,
                ))
            }

            TokenKind::LParen => {
                if self.paren_is_lambda() {
                    return self.parse_lambda();
                }
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }

            TokenKind::LBrace => {
                let block = self.parse_block()?;
                let span = block.span;
                let id = self.next_id();
                Ok(Expr::new(ExprKind::Block(block), span, id))
            }

            TokenKind::LBracket => self.parse_list_or_map(),

            TokenKind::If => self.parse_if(),

            TokenKind::While => self.parse_while(),

            // Reserved syntax the language tolerates but does not implement.
            TokenKind::Match => Err(self.unsupported("match")),
            TokenKind::Case => Err(self.unsupported("case")),
            TokenKind::For => Err(self.unsupported("for")),
            TokenKind::Try => Err(self.unsupported("try")),
            TokenKind::Catch => Err(self.unsupported("catch")),
            TokenKind::Finally => Err(self.unsupported("finally")),
            TokenKind::Throw => Err(self.unsupported("throw")),
            TokenKind::New => Err(self.unsupported("new")),
            TokenKind::Super => Err(self.unsupported("super")),
            TokenKind::Import => Err(self.unsupported("import")),
            TokenKind::Package => Err(self.unsupported("package")),
            TokenKind::StarStar => Err(self.unsupported("the `**` operator")),
            TokenKind::PlusPlus => Err(self.unsupported("the `++` operator")),
            TokenKind::MinusMinus => Err(self.unsupported("the `--` operator")),
            TokenKind::ColonColon => Err(self.unsupported("the `::` operator")),
            TokenKind::ColonColonColon => Err(self.unsupported("the `:::` operator")),
            TokenKind::LeftArrow => Err(self.unsupported("the `<-` operator")),

            other => Err(ParseError::ExpectedExpression {
                found: format!("{}", other),
                span: start,
            }),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;

        let then_branch = self.parse_expr()?;
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let id = self.next_id();
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            start.merge(self.prev_span()),
            id,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;

        let body = self.parse_expr()?;
        let id = self.next_id();
        Ok(Expr::new(
            ExprKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
            start.merge(self.prev_span()),
            id,
        ))
    }

    /// Parses `[a, b, c]` (list) or `[k: v, ...]` (map); `[]` is the empty
    /// list.
    fn parse_list_or_map(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::LBracket)?;

        if self.match_token(&TokenKind::RBracket) {
            let id = self.next_id();
            return Ok(Expr::new(
                ExprKind::ListLiteral(Vec::new()),
                start.merge(self.prev_span()),
                id,
            ));
        }

        let first = self.parse_expr()?;

        if self.match_token(&TokenKind::Colon) {
            let first_value = self.parse_expr()?;
            let mut entries = vec![(first, first_value)];
            while self.match_token(&TokenKind::Comma) {
                let key = self.parse_expr()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expr()?;
                entries.push((key, value));
            }
            self.expect(TokenKind::RBracket)?;
            let id = self.next_id();
            return Ok(Expr::new(
                ExprKind::MapLiteral(entries),
                start.merge(self.prev_span()),
                id,
            ));
        }

        let mut elements = vec![first];
        while self.match_token(&TokenKind::Comma) {
            elements.push(self.parse_expr()?);
        }
        self.expect(TokenKind::RBracket)?;
        let id = self.next_id();
        Ok(Expr::new(
            ExprKind::ListLiteral(elements),
            start.merge(self.prev_span()),
            id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::{ParseError, Parser};
    use sable_ast::*;
    use sable_lexer::Lexer;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap_err()
    }

    fn first_fn(program: &Program) -> &FunctionDecl {
        match &program.decls[0] {
            Decl::Function(f) => f,
            other => panic!("expected function, got {:?}", other),
        }
    }

    fn body_expr(f: &FunctionDecl) -> &Expr {
        match &f.body.stmts[0].kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function() {
        let program = parse("fun add(x: Int, y: Int): Int { x + y }");
        let f = first_fn(&program);
        assert_eq!(f.name.name, "add");
        assert_eq!(f.params.len(), 2);
        assert!(f.return_annotation.is_some());
        assert!(matches!(
            body_expr(f).kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_precedence() {
        let program = parse("fun f(): Int { 1 + 2 * 3 }");
        let expr = body_expr(first_fn(&program));
        // Must parse as 1 + (2 * 3)
        match &expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => {
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("expected addition at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_call_parses_as_apply() {
        let program = parse("fun f(): Int { g(1, 2) }");
        match &body_expr(first_fn(&program)).kind {
            ExprKind::MethodCall {
                receiver,
                method,
                args,
                ..
            } => {
                assert!(matches!(
                    receiver.as_deref().map(|r| &r.kind),
                    Some(ExprKind::Ident(i)) if i.name == "g"
                ));
                assert_eq!(method.name, APPLY);
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_method_call_keeps_name() {
        let program = parse("fun f(p: Point): Int { p.getX() }");
        match &body_expr(first_fn(&program)).kind {
            ExprKind::MethodCall { method, args, .. } => {
                assert_eq!(method.name, "getX");
                assert!(args.is_empty());
            }
            other => panic!("expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_lambda_vs_parenthesised() {
        let program = parse("fun f(): Int { (x: Int) => x * 2; (1 + 2) * 3 }");
        let f = first_fn(&program);
        assert!(matches!(
            &f.body.stmts[0].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Lambda { .. },
                ..
            })
        ));
        assert!(matches!(
            &f.body.stmts[1].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn test_trailing_lambda_on_call_appends_argument() {
        let program = parse("fun f(): Int { fold(0) { acc, x => acc + x } }");
        match &body_expr(first_fn(&program)).kind {
            ExprKind::MethodCall { args, .. } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(args[1].kind, ExprKind::Lambda { ref params, .. } if params.len() == 2));
            }
            other => panic!("expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_lambda_on_identifier() {
        let program = parse("fun f(): Int { run { => 42 } }");
        match &body_expr(first_fn(&program)).kind {
            ExprKind::MethodCall { method, args, .. } => {
                assert_eq!(method.name, APPLY);
                assert_eq!(args.len(), 1);
                assert!(matches!(args[0].kind, ExprKind::Lambda { ref params, .. } if params.is_empty()));
            }
            other => panic!("expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_lambda_on_member() {
        let program = parse("fun f(xs: List<Int>): List<Int> { xs.map { x => x * 2 } }");
        match &body_expr(first_fn(&program)).kind {
            ExprKind::MethodCall { method, args, .. } => {
                assert_eq!(method.name, "map");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else() {
        let program = parse("fun f(n: Int): Int { if (n <= 1) { 1 } else { n } }");
        assert!(matches!(
            body_expr(first_fn(&program)).kind,
            ExprKind::If {
                else_branch: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_class_with_constructor() {
        let program = parse(
            "class Point(x: Int, y: Int) { fun getX(): Int { x } fun getY(): Int { y } }",
        );
        match &program.decls[0] {
            Decl::Class(c) => {
                assert_eq!(c.name.name, "Point");
                let ctor = c.constructor.as_ref().expect("constructor");
                assert_eq!(ctor.params.len(), 2);
                assert_eq!(c.members.len(), 2);
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_trait_members() {
        let program = parse("trait Shape { def area(): Double fun describe(): String { \"shape\" } }");
        match &program.decls[0] {
            Decl::Trait(t) => {
                assert_eq!(t.members.len(), 2);
                assert!(matches!(t.members[0], TraitMember::AbstractMethod { .. }));
                assert!(matches!(t.members[1], TraitMember::Method(_)));
            }
            other => panic!("expected trait, got {:?}", other),
        }
    }

    #[test]
    fn test_object() {
        let program = parse("object Math { fun pi(): Double { 3.14159 } }");
        match &program.decls[0] {
            Decl::Object(o) => {
                assert_eq!(o.name.name, "Math");
                assert_eq!(o.members.len(), 1);
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_extension() {
        let program = parse("extension Int { fun isEven(): Boolean { this % 2 == 0 } }");
        match &program.decls[0] {
            Decl::Extension(e) => {
                assert_eq!(e.target_name, "Int");
                assert_eq!(e.methods.len(), 1);
            }
            other => panic!("expected extension, got {:?}", other),
        }
    }

    #[test]
    fn test_function_type_shorthand() {
        let program = parse("fun twice(f: Int => Int, x: Int): Int { f(f(x)) }");
        let f = first_fn(&program);
        match &f.params[0].annotation.as_ref().unwrap().kind {
            TypeExprKind::Function { params, .. } => assert_eq!(params.len(), 1),
            other => panic!("expected function type, got {:?}", other),
        }
    }

    #[test]
    fn test_structural_type_annotation() {
        let program = parse("fun name(x: { name: String, size: Int }): String { x.name }");
        let f = first_fn(&program);
        match &f.params[0].annotation.as_ref().unwrap().kind {
            TypeExprKind::Structural(members) => assert_eq!(members.len(), 2),
            other => panic!("expected structural type, got {:?}", other),
        }
    }

    #[test]
    fn test_variance_marks() {
        let program = parse("class Box<+T, -U, V>");
        match &program.decls[0] {
            Decl::Class(c) => {
                use sable_types::Variance::*;
                let variances: Vec<_> = c.type_params.iter().map(|p| p.variance).collect();
                assert_eq!(variances, vec![Covariant, Contravariant, Invariant]);
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_list_literal() {
        let program = parse("fun f(): List<Int> { [] }");
        assert!(matches!(
            body_expr(first_fn(&program)).kind,
            ExprKind::ListLiteral(ref es) if es.is_empty()
        ));
    }

    #[test]
    fn test_map_literal() {
        let program = parse("fun f(): Map<String, Int> { [\"a\": 1, \"b\": 2] }");
        assert!(matches!(
            body_expr(first_fn(&program)).kind,
            ExprKind::MapLiteral(ref es) if es.len() == 2
        ));
    }

    #[test]
    fn test_compound_assign_desugars() {
        let program = parse("fun f(): Unit { var x = 0 x += 1 }");
        let f = first_fn(&program);
        match &f.body.stmts[1].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Assign { value, .. },
                ..
            }) => {
                assert!(matches!(
                    value.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        ..
                    }
                ));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_match_is_rejected() {
        let err = parse_err("fun f(): Int { match }");
        assert!(matches!(err, ParseError::Unsupported { construct, .. } if construct == "match"));
    }

    #[test]
    fn test_for_is_rejected() {
        let err = parse_err("fun f(): Unit { for }");
        assert!(matches!(err, ParseError::Unsupported { construct, .. } if construct == "for"));
    }

    #[test]
    fn test_try_catch_finally_are_rejected() {
        let err = parse_err("fun f(): Unit { try }");
        assert!(matches!(err, ParseError::Unsupported { construct, .. } if construct == "try"));
        let err = parse_err("fun f(): Unit { catch }");
        assert!(matches!(err, ParseError::Unsupported { construct, .. } if construct == "catch"));
        let err = parse_err("fun f(): Unit { finally }");
        assert!(
            matches!(err, ParseError::Unsupported { construct, .. } if construct == "finally")
        );
    }

    #[test]
    fn test_catch_in_expression_position_is_rejected() {
        let err = parse_err("fun f(): Int { 1 + catch }");
        assert!(matches!(err, ParseError::Unsupported { construct, .. } if construct == "catch"));
        let err = parse_err("fun f(): Int { 1 + finally }");
        assert!(
            matches!(err, ParseError::Unsupported { construct, .. } if construct == "finally")
        );
    }

    #[test]
    fn test_parse_error_on_missing_parameter_name() {
        let err = parse_err("fun f(: Int { 1 }");
        match err {
            ParseError::ExpectedIdent { .. } => {}
            other => panic!("expected ExpectedIdent, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_token_reports_expected_and_found() {
        let err = parse_err("fun f(x: Int: Int { 1 }");
        match err {
            ParseError::UnexpectedToken { expected, found, .. } => {
                assert_eq!(expected, ")");
                assert_eq!(found, ":");
            }
            other => panic!("expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn test_parser_determinism() {
        let source = "fun f(x: Int): Int { if (x > 0) { x } else { -x } } class P(a: Int)";
        let a = format!("{:?}", parse(source));
        let b = format!("{:?}", parse(source));
        assert_eq!(a, b);
    }
}
