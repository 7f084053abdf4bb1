//! Statement parsing.

use crate::error::ParseResult;
use crate::parser::Parser;
use sable_ast::*;
use sable_lexer::TokenKind;

impl Parser {
    pub fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();

        match self.peek_kind() {
            TokenKind::Val | TokenKind::Var => self.parse_var_decl(),

            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expression() {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Stmt::new(
                    StmtKind::Return(value),
                    start.merge(self.prev_span()),
                ))
            }

            TokenKind::Match => Err(self.unsupported("match")),
            TokenKind::Case => Err(self.unsupported("case")),
            TokenKind::For => Err(self.unsupported("for")),
            TokenKind::Try => Err(self.unsupported("try")),
            TokenKind::Catch => Err(self.unsupported("catch")),
            TokenKind::Finally => Err(self.unsupported("finally")),
            TokenKind::Throw => Err(self.unsupported("throw")),

            _ => {
                let expr = self.parse_expr()?;
                self.match_token(&TokenKind::Semi);
                Ok(Stmt::new(
                    StmtKind::Expr(expr),
                    start.merge(self.prev_span()),
                ))
            }
        }
    }

    fn parse_var_decl(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        let mutable = self.peek_kind() == TokenKind::Var;
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

        self.match_token(&TokenKind::Semi);

        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                annotation,
                init,
                mutable,
            },
            start.merge(self.prev_span()),
        ))
    }

    /// Returns true if the current token can begin an expression; used to
    /// decide whether `return` carries a value.
    pub(crate) fn starts_expression(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::IntLiteral(_)
                | TokenKind::DoubleLiteral(_)
                | TokenKind::StringLiteral(_)
                | TokenKind::BoolLiteral(_)
                | TokenKind::Ident(_)
                | TokenKind::Null
                | TokenKind::This
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Not
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::LParen
                | TokenKind::LBrace
                | TokenKind::LBracket
        )
    }
}
