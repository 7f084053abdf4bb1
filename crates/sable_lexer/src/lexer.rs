//! The lexer implementation for Sable.

use crate::{LexError, LexErrorKind, LexResult, Span, Token, TokenKind};
use std::str::Chars;

/// The lexer for Sable source code.
///
/// Trivia (whitespace runs, newlines, comments) is emitted as ordinary
/// tokens so that the concatenated token texts reproduce the source
/// exactly; the parser filters trivia out.
pub struct Lexer<'a> {
    /// The source code being lexed.
    source: &'a str,
    /// Iterator over source characters.
    chars: Chars<'a>,
    /// Current byte position in the source.
    pos: u32,
    /// The character at the current position (None if at end).
    current: Option<char>,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source code.
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let current = chars.next();
        Self {
            source,
            chars,
            pos: 0,
            current,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> LexResult<Token> {
        let start = self.pos;

        let kind = match self.current {
            None => TokenKind::Eof,

            Some('\n') => {
                self.advance();
                TokenKind::Newline
            }

            Some(' ' | '\t' | '\r') => {
                while matches!(self.current, Some(' ' | '\t' | '\r')) {
                    self.advance();
                }
                TokenKind::Whitespace
            }

            Some('/') if self.peek_next() == Some('/') => self.lex_line_comment(),

            Some('/') if self.peek_next() == Some('*') => self.lex_block_comment()?,

            Some(c) if c.is_alphabetic() || c == '_' => self.lex_ident_or_keyword(),

            Some(c) if c.is_ascii_digit() => self.lex_number(),

            Some('"') => self.lex_string()?,

            Some(c) => self.lex_punctuation(c)?,
        };

        let span = Span::new(start, self.pos);
        Ok(Token::new(kind, span))
    }

    /// Tokenizes the entire source and returns all tokens, ending in Eof.
    pub fn tokenize(mut self) -> LexResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    /// Advances to the next character and returns the current one.
    fn advance(&mut self) -> Option<char> {
        let current = self.current;
        if let Some(c) = current {
            self.pos += c.len_utf8() as u32;
            self.current = self.chars.next();
        }
        current
    }

    /// Returns the next character without advancing.
    fn peek_next(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Returns true if the current character matches the expected one.
    fn check(&self, expected: char) -> bool {
        self.current == Some(expected)
    }

    /// Advances if the current character matches the expected one.
    fn match_char(&mut self, expected: char) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Lexes a `//` comment up to (not including) the newline.
    fn lex_line_comment(&mut self) -> TokenKind {
        while self.current.is_some() && self.current != Some('\n') {
            self.advance();
        }
        TokenKind::Comment
    }

    /// Lexes a `/* ... */` comment. Block comments do not nest.
    fn lex_block_comment(&mut self) -> LexResult<TokenKind> {
        let open = self.pos;
        self.advance(); // /
        self.advance(); // *
        loop {
            match (self.current, self.peek_next()) {
                (Some('*'), Some('/')) => {
                    self.advance();
                    self.advance();
                    return Ok(TokenKind::Comment);
                }
                (Some(_), _) => {
                    self.advance();
                }
                (None, _) => {
                    return Err(LexError::new(
                        LexErrorKind::UnterminatedBlockComment,
                        Span::new(open, open + 2),
                    ));
                }
            }
        }
    }

    /// Lexes an identifier, keyword, boolean literal, or lone underscore.
    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos as usize;

        while let Some(c) = self.current {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let end = self.pos as usize;
        let ident = &self.source[start..end];

        if ident == "_" {
            return TokenKind::Underscore;
        }
        if ident == "true" {
            return TokenKind::BoolLiteral(true);
        }
        if ident == "false" {
            return TokenKind::BoolLiteral(false);
        }

        TokenKind::keyword(ident).unwrap_or_else(|| TokenKind::Ident(ident.to_string()))
    }

    /// Lexes an integer or floating literal.
    ///
    /// A floating literal requires digits on both sides of the dot; `1.` is
    /// the integer 1 followed by a dot token.
    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos as usize;

        while matches!(self.current, Some(c) if c.is_ascii_digit()) {
            self.advance();
        }

        if self.check('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance(); // .
            while matches!(self.current, Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
            let text = &self.source[start..self.pos as usize];
            return TokenKind::DoubleLiteral(text.parse().unwrap_or(0.0));
        }

        let text = &self.source[start..self.pos as usize];
        TokenKind::IntLiteral(text.parse().unwrap_or(0))
    }

    /// Lexes a string literal, decoding escapes.
    ///
    /// An unknown escape inserts the escaped character literally. Reaching
    /// the end of input before the closing quote reports the error at the
    /// opening quote.
    fn lex_string(&mut self) -> LexResult<TokenKind> {
        let open = self.pos;
        self.advance(); // opening "
        let mut value = String::new();

        loop {
            match self.current {
                None => {
                    return Err(LexError::new(
                        LexErrorKind::UnterminatedString,
                        Span::point(open),
                    ));
                }
                Some('"') => {
                    self.advance();
                    return Ok(TokenKind::StringLiteral(value));
                }
                Some('\\') => {
                    self.advance();
                    match self.current {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some(c) => value.push(c),
                        None => {
                            return Err(LexError::new(
                                LexErrorKind::UnterminatedString,
                                Span::point(open),
                            ));
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Lexes operators and delimiters, longest match first.
    fn lex_punctuation(&mut self, c: char) -> LexResult<TokenKind> {
        let start = self.pos;
        self.advance();

        let kind = match c {
            '+' => {
                if self.match_char('+') {
                    TokenKind::PlusPlus
                } else if self.match_char('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.match_char('-') {
                    TokenKind::MinusMinus
                } else if self.match_char('=') {
                    TokenKind::MinusEq
                } else if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.match_char('*') {
                    TokenKind::StarStar
                } else if self.match_char('=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.match_char('=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.match_char('=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqEq
                } else if self.match_char('>') {
                    TokenKind::FatArrow
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.match_char('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenKind::LtEq
                } else if self.match_char(':') {
                    TokenKind::SubtypeOf
                } else if self.match_char('-') {
                    TokenKind::LeftArrow
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenKind::GtEq
                } else if self.match_char(':') {
                    TokenKind::SupertypeOf
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.match_char('&') {
                    TokenKind::AndAnd
                } else {
                    return Err(LexError::new(
                        LexErrorKind::UnexpectedCharacter('&'),
                        Span::point(start),
                    ));
                }
            }
            '|' => {
                if self.match_char('|') {
                    TokenKind::OrOr
                } else {
                    return Err(LexError::new(
                        LexErrorKind::UnexpectedCharacter('|'),
                        Span::point(start),
                    ));
                }
            }
            ':' => {
                if self.match_char(':') {
                    if self.match_char(':') {
                        TokenKind::ColonColonColon
                    } else {
                        TokenKind::ColonColon
                    }
                } else {
                    TokenKind::Colon
                }
            }
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            _ => {
                return Err(LexError::new(
                    LexErrorKind::UnexpectedCharacter(c),
                    Span::point(start),
                ));
            }
        };

        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        let k = kinds("val x = 42");
        assert_eq!(
            k,
            vec![
                TokenKind::Val,
                TokenKind::Ident("x".to_string()),
                TokenKind::Eq,
                TokenKind::IntLiteral(42),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_type_names() {
        let k = kinds("fun class trait object def extension Int Nothing");
        assert_eq!(
            k,
            vec![
                TokenKind::Fun,
                TokenKind::Class,
                TokenKind::Trait,
                TokenKind::Object,
                TokenKind::Def,
                TokenKind::Extension,
                TokenKind::IntTy,
                TokenKind::NothingTy,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        let k = kinds("<= < = == => <: >: ** ++ ::: ::");
        assert_eq!(
            k,
            vec![
                TokenKind::LtEq,
                TokenKind::Lt,
                TokenKind::Eq,
                TokenKind::EqEq,
                TokenKind::FatArrow,
                TokenKind::SubtypeOf,
                TokenKind::SupertypeOf,
                TokenKind::StarStar,
                TokenKind::PlusPlus,
                TokenKind::ColonColonColon,
                TokenKind::ColonColon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_eqeq_is_one_token() {
        let k = kinds("a == b");
        assert!(k.contains(&TokenKind::EqEq));
        assert!(!k.contains(&TokenKind::Eq));
    }

    #[test]
    fn test_number_literals() {
        let k = kinds("42 3.14 1. 0");
        assert_eq!(
            k,
            vec![
                TokenKind::IntLiteral(42),
                TokenKind::DoubleLiteral(3.14),
                TokenKind::IntLiteral(1),
                TokenKind::Dot,
                TokenKind::IntLiteral(0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let k = kinds(r#""a\nb\t\"c\\" "\q""#);
        assert_eq!(
            k,
            vec![
                TokenKind::StringLiteral("a\nb\t\"c\\".to_string()),
                TokenKind::StringLiteral("q".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_opening_quote() {
        let err = Lexer::new("val s = \"abc").tokenize().unwrap_err();
        assert!(matches!(err.kind, LexErrorKind::UnterminatedString));
        assert_eq!(err.span.start, 8);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = Lexer::new("1 /* never closed").tokenize().unwrap_err();
        assert!(matches!(err.kind, LexErrorKind::UnterminatedBlockComment));
        assert_eq!(err.span.start, 2);
    }

    #[test]
    fn test_comments_are_trivia() {
        let k = kinds("1 // line\n/* block */ 2");
        assert_eq!(
            k,
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::IntLiteral(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_are_distinct_tokens() {
        let tokens = Lexer::new("a\nb\n").tokenize().unwrap();
        let newlines = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_round_trip() {
        let source = "fun add(x: Int, y: Int): Int {\n  // sum\n  x + y\n}\n";
        let tokens = Lexer::new(source).tokenize().unwrap();
        let rebuilt: String = tokens.iter().map(|t| t.text(source)).collect();
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_lone_underscore_is_delimiter() {
        let k = kinds("_ _x x_");
        assert_eq!(
            k,
            vec![
                TokenKind::Underscore,
                TokenKind::Ident("_x".to_string()),
                TokenKind::Ident("x_".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("val a = #").tokenize().unwrap_err();
        assert!(matches!(err.kind, LexErrorKind::UnexpectedCharacter('#')));
    }
}
