use proptest::prelude::*;
use sable_lexer::{Lexer, TokenKind};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// Concatenating the raw text of every token (Eof excluded) reproduces
    /// the source exactly, for any input the lexer accepts.
    #[test]
    fn round_trips_any_lexable_input(s in ".*") {
        if let Ok(tokens) = Lexer::new(&s).tokenize() {
            let rebuilt: String = tokens.iter().map(|t| t.text(&s)).collect();
            prop_assert_eq!(rebuilt, s);
        }
    }

    /// Token spans are in-bounds, monotonic, and make progress.
    #[test]
    fn spans_are_monotonic(s in ".*") {
        if let Ok(tokens) = Lexer::new(&s).tokenize() {
            let mut last_end = 0u32;
            for token in &tokens {
                prop_assert!(token.span.start <= token.span.end);
                prop_assert!(token.span.end as usize <= s.len());
                prop_assert!(token.span.start >= last_end || token.kind == TokenKind::Eof);
                if token.kind != TokenKind::Eof {
                    prop_assert!(token.span.end > token.span.start || s.is_empty());
                }
                last_end = token.span.end;
            }
            prop_assert_eq!(tokens.last().map(|t| t.kind.clone()), Some(TokenKind::Eof));
        }
    }

    /// Lexing well-formed identifier/operator soup never fails.
    #[test]
    fn lexes_operator_soup(ops in prop::collection::vec(
        prop::sample::select(vec![
            "+", "-", "*", "/", "%", "**", "==", "!=", "<", ">", "<=", ">=",
            "&&", "||", "!", "=", "=>", "->", "<-", "<:", ">:", ".", "::",
            ":::", "++", "--", "(", ")", "[", "]", "{", "}", ",", ";", ":",
            "foo", "Bar", "_", "42", "3.14", "\"s\"",
        ]),
        0..64,
    )) {
        let source = ops.join(" ");
        let tokens = Lexer::new(&source).tokenize();
        prop_assert!(tokens.is_ok());
        let rebuilt: String = tokens.unwrap().iter().map(|t| t.text(&source)).collect();
        prop_assert_eq!(rebuilt, source);
    }
}
