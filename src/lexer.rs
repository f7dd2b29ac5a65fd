//! Lexer
//!
//! The lexer converts source code into a stream of tokens. Raw runs are
//! found by `logos`; each run is then validated character by character so
//! an error points at the exact column that broke it.

use crate::span::{LineIndex, Location, Span};
use crate::token::{self, Lexeme, Payload, Token, TokenKind, NUM_MARKER};
use logos::Logos;
use thiserror::Error;
use tracing::trace;

/// Lexer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("expected valid chars, found {found:?}")]
    UnexpectedChar { found: char, location: Location },

    #[error("expected identifier, found {found:?}")]
    InvalidIdentifier { found: char, location: Location },

    #[error("expected more unit characters, found {found:?}")]
    ExpectedUnits { found: char, location: Location },

    #[error("expected keyword, found `{text}`")]
    UnknownKeyword { text: String, location: Location },

    #[error("integer literal has too many unit characters")]
    LiteralTooLarge { location: Location },
}

impl LexError {
    pub fn location(&self) -> Location {
        match self {
            LexError::UnexpectedChar { location, .. }
            | LexError::InvalidIdentifier { location, .. }
            | LexError::ExpectedUnits { location, .. }
            | LexError::UnknownKeyword { location, .. }
            | LexError::LiteralTooLarge { location } => *location,
        }
    }
}

/// Lex result
pub type LexResult<T> = Result<T, LexError>;

/// The lexer
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, Lexeme>,
    lines: LineIndex,
    /// Single-slot lookahead cache
    peeked: Option<Token>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            inner: Lexeme::lexer(source),
            lines: LineIndex::new(source),
            peeked: None,
        }
    }

    /// Get the source code
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Resolve a byte offset to a line/column location
    pub fn location(&self, offset: usize) -> Location {
        self.lines.location(self.source, offset)
    }

    /// Peek at the next token without consuming it
    pub fn peek(&mut self) -> LexResult<&Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lex_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> LexResult<Token> {
        // Return peeked token if available
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        self.lex_token()
    }

    /// Collect all tokens into a vector, ending with `END`
    pub fn tokenize(mut self) -> LexResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::End;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn lex_token(&mut self) -> LexResult<Token> {
        let Some(result) = self.inner.next() else {
            let end = self.source.len();
            return Ok(Token::new(TokenKind::End, Span::new(end, end), self.location(end)));
        };

        let range = self.inner.span();
        let span = Span::new(range.start, range.end);
        let text = self.inner.slice();
        let location = self.location(span.start);

        let token = match result {
            Ok(Lexeme::VarRun) => self.identifier(TokenKind::VarId, text, span, location)?,
            Ok(Lexeme::FnRun) => self.identifier(TokenKind::FnId, text, span, location)?,
            Ok(Lexeme::NumRun) => self.number(text, span, location)?,
            Ok(Lexeme::KeywordRun) => match TokenKind::keyword(text) {
                Some(kind) => Token::new(kind, span, location),
                None => {
                    return Err(LexError::UnknownKeyword { text: text.to_string(), location });
                }
            },
            Err(()) => {
                let found = text.chars().next().unwrap_or('\0');
                return Err(LexError::UnexpectedChar { found, location });
            }
        };

        trace!(token = %token, at = %token.location, "lexed");
        Ok(token)
    }

    fn identifier(&self, kind: TokenKind, text: &str, span: Span, location: Location) -> LexResult<Token> {
        if let Some((offset, found)) = text.char_indices().find(|&(_, c)| !token::is_alphabet(c)) {
            return Err(LexError::InvalidIdentifier {
                found,
                location: self.location(span.start + offset),
            });
        }
        Ok(Token::new(kind, span, location).with_payload(Payload::Name(text.to_string())))
    }

    fn number(&self, text: &str, span: Span, location: Location) -> LexResult<Token> {
        // The marker itself is not a unit
        let units = &text[NUM_MARKER.len_utf8()..];
        if let Some((offset, found)) = units.char_indices().find(|&(_, c)| c != NUM_MARKER) {
            return Err(LexError::ExpectedUnits {
                found,
                location: self.location(span.start + NUM_MARKER.len_utf8() + offset),
            });
        }
        let value = i32::try_from(units.len()).map_err(|_| LexError::LiteralTooLarge { location })?;
        Ok(Token::new(TokenKind::Num, span, location).with_payload(Payload::Int(value)))
    }
}

/// Helper function to lex source code
pub fn lex(source: &str) -> LexResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(token_kinds(""), vec![TokenKind::End]);
    }

    #[test]
    fn test_whitespace_only() {
        assert_eq!(token_kinds("   \t\n \x0B\x0C\r  "), vec![TokenKind::End]);
    }

    #[test]
    fn test_integers_count_units() {
        let tokens = lex("1 11 1111").unwrap();
        let values: Vec<_> = tokens.iter().filter_map(Token::int_value).collect();
        assert_eq!(values, vec![0, 1, 3]);
    }

    #[test]
    fn test_identifiers() {
        let tokens = lex("iI1l IIII").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::VarId);
        assert_eq!(tokens[0].name(), Some("iI1l"));
        assert_eq!(tokens[1].kind, TokenKind::FnId);
        assert_eq!(tokens[1].name(), Some("IIII"));
    }

    #[test]
    fn test_keywords() {
        let kinds = token_kinds("li1I l1iI lI1i li1l lil1 l1ii l1Ii liI1 lIi1 l1i1 l1il");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Program,
                TokenKind::LBrace,
                TokenKind::Function,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Semi,
                TokenKind::RBrace,
                TokenKind::Var,
                TokenKind::Assign,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_operators() {
        let kinds = token_kinds("llli llii liil llil liii ll1i ll1I ll11 l111");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Times,
                TokenKind::Div,
                TokenKind::Exp,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_location_tracking() {
        let source = "li1I\n  l1iI 11\n";
        let tokens = lex(source).unwrap();

        assert_eq!(tokens[0].location, Location::new(0, 1, 1));
        assert_eq!(tokens[1].location, Location::new(7, 2, 3));
        assert_eq!(tokens[2].location, Location::new(12, 2, 8));
        assert_eq!(tokens[2].text(source), "11");
        assert_eq!(tokens[3].kind, TokenKind::End);
        assert_eq!(tokens[3].location.line, 3);
    }

    #[test]
    fn test_peek_then_next_returns_same_token() {
        let mut lexer = Lexer::new("111 llli");
        let peeked = lexer.peek().unwrap().clone();
        assert_eq!(lexer.peek().unwrap(), &peeked);
        assert_eq!(lexer.next_token().unwrap(), peeked);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Plus);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::End);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::End);
    }

    #[test]
    fn test_unexpected_char_column() {
        let err = lex("li1I\n   x").unwrap_err();
        assert_eq!(err, LexError::UnexpectedChar { found: 'x', location: Location::new(8, 2, 4) });
    }

    #[test]
    fn test_invalid_identifier_points_at_bad_char() {
        let err = lex("ii1x").unwrap_err();
        match err {
            LexError::InvalidIdentifier { found, location } => {
                assert_eq!(found, 'x');
                assert_eq!(location.column, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_number_requires_units() {
        let err = lex("  11i1").unwrap_err();
        assert!(err.to_string().contains("expected more unit characters"));
        assert_eq!(err.location().column, 5);
    }

    #[test]
    fn test_unknown_keyword() {
        let err = lex("llll").unwrap_err();
        assert_eq!(
            err,
            LexError::UnknownKeyword { text: "llll".to_string(), location: Location::new(0, 1, 1) }
        );
        assert!(lex("l1iI1").is_err());
    }
}
