//! Token definitions
//!
//! This module defines every token the lexer can produce, the raw lexeme
//! classes recognized by `logos`, and the fixed keyword table.

use crate::span::{Location, Span};
use logos::Logos;
use std::fmt;

/// Leading letter of a variable identifier
pub const VAR_MARKER: char = 'i';
/// Leading letter of a function identifier
pub const FN_MARKER: char = 'I';
/// Leading letter of an integer literal; also its unit character
pub const NUM_MARKER: char = '1';
/// Leading letter of every keyword, punctuation and operator token
pub const KEYWORD_MARKER: char = 'l';

/// The complete source alphabet
pub const ALPHABET: [char; 4] = [VAR_MARKER, FN_MARKER, NUM_MARKER, KEYWORD_MARKER];

/// Whether `c` belongs to the source alphabet
pub fn is_alphabet(c: char) -> bool {
    ALPHABET.contains(&c)
}

/// Whitespace as understood by the language (the C `isspace` set)
pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r')
}

/// Raw lexeme classes
///
/// Every lexeme is a maximal run of non-whitespace characters; the class is
/// decided by its first letter. Validation of the remaining characters is
/// left to the lexer so errors can point at the exact offending character.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\n\x0B\x0C\r]+")]
pub enum Lexeme {
    #[regex(r"i[^ \t\n\x0B\x0C\r]*")]
    VarRun,

    #[regex(r"I[^ \t\n\x0B\x0C\r]*")]
    FnRun,

    #[regex(r"1[^ \t\n\x0B\x0C\r]*")]
    NumRun,

    #[regex(r"l[^ \t\n\x0B\x0C\r]*")]
    KeywordRun,
}

/// All possible token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // ============ Literals and identifiers ============
    /// Integer literal: `1` followed by unit characters
    Num,
    /// Variable identifier
    VarId,
    /// Function identifier
    FnId,

    // ============ Keywords ============
    Program,
    Function,
    Var,
    If,
    Else,

    // ============ Punctuation ============
    LBrace,
    RBrace,
    LParen,
    RParen,
    Assign,
    Semi,

    // ============ Operators ============
    Plus,
    Minus,
    Times,
    Div,
    Exp,
    Gt,
    Lt,
    Eq,
    Neq,

    /// End of input
    End,
}

/// Keyword table: exact letter sequence to token kind
pub const KEYWORDS: [(&str, TokenKind); 20] = [
    ("liI1", TokenKind::Var),
    ("li1I", TokenKind::Program),
    ("li1l", TokenKind::LParen),
    ("lil1", TokenKind::RParen),
    ("liil", TokenKind::Times),
    ("liii", TokenKind::Exp),
    ("lIi1", TokenKind::Assign),
    ("lI1i", TokenKind::Function),
    ("l1iI", TokenKind::LBrace),
    ("l1i1", TokenKind::If),
    ("l1il", TokenKind::Else),
    ("l1ii", TokenKind::Semi),
    ("l1Ii", TokenKind::RBrace),
    ("l111", TokenKind::Neq),
    ("llli", TokenKind::Plus),
    ("llii", TokenKind::Minus),
    ("llil", TokenKind::Div),
    ("ll1i", TokenKind::Gt),
    ("ll11", TokenKind::Eq),
    ("ll1I", TokenKind::Lt),
];

impl TokenKind {
    /// Look up a keyword-marker run in the keyword table
    pub fn keyword(text: &str) -> Option<TokenKind> {
        KEYWORDS
            .iter()
            .find(|(spelling, _)| *spelling == text)
            .map(|(_, kind)| *kind)
    }

    /// The source spelling of a table-driven token, if it has one
    pub fn spelling(&self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(spelling, _)| *spelling)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Num => "NUM",
            TokenKind::VarId => "VID",
            TokenKind::FnId => "FID",
            TokenKind::Program => "PROGRAM",
            TokenKind::Function => "FUNCTION",
            TokenKind::Var => "VAR",
            TokenKind::If => "IF",
            TokenKind::Else => "ELSE",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::Assign => "ASSIGN",
            TokenKind::Semi => "SEMI",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Times => "TIMES",
            TokenKind::Div => "DIV",
            TokenKind::Exp => "EXP",
            TokenKind::Gt => "GT",
            TokenKind::Lt => "LT",
            TokenKind::Eq => "EQ",
            TokenKind::Neq => "NEQ",
            TokenKind::End => "END",
        };
        write!(f, "{}", s)
    }
}

/// Data carried by literal and identifier tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Int(i32),
    Name(String),
}

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub location: Location,
    pub payload: Option<Payload>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, location: Location) -> Self {
        Self { kind, span, location, payload: None }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Get the text of this token from source
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }

    /// Integer value of a `NUM` token
    pub fn int_value(&self) -> Option<i32> {
        match self.payload {
            Some(Payload::Int(value)) => Some(value),
            _ => None,
        }
    }

    /// Name carried by a `VID` or `FID` token
    pub fn name(&self) -> Option<&str> {
        match &self.payload {
            Some(Payload::Name(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(Payload::Int(value)) => write!(f, "{}({})", self.kind, value),
            Some(Payload::Name(name)) => write!(f, "{}({})", self.kind, name),
            None => write!(f, "{}", self.kind),
        }
    }
}
