//! RPN Language Compiler
//!
//! A compiler for a postfix language written entirely in four letters:
//! `i` starts variable names, `I` starts function names, `1` writes unary
//! numerals and `l` spells keywords.
//!
//! # Architecture
//!
//! ```text
//! Source Code (.li)
//!       │
//!       ▼
//! ┌─────────────┐
//! │    Lexer    │  → Tokens
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Parser    │  → AST
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  IR Lowering│  → SSA IR
//! └─────────────┘
//!       │
//!       ├──────────────────┐
//!       ▼                  ▼
//! ┌─────────────┐   ┌─────────────┐
//! │  Code Gen   │   │ Interpreter │
//! └─────────────┘   └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Linker    │  → Executable
//! └─────────────┘
//! ```

pub mod lexer;
pub mod token;
pub mod span;
pub mod ast;
pub mod parser;
pub mod dump;
pub mod ir;
pub mod link;
pub mod diagnostic;
pub mod error;

use std::path::Path;

// Re-exports for convenience
pub use lexer::Lexer;
pub use token::{Token, TokenKind};
pub use span::{Location, Span};
pub use parser::Parser;
pub use error::CompileError;

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for source files
pub const FILE_EXTENSION: &str = "li";

/// Name of the function every program must define
pub const ENTRY_POINT: &str = "IIII";

/// What a command-line input path holds, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `.li` source
    Source,
    /// Object file produced by the backend
    Object,
}

impl InputKind {
    pub fn of(path: &Path) -> Option<InputKind> {
        let ext = path.extension()?;
        if ext == FILE_EXTENSION {
            Some(InputKind::Source)
        } else if ext == ir::OutputKind::Object.extension() {
            Some(InputKind::Object)
        } else {
            None
        }
    }
}

/// Parse and lower `source` into an IR module named `name`
pub fn compile(source: &str, name: &str) -> Result<ir::Module, CompileError> {
    let program = parser::parse(source, name)?;
    Ok(ir::lower(&program)?)
}
