//! Pipeline-wide error type

use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::ir::{BackendError, InterpError, LowerError};
use crate::lexer::LexError;
use crate::link::LinkError;
use crate::parser::ParseError;
use crate::span::Location;

/// Any failure between reading source and producing an executable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(ParseError),

    #[error(transparent)]
    Lower(#[from] LowerError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Interp(#[from] InterpError),
}

// Lexer failures surfaced through the parser keep their own stage
impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Lex(err) => CompileError::Lex(err),
            other => CompileError::Parse(other),
        }
    }
}

impl CompileError {
    /// Stage name used in diagnostic headers
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Lex(_) => "Lex",
            CompileError::Parse(_) => "Parse",
            CompileError::Lower(_) => "IR translation",
            CompileError::Backend(_) => "Codegen",
            CompileError::Link(_) => "Link",
            CompileError::Interp(_) => "Runtime",
        }
    }

    /// Source location, for errors tied to the program text
    pub fn location(&self) -> Option<Location> {
        match self {
            CompileError::Lex(err) => Some(err.location()),
            CompileError::Parse(err) => Some(err.location()),
            CompileError::Lower(err) => Some(err.location()),
            CompileError::Backend(_) | CompileError::Link(_) | CompileError::Interp(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.stage(), self.to_string(), self.location())
    }

    /// Render with the offending line of `source` and a caret
    pub fn render(&self, source: &str) -> String {
        self.diagnostic().render(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    #[test]
    fn test_lex_errors_keep_their_stage() {
        let err = compile("li1I l1iI lI1i IIII 1i l1ii l1Ii", "demo").unwrap_err();
        assert!(matches!(err, CompileError::Lex(LexError::ExpectedUnits { .. })));
        assert_eq!(err.stage(), "Lex");
        assert_eq!(err.location().map(|l| l.column), Some(22));
    }

    #[test]
    fn test_render_parse_error() {
        let source = "li1I l1iI\nlI1i IIII 111 l1Ii";
        let err = compile(source, "demo").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
        let rendered = err.render(source);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "Parse error: expected expression, found RBRACE");
        assert_eq!(lines[1], "At location 2:15");
        assert_eq!(lines[2], "lI1i IIII 111 l1Ii");
        assert_eq!(lines[3], format!("{}^", " ".repeat(14)));
    }

    #[test]
    fn test_lower_error_has_location() {
        let err = compile("li1I l1iI lI1i IIII ii l1ii l1Ii", "demo").unwrap_err();
        assert!(matches!(err, CompileError::Lower(LowerError::UnknownVariable { .. })));
        assert_eq!(err.location().map(|l| (l.line, l.column)), Some((1, 21)));
    }

    #[test]
    fn test_link_error_has_no_location() {
        let err = CompileError::from(LinkError::Failed {
            driver: "cc".into(),
            status: "exit status: 1".into(),
        });
        assert_eq!(err.location(), None);
        assert_eq!(err.render(""), "Link error: linker `cc` failed with exit status: 1");
    }
}
