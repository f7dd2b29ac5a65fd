//! Caret diagnostics
//!
//! Renders a located error as
//!
//! ```text
//! Parse error: expected expression, found RBRACE
//! At location 3:12
//! lI1i IIII 111 l1Ii
//!                ^
//! ```

use std::fmt;

use crate::span::{LineIndex, Location};

/// Longest source line echoed back, in bytes
pub const MAX_LINE_LEN: usize = 255;

/// A rendered-on-demand error report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    stage: &'static str,
    message: String,
    location: Option<Location>,
}

impl Diagnostic {
    pub fn new(stage: &'static str, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            stage,
            message: message.into(),
            location,
        }
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Header line, e.g. `Lex error: unknown keyword "llll"`
    pub fn header(&self) -> String {
        format!("{} error: {}", self.stage, self.message)
    }

    /// Full report with the offending source line and a caret
    pub fn render(&self, source: &str) -> String {
        let mut out = self.header();
        let Some(location) = self.location else {
            return out;
        };

        out.push_str(&format!("\nAt location {}", location));

        let offset = location.offset.min(source.len());
        let start = LineIndex::new(source).line_start(offset);
        let line = source_line(&source[start..]);
        out.push('\n');
        out.push_str(line);
        out.push('\n');

        // Tabs are echoed so the caret lines up in a terminal
        let pad: String = line
            .chars()
            .take(location.column.saturating_sub(1) as usize)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        let missing = (location.column.saturating_sub(1) as usize).saturating_sub(pad.chars().count());
        out.push_str(&pad);
        out.push_str(&" ".repeat(missing));
        out.push('^');
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())?;
        if let Some(location) = self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

/// The line starting at `rest`, without its terminator, cut at
/// [`MAX_LINE_LEN`] bytes on a char boundary
fn source_line(rest: &str) -> &str {
    let line = rest.split(['\n', '\r']).next().unwrap_or_default();
    if line.len() <= MAX_LINE_LEN {
        return line;
    }
    let mut end = MAX_LINE_LEN;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
