//! Uniform error taxonomy for the reader.
//!
//! Every fallible path in the crate funnels into [`Error`]; callers match on a closed
//! set of variants rather than parsing strings. Lex/parse errors carry a [`Location`] so
//! their `Display` impl reproduces the `<file>(<line>): <msg>` caret-pointer format.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A point in a source file: the 1-based line, the 0-based column, and the line's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
    pub line_text: String,
}

impl Location {
    pub(crate) fn new(line: usize, col: usize, line_text: impl Into<String>) -> Self {
        Self { line, col, line_text: line_text.into() }
    }
}

/// A message annotated with where in the file it occurred.
///
/// `filename` is carried per-instance (never a global), so two loads on different
/// threads never clash over where an error "happened".
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedMessage {
    pub filename: Option<PathBuf>,
    pub message: String,
    pub location: Option<Location>,
}

impl LocatedMessage {
    pub(crate) fn new(
        filename: Option<PathBuf>,
        message: impl Into<String>,
        location: Option<Location>,
    ) -> Self {
        Self { filename, message: message.into(), location }
    }
}

impl fmt::Display for LocatedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc_prefix = match (&self.filename, &self.location) {
            (Some(path), Some(loc)) => format!("{}({}): ", path.display(), loc.line),
            (Some(path), None) => format!("{}: ", path.display()),
            (None, Some(loc)) => format!("{}: ", loc.line),
            (None, None) => String::new(),
        };
        write!(f, "{loc_prefix}{}", self.message)?;
        if let Some(loc) = &self.location {
            write!(f, "\n    {}\n    {}^", loc.line_text, " ".repeat(loc.col))?;
        }
        Ok(())
    }
}

/// Every way a `load()` call, or subsequent lookup, can fail.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown uppercase keyword or illegal character during tokenizing.
    #[error("{0}")]
    Lex(LocatedMessage),

    /// Syntax error at a token, or premature end of content.
    #[error("{0}")]
    Parse(LocatedMessage),

    /// File missing, unreadable, or permission denied.
    #[error("I/O error reading {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    /// Non-UTF-8 bytes, most likely a binary PSF file.
    #[error(
        "{path}: not valid UTF-8; this is likely a binary PSF file, \
         which is not supported. Convert it to ASCII PSF first."
    )]
    Encoding { path: PathBuf },

    /// `get_signal` was called with a name that isn't in the dataset.
    #[error("unknown signal: {name}")]
    UnknownSignal { name: String, available: Vec<String> },

    /// Shape mismatch between traces and values, duplicate signal names, or an
    /// over-long group.
    #[error("{0}")]
    Integrity(String),
}
