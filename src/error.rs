use thiserror::Error;

use pest::Position;
use pest::error::ErrorVariant;

use crate::function::Rule;

#[derive(Error, Debug)]
pub enum OptabError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Syntax error: {message}")]
    Syntax { message: String, reason: String, line: Option<usize>, col: Option<usize> },
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Cyclic dependency between tables: {}", tables.join(", "))]
    Cycle { tables: Vec<String> },
    #[error("Dependency error: {0}")]
    Dependency(String),
    #[error("State error: {0}")]
    State(String),
    #[error("Dataframe error: {0}")]
    Dataframe(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OptabError>;

impl OptabError {
    /// Syntax error without a position yet, e.g. one raised while a value is
    /// being read and positioned by the reader afterwards.
    pub fn syntax(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Syntax { message: reason.clone(), reason, line: None, col: None }
    }
    /// Syntax error pointing at a 1-based line and byte column of `text`.
    pub fn syntax_at(text: &str, line: usize, col: usize, reason: impl Into<String>) -> Self {
        Self::syntax_at_offset(text, offset_of(text, line, col), reason)
    }
    /// Syntax error at a byte offset of `text`. The message carries the
    /// offending line with a caret under the position.
    pub fn syntax_at_offset(text: &str, offset: usize, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let position = Position::new(text, offset).unwrap_or_else(|| Position::from_start(text));
        let (line, col) = position.line_col();
        let error = pest::error::Error::<Rule>::new_from_pos(ErrorVariant::CustomError { message: reason.clone() }, position);
        Self::Syntax { message: error.to_string(), reason, line: Some(line), col: Some(col) }
    }
    pub fn line_col(&self) -> Option<(usize, usize)> {
        match self {
            Self::Syntax { line: Some(line), col: Some(col), .. } => Some((*line, *col)),
            _ => None,
        }
    }
}

/// Byte offset of a 1-based line and byte column, clamped to `text`.
fn offset_of(text: &str, line: usize, col: usize) -> usize {
    let start: usize = text.split_inclusive('\n').take(line.saturating_sub(1)).map(str::len).sum();
    let mut offset = (start + col.saturating_sub(1)).min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

// Helper conversions
impl From<rusqlite::Error> for OptabError {
    fn from(e: rusqlite::Error) -> Self { Self::Dataframe(e.to_string()) }
}
impl From<config::ConfigError> for OptabError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<pest::error::Error<Rule>> for OptabError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        Self::Syntax { message: e.to_string(), reason: e.variant.message().into_owned(), line: Some(line), col: Some(col) }
    }
}
impl From<serde_json::Error> for OptabError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() { Self::Io(e.into()) } else { Self::State(e.to_string()) }
    }
}
