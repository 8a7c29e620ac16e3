//! Error types shared by the DOM and the XPath engine.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Location of a byte in a source document or expression.
///
/// Lines and columns are 1-based; the offset is a 0-based byte index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Position {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Every recoverable failure surfaced by this crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Insertion would break the tree shape: a cycle, a child kind the
    /// container does not permit, or a second document element.
    #[error("hierarchy request error: {0}")]
    HierarchyRequest(String),

    /// A node from another document was used without adoption.
    #[error("wrong document: {0}")]
    WrongDocument(String),

    /// The reference node is not a child of the container.
    #[error("not found: {0}")]
    NotFound(String),

    /// A name contains characters disallowed by XML Names.
    #[error("invalid character in name {0:?}")]
    InvalidCharacter(String),

    /// An iterator was consumed after its underlying document changed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A qualified name is inconsistent with its namespace URI.
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Ill-formed XML or XPath source.
    #[error("parse error at {position}: {message}")]
    Parse { position: Position, message: String },

    /// An XPath result cannot be coerced to the requested result type.
    #[error("type error: {0}")]
    Type(String),

    #[error("unresolved function {0}()")]
    UnresolvedFunction(String),

    #[error("unresolved variable ${0}")]
    UnresolvedVariable(String),

    #[error("unresolved namespace prefix {0:?}")]
    UnresolvedNamespace(String),
}

impl Error {
    pub(crate) fn parse(position: Position, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_position() {
        let err = Error::parse(Position::new(3, 7, 42), "unexpected token");
        assert_eq!(
            err.to_string(),
            "parse error at 3:7: unexpected token"
        );
    }

    #[test]
    fn position_display() {
        assert_eq!(Position::new(1, 1, 0).to_string(), "1:1");
    }
}
