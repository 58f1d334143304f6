//! Crate-wide error type. Each layer keeps its own error enum; `CobraError`
//! wraps them so the pipeline can propagate any of them with `?`.

use thiserror::Error;

use crate::core::interpreter::RuntimeError;
use crate::core::lexer::LexError;
use crate::core::limits::ResourceError;
use crate::core::parser::ParseError;
use crate::core::resolver::ResolveError;
use crate::core::security::DangerousPrimitiveError;
use crate::core::semantic_analyzer::SemanticError;

#[derive(Debug, Error)]
pub enum CobraError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Security(#[from] DangerousPrimitiveError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CobraError {
    /// Short label used by the CLI when printing diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            CobraError::Lex(_) => "lex error",
            CobraError::Parse(_) => "parse error",
            CobraError::Semantic(_) => "semantic error",
            CobraError::Security(_) => "security error",
            CobraError::Resource(_) => "resource error",
            CobraError::Runtime(_) => "runtime error",
            CobraError::Resolve(_) => "import error",
            CobraError::Config(_) => "config error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_error_converts_and_keeps_message() {
        let err: CobraError = LexError::InvalidCharacter { ch: '$', line: 1, column: 4 }.into();
        assert_eq!(err.kind(), "lex error");
        assert_eq!(format!("{}", err), "Invalid character '$' at 1:4");
    }

    #[test]
    fn resource_error_display() {
        let err: CobraError = ResourceError::NodeLimit { count: 12, limit: 10 }.into();
        assert_eq!(err.kind(), "resource error");
        assert!(format!("{}", err).contains("12"));
    }
}
