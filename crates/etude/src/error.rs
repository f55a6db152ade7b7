use crate::lexer::LexLocation;

/// Failure raised anywhere in the compilation pipeline. Syntax and semantic
/// errors carry the location of the offending token; I/O-level failures
/// (an import that cannot be read) do not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("{message}")]
    Located { message: String, location: LexLocation },
    #[error("{message}")]
    Unlocated { message: String },
}

impl CompileError {
    pub fn located(message: impl Into<String>, location: LexLocation) -> Self {
        CompileError::Located { message: message.into(), location }
    }

    pub fn unlocated(message: impl Into<String>) -> Self {
        CompileError::Unlocated { message: message.into() }
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::Located { message, .. } => message,
            CompileError::Unlocated { message } => message,
        }
    }

    pub fn location(&self) -> Option<LexLocation> {
        match self {
            CompileError::Located { location, .. } => Some(*location),
            CompileError::Unlocated { .. } => None,
        }
    }
}
