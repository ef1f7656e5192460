//! Code generation error types.

use crate::diagnostics::SourceLocation;

/// An error raised while lowering the AST to IR. `Logic` covers every
/// semantic problem caught during codegen (undeclared names, type
/// mismatches, unresolved gotos); `Format` only ever comes from the
/// `writeln!` calls into the IR buffer, which can't actually fail for an
/// in-memory `String` but still need to be threaded through `?`.
#[derive(Debug, thiserror::Error)]
pub enum CodeGenError {
    #[error("{loc}: error: {message}")]
    Logic {
        message: String,
        loc: SourceLocation,
    },
    #[error("IR generation error: {0}")]
    Format(#[from] std::fmt::Error),
}

impl CodeGenError {
    pub fn logic(message: impl Into<String>, loc: SourceLocation) -> Self {
        CodeGenError::Logic {
            message: message.into(),
            loc,
        }
    }
}
