use std::fmt;
use std::io;

use thiserror::Error;

/// Which side of a bracket pair was left unmatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketSide {
    Open,
    Close,
}

impl fmt::Display for BracketSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketSide::Open => f.write_str("["),
            BracketSide::Close => f.write_str("]"),
        }
    }
}

/// Errors produced while turning source text into an executable.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The program's brackets do not pair up. `offset` is the byte offset of
    /// the offending bracket: the stray `]`, or the innermost pending `[`.
    #[error("malformed program: unmatched '{side}' at {offset}")]
    UnmatchedBracket { side: BracketSide, offset: usize },

    /// The external code generator rejected the lowered function.
    #[error("code generation failed: {0}")]
    Codegen(String),

    /// The JIT runtime cannot produce native code for this host.
    #[error("jit unavailable: {0}")]
    JitUnavailable(String),
}

/// Errors produced while running an executable.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The executable was compiled by a different machine.
    #[error("executable does not belong to this machine")]
    BackendMismatch,

    /// A byte-in or byte-out callback failed; the error is passed through
    /// unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::{BracketSide, CompileError};

    #[test]
    fn test_unmatched_bracket_message() {
        let err = CompileError::UnmatchedBracket {
            side: BracketSide::Close,
            offset: 7,
        };
        assert_eq!(err.to_string(), "malformed program: unmatched ']' at 7");

        let err = CompileError::UnmatchedBracket {
            side: BracketSide::Open,
            offset: 0,
        };
        assert_eq!(err.to_string(), "malformed program: unmatched '[' at 0");
    }
}
