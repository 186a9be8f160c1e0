//! # Error Types
//!
//! Typed errors raised by the core. Everything above the core wraps these in
//! `anyhow::Error`; callers that need the captured output of a failed command
//! downcast back to [`CiError::CommandFailed`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CiError {
    /// An axis had to be drawn at random but its catalog is empty.
    #[error("the `{axis}` axis catalog is empty, cannot choose a value")]
    EmptyCatalog { axis: &'static str },

    /// The OS of a matrix cell has no entry in the host table.
    #[error("no execution host is configured for OS \"{os}\"")]
    UnknownHost { os: String },

    /// A POSIX path could not be expressed in the target's native syntax.
    #[error("cannot translate `{path}` into a {platform} path: {reason}")]
    PathTranslation {
        path: String,
        platform: &'static str,
        reason: &'static str,
    },

    /// A command asked for a POSIX shell on a target that does not offer one.
    #[error("the {platform} target has no POSIX shell configured")]
    NoPosixShell { platform: &'static str },

    /// An argument cannot be quoted for a POSIX shell (it contains a NUL byte).
    #[error("argument {arg:?} cannot be quoted for a POSIX shell")]
    Unquotable { arg: String },

    /// A checked external command exited unsuccessfully.
    #[error("command `{command}` failed ({status})")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    /// `return-code.txt` did not hold a single decimal integer.
    #[error("invalid return code {content:?} in {path}")]
    InvalidReturnCode { path: String, content: String },
}

impl CiError {
    /// Returns the captured process output for command failures.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            CiError::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
