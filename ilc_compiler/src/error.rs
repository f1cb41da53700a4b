//! Compiler error types.

use ilc_il::ILReadError;
use std::fmt;

/// A core library member required by a stub could not be resolved.
///
/// Stubs cannot be emitted without these members, so this is a build
/// configuration error for the method being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubError {
    MissingType {
        /// Method whose body was being synthesized.
        method: String,
        namespace: &'static str,
        name: &'static str,
    },
    MissingMethod {
        method: String,
        owner: String,
        name: &'static str,
        generic: bool,
    },
}

impl StubError {
    /// Method whose body was being synthesized.
    pub fn method(&self) -> &str {
        match self {
            StubError::MissingType { method, .. } | StubError::MissingMethod { method, .. } => method,
        }
    }
}

impl fmt::Display for StubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubError::MissingType {
                method,
                namespace,
                name,
            } => write!(
                f,
                "cannot build stub for {}: type {}.{} is missing from the core library",
                method, namespace, name
            ),
            StubError::MissingMethod {
                method,
                owner,
                name,
                generic,
            } => write!(
                f,
                "cannot build stub for {}: {}method {}.{} is missing from the core library",
                method,
                if *generic { "generic " } else { "" },
                owner,
                name
            ),
        }
    }
}

impl std::error::Error for StubError {}

/// Compilation failure for one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A stub body could not be synthesized.
    Stub(StubError),
    /// An authored or wrapped body could not be decoded.
    InvalidIL { method: String, error: ILReadError },
}

impl CompileError {
    /// Method the error is attributed to.
    pub fn method(&self) -> &str {
        match self {
            CompileError::Stub(e) => e.method(),
            CompileError::InvalidIL { method, .. } => method,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Stub(e) => write!(f, "{}", e),
            CompileError::InvalidIL { method, error } => write!(f, "invalid IL in {}: {}", method, error),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Stub(e) => Some(e),
            CompileError::InvalidIL { error, .. } => Some(error),
        }
    }
}

impl From<StubError> for CompileError {
    fn from(e: StubError) -> Self {
        CompileError::Stub(e)
    }
}

/// Result alias for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;
