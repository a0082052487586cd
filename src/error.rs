//! Error types for the scripting console.

use thiserror::Error;

/// Errors that can occur while compiling or running a submitted fragment,
/// or while talking to an external collaborator.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The fragment was rejected before execution (lex/parse failure or a
    /// construct outside the sandboxed grammar).
    #[error("compile error: {0}")]
    Compile(String),

    /// The fragment raised an unhandled error during evaluation, including
    /// import-gate rejections.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The execution exceeded the configured deadline.
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Evaluation exceeded the configured step budget.
    #[error("evaluation ran out of fuel after {consumed} steps")]
    OutOfFuel {
        /// Number of evaluation steps consumed before running out.
        consumed: u64,
    },

    /// No session exists for the named identity.
    #[error("no environment exists for {0}")]
    UnknownIdentity(String),

    /// The paste-service upload failed.
    #[error("paste upload failed: {0}")]
    PasteUpload(#[source] anyhow::Error),

    /// Fetching remote source text failed.
    #[error("failed to fetch url: {0}")]
    Fetch(#[source] anyhow::Error),
}

impl SandboxError {
    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Check if this error represents a compile-stage rejection.
    pub fn is_compile(&self) -> bool {
        matches!(self, SandboxError::Compile(_))
    }

    /// Check if this error represents a runtime failure.
    pub fn is_runtime(&self) -> bool {
        matches!(self, SandboxError::Runtime(_))
    }

    /// Check if this error represents an out-of-fuel condition.
    pub fn is_out_of_fuel(&self) -> bool {
        matches!(self, SandboxError::OutOfFuel { .. })
    }
}

/// Result type alias for console operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let timeout = SandboxError::Timeout(std::time::Duration::from_secs(5));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_compile());
        assert!(!timeout.is_runtime());

        let compile = SandboxError::Compile("unexpected token".to_string());
        assert!(compile.is_compile());
        assert!(!compile.is_timeout());

        let fuel = SandboxError::OutOfFuel { consumed: 1000 };
        assert!(fuel.is_out_of_fuel());
        assert!(!fuel.is_runtime());
    }

    #[test]
    fn test_display_messages() {
        let runtime = SandboxError::Runtime("division by zero".to_string());
        assert_eq!(runtime.to_string(), "runtime error: division by zero");

        let unknown = SandboxError::UnknownIdentity("alice".to_string());
        assert!(unknown.to_string().contains("alice"));
    }
}
