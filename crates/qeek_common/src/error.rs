//! Error types for Qeek.

use thiserror::Error;

/// How a completion-service call failed. The conversation never surfaces
/// these to the user; each kind maps to a fixed fallback sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Network,
    Timeout,
    Unknown,
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayErrorKind::Network => write!(f, "network"),
            GatewayErrorKind::Timeout => write!(f, "timeout"),
            GatewayErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Error, Debug)]
pub enum QeekError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Gateway failure ({0})")]
    Gateway(GatewayErrorKind),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QeekError {
    /// Whether this error may abort the operation that raised it.
    /// Gateway and parse failures are always best-effort: the orchestrator
    /// substitutes a fallback instead of propagating them.
    pub fn is_critical(&self) -> bool {
        !matches!(self, QeekError::Gateway(_) | QeekError::Parse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_are_best_effort() {
        assert!(!QeekError::Gateway(GatewayErrorKind::Timeout).is_critical());
        assert!(!QeekError::Parse("bad shape".into()).is_critical());
        assert!(QeekError::Store("insert failed".into()).is_critical());
        assert!(QeekError::Validation("empty title".into()).is_critical());
    }
}
