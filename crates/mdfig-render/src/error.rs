//! Render error types.
//!
//! Per-diagram failures are a single [`RenderError`] carrying an
//! [`ErrorKind`] tag, so callers can match exhaustively on the kind without
//! inspecting types. Document-level failures are [`DocumentError`].

use std::fmt;
use std::time::Duration;

/// Kind of a per-diagram render failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The rendering engine could not be started for a new session.
    SessionCreate,
    /// The diagram could not be rendered (malformed source, engine failure).
    Render,
    /// The render exceeded the per-render timeout.
    Timeout,
    /// The pool was shut down before the request was served.
    PoolShutdown,
    /// The document conversion was cancelled.
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCreate => "session create error",
            Self::Render => "render error",
            Self::Timeout => "timeout",
            Self::PoolShutdown => "pool shut down",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-diagram render failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RenderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RenderError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn session_create(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionCreate, message)
    }

    #[must_use]
    pub fn render(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Render, message)
    }

    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("render exceeded {}ms", limit.as_millis()),
        )
    }

    #[must_use]
    pub fn pool_shutdown() -> Self {
        Self::new(ErrorKind::PoolShutdown, "session pool is shut down")
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "document conversion cancelled")
    }
}

/// Document-level failure of [`RenderOrchestrator::render_all`](crate::RenderOrchestrator::render_all).
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// No rendering session exists and none can be created.
    #[error("document {document_id}: no render session available: {source}")]
    PoolUnavailable {
        document_id: String,
        #[source]
        source: RenderError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = RenderError::render("HTTP 400: Syntax error in graph");
        assert_eq!(err.to_string(), "render error: HTTP 400: Syntax error in graph");
    }

    #[test]
    fn test_timeout_message() {
        let err = RenderError::timeout(Duration::from_secs(2));
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.message, "render exceeded 2000ms");
    }

    #[test]
    fn test_document_error_display() {
        let err = DocumentError::PoolUnavailable {
            document_id: "guide.md".to_owned(),
            source: RenderError::session_create("connection refused"),
        };
        assert_eq!(
            err.to_string(),
            "document guide.md: no render session available: session create error: connection refused"
        );
    }
}
