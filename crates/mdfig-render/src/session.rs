//! Rendering session traits.
//!
//! A session is one live rendering context (an engine process, a browser tab,
//! an HTTP client bound to a server). Sessions are expensive to create, so
//! the [`SessionPool`](crate::SessionPool) keeps them around and hands them
//! out one render at a time.

use std::fmt;
use std::future::Future;

use crate::diagram::DiagramSource;
use crate::error::RenderError;

/// Pool-assigned session identifier, unique for the lifetime of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One live rendering context.
///
/// `render` takes `&mut self`, so a session never renders two diagrams at
/// once. The pool owns every session it creates and calls `dispose` exactly
/// once before dropping it.
pub trait RenderSession: Send + 'static {
    /// Render a diagram to image bytes in `diagram.options.format`.
    ///
    /// Fails with [`ErrorKind::Render`](crate::ErrorKind::Render) for
    /// malformed sources or engine failures. The future may be dropped at any
    /// await point (timeout or cancellation); the session is then disposed.
    fn render(
        &mut self,
        diagram: &DiagramSource,
    ) -> impl Future<Output = Result<Vec<u8>, RenderError>> + Send;

    /// Release engine resources. Must be idempotent.
    fn dispose(&mut self);
}

/// Creates sessions on demand.
pub trait SessionFactory: Send + Sync + 'static {
    type Session: RenderSession;

    /// Start a new session.
    ///
    /// Fails with [`ErrorKind::SessionCreate`](crate::ErrorKind::SessionCreate)
    /// when the engine cannot be started.
    fn create(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Self::Session, RenderError>> + Send;
}
