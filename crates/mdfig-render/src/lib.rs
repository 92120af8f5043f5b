//! Pooled diagram rendering for mdfig.
//!
//! This crate turns diagram sources extracted from Markdown into images:
//!
//! - [`extract_diagrams`]: Finds fenced diagram blocks in a document
//! - [`SessionPool`]: Bounded pool of expensive rendering sessions with lazy
//!   creation, FIFO waiting, per-render timeouts and retirement of failing
//!   sessions
//! - [`RenderOrchestrator`]: Resolves the diagrams of one document through a
//!   shared [`RenderCache`] and pool, concurrently and in document order
//! - [`KrokiSessionFactory`]: Sessions backed by a Kroki server
//!
//! # Architecture
//!
//! - [`language`]: Diagram languages and their engine endpoints
//! - [`options`]: Render options that take part in the cache key
//! - [`diagram`]: `DiagramSource` and its fingerprint
//! - [`session`]: `RenderSession` / `SessionFactory` traits
//! - [`pool`]: The session pool
//! - [`orchestrator`]: Per-document orchestration, progress and cancellation
//! - [`kroki`]: Kroki HTTP sessions with `PlantUML` and SVG post-processing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mdfig_render::{
//!     DocumentRender, KrokiSessionFactory, PoolConfig, RenderCache, RenderOptions,
//!     RenderOrchestrator, SessionPool, extract_diagrams,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = KrokiSessionFactory::new("https://kroki.io", Duration::from_secs(30))?;
//! let pool = SessionPool::new(factory, PoolConfig::default())?;
//! let cache = Arc::new(RenderCache::new());
//! let orchestrator = RenderOrchestrator::new(Arc::clone(&cache), pool.clone());
//!
//! let diagrams = extract_diagrams("```mermaid\ngraph TD;A-->B\n```\n", &RenderOptions::default());
//! if let DocumentRender::Completed(results) =
//!     orchestrator.render_all("guide.md", &diagrams, None).await?
//! {
//!     assert_eq!(results.len(), 1);
//! }
//!
//! pool.shutdown();
//! cache.dispose();
//! # Ok(())
//! # }
//! ```

mod consts;
pub mod diagram;
mod error;
mod extract;
pub mod kroki;
pub mod language;
pub mod options;
pub mod orchestrator;
mod plantuml;
pub mod pool;
pub mod session;
mod svg;
#[cfg(test)]
mod test_support;

pub use consts::{
    DEFAULT_DPI, DEFAULT_MAX_FAILURES_BEFORE_RETIRE, DEFAULT_MAX_SESSIONS,
    DEFAULT_RENDER_TIMEOUT, STANDARD_DPI,
};
pub use diagram::{DiagramKey, DiagramSource};
pub use error::{DocumentError, ErrorKind, RenderError};
pub use extract::extract_diagrams;
pub use kroki::{KrokiSession, KrokiSessionFactory};
pub use language::DiagramLanguage;
pub use mdfig_cache::{CacheStats, Fingerprint, RenderCache};
pub use options::{Background, ImageFormat, RenderOptions, SizePolicy, Theme};
pub use orchestrator::{
    CancelHandle, DiagramResult, DocumentRender, DocumentSummary, ProgressSink, Rendered,
    RenderOrchestrator,
};
pub use pool::{PoolConfig, PoolConfigError, PoolStats, SessionPool};
pub use session::{RenderSession, SessionFactory, SessionId};
