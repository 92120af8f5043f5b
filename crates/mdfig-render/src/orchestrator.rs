//! Per-document render orchestration.
//!
//! [`RenderOrchestrator::render_all`] takes the diagrams of one document and
//! resolves each one: cache hit, pooled render, or error. All diagrams run
//! concurrently; results come back in document order regardless of which
//! render finishes first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use mdfig_cache::{Fingerprint, ImageFormat, RenderCache};
use tokio::sync::watch;

use crate::diagram::DiagramSource;
use crate::error::{DocumentError, ErrorKind, RenderError};
use crate::pool::SessionPool;
use crate::session::SessionFactory;

/// A successfully resolved diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Arc<[u8]>,
    pub format: ImageFormat,
    /// Whether the bytes came from the cache without touching the pool.
    pub from_cache: bool,
}

impl Rendered {
    /// Bytes as a `data:` URI, for inlining into HTML or Markdown.
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            BASE64_STANDARD.encode(&self.bytes)
        )
    }
}

/// Outcome for one diagram. Failures never affect sibling diagrams.
pub type DiagramResult = Result<Rendered, RenderError>;

/// Outcome of [`RenderOrchestrator::render_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRender {
    /// One result per input diagram, in input order.
    Completed(Vec<DiagramResult>),
    /// The document was cancelled before every diagram resolved.
    Cancelled,
}

/// Counts over a completed document, for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentSummary {
    pub rendered: usize,
    pub cached: usize,
    pub failed: usize,
}

impl DocumentSummary {
    #[must_use]
    pub fn from_results(results: &[DiagramResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            match result {
                Ok(rendered) if rendered.from_cache => summary.cached += 1,
                Ok(_) => summary.rendered += 1,
                Err(_) => summary.failed += 1,
            }
            summary
        })
    }
}

/// Receives progress updates while a document renders.
///
/// `report` is called once per diagram as it resolves, in completion order,
/// with a percentage that never decreases and reaches 100 on the last call.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, percent: u8);
}

impl<T> ProgressSink for T
where
    T: Fn(&str, u8) + Send + Sync,
{
    fn report(&self, message: &str, percent: u8) {
        self(message, percent);
    }
}

/// Cooperative cancellation signal shared between a caller and orchestrators.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns
        // once the flag is set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Diagrams of one document sharing a fingerprint, rendered once.
struct Group<'a> {
    fingerprint: Fingerprint,
    diagram: &'a DiagramSource,
    positions: Vec<usize>,
}

/// Renders the diagrams of a document through a shared cache and pool.
pub struct RenderOrchestrator<F: SessionFactory> {
    cache: Arc<RenderCache>,
    pool: SessionPool<F>,
    cancel: CancelHandle,
}

impl<F: SessionFactory> RenderOrchestrator<F> {
    #[must_use]
    pub fn new(cache: Arc<RenderCache>, pool: SessionPool<F>) -> Self {
        Self {
            cache,
            pool,
            cancel: CancelHandle::new(),
        }
    }

    /// Use an externally owned cancellation handle.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Render every diagram of a document.
    ///
    /// Each diagram is looked up in the cache by fingerprint; misses are
    /// rendered on the pool and stored. Identical diagrams within the
    /// document are rendered once. A failed diagram gets its own error and
    /// no retry.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::PoolUnavailable`] if the pool reports that no
    /// session exists and none can be created.
    pub async fn render_all(
        &self,
        document_id: &str,
        diagrams: &[DiagramSource],
        progress: Option<&dyn ProgressSink>,
    ) -> Result<DocumentRender, DocumentError> {
        let start = Instant::now();
        let total = diagrams.len();
        if self.cancel.is_cancelled() {
            return Ok(DocumentRender::Cancelled);
        }

        let groups = group_by_fingerprint(diagrams);
        let mut pending: FuturesUnordered<_> = groups
            .iter()
            .enumerate()
            .map(move |(group_index, group)| async move {
                (group_index, self.resolve(group).await)
            })
            .collect();

        let mut results: Vec<Option<DiagramResult>> = vec![None; total];
        let mut completed = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::info!(document = document_id, completed, total, "Document render cancelled");
                    return Ok(DocumentRender::Cancelled);
                }
                next = pending.next() => next,
            };
            let Some((group_index, result)) = next else {
                break;
            };

            if let Err(err) = &result
                && err.kind == ErrorKind::SessionCreate
            {
                return Err(DocumentError::PoolUnavailable {
                    document_id: document_id.to_owned(),
                    source: err.clone(),
                });
            }

            for &position in &groups[group_index].positions {
                results[position] = Some(result.clone());
                completed += 1;
                if let Some(sink) = progress {
                    let index = diagrams[position].index;
                    sink.report(
                        &format!("Rendered diagram {index} ({completed}/{total})"),
                        percent(completed, total),
                    );
                }
            }
        }

        let results: Vec<DiagramResult> = results
            .into_iter()
            .map(|result| result.unwrap_or_else(|| Err(RenderError::cancelled())))
            .collect();

        let summary = DocumentSummary::from_results(&results);
        tracing::info!(
            document = document_id,
            diagrams = total,
            unique = groups.len(),
            rendered = summary.rendered,
            cached = summary.cached,
            failed = summary.failed,
            elapsed_ms = start.elapsed().as_millis(),
            "Document diagrams resolved"
        );

        Ok(DocumentRender::Completed(results))
    }

    async fn resolve(&self, group: &Group<'_>) -> DiagramResult {
        let format = group.diagram.options.format;
        if let Some(entry) = self.cache.lookup(&group.fingerprint) {
            return Ok(Rendered {
                bytes: Arc::clone(&entry.bytes),
                format: entry.format,
                from_cache: true,
            });
        }

        let bytes: Arc<[u8]> = self.pool.submit(group.diagram).await?.into();
        self.cache.insert(group.fingerprint, Arc::clone(&bytes), format);
        Ok(Rendered {
            bytes,
            format,
            from_cache: false,
        })
    }
}

/// Group diagrams by fingerprint in first-occurrence order.
fn group_by_fingerprint(diagrams: &[DiagramSource]) -> Vec<Group<'_>> {
    let mut groups: Vec<Group<'_>> = Vec::new();
    let mut by_fingerprint: HashMap<Fingerprint, usize> = HashMap::new();

    for (position, diagram) in diagrams.iter().enumerate() {
        let fingerprint = diagram.fingerprint();
        match by_fingerprint.get(&fingerprint) {
            Some(&group) => groups[group].positions.push(position),
            None => {
                by_fingerprint.insert(fingerprint, groups.len());
                groups.push(Group {
                    fingerprint,
                    diagram,
                    positions: vec![position],
                });
            }
        }
    }
    groups
}

#[allow(clippy::cast_possible_truncation)]
fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed * 100 / total).min(100) as u8
}
