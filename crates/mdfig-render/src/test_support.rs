//! Instrumented fake sessions for pool and orchestrator tests.
//!
//! Render behaviour is chosen by the diagram source:
//!
//! - `hang...` never completes
//! - `fail...` or `not a real diagram...` fails with a render error
//! - `slow:<ms>` sleeps for `<ms>` milliseconds, then succeeds
//! - anything else sleeps for [`DEFAULT_DELAY`], then succeeds
//!
//! Successful renders return `rendered:<source>`.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::diagram::DiagramSource;
use crate::error::RenderError;
use crate::session::{RenderSession, SessionFactory, SessionId};

pub(crate) const DEFAULT_DELAY: Duration = Duration::from_millis(50);

/// Shared counters observed by tests.
#[derive(Default)]
pub(crate) struct Probe {
    pub created: AtomicUsize,
    pub disposed: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub fail_create: AtomicBool,
    /// How long `create` takes, in milliseconds. Zero only yields.
    pub create_delay_ms: AtomicU64,
    log: Mutex<Vec<String>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sources passed to `render`, in call order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Number of `render` calls so far.
    pub fn rendered(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

pub(crate) struct FakeFactory {
    probe: Arc<Probe>,
}

impl FakeFactory {
    pub fn new(probe: &Arc<Probe>) -> Self {
        Self {
            probe: Arc::clone(probe),
        }
    }
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn create(&self, id: SessionId) -> Result<FakeSession, RenderError> {
        match self.probe.create_delay_ms.load(Ordering::SeqCst) {
            0 => tokio::task::yield_now().await,
            ms => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        if self.probe.fail_create.load(Ordering::SeqCst) {
            return Err(RenderError::session_create("engine failed to start"));
        }
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            id,
            probe: Arc::clone(&self.probe),
            disposed: false,
        })
    }
}

pub(crate) struct FakeSession {
    #[allow(dead_code)]
    id: SessionId,
    probe: Arc<Probe>,
    disposed: bool,
}

/// Decrements the active counter even when the render future is dropped.
struct ActiveGuard<'a>(&'a Probe);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RenderSession for FakeSession {
    async fn render(&mut self, diagram: &DiagramSource) -> Result<Vec<u8>, RenderError> {
        assert!(!self.disposed, "render on a disposed session");
        let source = diagram.source.as_str();
        self.probe.log.lock().unwrap().push(source.to_owned());

        let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.probe);

        if source.starts_with("hang") {
            std::future::pending::<()>().await;
        }
        if source.starts_with("fail") || source.starts_with("not a real diagram") {
            tokio::time::sleep(DEFAULT_DELAY).await;
            return Err(RenderError::render("syntax error"));
        }
        let delay = source
            .strip_prefix("slow:")
            .and_then(|ms| ms.parse().ok())
            .map_or(DEFAULT_DELAY, Duration::from_millis);
        tokio::time::sleep(delay).await;

        Ok(format!("rendered:{source}").into_bytes())
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.probe.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
