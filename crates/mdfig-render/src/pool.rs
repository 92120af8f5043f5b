//! Bounded pool of rendering sessions.
//!
//! The pool owns up to `max_sessions` live sessions and lends them out one
//! render at a time:
//!
//! - an idle session is handed out immediately;
//! - otherwise, while below capacity, a new session is created lazily;
//! - otherwise the request waits in a strict FIFO queue and receives the next
//!   session that becomes available.
//!
//! Every session is wrapped in a [`Slot`] whose `Drop` disposes it, and every
//! unit of capacity handed out is tracked by a guard ([`Lease`] or
//! [`CreatePermit`]) that gives it back on drop. This keeps the accounting
//! right on every exit path, including timeouts and futures dropped by a
//! cancelled caller.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Guards are never dropped while the lock is held, since their
//! `Drop` takes it again.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::consts::{
    DEFAULT_MAX_FAILURES_BEFORE_RETIRE, DEFAULT_MAX_SESSIONS, DEFAULT_RENDER_TIMEOUT,
};
use crate::diagram::DiagramSource;
use crate::error::RenderError;
use crate::session::{RenderSession, SessionFactory, SessionId};

/// Pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of live sessions (and concurrent renders).
    pub max_sessions: usize,
    /// Per-render timeout. A session that exceeds it is disposed.
    ///
    /// The pool drops the render future but cannot stop work the session
    /// already handed to a thread. A Kroki request keeps running until its
    /// own request timeout, so the engine may briefly see more than
    /// `max_sessions` requests while a replacement session starts.
    pub render_timeout: Duration,
    /// Consecutive render failures after which a session is disposed.
    pub max_failures_before_retire: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            max_failures_before_retire: DEFAULT_MAX_FAILURES_BEFORE_RETIRE,
        }
    }
}

impl PoolConfig {
    /// Check configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`PoolConfigError`] for zero sessions, a zero timeout, or a
    /// zero failure threshold.
    pub fn validate(&self) -> Result<(), PoolConfigError> {
        if self.max_sessions == 0 {
            return Err(PoolConfigError::ZeroSessions);
        }
        if self.render_timeout.is_zero() {
            return Err(PoolConfigError::ZeroTimeout);
        }
        if self.max_failures_before_retire == 0 {
            return Err(PoolConfigError::ZeroFailureThreshold);
        }
        Ok(())
    }
}

/// Invalid [`PoolConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolConfigError {
    #[error("max_sessions must be at least 1")]
    ZeroSessions,
    #[error("render_timeout must be greater than zero")]
    ZeroTimeout,
    #[error("max_failures_before_retire must be at least 1")]
    ZeroFailureThreshold,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Sessions alive or being created.
    pub live: usize,
    /// Sessions waiting for work.
    pub idle: usize,
    /// Requests waiting for a session.
    pub queued: usize,
}

/// A live session plus the bookkeeping the pool keeps for it.
struct Slot<S: RenderSession> {
    id: SessionId,
    session: S,
    consecutive_failures: u32,
}

impl<S: RenderSession> Drop for Slot<S> {
    fn drop(&mut self) {
        self.session.dispose();
        tracing::debug!(session = %self.id, "Render session disposed");
    }
}

/// What a queued request is handed.
enum Grant<S: RenderSession> {
    Session(Lease<S>),
    Create(CreatePermit<S>),
}

/// Outcome of asking for a session.
enum Ticket<S: RenderSession> {
    Ready(Grant<S>),
    Queued(oneshot::Receiver<Grant<S>>),
}

struct State<S: RenderSession> {
    idle: VecDeque<Slot<S>>,
    waiters: VecDeque<oneshot::Sender<Grant<S>>>,
    /// Live sessions plus outstanding creation permits.
    live: usize,
    next_id: u64,
    /// Set when a creation failed while other sessions were alive. New
    /// sessions are held back until a live session is released or retired,
    /// or none are left.
    creation_failing: bool,
    shut_down: bool,
}

impl<S: RenderSession> State<S> {
    fn can_create(&self, max_sessions: usize) -> bool {
        self.live < max_sessions && (!self.creation_failing || self.live == 0)
    }

    fn reserve_id(&mut self) -> SessionId {
        self.live += 1;
        self.next_id += 1;
        SessionId(self.next_id)
    }

    fn has_waiters(&self) -> bool {
        self.waiters.iter().any(|waiter| !waiter.is_closed())
    }
}

struct Shared<S: RenderSession> {
    state: Mutex<State<S>>,
    max_sessions: usize,
}

impl<S: RenderSession> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, State<S>> {
        // Guards never panic while holding the lock, so the state stays
        // consistent even if another thread poisoned it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take an idle session, reserve capacity, or join the queue.
    fn request(self: &Arc<Self>) -> Result<Ticket<S>, RenderError> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(RenderError::pool_shutdown());
        }
        // Anyone already waiting goes first.
        if !state.has_waiters() {
            if let Some(slot) = state.idle.pop_front() {
                return Ok(Ticket::Ready(Grant::Session(Lease::new(self, slot))));
            }
            if state.can_create(self.max_sessions) {
                let id = state.reserve_id();
                return Ok(Ticket::Ready(Grant::Create(CreatePermit::new(self, id))));
            }
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        Ok(Ticket::Queued(rx))
    }

    /// Hand idle sessions and free capacity to waiters, oldest first.
    fn dispatch(self: &Arc<Self>, state: &mut State<S>) {
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.is_closed() {
                continue;
            }
            let grant = if let Some(slot) = state.idle.pop_front() {
                Grant::Session(Lease::new(self, slot))
            } else if state.can_create(self.max_sessions) {
                let id = state.reserve_id();
                Grant::Create(CreatePermit::new(self, id))
            } else {
                state.waiters.push_front(waiter);
                return;
            };

            // The receiver may have gone away since the check above. Take
            // the grant apart here instead of dropping it under the lock.
            if let Err(grant) = waiter.send(grant) {
                match grant {
                    Grant::Session(mut lease) => {
                        if let Some(slot) = lease.slot.take() {
                            state.idle.push_front(slot);
                        }
                    }
                    Grant::Create(mut permit) => {
                        permit.armed = false;
                        state.live -= 1;
                    }
                }
            }
        }
    }

    /// Return a healthy session to the pool.
    fn release(self: &Arc<Self>, slot: Slot<S>) {
        let mut state = self.lock();
        if state.shut_down {
            state.live -= 1;
            drop(state);
            drop(slot);
            return;
        }
        state.idle.push_back(slot);
        state.creation_failing = false;
        self.dispatch(&mut state);
    }

    /// Dispose a session and free its capacity.
    fn retire(self: &Arc<Self>, slot: Slot<S>) {
        drop(slot);
        let mut state = self.lock();
        state.live -= 1;
        state.creation_failing = false;
        self.dispatch(&mut state);
    }
}

/// Exclusive use of one session.
///
/// Dropped leases return the session to the pool, or dispose it when
/// `retire_on_drop` is set (a render was in flight or the session is
/// unhealthy).
struct Lease<S: RenderSession> {
    shared: Arc<Shared<S>>,
    slot: Option<Slot<S>>,
    retire_on_drop: bool,
}

impl<S: RenderSession> Lease<S> {
    fn new(shared: &Arc<Shared<S>>, slot: Slot<S>) -> Self {
        Self {
            shared: Arc::clone(shared),
            slot: Some(slot),
            retire_on_drop: false,
        }
    }
}

impl<S: RenderSession> Drop for Lease<S> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if self.retire_on_drop {
            self.shared.retire(slot);
        } else {
            self.shared.release(slot);
        }
    }
}

/// Reserved capacity for one session that is about to be created.
struct CreatePermit<S: RenderSession> {
    shared: Arc<Shared<S>>,
    id: SessionId,
    armed: bool,
}

impl<S: RenderSession> CreatePermit<S> {
    fn new(shared: &Arc<Shared<S>>, id: SessionId) -> Self {
        Self {
            shared: Arc::clone(shared),
            id,
            armed: true,
        }
    }

    /// Turn the reserved capacity into a lease on the new session.
    fn into_lease(mut self, session: S) -> Result<Lease<S>, RenderError> {
        let slot = Slot {
            id: self.id,
            session,
            consecutive_failures: 0,
        };
        let mut state = self.shared.lock();
        self.armed = false;
        if state.shut_down {
            state.live -= 1;
            drop(state);
            drop(slot);
            return Err(RenderError::pool_shutdown());
        }
        state.creation_failing = false;
        drop(state);

        tracing::debug!(session = %slot.id, "Render session created");
        Ok(Lease::new(&self.shared, slot))
    }

    /// Give the capacity back after a failed creation.
    ///
    /// With other sessions alive the request goes back to the head of the
    /// queue to wait for one of them, and creation pauses until a session
    /// comes back. With none alive the pool cannot serve it and the creation
    /// error is returned. After shutdown the request fails as shut down.
    fn fail(mut self, err: RenderError) -> Result<Ticket<S>, RenderError> {
        let mut state = self.shared.lock();
        self.armed = false;
        state.live -= 1;

        if state.shut_down {
            tracing::debug!(
                session = %self.id,
                error = %err,
                "Render session creation failed after shutdown"
            );
            return Err(RenderError::pool_shutdown());
        }

        if state.live > 0 {
            tracing::warn!(
                session = %self.id,
                live = state.live,
                error = %err,
                "Render session creation failed, waiting for a live session"
            );
            state.creation_failing = true;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_front(tx);
            self.shared.dispatch(&mut state);
            return Ok(Ticket::Queued(rx));
        }

        tracing::warn!(session = %self.id, error = %err, "Render session creation failed");
        self.shared.dispatch(&mut state);
        Err(err)
    }
}

impl<S: RenderSession> Drop for CreatePermit<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.shared.lock();
        state.live -= 1;
        self.shared.dispatch(&mut state);
    }
}

/// Handle to a shared session pool.
///
/// Cloning is cheap; all clones share the same sessions and queue.
pub struct SessionPool<F: SessionFactory> {
    factory: Arc<F>,
    shared: Arc<Shared<F::Session>>,
    config: PoolConfig,
}

impl<F: SessionFactory> Clone for SessionPool<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            shared: Arc::clone(&self.shared),
            config: self.config,
        }
    }
}

impl<F: SessionFactory> SessionPool<F> {
    /// Create a pool. No session is started until the first submit.
    ///
    /// # Errors
    ///
    /// Returns [`PoolConfigError`] if the configuration is invalid.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, PoolConfigError> {
        config.validate()?;
        Ok(Self {
            factory: Arc::new(factory),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    idle: VecDeque::new(),
                    waiters: VecDeque::new(),
                    live: 0,
                    next_id: 0,
                    creation_failing: false,
                    shut_down: false,
                }),
                max_sessions: config.max_sessions,
            }),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Render a diagram on a pooled session.
    ///
    /// Waits for a session if all are busy. Dropping the returned future
    /// while it waits leaves the queue; dropping it mid-render disposes the
    /// session, since its state is unknown.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Render`](crate::ErrorKind::Render) if the session fails to render
    /// - [`ErrorKind::Timeout`](crate::ErrorKind::Timeout) if the render exceeds the timeout
    /// - [`ErrorKind::SessionCreate`](crate::ErrorKind::SessionCreate) if no session exists and none can be created
    /// - [`ErrorKind::PoolShutdown`](crate::ErrorKind::PoolShutdown) after [`shutdown`](Self::shutdown)
    pub async fn submit(&self, diagram: &DiagramSource) -> Result<Vec<u8>, RenderError> {
        let mut lease = self.acquire().await?;
        lease.retire_on_drop = true;
        let Some(slot) = lease.slot.as_mut() else {
            return Err(RenderError::render("lease without a session"));
        };
        let id = slot.id;

        let outcome =
            tokio::time::timeout(self.config.render_timeout, slot.session.render(diagram)).await;

        match outcome {
            Ok(Ok(bytes)) => {
                slot.consecutive_failures = 0;
                lease.retire_on_drop = false;
                Ok(bytes)
            }
            Ok(Err(err)) => {
                slot.consecutive_failures += 1;
                if slot.consecutive_failures >= self.config.max_failures_before_retire {
                    tracing::warn!(
                        session = %id,
                        failures = slot.consecutive_failures,
                        "Retiring render session after consecutive failures"
                    );
                } else {
                    lease.retire_on_drop = false;
                }
                Err(err)
            }
            Err(_elapsed) => {
                tracing::warn!(
                    session = %id,
                    timeout_ms = self.config.render_timeout.as_millis(),
                    "Render timed out, retiring session"
                );
                Err(RenderError::timeout(self.config.render_timeout))
            }
        }
    }

    async fn acquire(&self) -> Result<Lease<F::Session>, RenderError> {
        let mut ticket = self.shared.request();
        loop {
            let grant = match ticket? {
                Ticket::Ready(grant) => grant,
                // The sender is only dropped by shutdown.
                Ticket::Queued(rx) => rx.await.map_err(|_| RenderError::pool_shutdown())?,
            };
            match grant {
                Grant::Session(lease) => return Ok(lease),
                Grant::Create(permit) => match self.factory.create(permit.id).await {
                    Ok(session) => return permit.into_lease(session),
                    Err(err) => ticket = permit.fail(err),
                },
            }
        }
    }

    /// Shut the pool down.
    ///
    /// Idle sessions are disposed, queued requests fail with
    /// [`ErrorKind::PoolShutdown`](crate::ErrorKind::PoolShutdown), and later
    /// submissions are rejected immediately. Sessions busy rendering are
    /// disposed when their render returns.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        let idle: Vec<_> = state.idle.drain(..).collect();
        let waiters: Vec<_> = state.waiters.drain(..).collect();
        state.live -= idle.len();
        let busy = state.live;
        drop(state);

        tracing::debug!(
            idle = idle.len(),
            queued = waiters.len(),
            busy,
            "Session pool shut down"
        );
        drop(waiters);
        drop(idle);
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            live: state.live,
            idle: state.idle.len(),
            queued: state
                .waiters
                .iter()
                .filter(|waiter| !waiter.is_closed())
                .count(),
        }
    }
}
