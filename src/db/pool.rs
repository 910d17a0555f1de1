//! Bounded, reusable session pool for the backing store.
//!
//! The pool lends sessions through [`SessionProxy`] guards that return
//! their entry on every exit path. All bookkeeping happens under a single
//! mutex; session creation is performed outside the critical section so a
//! slow handshake never blocks other borrowers. A background sweep closes
//! idle entries that outlive the configured lifetime.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::StoreError;

/// Factory for backing-store sessions.
#[async_trait]
pub trait SessionManager: Send + Sync + 'static {
    /// The session handle lent to borrowers.
    type Session: Send + 'static;

    /// Create a fresh session.
    ///
    /// # Errors
    /// Returns a [`StoreError`] when the backing store refuses the
    /// session.
    async fn create(&self) -> Result<Self::Session, StoreError>;
}

/// Pool sizing and lifetime configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Sessions created eagerly when the pool is built.
    pub initial_size: usize,
    /// Cap on idle sessions retained for reuse.
    pub max_pool_size: usize,
    /// Hard cap on outstanding plus idle sessions.
    pub max_connections: usize,
    /// Idle lifetime before an entry is closed.
    pub max_idle_time: Duration,
    /// Cadence of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 1,
            max_pool_size: 10,
            max_connections: 100,
            max_idle_time: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Point-in-time pool counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions currently lent out.
    pub active: usize,
    /// Idle sessions awaiting reuse.
    pub inactive: usize,
    /// Sessions created over the pool's lifetime.
    pub total_created: u64,
}

struct Idle<S> {
    session: S,
    since: Instant,
}

struct State<S> {
    idle: VecDeque<Idle<S>>,
    outstanding: usize,
}

struct Shared<M: SessionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<State<M::Session>>,
    created: AtomicU64,
}

fn lock<S>(state: &Mutex<State<S>>) -> MutexGuard<'_, State<S>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sweep_once<M: SessionManager>(shared: &Shared<M>) {
    let ttl = shared.config.max_idle_time;
    let mut state = lock(&shared.state);
    let before = state.idle.len();
    state.idle.retain(|entry| entry.since.elapsed() < ttl);
    let closed = before - state.idle.len();
    drop(state);
    if closed > 0 {
        debug!("closed {closed} idle session(s) past their idle lifetime");
    }
}

fn spawn_sweep<M: SessionManager>(shared: &Arc<Shared<M>>) {
    let weak: Weak<Shared<M>> = Arc::downgrade(shared);
    let period = shared.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            let Some(shared) = weak.upgrade() else { break };
            sweep_once(&shared);
        }
    });
}

/// Shared handle to a session pool.
pub struct Pool<M: SessionManager> {
    shared: Arc<Shared<M>>,
}

impl<M: SessionManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: SessionManager> Pool<M> {
    /// Build a pool, eagerly creating `initial_size` sessions and starting
    /// the idle sweep.
    ///
    /// # Errors
    /// Returns the first failure reported while creating the initial
    /// sessions.
    #[must_use = "handle the result"]
    pub async fn new(manager: M, config: PoolConfig) -> Result<Self, StoreError> {
        let initial = config
            .initial_size
            .min(config.max_pool_size)
            .min(config.max_connections);
        let shared = Arc::new(Shared {
            manager,
            config,
            state: Mutex::new(State {
                idle: VecDeque::new(),
                outstanding: 0,
            }),
            created: AtomicU64::new(0),
        });
        for _ in 0..initial {
            let session = shared.manager.create().await?;
            shared.created.fetch_add(1, Ordering::Relaxed);
            lock(&shared.state).idle.push_back(Idle {
                session,
                since: Instant::now(),
            });
        }
        spawn_sweep(&shared);
        Ok(Self { shared })
    }

    /// Borrow a session, reusing an idle one where possible.
    ///
    /// Never blocks waiting for a peer to release: once the hard cap is
    /// reached the call fails immediately.
    ///
    /// # Errors
    /// [`StoreError::PoolExhausted`] past the connection cap, or the
    /// manager's failure when a fresh session cannot be created.
    #[must_use = "handle the result"]
    pub async fn acquire(&self) -> Result<SessionProxy<M>, StoreError> {
        let reused = {
            let mut state = lock(&self.shared.state);
            let ttl = self.shared.config.max_idle_time;
            while state
                .idle
                .front()
                .is_some_and(|entry| entry.since.elapsed() >= ttl)
            {
                state.idle.pop_front();
            }
            if let Some(entry) = state.idle.pop_front() {
                state.outstanding += 1;
                Some(entry.session)
            } else if state.outstanding + state.idle.len() < self.shared.config.max_connections {
                // Reserve the slot; creation happens outside the lock.
                state.outstanding += 1;
                None
            } else {
                return Err(StoreError::PoolExhausted);
            }
        };

        let session = match reused {
            Some(session) => session,
            None => match self.shared.manager.create().await {
                Ok(session) => {
                    self.shared.created.fetch_add(1, Ordering::Relaxed);
                    session
                }
                Err(error) => {
                    lock(&self.shared.state).outstanding -= 1;
                    return Err(error);
                }
            },
        };

        Ok(SessionProxy {
            session: Some(session),
            valid: true,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = lock(&self.shared.state);
        PoolStats {
            active: state.outstanding,
            inactive: state.idle.len(),
            total_created: self.shared.created.load(Ordering::Relaxed),
        }
    }

    /// Run one sweep pass immediately.
    pub fn sweep(&self) { sweep_once(&self.shared); }
}

/// A borrowed session that returns to the pool on drop.
pub struct SessionProxy<M: SessionManager> {
    session: Option<M::Session>,
    valid: bool,
    shared: Arc<Shared<M>>,
}

impl<M: SessionManager> SessionProxy<M> {
    /// Mark the session as broken; it is closed instead of reused.
    pub fn invalidate(&mut self) { self.valid = false; }
}

impl<M: SessionManager> Deref for SessionProxy<M> {
    type Target = M::Session;

    #[expect(clippy::expect_used, reason = "session is present until drop")]
    fn deref(&self) -> &M::Session { self.session.as_ref().expect("session taken") }
}

impl<M: SessionManager> DerefMut for SessionProxy<M> {
    #[expect(clippy::expect_used, reason = "session is present until drop")]
    fn deref_mut(&mut self) -> &mut M::Session { self.session.as_mut().expect("session taken") }
}

impl<M: SessionManager> Drop for SessionProxy<M> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let mut state = lock(&self.shared.state);
            state.outstanding = state.outstanding.saturating_sub(1);
            if self.valid && state.idle.len() < self.shared.config.max_pool_size {
                state.idle.push_back(Idle {
                    session,
                    since: Instant::now(),
                });
            }
        }
    }
}
