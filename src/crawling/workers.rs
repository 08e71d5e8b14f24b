//! # Session Worker Pool
//!
//! Idle sessions wait in a bounded channel sized to the pool. Acquiring a
//! worker receives one, and dropping the [`SessionLease`] sends it back, so a
//! session is never driving two tasks at once and a panicking task still
//! returns its session.

use std::ops::{Deref, DerefMut};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::infrastructure::session::Session;

type IdleSession = Box<dyn Session>;

/// Fixed-size pool of authenticated sessions
pub struct WorkerPool {
    idle_tx: mpsc::Sender<IdleSession>,
    idle_rx: mpsc::Receiver<IdleSession>,
    size: usize,
}

/// Pool occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStats {
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
}

impl WorkerPool {
    /// `None` when no sessions were supplied
    pub fn new(sessions: Vec<IdleSession>) -> Option<Self> {
        let size = sessions.len();
        if size == 0 {
            return None;
        }

        let (idle_tx, idle_rx) = mpsc::channel(size);
        for session in sessions {
            // capacity equals the number of sessions
            if idle_tx.try_send(session).is_err() {
                return None;
            }
        }

        Some(Self { idle_tx, idle_rx, size })
    }

    /// Waits until a session is idle and leases it out
    pub async fn acquire(&mut self) -> SessionLease {
        loop {
            // the pool keeps a sender of its own, so the channel never closes
            if let Some(session) = self.idle_rx.recv().await {
                debug!("Leased session {}", session.label());
                return SessionLease {
                    session: Some(session),
                    home: self.idle_tx.clone(),
                };
            }
        }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn stats(&self) -> WorkerPoolStats {
        let idle = self.idle_count();
        WorkerPoolStats {
            size: self.size,
            idle,
            busy: self.size.saturating_sub(idle),
        }
    }

    /// Whether every session is back in the pool
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle_count() == self.size
    }

    // free channel slots are exactly the leased sessions
    fn idle_count(&self) -> usize {
        self.size.saturating_sub(self.idle_tx.capacity())
    }
}

/// Exclusive use of one session; returned to the pool on drop
pub struct SessionLease {
    session: Option<IdleSession>,
    home: mpsc::Sender<IdleSession>,
}

impl Deref for SessionLease {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => session.as_ref(),
            None => unreachable!("lease is only emptied on drop"),
        }
    }
}

impl DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.session {
            Some(session) => session.as_mut(),
            None => unreachable!("lease is only emptied on drop"),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.home.try_send(session) {
                error!("Failed to return session to the pool: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::session::SessionError;
    use async_trait::async_trait;

    struct NamedSession(&'static str);

    #[async_trait]
    impl Session for NamedSession {
        fn label(&self) -> &str {
            self.0
        }

        async fn fetch_text(&mut self, path: &str) -> Result<String, SessionError> {
            Ok(format!("{}:{}", self.0, path))
        }

        fn is_maintenance_window(&self) -> bool {
            false
        }
    }

    fn pool_of(labels: &[&'static str]) -> WorkerPool {
        let sessions: Vec<IdleSession> = labels
            .iter()
            .map(|label| Box::new(NamedSession(*label)) as IdleSession)
            .collect();
        WorkerPool::new(sessions).unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(WorkerPool::new(Vec::new()).is_none());
    }

    #[tokio::test]
    async fn leases_return_on_drop() {
        let mut pool = pool_of(&["a", "b"]);
        assert!(pool.is_idle());

        let first = pool.acquire().await;
        let second = pool.acquire().await;
        assert_eq!(pool.stats(), WorkerPoolStats { size: 2, idle: 0, busy: 2 });
        assert_ne!(first.label(), second.label());

        drop(first);
        assert_eq!(pool.stats().idle, 1);
        drop(second);
        assert!(pool.is_idle());
    }

    #[tokio::test]
    async fn acquire_waits_for_a_release() {
        let mut pool = pool_of(&["only"]);
        let lease = pool.acquire().await;

        let releaser = tokio::spawn(async move {
            tokio::task::yield_now().await;
            drop(lease);
        });

        let mut again = pool.acquire().await;
        assert_eq!(again.fetch_text("x").await.unwrap(), "only:x");
        releaser.await.unwrap();
    }

    #[tokio::test]
    async fn panicking_task_still_returns_its_session() {
        let mut pool = pool_of(&["fragile"]);
        let lease = pool.acquire().await;

        let handle = tokio::spawn(async move {
            let _lease = lease;
            panic!("task failure");
        });
        assert!(handle.await.is_err());
        assert!(pool.is_idle());
    }
}
