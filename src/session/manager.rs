//! Session ownership and idle expiry.
//!
//! # Responsibilities
//! - Create sessions under a global cap
//! - Resolve session ids, evicting sessions found idle on lookup
//! - Sweep idle sessions on request (the reaper calls this)
//!
//! # Design Decisions
//! - Owned by the tunnel manager, never a process-wide singleton
//! - The cap is reserved with a CAS loop before insertion, so concurrent
//!   creators cannot overshoot it

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::error::{Result, TunnelError};
use crate::observability::metrics;
use crate::session::registry::Session;

/// Registry of live sessions.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<Uuid, Arc<Session>>,
    active: AtomicUsize,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            active: AtomicUsize::new(0),
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Create and register a new session.
    pub fn create_session(&self) -> Result<Arc<Session>> {
        self.reserve_slot()?;

        let session = Arc::new(
            Session::new().with_max_streams(self.settings.max_streams_per_session),
        );
        self.sessions.insert(session.id(), session.clone());

        tracing::debug!(session_id = %session.id(), "Session created");
        metrics::record_session_count(self.session_count());
        Ok(session)
    }

    /// Resolve a session and reset its idle clock.
    ///
    /// An idle session found here is evicted and reported as expired.
    pub fn get_session(&self, id: &Uuid) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .get(id)
            .map(|r| r.value().clone())
            .ok_or(TunnelError::SessionNotFound)?;

        if session.is_expired(self.settings.idle_timeout()) {
            if self.evict_if_expired(id, self.settings.idle_timeout()) {
                metrics::record_session_expired(1);
                tracing::info!(session_id = %id, "Session expired on lookup");
            }
            return Err(TunnelError::SessionExpired);
        }

        session.touch();
        Ok(session)
    }

    /// Unregister a session and close its streams.
    pub fn remove_session(&self, id: &Uuid) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        self.active.fetch_sub(1, Ordering::SeqCst);
        let closed = session.close_all_streams();

        tracing::debug!(session_id = %id, closed_streams = closed, "Session removed");
        metrics::record_session_count(self.session_count());
        Some(session)
    }

    /// Evict every session idle for longer than the configured timeout.
    pub fn cleanup_expired(&self) -> Vec<Uuid> {
        self.cleanup_idle(self.settings.idle_timeout())
    }

    /// Evict every session idle for longer than `timeout`.
    pub fn cleanup_idle(&self, timeout: Duration) -> Vec<Uuid> {
        let candidates: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|r| r.value().is_expired(timeout))
            .map(|r| *r.key())
            .collect();

        let evicted: Vec<Uuid> = candidates
            .into_iter()
            .filter(|id| self.evict_if_expired(id, timeout))
            .collect();

        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), remaining = self.session_count(), "Evicted idle sessions");
            metrics::record_session_expired(evicted.len());
            metrics::record_session_count(self.session_count());
        }
        evicted
    }

    pub fn session_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|r| *r.key()).collect()
    }

    /// Total streams across all sessions.
    pub fn stream_count(&self) -> usize {
        self.sessions.iter().map(|r| r.value().stream_count()).sum()
    }

    fn reserve_slot(&self) -> Result<()> {
        let max = self.settings.max_sessions;
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= max {
                tracing::warn!(max_sessions = max, "Session limit reached");
                return Err(TunnelError::MaxSessionsReached(max));
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Remove `id` only if it is still idle, so a concurrent touch wins.
    fn evict_if_expired(&self, id: &Uuid, timeout: Duration) -> bool {
        match self.sessions.remove_if(id, |_, s| s.is_expired(timeout)) {
            Some((_, session)) => {
                self.active.fetch_sub(1, Ordering::SeqCst);
                session.close_all_streams();
                true
            }
            None => false,
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn settings(max_sessions: usize, idle_ms: u64) -> SessionSettings {
        SessionSettings {
            max_sessions,
            max_streams_per_session: 4,
            idle_timeout_ms: idle_ms,
            ..SessionSettings::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let mgr = SessionManager::new(settings(4, 60_000));
        let session = mgr.create_session().unwrap();
        let found = mgr.get_session(&session.id()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(mgr.session_count(), 1);
    }

    #[test]
    fn test_unknown_session() {
        let mgr = SessionManager::default();
        assert!(matches!(
            mgr.get_session(&Uuid::new_v4()),
            Err(TunnelError::SessionNotFound)
        ));
    }

    #[test]
    fn test_session_cap() {
        let mgr = SessionManager::new(settings(2, 60_000));
        let first = mgr.create_session().unwrap();
        mgr.create_session().unwrap();
        assert!(matches!(
            mgr.create_session(),
            Err(TunnelError::MaxSessionsReached(2))
        ));

        mgr.remove_session(&first.id()).unwrap();
        assert!(mgr.create_session().is_ok());
    }

    #[test]
    fn test_sessions_inherit_stream_limit() {
        let mgr = SessionManager::new(settings(1, 60_000));
        let session = mgr.create_session().unwrap();
        for id in 0..4 {
            session.open_stream(id).unwrap();
        }
        assert!(matches!(
            session.open_stream(99),
            Err(TunnelError::MaxStreamsReached(4))
        ));
        assert_eq!(mgr.stream_count(), 4);
    }

    #[test]
    fn test_remove_closes_streams() {
        let mgr = SessionManager::default();
        let session = mgr.create_session().unwrap();
        let stream = session.get_stream(1);

        mgr.remove_session(&session.id()).unwrap();
        assert!(stream.is_closed());
        assert!(mgr.remove_session(&session.id()).is_none());
        assert_eq!(mgr.session_count(), 0);
    }

    #[test]
    fn test_expired_on_lookup() {
        let mgr = SessionManager::new(settings(4, 20));
        let session = mgr.create_session().unwrap();
        thread::sleep(Duration::from_millis(40));

        assert!(matches!(
            mgr.get_session(&session.id()),
            Err(TunnelError::SessionExpired)
        ));
        assert!(matches!(
            mgr.get_session(&session.id()),
            Err(TunnelError::SessionNotFound)
        ));
        assert_eq!(mgr.session_count(), 0);
    }

    #[test]
    fn test_cleanup_expired_keeps_active_sessions() {
        let mgr = SessionManager::new(settings(4, 30));
        let idle = mgr.create_session().unwrap();
        let busy = mgr.create_session().unwrap();

        thread::sleep(Duration::from_millis(50));
        busy.touch();

        let evicted = mgr.cleanup_expired();
        assert_eq!(evicted, vec![idle.id()]);
        assert_eq!(mgr.session_ids(), vec![busy.id()]);
        assert_eq!(mgr.session_count(), 1);
    }

    #[test]
    fn test_concurrent_creation_respects_cap() {
        let mgr = Arc::new(SessionManager::new(settings(10, 60_000)));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let mgr = mgr.clone();
                thread::spawn(move || mgr.create_session().is_ok())
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 10);
        assert_eq!(mgr.session_count(), 10);
    }
}
