//! In-process session cache over `SessionRepository`, plus the background
//! sweep that expires idle sessions.
//!
//! Session rows are persisted so a restart doesn't orphan a client mid
//! stream, but every read goes through this in-memory `DashMap` first so
//! a hot WebSocket/SSE loop doesn't round-trip to the store per frame.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use waypoint_core::{defaults, Result, Session, SessionRepository};

/// Cached view of a session, refreshed on touch.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session: Session,
}

/// Soft cache of sessions backed by `SessionRepository`.
pub struct SessionManager {
    cache: DashMap<String, SessionHandle>,
    repo: Arc<dyn SessionRepository>,
}

impl SessionManager {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            cache: DashMap::new(),
            repo,
        }
    }

    /// Record a freshly created session in the local cache (the row
    /// itself was already persisted by `capabilities::initialize`).
    pub fn insert(&self, session: Session) {
        self.cache.insert(session.id.clone(), SessionHandle { session });
    }

    /// Fetch a session, falling back to the store on a cache miss (e.g.
    /// a different process instance owns the WebSocket for this id).
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        if let Some(handle) = self.cache.get(session_id) {
            return Ok(handle.session.clone());
        }
        let session = self.repo.get(session_id).await?;
        self.cache.insert(session_id.to_string(), SessionHandle {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Bump last-seen both in cache and in the store.
    pub async fn touch(&self, session_id: &str) -> Result<()> {
        if let Some(mut handle) = self.cache.get_mut(session_id) {
            handle.session.last_seen_at = Utc::now();
        }
        self.repo.touch(session_id).await
    }

    pub async fn subscribe_resource(&self, session_id: &str, resource: &str) -> Result<()> {
        if let Some(mut handle) = self.cache.get_mut(session_id) {
            if !handle.session.subscriptions.iter().any(|s| s == resource) {
                handle.session.subscriptions.push(resource.to_string());
            }
        }
        self.repo.subscribe_resource(session_id, resource).await
    }

    pub async fn unsubscribe_resource(&self, session_id: &str, resource: &str) -> Result<()> {
        if let Some(mut handle) = self.cache.get_mut(session_id) {
            handle.session.subscriptions.retain(|s| s != resource);
        }
        self.repo.unsubscribe_resource(session_id, resource).await
    }

    /// Drop expired entries from the local cache and the store. Run on a
    /// fixed interval by `spawn_session_sweeper`.
    pub async fn sweep(&self) -> Result<u64> {
        let ttl = chrono::Duration::seconds(defaults::SESSION_TTL_SECS);
        let deleted = self.repo.delete_expired(ttl).await?;
        let cutoff = Utc::now() - ttl;
        self.cache.retain(|_, handle| handle.session.last_seen_at > cutoff);
        Ok(deleted)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

/// Runs `SessionManager::sweep()` on a fixed interval until the process
/// shuts down, mirroring `waypoint_jobs::sweeper::run_lease_sweeper`'s
/// cadence and log shape.
pub async fn run_session_sweeper(sessions: Arc<SessionManager>, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        match sessions.sweep().await {
            Ok(deleted) if deleted > 0 => {
                info!(count = deleted, "session sweep expired idle sessions");
            }
            Ok(_) => {}
            Err(e) => warn!(error = ?e, "session sweep failed"),
        }
    }
}

pub fn spawn_session_sweeper(sessions: Arc<SessionManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_session_sweeper(sessions, defaults::SESSION_CLEANUP_INTERVAL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use waypoint_core::TransportKind;

    #[derive(Default)]
    struct FakeSessions {
        rows: Mutex<std::collections::HashMap<String, Session>>,
    }

    fn sample(id: &str) -> Session {
        Session {
            id: id.to_string(),
            transport: TransportKind::Http,
            protocol_version: "2025-06-18".to_string(),
            client_info: None,
            subscriptions: Vec::new(),
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[async_trait]
    impl SessionRepository for FakeSessions {
        async fn create(&self, session: &Session) -> Result<()> {
            self.rows.lock().unwrap().insert(session.id.clone(), session.clone());
            Ok(())
        }
        async fn touch(&self, session_id: &str) -> Result<()> {
            if let Some(s) = self.rows.lock().unwrap().get_mut(session_id) {
                s.last_seen_at = Utc::now();
            }
            Ok(())
        }
        async fn get(&self, session_id: &str) -> Result<Session> {
            self.rows
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .ok_or_else(|| waypoint_core::Error::SessionNotFound(session_id.to_string()))
        }
        async fn delete_expired(&self, _ttl: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
        async fn subscribe_resource(&self, session_id: &str, resource: &str) -> Result<()> {
            if let Some(s) = self.rows.lock().unwrap().get_mut(session_id) {
                s.subscriptions.push(resource.to_string());
            }
            Ok(())
        }
        async fn unsubscribe_resource(&self, session_id: &str, resource: &str) -> Result<()> {
            if let Some(s) = self.rows.lock().unwrap().get_mut(session_id) {
                s.subscriptions.retain(|r| r != resource);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn get_falls_back_to_store_on_cache_miss() {
        let repo: Arc<dyn SessionRepository> = Arc::new(FakeSessions::default());
        repo.create(&sample("sess-1")).await.unwrap();
        let manager = SessionManager::new(repo);

        let session = manager.get("sess-1").await.unwrap();
        assert_eq!(session.id, "sess-1");
        assert_eq!(manager.cached_count(), 1);
    }

    #[tokio::test]
    async fn insert_then_get_hits_cache_without_store_round_trip() {
        let repo: Arc<dyn SessionRepository> = Arc::new(FakeSessions::default());
        let manager = SessionManager::new(repo);
        manager.insert(sample("sess-2"));

        let session = manager.get("sess-2").await.unwrap();
        assert_eq!(session.id, "sess-2");
    }

    #[tokio::test]
    async fn subscribe_resource_updates_cached_copy() {
        let repo: Arc<dyn SessionRepository> = Arc::new(FakeSessions::default());
        repo.create(&sample("sess-3")).await.unwrap();
        let manager = SessionManager::new(repo);
        manager.get("sess-3").await.unwrap();

        manager.subscribe_resource("sess-3", "report://1").await.unwrap();
        let session = manager.get("sess-3").await.unwrap();
        assert_eq!(session.subscriptions, vec!["report://1".to_string()]);
    }
}
