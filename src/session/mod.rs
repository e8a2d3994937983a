// Create/load/update/expire sessions on top of the embedded KV store, with
// a 60s TTL cache and a per-id lock map serialising concurrent mutations.

pub mod model;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::persistence::session_store::SessionStore;
use model::{Session, SessionStatus, ValidationRecord};

pub struct SessionManager {
    store: Arc<SessionStore>,
    cache: moka::future::Cache<Uuid, Arc<Session>>,
    locks: DashMap<Uuid, Arc<AsyncMutex<()>>>,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            cache: moka::future::Cache::builder()
                .time_to_live(Duration::from_secs(60))
                .max_capacity(10_000)
                .build(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        self.locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Drops the per-id lock once a session reaches a terminal state, so the
    /// lock table doesn't grow without bound across a long-running process.
    fn prune_lock(&self, id: Uuid) {
        self.locks.remove(&id);
    }

    pub async fn create(&self, session: Session) -> Result<Uuid, PipelineError> {
        let id = session.id;
        self.store.insert(&session).await?;
        self.cache.insert(id, Arc::new(session)).await;
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Arc<Session>>, PipelineError> {
        if let Some(cached) = self.cache.get(&id).await {
            return Ok(Some(cached));
        }
        let Some(session) = self.store.get(&id).await? else {
            return Ok(None);
        };
        let session = Arc::new(session);
        self.cache.insert(id, session.clone()).await;
        Ok(Some(session))
    }

    /// Applies `mutator` to the session under its per-id lock, persists the
    /// result, invalidates the cache entry, and returns the updated session.
    /// Only one mutation per session id is in flight at any time.
    pub async fn update<F>(&self, id: Uuid, mutator: F) -> Result<Arc<Session>, PipelineError>
    where
        F: FnOnce(&mut Session) -> Result<(), PipelineError>,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let Some(current) = self.store.get(&id).await? else {
            return Err(PipelineError::NotFound(format!("session {id}")));
        };
        let mut session = current;
        mutator(&mut session)?;
        session.touch();
        self.store.update(&session).await?;
        self.cache.invalidate(&id).await;
        let session = Arc::new(session);
        self.cache.insert(id, session.clone()).await;

        if matches!(
            session.status,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Expired | SessionStatus::Cancelled
        ) {
            self.prune_lock(id);
        }

        Ok(session)
    }

    pub async fn append_validation(&self, id: Uuid, record: ValidationRecord) -> Result<(), PipelineError> {
        self.update(id, move |session| {
            session.validation_history.push(record);
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Marks `active` sessions untouched for `timeout` as `expired`.
    pub async fn sweep_expired(&self, timeout: Duration) -> Result<u64, PipelineError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
        let count = self.store.expire_stale(cutoff).await?;
        if count > 0 {
            tracing::info!(expired = count, "session sweep: expired stale sessions");
            self.cache.invalidate_all();
        }
        Ok(count)
    }

    /// Forces a WAL checkpoint on the backing store — called during graceful
    /// shutdown to guarantee every committed session is on disk.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        self.store.flush_all().await
    }

    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, timeout: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(30)));
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired(timeout).await {
                    tracing::warn!("session sweeper: {}", e);
                }
            }
        })
    }
}
