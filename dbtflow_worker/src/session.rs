//! Session slots of the local worker.
//!
//! A session pins a run's invocations to this worker through a dedicated
//! task list `"{task_list}@{session_id}"`. Each open session holds one slot
//! of `max_concurrent_session_execution_size` until it is completed.

use crate::worker::WorkerOptions;
use dashmap::DashMap;
use dbtflow_core::{SessionError, SessionInfo, SessionOptions};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

struct OpenSession {
    info: SessionInfo,
    expires_at: Option<Instant>,
    _slot: OwnedSemaphorePermit,
}

/// Tracks the sessions open on a worker
pub struct SessionManager {
    enabled: bool,
    slots: Arc<Semaphore>,
    open: DashMap<String, OpenSession>,
}

impl SessionManager {
    pub fn new(options: &WorkerOptions) -> Self {
        Self {
            enabled: options.enable_session_worker,
            slots: Arc::new(Semaphore::new(options.max_concurrent_session_execution_size)),
            open: DashMap::new(),
        }
    }

    /// Open a session, waiting up to the creation timeout for a free slot.
    pub async fn create(
        &self,
        base_task_list: &str,
        options: &SessionOptions,
    ) -> Result<SessionInfo, SessionError> {
        if !self.enabled {
            return Err(SessionError::NotSupported);
        }

        let slot = if options.creation_timeout.is_zero() {
            Arc::clone(&self.slots)
                .try_acquire_owned()
                .map_err(|_| SessionError::Unavailable("no session slot available".into()))?
        } else {
            tokio::time::timeout(
                options.creation_timeout,
                Arc::clone(&self.slots).acquire_owned(),
            )
            .await
            .map_err(|_| SessionError::CreationTimeout(options.creation_timeout))?
            .map_err(|_| SessionError::Unavailable("session worker stopped".into()))?
        };

        let session_id = Uuid::new_v4().to_string();
        let info = SessionInfo {
            task_list: format!("{}@{}", base_task_list, session_id),
            session_id,
        };
        let expires_at = if options.execution_timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(options.execution_timeout)
        };

        self.open.insert(
            info.task_list.clone(),
            OpenSession {
                info: info.clone(),
                expires_at,
                _slot: slot,
            },
        );
        info!(session_id = %info.session_id, task_list = %info.task_list, "session opened");
        Ok(info)
    }

    /// Close a session and free its slot. Returns false if it was not open.
    pub fn complete(&self, session: &SessionInfo) -> bool {
        let closed = self.open.remove(&session.task_list).is_some();
        debug!(session_id = %session.session_id, closed, "session completed");
        closed
    }

    /// Session an invocation on `task_list` belongs to.
    ///
    /// Plain task lists resolve to `None`. Task lists of sessions that were
    /// completed or have expired are rejected.
    pub fn resolve(&self, task_list: &str) -> Result<Option<SessionInfo>, SessionError> {
        if let Some(session) = self.open.get(task_list) {
            return match session.expires_at {
                Some(expires_at) if Instant::now() >= expires_at => Err(SessionError::Unavailable(
                    format!("session {} expired", session.info.session_id),
                )),
                _ => Ok(Some(session.info.clone())),
            };
        }
        if is_session_task_list(task_list) {
            return Err(SessionError::Unavailable(format!(
                "no open session for task list {}",
                task_list
            )));
        }
        Ok(None)
    }

    pub fn active_count(&self) -> usize {
        self.open.len()
    }
}

fn is_session_task_list(task_list: &str) -> bool {
    task_list
        .rsplit_once('@')
        .map(|(_, id)| Uuid::parse_str(id).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager(slots: usize) -> SessionManager {
        SessionManager::new(&WorkerOptions {
            enable_session_worker: true,
            max_concurrent_session_execution_size: slots,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let sessions = manager(1);
        let info = sessions
            .create("dbt-update-operations", &SessionOptions::default())
            .await
            .unwrap();
        assert_eq!(
            info.task_list,
            format!("dbt-update-operations@{}", info.session_id)
        );
        assert_eq!(sessions.resolve(&info.task_list).unwrap(), Some(info.clone()));
        assert_eq!(sessions.active_count(), 1);

        assert!(sessions.complete(&info));
        assert!(!sessions.complete(&info));
        assert!(sessions.resolve(&info.task_list).is_err());
        assert_eq!(sessions.resolve("dbt-update-operations").unwrap(), None);
    }

    #[tokio::test]
    async fn test_disabled_sessions_not_supported() {
        let sessions = SessionManager::new(&WorkerOptions::default());
        let err = sessions
            .create("tl", &SessionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotSupported);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_times_out_without_slot() {
        let sessions = manager(1);
        let options = SessionOptions {
            creation_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(3600),
        };
        let _held = sessions.create("tl", &options).await.unwrap();

        let err = sessions.create("tl", &options).await.unwrap_err();
        assert_eq!(err, SessionError::CreationTimeout(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_rejected() {
        let sessions = manager(2);
        let options = SessionOptions {
            creation_timeout: Duration::ZERO,
            execution_timeout: Duration::from_secs(10),
        };
        let info = sessions.create("tl", &options).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matches!(
            sessions.resolve(&info.task_list),
            Err(SessionError::Unavailable(_))
        ));
    }
}
