//! Activity context and information.

use dbtflow_core::SessionInfo;
use std::time::{Duration, Instant};

/// Activity context for executing activity logic
#[derive(Debug, Clone)]
pub struct ActivityContext {
    activity_info: ActivityInfo,
}

impl ActivityContext {
    pub fn new(activity_info: ActivityInfo) -> Self {
        Self { activity_info }
    }

    /// Get activity information
    pub fn get_info(&self) -> &ActivityInfo {
        &self.activity_info
    }

    /// Get the deadline for activity completion
    pub fn get_deadline(&self) -> Option<Instant> {
        self.activity_info.deadline
    }

    /// Get the remaining time before deadline
    pub fn get_remaining_time(&self) -> Option<Duration> {
        self.get_deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Session the invocation is pinned to, if any
    pub fn session(&self) -> Option<&SessionInfo> {
        self.activity_info.session.as_ref()
    }
}

/// Activity information
#[derive(Debug, Clone)]
pub struct ActivityInfo {
    pub activity_id: String,
    pub activity_type: String,
    pub task_list: String,
    /// Zero-based attempt number
    pub attempt: u32,
    pub scheduled_time: chrono::DateTime<chrono::Utc>,
    pub started_time: chrono::DateTime<chrono::Utc>,
    pub deadline: Option<Instant>,
    pub session: Option<SessionInfo>,
}

impl ActivityInfo {
    /// Info for the first attempt of an activity scheduled now.
    pub fn new(activity_id: impl Into<String>, activity_type: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            task_list: String::new(),
            attempt: 0,
            scheduled_time: now,
            started_time: now,
            deadline: None,
            session: None,
        }
    }
}
