//! Alert activities, registered as `alert_error` and `alert_success`.
//!
//! Both receive the JSON-encoded identifier of the run.

use crate::registry::{Activity, Registry};
use dbtflow_activity::ActivityContext;
use dbtflow_core::{decode_input, ActivityError, AlertKind, DataConverter, JsonDataConverter};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info};

type ActivityFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, ActivityError>> + Send>>;

fn decode_identifier(input: Option<Vec<u8>>) -> Result<String, ActivityError> {
    Ok(decode_input(&JsonDataConverter::new(), input.as_deref())?)
}

fn accepted() -> Result<Vec<u8>, ActivityError> {
    Ok(JsonDataConverter::new().encode(&true)?)
}

/// Writes the alert to the log and always succeeds
#[derive(Debug, Clone, Copy)]
pub struct LogAlertActivity {
    kind: AlertKind,
}

impl LogAlertActivity {
    pub fn new(kind: AlertKind) -> Self {
        Self { kind }
    }
}

impl Activity for LogAlertActivity {
    fn execute(&self, _ctx: &ActivityContext, input: Option<Vec<u8>>) -> ActivityFuture {
        let kind = self.kind;
        Box::pin(async move {
            let identifier = decode_identifier(input)?;
            match kind {
                AlertKind::Error => error!(identifier = %identifier, "alert sent: pipeline failed"),
                AlertKind::Success => info!(identifier = %identifier, "alert sent: pipeline completed"),
            }
            accepted()
        })
    }
}

/// Forwards the identifier to a notification callback.
///
/// A callback returning `false` fails the activity, so the executor's retry
/// policy decides whether it is attempted again.
#[derive(Clone)]
pub struct CallbackAlertActivity {
    name: String,
    callback: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl CallbackAlertActivity {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for CallbackAlertActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAlertActivity")
            .field("name", &self.name)
            .finish()
    }
}

impl Activity for CallbackAlertActivity {
    fn execute(&self, _ctx: &ActivityContext, input: Option<Vec<u8>>) -> ActivityFuture {
        let this = self.clone();
        Box::pin(async move {
            let identifier = decode_identifier(input)?;
            if !(this.callback)(&identifier) {
                return Err(ActivityError::application(format!(
                    "Notification callback {} failed to complete",
                    this.name
                )));
            }
            accepted()
        })
    }
}

/// Register [`LogAlertActivity`] for both alert kinds.
pub fn register_log_alerts(registry: &dyn Registry) {
    for kind in [AlertKind::Error, AlertKind::Success] {
        registry.register_activity(kind.activity_name(), Box::new(LogAlertActivity::new(kind)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActivityRegistry;
    use dbtflow_activity::ActivityInfo;

    fn ctx() -> ActivityContext {
        ActivityContext::new(ActivityInfo::new("1", "alert_error"))
    }

    fn identifier(value: &str) -> Option<Vec<u8>> {
        Some(JsonDataConverter::new().encode(&value).unwrap())
    }

    #[tokio::test]
    async fn test_log_alert_succeeds() {
        let registry = ActivityRegistry::new();
        register_log_alerts(&registry);
        let alert = registry.get_activity("alert_success").unwrap();
        let output = alert
            .execute(&ctx(), identifier("dev--./test--completed"))
            .await
            .unwrap();
        assert_eq!(output, b"true");
        assert!(registry.get_activity("alert_error").is_some());
    }

    #[tokio::test]
    async fn test_callback_alert_failure() {
        let activity = CallbackAlertActivity::new("slack", |id: &str| id.ends_with("completed"));

        let ok = activity
            .execute(&ctx(), identifier("dev--./test--completed"))
            .await;
        assert!(ok.is_ok());

        let err = activity
            .execute(&ctx(), identifier("dev--./test--run"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ActivityError::Application("Notification callback slack failed to complete".into())
        );
    }

    #[tokio::test]
    async fn test_alert_requires_identifier() {
        let err = LogAlertActivity::new(AlertKind::Error)
            .execute(&ctx(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::NonRetryable(_)));
    }
}
