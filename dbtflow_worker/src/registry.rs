//! Activity registry.
//!
//! Activities are registered by name and looked up by the executor for each
//! invocation.

use dashmap::DashMap;
use dbtflow_activity::ActivityContext;
use dbtflow_core::ActivityError;
use dyn_clone::DynClone;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Activity trait
pub trait Activity: Send + Sync + DynClone {
    fn execute(
        &self,
        ctx: &ActivityContext,
        input: Option<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ActivityError>> + Send>>;
}

dyn_clone::clone_trait_object!(Activity);

/// Registry trait
pub trait Registry: Send + Sync {
    /// Register an activity, replacing any previous one with the same name
    fn register_activity(&self, name: &str, activity: Box<dyn Activity>);

    /// Get registered activity info
    fn get_registered_activities(&self) -> Vec<RegistryInfo>;

    /// Get activity by name
    fn get_activity(&self, name: &str) -> Option<Box<dyn Activity>>;
}

/// Registry information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryInfo {
    pub name: String,
    pub type_name: String,
}

/// Activity registry implementation using DashMap for concurrent access
pub struct ActivityRegistry {
    activities: Arc<DashMap<String, Box<dyn Activity>>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            activities: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ActivityRegistry {
    fn clone(&self) -> Self {
        Self {
            activities: Arc::clone(&self.activities),
        }
    }
}

impl Registry for ActivityRegistry {
    fn register_activity(&self, name: &str, activity: Box<dyn Activity>) {
        self.activities.insert(name.to_string(), activity);
    }

    fn get_registered_activities(&self) -> Vec<RegistryInfo> {
        let mut infos: Vec<_> = self
            .activities
            .iter()
            .map(|entry| RegistryInfo {
                name: entry.key().clone(),
                type_name: "activity".to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn get_activity(&self, name: &str) -> Option<Box<dyn Activity>> {
        self.activities.get(name).map(|entry| entry.clone())
    }
}

/// Activity backed by an async closure
#[derive(Clone)]
pub struct FnActivity<F>(F);

impl<F, Fut> Activity for FnActivity<F>
where
    F: Fn(ActivityContext, Option<Vec<u8>>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, ActivityError>> + Send + 'static,
{
    fn execute(
        &self,
        ctx: &ActivityContext,
        input: Option<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ActivityError>> + Send>> {
        Box::pin((self.0)(ctx.clone(), input))
    }
}

/// Box an async closure as an [`Activity`].
pub fn activity_fn<F, Fut>(f: F) -> Box<dyn Activity>
where
    F: Fn(ActivityContext, Option<Vec<u8>>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, ActivityError>> + Send + 'static,
{
    Box::new(FnActivity(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbtflow_activity::ActivityInfo;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ActivityRegistry::new();
        registry.register_activity(
            "debug",
            activity_fn(|_ctx, _input| async { Ok(b"true".to_vec()) }),
        );
        registry.register_activity(
            "deps",
            activity_fn(|_ctx, input| async move { Ok(input.unwrap_or_default()) }),
        );

        let names: Vec<_> = registry
            .get_registered_activities()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, ["debug", "deps"]);

        let ctx = ActivityContext::new(ActivityInfo::new("1", "deps"));
        let deps = registry.get_activity("deps").unwrap();
        let output = deps.execute(&ctx, Some(b"echo".to_vec())).await.unwrap();
        assert_eq!(output, b"echo");
        assert!(registry.get_activity("run").is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let registry = ActivityRegistry::new();
        let clone = registry.clone();
        clone.register_activity("clean", activity_fn(|_, _| async { Ok(vec![]) }));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}
