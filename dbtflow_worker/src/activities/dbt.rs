//! dbt command activities.
//!
//! Each pipeline step is one dbt invocation in a child process:
//! `<dbt_bin> <command...> --project-dir <project> [--profiles-dir <profiles>]
//! --target <env>`. A non-zero exit code fails the activity.

use crate::registry::{Activity, Registry};
use async_trait::async_trait;
use dbtflow_activity::ActivityContext;
use dbtflow_core::{
    decode_input, ActivityError, DataConverter, JsonDataConverter, RunParams, Step,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Receives the JSON artifacts dbt wrote for a step.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store artifacts keyed by file stem (`manifest`, `run_results`, ...).
    async fn store(&self, identifier: &str, artifacts: HashMap<String, serde_json::Value>) -> bool;
}

/// How dbt is invoked by the worker
#[derive(Clone)]
pub struct DbtSettings {
    /// Executable to run
    pub dbt_bin: PathBuf,
    /// Write dbt's target directory to a scratch location that is removed
    /// after the step
    pub prevent_writes: bool,
    pub artifact_sink: Option<Arc<dyn ArtifactSink>>,
}

impl Default for DbtSettings {
    fn default() -> Self {
        Self {
            dbt_bin: PathBuf::from("dbt"),
            prevent_writes: false,
            artifact_sink: None,
        }
    }
}

impl fmt::Debug for DbtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbtSettings")
            .field("dbt_bin", &self.dbt_bin)
            .field("prevent_writes", &self.prevent_writes)
            .field("artifact_sink", &self.artifact_sink.is_some())
            .finish()
    }
}

/// Captured result of one dbt invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct DbtResults {
    pub exit_code: i32,
    pub log_string: String,
    pub outputs: HashMap<String, serde_json::Value>,
}

impl DbtResults {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// dbt sub-command for a step.
pub fn dbt_command(step: Step) -> &'static [&'static str] {
    match step {
        Step::Debug => &["debug"],
        Step::Deps => &["deps"],
        Step::TestSource => &["test", "--select", "source:*"],
        Step::Run => &["run", "--fail-fast"],
        Step::Test => &["test"],
        Step::Clean => &["clean"],
        Step::DocsGenerate => &["docs", "generate"],
    }
}

/// Arguments passed to the dbt executable for a step.
pub fn dbt_args(step: Step, params: &RunParams, target_path: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = dbt_command(step).iter().map(|s| s.to_string()).collect();
    args.push("--project-dir".into());
    args.push(params.project_location.clone());
    if let Some(profiles) = &params.profile_location {
        args.push("--profiles-dir".into());
        args.push(profiles.clone());
    }
    args.push("--target".into());
    args.push(params.env.clone());
    if let Some(target_path) = target_path {
        args.push("--target-path".into());
        args.push(target_path.display().to_string());
    }
    args
}

/// Scratch target directory, removed when dropped
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    async fn create() -> Result<Self, ActivityError> {
        let path = std::env::temp_dir().join(format!("dbtflow-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            ActivityError::non_retryable(format!(
                "failed to create scratch directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

/// Run dbt for a step and capture its output.
///
/// Artifacts are read from the target directory only when a sink is
/// configured and the step produces them.
pub async fn run_dbt(
    step: Step,
    params: &RunParams,
    settings: &DbtSettings,
) -> Result<DbtResults, ActivityError> {
    let scratch = if settings.prevent_writes {
        Some(ScratchDir::create().await?)
    } else {
        None
    };
    let args = dbt_args(step, params, scratch.as_ref().map(|s| s.path.as_path()));
    debug!(dbt_bin = %settings.dbt_bin.display(), ?args, "invoking dbt");

    let output = Command::new(&settings.dbt_bin)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            ActivityError::non_retryable(format!(
                "failed to start {}: {}",
                settings.dbt_bin.display(),
                e
            ))
        })?;

    let mut results = DbtResults {
        exit_code: output.status.code().unwrap_or(-1),
        log_string: String::from_utf8_lossy(&output.stdout).into_owned(),
        outputs: HashMap::new(),
    };
    if !output.stderr.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if results.succeeded() {
            debug!(stderr = %stderr, "dbt stderr");
        } else {
            error!(stderr = %stderr, "dbt stderr");
        }
    }

    if results.succeeded() && settings.artifact_sink.is_some() && collects_artifacts(step) {
        let target = match &scratch {
            Some(scratch) => scratch.path.clone(),
            None => Path::new(&params.project_location).join("target"),
        };
        results.outputs = collect_artifacts(&target).await;
    }

    Ok(results)
}

/// Steps whose target directory is handed to the artifact sink.
fn collects_artifacts(step: Step) -> bool {
    matches!(step, Step::Run | Step::DocsGenerate)
}

/// Read every JSON file in `dir`, keyed by file stem.
async fn collect_artifacts(dir: &Path) -> HashMap<String, serde_json::Value> {
    let mut artifacts = HashMap::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read dbt target directory");
            return artifacts;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list dbt artifacts");
                break;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        let parsed = tokio::fs::read(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<serde_json::Value>(&bytes).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(value) => {
                artifacts.insert(stem.to_string(), value);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable artifact"),
        }
    }

    artifacts
}

/// Activity running the dbt command of one step
#[derive(Debug, Clone)]
pub struct DbtCommandActivity {
    step: Step,
    settings: Arc<DbtSettings>,
}

impl DbtCommandActivity {
    pub fn new(step: Step, settings: Arc<DbtSettings>) -> Self {
        Self { step, settings }
    }

    async fn handle(
        self,
        input: Option<Vec<u8>>,
        remaining: Option<Duration>,
    ) -> Result<Vec<u8>, ActivityError> {
        let converter = JsonDataConverter::new();
        let params: RunParams = decode_input(&converter, input.as_deref())?;
        let identifier = format!(
            "{}--{}--{}",
            params.env,
            self.step.name(),
            params.project_stem()
        );
        info!(
            identifier = %identifier,
            remaining_secs = remaining.map(|r| r.as_secs()),
            "Commencing activity"
        );

        let results = run_dbt(self.step, &params, &self.settings).await?;
        if !results.succeeded() {
            error!(
                identifier = %identifier,
                code = results.exit_code,
                output = %results.log_string,
                "dbt command failed"
            );
            return Err(ActivityError::application(format!(
                "Error occurred in {} with code {}",
                identifier, results.exit_code
            )));
        }
        debug!(identifier = %identifier, output = %results.log_string, "dbt command finished");

        let stored = match &self.settings.artifact_sink {
            Some(sink) if collects_artifacts(self.step) => {
                sink.store(&identifier, results.outputs).await
            }
            _ => true,
        };
        Ok(converter.encode(&stored)?)
    }
}

impl Activity for DbtCommandActivity {
    fn execute(
        &self,
        ctx: &ActivityContext,
        input: Option<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ActivityError>> + Send>> {
        Box::pin(self.clone().handle(input, ctx.get_remaining_time()))
    }
}

/// Register one [`DbtCommandActivity`] per step under the step's name.
pub fn register_dbt_activities(registry: &dyn Registry, settings: DbtSettings) {
    let settings = Arc::new(settings);
    for step in Step::ALL {
        registry.register_activity(
            step.name(),
            Box::new(DbtCommandActivity::new(step, Arc::clone(&settings))),
        );
    }
}
