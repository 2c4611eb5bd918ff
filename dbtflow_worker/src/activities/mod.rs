//! Activities hosted by the dbtflow worker.

pub mod alert;
pub mod dbt;

pub use alert::{register_log_alerts, CallbackAlertActivity, LogAlertActivity};
pub use dbt::{
    dbt_args, dbt_command, register_dbt_activities, run_dbt, ArtifactSink, DbtCommandActivity,
    DbtResults, DbtSettings,
};
