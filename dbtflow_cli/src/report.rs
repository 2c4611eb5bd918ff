//! Run report output.

use anyhow::Result;
use dbtflow::workflow::{DeliveryRecord, ExecutionOutcome, RunReport};
use serde::Serialize;
use std::fmt::Write;

#[derive(Serialize)]
struct JsonReport<'a> {
    success: bool,
    error: Option<String>,
    #[serde(flatten)]
    report: &'a RunReport,
}

pub fn print_report(outcome: &ExecutionOutcome, json: bool) -> Result<()> {
    if json {
        let report = JsonReport {
            success: outcome.success,
            error: outcome.error.as_ref().map(ToString::to_string),
            report: &outcome.report,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(outcome)?);
    }
    Ok(())
}

fn render_text(outcome: &ExecutionOutcome) -> Result<String> {
    let report = &outcome.report;
    let mut out = String::new();

    writeln!(
        out,
        "pipeline {} ({})",
        report.params.project_location, report.params.env
    )?;
    if let Some(session) = &report.session {
        writeln!(out, "  session   {}", session.session_id)?;
    }
    for step in &report.steps {
        let status = if step.succeeded { "ok" } else { "FAILED" };
        writeln!(
            out,
            "  {:<12} {:>6} {:>8}ms",
            step.step.name(),
            status,
            step.elapsed_ms
        )?;
        if let Some(error) = &step.error {
            writeln!(out, "    {}", error)?;
        }
    }
    if let Some(alert) = &report.alert {
        writeln!(out, "  {}", delivery_line(alert))?;
    }
    if let Some(cleanup) = &report.cleanup {
        writeln!(out, "  {}", delivery_line(cleanup))?;
    }
    match &outcome.error {
        None => writeln!(out, "succeeded")?,
        Some(err) => writeln!(out, "failed: {}", err)?,
    }
    Ok(out)
}

fn delivery_line(record: &DeliveryRecord) -> String {
    match &record.error {
        None => format!("{:<12} sent", record.activity),
        Some(error) => format!("{:<12} not delivered: {}", record.activity, error),
    }
}
