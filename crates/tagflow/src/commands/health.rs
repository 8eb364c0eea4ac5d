//! `health`: one poll cycle over every reader, then a report on all of
//! them or on the one named.

use chrono::{DateTime, Utc};
use tabled::Tabled;
use tagflow_core::{HealthRecord, TagService};

use crate::cli::{GlobalOpts, HealthArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct HealthRow {
    #[tabled(rename = "Reader")]
    reader: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Reachable")]
    reachable: String,
    #[tabled(rename = "Auth")]
    authenticated: String,
    #[tabled(rename = "Failures")]
    failures: u32,
    #[tabled(rename = "Last Success")]
    last_success: String,
    #[tabled(rename = "Last Error")]
    last_error: String,
}

fn timestamp(at: Option<DateTime<Utc>>, color: bool) -> String {
    at.map_or_else(
        || output::muted("-", color),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn health_row(record: &HealthRecord, color: bool) -> HealthRow {
    HealthRow {
        reader: record.endpoint.clone(),
        state: record.session_state.to_string(),
        reachable: output::yes_no(record.reachable, color),
        authenticated: output::yes_no(record.authenticated, color),
        failures: record.consecutive_failures,
        last_success: timestamp(record.last_success_at, color),
        last_error: record
            .last_error
            .clone()
            .unwrap_or_else(|| output::muted("-", color)),
    }
}

pub async fn handle(service: &TagService, args: &HealthArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let report = service.poll_health().await;
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "health poll finished"
    );

    let records = match args.reader.as_deref() {
        Some(name) => vec![service.endpoint_health(name)?],
        None => service.health(),
    };
    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        &records,
        |r| health_row(r, color),
        |r| format!("{}\t{}", r.endpoint, if r.reachable { "up" } else { "down" }),
    );
    output::print_output(&out, global.quiet);

    if records.iter().all(|r| r.reachable) {
        Ok(())
    } else {
        Err(CliError::PartialFailure {
            operation: "health check".into(),
            failed: records.iter().filter(|r| !r.reachable).count(),
            total: records.len(),
        })
    }
}
