//! `start` / `stop`: scan lifecycle across the whole fleet.

use tabled::Tabled;
use tagflow_core::{AggregateOutcome, EndpointOutcome, ScanMode, TagService};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Reader")]
    reader: String,
    #[tabled(rename = "OK")]
    ok: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn outcome_row(outcome: &EndpointOutcome, color: bool) -> OutcomeRow {
    OutcomeRow {
        reader: outcome.endpoint.clone(),
        ok: output::yes_no(outcome.success, color),
        detail: outcome.detail.clone(),
    }
}

pub async fn start(service: &TagService, mode: ScanMode, global: &GlobalOpts) -> Result<(), CliError> {
    let outcome = service.start_all(mode).await;
    report(&format!("{mode} scan start"), &outcome, global)
}

/// Forces every device back to idle; session state does not outlive a process.
pub async fn stop(service: &TagService, global: &GlobalOpts) -> Result<(), CliError> {
    let outcome = service.reset_all().await;
    report("scan stop", &outcome, global)
}

fn report(operation: &str, outcome: &AggregateOutcome, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        &outcome.endpoints,
        |o| outcome_row(o, color),
        |o| format!("{}\t{}", o.endpoint, o.success),
    );
    output::print_output(&out, global.quiet);

    let failed = outcome.failed().count();
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::PartialFailure {
            operation: operation.to_owned(),
            failed,
            total: outcome.endpoints.len(),
        })
    }
}
