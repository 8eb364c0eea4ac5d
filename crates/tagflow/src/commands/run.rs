//! `run`: the long-lived service.
//!
//! Starts health polling and ingestion, optionally begins a scan and opens
//! the line listener, then streams every observer event to stdout as one
//! JSON object per line until Ctrl-C.

use tagflow_core::TagService;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::listener;
use crate::output;

pub async fn handle(service: &TagService, args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    service.spawn_background().await;
    let cancel = CancellationToken::new();

    if let Some(mode) = args.start {
        let outcome = service.start_all(mode.into()).await;
        for failed in outcome.failed() {
            warn!(endpoint = %failed.endpoint, detail = %failed.detail, "reader did not start");
        }
    }

    let listener_task = match args.listen {
        Some(addr) => {
            let socket = TcpListener::bind(addr).await?;
            info!(%addr, "listening for commands and pushed reads");
            Some(tokio::spawn(listener::serve(
                socket,
                service.clone(),
                args.push_reader.clone(),
                cancel.clone(),
            )))
        }
        None => None,
    };

    let mut events = service.subscribe();
    loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "could not listen for Ctrl-C");
                }
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(event) => output::print_output(&output::render_json_line(&*event), global.quiet),
                None => break,
            },
        }
    }

    cancel.cancel();
    if let Some(task) = listener_task {
        let _ = task.await;
    }
    service.shutdown().await;
    Ok(())
}
