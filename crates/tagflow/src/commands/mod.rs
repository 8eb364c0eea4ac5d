//! Command dispatch: bridges CLI args -> service operations -> output formatting.

pub mod config_cmd;
pub mod decode;
pub mod health;
pub mod run;
pub mod scan;
pub mod zone;

use tagflow_core::TagService;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a reader-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, service: &TagService, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(service, &args, global).await,
        Command::Start(args) => scan::start(service, args.mode.into(), global).await,
        Command::Stop => scan::stop(service, global).await,
        Command::Health(args) => health::handle(service, &args, global).await,
        // Handled before a service is built
        Command::Config(_) | Command::Completions(_) | Command::Decode(_) | Command::Zone(_) => {
            unreachable!()
        }
    }
}
