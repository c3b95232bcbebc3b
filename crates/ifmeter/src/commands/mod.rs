//! Command dispatch: bridges CLI args -> registry / scheduler -> output.

pub mod config_cmd;
pub mod export;
pub mod interfaces;
pub mod poll;
pub mod run;
pub mod sources;
pub mod stats;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::state::State;

/// Dispatch a registry-bound command to its handler.
pub async fn dispatch(cmd: Command, state: &State, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(state, &args).await,
        Command::Poll(args) => poll::handle(state, args.command, global).await,
        Command::Sources(args) => sources::handle(state, args.command, global).await,
        Command::Interfaces(args) => interfaces::handle(state, args.command, global).await,
        Command::Export(args) => export::handle(state, &args, global).await,
        Command::Stats(args) => stats::handle(state, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are not dispatched".into(),
        )),
    }
}
