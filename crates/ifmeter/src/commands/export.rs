//! Export command: render records from the current state.

use chrono::Utc;
use ifmeter_core::export::{charging_records, trace_records};
use ifmeter_core::ExportKind;

use crate::cli::{ExportArgs, ExportCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;
use crate::state::State;

pub async fn handle(state: &State, args: &ExportArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let format = state.config().collector_config()?.export;
    let registry = state.registry();
    let (kind, batch) = match args.command {
        ExportCommand::Charging => (
            ExportKind::Charging,
            charging_records(registry, &format).await,
        ),
        ExportCommand::Trace => (ExportKind::Trace, trace_records(registry, &format).await),
    };

    if args.deliver {
        state
            .config()
            .export_sink()
            .deliver(kind, &batch, Utc::now())
            .await?;
        if !global.quiet {
            eprintln!("{} {kind} records delivered", batch.records);
        }
    } else {
        // Rows already end in newlines.
        output::print_output(batch.body.trim_end_matches('\n'), global.quiet);
    }
    Ok(())
}
