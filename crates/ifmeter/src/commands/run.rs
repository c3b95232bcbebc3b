//! Long-running collector.

use std::sync::Arc;

use ifmeter_core::{InMemoryMetrics, PollKind};
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::state::State;

pub async fn handle(state: &State, args: &RunArgs) -> Result<(), CliError> {
    let metrics = Arc::new(InMemoryMetrics::new());
    let scheduler = state.scheduler(metrics.clone())?;

    if args.once {
        for kind in [PollKind::Status, PollKind::Counters] {
            let report = scheduler.run_cycle(kind).await;
            info!(%kind, ?report, "cycle finished");
        }
        scheduler.persist().await;
    } else {
        info!(sources = state.registry().len(), "collector starting");
        scheduler.start().await;
        tokio::signal::ctrl_c().await?;
        info!("interrupt received, stopping");
        scheduler.shutdown().await;
    }

    info!(metrics = ?metrics.snapshot(), "collector stopped");
    Ok(())
}
