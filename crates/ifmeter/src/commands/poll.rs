//! One-shot poll cycles.

use std::sync::Arc;

use ifmeter_core::{CycleReport, CycleSummary, NoopMetrics, PollKind};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{GlobalOpts, PollCommand};
use crate::error::CliError;
use crate::output;
use crate::state::State;

#[derive(Serialize)]
struct CycleView {
    kind: String,
    completed: bool,
    skipped: Option<String>,
    sources: usize,
    succeeded: usize,
    failed: usize,
    interfaces: usize,
    elapsed_ms: u64,
    charging_records: usize,
    trace_records: usize,
}

impl CycleView {
    fn new(kind: PollKind, report: &CycleReport) -> Self {
        let (completed, skipped, summary) = match report {
            CycleReport::Completed(summary) => (true, None, summary.clone()),
            CycleReport::Skipped(reason) => {
                (false, Some(reason.to_string()), CycleSummary::default())
            }
        };
        Self {
            kind: kind.to_string(),
            completed,
            skipped,
            sources: summary.sources,
            succeeded: summary.succeeded,
            failed: summary.failed,
            interfaces: summary.interfaces,
            elapsed_ms: u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            charging_records: summary.charging_records,
            trace_records: summary.trace_records,
        }
    }
}

#[derive(Tabled)]
struct CycleRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn detail(v: &CycleView) -> String {
    if let Some(reason) = &v.skipped {
        return format!("{} poll skipped: {reason}", v.kind);
    }
    let rows = [
        CycleRow {
            field: "Sources",
            value: v.sources.to_string(),
        },
        CycleRow {
            field: "Succeeded",
            value: v.succeeded.to_string(),
        },
        CycleRow {
            field: "Failed",
            value: v.failed.to_string(),
        },
        CycleRow {
            field: "Interfaces",
            value: v.interfaces.to_string(),
        },
        CycleRow {
            field: "Elapsed",
            value: format!("{} ms", v.elapsed_ms),
        },
        CycleRow {
            field: "Charging records",
            value: v.charging_records.to_string(),
        },
        CycleRow {
            field: "Trace records",
            value: v.trace_records.to_string(),
        },
    ];
    tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string()
}

pub async fn handle(
    state: &State,
    command: PollCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let kind = match command {
        PollCommand::Status => PollKind::Status,
        PollCommand::Counters => PollKind::Counters,
    };
    let scheduler = state.scheduler(Arc::new(NoopMetrics))?;
    let report = scheduler.run_cycle(kind).await;
    // Counter cycles persist on their own; status cycles do not.
    if kind == PollKind::Status {
        scheduler.persist().await;
    }

    let view = CycleView::new(kind, &report);
    let out = output::render_single(&global.output, &view, detail, |v| {
        v.skipped.clone().unwrap_or_else(|| v.succeeded.to_string())
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
