//! Stats command handler.

use ifmeter_core::{InterfaceStats, SourceStatus};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{GlobalOpts, StatsArgs};
use crate::error::CliError;
use crate::output;
use crate::state::State;

#[derive(Serialize)]
struct StatusCount {
    status: SourceStatus,
    code: u8,
    sources: usize,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Code")]
    code: u8,
    #[tabled(rename = "Sources")]
    sources: usize,
}

fn interface_detail(s: &InterfaceStats) -> String {
    [
        format!("Interfaces:  {}", s.interfaces),
        format!("Chargeable:  {}", s.chargeable),
        format!("Traced:      {}", s.trace),
    ]
    .join("\n")
}

pub async fn handle(state: &State, args: &StatsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = state.registry();

    let out = if args.interfaces {
        let stats = registry.interface_stats().await;
        output::render_single(&global.output, &stats, interface_detail, |s| {
            s.interfaces.to_string()
        })?
    } else {
        let color = output::should_color(&global.color);
        let counts: Vec<StatusCount> = registry
            .stats()
            .await
            .into_iter()
            .map(|(status, sources)| StatusCount {
                status,
                code: status.code(),
                sources,
            })
            .collect();
        output::render_list(
            &global.output,
            &counts,
            |c| StatusRow {
                status: output::paint_status(c.status, color),
                code: c.code,
                sources: c.sources,
            },
            |c| format!("{} {}", c.status, c.sources),
        )?
    };

    output::print_output(&out, global.quiet);
    Ok(())
}
