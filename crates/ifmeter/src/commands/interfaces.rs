//! Interface command handlers.

use ifmeter_core::{
    FlowDirection, InterfaceFilter, InterfaceSelection, InterfaceSummary, InterfaceUpdate,
};
use tabled::Tabled;

use crate::cli::{GlobalOpts, InterfaceFilterArgs, InterfacesCommand};
use crate::error::CliError;
use crate::output;
use crate::state::State;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Source")]
    ip: String,
    #[tabled(rename = "Idx")]
    if_index: u32,
    #[tabled(rename = "Descr")]
    descr: String,
    #[tabled(rename = "Alias")]
    alias: String,
    #[tabled(rename = "Up")]
    up: &'static str,
    #[tabled(rename = "Charge")]
    chargeable: &'static str,
    #[tabled(rename = "Trace")]
    trace: &'static str,
    #[tabled(rename = "Dir")]
    direction: String,
    #[tabled(rename = "In")]
    poll_in: u64,
    #[tabled(rename = "Out")]
    poll_out: u64,
}

impl From<&InterfaceSummary> for InterfaceRow {
    fn from(i: &InterfaceSummary) -> Self {
        Self {
            ip: i.ip.to_string(),
            if_index: i.if_index,
            descr: i.if_descr.clone(),
            alias: i.if_alias.clone().unwrap_or_default(),
            up: output::flag(i.up),
            chargeable: output::flag(i.chargeable),
            trace: output::flag(i.trace),
            direction: i.direction.to_string(),
            poll_in: i.poll_in_octets,
            poll_out: i.poll_out_octets,
        }
    }
}

impl From<&InterfaceFilterArgs> for InterfaceFilter {
    fn from(args: &InterfaceFilterArgs) -> Self {
        Self {
            chargeable: args.chargeable,
            trace: args.trace,
            up: args.up,
        }
    }
}

/// Render interface summaries in the selected output format.
pub fn print(rows: &[InterfaceSummary], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(
        &global.output,
        rows,
        |i| InterfaceRow::from(i),
        |i| format!("{} {}", i.ip, i.if_descr),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    state: &State,
    command: InterfacesCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match command {
        InterfacesCommand::List { filter } => {
            let rows = state
                .registry()
                .interfaces(&InterfaceFilter::from(&filter))
                .await;
            print(&rows, global)
        }

        InterfacesCommand::Update {
            ip,
            descrs,
            all,
            chargeable,
            trace,
            polling,
            direction,
            tags,
        } => {
            state.require_recovery()?;
            let direction = direction.as_deref().map(parse_direction).transpose()?;
            let updated = state
                .registry()
                .update_interfaces(
                    &ip,
                    selection(descrs, all),
                    InterfaceUpdate {
                        chargeable,
                        trace,
                        polling,
                        direction,
                        tags: tags.into_iter().collect(),
                    },
                )
                .await?;
            state.save().await?;
            output::print_output(&format!("{updated} interfaces updated"), global.quiet);
            Ok(())
        }
    }
}

fn selection(mut descrs: Vec<String>, all: bool) -> InterfaceSelection {
    if all {
        return InterfaceSelection::All;
    }
    match descrs.len() {
        1 => InterfaceSelection::One(descrs.remove(0)),
        _ => InterfaceSelection::Many(descrs),
    }
}

fn parse_direction(text: &str) -> Result<FlowDirection, CliError> {
    text.parse().map_err(|_| CliError::Validation {
        field: "direction".into(),
        reason: format!("unknown direction '{text}' (expected ingress or egress)"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_descr_is_strict_selection() {
        assert!(matches!(
            selection(vec!["eth0".into()], false),
            InterfaceSelection::One(d) if d == "eth0"
        ));
        assert!(matches!(
            selection(vec!["eth0".into(), "eth1".into()], false),
            InterfaceSelection::Many(d) if d.len() == 2
        ));
        assert!(matches!(selection(Vec::new(), true), InterfaceSelection::All));
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!(parse_direction("Egress").unwrap(), FlowDirection::Egress);
        assert!(parse_direction("sideways").is_err());
    }
}
