//! Source command handlers.

use std::collections::BTreeMap;
use std::path::Path;

use ifmeter_core::{InterfaceFilter, NewSource, SourceStatus, SourceSummary, SourceUpdate};
use tabled::Tabled;
use tokio::io::AsyncReadExt;

use crate::cli::{GlobalOpts, SnmpOverrides, SourcesCommand};
use crate::error::CliError;
use crate::output;
use crate::state::State;

use super::interfaces;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Ifaces")]
    interfaces: usize,
    #[tabled(rename = "Up")]
    up: usize,
    #[tabled(rename = "Charged")]
    chargeable: usize,
    #[tabled(rename = "Last Poll")]
    poll_time: String,
}

impl SourceRow {
    fn new(s: &SourceSummary, color: bool) -> Self {
        Self {
            ip: s.ip.to_string(),
            status: output::paint_status(s.status, color),
            name: s.sys_name.clone().unwrap_or_default(),
            uptime: uptime(s.sys_uptime),
            interfaces: s.interfaces,
            up: s.up_interfaces,
            chargeable: s.chargeable_interfaces,
            poll_time: s
                .poll_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        }
    }
}

/// sysUpTime (hundredths of a second) as a human duration.
fn uptime(ticks: u64) -> String {
    if ticks == 0 {
        return String::new();
    }
    humantime::format_duration(std::time::Duration::from_secs(ticks / 100)).to_string()
}

fn detail(s: &SourceSummary) -> String {
    [
        format!("IP:            {}", s.ip),
        format!("Status:        {} ({})", s.status, s.status.message()),
        format!("Name:          {}", s.sys_name.as_deref().unwrap_or("-")),
        format!("Description:   {}", s.sys_descr.as_deref().unwrap_or("-")),
        format!("Location:      {}", s.sys_location.as_deref().unwrap_or("-")),
        format!("Object ID:     {}", s.sys_object_id.as_deref().unwrap_or("-")),
        format!("Uptime:        {}", uptime(s.sys_uptime)),
        format!("Community:     {}", s.community),
        format!("Retries:       {}", s.retries),
        format!("Timeout:       {} ms", s.timeout_ms),
        format!(
            "Interfaces:    {} ({} up, {} down)",
            s.interfaces, s.up_interfaces, s.down_interfaces
        ),
        format!("Chargeable:    {}", s.chargeable_interfaces),
        format!("Traced:        {}", s.trace_interfaces),
        format!(
            "Last poll:     {}",
            s.poll_time.map_or_else(|| "-".into(), |t| t.to_rfc3339())
        ),
        format!("Response:      {} ms", s.poll_response_ms),
    ]
    .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    state: &State,
    command: SourcesCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let registry = state.registry();
    let color = output::should_color(&global.color);

    match command {
        SourcesCommand::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let sources = registry.summaries(status).await;
            let out = output::render_list(
                &global.output,
                &sources,
                |s| SourceRow::new(s, color),
                |s| s.ip.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SourcesCommand::Show { ip } => {
            let source = registry.summary(&ip).await?;
            let out =
                output::render_single(&global.output, &source, detail, |s| s.ip.to_string())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SourcesCommand::Add {
            ip,
            snmp,
            port,
            tags,
        } => {
            state.require_recovery()?;
            let SnmpOverrides {
                community,
                retries,
                timeout,
            } = snmp;
            registry.add(
                &ip,
                NewSource {
                    community,
                    retries,
                    timeout,
                    port,
                    tags: tags.into_iter().collect(),
                },
            )?;
            state.save().await?;
            if !global.quiet {
                eprintln!("Source {ip} added");
            }
            Ok(())
        }

        SourcesCommand::Remove { ip } => {
            state.require_recovery()?;
            registry.remove(&ip)?;
            state.save().await?;
            if !global.quiet {
                eprintln!("Source {ip} removed");
            }
            Ok(())
        }

        SourcesCommand::Update {
            ip,
            snmp,
            tags,
            remove_tags,
        } => {
            state.require_recovery()?;
            registry
                .update(
                    &ip,
                    SourceUpdate {
                        community: snmp.community,
                        retries: snmp.retries,
                        timeout: snmp.timeout,
                        tags: tags.into_iter().collect::<BTreeMap<_, _>>(),
                        remove_tags,
                    },
                )
                .await?;
            state.save().await?;
            if !global.quiet {
                eprintln!("Source {ip} updated");
            }
            Ok(())
        }

        SourcesCommand::Import { file, delimiter } => {
            state.require_recovery()?;
            if delimiter.is_empty() {
                return Err(CliError::Validation {
                    field: "delimiter".into(),
                    reason: "must not be empty".into(),
                });
            }
            let text = read_input(&file).await?;
            let added = registry.import(&text, &delimiter);
            state.save().await?;
            output::print_output(&format!("{added} sources imported"), global.quiet);
            Ok(())
        }

        SourcesCommand::Interfaces { ip, filter } => {
            let rows = registry
                .source_interfaces(&ip, &InterfaceFilter::from(&filter))
                .await?;
            interfaces::print(&rows, global)
        }
    }
}

fn parse_status(text: &str) -> Result<SourceStatus, CliError> {
    text.parse().map_err(|_| CliError::Validation {
        field: "status".into(),
        reason: format!(
            "unknown status '{text}' (expected success, timeout, no_pdu, other_error, unknown or no_iftable)"
        ),
    })
}

async fn read_input(path: &Path) -> Result<String, CliError> {
    if path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        Ok(text)
    } else {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_is_case_insensitive() {
        assert_eq!(parse_status("no_pdu").unwrap(), SourceStatus::NoPdu);
        assert_eq!(parse_status("SUCCESS").unwrap(), SourceStatus::Success);
        assert!(parse_status("up").is_err());
    }

    #[test]
    fn uptime_uses_timeticks() {
        assert_eq!(uptime(0), "");
        assert_eq!(uptime(360_000), "1h");
    }
}
