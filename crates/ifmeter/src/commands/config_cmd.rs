//! Config subcommand handlers.

use std::path::PathBuf;

use ifmeter_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "****";

/// `--config` if given, else the platform config path.
pub fn resolved_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Copy of `cfg` safe to print: the community string is masked.
fn redacted(cfg: &Config) -> Config {
    let mut shown = cfg.clone();
    shown.snmp.community = REDACTED.into();
    shown
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = resolved_path(global);

    match args.command {
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config(Some(path.as_path()))?);
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::ConfigWrite(e.to_string()))?,
                _ => output::render_single(&global.output, &cfg, |_| String::new(), |_| {
                    String::new()
                })?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_is_masked() {
        let cfg = Config::default();
        let shown = redacted(&cfg);
        assert_eq!(shown.snmp.community, REDACTED);
        assert_eq!(shown.poll, cfg.poll);
    }
}
