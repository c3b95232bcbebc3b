mod cli;
mod commands;
mod error;
mod output;
mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, GlobalOpts, LogFormat};
use crate::error::CliError;
use crate::state::State;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(&cli.global);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(global: &GlobalOpts) {
    let filter = match (global.quiet, global.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);

    match global.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands work without a valid config
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "ifmeter", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let config_path = commands::config_cmd::resolved_path(&cli.global);
            let config = ifmeter_config::load_config(Some(config_path.as_path()))?;
            // Collector commands survive a broken snapshot; admin commands don't.
            let state = if matches!(cmd, Command::Run(_) | Command::Poll(_)) {
                State::restore(config, config_path).await
            } else {
                State::load(config, config_path).await?
            };

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &state, &cli.global).await
        }
    }
}
