// ABOUTME: Entry point for the zfs-remote CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use tracing_subscriber::EnvFilter;
use zfs_remote::config::{self, Config};
use zfs_remote::error::{Error, Result};
use zfs_remote::output::{Output, OutputMode};
use zfs_remote::remote::RemoteTarget;

fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Normal
    });

    if let Err(e) = run(cli, &output) {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: Cli, output: &Output) -> Result<()> {
    match cli.command {
        Commands::Init { force } => {
            let cwd = env::current_dir()?;
            let path = config::init_config(&cwd, cli.target, force)?;
            output.success(&format!("Created {}", path.display()));
            Ok(())
        }
        Commands::Identity => {
            let target = load_target(&cli)?;
            output.success(&target.to_string());
            Ok(())
        }
        Commands::Check => {
            let mut target = load_target(&cli)?;
            output.progress(&format!("Connecting to {}...", target));

            let session = target.new_session()?;
            let id = session.connection_id();
            drop(session);

            target.close()?;
            output.success(&format!("{} reachable ({})", target, id));
            Ok(())
        }
        Commands::Exec {
            repeat,
            ref command,
        } => {
            let mut target = load_target(&cli)?;
            let command = command.join(" ");
            exec(&mut target, &command, repeat, output)
        }
    }
}

/// Run `command` `repeat` times, stopping at the first failure.
fn exec(target: &mut RemoteTarget, command: &str, repeat: u32, output: &Output) -> Result<()> {
    let identity = target.to_string();

    let result = (0..repeat).try_for_each(|_| {
        let result = target.run(command)?;
        output.command(&identity, &result);
        if result.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                code: result.exit_code,
            })
        }
    });

    // A kept-alive connection outlives each run; release it here.
    if let Err(e) = target.close() {
        tracing::warn!("{}", e);
    }
    result
}

/// Build the target from the config file, then apply command-line overrides.
fn load_target(cli: &Cli) -> Result<RemoteTarget> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => match Config::discover(&env::current_dir()?) {
            Ok(config) => config,
            Err(Error::ConfigNotFound(_)) => Config::default(),
            Err(e) => return Err(e),
        },
    };

    if let Some(address) = &cli.target {
        config.target = Some(address.clone());
    }
    if cli.keep_alive {
        config.keep_alive = true;
    }

    let mut target = config.into_target()?;
    if let Some(key) = &cli.key {
        target.key_path = Some(key.clone());
    }
    if let Some(known_hosts) = &cli.known_hosts {
        target.known_hosts_path = Some(known_hosts.clone());
    }
    Ok(target)
}
