//! docsync CLI - local-first documents from the terminal
//!
//! Writes land in a JSON file store; `sync` and `watch` replicate them to
//! the configured remote.

mod cli;
mod commands;
mod config;
mod error;
mod remote;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::completions::run_completions;
use crate::commands::conflicts::{run_conflicts, run_resolve};
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::new::run_new;
use crate::commands::sync::{run_health, run_status, run_sync};
use crate::commands::watch::run_watch;
use crate::config::{CliConfig, CliOverrides};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Completions { shell, output } = &command {
        return run_completions(*shell, output.as_deref());
    }

    let config = CliConfig::from_env(CliOverrides {
        store_path: cli.store_path,
        remote_url: cli.remote_url,
        user: cli.user,
        offline: cli.offline,
    })?;
    tracing::debug!(
        store = %config.store_path.display(),
        sync_enabled = config.sync_enabled(),
        offline = config.offline,
        "Configuration resolved"
    );

    match command {
        Commands::New {
            title,
            content,
            workspace,
        } => run_new(&title, content.as_deref(), workspace.as_deref(), &config).await?,
        Commands::Edit {
            id,
            title,
            content,
            favorite,
        } => run_edit(&id, title, content, favorite, &config).await?,
        Commands::Delete { id } => run_delete(&id, &config).await?,
        Commands::List { limit, dirty, json } => run_list(limit, dirty, json, &config).await?,
        Commands::Sync => run_sync(&config).await?,
        Commands::Status { json } => run_status(json, &config).await?,
        Commands::Health { json } => run_health(json, &config).await?,
        Commands::Conflicts { json } => run_conflicts(json, &config).await?,
        Commands::Resolve { id, choice, fields } => {
            run_resolve(&id, choice, &fields, &config).await?;
        }
        Commands::Watch => run_watch(&config).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn init_tracing() -> Result<(), CliError> {
    let directive = "docsync=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
