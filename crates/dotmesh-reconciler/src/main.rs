mod check;
mod config;
mod directory;
mod error;
mod locator;
mod management;
mod offline;
mod run;

use std::process::ExitCode;

use clap::Parser;

use config::{Cli, Command};
use error::RunError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("dotmesh_reconciler=info,dotmesh_topology=info")
            }),
        )
        .init();

    let cli = Cli::parse();
    let http = reqwest::Client::new();

    match dispatch(cli.command, &http).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.exit_code(), "{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(command: Command, http: &reqwest::Client) -> Result<(), RunError> {
    match command {
        Command::Apply(args) => {
            if let run::ApplyOutcome::Replaced { digest } = run::apply(&args, http).await? {
                println!("{digest}");
            }
        }
        Command::Plan(args) => {
            let merged = run::plan(&args, http).await?;
            print!("{}", merged.to_document());
        }
        Command::Check(args) => {
            let report = check::run(&args, http).await?;
            print!("{}", report.render());
        }
        Command::Offline(args) => {
            if let offline::OfflineOutcome::Written { path, digest } = offline::run(&args, http).await? {
                println!("{digest} {}", path.display());
            }
        }
    }
    Ok(())
}
