mod cli;
mod options;
mod state;

use crate::cli::{Cli, Command, LogFormatArg, StorageBackendArg};
use crate::options::Options;
use crate::state::{AppState, Store};
use anyhow::Context;
use clap::Parser;
use hop_storage::{InMemoryStore, MySqlStore};
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = Cli::parse();
    init_tracing(config.log_format);

    let options = Options::load(config.options.as_deref());

    info!(
        storage_backend = %config.storage,
        base_url = %options.base_url,
        "starting hop"
    );

    match config.storage {
        StorageBackendArg::InMemory => {
            let store = InMemoryStore::with_retention(options.retention());
            run(Arc::new(store), &options, config.command).await
        }
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .context("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlStore::connect(&mysql_dsn)
                .await?
                .with_retention(options.retention());
            store.migrate().await?;
            run(Arc::new(store), &options, config.command).await
        }
    }
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing(format: LogFormatArg) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Text => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

async fn run<S: Store>(
    store: Arc<S>,
    options: &Options,
    command: Command,
) -> anyhow::Result<ExitCode> {
    let outcome = match AppState::bootstrap(store, options).await {
        Ok(state) => state.execute(command).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if e.is_fatal() {
                error!(error = %e, "audit trail lost");
            }
            let (message, code) = e.into_parts();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "message": message, "code": code }))?
            );
            Ok(ExitCode::FAILURE)
        }
    }
}
