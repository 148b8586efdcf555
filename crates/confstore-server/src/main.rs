//! Main entry point for the confstore command-line host.

use clap::Parser;
use confstore_common::TenantId;
use confstore_persistence::{ConfigEntryStore, StorageClient};
use confstore_server::cli::Cli;
use confstore_server::configuration::Configuration;
use confstore_server::{commands, logging};
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;
    let _logging_guard = logging::init_logging(&configuration.logging_config())?;

    let tenant = TenantId::new(cli.tenant.as_str())?;
    let client = StorageClient::new(configuration.storage_config()?)?;
    let store = ConfigEntryStore::new(client.clone());

    let result = commands::run(cli.command, &tenant, &store).await;
    client.shutdown().await;

    if let Err(e) = &result {
        error!(tenant = %tenant, error = %e, "Command failed");
        if let Some(body) = commands::error_body(e) {
            eprintln!("{body}");
        }
    }
    result
}
