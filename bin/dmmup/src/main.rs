//! dmmup provisions the DMM contract ecosystem on a running node.

mod cli;
mod report;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use dmm_deploy::{
    ChainBackend, Environment, Provisioner, RpcBackend, StateStore, TruffleArtifactResolver,
};
use report::ecosystem_table;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = cli.load_config()?;

    // Unknown environments halt before the node is contacted.
    let environment = Environment::resolve(&config.environment)?;

    tracing::info!(
        config_path = %cli.config.display(),
        %environment,
        rpc_url = %config.rpc_url,
        deployer = %config.deployer,
        artifacts_dir = %config.artifacts_dir.display(),
        "Loaded provisioning configuration"
    );

    let backend = RpcBackend::new(
        config.rpc_url.clone(),
        Duration::from_secs(config.receipt_timeout_secs),
    )?;
    let resolver = TruffleArtifactResolver::new(&config.artifacts_dir);

    let chain_id = backend
        .chain_id()
        .await
        .with_context(|| format!("Failed to reach node at {}", config.rpc_url))?;

    let provisioner = Provisioner::new(
        &resolver,
        &backend,
        config.deployer,
        config.prerequisites.clone(),
    );
    let run_key = provisioner.run_key(environment, chain_id);

    let state_dir = config.resolved_state_dir()?;
    let store = StateStore::open(&state_dir, &run_key)
        .with_context(|| format!("Failed to open state store in {}", state_dir.display()))?;

    tracing::info!(
        chain_id,
        run = %run_key.id(),
        state_path = %store.path().display(),
        fresh = cli.fresh,
        "Starting provisioning run"
    );

    match provisioner
        .with_store(store)
        .fresh(cli.fresh)
        .provision_ecosystem(&config.environment)
        .await
    {
        Ok(state) => {
            println!("{}", ecosystem_table(&state));
            Ok(())
        }
        Err(failure) => {
            println!("{}", ecosystem_table(&failure.partial));
            Err(failure.error)
                .context("Provisioning failed, rerun to resume from the last recorded step")
        }
    }
}
