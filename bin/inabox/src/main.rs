//! inabox is a CLI tool to deploy and run a local ZGDA network for testing.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};

use cli::{Cli, Command};
use inabox_deploy::{
    BinaryLifecycle, ExperimentConfig, JsonRpcBlockNumber, Orchestrator, PersistedDeploymentState,
    TokioProcessRunner,
};

/// Prefix of the environment variables overriding the experiment configuration.
const ENV_PREFIX: &str = "INABOX_";
/// Variables of the prefix consumed by the CLI itself.
const CLI_ENV_KEYS: &[&str] = &["verbosity", "experiment", "node_operation"];

/// Load an experiment: its state or config file, then `INABOX_` overrides.
fn load_experiment(dir: &Path) -> Result<ExperimentConfig> {
    let file = ExperimentConfig::resolve_file(dir);

    let mut config: ExperimentConfig = Figment::new()
        .merge(Toml::file(&file))
        .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(CLI_ENV_KEYS))
        .extract()
        .with_context(|| format!("Failed to load experiment from {}", file.display()))?;
    config.path = dir.to_path_buf();

    tracing::debug!(
        file = %file.display(),
        experiment = %config.name,
        "Experiment configuration loaded"
    );

    Ok(config)
}

fn print_status(config: &ExperimentConfig) {
    let Some(output) = &config.zgda.contracts else {
        println!("Experiment '{}' has no deployed contracts.", config.name);
        return;
    };

    let mut contracts = Table::new();
    contracts.set_header(vec!["Contract", "Address"]);
    contracts.add_row(vec!["ServiceManager", output.service_manager.as_str()]);
    for (name, address) in [
        ("OperatorStateRetriever", &output.operator_state_retriever),
        ("BLSApkRegistry", &output.bls_apk_registry),
        ("RegistryCoordinator", &output.registry_coordinator),
        ("MockRollup", &config.mock_rollup),
    ] {
        if let Some(address) = address {
            contracts.add_row(vec![name, address.as_str()]);
        }
    }
    println!("Contracts of experiment '{}':", config.name);
    println!("{contracts}");
    if let Some(hash) = &config.zgda.quorum_params_hash {
        println!("Quorum parameters hash: 0x{hash}");
    }

    let Some(variables) = &config.variables else {
        println!("Service variables have not been generated yet.");
        return;
    };

    let mut operators = Table::new();
    operators.set_header(vec!["Operator", "Socket", "ECDSA key file"]);
    for (i, operator) in variables.operators.iter().enumerate() {
        operators.add_row(vec![
            format!("opr{i}"),
            operator.socket().to_string(),
            operator.ecdsa_key_file.display().to_string(),
        ]);
    }
    println!("Operators:");
    println!("{operators}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = load_experiment(&cli.experiment)?;
    let runner = TokioProcessRunner;
    let lifecycle = BinaryLifecycle::new(&runner, &config);

    match cli.command {
        Command::Deploy => {
            let blocks = JsonRpcBlockNumber::new()?;
            let mut orchestrator = Orchestrator::new(runner, blocks, PersistedDeploymentState)
                .with_log_level(cli.verbosity);
            orchestrator
                .deploy_experiment(&mut config)
                .await
                .with_context(|| format!("Deployment stopped at phase {}", orchestrator.phase()))?;
        }
        Command::StartAnvil => lifecycle
            .start_anvil()
            .await
            .context("Failed to start anvil")?,
        Command::StopAnvil => lifecycle.stop_anvil().await.context("Failed to stop anvil")?,
        Command::StartBinaries => lifecycle
            .start_binaries()
            .await
            .context("Failed to start binaries")?,
        Command::StopBinaries => lifecycle
            .stop_binaries()
            .await
            .context("Failed to stop binaries")?,
        Command::NodePlugin {
            operation,
            operator,
        } => {
            let variables = config
                .variables
                .as_ref()
                .context("Service variables are missing, run `inabox deploy` first")?;
            let vars = variables.operator(operator)?;
            lifecycle
                .run_node_plugin(operation, vars)
                .await
                .context("Failed to run node plugin")?;
        }
        Command::Status => print_status(&config),
    }

    Ok(())
}
