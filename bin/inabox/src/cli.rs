use std::path::PathBuf;

use clap::{Parser, Subcommand};
use inabox_deploy::NodeOperation;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "inabox")]
#[command(
    author,
    version,
    about = "Deploy and run a local ZGDA network for testing"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "INABOX_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The experiment directory.
    ///
    /// It holds the user `config.toml` and, after a first run, the persisted
    /// `testconfig.toml` which takes precedence.
    #[arg(short, long, alias = "exp", env = "INABOX_EXPERIMENT", default_value = ".")]
    pub experiment: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Deploy the contracts and subgraphs, then generate the service variables.
    Deploy,

    /// Start the local anvil chain.
    StartAnvil,

    /// Stop the local anvil chain.
    StopAnvil,

    /// Start every service binary in the background.
    StartBinaries,

    /// Stop every service binary.
    StopBinaries,

    /// Run a one-shot node operation for an operator.
    NodePlugin {
        /// The operation to run.
        #[arg(long, env = "INABOX_NODE_OPERATION")]
        operation: NodeOperation,

        /// Index of the operator (`opr<index>`).
        #[arg(long, default_value_t = 0)]
        operator: usize,
    },

    /// Print the deployment outputs and the operator sockets.
    Status,
}
