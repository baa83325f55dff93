//! inabox-deploy - Deployment library for a local ZGDA network.
//!
//! This crate sequences the deployment of the DA contracts, the subgraphs and
//! the service configuration of an experiment, and drives the scripts that
//! start and stop the local chain and the service binaries.

pub mod abi;
pub mod config;
pub mod contracts;
pub mod error;
mod forge;
pub mod keys;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod quorum;
mod rpc;
pub mod socket;
pub mod stake;
pub mod state;
pub mod subgraph;
pub mod variables;

pub use config::{DeployerConfig, DeploymentOutput, ExperimentConfig};
pub use error::{DeployError, Result};
pub use forge::ForgeScriptCmdBuilder;
pub use keys::{KeyInfo, KeyStore};
pub use lifecycle::{BinaryLifecycle, LifecycleOp, NodeOperation, NodePluginEnv};
pub use orchestrator::{DeploymentPhase, Orchestrator};
pub use process::{Invocation, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use socket::OperatorSocket;
pub use state::{DeploymentState, PersistedDeploymentState};
pub use subgraph::{BlockNumberSource, JsonRpcBlockNumber};
pub use variables::{GeneratedVariables, OperatorVars};
