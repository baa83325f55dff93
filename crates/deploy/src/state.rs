//! Deployment state of an experiment.
//!
//! [`DeploymentState`] decides whether the contract stage has anything to do.
//! The check is a plain read of the experiment state: it is only sound when a
//! single orchestrator owns the experiment directory.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ExperimentConfig;

/// Predicate telling whether the DA contracts are already deployed.
pub trait DeploymentState {
    fn is_deployed(&self, config: &ExperimentConfig) -> bool;
}

/// Reads the deployment output recorded in the (persisted) experiment state.
///
/// Both the DA contracts and the mock rollup must be recorded: a state holding
/// only one of them is redeployed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistedDeploymentState;

impl DeploymentState for PersistedDeploymentState {
    fn is_deployed(&self, config: &ExperimentConfig) -> bool {
        let contracts = config
            .zgda
            .contracts
            .as_ref()
            .is_some_and(|c| !c.service_manager.is_empty());
        let rollup = config.mock_rollup.as_ref().is_some_and(|a| !a.is_empty());
        contracts && rollup
    }
}

impl<F> DeploymentState for F
where
    F: Fn(&ExperimentConfig) -> bool,
{
    fn is_deployed(&self, config: &ExperimentConfig) -> bool {
        self(config)
    }
}

/// Parameters that, when changed, call for a fresh contract deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfigHash {
    pub deployer: String,
    pub stake_distribution: Vec<f64>,
    pub total_stake: f64,
    pub max_operator_count: u32,
    pub num_operators: usize,
}

impl DeploymentConfigHash {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            deployer: config.zgda.deployer.clone(),
            stake_distribution: config.services.stakes.distribution.clone(),
            total_stake: config.services.stakes.total,
            max_operator_count: config.services.counts.num_max_operator_count,
            num_operators: config.services.counts.num_operators,
        }
    }

    /// SHA-256 over the JSON encoding, hex encoded.
    pub fn compute_hash(&self) -> String {
        // Plain data, the encoding cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Metadata stored next to the deployment output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub config_hash: String,
    /// Unix timestamp of the deployment.
    pub deployed_at: u64,
    pub inabox_version: String,
}

impl DeploymentRecord {
    pub fn new(config: &ExperimentConfig) -> Self {
        Self {
            config_hash: DeploymentConfigHash::from_config(config).compute_hash(),
            deployed_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            inabox_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Whether `config` still matches the parameters of this deployment.
    pub fn matches(&self, config: &ExperimentConfig) -> bool {
        self.config_hash == DeploymentConfigHash::from_config(config).compute_hash()
    }
}
