//! Experiment configuration and persisted run state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{DeployError, Result},
    state::DeploymentRecord,
    variables::GeneratedVariables,
};

/// User-provided experiment parameters inside an experiment directory.
pub const CONFIG_FILENAME: &str = "config.toml";
/// Persisted experiment state, rewritten at the end of every run.
pub const STATE_FILENAME: &str = "testconfig.toml";

/// Default base port for generated service sockets.
pub const DEFAULT_BASE_PORT: u16 = 32000;
/// Default subgraph deployed when a deployer asks for subgraphs.
pub const DEFAULT_SUBGRAPH: &str = "zgda-operator-state";

/// An account able to deploy contracts on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// Role name, also used to look the signing key up in the key store.
    pub name: String,
    /// Chain RPC endpoint.
    pub rpc: Url,
    /// Verify deployed contracts against a block explorer.
    #[serde(default)]
    pub verify_contracts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier_url: Option<Url>,
    /// Deploy the subgraphs once contracts are in place.
    #[serde(default)]
    pub deploy_subgraphs: bool,
    /// Pass `--slow` to forge (one transaction per block).
    #[serde(default)]
    pub slow: bool,
}

/// Addresses produced by the contract deployment script.
///
/// Field names match the keys of `script/output/zgda_deploy_output.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentOutput {
    pub service_manager: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_state_retriever: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bls_apk_registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_coordinator: Option<String>,
}

/// DA contract section of the experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZgdaConfig {
    /// Name of the deployer (see [`ExperimentConfig::deployers`]) used for contracts.
    pub deployer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts: Option<DeploymentOutput>,
    /// Hex-encoded quorum parameter hash the mock rollup was deployed with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum_params_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<DeploymentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCounts {
    /// Number of DA operator nodes.
    pub num_operators: usize,
    /// Upper bound of registered operators per quorum.
    pub num_max_operator_count: u32,
    #[serde(default = "default_num_dispersers")]
    pub num_dispersers: usize,
}

fn default_num_dispersers() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeConfig {
    /// One weight per staker/operator pair.
    pub distribution: Vec<f64>,
    /// Total amount of tokens split across stakers.
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub counts: ServiceCounts,
    pub stakes: StakeConfig,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    #[serde(default = "default_quorum_ids")]
    pub quorum_ids: Vec<u8>,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_base_port() -> u16 {
    DEFAULT_BASE_PORT
}

fn default_quorum_ids() -> Vec<u8> {
    vec![0]
}

fn default_subgraphs() -> Vec<String> {
    vec![DEFAULT_SUBGRAPH.to_string()]
}

/// Root entity of a test run.
///
/// Stages mutate it as they complete; it is persisted to
/// [`STATE_FILENAME`] at the end of every run, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    /// Root of the repository holding `contracts/`, `inabox/` and `subgraphs/`.
    pub root_path: PathBuf,
    /// Address of the mock rollup contract, once deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_rollup: Option<String>,
    #[serde(default = "default_subgraphs")]
    pub subgraphs: Vec<String>,
    pub zgda: ZgdaConfig,
    pub deployers: Vec<DeployerConfig>,
    pub services: ServicesConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<GeneratedVariables>,

    /// Experiment directory. Set when loading, never persisted.
    #[serde(skip)]
    pub path: PathBuf,
}

impl ExperimentConfig {
    pub fn get_deployer(&self, name: &str) -> Option<&DeployerConfig> {
        self.deployers.iter().find(|d| d.name == name)
    }

    /// The deployer selected for the DA contracts.
    pub fn zgda_deployer(&self) -> Result<&DeployerConfig> {
        self.get_deployer(&self.zgda.deployer)
            .ok_or_else(|| DeployError::MissingDeployer {
                name: self.zgda.deployer.clone(),
            })
    }

    /// RPC of the first configured deployer, used as the chain endpoint by services.
    pub fn chain_rpc(&self) -> Result<&Url> {
        self.deployers
            .first()
            .map(|d| &d.rpc)
            .ok_or(DeployError::InvalidConfig {
                field: "deployers",
                reason: "at least one deployer is required".to_string(),
            })
    }

    pub fn contracts(&self) -> Result<&DeploymentOutput> {
        self.zgda
            .contracts
            .as_ref()
            .ok_or(DeployError::MissingDeploymentOutput {
                field: "ServiceManager",
            })
    }

    pub fn contracts_dir(&self) -> PathBuf {
        self.root_path.join("contracts")
    }

    pub fn inabox_dir(&self) -> PathBuf {
        self.root_path.join("inabox")
    }

    pub fn subgraphs_dir(&self) -> PathBuf {
        self.root_path.join("subgraphs")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.inabox_dir().join("secrets")
    }

    pub fn state_path(&self) -> PathBuf {
        self.path.join(STATE_FILENAME)
    }

    /// Pick the file to load for an experiment directory: the persisted
    /// state if a previous run left one, the user config otherwise.
    pub fn resolve_file(dir: &Path) -> PathBuf {
        let state = dir.join(STATE_FILENAME);
        if state.exists() {
            state
        } else {
            dir.join(CONFIG_FILENAME)
        }
    }

    /// Load an experiment from its directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(&Self::resolve_file(dir))?;
        config.path = dir.to_path_buf();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
        let config: Self = toml::from_str(&content).map_err(|source| DeployError::TomlDe {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Experiment configuration loaded");
        Ok(config)
    }

    /// Persist the experiment state to [`STATE_FILENAME`].
    pub fn save(&self) -> Result<PathBuf> {
        let path = self.state_path();
        std::fs::create_dir_all(&self.path).map_err(|e| DeployError::io(&self.path, e))?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content).map_err(|e| DeployError::io(&path, e))?;
        tracing::info!(path = %path.display(), "Experiment state saved");
        Ok(path)
    }
}
