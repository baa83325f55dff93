//! Contract deployment stage.
//!
//! Runs the DA setup script and the mock rollup script through forge, reading
//! each script's JSON output back into the experiment configuration.

use std::path::Path;

use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    config::{DeploymentOutput, ExperimentConfig},
    error::{DeployError, Result},
    forge::ForgeScriptCmdBuilder,
    keys::KeyStore,
    process::ProcessRunner,
    quorum::{SecurityParam, quorum_params_hash_hex},
    stake::derive_deploy_config,
    state::{DeploymentRecord, DeploymentState},
};

/// Forge script deploying the DA contracts.
pub const ZGDA_DEPLOY_SCRIPT: &str = "script/SetUpZGDA.s.sol:SetupZGDA";
/// Forge script deploying the mock rollup.
pub const MOCK_ROLLUP_SCRIPT: &str = "script/MockRollupDeployer.s.sol:MockRollupDeployer";
/// Input of [`ZGDA_DEPLOY_SCRIPT`], relative to the contracts directory.
pub const ZGDA_DEPLOY_CONFIG: &str = "script/zgda_deploy_config.json";
/// Output of [`ZGDA_DEPLOY_SCRIPT`], relative to the contracts directory.
pub const ZGDA_DEPLOY_OUTPUT: &str = "script/output/zgda_deploy_output.json";
/// Output of [`MOCK_ROLLUP_SCRIPT`], relative to the contracts directory.
pub const MOCK_ROLLUP_OUTPUT: &str = "script/output/mock_rollup_deploy_output.json";
/// Stake required by the mock rollup (1 token, 18 decimals).
pub const MOCK_ROLLUP_STAKE: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MockRollupOutput {
    mock_rollup: String,
}

/// What the contract stage did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractsOutcome {
    Deployed,
    AlreadyDeployed,
}

/// Deploys the DA contracts for an experiment, once.
pub struct ContractDeployer<'a, R> {
    runner: &'a R,
}

impl<'a, R: ProcessRunner> ContractDeployer<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Deploy the contracts unless `state` reports them deployed.
    ///
    /// Outputs are merged into `config` only once both scripts succeeded: a
    /// failure leaves the experiment without any deployment output, so the
    /// next run deploys again from scratch.
    pub async fn deploy(
        &self,
        config: &mut ExperimentConfig,
        keys: &KeyStore,
        state: &impl DeploymentState,
    ) -> Result<ContractsOutcome> {
        if state.is_deployed(config) {
            let stale = config.zgda.record.as_ref().filter(|r| !r.matches(config));
            if let Some(record) = stale {
                tracing::warn!(
                    deployed_hash = %record.config_hash,
                    "Deployment parameters changed since the contracts were deployed, keeping the existing deployment"
                );
            }
            tracing::info!("ZGDA contracts already deployed, skipping deployment");
            return Ok(ContractsOutcome::AlreadyDeployed);
        }

        tracing::info!("Deploying the ZGDA and ZeroGLayer contracts...");

        let deployer = config.zgda_deployer()?.clone();
        let deploy_config = derive_deploy_config(config, keys)?;
        let signing_key = keys.ecdsa(&deployer.name)?.private_key.clone();
        let contracts_dir = config.contracts_dir();

        let payload = serde_json::to_vec_pretty(&deploy_config)
            .map_err(|e| DeployError::json("zgda deploy config", e))?;
        write_file(&contracts_dir.join(ZGDA_DEPLOY_CONFIG), &payload)?;

        let invocation = ForgeScriptCmdBuilder::for_deployer(ZGDA_DEPLOY_SCRIPT, &deployer)
            .private_key(signing_key.clone())
            .invocation(&contracts_dir);
        self.runner.run(&invocation).await?;

        let output: DeploymentOutput = read_output(&contracts_dir.join(ZGDA_DEPLOY_OUTPUT))?;
        tracing::info!(
            service_manager = %output.service_manager,
            operator_state_retriever = ?output.operator_state_retriever,
            "ZGDA contracts deployed"
        );

        let quorum_hash = quorum_params_hash_hex(&[SecurityParam::DEFAULT]);

        let invocation = ForgeScriptCmdBuilder::for_deployer(MOCK_ROLLUP_SCRIPT, &deployer)
            .private_key(signing_key)
            .extra_args([
                "--sig".to_string(),
                "run(address,bytes32,uint256)".to_string(),
                output.service_manager.clone(),
                quorum_hash.clone(),
                MOCK_ROLLUP_STAKE.to_string(),
            ])
            .invocation(&contracts_dir);
        self.runner.run(&invocation).await?;

        let rollup: MockRollupOutput = read_output(&contracts_dir.join(MOCK_ROLLUP_OUTPUT))?;
        tracing::info!(mock_rollup = %rollup.mock_rollup, "Mock rollup deployed");

        config.zgda.contracts = Some(output);
        config.zgda.quorum_params_hash = Some(quorum_hash);
        config.mock_rollup = Some(rollup.mock_rollup);
        config.zgda.record = Some(DeploymentRecord::new(config));

        Ok(ContractsOutcome::Deployed)
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| DeployError::io(path, e))
}

/// Read and parse a JSON artifact left by an external script.
fn read_output<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(DeployError::MissingOutput {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read(path).map_err(|e| DeployError::io(path, e))?;
    serde_json::from_slice(&content).map_err(|e| DeployError::json(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::tests::sample_config,
        keys::tests::store_for,
        process::{Invocation, ProcessOutput},
        state::PersistedDeploymentState,
    };
    use std::sync::Mutex;
    use tempdir::TempDir;

    const SERVICE_MANAGER: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    const MOCK_ROLLUP: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";

    /// Plays the forge scripts by writing their output files.
    #[derive(Default)]
    struct FakeForge {
        calls: Mutex<Vec<Invocation>>,
        zgda_output: Option<String>,
        fail_rollup: bool,
    }

    impl ProcessRunner for FakeForge {
        async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            let dir = &invocation.current_dir;
            let script = invocation.args[1].as_str();
            let (path, content) = if script == ZGDA_DEPLOY_SCRIPT {
                (
                    dir.join(ZGDA_DEPLOY_OUTPUT),
                    self.zgda_output.clone().unwrap_or_else(|| {
                        format!(r#"{{"ServiceManager": "{SERVICE_MANAGER}", "OperatorStateRetriever": "0x01"}}"#)
                    }),
                )
            } else if self.fail_rollup {
                return Err(DeployError::MissingOutput {
                    path: dir.join(MOCK_ROLLUP_OUTPUT),
                });
            } else {
                (
                    dir.join(MOCK_ROLLUP_OUTPUT),
                    format!(r#"{{"MockRollup": "{MOCK_ROLLUP}"}}"#),
                )
            };
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
            Ok(ProcessOutput::default())
        }
    }

    #[tokio::test]
    async fn test_deploy_contracts() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let mut config = sample_config(temp_dir.path());
        let keys = store_for(&config);
        let forge = FakeForge::default();

        let outcome = ContractDeployer::new(&forge)
            .deploy(&mut config, &keys, &PersistedDeploymentState)
            .await
            .unwrap();
        assert_eq!(outcome, ContractsOutcome::Deployed);

        let contracts = config.zgda.contracts.as_ref().unwrap();
        assert_eq!(contracts.service_manager, SERVICE_MANAGER);
        assert_eq!(contracts.operator_state_retriever.as_deref(), Some("0x01"));
        assert_eq!(config.mock_rollup.as_deref(), Some(MOCK_ROLLUP));
        assert_eq!(
            config.zgda.quorum_params_hash,
            Some(quorum_params_hash_hex(&[SecurityParam::DEFAULT]))
        );
        assert!(PersistedDeploymentState.is_deployed(&config));
        assert!(config.zgda.record.as_ref().unwrap().matches(&config));

        let calls = forge.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "forge");
        assert_eq!(calls[0].current_dir, config.contracts_dir());
        assert_eq!(calls[0].args[1], ZGDA_DEPLOY_SCRIPT);
        assert!(calls[0].args.contains(&keys.ecdsa("default").unwrap().private_key));

        let rollup_args = &calls[1].args;
        let sig = rollup_args.iter().position(|a| a == "--sig").unwrap();
        assert_eq!(rollup_args[sig + 1], "run(address,bytes32,uint256)");
        assert_eq!(rollup_args[sig + 2], SERVICE_MANAGER);
        assert_eq!(
            rollup_args[sig + 3],
            quorum_params_hash_hex(&[SecurityParam::DEFAULT])
        );
        assert_eq!(rollup_args[sig + 4], "1000000000000000000");

        // The payload handed to the script.
        let payload: serde_json::Value = serde_json::from_slice(
            &std::fs::read(config.contracts_dir().join(ZGDA_DEPLOY_CONFIG)).unwrap(),
        )
        .unwrap();
        assert_eq!(payload["stakerTokenAmounts"][1][2], "200");
    }

    #[tokio::test]
    async fn test_already_deployed_is_noop() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let mut config = sample_config(temp_dir.path());
        let keys = store_for(&config);
        let forge = FakeForge::default();
        let before = config.clone();

        let outcome = ContractDeployer::new(&forge)
            .deploy(&mut config, &keys, &|_: &ExperimentConfig| true)
            .await
            .unwrap();

        assert_eq!(outcome, ContractsOutcome::AlreadyDeployed);
        assert!(forge.calls.lock().unwrap().is_empty());
        assert_eq!(config, before);
    }

    #[tokio::test]
    async fn test_malformed_output_is_fatal() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let mut config = sample_config(temp_dir.path());
        let keys = store_for(&config);
        let forge = FakeForge {
            zgda_output: Some(r#"{"NotTheServiceManager": 1}"#.to_string()),
            ..Default::default()
        };

        let err = ContractDeployer::new(&forge)
            .deploy(&mut config, &keys, &PersistedDeploymentState)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Json { .. }));
        assert!(config.zgda.contracts.is_none());
        // The rollup script never ran.
        assert_eq!(forge.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollup_failure_merges_nothing() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let mut config = sample_config(temp_dir.path());
        let keys = store_for(&config);
        let forge = FakeForge {
            fail_rollup: true,
            ..Default::default()
        };

        let err = ContractDeployer::new(&forge)
            .deploy(&mut config, &keys, &PersistedDeploymentState)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::MissingOutput { .. }));
        assert_eq!(forge.calls.lock().unwrap().len(), 2);
        assert!(config.zgda.contracts.is_none());
        assert!(config.zgda.quorum_params_hash.is_none());
        assert!(config.zgda.record.is_none());
        assert!(config.mock_rollup.is_none());
        assert!(!PersistedDeploymentState.is_deployed(&config));
    }

    #[tokio::test]
    async fn test_missing_deployer_key_runs_nothing() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let mut config = sample_config(temp_dir.path());
        let keys = store_for(&config);
        config.services.stakes.distribution = vec![1.0; 8];
        let forge = FakeForge::default();

        let err = ContractDeployer::new(&forge)
            .deploy(&mut config, &keys, &PersistedDeploymentState)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::MissingKey { .. }));
        assert!(forge.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_deployer() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let mut config = sample_config(temp_dir.path());
        let keys = store_for(&config);
        config.zgda.deployer = "ghost".to_string();
        let forge = FakeForge::default();

        let err = ContractDeployer::new(&forge)
            .deploy(&mut config, &keys, &PersistedDeploymentState)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::MissingDeployer { .. }));
        assert!(forge.calls.lock().unwrap().is_empty());
    }
}
