//! Subgraph deployment stage.

use std::future::Future;

use serde_json::{Map, Value, json};
use url::Url;

use crate::{
    config::ExperimentConfig,
    error::{DeployError, Result},
    process::{Invocation, ProcessRunner},
    rpc,
};

/// Network name used in `networks.json` for the local chain.
pub const SUBGRAPH_NETWORK: &str = "devnet";
/// Version label of locally deployed subgraphs.
pub const SUBGRAPH_VERSION_LABEL: &str = "v0.0.1";

/// Source of the chain head, used as the subgraph start block.
pub trait BlockNumberSource: Send + Sync {
    fn latest_block_number(&self, rpc: &Url) -> impl Future<Output = Result<u64>> + Send;
}

/// [`BlockNumberSource`] over JSON-RPC `eth_blockNumber`.
#[derive(Debug, Clone)]
pub struct JsonRpcBlockNumber {
    client: reqwest::Client,
}

impl JsonRpcBlockNumber {
    pub fn new() -> Result<Self> {
        let client = rpc::create_client().map_err(|source| DeployError::Rpc {
            endpoint: "<client>".to_string(),
            source,
        })?;
        Ok(Self { client })
    }
}

impl BlockNumberSource for JsonRpcBlockNumber {
    async fn latest_block_number(&self, rpc: &Url) -> Result<u64> {
        rpc::latest_block_number(&self.client, rpc.as_str())
            .await
            .map_err(|source| DeployError::Rpc {
                endpoint: rpc.to_string(),
                source,
            })
    }
}

/// The `yarn` steps run in each subgraph directory, in order.
fn yarn_steps() -> Vec<Vec<&'static str>> {
    vec![
        vec!["codegen"],
        vec!["build"],
        vec!["remove-local"],
        vec!["create-local"],
        vec!["deploy-local", "--version-label", SUBGRAPH_VERSION_LABEL],
    ]
}

/// Deploys the experiment subgraphs against the deployed contracts.
///
/// No idempotency check happens here, the orchestrator calls it at most once
/// per run.
pub struct SubgraphDeployer<'a, R> {
    runner: &'a R,
}

impl<'a, R: ProcessRunner> SubgraphDeployer<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Snapshot the chain head from the first deployer and deploy every subgraph from it.
    pub async fn deploy(
        &self,
        config: &ExperimentConfig,
        blocks: &impl BlockNumberSource,
    ) -> Result<u64> {
        let start_block = blocks.latest_block_number(config.chain_rpc()?).await?;
        tracing::info!(start_block, "Deploying subgraphs...");
        self.deploy_from(config, start_block).await?;
        Ok(start_block)
    }

    pub async fn deploy_from(&self, config: &ExperimentConfig, start_block: u64) -> Result<()> {
        let networks = networks_json(config, start_block)?;

        for name in &config.subgraphs {
            let dir = config.subgraphs_dir().join(name);
            let networks_path = dir.join("networks.json");
            let content = serde_json::to_vec_pretty(&networks)
                .map_err(|e| DeployError::json("subgraph networks", e))?;
            std::fs::create_dir_all(&dir).map_err(|e| DeployError::io(&dir, e))?;
            std::fs::write(&networks_path, content)
                .map_err(|e| DeployError::io(&networks_path, e))?;

            for step in yarn_steps() {
                let invocation = Invocation::new("yarn", &dir).args(step);
                self.runner.run(&invocation).await?;
            }

            tracing::info!(subgraph = %name, start_block, "Subgraph deployed");
        }

        Ok(())
    }
}

/// `networks.json` pointing the subgraph data sources at the deployed contracts.
fn networks_json(config: &ExperimentConfig, start_block: u64) -> Result<Value> {
    let contracts = config.contracts()?;

    let entries = [
        ("ZGDAServiceManager", Some(&contracts.service_manager)),
        (
            "OperatorStateRetriever",
            contracts.operator_state_retriever.as_ref(),
        ),
        ("RegistryCoordinator", contracts.registry_coordinator.as_ref()),
        ("BLSApkRegistry", contracts.bls_apk_registry.as_ref()),
    ];

    let sources: Map<String, Value> = entries
        .into_iter()
        .filter_map(|(name, address)| {
            address.map(|a| {
                (
                    name.to_string(),
                    json!({ "address": a, "startBlock": start_block }),
                )
            })
        })
        .collect();

    Ok(json!({ SUBGRAPH_NETWORK: sources }))
}
