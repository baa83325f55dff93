//! Variable generation for the service binaries.
//!
//! Every service gets a typed struct whose fields map one to one onto the
//! environment variables the binary reads, once prefixed with
//! [`ServiceVars::PREFIX`] and upper-cased.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::ExperimentConfig,
    error::{DeployError, Result},
    keys::KeyStore,
    socket::OperatorSocket,
};

/// Directory, inside the experiment directory, holding the `.env` files.
pub const ENVS_DIR: &str = "envs";

const GRAPH_PORT: u16 = 8000;
const SRS_ORDER: u32 = 3000;

/// Environment of one service binary.
pub trait ServiceVars: Serialize {
    /// Prefix of every variable of the service.
    const PREFIX: &'static str;

    /// `(KEY, VALUE)` pairs, sorted by key.
    fn to_env(&self) -> Result<Vec<(String, String)>> {
        let value = serde_json::to_value(self).map_err(|e| DeployError::json(Self::PREFIX, e))?;
        let Value::Object(fields) = value else {
            return Ok(Vec::new());
        };

        Ok(fields
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (format!("{}{}", Self::PREFIX, key), value)
            })
            .collect())
    }

    /// `.env` file content: one `KEY=VALUE` line per variable.
    fn to_env_file(&self) -> Result<String> {
        Ok(self
            .to_env()?
            .into_iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect())
    }
}

/// Hands out sequential ports from a base port.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    /// `None` once 65535 has been handed out.
    next: Option<u16>,
}

impl PortAllocator {
    pub fn new(base: u16) -> Self {
        Self { next: Some(base) }
    }

    pub fn next_port(&mut self) -> Result<u16> {
        let port = self.next.ok_or(DeployError::InvalidConfig {
            field: "services.base_port",
            reason: "port range exhausted".to_string(),
        })?;
        self.next = port.checked_add(1);
        Ok(port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ChurnerVars {
    pub hostname: String,
    pub grpc_port: u16,
    pub chain_rpc: String,
    pub private_key: String,
    pub bls_operator_state_retriver: String,
    pub zgda_service_manager: String,
    pub use_graph: bool,
    pub graph_url: String,
}

impl ServiceVars for ChurnerVars {
    const PREFIX: &'static str = "CHURNER_";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DisperserVars {
    pub hostname: String,
    pub grpc_port: u16,
    pub metrics_http_port: u16,
    pub enable_metrics: bool,
    pub chain_rpc: String,
    pub private_key: String,
    pub bls_operator_state_retriver: String,
    pub zgda_service_manager: String,
}

impl ServiceVars for DisperserVars {
    const PREFIX: &'static str = "DISPERSER_SERVER_";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EncoderVars {
    pub grpc_port: u16,
    pub metrics_http_port: u16,
    pub enable_metrics: bool,
    pub g1_path: PathBuf,
    pub g2_path: PathBuf,
    pub cache_path: PathBuf,
    pub srs_order: u32,
}

impl ServiceVars for EncoderVars {
    const PREFIX: &'static str = "DISPERSER_ENCODER_";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BatcherVars {
    pub chain_rpc: String,
    pub private_key: String,
    pub bls_operator_state_retriver: String,
    pub zgda_service_manager: String,
    pub encoder_address: String,
    pub metrics_http_port: u16,
    pub enable_metrics: bool,
    pub num_confirmations: u32,
    pub use_graph: bool,
    pub graph_url: String,
}

impl ServiceVars for BatcherVars {
    const PREFIX: &'static str = "BATCHER_";
}

/// Environment of one operator node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OperatorVars {
    pub hostname: String,
    pub dispersal_port: u16,
    pub retrieval_port: u16,
    pub internal_dispersal_port: u16,
    pub internal_retrieval_port: u16,
    pub metrics_port: u16,
    pub enable_metrics: bool,
    pub db_path: PathBuf,
    pub ecdsa_key_file: PathBuf,
    pub bls_key_file: PathBuf,
    pub ecdsa_key_password: String,
    pub bls_key_password: String,
    pub private_key: String,
    pub quorum_id_list: String,
    pub chain_rpc: String,
    pub bls_operator_state_retriver: String,
    pub zgda_service_manager: String,
    pub churner_url: String,
    pub register_at_node_start: bool,
    pub g1_path: PathBuf,
    pub g2_path: PathBuf,
    pub cache_path: PathBuf,
    pub srs_order: u32,
}

impl ServiceVars for OperatorVars {
    const PREFIX: &'static str = "NODE_";
}

impl OperatorVars {
    pub fn socket(&self) -> OperatorSocket {
        OperatorSocket::new(&self.hostname, self.dispersal_port, self.retrieval_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetrieverVars {
    pub hostname: String,
    pub grpc_port: u16,
    pub metrics_http_port: u16,
    pub chain_rpc: String,
    pub private_key: String,
    pub bls_operator_state_retriver: String,
    pub zgda_service_manager: String,
    pub g1_path: PathBuf,
    pub g2_path: PathBuf,
    pub cache_path: PathBuf,
    pub srs_order: u32,
    pub use_graph: bool,
    pub graph_url: String,
}

impl ServiceVars for RetrieverVars {
    const PREFIX: &'static str = "RETRIEVER_";
}

/// Every generated service environment of an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedVariables {
    pub churner: ChurnerVars,
    pub dispersers: Vec<DisperserVars>,
    pub encoder: EncoderVars,
    pub batcher: BatcherVars,
    pub operators: Vec<OperatorVars>,
    pub retriever: RetrieverVars,
}

impl GeneratedVariables {
    pub fn operator(&self, index: usize) -> Result<&OperatorVars> {
        self.operators
            .get(index)
            .ok_or_else(|| DeployError::InvalidConfig {
                field: "operator",
                reason: format!(
                    "operator {index} does not exist ({} generated)",
                    self.operators.len()
                ),
            })
    }

    /// Write one `<service>.env` file per service into `dir`.
    pub fn write_env_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| DeployError::io(dir, e))?;

        let mut files = vec![
            ("churner".to_string(), self.churner.to_env_file()?),
            ("encoder".to_string(), self.encoder.to_env_file()?),
            ("batcher".to_string(), self.batcher.to_env_file()?),
            ("retriever".to_string(), self.retriever.to_env_file()?),
        ];
        for (i, disperser) in self.dispersers.iter().enumerate() {
            files.push((format!("dis{i}"), disperser.to_env_file()?));
        }
        for (i, operator) in self.operators.iter().enumerate() {
            files.push((format!("opr{i}"), operator.to_env_file()?));
        }

        files
            .into_iter()
            .map(|(name, content)| {
                let path = dir.join(format!("{name}.env"));
                std::fs::write(&path, content).map_err(|e| DeployError::io(&path, e))?;
                Ok(path)
            })
            .collect()
    }
}

fn hex_key(key: &str) -> String {
    key.trim_start_matches("0x").to_string()
}

/// Produce the environment of every service from a deployed experiment.
pub fn generate_variables(config: &ExperimentConfig, keys: &KeyStore) -> Result<GeneratedVariables> {
    let contracts = config.contracts()?;
    let state_retriever = contracts.operator_state_retriever.clone().ok_or(
        DeployError::MissingDeploymentOutput {
            field: "OperatorStateRetriever",
        },
    )?;
    let service_manager = contracts.service_manager.clone();

    let services = &config.services;
    let hostname = services.hostname.clone();
    let chain_rpc = config.chain_rpc()?.to_string();
    let use_graph = config.zgda_deployer()?.deploy_subgraphs;
    let graph_url = match config.subgraphs.first() {
        Some(name) => format!("http://{hostname}:{GRAPH_PORT}/subgraphs/name/{name}"),
        None => String::new(),
    };

    let kzg_dir = config.inabox_dir().join("resources").join("kzg");
    let g1_path = kzg_dir.join("g1.point");
    let g2_path = kzg_dir.join("g2.point");
    let cache_path = kzg_dir.join("SRSTables");

    let mut ports = PortAllocator::new(services.base_port);

    let churner = ChurnerVars {
        hostname: hostname.clone(),
        grpc_port: ports.next_port()?,
        chain_rpc: chain_rpc.clone(),
        private_key: hex_key(&keys.ecdsa("churner")?.private_key),
        bls_operator_state_retriver: state_retriever.clone(),
        zgda_service_manager: service_manager.clone(),
        use_graph,
        graph_url: graph_url.clone(),
    };
    let churner_url = format!("{}:{}", churner.hostname, churner.grpc_port);

    let dispersers = (0..services.counts.num_dispersers)
        .map(|i| {
            Ok(DisperserVars {
                hostname: hostname.clone(),
                grpc_port: ports.next_port()?,
                metrics_http_port: ports.next_port()?,
                enable_metrics: true,
                chain_rpc: chain_rpc.clone(),
                private_key: hex_key(&keys.ecdsa(&format!("dis{i}"))?.private_key),
                bls_operator_state_retriver: state_retriever.clone(),
                zgda_service_manager: service_manager.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let encoder = EncoderVars {
        grpc_port: ports.next_port()?,
        metrics_http_port: ports.next_port()?,
        enable_metrics: true,
        g1_path: g1_path.clone(),
        g2_path: g2_path.clone(),
        cache_path: cache_path.clone(),
        srs_order: SRS_ORDER,
    };

    let batcher = BatcherVars {
        chain_rpc: chain_rpc.clone(),
        private_key: hex_key(&keys.ecdsa("batcher0")?.private_key),
        bls_operator_state_retriver: state_retriever.clone(),
        zgda_service_manager: service_manager.clone(),
        encoder_address: format!("{hostname}:{}", encoder.grpc_port),
        metrics_http_port: ports.next_port()?,
        enable_metrics: true,
        num_confirmations: 0,
        use_graph,
        graph_url: graph_url.clone(),
    };

    let quorum_id_list = services
        .quorum_ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let operators = (0..services.counts.num_operators)
        .map(|i| {
            let role = format!("opr{i}");
            let ecdsa = keys.ecdsa(&role)?;
            let bls = keys.bls(&role)?;
            Ok(OperatorVars {
                hostname: hostname.clone(),
                dispersal_port: ports.next_port()?,
                retrieval_port: ports.next_port()?,
                internal_dispersal_port: ports.next_port()?,
                internal_retrieval_port: ports.next_port()?,
                metrics_port: ports.next_port()?,
                enable_metrics: true,
                db_path: config.path.join("db").join(&role),
                ecdsa_key_file: ecdsa.key_file.clone(),
                bls_key_file: bls.key_file.clone(),
                ecdsa_key_password: ecdsa.password.clone(),
                bls_key_password: bls.password.clone(),
                private_key: hex_key(&ecdsa.private_key),
                quorum_id_list: quorum_id_list.clone(),
                chain_rpc: chain_rpc.clone(),
                bls_operator_state_retriver: state_retriever.clone(),
                zgda_service_manager: service_manager.clone(),
                churner_url: churner_url.clone(),
                register_at_node_start: true,
                g1_path: g1_path.clone(),
                g2_path: g2_path.clone(),
                cache_path: cache_path.clone(),
                srs_order: SRS_ORDER,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let retriever = RetrieverVars {
        hostname: hostname.clone(),
        grpc_port: ports.next_port()?,
        metrics_http_port: ports.next_port()?,
        chain_rpc,
        private_key: hex_key(&keys.ecdsa("retriever0")?.private_key),
        bls_operator_state_retriver: state_retriever,
        zgda_service_manager: service_manager,
        g1_path,
        g2_path,
        cache_path,
        srs_order: SRS_ORDER,
        use_graph,
        graph_url,
    };

    tracing::debug!(
        operators = operators.len(),
        dispersers = dispersers.len(),
        next_port = ?ports.next,
        "Variables generated"
    );

    Ok(GeneratedVariables {
        churner,
        dispersers,
        encoder,
        batcher,
        operators,
        retriever,
    })
}
