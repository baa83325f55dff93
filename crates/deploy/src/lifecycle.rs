//! Lifecycle of the local chain, the service binaries and the node plugin.
//!
//! All operations shell out to the scripts of the `inabox` directory and
//! fail on any non-zero exit; nothing is retried.

use std::path::PathBuf;

use crate::{
    config::ExperimentConfig,
    error::Result,
    process::{Invocation, ProcessRunner},
    socket::OperatorSocket,
    variables::OperatorVars,
};

/// Script managing anvil and the service binaries.
pub const BIN_SCRIPT: &str = "./bin.sh";
/// Script running one-shot node operations.
pub const NODE_PLUGIN_SCRIPT: &str = "./node-plugin.sh";

/// Operation argument accepted by [`BIN_SCRIPT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum LifecycleOp {
    /// Start every service binary in the background.
    StartDetached,
    /// Stop every service binary.
    Stop,
    StartAnvil,
    StopAnvil,
}

/// One-shot operation run by the node plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NodeOperation {
    Register,
    Deregister,
    UpdateSocket,
}

/// Environment contract of the node plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePluginEnv {
    pub operation: NodeOperation,
    pub ecdsa_key_file: PathBuf,
    pub bls_key_file: PathBuf,
    pub ecdsa_key_password: String,
    pub bls_key_password: String,
    pub socket: OperatorSocket,
    pub quorum_id_list: String,
    pub chain_rpc: String,
    pub bls_operator_state_retriver: String,
    pub zgda_service_manager: String,
    pub churner_url: String,
}

impl NodePluginEnv {
    pub fn new(operation: NodeOperation, operator: &OperatorVars) -> Self {
        Self {
            operation,
            ecdsa_key_file: operator.ecdsa_key_file.clone(),
            bls_key_file: operator.bls_key_file.clone(),
            ecdsa_key_password: operator.ecdsa_key_password.clone(),
            bls_key_password: operator.bls_key_password.clone(),
            socket: operator.socket(),
            quorum_id_list: operator.quorum_id_list.clone(),
            chain_rpc: operator.chain_rpc.clone(),
            bls_operator_state_retriver: operator.bls_operator_state_retriver.clone(),
            zgda_service_manager: operator.zgda_service_manager.clone(),
            churner_url: operator.churner_url.clone(),
        }
    }

    /// The variables passed to the plugin. Confirmations are always `0`.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("NODE_OPERATION", self.operation.to_string()),
            ("NODE_ECDSA_KEY_FILE", self.ecdsa_key_file.display().to_string()),
            ("NODE_BLS_KEY_FILE", self.bls_key_file.display().to_string()),
            ("NODE_ECDSA_KEY_PASSWORD", self.ecdsa_key_password.clone()),
            ("NODE_BLS_KEY_PASSWORD", self.bls_key_password.clone()),
            ("NODE_SOCKET", self.socket.to_string()),
            ("NODE_QUORUM_ID_LIST", self.quorum_id_list.clone()),
            ("NODE_CHAIN_RPC", self.chain_rpc.clone()),
            (
                "NODE_BLS_OPERATOR_STATE_RETRIVER",
                self.bls_operator_state_retriver.clone(),
            ),
            ("NODE_ZGDA_SERVICE_MANAGER", self.zgda_service_manager.clone()),
            ("NODE_CHURNER_URL", self.churner_url.clone()),
            ("NODE_NUM_CONFIRMATIONS", "0".to_string()),
        ]
    }
}

/// Runs the lifecycle scripts of an experiment.
pub struct BinaryLifecycle<'a, R> {
    runner: &'a R,
    inabox_dir: PathBuf,
}

impl<'a, R: ProcessRunner> BinaryLifecycle<'a, R> {
    pub fn new(runner: &'a R, config: &ExperimentConfig) -> Self {
        Self {
            runner,
            inabox_dir: config.inabox_dir(),
        }
    }

    pub async fn run(&self, op: LifecycleOp) -> Result<()> {
        tracing::info!(operation = %op, "Running lifecycle operation");
        let invocation = Invocation::new(BIN_SCRIPT, &self.inabox_dir).args([op.to_string()]);
        self.runner.run(&invocation).await?;
        Ok(())
    }

    pub async fn start_anvil(&self) -> Result<()> {
        self.run(LifecycleOp::StartAnvil).await
    }

    pub async fn stop_anvil(&self) -> Result<()> {
        self.run(LifecycleOp::StopAnvil).await
    }

    pub async fn start_binaries(&self) -> Result<()> {
        self.run(LifecycleOp::StartDetached).await
    }

    pub async fn stop_binaries(&self) -> Result<()> {
        self.run(LifecycleOp::Stop).await
    }

    /// Run the node plugin for one operator.
    pub async fn run_node_plugin(
        &self,
        operation: NodeOperation,
        operator: &OperatorVars,
    ) -> Result<()> {
        let env = NodePluginEnv::new(operation, operator);
        tracing::info!(
            operation = %operation,
            socket = %env.socket,
            "Running node plugin"
        );

        let invocation = Invocation::new(NODE_PLUGIN_SCRIPT, &self.inabox_dir).envs(env.to_env());
        self.runner.run(&invocation).await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        config::tests::sample_config,
        error::DeployError,
        keys::tests::store_for,
        process::ProcessOutput,
        variables::{generate_variables, tests::deployed},
    };
    use std::{str::FromStr, sync::Mutex};
    use tempdir::TempDir;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Invocation>>,
        stderr: Option<&'static str>,
    }

    impl ProcessRunner for Recorder {
        async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            match self.stderr {
                Some(stderr) => Err(DeployError::ProcessFailed {
                    program: invocation.program.clone(),
                    status: failed_status(),
                    stderr: stderr.to_string(),
                }),
                None => Ok(ProcessOutput::default()),
            }
        }
    }

    fn failed_status() -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(1 << 8)
    }

    fn operator(root: &std::path::Path) -> (ExperimentConfig, OperatorVars) {
        let mut config = sample_config(root);
        deployed(&mut config);
        let vars = generate_variables(&config, &store_for(&config)).unwrap();
        (config, vars.operators[1].clone())
    }

    #[test]
    fn test_lifecycle_op_names() {
        assert_eq!(LifecycleOp::StartDetached.to_string(), "start-detached");
        assert_eq!(LifecycleOp::Stop.to_string(), "stop");
        assert_eq!(LifecycleOp::StartAnvil.to_string(), "start-anvil");
        assert_eq!(LifecycleOp::StopAnvil.to_string(), "stop-anvil");
        assert_eq!(NodeOperation::from_str("update-socket").unwrap(), NodeOperation::UpdateSocket);
    }

    #[test]
    fn test_node_plugin_env_contract() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let (_, operator) = operator(temp_dir.path());

        let env = NodePluginEnv::new(NodeOperation::Register, &operator).to_env();
        let keys: Vec<&str> = env.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "NODE_OPERATION",
                "NODE_ECDSA_KEY_FILE",
                "NODE_BLS_KEY_FILE",
                "NODE_ECDSA_KEY_PASSWORD",
                "NODE_BLS_KEY_PASSWORD",
                "NODE_SOCKET",
                "NODE_QUORUM_ID_LIST",
                "NODE_CHAIN_RPC",
                "NODE_BLS_OPERATOR_STATE_RETRIVER",
                "NODE_ZGDA_SERVICE_MANAGER",
                "NODE_CHURNER_URL",
                "NODE_NUM_CONFIRMATIONS",
            ]
        );

        let lookup = |key: &str| env.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());
        assert_eq!(lookup("NODE_OPERATION"), Some("register"));
        assert_eq!(lookup("NODE_NUM_CONFIRMATIONS"), Some("0"));
        assert_eq!(
            lookup("NODE_SOCKET").map(String::from),
            Some(format!(
                "localhost:{};{}",
                operator.dispersal_port, operator.retrieval_port
            ))
        );
    }

    #[tokio::test]
    async fn test_lifecycle_invocations() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let config = sample_config(temp_dir.path());
        let runner = Recorder::default();
        let lifecycle = BinaryLifecycle::new(&runner, &config);

        lifecycle.start_anvil().await.unwrap();
        lifecycle.start_binaries().await.unwrap();
        lifecycle.stop_binaries().await.unwrap();
        lifecycle.stop_anvil().await.unwrap();

        let calls = runner.calls.lock().unwrap();
        let args: Vec<&str> = calls.iter().map(|c| c.args[0].as_str()).collect();
        assert_eq!(args, vec!["start-anvil", "start-detached", "stop", "stop-anvil"]);
        assert!(calls.iter().all(|c| {
            c.program == BIN_SCRIPT && c.args.len() == 1 && c.current_dir == config.inabox_dir()
        }));
    }

    #[tokio::test]
    async fn test_node_plugin_invocation() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let (config, operator) = operator(temp_dir.path());
        let runner = Recorder::default();

        BinaryLifecycle::new(&runner, &config)
            .run_node_plugin(NodeOperation::Deregister, &operator)
            .await
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, NODE_PLUGIN_SCRIPT);
        assert!(calls[0].args.is_empty());
        assert_eq!(calls[0].env("NODE_OPERATION"), Some("deregister"));
        assert_eq!(calls[0].envs.len(), 12);
    }

    #[tokio::test]
    async fn test_failure_surfaces_stderr() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let (config, operator) = operator(temp_dir.path());
        let runner = Recorder {
            stderr: Some("operator already registered"),
            ..Default::default()
        };

        let err = BinaryLifecycle::new(&runner, &config)
            .run_node_plugin(NodeOperation::Register, &operator)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("operator already registered"));

        let err = BinaryLifecycle::new(&runner, &config)
            .start_anvil()
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ProcessFailed { .. }));
    }
}
