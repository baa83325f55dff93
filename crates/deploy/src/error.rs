//! Error taxonomy for the deployment workflow.
//!
//! Errors fall into three families: configuration mistakes (never retried),
//! external process failures (surfaced with the process output) and
//! serialization problems. None of them is recoverable inside a run; the
//! binary decides how to terminate.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deployer '{name}' is not configured")]
    MissingDeployer { name: String },

    #[error("no key is configured for role '{role}'")]
    MissingKey { role: String },

    #[error("could not parse private key for role '{role}'")]
    InvalidKey { role: String },

    #[error("not enough keys in {path}: {roles} roles need keys, found {keys}")]
    NotEnoughKeys {
        path: PathBuf,
        roles: usize,
        keys: usize,
    },

    #[error("stake distribution weights sum to zero")]
    ZeroStakeWeight,

    #[error("stake weight at index {index} is invalid: {weight}")]
    InvalidStakeWeight { index: usize, weight: f64 },

    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("deployment output '{field}' is not available, contracts must be deployed first")]
    MissingDeploymentOutput { field: &'static str },

    #[error("failed to spawn '{program}'")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("expected output file {path} was not produced")]
    MissingOutput { path: PathBuf },

    #[error("rpc call to {endpoint} failed")]
    Rpc {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("i/o error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed toml in {path}")]
    TomlDe {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize experiment state")]
    TomlSer(#[from] toml::ser::Error),
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    /// Whether this error stems from static configuration rather than an
    /// external process or malformed data.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingDeployer { .. }
                | Self::MissingKey { .. }
                | Self::InvalidKey { .. }
                | Self::NotEnoughKeys { .. }
                | Self::ZeroStakeWeight
                | Self::InvalidStakeWeight { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingDeploymentOutput { .. }
        )
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;
