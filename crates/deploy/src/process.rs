//! External process invocation.
//!
//! Every external program (forge, yarn, the lifecycle scripts) is started
//! through a [`ProcessRunner`] so the stages can be exercised without them.

use std::{
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

use crate::error::{DeployError, Result};

/// A single external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment.
    pub envs: Vec<(String, String)>,
    pub current_dir: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, current_dir: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: current_dir.as_ref().to_path_buf(),
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(
        mut self,
        envs: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.envs
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Value of an added environment variable.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs to completion.
///
/// Implementations wait for the program to exit, without timeout, and map a
/// non-zero exit status to [`DeployError::ProcessFailed`].
pub trait ProcessRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ProcessOutput>> + Send;
}

/// [`ProcessRunner`] spawning real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        tracing::info!(
            program = %invocation.program,
            args = ?invocation.args,
            dir = %invocation.current_dir.display(),
            "Running external process"
        );

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().cloned())
            .current_dir(&invocation.current_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| DeployError::ProcessSpawn {
                program: invocation.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        for line in stdout.lines() {
            tracing::debug!(program = %invocation.program, "{}", line);
        }

        if !output.status.success() {
            return Err(DeployError::ProcessFailed {
                program: invocation.program.clone(),
                status: output.status,
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(ProcessOutput { stdout, stderr })
    }
}
