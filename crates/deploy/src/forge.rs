//! Command builder for `forge script`.

use crate::{config::DeployerConfig, process::Invocation};

use std::path::Path;

/// Builder for `forge script` invocations.
#[derive(Debug, Clone)]
pub struct ForgeScriptCmdBuilder {
    script: String,
    rpc_url: String,
    private_key: String,
    broadcast: bool,
    slow: bool,
    verifier_url: Option<String>,
    extra_args: Vec<String>,
}

impl ForgeScriptCmdBuilder {
    /// Create a new builder for `script` (`path:Contract`).
    pub fn new(script: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            rpc_url: rpc_url.into(),
            private_key: String::new(),
            broadcast: true,
            slow: false,
            verifier_url: None,
            extra_args: Vec::new(),
        }
    }

    /// Create a builder using the endpoint and flags of a deployer.
    pub fn for_deployer(script: impl Into<String>, deployer: &DeployerConfig) -> Self {
        let mut builder = Self::new(script, deployer.rpc.as_str()).slow(deployer.slow);
        if deployer.verify_contracts {
            builder = builder.verifier_url(deployer.verifier_url.as_ref().map(|u| u.to_string()));
        }
        builder
    }

    /// Set the signing key.
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = key.into();
        self
    }

    /// Whether to broadcast transactions.
    pub fn broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Send one transaction per block.
    pub fn slow(mut self, slow: bool) -> Self {
        self.slow = slow;
        self
    }

    /// Verify contracts, against `url` when given.
    pub fn verifier_url(mut self, url: Option<String>) -> Self {
        self.verifier_url = Some(url.unwrap_or_default());
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the command as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "script".to_string(),
            self.script,
            "--rpc-url".to_string(),
            self.rpc_url,
            "--private-key".to_string(),
            self.private_key,
        ];

        if self.broadcast {
            cmd.push("--broadcast".to_string());
        }

        if self.slow {
            cmd.push("--slow".to_string());
        }

        if let Some(verifier_url) = self.verifier_url {
            cmd.push("--verify".to_string());
            if !verifier_url.is_empty() {
                cmd.push("--verifier-url".to_string());
                cmd.push(verifier_url);
            }
        }

        cmd.extend(self.extra_args);

        cmd
    }

    /// Build a `forge` invocation running in `dir`.
    pub fn invocation(self, dir: &Path) -> Invocation {
        Invocation::new("forge", dir).args(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn deployer() -> DeployerConfig {
        DeployerConfig {
            name: "default".to_string(),
            rpc: Url::parse("http://localhost:8545").unwrap(),
            verify_contracts: false,
            verifier_url: None,
            deploy_subgraphs: false,
            slow: false,
        }
    }

    #[test]
    fn test_forge_cmd_builder() {
        let cmd = ForgeScriptCmdBuilder::new("script/SetUpZGDA.s.sol:SetupZGDA", "http://localhost:8545")
            .private_key("0xabc")
            .build();

        assert_eq!(
            cmd,
            vec![
                "script",
                "script/SetUpZGDA.s.sol:SetupZGDA",
                "--rpc-url",
                "http://localhost:8545",
                "--private-key",
                "0xabc",
                "--broadcast",
            ]
        );
    }

    #[test]
    fn test_forge_cmd_for_deployer_flags() {
        let mut deployer = deployer();
        deployer.slow = true;
        deployer.verify_contracts = true;
        deployer.verifier_url = Some(Url::parse("http://explorer.local/api").unwrap());

        let cmd = ForgeScriptCmdBuilder::for_deployer("s.sol:S", &deployer)
            .extra_args(["--sig", "run()"])
            .build();

        assert!(cmd.contains(&"--slow".to_string()));
        assert!(cmd.contains(&"--verify".to_string()));
        assert!(cmd.contains(&"http://explorer.local/api".to_string()));
        assert_eq!(&cmd[cmd.len() - 2..], &["--sig", "run()"]);
    }

    #[test]
    fn test_forge_cmd_plain_deployer() {
        let cmd = ForgeScriptCmdBuilder::for_deployer("s.sol:S", &deployer()).build();
        assert!(!cmd.contains(&"--slow".to_string()));
        assert!(!cmd.contains(&"--verify".to_string()));
    }
}
