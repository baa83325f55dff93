//! Top-level deployment sequencing.
//!
//! A run walks the stages strictly in order:
//!
//! ```text
//! Uninitialized -> KeysLoaded -> ContractsDeployed | SkippedAlreadyDeployed
//!   -> [SubgraphsDeployed] -> VariablesGenerated -> Complete
//! ```
//!
//! Any stage error aborts the run. Whatever happens, the experiment state is
//! saved once the stages stop, so outputs merged by completed stages survive a
//! later failure and make the rerun skip them.

use tracing::{instrument::WithSubscriber, level_filters::LevelFilter};

use crate::{
    config::ExperimentConfig,
    contracts::{ContractDeployer, ContractsOutcome},
    error::Result,
    keys::KeyStore,
    logging::RunLog,
    process::ProcessRunner,
    state::DeploymentState,
    subgraph::{BlockNumberSource, SubgraphDeployer},
    variables::{ENVS_DIR, generate_variables},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum DeploymentPhase {
    Uninitialized,
    KeysLoaded,
    ContractsDeployed,
    SkippedAlreadyDeployed,
    SubgraphsDeployed,
    VariablesGenerated,
    Complete,
}

/// Sequences the deployment stages of an experiment.
pub struct Orchestrator<R, B, S> {
    runner: R,
    blocks: B,
    state: S,
    log_level: LevelFilter,
    phase: DeploymentPhase,
}

impl<R, B, S> Orchestrator<R, B, S>
where
    R: ProcessRunner,
    B: BlockNumberSource,
    S: DeploymentState,
{
    pub fn new(runner: R, blocks: B, state: S) -> Self {
        Self {
            runner,
            blocks,
            state,
            log_level: LevelFilter::INFO,
            phase: DeploymentPhase::Uninitialized,
        }
    }

    /// Maximum level of the events written to the run log.
    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    /// Last phase reached by the latest run.
    pub fn phase(&self) -> DeploymentPhase {
        self.phase
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Deploy an experiment, then persist its state.
    ///
    /// Events of the run also go to the experiment's log file. A stage error
    /// is returned even when saving fails afterwards.
    pub async fn deploy_experiment(&mut self, config: &mut ExperimentConfig) -> Result<()> {
        let log = RunLog::open(&config.path)?;
        let dispatch = log.dispatch(self.log_level);

        async {
            let result = self.run_stages(config).await;
            let saved = config.save();

            match (result, saved) {
                (Err(err), Err(save_err)) => {
                    tracing::error!(error = %save_err, "Failed to save experiment state");
                    Err(err)
                }
                (Err(err), Ok(_)) => {
                    tracing::error!(
                        phase = %self.phase,
                        contracts_recorded = config.zgda.contracts.is_some(),
                        error = %err,
                        "Deployment aborted"
                    );
                    Err(err)
                }
                (Ok(()), saved) => saved.map(|_| ()),
            }
        }
        .with_subscriber(dispatch)
        .await
    }

    async fn run_stages(&mut self, config: &mut ExperimentConfig) -> Result<()> {
        self.phase = DeploymentPhase::Uninitialized;
        tracing::info!(
            experiment = %config.name,
            root = %config.root_path.display(),
            "Deploying experiment..."
        );

        let keys = KeyStore::load_for(config)?;
        self.advance(DeploymentPhase::KeysLoaded);

        let outcome = ContractDeployer::new(&self.runner)
            .deploy(config, &keys, &self.state)
            .await?;
        self.advance(match outcome {
            ContractsOutcome::Deployed => DeploymentPhase::ContractsDeployed,
            ContractsOutcome::AlreadyDeployed => DeploymentPhase::SkippedAlreadyDeployed,
        });

        if config.zgda_deployer()?.deploy_subgraphs {
            SubgraphDeployer::new(&self.runner)
                .deploy(config, &self.blocks)
                .await?;
            self.advance(DeploymentPhase::SubgraphsDeployed);
        }

        let variables = generate_variables(config, &keys)?;
        let files = variables.write_env_files(&config.path.join(ENVS_DIR))?;
        config.variables = Some(variables);
        tracing::info!(files = files.len(), "Generated service variables");
        self.advance(DeploymentPhase::VariablesGenerated);

        self.advance(DeploymentPhase::Complete);
        tracing::info!("Test environment has successfully deployed!");
        Ok(())
    }

    fn advance(&mut self, phase: DeploymentPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "Deployment phase");
        self.phase = phase;
    }
}
