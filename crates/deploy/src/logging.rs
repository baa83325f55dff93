//! Log sink scoped to one deployment run.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{Dispatch, level_filters::LevelFilter};
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt};

use crate::error::{DeployError, Result};

/// Log file written in the experiment directory.
pub const LOG_FILENAME: &str = "deploy.log";

/// Appends the events of a run to [`LOG_FILENAME`], next to stdout.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    file: Arc<File>,
}

impl RunLog {
    /// Open (or create) the log file of the experiment directory `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| DeployError::io(dir, e))?;
        let path = dir.join(LOG_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DeployError::io(&path, e))?;

        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A dispatcher writing to stdout and to the log file, up to `level`.
    pub fn dispatch(&self, level: LevelFilter) -> Dispatch {
        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_filter(level))
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(self.file.clone())
                    .with_filter(level),
            );
        Dispatch::new(subscriber)
    }
}
