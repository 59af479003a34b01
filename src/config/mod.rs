pub mod queue_config;
pub mod simulation_config;

use crate::config::queue_config::QueueConfig;
use crate::config::simulation_config::SimulationConfig;
use crate::coordination::path;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure matching config.yaml format
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the simulation cannot run with
    pub fn validate(&self) -> Result<()> {
        path::validate(&self.queue.directory)
            .with_context(|| format!("Invalid queue directory: {}", self.queue.directory))?;
        if self.simulation.producers == 0 {
            bail!("simulation.producers must be at least 1");
        }
        if self.simulation.consumers == 0 {
            bail!("simulation.consumers must be at least 1");
        }
        Ok(())
    }
}
