//! TOML configuration parsing for MemSim.
//!
//! Defines the configuration schema for a simulation run: the memory budget,
//! the pre-fetch lead window, the application registry, and the workload
//! source.

use crate::application::{Application, ApplicationRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    pub memory: MemorySection,
    #[serde(default)]
    pub applications: Vec<ApplicationSection>,
    #[serde(default)]
    pub workload: WorkloadSection,
}

/// General simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for workload generation.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_sim_name(),
            seed: default_seed(),
        }
    }
}

fn default_sim_name() -> String {
    "simulation".to_string()
}

fn default_seed() -> u64 {
    42
}

/// Memory budget and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySection {
    /// Total memory units shared by all applications.
    pub capacity: u64,
    /// Pre-fetch lead window. Admitted applications stay active for twice
    /// this long.
    #[serde(default = "default_window")]
    pub window: f64,
}

fn default_window() -> f64 {
    1.0
}

/// One registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSection {
    pub name: String,
    /// Selectable variant sizes, ascending.
    pub model_sizes: Vec<u64>,
}

/// Workload source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSection {
    /// Format: "csv" or "compact_jsonl".
    #[serde(default = "default_workload_format")]
    pub format: String,
    /// Path to the workload file.
    pub path: Option<String>,
    /// Generator: mean requests per time unit, per application.
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Generator: time span covered by the generated workload.
    #[serde(default = "default_duration")]
    pub duration: f64,
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            format: default_workload_format(),
            path: None,
            rate: default_rate(),
            duration: default_duration(),
        }
    }
}

fn default_workload_format() -> String {
    "csv".to_string()
}
fn default_rate() -> f64 {
    0.1
}
fn default_duration() -> f64 {
    100.0
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.capacity == 0 {
            return Err(ConfigError::Validation("capacity must be > 0".to_string()));
        }
        if !self.memory.window.is_finite() || self.memory.window < 0.0 {
            return Err(ConfigError::Validation(
                "window must be a finite value >= 0".to_string(),
            ));
        }
        if self.applications.is_empty() {
            return Err(ConfigError::Validation(
                "at least one application must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for app in &self.applications {
            if !seen.insert(app.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate application name: {}",
                    app.name
                )));
            }
            if app.model_sizes.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "application {} has no model sizes",
                    app.name
                )));
            }
            if app.model_sizes.contains(&0) {
                return Err(ConfigError::Validation(format!(
                    "application {} has a zero model size",
                    app.name
                )));
            }
            if app.model_sizes.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ConfigError::Validation(format!(
                    "model sizes of {} must be strictly ascending: {:?}",
                    app.name, app.model_sizes
                )));
            }
        }

        if self.workload.rate <= 0.0 || !self.workload.rate.is_finite() {
            return Err(ConfigError::Validation("workload rate must be > 0".to_string()));
        }
        if self.workload.duration < 0.0 || !self.workload.duration.is_finite() {
            return Err(ConfigError::Validation(
                "workload duration must be >= 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a fresh application registry from the configured entries.
    pub fn registry(&self) -> ApplicationRegistry {
        ApplicationRegistry::new(
            self.applications
                .iter()
                .map(|a| Application::new(a.name.clone(), a.model_sizes.clone()))
                .collect(),
        )
    }

    /// Names of all configured applications, in registry order.
    pub fn app_names(&self) -> Vec<&str> {
        self.applications.iter().map(|a| a.name.as_str()).collect()
    }
}
