//! Configuration Management
//!
//! Unified configuration with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Project config (.codeloom/config.toml)
//! 3. Environment variables (CODELOOM_*)

mod loader;

pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::agent::AgentConfig;
use crate::constants;
use crate::partition::PartitionConfig;
use crate::pipeline::PipelineConfig;
use crate::types::{LoomError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub partition: PartitionSection,
    pub agent: AgentSection,
    pub pipeline: PipelineSection,
    pub model: ModelSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partition: PartitionSection::default(),
            agent: AgentSection::default(),
            pipeline: PipelineSection::default(),
            model: ModelSection::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if self.partition.budget == 0 {
            return Err(LoomError::Config(
                "partition budget must be greater than 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.partition.min_unit_fraction) {
            return Err(LoomError::Config(format!(
                "partition min_unit_fraction must be in [0.0, 1.0), got {}",
                self.partition.min_unit_fraction
            )));
        }
        if self.pipeline.max_concurrent_requests == 0 {
            return Err(LoomError::Config(
                "pipeline max_concurrent_requests must be greater than 0".to_string(),
            ));
        }
        if self.model.timeout_secs == 0 {
            return Err(LoomError::Config(
                "model timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn partition_config(&self) -> PartitionConfig {
        PartitionConfig {
            budget: self.partition.budget,
            min_unit_fraction: self.partition.min_unit_fraction,
            granularity_penalty: self.partition.granularity_penalty,
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            synthesis_threshold: self.agent.synthesis_threshold,
            max_retries: self.agent.max_retries,
            request_timeout: Duration::from_secs(self.model.timeout_secs),
            base_delay: Duration::from_millis(self.agent.base_delay_ms),
            max_delay: Duration::from_secs(self.agent.max_delay_secs),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_concurrent_requests: self.pipeline.max_concurrent_requests,
        }
    }

    /// Render the effective configuration as TOML, for diagnostics.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LoomError::Config(e.to_string()))
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionSection {
    /// Weight budget per documentation unit
    pub budget: u64,
    /// Minimum unit size as a fraction of the budget
    pub min_unit_fraction: f64,
    /// Score penalty per group away from the ideal group count
    pub granularity_penalty: u64,
}

impl Default for PartitionSection {
    fn default() -> Self {
        Self {
            budget: constants::partition::DEFAULT_BUDGET,
            min_unit_fraction: constants::partition::MIN_UNIT_FRACTION,
            granularity_penalty: constants::partition::GRANULARITY_PENALTY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Weight above which an internal node delegates to child overviews
    pub synthesis_threshold: u64,
    /// Transient-failure retries per node
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            synthesis_threshold: constants::agent::DEFAULT_SYNTHESIS_THRESHOLD,
            max_retries: constants::agent::DEFAULT_MAX_RETRIES,
            base_delay_ms: constants::agent::BASE_DELAY_MS,
            max_delay_secs: constants::agent::MAX_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Global cap on concurrent model calls
    pub max_concurrent_requests: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_concurrent_requests: constants::pipeline::DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Timeout for a single generation call (seconds)
    pub timeout_secs: u64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            timeout_secs: constants::model::DEFAULT_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
