//! Run configuration, loaded from TOML with defaults for every key.
//!
//! ```toml
//! mode = "D"
//! scenario = "golden-opportunity"
//! seed = 7
//! step_budget = 500
//!
//! [thresholds]
//! min_savings = 1.0
//! max_detour = 10
//!
//! [planner]
//! kind = "fast-downward"
//! path = "/opt/downward/fast-downward.py"
//!
//! [oracle]
//! kind = "ollama"
//! model = "llama3.2"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::oracle::{CatalogOracle, DecisionWeights, Oracle, OllamaConfig, OllamaOracle};
use crate::planner::{FastDownwardConfig, FastDownwardPlanner, GridPlanner, Planner};
use crate::policy::{PolicyThresholds, ReplanMode};

fn default_mode() -> ReplanMode {
    ReplanMode::Heuristic
}

fn default_scenario() -> String {
    "golden-opportunity".into()
}

fn default_step_budget() -> u32 {
    500
}

fn default_sensor_radius() -> u32 {
    5
}

fn default_step_cost() -> f64 {
    0.1
}

fn default_baseline_price() -> f64 {
    4.0
}

/// Which planner backs the [`PlannerAdapter`](crate::planner::PlannerAdapter).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlannerConfig {
    #[default]
    Grid,
    FastDownward(FastDownwardConfig),
}

impl PlannerConfig {
    pub fn build(&self) -> Box<dyn Planner> {
        match self {
            Self::Grid => Box::new(GridPlanner::new()),
            Self::FastDownward(cfg) => Box::new(FastDownwardPlanner::new(cfg.clone())),
        }
    }
}

/// Which oracle backs the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OracleConfig {
    Catalog(DecisionWeights),
    Ollama(OllamaConfig),
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self::Catalog(DecisionWeights::default())
    }
}

impl OracleConfig {
    /// Build the oracle. An unreachable Ollama server is not an error here;
    /// its queries degrade instead.
    pub fn build(&self) -> Box<dyn Oracle> {
        match self {
            Self::Catalog(weights) => Box::new(CatalogOracle::new(*weights)),
            Self::Ollama(cfg) => {
                let mut oracle = OllamaOracle::new(cfg.clone());
                oracle.check_connection();
                Box::new(oracle)
            }
        }
    }
}

/// Everything needed to run one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_mode")]
    pub mode: ReplanMode,
    /// Built-in scenario id or path to a scenario TOML file.
    #[serde(default = "default_scenario")]
    pub scenario: String,
    /// Seed for random wall placement.
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_step_budget")]
    pub step_budget: u32,
    /// Half-width of the square sensor window.
    #[serde(default = "default_sensor_radius")]
    pub sensor_radius: u32,
    /// Cost charged per world step in `total_cost`.
    #[serde(default = "default_step_cost")]
    pub step_cost: f64,
    /// Expected price before any discovery.
    #[serde(default = "default_baseline_price")]
    pub baseline_price: f64,
    #[serde(default)]
    pub thresholds: PolicyThresholds,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            scenario: default_scenario(),
            seed: 0,
            step_budget: default_step_budget(),
            sensor_radius: default_sensor_radius(),
            step_cost: default_step_cost(),
            baseline_price: default_baseline_price(),
            thresholds: PolicyThresholds::default(),
            planner: PlannerConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                field: field.into(),
                message: message.into(),
            })
        };
        if self.step_budget == 0 {
            return invalid("step_budget", "must be at least 1");
        }
        if !(self.step_cost.is_finite() && self.step_cost >= 0.0) {
            return invalid("step_cost", "must be a non-negative number");
        }
        if !(self.baseline_price.is_finite() && self.baseline_price > 0.0) {
            return invalid("baseline_price", "must be a positive number");
        }
        if !self.thresholds.min_savings.is_finite() {
            return invalid("thresholds.min_savings", "must be a number");
        }
        if let PlannerConfig::FastDownward(cfg) = &self.planner {
            if cfg.timeout_secs == 0 {
                return invalid("planner.timeout_secs", "must be at least 1");
            }
        }
        Ok(())
    }
}
