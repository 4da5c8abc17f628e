//! Configuration for the layout engine, graph sources and HTTP server
//!
//! Configuration is read from a YAML file. Every field has a default, so an
//! empty file (or no file at all) yields a working setup.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

/// Force-law and integration constants, fixed for the duration of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Base magnitude of the all-pairs repulsion
    pub repulsion_strength: f64,
    /// Spring constant of the edge attraction
    pub attraction_strength: f64,
    /// Below this distance repulsion switches to the bounded linear law
    pub min_distance: f64,
    /// Repulsion grows by this factor per incident edge
    pub degree_factor: f64,
    /// Velocity multiplier applied every step, in `(0, 1]`
    pub damping: f64,
    /// Speed cap per node per step
    pub max_velocity: f64,
    /// Half-extent of the bounding box for every coordinate
    pub max_position: f64,
    /// Target wall-clock duration of one step
    pub step_budget_ms: u64,
    /// Aggregate movement below which the run counts as stabilized
    pub stabilization_threshold: f64,
    /// Force workers; 0 uses all available cores
    pub worker_count: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            repulsion_strength: 1000.0,
            attraction_strength: 0.01,
            min_distance: 200.0,
            degree_factor: 64.0,
            damping: 0.9,
            max_velocity: 8.0,
            max_position: 1024.0,
            step_budget_ms: 50,
            stabilization_threshold: 1.0,
            worker_count: 0,
        }
    }
}

impl SimulationParams {
    pub fn step_budget(&self) -> Duration {
        Duration::from_millis(self.step_budget_ms)
    }

    /// Worker count bounded by the hardware, never zero
    pub fn effective_workers(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        match self.worker_count {
            0 => available,
            n => n.min(available),
        }
    }

    /// Reject parameter sets the force law cannot run with
    pub fn validate(&self) -> LayoutResult<()> {
        let non_negative = [
            ("repulsion_strength", self.repulsion_strength),
            ("attraction_strength", self.attraction_strength),
            ("min_distance", self.min_distance),
            ("degree_factor", self.degree_factor),
            ("stabilization_threshold", self.stabilization_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(LayoutError::InvalidParameter {
                    name,
                    reason: format!("must be finite and non-negative, got {value}"),
                });
            }
        }

        for (name, value) in [
            ("max_velocity", self.max_velocity),
            ("max_position", self.max_position),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(LayoutError::InvalidParameter {
                    name,
                    reason: format!("must be finite and positive, got {value}"),
                });
            }
        }

        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(LayoutError::InvalidParameter {
                name: "damping",
                reason: format!("must lie in (0, 1], got {}", self.damping),
            });
        }

        Ok(())
    }
}

/// Where the initial graph comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Uniformly random graph
    Random {
        node_count: usize,
        edge_count: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// JSON node/edge file
    File { path: PathBuf },
    /// Word co-occurrence graph built from a text file
    Text {
        path: PathBuf,
        #[serde(default = "default_max_unique_words")]
        max_unique_words: usize,
    },
}

fn default_max_unique_words() -> usize {
    250
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Random {
            node_count: 10,
            edge_count: 20,
            seed: None,
        }
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served for any path outside the API
    pub static_dir: Option<PathBuf>,
    /// How long `stop` waits for the stepping loop to exit
    pub stop_timeout_ms: u64,
    /// Start the simulation as soon as the graph is loaded
    pub autostart: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: None,
            stop_timeout_ms: 5000,
            autostart: true,
        }
    }
}

impl ServerConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: SimulationParams,
    pub source: SourceConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load from a YAML file and validate the simulation parameters
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let config = Self::from_yaml(&text)?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let config: AppConfig = if text.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.simulation.validate()?;
        Ok(config)
    }
}
