//! Configuration management for the `vast` runner.
//!
//! Settings are loaded from a TOML file. A missing file is created with the
//! defaults so there is always something to edit.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use vast_relay::RelayConfig;
use vast_voronoi::NeighborConfig;

fn default_node_count() -> usize { 16 }
fn default_relay_count() -> usize { 4 }
fn default_world_size() -> f64 { 1000.0 }
fn default_latency_scale() -> f64 { 0.1 }
fn default_aoi_radius() -> f64 { 150.0 }
fn default_move_speed() -> f64 { 5.0 }
fn default_tick_interval() -> u64 { 10 }
fn default_clock_step() -> u64 { 10 }
fn default_report_interval() -> u64 { 100 }
fn default_seed() -> u64 { 2024 }

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local mesh layout and pacing
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Settings shared by every node's topology manager
    #[serde(default)]
    pub relay: RelayConfig,
    /// Spatial neighbor engine settings
    #[serde(default)]
    pub neighbors: NeighborConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// How the in-process mesh is laid out and driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Number of nodes to spawn; node 1 is the bootstrap
    #[serde(default = "default_node_count")]
    pub node_count: usize,
    /// Nodes `1..=relay_count` are publicly reachable and act as relays
    #[serde(default = "default_relay_count")]
    pub relay_count: usize,
    /// Side length of the square nodes are scattered over
    #[serde(default = "default_world_size")]
    pub world_size: f64,
    /// One-way latency per unit of distance between hidden positions
    #[serde(default = "default_latency_scale")]
    pub latency_scale: f64,
    /// AOI radius used for neighbor reports
    #[serde(default = "default_aoi_radius")]
    pub aoi_radius: f64,
    /// Distance a joined node wanders per tick
    #[serde(default = "default_move_speed")]
    pub move_speed: f64,
    /// Wall-clock tick interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Logical clock units advanced per tick
    #[serde(default = "default_clock_step")]
    pub clock_step: u64,
    /// Ticks between progress reports
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// Stop after this many ticks (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<u64>,
    /// Seed for positions and movement
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            relay_count: default_relay_count(),
            world_size: default_world_size(),
            latency_scale: default_latency_scale(),
            aoi_radius: default_aoi_radius(),
            move_speed: default_move_speed(),
            tick_interval_ms: default_tick_interval(),
            clock_step: default_clock_step(),
            report_interval: default_report_interval(),
            max_ticks: None,
            seed: default_seed(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration settings.
    pub fn validate(&self) -> Result<(), String> {
        let sim = &self.simulation;
        if sim.node_count == 0 {
            return Err("simulation.node_count must be greater than 0".to_string());
        }
        if sim.relay_count == 0 || sim.relay_count > sim.node_count {
            return Err(format!(
                "simulation.relay_count must be between 1 and node_count ({})",
                sim.node_count
            ));
        }
        if !(sim.world_size.is_finite() && sim.world_size > 0.0) {
            return Err("simulation.world_size must be a positive number".to_string());
        }
        if !(sim.latency_scale.is_finite() && sim.latency_scale > 0.0) {
            return Err("simulation.latency_scale must be a positive number".to_string());
        }
        if sim.aoi_radius < 0.0 || sim.move_speed < 0.0 {
            return Err("simulation.aoi_radius and move_speed cannot be negative".to_string());
        }
        if sim.clock_step == 0 {
            return Err("simulation.clock_step must be greater than 0".to_string());
        }

        self.relay.validate().map_err(|e| format!("relay: {e}"))?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.simulation.node_count, 16);
        assert_eq!(config.simulation.relay_count, 4);
        assert_eq!(config.simulation.max_ticks, None);
        assert_eq!(config.logging.level, "info");
        assert!(!config.neighbors.precise_overlap);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("vast.toml");

        let config = AppConfig::load_from_file(&path).await.expect("default config");
        assert_eq!(config.simulation.node_count, 16);
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.expect("written config parses");
        assert_eq!(reloaded.simulation.seed, config.simulation.seed);
        assert_eq!(reloaded.relay.tolerance, config.relay.tolerance);
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("vast.toml");
        let toml_content = r#"
[simulation]
node_count = 6
relay_count = 2
max_ticks = 500

[relay]
client_limit = 3

[logging]
level = "debug"
"#;
        tokio::fs::write(&path, toml_content).await.expect("write config");

        let config = AppConfig::load_from_file(&path).await.expect("valid toml");
        assert_eq!(config.simulation.node_count, 6);
        assert_eq!(config.simulation.max_ticks, Some(500));
        assert_eq!(config.simulation.world_size, 1000.0);
        assert_eq!(config.relay.client_limit, 3);
        assert!(config.relay.as_relay);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.simulation.relay_count = 0;
        assert!(config.validate().is_err());

        config.simulation.relay_count = 20;
        assert!(config.validate().is_err());

        config.simulation.relay_count = 2;
        config.relay.tolerance = -1.0;
        assert!(config.validate().is_err());

        config.relay.tolerance = 0.5;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
