//! Orchestrator configuration.
//!
//! Recognizes the configuration keys enumerated for the control surface:
//! risk thresholds, debate timing, and reasoner concurrency. Loaded from a
//! TOML file with an environment-variable override for the file path,
//! falling back to defaults when no file is present.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_position_weight")]
    pub max_position_weight: f64,
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,
    #[serde(default = "default_min_cash_ratio")]
    pub min_cash_ratio: f64,
    #[serde(default = "default_max_concentration_hhi")]
    pub max_concentration_hhi: f64,
    #[serde(default = "default_simulation_paths")]
    pub simulation_paths: usize,
    #[serde(default = "default_confidence_alpha")]
    pub confidence_alpha: f64,
}

fn default_max_position_weight() -> f64 {
    0.35
}
fn default_max_drawdown() -> f64 {
    0.20
}
fn default_min_cash_ratio() -> f64 {
    0.05
}
fn default_max_concentration_hhi() -> f64 {
    0.5
}
fn default_simulation_paths() -> usize {
    10_000
}
fn default_confidence_alpha() -> f64 {
    0.95
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_weight: default_max_position_weight(),
            max_drawdown: default_max_drawdown(),
            min_cash_ratio: default_min_cash_ratio(),
            max_concentration_hhi: default_max_concentration_hhi(),
            simulation_paths: default_simulation_paths(),
            confidence_alpha: default_confidence_alpha(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_round_timeout_sec")]
    pub round_timeout_sec: u64,
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,
    #[serde(default = "default_deliberation_window_sec")]
    pub deliberation_window_sec: u64,
}

fn default_max_rounds() -> u32 {
    3
}
fn default_round_timeout_sec() -> u64 {
    45
}
fn default_consensus_threshold() -> f64 {
    0.7
}
fn default_deliberation_window_sec() -> u64 {
    5
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_timeout_sec: default_round_timeout_sec(),
            consensus_threshold: default_consensus_threshold(),
            deliberation_window_sec: default_deliberation_window_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    #[serde(default = "default_backend_id")]
    pub backend_id: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_backend_id() -> String {
    "stub".to_string()
}
fn default_concurrency() -> usize {
    4
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            backend_id: default_backend_id(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_speed")]
    pub default_speed: f64,
}

fn default_speed() -> f64 {
    1.0
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            default_speed: default_speed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub debate: DebateConfig,
    #[serde(default)]
    pub reasoner: ReasonerConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `APEX_CONFIG_PATH` (default `apex.toml`), falling back to
    /// defaults if the file does not exist or fails to parse.
    pub fn from_env() -> Self {
        let path = std::env::var("APEX_CONFIG_PATH").unwrap_or_else(|_| "apex.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!(path = %path, error = %e, "using default apex config");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.debate.max_rounds, 3);
        assert!((cfg.debate.consensus_threshold - 0.7).abs() < 1e-9);
        assert_eq!(cfg.risk.simulation_paths, 10_000);
        assert_eq!(cfg.reasoner.concurrency, 4);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
            [debate]
            max_rounds = 5
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.debate.max_rounds, 5);
        assert_eq!(cfg.debate.round_timeout_sec, 45);
        assert_eq!(cfg.risk.simulation_paths, 10_000);
    }

    #[test]
    fn load_reads_a_toml_file_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [risk]
            max_position_weight = 0.5

            [debate]
            max_rounds = 7
            "#
        )
        .unwrap();

        let cfg = AppConfig::load(file.path()).unwrap();
        assert_eq!(cfg.debate.max_rounds, 7);
        assert!((cfg.risk.max_position_weight - 0.5).abs() < 1e-9);
        assert_eq!(cfg.risk.min_cash_ratio, default_min_cash_ratio());
    }

    #[test]
    fn load_fails_for_a_missing_file() {
        let result = AppConfig::load("/nonexistent/path/apex.toml");
        assert!(result.is_err());
    }
}
