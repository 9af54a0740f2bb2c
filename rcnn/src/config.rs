//! Training configuration, read from JSON.
//!
//! ```json
//! { "learn_rate": 0.001, "epochs": 2, "shuffle": true, "seed": 42, "params_path": "params.json" }
//! ```
//!
//! Every field is optional and falls back to its default.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub learn_rate: f64,
    pub epochs: usize,
    /// Reorder samples before every epoch.
    pub shuffle: bool,
    /// Seed for parameter initialization and shuffling. Entropy when absent.
    pub seed: Option<u64>,
    /// Number of samples between progress log lines.
    pub log_interval: usize,
    pub params_path: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            learn_rate: 0.001,
            epochs: 1,
            shuffle: false,
            seed: None,
            log_interval: 1000,
            params_path: None,
        }
    }
}

impl TrainConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrainConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.learn_rate.is_finite() || self.learn_rate <= 0.0 {
            return Err(Error::Config(format!(
                "learn_rate must be positive and finite, got {}",
                self.learn_rate
            )));
        }
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be at least 1".to_string()));
        }
        if self.log_interval == 0 {
            return Err(Error::Config("log_interval must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TrainConfig::from_json_str("{}").unwrap();
        assert_eq!(config, TrainConfig::default());
        assert_eq!(config.learn_rate, 0.001);
    }

    #[test]
    fn test_partial_override() {
        let config = TrainConfig::from_json_str(r#"{"epochs": 3, "shuffle": true, "seed": 9}"#).unwrap();
        assert_eq!(config.epochs, 3);
        assert!(config.shuffle);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.log_interval, 1000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(TrainConfig::from_json_str(r#"{"learn_rate": -1.0}"#), Err(Error::Config(_))));
        assert!(matches!(TrainConfig::from_json_str(r#"{"epochs": 0}"#), Err(Error::Config(_))));
        assert!(matches!(TrainConfig::from_json_str(r#"{"log_interval": 0}"#), Err(Error::Config(_))));
        assert!(matches!(TrainConfig::from_json_str(r#"{"momentum": 0.9}"#), Err(Error::Json(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"learn_rate": 0.01, "params_path": "net.json"}}"#).unwrap();
        let config = TrainConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.learn_rate, 0.01);
        assert_eq!(config.params_path, Some(PathBuf::from("net.json")));
        assert!(matches!(TrainConfig::from_json_file("/nonexistent/config.json"), Err(Error::Io(_))));
    }
}
