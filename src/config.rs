use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::net::OutputFormat;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimConfig {
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_max_states")]
    pub max_states: usize,
    /// Keep the marking after every step in the simulation report.
    #[serde(default)]
    pub record_markings: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            seed: 0,
            max_states: default_max_states(),
            record_markings: false,
            format: OutputFormat::default(),
        }
    }
}

impl SimConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

fn default_steps() -> usize {
    100
}

fn default_max_states() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = SimConfig::from_toml_str("seed = 9\nformat = \"ron\"").unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.format, OutputFormat::Ron);
        assert_eq!(config.steps, 100);
        assert_eq!(config.max_states, 10_000);
        assert!(!config.record_markings);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = SimConfig::load_from_file("/nonexistent/pn.toml").unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn rejects_bad_types() {
        assert!(SimConfig::from_toml_str("steps = \"many\"").is_err());
        assert!(SimConfig::from_toml_str("format = \"xml\"").is_err());
    }
}
