//! Configuration handling.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArterialError, Result};
use crate::nn::Aggregation;

/// Experiment hyperparameters.
///
/// Training-only fields (optimizer, scheduler, sampling flags, seeds) are
/// carried so the derived model name identifies the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Base model identifier
    pub base_model_name: String,
    pub batch_size: usize,
    pub total_epochs: usize,
    /// Hidden width of the global and segment branches
    pub hidden_channels: usize,
    /// Hidden width of the dense branch
    pub hidden_channels_dense: usize,
    pub optimizer: String,
    pub learning_rate: f64,
    pub lr_scheduler: String,
    pub num_global_layers: usize,
    pub num_segment_layers: usize,
    pub num_dense_layers: usize,
    /// Attention heads per graph attention block
    pub heads: usize,
    pub aggregation: Aggregation,
    pub dropout: f64,
    pub weighted_loss: bool,
    pub oversampling: bool,
    /// Seed for weight initialization
    pub random_state: u64,
    /// Seed of the train/test split
    pub test_random_state: u64,
    pub is_classification: bool,
    /// Free-form label appended to the model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            base_model_name: "ArterialNet".to_string(),
            batch_size: 32,
            total_epochs: 100,
            hidden_channels: 64,
            hidden_channels_dense: 32,
            optimizer: "adam".to_string(),
            learning_rate: 0.001,
            lr_scheduler: "none".to_string(),
            num_global_layers: 2,
            num_segment_layers: 2,
            num_dense_layers: 2,
            heads: 1,
            aggregation: Aggregation::Max,
            dropout: 0.2,
            weighted_loss: false,
            oversampling: false,
            random_state: 42,
            test_random_state: 42,
            is_classification: false,
            tag: None,
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject float hyperparameters that have no stable textual form.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("learning_rate", self.learning_rate),
            ("dropout", self.dropout),
        ] {
            if !value.is_finite() {
                return Err(ArterialError::Config(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Save configuration to TOML file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Feature widths of the dataset, one entry per input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescription {
    pub num_global_features: usize,
    pub num_segment_node_features: usize,
    pub num_segment_edge_features: usize,
    pub num_dense_node_features: usize,
}

impl DatasetDescription {
    /// Load from a TOML or JSON file (chosen by extension).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Ok(toml::from_str(&content)?),
        }
    }
}

/// Compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

impl FromStr for Device {
    type Err = ArterialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            other => Err(ArterialError::UnsupportedDevice(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExperimentConfig::default();
        assert_eq!(config.base_model_name, "ArterialNet");
        assert_eq!(config.aggregation, Aggregation::Max);
        assert!(config.tag.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ExperimentConfig::from_toml(
            r#"
            hidden_channels = 128
            num_dense_layers = 0
            aggregation = "sum"
            tag = "baseline"
            "#,
        )
        .unwrap();
        assert_eq!(config.hidden_channels, 128);
        assert_eq!(config.num_dense_layers, 0);
        assert_eq!(config.aggregation, Aggregation::Add);
        assert_eq!(config.tag.as_deref(), Some("baseline"));
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ExperimentConfig {
            is_classification: true,
            tag: Some("run1".into()),
            ..Default::default()
        };
        config.to_file(&path).unwrap();
        assert_eq!(ExperimentConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_non_finite_floats() {
        assert!(ExperimentConfig::default().validate().is_ok());

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let lr = ExperimentConfig {
                learning_rate: value,
                ..Default::default()
            };
            assert!(matches!(lr.validate(), Err(ArterialError::Config(_))));

            let dropout = ExperimentConfig {
                dropout: value,
                ..Default::default()
            };
            assert!(matches!(dropout.validate(), Err(ArterialError::Config(_))));
        }
    }

    #[test]
    fn test_bad_aggregation_rejected() {
        assert!(ExperimentConfig::from_toml("aggregation = \"topk\"").is_err());
    }

    #[test]
    fn test_dataset_description_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("dataset.json");
        std::fs::write(
            &json,
            r#"{"num_global_features": 3, "num_segment_node_features": 4,
                "num_segment_edge_features": 2, "num_dense_node_features": 5}"#,
        )
        .unwrap();
        let toml_path = dir.path().join("dataset.toml");
        std::fs::write(
            &toml_path,
            "num_global_features = 3\nnum_segment_node_features = 4\n\
             num_segment_edge_features = 2\nnum_dense_node_features = 5\n",
        )
        .unwrap();

        let a = DatasetDescription::from_file(&json).unwrap();
        let b = DatasetDescription::from_file(&toml_path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.num_dense_node_features, 5);
    }

    #[test]
    fn test_device_parse() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert!(matches!(
            "cuda:0".parse::<Device>(),
            Err(ArterialError::UnsupportedDevice(_))
        ));
    }
}
