//! Model construction from experiment configuration
//!
//! Builds [`ArterialNet`] from hyperparameters and dataset feature widths,
//! and derives the model name used as the artifact key of a run.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::config::{DatasetDescription, Device, ExperimentConfig};
use crate::error::{ArterialError, Result};
use crate::model::{ArterialNet, ArterialNetConfig, Task};

/// Short keys used in model names. Fields missing here use their own name.
const NAME_KEYS: &[(&str, &str)] = &[
    ("aggregation", "agg"),
    ("batch_size", "bs"),
    ("dropout", "drop"),
    ("heads", "heads"),
    ("hidden_channels", "hc"),
    ("hidden_channels_dense", "hcd"),
    ("is_classification", "class"),
    ("learning_rate", "lr"),
    ("lr_scheduler", "lrs"),
    ("num_dense_layers", "ndl"),
    ("num_global_layers", "ngl"),
    ("num_segment_layers", "nsl"),
    ("optimizer", "op"),
    ("oversampling", "os"),
    ("random_state", "rs"),
    ("tag", "tag"),
    ("test_random_state", "trs"),
    ("total_epochs", "te"),
    ("weighted_loss", "wl"),
];

/// Base models this factory can build
pub const SUPPORTED_MODELS: &[&str] = &["ArterialNet"];

/// Builds models and their names
pub struct ModelFactory;

impl ModelFactory {
    /// Build the model described by `config` for `dataset`
    ///
    /// Returns the model together with its name.
    pub fn build(
        config: &ExperimentConfig,
        dataset: &DatasetDescription,
        device: Device,
    ) -> Result<(ArterialNet, String)> {
        config.validate()?;
        let name = Self::model_name(config)?;

        info!("------------------------------------------------ Model information");
        info!(model = %config.base_model_name, device = %device, "Training model");
        info!(
            hidden = config.hidden_channels,
            hidden_dense = config.hidden_channels_dense,
            "Hidden channels"
        );
        info!(
            global = config.num_global_layers,
            segment = config.num_segment_layers,
            dense = config.num_dense_layers,
            "Number of layers"
        );
        info!(
            aggregation = %config.aggregation,
            dropout = config.dropout,
            oversampling = config.oversampling,
            "Regularization"
        );

        let net_config = Self::network_config(config, dataset)?;
        let model = ArterialNet::new(net_config)?;

        info!(
            name = %name,
            parameters = model.num_parameters(),
            fusion_in = model.fusion_in_dim(),
            "Model created"
        );
        Ok((model, name))
    }

    /// Translate experiment hyperparameters into the architecture config
    pub fn network_config(
        config: &ExperimentConfig,
        dataset: &DatasetDescription,
    ) -> Result<ArterialNetConfig> {
        if !SUPPORTED_MODELS.contains(&config.base_model_name.as_str()) {
            return Err(ArterialError::UnknownModel(config.base_model_name.clone()));
        }

        Ok(ArterialNetConfig {
            global_in_dim: dataset.num_global_features,
            segment_node_in_dim: dataset.num_segment_node_features,
            segment_edge_in_dim: dataset.num_segment_edge_features,
            dense_node_in_dim: dataset.num_dense_node_features,
            hidden_dim: config.hidden_channels,
            hidden_dim_dense: config.hidden_channels_dense,
            num_global_layers: config.num_global_layers,
            num_segment_layers: config.num_segment_layers,
            num_dense_layers: config.num_dense_layers,
            heads: config.heads,
            aggregation: config.aggregation,
            dropout: config.dropout,
            task: Task::from_flag(config.is_classification),
            seed: config.random_state,
        })
    }

    /// Canonical model name
    ///
    /// `base_model_name` followed by every other field as `key-value`,
    /// sorted by field name and joined with `_`. Absent optional fields
    /// are left out. Non-finite floats are rejected since they would all
    /// serialize to the same value.
    pub fn model_name(config: &ExperimentConfig) -> Result<String> {
        config.validate()?;
        let value = serde_json::to_value(config)?;
        let fields: BTreeMap<String, Value> = match value {
            Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(ArterialError::Config(format!(
                    "configuration serialized to {} instead of an object",
                    other
                )))
            }
        };

        let mut name = config.base_model_name.clone();
        for (field, value) in &fields {
            if field == "base_model_name" {
                continue;
            }
            let rendered = match value {
                // absent options are not serialized at all
                Value::Null => {
                    return Err(ArterialError::Config(format!(
                        "{} has no name representation",
                        field
                    )))
                }
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            name.push('_');
            name.push_str(short_key(field));
            name.push('-');
            name.push_str(&rendered);
        }
        Ok(name)
    }
}

fn short_key(field: &str) -> &str {
    NAME_KEYS
        .iter()
        .find(|(long, _)| *long == field)
        .map_or(field, |(_, short)| *short)
}
