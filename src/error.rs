//! Error types for ArterialNet

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, ArterialError>;

/// Errors raised while building or running the model
#[derive(Error, Debug)]
pub enum ArterialError {
    /// Every branch has zero layers, so the fusion head would have no input
    #[error("All branches are disabled: at least one of global, segment or dense must have layers")]
    NoActiveBranches,

    /// A dimension that must be positive was zero
    #[error("Invalid dimension for {name}: {value}. Must be positive.")]
    InvalidDimension { name: String, value: usize },

    /// Dropout probability outside [0, 1)
    #[error("Invalid dropout rate: {0}. Must be in [0, 1).")]
    InvalidDropout(f64),

    /// Tensor shape disagreement
    #[error("Shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: String,
        expected: String,
        got: String,
    },

    /// An edge-aware convolution was called without edge features
    #[error("Edge features required: convolution was built with edge_dim = {0}")]
    MissingEdgeFeatures(usize),

    /// Edge features have the wrong width
    #[error("Edge feature dimension mismatch: expected {expected}, got {got}")]
    EdgeDimMismatch { expected: usize, got: usize },

    /// Edge index refers to a node that does not exist
    #[error("Edge {edge} references node {node}, but graph has {num_nodes} nodes")]
    InvalidEdgeIndex {
        edge: usize,
        node: usize,
        num_nodes: usize,
    },

    /// Batch-assignment vector is inconsistent with the node matrix
    #[error("Invalid batch assignment: {0}")]
    InvalidBatch(String),

    /// BatchNorm in training mode needs more than one row
    #[error("Batch normalization needs more than 1 value per channel in training mode, got {0}")]
    BatchTooSmall(usize),

    /// Unknown aggregation identifier
    #[error("Unknown aggregation: {0}. Expected one of add, sum, mean, max")]
    UnknownAggregation(String),

    /// Unknown base model identifier
    #[error("Unknown base model: {0}")]
    UnknownModel(String),

    /// Device not supported by the ndarray backend
    #[error("Unsupported device: {0}. Only cpu is available")]
    UnsupportedDevice(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArterialError {
    /// Build a shape mismatch error
    pub fn shape(context: impl Into<String>, expected: impl ToString, got: impl ToString) -> Self {
        ArterialError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Check if the error was raised at construction time rather than in a forward pass
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ArterialError::NoActiveBranches
                | ArterialError::InvalidDimension { .. }
                | ArterialError::InvalidDropout(_)
                | ArterialError::UnknownAggregation(_)
                | ArterialError::UnknownModel(_)
                | ArterialError::UnsupportedDevice(_)
                | ArterialError::Config(_)
        )
    }
}

/// Reject zero-sized dimensions
pub(crate) fn ensure_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(ArterialError::InvalidDimension {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_message() {
        let err = ArterialError::shape("fusion", "(4, 96)", "(4, 64)");
        let msg = err.to_string();
        assert!(msg.contains("fusion"));
        assert!(msg.contains("(4, 96)"));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(ArterialError::NoActiveBranches.is_configuration_error());
        assert!(ArterialError::InvalidDropout(1.5).is_configuration_error());
        assert!(!ArterialError::MissingEdgeFeatures(3).is_configuration_error());
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("hidden", 8).is_ok());
        assert!(matches!(
            ensure_positive("hidden", 0),
            Err(ArterialError::InvalidDimension { value: 0, .. })
        ));
    }
}
