//! Neural network building blocks
//!
//! Dense layers, batch normalization, dropout, GATv2 attention and
//! graph-level pooling on `ndarray` matrices.

mod attention;
mod layers;
mod pooling;

pub use attention::{AttentionWeights, GatV2Conv};
pub use layers::{leaky_relu, softmax_rows, BatchNorm, Dropout, Linear, LEAKY_SLOPE};
pub use pooling::Aggregation;

use serde::{Deserialize, Serialize};

/// Whether layers use batch statistics and dropout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

impl Mode {
    pub fn is_training(&self) -> bool {
        *self == Mode::Train
    }
}
