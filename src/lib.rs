//! # ArterialNet
//!
//! A multi-branch graph neural network predicting a scalar or binary-class
//! target from heterogeneous arterial graph data.
//!
//! Every sample carries three inputs:
//!
//! - a fixed-length **global** feature vector,
//! - a **segment** graph whose edges carry features,
//! - a **dense** graph without edge features.
//!
//! Each input has its own branch (an MLP for the global vector, stacks of
//! GATv2 attention blocks with graph-level pooling for the graphs). A branch
//! with zero layers is disabled. The outputs of the active branches are
//! concatenated and mapped to the prediction by the fusion head.
//!
//! ## Modules
//!
//! - `graph` - Edge lists, batched graphs and sample collation
//! - `nn` - Linear, BatchNorm, Dropout, GATv2 attention and pooling
//! - `model` - Branches, fusion head and the full network
//! - `config` - Experiment configuration and dataset description
//! - `factory` - Model construction and canonical model names
//!
//! ## Example
//!
//! ```rust,no_run
//! use arterial_net::prelude::*;
//!
//! fn main() -> arterial_net::Result<()> {
//!     let config = ExperimentConfig::default();
//!     let dataset = DatasetDescription {
//!         num_global_features: 12,
//!         num_segment_node_features: 8,
//!         num_segment_edge_features: 4,
//!         num_dense_node_features: 3,
//!     };
//!
//!     let (mut model, name) = ModelFactory::build(&config, &dataset, Device::Cpu)?;
//!     println!("{} with {} parameters", name, model.num_parameters());
//!
//!     model.eval();
//!     # let batch: ArterialBatch = unimplemented!();
//!     let predictions = model.forward(&batch)?;
//!     println!("{:?}", predictions.dim());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod graph;
pub mod model;
pub mod nn;

pub use error::{ArterialError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DatasetDescription, Device, ExperimentConfig};
    pub use crate::error::{ArterialError, Result};
    pub use crate::factory::ModelFactory;
    pub use crate::graph::{ArterialBatch, ArterialSample, EdgeIndex, GraphBatch};
    pub use crate::model::{
        ArterialNet, ArterialNetConfig, BranchKind, BranchSpec, FusionHead, GlobalBranch,
        GraphAttentionBlock, GraphBranch, Task,
    };
    pub use crate::nn::{Aggregation, GatV2Conv, Mode};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
