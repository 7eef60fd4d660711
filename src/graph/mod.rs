//! Graph data structures
//!
//! Edge lists and batched graph containers consumed by the graph branches.

mod batch;
mod edges;

pub use batch::{ArterialBatch, ArterialSample, GraphBatch};
pub use edges::EdgeIndex;
