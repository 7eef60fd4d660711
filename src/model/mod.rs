//! ArterialNet model
//!
//! Global, segment and dense branches, each optional, whose pooled outputs
//! are concatenated by the fusion head.

mod block;
mod branch;
mod fusion;
mod global;
mod graph_branch;
mod network;

pub use block::GraphAttentionBlock;
pub use branch::{fusion_width, BranchKind, BranchSpec};
pub use fusion::{FusionHead, Task};
pub use global::GlobalBranch;
pub use graph_branch::GraphBranch;
pub use network::{ArterialNet, ArterialNetConfig};
