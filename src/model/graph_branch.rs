//! Segment and dense graph paths
//!
//! A stack of graph attention blocks followed by one graph-level pooling.
//! Segment blocks consume edge features; dense blocks never do.

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::block::GraphAttentionBlock;
use super::branch::BranchKind;
use crate::error::{ensure_positive, ArterialError, Result};
use crate::graph::GraphBatch;
use crate::nn::{Aggregation, Mode};

/// Graph branch with pooled per-graph output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphBranch {
    kind: BranchKind,
    blocks: Vec<GraphAttentionBlock>,
    aggregation: Aggregation,
    width: usize,
    /// Set once the ignored-edge-features warning has been logged
    #[serde(skip)]
    warned_edge_attr: bool,
}

impl GraphBranch {
    /// Segment branch: edge-aware blocks (`edge_dim = None` when the
    /// dataset has no segment edge features)
    #[allow(clippy::too_many_arguments)]
    pub fn segment<R: Rng + ?Sized>(
        node_in_dim: usize,
        edge_dim: Option<usize>,
        width: usize,
        layers: usize,
        heads: usize,
        aggregation: Aggregation,
        dropout: f64,
        rng: &mut R,
    ) -> Result<Self> {
        Self::build(
            BranchKind::Segment,
            node_in_dim,
            edge_dim,
            width,
            layers,
            heads,
            aggregation,
            dropout,
            rng,
        )
    }

    /// Dense branch: blocks without edge dimension
    pub fn dense<R: Rng + ?Sized>(
        node_in_dim: usize,
        width: usize,
        layers: usize,
        heads: usize,
        aggregation: Aggregation,
        dropout: f64,
        rng: &mut R,
    ) -> Result<Self> {
        Self::build(
            BranchKind::Dense,
            node_in_dim,
            None,
            width,
            layers,
            heads,
            aggregation,
            dropout,
            rng,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build<R: Rng + ?Sized>(
        kind: BranchKind,
        node_in_dim: usize,
        edge_dim: Option<usize>,
        width: usize,
        layers: usize,
        heads: usize,
        aggregation: Aggregation,
        dropout: f64,
        rng: &mut R,
    ) -> Result<Self> {
        ensure_positive(&format!("{} node features", kind), node_in_dim)?;
        ensure_positive(&format!("{} layers", kind), layers)?;

        let blocks = (0..layers)
            .map(|idx| {
                let fan_in = if idx == 0 { node_in_dim } else { width };
                GraphAttentionBlock::new(fan_in, width, heads, edge_dim, dropout, rng)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            kind,
            blocks,
            aggregation,
            width,
            warned_edge_attr: false,
        })
    }

    /// Run all blocks on the evolving node matrix, then pool per graph
    ///
    /// Output: `[num_graphs, width]`
    pub fn forward<R: Rng + ?Sized>(
        &mut self,
        graph: &GraphBatch,
        mode: Mode,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let edge_attr = match (self.kind, graph.edge_attr()) {
            (BranchKind::Dense, Some(_)) => {
                if !self.warned_edge_attr {
                    warn!("dense branch ignores the edge features of its input graph");
                    self.warned_edge_attr = true;
                }
                None
            }
            (_, attr) => attr,
        };

        let mut h = graph.x().clone();
        for block in &mut self.blocks {
            h = block.forward(&h, graph.edge_index(), edge_attr, mode, rng)?;
        }

        debug!(
            branch = %self.kind,
            nodes = h.nrows(),
            graphs = graph.num_graphs(),
            "pooling node embeddings"
        );
        let pooled = self
            .aggregation
            .pool(&h, graph.batch(), graph.num_graphs())?;

        if pooled.ncols() != self.width {
            return Err(ArterialError::shape(
                format!("{} branch output", self.kind),
                self.width,
                pooled.ncols(),
            ));
        }
        Ok(pooled)
    }

    pub fn kind(&self) -> BranchKind {
        self.kind
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[GraphAttentionBlock] {
        &self.blocks
    }

    pub fn num_parameters(&self) -> usize {
        self.blocks.iter().map(|b| b.num_parameters()).sum()
    }

    /// Validate the block chain: every block emits `width` and feeds the next
    pub fn check_shapes(&self) -> Result<()> {
        let first = self.blocks.first().ok_or_else(|| ArterialError::InvalidDimension {
            name: format!("{} layers", self.kind),
            value: 0,
        })?;
        let mut fan_in = first.in_channels();
        for block in &self.blocks {
            block.check_shapes()?;
            if block.in_channels() != fan_in || block.out_channels() != self.width {
                return Err(ArterialError::shape(
                    format!("{} block (in, out)", self.kind),
                    format!("({}, {})", fan_in, self.width),
                    format!("({}, {})", block.in_channels(), block.out_channels()),
                ));
            }
            fan_in = self.width;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeIndex;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn graphs(rng: &mut StdRng, with_edges: bool) -> GraphBatch {
        let parts: Vec<GraphBatch> = [3usize, 4]
            .iter()
            .map(|&n| {
                let pairs: Vec<[usize; 2]> = (0..n).map(|i| [i, (i + 1) % n]).collect();
                let x = Array2::random_using((n, 5), Uniform::new(-1.0, 1.0), rng);
                let attr = with_edges
                    .then(|| Array2::random_using((n, 2), Uniform::new(-1.0, 1.0), rng));
                GraphBatch::single(x, EdgeIndex::from_pairs(&pairs), attr).unwrap()
            })
            .collect();
        GraphBatch::collate(&parts).unwrap()
    }

    #[test]
    fn test_segment_branch() {
        let mut rng = StdRng::seed_from_u64(31);
        let mut branch =
            GraphBranch::segment(5, Some(2), 12, 2, 1, Aggregation::Max, 0.2, &mut rng).unwrap();
        let batch = graphs(&mut rng, true);

        let out = branch.forward(&batch, Mode::Train, &mut rng).unwrap();
        assert_eq!(out.dim(), (2, 12));
        assert!(branch.blocks().iter().all(|b| b.edge_dim() == Some(2)));
    }

    #[test]
    fn test_dense_branch_ignores_edge_features() {
        let mut rng = StdRng::seed_from_u64(32);
        let mut branch =
            GraphBranch::dense(5, 6, 3, 2, Aggregation::Mean, 0.0, &mut rng).unwrap();
        let batch = graphs(&mut rng, true);

        let out = branch.forward(&batch, Mode::Eval, &mut rng).unwrap();
        assert_eq!(out.dim(), (2, 6));
        assert!(branch.blocks().iter().all(|b| b.edge_dim().is_none()));
        assert_eq!(branch.blocks()[1].in_channels(), 6);
        assert!(branch.check_shapes().is_ok());
    }

    #[test]
    fn test_dense_edge_feature_warning_logged_once() {
        let mut rng = StdRng::seed_from_u64(34);
        let mut branch =
            GraphBranch::dense(5, 4, 1, 1, Aggregation::Max, 0.0, &mut rng).unwrap();
        assert!(!branch.warned_edge_attr);

        let without = graphs(&mut rng, false);
        branch.forward(&without, Mode::Eval, &mut rng).unwrap();
        assert!(!branch.warned_edge_attr);

        let with = graphs(&mut rng, true);
        branch.forward(&with, Mode::Eval, &mut rng).unwrap();
        assert!(branch.warned_edge_attr);
        // later passes reuse the flag instead of logging again
        branch.forward(&with, Mode::Eval, &mut rng).unwrap();
        assert!(branch.warned_edge_attr);
    }

    #[test]
    fn test_segment_branch_requires_edge_features() {
        let mut rng = StdRng::seed_from_u64(33);
        let mut branch =
            GraphBranch::segment(5, Some(2), 4, 1, 1, Aggregation::Add, 0.0, &mut rng).unwrap();
        let batch = graphs(&mut rng, false);
        assert!(matches!(
            branch.forward(&batch, Mode::Eval, &mut rng),
            Err(ArterialError::MissingEdgeFeatures(2))
        ));
    }
}
