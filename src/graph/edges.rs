//! Edge index in coordinate (COO) format
//!
//! Row 0 holds source nodes, row 1 target nodes. Messages flow from
//! source to target, so a node aggregates over its incoming edges.

use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ArterialError, Result};

/// Directed edge list of a (batched) graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeIndex {
    /// Source node for each edge
    sources: Vec<usize>,
    /// Target node for each edge
    targets: Vec<usize>,
}

impl EdgeIndex {
    /// Create an empty edge index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from `[source, target]` pairs
    pub fn from_pairs(edges: &[[usize; 2]]) -> Self {
        Self {
            sources: edges.iter().map(|e| e[0]).collect(),
            targets: edges.iter().map(|e| e[1]).collect(),
        }
    }

    /// Create from a `(2, num_edges)` array
    pub fn from_array(edge_index: &Array2<usize>) -> Result<Self> {
        if edge_index.nrows() != 2 {
            return Err(ArterialError::shape(
                "edge index",
                "(2, num_edges)",
                format!("{:?}", edge_index.dim()),
            ));
        }
        Ok(Self {
            sources: edge_index.row(0).to_vec(),
            targets: edge_index.row(1).to_vec(),
        })
    }

    /// Get number of edges
    pub fn num_edges(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source nodes
    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    /// Target nodes
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Iterate over `(source, target)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sources.iter().copied().zip(self.targets.iter().copied())
    }

    /// Convert back to a `(2, num_edges)` array
    pub fn to_array(&self) -> Array2<usize> {
        let mut out = Array2::zeros((2, self.num_edges()));
        for (e, (s, t)) in self.iter().enumerate() {
            out[[0, e]] = s;
            out[[1, e]] = t;
        }
        out
    }

    /// Check that every endpoint is a valid node
    pub fn validate(&self, num_nodes: usize) -> Result<()> {
        for (edge, (s, t)) in self.iter().enumerate() {
            for node in [s, t] {
                if node >= num_nodes {
                    return Err(ArterialError::InvalidEdgeIndex {
                        edge,
                        node,
                        num_nodes,
                    });
                }
            }
        }
        Ok(())
    }

    /// Shift every node id by `offset` (used when batching graphs)
    pub fn offset(&self, offset: usize) -> Self {
        Self {
            sources: self.sources.iter().map(|s| s + offset).collect(),
            targets: self.targets.iter().map(|t| t + offset).collect(),
        }
    }

    /// Append another edge list
    pub fn extend(&mut self, other: &EdgeIndex) {
        self.sources.extend_from_slice(&other.sources);
        self.targets.extend_from_slice(&other.targets);
    }

    /// Edge ids grouped by target node
    pub fn incoming(&self, num_nodes: usize) -> Vec<Vec<usize>> {
        let mut incoming = vec![Vec::new(); num_nodes];
        for (edge, &t) in self.targets.iter().enumerate() {
            incoming[t].push(edge);
        }
        incoming
    }

    /// In-degree of every node
    pub fn in_degrees(&self, num_nodes: usize) -> Array1<f64> {
        let mut degrees = Array1::zeros(num_nodes);
        for &t in &self.targets {
            degrees[t] += 1.0;
        }
        degrees
    }

    /// Replace existing self loops with exactly one self loop per node
    ///
    /// Self-loop edge features are the mean of the node's remaining incoming
    /// edge features, or zeros when it has none. Self loops are appended
    /// after the original edges, in node order.
    pub fn with_self_loops(
        &self,
        num_nodes: usize,
        edge_attr: Option<&Array2<f64>>,
    ) -> (Self, Option<Array2<f64>>) {
        let kept: Vec<usize> = (0..self.num_edges())
            .filter(|&e| self.sources[e] != self.targets[e])
            .collect();

        let mut sources: Vec<usize> = kept.iter().map(|&e| self.sources[e]).collect();
        let mut targets: Vec<usize> = kept.iter().map(|&e| self.targets[e]).collect();
        sources.extend(0..num_nodes);
        targets.extend(0..num_nodes);

        let attr = edge_attr.map(|attr| {
            let n_kept = kept.len();
            let mut out = Array2::<f64>::zeros((n_kept + num_nodes, attr.ncols()));
            out.slice_mut(s![..n_kept, ..])
                .assign(&attr.select(Axis(0), &kept));

            let mut counts = vec![0usize; num_nodes];
            for &e in &kept {
                let t = self.targets[e];
                counts[t] += 1;
                let mut dst = out.row_mut(n_kept + t);
                dst += &attr.row(e);
            }
            for (node, &count) in counts.iter().enumerate() {
                if count > 0 {
                    out.row_mut(n_kept + node)
                        .mapv_inplace(|v| v / count as f64);
                }
            }
            out
        });

        (Self { sources, targets }, attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_pairs() {
        let edges = EdgeIndex::from_pairs(&[[0, 1], [1, 2], [2, 0]]);
        assert_eq!(edges.num_edges(), 3);
        assert_eq!(edges.sources(), &[0, 1, 2]);
        assert_eq!(edges.targets(), &[1, 2, 0]);
        assert!(edges.validate(3).is_ok());
    }

    #[test]
    fn test_from_array_roundtrip_shape() {
        let arr = array![[0usize, 1], [1, 0]];
        let edges = EdgeIndex::from_array(&arr).unwrap();
        assert_eq!(edges.to_array(), arr);

        let bad = array![[0usize, 1, 2]];
        assert!(EdgeIndex::from_array(&bad).is_err());
    }

    #[test]
    fn test_validate_out_of_range() {
        let edges = EdgeIndex::from_pairs(&[[0, 1], [1, 5]]);
        match edges.validate(3) {
            Err(ArterialError::InvalidEdgeIndex { edge, node, .. }) => {
                assert_eq!(edge, 1);
                assert_eq!(node, 5);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_self_loops_replace_existing() {
        let edges = EdgeIndex::from_pairs(&[[0, 1], [1, 1], [2, 1]]);
        let (looped, attr) = edges.with_self_loops(3, None);
        assert!(attr.is_none());
        // (1,1) dropped, three loops appended
        assert_eq!(looped.num_edges(), 2 + 3);
        let loops = looped.iter().filter(|(s, t)| s == t).count();
        assert_eq!(loops, 3);
    }

    #[test]
    fn test_self_loop_features_are_incoming_mean() {
        let edges = EdgeIndex::from_pairs(&[[0, 1], [2, 1]]);
        let attr = array![[1.0, 2.0], [3.0, 4.0]];
        let (looped, looped_attr) = edges.with_self_loops(3, Some(&attr));
        let looped_attr = looped_attr.unwrap();

        assert_eq!(looped_attr.nrows(), looped.num_edges());
        // node 0 has no incoming edges
        assert_eq!(looped_attr.row(2), array![0.0, 0.0]);
        // node 1 receives the mean of both edges
        assert_eq!(looped_attr.row(3), array![2.0, 3.0]);
    }

    #[test]
    fn test_incoming() {
        let edges = EdgeIndex::from_pairs(&[[0, 1], [2, 1], [1, 0]]);
        let incoming = edges.incoming(3);
        assert_eq!(incoming[1], vec![0, 1]);
        assert_eq!(incoming[0], vec![2]);
        assert!(incoming[2].is_empty());
        assert_eq!(edges.in_degrees(3)[1], 2.0);
    }
}
