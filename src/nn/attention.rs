//! GATv2 graph attention convolution
//!
//! Dynamic attention (Brody et al., 2022): the score of edge `j -> i` is
//! `a^T LeakyReLU(W_s x_j + W_t x_i + W_e e_ji)`, normalized with a softmax
//! over all edges entering `i`. Every node attends to itself through an
//! added self loop.

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::layers::{leaky_relu, xavier_uniform, Linear, LEAKY_SLOPE};
use crate::error::{ensure_positive, ArterialError, Result};
use crate::graph::EdgeIndex;

/// Multi-head GATv2 convolution with averaged heads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatV2Conv {
    in_channels: usize,
    out_channels: usize,
    heads: usize,
    /// Edge feature width, `None` for convolutions that ignore edge features
    edge_dim: Option<usize>,
    /// Source projection
    lin_src: Linear,
    /// Target projection
    lin_dst: Linear,
    /// Edge feature projection (no bias)
    lin_edge: Option<Linear>,
    /// Attention vectors `[heads, out_channels]`
    att: Array2<f64>,
    /// Output bias
    bias: Array1<f64>,
    negative_slope: f64,
}

/// Attention coefficients of one forward pass
#[derive(Debug, Clone)]
pub struct AttentionWeights {
    /// Edges including the added self loops
    pub edge_index: EdgeIndex,
    /// Coefficients `[num_edges, heads]`
    pub alpha: Array2<f64>,
}

impl GatV2Conv {
    /// Create a new convolution
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        heads: usize,
        edge_dim: Option<usize>,
        rng: &mut R,
    ) -> Result<Self> {
        ensure_positive("attention in_channels", in_channels)?;
        ensure_positive("attention out_channels", out_channels)?;
        ensure_positive("attention heads", heads)?;

        let width = heads * out_channels;
        let lin_edge = match edge_dim {
            Some(dim) => Some(Linear::new(dim, width, false, rng)?),
            None => None,
        };

        Ok(Self {
            in_channels,
            out_channels,
            heads,
            edge_dim,
            lin_src: Linear::new(in_channels, width, true, rng)?,
            lin_dst: Linear::new(in_channels, width, true, rng)?,
            lin_edge,
            att: xavier_uniform(heads, out_channels, rng),
            bias: Array1::zeros(out_channels),
            negative_slope: LEAKY_SLOPE,
        })
    }

    /// Forward pass `[num_nodes, in_channels] -> [num_nodes, out_channels]`
    ///
    /// Edge features are read only when the convolution was built with an
    /// edge dimension; otherwise they are ignored.
    pub fn forward(
        &self,
        x: &Array2<f64>,
        edge_index: &EdgeIndex,
        edge_attr: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        self.propagate(x, edge_index, edge_attr).map(|(out, _)| out)
    }

    /// Attention coefficients for every edge (self loops included)
    pub fn attention_weights(
        &self,
        x: &Array2<f64>,
        edge_index: &EdgeIndex,
        edge_attr: Option<&Array2<f64>>,
    ) -> Result<AttentionWeights> {
        self.propagate(x, edge_index, edge_attr).map(|(_, w)| w)
    }

    fn propagate(
        &self,
        x: &Array2<f64>,
        edge_index: &EdgeIndex,
        edge_attr: Option<&Array2<f64>>,
    ) -> Result<(Array2<f64>, AttentionWeights)> {
        let n = x.nrows();
        if x.ncols() != self.in_channels {
            return Err(ArterialError::shape(
                "attention input width",
                self.in_channels,
                x.ncols(),
            ));
        }
        edge_index.validate(n)?;
        let edge_attr = self.check_edge_attr(edge_index, edge_attr)?;

        let (edges, looped_attr) = edge_index.with_self_loops(n, edge_attr);
        let x_src = self.lin_src.forward(x)?;
        let x_dst = self.lin_dst.forward(x)?;
        let x_edge = match (&self.lin_edge, &looped_attr) {
            (Some(lin), Some(attr)) => Some(lin.forward(attr)?),
            _ => None,
        };

        let num_edges = edges.num_edges();
        let incoming = edges.incoming(n);
        let mut alpha = Array2::zeros((num_edges, self.heads));
        let mut out = Array2::zeros((n, self.out_channels));

        for h in 0..self.heads {
            let cols = h * self.out_channels..(h + 1) * self.out_channels;
            let att = self.att.row(h);

            let mut scores = Array1::zeros(num_edges);
            for (e, (j, i)) in edges.iter().enumerate() {
                let mut message =
                    &x_src.slice(s![j, cols.clone()]) + &x_dst.slice(s![i, cols.clone()]);
                if let Some(ref xe) = x_edge {
                    message += &xe.slice(s![e, cols.clone()]);
                }
                scores[e] = score(att, &message, self.negative_slope);
            }

            for (i, edge_ids) in incoming.iter().enumerate() {
                let weights = softmax_over(&scores, edge_ids);
                let mut acc = out.row_mut(i);
                for (&e, &w) in edge_ids.iter().zip(weights.iter()) {
                    alpha[[e, h]] = w;
                    let j = edges.sources()[e];
                    acc.scaled_add(w / self.heads as f64, &x_src.slice(s![j, cols.clone()]));
                }
            }
        }

        out += &self.bias;
        Ok((
            out,
            AttentionWeights {
                edge_index: edges,
                alpha,
            },
        ))
    }

    fn check_edge_attr<'a>(
        &self,
        edge_index: &EdgeIndex,
        edge_attr: Option<&'a Array2<f64>>,
    ) -> Result<Option<&'a Array2<f64>>> {
        let dim = match self.edge_dim {
            Some(dim) => dim,
            None => return Ok(None),
        };
        let attr = edge_attr.ok_or(ArterialError::MissingEdgeFeatures(dim))?;
        if attr.ncols() != dim {
            return Err(ArterialError::EdgeDimMismatch {
                expected: dim,
                got: attr.ncols(),
            });
        }
        if attr.nrows() != edge_index.num_edges() {
            return Err(ArterialError::shape(
                "edge feature rows",
                edge_index.num_edges(),
                attr.nrows(),
            ));
        }
        Ok(Some(attr))
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn heads(&self) -> usize {
        self.heads
    }

    pub fn edge_dim(&self) -> Option<usize> {
        self.edge_dim
    }

    /// Check projections, attention vectors and bias against the declared sizes
    pub fn check_shapes(&self) -> Result<()> {
        let width = self.heads * self.out_channels;
        let mut projections = vec![
            ("attention source projection", &self.lin_src, self.in_channels),
            ("attention target projection", &self.lin_dst, self.in_channels),
        ];
        match (&self.lin_edge, self.edge_dim) {
            (Some(lin), Some(dim)) => projections.push(("attention edge projection", lin, dim)),
            (None, None) => {}
            (lin, dim) => {
                return Err(ArterialError::shape(
                    "attention edge projection",
                    format!("{:?}", dim),
                    format!("{:?}", lin.as_ref().map(|l| l.in_features())),
                ))
            }
        }

        for (name, lin, in_features) in projections {
            lin.check_shapes()?;
            if (lin.in_features(), lin.out_features()) != (in_features, width) {
                return Err(ArterialError::shape(
                    name,
                    format!("({}, {})", in_features, width),
                    format!("({}, {})", lin.in_features(), lin.out_features()),
                ));
            }
        }

        if self.att.dim() != (self.heads, self.out_channels) {
            return Err(ArterialError::shape(
                "attention vectors",
                format!("({}, {})", self.heads, self.out_channels),
                format!("{:?}", self.att.dim()),
            ));
        }
        if self.bias.len() != self.out_channels {
            return Err(ArterialError::shape(
                "attention bias",
                self.out_channels,
                self.bias.len(),
            ));
        }
        Ok(())
    }

    /// Get number of parameters
    pub fn num_parameters(&self) -> usize {
        self.lin_src.num_parameters()
            + self.lin_dst.num_parameters()
            + self.lin_edge.as_ref().map_or(0, |l| l.num_parameters())
            + self.att.len()
            + self.bias.len()
    }
}

fn score(att: ArrayView1<f64>, message: &Array1<f64>, negative_slope: f64) -> f64 {
    att.iter()
        .zip(message.iter())
        .map(|(a, m)| a * leaky_relu(*m, negative_slope))
        .sum()
}

/// Softmax of `scores` restricted to `edge_ids`
fn softmax_over(scores: &Array1<f64>, edge_ids: &[usize]) -> Vec<f64> {
    if edge_ids.is_empty() {
        return Vec::new();
    }
    let max = edge_ids
        .iter()
        .map(|&e| scores[e])
        .fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = edge_ids.iter().map(|&e| (scores[e] - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ring(n: usize) -> EdgeIndex {
        let pairs: Vec<[usize; 2]> = (0..n).map(|i| [i, (i + 1) % n]).collect();
        EdgeIndex::from_pairs(&pairs)
    }

    #[test]
    fn test_forward_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let conv = GatV2Conv::new(6, 4, 2, None, &mut rng).unwrap();
        let x = Array2::random_using((5, 6), Uniform::new(-1.0, 1.0), &mut rng);

        let out = conv.forward(&x, &ring(5), None).unwrap();
        assert_eq!(out.dim(), (5, 4));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_attention_sums_to_one() {
        let mut rng = StdRng::seed_from_u64(2);
        let conv = GatV2Conv::new(3, 4, 3, Some(2), &mut rng).unwrap();
        let x = Array2::random_using((4, 3), Uniform::new(-1.0, 1.0), &mut rng);
        let edges = EdgeIndex::from_pairs(&[[0, 1], [2, 1], [3, 1], [1, 0]]);
        let attr = Array2::random_using((4, 2), Uniform::new(-1.0, 1.0), &mut rng);

        let weights = conv.attention_weights(&x, &edges, Some(&attr)).unwrap();
        // 4 edges + 4 self loops
        assert_eq!(weights.alpha.dim(), (8, 3));

        for h in 0..3 {
            for node in 0..4 {
                let total: f64 = weights
                    .edge_index
                    .targets()
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| **t == node)
                    .map(|(e, _)| weights.alpha[[e, h]])
                    .sum();
                assert!((total - 1.0).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_isolated_node_attends_to_itself() {
        let mut rng = StdRng::seed_from_u64(3);
        let conv = GatV2Conv::new(2, 2, 1, None, &mut rng).unwrap();
        let x = Array2::random_using((3, 2), Uniform::new(-1.0, 1.0), &mut rng);
        let edges = EdgeIndex::from_pairs(&[[0, 1]]);

        let out = conv.forward(&x, &edges, None).unwrap();
        // node 2 only sees its own source projection
        let expected = conv.lin_src.forward(&x).unwrap();
        for c in 0..2 {
            assert!((out[[2, c]] - expected[[2, c]]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_edge_features_required() {
        let mut rng = StdRng::seed_from_u64(4);
        let conv = GatV2Conv::new(2, 2, 1, Some(3), &mut rng).unwrap();
        let x = Array2::zeros((2, 2));
        let edges = EdgeIndex::from_pairs(&[[0, 1]]);

        assert!(matches!(
            conv.forward(&x, &edges, None),
            Err(ArterialError::MissingEdgeFeatures(3))
        ));

        let wrong = Array2::zeros((1, 2));
        assert!(matches!(
            conv.forward(&x, &edges, Some(&wrong)),
            Err(ArterialError::EdgeDimMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_edge_features_ignored_without_edge_dim() {
        let mut rng = StdRng::seed_from_u64(5);
        let conv = GatV2Conv::new(3, 4, 1, None, &mut rng).unwrap();
        let x = Array2::random_using((3, 3), Uniform::new(-1.0, 1.0), &mut rng);
        let edges = ring(3);
        let attr = Array2::random_using((3, 7), Uniform::new(-1.0, 1.0), &mut rng);

        let with = conv.forward(&x, &edges, Some(&attr)).unwrap();
        let without = conv.forward(&x, &edges, None).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_check_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut conv = GatV2Conv::new(3, 4, 2, Some(2), &mut rng).unwrap();
        assert!(conv.check_shapes().is_ok());

        conv.att = Array2::zeros((1, 4));
        assert!(matches!(
            conv.check_shapes(),
            Err(ArterialError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_num_parameters() {
        let mut rng = StdRng::seed_from_u64(6);
        let conv = GatV2Conv::new(5, 4, 2, Some(3), &mut rng).unwrap();
        // two projections (5*8 + 8), edge projection 3*8, attention 2*4, bias 4
        assert_eq!(conv.num_parameters(), 2 * 48 + 24 + 8 + 4);
    }
}
