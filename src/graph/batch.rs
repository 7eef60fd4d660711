//! Batched graph containers
//!
//! Several per-sample graphs are stored as one disconnected graph, with a
//! batch-assignment vector mapping every node to its sample.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::edges::EdgeIndex;
use crate::error::{ArterialError, Result};

/// Node features, edges and optional edge features for a batch of graphs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphBatch {
    /// Node features `[num_nodes, num_node_features]`
    x: Array2<f64>,
    /// Directed edges
    edge_index: EdgeIndex,
    /// Edge features `[num_edges, num_edge_features]`
    edge_attr: Option<Array2<f64>>,
    /// Graph id of every node
    batch: Vec<usize>,
    /// Number of graphs (empty graphs included)
    num_graphs: usize,
}

impl GraphBatch {
    /// Create a validated batch
    pub fn new(
        x: Array2<f64>,
        edge_index: EdgeIndex,
        edge_attr: Option<Array2<f64>>,
        batch: Vec<usize>,
        num_graphs: usize,
    ) -> Result<Self> {
        let num_nodes = x.nrows();
        edge_index.validate(num_nodes)?;

        if let Some(ref attr) = edge_attr {
            if attr.nrows() != edge_index.num_edges() {
                return Err(ArterialError::shape(
                    "edge features",
                    format!("{} rows", edge_index.num_edges()),
                    format!("{} rows", attr.nrows()),
                ));
            }
        }

        if batch.len() != num_nodes {
            return Err(ArterialError::InvalidBatch(format!(
                "batch vector has {} entries for {} nodes",
                batch.len(),
                num_nodes
            )));
        }
        if let Some(&graph) = batch.iter().find(|&&g| g >= num_graphs) {
            return Err(ArterialError::InvalidBatch(format!(
                "node assigned to graph {} but batch has {} graphs",
                graph, num_graphs
            )));
        }
        for (edge, (s, t)) in edge_index.iter().enumerate() {
            if batch[s] != batch[t] {
                return Err(ArterialError::InvalidBatch(format!(
                    "edge {} connects graphs {} and {}",
                    edge, batch[s], batch[t]
                )));
            }
        }

        Ok(Self {
            x,
            edge_index,
            edge_attr,
            batch,
            num_graphs,
        })
    }

    /// Create a batch holding a single graph
    pub fn single(
        x: Array2<f64>,
        edge_index: EdgeIndex,
        edge_attr: Option<Array2<f64>>,
    ) -> Result<Self> {
        let batch = vec![0; x.nrows()];
        Self::new(x, edge_index, edge_attr, batch, 1)
    }

    /// Concatenate batches into one, offsetting node and graph ids
    pub fn collate(parts: &[GraphBatch]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| ArterialError::InvalidBatch("cannot collate zero graphs".into()))?;

        let node_dim = first.num_node_features();
        let edge_dim = first.num_edge_features();

        let mut x_views = Vec::with_capacity(parts.len());
        let mut attr_views = Vec::with_capacity(parts.len());
        let mut edge_index = EdgeIndex::new();
        let mut batch = Vec::new();
        let mut node_offset = 0;
        let mut graph_offset = 0;

        for part in parts {
            if part.num_node_features() != node_dim {
                return Err(ArterialError::shape(
                    "collate node features",
                    node_dim,
                    part.num_node_features(),
                ));
            }
            if part.num_edge_features() != edge_dim {
                return Err(ArterialError::shape(
                    "collate edge features",
                    format!("{:?}", edge_dim),
                    format!("{:?}", part.num_edge_features()),
                ));
            }

            x_views.push(part.x.view());
            if let Some(ref attr) = part.edge_attr {
                attr_views.push(attr.view());
            }
            edge_index.extend(&part.edge_index.offset(node_offset));
            batch.extend(part.batch.iter().map(|g| g + graph_offset));

            node_offset += part.num_nodes();
            graph_offset += part.num_graphs;
        }

        let x = ndarray::concatenate(Axis(0), &x_views)
            .map_err(|e| ArterialError::shape("collate node features", node_dim, e))?;
        let edge_attr = match edge_dim {
            Some(dim) => Some(
                ndarray::concatenate(Axis(0), &attr_views)
                    .map_err(|e| ArterialError::shape("collate edge features", dim, e))?,
            ),
            None => None,
        };

        Self::new(x, edge_index, edge_attr, batch, graph_offset)
    }

    /// Node feature matrix
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// Edge index
    pub fn edge_index(&self) -> &EdgeIndex {
        &self.edge_index
    }

    /// Edge feature matrix, if present
    pub fn edge_attr(&self) -> Option<&Array2<f64>> {
        self.edge_attr.as_ref()
    }

    /// Graph id of every node
    pub fn batch(&self) -> &[usize] {
        &self.batch
    }

    pub fn num_graphs(&self) -> usize {
        self.num_graphs
    }

    pub fn num_nodes(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_index.num_edges()
    }

    pub fn num_node_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn num_edge_features(&self) -> Option<usize> {
        self.edge_attr.as_ref().map(|a| a.ncols())
    }

    /// Number of nodes in every graph
    pub fn graph_sizes(&self) -> Array1<usize> {
        let mut sizes = Array1::zeros(self.num_graphs);
        for &g in &self.batch {
            sizes[g] += 1;
        }
        sizes
    }
}

/// One sample before batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArterialSample {
    /// Global feature vector
    pub global: Array1<f64>,
    /// Segment graph (with edge features)
    pub segment: GraphBatch,
    /// Dense graph
    pub dense: GraphBatch,
}

/// A batch of samples exposing the three named inputs of the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArterialBatch {
    /// Global features `[batch, num_global_features]`
    pub global_data: Array2<f64>,
    /// Batched segment graphs
    pub segment_data: GraphBatch,
    /// Batched dense graphs
    pub dense_data: GraphBatch,
}

impl ArterialBatch {
    /// Create a batch, checking that all inputs describe the same samples
    pub fn new(
        global_data: Array2<f64>,
        segment_data: GraphBatch,
        dense_data: GraphBatch,
    ) -> Result<Self> {
        let n = global_data.nrows();
        for (name, graphs) in [
            ("segment", segment_data.num_graphs()),
            ("dense", dense_data.num_graphs()),
        ] {
            if graphs != n {
                return Err(ArterialError::shape(
                    format!("{} graphs per batch", name),
                    n,
                    graphs,
                ));
            }
        }
        Ok(Self {
            global_data,
            segment_data,
            dense_data,
        })
    }

    /// Batch individual samples
    pub fn collate(samples: &[ArterialSample]) -> Result<Self> {
        if samples.is_empty() {
            return Err(ArterialError::InvalidBatch(
                "cannot collate zero samples".into(),
            ));
        }

        let globals: Vec<_> = samples
            .iter()
            .map(|s| s.global.view().insert_axis(Axis(0)))
            .collect();
        let global_data = ndarray::concatenate(Axis(0), &globals).map_err(|e| {
            ArterialError::shape("collate global features", samples[0].global.len(), e)
        })?;

        let segments: Vec<GraphBatch> = samples.iter().map(|s| s.segment.clone()).collect();
        let denses: Vec<GraphBatch> = samples.iter().map(|s| s.dense.clone()).collect();

        Self::new(
            global_data,
            GraphBatch::collate(&segments)?,
            GraphBatch::collate(&denses)?,
        )
    }

    /// Number of samples
    pub fn num_samples(&self) -> usize {
        self.global_data.nrows()
    }
}
