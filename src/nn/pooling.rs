//! Graph-level readout
//!
//! Reduces node embeddings to one embedding per graph using the
//! batch-assignment vector.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ArterialError, Result};

/// Pooling method shared by the graph branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Sum of node embeddings
    #[serde(alias = "sum")]
    Add,
    /// Mean of node embeddings
    Mean,
    /// Feature-wise maximum
    #[default]
    Max,
}

impl Aggregation {
    /// All supported methods
    pub fn all() -> [Aggregation; 3] {
        [Aggregation::Add, Aggregation::Mean, Aggregation::Max]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Add => "add",
            Aggregation::Mean => "mean",
            Aggregation::Max => "max",
        }
    }

    /// Pool `[num_nodes, features]` into `[num_graphs, features]`
    ///
    /// Graphs without nodes produce a zero row.
    pub fn pool(&self, x: &Array2<f64>, batch: &[usize], num_graphs: usize) -> Result<Array2<f64>> {
        if batch.len() != x.nrows() {
            return Err(ArterialError::InvalidBatch(format!(
                "batch vector has {} entries for {} nodes",
                batch.len(),
                x.nrows()
            )));
        }
        if let Some(&g) = batch.iter().find(|&&g| g >= num_graphs) {
            return Err(ArterialError::InvalidBatch(format!(
                "node assigned to graph {} but batch has {} graphs",
                g, num_graphs
            )));
        }

        let features = x.ncols();
        let mut counts = vec![0usize; num_graphs];
        let init = match self {
            Aggregation::Max => f64::NEG_INFINITY,
            _ => 0.0,
        };
        let mut out = Array2::from_elem((num_graphs, features), init);

        for (row, &g) in x.rows().into_iter().zip(batch.iter()) {
            counts[g] += 1;
            let mut acc = out.row_mut(g);
            match self {
                Aggregation::Add | Aggregation::Mean => acc += &row,
                Aggregation::Max => acc.zip_mut_with(&row, |a, &v| *a = a.max(v)),
            }
        }

        for (g, &count) in counts.iter().enumerate() {
            let mut acc = out.row_mut(g);
            if count == 0 {
                acc.fill(0.0);
            } else if *self == Aggregation::Mean {
                acc.mapv_inplace(|v| v / count as f64);
            }
        }

        Ok(out)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = ArterialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "add" | "sum" => Ok(Aggregation::Add),
            "mean" => Ok(Aggregation::Mean),
            "max" => Ok(Aggregation::Max),
            other => Err(ArterialError::UnknownAggregation(other.to_string())),
        }
    }
}
