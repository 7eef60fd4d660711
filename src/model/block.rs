//! Graph attention block: GATv2 -> LeakyReLU -> BatchNorm -> Dropout

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ArterialError, Result};
use crate::graph::EdgeIndex;
use crate::nn::{leaky_relu, BatchNorm, Dropout, GatV2Conv, Mode, LEAKY_SLOPE};

/// One attention unit of a graph branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphAttentionBlock {
    conv: GatV2Conv,
    norm: BatchNorm,
    dropout: Dropout,
}

impl GraphAttentionBlock {
    /// Create a block mapping `in_channels -> out_channels`
    ///
    /// With `edge_dim = None` the block never reads edge features.
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        heads: usize,
        edge_dim: Option<usize>,
        dropout: f64,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(Self {
            conv: GatV2Conv::new(in_channels, out_channels, heads, edge_dim, rng)?,
            norm: BatchNorm::new(out_channels)?,
            dropout: Dropout::new(dropout)?,
        })
    }

    pub fn forward<R: Rng + ?Sized>(
        &mut self,
        x: &Array2<f64>,
        edge_index: &EdgeIndex,
        edge_attr: Option<&Array2<f64>>,
        mode: Mode,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let edge_attr = if self.conv.edge_dim().is_some() {
            edge_attr
        } else {
            None
        };

        let h = self.conv.forward(x, edge_index, edge_attr)?;
        let h = h.mapv(|v| leaky_relu(v, LEAKY_SLOPE));
        let h = self.norm.forward(&h, mode)?;
        Ok(self.dropout.forward(h, mode, rng))
    }

    pub fn edge_dim(&self) -> Option<usize> {
        self.conv.edge_dim()
    }

    pub fn in_channels(&self) -> usize {
        self.conv.in_channels()
    }

    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }

    pub fn conv(&self) -> &GatV2Conv {
        &self.conv
    }

    pub fn num_parameters(&self) -> usize {
        self.conv.num_parameters() + self.norm.num_parameters()
    }

    pub fn check_shapes(&self) -> Result<()> {
        self.conv.check_shapes()?;
        self.norm.check_shapes()?;
        if self.norm.num_features() != self.conv.out_channels() {
            return Err(ArterialError::shape(
                "graph attention block norm",
                self.conv.out_channels(),
                self.norm.num_features(),
            ));
        }
        Ok(())
    }
}
