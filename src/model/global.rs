//! Global feature path: stacked Linear -> LeakyReLU -> BatchNorm -> Dropout

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, ArterialError, Result};
use crate::nn::{leaky_relu, BatchNorm, Dropout, Linear, Mode, LEAKY_SLOPE};

/// One normalized MLP block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MlpBlock {
    linear: Linear,
    norm: BatchNorm,
    dropout: Dropout,
}

impl MlpBlock {
    fn forward<R: Rng + ?Sized>(
        &mut self,
        x: &Array2<f64>,
        mode: Mode,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let h = self.linear.forward(x)?;
        let h = h.mapv(|v| leaky_relu(v, LEAKY_SLOPE));
        let h = self.norm.forward(&h, mode)?;
        Ok(self.dropout.forward(h, mode, rng))
    }

    fn check_shapes(&self, in_features: usize, width: usize) -> Result<()> {
        self.linear.check_shapes()?;
        self.norm.check_shapes()?;
        let got = (
            self.linear.in_features(),
            self.linear.out_features(),
            self.norm.num_features(),
        );
        if got != (in_features, width, width) {
            return Err(ArterialError::shape(
                "global block (in, out, norm)",
                format!("{:?}", (in_features, width, width)),
                format!("{:?}", got),
            ));
        }
        Ok(())
    }
}

/// MLP over the fixed-size global feature vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalBranch {
    blocks: Vec<MlpBlock>,
    in_dim: usize,
    width: usize,
}

impl GlobalBranch {
    /// The first block maps `in_dim -> width`, the rest keep `width`
    pub fn new<R: Rng + ?Sized>(
        in_dim: usize,
        width: usize,
        layers: usize,
        dropout: f64,
        rng: &mut R,
    ) -> Result<Self> {
        ensure_positive("global input features", in_dim)?;
        ensure_positive("global layers", layers)?;

        let blocks = (0..layers)
            .map(|idx| -> Result<MlpBlock> {
                let fan_in = if idx == 0 { in_dim } else { width };
                Ok(MlpBlock {
                    linear: Linear::new(fan_in, width, true, rng)?,
                    norm: BatchNorm::new(width)?,
                    dropout: Dropout::new(dropout)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            blocks,
            in_dim,
            width,
        })
    }

    /// `[batch, in_dim] -> [batch, width]`
    pub fn forward<R: Rng + ?Sized>(
        &mut self,
        x: &Array2<f64>,
        mode: Mode,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let mut h = x.clone();
        for block in &mut self.blocks {
            h = block.forward(&h, mode, rng)?;
        }
        Ok(h)
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.linear.num_parameters() + b.norm.num_parameters())
            .sum()
    }

    /// Validate every block against the branch widths
    pub fn check_shapes(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(ArterialError::InvalidDimension {
                name: "global layers".into(),
                value: 0,
            });
        }
        for (idx, block) in self.blocks.iter().enumerate() {
            let fan_in = if idx == 0 { self.in_dim } else { self.width };
            block.check_shapes(fan_in, self.width)?;
        }
        Ok(())
    }
}
