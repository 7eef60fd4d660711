//! Dense layers, normalization and regularization

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Mode;
use crate::error::{ensure_positive, ArterialError, Result};

/// Negative slope of every leaky rectification in the network
pub const LEAKY_SLOPE: f64 = 0.2;

/// LeakyReLU activation
pub fn leaky_relu(x: f64, negative_slope: f64) -> f64 {
    if x >= 0.0 {
        x
    } else {
        negative_slope * x
    }
}

/// Row-wise softmax
pub fn softmax_rows(x: &Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    for mut row in out.rows_mut() {
        // Numerical stability: subtract max
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Xavier-uniform initialised matrix of shape `(rows, cols)`
pub(crate) fn xavier_uniform<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    rng: &mut R,
) -> Array2<f64> {
    let bound = (6.0 / (rows + cols) as f64).sqrt();
    Array2::random_using((rows, cols), Uniform::new(-bound, bound), rng)
}

/// Fully connected layer: `y = x W^T + b`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix `[out_features, in_features]`
    weight: Array2<f64>,
    /// Bias vector `[out_features]`
    bias: Option<Array1<f64>>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a new linear layer with Xavier initialization and zero bias
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        bias: bool,
        rng: &mut R,
    ) -> Result<Self> {
        ensure_positive("linear in_features", in_features)?;
        ensure_positive("linear out_features", out_features)?;

        Ok(Self {
            weight: xavier_uniform(out_features, in_features, rng),
            bias: bias.then(|| Array1::zeros(out_features)),
            in_features,
            out_features,
        })
    }

    /// Forward pass for a batch `[n, in_features] -> [n, out_features]`
    pub fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.in_features {
            return Err(ArterialError::shape(
                "linear input width",
                self.in_features,
                x.ncols(),
            ));
        }
        let out = x.dot(&self.weight.t());
        Ok(match self.bias {
            Some(ref b) => out + b,
            None => out,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Array1<f64>> {
        self.bias.as_ref()
    }

    /// Get number of parameters
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    /// Check stored parameters against the declared feature counts
    pub fn check_shapes(&self) -> Result<()> {
        let expected = (self.out_features, self.in_features);
        if self.weight.dim() != expected {
            return Err(ArterialError::shape(
                "linear weight",
                format!("{:?}", expected),
                format!("{:?}", self.weight.dim()),
            ));
        }
        if let Some(ref b) = self.bias {
            if b.len() != self.out_features {
                return Err(ArterialError::shape("linear bias", self.out_features, b.len()));
            }
        }
        Ok(())
    }
}

/// Batch normalization over the rows of a `[n, features]` matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    num_features: usize,
    /// Scale parameter (gamma)
    weight: Array1<f64>,
    /// Shift parameter (beta)
    bias: Array1<f64>,
    running_mean: Array1<f64>,
    running_var: Array1<f64>,
    eps: f64,
    momentum: f64,
}

impl BatchNorm {
    pub fn new(num_features: usize) -> Result<Self> {
        ensure_positive("batch norm features", num_features)?;
        Ok(Self {
            num_features,
            weight: Array1::ones(num_features),
            bias: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            eps: 1e-5,
            momentum: 0.1,
        })
    }

    /// Forward pass
    ///
    /// Training mode normalizes with the (biased) batch statistics and
    /// folds the unbiased variance into the running estimates. Eval mode
    /// uses the running estimates only.
    pub fn forward(&mut self, x: &Array2<f64>, mode: Mode) -> Result<Array2<f64>> {
        if x.ncols() != self.num_features {
            return Err(ArterialError::shape(
                "batch norm input width",
                self.num_features,
                x.ncols(),
            ));
        }

        let (mean, var) = match mode {
            Mode::Train => {
                let n = x.nrows();
                if n < 2 {
                    return Err(ArterialError::BatchTooSmall(n));
                }
                let mean = x.mean_axis(Axis(0)).ok_or(ArterialError::BatchTooSmall(n))?;
                let var = x.var_axis(Axis(0), 0.0);
                let unbiased = x.var_axis(Axis(0), 1.0);

                self.running_mean =
                    &self.running_mean * (1.0 - self.momentum) + &mean * self.momentum;
                self.running_var =
                    &self.running_var * (1.0 - self.momentum) + &unbiased * self.momentum;
                (mean, var)
            }
            Mode::Eval => (self.running_mean.clone(), self.running_var.clone()),
        };

        let std = var.mapv(|v| (v + self.eps).sqrt());
        Ok((x - &mean) / &std * &self.weight + &self.bias)
    }

    pub fn running_mean(&self) -> &Array1<f64> {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Array1<f64> {
        &self.running_var
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Get number of trainable parameters
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Every per-feature vector must have `num_features` entries
    pub fn check_shapes(&self) -> Result<()> {
        for (name, v) in [
            ("batch norm weight", &self.weight),
            ("batch norm bias", &self.bias),
            ("batch norm running mean", &self.running_mean),
            ("batch norm running var", &self.running_var),
        ] {
            if v.len() != self.num_features {
                return Err(ArterialError::shape(name, self.num_features, v.len()));
            }
        }
        Ok(())
    }
}

/// Inverted dropout
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Dropout {
    p: f64,
}

impl Dropout {
    pub fn new(p: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(ArterialError::InvalidDropout(p));
        }
        Ok(Self { p })
    }

    pub fn rate(&self) -> f64 {
        self.p
    }

    /// Zero each element with probability `p` in training mode; identity in eval mode
    pub fn forward<R: Rng + ?Sized>(
        &self,
        x: Array2<f64>,
        mode: Mode,
        rng: &mut R,
    ) -> Array2<f64> {
        if mode == Mode::Eval || self.p <= 0.0 {
            return x;
        }

        let scale = 1.0 / (1.0 - self.p);
        let mut x = x;
        for v in x.iter_mut() {
            if rng.gen::<f64>() < self.p {
                *v = 0.0;
            } else {
                *v *= scale;
            }
        }
        x
    }
}
