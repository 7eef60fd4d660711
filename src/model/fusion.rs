//! Fusion head: concatenated branch embeddings -> prediction

use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ArterialError, Result};
use crate::nn::{softmax_rows, Linear};

/// Prediction task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Two-class probabilities
    Classification,
    /// One scalar per sample
    #[default]
    Regression,
}

impl Task {
    pub fn from_flag(is_classification: bool) -> Self {
        if is_classification {
            Task::Classification
        } else {
            Task::Regression
        }
    }

    pub fn is_classification(&self) -> bool {
        *self == Task::Classification
    }

    /// Output width
    pub fn out_dim(&self) -> usize {
        match self {
            Task::Classification => 2,
            Task::Regression => 1,
        }
    }
}

/// Final projection over the concatenated branch outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionHead {
    task: Task,
    linear: Linear,
}

impl FusionHead {
    pub fn new<R: Rng + ?Sized>(fan_in: usize, task: Task, rng: &mut R) -> Result<Self> {
        Ok(Self {
            task,
            linear: Linear::new(fan_in, task.out_dim(), true, rng)?,
        })
    }

    /// Concatenate `parts` along the feature axis and project
    ///
    /// Classification rows are softmax-normalized.
    pub fn forward(&self, parts: &[ArrayView2<f64>]) -> Result<Array2<f64>> {
        let width: usize = parts.iter().map(|p| p.ncols()).sum();
        if width != self.fan_in() {
            return Err(ArterialError::shape(
                "fusion input width",
                self.fan_in(),
                width,
            ));
        }

        let fused = ndarray::concatenate(Axis(1), parts).map_err(|e| {
            ArterialError::shape(
                "fusion sample count",
                parts.first().map_or(0, |p| p.nrows()),
                e,
            )
        })?;

        let out = self.linear.forward(&fused)?;
        Ok(match self.task {
            Task::Classification => softmax_rows(&out),
            Task::Regression => out,
        })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn fan_in(&self) -> usize {
        self.linear.in_features()
    }

    pub fn out_dim(&self) -> usize {
        self.linear.out_features()
    }

    pub fn num_parameters(&self) -> usize {
        self.linear.num_parameters()
    }

    pub fn check_shapes(&self) -> Result<()> {
        self.linear.check_shapes()?;
        if self.out_dim() != self.task.out_dim() {
            return Err(ArterialError::shape(
                "fusion output width",
                self.task.out_dim(),
                self.out_dim(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_classification_rows_are_probabilities() {
        let mut rng = StdRng::seed_from_u64(41);
        let head = FusionHead::new(10, Task::Classification, &mut rng).unwrap();
        let a = Array2::random_using((5, 6), Uniform::new(-3.0, 3.0), &mut rng);
        let b = Array2::random_using((5, 4), Uniform::new(-3.0, 3.0), &mut rng);

        let out = head.forward(&[a.view(), b.view()]).unwrap();
        assert_eq!(out.dim(), (5, 2));
        for row in out.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-10);
            assert!(row.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_regression_single_output() {
        let mut rng = StdRng::seed_from_u64(42);
        let head = FusionHead::new(4, Task::Regression, &mut rng).unwrap();
        let a = Array2::random_using((3, 4), Uniform::new(-1.0, 1.0), &mut rng);
        let out = head.forward(&[a.view()]).unwrap();
        assert_eq!(out.dim(), (3, 1));
    }

    #[test]
    fn test_width_mismatch() {
        let mut rng = StdRng::seed_from_u64(43);
        let head = FusionHead::new(8, Task::Regression, &mut rng).unwrap();
        let a = Array2::<f64>::zeros((3, 4));
        assert!(head.forward(&[a.view()]).is_err());
    }

    #[test]
    fn test_sample_count_mismatch() {
        let mut rng = StdRng::seed_from_u64(44);
        let head = FusionHead::new(8, Task::Regression, &mut rng).unwrap();
        let a = Array2::<f64>::zeros((3, 4));
        let b = Array2::<f64>::zeros((2, 4));
        assert!(head.forward(&[a.view(), b.view()]).is_err());
    }

    #[test]
    fn test_task_flag() {
        assert_eq!(Task::from_flag(true).out_dim(), 2);
        assert_eq!(Task::from_flag(false).out_dim(), 1);
    }
}
