//! ArterialNet: three optional branches fused into one prediction

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::branch::{fusion_width, BranchKind, BranchSpec};
use super::fusion::{FusionHead, Task};
use super::global::GlobalBranch;
use super::graph_branch::GraphBranch;
use crate::error::{ArterialError, Result};
use crate::graph::ArterialBatch;
use crate::nn::{Aggregation, Dropout, Mode};

/// Architecture hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArterialNetConfig {
    /// Global feature width
    pub global_in_dim: usize,
    /// Segment node feature width
    pub segment_node_in_dim: usize,
    /// Segment edge feature width (0 = no edge features)
    pub segment_edge_in_dim: usize,
    /// Dense node feature width
    pub dense_node_in_dim: usize,
    /// Hidden width of the global and segment branches
    pub hidden_dim: usize,
    /// Hidden width of the dense branch
    pub hidden_dim_dense: usize,
    pub num_global_layers: usize,
    pub num_segment_layers: usize,
    pub num_dense_layers: usize,
    /// Attention heads per graph attention block
    pub heads: usize,
    pub aggregation: Aggregation,
    pub dropout: f64,
    pub task: Task,
    /// Seed for weight initialization and dropout masks
    pub seed: u64,
}

impl Default for ArterialNetConfig {
    fn default() -> Self {
        Self {
            global_in_dim: 8,
            segment_node_in_dim: 8,
            segment_edge_in_dim: 4,
            dense_node_in_dim: 4,
            hidden_dim: 64,
            hidden_dim_dense: 32,
            num_global_layers: 2,
            num_segment_layers: 2,
            num_dense_layers: 2,
            heads: 1,
            aggregation: Aggregation::Max,
            dropout: 0.2,
            task: Task::Regression,
            seed: 42,
        }
    }
}

impl ArterialNetConfig {
    /// Resolve the three branches in fusion order
    pub fn branch_specs(&self) -> Result<[BranchSpec; 3]> {
        Ok([
            BranchSpec::resolve(BranchKind::Global, self.num_global_layers, self.hidden_dim)?,
            BranchSpec::resolve(BranchKind::Segment, self.num_segment_layers, self.hidden_dim)?,
            BranchSpec::resolve(BranchKind::Dense, self.num_dense_layers, self.hidden_dim_dense)?,
        ])
    }

    /// Fusion input width: sum of the widths of the active branches
    pub fn fusion_in_dim(&self) -> Result<usize> {
        fusion_width(&self.branch_specs()?)
    }

    fn segment_edge_dim(&self) -> Option<usize> {
        (self.segment_edge_in_dim > 0).then_some(self.segment_edge_in_dim)
    }
}

/// Multi-branch graph network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArterialNet {
    config: ArterialNetConfig,
    specs: [BranchSpec; 3],
    global_path: Option<GlobalBranch>,
    segment_path: Option<GraphBranch>,
    dense_path: Option<GraphBranch>,
    output_layer: FusionHead,
    mode: Mode,
    #[serde(skip, default = "unseeded_rng")]
    rng: StdRng,
}

fn unseeded_rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

impl ArterialNet {
    /// Build the network; fails if every branch is disabled
    pub fn new(config: ArterialNetConfig) -> Result<Self> {
        let specs = config.branch_specs()?;
        let fan_in = fusion_width(&specs)?;
        Dropout::new(config.dropout)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let [global, segment, dense] = specs;

        let global_path = match global {
            BranchSpec::Active { layers, width } => Some(GlobalBranch::new(
                config.global_in_dim,
                width,
                layers,
                config.dropout,
                &mut rng,
            )?),
            BranchSpec::Disabled => None,
        };

        let segment_path = match segment {
            BranchSpec::Active { layers, width } => Some(GraphBranch::segment(
                config.segment_node_in_dim,
                config.segment_edge_dim(),
                width,
                layers,
                config.heads,
                config.aggregation,
                config.dropout,
                &mut rng,
            )?),
            BranchSpec::Disabled => None,
        };

        let dense_path = match dense {
            BranchSpec::Active { layers, width } => Some(GraphBranch::dense(
                config.dense_node_in_dim,
                width,
                layers,
                config.heads,
                config.aggregation,
                config.dropout,
                &mut rng,
            )?),
            BranchSpec::Disabled => None,
        };

        let output_layer = FusionHead::new(fan_in, config.task, &mut rng)?;

        Ok(Self {
            config,
            specs,
            global_path,
            segment_path,
            dense_path,
            output_layer,
            mode: Mode::Train,
            rng,
        })
    }

    /// Forward pass: `[batch, out_dim]` predictions
    ///
    /// Probabilities for classification, raw scalars for regression.
    pub fn forward(&mut self, data: &ArterialBatch) -> Result<Array2<f64>> {
        let mode = self.mode;

        let global_features = match self.global_path {
            Some(ref mut path) => Some(path.forward(&data.global_data, mode, &mut self.rng)?),
            None => None,
        };
        let segment_x = match self.segment_path {
            Some(ref mut path) => Some(path.forward(&data.segment_data, mode, &mut self.rng)?),
            None => None,
        };
        let dense_x = match self.dense_path {
            Some(ref mut path) => Some(path.forward(&data.dense_data, mode, &mut self.rng)?),
            None => None,
        };

        let parts: Vec<ArrayView2<f64>> = [&global_features, &segment_x, &dense_x]
            .into_iter()
            .flatten()
            .map(|x| x.view())
            .collect();

        let batch_size = parts.first().map_or(0, |p| p.nrows());
        if let Some(p) = parts.iter().find(|p| p.nrows() != batch_size) {
            return Err(ArterialError::shape(
                "samples per branch",
                batch_size,
                p.nrows(),
            ));
        }

        debug!(
            batch = batch_size,
            width = self.output_layer.fan_in(),
            ?mode,
            "fusing branch outputs"
        );
        self.output_layer.forward(&parts)
    }

    /// Switch to training mode (batch statistics, dropout active)
    pub fn train(&mut self) {
        self.mode = Mode::Train;
    }

    /// Switch to evaluation mode (running statistics, no dropout)
    pub fn eval(&mut self) {
        self.mode = Mode::Eval;
    }

    pub fn is_training(&self) -> bool {
        self.mode.is_training()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &ArterialNetConfig {
        &self.config
    }

    /// Resolved branch layout in fusion order
    pub fn branch_specs(&self) -> &[BranchSpec; 3] {
        &self.specs
    }

    pub fn branch_spec(&self, kind: BranchKind) -> BranchSpec {
        match kind {
            BranchKind::Global => self.specs[0],
            BranchKind::Segment => self.specs[1],
            BranchKind::Dense => self.specs[2],
        }
    }

    pub fn global_path(&self) -> Option<&GlobalBranch> {
        self.global_path.as_ref()
    }

    pub fn segment_path(&self) -> Option<&GraphBranch> {
        self.segment_path.as_ref()
    }

    pub fn dense_path(&self) -> Option<&GraphBranch> {
        self.dense_path.as_ref()
    }

    pub fn output_layer(&self) -> &FusionHead {
        &self.output_layer
    }

    /// Width of the concatenated branch outputs
    pub fn fusion_in_dim(&self) -> usize {
        self.output_layer.fan_in()
    }

    pub fn out_dim(&self) -> usize {
        self.output_layer.out_dim()
    }

    pub fn task(&self) -> Task {
        self.config.task
    }

    /// Get number of trainable parameters
    pub fn num_parameters(&self) -> usize {
        self.global_path.as_ref().map_or(0, |p| p.num_parameters())
            + self.segment_path.as_ref().map_or(0, |p| p.num_parameters())
            + self.dense_path.as_ref().map_or(0, |p| p.num_parameters())
            + self.output_layer.num_parameters()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON; the dropout generator restarts from the configured seed
    ///
    /// Parameter shapes are checked before the model is returned.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut model: Self = serde_json::from_str(json)?;
        model.check_shapes()?;
        model.rng = StdRng::seed_from_u64(model.config.seed);
        Ok(model)
    }

    /// Check every branch and the fusion head against the stored layout
    pub fn check_shapes(&self) -> Result<()> {
        let widths = [
            self.global_path.as_ref().map(|p| -> Result<usize> {
                p.check_shapes()?;
                Ok(p.width())
            }),
            self.segment_path.as_ref().map(|p| -> Result<usize> {
                p.check_shapes()?;
                Ok(p.width())
            }),
            self.dense_path.as_ref().map(|p| -> Result<usize> {
                p.check_shapes()?;
                Ok(p.width())
            }),
        ];

        for (kind, (spec, width)) in BranchKind::all()
            .into_iter()
            .zip(self.specs.iter().zip(widths))
        {
            let width = width.transpose()?;
            if spec.is_active() != width.is_some() || width.unwrap_or(0) != spec.width() {
                return Err(ArterialError::shape(
                    format!("{} branch width", kind),
                    spec.width(),
                    width.unwrap_or(0),
                ));
            }
        }

        self.output_layer.check_shapes()?;
        let fan_in = fusion_width(&self.specs)?;
        if self.output_layer.fan_in() != fan_in {
            return Err(ArterialError::shape(
                "fusion input width",
                fan_in,
                self.output_layer.fan_in(),
            ));
        }
        if self.output_layer.task() != self.config.task {
            return Err(ArterialError::Config(format!(
                "fusion head task {:?} does not match configured task {:?}",
                self.output_layer.task(),
                self.config.task
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ArterialSample, EdgeIndex, GraphBatch};
    use ndarray::Array1;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn config(global: usize, segment: usize, dense: usize, task: Task) -> ArterialNetConfig {
        ArterialNetConfig {
            global_in_dim: 5,
            segment_node_in_dim: 4,
            segment_edge_in_dim: 3,
            dense_node_in_dim: 2,
            hidden_dim: 16,
            hidden_dim_dense: 8,
            num_global_layers: global,
            num_segment_layers: segment,
            num_dense_layers: dense,
            task,
            ..ArterialNetConfig::default()
        }
    }

    fn ring(n: usize, node_dim: usize, edge_dim: Option<usize>, rng: &mut StdRng) -> GraphBatch {
        let pairs: Vec<[usize; 2]> = (0..n).map(|i| [i, (i + 1) % n]).collect();
        let x = Array2::random_using((n, node_dim), Uniform::new(-1.0, 1.0), rng);
        let attr = edge_dim.map(|d| Array2::random_using((n, d), Uniform::new(-1.0, 1.0), rng));
        GraphBatch::single(x, EdgeIndex::from_pairs(&pairs), attr).unwrap()
    }

    fn batch(samples: usize) -> ArterialBatch {
        let mut rng = StdRng::seed_from_u64(99);
        let samples: Vec<ArterialSample> = (0..samples)
            .map(|i| ArterialSample {
                global: Array1::random_using(5, Uniform::new(-1.0, 1.0), &mut rng),
                segment: ring(3 + i, 4, Some(3), &mut rng),
                dense: ring(4 + i, 2, None, &mut rng),
            })
            .collect();
        ArterialBatch::collate(&samples).unwrap()
    }

    #[test]
    fn test_all_disabled_rejected() {
        let result = ArterialNet::new(config(0, 0, 0, Task::Regression));
        assert!(matches!(result, Err(ArterialError::NoActiveBranches)));
    }

    #[test]
    fn test_single_branch_fan_in() {
        let fan_in = |g, s, d| {
            ArterialNet::new(config(g, s, d, Task::Regression))
                .unwrap()
                .fusion_in_dim()
        };
        assert_eq!(fan_in(1, 0, 0), 16);
        assert_eq!(fan_in(0, 2, 0), 16);
        assert_eq!(fan_in(0, 0, 3), 8);
    }

    #[test]
    fn test_multi_branch_fan_in_uses_dense_width() {
        for task in [Task::Regression, Task::Classification] {
            assert_eq!(ArterialNet::new(config(1, 1, 0, task)).unwrap().fusion_in_dim(), 32);
            assert_eq!(ArterialNet::new(config(1, 0, 1, task)).unwrap().fusion_in_dim(), 24);
            assert_eq!(ArterialNet::new(config(0, 1, 1, task)).unwrap().fusion_in_dim(), 24);
            assert_eq!(ArterialNet::new(config(2, 2, 2, task)).unwrap().fusion_in_dim(), 40);
        }
    }

    #[test]
    fn test_forward_regression() {
        let mut model = ArterialNet::new(config(2, 2, 2, Task::Regression)).unwrap();
        let out = model.forward(&batch(4)).unwrap();
        assert_eq!(out.dim(), (4, 1));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_forward_classification() {
        let mut model = ArterialNet::new(config(1, 1, 1, Task::Classification)).unwrap();
        let out = model.forward(&batch(3)).unwrap();
        assert_eq!(out.dim(), (3, 2));
        for row in out.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_disabled_branch_skipped() {
        let mut model = ArterialNet::new(config(0, 1, 0, Task::Regression)).unwrap();
        assert!(model.global_path().is_none());
        assert!(model.dense_path().is_none());
        assert_eq!(model.branch_spec(BranchKind::Global), BranchSpec::Disabled);
        let out = model.forward(&batch(2)).unwrap();
        assert_eq!(out.dim(), (2, 1));
    }

    #[test]
    fn test_eval_is_deterministic() {
        let mut model = ArterialNet::new(config(2, 2, 2, Task::Regression)).unwrap();
        let data = batch(3);
        model.forward(&data).unwrap();
        model.eval();
        assert!(!model.is_training());
        let a = model.forward(&data).unwrap();
        let b = model.forward(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let mut a = ArterialNet::new(config(1, 1, 1, Task::Regression)).unwrap();
        let mut b = ArterialNet::new(config(1, 1, 1, Task::Regression)).unwrap();
        a.eval();
        b.eval();
        let data = batch(2);
        assert_eq!(a.forward(&data).unwrap(), b.forward(&data).unwrap());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut model = ArterialNet::new(config(1, 1, 1, Task::Classification)).unwrap();
        model.eval();
        let data = batch(2);
        let before = model.forward(&data).unwrap();

        let mut restored = ArterialNet::from_json(&model.to_json().unwrap()).unwrap();
        assert_eq!(restored.num_parameters(), model.num_parameters());
        let after = restored.forward(&data).unwrap();
        assert!((&after - &before).iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn test_invalid_dropout() {
        let mut cfg = config(1, 0, 0, Task::Regression);
        cfg.dropout = 1.0;
        assert!(matches!(ArterialNet::new(cfg), Err(ArterialError::InvalidDropout(_))));
    }

    #[test]
    fn test_from_json_rejects_tampered_weights() {
        let model = ArterialNet::new(config(1, 1, 1, Task::Regression)).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();

        // drop one input column from the fusion weight matrix
        let weight = &mut value["output_layer"]["linear"]["weight"];
        weight["dim"][1] = serde_json::json!(39);
        weight["data"].as_array_mut().unwrap().pop();

        let tampered = serde_json::to_string(&value).unwrap();
        assert!(matches!(
            ArterialNet::from_json(&tampered),
            Err(ArterialError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_check_shapes_on_fresh_model() {
        for (g, s, d) in [(1, 0, 0), (0, 2, 0), (0, 0, 1), (2, 2, 2)] {
            let model = ArterialNet::new(config(g, s, d, Task::Classification)).unwrap();
            assert!(model.check_shapes().is_ok());
        }
    }
}
