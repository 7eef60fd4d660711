//! ArterialNet CLI
//!
//! Command-line interface for building ArterialNet models and inspecting them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arterial_net::prelude::*;

#[derive(Parser)]
#[command(name = "arterial-net")]
#[command(about = "Multi-branch graph attention network for arterial graph data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the model name derived from a configuration
    Name {
        /// Experiment configuration (TOML)
        #[arg(short, long)]
        config: String,
    },

    /// Build a model and report its layout
    Summary {
        /// Experiment configuration (TOML)
        #[arg(short, long)]
        config: String,

        /// Dataset description (TOML or JSON)
        #[arg(short, long)]
        dataset: String,

        /// Compute device
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Save the initialized model as JSON
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a forward pass on synthetic graphs
    Demo {
        /// Predict two-class probabilities instead of a scalar
        #[arg(long)]
        classification: bool,

        /// Number of samples in the batch
        #[arg(short, long, default_value = "4")]
        samples: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Write the default configuration
    InitConfig {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Name { config } => {
            let config = ExperimentConfig::from_file(&config)
                .with_context(|| format!("failed to load {}", config))?;
            println!("{}", ModelFactory::model_name(&config)?);
        }

        Commands::Summary {
            config,
            dataset,
            device,
            output,
        } => {
            let config = ExperimentConfig::from_file(&config)
                .with_context(|| format!("failed to load {}", config))?;
            let dataset = DatasetDescription::from_file(&dataset)
                .with_context(|| format!("failed to load {}", dataset))?;
            let device: Device = device.parse()?;

            let (model, name) = ModelFactory::build(&config, &dataset, device)?;
            print_summary(&model, &name);

            if let Some(path) = output {
                std::fs::write(&path, model.to_json()?)?;
                info!("Model saved to {}", path);
            }
        }

        Commands::Demo {
            classification,
            samples,
            seed,
        } => {
            let dataset = DatasetDescription {
                num_global_features: 6,
                num_segment_node_features: 5,
                num_segment_edge_features: 3,
                num_dense_node_features: 4,
            };
            let config = ExperimentConfig {
                hidden_channels: 16,
                hidden_channels_dense: 8,
                is_classification: classification,
                random_state: seed,
                tag: Some("demo".into()),
                ..Default::default()
            };

            let (mut model, name) = ModelFactory::build(&config, &dataset, Device::Cpu)?;
            print_summary(&model, &name);

            let mut rng = StdRng::seed_from_u64(seed);
            let batch = synthetic_batch(&dataset, samples, &mut rng)?;
            info!(
                "Batch: {} samples, {} segment nodes, {} dense nodes",
                batch.num_samples(),
                batch.segment_data.num_nodes(),
                batch.dense_data.num_nodes()
            );

            model.eval();
            let predictions = model.forward(&batch)?;
            for (i, row) in predictions.rows().into_iter().enumerate() {
                println!("sample {:>3}: {:?}", i, row.to_vec());
            }
        }

        Commands::InitConfig { output } => {
            ExperimentConfig::default().to_file(&output)?;
            info!("Default configuration written to {}", output);
        }
    }

    Ok(())
}

fn print_summary(model: &ArterialNet, name: &str) {
    println!("Model: {}", name);
    for kind in BranchKind::all() {
        match model.branch_spec(kind) {
            BranchSpec::Active { layers, width } => {
                println!("  {:<8} {} layers, width {}", kind.as_str(), layers, width)
            }
            BranchSpec::Disabled => println!("  {:<8} disabled", kind.as_str()),
        }
    }
    println!(
        "  fusion   {} -> {} ({:?})",
        model.fusion_in_dim(),
        model.out_dim(),
        model.task()
    );
    println!("  parameters: {}", model.num_parameters());
}

/// Random ring-shaped graphs with chords, one per input
fn synthetic_batch(
    dataset: &DatasetDescription,
    samples: usize,
    rng: &mut StdRng,
) -> Result<ArterialBatch> {
    let mut items = Vec::with_capacity(samples);
    for _ in 0..samples {
        let global = ndarray::Array1::random_using(
            dataset.num_global_features,
            Uniform::new(-1.0, 1.0),
            rng,
        );
        let segment = synthetic_graph(
            rng.gen_range(4..10),
            dataset.num_segment_node_features,
            Some(dataset.num_segment_edge_features),
            rng,
        )?;
        let dense = synthetic_graph(
            rng.gen_range(8..20),
            dataset.num_dense_node_features,
            None,
            rng,
        )?;
        items.push(ArterialSample {
            global,
            segment,
            dense,
        });
    }
    Ok(ArterialBatch::collate(&items)?)
}

fn synthetic_graph(
    nodes: usize,
    node_dim: usize,
    edge_dim: Option<usize>,
    rng: &mut StdRng,
) -> Result<GraphBatch> {
    let mut pairs = Vec::new();
    for i in 0..nodes {
        let j = (i + 1) % nodes;
        pairs.push([i, j]);
        pairs.push([j, i]);
    }
    let chord = [0, nodes / 2];
    pairs.push(chord);
    pairs.push([chord[1], chord[0]]);

    let x = Array2::random_using((nodes, node_dim), Uniform::new(-1.0, 1.0), rng);
    let edge_attr = edge_dim
        .filter(|&d| d > 0)
        .map(|d| Array2::random_using((pairs.len(), d), Uniform::new(0.0, 1.0), rng));

    Ok(GraphBatch::single(x, EdgeIndex::from_pairs(&pairs), edge_attr)?)
}
