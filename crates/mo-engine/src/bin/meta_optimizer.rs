use std::path::PathBuf;

use clap::Parser;
use mo_engine::{MetaOptimizer, OptimizerConfig, RunPaths, FAMILY_NAMES};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Search classifier hyperparameters by cross-validation, then evaluate the
/// winner on a held-out test set.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "meta-optimizer")]
#[command(version)]
struct Cli {
    /// Training set CSV (features..., label)
    #[arg(value_name = "TRAIN")]
    train: PathBuf,

    /// Test set CSV with the same columns as the training set
    #[arg(value_name = "TEST")]
    test: PathBuf,

    /// Where to write the fitted best classifier
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Where to write the sorted score history
    #[arg(value_name = "SCORES")]
    scores: PathBuf,

    /// Search method
    #[arg(short = 't', long = "type", value_parser = ["grid", "random", "pso"])]
    search: Option<String>,

    /// Random-search samples, or the swarm's evaluation budget
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Parallel workers (-1 uses every core)
    #[arg(short, long, allow_negative_numbers = true)]
    jobs: Option<i32>,

    /// Classifier family to tune
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(FAMILY_NAMES.iter().copied()))]
    classifier: Option<String>,

    /// Experiment name recorded in the evaluation log
    #[arg(long)]
    name: Option<String>,

    /// Cross-validation folds
    #[arg(long)]
    cv: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Particles in the swarm
    #[arg(long)]
    swarm_size: Option<usize>,

    /// Append the test-set evaluation to this CSV log
    #[arg(long)]
    evaluations_log: Option<PathBuf>,

    /// JSON config file; explicit flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn optimizer_config(&self) -> anyhow::Result<OptimizerConfig> {
        let mut config = match &self.config {
            Some(path) => OptimizerConfig::from_json_file(path)?,
            None => OptimizerConfig::default(),
        };
        if let Some(search) = &self.search {
            config.search = search.clone();
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(classifier) = &self.classifier {
            config.classifier = classifier.clone();
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(cv) = self.cv {
            config.cv_folds = cv;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(size) = self.swarm_size {
            config.swarm.size = size;
        }
        Ok(config)
    }

    fn run_paths(&self) -> RunPaths {
        RunPaths {
            train: self.train.clone(),
            test: self.test.clone(),
            model: self.model.clone(),
            scores: Some(self.scores.clone()),
            evaluations_log: self.evaluations_log.clone(),
        }
    }
}

fn enable_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    enable_tracing(cli.verbose);

    let config = cli.optimizer_config()?;
    info!(
        name = %config.name,
        classifier = %config.classifier,
        search = %config.search,
        iterations = config.iterations,
        jobs = config.jobs,
        "meta-optimizer starting"
    );

    let optimizer = MetaOptimizer::new(config)?;
    let report = optimizer.run(&cli.run_paths())?;

    info!(
        best_score = report.outcome.best.score,
        best = %report.outcome.best.candidate,
        accuracy = report.evaluation.accuracy,
        model = %cli.model.display(),
        scores = %cli.scores.display(),
        "done"
    );
    Ok(())
}
