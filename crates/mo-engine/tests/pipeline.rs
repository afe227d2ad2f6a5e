use std::fs;
use std::path::Path;

use mo_data::{load_dataset, read_evaluations, read_score_report};
use mo_engine::{load_classifier, MetaOptimizer, OptimizerConfig, RunPaths};
use tempfile::TempDir;

/// Two well separated clusters with a little deterministic jitter.
fn write_clusters(path: &Path, per_class: usize, phase: f64) {
    let mut body = String::from("x1,x2,x3,label\n");
    for i in 0..per_class {
        let t = i as f64 + phase;
        let (a, b, c) = (0.4 * t.sin(), 0.4 * (1.7 * t).cos(), 0.3 * (0.6 * t).sin());
        body.push_str(&format!("{:.4},{:.4},{:.4},0\n", a, 1.0 + b, c));
        body.push_str(&format!("{:.4},{:.4},{:.4},1\n", 5.0 + b, 6.0 + a, 4.0 + c));
    }
    fs::write(path, body).unwrap();
}

fn run_paths(dir: &TempDir, log: bool) -> RunPaths {
    let train = dir.path().join("train.csv");
    let test = dir.path().join("test.csv");
    if !train.exists() {
        write_clusters(&train, 20, 0.0);
        write_clusters(&test, 8, 0.5);
    }
    RunPaths {
        train,
        test,
        model: dir.path().join("out").join("model.json"),
        scores: Some(dir.path().join("out").join("scores.csv")),
        evaluations_log: log.then(|| dir.path().join("evaluations.csv")),
    }
}

#[test]
fn logistic_grid_search_end_to_end() {
    let dir = TempDir::new().unwrap();
    let paths = run_paths(&dir, true);

    let config = OptimizerConfig::new("logistic-grid", "logistic", "grid").with_jobs(2);
    let report = MetaOptimizer::new(config).unwrap().run(&paths).unwrap();

    // 3 learning rates x 1 epoch count x 3 penalties x 3 thresholds
    assert_eq!(report.outcome.evaluations, 27);
    assert_eq!(report.outcome.history.len(), 27);
    assert_eq!(report.scores.len(), 27);
    assert_eq!(report.outcome.best.score, 1.0);
    assert_eq!(report.evaluation.accuracy, 1.0);

    let rows = read_score_report(paths.scores.as_ref().unwrap()).unwrap();
    assert_eq!(rows.len(), 27);
    assert!(rows.windows(2).all(|w| w[0].mean_score >= w[1].mean_score));
    assert_eq!(rows[0].mean_score, report.outcome.best.score);

    // the saved model reproduces the test-set predictions
    let (artifact, classifier) = load_classifier(&paths.model).unwrap();
    assert_eq!(artifact.family, "logistic");
    assert_eq!(artifact.parameters, report.outcome.best.candidate);
    let test = load_dataset(&paths.test).unwrap();
    assert_eq!(classifier.predict(&test.features).unwrap(), test.labels);
}

#[test]
fn knn_random_search_appends_to_the_log() {
    let dir = TempDir::new().unwrap();
    let paths = run_paths(&dir, true);

    for seed in [1, 2] {
        let config = OptimizerConfig::new(format!("knn-{seed}"), "knn", "random")
            .with_iterations(8)
            .with_seed(seed)
            .with_jobs(-1);
        let report = MetaOptimizer::new(config).unwrap().run(&paths).unwrap();
        assert_eq!(report.outcome.method, "random");
        assert_eq!(report.outcome.evaluations, 8);
        assert!(report.evaluation.accuracy >= 0.9);
    }

    let logged = read_evaluations(paths.evaluations_log.as_ref().unwrap()).unwrap();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].name, "knn-1");
    assert_eq!(logged[1].name, "knn-2");
    assert_eq!(logged[1].support_positive + logged[1].support_negative, 16);
}

#[test]
fn random_search_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let paths = run_paths(&dir, false);
    let config = OptimizerConfig::new("repeat", "logistic", "random")
        .with_iterations(5)
        .with_seed(11)
        .with_jobs(1);

    let first = MetaOptimizer::new(config.clone()).unwrap().run(&paths).unwrap();
    let second = MetaOptimizer::new(config).unwrap().run(&paths).unwrap();
    assert_eq!(first.scores, second.scores);
    assert_eq!(first.outcome.best, second.outcome.best);
}

#[test]
fn missing_training_set_fails_before_writing() {
    let dir = TempDir::new().unwrap();
    let mut paths = run_paths(&dir, false);
    paths.train = dir.path().join("absent.csv");

    let config = OptimizerConfig::new("missing", "knn", "grid");
    assert!(MetaOptimizer::new(config).unwrap().run(&paths).is_err());
    assert!(!paths.model.exists());
}

#[cfg(feature = "pso")]
#[test]
fn knn_swarm_search_respects_budget() {
    use mo_optimizer::{SwarmConfig, Topology};

    let dir = TempDir::new().unwrap();
    let paths = run_paths(&dir, false);
    let swarm = SwarmConfig::default()
        .with_size(4)
        .with_topology(Topology::Ring { radius: 1 });
    let config = OptimizerConfig::new("knn-pso", "knn", "pso")
        .with_iterations(14)
        .with_swarm(swarm)
        .with_seed(5);

    let report = MetaOptimizer::new(config).unwrap().run(&paths).unwrap();
    assert_eq!(report.outcome.method, "pso");
    assert!(report.outcome.evaluations <= 14);
    assert_eq!(report.outcome.best.score, 1.0);
    assert!(report.evaluation.accuracy >= 0.9);
    assert!(paths.model.exists());
}

#[cfg(not(feature = "pso"))]
#[test]
fn swarm_search_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let paths = run_paths(&dir, false);
    let config = OptimizerConfig::new("knn-pso", "knn", "pso");
    let err = MetaOptimizer::new(config).unwrap().run(&paths).unwrap_err();
    assert!(matches!(
        err,
        mo_types::MoError::Search(mo_types::SearchError::Unavailable(_))
    ));
}
