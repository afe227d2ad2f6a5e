//! Grid and random search strategies, and dispatch across all three search
//! methods.

use mo_types::{BestResult, Candidate, EvaluationRecord, MoResult, ParameterValue, SearchError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::evaluator::{CandidateScorer, Evaluator};
use crate::pool::{streams, task_rng, WorkerPool};
use crate::space::ParameterSpace;
use crate::swarm::SwarmConfig;

/// Common trait for the candidate-enumerating strategies.
pub trait SearchStrategy: Send + Sync {
    /// Every candidate this strategy will evaluate, in submission order.
    fn candidates(&self) -> MoResult<Vec<Candidate>>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;

    /// Evaluate all candidates as one batch on `pool`. Returns the fitness of
    /// each candidate in submission order.
    fn run<S: CandidateScorer>(&self, evaluator: &Evaluator<S>, pool: &WorkerPool) -> MoResult<Vec<f64>>
    where
        Self: Sized,
    {
        let candidates = self.candidates()?;
        info!(
            strategy = self.name(),
            candidates = candidates.len(),
            workers = pool.workers(),
            "dispatching search batch"
        );
        pool.run_batch(&candidates, |_, candidate| {
            evaluator.evaluate_candidate(candidate.clone())
        })
    }
}

// ---- Grid search ----

/// Exhaustive search over the Cartesian product of every parameter's grid.
#[derive(Debug, Clone)]
pub struct GridSearch {
    axes: Vec<(String, Vec<ParameterValue>)>,
}

impl GridSearch {
    pub fn new(space: &ParameterSpace) -> MoResult<Self> {
        space.validate()?;
        let mut axes = Vec::with_capacity(space.len());
        for param in &space.parameters {
            if param.grid.is_empty() {
                return Err(SearchError::NoGridValues {
                    name: param.name.clone(),
                }
                .into());
            }
            let mut values: Vec<ParameterValue> = Vec::with_capacity(param.grid.len());
            for value in &param.grid {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
            axes.push((param.name.clone(), values));
        }
        Ok(Self { axes })
    }

    /// Number of distinct grid points.
    pub fn size(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }
}

impl SearchStrategy for GridSearch {
    fn candidates(&self) -> MoResult<Vec<Candidate>> {
        // Cartesian product, last parameter varying fastest
        let mut result: Vec<Candidate> = vec![Candidate::new()];
        for (name, values) in &self.axes {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for existing in &result {
                for value in values {
                    next.push(existing.clone().with(name.as_str(), value.clone()));
                }
            }
            result = next;
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch<'a> {
    space: &'a ParameterSpace,
    iterations: usize,
    seed: u64,
}

impl<'a> RandomSearch<'a> {
    pub fn new(space: &'a ParameterSpace, iterations: usize, seed: u64) -> MoResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            iterations,
            seed,
        })
    }

    /// Draw sample `index`. Depends only on the seed and the index.
    pub fn sample(&self, index: usize) -> MoResult<Candidate> {
        let mut rng = task_rng(self.seed, streams::RANDOM_SAMPLES, index as u64);
        self.space
            .parameters
            .iter()
            .map(|param| -> MoResult<(String, ParameterValue)> {
                Ok((param.name.clone(), param.sample(&mut rng)?))
            })
            .collect()
    }
}

impl SearchStrategy for RandomSearch<'_> {
    fn candidates(&self) -> MoResult<Vec<Candidate>> {
        (0..self.iterations).map(|i| self.sample(i)).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Dispatch ----

/// Which search to run, with its budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SearchMethod {
    Grid,
    Random {
        iterations: usize,
    },
    Pso {
        max_evaluations: usize,
        #[serde(default)]
        swarm: SwarmConfig,
    },
}

impl Default for SearchMethod {
    fn default() -> Self {
        Self::Grid
    }
}

impl SearchMethod {
    /// Build a method from its command-line name. `iterations` is the
    /// random-search sample count or the swarm's evaluation budget.
    pub fn from_name(name: &str, iterations: usize, swarm: SwarmConfig) -> MoResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "random" => Ok(Self::Random { iterations }),
            "pso" => Ok(Self::Pso {
                max_evaluations: iterations,
                swarm,
            }),
            other => Err(SearchError::UnknownMethod(other.to_string()).into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Random { .. } => "random",
            Self::Pso { .. } => "pso",
        }
    }

    /// Whether this build can run the method.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Pso { .. }) || cfg!(feature = "pso")
    }

    /// Run the search, then collect the best result and the full history from
    /// `evaluator`.
    pub fn run<S: CandidateScorer>(
        &self,
        evaluator: &Evaluator<S>,
        space: &ParameterSpace,
        pool: &WorkerPool,
        seed: u64,
    ) -> MoResult<SearchOutcome> {
        if !self.is_available() {
            return Err(SearchError::Unavailable(format!(
                "{} search was not compiled into this build (enable the `pso` feature)",
                self.name()
            ))
            .into());
        }

        info!(method = self.name(), seed, "starting search");
        match self {
            Self::Grid => {
                GridSearch::new(space)?.run(evaluator, pool)?;
            }
            Self::Random { iterations } => {
                RandomSearch::new(space, *iterations, seed)?.run(evaluator, pool)?;
            }
            Self::Pso {
                max_evaluations,
                swarm,
            } => run_swarm(evaluator, space, pool, *max_evaluations, swarm, seed)?,
        }

        let best = evaluator.best().ok_or(SearchError::NoEvaluations)?;
        let outcome = SearchOutcome {
            method: self.name().to_string(),
            best,
            history: evaluator.history(),
            evaluations: evaluator.evaluations(),
        };
        info!(
            method = %outcome.method,
            best_score = outcome.best.score,
            best = %outcome.best.candidate,
            evaluations = outcome.evaluations,
            valid = outcome.history.len(),
            "search finished"
        );
        Ok(outcome)
    }
}

#[cfg(feature = "pso")]
fn run_swarm<S: CandidateScorer>(
    evaluator: &Evaluator<S>,
    space: &ParameterSpace,
    pool: &WorkerPool,
    max_evaluations: usize,
    swarm: &SwarmConfig,
    seed: u64,
) -> MoResult<()> {
    crate::swarm::swarm_search(evaluator, space, pool, max_evaluations, swarm, seed).map(|_| ())
}

#[cfg(not(feature = "pso"))]
fn run_swarm<S: CandidateScorer>(
    _evaluator: &Evaluator<S>,
    _space: &ParameterSpace,
    _pool: &WorkerPool,
    _max_evaluations: usize,
    _swarm: &SwarmConfig,
    _seed: u64,
) -> MoResult<()> {
    Err(SearchError::Unavailable("pso".to_string()).into())
}

/// Best parameters plus the full score history of one search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub method: String,
    pub best: BestResult,
    /// Valid evaluations in completion order.
    pub history: Vec<EvaluationRecord>,
    /// Every evaluator call, penalised ones included.
    pub evaluations: usize,
}
