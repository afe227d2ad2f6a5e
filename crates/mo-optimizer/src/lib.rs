//! # mo-optimizer
//!
//! Hyperparameter search engine for the classifier meta-optimizer.
//!
//! Provides the parameter space, the constrained objective function
//! ([`Evaluator`]), a bounded worker pool, exhaustive grid and random search,
//! and (with the `pso` feature) a parallel particle-swarm optimizer. All three
//! methods are dispatched through [`SearchMethod::run`].

mod evaluator;
mod pool;
mod search;
mod space;
mod swarm;

pub use evaluator::{constraint_penalty, CandidateScorer, Evaluator, Objective, BASE_PENALTY};
pub use pool::{streams, task_rng, WorkerPool};
pub use search::{GridSearch, RandomSearch, SearchMethod, SearchOutcome, SearchStrategy};
pub use space::{Distribution, ParameterDef, ParameterSpace, Restriction};
pub use swarm::{SwarmConfig, Topology};

#[cfg(feature = "pso")]
pub use swarm::{swarm_search, ParallelSwarmOptimizer, Particle, SwarmResult};
