//! Parallel particle-swarm optimizer.
//!
//! Each iteration evaluates the whole swarm as one batch on the worker pool,
//! then moves every evaluated particle:
//!
//! ```text
//! v <- inertia * v + memory * r1 * (pbest - x) + sociality * r2 * (nbest - x)
//! x <- clamp(x + v, boundaries)
//! ```
//!
//! `nbest` is the best personal-best position among the particle's
//! neighbours. The search stops once `max_evaluations` objective calls have
//! been spent; the final batch is truncated so the budget is never exceeded.

use mo_types::{MoResult, SearchError};
use rand::Rng;
use tracing::{debug, info};

use super::SwarmConfig;
use crate::evaluator::{CandidateScorer, Evaluator, Objective};
use crate::pool::{streams, task_rng, WorkerPool};
use crate::space::ParameterSpace;

/// One member of the swarm.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub best_position: Vec<f64>,
    /// `-inf` until the particle is first evaluated.
    pub best_fitness: f64,
    /// Indices into the swarm's particle list.
    pub neighbors: Vec<usize>,
}

impl Particle {
    fn new(position: Vec<f64>, neighbors: Vec<usize>) -> Self {
        Self {
            velocity: vec![0.0; position.len()],
            best_position: position.clone(),
            best_fitness: f64::NEG_INFINITY,
            position,
            neighbors,
        }
    }
}

/// Outcome of a finished swarm run.
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmResult {
    pub best_position: Vec<f64>,
    pub best_fitness: f64,
    pub evaluations: usize,
    pub iterations: usize,
}

/// Particle swarm over a fixed box, evaluating each iteration as one batch
/// on a [`WorkerPool`] under a total evaluation budget.
pub struct ParallelSwarmOptimizer<'a, O: Objective + ?Sized> {
    objective: &'a O,
    pool: &'a WorkerPool,
    config: SwarmConfig,
    boundaries: Vec<(f64, f64)>,
    max_evaluations: usize,
    seed: u64,
    particles: Vec<Particle>,
    evaluations: usize,
    iterations: usize,
    best: Option<(Vec<f64>, f64)>,
}

impl<'a, O: Objective + ?Sized> ParallelSwarmOptimizer<'a, O> {
    pub fn new(
        objective: &'a O,
        pool: &'a WorkerPool,
        boundaries: Vec<(f64, f64)>,
        config: SwarmConfig,
        max_evaluations: usize,
        seed: u64,
    ) -> MoResult<Self> {
        if config.size == 0 {
            return Err(SearchError::InvalidSwarm("swarm size must be positive".into()).into());
        }
        if let Some((low, high)) = boundaries
            .iter()
            .find(|(low, high)| !(low.is_finite() && high.is_finite() && low <= high))
        {
            return Err(SearchError::InvalidSwarm(format!(
                "boundary [{low}, {high}] is not a finite ordered range"
            ))
            .into());
        }

        Ok(Self {
            objective,
            pool,
            config,
            boundaries,
            max_evaluations,
            seed,
            particles: Vec::new(),
            evaluations: 0,
            iterations: 0,
            best: None,
        })
    }

    /// Seed the swarm with starting positions (clamped into the boundaries)
    /// and wire up the neighbour topology.
    pub fn init_particles(&mut self, starting: Vec<Vec<f64>>) -> MoResult<()> {
        if starting.len() != self.config.size {
            return Err(SearchError::InvalidSwarm(format!(
                "expected {} starting positions, got {}",
                self.config.size,
                starting.len()
            ))
            .into());
        }
        if let Some(bad) = starting.iter().find(|p| p.len() != self.boundaries.len()) {
            return Err(SearchError::DimensionMismatch {
                expected: self.boundaries.len(),
                actual: bad.len(),
            }
            .into());
        }

        let neighbors = self.config.topology.neighbors(starting.len());
        self.particles = starting
            .into_iter()
            .zip(neighbors)
            .map(|(mut position, neighbors)| {
                clamp_into(&mut position, &self.boundaries);
                Particle::new(position, neighbors)
            })
            .collect();
        Ok(())
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn boundaries(&self) -> &[(f64, f64)] {
        &self.boundaries
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn best(&self) -> Option<(&[f64], f64)> {
        self.best
            .as_ref()
            .map(|(position, fitness)| (position.as_slice(), *fitness))
    }

    /// Run one iteration. Returns `false` without doing anything once the
    /// budget is spent.
    pub fn step(&mut self) -> MoResult<bool> {
        let remaining = self.max_evaluations.saturating_sub(self.evaluations);
        if remaining == 0 || self.particles.is_empty() {
            return Ok(false);
        }

        let batch = remaining.min(self.particles.len());
        let positions: Vec<Vec<f64>> = self.particles[..batch]
            .iter()
            .map(|p| p.position.clone())
            .collect();
        let objective = self.objective;
        let fitness = self
            .pool
            .run_batch(&positions, |_, position| objective.evaluate(position))?;
        self.evaluations += batch;

        for (particle, &fit) in self.particles.iter_mut().zip(&fitness) {
            if fit > particle.best_fitness {
                particle.best_fitness = fit;
                particle.best_position = particle.position.clone();
            }
            let improves = match &self.best {
                None => !fit.is_nan(),
                Some((_, best)) => fit > *best,
            };
            if improves {
                self.best = Some((particle.position.clone(), fit));
            }
        }

        let attractors: Vec<Vec<f64>> = self.particles[..batch]
            .iter()
            .map(|p| self.neighborhood_best(p).to_vec())
            .collect();

        let config = &self.config;
        let boundaries = &self.boundaries;
        for (index, (particle, social)) in self.particles[..batch]
            .iter_mut()
            .zip(attractors)
            .enumerate()
        {
            let task = ((self.iterations as u64) << 32) | index as u64;
            let mut rng = task_rng(self.seed, streams::SWARM_MOTION, task);
            let r1: f64 = rng.random();
            let r2: f64 = rng.random();

            for d in 0..particle.position.len() {
                let x = particle.position[d];
                let v = config.inertia * particle.velocity[d]
                    + config.memory * r1 * (particle.best_position[d] - x)
                    + config.sociality * r2 * (social[d] - x);
                particle.velocity[d] = v;
                particle.position[d] = x + v;
            }
            clamp_into(&mut particle.position, boundaries);
        }

        self.iterations += 1;
        debug!(
            iteration = self.iterations,
            evaluations = self.evaluations,
            best_fitness = self.best.as_ref().map(|(_, f)| *f),
            "swarm iteration finished"
        );
        Ok(true)
    }

    /// Iterate until the evaluation budget is spent.
    pub fn learn(&mut self) -> MoResult<SwarmResult> {
        while self.step()? {}

        let (best_position, best_fitness) = self.best.clone().ok_or(SearchError::NoEvaluations)?;
        Ok(SwarmResult {
            best_position,
            best_fitness,
            evaluations: self.evaluations,
            iterations: self.iterations,
        })
    }

    fn neighborhood_best<'p>(&'p self, particle: &'p Particle) -> &'p [f64] {
        let mut best: Option<&Particle> = None;
        for &j in &particle.neighbors {
            let candidate = &self.particles[j];
            match best {
                Some(current) if candidate.best_fitness <= current.best_fitness => {}
                _ if candidate.best_fitness == f64::NEG_INFINITY => {}
                _ => best = Some(candidate),
            }
        }
        best.map_or(particle.best_position.as_slice(), |p| p.best_position.as_slice())
    }
}

fn clamp_into(position: &mut [f64], boundaries: &[(f64, f64)]) {
    for (x, &(low, high)) in position.iter_mut().zip(boundaries) {
        *x = if x.is_nan() { low } else { x.clamp(low, high) };
    }
}

/// Particle-swarm search over `space`.
///
/// Only multi-valued parameters are moved; `evaluator` must have been built
/// with [`Evaluator::for_space`] over the same space. Starting coordinates
/// come from each parameter's random-search distribution.
pub fn swarm_search<S: CandidateScorer>(
    evaluator: &Evaluator<S>,
    space: &ParameterSpace,
    pool: &WorkerPool,
    max_evaluations: usize,
    config: &SwarmConfig,
    seed: u64,
) -> MoResult<SwarmResult> {
    space.validate()?;
    let searched = space.searched();
    if searched.is_empty() {
        return Err(SearchError::EmptySpace.into());
    }
    let same_dimensions = evaluator
        .searched_names()
        .iter()
        .map(String::as_str)
        .eq(searched.iter().map(|p| p.name.as_str()));
    if !same_dimensions {
        return Err(SearchError::InvalidSwarm(format!(
            "evaluator searches {:?} but the space searches {:?}",
            evaluator.searched_names(),
            searched.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
        ))
        .into());
    }

    let boundaries: Vec<(f64, f64)> = searched.iter().map(|p| p.bounds).collect();
    let starting = (0..config.size)
        .map(|i| {
            let mut rng = task_rng(seed, streams::SWARM_INIT, i as u64);
            searched
                .iter()
                .map(|p| p.sample_coordinate(&mut rng))
                .collect::<MoResult<Vec<f64>>>()
        })
        .collect::<MoResult<Vec<_>>>()?;

    info!(
        dimensions = boundaries.len(),
        particles = config.size,
        max_evaluations,
        workers = pool.workers(),
        "starting particle swarm"
    );

    let mut swarm = ParallelSwarmOptimizer::new(
        evaluator,
        pool,
        boundaries,
        config.clone(),
        max_evaluations,
        seed,
    )?;
    swarm.init_particles(starting)?;
    let result = swarm.learn()?;

    info!(
        best_fitness = result.best_fitness,
        evaluations = result.evaluations,
        iterations = result.iterations,
        "particle swarm finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{Distribution, ParameterDef, Restriction};
    use crate::swarm::Topology;
    use mo_types::Candidate;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Peak at (0.3, ..., 0.3); records every call.
    #[derive(Default)]
    struct Bowl {
        calls: Mutex<Vec<(Vec<f64>, f64)>>,
    }

    impl Objective for Bowl {
        fn evaluate(&self, position: &[f64]) -> MoResult<f64> {
            let fitness = -position.iter().map(|x| (x - 0.3).powi(2)).sum::<f64>();
            self.calls.lock().push((position.to_vec(), fitness));
            Ok(fitness)
        }
    }

    fn random_starts(size: usize, dims: usize, low: f64, high: f64, seed: u64) -> Vec<Vec<f64>> {
        (0..size)
            .map(|i| {
                let mut rng = task_rng(seed, 99, i as u64);
                (0..dims).map(|_| rng.random_range(low..=high)).collect()
            })
            .collect()
    }

    #[test]
    fn spends_exactly_the_budget() {
        let pool = WorkerPool::new(2).unwrap();
        let bowl = Bowl::default();
        let config = SwarmConfig::default().with_size(4);
        let mut swarm =
            ParallelSwarmOptimizer::new(&bowl, &pool, vec![(0.0, 1.0); 2], config, 10, 7).unwrap();
        swarm.init_particles(random_starts(4, 2, 0.0, 1.0, 1)).unwrap();

        let result = swarm.learn().unwrap();
        assert_eq!(result.evaluations, 10);
        // 4 + 4 + truncated batch of 2
        assert_eq!(result.iterations, 3);
        assert_eq!(bowl.calls.lock().len(), 10);
    }

    #[test]
    fn global_best_is_the_best_evaluation() {
        let pool = WorkerPool::new(3).unwrap();
        let bowl = Bowl::default();
        let mut swarm = ParallelSwarmOptimizer::new(
            &bowl,
            &pool,
            vec![(0.0, 1.0); 2],
            SwarmConfig::default().with_size(6),
            120,
            11,
        )
        .unwrap();
        swarm.init_particles(random_starts(6, 2, 0.0, 1.0, 2)).unwrap();
        let result = swarm.learn().unwrap();

        let calls = bowl.calls.lock();
        let max = calls.iter().map(|(_, f)| *f).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.best_fitness, max);
        let recomputed = -result
            .best_position
            .iter()
            .map(|x| (x - 0.3).powi(2))
            .sum::<f64>();
        assert_eq!(recomputed, result.best_fitness);

        for particle in swarm.particles() {
            assert!(particle.best_fitness <= result.best_fitness);
        }
    }

    #[test]
    fn same_seed_same_trajectory() {
        let pool = WorkerPool::new(4).unwrap();
        let run = |seed: u64| {
            let bowl = Bowl::default();
            let mut swarm = ParallelSwarmOptimizer::new(
                &bowl,
                &pool,
                vec![(-1.0, 1.0); 3],
                SwarmConfig::default().with_topology(Topology::Ring { radius: 1 }),
                40,
                seed,
            )
            .unwrap();
            swarm.init_particles(random_starts(5, 3, -1.0, 1.0, seed)).unwrap();
            swarm.learn().unwrap()
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn init_clamps_and_wires_topology() {
        let pool = WorkerPool::new(1).unwrap();
        let bowl = Bowl::default();
        let mut swarm = ParallelSwarmOptimizer::new(
            &bowl,
            &pool,
            vec![(0.0, 1.0)],
            SwarmConfig::default()
                .with_size(3)
                .with_topology(Topology::Ring { radius: 1 }),
            3,
            0,
        )
        .unwrap();
        swarm
            .init_particles(vec![vec![-4.0], vec![0.5], vec![f64::NAN]])
            .unwrap();
        let positions: Vec<f64> = swarm.particles().iter().map(|p| p.position[0]).collect();
        assert_eq!(positions, vec![0.0, 0.5, 0.0]);
        assert_eq!(swarm.particles()[0].neighbors, vec![0, 1, 2]);

        assert!(swarm.init_particles(vec![vec![0.1, 0.2]; 3]).is_err());
        assert!(swarm.init_particles(vec![vec![0.1]; 2]).is_err());
    }

    #[test]
    fn rejects_bad_configuration() {
        let pool = WorkerPool::new(1).unwrap();
        let bowl = Bowl::default();
        let zero = SwarmConfig::default().with_size(0);
        assert!(ParallelSwarmOptimizer::new(&bowl, &pool, vec![(0.0, 1.0)], zero, 5, 0).is_err());
        let inverted = SwarmConfig::default();
        assert!(
            ParallelSwarmOptimizer::new(&bowl, &pool, vec![(1.0, 0.0)], inverted, 5, 0).is_err()
        );
    }

    #[test]
    fn penalised_positions_count_toward_budget() {
        let space = ParameterSpace::new()
            .add(
                ParameterDef::new("threshold")
                    .with_grid([0.1, 0.5, 0.9])
                    .with_distribution(Distribution::Uniform { low: -1.0, high: 1.0 })
                    .with_restriction(Restriction::greater_than(0.0))
                    .with_bounds(-1.0, 1.0),
            )
            .add(ParameterDef::new("bias").with_grid([0.25]));
        let evaluator = Evaluator::for_space(&space, |c: &Candidate| -> MoResult<Vec<f64>> {
            let t = c.get_f64("threshold")?;
            Ok(vec![-(t - 0.7).powi(2) + c.get_f64("bias")?])
        })
        .unwrap();
        let pool = WorkerPool::new(2).unwrap();

        let result = swarm_search(
            &evaluator,
            &space,
            &pool,
            23,
            &SwarmConfig::default(),
            3,
        )
        .unwrap();

        assert_eq!(result.evaluations, 23);
        assert_eq!(evaluator.evaluations(), 23);
        assert_eq!(evaluator.history_len() + evaluator.rejected(), 23);
        for record in evaluator.history() {
            assert_eq!(record.candidate.get_f64("bias").unwrap(), 0.25);
            assert!(record.candidate.get_f64("threshold").unwrap() > 0.0);
        }
    }

    #[test]
    fn swarm_needs_searchable_dimensions() {
        let space = ParameterSpace::new().add(ParameterDef::new("fixed").with_grid([1.0]));
        let evaluator =
            Evaluator::for_space(&space, |_: &Candidate| -> MoResult<Vec<f64>> { Ok(vec![1.0]) })
                .unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let err = swarm_search(&evaluator, &space, &pool, 10, &SwarmConfig::default(), 0);
        assert!(err.is_err());
        assert_eq!(evaluator.evaluations(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn positions_stay_within_boundaries(
            seed in any::<u64>(),
            size in 1usize..8,
            budget in 0usize..40,
            low in -5.0f64..0.0,
            width in 0.0f64..5.0,
        ) {
            let high = low + width;
            let pool = WorkerPool::new(2).unwrap();
            let bowl = Bowl::default();
            let config = SwarmConfig::default().with_size(size);
            let mut swarm = ParallelSwarmOptimizer::new(
                &bowl, &pool, vec![(low, high); 2], config, budget, seed,
            ).unwrap();
            swarm.init_particles(random_starts(size, 2, low - 3.0, high + 3.0, seed)).unwrap();

            loop {
                for particle in swarm.particles() {
                    for &x in &particle.position {
                        prop_assert!(x >= low && x <= high, "{} outside [{}, {}]", x, low, high);
                    }
                }
                if !swarm.step().unwrap() {
                    break;
                }
            }
            prop_assert!(swarm.evaluations() <= budget);
            prop_assert_eq!(bowl.calls.lock().len(), swarm.evaluations());
        }
    }
}
