//! Bounded worker pool for batches of evaluations, plus per-task random
//! generators.

use mo_types::{MoResult, SearchError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Fixed-size pool of evaluation workers.
///
/// Every batch blocks until all of its tasks finish; results come back in
/// submission order.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Create a pool with `jobs` workers. Negative values use every available
    /// core; zero is rejected.
    pub fn new(jobs: i32) -> MoResult<Self> {
        let workers = match jobs {
            0 => {
                return Err(SearchError::WorkerPool("worker count must not be zero".into()).into())
            }
            j if j < 0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            j => j as usize,
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("evaluator-{i}"))
            .build()
            .map_err(|e| SearchError::WorkerPool(e.to_string()))?;

        debug!(workers, "worker pool ready");
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` over every item and collect the results in item order.
    /// The first error aborts the batch and is returned.
    pub fn run_batch<T, R, F>(&self, items: &[T], task: F) -> MoResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> MoResult<R> + Send + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| task(index, item))
                .collect()
        })
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}

/// Streams keep generators of different search phases apart.
pub mod streams {
    pub const RANDOM_SAMPLES: u64 = 1;
    pub const SWARM_INIT: u64 = 2;
    pub const SWARM_MOTION: u64 = 3;
}

/// Independent generator for one task, derived from the run seed, a stream
/// id and the task index. Never shared between workers.
pub fn task_rng(seed: u64, stream: u64, index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(splitmix64(seed ^ splitmix64(index)));
    rng.set_stream(stream);
    rng
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mo_types::MoError;
    use rand::Rng;

    #[test]
    fn batch_results_follow_submission_order() {
        let pool = WorkerPool::new(4).unwrap();
        let items: Vec<u64> = (0..64).collect();
        let out = pool
            .run_batch(&items, |index, item| {
                std::thread::sleep(std::time::Duration::from_micros((64 - item) * 10));
                Ok(index as u64 * 10 + item)
            })
            .unwrap();
        let expected: Vec<u64> = (0..64).map(|i| i * 11).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn batch_error_aborts() {
        let pool = WorkerPool::new(2).unwrap();
        let items = [1, 2, 3];
        let result: MoResult<Vec<i32>> = pool.run_batch(&items, |_, &item| {
            if item == 2 {
                Err(MoError::Internal("boom".into()))
            } else {
                Ok(item)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn worker_count_resolution() {
        assert_eq!(WorkerPool::new(3).unwrap().workers(), 3);
        assert!(WorkerPool::new(-1).unwrap().workers() >= 1);
        assert!(WorkerPool::new(0).is_err());
    }

    #[test]
    fn task_generators_are_reproducible_and_independent() {
        let draw = |mut rng: ChaCha8Rng| -> Vec<u64> { (0..4).map(|_| rng.random()).collect() };
        let a = draw(task_rng(42, 1, 0));
        let b = draw(task_rng(42, 1, 0));
        assert_eq!(a, b);

        let mut other_index = task_rng(42, 1, 1);
        let mut other_stream = task_rng(42, 2, 0);
        let first = a[0];
        assert_ne!(first, other_index.random::<u64>());
        assert_ne!(first, other_stream.random::<u64>());
    }
}
