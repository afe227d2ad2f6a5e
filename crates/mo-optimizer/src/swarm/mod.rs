//! Particle-swarm search settings and, with the `pso` feature, the parallel
//! swarm optimizer itself.

use serde::{Deserialize, Serialize};

#[cfg(feature = "pso")]
mod optimizer;

#[cfg(feature = "pso")]
pub use optimizer::{swarm_search, ParallelSwarmOptimizer, Particle, SwarmResult};

/// Which particles influence each other's velocity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Topology {
    /// Every particle sees every other particle.
    FullyConnected,
    /// Particles see the `radius` nearest indices on each side of a ring.
    Ring { radius: usize },
}

impl Default for Topology {
    fn default() -> Self {
        Self::FullyConnected
    }
}

impl Topology {
    /// Neighbour indices for every particle of a swarm of `size`. Each
    /// particle is its own neighbour.
    pub fn neighbors(&self, size: usize) -> Vec<Vec<usize>> {
        match self {
            Self::FullyConnected => (0..size).map(|_| (0..size).collect()).collect(),
            Self::Ring { radius } => (0..size)
                .map(|i| {
                    let mut around: Vec<usize> = Vec::with_capacity(2 * radius + 1);
                    around.push(i);
                    for offset in 1..=*radius {
                        for j in [(i + offset) % size, (i + size - offset % size) % size] {
                            if !around.contains(&j) {
                                around.push(j);
                            }
                        }
                    }
                    around.sort_unstable();
                    around
                })
                .collect(),
        }
    }
}

/// Swarm dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Number of particles.
    pub size: usize,
    /// Weight of the previous velocity.
    pub inertia: f64,
    /// Attraction to the particle's own best position.
    pub memory: f64,
    /// Attraction to the best position among the neighbours.
    pub sociality: f64,
    pub topology: Topology,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            size: 5,
            inertia: 0.9,
            memory: 2.0,
            sociality: 2.0,
            topology: Topology::FullyConnected,
        }
    }
}

impl SwarmConfig {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }
}
