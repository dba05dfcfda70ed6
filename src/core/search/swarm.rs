use rand::Rng;
use rand::rngs::StdRng;

use super::{
    Problem, STREAM_INIT, STREAM_NEIGHBORS, STREAM_VELOCITY, SearchConfig, SearchStrategy,
    best_index, is_better, stream_rng,
};
use crate::core::init::{initialize_candidate, random_vector};
use crate::core::vector::DecisionVector;

#[derive(Debug, Clone)]
pub struct Particle {
    pub position: DecisionVector,
    pub velocity: Vec<f64>,
    pub best: DecisionVector,
    /// Fixed for the run; always starts with the particle itself.
    pub neighbors: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct SwarmState {
    pub particles: Vec<Particle>,
    best_index: usize,
}

/// Constricted particle swarm with a fixed random neighbourhood per particle.
pub struct Swarm {
    swarm_size: usize,
    neighbor_count: usize,
    init_retries: usize,
    phi: f64,
    constriction: f64,
    init_rng: StdRng,
    neighbor_rng: StdRng,
    velocity_rng: StdRng,
}

impl Swarm {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            swarm_size: config.population_size,
            neighbor_count: config.neighbor_count.min(config.population_size),
            init_retries: config.init_retries as usize,
            phi: config.phi,
            constriction: config.constriction(),
            init_rng: stream_rng(config.seed, STREAM_INIT),
            neighbor_rng: stream_rng(config.seed, STREAM_NEIGHBORS),
            velocity_rng: stream_rng(config.seed, STREAM_VELOCITY),
        }
    }

    fn initial_velocity(&mut self, problem: &Problem<'_>, position: &DecisionVector) -> Vec<f64> {
        let mut target = DecisionVector::zeroed(problem.candidates().len());
        for candidate in problem.candidates() {
            initialize_candidate(problem.store(), candidate, &mut target, &mut self.init_rng);
        }
        target
            .coords()
            .iter()
            .zip(position.coords())
            .map(|(to, from)| (to - from) * 0.5)
            .collect()
    }

    fn neighbourhood_best(particles: &[Particle], neighbors: &[usize]) -> usize {
        let mut best = neighbors[0];
        for &index in &neighbors[1..] {
            if is_better(&particles[index].best, &particles[best].best) {
                best = index;
            }
        }
        best
    }
}

impl SearchStrategy for Swarm {
    type Population = SwarmState;

    fn seed(&mut self, problem: &Problem<'_>, initial: Option<DecisionVector>) -> SwarmState {
        let mut initial = initial;
        let mut particles = Vec::with_capacity(self.swarm_size);
        for index in 0..self.swarm_size {
            let position = match initial.take() {
                Some(vector) => vector,
                None => random_vector(
                    problem.store(),
                    problem.candidates(),
                    self.init_retries,
                    &mut self.init_rng,
                ),
            };
            let velocity = self.initial_velocity(problem, &position);

            let mut neighbors = Vec::with_capacity(self.neighbor_count);
            neighbors.push(index);
            for _ in 1..self.neighbor_count {
                neighbors.push(self.neighbor_rng.random_range(0..self.swarm_size));
            }

            particles.push(Particle {
                best: position.clone(),
                position,
                velocity,
                neighbors,
            });
        }

        let best_index = best_index(particles.iter().map(|p| &p.best));
        SwarmState {
            particles,
            best_index,
        }
    }

    fn step(&mut self, problem: &Problem<'_>, mut state: SwarmState) -> SwarmState {
        let guides: Vec<usize> = state
            .particles
            .iter()
            .map(|p| Self::neighbourhood_best(&state.particles, &p.neighbors))
            .collect();
        let factor_limit = self.phi / 2.0;

        for (index, guide) in guides.into_iter().enumerate() {
            let guide_coords = state.particles[guide].best.coords().to_vec();
            let particle = &mut state.particles[index];

            for (dim, velocity) in particle.velocity.iter_mut().enumerate() {
                let position = particle.position.coords()[dim];
                let self_factor = self.velocity_rng.random::<f64>() * factor_limit;
                let neighbour_factor = self.velocity_rng.random::<f64>() * factor_limit;
                *velocity = self.constriction
                    * (*velocity
                        + self_factor * (particle.best.coords()[dim] - position)
                        + neighbour_factor * (guide_coords[dim] - position));
            }
            for (coord, velocity) in particle
                .position
                .coords_mut()
                .iter_mut()
                .zip(&particle.velocity)
            {
                *coord += velocity;
            }

            problem.evaluate(&mut particle.position);
            if is_better(&particle.position, &particle.best) {
                particle.best = particle.position.clone();
            }
        }

        state.best_index = best_index(state.particles.iter().map(|p| &p.best));
        state
    }

    fn best<'p>(&self, state: &'p SwarmState) -> &'p DecisionVector {
        &state.particles[state.best_index].best
    }
}
