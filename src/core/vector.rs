use super::candidate::AllocationCandidate;
use super::constraint::measure_violation;
use super::fitness::compute_fitness;
use super::store::EntityStore;
use super::types::DIMENSIONS_PER_CANDIDATE;

/// Flat `[start, tenor, amount]` values for every candidate, in candidate order,
/// plus the cached violation and fitness from the last [`DecisionVector::reevaluate`].
///
/// Mutating the coordinates does not invalidate the cache; callers re-evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionVector {
    coords: Vec<f64>,
    violation: f64,
    fitness: f64,
}

impl DecisionVector {
    /// All-zero vector (every candidate unused); not yet evaluated.
    pub fn zeroed(candidate_count: usize) -> Self {
        Self::from_coords(vec![0.0; candidate_count * DIMENSIONS_PER_CANDIDATE])
    }

    pub fn from_coords(coords: Vec<f64>) -> Self {
        Self {
            coords,
            violation: f64::INFINITY,
            fitness: f64::INFINITY,
        }
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn coords_mut(&mut self) -> &mut [f64] {
        &mut self.coords
    }

    pub fn dimensions(&self) -> usize {
        self.coords.len()
    }

    pub fn violation(&self) -> f64 {
        self.violation
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn is_feasible(&self) -> bool {
        self.violation == 0.0
    }

    pub fn reevaluate(&mut self, store: &EntityStore, candidates: &[AllocationCandidate]) {
        debug_assert_eq!(
            self.coords.len(),
            candidates.len() * DIMENSIONS_PER_CANDIDATE
        );
        let violation = measure_violation(store, candidates, self);
        let fitness = compute_fitness(store, candidates, self);
        self.violation = if violation.is_nan() {
            f64::INFINITY
        } else {
            violation
        };
        self.fitness = if fitness.is_nan() { f64::INFINITY } else { fitness };
    }
}
