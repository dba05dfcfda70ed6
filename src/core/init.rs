use rand::Rng;
use tracing::debug;

use super::candidate::AllocationCandidate;
use super::search::is_better;
use super::store::EntityStore;
use super::vector::DecisionVector;

/// Draws whole-month start and tenor and a uniform amount such that this
/// candidate alone stays inside its requirement and backing windows.
pub fn initialize_candidate<R: Rng + ?Sized>(
    store: &EntityStore,
    candidate: &AllocationCandidate,
    vector: &mut DecisionVector,
    rng: &mut R,
) {
    let bounds = candidate.bounds(store);
    if bounds.max_start < bounds.min_start {
        candidate.set_all(vector, bounds.min_start as f64, 0.0, 0.0);
        return;
    }
    let start = rng.random_range(bounds.min_start..=bounds.max_start);
    let tenor = rng.random_range(0..=bounds.max_end - start);
    let amount = rng.random::<f64>() * bounds.max_amount;
    candidate.set_all(vector, start as f64, tenor as f64, amount);
}

/// Redraws a single coordinate (0 = start, 1 = tenor, 2 = amount) within the
/// same limits [`initialize_candidate`] uses, leaving the other two as they are.
pub fn resample_coordinate<R: Rng + ?Sized>(
    store: &EntityStore,
    candidate: &AllocationCandidate,
    vector: &mut DecisionVector,
    coordinate: usize,
    rng: &mut R,
) {
    let bounds = candidate.bounds(store);
    match coordinate {
        0 => {
            if bounds.max_start >= bounds.min_start {
                let start = rng.random_range(bounds.min_start..=bounds.max_start);
                candidate.set_start(vector, start as f64);
            }
        }
        1 => {
            let start = candidate.start(vector).round();
            let longest = if start.is_finite() {
                (bounds.max_end as f64 - start).max(0.0) as i32
            } else {
                0
            };
            let tenor = rng.random_range(0..=longest);
            candidate.set_tenor(vector, tenor as f64);
        }
        _ => {
            let amount = rng.random::<f64>() * bounds.max_amount;
            candidate.set_amount(vector, amount);
        }
    }
}

/// A fully initialized and evaluated vector.
///
/// Joint feasibility is not guaranteed by the per-candidate draws, so up to
/// `retries` fresh draws are made; the first feasible one wins, otherwise the
/// best of the attempts is returned.
pub fn random_vector<R: Rng + ?Sized>(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    retries: usize,
    rng: &mut R,
) -> DecisionVector {
    let mut best: Option<DecisionVector> = None;
    for _ in 0..retries.max(1) {
        let mut vector = DecisionVector::zeroed(candidates.len());
        for candidate in candidates {
            initialize_candidate(store, candidate, &mut vector, rng);
        }
        vector.reevaluate(store, candidates);
        if vector.is_feasible() {
            return vector;
        }
        best = match best {
            Some(current) if !is_better(&vector, &current) => Some(current),
            _ => Some(vector),
        };
    }

    debug!(retries, "initial vector still infeasible after retries");
    best.unwrap_or_else(|| DecisionVector::zeroed(candidates.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::candidate::generate_candidates;
    use crate::core::constraint::bound_violation;
    use crate::core::store::fixtures::{requirement, source, store};
    use proptest::prelude::{any, prop_assert, proptest};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn mixed_store() -> EntityStore {
        store(
            vec![
                source(0, 10, 1000, 0.07),
                source(4, 8, 600, 0.12),
                source(-3, 5, 250, 0.09),
            ],
            vec![requirement(0, 6, 800), requirement(3, 6, 900)],
            vec![700.0, 100.0],
        )
    }

    #[test]
    fn initialized_candidates_use_whole_months() {
        let store = mixed_store();
        let candidates = generate_candidates(&store);
        let mut rng = StdRng::seed_from_u64(11);
        let mut vector = DecisionVector::zeroed(candidates.len());
        for candidate in &candidates {
            initialize_candidate(&store, candidate, &mut vector, &mut rng);
            assert_eq!(candidate.start(&vector).fract(), 0.0);
            assert_eq!(candidate.tenor(&vector).fract(), 0.0);
        }
    }

    #[test]
    fn random_vector_is_evaluated() {
        let store = mixed_store();
        let candidates = generate_candidates(&store);
        let mut rng = StdRng::seed_from_u64(3);
        let vector = random_vector(&store, &candidates, 5, &mut rng);
        assert!(vector.violation().is_finite());
        assert!(vector.fitness().is_finite());
    }

    #[test]
    fn same_seed_gives_same_vector() {
        let store = mixed_store();
        let candidates = generate_candidates(&store);
        let first = random_vector(&store, &candidates, 5, &mut StdRng::seed_from_u64(99));
        let second = random_vector(&store, &candidates, 5, &mut StdRng::seed_from_u64(99));
        assert_eq!(first, second);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_single_candidate_initialization_is_bound_clean(seed in any::<u64>()) {
            let store = mixed_store();
            let candidates = generate_candidates(&store);
            let mut rng = StdRng::seed_from_u64(seed);

            for (index, candidate) in candidates.iter().enumerate() {
                let mut vector = DecisionVector::zeroed(candidates.len());
                initialize_candidate(&store, candidate, &mut vector, &mut rng);
                let violation = bound_violation(&store, &candidates, &vector);
                prop_assert!(violation == 0.0, "candidate {index} violation {violation}");
            }
        }

        #[test]
        fn prop_resampled_coordinates_respect_limits(
            seed in any::<u64>(),
            coordinate in 0usize..3,
        ) {
            let store = mixed_store();
            let candidates = generate_candidates(&store);
            let mut rng = StdRng::seed_from_u64(seed);

            for candidate in &candidates {
                let mut vector = DecisionVector::zeroed(candidates.len());
                initialize_candidate(&store, candidate, &mut vector, &mut rng);
                resample_coordinate(&store, candidate, &mut vector, coordinate, &mut rng);
                let bounds = candidate.bounds(&store);
                prop_assert!(candidate.start(&vector) >= bounds.min_start as f64);
                prop_assert!(candidate.start(&vector) <= bounds.max_start as f64);
                prop_assert!(candidate.tenor(&vector) >= 0.0);
                prop_assert!(candidate.amount(&vector) >= 0.0);
                prop_assert!(candidate.amount(&vector) <= bounds.max_amount);
            }
        }
    }
}
