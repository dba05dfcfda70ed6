use rand::Rng;
use rand::rngs::StdRng;

use super::{
    CrossoverMode, Problem, STREAM_CROSSOVER, STREAM_INIT, STREAM_MUTATION, STREAM_SELECTION,
    SearchConfig, SearchStrategy, best_index, is_better, stream_rng,
};
use crate::core::init::{random_vector, resample_coordinate};
use crate::core::types::DIMENSIONS_PER_CANDIDATE;
use crate::core::vector::DecisionVector;

#[derive(Debug, Clone)]
pub struct Generation {
    pub members: Vec<DecisionVector>,
    best_index: usize,
}

/// Generational GA: tournament selection, pairwise crossover, per-candidate
/// mutation, full replacement.
pub struct Evolution {
    population_size: usize,
    tournament_size: usize,
    mutation_rate: f64,
    crossover: CrossoverMode,
    init_retries: usize,
    init_rng: StdRng,
    selection_rng: StdRng,
    crossover_rng: StdRng,
    mutation_rng: StdRng,
}

impl Evolution {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            population_size: config.population_size,
            tournament_size: config.effective_tournament_size(),
            mutation_rate: config.mutation_rate,
            crossover: config.crossover,
            init_retries: config.init_retries as usize,
            init_rng: stream_rng(config.seed, STREAM_INIT),
            selection_rng: stream_rng(config.seed, STREAM_SELECTION),
            crossover_rng: stream_rng(config.seed, STREAM_CROSSOVER),
            mutation_rng: stream_rng(config.seed, STREAM_MUTATION),
        }
    }

    fn tournament(&mut self, members: &[DecisionVector]) -> usize {
        let mut winner = self.selection_rng.random_range(0..members.len());
        for _ in 1..self.tournament_size {
            let contestant = self.selection_rng.random_range(0..members.len());
            if is_better(&members[contestant], &members[winner]) {
                winner = contestant;
            }
        }
        winner
    }

    fn cross(&mut self, problem: &Problem<'_>, a: &mut DecisionVector, b: &mut DecisionVector) {
        let candidates = problem.candidates();
        match self.crossover {
            CrossoverMode::Candidate => {
                let index = self.crossover_rng.random_range(0..candidates.len());
                candidates[index].swap_between(a, b);
            }
            CrossoverMode::Requirement => {
                let groups = problem.requirement_groups();
                let group = &groups[self.crossover_rng.random_range(0..groups.len())];
                for &index in group {
                    candidates[index].swap_between(a, b);
                }
            }
        }
    }

    fn mutate(&mut self, problem: &Problem<'_>, vector: &mut DecisionVector) {
        for candidate in problem.candidates() {
            if self.mutation_rng.random::<f64>() >= self.mutation_rate {
                continue;
            }
            let coordinate = self.mutation_rng.random_range(0..DIMENSIONS_PER_CANDIDATE);
            resample_coordinate(
                problem.store(),
                candidate,
                vector,
                coordinate,
                &mut self.mutation_rng,
            );
        }
    }
}

impl SearchStrategy for Evolution {
    type Population = Generation;

    fn seed(&mut self, problem: &Problem<'_>, initial: Option<DecisionVector>) -> Generation {
        let mut members = Vec::with_capacity(self.population_size);
        members.extend(initial);
        while members.len() < self.population_size {
            members.push(random_vector(
                problem.store(),
                problem.candidates(),
                self.init_retries,
                &mut self.init_rng,
            ));
        }
        let best_index = best_index(&members);
        Generation {
            members,
            best_index,
        }
    }

    fn step(&mut self, problem: &Problem<'_>, generation: Generation) -> Generation {
        let mut offspring: Vec<DecisionVector> = (0..self.population_size)
            .map(|_| {
                let winner = self.tournament(&generation.members);
                generation.members[winner].clone()
            })
            .collect();

        for pair in offspring.chunks_exact_mut(2) {
            let (left, right) = pair.split_at_mut(1);
            self.cross(problem, &mut left[0], &mut right[0]);
        }

        for child in &mut offspring {
            self.mutate(problem, child);
            problem.evaluate(child);
        }

        let best_index = best_index(&offspring);
        Generation {
            members: offspring,
            best_index,
        }
    }

    fn best<'p>(&self, generation: &'p Generation) -> &'p DecisionVector {
        &generation.members[generation.best_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::candidate::generate_candidates;
    use crate::core::store::EntityStore;
    use crate::core::store::fixtures::{requirement, source, store};

    fn two_requirement_store() -> EntityStore {
        store(
            vec![source(0, 12, 1000, 0.08), source(2, 8, 700, 0.06)],
            vec![requirement(0, 6, 900), requirement(3, 6, 500)],
            vec![300.0],
        )
    }

    #[test]
    fn large_tournaments_favour_the_best_member() {
        let store = two_requirement_store();
        let candidates = generate_candidates(&store);
        let problem = Problem::new(&store, &candidates).expect("problem");
        let config = SearchConfig {
            population_size: 6,
            tournament_size: Some(6),
            seed: 9,
            ..SearchConfig::default()
        };
        let mut evolution = Evolution::new(&config);
        let generation = evolution.seed(&problem, None);

        // Contestants are drawn with replacement, so the best member is not
        // guaranteed to take part in every tournament.
        let best = evolution.best(&generation).clone();
        let mut best_won = 0;
        for _ in 0..50 {
            let winner = &generation.members[evolution.tournament(&generation.members)];
            assert!(!is_better(winner, &best));
            if !is_better(&best, winner) {
                best_won += 1;
            }
        }
        assert!(best_won > 0);
    }

    #[test]
    fn candidate_crossover_swaps_exactly_one_candidate() {
        let store = two_requirement_store();
        let candidates = generate_candidates(&store);
        let problem = Problem::new(&store, &candidates).expect("problem");
        let config = SearchConfig {
            population_size: 4,
            seed: 3,
            ..SearchConfig::default()
        };
        let mut evolution = Evolution::new(&config);

        let dims = candidates.len() * DIMENSIONS_PER_CANDIDATE;
        let mut a = DecisionVector::from_coords(vec![1.0; dims]);
        let mut b = DecisionVector::from_coords(vec![2.0; dims]);
        evolution.cross(&problem, &mut a, &mut b);

        let swapped: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.start(&a) == 2.0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(swapped.len(), 1);
        let c = candidates[swapped[0]];
        assert_eq!((c.tenor(&a), c.amount(&a)), (2.0, 2.0));
        assert_eq!((c.start(&b), c.tenor(&b), c.amount(&b)), (1.0, 1.0, 1.0));
    }

    #[test]
    fn requirement_crossover_swaps_every_candidate_of_one_requirement() {
        let store = two_requirement_store();
        let candidates = generate_candidates(&store);
        let problem = Problem::new(&store, &candidates).expect("problem");
        let config = SearchConfig {
            population_size: 4,
            seed: 3,
            crossover: CrossoverMode::Requirement,
            ..SearchConfig::default()
        };
        let mut evolution = Evolution::new(&config);

        let dims = candidates.len() * DIMENSIONS_PER_CANDIDATE;
        let mut a = DecisionVector::from_coords(vec![1.0; dims]);
        let mut b = DecisionVector::from_coords(vec![2.0; dims]);
        evolution.cross(&problem, &mut a, &mut b);

        let swapped: Vec<&_> = candidates.iter().filter(|c| c.start(&a) == 2.0).collect();
        assert!(!swapped.is_empty());
        let requirement_index = swapped[0].requirement_index;
        assert!(swapped.iter().all(|c| c.requirement_index == requirement_index));
        let group_size = candidates
            .iter()
            .filter(|c| c.requirement_index == requirement_index)
            .count();
        assert_eq!(swapped.len(), group_size);
    }

    #[test]
    fn zero_mutation_rate_leaves_vectors_untouched() {
        let store = two_requirement_store();
        let candidates = generate_candidates(&store);
        let problem = Problem::new(&store, &candidates).expect("problem");
        let config = SearchConfig {
            population_size: 4,
            mutation_rate: 0.0,
            ..SearchConfig::default()
        };
        let mut evolution = Evolution::new(&config);

        let generation = evolution.seed(&problem, None);
        let mut vector = generation.members[0].clone();
        let before = vector.coords().to_vec();
        evolution.mutate(&problem, &mut vector);
        assert_eq!(vector.coords(), before.as_slice());
    }

    #[test]
    fn generation_size_is_preserved_and_odd_sizes_work() {
        let store = two_requirement_store();
        let candidates = generate_candidates(&store);
        let problem = Problem::new(&store, &candidates).expect("problem");
        let config = SearchConfig {
            population_size: 7,
            seed: 12,
            ..SearchConfig::default()
        };
        let mut evolution = Evolution::new(&config);
        let mut generation = evolution.seed(&problem, None);
        for _ in 0..5 {
            generation = evolution.step(&problem, generation);
            assert_eq!(generation.members.len(), 7);
            assert!(generation.members.iter().all(|m| m.violation().is_finite()));
        }
    }
}
