mod evolution;
mod swarm;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::candidate::AllocationCandidate;
use super::error::PreconditionError;
use super::heuristic::greedy_allocation;
use super::store::EntityStore;
use super::vector::DecisionVector;

pub use evolution::{Evolution, Generation};
pub use swarm::{Particle, Swarm, SwarmState};

const STREAM_INIT: u64 = 1;
const STREAM_NEIGHBORS: u64 = 2;
const STREAM_VELOCITY: u64 = 3;
const STREAM_SELECTION: u64 = 4;
const STREAM_CROSSOVER: u64 = 5;
const STREAM_MUTATION: u64 = 6;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StrategyKind {
    Swarm,
    Evolution,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Swarm => "swarm",
            Self::Evolution => "evolution",
        }
    }
}

/// Granularity of the evolutionary crossover.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CrossoverMode {
    /// Swap one randomly chosen candidate.
    Candidate,
    /// Swap every candidate of one randomly chosen requirement.
    Requirement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub strategy: StrategyKind,
    pub seed: u64,
    pub iterations: u32,
    pub population_size: usize,
    pub init_retries: u32,
    pub neighbor_count: usize,
    pub phi: f64,
    pub mutation_rate: f64,
    pub tournament_size: Option<usize>,
    pub crossover: CrossoverMode,
    pub stall_limit: Option<u32>,
    pub seed_with_heuristic: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Swarm,
            seed: 42,
            iterations: 500,
            population_size: 200,
            init_retries: 5,
            neighbor_count: 10,
            phi: 4.1,
            mutation_rate: 0.10,
            tournament_size: None,
            crossover: CrossoverMode::Candidate,
            stall_limit: None,
            seed_with_heuristic: false,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.iterations == 0 {
            return Err("iterations must be > 0".to_string());
        }
        if self.population_size == 0 {
            return Err("population_size must be > 0".to_string());
        }
        if self.init_retries == 0 {
            return Err("init_retries must be > 0".to_string());
        }
        if self.neighbor_count == 0 || self.neighbor_count > self.population_size {
            return Err("neighbor_count must be between 1 and population_size".to_string());
        }
        if !self.phi.is_finite() || self.phi <= 4.0 {
            return Err("phi must be > 4".to_string());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err("mutation_rate must be between 0 and 1".to_string());
        }
        if let Some(size) = self.tournament_size {
            if size == 0 || size > self.population_size {
                return Err("tournament_size must be between 1 and population_size".to_string());
            }
        }
        if self.stall_limit == Some(0) {
            return Err("stall_limit must be > 0".to_string());
        }
        Ok(())
    }

    pub fn effective_tournament_size(&self) -> usize {
        self.tournament_size
            .unwrap_or(self.population_size / 3)
            .clamp(1, self.population_size.max(1))
    }

    /// Constriction coefficient for the swarm velocity update.
    pub fn constriction(&self) -> f64 {
        2.0 / (self.phi - 2.0 + (self.phi * self.phi - 4.0 * self.phi).sqrt())
    }
}

/// Read-only view the strategies search over.
pub struct Problem<'a> {
    store: &'a EntityStore,
    candidates: &'a [AllocationCandidate],
    by_requirement: Vec<Vec<usize>>,
}

impl<'a> Problem<'a> {
    pub fn new(
        store: &'a EntityStore,
        candidates: &'a [AllocationCandidate],
    ) -> Result<Self, PreconditionError> {
        if store.requirements().is_empty() {
            return Err(PreconditionError::NoRequirements);
        }
        if candidates.is_empty() {
            return Err(PreconditionError::NoCandidates);
        }

        let mut by_requirement = vec![Vec::new(); store.requirements().len()];
        for (index, candidate) in candidates.iter().enumerate() {
            by_requirement[candidate.requirement_index].push(index);
        }
        by_requirement.retain(|group| !group.is_empty());

        Ok(Self {
            store,
            candidates,
            by_requirement,
        })
    }

    pub fn store(&self) -> &'a EntityStore {
        self.store
    }

    pub fn candidates(&self) -> &'a [AllocationCandidate] {
        self.candidates
    }

    /// Candidate indices grouped by requirement; requirements without
    /// candidates are left out.
    pub fn requirement_groups(&self) -> &[Vec<usize>] {
        &self.by_requirement
    }

    pub fn evaluate(&self, vector: &mut DecisionVector) {
        vector.reevaluate(self.store, self.candidates);
    }
}

/// Lexicographic order: lower violation first, then lower cost among feasible
/// vectors. Infeasible vectors with equal violation are never ordered.
pub fn is_better(a: &DecisionVector, b: &DecisionVector) -> bool {
    if a.violation() != b.violation() {
        return a.violation() < b.violation();
    }
    a.is_feasible() && a.fitness() < b.fitness()
}

/// Index of the best vector according to [`is_better`]; the first wins ties.
pub fn best_index<'v, I>(vectors: I) -> usize
where
    I: IntoIterator<Item = &'v DecisionVector>,
{
    let mut best: Option<(usize, &DecisionVector)> = None;
    for (index, vector) in vectors.into_iter().enumerate() {
        match best {
            Some((_, current)) if !is_better(vector, current) => {}
            _ => best = Some((index, vector)),
        }
    }
    best.map_or(0, |(index, _)| index)
}

pub trait SearchStrategy {
    type Population;

    fn seed(&mut self, problem: &Problem<'_>, initial: Option<DecisionVector>) -> Self::Population;

    fn step(&mut self, problem: &Problem<'_>, population: Self::Population) -> Self::Population;

    fn best<'p>(&self, population: &'p Self::Population) -> &'p DecisionVector;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationStats {
    pub generation: u32,
    pub violation: f64,
    pub fitness: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub strategy: StrategyKind,
    pub seed: u64,
    pub best: DecisionVector,
    pub generations: u32,
    pub history: Vec<GenerationStats>,
    pub stopped_early: bool,
}

/// Runs the configured strategy and returns the best vector seen in any
/// generation, feasible or not.
pub fn run_search(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    config: &SearchConfig,
) -> Result<SearchOutcome, PreconditionError> {
    config.validate().map_err(PreconditionError::InvalidConfig)?;
    let problem = Problem::new(store, candidates)?;

    let initial = config
        .seed_with_heuristic
        .then(|| greedy_allocation(store, candidates));

    info!(
        strategy = config.strategy.as_str(),
        seed = config.seed,
        candidates = candidates.len(),
        population = config.population_size,
        iterations = config.iterations,
        "starting search"
    );

    let outcome = match config.strategy {
        StrategyKind::Swarm => drive(Swarm::new(config), &problem, config, initial),
        StrategyKind::Evolution => drive(Evolution::new(config), &problem, config, initial),
    };

    if outcome.best.is_feasible() {
        info!(
            generations = outcome.generations,
            cost = outcome.best.fitness(),
            "search finished"
        );
    } else {
        warn!(
            generations = outcome.generations,
            violation = outcome.best.violation(),
            "search finished without a feasible allocation"
        );
    }
    Ok(outcome)
}

fn drive<S: SearchStrategy>(
    mut strategy: S,
    problem: &Problem<'_>,
    config: &SearchConfig,
    initial: Option<DecisionVector>,
) -> SearchOutcome {
    let mut population = strategy.seed(problem, initial);
    let mut best = strategy.best(&population).clone();
    if !best.is_feasible() {
        warn!(violation = best.violation(), "no feasible vector in the initial population");
    }

    let mut history = Vec::with_capacity(config.iterations as usize + 1);
    history.push(GenerationStats {
        generation: 0,
        violation: best.violation(),
        fitness: best.fitness(),
    });

    let mut generations = 0;
    let mut stalled = 0;
    let mut stopped_early = false;
    for generation in 1..=config.iterations {
        population = strategy.step(problem, population);
        generations = generation;

        let current = strategy.best(&population);
        if is_better(current, &best) {
            best = current.clone();
            stalled = 0;
        } else {
            stalled += 1;
        }

        history.push(GenerationStats {
            generation,
            violation: best.violation(),
            fitness: best.fitness(),
        });
        debug!(
            generation,
            violation = best.violation(),
            fitness = best.fitness(),
            "generation complete"
        );

        if config.stall_limit.is_some_and(|limit| stalled >= limit) {
            info!(generation, stalled, "stopping early, no improvement");
            stopped_early = true;
            break;
        }
    }

    SearchOutcome {
        strategy: config.strategy,
        seed: config.seed,
        best,
        generations,
        history,
        stopped_early,
    }
}

fn stream_rng(seed: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, stream))
}

fn derive_seed(base_seed: u64, stream: u64) -> u64 {
    splitmix64(base_seed ^ (stream << 32))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
