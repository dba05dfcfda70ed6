mod candidate;
mod constraint;
mod error;
mod fitness;
mod heuristic;
mod init;
mod search;
mod store;
mod types;
mod vector;

pub use candidate::{AllocationCandidate, Backing, CandidateBounds, generate_candidates};
pub use constraint::{bound_violation, capacity_violation, measure_violation};
pub use error::PreconditionError;
pub use fitness::{compute_fitness, simulate_cost};
pub use heuristic::greedy_allocation;
pub use init::{initialize_candidate, random_vector, resample_coordinate};
pub use search::{
    CrossoverMode, Evolution, Generation, GenerationStats, Particle, Problem, SearchConfig,
    SearchOutcome, SearchStrategy, StrategyKind, Swarm, SwarmState, best_index, is_better,
    run_search,
};
pub use store::EntityStore;
pub use types::{
    BALANCEPOOL_INTEREST_RATE, BalancePool, DIMENSIONS_PER_CANDIDATE, MonthIndex,
    RCF_INTEREST_RATE, Requirement, Source, TaxClass, format_month_date, month_and_year,
    month_index, parse_month_date, window_overlap,
};
pub use vector::DecisionVector;
