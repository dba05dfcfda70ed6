use super::store::EntityStore;
use super::types::{BALANCEPOOL_INTEREST_RATE, DIMENSIONS_PER_CANDIDATE, window_overlap};
use super::vector::DecisionVector;

const START_OFFSET: usize = 0;
const TENOR_OFFSET: usize = 1;
const AMOUNT_OFFSET: usize = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Backing {
    Source(usize),
    BalancePool(usize),
}

/// One eligible (requirement, source) or (requirement, balance pool) pairing and
/// the position of its three decision values in a [`DecisionVector`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AllocationCandidate {
    pub requirement_index: usize,
    pub backing: Backing,
    pub offset: usize,
}

/// Whole-month window and amount limits a single candidate can take without
/// breaching its own requirement/source bounds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CandidateBounds {
    pub min_start: i32,
    pub max_start: i32,
    pub max_end: i32,
    pub max_amount: f64,
}

impl AllocationCandidate {
    pub fn source_index(&self) -> Option<usize> {
        match self.backing {
            Backing::Source(index) => Some(index),
            Backing::BalancePool(_) => None,
        }
    }

    pub fn balance_pool_index(&self) -> Option<usize> {
        match self.backing {
            Backing::Source(_) => None,
            Backing::BalancePool(index) => Some(index),
        }
    }

    pub fn start(&self, vector: &DecisionVector) -> f64 {
        vector.coords()[self.offset + START_OFFSET]
    }

    pub fn tenor(&self, vector: &DecisionVector) -> f64 {
        vector.coords()[self.offset + TENOR_OFFSET]
    }

    pub fn amount(&self, vector: &DecisionVector) -> f64 {
        vector.coords()[self.offset + AMOUNT_OFFSET]
    }

    pub fn end(&self, vector: &DecisionVector) -> f64 {
        self.start(vector) + self.tenor(vector)
    }

    pub fn set_start(&self, vector: &mut DecisionVector, value: f64) {
        vector.coords_mut()[self.offset + START_OFFSET] = value;
    }

    pub fn set_tenor(&self, vector: &mut DecisionVector, value: f64) {
        vector.coords_mut()[self.offset + TENOR_OFFSET] = value;
    }

    pub fn set_amount(&self, vector: &mut DecisionVector, value: f64) {
        vector.coords_mut()[self.offset + AMOUNT_OFFSET] = value;
    }

    pub fn set_all(&self, vector: &mut DecisionVector, start: f64, tenor: f64, amount: f64) {
        self.set_start(vector, start);
        self.set_tenor(vector, tenor);
        self.set_amount(vector, amount);
    }

    /// Exchanges this candidate's three values between two vectors.
    pub fn swap_between(&self, a: &mut DecisionVector, b: &mut DecisionVector) {
        let range = self.offset..self.offset + DIMENSIONS_PER_CANDIDATE;
        a.coords_mut()[range.clone()].swap_with_slice(&mut b.coords_mut()[range]);
    }

    /// Unused allocations: nothing drawn, nothing charged.
    pub fn is_degenerate(&self, vector: &DecisionVector) -> bool {
        let start = self.start(vector);
        let tenor = self.tenor(vector);
        let amount = self.amount(vector);
        !(tenor > 0.0 && amount > 0.0 && start + tenor > start)
    }

    pub fn interest_rate(&self, store: &EntityStore) -> f64 {
        match self.backing {
            Backing::Source(index) => store.sources()[index].interest_rate,
            Backing::BalancePool(_) => BALANCEPOOL_INTEREST_RATE,
        }
    }

    pub fn capacity(&self, store: &EntityStore) -> f64 {
        match self.backing {
            Backing::Source(index) => store.sources()[index].amount as f64,
            Backing::BalancePool(index) => store.balance_pools()[index].amount,
        }
    }

    pub fn bounds(&self, store: &EntityStore) -> CandidateBounds {
        let req = &store.requirements()[self.requirement_index];
        let mut min_start = req.start_date;
        let mut max_end = req.end_date();
        if let Backing::Source(index) = self.backing {
            let source = &store.sources()[index];
            min_start = min_start.max(source.start_date);
            max_end = max_end.min(source.end_date());
        }
        CandidateBounds {
            min_start,
            max_start: max_end - 1,
            max_end,
            max_amount: (req.amount as f64).min(self.capacity(store)).max(0.0),
        }
    }
}

/// Builds every eligible candidate: all balance pool pairings first, then the
/// tax-compatible source pairings sharing at least one month with the requirement.
pub fn generate_candidates(store: &EntityStore) -> Vec<AllocationCandidate> {
    let mut candidates = Vec::new();

    for requirement_index in 0..store.requirements().len() {
        for pool_index in 0..store.balance_pools().len() {
            candidates.push(AllocationCandidate {
                requirement_index,
                backing: Backing::BalancePool(pool_index),
                offset: candidates.len() * DIMENSIONS_PER_CANDIDATE,
            });
        }
    }

    for (requirement_index, req) in store.requirements().iter().enumerate() {
        for (source_index, source) in store.sources().iter().enumerate() {
            if source.tax_class != req.tax_class {
                continue;
            }
            let overlap = window_overlap(
                source.start_date,
                source.end_date(),
                req.start_date,
                req.end_date(),
            );
            if overlap < 1 {
                continue;
            }
            candidates.push(AllocationCandidate {
                requirement_index,
                backing: Backing::Source(source_index),
                offset: candidates.len() * DIMENSIONS_PER_CANDIDATE,
            });
        }
    }

    candidates
}
