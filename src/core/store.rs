use super::error::PreconditionError;
use super::types::{BalancePool, RCF_INTEREST_RATE, Requirement, Source};

/// Entities for one run. Read-only once built; the two requirement orderings are
/// computed here and shared by every evaluator call.
#[derive(Debug, Clone)]
pub struct EntityStore {
    sources: Vec<Source>,
    requirements: Vec<Requirement>,
    balance_pools: Vec<BalancePool>,
    requirements_by_start: Vec<usize>,
    requirements_by_end: Vec<usize>,
}

impl EntityStore {
    pub fn new(
        sources: Vec<Source>,
        requirements: Vec<Requirement>,
        balance_pools: Vec<BalancePool>,
    ) -> Result<Self, PreconditionError> {
        validate_entities(&sources, &requirements, &balance_pools)?;

        let mut requirements_by_start: Vec<usize> = (0..requirements.len()).collect();
        requirements_by_start.sort_by_key(|&i| (requirements[i].start_date, i));
        let mut requirements_by_end: Vec<usize> = (0..requirements.len()).collect();
        requirements_by_end.sort_by_key(|&i| (requirements[i].end_date(), i));

        Ok(Self {
            sources,
            requirements,
            balance_pools,
            requirements_by_start,
            requirements_by_end,
        })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn balance_pools(&self) -> &[BalancePool] {
        &self.balance_pools
    }

    /// Requirement indices ordered by start date, ties by index.
    ///
    /// Only [`EntityStore::requirement_horizon`] reads the two orderings; the
    /// closed-form fitness and the constraint sweep order their own events.
    pub fn requirements_by_start(&self) -> &[usize] {
        &self.requirements_by_start
    }

    /// Requirement indices ordered by end date, ties by index.
    pub fn requirements_by_end(&self) -> &[usize] {
        &self.requirements_by_end
    }

    /// Earliest requirement start and latest requirement end.
    pub fn requirement_horizon(&self) -> (i32, i32) {
        let first = &self.requirements[self.requirements_by_start[0]];
        let last = &self.requirements[self.requirements_by_end[self.requirements_by_end.len() - 1]];
        (first.start_date, last.end_date())
    }

    /// Cost of financing every requirement through the RCF for its full window.
    pub fn baseline_cost(&self) -> f64 {
        self.requirements
            .iter()
            .map(|req| req.amount as f64 * req.tenor as f64 * RCF_INTEREST_RATE)
            .sum()
    }
}

fn validate_entities(
    sources: &[Source],
    requirements: &[Requirement],
    balance_pools: &[BalancePool],
) -> Result<(), PreconditionError> {
    if requirements.is_empty() {
        return Err(PreconditionError::NoRequirements);
    }

    for (index, req) in requirements.iter().enumerate() {
        if req.tenor <= 0 {
            return Err(PreconditionError::InvalidRequirement {
                index,
                reason: "tenor must be > 0".to_string(),
            });
        }
        if req.amount < 0 {
            return Err(PreconditionError::InvalidRequirement {
                index,
                reason: "amount must be >= 0".to_string(),
            });
        }
        if req.start_date.checked_add(req.tenor).is_none() {
            return Err(PreconditionError::InvalidRequirement {
                index,
                reason: "end date is out of range".to_string(),
            });
        }
    }

    for (index, source) in sources.iter().enumerate() {
        if source.tenor <= 0 {
            return Err(PreconditionError::InvalidSource {
                index,
                reason: "tenor must be > 0".to_string(),
            });
        }
        if source.amount < 0 {
            return Err(PreconditionError::InvalidSource {
                index,
                reason: "amount must be >= 0".to_string(),
            });
        }
        if source.start_date.checked_add(source.tenor).is_none() {
            return Err(PreconditionError::InvalidSource {
                index,
                reason: "end date is out of range".to_string(),
            });
        }
        if !source.interest_rate.is_finite() || source.interest_rate < 0.0 {
            return Err(PreconditionError::InvalidSource {
                index,
                reason: "interest rate must be finite and >= 0".to_string(),
            });
        }
    }

    for (index, pool) in balance_pools.iter().enumerate() {
        if !pool.amount.is_finite() || pool.amount < 0.0 {
            return Err(PreconditionError::InvalidBalancePool {
                index,
                reason: "amount must be finite and >= 0".to_string(),
            });
        }
    }

    Ok(())
}
