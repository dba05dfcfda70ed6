use super::candidate::AllocationCandidate;
use super::store::EntityStore;
use super::types::RCF_INTEREST_RATE;
use super::vector::DecisionVector;

/// Total financing cost of `vector`, lower is better.
///
/// Starts from the all-RCF baseline; every used candidate pays its own rate
/// outside its requirement window and replaces the RCF rate inside it.
pub fn compute_fitness(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
) -> f64 {
    let mut cost = store.baseline_cost();
    for candidate in candidates {
        if candidate.is_degenerate(vector) {
            continue;
        }
        let start = candidate.start(vector);
        let tenor = candidate.tenor(vector);
        let amount = candidate.amount(vector);
        let rate = candidate.interest_rate(store);

        let req = &store.requirements()[candidate.requirement_index];
        let overlap = ((start + tenor).min(req.end_date() as f64)
            - start.max(req.start_date as f64))
        .max(0.0);

        cost += (tenor - overlap) * amount * rate;
        cost -= overlap * amount * (RCF_INTEREST_RATE - rate);
    }
    cost
}

/// Month-by-month cost of `vector`: every active allocation pays its rate on
/// its amount, every active requirement pays RCF on whatever it is short.
///
/// Allocations count in a month only when they span all of it, so the result
/// matches [`compute_fitness`] for feasible vectors with whole-month values.
pub fn simulate_cost(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
) -> f64 {
    let used: Vec<&AllocationCandidate> = candidates
        .iter()
        .filter(|candidate| !candidate.is_degenerate(vector))
        .collect();

    let (mut first_month, mut last_month) = store.requirement_horizon();
    for candidate in &used {
        first_month = first_month.min(candidate.start(vector).floor() as i32);
        last_month = last_month.max(candidate.end(vector).ceil() as i32);
    }

    let mut covered = vec![0.0; store.requirements().len()];
    let mut cost = 0.0;
    for month in first_month..last_month {
        let month_start = month as f64;
        covered.iter_mut().for_each(|value| *value = 0.0);

        for candidate in &used {
            if candidate.start(vector) > month_start || candidate.end(vector) < month_start + 1.0 {
                continue;
            }
            let amount = candidate.amount(vector);
            cost += amount * candidate.interest_rate(store);
            covered[candidate.requirement_index] += amount;
        }

        for (index, req) in store.requirements().iter().enumerate() {
            if month < req.start_date || month >= req.end_date() {
                continue;
            }
            cost += (req.amount as f64 - covered[index]).max(0.0) * RCF_INTEREST_RATE;
        }
    }
    cost
}
