use super::candidate::{AllocationCandidate, Backing};
use super::store::EntityStore;
use super::types::{Requirement, Source, window_overlap};
use super::vector::DecisionVector;

/// Greedy one-backing-per-requirement allocation, evaluated and always feasible.
///
/// Requirements are visited in input order. Each takes the best-fitting unused
/// source; when none is eligible it takes a balance pool that can still cover
/// its full amount. Pool usage is tracked without regard to time, which keeps
/// the result conservative.
pub fn greedy_allocation(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
) -> DecisionVector {
    let requirement_count = store.requirements().len();
    let mut chosen_source: Vec<Option<usize>> = vec![None; requirement_count];
    let mut chosen_pool: Vec<Option<usize>> = vec![None; requirement_count];
    let mut source_used = vec![false; store.sources().len()];
    let mut pool_remaining: Vec<f64> = store.balance_pools().iter().map(|p| p.amount).collect();

    for (req_index, req) in store.requirements().iter().enumerate() {
        let mut best_source: Option<usize> = None;
        for (source_index, source) in store.sources().iter().enumerate() {
            if source_used[source_index]
                || source.tax_class != req.tax_class
                || allocatable_tenor(source, req) < 1
            {
                continue;
            }
            match best_source {
                None => best_source = Some(source_index),
                Some(current) => {
                    if fits_better(source, &store.sources()[current], req) {
                        best_source = Some(source_index);
                    }
                }
            }
        }

        let needed = req.amount as f64;
        let best_pool = pick_pool(&pool_remaining, needed).filter(|&i| pool_remaining[i] >= needed);

        match (best_source, best_pool) {
            (None, Some(pool_index)) => {
                chosen_pool[req_index] = Some(pool_index);
                pool_remaining[pool_index] -= needed;
            }
            (Some(source_index), _) => {
                chosen_source[req_index] = Some(source_index);
                source_used[source_index] = true;
            }
            (None, None) => {}
        }
    }

    let mut vector = DecisionVector::zeroed(candidates.len());
    for candidate in candidates {
        let req = &store.requirements()[candidate.requirement_index];
        match candidate.backing {
            Backing::Source(index) if chosen_source[candidate.requirement_index] == Some(index) => {
                let source = &store.sources()[index];
                let start = source.start_date.max(req.start_date);
                let tenor = allocatable_tenor(source, req);
                let amount = source.amount.min(req.amount);
                candidate.set_all(&mut vector, start as f64, tenor as f64, amount as f64);
            }
            Backing::BalancePool(index) if chosen_pool[candidate.requirement_index] == Some(index) => {
                candidate.set_all(
                    &mut vector,
                    req.start_date as f64,
                    req.tenor as f64,
                    req.amount as f64,
                );
            }
            _ => {}
        }
    }

    vector.reevaluate(store, candidates);
    vector
}

fn allocatable_tenor(source: &Source, req: &Requirement) -> i32 {
    window_overlap(
        source.start_date,
        source.end_date(),
        req.start_date,
        req.end_date(),
    )
}

/// `candidate` must move closer to covering the requirement on both tenor and
/// amount: grow towards it while short, shrink towards it once past.
fn fits_better(candidate: &Source, current: &Source, req: &Requirement) -> bool {
    let tenor = allocatable_tenor(candidate, req);
    let current_tenor = allocatable_tenor(current, req);
    let tenor_improves = (tenor < req.tenor && tenor > current_tenor)
        || (tenor >= req.tenor && tenor < current_tenor);
    let amount_improves = (candidate.amount < req.amount && candidate.amount > current.amount)
        || (candidate.amount >= req.amount && candidate.amount < current.amount);
    tenor_improves && amount_improves
}

/// Prefers a pool that covers `needed`, the smallest such; otherwise the largest.
fn pick_pool(remaining: &[f64], needed: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, &amount) in remaining.iter().enumerate() {
        let Some(current) = best else {
            best = Some(index);
            continue;
        };
        let covers = amount >= needed;
        let current_covers = remaining[current] >= needed;
        let smaller = amount < remaining[current];
        if (covers && !current_covers)
            || (covers && current_covers && smaller)
            || (!covers && !current_covers && !smaller)
        {
            best = Some(index);
        }
    }
    best
}
