use super::candidate::{AllocationCandidate, Backing};
use super::store::EntityStore;
use super::vector::DecisionVector;

/// A time-bounded draw of `amount` on one capacity-limited resource.
#[derive(Copy, Clone, Debug)]
struct Draw {
    start: f64,
    end: f64,
    resource: usize,
    amount: f64,
}

/// Total constraint violation of `vector`; `0.0` means feasible.
///
/// Bound breaches (Pass A) and concurrent over-commitment of sources, balance
/// pools and requirements (Pass B) are both graded, so a vector closer to
/// feasibility always scores lower.
pub fn measure_violation(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
) -> f64 {
    bound_violation(store, candidates, vector) + capacity_violation(store, candidates, vector)
}

/// Pass A: each used candidate on its own.
pub fn bound_violation(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
) -> f64 {
    let mut penalty = 0.0;
    for candidate in candidates {
        if candidate.is_degenerate(vector) {
            continue;
        }
        let start = candidate.start(vector);
        let tenor = candidate.tenor(vector);
        let amount = candidate.amount(vector);
        let end = start + tenor;

        let req = &store.requirements()[candidate.requirement_index];
        let overlap = end.min(req.end_date() as f64) - start.max(req.start_date as f64);
        if overlap < 1.0 {
            penalty += amount * tenor;
        }

        match candidate.backing {
            Backing::Source(index) => {
                let source = &store.sources()[index];
                let before = (source.start_date as f64 - start).max(0.0);
                let after = (end - source.end_date() as f64).max(0.0);
                penalty += (before + after) * amount;
                penalty += (amount - source.amount as f64).max(0.0) * tenor;
            }
            Backing::BalancePool(index) => {
                let pool = &store.balance_pools()[index];
                penalty += (amount - pool.amount).max(0.0) * tenor;
            }
        }
    }
    penalty
}

/// Pass B: sweep over start/end events of all used candidates.
///
/// Resources are every source and balance pool (drawn for the realized window)
/// and every requirement (drawn only inside the requirement window, capacity =
/// requirement amount). At equal instants ends are processed before starts.
pub fn capacity_violation(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
) -> f64 {
    let source_count = store.sources().len();
    let pool_base = source_count;
    let requirement_base = pool_base + store.balance_pools().len();

    let mut capacity: Vec<f64> = Vec::with_capacity(requirement_base + store.requirements().len());
    capacity.extend(store.sources().iter().map(|s| s.amount as f64));
    capacity.extend(store.balance_pools().iter().map(|p| p.amount));
    capacity.extend(store.requirements().iter().map(|r| r.amount as f64));

    let mut draws = Vec::with_capacity(candidates.len() * 2);
    for candidate in candidates {
        if candidate.is_degenerate(vector) {
            continue;
        }
        let start = candidate.start(vector);
        let end = candidate.end(vector);
        let amount = candidate.amount(vector);

        let resource = match candidate.backing {
            Backing::Source(index) => index,
            Backing::BalancePool(index) => pool_base + index,
        };
        draws.push(Draw {
            start,
            end,
            resource,
            amount,
        });

        let req = &store.requirements()[candidate.requirement_index];
        let covered_start = start.max(req.start_date as f64);
        let covered_end = end.min(req.end_date() as f64);
        if covered_end > covered_start {
            draws.push(Draw {
                start: covered_start,
                end: covered_end,
                resource: requirement_base + candidate.requirement_index,
                amount,
            });
        }
    }

    sweep(&draws, capacity)
}

fn sweep(draws: &[Draw], mut remaining: Vec<f64>) -> f64 {
    let count = draws.len();
    let mut by_start: Vec<usize> = (0..count).collect();
    by_start.sort_by(|&a, &b| draws[a].start.total_cmp(&draws[b].start));
    let mut by_end: Vec<usize> = (0..count).collect();
    by_end.sort_by(|&a, &b| draws[a].end.total_cmp(&draws[b].end));

    let mut active = vec![false; count];
    let mut start_cursor = 0;
    let mut end_cursor = 0;
    let mut penalty = 0.0;

    while start_cursor < count || end_cursor < count {
        let next_start = by_start
            .get(start_cursor)
            .map_or(f64::INFINITY, |&i| draws[i].start);
        let next_end = by_end
            .get(end_cursor)
            .map_or(f64::INFINITY, |&i| draws[i].end);

        if end_cursor < count && (start_cursor == count || next_end <= next_start) {
            let index = by_end[end_cursor];
            end_cursor += 1;
            debug_assert!(active[index], "draw {index} ended before it started");
            active[index] = false;
            let draw = &draws[index];
            remaining[draw.resource] += draw.amount;
        } else {
            let index = by_start[start_cursor];
            start_cursor += 1;
            active[index] = true;
            let draw = &draws[index];
            remaining[draw.resource] -= draw.amount;
            if remaining[draw.resource] < 0.0 {
                penalty += (draw.end - draw.start) * -remaining[draw.resource];
            }
        }
    }

    penalty
}
