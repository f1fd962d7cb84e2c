//! 0/1 knapsack over segments: which ones stay resident.
//!
//! Items are segments, weights are their memory footprints in bytes and the
//! capacity is the memory budget. Budgets are byte counts that can be far
//! too large for one table cell per byte, so the capacity axis is
//! discretized:
//!
//! ```text
//! unit     = max(min_capacity_unit, ceil(budget / (cells_per_row - 1)))
//! capacity = floor(budget / unit)          (rounded down)
//! weight_i = ceil(cost_i / unit)           (rounded up)
//! ```
//!
//! Rounding the capacity down and the weights up keeps every selection the
//! table produces within the real budget. The price is optimality: the
//! selection can lose items whose combined footprint is below
//! `(n + 1) × unit` bytes compared to the exact optimum. The table is exact
//! (unit of one byte) while `budget × n` stays below the cell limit.
//!
//! A density-ordered greedy pass runs alongside the table and wins when it
//! finds a strictly better selection, which covers the cases where coarse
//! units hurt most.

use std::cmp::Ordering;

use tracing::debug;

/// Default limit on decision-table cells (`items × capacity cells`).
pub const DEFAULT_MAX_DP_CELLS: usize = 1 << 26;

/// How a [`Selection`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStrategy {
    /// Everything fits; no optimization needed.
    TakeAll,
    /// No item has a positive value and fits the budget.
    Empty,
    DynamicProgramming,
    Greedy,
}

/// Result of [`KnapsackSolver::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Selected item indices, ascending.
    pub indices: Vec<usize>,
    pub total_value: f64,
    pub total_cost: u64,
    /// Capacity unit the table ran with (1 when no table was needed).
    pub capacity_unit: u64,
    pub strategy: SolveStrategy,
}

impl Selection {
    fn new(
        indices: Vec<usize>,
        values: &[f64],
        costs: &[u64],
        unit: u64,
        strategy: SolveStrategy,
    ) -> Self {
        let total_value = indices.iter().map(|&i| values[i]).sum();
        let total_cost = indices.iter().map(|&i| costs[i]).fold(0u64, u64::saturating_add);
        Self {
            indices,
            total_value,
            total_cost,
            capacity_unit: unit,
            strategy,
        }
    }

    /// Whether item `index` was selected.
    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }
}

/// Chooses the resident set.
#[derive(Debug, Clone)]
pub struct KnapsackSolver {
    min_capacity_unit: u64,
    max_dp_cells: usize,
}

impl Default for KnapsackSolver {
    fn default() -> Self {
        Self::new(1)
    }
}

impl KnapsackSolver {
    /// Create a solver whose capacity unit is at least `min_capacity_unit` bytes.
    pub fn new(min_capacity_unit: u64) -> Self {
        Self {
            min_capacity_unit: min_capacity_unit.max(1),
            max_dp_cells: DEFAULT_MAX_DP_CELLS,
        }
    }

    /// Limit the decision table to `max_dp_cells` cells.
    pub fn with_max_dp_cells(mut self, max_dp_cells: usize) -> Self {
        self.max_dp_cells = max_dp_cells.max(2);
        self
    }

    /// Select the items to keep resident.
    ///
    /// Items whose value is not a positive finite number are never selected
    /// unless everything fits. The total cost of the selection never exceeds
    /// `budget`.
    ///
    /// # Panics
    /// Panics if `values` and `costs` differ in length.
    pub fn solve(&self, budget: u64, values: &[f64], costs: &[u64]) -> Selection {
        assert_eq!(values.len(), costs.len(), "one cost per value");

        let total = costs.iter().copied().fold(0u64, u64::saturating_add);
        if total <= budget {
            let all = (0..costs.len()).collect();
            return Selection::new(all, values, costs, 1, SolveStrategy::TakeAll);
        }

        let candidates: Vec<usize> = (0..values.len())
            .filter(|&i| values[i].is_finite() && values[i] > 0.0 && costs[i] <= budget)
            .collect();
        if candidates.is_empty() {
            return Selection::new(Vec::new(), values, costs, 1, SolveStrategy::Empty);
        }

        let table = self.solve_table(budget, values, costs, &candidates);
        let greedy = Self::solve_greedy(budget, values, costs, &candidates, table.capacity_unit);

        let selection = if greedy.total_value > table.total_value {
            greedy
        } else {
            table
        };

        assert!(
            selection.total_cost <= budget,
            "selection cost {} exceeds budget {}",
            selection.total_cost,
            budget
        );
        debug!(
            items = values.len(),
            candidates = candidates.len(),
            selected = selection.indices.len(),
            unit = selection.capacity_unit,
            strategy = ?selection.strategy,
            "solved knapsack"
        );
        selection
    }

    fn capacity_unit(&self, capacity: u64, items: usize) -> u64 {
        let cells_per_row = (self.max_dp_cells / items.max(1)).max(2) as u64;
        capacity
            .div_ceil(cells_per_row - 1)
            .max(self.min_capacity_unit)
    }

    fn solve_table(
        &self,
        budget: u64,
        values: &[f64],
        costs: &[u64],
        candidates: &[usize],
    ) -> Selection {
        let candidate_cost = candidates
            .iter()
            .map(|&i| costs[i])
            .fold(0u64, u64::saturating_add);
        let capacity = budget.min(candidate_cost);

        let unit = self.capacity_unit(capacity, candidates.len());
        let slots = (capacity / unit) as usize;
        let weights: Vec<usize> = candidates
            .iter()
            .map(|&i| costs[i].div_ceil(unit) as usize)
            .collect();

        let row = slots + 1;
        let mut best = vec![0.0f64; row];
        let mut taken = BitTable::new(candidates.len(), row);

        for (item, (&index, &weight)) in candidates.iter().zip(&weights).enumerate() {
            if weight > slots {
                continue;
            }
            let value = values[index];
            for slot in (weight..=slots).rev() {
                let candidate = best[slot - weight] + value;
                // Strict: on ties the lower-index item keeps the slot
                if candidate > best[slot] {
                    best[slot] = candidate;
                    taken.set(item, slot);
                }
            }
        }

        let mut selected = Vec::new();
        let mut slot = slots;
        for item in (0..candidates.len()).rev() {
            if taken.get(item, slot) {
                selected.push(candidates[item]);
                slot -= weights[item];
            }
        }
        selected.sort_unstable();

        Selection::new(selected, values, costs, unit, SolveStrategy::DynamicProgramming)
    }

    fn solve_greedy(
        budget: u64,
        values: &[f64],
        costs: &[u64],
        candidates: &[usize],
        unit: u64,
    ) -> Selection {
        let density = |i: usize| {
            if costs[i] == 0 {
                f64::INFINITY
            } else {
                values[i] / costs[i] as f64
            }
        };

        let mut order = candidates.to_vec();
        order.sort_by(|&a, &b| {
            density(b)
                .partial_cmp(&density(a))
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut remaining = budget;
        let mut selected = Vec::new();
        for i in order {
            if costs[i] <= remaining {
                remaining -= costs[i];
                selected.push(i);
            }
        }
        selected.sort_unstable();

        Selection::new(selected, values, costs, unit, SolveStrategy::Greedy)
    }
}

/// Row-major bitset of take/skip decisions.
struct BitTable {
    bits: Vec<u64>,
    row: usize,
}

impl BitTable {
    fn new(rows: usize, row: usize) -> Self {
        Self {
            bits: vec![0; (rows * row).div_ceil(64)],
            row,
        }
    }

    #[inline]
    fn set(&mut self, item: usize, slot: usize) {
        let bit = item * self.row + slot;
        self.bits[bit / 64] |= 1 << (bit % 64);
    }

    #[inline]
    fn get(&self, item: usize, slot: usize) -> bool {
        let bit = item * self.row + slot;
        self.bits[bit / 64] & (1 << (bit % 64)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn brute_force(budget: u64, values: &[f64], costs: &[u64]) -> f64 {
        let n = values.len();
        let mut best = 0.0f64;
        for mask in 0u32..(1 << n) {
            let mut cost = 0u64;
            let mut value = 0.0;
            for i in 0..n {
                if mask & (1 << i) != 0 && values[i] > 0.0 {
                    cost += costs[i];
                    value += values[i];
                }
            }
            if cost <= budget && value > best {
                best = value;
            }
        }
        best
    }

    #[test]
    fn test_everything_fits() {
        let selection =
            KnapsackSolver::default().solve(1000, &[1.0, -5.0, 0.0], &[100, 200, 300]);
        assert_eq!(selection.indices, vec![0, 1, 2]);
        assert_eq!(selection.strategy, SolveStrategy::TakeAll);
        assert_eq!(selection.total_cost, 600);
    }

    #[test]
    fn test_three_segment_example() {
        let solver = KnapsackSolver::default();
        let values = [10.0, 15.0, 1.0];
        let costs = [100, 200, 50];

        // 0 + 1 cost 300, which does not fit 250
        let selection = solver.solve(250, &values, &costs);
        assert_eq!(selection.indices, vec![1, 2]);
        assert_eq!(selection.total_value, 16.0);
        assert_eq!(selection.total_cost, 250);

        let selection = solver.solve(300, &values, &costs);
        assert_eq!(selection.indices, vec![0, 1]);
        assert!(!selection.contains(2));
    }

    #[test]
    fn test_zero_budget() {
        let selection = KnapsackSolver::default().solve(0, &[5.0, 3.0], &[10, 0]);
        assert_eq!(selection.indices, vec![1]);
        assert_eq!(selection.total_cost, 0);
    }

    #[test]
    fn test_no_candidates() {
        let selection =
            KnapsackSolver::default().solve(10, &[-1.0, f64::NAN, 2.0], &[5, 5, 50]);
        assert!(selection.indices.is_empty());
        assert_eq!(selection.strategy, SolveStrategy::Empty);
    }

    #[test]
    fn test_empty_input() {
        let selection = KnapsackSolver::default().solve(0, &[], &[]);
        assert!(selection.indices.is_empty());
        assert_eq!(selection.total_cost, 0);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let selection =
            KnapsackSolver::default().solve(100, &[5.0, 5.0, 5.0], &[100, 100, 100]);
        assert_eq!(selection.indices, vec![0]);
    }

    #[test]
    fn test_large_budget_discretizes() {
        let solver = KnapsackSolver::default().with_max_dp_cells(1024);
        let costs: Vec<u64> = (0..64).map(|i| (i + 1) * 1_000_000).collect();
        let values: Vec<f64> = (0..64).map(|i| (64 - i) as f64).collect();
        let budget = 100_000_000;

        let selection = solver.solve(budget, &values, &costs);
        assert!(selection.capacity_unit > 1);
        assert!(selection.total_cost <= budget);
        assert!(!selection.indices.is_empty());
    }

    #[test]
    #[should_panic(expected = "one cost per value")]
    fn test_length_mismatch_panics() {
        KnapsackSolver::default().solve(10, &[1.0], &[]);
    }

    proptest! {
        #[test]
        fn prop_matches_brute_force(
            items in prop::collection::vec((0u64..60, -5.0f64..50.0), 0..10),
            budget in 0u64..300,
        ) {
            let costs: Vec<u64> = items.iter().map(|&(c, _)| c).collect();
            let values: Vec<f64> = items.iter().map(|&(_, v)| v).collect();

            let selection = KnapsackSolver::default().solve(budget, &values, &costs);
            prop_assert!(selection.total_cost <= budget);

            if selection.strategy != SolveStrategy::TakeAll {
                let optimum = brute_force(budget, &values, &costs);
                prop_assert!((selection.total_value - optimum).abs() < 1e-6);
            }
        }

        #[test]
        fn prop_coarse_units_stay_within_budget(
            costs in prop::collection::vec(1u64..10_000_000, 1..40),
            budget in 1u64..50_000_000,
            cells in 16usize..512,
        ) {
            let values: Vec<f64> = costs.iter().map(|&c| (c % 97) as f64 + 1.0).collect();
            let selection = KnapsackSolver::default()
                .with_max_dp_cells(cells)
                .solve(budget, &values, &costs);
            prop_assert!(selection.total_cost <= budget);
            prop_assert!(selection.indices.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
