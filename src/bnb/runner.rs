//! Branch-and-bound search loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::debug;

use super::config::BnbConfig;
use crate::formula::{ClauseStatus, Formula, PartialAssignment};
use crate::solver::Incumbent;

/// How a branch-and-bound run terminated.
///
/// The first two variants are proofs; the rest mean the search was cut
/// short and the result is only the best incumbent found so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BnbStatus {
    /// The tree was exhausted; the incumbent is the global optimum.
    Optimal,
    /// The tree was exhausted without a feasible assignment.
    Unsatisfiable,
    /// The node budget ran out.
    NodeLimitReached,
    /// The wall-clock budget ran out.
    TimeLimitReached,
    /// Cancelled externally.
    Cancelled,
}

impl BnbStatus {
    /// Whether the status carries an exhaustive-search proof.
    pub fn is_proven(&self) -> bool {
        matches!(self, BnbStatus::Optimal | BnbStatus::Unsatisfiable)
    }
}

/// Result of a branch-and-bound run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BnbResult {
    /// Termination status.
    pub status: BnbStatus,

    /// Best feasible assignment found, if any.
    pub best: Option<Incumbent>,

    /// Number of search nodes visited.
    pub nodes: usize,

    /// Number of variable assignments forced by unit propagation.
    pub propagations: usize,

    /// Number of nodes discarded by the optimistic bound.
    pub pruned: usize,

    /// Wall-clock time of the run in milliseconds.
    pub solve_time_ms: u64,

    /// Incumbent weights in the order they were found.
    ///
    /// Strictly increasing, and identical across runs over the same
    /// formula with the same variable order.
    pub incumbent_trace: Vec<u64>,
}

/// Executes the branch-and-bound search.
pub struct BnbRunner;

impl BnbRunner {
    /// Runs the search to exhaustion or until a configured budget is hit.
    pub fn run(formula: &Formula, config: &BnbConfig) -> BnbResult {
        Self::run_with_cancel(formula, config, None)
    }

    /// Runs the search with an optional cancellation token, checked once
    /// per node.
    pub fn run_with_cancel(
        formula: &Formula,
        config: &BnbConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> BnbResult {
        Search::new(formula, config, cancel).run()
    }
}

/// One branching decision: which variable, where its assignments start on
/// the trail, and whether the false branch has been tried yet.
struct Frame {
    var: usize,
    trail_mark: usize,
    flipped: bool,
}

/// Search state owned by a single run.
struct Search<'a> {
    formula: &'a Formula,
    config: &'a BnbConfig,
    cancel: Option<Arc<AtomicBool>>,
    order: Vec<usize>,
    assignment: PartialAssignment,
    /// Assigned variables in assignment order, for undo.
    trail: Vec<usize>,
    /// Σ W over variables currently assigned true.
    assigned_weight: u64,
    /// Σ W over currently unassigned variables.
    unassigned_weight: u64,
    best: Option<Incumbent>,
    incumbent_trace: Vec<u64>,
    nodes: usize,
    propagations: usize,
    pruned: usize,
    started: Instant,
}

impl<'a> Search<'a> {
    fn new(formula: &'a Formula, config: &'a BnbConfig, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            formula,
            config,
            cancel,
            order: config.variable_order.order(formula.weights()),
            assignment: PartialAssignment::new(formula.num_vars()),
            trail: Vec::with_capacity(formula.num_vars()),
            assigned_weight: 0,
            unassigned_weight: formula.total_weight(),
            best: None,
            incumbent_trace: Vec::new(),
            nodes: 0,
            propagations: 0,
            pruned: 0,
            started: Instant::now(),
        }
    }

    fn run(mut self) -> BnbResult {
        // A contradiction at the root proves unsatisfiability outright.
        if !self.propagate() {
            return self.finish(BnbStatus::Unsatisfiable);
        }

        let mut stack: Vec<Frame> = Vec::with_capacity(self.formula.num_vars());

        loop {
            self.nodes += 1;
            if let Some(status) = self.cutoff() {
                return self.finish(status);
            }

            let bounded = self
                .best
                .as_ref()
                .is_some_and(|inc| self.upper_bound() <= inc.weight);

            if bounded {
                self.pruned += 1;
            } else if let Some(var) = self.next_unassigned() {
                // Descend: true branch first, so high-weight completions
                // are reached early.
                let trail_mark = self.trail.len();
                self.assign(var, true);
                stack.push(Frame {
                    var,
                    trail_mark,
                    flipped: false,
                });
                if self.propagate() {
                    continue;
                }
                // Conflict under the true branch; backtrack below.
            } else {
                // All variables assigned and no clause falsified.
                self.record_incumbent();
            }

            // Backtrack to the deepest decision with an untried branch.
            loop {
                let Some(frame) = stack.last_mut() else {
                    let status = if self.best.is_some() {
                        BnbStatus::Optimal
                    } else {
                        BnbStatus::Unsatisfiable
                    };
                    return self.finish(status);
                };

                if frame.flipped {
                    let trail_mark = frame.trail_mark;
                    stack.pop();
                    self.undo_to(trail_mark);
                } else {
                    frame.flipped = true;
                    let (var, trail_mark) = (frame.var, frame.trail_mark);
                    self.undo_to(trail_mark);
                    self.assign(var, false);
                    if self.propagate() {
                        break;
                    }
                }
            }
        }
    }

    /// Best conceivable weight reachable from the current node: the
    /// current true-assigned weight plus every unassigned weight. Valid
    /// because no weight is negative.
    fn upper_bound(&self) -> u64 {
        self.assigned_weight + self.unassigned_weight
    }

    fn assign(&mut self, var: usize, value: bool) {
        self.assignment.assign(var, value);
        self.trail.push(var);
        let w = self.formula.weight_of(var);
        self.unassigned_weight -= w;
        if value {
            self.assigned_weight += w;
        }
    }

    fn undo_to(&mut self, trail_mark: usize) {
        while self.trail.len() > trail_mark {
            if let Some(var) = self.trail.pop() {
                let w = self.formula.weight_of(var);
                self.unassigned_weight += w;
                if self.assignment.value(var) == Some(true) {
                    self.assigned_weight -= w;
                }
                self.assignment.unassign(var);
            }
        }
    }

    /// Repeatedly classifies clauses until fixpoint: unit clauses force
    /// their remaining literal, a falsified clause aborts. Returns false
    /// on conflict.
    fn propagate(&mut self) -> bool {
        let formula = self.formula;
        loop {
            let mut changed = false;
            for clause in formula.clauses() {
                match clause.status(&self.assignment) {
                    ClauseStatus::Falsified => return false,
                    ClauseStatus::Unit(lit) => {
                        self.assign(lit.var(), lit.is_positive());
                        self.propagations += 1;
                        changed = true;
                    }
                    ClauseStatus::Satisfied | ClauseStatus::Pending => {}
                }
            }
            if !changed {
                return true;
            }
        }
    }

    fn next_unassigned(&self) -> Option<usize> {
        self.order
            .iter()
            .copied()
            .find(|&var| self.assignment.value(var).is_none())
    }

    fn record_incumbent(&mut self) {
        let weight = self.assigned_weight;
        if self.best.as_ref().is_none_or(|inc| weight > inc.weight) {
            if let Some(assignment) = self.assignment.to_total() {
                debug_assert!(self.formula.is_satisfied(&assignment));
                debug!("new incumbent: weight {weight} after {} nodes", self.nodes);
                self.incumbent_trace.push(weight);
                self.best = Some(Incumbent { weight, assignment });
            }
        }
    }

    fn cutoff(&self) -> Option<BnbStatus> {
        if self.config.node_limit > 0 && self.nodes > self.config.node_limit {
            return Some(BnbStatus::NodeLimitReached);
        }
        if let Some(limit) = self.config.time_limit_ms {
            if self.started.elapsed().as_millis() as u64 >= limit {
                return Some(BnbStatus::TimeLimitReached);
            }
        }
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Some(BnbStatus::Cancelled);
            }
        }
        None
    }

    fn finish(self, status: BnbStatus) -> BnbResult {
        debug!(
            "branch and bound finished: {status:?}, {} nodes, {} pruned",
            self.nodes, self.pruned
        );
        BnbResult {
            status,
            best: self.best,
            nodes: self.nodes,
            propagations: self.propagations,
            pruned: self.pruned,
            solve_time_ms: self.started.elapsed().as_millis() as u64,
            incumbent_trace: self.incumbent_trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bnb::VariableOrder;
    use crate::formula::{Clause, Literal};
    use proptest::prelude::*;

    fn formula(num_vars: usize, clauses: Vec<Vec<i64>>, weights: Vec<u64>) -> Formula {
        let clauses = clauses
            .into_iter()
            .map(|lits| {
                Clause::new(
                    lits.into_iter()
                        .map(|code| Literal::new(code.unsigned_abs() as usize - 1, code > 0))
                        .collect(),
                )
            })
            .collect();
        Formula::new(num_vars, clauses, weights).unwrap()
    }

    /// Reference optimum by enumerating all 2^n assignments.
    fn brute_force(f: &Formula) -> Option<u64> {
        let n = f.num_vars();
        let mut best = None;
        for mask in 0u32..1 << n {
            let assignment: Vec<bool> = (0..n).map(|i| mask >> i & 1 == 1).collect();
            if f.is_satisfied(&assignment) {
                let w = f.weight(&assignment);
                if best.is_none_or(|b| w > b) {
                    best = Some(w);
                }
            }
        }
        best
    }

    #[test]
    fn test_single_clause_optimum() {
        // (x1 ∨ ¬x2) with W = (3, 5): feasible points are (T,T)=8,
        // (T,F)=3 and (F,F)=0, so the optimum is 8.
        let f = formula(2, vec![vec![1, -2]], vec![3, 5]);
        let result = BnbRunner::run(&f, &BnbConfig::default());

        assert_eq!(result.status, BnbStatus::Optimal);
        let inc = result.best.unwrap();
        assert_eq!(inc.weight, 8);
        assert!(f.is_satisfied(&inc.assignment));
    }

    #[test]
    fn test_contradiction_is_unsat() {
        let f = formula(1, vec![vec![1], vec![-1]], vec![1]);
        let result = BnbRunner::run(&f, &BnbConfig::default());

        assert_eq!(result.status, BnbStatus::Unsatisfiable);
        assert!(result.status.is_proven());
        assert!(result.best.is_none());
        assert!(result.incumbent_trace.is_empty());
    }

    #[test]
    fn test_no_clauses_all_true() {
        let f = formula(3, vec![], vec![2, 4, 8]);
        let result = BnbRunner::run(&f, &BnbConfig::default());

        assert_eq!(result.status, BnbStatus::Optimal);
        let inc = result.best.unwrap();
        assert_eq!(inc.weight, 14);
        assert_eq!(inc.assignment, vec![true, true, true]);
    }

    #[test]
    fn test_feasible_weight_zero_is_not_unsat() {
        // Satisfiable only by setting both variables false; the optimum
        // weight is 0, which must still be reported as an incumbent.
        let f = formula(2, vec![vec![-1], vec![-2]], vec![3, 5]);
        let result = BnbRunner::run(&f, &BnbConfig::default());

        assert_eq!(result.status, BnbStatus::Optimal);
        let inc = result.best.unwrap();
        assert_eq!(inc.weight, 0);
        assert_eq!(inc.assignment, vec![false, false]);
    }

    #[test]
    fn test_unit_propagation_forces_chain() {
        // x1 forces x2 forces x3.
        let f = formula(3, vec![vec![1], vec![-1, 2], vec![-2, 3]], vec![1, 1, 1]);
        let result = BnbRunner::run(&f, &BnbConfig::default());

        assert_eq!(result.status, BnbStatus::Optimal);
        assert_eq!(result.best.unwrap().weight, 3);
        assert!(result.propagations > 0);
    }

    #[test]
    fn test_deterministic_trace() {
        let f = formula(
            4,
            vec![vec![1, 2], vec![-1, 3], vec![-2, -3], vec![3, 4]],
            vec![7, 4, 2, 5],
        );
        let config = BnbConfig::default();

        let a = BnbRunner::run(&f, &config);
        let b = BnbRunner::run(&f, &config);

        assert_eq!(a.status, b.status);
        assert_eq!(a.best.map(|inc| inc.weight), b.best.map(|inc| inc.weight));
        assert_eq!(a.incumbent_trace, b.incumbent_trace);
        assert_eq!(a.nodes, b.nodes);
    }

    #[test]
    fn test_trace_strictly_increasing() {
        let f = formula(
            4,
            vec![vec![1, 2], vec![-1, 3], vec![-2, -3], vec![3, 4]],
            vec![7, 4, 2, 5],
        );
        let result = BnbRunner::run(&f, &BnbConfig::default());

        for pair in result.incumbent_trace.windows(2) {
            assert!(pair[0] < pair[1], "trace not strictly increasing");
        }
    }

    #[test]
    fn test_orders_agree_on_optimum() {
        let f = formula(
            5,
            vec![vec![1, -2, 3], vec![-3, 4], vec![2, -5], vec![-1, 5]],
            vec![9, 1, 6, 2, 4],
        );

        let asc = BnbRunner::run(
            &f,
            &BnbConfig::default().with_variable_order(VariableOrder::Ascending),
        );
        let desc = BnbRunner::run(
            &f,
            &BnbConfig::default().with_variable_order(VariableOrder::DescendingWeight),
        );

        assert_eq!(asc.status, BnbStatus::Optimal);
        assert_eq!(desc.status, BnbStatus::Optimal);
        assert_eq!(
            asc.best.unwrap().weight,
            desc.best.unwrap().weight
        );
    }

    #[test]
    fn test_node_limit_degrades_guarantee() {
        let f = formula(
            6,
            vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![-1, -3], vec![-2, -5]],
            vec![1, 2, 3, 4, 5, 6],
        );
        let result = BnbRunner::run(&f, &BnbConfig::default().with_node_limit(1));

        assert_eq!(result.status, BnbStatus::NodeLimitReached);
        assert!(!result.status.is_proven());
    }

    #[test]
    fn test_cancellation() {
        let f = formula(2, vec![vec![1, 2]], vec![1, 1]);
        // Flag set up front, so the very first node observes it.
        let cancel = Arc::new(AtomicBool::new(true));

        let result = BnbRunner::run_with_cancel(&f, &BnbConfig::default(), Some(cancel));
        assert_eq!(result.status, BnbStatus::Cancelled);
        assert!(!result.status.is_proven());
    }

    fn small_formula() -> impl Strategy<Value = Formula> {
        (1usize..=5).prop_flat_map(|n| {
            let literal =
                (0..n, any::<bool>()).prop_map(|(var, positive)| Literal::new(var, positive));
            let clause = prop::collection::vec(literal, 1..=3).prop_map(Clause::new);
            let clauses = prop::collection::vec(clause, 0..=8);
            let weights = prop::collection::vec(0u64..=20, n);
            (clauses, weights)
                .prop_map(move |(clauses, weights)| Formula::new(n, clauses, weights).unwrap())
        })
    }

    proptest! {
        #[test]
        fn prop_agrees_with_brute_force(f in small_formula()) {
            let result = BnbRunner::run(&f, &BnbConfig::default());
            match brute_force(&f) {
                Some(weight) => {
                    prop_assert_eq!(result.status, BnbStatus::Optimal);
                    let inc = result.best.unwrap();
                    prop_assert_eq!(inc.weight, weight);
                    prop_assert!(f.is_satisfied(&inc.assignment));
                }
                None => {
                    prop_assert_eq!(result.status, BnbStatus::Unsatisfiable);
                    prop_assert!(result.best.is_none());
                }
            }
        }

        #[test]
        fn prop_orders_agree(f in small_formula()) {
            let asc = BnbRunner::run(
                &f,
                &BnbConfig::default().with_variable_order(VariableOrder::Ascending),
            );
            let desc = BnbRunner::run(
                &f,
                &BnbConfig::default().with_variable_order(VariableOrder::DescendingWeight),
            );
            prop_assert_eq!(asc.status, desc.status);
            prop_assert_eq!(
                asc.best.map(|inc| inc.weight),
                desc.best.map(|inc| inc.weight)
            );
        }
    }
}
