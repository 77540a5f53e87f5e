//! Common solver surface shared by both engines.
//!
//! Callers that do not care which engine runs program against [`Solver`]
//! and [`SolveOutcome`]; everything engine-specific (statuses, statistics,
//! traces) stays behind the engine's own result type.

use std::fmt;

use crate::bnb::{BnbConfig, BnbRunner, BnbStatus};
use crate::formula::Formula;
use crate::sa::{SaConfig, SaRunner};

/// The best feasible assignment found so far by a search, with its weight.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Incumbent {
    /// Summed weight of the variables set true.
    pub weight: u64,
    /// The satisfying assignment, one value per variable.
    pub assignment: Vec<bool>,
}

/// Engine-independent outcome of a solve.
///
/// The proven outcomes (`Optimal`, `Unsatisfiable`) are only ever produced
/// by exhaustive branch and bound; the heuristic engine and any
/// budget-limited run report the unproven variants.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveOutcome {
    /// Proven optimum from an exhausted search.
    Optimal(Incumbent),
    /// Best feasible assignment found; optimality unproven.
    Feasible(Incumbent),
    /// Proven unsatisfiable from an exhausted search.
    Unsatisfiable,
    /// No feasible assignment was found. For a heuristic engine this is a
    /// search failure, not evidence of unsatisfiability.
    NoFeasibleFound,
}

impl SolveOutcome {
    /// The incumbent, if any feasible assignment was found.
    pub fn incumbent(&self) -> Option<&Incumbent> {
        match self {
            SolveOutcome::Optimal(inc) | SolveOutcome::Feasible(inc) => Some(inc),
            _ => None,
        }
    }

    /// Whether this outcome is backed by an exhaustive-search proof.
    pub fn is_proven(&self) -> bool {
        matches!(
            self,
            SolveOutcome::Optimal(_) | SolveOutcome::Unsatisfiable
        )
    }
}

/// Errors reported by a solver before its search loop starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The configuration failed validation.
    InvalidConfig(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for SolverError {}

/// A search engine for weighted MAX-SAT.
///
/// Implementations are synchronous and blocking: `solve` returns when the
/// search terminates, and all search state is owned by the call.
pub trait Solver {
    /// Runs the search over `formula`.
    fn solve(&self, formula: &Formula) -> Result<SolveOutcome, SolverError>;
}

/// Exact branch-and-bound engine behind the [`Solver`] interface.
#[derive(Debug, Clone, Default)]
pub struct BnbSolver {
    /// Engine configuration.
    pub config: BnbConfig,
}

impl BnbSolver {
    /// Creates a solver with the given configuration.
    pub fn new(config: BnbConfig) -> Self {
        Self { config }
    }
}

impl Solver for BnbSolver {
    fn solve(&self, formula: &Formula) -> Result<SolveOutcome, SolverError> {
        let result = BnbRunner::run(formula, &self.config);
        Ok(match (result.status, result.best) {
            (BnbStatus::Optimal, Some(inc)) => SolveOutcome::Optimal(inc),
            (BnbStatus::Unsatisfiable, _) => SolveOutcome::Unsatisfiable,
            (_, Some(inc)) => SolveOutcome::Feasible(inc),
            (_, None) => SolveOutcome::NoFeasibleFound,
        })
    }
}

/// Simulated-annealing engine behind the [`Solver`] interface.
#[derive(Debug, Clone, Default)]
pub struct SaSolver {
    /// Engine configuration.
    pub config: SaConfig,
}

impl SaSolver {
    /// Creates a solver with the given configuration.
    pub fn new(config: SaConfig) -> Self {
        Self { config }
    }
}

impl Solver for SaSolver {
    fn solve(&self, formula: &Formula) -> Result<SolveOutcome, SolverError> {
        let result = SaRunner::run(formula, &self.config)?;
        Ok(match result.best {
            Some(inc) => SolveOutcome::Feasible(inc),
            None => SolveOutcome::NoFeasibleFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Clause, Literal};
    use crate::sa::SaConfig;

    fn example() -> Formula {
        // (x0 ∨ ¬x1), weights (3, 5); optimum weight 8
        Formula::new(
            2,
            vec![Clause::new(vec![
                Literal::positive(0),
                Literal::negative(1),
            ])],
            vec![3, 5],
        )
        .unwrap()
    }

    fn contradiction() -> Formula {
        Formula::new(
            1,
            vec![
                Clause::new(vec![Literal::positive(0)]),
                Clause::new(vec![Literal::negative(0)]),
            ],
            vec![1],
        )
        .unwrap()
    }

    #[test]
    fn test_engines_swap_behind_trait() {
        let formula = example();
        let solvers: Vec<Box<dyn Solver>> = vec![
            Box::new(BnbSolver::default()),
            Box::new(SaSolver::new(SaConfig::default().with_seed(7))),
        ];

        for solver in &solvers {
            let outcome = solver.solve(&formula).unwrap();
            let inc = outcome.incumbent().expect("feasible instance");
            assert_eq!(inc.weight, 8);
            assert!(formula.is_satisfied(&inc.assignment));
        }
    }

    #[test]
    fn test_proven_vs_unproven_outcomes() {
        let formula = example();

        let exact = BnbSolver::default().solve(&formula).unwrap();
        assert!(exact.is_proven());
        assert!(matches!(exact, SolveOutcome::Optimal(_)));

        let heuristic = SaSolver::new(SaConfig::default().with_seed(7))
            .solve(&formula)
            .unwrap();
        assert!(!heuristic.is_proven());
        assert!(matches!(heuristic, SolveOutcome::Feasible(_)));
    }

    #[test]
    fn test_unsat_vs_no_feasible_found() {
        let formula = contradiction();

        let exact = BnbSolver::default().solve(&formula).unwrap();
        assert_eq!(exact, SolveOutcome::Unsatisfiable);
        assert!(exact.is_proven());

        let heuristic = SaSolver::new(SaConfig::default().with_seed(7))
            .solve(&formula)
            .unwrap();
        assert_eq!(heuristic, SolveOutcome::NoFeasibleFound);
        assert!(!heuristic.is_proven());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SaConfig::default().with_initial_temperature(-1.0);
        let err = SaSolver::new(config).solve(&example()).unwrap_err();
        assert!(matches!(err, SolverError::InvalidConfig(_)));
    }
}
