//! Weighted MAX-SAT solvers over a shared CNF formula model.
//!
//! Given a formula in conjunctive normal form over `n` variables and a
//! non-negative weight per variable, the goal is a satisfying assignment
//! that maximizes the summed weight of the variables set to true.
//!
//! Two search engines are provided:
//!
//! - **Branch and Bound** ([`bnb`]): exact depth-first search over partial
//!   assignments with unit propagation and optimistic-bound pruning.
//!   Exhaustive completion proves either the optimum or unsatisfiability.
//! - **Simulated Annealing** ([`sa`]): single-trajectory stochastic local
//!   search with penalty-based constraint handling. Scales far beyond
//!   exact reach, but its result carries no optimality proof.
//!
//! Both engines consume the same immutable [`formula::Formula`] and report
//! through the common [`solver::Solver`] interface, so callers can swap
//! engines without depending on engine internals. The [`dimacs`] module
//! parses DIMACS-CNF extended with a `w` weight line.
//!
//! # Example
//!
//! ```
//! use wmaxsat::dimacs;
//! use wmaxsat::bnb::{BnbConfig, BnbRunner, BnbStatus};
//!
//! let formula = dimacs::parse_str(
//!     "p cnf 2 1\n\
//!      w 3 5 0\n\
//!      1 -2 0\n",
//! ).unwrap();
//!
//! let result = BnbRunner::run(&formula, &BnbConfig::default());
//! assert_eq!(result.status, BnbStatus::Optimal);
//! assert_eq!(result.best.unwrap().weight, 8);
//! ```

pub mod bnb;
pub mod dimacs;
pub mod formula;
pub mod sa;
pub mod solver;
