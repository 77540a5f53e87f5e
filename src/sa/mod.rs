//! Simulated Annealing (SA).
//!
//! Single-trajectory stochastic local search over total assignments.
//! Most points in assignment space violate some clause, so constraints
//! are handled by penalty: the fitness of an assignment is its weight
//! minus a penalty per unsatisfied clause, with the penalty chosen so
//! that every feasible assignment strictly dominates every infeasible
//! one. The search is free to pass through infeasible states while
//! being pulled toward feasibility.
//!
//! Worsening moves are accepted with a probability that decreases over
//! time (temperature), allowing the search to escape local optima. The
//! final answer is the best feasible assignment ever visited, tracked
//! independently of the trajectory; failing to find one is a heuristic
//! failure, not a proof of unsatisfiability.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Lundy & Mees (1986), "Convergence of an Annealing Algorithm"

mod config;
mod runner;

pub use config::{CoolingSchedule, InitialAssignment, SaConfig};
pub use runner::{SaResult, SaRunner};
