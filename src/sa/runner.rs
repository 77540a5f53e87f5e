//! SA execution loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::{CoolingSchedule, InitialAssignment, SaConfig};
use crate::formula::Formula;
use crate::solver::{Incumbent, SolverError};

/// Result of a simulated-annealing run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SaResult {
    /// Best feasible assignment ever visited, if any.
    ///
    /// `None` means no feasible state was found within the budget; this
    /// says nothing about satisfiability.
    pub best: Option<Incumbent>,

    /// Total number of moves attempted.
    pub iterations: usize,

    /// Number of temperature steps executed.
    pub temperature_steps: usize,

    /// Number of accepted moves (including improvements).
    pub accepted_moves: usize,

    /// Number of fitness-improving moves.
    pub improving_moves: usize,

    /// Temperature when the run stopped.
    pub final_temperature: f64,

    /// Whether the stall limit ended the run.
    pub stalled: bool,

    /// Whether cancelled externally.
    pub cancelled: bool,

    /// Best feasible weight each time the incumbent improved.
    ///
    /// Strictly increasing by construction.
    pub weight_history: Vec<u64>,
}

/// Executes the simulated-annealing search.
pub struct SaRunner;

impl SaRunner {
    /// Runs a single annealing trajectory.
    pub fn run(formula: &Formula, config: &SaConfig) -> Result<SaResult, SolverError> {
        Self::run_with_cancel(formula, config, None)
    }

    /// Runs with an optional cancellation token, checked once per
    /// temperature step.
    pub fn run_with_cancel(
        formula: &Formula,
        config: &SaConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SaResult, SolverError> {
        let penalty = resolve_penalty(formula, config)?;
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(run_trajectory(formula, config, penalty, seed, cancel))
    }

    /// Runs `restarts` independent trajectories and keeps the result with
    /// the heaviest feasible incumbent (the first such on ties).
    ///
    /// Each restart derives its own seed from the configured one, so a
    /// seeded multi-restart run is still reproducible. With the
    /// `parallel` feature the trajectories run on the rayon thread pool;
    /// each owns its state and shares only the read-only formula.
    pub fn run_restarts(
        formula: &Formula,
        config: &SaConfig,
        restarts: usize,
    ) -> Result<SaResult, SolverError> {
        let penalty = resolve_penalty(formula, config)?;
        let seeds: Vec<u64> = (0..restarts)
            .map(|i| match config.seed {
                Some(seed) => seed.wrapping_add((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                None => rand::random(),
            })
            .collect();

        #[cfg(feature = "parallel")]
        let results: Vec<SaResult> = {
            use rayon::prelude::*;
            seeds
                .par_iter()
                .map(|&seed| run_trajectory(formula, config, penalty, seed, None))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<SaResult> = seeds
            .iter()
            .map(|&seed| run_trajectory(formula, config, penalty, seed, None))
            .collect();

        results
            .into_iter()
            .reduce(|best, candidate| {
                let better = candidate.best.as_ref().map(|inc| inc.weight)
                    > best.best.as_ref().map(|inc| inc.weight);
                if better {
                    candidate
                } else {
                    best
                }
            })
            .ok_or_else(|| SolverError::InvalidConfig("restarts must be at least 1".into()))
    }
}

/// Fitness of an assignment: weight minus `penalty` per unsatisfied
/// clause. Exact in `i128`; any feasible assignment scores at least 0,
/// any infeasible one below it when the penalty exceeds the total weight.
fn fitness(weight: u64, unsatisfied: usize, penalty: u64) -> i128 {
    weight as i128 - penalty as i128 * unsatisfied as i128
}

/// Validates the configuration against the formula and resolves the
/// effective penalty.
fn resolve_penalty(formula: &Formula, config: &SaConfig) -> Result<u64, SolverError> {
    config.validate().map_err(SolverError::InvalidConfig)?;
    let penalty = config
        .penalty
        .unwrap_or_else(|| formula.total_weight() + 1);
    if penalty <= formula.total_weight() {
        return Err(SolverError::InvalidConfig(format!(
            "penalty {penalty} must exceed the total formula weight {}",
            formula.total_weight()
        )));
    }
    Ok(penalty)
}

/// Current assignment plus per-clause true-literal counts, so a flip is
/// evaluated in time proportional to the variable's clause degree.
struct Trajectory<'a> {
    formula: &'a Formula,
    assignment: Vec<bool>,
    true_counts: Vec<u32>,
    unsatisfied: usize,
    weight: u64,
}

impl<'a> Trajectory<'a> {
    fn new(formula: &'a Formula, assignment: Vec<bool>) -> Self {
        let true_counts: Vec<u32> = formula
            .clauses()
            .iter()
            .map(|clause| {
                clause
                    .literals()
                    .iter()
                    .filter(|lit| lit.evaluate(assignment[lit.var()]))
                    .count() as u32
            })
            .collect();
        let unsatisfied = true_counts.iter().filter(|&&count| count == 0).count();
        let weight = formula.weight(&assignment);
        Self {
            formula,
            assignment,
            true_counts,
            unsatisfied,
            weight,
        }
    }

    /// Flips one variable, updating counts, unsatisfied-clause total, and
    /// weight. Self-inverse, so a rejected move is undone by flipping
    /// again.
    fn flip(&mut self, var: usize) {
        let new_value = !self.assignment[var];
        for &(clause, positive) in self.formula.occurrences(var) {
            if positive == new_value {
                self.true_counts[clause] += 1;
                if self.true_counts[clause] == 1 {
                    self.unsatisfied -= 1;
                }
            } else {
                self.true_counts[clause] -= 1;
                if self.true_counts[clause] == 0 {
                    self.unsatisfied += 1;
                }
            }
        }
        let w = self.formula.weight_of(var);
        if new_value {
            self.weight += w;
        } else {
            self.weight -= w;
        }
        self.assignment[var] = new_value;
    }

    fn fitness(&self, penalty: u64) -> i128 {
        fitness(self.weight, self.unsatisfied, penalty)
    }
}

fn initial_assignment(formula: &Formula, config: &SaConfig, rng: &mut StdRng) -> Vec<bool> {
    match config.initial {
        InitialAssignment::Random => (0..formula.num_vars()).map(|_| rng.random()).collect(),
        InitialAssignment::AllFalse => vec![false; formula.num_vars()],
    }
}

fn cool(temperature: f64, cooling: &CoolingSchedule) -> f64 {
    match cooling {
        CoolingSchedule::Geometric { alpha } => temperature * alpha,
        CoolingSchedule::LundyMees { beta } => temperature / (1.0 + beta * temperature),
    }
}

fn run_trajectory(
    formula: &Formula,
    config: &SaConfig,
    penalty: u64,
    seed: u64,
    cancel: Option<Arc<AtomicBool>>,
) -> SaResult {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut trajectory = Trajectory::new(formula, initial_assignment(formula, config, &mut rng));
    let mut current_fitness = trajectory.fitness(penalty);

    let mut best: Option<Incumbent> = None;
    let mut weight_history = Vec::new();
    if trajectory.unsatisfied == 0 {
        weight_history.push(trajectory.weight);
        best = Some(Incumbent {
            weight: trajectory.weight,
            assignment: trajectory.assignment.clone(),
        });
    }

    let mut temperature = config.initial_temperature;
    let mut iterations = 0usize;
    let mut temperature_steps = 0usize;
    let mut accepted_moves = 0usize;
    let mut improving_moves = 0usize;
    let mut stall = 0usize;
    let mut stalled = false;
    let mut cancelled = false;

    'outer: while formula.num_vars() > 0 && temperature > config.min_temperature {
        if let Some(ref flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
        }

        let inner_iters = match config.cooling {
            CoolingSchedule::LundyMees { .. } => 1,
            _ => config.iterations_per_temperature,
        };

        let mut improved_this_step = false;

        for _ in 0..inner_iters {
            if config.max_iterations > 0 && iterations >= config.max_iterations {
                break 'outer;
            }
            iterations += 1;

            // Single-bit-flip neighbor, variable chosen uniformly.
            let var = rng.random_range(0..formula.num_vars());
            trajectory.flip(var);
            let candidate_fitness = trajectory.fitness(penalty);
            let delta = candidate_fitness - current_fitness;

            // Metropolis criterion: an equal-or-better move is always
            // taken, a worse one with probability exp(Δ/T).
            let accept = if delta >= 0 {
                if delta > 0 {
                    improving_moves += 1;
                }
                true
            } else {
                rng.random_range(0.0..1.0) < (delta as f64 / temperature).exp()
            };

            if accept {
                accepted_moves += 1;
                current_fitness = candidate_fitness;

                let improves_best = trajectory.unsatisfied == 0
                    && best.as_ref().is_none_or(|inc| trajectory.weight > inc.weight);
                if improves_best {
                    debug!(
                        "new best feasible weight {} at iteration {iterations}",
                        trajectory.weight
                    );
                    weight_history.push(trajectory.weight);
                    best = Some(Incumbent {
                        weight: trajectory.weight,
                        assignment: trajectory.assignment.clone(),
                    });
                    improved_this_step = true;
                }
            } else {
                trajectory.flip(var);
            }
        }

        temperature = cool(temperature, &config.cooling);
        temperature_steps += 1;

        if improved_this_step {
            stall = 0;
        } else if config.stall_limit > 0 {
            stall += 1;
            if stall >= config.stall_limit {
                stalled = true;
                break;
            }
        }
    }

    debug!(
        "annealing finished: best {:?}, {iterations} iterations, {temperature_steps} steps",
        best.as_ref().map(|inc| inc.weight)
    );

    SaResult {
        best,
        iterations,
        temperature_steps,
        accepted_moves,
        improving_moves,
        final_temperature: temperature,
        stalled,
        cancelled,
        weight_history,
    }
}
