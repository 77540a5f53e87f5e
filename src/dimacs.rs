//! DIMACS-CNF input extended with a weight line.
//!
//! The accepted format is the usual DIMACS CNF — `c` comments, an
//! optional `p cnf <vars> <clauses>` header, clauses as whitespace
//! separated non-zero integers terminated by `0`, an optional `%`
//! end-of-formula marker — plus one weight line
//!
//! ```text
//! w w_1 w_2 ... w_n 0
//! ```
//!
//! giving the non-negative weight of each variable. A file without a
//! weight line parses as plain MAX-SAT with every weight 1.
//!
//! Parsing is the only I/O in the crate; the search engines consume the
//! resulting [`Formula`] and nothing else.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::formula::{Clause, Formula, FormulaError, Literal};

/// Errors produced while reading a DIMACS instance.
#[derive(Debug)]
pub enum ParseError {
    /// The underlying reader failed.
    Io(io::Error),
    /// A malformed `p` header line.
    Header {
        /// 1-based line number.
        line: usize,
    },
    /// A token that is neither a literal nor a clause terminator.
    Token {
        /// 1-based line number.
        line: usize,
        /// The offending token.
        token: String,
    },
    /// A literal mentions a variable above the declared count.
    VariableOutOfRange {
        /// 1-based line number.
        line: usize,
        /// The 1-based variable from the file.
        var: usize,
        /// The declared variable count.
        num_vars: usize,
    },
    /// A weight below zero.
    NegativeWeight {
        /// 1-based line number.
        line: usize,
        /// The offending weight.
        weight: i64,
    },
    /// The weight line is missing its `0` terminator.
    UnterminatedWeights {
        /// 1-based line number.
        line: usize,
    },
    /// The weight line length does not match the variable count.
    WeightCount {
        /// Expected number of weights.
        expected: usize,
        /// Number of weights found.
        found: usize,
    },
    /// The parsed data failed formula validation.
    Formula(FormulaError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Io(err) => write!(f, "read failed: {err}"),
            ParseError::Header { line } => write!(f, "line {line}: malformed problem header"),
            ParseError::Token { line, token } => {
                write!(f, "line {line}: unexpected token {token:?}")
            }
            ParseError::VariableOutOfRange {
                line,
                var,
                num_vars,
            } => write!(
                f,
                "line {line}: variable {var} exceeds the declared count {num_vars}"
            ),
            ParseError::NegativeWeight { line, weight } => {
                write!(f, "line {line}: negative weight {weight}")
            }
            ParseError::UnterminatedWeights { line } => {
                write!(f, "line {line}: weight line is not terminated by 0")
            }
            ParseError::WeightCount { expected, found } => {
                write!(f, "expected {expected} weights, got {found}")
            }
            ParseError::Formula(err) => write!(f, "invalid formula: {err}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(err) => Some(err),
            ParseError::Formula(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        ParseError::Io(err)
    }
}

impl From<FormulaError> for ParseError {
    fn from(err: FormulaError) -> Self {
        ParseError::Formula(err)
    }
}

/// Parses a weighted DIMACS instance from a file.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Formula, ParseError> {
    parse(BufReader::new(File::open(path)?))
}

/// Parses a weighted DIMACS instance from a string.
pub fn parse_str(input: &str) -> Result<Formula, ParseError> {
    parse(input.as_bytes())
}

/// Parses a weighted DIMACS instance from any buffered reader.
pub fn parse<R: BufRead>(reader: R) -> Result<Formula, ParseError> {
    let mut declared_vars: Option<usize> = None;
    let mut weights: Option<Vec<u64>> = None;
    let mut clauses: Vec<Clause> = Vec::new();
    let mut pending: Vec<Literal> = Vec::new();
    let mut max_var = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let trimmed = line.trim_start();

        if trimmed.is_empty() || trimmed.starts_with('c') {
            continue;
        }
        if trimmed.starts_with('%') {
            break;
        }

        let mut tokens = trimmed.split_whitespace();
        match tokens.next() {
            Some("p") => {
                declared_vars = Some(parse_header(tokens, line_no)?);
            }
            Some("w") => {
                weights = Some(parse_weights(tokens, line_no)?);
            }
            _ => {
                // Clause data; re-tokenize so the first literal is kept.
                for token in trimmed.split_whitespace() {
                    let code: i64 = token
                        .parse()
                        .map_err(|_| ParseError::Token {
                            line: line_no,
                            token: token.to_string(),
                        })?;
                    if code == 0 {
                        if !pending.is_empty() {
                            clauses.push(Clause::new(std::mem::take(&mut pending)));
                        }
                        continue;
                    }
                    let var = code.unsigned_abs() as usize;
                    if let Some(declared) = declared_vars {
                        if var > declared {
                            return Err(ParseError::VariableOutOfRange {
                                line: line_no,
                                var,
                                num_vars: declared,
                            });
                        }
                    }
                    max_var = max_var.max(var);
                    pending.push(Literal::new(var - 1, code > 0));
                }
            }
        }
    }

    // A final clause without its 0 terminator still counts.
    if !pending.is_empty() {
        clauses.push(Clause::new(pending));
    }

    let num_vars = declared_vars.unwrap_or(max_var);
    let weights = match weights {
        Some(weights) => {
            if weights.len() != num_vars {
                return Err(ParseError::WeightCount {
                    expected: num_vars,
                    found: weights.len(),
                });
            }
            weights
        }
        None => vec![1; num_vars],
    };

    Ok(Formula::new(num_vars, clauses, weights)?)
}

fn parse_header<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<usize, ParseError> {
    let header = ParseError::Header { line };
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some("cnf"), Some(vars), Some(clauses)) => {
            let vars: usize = vars.parse().map_err(|_| header)?;
            let _: usize = clauses.parse().map_err(|_| ParseError::Header { line })?;
            Ok(vars)
        }
        _ => Err(header),
    }
}

fn parse_weights<'a>(
    tokens: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<Vec<u64>, ParseError> {
    let mut values: Vec<i64> = Vec::new();
    for token in tokens {
        let value: i64 = token.parse().map_err(|_| ParseError::Token {
            line,
            token: token.to_string(),
        })?;
        values.push(value);
    }

    // The last value is the line terminator, not a weight.
    match values.pop() {
        Some(0) => {}
        _ => return Err(ParseError::UnterminatedWeights { line }),
    }

    values
        .into_iter()
        .map(|value| {
            if value < 0 {
                Err(ParseError::NegativeWeight {
                    line,
                    weight: value,
                })
            } else {
                Ok(value as u64)
            }
        })
        .collect()
}
