//! Branch-and-bound configuration.

/// Static variable ordering used for branching decisions.
///
/// The order is fixed per run, so two runs over the same formula with the
/// same ordering produce the same incumbent trace. The final optimum is
/// order-independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VariableOrder {
    /// Ascending variable index.
    Ascending,

    /// Descending weight, ties broken by ascending index.
    ///
    /// Branching on heavy variables first (true-branch first) tends to
    /// find high-weight incumbents early, which tightens the pruning
    /// bound for the rest of the search.
    #[default]
    DescendingWeight,
}

impl VariableOrder {
    /// Computes the branching order over variables `0..weights.len()`.
    pub fn order(&self, weights: &[u64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..weights.len()).collect();
        if let VariableOrder::DescendingWeight = self {
            order.sort_by(|&a, &b| weights[b].cmp(&weights[a]).then(a.cmp(&b)));
        }
        order
    }
}

/// Configuration for the branch-and-bound engine.
///
/// # Examples
///
/// ```
/// use wmaxsat::bnb::{BnbConfig, VariableOrder};
///
/// let config = BnbConfig::default()
///     .with_variable_order(VariableOrder::Ascending)
///     .with_node_limit(100_000);
/// assert_eq!(config.node_limit, 100_000);
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BnbConfig {
    /// Branching order.
    pub variable_order: VariableOrder,

    /// Maximum number of search nodes to visit. 0 = no limit.
    ///
    /// Exceeding the limit returns the best incumbent found so far with
    /// optimality unproven.
    pub node_limit: usize,

    /// Wall-clock budget in milliseconds. `None` = no limit.
    pub time_limit_ms: Option<u64>,
}

impl BnbConfig {
    /// Sets the branching order.
    pub fn with_variable_order(mut self, order: VariableOrder) -> Self {
        self.variable_order = order;
        self
    }

    /// Sets the node budget (0 = no limit).
    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = limit;
        self
    }

    /// Sets the wall-clock budget in milliseconds.
    pub fn with_time_limit_ms(mut self, limit: u64) -> Self {
        self.time_limit_ms = Some(limit);
        self
    }
}
