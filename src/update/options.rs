use super::rule::MarginalRule;

// Explicit configuration consumed by the planner, the update engines, and
// the iteration driver. Loading these values from files or command-line
// flags happens outside this crate; they arrive here as plain inputs.
pub struct UpdateOptions {
    rule: MarginalRule,
    damping: f64,
    edge_damping: Vec<(usize, usize, f64)>, // (factor, edge position, coefficient)
    sparse_threshold: f64,
    max_message_size: Option<usize>, // k-best cap, None = full marginalization
    max_iterations: usize,
    eps: f64,
}

impl UpdateOptions {
    pub fn default() -> Self {
        UpdateOptions {
            rule: MarginalRule::MinSum,
            damping: 0.,
            edge_damping: Vec::new(),
            sparse_threshold: 0.25,
            max_message_size: None,
            max_iterations: 1000,
            eps: 1e-8,
        }
    }

    pub fn set_rule(&mut self, value: MarginalRule) -> &mut Self {
        self.rule = value;
        self
    }

    pub fn set_damping(&mut self, value: f64) -> &mut Self {
        assert!(
            (0. ..1.).contains(&value),
            "Damping coefficient must lie in [0, 1)."
        );
        self.damping = value;
        self
    }

    // Overrides the damping coefficient of a single edge, identified by its
    // factor and the edge's position in the factor's sibling order
    pub fn set_edge_damping(&mut self, factor: usize, edge: usize, value: f64) -> &mut Self {
        assert!(
            (0. ..1.).contains(&value),
            "Damping coefficient must lie in [0, 1)."
        );
        self.edge_damping.push((factor, edge, value));
        self
    }

    pub fn set_sparse_threshold(&mut self, value: f64) -> &mut Self {
        assert!(
            value > 0. && value <= 1.,
            "Sparse threshold must lie in (0, 1]."
        );
        self.sparse_threshold = value;
        self
    }

    pub fn set_max_message_size(&mut self, value: Option<usize>) -> &mut Self {
        if let Some(k) = value {
            assert!(k > 0, "k-best message size cap must be positive.");
        }
        self.max_message_size = value;
        self
    }

    pub fn set_max_iterations(&mut self, value: usize) -> &mut Self {
        self.max_iterations = value;
        self
    }

    pub fn set_eps(&mut self, value: f64) -> &mut Self {
        self.eps = value;
        self
    }

    pub fn rule(&self) -> MarginalRule {
        self.rule
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn edge_damping(&self) -> &Vec<(usize, usize, f64)> {
        &self.edge_damping
    }

    pub fn sparse_threshold(&self) -> f64 {
        self.sparse_threshold
    }

    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }
}
