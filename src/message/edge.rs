use super::message::DiscreteMessage;

// Owns the two message vectors of one factor-variable connection, both sized
// to the variable's domain, plus the damping coefficient applied when the
// factor-to-variable message is refreshed. No operation here touches another
// edge's arrays.
pub struct EdgeMessages {
    variable_to_factor: DiscreteMessage,
    factor_to_variable: DiscreteMessage,
    damping: f64,
}

impl EdgeMessages {
    // Creates an edge with uniform messages in both directions and no damping
    pub fn new(domain_size: usize) -> Self {
        EdgeMessages {
            variable_to_factor: DiscreteMessage::new_uniform(domain_size),
            factor_to_variable: DiscreteMessage::new_uniform(domain_size),
            damping: 0.,
        }
    }

    pub fn domain_size(&self) -> usize {
        self.variable_to_factor.len()
    }

    pub fn variable_to_factor(&self) -> &DiscreteMessage {
        &self.variable_to_factor
    }

    pub fn variable_to_factor_mut(&mut self) -> &mut DiscreteMessage {
        &mut self.variable_to_factor
    }

    pub fn factor_to_variable(&self) -> &DiscreteMessage {
        &self.factor_to_variable
    }

    pub fn factor_to_variable_mut(&mut self) -> &mut DiscreteMessage {
        &mut self.factor_to_variable
    }

    pub fn set_variable_to_factor(&mut self, message: DiscreteMessage) {
        assert_eq!(
            message.len(),
            self.domain_size(),
            "Message length doesn't match the variable's declared domain size."
        );
        self.variable_to_factor = message;
    }

    pub fn set_factor_to_variable(&mut self, message: DiscreteMessage) {
        assert_eq!(
            message.len(),
            self.domain_size(),
            "Message length doesn't match the variable's declared domain size."
        );
        self.factor_to_variable = message;
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn set_damping(&mut self, value: f64) {
        assert!(
            (0. ..1.).contains(&value),
            "Damping coefficient must lie in [0, 1)."
        );
        self.damping = value;
    }

    // Re-creates both message vectors at a new size. Only relevant when a
    // variable's particle set changes size in a continuous solver; discrete
    // factors keep their size fixed after initialization.
    pub fn resize(&mut self, new_size: usize) {
        self.variable_to_factor = DiscreteMessage::new_uniform(new_size);
        self.factor_to_variable = DiscreteMessage::new_uniform(new_size);
    }
}
