use std::{
    fmt::Debug,
    ops::{Index, IndexMut},
    slice::Iter,
};

use ndarray::Array1;

// A message over one discrete variable: an energy per domain value, where
// energy = -ln(unnormalized weight) and +infinity encodes impossibility.
// The length is fixed at creation.
#[derive(Clone, PartialEq)]
pub struct DiscreteMessage {
    energies: Array1<f64>,
}

impl DiscreteMessage {
    // Creates a uniform message (all energies zero, all weights one)
    pub fn new_uniform(size: usize) -> Self {
        DiscreteMessage {
            energies: Array1::zeros(size),
        }
    }

    // Creates an all-impossible message (all energies +infinity, all weights zero)
    pub fn new_infinite(size: usize) -> Self {
        DiscreteMessage {
            energies: Array1::from_elem(size, f64::INFINITY),
        }
    }

    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    pub fn energy(&self, index: usize) -> f64 {
        self.energies[index]
    }

    pub fn set_energy(&mut self, index: usize, value: f64) {
        self.energies[index] = value;
    }

    // Returns the weight view of one entry
    pub fn weight(&self, index: usize) -> f64 {
        (-self.energies[index]).exp()
    }

    // Returns the weight view of the whole message
    pub fn weights(&self) -> Array1<f64> {
        self.energies.mapv(|energy| (-energy).exp())
    }

    pub fn energies(&self) -> &Array1<f64> {
        &self.energies
    }

    pub fn iter(&self) -> Iter<f64> {
        self.energies
            .as_slice()
            .expect("Message storage is contiguous")
            .iter()
    }

    // Returns the smallest energy in the message
    pub fn min(&self) -> f64 {
        self.energies
            .iter()
            .fold(f64::INFINITY, |current_min, &value| current_min.min(value))
    }

    // Returns the index of the smallest energy in the message
    pub fn index_min(&self) -> usize {
        self.energies
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(idx_min, val_min), (idx, &val)| {
                if val < val_min {
                    (idx, val)
                } else {
                    (idx_min, val_min)
                }
            })
            .0
    }

    // Shifts all energies so that the smallest becomes zero.
    // An all-infinity message is left unchanged (a valid degenerate outcome).
    pub fn normalize_min(&mut self) {
        let min = self.min();
        if min.is_finite() && min != 0. {
            self.energies.mapv_inplace(|energy| energy - min);
        }
    }

    // Rescales so that the weights sum to one, computed with the energies
    // shifted by their minimum for stability. All-infinity messages are left
    // unchanged.
    pub fn normalize_sum(&mut self) {
        let min = self.min();
        if !min.is_finite() {
            return;
        }
        let shifted_weight_sum: f64 = self
            .energies
            .iter()
            .map(|energy| (-(energy - min)).exp())
            .sum();
        let log_sum = min - shifted_weight_sum.ln();
        self.energies.mapv_inplace(|energy| energy - log_sum);
    }

    // Adds another message's energies entrywise (multiplies the weights)
    pub fn add_assign(&mut self, rhs: &DiscreteMessage) {
        assert_eq!(
            self.len(),
            rhs.len(),
            "Added message lengths don't match."
        );
        self.energies.zip_mut_with(rhs.energies(), |value, &rhs_value| {
            *value += rhs_value;
        });
    }

    // Blends this message with its previous value: (1 - damping) * self + damping * previous
    pub fn damp(&mut self, previous: &DiscreteMessage, damping: f64) {
        assert_eq!(
            self.len(),
            previous.len(),
            "Damped message length doesn't match its previous value."
        );
        if damping == 0. {
            return;
        }
        self.energies.zip_mut_with(previous.energies(), |new, &old| {
            *new = (1. - damping) * *new + damping * old;
        });
    }

    // Largest absolute difference between two messages; entries that are both
    // +infinity count as equal, entries that disagree on finiteness as +infinity
    pub fn max_difference(&self, other: &DiscreteMessage) -> f64 {
        self.energies
            .iter()
            .zip(other.energies.iter())
            .fold(0., |current_max, (&a, &b)| {
                if a == f64::INFINITY && b == f64::INFINITY {
                    current_max
                } else if a.is_finite() && b.is_finite() {
                    current_max.max((a - b).abs())
                } else {
                    f64::INFINITY
                }
            })
    }
}

impl From<Vec<f64>> for DiscreteMessage {
    fn from(value: Vec<f64>) -> Self {
        DiscreteMessage {
            energies: value.into(),
        }
    }
}

impl Index<usize> for DiscreteMessage {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.energies[index]
    }
}

impl IndexMut<usize> for DiscreteMessage {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.energies[index]
    }
}

impl Debug for DiscreteMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.energies
                .iter()
                .map(|value| value.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}
