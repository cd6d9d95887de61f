//! Fixed operator routings and the modulation matrix a channel is wired with.
//!
//! Modulation only ever flows from a lower to a higher operator index, so any routing is
//! acyclic in index order. Self-feedback is kept separately from the pairwise depths.

use serde::{Deserialize, Serialize};

use super::error::Error;

pub const OPERATOR_COUNT: usize = 4;

/// Operator pairs in the order the pairwise depths are stored.
pub const EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Operators that carry a self-feedback tap.
pub const FEEDBACK_OPERATORS: [usize; 2] = [0, 2];

pub fn edge_index(from: usize, to: usize) -> Option<usize> {
    EDGES.iter().position(|&edge| edge == (from, to))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Algorithm {
    pub modulation: [f64; 6],
    pub outputs: [f64; 4],
}

/// The eight OPN2 algorithms plus one extra two-stack routing (1→3, 2→4).
pub const ALGORITHMS: [Algorithm; 9] = [
    Algorithm {
        modulation: [1.0, 0.0, 0.0, 1.0, 0.0, 1.0],
        outputs: [0.0, 0.0, 0.0, 1.0],
    },
    Algorithm {
        modulation: [0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
        outputs: [0.0, 0.0, 0.0, 1.0],
    },
    Algorithm {
        modulation: [0.0, 0.0, 1.0, 1.0, 0.0, 1.0],
        outputs: [0.0, 0.0, 0.0, 1.0],
    },
    Algorithm {
        modulation: [1.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        outputs: [0.0, 0.0, 0.0, 1.0],
    },
    Algorithm {
        modulation: [1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        outputs: [0.0, 1.0, 0.0, 1.0],
    },
    Algorithm {
        modulation: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
        outputs: [0.0, 1.0, 1.0, 1.0],
    },
    Algorithm {
        modulation: [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        outputs: [0.0, 1.0, 1.0, 1.0],
    },
    Algorithm {
        modulation: [0.0; 6],
        outputs: [1.0; 4],
    },
    Algorithm {
        modulation: [0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        outputs: [0.0, 0.0, 1.0, 1.0],
    },
];

/// Modulation depths, feedback taps and per-operator output levels of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Routing {
    pub modulation: [f64; 6],
    /// Feedback depths of operators 1 and 3.
    pub feedback: [f64; 2],
    pub outputs: [f64; 4],
}

impl Routing {
    pub fn from_algorithm(index: usize) -> Option<Self> {
        ALGORITHMS.get(index).map(|algorithm| Self {
            modulation: algorithm.modulation,
            feedback: [0.0; 2],
            outputs: algorithm.outputs,
        })
    }

    /// Replaces depths and outputs with a fixed algorithm. Feedback is kept.
    pub fn use_algorithm(&mut self, index: usize) -> bool {
        match ALGORITHMS.get(index) {
            Some(algorithm) => {
                self.modulation = algorithm.modulation;
                self.outputs = algorithm.outputs;
                true
            }
            None => false,
        }
    }

    /// Index of the fixed algorithm these depths and outputs match exactly.
    pub fn algorithm(&self) -> Option<usize> {
        ALGORITHMS.iter().position(|algorithm| {
            algorithm.modulation == self.modulation && algorithm.outputs == self.outputs
        })
    }

    pub fn depth(&self, from: usize, to: usize) -> f64 {
        edge_index(from, to).map_or(0.0, |index| self.modulation[index])
    }

    pub fn set_depth(&mut self, from: usize, to: usize, depth: f64) -> Result<(), Error> {
        let index = edge_index(from, to).ok_or(Error::InvalidRouting { from, to })?;
        self.modulation[index] = depth;
        Ok(())
    }

    pub fn feedback(&self, operator: usize) -> f64 {
        FEEDBACK_OPERATORS
            .iter()
            .position(|&op| op == operator)
            .map_or(0.0, |tap| self.feedback[tap])
    }

    /// Operators that `from` modulates.
    pub fn targets(&self, from: usize) -> impl Iterator<Item = usize> + '_ {
        EDGES
            .iter()
            .zip(self.modulation.iter())
            .filter(move |((source, _), depth)| *source == from && **depth != 0.0)
            .map(|((_, target), _)| *target)
    }

    /// Operators modulating `to`, with their depths.
    pub fn modulators(&self, to: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        EDGES
            .iter()
            .zip(self.modulation.iter())
            .filter(move |((_, target), depth)| *target == to && **depth != 0.0)
            .map(|((source, _), depth)| (*source, *depth))
    }

    pub fn is_carrier(&self, operator: usize) -> bool {
        self.outputs.get(operator).is_some_and(|&level| level != 0.0)
    }
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            modulation: ALGORITHMS[0].modulation,
            feedback: [0.0; 2],
            outputs: ALGORITHMS[0].outputs,
        }
    }
}

/// Converts a hardware feedback setting 0..7 to a modulation depth.
pub fn feedback_depth(amount: u8) -> f64 {
    match amount.min(7) {
        0 => 0.0,
        amount => 2f64.powi(amount as i32 - 1) / 64.0,
    }
}
