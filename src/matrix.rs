use crate::error::{BppError, Result};
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;

/// Largest sequence length a probability plot may declare
pub const MAX_DIMENSION: usize = 20_000;

/// Dense N x N base-pairing probability matrix (0-based cells)
#[derive(Debug, Clone, PartialEq)]
pub struct BppMatrix {
    data: Array2<f64>,
}

impl BppMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array2::zeros((n, n)),
        }
    }

    /// Wrap an existing array, checking it is square with every cell in [0, 1]
    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        let (rows, cols) = data.dim();
        if rows != cols {
            return Err(BppError::Validation(format!(
                "probability matrix must be square, got {}x{}",
                rows, cols
            )));
        }
        if let Some(((i, j), p)) = data
            .indexed_iter()
            .find(|(_, p)| !is_probability(**p))
        {
            return Err(BppError::Validation(format!(
                "cell ({}, {}) holds {} which is not a probability",
                i + 1,
                j + 1,
                p
            )));
        }
        Ok(Self { data })
    }

    /// Declared sequence length N
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[[i, j]]
    }

    pub(crate) fn set(&mut self, i: usize, j: usize, probability: f64) {
        self.data[[i, j]] = probability;
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn row_sums(&self) -> ProbabilityVector {
        row_sums(self)
    }

    /// Nonzero cells in row-major order as (i, j, p), 0-based
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.data
            .indexed_iter()
            .filter(|(_, p)| **p > 0.0)
            .map(|((i, j), p)| (i, j, *p))
    }
}

/// Marginal pairing probability per position
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector {
    values: Array1<f64>,
}

impl ProbabilityVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        // sum_axis always yields a standard-layout array
        self.values.as_slice().unwrap_or(&[])
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.to_vec()
    }
}

/// Sum each row of the matrix. An empty matrix gives an empty vector.
pub fn row_sums(matrix: &BppMatrix) -> ProbabilityVector {
    ProbabilityVector {
        values: matrix.data.sum_axis(Axis(1)),
    }
}

/// 1-indexed positions as listed in a probability plot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BasePair {
    pub i: usize,
    pub j: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairProbability {
    pub pair: BasePair,
    pub probability: f64,
}

/// Listed pairs with their probabilities, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairProbabilityList {
    entries: Vec<PairProbability>,
}

impl PairProbabilityList {
    pub fn new(entries: Vec<PairProbability>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PairProbability> {
        self.entries.iter()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.probability).collect()
    }

    /// Lookup by pair identity. Repeated pairs resolve to the last listing.
    pub(crate) fn by_pair(&self) -> HashMap<BasePair, f64> {
        self.entries
            .iter()
            .map(|e| (e.pair, e.probability))
            .collect()
    }
}

impl FromIterator<PairProbability> for PairProbabilityList {
    fn from_iter<I: IntoIterator<Item = PairProbability>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

pub(crate) fn is_probability(p: f64) -> bool {
    p.is_finite() && (0.0..=1.0).contains(&p)
}
