//! Quadrature rules formed by tensor products of 1D Gauss rules.
//!
//! Spline elements are axis-aligned boxes in parameter space, so every rule needed for
//! assembly is a tensor product of univariate rules. [`quadrilateral_gauss`] covers the
//! common square reference domain, while [`TensorRule`] supports a different number of points
//! per direction and an arbitrary dimension.

use crate::univariate::gauss;
use crate::{Error, Rule};

/// A Gauss quadrature rule for the reference quadrilateral `[-1, 1]^2`.
///
/// The first coordinate varies fastest, matching the lexicographic ordering of tensor-product
/// spline bases.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss(n);
    let mut weights2d = Vec::with_capacity(n * n);
    let mut points2d = Vec::with_capacity(n * n);

    for (&wy, &[y]) in weights1d.iter().zip(&points1d) {
        for (&wx, &[x]) in weights1d.iter().zip(&points1d) {
            weights2d.push(wx * wy);
            points2d.push([x, y]);
        }
    }

    (weights2d, points2d)
}

/// A tensor-product Gauss rule on the reference box `[-1, 1]^d`.
///
/// Points are stored in lexicographic order with the first coordinate varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorRule {
    num_points: Vec<usize>,
    weights: Vec<f64>,
    points: Vec<Vec<f64>>,
}

impl TensorRule {
    /// Constructs a rule with `num_points[k]` Gauss points along direction `k`.
    pub fn gauss(num_points: &[usize]) -> Result<Self, Error> {
        if let Some(direction) = num_points.iter().position(|&n| n == 0) {
            return Err(Error::ZeroPoints { direction });
        }

        let rules1d: Vec<Rule<1>> = num_points.iter().map(|&n| gauss(n)).collect();
        let total: usize = num_points.iter().product();
        let dim = num_points.len();

        let mut weights = Vec::with_capacity(total);
        let mut points = Vec::with_capacity(total);
        let mut multi_index = vec![0; dim];
        for _ in 0..total {
            let mut w = 1.0;
            let mut p = Vec::with_capacity(dim);
            for (k, &i) in multi_index.iter().enumerate() {
                let (wk, pk) = &rules1d[k];
                w *= wk[i];
                p.push(pk[i][0]);
            }
            weights.push(w);
            points.push(p);

            // Advance the multi-index, first direction fastest
            for k in 0..dim {
                multi_index[k] += 1;
                if multi_index[k] < num_points[k] {
                    break;
                }
                multi_index[k] = 0;
            }
        }

        Ok(Self {
            num_points: num_points.to_vec(),
            weights,
            points,
        })
    }

    /// Constructs a rule with the same number of points in every direction.
    pub fn uniform(dim: usize, num_points_per_dim: usize) -> Result<Self, Error> {
        Self::gauss(&vec![num_points_per_dim; dim])
    }

    pub fn dim(&self) -> usize {
        self.num_points.len()
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn points_per_direction(&self) -> &[usize] {
        &self.num_points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    /// Maps the rule onto the box `[lower, upper]`.
    ///
    /// Returns the scaled weights and the mapped points. Degenerate boxes are allowed and
    /// produce zero weights.
    pub fn map_to_box(&self, lower: &[f64], upper: &[f64]) -> Result<(Vec<f64>, Vec<Vec<f64>>), Error> {
        let dim = self.dim();
        for len in [lower.len(), upper.len()] {
            if len != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: len,
                });
            }
        }

        let half_lengths: Vec<f64> = lower.iter().zip(upper).map(|(a, b)| 0.5 * (b - a)).collect();
        let midpoints: Vec<f64> = lower.iter().zip(upper).map(|(a, b)| 0.5 * (a + b)).collect();
        let scale: f64 = half_lengths.iter().product();

        let weights = self.weights.iter().map(|w| w * scale).collect();
        let points = self
            .points
            .iter()
            .map(|xi| {
                xi.iter()
                    .zip(&half_lengths)
                    .zip(&midpoints)
                    .map(|((x, h), m)| m + h * x)
                    .collect()
            })
            .collect();
        Ok((weights, points))
    }
}
