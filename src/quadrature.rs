//! Element quadrature for spline bases.

use crate::basis::{Basis, Element};
use eyre::eyre;
use nalgebra::{DMatrix, DVector};

pub use isopatch_quadrature::{integrate, tensor, univariate, Rule, TensorRule};

/// A tensor-product Gauss rule that can be mapped onto the elements of a basis.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadRule {
    rule: TensorRule,
}

impl QuadRule {
    pub fn gauss(num_points: &[usize]) -> eyre::Result<Self> {
        Ok(Self {
            rule: TensorRule::gauss(num_points)?,
        })
    }

    /// `degree + 1 + extra` points per direction of the basis.
    pub fn for_basis(basis: &(impl Basis + ?Sized), extra: usize) -> eyre::Result<Self> {
        let num_points: Vec<usize> = (0..basis.dim()).map(|d| basis.degree(d) + 1 + extra).collect();
        Self::gauss(&num_points)
    }

    pub fn dim(&self) -> usize {
        self.rule.dim()
    }

    pub fn num_points(&self) -> usize {
        self.rule.num_points()
    }

    pub fn points_per_direction(&self) -> &[usize] {
        self.rule.points_per_direction()
    }

    /// Nodes as the columns of a `dim x n` matrix and the corresponding weights.
    pub fn map_to(&self, element: &Element) -> eyre::Result<(DMatrix<f64>, DVector<f64>)> {
        if element.dim() != self.dim() {
            return Err(eyre!(
                "quadrature rule of dimension {} cannot be mapped to an element of dimension {}",
                self.dim(),
                element.dim()
            ));
        }
        let (weights, points) = self.rule.map_to_box(&element.lower, &element.upper)?;
        let nodes = DMatrix::from_fn(self.dim(), points.len(), |d, k| points[k][d]);
        Ok((nodes, DVector::from_vec(weights)))
    }
}
