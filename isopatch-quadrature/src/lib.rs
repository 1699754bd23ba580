//! Quadrature rules for tensor-product parameter domains.
//!
//! Spline patches are parametrized over boxes, and every element of a spline basis is itself a
//! box in parameter space. All rules in this crate are therefore built from the one-dimensional
//! Gauss rule on `[-1, 1]`, either directly (see [`univariate`]) or as tensor products
//! (see [`tensor`]). Rules can then be mapped onto arbitrary boxes.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod univariate;

pub use tensor::TensorRule;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A rule with zero points was requested along some direction.
    ZeroPoints { direction: usize },
    /// The dimension of a box does not match the dimension of the rule.
    DimensionMismatch { expected: usize, actual: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroPoints { direction } => {
                write!(f, "cannot construct a rule with zero points in direction {}", direction)
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "box has dimension {} but the rule has dimension {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule consisting of weights and points.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// Approximates the integral of `f` with the given fixed-dimension rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, p)| w * f(p))
        .sum()
}
