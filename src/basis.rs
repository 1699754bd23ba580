//! Spline bases and their elements.
//!
//! All bases are B-spline bases over open (clamped) knot vectors. An *element* is a knot span
//! in 1D or a tensor product of knot spans in 2D. Evaluation happens element-wise at a set of
//! parametric points given as the columns of a `dim x n` matrix.

use nalgebra::DMatrix;

mod bspline;
mod gluing;
mod knots;
mod tensor;

pub use bspline::BSplineBasis;
pub use gluing::GluingDataBasis;
pub use knots::KnotVector;
pub use tensor::TensorBSplineBasis;

/// An axis-aligned box in parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub index: usize,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Element {
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn center(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(a, b)| 0.5 * (a + b))
            .collect()
    }

    /// Length of the parametric diagonal.
    pub fn cell_size(&self) -> f64 {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(a, b)| (b - a) * (b - a))
            .sum::<f64>()
            .sqrt()
    }

    pub fn volume(&self) -> f64 {
        self.lower.iter().zip(&self.upper).map(|(a, b)| b - a).product()
    }
}

/// Values and first derivatives of the active functions of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisValues {
    /// `num_active x num_points`
    pub values: DMatrix<f64>,
    /// One `num_active x num_points` matrix per parametric direction. Empty if derivatives
    /// were not requested.
    pub derivatives: Vec<DMatrix<f64>>,
}

impl BasisValues {
    pub fn empty() -> Self {
        Self {
            values: DMatrix::zeros(0, 0),
            derivatives: Vec::new(),
        }
    }

    pub fn num_active(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_points(&self) -> usize {
        self.values.ncols()
    }

    /// Parametric gradients of all active functions at point `k`, as a `dim x num_active`
    /// matrix.
    pub fn parametric_gradients(&self, k: usize) -> DMatrix<f64> {
        let dim = self.derivatives.len();
        let n = self.num_active();
        DMatrix::from_fn(dim, n, |d, a| self.derivatives[d][(a, k)])
    }
}

pub trait Basis: Send + Sync {
    /// Parametric dimension.
    fn dim(&self) -> usize;

    /// Number of basis functions.
    fn size(&self) -> usize;

    fn degree(&self, direction: usize) -> usize;

    fn num_elements(&self) -> usize;

    fn element(&self, index: usize) -> Element;

    fn elements(&self) -> Vec<Element> {
        (0..self.num_elements()).map(|i| self.element(i)).collect()
    }

    /// Indices of the functions that do not vanish on the element.
    fn active(&self, element: &Element) -> Vec<usize>;

    /// Evaluates the active functions of `element` at the columns of `points`.
    ///
    /// `order` is the highest derivative order requested, either 0 or 1. All points must lie
    /// in the closure of the element.
    fn eval_all_ders(&self, element: &Element, points: &DMatrix<f64>, order: usize) -> BasisValues;
}
