//! Coefficient, source and boundary functions evaluated on patches.

use nalgebra::{DMatrix, Point2, Vector2};
use std::fmt;
use std::sync::Arc;

/// A function that can be evaluated on the points of a patch.
///
/// Points are given as the columns of a `2 x n` matrix. Whether they are parametric or
/// physical points is decided by the caller: visitors pass parametric points when
/// [`PatchFunction::is_parametric`] returns `true` or when parametric coefficients were
/// requested, and physical points otherwise.
pub trait PatchFunction: fmt::Debug + Send + Sync {
    /// Number of components of the function value.
    fn target_dim(&self) -> usize;

    /// Evaluates the function on patch `patch`, returning a `target_dim x n` matrix.
    fn eval(&self, patch: usize, points: &DMatrix<f64>) -> DMatrix<f64>;

    /// Whether the function is defined on the parameter domain of each patch.
    fn is_parametric(&self) -> bool {
        false
    }
}

enum Expr {
    Scalar(Arc<dyn Fn(&Point2<f64>) -> f64 + Send + Sync>),
    Vector(Arc<dyn Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync>),
}

/// A function of the physical coordinates, independent of the patch.
#[derive(Clone)]
pub struct FunctionExpr {
    expr: Arc<Expr>,
}

impl fmt::Debug for FunctionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionExpr")
            .field("target_dim", &self.target_dim())
            .finish_non_exhaustive()
    }
}

impl FunctionExpr {
    pub fn scalar(f: impl Fn(&Point2<f64>) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            expr: Arc::new(Expr::Scalar(Arc::new(f))),
        }
    }

    pub fn vector2(f: impl Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync + 'static) -> Self {
        Self {
            expr: Arc::new(Expr::Vector(Arc::new(f))),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self::scalar(move |_| value)
    }

    pub fn zero_vector2() -> Self {
        Self::vector2(|_| Vector2::zeros())
    }

    /// Evaluates the function at a single point.
    pub fn eval_point(&self, x: &Point2<f64>) -> DMatrix<f64> {
        match self.expr.as_ref() {
            Expr::Scalar(f) => DMatrix::from_element(1, 1, f(x)),
            Expr::Vector(f) => {
                let value = f(x);
                DMatrix::from_column_slice(2, 1, value.as_slice())
            }
        }
    }
}

impl PatchFunction for FunctionExpr {
    fn target_dim(&self) -> usize {
        match self.expr.as_ref() {
            Expr::Scalar(_) => 1,
            Expr::Vector(_) => 2,
        }
    }

    fn eval(&self, _patch: usize, points: &DMatrix<f64>) -> DMatrix<f64> {
        let n = points.ncols();
        let mut result = DMatrix::zeros(self.target_dim(), n);
        for k in 0..n {
            let x = Point2::new(points[(0, k)], points[(1, k)]);
            match self.expr.as_ref() {
                Expr::Scalar(f) => result[(0, k)] = f(&x),
                Expr::Vector(f) => {
                    let value = f(&x);
                    result[(0, k)] = value.x;
                    result[(1, k)] = value.y;
                }
            }
        }
        result
    }
}
