//! Patch parametrizations and their evaluation at quadrature points.
//!
//! Every patch is a map from the unit square `[0, 1]^2` to the physical plane. The columns
//! of the Jacobian are the partial derivatives with respect to the two parametric
//! directions.

use eyre::eyre;
use nalgebra::{DMatrix, Matrix2, Point2, Vector2};
use std::fmt::Debug;

pub trait PatchGeometry: Debug + Send + Sync {
    fn eval(&self, param: &Point2<f64>) -> Point2<f64>;

    fn jacobian(&self, param: &Point2<f64>) -> Matrix2<f64>;

    /// Second derivatives of the two physical coordinates, each as a symmetric `2 x 2`
    /// matrix of parametric derivatives.
    fn hessian(&self, _param: &Point2<f64>) -> [Matrix2<f64>; 2] {
        [Matrix2::zeros(), Matrix2::zeros()]
    }
}

/// The affine map from the unit square onto an axis-aligned box.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineBox {
    pub lower: Point2<f64>,
    pub upper: Point2<f64>,
}

impl AffineBox {
    pub fn new(lower: Point2<f64>, upper: Point2<f64>) -> Self {
        Self { lower, upper }
    }

    pub fn unit() -> Self {
        Self::new(Point2::origin(), Point2::new(1.0, 1.0))
    }
}

impl PatchGeometry for AffineBox {
    fn eval(&self, param: &Point2<f64>) -> Point2<f64> {
        let extents = self.upper - self.lower;
        self.lower + extents.component_mul(&param.coords)
    }

    fn jacobian(&self, _param: &Point2<f64>) -> Matrix2<f64> {
        let extents = self.upper - self.lower;
        Matrix2::from_diagonal(&extents)
    }
}

/// A bilinear quadrilateral, with corners ordered as
/// `(0, 0), (1, 0), (0, 1), (1, 1)` in parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct BilinearQuad {
    pub corners: [Point2<f64>; 4],
}

impl BilinearQuad {
    pub fn new(corners: [Point2<f64>; 4]) -> Self {
        Self { corners }
    }
}

impl PatchGeometry for BilinearQuad {
    fn eval(&self, param: &Point2<f64>) -> Point2<f64> {
        let (u, v) = (param.x, param.y);
        let [a, b, c, d] = &self.corners;
        let coords = a.coords * ((1.0 - u) * (1.0 - v))
            + b.coords * (u * (1.0 - v))
            + c.coords * ((1.0 - u) * v)
            + d.coords * (u * v);
        Point2::from(coords)
    }

    fn jacobian(&self, param: &Point2<f64>) -> Matrix2<f64> {
        let (u, v) = (param.x, param.y);
        let [a, b, c, d] = &self.corners;
        let du: Vector2<f64> = (b - a) * (1.0 - v) + (d - c) * v;
        let dv: Vector2<f64> = (c - a) * (1.0 - u) + (d - b) * u;
        Matrix2::from_columns(&[du, dv])
    }

    fn hessian(&self, _param: &Point2<f64>) -> [Matrix2<f64>; 2] {
        let [a, b, c, d] = &self.corners;
        let mixed = a.coords - b.coords - c.coords + d.coords;
        [
            Matrix2::new(0.0, mixed.x, mixed.x, 0.0),
            Matrix2::new(0.0, mixed.y, mixed.y, 0.0),
        ]
    }
}

/// Geometric quantities requested from [`MapData::compute`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryFlags {
    pub value: bool,
    pub measure: bool,
    pub jacobian: bool,
    pub second_derivatives: bool,
    pub gradient_transform: bool,
}

impl GeometryFlags {
    pub const NONE: Self = Self {
        value: false,
        measure: false,
        jacobian: false,
        second_derivatives: false,
        gradient_transform: false,
    };

    /// Values, measures and gradient transforms, the usual needs of a stiffness form.
    pub const STIFFNESS: Self = Self {
        value: true,
        measure: true,
        jacobian: true,
        second_derivatives: false,
        gradient_transform: true,
    };

    pub const MASS: Self = Self {
        value: true,
        measure: true,
        jacobian: true,
        second_derivatives: false,
        gradient_transform: false,
    };

    pub fn union(self, other: Self) -> Self {
        Self {
            value: self.value || other.value,
            measure: self.measure || other.measure,
            jacobian: self.jacobian || other.jacobian,
            second_derivatives: self.second_derivatives || other.second_derivatives,
            gradient_transform: self.gradient_transform || other.gradient_transform,
        }
    }
}

/// Evaluated geometry at a set of parametric points.
///
/// Quantities that were not requested through the flags are left empty.
#[derive(Debug, Clone)]
pub struct MapData {
    pub points: DMatrix<f64>,
    pub values: Vec<Point2<f64>>,
    pub jacobians: Vec<Matrix2<f64>>,
    pub measures: Vec<f64>,
    pub inverse_transposes: Vec<Matrix2<f64>>,
    pub hessians: Vec<[Matrix2<f64>; 2]>,
}

impl Default for MapData {
    fn default() -> Self {
        Self {
            points: DMatrix::zeros(2, 0),
            values: Vec::new(),
            jacobians: Vec::new(),
            measures: Vec::new(),
            inverse_transposes: Vec::new(),
            hessians: Vec::new(),
        }
    }
}

impl MapData {
    pub fn compute(geometry: &dyn PatchGeometry, points: &DMatrix<f64>, flags: GeometryFlags) -> eyre::Result<Self> {
        if points.nrows() != 2 {
            return Err(eyre!("expected 2D parametric points, got {} rows", points.nrows()));
        }
        let n = points.ncols();
        let params: Vec<Point2<f64>> = (0..n)
            .map(|k| Point2::new(points[(0, k)], points[(1, k)]))
            .collect();

        let mut data = MapData {
            points: points.clone(),
            ..Default::default()
        };

        if flags.value {
            data.values = params.iter().map(|p| geometry.eval(p)).collect();
        }

        let need_jacobian = flags.jacobian || flags.measure || flags.gradient_transform;
        if need_jacobian {
            data.jacobians = params.iter().map(|p| geometry.jacobian(p)).collect();
        }
        if flags.measure {
            data.measures = data.jacobians.iter().map(|j| j.determinant().abs()).collect();
        }
        if flags.gradient_transform {
            data.inverse_transposes = data
                .jacobians
                .iter()
                .map(|j| {
                    j.try_inverse()
                        .map(|inverse| inverse.transpose())
                        .ok_or_else(|| eyre!("Singular element Jacobian encountered"))
                })
                .collect::<eyre::Result<_>>()?;
        }
        if flags.second_derivatives {
            data.hessians = params.iter().map(|p| geometry.hessian(p)).collect();
        }
        Ok(data)
    }

    pub fn num_points(&self) -> usize {
        self.points.ncols()
    }

    /// Physical points as a `2 x n` matrix.
    pub fn values_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(2, self.values.len(), |d, k| self.values[k][d])
    }

    /// Maps parametric gradients (columns of a `2 x m` matrix) at point `k` to physical
    /// gradients.
    pub fn transform_gradients(&self, k: usize, parametric: &DMatrix<f64>) -> DMatrix<f64> {
        let inverse_transpose = &self.inverse_transposes[k];
        let mut physical = DMatrix::zeros(2, parametric.ncols());
        for a in 0..parametric.ncols() {
            let g = inverse_transpose * Vector2::new(parametric[(0, a)], parametric[(1, a)]);
            physical[(0, a)] = g.x;
            physical[(1, a)] = g.y;
        }
        physical
    }
}
