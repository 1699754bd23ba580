use super::{Basis, BasisValues, BSplineBasis, Element, KnotVector};
use crate::multipatch::{BoxCorner, BoxSide};
use nalgebra::{DMatrix, Point2};

/// A bivariate tensor-product B-spline basis.
///
/// Function `(i, j)` has the global index `i + n_u * j`, and element `(e_u, e_v)` has the index
/// `e_u + m_u * e_v`, where `n_u` and `m_u` are the number of functions and spans in the first
/// direction.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBSplineBasis {
    components: [BSplineBasis; 2],
}

/// Active functions together with values and parametric gradients at a single point.
#[derive(Debug, Clone)]
pub struct PointEvaluation {
    pub active: Vec<usize>,
    pub values: Vec<f64>,
    /// `2 x num_active`
    pub gradients: DMatrix<f64>,
}

impl TensorBSplineBasis {
    pub fn new(u: KnotVector, v: KnotVector) -> Self {
        Self {
            components: [BSplineBasis::new(u), BSplineBasis::new(v)],
        }
    }

    /// Uniform basis on the unit square with the same degree and number of interior knots in
    /// both directions.
    pub fn uniform(degree: usize, num_interior: usize) -> eyre::Result<Self> {
        let knots = KnotVector::uniform(degree, num_interior, 0.0, 1.0)?;
        Ok(Self::new(knots.clone(), knots))
    }

    pub fn component(&self, direction: usize) -> &BSplineBasis {
        &self.components[direction]
    }

    pub fn knots(&self, direction: usize) -> &KnotVector {
        self.components[direction].knots()
    }

    pub fn knots_mut(&mut self, direction: usize) -> &mut KnotVector {
        self.components[direction].knots_mut()
    }

    /// Number of functions in each direction.
    pub fn size_per_direction(&self) -> [usize; 2] {
        [self.components[0].size(), self.components[1].size()]
    }

    /// Number of elements in each direction.
    pub fn elements_per_direction(&self) -> [usize; 2] {
        [self.components[0].num_elements(), self.components[1].num_elements()]
    }

    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        i + self.components[0].size() * j
    }

    pub fn tensor_index(&self, index: usize) -> (usize, usize) {
        let n_u = self.components[0].size();
        (index % n_u, index / n_u)
    }

    /// The function that does not vanish at the given corner of the parameter domain.
    pub fn function_at_corner(&self, corner: BoxCorner) -> usize {
        let (right, top) = corner.is_upper();
        let i = self.components[0].function_at_end(right);
        let j = self.components[1].function_at_end(top);
        self.flat_index(i, j)
    }

    /// Functions that do not vanish on the given side, ordered along the side.
    pub fn boundary(&self, side: BoxSide) -> Vec<usize> {
        let [n_u, n_v] = self.size_per_direction();
        match side {
            BoxSide::West => (0..n_v).map(|j| self.flat_index(0, j)).collect(),
            BoxSide::East => (0..n_v).map(|j| self.flat_index(n_u - 1, j)).collect(),
            BoxSide::South => (0..n_u).map(|i| self.flat_index(i, 0)).collect(),
            BoxSide::North => (0..n_u).map(|i| self.flat_index(i, n_v - 1)).collect(),
        }
    }

    /// Greville point of every function.
    pub fn greville_points(&self) -> Vec<Point2<f64>> {
        let gu = self.components[0].knots().greville();
        let gv = self.components[1].knots().greville();
        let mut points = Vec::with_capacity(gu.len() * gv.len());
        for &v in &gv {
            for &u in &gu {
                points.push(Point2::new(u, v));
            }
        }
        points
    }

    /// Element index of the element with span indices `(e_u, e_v)`.
    pub fn element_index(&self, e_u: usize, e_v: usize) -> usize {
        e_u + self.components[0].num_elements() * e_v
    }

    pub fn element_spans(&self, index: usize) -> (usize, usize) {
        let m_u = self.components[0].num_elements();
        (index % m_u, index / m_u)
    }

    pub fn uniform_refine(&mut self) {
        for component in &mut self.components {
            component.knots_mut().uniform_refine();
        }
    }

    /// A basis with the same breakpoints and every degree raised by `increment`. The smoothness
    /// across breaks is kept, so the elevated space contains this one.
    pub fn with_degree_elevation(&self, increment: usize) -> Self {
        Self::new(self.knots(0).elevated(increment), self.knots(1).elevated(increment))
    }

    /// Evaluates all active functions at a single parametric point.
    pub fn eval_point(&self, param: &Point2<f64>) -> PointEvaluation {
        let (first_u, values_u, ders_u) = self.components[0].eval_at(param.x);
        let (first_v, values_v, ders_v) = self.components[1].eval_at(param.y);
        let n = values_u.len() * values_v.len();

        let mut active = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut gradients = DMatrix::zeros(2, n);
        let mut a = 0;
        for (jv, (nv, dnv)) in values_v.iter().zip(&ders_v).enumerate() {
            for (iu, (nu, dnu)) in values_u.iter().zip(&ders_u).enumerate() {
                active.push(self.flat_index(first_u + iu, first_v + jv));
                values.push(nu * nv);
                gradients[(0, a)] = dnu * nv;
                gradients[(1, a)] = nu * dnv;
                a += 1;
            }
        }
        PointEvaluation {
            active,
            values,
            gradients,
        }
    }
}

impl Basis for TensorBSplineBasis {
    fn dim(&self) -> usize {
        2
    }

    fn size(&self) -> usize {
        self.components[0].size() * self.components[1].size()
    }

    fn degree(&self, direction: usize) -> usize {
        self.components[direction].knots().degree()
    }

    fn num_elements(&self) -> usize {
        self.components[0].num_elements() * self.components[1].num_elements()
    }

    fn element(&self, index: usize) -> Element {
        let (e_u, e_v) = self.element_spans(index);
        let (u0, u1) = self.components[0].element_interval(e_u);
        let (v0, v1) = self.components[1].element_interval(e_v);
        Element {
            index,
            lower: vec![u0, v0],
            upper: vec![u1, v1],
        }
    }

    fn elements(&self) -> Vec<Element> {
        let breaks_u = self.components[0].knots().breaks();
        let breaks_v = self.components[1].knots().breaks();
        let mut elements = Vec::with_capacity(self.num_elements());
        for v in breaks_v.windows(2) {
            for u in breaks_u.windows(2) {
                elements.push(Element {
                    index: elements.len(),
                    lower: vec![u[0], v[0]],
                    upper: vec![u[1], v[1]],
                });
            }
        }
        elements
    }

    fn active(&self, element: &Element) -> Vec<usize> {
        let center = element.center();
        let first_u = self.components[0].first_active(center[0]);
        let first_v = self.components[1].first_active(center[1]);
        let p_u = self.degree(0);
        let p_v = self.degree(1);
        let mut active = Vec::with_capacity((p_u + 1) * (p_v + 1));
        for j in first_v..=first_v + p_v {
            for i in first_u..=first_u + p_u {
                active.push(self.flat_index(i, j));
            }
        }
        active
    }

    fn eval_all_ders(&self, element: &Element, points: &DMatrix<f64>, order: usize) -> BasisValues {
        assert!(order <= 1, "only derivatives up to first order are supported");
        assert_eq!(points.nrows(), 2, "points must be two-dimensional");
        let center = element.center();
        let mu_u = self.components[0].knots().span_index(center[0]);
        let mu_v = self.components[1].knots().span_index(center[1]);
        let n_u = self.degree(0) + 1;
        let n_v = self.degree(1) + 1;
        let num_points = points.ncols();

        let mut values = DMatrix::zeros(n_u * n_v, num_points);
        let mut du = DMatrix::zeros(n_u * n_v, num_points);
        let mut dv = DMatrix::zeros(n_u * n_v, num_points);
        for k in 0..num_points {
            let (values_u, ders_u) = self.components[0].eval_nonzero(mu_u, points[(0, k)]);
            let (values_v, ders_v) = self.components[1].eval_nonzero(mu_v, points[(1, k)]);
            for j in 0..n_v {
                for i in 0..n_u {
                    let a = i + n_u * j;
                    values[(a, k)] = values_u[i] * values_v[j];
                    du[(a, k)] = ders_u[i] * values_v[j];
                    dv[(a, k)] = values_u[i] * ders_v[j];
                }
            }
        }

        BasisValues {
            values,
            derivatives: if order >= 1 { vec![du, dv] } else { Vec::new() },
        }
    }
}
