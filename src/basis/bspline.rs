use super::{Basis, BasisValues, Element, KnotVector};
use nalgebra::DMatrix;

/// A univariate B-spline basis.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineBasis {
    knots: KnotVector,
}

impl BSplineBasis {
    pub fn new(knots: KnotVector) -> Self {
        Self { knots }
    }

    pub fn knots(&self) -> &KnotVector {
        &self.knots
    }

    pub fn knots_mut(&mut self) -> &mut KnotVector {
        &mut self.knots
    }

    /// Parametric interval of span element `index`.
    pub fn element_interval(&self, index: usize) -> (f64, f64) {
        let breaks = self.knots.breaks();
        (breaks[index], breaks[index + 1])
    }

    /// Knot span index of the element containing `[a, b]`.
    fn span_of_interval(&self, a: f64, b: f64) -> usize {
        self.knots.span_index(0.5 * (a + b))
    }

    /// Index of the first active function on the span containing `x`.
    pub fn first_active(&self, x: f64) -> usize {
        self.knots.span_index(x) - self.knots.degree()
    }

    /// Values and first derivatives of the `degree + 1` functions that are active on knot
    /// span `mu`, evaluated at `x`.
    pub fn eval_nonzero(&self, mu: usize, x: f64) -> (Vec<f64>, Vec<f64>) {
        let t = self.knots.knots();
        let p = self.knots.degree();

        // ndu holds basis values in the upper triangle and knot differences in the lower
        let mut ndu = vec![vec![0.0; p + 1]; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        ndu[0][0] = 1.0;
        for j in 1..=p {
            left[j] = x - t[mu + 1 - j];
            right[j] = t[mu + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                ndu[j][r] = right[r + 1] + left[j - r];
                let temp = if ndu[j][r] != 0.0 { ndu[r][j - 1] / ndu[j][r] } else { 0.0 };
                ndu[r][j] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            ndu[j][j] = saved;
        }

        let values: Vec<f64> = (0..=p).map(|r| ndu[r][p]).collect();
        let mut derivatives = vec![0.0; p + 1];
        if p > 0 {
            for r in 0..=p {
                let mut d = 0.0;
                if r >= 1 && ndu[p][r - 1] != 0.0 {
                    d += ndu[r - 1][p - 1] / ndu[p][r - 1];
                }
                if r < p && ndu[p][r] != 0.0 {
                    d -= ndu[r][p - 1] / ndu[p][r];
                }
                derivatives[r] = p as f64 * d;
            }
        }
        (values, derivatives)
    }

    /// Index of the first active function together with values and derivatives of all
    /// active functions at an arbitrary parameter `x`.
    pub fn eval_at(&self, x: f64) -> (usize, Vec<f64>, Vec<f64>) {
        let mu = self.knots.span_index(x);
        let (values, derivatives) = self.eval_nonzero(mu, x);
        (mu - self.knots.degree(), values, derivatives)
    }

    /// Index of the function that does not vanish at the left (`false`) or right (`true`)
    /// end of the parameter interval.
    pub fn function_at_end(&self, right: bool) -> usize {
        if right {
            self.knots.num_basis() - 1
        } else {
            0
        }
    }
}

impl Basis for BSplineBasis {
    fn dim(&self) -> usize {
        1
    }

    fn size(&self) -> usize {
        self.knots.num_basis()
    }

    fn degree(&self, _direction: usize) -> usize {
        self.knots.degree()
    }

    fn num_elements(&self) -> usize {
        self.knots.num_spans()
    }

    fn element(&self, index: usize) -> Element {
        let (a, b) = self.element_interval(index);
        Element {
            index,
            lower: vec![a],
            upper: vec![b],
        }
    }

    fn active(&self, element: &Element) -> Vec<usize> {
        let mu = self.span_of_interval(element.lower[0], element.upper[0]);
        (mu - self.knots.degree()..=mu).collect()
    }

    fn eval_all_ders(&self, element: &Element, points: &DMatrix<f64>, order: usize) -> BasisValues {
        assert!(order <= 1, "only derivatives up to first order are supported");
        assert_eq!(points.nrows(), 1, "points must be one-dimensional");
        let mu = self.span_of_interval(element.lower[0], element.upper[0]);
        let n = self.knots.degree() + 1;

        let mut values = DMatrix::zeros(n, points.ncols());
        let mut derivatives = DMatrix::zeros(n, points.ncols());
        for (k, x) in points.iter().enumerate() {
            let (v, d) = self.eval_nonzero(mu, *x);
            for a in 0..n {
                values[(a, k)] = v[a];
                derivatives[(a, k)] = d[a];
            }
        }

        BasisValues {
            values,
            derivatives: if order >= 1 { vec![derivatives] } else { Vec::new() },
        }
    }
}
