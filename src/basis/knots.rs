use eyre::eyre;
use serde::{Deserialize, Serialize};

/// Two breakpoints closer than this are considered equal.
pub(crate) const BREAK_TOLERANCE: f64 = 1e-12;

/// An open (clamped) knot vector.
///
/// The end knots have multiplicity `degree + 1`, and every interior break is repeated
/// `multiplicity` times, so the functions are `C^{degree - multiplicity}` across breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnotVector {
    degree: usize,
    multiplicity: usize,
    knots: Vec<f64>,
}

impl KnotVector {
    /// Builds the knot vector with the given strictly increasing breakpoints.
    pub fn from_breaks(degree: usize, breaks: &[f64]) -> eyre::Result<Self> {
        if breaks.len() < 2 {
            return Err(eyre!("a knot vector needs at least two breakpoints, got {}", breaks.len()));
        }
        if breaks.windows(2).any(|pair| !(pair[1] - pair[0] > BREAK_TOLERANCE)) {
            return Err(eyre!("breakpoints must be strictly increasing: {:?}", breaks));
        }

        Ok(Self::from_breaks_unchecked(degree, 1, breaks))
    }

    /// Builds a knot vector on `[a, b]` with `num_interior` equally spaced interior knots.
    pub fn uniform(degree: usize, num_interior: usize, a: f64, b: f64) -> eyre::Result<Self> {
        let num_spans = num_interior + 1;
        let breaks: Vec<f64> = (0..=num_spans)
            .map(|i| a + (b - a) * i as f64 / num_spans as f64)
            .collect();
        Self::from_breaks(degree, &breaks)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Multiplicity of every interior break.
    pub fn multiplicity(&self) -> usize {
        self.multiplicity
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn first(&self) -> f64 {
        self.knots[0]
    }

    pub fn last(&self) -> f64 {
        self.knots[self.knots.len() - 1]
    }

    /// Number of B-spline functions defined by the knot vector.
    pub fn num_basis(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// Distinct knot values in increasing order.
    pub fn breaks(&self) -> Vec<f64> {
        let mut breaks: Vec<f64> = Vec::with_capacity(self.knots.len());
        for &knot in &self.knots {
            match breaks.last() {
                Some(&previous) if knot - previous <= BREAK_TOLERANCE => {}
                _ => breaks.push(knot),
            }
        }
        breaks
    }

    pub fn num_spans(&self) -> usize {
        (self.knots.len() - 2 * self.degree - 2) / self.multiplicity + 1
    }

    /// Index `mu` of the knot span `[t_mu, t_{mu+1})` containing `x`.
    ///
    /// Points outside the knot range are clamped to the first or last span, and the right end
    /// point belongs to the last span.
    pub fn span_index(&self, x: f64) -> usize {
        let p = self.degree;
        let n = self.num_basis();
        if x >= self.knots[n] {
            return n - 1;
        }
        if x <= self.knots[p] {
            return p;
        }
        // Largest mu in [p, n - 1] with knots[mu] <= x
        let mut low = p;
        let mut high = n;
        while high - low > 1 {
            let mid = (low + high) / 2;
            if self.knots[mid] <= x {
                low = mid;
            } else {
                high = mid;
            }
        }
        low
    }

    /// Greville abscissae, one per basis function.
    pub fn greville(&self) -> Vec<f64> {
        let p = self.degree;
        (0..self.num_basis())
            .map(|i| {
                if p == 0 {
                    0.5 * (self.knots[i] + self.knots[i + 1])
                } else {
                    self.knots[i + 1..=i + p].iter().sum::<f64>() / p as f64
                }
            })
            .collect()
    }

    /// Whether both knot vectors define the same spline space, up to [`BREAK_TOLERANCE`].
    pub fn conforms_to(&self, other: &KnotVector) -> bool {
        self.degree == other.degree
            && self.knots.len() == other.knots.len()
            && self
                .knots
                .iter()
                .zip(&other.knots)
                .all(|(a, b)| (a - b).abs() <= BREAK_TOLERANCE)
    }

    /// Inserts the given interior values. Values that coincide with existing breaks are
    /// ignored.
    pub fn insert_breaks(&mut self, values: &[f64]) -> usize {
        let mut breaks = self.breaks();
        let mut inserted = 0;
        for &x in values {
            if x <= self.first() || x >= self.last() {
                continue;
            }
            if breaks.iter().all(|b| (b - x).abs() > BREAK_TOLERANCE) {
                breaks.push(x);
                inserted += 1;
            }
        }
        if inserted > 0 {
            breaks.sort_by(|a, b| a.total_cmp(b));
            *self = Self::from_breaks_unchecked(self.degree, self.multiplicity, &breaks);
        }
        inserted
    }

    /// Inserts the midpoint of every span.
    pub fn uniform_refine(&mut self) {
        let breaks = self.breaks();
        let midpoints: Vec<f64> = breaks.windows(2).map(|pair| 0.5 * (pair[0] + pair[1])).collect();
        self.insert_breaks(&midpoints);
    }

    /// Raises the degree by `increment` and the interior multiplicity by the same amount, so
    /// that the spline space of `self` is contained in the elevated space.
    pub fn elevated(&self, increment: usize) -> Self {
        Self::from_breaks_unchecked(self.degree + increment, self.multiplicity + increment, &self.breaks())
    }

    fn from_breaks_unchecked(degree: usize, multiplicity: usize, breaks: &[f64]) -> Self {
        let first = breaks[0];
        let last = breaks[breaks.len() - 1];
        let mut knots = vec![first; degree + 1];
        for &x in &breaks[1..breaks.len() - 1] {
            knots.extend(std::iter::repeat(x).take(multiplicity));
        }
        knots.extend(std::iter::repeat(last).take(degree + 1));
        Self {
            degree,
            multiplicity,
            knots,
        }
    }
}
