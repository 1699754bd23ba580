//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::Rule;
use std::f64::consts::PI;

/// Evaluates the Legendre polynomial `P_n` and its derivative at `x`.
///
/// The derivative formula is singular at `|x| == 1`, so this is only valid in the open
/// interval `(-1, 1)`, which is where the roots live.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    // m P_m(x) = (2m - 1) x P_{m-1}(x) - (m - 1) P_{m-2}(x)
    let mut current = 1.0;
    let mut previous = 0.0;
    for m in 1..=n {
        let m = m as f64;
        let next = ((2.0 * m - 1.0) * x * current - (m - 1.0) * previous) / m;
        previous = current;
        current = next;
    }
    let n = n as f64;
    let derivative = n * (x * current - previous) / (x * x - 1.0);
    (current, derivative)
}

/// Gauss–Legendre quadrature on `[-1, 1]` with the given number of points.
///
/// A rule with `n` points integrates polynomials of degree up to `2n - 1` exactly.
/// Points are returned in ascending order.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // Roots are symmetric about the origin, so only the positive half is computed
    let half = (n + 1) / 2;
    for i in 0..half {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..100 {
            let (p, dp_new) = legendre_with_derivative(n, x);
            dp = dp_new;
            let dx = p / dp;
            x -= dx;
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        let (_, dp_final) = legendre_with_derivative(n, x);
        if dp_final.is_finite() {
            dp = dp_final;
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        // `x` is the i-th largest root
        points[n - 1 - i] = [x];
        weights[n - 1 - i] = w;
        points[i] = [-x];
        weights[i] = w;
    }

    (weights, points)
}

/// Gauss–Legendre quadrature mapped onto the interval `[a, b]`.
pub fn gauss_on_interval(num_points: usize, a: f64, b: f64) -> Rule<1> {
    let (weights, points) = gauss(num_points);
    let half_length = 0.5 * (b - a);
    let midpoint = 0.5 * (a + b);
    let weights = weights.into_iter().map(|w| w * half_length).collect();
    let points = points
        .into_iter()
        .map(|[xi]| [midpoint + half_length * xi])
        .collect();
    (weights, points)
}
