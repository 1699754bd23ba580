use isopatch_quadrature::integrate;
use isopatch_quadrature::univariate::{gauss, gauss_on_interval};

use matrixcompare::assert_scalar_eq;

fn monomial_integral(alpha: i32, a: f64, b: f64) -> f64 {
    (b.powi(alpha + 1) - a.powi(alpha + 1)) / (alpha as f64 + 1.0)
}

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=30 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n);

        assert_eq!(rule.0.len(), n);
        assert!(rule.0.iter().all(|&w| w > 0.0));
        // Points are sorted and lie strictly inside the interval
        assert!(rule.1.windows(2).all(|pair| pair[0][0] < pair[1][0]));
        assert!(rule.1.iter().all(|&[x]| -1.0 < x && x < 1.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let estimated_integral = integrate(&rule, |x| x[0].powi(alpha));
            let exact = monomial_integral(alpha, -1.0, 1.0);
            assert_scalar_eq!(estimated_integral, exact, comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn gauss_rules_on_interval_satisfy_expected_accuracy() {
    let (a, b) = (0.25, 1.5);
    for n in 1..=8 {
        let rule = gauss_on_interval(n, a, b);
        assert!(rule.1.iter().all(|&[x]| a < x && x < b));

        for alpha in 0..=(2 * n - 1) as i32 {
            let estimated_integral = integrate(&rule, |x| x[0].powi(alpha));
            let exact = monomial_integral(alpha, a, b);
            assert_scalar_eq!(estimated_integral, exact, comp = abs, tol = 1e-12);
        }
    }
}
