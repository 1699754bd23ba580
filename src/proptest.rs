use crate::basis::{KnotVector, TensorBSplineBasis};
use crate::geometry::BilinearQuad;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::Point2;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Keep coordinates moderate so that geometric quantities stay well scaled
    let range = -10.0..10.0;
    [range.clone(), range.clone()].prop_map(|[x, y]| Point2::new(x, y))
}

/// Parameter points in the closed unit square.
pub fn unit_square_point() -> impl Strategy<Value = Point2<f64>> {
    [0.0..=1.0, 0.0..=1.0].prop_map(|[u, v]| Point2::new(u, v))
}

/// Knot vectors on `[0, 1]` with degree at most `max_degree` and at most `max_interior`
/// interior breakpoints, separated by at least `1e-3`.
pub fn knot_vector(max_degree: usize, max_interior: usize) -> impl Strategy<Value = KnotVector> {
    (1..=max_degree.max(1), vec(0.0..1.0f64, 0..=max_interior)).prop_map(|(degree, mut interior)| {
        interior.sort_by(|a, b| a.total_cmp(b));
        let mut breaks = vec![0.0];
        for x in interior {
            let last = breaks[breaks.len() - 1];
            if x - last > 1e-3 && 1.0 - x > 1e-3 {
                breaks.push(x);
            }
        }
        breaks.push(1.0);
        KnotVector::from_breaks(degree, &breaks).expect("breakpoints are strictly increasing")
    })
}

pub fn tensor_basis(max_degree: usize, max_interior: usize) -> impl Strategy<Value = TensorBSplineBasis> {
    (knot_vector(max_degree, max_interior), knot_vector(max_degree, max_interior))
        .prop_map(|(u, v)| TensorBSplineBasis::new(u, v))
}

/// Convex bilinear patches obtained by perturbing the corners of the unit square.
pub fn convex_bilinear_quad() -> impl Strategy<Value = BilinearQuad> {
    let offset = -0.2..0.2;
    vec(offset, 8).prop_map(|d| {
        BilinearQuad::new([
            Point2::new(0.0 + d[0], 0.0 + d[1]),
            Point2::new(1.0 + d[2], 0.0 + d[3]),
            Point2::new(0.0 + d[4], 1.0 + d[5]),
            Point2::new(1.0 + d[6], 1.0 + d[7]),
        ])
    })
}
