use super::greville_interpolant;
use isopatch::function::PatchFunction;
use isopatch::multipatch::{MultiBasis, MultiPatch};
use isopatch::plaplace::{PLaplaceCoefficient, PLaplaceOptions};
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, DVector, Point2};

#[test]
fn coefficient_of_linear_field_is_constant() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 2, 1).unwrap();
    let field = greville_interpolant(&basis, &multipatch, |x: &Point2<f64>| {
        DVector::from_element(1, 0.5 + x.x - 2.0 * x.y)
    });

    // |∇w|² = 5, so (4 + 5)^{1/2} = 3
    let coefficient = PLaplaceCoefficient::new(field, multipatch, 3.0, 2.0).unwrap();
    assert_eq!(coefficient.target_dim(), 1);
    assert!(coefficient.is_parametric());
    let points = DMatrix::from_column_slice(2, 3, &[0.1, 0.2, 0.5, 0.5, 0.9, 1.0]);
    for patch in 0..2 {
        let values = coefficient.eval(patch, &points);
        assert_eq!(values.shape(), (1, 3));
        for value in values.iter() {
            assert_scalar_eq!(*value, 3.0, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn coefficient_requires_scalar_field() {
    let multipatch = MultiPatch::grid(1, 1, 1.0, 1.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 1, 0).unwrap();
    let field = greville_interpolant(&basis, &multipatch, |x: &Point2<f64>| DVector::from_column_slice(&[x.x, x.y]));
    assert!(PLaplaceCoefficient::new(field, multipatch, 1.5, 1.0).is_err());
}

#[test]
fn options_default_to_twenty_direct_solves() {
    let options: PLaplaceOptions = serde_json::from_str(r#"{"p": 1.1}"#).unwrap();
    assert_eq!(options.p, 1.1);
    assert_eq!(options.epsilon, 1.0);
    assert_eq!(options.iterations, 20);
    assert_eq!(options.tolerance, None);
}
