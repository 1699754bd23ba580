use super::greville_interpolant;
use isopatch::basis::Basis;
use isopatch::dof_mapper::DofMapperBuilder;
use isopatch::field::{FieldGradient, MultiPatchField};
use isopatch::function::PatchFunction;
use isopatch::geometry::{BilinearQuad, GeometryFlags, MapData};
use isopatch::multipatch::{MultiBasis, MultiPatch};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Point2};
use std::sync::Arc;

fn linear(x: &Point2<f64>) -> DVector<f64> {
    DVector::from_element(1, 0.5 + x.x - 2.0 * x.y)
}

#[test]
fn from_patch_coefficients_checks_shapes() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 1, 1).unwrap();
    assert!(MultiPatchField::from_patch_coefficients(basis.clone(), vec![DMatrix::zeros(9, 1)]).is_err());
    assert!(
        MultiPatchField::from_patch_coefficients(basis.clone(), vec![DMatrix::zeros(9, 1), DMatrix::zeros(8, 1)])
            .is_err()
    );
    assert!(
        MultiPatchField::from_patch_coefficients(basis.clone(), vec![DMatrix::zeros(9, 1), DMatrix::zeros(9, 2)])
            .is_err()
    );
    let field =
        MultiPatchField::from_patch_coefficients(basis, vec![DMatrix::zeros(9, 2), DMatrix::zeros(9, 2)]).unwrap();
    assert_eq!(field.num_components(), 2);
}

#[test]
fn linear_interpolant_values_and_gradients() {
    let multipatch = MultiPatch::grid(2, 2, 2.0, 2.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 2, 1).unwrap();
    let field = greville_interpolant(&basis, &multipatch, linear);

    let param = Point2::new(0.3, 0.7);
    for patch in 0..4 {
        let x = multipatch.patch(patch).eval(&param);
        assert_scalar_eq!(field.value(patch, &param)[0], linear(&x)[0], comp = abs, tol = 1e-12);

        let gradient = field.physical_gradient(patch, &param, &multipatch).unwrap();
        assert_matrix_eq!(gradient, DMatrix::from_row_slice(1, 2, &[1.0, -2.0]), comp = abs, tol = 1e-12);
    }

    // Patches of the 2x2 grid are unit squares
    let parametric = field.parametric_gradient(3, &param);
    assert_matrix_eq!(parametric, DMatrix::from_row_slice(1, 2, &[1.0, -2.0]), comp = abs, tol = 1e-12);
}

#[test]
fn element_evaluation_matches_point_evaluation() {
    let multipatch = MultiPatch::single(Arc::new(BilinearQuad::new([
        Point2::new(0.0, 0.0),
        Point2::new(2.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(2.5, 1.5),
    ])));
    let basis = MultiBasis::uniform(&multipatch, 2, 2).unwrap();
    let field = greville_interpolant(&basis, &multipatch, |x| DVector::from_vec(vec![x.x * x.y, x.x]));
    let element = &basis.basis(0).elements()[4];
    let points = DMatrix::from_column_slice(2, 2, &[0.4, 0.45, 0.5, 0.6]);

    let values = field.eval_element(0, element, &points);
    let map = MapData::compute(multipatch.patch(0), &points, GeometryFlags::STIFFNESS).unwrap();
    let physical = values.physical_gradients(&map);
    for k in 0..2 {
        let param = Point2::new(points[(0, k)], points[(1, k)]);
        let value = field.value(0, &param);
        assert_matrix_eq!(values.values.column(k), value, comp = abs, tol = 1e-12);
        assert_matrix_eq!(values.gradients[k], field.parametric_gradient(0, &param), comp = abs, tol = 1e-12);
        let expected = field.physical_gradient(0, &param, &multipatch).unwrap();
        assert_matrix_eq!(physical[k], expected, comp = abs, tol = 1e-10);
    }
}

#[test]
fn from_solution_uses_fixed_part_for_eliminated_dofs() {
    let basis = MultiBasis::new(vec![
        isopatch::basis::TensorBSplineBasis::uniform(1, 0).unwrap(),
        isopatch::basis::TensorBSplineBasis::uniform(1, 0).unwrap(),
    ]);

    // Two bilinear patches glued along one edge, with the west edge of patch 0 eliminated
    let mut builder = DofMapperBuilder::new(&[4, 4]);
    builder.match_dof(0, 1, 1, 0);
    builder.match_dof(0, 3, 1, 2);
    builder.eliminate_dof(0, 0);
    builder.eliminate_dof(2, 0);
    let mapper = builder.finalize();
    assert_eq!(mapper.free_size(), 4);

    let solution = DMatrix::from_column_slice(4, 1, &[10.0, 11.0, 12.0, 13.0]);
    let fixed = DMatrix::from_column_slice(2, 1, &[-1.0, -2.0]);
    let field = MultiPatchField::from_solution(basis.clone(), &mapper, &solution, &fixed).unwrap();

    let c0 = field.coefficients(0);
    let c1 = field.coefficients(1);
    assert_eq!(c0[(0, 0)], -1.0);
    assert_eq!(c0[(2, 0)], -2.0);
    assert_eq!(c0[(1, 0)], c1[(0, 0)]);
    assert_eq!(c0[(3, 0)], c1[(2, 0)]);

    assert!(MultiPatchField::from_solution(basis.clone(), &mapper, &DMatrix::zeros(3, 1), &fixed).is_err());
    assert!(MultiPatchField::from_solution(basis, &mapper, &solution, &DMatrix::zeros(1, 1)).is_err());
}

#[test]
fn block_solution_is_split_into_components() {
    let multipatch = MultiPatch::grid(1, 1, 1.0, 1.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 1, 0).unwrap();
    let mapper = basis.dof_mapper(&multipatch, &[]).unwrap();
    let solution = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    let field = MultiPatchField::from_block_solution(basis.clone(), &mapper, &solution, 2).unwrap();
    assert_eq!(field.num_components(), 2);
    assert_eq!(field.coefficients(0).column(0).as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(field.coefficients(0).column(1).as_slice(), &[5.0, 6.0, 7.0, 8.0]);

    assert!(MultiPatchField::from_block_solution(basis, &mapper, &solution, 3).is_err());
}

#[test]
fn field_gradient_is_a_parametric_function() {
    let multipatch = MultiPatch::grid(2, 1, 4.0, 1.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 1, 1).unwrap();
    let field = greville_interpolant(&basis, &multipatch, |x| DVector::from_vec(vec![3.0 * x.x, x.y]));
    let gradient = FieldGradient::new(field, multipatch);

    assert!(gradient.is_parametric());
    assert_eq!(gradient.target_dim(), 4);
    let points = DMatrix::from_column_slice(2, 2, &[0.1, 0.2, 0.9, 0.5]);
    let values = gradient.eval(1, &points);
    for k in 0..2 {
        assert_matrix_eq!(
            values.column(k),
            DVector::from_vec(vec![3.0, 0.0, 0.0, 1.0]),
            comp = abs,
            tol = 1e-12
        );
    }
}
