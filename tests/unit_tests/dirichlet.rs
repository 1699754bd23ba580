use isopatch::dirichlet::DirichletBoundary;
use isopatch::field::MultiPatchField;
use isopatch::function::FunctionExpr;
use isopatch::multipatch::{BoxSide, MultiBasis, MultiPatch, PatchSide};
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, Point2};
use std::sync::Arc;

fn linear(x: &Point2<f64>) -> f64 {
    1.0 + 2.0 * x.x - 3.0 * x.y
}

#[test]
fn fixed_part_interpolates_linear_data_exactly() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 2, 1).unwrap();
    let dirichlet = DirichletBoundary::on_boundary(&multipatch, Arc::new(FunctionExpr::scalar(linear)));
    let mapper = basis.dof_mapper(&multipatch, dirichlet.sides()).unwrap();

    let fixed = dirichlet.fixed_part(&basis, &multipatch, &mapper).unwrap();
    assert_eq!(fixed.shape(), (mapper.boundary_size(), 1));

    let interior = DMatrix::zeros(mapper.free_size(), 1);
    let field = MultiPatchField::from_solution(basis, &mapper, &interior, &fixed).unwrap();
    for t in [0.0, 0.3, 0.5, 0.9, 1.0] {
        let cases = [
            (0, Point2::new(0.0, t), Point2::new(0.0, t)),
            (0, Point2::new(t, 0.0), Point2::new(t, 0.0)),
            (1, Point2::new(1.0, t), Point2::new(2.0, t)),
            (1, Point2::new(t, 1.0), Point2::new(1.0 + t, 1.0)),
        ];
        for (patch, param, x) in cases {
            assert_scalar_eq!(field.value(patch, &param)[0], linear(&x), comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn fixed_part_of_partial_boundary() {
    let multipatch = MultiPatch::single(Arc::new(isopatch::geometry::AffineBox::unit()));
    let basis = MultiBasis::uniform(&multipatch, 1, 2).unwrap();
    let west = PatchSide::new(0, BoxSide::West);
    let dirichlet = DirichletBoundary::new(vec![west], Arc::new(FunctionExpr::scalar(|x| x.y)));
    let mapper = basis.dof_mapper(&multipatch, dirichlet.sides()).unwrap();
    assert_eq!(mapper.boundary_size(), 4);

    let fixed = dirichlet.fixed_part(&basis, &multipatch, &mapper).unwrap();
    for (j, &i) in basis.basis(0).boundary(BoxSide::West).iter().enumerate() {
        let expected = j as f64 / 3.0;
        assert_scalar_eq!(fixed[(mapper.bindex(i, 0), 0)], expected, comp = abs, tol = 1e-14);
    }
}

#[test]
fn vector_valued_boundary_data() {
    let multipatch = MultiPatch::single(Arc::new(isopatch::geometry::AffineBox::unit()));
    let basis = MultiBasis::uniform(&multipatch, 2, 0).unwrap();
    let values = Arc::new(FunctionExpr::vector2(|x| nalgebra::Vector2::new(x.x, -x.y)));
    let dirichlet = DirichletBoundary::on_boundary(&multipatch, values);
    let mapper = basis.dof_mapper(&multipatch, dirichlet.sides()).unwrap();
    let fixed = dirichlet.fixed_part(&basis, &multipatch, &mapper).unwrap();
    assert_eq!(fixed.ncols(), 2);

    let corner = basis.basis(0).function_at_corner(isopatch::multipatch::BoxCorner::NorthEast);
    let row = mapper.bindex(corner, 0);
    assert_scalar_eq!(fixed[(row, 0)], 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(fixed[(row, 1)], -1.0, comp = abs, tol = 1e-14);
}

#[test]
fn fixed_part_rejects_inconsistent_sides() {
    let multipatch = MultiPatch::single(Arc::new(isopatch::geometry::AffineBox::unit()));
    let basis = MultiBasis::uniform(&multipatch, 1, 1).unwrap();
    let values = Arc::new(FunctionExpr::constant(1.0));

    let missing_patch = DirichletBoundary::new(vec![PatchSide::new(1, BoxSide::West)], values.clone());
    let mapper = basis.dof_mapper(&multipatch, &[]).unwrap();
    assert!(missing_patch.fixed_part(&basis, &multipatch, &mapper).is_err());

    // The mapper must eliminate the sides that carry data
    let dirichlet = DirichletBoundary::new(vec![PatchSide::new(0, BoxSide::North)], values);
    let mapper = basis
        .dof_mapper(&multipatch, &[PatchSide::new(0, BoxSide::South)])
        .unwrap();
    assert!(dirichlet.fixed_part(&basis, &multipatch, &mapper).is_err());
}
