use isopatch::basis::{Basis, KnotVector, TensorBSplineBasis};
use isopatch::geometry::{AffineBox, PatchGeometry};
use isopatch::multipatch::{BoxCorner, BoxSide, Interface, MultiBasis, MultiPatch, PatchSide};
use matrixcompare::assert_scalar_eq;
use nalgebra::Point2;
use std::sync::Arc;

#[test]
fn box_side_directions() {
    assert_eq!(BoxSide::West.opposite(), BoxSide::East);
    assert_eq!(BoxSide::North.opposite(), BoxSide::South);
    assert_eq!(BoxSide::East.normal_direction(), 0);
    assert_eq!(BoxSide::East.tangent_direction(), 1);
    assert_eq!(BoxSide::South.normal_direction(), 1);
    assert_eq!(BoxSide::South.tangent_direction(), 0);
    assert_eq!(BoxCorner::NorthWest.param(), Point2::new(0.0, 1.0));
    assert_eq!(BoxCorner::SouthEast.is_upper(), (true, false));
}

#[test]
fn grid_topology() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    assert_eq!(multipatch.num_patches(), 2);
    assert_eq!(
        multipatch.interfaces(),
        &[Interface::new(PatchSide::new(0, BoxSide::East), PatchSide::new(1, BoxSide::West))]
    );
    assert_eq!(multipatch.boundaries().len(), 6);

    let x = multipatch.patch(1).eval(&Point2::new(0.5, 0.5));
    assert_scalar_eq!(x.x, 1.5, comp = abs, tol = 1e-14);
    assert_scalar_eq!(x.y, 0.5, comp = abs, tol = 1e-14);

    let multipatch = MultiPatch::grid(2, 2, 1.0, 1.0).unwrap();
    assert_eq!(multipatch.interfaces().len(), 4);
    assert_eq!(multipatch.boundaries().len(), 8);
    assert!(MultiPatch::grid(0, 1, 1.0, 1.0).is_err());
}

#[test]
fn l_shape_topology() {
    let multipatch = MultiPatch::l_shape().unwrap();
    assert_eq!(multipatch.num_patches(), 3);
    assert_eq!(multipatch.interfaces().len(), 2);
    assert_eq!(multipatch.boundaries().len(), 8);
}

#[test]
fn multipatch_rejects_invalid_interfaces() {
    let patches: Vec<Arc<dyn PatchGeometry>> = vec![Arc::new(AffineBox::unit()), Arc::new(AffineBox::unit())];
    let not_opposite = Interface::new(PatchSide::new(0, BoxSide::East), PatchSide::new(1, BoxSide::East));
    assert!(MultiPatch::new(patches.clone(), vec![not_opposite], Vec::new()).is_err());

    let missing_patch = Interface::new(PatchSide::new(0, BoxSide::East), PatchSide::new(2, BoxSide::West));
    assert!(MultiPatch::new(patches.clone(), vec![missing_patch], Vec::new()).is_err());

    assert!(MultiPatch::new(patches, Vec::new(), vec![PatchSide::new(3, BoxSide::North)]).is_err());
}

#[test]
fn dof_mapper_glues_interfaces_and_eliminates_dirichlet_sides() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let basis = MultiBasis::uniform(&multipatch, 1, 1).unwrap();

    let mapper = basis.dof_mapper(&multipatch, &[]).unwrap();
    assert_eq!(mapper.free_size(), 15);
    assert_eq!(mapper.coupled_size(), 3);
    assert_eq!(mapper.boundary_size(), 0);
    for (&i, &j) in basis
        .basis(0)
        .boundary(BoxSide::East)
        .iter()
        .zip(&basis.basis(1).boundary(BoxSide::West))
    {
        assert_eq!(mapper.index(i, 0), mapper.index(j, 1));
    }

    let mapper = basis.dof_mapper(&multipatch, multipatch.boundaries()).unwrap();
    assert_eq!(mapper.free_size(), 3);
    assert_eq!(mapper.coupled_size(), 1);
    assert_eq!(mapper.boundary_size(), 12);
}

#[test]
fn dof_mapper_rejects_non_conforming_interfaces() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let basis = MultiBasis::new(vec![
        TensorBSplineBasis::uniform(1, 1).unwrap(),
        TensorBSplineBasis::uniform(1, 2).unwrap(),
    ]);
    assert!(basis.dof_mapper(&multipatch, &[]).is_err());
}

#[test]
fn dof_mapper_rejects_interfaces_with_equal_counts_but_different_breaks() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let u = KnotVector::uniform(1, 1, 0.0, 1.0).unwrap();
    let patch_with_breaks =
        |breaks: &[f64]| TensorBSplineBasis::new(u.clone(), KnotVector::from_breaks(1, breaks).unwrap());
    let basis = MultiBasis::new(vec![
        patch_with_breaks(&[0.0, 0.3, 1.0]),
        patch_with_breaks(&[0.0, 0.7, 1.0]),
    ]);
    assert_eq!(
        basis.basis(0).boundary(BoxSide::East).len(),
        basis.basis(1).boundary(BoxSide::West).len()
    );
    let error = basis.dof_mapper(&multipatch, &[]).unwrap_err();
    assert!(error.to_string().contains("non-conforming interface"), "{}", error);

    // Breaks along the interface direction only are compared
    let matching = MultiBasis::new(vec![
        patch_with_breaks(&[0.0, 0.3, 1.0]),
        patch_with_breaks(&[0.0, 0.3, 1.0]),
    ]);
    assert!(matching.dof_mapper(&multipatch, &[]).is_ok());
    let other_u = TensorBSplineBasis::new(
        KnotVector::from_breaks(1, &[0.0, 0.2, 0.6, 1.0]).unwrap(),
        KnotVector::from_breaks(1, &[0.0, 0.3, 1.0]).unwrap(),
    );
    let mixed = MultiBasis::new(vec![patch_with_breaks(&[0.0, 0.3, 1.0]), other_u]);
    assert!(mixed.dof_mapper(&multipatch, &[]).is_ok());
}

#[test]
fn element_offsets_follow_patch_order() {
    let multipatch = MultiPatch::l_shape().unwrap();
    let basis = MultiBasis::uniform(&multipatch, 2, 1).unwrap();
    assert_eq!(basis.total_elements(), 12);
    assert_eq!(basis.element_offsets(), vec![0, 4, 8, 12]);
    assert_eq!(basis.patch_sizes(), vec![16, 16, 16]);
}

#[test]
fn refining_one_element_keeps_interfaces_conforming() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let mut basis = MultiBasis::uniform(&multipatch, 1, 1).unwrap();
    let mut marked = vec![false; basis.total_elements()];
    marked[0] = true;

    let num_marked = basis.refine_elements(&marked, 0, &multipatch).unwrap();
    assert_eq!(num_marked, 1);

    assert_eq!(basis.basis(0).knots(0).breaks(), vec![0.0, 0.25, 0.5, 1.0]);
    assert_eq!(basis.basis(0).knots(1).breaks(), vec![0.0, 0.25, 0.5, 1.0]);
    assert_eq!(basis.basis(1).knots(0).breaks(), vec![0.0, 0.5, 1.0]);
    assert_eq!(basis.basis(1).knots(1).breaks(), vec![0.0, 0.25, 0.5, 1.0]);
    assert_eq!(basis.total_elements(), 9 + 6);

    assert!(basis.dof_mapper(&multipatch, &[]).is_ok());
}

#[test]
fn refinement_ring_extends_marked_spans() {
    let multipatch = MultiPatch::single(Arc::new(AffineBox::unit()));
    let mut basis = MultiBasis::uniform(&multipatch, 2, 3).unwrap();
    let mut marked = vec![false; basis.total_elements()];
    marked[0] = true;

    basis.refine_elements(&marked, 1, &multipatch).unwrap();
    assert_eq!(basis.basis(0).knots(0).num_spans(), 6);
    assert_eq!(basis.basis(0).knots(1).num_spans(), 6);
    assert!(basis.refine_elements(&[true], 0, &multipatch).is_err());
}

#[test]
fn interface_repair_requires_equal_degrees() {
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let mut basis = MultiBasis::new(vec![
        TensorBSplineBasis::uniform(1, 1).unwrap(),
        TensorBSplineBasis::uniform(2, 1).unwrap(),
    ]);
    assert!(basis.repair_interfaces(&multipatch).is_err());
}

#[test]
fn uniform_refinement_and_degree_elevation() {
    let multipatch = MultiPatch::l_shape().unwrap();
    let mut basis = MultiBasis::uniform(&multipatch, 1, 0).unwrap();
    basis.uniform_refine();
    assert_eq!(basis.total_elements(), 12);

    let elevated = basis.with_degree_elevation(1);
    assert_eq!(elevated.basis(2).degree(0), 2);
    assert_eq!(elevated.total_elements(), 12);
    assert!(elevated.dof_mapper(&multipatch, multipatch.boundaries()).is_ok());
}
