use isopatch::assembly::visitors::PoissonVisitor;
use isopatch::assembly::{assemble_multipatch, AssemblyOptions, SparseSystem};
use isopatch::dirichlet::DirichletBoundary;
use isopatch::estimate::{compute_element_norms, H1SeminormError, L2Error};
use isopatch::field::MultiPatchField;
use isopatch::function::{FunctionExpr, PatchFunction};
use isopatch::multipatch::{BoxSide, MultiBasis, MultiPatch, PatchSide};
use isopatch::solve::{solve_with_fallback, SolverMethod, SolverOptions};
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, Vector2};
use std::sync::Arc;

/// Solves `-Δu = f` with the given Dirichlet data and returns the discrete solution.
fn solve_poisson(
    multipatch: &MultiPatch,
    basis: &MultiBasis,
    source: Arc<dyn PatchFunction>,
    dirichlet: &DirichletBoundary,
    method: SolverMethod,
) -> MultiPatchField {
    let mapper = basis.dof_mapper(multipatch, dirichlet.sides()).unwrap();
    let fixed = dirichlet.fixed_part(basis, multipatch, &mapper).unwrap();
    let system = assemble_multipatch(
        &PoissonVisitor::new(source),
        basis,
        multipatch,
        std::slice::from_ref(&fixed),
        SparseSystem::single(mapper.clone(), 1),
        &AssemblyOptions::default(),
    )
    .unwrap();
    let (matrix, rhs) = system.into_parts();
    let options = SolverOptions {
        tolerance: Some(1e-13),
        method,
        ..SolverOptions::default()
    };
    let (solution, _) = solve_with_fallback(&matrix, &rhs.column(0).into_owned(), None, &options).unwrap();
    let solution = DMatrix::from_column_slice(solution.len(), 1, solution.as_slice());
    MultiPatchField::from_solution(basis.clone(), &mapper, &solution, &fixed).unwrap()
}

fn errors(
    field: &MultiPatchField,
    multipatch: &MultiPatch,
    exact: &dyn PatchFunction,
    exact_gradient: &dyn PatchFunction,
) -> (f64, f64) {
    let l2 = compute_element_norms(&L2Error { field, exact }, field.basis(), multipatch, 1).unwrap();
    let h1 = H1SeminormError { field, exact_gradient };
    let h1 = compute_element_norms(&h1, field.basis(), multipatch, 1).unwrap();
    (l2.total, h1.total)
}

#[test]
fn quadratic_solution_is_reproduced_on_multipatch_domains() {
    // u = x² + y² lies in the quadratic spline space of every affine patch
    let exact = FunctionExpr::scalar(|x| x.x * x.x + x.y * x.y);
    let exact_gradient = FunctionExpr::vector2(|x| Vector2::new(2.0 * x.x, 2.0 * x.y));
    let source: Arc<dyn PatchFunction> = Arc::new(FunctionExpr::constant(-4.0));

    for multipatch in [MultiPatch::grid(2, 2, 2.0, 1.0).unwrap(), MultiPatch::l_shape().unwrap()] {
        let dirichlet = DirichletBoundary::on_boundary(&multipatch, Arc::new(exact.clone()));
        let basis = MultiBasis::uniform(&multipatch, 2, 2).unwrap();
        for method in [SolverMethod::Direct, SolverMethod::Iterative] {
            let field = solve_poisson(&multipatch, &basis, source.clone(), &dirichlet, method);
            let (l2, h1) = errors(&field, &multipatch, &exact, &exact_gradient);
            assert_scalar_eq!(l2, 0.0, comp = abs, tol = 1e-9);
            assert_scalar_eq!(h1, 0.0, comp = abs, tol = 1e-8);
        }
    }
}

#[test]
fn natural_boundary_conditions_on_free_sides() {
    // u = 3x - 1 has zero normal derivative on the south and north sides
    let multipatch = MultiPatch::grid(2, 1, 2.0, 1.0).unwrap();
    let sides = vec![PatchSide::new(0, BoxSide::West), PatchSide::new(1, BoxSide::East)];
    let exact = FunctionExpr::scalar(|x| 3.0 * x.x - 1.0);
    let exact_gradient = FunctionExpr::vector2(|_| Vector2::new(3.0, 0.0));
    let dirichlet = DirichletBoundary::new(sides, Arc::new(exact.clone()));
    let basis = MultiBasis::uniform(&multipatch, 1, 3).unwrap();

    let field = solve_poisson(
        &multipatch,
        &basis,
        Arc::new(FunctionExpr::constant(0.0)),
        &dirichlet,
        SolverMethod::Direct,
    );
    let (l2, h1) = errors(&field, &multipatch, &exact, &exact_gradient);
    assert_scalar_eq!(l2, 0.0, comp = abs, tol = 1e-10);
    assert_scalar_eq!(h1, 0.0, comp = abs, tol = 1e-10);
}

#[test]
fn smooth_solution_converges_under_refinement() {
    use std::f64::consts::PI;
    let multipatch = MultiPatch::grid(2, 2, 1.0, 1.0).unwrap();
    let exact = FunctionExpr::scalar(|x| (PI * x.x).sin() * (PI * x.y).sin());
    let exact_gradient = FunctionExpr::vector2(|x| {
        Vector2::new(
            PI * (PI * x.x).cos() * (PI * x.y).sin(),
            PI * (PI * x.x).sin() * (PI * x.y).cos(),
        )
    });
    let source: Arc<dyn PatchFunction> =
        Arc::new(FunctionExpr::scalar(|x| 2.0 * PI * PI * (PI * x.x).sin() * (PI * x.y).sin()));
    let dirichlet = DirichletBoundary::on_boundary(&multipatch, Arc::new(FunctionExpr::constant(0.0)));

    let mut basis = MultiBasis::uniform(&multipatch, 2, 1).unwrap();
    let mut previous: Option<(f64, f64)> = None;
    for _ in 0..3 {
        let field = solve_poisson(&multipatch, &basis, source.clone(), &dirichlet, SolverMethod::Auto);
        let (l2, h1) = errors(&field, &multipatch, &exact, &exact_gradient);
        if let Some((l2_prev, h1_prev)) = previous {
            // Quadratic splines: O(h³) in L² and O(h²) in the H¹ seminorm
            assert!(l2_prev / l2 > 5.0, "L2 rate too low: {} -> {}", l2_prev, l2);
            assert!(h1_prev / h1 > 3.0, "H1 rate too low: {} -> {}", h1_prev, h1);
        }
        previous = Some((l2, h1));
        basis.uniform_refine();
    }
}
