use isopatch::assembly::visitors::PoissonVisitor;
use isopatch::assembly::{assemble_multipatch, AssemblyOptions, SparseSystem};
use isopatch::dirichlet::DirichletBoundary;
use isopatch::function::FunctionExpr;
use isopatch::ieti::IetiMapper;
use isopatch::multipatch::{MultiBasis, MultiPatch};
use isopatch::solve::{solve_with_fallback, SolverMethod, SolverOptions};
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::sync::Arc;

struct Problem {
    multipatch: MultiPatch,
    basis: MultiBasis,
    visitor: PoissonVisitor,
    ieti: IetiMapper<f64>,
    /// Global free solution, one column.
    solution: DMatrix<f64>,
}

fn direct() -> SolverOptions {
    SolverOptions {
        method: SolverMethod::Direct,
        ..SolverOptions::default()
    }
}

/// Solves `-Δu = 1` with `u = xy` on the boundary, globally, and sets up the IETI mapper for
/// the same numbering.
fn solve_global(multipatch: MultiPatch, degree: usize, num_interior: usize) -> Problem {
    let basis = MultiBasis::uniform(&multipatch, degree, num_interior).unwrap();
    let dirichlet = DirichletBoundary::on_boundary(&multipatch, Arc::new(FunctionExpr::scalar(|x| x.x * x.y)));
    let mapper = basis.dof_mapper(&multipatch, dirichlet.sides()).unwrap();
    let fixed = dirichlet.fixed_part(&basis, &multipatch, &mapper).unwrap();

    let visitor = PoissonVisitor::new(Arc::new(FunctionExpr::constant(1.0)));
    let system = assemble_multipatch(
        &visitor,
        &basis,
        &multipatch,
        std::slice::from_ref(&fixed),
        SparseSystem::single(mapper.clone(), 1),
        &AssemblyOptions::default(),
    )
    .unwrap();
    let (matrix, rhs) = system.into_parts();
    let (solution, _) = solve_with_fallback(&matrix, &rhs.column(0).into_owned(), None, &direct()).unwrap();
    let solution = DMatrix::from_column_slice(solution.len(), 1, solution.as_slice());

    let ieti = IetiMapper::from_global(&basis, mapper, &fixed).unwrap();
    Problem {
        multipatch,
        basis,
        visitor,
        ieti,
        solution,
    }
}

/// Restriction of the global solution to the local free DOFs of `patch`.
fn restrict(problem: &Problem, patch: usize) -> DMatrix<f64> {
    let local = problem.ieti.dof_mapper_local(patch).unwrap();
    let global = problem.ieti.dof_mapper_global().unwrap();
    let mut restricted = DMatrix::<f64>::zeros(local.free_size(), problem.solution.ncols());
    for i in 0..local.patch_size(0) {
        if local.is_free(i, 0) {
            restricted
                .row_mut(local.index(i, 0))
                .copy_from(&problem.solution.row(global.index(i, patch)));
        }
    }
    restricted
}

fn restrictions(problem: &Problem) -> Vec<DMatrix<f64>> {
    (0..problem.basis.num_patches())
        .map(|patch| restrict(problem, patch))
        .collect()
}

#[test]
fn global_solution_is_reconstructed_from_its_restrictions() {
    for multipatch in [MultiPatch::grid(2, 2, 2.0, 2.0).unwrap(), MultiPatch::l_shape().unwrap()] {
        let problem = solve_global(multipatch, 2, 2);
        let local = restrictions(&problem);
        let global = problem
            .ieti
            .construct_global_solution_from_local_solutions(&local)
            .unwrap();
        assert_eq!(global, problem.solution);
    }
}

#[test]
fn jump_matrices_annihilate_conforming_solutions() {
    for fully_redundant in [false, true] {
        let mut problem = solve_global(MultiPatch::grid(2, 2, 1.0, 1.0).unwrap(), 2, 1);
        problem
            .ieti
            .compute_jump_matrices(fully_redundant, false)
            .unwrap();
        let local = restrictions(&problem);
        let num_multipliers = problem.ieti.num_lagrange_multipliers().unwrap();
        assert!(num_multipliers > 0);

        let mut jump = DMatrix::<f64>::zeros(num_multipliers, 1);
        for (patch, u) in local.iter().enumerate() {
            jump += problem.ieti.jump_matrix(patch).unwrap() * u;
        }
        assert_matrix_eq!(jump, DMatrix::<f64>::zeros(num_multipliers, 1), comp = abs, tol = 1e-12);

        // A discontinuous perturbation of one patch is detected
        let mut perturbed = local.clone();
        perturbed[0].fill(0.0);
        let mut jump = DMatrix::<f64>::zeros(num_multipliers, 1);
        for (patch, u) in perturbed.iter().enumerate() {
            jump += problem.ieti.jump_matrix(patch).unwrap() * u;
        }
        assert!(jump.norm() > 1e-3);
    }
}

#[test]
fn corner_primals_agree_across_patches() {
    let mut problem = solve_global(MultiPatch::grid(3, 2, 3.0, 2.0).unwrap(), 2, 1);
    problem.ieti.corners_as_primals().unwrap();
    let local = restrictions(&problem);

    let mut values: HashMap<usize, Vec<f64>> = HashMap::new();
    for (patch, u) in local.iter().enumerate() {
        let constraints = problem.ieti.primal_constraints(patch).unwrap();
        let indices = problem.ieti.primal_dof_indices(patch).unwrap();
        assert_eq!(constraints.len(), indices.len());
        for (constraint, &primal) in constraints.iter().zip(indices) {
            assert_eq!(constraint.len(), u.nrows());
            let value: f64 = constraint
                .indices()
                .iter()
                .zip(constraint.values())
                .map(|(&i, &c)| c * u[(i, 0)])
                .sum();
            values.entry(primal).or_default().push(value);
        }
    }

    // Only the two interior vertices of the 3x2 grid are free corners
    assert_eq!(problem.ieti.num_primal_dofs().unwrap(), 2);
    assert_eq!(values.len(), 2);
    for occurrences in values.values() {
        assert_eq!(occurrences.len(), 4);
        for value in occurrences {
            assert_eq!(*value, occurrences[0]);
        }
    }
}

#[test]
fn local_residuals_sum_to_global_residual() {
    let problem = solve_global(MultiPatch::l_shape().unwrap(), 2, 2);
    let global = problem.ieti.dof_mapper_global().unwrap();
    let local = restrictions(&problem);

    let mut residual = DMatrix::<f64>::zeros(global.free_size(), 1);
    for (patch, u) in local.iter().enumerate() {
        let local_mapper = problem.ieti.dof_mapper_local(patch).unwrap();
        let patch_geometry = MultiPatch::single(problem.multipatch.patch_arc(patch));
        let patch_basis = MultiBasis::new(vec![problem.basis.basis(patch).clone()]);
        let fixed = problem.ieti.fixed_part(patch).unwrap().clone();
        let system = assemble_multipatch(
            &problem.visitor,
            &patch_basis,
            &patch_geometry,
            &[fixed],
            SparseSystem::single(local_mapper.clone(), 1),
            &AssemblyOptions::default(),
        )
        .unwrap();
        let (matrix, rhs) = system.into_parts();
        let local_residual = &matrix * u - rhs;

        for i in 0..local_mapper.patch_size(0) {
            if local_mapper.is_free(i, 0) {
                residual[(global.index(i, patch), 0)] += local_residual[(local_mapper.index(i, 0), 0)];
            }
        }
    }
    assert!(residual.norm() < 1e-9);
}
