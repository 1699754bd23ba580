use isopatch_sparse::cg::{
    ConjugateGradient, JacobiPreconditioner, LinearOperator, RelativeResidualCriterion, SolveErrorKind,
};
use isopatch_sparse::nalgebra::{DMatrix, DVector};
use isopatch_sparse::nalgebra_sparse::{CooMatrix, CsrMatrix};
use matrixcompare::assert_matrix_eq;
use proptest::prelude::*;

/// The 1D Laplacian `tridiag(-1, 2, -1)` of size `n`.
fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n {
        coo.push(i, i, 2.0);
        if i > 0 {
            coo.push(i, i - 1, -1.0);
        }
        if i + 1 < n {
            coo.push(i, i + 1, -1.0);
        }
    }
    CsrMatrix::from(&coo)
}

#[test]
fn csr_operator_matches_dense_product() {
    let a = laplacian_1d(6);
    let dense = DMatrix::from(&a);
    let x = DVector::from_fn(6, |i, _| (i as f64).sin());

    let mut y_sparse = DVector::zeros(6);
    let mut y_dense = DVector::zeros(6);
    a.apply(&mut y_sparse, &x).unwrap();
    dense.apply(&mut y_dense, &x).unwrap();

    assert_matrix_eq!(y_sparse, y_dense, comp = abs, tol = 1e-14);
}

#[test]
fn operator_rejects_mismatched_dimensions() {
    let a = laplacian_1d(4);
    let mut y = DVector::zeros(4);
    assert!(a.apply(&mut y, &DVector::zeros(3)).is_err());
}

#[test]
fn cg_solves_laplacian_with_jacobi_preconditioner() {
    let n = 20;
    let a = laplacian_1d(n);
    let x_expected = DVector::from_fn(n, |i, _| 1.0 + i as f64 / n as f64);
    let b = LinearOperatorExt::mul(&a, &x_expected);

    let mut x = DVector::zeros(n);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .with_preconditioner(JacobiPreconditioner::from_csr(&a))
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-12))
        .solve_with_guess(&b, &mut x)
        .unwrap();

    assert!(output.converged);
    // CG terminates in at most n steps in exact arithmetic
    assert!(output.num_iterations <= n + 1);
    assert_matrix_eq!(x, x_expected, comp = abs, tol = 1e-9);
}

#[test]
fn cg_reports_non_convergence_at_iteration_cap() {
    let n = 50;
    let a = laplacian_1d(n);
    let b = DVector::repeat(n, 1.0);

    let mut x = DVector::zeros(n);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-14))
        .with_max_iter(3)
        .solve_with_guess(&b, &mut x)
        .unwrap();

    assert!(!output.converged);
    assert_eq!(output.num_iterations, 3);
    assert!(output.residual_norm > 0.0);
}

#[test]
fn cg_zero_rhs_gives_zero_solution() {
    let a = laplacian_1d(5);
    let mut x = DVector::repeat(5, 3.0);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .solve_with_guess(&DVector::zeros(5), &mut x)
        .unwrap();
    assert!(output.converged);
    assert_eq!(output.num_iterations, 0);
    assert_eq!(x, DVector::zeros(5));
}

#[test]
fn cg_detects_indefinite_operator() {
    let a = DMatrix::from_diagonal(&DVector::from_column_slice(&[1.0, -1.0]));
    let b = DVector::from_column_slice(&[0.0, 1.0]);
    let mut x = DVector::zeros(2);
    let err = ConjugateGradient::new()
        .with_operator(&a)
        .solve_with_guess(&b, &mut x)
        .unwrap_err();
    assert!(matches!(err.kind, SolveErrorKind::IndefiniteOperator));
}

#[test]
fn reused_solver_gives_identical_results() {
    let n = 15;
    let a = laplacian_1d(n);
    let mut reused = ConjugateGradient::new().with_operator(&a);

    for k in 1..=3 {
        let b = DVector::repeat(n, k as f64);

        let mut x_reused = DVector::zeros(n);
        let output_reused = reused.solve_with_guess(&b, &mut x_reused).unwrap();

        let mut x_fresh = DVector::zeros(n);
        let output_fresh = ConjugateGradient::new()
            .with_operator(&a)
            .solve_with_guess(&b, &mut x_fresh)
            .unwrap();

        assert_eq!(x_reused, x_fresh);
        assert_eq!(output_reused.num_iterations, output_fresh.num_iterations);
    }
}

#[test]
fn cg_rejects_mismatched_lengths() {
    let a = laplacian_1d(4);
    let mut x = DVector::zeros(3);
    let err = ConjugateGradient::new()
        .with_operator(&a)
        .solve_with_guess(&DVector::repeat(4, 1.0), &mut x)
        .unwrap_err();
    assert!(matches!(err.kind, SolveErrorKind::DimensionMismatch { rhs: 4, solution: 3 }));
    assert_eq!(err.output.num_iterations, 0);
}

trait LinearOperatorExt {
    fn mul(&self, x: &DVector<f64>) -> DVector<f64>;
}

impl LinearOperatorExt for CsrMatrix<f64> {
    fn mul(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.nrows());
        self.apply(&mut y, x).unwrap();
        y
    }
}

proptest! {
    #[test]
    fn cg_solves_random_spd_systems(entries in proptest::collection::vec(-1.0..1.0f64, 16), shift in 0.5..4.0f64) {
        let m = DMatrix::from_column_slice(4, 4, &entries);
        let a = &m * m.transpose() + DMatrix::identity(4, 4) * shift;
        let x_expected = DVector::from_column_slice(&[1.0, -2.0, 0.5, 3.0]);
        let b = &a * &x_expected;

        let mut x = DVector::zeros(4);
        let output = ConjugateGradient::new()
            .with_operator(&a)
            .with_stopping_criterion(RelativeResidualCriterion::new(1e-13))
            .with_max_iter(100)
            .solve_with_guess(&b, &mut x)
            .unwrap();
        prop_assert!(output.converged);
        prop_assert!((x - x_expected).norm() <= 1e-8);
    }
}
