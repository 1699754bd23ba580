//! Linear solver front-end.
//!
//! Systems are solved both directly (sparse Cholesky, with dense LU as a fallback for matrices
//! that are not positive definite) and iteratively (Jacobi-preconditioned conjugate
//! gradients), concurrently. The iterative result is preferred whenever it converged.

use eyre::eyre;
use isopatch_sparse::cg::{ConjugateGradient, JacobiPreconditioner, RelativeResidualCriterion};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Direct and iterative solves concurrently, preferring a converged iterative result.
    Auto,
    Direct,
    Iterative,
}

impl Default for SolverMethod {
    fn default() -> Self {
        Self::Auto
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Iteration cap for CG. Defaults to three times the system size.
    pub max_iterations: Option<usize>,
    /// Relative residual tolerance for CG. Defaults to `1e-2 / N` for a system of size `N`.
    pub tolerance: Option<f64>,
    pub method: SolverMethod,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: None,
            tolerance: None,
            method: SolverMethod::Auto,
        }
    }
}

impl SolverOptions {
    pub fn max_iterations_for(&self, n: usize) -> usize {
        self.max_iterations.unwrap_or(3 * n)
    }

    pub fn tolerance_for(&self, n: usize) -> f64 {
        self.tolerance.unwrap_or(1e-2 / n.max(1) as f64)
    }
}

/// Which solve produced the returned solution, and how the solves went.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub method: SolverMethod,
    pub cg_iterations: Option<usize>,
    pub cg_converged: bool,
    pub direct_time: Option<Duration>,
    pub iterative_time: Option<Duration>,
    /// `|b - Ax| / |b|` of the returned solution, or `|b - Ax|` when `b` vanishes.
    pub relative_residual: f64,
}

struct IterativeResult {
    solution: DVector<f64>,
    iterations: usize,
    converged: bool,
    time: Duration,
}

fn solve_direct(matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> eyre::Result<(DVector<f64>, Duration)> {
    let timer = Instant::now();
    let csc = CscMatrix::from(matrix);
    let solution = match CscCholesky::factor(&csc) {
        Ok(cholesky) => {
            let b = DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice());
            cholesky.solve(&b).column(0).into_owned()
        }
        Err(err) => {
            debug!("Sparse Cholesky failed ({:?}), falling back to dense LU", err);
            DMatrix::from(matrix)
                .lu()
                .solve(rhs)
                .ok_or_else(|| eyre!("direct solve failed: matrix of size {} is singular", rhs.len()))?
        }
    };
    Ok((solution, timer.elapsed()))
}

fn solve_iterative(
    matrix: &CsrMatrix<f64>,
    rhs: &DVector<f64>,
    guess: Option<&DVector<f64>>,
    options: &SolverOptions,
) -> eyre::Result<IterativeResult> {
    let timer = Instant::now();
    let n = rhs.len();
    let mut x = match guess {
        Some(guess) if guess.len() == n => guess.clone(),
        Some(guess) => {
            warn!("Ignoring initial guess of length {} for a system of size {}", guess.len(), n);
            DVector::zeros(n)
        }
        None => DVector::zeros(n),
    };
    let preconditioner = JacobiPreconditioner::from_csr(matrix);
    let output = ConjugateGradient::new()
        .with_operator(matrix)
        .with_preconditioner(&preconditioner)
        .with_stopping_criterion(RelativeResidualCriterion::new(options.tolerance_for(n)))
        .with_max_iter(options.max_iterations_for(n))
        .solve_with_guess(rhs, &mut x)?;
    Ok(IterativeResult {
        solution: x,
        iterations: output.num_iterations,
        converged: output.converged,
        time: timer.elapsed(),
    })
}

fn relative_residual(matrix: &CsrMatrix<f64>, rhs: &DVector<f64>, x: &DVector<f64>) -> f64 {
    let ax = matrix * x;
    let residual = (rhs - ax).norm();
    let b_norm = rhs.norm();
    if b_norm > 0.0 {
        residual / b_norm
    } else {
        residual
    }
}

/// Solves `matrix * x = rhs`.
///
/// With [`SolverMethod::Auto`], a direct solve and a CG solve starting from `guess` run
/// concurrently. The CG solution is returned if CG converged within the iteration cap,
/// otherwise the direct solution. A failing direct solve is only an error when its result is
/// needed.
pub fn solve_with_fallback(
    matrix: &CsrMatrix<f64>,
    rhs: &DVector<f64>,
    guess: Option<&DVector<f64>>,
    options: &SolverOptions,
) -> eyre::Result<(DVector<f64>, SolveReport)> {
    if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.len() {
        return Err(eyre!(
            "cannot solve a {}x{} system with a right-hand side of length {}",
            matrix.nrows(),
            matrix.ncols(),
            rhs.len()
        ));
    }

    let (solution, report) = match options.method {
        SolverMethod::Direct => {
            let (solution, time) = solve_direct(matrix, rhs)?;
            let report = SolveReport {
                method: SolverMethod::Direct,
                cg_iterations: None,
                cg_converged: false,
                direct_time: Some(time),
                iterative_time: None,
                relative_residual: 0.0,
            };
            (solution, report)
        }
        SolverMethod::Iterative => {
            let result = solve_iterative(matrix, rhs, guess, options)?;
            if !result.converged {
                warn!("CG did not converge within {} iterations", result.iterations);
            }
            let report = SolveReport {
                method: SolverMethod::Iterative,
                cg_iterations: Some(result.iterations),
                cg_converged: result.converged,
                direct_time: None,
                iterative_time: Some(result.time),
                relative_residual: 0.0,
            };
            (result.solution, report)
        }
        SolverMethod::Auto => {
            let (direct, iterative) = rayon::join(
                || solve_direct(matrix, rhs),
                || solve_iterative(matrix, rhs, guess, options),
            );
            match iterative {
                Ok(result) if result.converged => {
                    let report = SolveReport {
                        method: SolverMethod::Iterative,
                        cg_iterations: Some(result.iterations),
                        cg_converged: true,
                        direct_time: direct.as_ref().ok().map(|(_, time)| *time),
                        iterative_time: Some(result.time),
                        relative_residual: 0.0,
                    };
                    (result.solution, report)
                }
                iterative => {
                    let (cg_iterations, iterative_time) = match &iterative {
                        Ok(result) => {
                            warn!(
                                "CG did not converge within {} iterations, using the direct solution",
                                result.iterations
                            );
                            (Some(result.iterations), Some(result.time))
                        }
                        Err(err) => {
                            warn!("CG failed ({}), using the direct solution", err);
                            (None, None)
                        }
                    };
                    let (solution, time) = direct?;
                    let report = SolveReport {
                        method: SolverMethod::Direct,
                        cg_iterations,
                        cg_converged: false,
                        direct_time: Some(time),
                        iterative_time,
                        relative_residual: 0.0,
                    };
                    (solution, report)
                }
            }
        }
    };

    let report = SolveReport {
        relative_residual: relative_residual(matrix, rhs, &solution),
        ..report
    };
    debug!(
        "Solved system of size {} with {:?} (CG iterations: {:?}, relative residual {:.3e})",
        rhs.len(),
        report.method,
        report.cg_iterations,
        report.relative_residual
    );
    Ok((solution, report))
}

/// `alpha * a + beta * b` for matrices of equal shape.
pub fn linear_combination(
    alpha: f64,
    a: &CsrMatrix<f64>,
    beta: f64,
    b: &CsrMatrix<f64>,
) -> eyre::Result<CsrMatrix<f64>> {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return Err(eyre!(
            "cannot combine matrices of shapes {}x{} and {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        ));
    }
    let mut coo = CooMatrix::new(a.nrows(), a.ncols());
    for (i, j, &v) in a.triplet_iter() {
        coo.push(i, j, alpha * v);
    }
    for (i, j, &v) in b.triplet_iter() {
        coo.push(i, j, beta * v);
    }
    Ok(CsrMatrix::from(&coo))
}
