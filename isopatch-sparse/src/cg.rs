//! Preconditioned conjugate gradient.
//!
//! The solver follows the builder style
//!
//! ```ignore
//! let output = ConjugateGradient::new()
//!     .with_operator(&matrix)
//!     .with_preconditioner(JacobiPreconditioner::from_csr(&matrix))
//!     .with_stopping_criterion(RelativeResidualCriterion::new(1e-8))
//!     .with_max_iter(3 * n)
//!     .solve_with_guess(&b, &mut x)?;
//! ```
//!
//! Reaching the iteration cap is not an error: the returned [`CgOutput`] reports whether the
//! stopping criterion was met, so that callers can fall back to a direct solver.
use crate::Real;
use core::fmt;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

pub type OperatorError = Box<dyn Error + Send + Sync>;

/// A linear map `x -> y`.
pub trait LinearOperator<T: Real> {
    fn apply(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), OperatorError>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T: Real> LinearOperator<T> for DMatrix<T> {
    fn apply(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), OperatorError> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(format!(
                "dense operator of size {}x{} cannot map vector of length {} to length {}",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )
            .into());
        }
        y.gemv(T::one(), self, x, T::zero());
        Ok(())
    }
}

impl<T: Real> LinearOperator<T> for CsrMatrix<T> {
    fn apply(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), OperatorError> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(format!(
                "sparse operator of size {}x{} cannot map vector of length {} to length {}",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )
            .into());
        }
        for (y_i, row) in y.iter_mut().zip(self.row_iter()) {
            *y_i = row
                .col_indices()
                .iter()
                .zip(row.values())
                .fold(T::zero(), |acc, (&j, &a_ij)| acc + a_ij * x[j]);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityOperator;

impl<T: Real> LinearOperator<T> for IdentityOperator {
    fn apply(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), OperatorError> {
        y.copy_from(x);
        Ok(())
    }
}

/// Diagonal (Jacobi) preconditioner `P = diag(A)^{-1}`.
///
/// Zero diagonal entries are replaced by one.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: Real> {
    inverse_diagonal: DVector<T>,
}

impl<T: Real> JacobiPreconditioner<T> {
    pub fn from_diagonal(diagonal: &DVector<T>) -> Self {
        let inverse_diagonal = diagonal.map(|d| if d == T::zero() { T::one() } else { T::one() / d });
        Self { inverse_diagonal }
    }

    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        let mut diagonal = DVector::zeros(matrix.nrows());
        for (i, row) in matrix.row_iter().enumerate() {
            for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                if i == j {
                    diagonal[i] += v;
                }
            }
        }
        Self::from_diagonal(&diagonal)
    }

    pub fn inverse_diagonal(&self) -> &DVector<T> {
        &self.inverse_diagonal
    }
}

impl<T: Real> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), OperatorError> {
        y.copy_from(x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}

pub trait CgStoppingCriterion<T: Real> {
    fn has_converged(&self, b_norm: T, iteration: usize, approx_residual: &DVector<T>) -> bool;
}

/// Relative residual tolerance `||r|| <= tol * ||b||`.
///
/// Uses the residual recurrence of CG rather than the true residual.
#[derive(Debug, Clone, Copy)]
pub struct RelativeResidualCriterion<T: Real> {
    tol: T,
}

impl<T: Real> RelativeResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }

    pub fn tol(&self) -> T {
        self.tol
    }
}

impl Default for RelativeResidualCriterion<f64> {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

impl<T: Real> CgStoppingCriterion<T> for RelativeResidualCriterion<T> {
    fn has_converged(&self, b_norm: T, _iteration: usize, approx_residual: &DVector<T>) -> bool {
        approx_residual.norm() <= self.tol * b_norm
    }
}

/// Vectors reused across solves with the same solver.
#[derive(Debug, Clone)]
struct Buffers<T: Real> {
    residual: DVector<T>,
    preconditioned: DVector<T>,
    direction: DVector<T>,
    image: DVector<T>,
}

impl<T: Real> Default for Buffers<T> {
    fn default() -> Self {
        Self {
            residual: DVector::zeros(0),
            preconditioned: DVector::zeros(0),
            direction: DVector::zeros(0),
            image: DVector::zeros(0),
        }
    }
}

impl<T: Real> Buffers<T> {
    fn resize(&mut self, dim: usize) {
        for buffer in [
            &mut self.residual,
            &mut self.preconditioned,
            &mut self.direction,
            &mut self.image,
        ] {
            if buffer.len() != dim {
                *buffer = DVector::zeros(dim);
            }
        }
    }
}

/// Conjugate gradient solver, configured through `with_*` methods.
///
/// The solver keeps its buffers between calls to [`solve_with_guess`](Self::solve_with_guess),
/// so repeated solves of the same size do not allocate.
#[derive(Debug)]
pub struct ConjugateGradient<T, A, P, Criterion>
where
    T: Real,
{
    buffers: Buffers<T>,
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl<T: Real> ConjugateGradient<T, (), IdentityOperator, RelativeResidualCriterion<T>> {
    pub fn new() -> Self {
        Self {
            buffers: Buffers::default(),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: RelativeResidualCriterion::new(nalgebra::convert::<f64, T>(1e-8)),
            max_iter: None,
        }
    }
}

impl<T: Real> Default for ConjugateGradient<T, (), IdentityOperator, RelativeResidualCriterion<T>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real, P, Criterion> ConjugateGradient<T, (), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<T, A, P, Criterion> {
        ConjugateGradient {
            buffers: self.buffers,
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<T: Real, A, P, Criterion> ConjugateGradient<T, A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<T, A, P2, Criterion> {
        ConjugateGradient {
            buffers: self.buffers,
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_stopping_criterion<C2>(self, stopping_criterion: C2) -> ConjugateGradient<T, A, P, C2> {
        ConjugateGradient {
            buffers: self.buffers,
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    /// Caps the number of updates of the solution. Without a cap, CG runs until convergence.
    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(OperatorError),
    PreconditionerError(OperatorError),
    DimensionMismatch { rhs: usize, solution: usize },
    IndefiniteOperator,
    IndefinitePreconditioner,
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "error applying operator: {}", err),
            Self::PreconditionerError(err) => write!(f, "error applying preconditioner: {}", err),
            Self::DimensionMismatch { rhs, solution } => {
                write!(f, "right-hand side has length {} but solution has length {}", rhs, solution)
            }
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "indefinite preconditioner"),
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    pub output: CgOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T> SolveError<T> {
    fn new(output: CgOutput<T>, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG solve failed after {} iterations: {}", self.output.num_iterations, self.kind)
    }
}

impl<T: fmt::Debug> std::error::Error for SolveError<T> {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CgOutput<T> {
    /// Number of updates made to the initial solution vector.
    pub num_iterations: usize,
    /// Whether the stopping criterion was met before the iteration cap.
    pub converged: bool,
    /// Norm of the (recursively updated) residual at termination.
    pub residual_norm: T,
}

impl<T, A, P, Criterion> ConjugateGradient<T, A, P, Criterion>
where
    T: Real,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    Criterion: CgStoppingCriterion<T>,
{
    /// Improves `x` in place, starting from its current value.
    pub fn solve_with_guess(&mut self, b: &DVector<T>, x: &mut DVector<T>) -> Result<CgOutput<T>, SolveError<T>> {
        let mut output = CgOutput {
            num_iterations: 0,
            converged: false,
            residual_norm: T::zero(),
        };
        match self.iterate(b, x, &mut output) {
            Ok(()) => Ok(output),
            Err(kind) => Err(SolveError::new(output, kind)),
        }
    }

    fn iterate(&mut self, b: &DVector<T>, x: &mut DVector<T>, output: &mut CgOutput<T>) -> Result<(), SolveErrorKind> {
        if b.len() != x.len() {
            return Err(SolveErrorKind::DimensionMismatch {
                rhs: b.len(),
                solution: x.len(),
            });
        }

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            output.converged = true;
            return Ok(());
        }

        self.buffers.resize(x.len());
        let Buffers {
            residual: r,
            preconditioned: z,
            direction: p,
            image: q,
        } = &mut self.buffers;
        let operator = &self.operator;
        let preconditioner = &self.preconditioner;

        // r = b - A x
        operator.apply(r, x).map_err(SolveErrorKind::OperatorError)?;
        r.axpy(T::one(), b, -T::one());
        preconditioner
            .apply(z, r)
            .map_err(SolveErrorKind::PreconditionerError)?;
        p.copy_from(z);
        let mut rho = z.dot(r);

        loop {
            output.residual_norm = r.norm();
            if self
                .stopping_criterion
                .has_converged(b_norm, output.num_iterations, r)
            {
                output.converged = true;
                return Ok(());
            }
            if self.max_iter.map_or(false, |max| output.num_iterations >= max) {
                return Ok(());
            }

            operator.apply(q, p).map_err(SolveErrorKind::OperatorError)?;
            let curvature = p.dot(q);
            if curvature <= T::zero() {
                return Err(SolveErrorKind::IndefiniteOperator);
            }
            if rho <= T::zero() {
                return Err(SolveErrorKind::IndefinitePreconditioner);
            }

            let alpha = rho / curvature;
            x.axpy(alpha, p, T::one());
            r.axpy(-alpha, q, T::one());
            output.num_iterations += 1;

            preconditioner
                .apply(z, r)
                .map_err(SolveErrorKind::PreconditionerError)?;
            let rho_next = z.dot(r);
            // p = z + (rho_next / rho) p
            p.axpy(T::one(), z, rho_next / rho);
            rho = rho_next;
        }
    }
}
