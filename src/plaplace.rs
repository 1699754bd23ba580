//! The p-Laplace problem `-div(a(∇u) ∇u) = f` with `a(∇w) = (ε² + |∇w|²)^{(p-2)/2}`.
//!
//! The nonlinear problem is solved by fixed-point iteration on the linearized problem: the
//! coefficient is frozen at the gradient of the current iterate `w`, the resulting Poisson
//! system is assembled and solved, and the solution becomes the next iterate.

use crate::assembly::visitors::PoissonVisitor;
use crate::assembly::{assemble_multipatch, AssemblyOptions, SparseSystem};
use crate::dirichlet::DirichletBoundary;
use crate::field::{FieldGradient, MultiPatchField};
use crate::function::PatchFunction;
use crate::multipatch::{MultiBasis, MultiPatch};
use crate::solve::{solve_with_fallback, SolverMethod, SolverOptions};
use eyre::eyre;
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PLaplaceOptions {
    pub p: f64,
    /// Regularization `ε` of the coefficient.
    pub epsilon: f64,
    /// Maximum number of linearized solves.
    pub iterations: usize,
    /// Stop once the relative change of the free coefficients drops below this value.
    pub tolerance: Option<f64>,
    pub assembly: AssemblyOptions,
    pub solver: SolverOptions,
}

impl Default for PLaplaceOptions {
    fn default() -> Self {
        Self {
            p: 2.0,
            epsilon: 1.0,
            iterations: 20,
            tolerance: None,
            assembly: AssemblyOptions::default(),
            solver: SolverOptions {
                method: SolverMethod::Direct,
                ..SolverOptions::default()
            },
        }
    }
}

/// `(ε² + |∇w|²)^{(p-2)/2}` for a scalar field `w`, evaluated at parametric points.
#[derive(Debug, Clone)]
pub struct PLaplaceCoefficient {
    gradient: FieldGradient,
    p: f64,
    epsilon: f64,
}

impl PLaplaceCoefficient {
    pub fn new(field: MultiPatchField, multipatch: MultiPatch, p: f64, epsilon: f64) -> eyre::Result<Self> {
        if field.num_components() != 1 {
            return Err(eyre!(
                "p-Laplace coefficient needs a scalar field, got {} components",
                field.num_components()
            ));
        }
        Ok(Self {
            gradient: FieldGradient::new(field, multipatch),
            p,
            epsilon,
        })
    }

    fn value(&self, gradient_norm_squared: f64) -> f64 {
        (self.epsilon * self.epsilon + gradient_norm_squared).powf(0.5 * (self.p - 2.0))
    }
}

impl PatchFunction for PLaplaceCoefficient {
    fn target_dim(&self) -> usize {
        1
    }

    fn eval(&self, patch: usize, points: &DMatrix<f64>) -> DMatrix<f64> {
        let gradients = self.gradient.eval(patch, points);
        DMatrix::from_fn(1, points.ncols(), |_, k| {
            self.value(gradients[(0, k)].powi(2) + gradients[(1, k)].powi(2))
        })
    }

    fn is_parametric(&self) -> bool {
        true
    }
}

/// `-div(a(∇u) ∇u) = f` with Dirichlet data on some sides and homogeneous Neumann data on the
/// others.
#[derive(Debug, Clone)]
pub struct PLaplaceProblem {
    pub multipatch: MultiPatch,
    pub dirichlet: DirichletBoundary,
    pub source: Arc<dyn PatchFunction>,
}

#[derive(Debug, Clone)]
pub struct PLaplaceSolution {
    pub field: MultiPatchField,
    /// Number of linearized solves performed.
    pub iterations: usize,
    /// `‖x_k - x_{k-1}‖ / ‖x_k‖` over the free coefficients of the last solve.
    pub relative_change: f64,
}

/// Solves the p-Laplace problem by fixed-point iteration, starting from the function that
/// carries the Dirichlet data and vanishes on the free DOFs.
pub fn solve_linearized(
    problem: &PLaplaceProblem,
    basis: &MultiBasis,
    options: &PLaplaceOptions,
) -> eyre::Result<PLaplaceSolution> {
    if !(options.p >= 1.0) {
        return Err(eyre!("p-Laplace exponent must be at least 1, got {}", options.p));
    }
    if !(options.epsilon > 0.0) {
        return Err(eyre!("p-Laplace regularization must be positive, got {}", options.epsilon));
    }
    if options.iterations == 0 {
        return Err(eyre!("at least one linearized solve is needed"));
    }

    let timer = Instant::now();
    let multipatch = &problem.multipatch;
    let mapper = basis.dof_mapper(multipatch, problem.dirichlet.sides())?;
    let fixed = problem.dirichlet.fixed_part(basis, multipatch, &mapper)?;

    let mut coefficients = DVector::zeros(mapper.free_size());
    let zero = DMatrix::zeros(mapper.free_size(), 1);
    let mut w = MultiPatchField::from_solution(basis.clone(), &mapper, &zero, &fixed)?;
    let mut relative_change = f64::INFINITY;
    let mut iterations = 0;
    while iterations < options.iterations {
        let coefficient = PLaplaceCoefficient::new(w, multipatch.clone(), options.p, options.epsilon)?;
        let visitor = PoissonVisitor::new(Arc::clone(&problem.source)).with_coefficient(Arc::new(coefficient));
        let system = assemble_multipatch(
            &visitor,
            basis,
            multipatch,
            std::slice::from_ref(&fixed),
            SparseSystem::single(mapper.clone(), 1),
            &options.assembly,
        )?;
        let (matrix, rhs) = system.into_parts();
        let rhs = rhs.column(0).into_owned();
        let (solution, _) = solve_with_fallback(&matrix, &rhs, Some(&coefficients), &options.solver)?;

        let norm = solution.norm();
        let change = (&solution - &coefficients).norm();
        relative_change = if norm > 0.0 { change / norm } else { change };
        coefficients = solution;
        iterations += 1;

        let solution = DMatrix::from_column_slice(coefficients.len(), 1, coefficients.as_slice());
        w = MultiPatchField::from_solution(basis.clone(), &mapper, &solution, &fixed)?;
        debug!("p-Laplace iteration {}: relative change {:.4e}", iterations, relative_change);

        if options.tolerance.map_or(false, |tolerance| relative_change < tolerance) {
            break;
        }
    }

    info!(
        "p-Laplace (p = {}, eps = {}) with {} DOFs: {} iterations, relative change {:.4e} ({:.2?})",
        options.p,
        options.epsilon,
        mapper.free_size(),
        iterations,
        relative_change,
        timer.elapsed()
    );
    Ok(PLaplaceSolution {
        field: w,
        iterations,
        relative_change,
    })
}
