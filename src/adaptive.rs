//! Adaptive solution of the Poisson problem driven by functional error estimates.
//!
//! Each step of the loop
//!
//! 1. assembles and solves for the approximation `v`,
//! 2. reconstructs a flux `y` patch by patch by minimizing the majorant over a degree-elevated
//!    and refined spline space, alternating between solves and updates of the weight `β`,
//! 3. solves an auxiliary problem for `w` on a degree-elevated and refined space and evaluates
//!    the minorant,
//! 4. evaluates the exact error when the exact solution is known,
//!
//! after which the elements are marked by their majorant contributions and refined.
//!
//! The spaces of `y` and `w` are built from the mesh of `v` some steps back (the refinement
//! delay), refined uniformly a number of times and elevated in degree. Elevation keeps the
//! smoothness across breaks, so without delay the space of `v` is contained in both.

use crate::assembly::visitors::{DivDivVisitor, DualMassVisitor, PoissonVisitor};
use crate::assembly::{assemble_multipatch, assemble_patch, AssemblyOptions, SparseSystem};
use crate::basis::Basis;
use crate::dirichlet::DirichletBoundary;
use crate::dof_mapper::{DofMapper, DofMapperBuilder};
use crate::estimate::{
    compute_element_norms, compute_element_norms_on_common_mesh, majorant, majorant_distribution, optimal_beta,
    DualMajorant, ElementNorms, EquilibratedMajorant, H1SeminormError, Minorant,
};
use crate::field::{FieldGradient, MultiPatchField};
use crate::function::PatchFunction;
use crate::marking::{mark_elements, MarkingStrategy};
use crate::multipatch::{MultiBasis, MultiPatch};
use crate::solve::{linear_combination, solve_with_fallback, SolverMethod, SolverOptions};
use eyre::eyre;
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveOptions {
    /// Number of solve steps. The basis is refined between consecutive steps.
    pub num_refinements: usize,
    /// Refine marked elements only. Otherwise every step refines uniformly.
    pub adaptive: bool,
    pub marking: MarkingStrategy,
    pub theta: f64,
    /// Number of neighbouring knot spans refined along with each marked span.
    pub refinement_ring: usize,
    /// Degree increase of the flux space over the primal space.
    pub flux_degree_increment: usize,
    /// Degree increase of the auxiliary minorant space over the primal space.
    pub aux_degree_increment: usize,
    /// Uniform refinements of the flux mesh on top of the primal mesh.
    pub flux_extra_refinements: usize,
    /// Uniform refinements of the auxiliary minorant mesh on top of the primal mesh.
    pub aux_extra_refinements: usize,
    /// Number of steps the flux mesh lags behind the primal mesh.
    pub flux_refinement_delay: usize,
    /// Number of steps the auxiliary minorant mesh lags behind the primal mesh.
    pub aux_refinement_delay: usize,
    /// Maximum number of flux solves with updated `β`.
    pub flux_iterations: usize,
    /// Stop updating `β` once `md / meq` reaches this ratio.
    pub ratio_dual_eq: f64,
    pub friedrichs_constant: f64,
    pub assembly: AssemblyOptions,
    pub solver: SolverOptions,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            num_refinements: 3,
            adaptive: true,
            marking: MarkingStrategy::Bulk,
            theta: 0.4,
            refinement_ring: 0,
            flux_degree_increment: 1,
            aux_degree_increment: 1,
            flux_extra_refinements: 1,
            aux_extra_refinements: 1,
            flux_refinement_delay: 0,
            aux_refinement_delay: 0,
            flux_iterations: 2,
            ratio_dual_eq: 5.0,
            // Friedrichs constant of the unit square
            friedrichs_constant: 1.0 / (2.0_f64.sqrt() * PI),
            assembly: AssemblyOptions::default(),
            solver: SolverOptions::default(),
        }
    }
}

/// Exact solution and its gradient, both functions of the physical coordinates.
#[derive(Debug, Clone)]
pub struct ExactSolution {
    pub value: Arc<dyn PatchFunction>,
    pub gradient: Arc<dyn PatchFunction>,
}

/// `-Δu = f` with Dirichlet data on some sides and homogeneous Neumann data on the others.
#[derive(Debug, Clone)]
pub struct PoissonProblem {
    pub multipatch: MultiPatch,
    pub dirichlet: DirichletBoundary,
    pub source: Arc<dyn PatchFunction>,
    pub exact: Option<ExactSolution>,
}

/// State carried from one step of the loop to the next.
#[derive(Debug, Clone, Default)]
pub struct LoopContext {
    /// Solution of the previous step, used for the initial guess of the iterative solver.
    pub previous: Option<MultiPatchField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub num_dofs: usize,
    pub num_elements: usize,
    pub majorant: f64,
    pub dual_majorant: f64,
    pub equilibrated_majorant: f64,
    pub beta: f64,
    pub flux_iterations: usize,
    pub minorant: f64,
    /// `‖∇(u - v)‖`, when the exact solution is known.
    pub error: Option<f64>,
    pub solver_method: SolverMethod,
    pub cg_iterations: Option<usize>,
    /// Squared majorant contribution of every element.
    pub indicators: Vec<f64>,
}

impl StepReport {
    /// `majorant / error`
    pub fn majorant_efficiency(&self) -> Option<f64> {
        self.error.map(|e| self.majorant / e)
    }

    /// `minorant / error`
    pub fn minorant_efficiency(&self) -> Option<f64> {
        self.error.map(|e| self.minorant / e)
    }
}

/// Div-div and vector mass systems of one patch, kept unscaled so that every `β` update
/// recombines them from scratch.
struct PatchFluxSystem {
    mapper: DofMapper,
    divdiv: CsrMatrix<f64>,
    divdiv_rhs: DVector<f64>,
    mass: CsrMatrix<f64>,
    mass_rhs: DVector<f64>,
}

/// The flux systems of all patches, owned by a single step.
struct FluxArena {
    patches: Vec<PatchFluxSystem>,
}

struct FluxEstimate {
    md: ElementNorms,
    meq: ElementNorms,
    beta: f64,
    majorant: f64,
    distribution: Vec<f64>,
    iterations: usize,
}

#[derive(Debug, Clone)]
pub struct AdaptiveDriver {
    problem: PoissonProblem,
    basis: MultiBasis,
    /// Primal bases of the previous steps, oldest first.
    history: Vec<MultiBasis>,
    options: AdaptiveOptions,
}

impl AdaptiveDriver {
    pub fn new(problem: PoissonProblem, basis: MultiBasis, options: AdaptiveOptions) -> eyre::Result<Self> {
        if basis.num_patches() != problem.multipatch.num_patches() {
            return Err(eyre!(
                "basis has {} patches but the geometry has {}",
                basis.num_patches(),
                problem.multipatch.num_patches()
            ));
        }
        if !(0.0..=1.0).contains(&options.theta) {
            return Err(eyre!("marking parameter must lie in [0, 1], got {}", options.theta));
        }
        Ok(Self {
            problem,
            basis,
            history: Vec::new(),
            options,
        })
    }

    pub fn basis(&self) -> &MultiBasis {
        &self.basis
    }

    pub fn options(&self) -> &AdaptiveOptions {
        &self.options
    }

    /// Runs the whole loop, refining between steps.
    pub fn run(&mut self) -> eyre::Result<Vec<StepReport>> {
        let mut context = LoopContext::default();
        let mut reports = Vec::with_capacity(self.options.num_refinements);
        for step in 0..self.options.num_refinements {
            let report = self.step(step, &mut context)?;
            if step + 1 < self.options.num_refinements {
                self.refine(&report.indicators)?;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Solves and estimates on the current basis.
    pub fn step(&self, step: usize, context: &mut LoopContext) -> eyre::Result<StepReport> {
        let timer = Instant::now();
        let multipatch = &self.problem.multipatch;
        let options = &self.options;

        let (v, mapper, solve_method, cg_iterations) = self.solve_primal(context)?;
        let flux = self.estimate_flux(&v)?;
        let minorant = self.compute_minorant(&v)?;
        let error = match &self.problem.exact {
            Some(exact) => {
                let norm = H1SeminormError {
                    field: &v,
                    exact_gradient: exact.gradient.as_ref(),
                };
                Some(compute_element_norms(&norm, &self.basis, multipatch, options.assembly.quad_extra + 1)?.total)
            }
            None => None,
        };

        let report = StepReport {
            step,
            num_dofs: mapper.free_size(),
            num_elements: self.basis.total_elements(),
            majorant: flux.majorant,
            dual_majorant: flux.md.total,
            equilibrated_majorant: flux.meq.total,
            beta: flux.beta,
            flux_iterations: flux.iterations,
            minorant,
            error,
            solver_method: solve_method,
            cg_iterations,
            indicators: flux.distribution,
        };
        info!(
            "Step {}: {} DOFs, {} elements, maj = {:.4e} (md = {:.4e}, meq = {:.4e}), min = {:.4e}, error = {:?} ({:.2?})",
            step,
            report.num_dofs,
            report.num_elements,
            report.majorant,
            report.dual_majorant,
            report.equilibrated_majorant,
            report.minorant,
            report.error,
            timer.elapsed()
        );

        context.previous = Some(v);
        Ok(report)
    }

    /// Refines the basis using the given element indicators. Returns the number of marked
    /// elements, or the number of elements before refinement for uniform refinement.
    pub fn refine(&mut self, indicators: &[f64]) -> eyre::Result<usize> {
        self.history.push(self.basis.clone());
        if self.options.adaptive {
            let marked = mark_elements(indicators, self.options.marking, self.options.theta);
            self.basis
                .refine_elements(&marked, self.options.refinement_ring, &self.problem.multipatch)
        } else {
            let count = self.basis.total_elements();
            self.basis.uniform_refine();
            Ok(count)
        }
    }

    /// The primal basis of `delay` steps ago (or the oldest one), refined uniformly
    /// `extra_refinements` times and elevated by `degree_increment`.
    pub fn derived_basis(&self, delay: usize, extra_refinements: usize, degree_increment: usize) -> MultiBasis {
        let lag = delay.min(self.history.len());
        let mut basis = if lag == 0 {
            self.basis.clone()
        } else {
            self.history[self.history.len() - lag].clone()
        };
        for _ in 0..extra_refinements {
            basis.uniform_refine();
        }
        basis.with_degree_elevation(degree_increment)
    }

    fn solve_primal(
        &self,
        context: &LoopContext,
    ) -> eyre::Result<(MultiPatchField, DofMapper, SolverMethod, Option<usize>)> {
        let multipatch = &self.problem.multipatch;
        let mapper = self.basis.dof_mapper(multipatch, self.problem.dirichlet.sides())?;
        let fixed = self
            .problem
            .dirichlet
            .fixed_part(&self.basis, multipatch, &mapper)?;

        let visitor = PoissonVisitor::new(Arc::clone(&self.problem.source));
        let system = assemble_multipatch(
            &visitor,
            &self.basis,
            multipatch,
            std::slice::from_ref(&fixed),
            SparseSystem::single(mapper.clone(), 1),
            &self.options.assembly,
        )?;
        let (matrix, rhs) = system.into_parts();
        let rhs = rhs.column(0).into_owned();

        let guess = context
            .previous
            .as_ref()
            .map(|previous| self.interpolate_guess(previous, &mapper));
        let (solution, report) = solve_with_fallback(&matrix, &rhs, guess.as_ref(), &self.options.solver)?;

        let solution = DMatrix::from_column_slice(solution.len(), 1, solution.as_slice());
        let v = MultiPatchField::from_solution(self.basis.clone(), &mapper, &solution, &fixed)?;
        Ok((v, mapper, report.method, report.cg_iterations))
    }

    /// Values of `previous` at the Greville points of the free DOFs of `mapper`.
    fn interpolate_guess(&self, previous: &MultiPatchField, mapper: &DofMapper) -> DVector<f64> {
        let greville: Vec<_> = self.basis.bases().iter().map(|b| b.greville_points()).collect();
        let representatives = mapper.free_representatives();
        DVector::from_iterator(
            representatives.len(),
            representatives
                .iter()
                .map(|&(patch, local)| previous.value(patch, &greville[patch][local])[0]),
        )
    }

    fn assemble_flux_arena(&self, v: &MultiPatchField, flux_basis: &MultiBasis) -> eyre::Result<FluxArena> {
        let multipatch = &self.problem.multipatch;
        let num_patches = multipatch.num_patches();
        let gradient: Arc<dyn PatchFunction> = Arc::new(FieldGradient::new(v.clone(), multipatch.clone()));
        let divdiv_visitor = DivDivVisitor::new(Arc::clone(&self.problem.source));
        let mass_visitor = DualMassVisitor::new(gradient);

        let patches = (0..num_patches)
            .map(|patch| {
                let basis = flux_basis.basis(patch);
                let geometry = multipatch.patch(patch);
                let mapper = patch_local_mapper(num_patches, patch, basis.size());
                let blocks = vec![mapper.clone(), mapper.clone()];

                let divdiv = Mutex::new(SparseSystem::new(blocks.clone(), 1));
                assemble_patch(&divdiv_visitor, basis, geometry, patch, &[], &divdiv, &self.options.assembly)?;
                let mass = Mutex::new(SparseSystem::new(blocks, 1));
                assemble_patch(&mass_visitor, basis, geometry, patch, &[], &mass, &self.options.assembly)?;

                let (divdiv, divdiv_rhs) = divdiv.into_inner().into_parts();
                let (mass, mass_rhs) = mass.into_inner().into_parts();
                Ok(PatchFluxSystem {
                    mapper,
                    divdiv,
                    divdiv_rhs: divdiv_rhs.column(0).into_owned(),
                    mass,
                    mass_rhs: mass_rhs.column(0).into_owned(),
                })
            })
            .collect::<eyre::Result<_>>()?;
        Ok(FluxArena { patches })
    }

    fn estimate_flux(&self, v: &MultiPatchField) -> eyre::Result<FluxEstimate> {
        let multipatch = &self.problem.multipatch;
        let options = &self.options;
        let c = options.friedrichs_constant;
        let flux_basis = self.derived_basis(
            options.flux_refinement_delay,
            options.flux_extra_refinements,
            options.flux_degree_increment,
        );
        debug!("Flux basis with {} elements", flux_basis.total_elements());
        let arena = self.assemble_flux_arena(v, &flux_basis)?;
        let quad_extra = options.assembly.quad_extra;

        let mut beta = 1.0;
        let mut solutions: Vec<Option<DVector<f64>>> = vec![None; arena.patches.len()];
        let mut estimate = None;
        for iteration in 0..options.flux_iterations.max(1) {
            let scale = c * c / beta;
            let mut coefficients = Vec::with_capacity(arena.patches.len());
            for (system, previous) in arena.patches.iter().zip(solutions.iter_mut()) {
                let matrix = linear_combination(1.0, &system.mass, scale, &system.divdiv)?;
                let rhs = &system.mass_rhs + &system.divdiv_rhs * scale;
                let (solution, _) = solve_with_fallback(&matrix, &rhs, previous.as_ref(), &options.solver)?;
                let n = system.mapper.free_size();
                coefficients.push(DMatrix::from_column_slice(n, 2, solution.as_slice()));
                *previous = Some(solution);
            }
            let y = MultiPatchField::from_patch_coefficients(flux_basis.clone(), coefficients)?;

            let dual = DualMajorant { primal: v, flux: &y };
            let equilibrated = EquilibratedMajorant {
                flux: &y,
                source: self.problem.source.as_ref(),
            };
            let meshes = [&flux_basis];
            let (md, meq) = rayon::join(
                || compute_element_norms_on_common_mesh(&dual, &self.basis, &meshes, multipatch, quad_extra),
                || compute_element_norms_on_common_mesh(&equilibrated, &self.basis, &meshes, multipatch, quad_extra),
            );
            let (md, meq) = (md?, meq?);

            if md.total > 0.0 && meq.total > 0.0 {
                beta = optimal_beta(md.total, meq.total, c);
            }
            let value = majorant(md.total, meq.total, beta, c);
            let distribution = majorant_distribution(&md, &meq, beta, c)?;
            debug!(
                "Flux iteration {}: maj = {:.4e}, md = {:.4e}, meq = {:.4e}, beta = {:.4e}",
                iteration, value, md.total, meq.total, beta
            );

            let stop = md.total >= options.ratio_dual_eq * meq.total;
            estimate = Some(FluxEstimate {
                md,
                meq,
                beta,
                majorant: value,
                distribution,
                iterations: iteration + 1,
            });
            if stop {
                break;
            }
        }
        estimate.ok_or_else(|| eyre!("no flux iteration was performed"))
    }

    fn compute_minorant(&self, v: &MultiPatchField) -> eyre::Result<f64> {
        let multipatch = &self.problem.multipatch;
        let options = &self.options;
        let aux_basis = self.derived_basis(
            options.aux_refinement_delay,
            options.aux_extra_refinements,
            options.aux_degree_increment,
        );
        let mapper = aux_basis.dof_mapper(multipatch, self.problem.dirichlet.sides())?;

        let gradient: Arc<dyn PatchFunction> = Arc::new(FieldGradient::new(v.clone(), multipatch.clone()));
        let visitor = PoissonVisitor::new(Arc::clone(&self.problem.source)).with_gradient_load(gradient);
        let system = assemble_multipatch(
            &visitor,
            &aux_basis,
            multipatch,
            &[],
            SparseSystem::single(mapper.clone(), 1),
            &options.assembly,
        )?;
        let (matrix, rhs) = system.into_parts();
        let rhs = rhs.column(0).into_owned();
        let (solution, _) = solve_with_fallback(&matrix, &rhs, None, &options.solver)?;

        let solution = DMatrix::from_column_slice(solution.len(), 1, solution.as_slice());
        let fixed = DMatrix::zeros(mapper.boundary_size(), 1);
        let w = MultiPatchField::from_solution(aux_basis.clone(), &mapper, &solution, &fixed)?;

        let norm = Minorant {
            primal: v,
            auxiliary: &w,
            source: self.problem.source.as_ref(),
        };
        let quad_extra = options.assembly.quad_extra;
        let minorant = compute_element_norms_on_common_mesh(&norm, &self.basis, &[&aux_basis], multipatch, quad_extra)?;
        Ok(minorant.total)
    }
}

/// A numbering of the functions of one patch only, with all other patches empty.
fn patch_local_mapper(num_patches: usize, patch: usize, size: usize) -> DofMapper {
    let sizes: Vec<usize> = (0..num_patches).map(|k| if k == patch { size } else { 0 }).collect();
    DofMapperBuilder::new(&sizes).finalize()
}
