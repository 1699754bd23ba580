//! Element-wise norms and a posteriori error estimates.
//!
//! Every norm is a sum of element contributions, computed in parallel over the elements of a
//! [`MultiBasis`]. The contributions are the squared local values, so they can be used
//! directly as refinement indicators, and the total is obtained by [`ElementNorm::finalize`].
//!
//! The functional majorant for the Poisson problem `-Δu = f` combines the dual term
//! `‖∇v - y‖` and the equilibration term `‖div y + f‖` of an approximation `v` and a flux `y`:
//!
//! ```text
//! ‖∇(u - v)‖² <= (1 + β) ‖∇v - y‖² + (1 + 1/β) C_F² ‖div y + f‖²
//! ```

use crate::basis::{Basis, Element};
use crate::field::MultiPatchField;
use crate::function::PatchFunction;
use crate::geometry::{GeometryFlags, MapData, PatchGeometry};
use crate::multipatch::{MultiBasis, MultiPatch};
use crate::quadrature::QuadRule;
use eyre::eyre;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Quadrature data of one element.
#[derive(Debug)]
pub struct ElementQuadrature<'a> {
    pub patch: usize,
    pub element: &'a Element,
    pub map: &'a MapData,
    /// Quadrature weights multiplied by the geometry measure.
    pub weights: DVector<f64>,
}

pub trait ElementNorm: Sync {
    /// The (squared) contribution of one element.
    fn element_contribution(&self, quadrature: &ElementQuadrature) -> eyre::Result<f64>;

    /// Turns the sum of all contributions into the value of the norm.
    fn finalize(&self, sum: f64) -> f64 {
        sum.sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNorms {
    pub total: f64,
    /// One entry per element, in the global element numbering of
    /// [`MultiBasis::element_offsets`].
    pub element_contributions: Vec<f64>,
}

/// Evaluates `norm` on all elements of `basis`.
///
/// Each element uses a Gauss rule with `degree + 1 + quad_extra` points per direction.
pub fn compute_element_norms<N: ElementNorm>(
    norm: &N,
    basis: &MultiBasis,
    multipatch: &MultiPatch,
    quad_extra: usize,
) -> eyre::Result<ElementNorms> {
    compute_element_norms_on_common_mesh(norm, basis, &[], multipatch, quad_extra)
}

/// Evaluates `norm` for fields that live on the meshes of `basis` and `others`.
///
/// The integration runs over the common refinement of all meshes, with a Gauss rule of
/// `max degree + 1 + quad_extra` points per direction on every cell, and the contributions
/// are summed onto the elements of `basis` that contain the cells.
pub fn compute_element_norms_on_common_mesh<N: ElementNorm>(
    norm: &N,
    basis: &MultiBasis,
    others: &[&MultiBasis],
    multipatch: &MultiPatch,
    quad_extra: usize,
) -> eyre::Result<ElementNorms> {
    if basis.num_patches() != multipatch.num_patches() {
        return Err(eyre!(
            "basis has {} patches but the geometry has {}",
            basis.num_patches(),
            multipatch.num_patches()
        ));
    }
    if let Some(other) = others.iter().find(|other| other.num_patches() != basis.num_patches()) {
        return Err(eyre!(
            "basis has {} patches but another field basis has {}",
            basis.num_patches(),
            other.num_patches()
        ));
    }

    let mut element_contributions = Vec::with_capacity(basis.total_elements());
    for patch in 0..basis.num_patches() {
        let patch_basis = basis.basis(patch);
        let geometry = multipatch.patch(patch);

        let mut common = patch_basis.clone();
        let mut num_points = [patch_basis.degree(0), patch_basis.degree(1)];
        for other in others {
            let other = other.basis(patch);
            for direction in 0..2 {
                common
                    .knots_mut(direction)
                    .insert_breaks(&other.knots(direction).breaks());
                num_points[direction] = num_points[direction].max(other.degree(direction));
            }
        }
        let num_points: Vec<usize> = num_points.iter().map(|p| p + 1 + quad_extra).collect();
        let rule = QuadRule::gauss(&num_points)?;

        let breaks = [patch_basis.knots(0).breaks(), patch_basis.knots(1).breaks()];
        let cells: Vec<(usize, f64)> = common
            .elements()
            .par_iter()
            .map(|cell| -> eyre::Result<(usize, f64)> {
                let center = cell.center();
                let parent = containing_span(&breaks[0], center[0])
                    + (breaks[0].len() - 1) * containing_span(&breaks[1], center[1]);
                Ok((parent, element_contribution(norm, patch, geometry, &rule, cell)?))
            })
            .collect::<eyre::Result<_>>()?;

        let mut contributions = vec![0.0; patch_basis.num_elements()];
        for (parent, contribution) in cells {
            contributions[parent] += contribution;
        }
        element_contributions.extend(contributions);
    }

    let sum = element_contributions.iter().sum();
    Ok(ElementNorms {
        total: norm.finalize(sum),
        element_contributions,
    })
}

/// Index of the span of `breaks` that contains `x`.
fn containing_span(breaks: &[f64], x: f64) -> usize {
    let num_spans = breaks.len() - 1;
    breaks.partition_point(|&b| b <= x).saturating_sub(1).min(num_spans - 1)
}

fn element_contribution<N: ElementNorm>(
    norm: &N,
    patch: usize,
    geometry: &dyn PatchGeometry,
    rule: &QuadRule,
    element: &Element,
) -> eyre::Result<f64> {
    let (nodes, weights) = rule.map_to(element)?;
    let map = MapData::compute(geometry, &nodes, GeometryFlags::STIFFNESS)?;
    let weights = weights.component_mul(&DVector::from_column_slice(&map.measures));
    norm.element_contribution(&ElementQuadrature {
        patch,
        element,
        map: &map,
        weights,
    })
}

fn eval_physical(function: &dyn PatchFunction, quadrature: &ElementQuadrature) -> DMatrix<f64> {
    if function.is_parametric() {
        function.eval(quadrature.patch, &quadrature.map.points)
    } else {
        function.eval(quadrature.patch, &quadrature.map.values_matrix())
    }
}

fn check_dim(function: &dyn PatchFunction, expected: usize, name: &str) -> eyre::Result<()> {
    if function.target_dim() != expected {
        return Err(eyre!(
            "{} must have {} components, got {}",
            name,
            expected,
            function.target_dim()
        ));
    }
    Ok(())
}

/// `‖u_h - u‖` in `L²`.
#[derive(Debug, Clone, Copy)]
pub struct L2Error<'a> {
    pub field: &'a MultiPatchField,
    pub exact: &'a dyn PatchFunction,
}

impl ElementNorm for L2Error<'_> {
    fn element_contribution(&self, q: &ElementQuadrature) -> eyre::Result<f64> {
        check_dim(self.exact, self.field.num_components(), "exact solution")?;
        let approximate = self.field.eval_element(q.patch, q.element, &q.map.points);
        let exact = eval_physical(self.exact, q);
        let difference = approximate.values - exact;
        Ok((0..q.weights.len())
            .map(|k| q.weights[k] * difference.column(k).norm_squared())
            .sum())
    }
}

/// `‖∇u_h - ∇u‖` in `L²` for a scalar field.
#[derive(Debug, Clone, Copy)]
pub struct H1SeminormError<'a> {
    pub field: &'a MultiPatchField,
    pub exact_gradient: &'a dyn PatchFunction,
}

impl ElementNorm for H1SeminormError<'_> {
    fn element_contribution(&self, q: &ElementQuadrature) -> eyre::Result<f64> {
        check_dim(self.exact_gradient, 2, "exact gradient")?;
        let values = self.field.eval_element(q.patch, q.element, &q.map.points);
        let gradients = values.physical_gradients(q.map);
        let exact = eval_physical(self.exact_gradient, q);
        Ok((0..q.weights.len())
            .map(|k| {
                let dx = gradients[k][(0, 0)] - exact[(0, k)];
                let dy = gradients[k][(0, 1)] - exact[(1, k)];
                q.weights[k] * (dx * dx + dy * dy)
            })
            .sum())
    }
}

/// The dual part `‖∇v - y‖` of the majorant.
#[derive(Debug, Clone, Copy)]
pub struct DualMajorant<'a> {
    pub primal: &'a MultiPatchField,
    pub flux: &'a MultiPatchField,
}

impl ElementNorm for DualMajorant<'_> {
    fn element_contribution(&self, q: &ElementQuadrature) -> eyre::Result<f64> {
        if self.flux.num_components() != 2 {
            return Err(eyre!("flux must have 2 components, got {}", self.flux.num_components()));
        }
        let primal = self.primal.eval_element(q.patch, q.element, &q.map.points);
        let gradients = primal.physical_gradients(q.map);
        let flux = self.flux.eval_element(q.patch, q.element, &q.map.points);
        Ok((0..q.weights.len())
            .map(|k| {
                let dx = gradients[k][(0, 0)] - flux.values[(0, k)];
                let dy = gradients[k][(0, 1)] - flux.values[(1, k)];
                q.weights[k] * (dx * dx + dy * dy)
            })
            .sum())
    }
}

/// The equilibration part `‖div y + f‖` of the majorant.
#[derive(Debug, Clone, Copy)]
pub struct EquilibratedMajorant<'a> {
    pub flux: &'a MultiPatchField,
    pub source: &'a dyn PatchFunction,
}

impl ElementNorm for EquilibratedMajorant<'_> {
    fn element_contribution(&self, q: &ElementQuadrature) -> eyre::Result<f64> {
        check_dim(self.source, 1, "source")?;
        if self.flux.num_components() != 2 {
            return Err(eyre!("flux must have 2 components, got {}", self.flux.num_components()));
        }
        let flux = self.flux.eval_element(q.patch, q.element, &q.map.points);
        let gradients = flux.physical_gradients(q.map);
        let source = eval_physical(self.source, q);
        Ok((0..q.weights.len())
            .map(|k| {
                let residual = gradients[k][(0, 0)] + gradients[k][(1, 1)] + source[(0, k)];
                q.weights[k] * residual * residual
            })
            .sum())
    }
}

/// The minorant `∫ 2 f w - (2∇v + ∇w)·∇w` for an approximation `v` and an auxiliary
/// function `w`.
///
/// Element contributions are signed. The total is the square root of the positive part of
/// their sum.
#[derive(Debug, Clone, Copy)]
pub struct Minorant<'a> {
    pub primal: &'a MultiPatchField,
    pub auxiliary: &'a MultiPatchField,
    pub source: &'a dyn PatchFunction,
}

impl ElementNorm for Minorant<'_> {
    fn element_contribution(&self, q: &ElementQuadrature) -> eyre::Result<f64> {
        check_dim(self.source, 1, "source")?;
        let primal = self.primal.eval_element(q.patch, q.element, &q.map.points);
        let primal_gradients = primal.physical_gradients(q.map);
        let auxiliary = self.auxiliary.eval_element(q.patch, q.element, &q.map.points);
        let auxiliary_gradients = auxiliary.physical_gradients(q.map);
        let source = eval_physical(self.source, q);
        Ok((0..q.weights.len())
            .map(|k| {
                let gv = &primal_gradients[k];
                let gw = &auxiliary_gradients[k];
                let quadratic = (2.0 * gv[(0, 0)] + gw[(0, 0)]) * gw[(0, 0)]
                    + (2.0 * gv[(0, 1)] + gw[(0, 1)]) * gw[(0, 1)];
                q.weights[k] * (2.0 * source[(0, k)] * auxiliary.values[(0, k)] - quadratic)
            })
            .sum())
    }

    fn finalize(&self, sum: f64) -> f64 {
        sum.max(0.0).sqrt()
    }
}

/// `(Σ_K δ_K ‖∂_t (v - u)‖²_K)^{1/2}` with `δ_K = h_K² / d`, where the last coordinate is
/// time and `h_K` is the cell size of element `K`.
#[derive(Debug, Clone, Copy)]
pub struct LocalisedTimeDerivativeError<'a> {
    pub field: &'a MultiPatchField,
    pub exact_gradient: &'a dyn PatchFunction,
}

impl ElementNorm for LocalisedTimeDerivativeError<'_> {
    fn element_contribution(&self, q: &ElementQuadrature) -> eyre::Result<f64> {
        check_dim(self.exact_gradient, 2, "exact gradient")?;
        let d = q.element.dim();
        let h = q.element.cell_size();
        let delta = h * h / d as f64;
        let values = self.field.eval_element(q.patch, q.element, &q.map.points);
        let gradients = values.physical_gradients(q.map);
        let exact = eval_physical(self.exact_gradient, q);
        Ok((0..q.weights.len())
            .map(|k| {
                let difference = gradients[k][(0, d - 1)] - exact[(d - 1, k)];
                q.weights[k] * delta * difference * difference
            })
            .sum())
    }
}

const NEGLIGIBLE: f64 = 1e-16;

/// Combines the dual and equilibration terms into the majorant.
pub fn majorant(md: f64, meq: f64, beta: f64, friedrichs_constant: f64) -> f64 {
    if meq < NEGLIGIBLE {
        md
    } else if md < NEGLIGIBLE {
        friedrichs_constant * meq
    } else {
        ((1.0 + beta) * md * md + (1.0 + 1.0 / beta) * (friedrichs_constant * meq).powi(2)).sqrt()
    }
}

/// The value of `β` that minimizes the majorant for fixed `md` and `meq`.
pub fn optimal_beta(md: f64, meq: f64, friedrichs_constant: f64) -> f64 {
    friedrichs_constant * meq / md
}

/// Element-wise squared majorant from the squared element contributions of both terms.
pub fn majorant_distribution(
    md: &ElementNorms,
    meq: &ElementNorms,
    beta: f64,
    friedrichs_constant: f64,
) -> eyre::Result<Vec<f64>> {
    if md.element_contributions.len() != meq.element_contributions.len() {
        return Err(eyre!(
            "majorant terms have {} and {} element contributions",
            md.element_contributions.len(),
            meq.element_contributions.len()
        ));
    }
    let c2 = friedrichs_constant * friedrichs_constant;
    let distribution = if meq.total < NEGLIGIBLE {
        md.element_contributions.clone()
    } else if md.total < NEGLIGIBLE {
        meq.element_contributions.iter().map(|m| c2 * m).collect()
    } else {
        md.element_contributions
            .iter()
            .zip(&meq.element_contributions)
            .map(|(d, e)| (1.0 + beta) * d + (1.0 + 1.0 / beta) * c2 * e)
            .collect()
    };
    Ok(distribution)
}
