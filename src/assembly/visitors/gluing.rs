use super::{check_active_count, check_finite};
use crate::assembly::{AssemblyOptions, ElementVisitor, SparseSystem};
use crate::basis::{Basis, BasisValues, Element, GluingDataBasis};
use crate::geometry::{GeometryFlags, PatchGeometry};
use crate::quadrature::QuadRule;
use nalgebra::{DMatrix, DVector, Matrix3, Point2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GluingOptions {
    /// Regularization weight.
    pub lambda: f64,
}

impl Default for GluingOptions {
    fn default() -> Self {
        Self { lambda: 1e-5 }
    }
}

/// Least-squares system for the gluing data of the interface between two patches.
///
/// The interface is the west side `u = 0` of the right patch and the south side `v = 0` of the
/// left patch, both parametrized by `t`. The three components of a [`GluingDataBasis`]
/// (`alpha` of the right patch, `alpha` of the left patch and `beta`) are coupled through the
/// inner products of the Jacobian columns of the two patch maps along the interface.
#[derive(Debug, Clone)]
pub struct GluingDataVisitor {
    right: Arc<dyn PatchGeometry>,
    left: Arc<dyn PatchGeometry>,
    options: GluingOptions,

    active: Vec<usize>,
    num_active: [usize; 3],
    basis_values: BasisValues,
    /// Block coefficients at each quadrature node.
    blocks: Vec<Matrix3<f64>>,
    local_matrix: DMatrix<f64>,
    local_rhs: DMatrix<f64>,
}

impl GluingDataVisitor {
    pub fn new(right: Arc<dyn PatchGeometry>, left: Arc<dyn PatchGeometry>, options: GluingOptions) -> Self {
        Self {
            right,
            left,
            options,
            active: Vec::new(),
            num_active: [0; 3],
            basis_values: BasisValues::empty(),
            blocks: Vec::new(),
            local_matrix: DMatrix::zeros(0, 0),
            local_rhs: DMatrix::zeros(0, 0),
        }
    }

    pub fn local_matrix(&self) -> &DMatrix<f64> {
        &self.local_matrix
    }

    pub fn local_rhs(&self) -> &DMatrix<f64> {
        &self.local_rhs
    }

    fn block_of(&self, a: usize) -> usize {
        if a < self.num_active[0] {
            0
        } else if a < self.num_active[0] + self.num_active[1] {
            1
        } else {
            2
        }
    }
}

impl ElementVisitor for GluingDataVisitor {
    type Basis = GluingDataBasis;

    fn initialize(&mut self, basis: &Self::Basis, _patch: usize, options: &AssemblyOptions) -> eyre::Result<QuadRule> {
        QuadRule::for_basis(basis, options.quad_extra)
    }

    fn geometry_flags(&self) -> GeometryFlags {
        GeometryFlags::NONE
    }

    fn evaluate(
        &mut self,
        basis: &Self::Basis,
        _geometry: &dyn PatchGeometry,
        element: &Element,
        nodes: &DMatrix<f64>,
    ) -> eyre::Result<()> {
        self.active = basis.active(element);
        self.basis_values = basis.eval_all_ders(element, nodes, 0);
        check_active_count(&self.active, &self.basis_values)?;
        self.num_active = basis.num_active_per_component();

        let lambda = self.options.lambda;
        self.blocks = (0..nodes.ncols())
            .map(|k| {
                let t = nodes[(0, k)];
                let jacobian_right = self.right.jacobian(&Point2::new(0.0, t));
                let jacobian_left = self.left.jacobian(&Point2::new(t, 0.0));
                let du_right = jacobian_right.column(0);
                let dv_right = jacobian_right.column(1);
                let dv_left = jacobian_left.column(1);

                let b11 = du_right.dot(&du_right) + lambda;
                let b12 = dv_left.dot(&du_right);
                let b13 = dv_right.dot(&du_right);
                let b22 = dv_left.dot(&dv_left) + lambda;
                let b23 = dv_left.dot(&dv_right);
                let b33 = dv_right.dot(&dv_right);
                Matrix3::new(b11, b12, b13, b12, b22, b23, b13, b23, b33)
            })
            .collect();

        let n = self.active.len();
        self.local_matrix = DMatrix::zeros(n, n);
        self.local_rhs = DMatrix::zeros(n, 1);
        Ok(())
    }

    fn assemble(&mut self, element: &Element, weights: &DVector<f64>) -> eyre::Result<()> {
        let n = self.active.len();
        let lambda = self.options.lambda;
        let block_ids: Vec<usize> = (0..n).map(|a| self.block_of(a)).collect();
        let mut matrix = DMatrix::zeros(n, n);
        let mut rhs = DMatrix::zeros(n, 1);
        for k in 0..weights.len() {
            let weight = weights[k];
            let phi = self.basis_values.values.column(k);
            let blocks = &self.blocks[k];
            for a in 0..n {
                if block_ids[a] < 2 {
                    rhs[(a, 0)] += weight * lambda * phi[a];
                }
                for b in 0..n {
                    matrix[(a, b)] += weight * blocks[(block_ids[a], block_ids[b])] * phi[a] * phi[b];
                }
            }
        }
        self.local_matrix += matrix;
        self.local_rhs += rhs;
        check_finite(&self.local_matrix, &self.local_rhs, element.index)
    }

    fn local_to_global(
        &self,
        patch: usize,
        eliminated: &[DMatrix<f64>],
        system: &mut SparseSystem<f64>,
    ) -> eyre::Result<()> {
        let dofs = system.map_col_indices(&self.active, patch, 0);
        system.push(&self.local_matrix, &self.local_rhs, &dofs, eliminated.first(), 0, 0)
    }
}
