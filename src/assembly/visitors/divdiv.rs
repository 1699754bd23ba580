use super::{check_active_count, check_finite, eval_function};
use crate::assembly::{AssemblyOptions, ElementVisitor, SparseSystem};
use crate::basis::{Basis, BasisValues, Element, TensorBSplineBasis};
use crate::function::PatchFunction;
use crate::geometry::{GeometryFlags, MapData, PatchGeometry};
use crate::quadrature::QuadRule;
use eyre::eyre;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

const DIM: usize = 2;

/// The form `∫ div y div z` with load `-∫ f div z` for vector fields `y, z`.
///
/// Vector fields use the same scalar basis in each component. The local matrix consists of
/// `2 x 2` blocks, block `(r, c)` holding `∫ ∂_r φ_i ∂_c φ_j`, and block `r` of the system
/// belongs to component `r`.
#[derive(Debug, Clone)]
pub struct DivDivVisitor {
    source: Arc<dyn PatchFunction>,
    param_coef: bool,
    patch: usize,

    active: Vec<usize>,
    basis_values: BasisValues,
    map: MapData,
    source_values: DMatrix<f64>,
    local_matrix: DMatrix<f64>,
    local_rhs: DMatrix<f64>,
}

impl DivDivVisitor {
    pub fn new(source: Arc<dyn PatchFunction>) -> Self {
        Self {
            source,
            param_coef: false,
            patch: 0,
            active: Vec::new(),
            basis_values: BasisValues::empty(),
            map: MapData::default(),
            source_values: DMatrix::zeros(0, 0),
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
}

impl ElementVisitor for DivDivVisitor {
    type Basis = TensorBSplineBasis;

    fn initialize(&mut self, basis: &Self::Basis, patch: usize, options: &AssemblyOptions) -> eyre::Result<QuadRule> {
        if self.source.target_dim() != 1 {
            return Err(eyre!("div-div source must be scalar, got dimension {}", self.source.target_dim()));
        }
        self.patch = patch;
        self.param_coef = options.param_coef;
        QuadRule::for_basis(basis, options.quad_extra)
    }

    fn geometry_flags(&self) -> GeometryFlags {
        GeometryFlags::STIFFNESS
    }

    fn evaluate(
        &mut self,
        basis: &Self::Basis,
        geometry: &dyn PatchGeometry,
        element: &Element,
        nodes: &DMatrix<f64>,
    ) -> eyre::Result<()> {
        self.active = basis.active(element);
        self.basis_values = basis.eval_all_ders(element, nodes, 1);
        check_active_count(&self.active, &self.basis_values)?;
        self.map = MapData::compute(geometry, nodes, self.geometry_flags())?;
        self.source_values = eval_function(self.source.as_ref(), self.patch, &self.map, self.param_coef);

        let n = DIM * self.active.len();
        self.local_matrix = DMatrix::zeros(n, n);
        self.local_rhs = DMatrix::zeros(n, 1);
        Ok(())
    }

    fn assemble(&mut self, element: &Element, weights: &DVector<f64>) -> eyre::Result<()> {
        let num_active = self.active.len();
        let n = DIM * num_active;
        let mut matrix = DMatrix::zeros(n, n);
        let mut rhs = DVector::zeros(n);
        let mut divergences = DVector::zeros(n);
        for k in 0..weights.len() {
            let weight = weights[k] * self.map.measures[k];
            let gradients = self
                .map
                .transform_gradients(k, &self.basis_values.parametric_gradients(k));
            // Component r of function i sits at r * num_active + i
            for r in 0..DIM {
                for i in 0..num_active {
                    divergences[r * num_active + i] = gradients[(r, i)];
                }
            }
            matrix.ger(weight, &divergences, &divergences, 1.0);
            rhs.axpy(-weight * self.source_values[(0, k)], &divergences, 1.0);
        }
        self.local_matrix += matrix;
        let mut column = self.local_rhs.column_mut(0);
        column += rhs;
        check_finite(&self.local_matrix, &self.local_rhs, element.index)
    }

    fn local_to_global(
        &self,
        patch: usize,
        eliminated: &[DMatrix<f64>],
        system: &mut SparseSystem<f64>,
    ) -> eyre::Result<()> {
        let n = self.active.len();
        for r in 0..DIM {
            let row_dofs = system.map_col_indices(&self.active, patch, r);
            for c in r..DIM {
                let block = self.local_matrix.view((r * n, c * n), (n, n)).clone_owned();
                if r == c {
                    let rhs = self.local_rhs.rows(r * n, n).clone_owned();
                    system.push(&block, &rhs, &row_dofs, eliminated.get(c), r, c)?;
                } else {
                    let col_dofs = system.map_col_indices(&self.active, patch, c);
                    system.push_to_matrix(&block, &row_dofs, &col_dofs, eliminated.get(c), r, c)?;
                    system.push_to_matrix(&block.transpose(), &col_dofs, &row_dofs, eliminated.get(r), c, r)?;
                }
            }
        }
        Ok(())
    }
}
