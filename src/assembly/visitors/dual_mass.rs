use super::{check_active_count, check_finite, eval_function};
use crate::assembly::{AssemblyOptions, ElementVisitor, SparseSystem};
use crate::basis::{Basis, BasisValues, Element, TensorBSplineBasis};
use crate::function::PatchFunction;
use crate::geometry::{GeometryFlags, MapData, PatchGeometry};
use crate::quadrature::QuadRule;
use eyre::eyre;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// The vector mass form `∫ y·z` with load `∫ g·z`, block-diagonal over the components.
///
/// `g` is typically the gradient of a primal solution, so the projection of `g` onto the flux
/// space is obtained by solving the assembled system.
#[derive(Debug, Clone)]
pub struct DualMassVisitor {
    load: Arc<dyn PatchFunction>,
    param_coef: bool,
    patch: usize,

    active: Vec<usize>,
    basis_values: BasisValues,
    map: MapData,
    load_values: DMatrix<f64>,
    local_matrix: DMatrix<f64>,
    local_rhs: DMatrix<f64>,
}

impl DualMassVisitor {
    pub fn new(load: Arc<dyn PatchFunction>) -> Self {
        Self {
            load,
            param_coef: false,
            patch: 0,
            active: Vec::new(),
            basis_values: BasisValues::empty(),
            map: MapData::default(),
            load_values: DMatrix::zeros(0, 0),
            local_matrix: DMatrix::zeros(0, 0),
            local_rhs: DMatrix::zeros(0, 0),
        }
    }

    pub fn num_components(&self) -> usize {
        self.load.target_dim()
    }

    /// The scalar mass matrix of the last element, shared by all components.
    pub fn local_matrix(&self) -> &DMatrix<f64> {
        &self.local_matrix
    }

    /// `num_active x num_components`
    pub fn local_rhs(&self) -> &DMatrix<f64> {
        &self.local_rhs
    }
}

impl ElementVisitor for DualMassVisitor {
    type Basis = TensorBSplineBasis;

    fn initialize(&mut self, basis: &Self::Basis, patch: usize, options: &AssemblyOptions) -> eyre::Result<QuadRule> {
        if self.load.target_dim() == 0 {
            return Err(eyre!("dual mass load must have at least one component"));
        }
        self.patch = patch;
        self.param_coef = options.param_coef;
        QuadRule::for_basis(basis, options.quad_extra)
    }

    fn geometry_flags(&self) -> GeometryFlags {
        GeometryFlags::MASS
    }

    fn evaluate(
        &mut self,
        basis: &Self::Basis,
        geometry: &dyn PatchGeometry,
        element: &Element,
        nodes: &DMatrix<f64>,
    ) -> eyre::Result<()> {
        self.active = basis.active(element);
        self.basis_values = basis.eval_all_ders(element, nodes, 0);
        check_active_count(&self.active, &self.basis_values)?;
        self.map = MapData::compute(geometry, nodes, self.geometry_flags())?;
        self.load_values = eval_function(self.load.as_ref(), self.patch, &self.map, self.param_coef);

        let n = self.active.len();
        self.local_matrix = DMatrix::zeros(n, n);
        self.local_rhs = DMatrix::zeros(n, self.num_components());
        Ok(())
    }

    fn assemble(&mut self, element: &Element, weights: &DVector<f64>) -> eyre::Result<()> {
        let n = self.active.len();
        let mut matrix = DMatrix::zeros(n, n);
        let mut rhs = DMatrix::zeros(n, self.num_components());
        for k in 0..weights.len() {
            let weight = weights[k] * self.map.measures[k];
            let phi = self.basis_values.values.column(k);
            matrix.ger(weight, &phi, &phi, 1.0);
            rhs.ger(weight, &phi, &self.load_values.column(k), 1.0);
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
        if system.num_blocks() != self.num_components() {
            return Err(eyre!(
                "system has {} blocks but the load has {} components",
                system.num_blocks(),
                self.num_components()
            ));
        }
        for c in 0..self.num_components() {
            let dofs = system.map_col_indices(&self.active, patch, c);
            let rhs = self.local_rhs.columns(c, 1).clone_owned();
            system.push(&self.local_matrix, &rhs, &dofs, eliminated.get(c), c, c)?;
        }
        Ok(())
    }
}
