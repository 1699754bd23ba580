use super::{check_active_count, check_finite, eval_function};
use crate::assembly::{AssemblyOptions, ElementVisitor, SparseSystem};
use crate::basis::{Basis, BasisValues, Element, TensorBSplineBasis};
use crate::function::PatchFunction;
use crate::geometry::{GeometryFlags, MapData, PatchGeometry};
use crate::quadrature::QuadRule;
use eyre::eyre;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// The stiffness form `∫ a ∇u·∇v` with load `∫ f v - ∫ g·∇v`.
///
/// The coefficient `a` defaults to one and the gradient load `g` to zero.
#[derive(Debug, Clone)]
pub struct PoissonVisitor {
    coefficient: Option<Arc<dyn PatchFunction>>,
    source: Arc<dyn PatchFunction>,
    gradient_load: Option<Arc<dyn PatchFunction>>,
    param_coef: bool,
    patch: usize,

    active: Vec<usize>,
    basis_values: BasisValues,
    map: MapData,
    coefficient_values: DMatrix<f64>,
    source_values: DMatrix<f64>,
    load_values: DMatrix<f64>,
    local_matrix: DMatrix<f64>,
    local_rhs: DMatrix<f64>,
}

impl PoissonVisitor {
    pub fn new(source: Arc<dyn PatchFunction>) -> Self {
        Self {
            coefficient: None,
            source,
            gradient_load: None,
            param_coef: false,
            patch: 0,
            active: Vec::new(),
            basis_values: BasisValues::empty(),
            map: MapData::default(),
            coefficient_values: DMatrix::zeros(0, 0),
            source_values: DMatrix::zeros(0, 0),
            load_values: DMatrix::zeros(0, 0),
            local_matrix: DMatrix::zeros(0, 0),
            local_rhs: DMatrix::zeros(0, 0),
        }
    }

    pub fn with_coefficient(self, coefficient: Arc<dyn PatchFunction>) -> Self {
        Self {
            coefficient: Some(coefficient),
            ..self
        }
    }

    pub fn with_gradient_load(self, load: Arc<dyn PatchFunction>) -> Self {
        Self {
            gradient_load: Some(load),
            ..self
        }
    }

    pub fn local_matrix(&self) -> &DMatrix<f64> {
        &self.local_matrix
    }

    pub fn local_rhs(&self) -> &DMatrix<f64> {
        &self.local_rhs
    }

    pub fn active(&self) -> &[usize] {
        &self.active
    }
}

impl ElementVisitor for PoissonVisitor {
    type Basis = TensorBSplineBasis;

    fn initialize(&mut self, basis: &Self::Basis, patch: usize, options: &AssemblyOptions) -> eyre::Result<QuadRule> {
        if self.source.target_dim() != 1 {
            return Err(eyre!("Poisson source must be scalar, got dimension {}", self.source.target_dim()));
        }
        if let Some(load) = &self.gradient_load {
            if load.target_dim() != 2 {
                return Err(eyre!("gradient load must have two components, got {}", load.target_dim()));
            }
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

        let n = nodes.ncols();
        self.coefficient_values = match &self.coefficient {
            Some(a) => eval_function(a.as_ref(), self.patch, &self.map, self.param_coef),
            None => DMatrix::from_element(1, n, 1.0),
        };
        self.source_values = eval_function(self.source.as_ref(), self.patch, &self.map, self.param_coef);
        self.load_values = match &self.gradient_load {
            Some(g) => eval_function(g.as_ref(), self.patch, &self.map, self.param_coef),
            None => DMatrix::zeros(0, n),
        };

        let num_active = self.active.len();
        self.local_matrix = DMatrix::zeros(num_active, num_active);
        self.local_rhs = DMatrix::zeros(num_active, 1);
        Ok(())
    }

    fn assemble(&mut self, element: &Element, weights: &DVector<f64>) -> eyre::Result<()> {
        let n = self.active.len();
        let mut matrix = DMatrix::zeros(n, n);
        let mut rhs = DVector::zeros(n);
        for k in 0..weights.len() {
            let weight = weights[k] * self.map.measures[k];
            let gradients = self
                .map
                .transform_gradients(k, &self.basis_values.parametric_gradients(k));

            matrix.gemm_tr(weight * self.coefficient_values[(0, k)], &gradients, &gradients, 1.0);
            rhs.axpy(weight * self.source_values[(0, k)], &self.basis_values.values.column(k), 1.0);
            if self.load_values.nrows() > 0 {
                rhs.gemv_tr(-weight, &gradients, &self.load_values.column(k), 1.0);
            }
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
        let dofs = system.map_col_indices(&self.active, patch, 0);
        system.push(&self.local_matrix, &self.local_rhs, &dofs, eliminated.first(), 0, 0)
    }
}
