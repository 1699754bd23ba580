//! Spline fields reconstructed from global solution vectors.

use crate::basis::{Basis, Element};
use crate::dof_mapper::DofMapper;
use crate::function::PatchFunction;
use crate::geometry::MapData;
use crate::multipatch::{MultiBasis, MultiPatch};
use eyre::eyre;
use nalgebra::{DMatrix, DVector, Matrix2, Point2};

/// A (possibly vector-valued) spline field with one coefficient matrix per patch.
///
/// The coefficient matrix of a patch has one row per local basis function and one column per
/// field component.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPatchField {
    basis: MultiBasis,
    coefficients: Vec<DMatrix<f64>>,
}

/// Field values and parametric gradients at the quadrature points of an element.
#[derive(Debug, Clone)]
pub struct ElementFieldValues {
    /// `components x n`
    pub values: DMatrix<f64>,
    /// One `components x 2` matrix per point.
    pub gradients: Vec<DMatrix<f64>>,
}

impl ElementFieldValues {
    /// Maps the parametric gradients to physical gradients using the gradient transforms of
    /// `map`.
    pub fn physical_gradients(&self, map: &MapData) -> Vec<DMatrix<f64>> {
        self.gradients
            .iter()
            .zip(&map.inverse_transposes)
            .map(|(g, inverse_transpose)| g * to_dynamic(&inverse_transpose.transpose()))
            .collect()
    }
}

impl MultiPatchField {
    pub fn from_patch_coefficients(basis: MultiBasis, coefficients: Vec<DMatrix<f64>>) -> eyre::Result<Self> {
        if coefficients.len() != basis.num_patches() {
            return Err(eyre!(
                "got coefficients for {} patches, basis has {}",
                coefficients.len(),
                basis.num_patches()
            ));
        }
        let components = coefficients.first().map(|c| c.ncols()).unwrap_or(0);
        for (patch, c) in coefficients.iter().enumerate() {
            if c.nrows() != basis.basis(patch).size() || c.ncols() != components {
                return Err(eyre!(
                    "coefficients of patch {} have shape {}x{}, expected {}x{}",
                    patch,
                    c.nrows(),
                    c.ncols(),
                    basis.basis(patch).size(),
                    components
                ));
            }
        }
        Ok(Self { basis, coefficients })
    }

    /// Distributes a global solution to the patches.
    ///
    /// `solution` is `free_size x components`, `fixed_part` is `boundary_size x components`
    /// and may have zero rows when nothing is eliminated.
    pub fn from_solution(
        basis: MultiBasis,
        mapper: &DofMapper,
        solution: &DMatrix<f64>,
        fixed_part: &DMatrix<f64>,
    ) -> eyre::Result<Self> {
        if solution.nrows() != mapper.free_size() {
            return Err(eyre!(
                "solution has {} rows, the mapper has {} free DOFs",
                solution.nrows(),
                mapper.free_size()
            ));
        }
        if mapper.boundary_size() > 0
            && (fixed_part.nrows() != mapper.boundary_size() || fixed_part.ncols() != solution.ncols())
        {
            return Err(eyre!(
                "fixed part has shape {}x{}, expected {}x{}",
                fixed_part.nrows(),
                fixed_part.ncols(),
                mapper.boundary_size(),
                solution.ncols()
            ));
        }
        if mapper.num_patches() != basis.num_patches() {
            return Err(eyre!("mapper and basis disagree on the number of patches"));
        }

        let components = solution.ncols();
        let coefficients = (0..basis.num_patches())
            .map(|patch| {
                let indices = mapper.patch_indices(patch);
                DMatrix::from_fn(indices.len(), components, |i, c| {
                    let global = indices[i];
                    if mapper.is_free_index(global) {
                        solution[(global, c)]
                    } else {
                        fixed_part[(mapper.global_to_bindex(global), c)]
                    }
                })
            })
            .collect();
        Self::from_patch_coefficients(basis, coefficients)
    }

    /// Like [`MultiPatchField::from_solution`] for a solution whose components are stacked
    /// in blocks of `free_size` entries, as produced by block systems.
    pub fn from_block_solution(
        basis: MultiBasis,
        mapper: &DofMapper,
        solution: &DVector<f64>,
        components: usize,
    ) -> eyre::Result<Self> {
        let n = mapper.free_size();
        if solution.len() != n * components {
            return Err(eyre!(
                "block solution has {} entries, expected {} blocks of {}",
                solution.len(),
                components,
                n
            ));
        }
        let reshaped = DMatrix::from_column_slice(n, components, solution.as_slice());
        Self::from_solution(basis, mapper, &reshaped, &DMatrix::zeros(0, components))
    }

    pub fn basis(&self) -> &MultiBasis {
        &self.basis
    }

    pub fn coefficients(&self, patch: usize) -> &DMatrix<f64> {
        &self.coefficients[patch]
    }

    pub fn num_components(&self) -> usize {
        self.coefficients.first().map(|c| c.ncols()).unwrap_or(0)
    }

    pub fn value(&self, patch: usize, param: &Point2<f64>) -> DVector<f64> {
        let evaluation = self.basis.basis(patch).eval_point(param);
        let coefficients = &self.coefficients[patch];
        let mut value = DVector::zeros(self.num_components());
        for (&i, &phi) in evaluation.active.iter().zip(&evaluation.values) {
            value += coefficients.row(i).transpose() * phi;
        }
        value
    }

    /// Parametric gradient as a `components x 2` matrix.
    pub fn parametric_gradient(&self, patch: usize, param: &Point2<f64>) -> DMatrix<f64> {
        let evaluation = self.basis.basis(patch).eval_point(param);
        let coefficients = &self.coefficients[patch];
        let mut gradient = DMatrix::zeros(self.num_components(), 2);
        for (a, &i) in evaluation.active.iter().enumerate() {
            for c in 0..self.num_components() {
                for d in 0..2 {
                    gradient[(c, d)] += coefficients[(i, c)] * evaluation.gradients[(d, a)];
                }
            }
        }
        gradient
    }

    /// Physical gradient as a `components x 2` matrix.
    pub fn physical_gradient(
        &self,
        patch: usize,
        param: &Point2<f64>,
        multipatch: &MultiPatch,
    ) -> eyre::Result<DMatrix<f64>> {
        let jacobian = multipatch.patch(patch).jacobian(param);
        let inverse = jacobian
            .try_inverse()
            .ok_or_else(|| eyre!("Singular element Jacobian encountered"))?;
        Ok(self.parametric_gradient(patch, param) * to_dynamic(&inverse))
    }

    /// Evaluates the field on all points of an element of `patch`.
    pub fn eval_element(&self, patch: usize, element: &Element, points: &DMatrix<f64>) -> ElementFieldValues {
        let basis = self.basis.basis(patch);
        let active = basis.active(element);
        let values = basis.eval_all_ders(element, points, 1);
        let local = self.coefficients[patch].select_rows(active.iter());

        let field_values = local.transpose() * &values.values;
        let gradients = (0..values.num_points())
            .map(|k| local.transpose() * values.parametric_gradients(k).transpose())
            .collect();
        ElementFieldValues {
            values: field_values,
            gradients,
        }
    }
}

fn to_dynamic(m: &Matrix2<f64>) -> DMatrix<f64> {
    DMatrix::from_column_slice(2, 2, m.as_slice())
}

/// The physical gradient of a field, evaluated at parametric points.
///
/// Points where the geometry is singular evaluate to NaN.
#[derive(Debug, Clone)]
pub struct FieldGradient {
    field: MultiPatchField,
    multipatch: MultiPatch,
}

impl FieldGradient {
    pub fn new(field: MultiPatchField, multipatch: MultiPatch) -> Self {
        Self { field, multipatch }
    }
}

impl PatchFunction for FieldGradient {
    fn target_dim(&self) -> usize {
        2 * self.field.num_components()
    }

    fn eval(&self, patch: usize, points: &DMatrix<f64>) -> DMatrix<f64> {
        let components = self.field.num_components();
        let mut result = DMatrix::zeros(self.target_dim(), points.ncols());
        for k in 0..points.ncols() {
            let param = Point2::new(points[(0, k)], points[(1, k)]);
            match self.field.physical_gradient(patch, &param, &self.multipatch) {
                Ok(gradient) => {
                    for c in 0..components {
                        for d in 0..2 {
                            result[(2 * c + d, k)] = gradient[(c, d)];
                        }
                    }
                }
                Err(_) => result.column_mut(k).fill(f64::NAN),
            }
        }
        result
    }

    fn is_parametric(&self) -> bool {
        true
    }
}
