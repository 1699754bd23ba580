//! Dirichlet boundary data and the values of eliminated DOFs.

use crate::dof_mapper::DofMapper;
use crate::function::PatchFunction;
use crate::multipatch::{BoxSide, MultiBasis, MultiPatch, PatchSide};
use eyre::eyre;
use nalgebra::{DMatrix, Point2};
use std::sync::Arc;

/// Boundary values prescribed on a set of patch sides.
#[derive(Debug, Clone)]
pub struct DirichletBoundary {
    sides: Vec<PatchSide>,
    values: Arc<dyn PatchFunction>,
}

impl DirichletBoundary {
    pub fn new(sides: Vec<PatchSide>, values: Arc<dyn PatchFunction>) -> Self {
        Self { sides, values }
    }

    /// Prescribes `values` on every outer boundary side of `multipatch`.
    pub fn on_boundary(multipatch: &MultiPatch, values: Arc<dyn PatchFunction>) -> Self {
        Self::new(multipatch.boundaries().to_vec(), values)
    }

    pub fn sides(&self) -> &[PatchSide] {
        &self.sides
    }

    pub fn values(&self) -> &Arc<dyn PatchFunction> {
        &self.values
    }

    /// Computes the coefficients of the eliminated DOFs, one row per boundary DOF of `mapper`.
    ///
    /// On each side the boundary values are interpolated at the Greville abscissae of the
    /// univariate basis along the side.
    pub fn fixed_part(&self, basis: &MultiBasis, multipatch: &MultiPatch, mapper: &DofMapper) -> eyre::Result<DMatrix<f64>> {
        let components = self.values.target_dim();
        let mut fixed = DMatrix::zeros(mapper.boundary_size(), components);
        for side in &self.sides {
            if side.patch >= basis.num_patches() {
                return Err(eyre!("Dirichlet side {:?} refers to a missing patch", side));
            }
            let coefficients = self.interpolate_side(basis, multipatch, *side)?;
            let dofs = basis.basis(side.patch).boundary(side.side);
            for (j, &i) in dofs.iter().enumerate() {
                if !mapper.is_boundary(i, side.patch) {
                    return Err(eyre!(
                        "function {} of patch {} lies on a Dirichlet side but is not eliminated",
                        i,
                        side.patch
                    ));
                }
                fixed.row_mut(mapper.bindex(i, side.patch)).copy_from(&coefficients.row(j));
            }
        }
        Ok(fixed)
    }

    fn interpolate_side(&self, basis: &MultiBasis, multipatch: &MultiPatch, side: PatchSide) -> eyre::Result<DMatrix<f64>> {
        let tensor = basis.basis(side.patch);
        let direction = side.side.tangent_direction();
        let univariate = tensor.component(direction);
        let greville = univariate.knots().greville();
        let n = greville.len();

        let params: Vec<Point2<f64>> = greville
            .iter()
            .map(|&t| match side.side {
                BoxSide::West => Point2::new(0.0, t),
                BoxSide::East => Point2::new(1.0, t),
                BoxSide::South => Point2::new(t, 0.0),
                BoxSide::North => Point2::new(t, 1.0),
            })
            .collect();

        let geometry = multipatch.patch(side.patch);
        let points = if self.values.is_parametric() {
            DMatrix::from_fn(2, n, |d, k| params[k][d])
        } else {
            let physical: Vec<Point2<f64>> = params.iter().map(|p| geometry.eval(p)).collect();
            DMatrix::from_fn(2, n, |d, k| physical[k][d])
        };
        let values = self.values.eval(side.patch, &points).transpose();

        let mut collocation = DMatrix::zeros(n, n);
        for (k, &t) in greville.iter().enumerate() {
            let (first, phi, _) = univariate.eval_at(t);
            for (a, value) in phi.iter().enumerate() {
                collocation[(k, first + a)] = *value;
            }
        }
        collocation
            .lu()
            .solve(&values)
            .ok_or_else(|| eyre!("singular boundary interpolation matrix on side {:?}", side))
    }
}
