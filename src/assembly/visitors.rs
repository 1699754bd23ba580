//! Visitors for the forms used by the Poisson solver and its error estimators.

use crate::basis::BasisValues;
use crate::function::PatchFunction;
use crate::geometry::MapData;
use eyre::eyre;
use nalgebra::DMatrix;

mod divdiv;
mod dual_mass;
mod gluing;
mod poisson;

pub use divdiv::DivDivVisitor;
pub use dual_mass::DualMassVisitor;
pub use gluing::{GluingDataVisitor, GluingOptions};
pub use poisson::PoissonVisitor;

fn check_active_count(active: &[usize], values: &BasisValues) -> eyre::Result<()> {
    if active.len() != values.num_active() {
        return Err(eyre!(
            "basis declared {} active functions but evaluated {}",
            active.len(),
            values.num_active()
        ));
    }
    Ok(())
}

/// Evaluates `function` at parametric or physical points.
fn eval_function(
    function: &dyn PatchFunction,
    patch: usize,
    map: &MapData,
    param_coef: bool,
) -> DMatrix<f64> {
    if param_coef || function.is_parametric() {
        function.eval(patch, &map.points)
    } else {
        function.eval(patch, &map.values_matrix())
    }
}

fn check_finite(matrix: &DMatrix<f64>, rhs: &DMatrix<f64>, element: usize) -> eyre::Result<()> {
    if matrix.iter().chain(rhs.iter()).all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(eyre!("non-finite local contribution on element {}", element))
    }
}
