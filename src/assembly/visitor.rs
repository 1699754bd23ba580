use crate::assembly::{AssemblyOptions, SparseSystem};
use crate::basis::{Basis, Element};
use crate::geometry::{GeometryFlags, PatchGeometry};
use crate::quadrature::QuadRule;
use nalgebra::{DMatrix, DVector};

/// Per-element assembly of a bilinear form and its load.
///
/// The methods are called in a fixed order: `initialize` once per patch, then `evaluate`,
/// `assemble` and `local_to_global` for every element. A visitor owns all of its scratch
/// data, and parallel assembly works on one clone per thread.
pub trait ElementVisitor: Clone + Send + Sync {
    type Basis: Basis + ?Sized;

    /// Prepares the visitor for `patch` and returns the quadrature rule to use on its
    /// elements.
    fn initialize(&mut self, basis: &Self::Basis, patch: usize, options: &AssemblyOptions) -> eyre::Result<QuadRule>;

    /// Geometric quantities needed by `evaluate`.
    fn geometry_flags(&self) -> GeometryFlags;

    /// Evaluates basis functions, geometry and coefficients at the quadrature nodes
    /// (columns of `nodes`) and clears the local matrix and right-hand side.
    fn evaluate(
        &mut self,
        basis: &Self::Basis,
        geometry: &dyn PatchGeometry,
        element: &Element,
        nodes: &DMatrix<f64>,
    ) -> eyre::Result<()>;

    /// Accumulates the local matrix and right-hand side.
    fn assemble(&mut self, element: &Element, weights: &DVector<f64>) -> eyre::Result<()>;

    /// Scatters the local contributions into `system`. `eliminated` holds the values of the
    /// eliminated DOFs of each block.
    fn local_to_global(
        &self,
        patch: usize,
        eliminated: &[DMatrix<f64>],
        system: &mut SparseSystem<f64>,
    ) -> eyre::Result<()>;
}
