use crate::assembly::{AssemblyOptions, ElementVisitor, SparseSystem};
use crate::basis::{Basis, TensorBSplineBasis};
use crate::geometry::PatchGeometry;
use crate::multipatch::{MultiBasis, MultiPatch};
use eyre::eyre;
use log::debug;
use nalgebra::DMatrix;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::cell::RefCell;
use std::time::Instant;
use thread_local::ThreadLocal;

/// Assembles the contributions of all elements of one patch into `system`.
///
/// Elements are processed in parallel. Each worker thread evaluates and assembles with its own
/// clone of the initialized visitor, and the scatter step holds the lock on `system`.
///
/// On error `system` may already hold the contributions of some elements and has to be
/// discarded. [`assemble_multipatch`] owns its system and only returns it when every patch
/// succeeded.
pub fn assemble_patch<V: ElementVisitor>(
    visitor: &V,
    basis: &V::Basis,
    geometry: &dyn PatchGeometry,
    patch: usize,
    eliminated: &[DMatrix<f64>],
    system: &Mutex<SparseSystem<f64>>,
    options: &AssemblyOptions,
) -> eyre::Result<()> {
    let mut prototype = visitor.clone();
    let rule = prototype.initialize(basis, patch, options)?;
    let elements = basis.elements();
    let workers: ThreadLocal<RefCell<V>> = ThreadLocal::new();

    elements.par_iter().try_for_each(|element| -> eyre::Result<()> {
        let mut worker = workers
            .get_or(|| RefCell::new(prototype.clone()))
            .borrow_mut();
        let (nodes, weights) = rule.map_to(element)?;
        worker.evaluate(basis, geometry, element, &nodes)?;
        worker.assemble(element, &weights)?;
        let mut system = system.lock();
        worker.local_to_global(patch, eliminated, &mut system)
    })
}

/// Assembles a visitor over every patch of a multi-patch domain.
pub fn assemble_multipatch<V>(
    visitor: &V,
    multi_basis: &MultiBasis,
    multipatch: &MultiPatch,
    eliminated: &[DMatrix<f64>],
    system: SparseSystem<f64>,
    options: &AssemblyOptions,
) -> eyre::Result<SparseSystem<f64>>
where
    V: ElementVisitor<Basis = TensorBSplineBasis>,
{
    if multi_basis.num_patches() != multipatch.num_patches() {
        return Err(eyre!(
            "basis has {} patches but the geometry has {}",
            multi_basis.num_patches(),
            multipatch.num_patches()
        ));
    }
    let timer = Instant::now();
    let system = Mutex::new(system);
    for patch in 0..multipatch.num_patches() {
        assemble_patch(
            visitor,
            multi_basis.basis(patch),
            multipatch.patch(patch),
            patch,
            eliminated,
            &system,
            options,
        )?;
    }
    let system = system.into_inner();
    debug!(
        "Assembled {} elements into a system of size {} in {:.2?}",
        multi_basis.total_elements(),
        system.size(),
        timer.elapsed()
    );
    Ok(system)
}
