//! Element-wise assembly of global sparse systems.
//!
//! Assembly follows a fixed per-element protocol, captured by [`ElementVisitor`]:
//!
//! 1. `initialize` once per patch, returning the quadrature rule,
//! 2. `evaluate` on each element, computing basis and geometry data at the quadrature nodes,
//! 3. `assemble` on each element, accumulating the local matrix and right-hand side,
//! 4. `local_to_global`, scattering the local contributions into a [`SparseSystem`].
//!
//! Steps 2 and 3 run in parallel over the elements of a patch, each worker thread owning its
//! own clone of the visitor. Only the scatter step touches shared state.

use serde::{Deserialize, Serialize};

mod global;
mod system;
mod visitor;
pub mod visitors;

pub use global::*;
pub use system::SparseSystem;
pub use visitor::ElementVisitor;

/// Options shared by all visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// Quadrature points per direction in addition to `degree + 1`.
    pub quad_extra: usize,
    /// Evaluate coefficient and source functions at parametric rather than physical points.
    pub param_coef: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            quad_extra: 0,
            param_coef: false,
        }
    }
}
