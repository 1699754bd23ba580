//! Sparse linear algebra building blocks for isopatch.
//!
//! Contains the scalar trait shared by the workspace, a simple sparse vector used for
//! constraint rows and the preconditioned conjugate gradient method.

use nalgebra::RealField;

pub use nalgebra;
pub use nalgebra_sparse;

pub mod cg;
pub mod vector;

pub use vector::SparseVector;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
