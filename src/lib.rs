//! Isogeometric analysis on multi-patch spline domains.
//!
//! The crate provides tensor-product B-spline bases glued into conforming multi-patch spaces,
//! element-wise parallel assembly through [`assembly::ElementVisitor`], the DOF bookkeeping of
//! IETI domain decomposition in [`ieti`], and an adaptive loop driven by functional a posteriori
//! error estimates in [`adaptive`]. The p-Laplace problem is solved by linearization in
//! [`plaplace`].

pub mod adaptive;
pub mod assembly;
pub mod basis;
pub mod dirichlet;
pub mod dof_mapper;
pub mod estimate;
pub mod field;
pub mod function;
pub mod geometry;
pub mod ieti;
pub mod marking;
pub mod multipatch;
pub mod plaplace;
pub mod quadrature;
pub mod solve;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use isopatch_sparse::{Real, SparseVector};
