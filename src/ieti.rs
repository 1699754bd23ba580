//! Local numberings, jump matrices and primal constraints for IETI-type solvers.
//!
//! An [`IetiMapper`] splits a global (conforming) DOF numbering into one local numbering per
//! patch. Interface continuity is then expressed algebraically: by *jump matrices*, whose
//! rows are Lagrange multipliers tying two occurrences of a coupled DOF together, and by
//! *primal constraints*, which identify selected local DOFs (typically patch corners) with
//! shared coarse unknowns.
//!
//! The mapper has an explicit lifecycle. It starts uninitialized, becomes initialized through
//! [`IetiMapper::init`], and afterwards jump matrices and corner primals can each be
//! computed exactly once, in any order.

use crate::basis::Basis;
use crate::dof_mapper::{DofMapper, DofMapperBuilder};
use crate::multipatch::{BoxCorner, MultiBasis};
use crate::Real;
use isopatch_sparse::SparseVector;
use itertools::{Either, Itertools};
use log::debug;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IetiError {
    /// The operation requires an initialized mapper.
    NotInitialized,
    /// `init` was called on a mapper that is already initialized.
    AlreadyInitialized,
    /// A one-shot operation was called a second time.
    AlreadyComputed { operation: &'static str },
    /// The result of a one-shot operation was queried before it was computed.
    NotComputed { operation: &'static str },
    /// The number of per-patch items does not match the number of patches.
    PatchCountMismatch { expected: usize, actual: usize },
    /// The basis and the global mapper disagree on the size of a patch.
    PatchSizeMismatch { patch: usize, basis: usize, mapper: usize },
    /// The fixed part does not have one row per boundary DOF.
    FixedPartSizeMismatch { expected: usize, actual: usize },
    /// Local solutions have differing column counts.
    ColumnCountMismatch { patch: usize, expected: usize, actual: usize },
    /// A local solution does not have one row per local free DOF.
    RowCountMismatch { patch: usize, expected: usize, actual: usize },
    /// A coupled DOF occurs on a single patch only.
    UnmatchedCoupledDof {
        coupled_index: usize,
        patch: usize,
        local_index: usize,
    },
    /// The number of multipliers produced differs from the number predicted.
    MultiplierCountMismatch { predicted: usize, produced: usize },
    PatchOutOfBounds { patch: usize, num_patches: usize },
    /// A primal constraint does not have the length of the local free space.
    ConstraintLengthMismatch { patch: usize, expected: usize, actual: usize },
}

impl fmt::Display for IetiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "IETI mapper has not been initialized"),
            Self::AlreadyInitialized => write!(f, "IETI mapper is already initialized"),
            Self::AlreadyComputed { operation } => write!(f, "{} has already been called", operation),
            Self::NotComputed { operation } => write!(f, "{} has not been called yet", operation),
            Self::PatchCountMismatch { expected, actual } => {
                write!(f, "expected data for {} patches, got {}", expected, actual)
            }
            Self::PatchSizeMismatch { patch, basis, mapper } => write!(
                f,
                "patch {} has {} basis functions but the DOF mapper expects {}",
                patch, basis, mapper
            ),
            Self::FixedPartSizeMismatch { expected, actual } => {
                write!(f, "fixed part has {} rows, expected {}", actual, expected)
            }
            Self::ColumnCountMismatch { patch, expected, actual } => write!(
                f,
                "local solution of patch {} has {} columns, expected {}",
                patch, actual, expected
            ),
            Self::RowCountMismatch { patch, expected, actual } => write!(
                f,
                "local solution of patch {} has {} rows, expected {}",
                patch, actual, expected
            ),
            Self::UnmatchedCoupledDof {
                coupled_index,
                patch,
                local_index,
            } => write!(
                f,
                "coupled DOF {} (local index {} on patch {}) is not coupled to any other DOF",
                coupled_index, local_index, patch
            ),
            Self::MultiplierCountMismatch { predicted, produced } => write!(
                f,
                "internal error: predicted {} Lagrange multipliers but produced {}",
                predicted, produced
            ),
            Self::PatchOutOfBounds { patch, num_patches } => {
                write!(f, "patch index {} out of bounds for {} patches", patch, num_patches)
            }
            Self::ConstraintLengthMismatch { patch, expected, actual } => write!(
                f,
                "primal constraint for patch {} has length {}, expected {}",
                patch, actual, expected
            ),
        }
    }
}

impl std::error::Error for IetiError {}

#[derive(Debug, Clone)]
struct IetiData<T: Real> {
    global: DofMapper,
    local: Vec<DofMapper>,
    fixed_parts: Vec<DMatrix<T>>,
    /// Basis function at each corner, in [`BoxCorner::ALL`] order.
    corners: Vec<[usize; 4]>,
    /// `(patch, local index)` of every occurrence of each coupled DOF, in patch order.
    occurrences: Vec<Vec<(usize, usize)>>,
    jump_matrices: Option<Vec<CsrMatrix<T>>>,
    /// Set on the first call of `compute_jump_matrices`, even if it fails.
    jump_matrices_computed: bool,
    corners_as_primals: bool,
    num_primal_dofs: usize,
    primal_constraints: Vec<Vec<SparseVector<T>>>,
    primal_dof_indices: Vec<Vec<usize>>,
}

#[derive(Debug, Clone)]
enum IetiState<T: Real> {
    Uninitialized,
    Initialized(Box<IetiData<T>>),
}

#[derive(Debug, Clone)]
pub struct IetiMapper<T: Real> {
    state: IetiState<T>,
}

impl<T: Real> Default for IetiMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A patch corner that is free in the global numbering.
#[derive(Debug, Clone, Copy)]
struct CornerDof {
    global: usize,
    patch: usize,
    local: usize,
}

impl<T: Real> IetiMapper<T> {
    pub fn new() -> Self {
        Self {
            state: IetiState::Uninitialized,
        }
    }

    /// Creates and initializes a mapper in one step.
    pub fn from_global(multi_basis: &MultiBasis, global: DofMapper, fixed_part: &DMatrix<T>) -> Result<Self, IetiError> {
        let mut mapper = Self::new();
        mapper.init(multi_basis, global, fixed_part)?;
        Ok(mapper)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, IetiState::Initialized(_))
    }

    fn data(&self) -> Result<&IetiData<T>, IetiError> {
        match &self.state {
            IetiState::Initialized(data) => Ok(&**data),
            IetiState::Uninitialized => Err(IetiError::NotInitialized),
        }
    }

    fn data_mut(&mut self) -> Result<&mut IetiData<T>, IetiError> {
        match &mut self.state {
            IetiState::Initialized(data) => Ok(&mut **data),
            IetiState::Uninitialized => Err(IetiError::NotInitialized),
        }
    }

    /// Builds the local numbering of every patch.
    ///
    /// A local function is eliminated exactly when its global DOF is a boundary DOF. The fixed
    /// part has one row per global boundary DOF and is distributed to the patches, indexed by
    /// local boundary position.
    pub fn init(&mut self, multi_basis: &MultiBasis, global: DofMapper, fixed_part: &DMatrix<T>) -> Result<(), IetiError> {
        if self.is_initialized() {
            return Err(IetiError::AlreadyInitialized);
        }
        let num_patches = global.num_patches();
        if multi_basis.num_patches() != num_patches {
            return Err(IetiError::PatchCountMismatch {
                expected: num_patches,
                actual: multi_basis.num_patches(),
            });
        }
        if fixed_part.nrows() != global.boundary_size() {
            return Err(IetiError::FixedPartSizeMismatch {
                expected: global.boundary_size(),
                actual: fixed_part.nrows(),
            });
        }

        let mut local = Vec::with_capacity(num_patches);
        let mut fixed_parts = Vec::with_capacity(num_patches);
        let mut corners = Vec::with_capacity(num_patches);
        for k in 0..num_patches {
            let basis = multi_basis.basis(k);
            let num_dofs = global.patch_size(k);
            if basis.size() != num_dofs {
                return Err(IetiError::PatchSizeMismatch {
                    patch: k,
                    basis: basis.size(),
                    mapper: num_dofs,
                });
            }

            let mut builder = DofMapperBuilder::new(&[num_dofs]);
            for i in 0..num_dofs {
                if global.is_boundary(i, k) {
                    builder.eliminate_dof(i, 0);
                }
            }
            let local_mapper = builder.finalize();

            let mut patch_fixed = DMatrix::zeros(local_mapper.boundary_size(), fixed_part.ncols());
            for i in 0..num_dofs {
                if global.is_boundary(i, k) {
                    patch_fixed
                        .row_mut(local_mapper.bindex(i, 0))
                        .copy_from(&fixed_part.row(global.bindex(i, k)));
                }
            }

            local.push(local_mapper);
            fixed_parts.push(patch_fixed);
            corners.push(BoxCorner::ALL.map(|corner| basis.function_at_corner(corner)));
        }

        let mut occurrences = vec![Vec::new(); global.coupled_size()];
        for k in 0..num_patches {
            for i in 0..global.patch_size(k) {
                if global.is_coupled(i, k) {
                    occurrences[global.cindex(i, k)].push((k, i));
                }
            }
        }

        self.state = IetiState::Initialized(Box::new(IetiData {
            global,
            local,
            fixed_parts,
            corners,
            occurrences,
            jump_matrices: None,
            jump_matrices_computed: false,
            corners_as_primals: false,
            num_primal_dofs: 0,
            primal_constraints: vec![Vec::new(); num_patches],
            primal_dof_indices: vec![Vec::new(); num_patches],
        }));
        Ok(())
    }

    /// Assembles a global solution (`free_size x columns`) from one local solution per patch.
    ///
    /// Every row belonging to a function that is free both locally and globally is copied to
    /// the row of its global DOF. Shared DOFs receive the value of the last patch in which
    /// they occur.
    pub fn construct_global_solution_from_local_solutions(&self, local: &[DMatrix<T>]) -> Result<DMatrix<T>, IetiError> {
        let data = self.data()?;
        let num_patches = data.global.num_patches();
        if local.len() != num_patches {
            return Err(IetiError::PatchCountMismatch {
                expected: num_patches,
                actual: local.len(),
            });
        }
        let columns = local.first().map(|m| m.ncols()).unwrap_or(0);
        for (k, solution) in local.iter().enumerate() {
            if solution.ncols() != columns {
                return Err(IetiError::ColumnCountMismatch {
                    patch: k,
                    expected: columns,
                    actual: solution.ncols(),
                });
            }
            if solution.nrows() != data.local[k].free_size() {
                return Err(IetiError::RowCountMismatch {
                    patch: k,
                    expected: data.local[k].free_size(),
                    actual: solution.nrows(),
                });
            }
        }

        let mut result = DMatrix::zeros(data.global.free_size(), columns);
        for (k, solution) in local.iter().enumerate() {
            let local_mapper = &data.local[k];
            for i in 0..local_mapper.patch_size(0) {
                if local_mapper.is_free(i, 0) && data.global.is_free(i, k) {
                    result
                        .row_mut(data.global.index(i, k))
                        .copy_from(&solution.row(local_mapper.index(i, 0)));
                }
            }
        }
        Ok(result)
    }

    /// Turns every globally free patch corner into a primal DOF.
    ///
    /// Corners with the same global DOF share one primal DOF. Each occurrence contributes a
    /// unit constraint on its patch.
    pub fn corners_as_primals(&mut self) -> Result<(), IetiError> {
        let data = self.data_mut()?;
        if data.corners_as_primals {
            return Err(IetiError::AlreadyComputed {
                operation: "corners_as_primals",
            });
        }
        data.corners_as_primals = true;

        let mut corners = Vec::with_capacity(4 * data.local.len());
        for (k, patch_corners) in data.corners.iter().enumerate() {
            for &i in patch_corners {
                let global = data.global.index(i, k);
                if data.global.is_free_index(global) {
                    corners.push(CornerDof {
                        global,
                        patch: k,
                        local: data.local[k].index(i, 0),
                    });
                }
            }
        }
        // Stable, so occurrences of one corner stay in patch order
        corners.sort_by_key(|corner| corner.global);

        let mut last = None;
        for corner in &corners {
            if last != Some(corner.global) {
                last = Some(corner.global);
                data.num_primal_dofs += 1;
            }
            let primal = data.num_primal_dofs - 1;
            let constraint = SparseVector::unit(data.local[corner.patch].free_size(), corner.local);
            data.primal_constraints[corner.patch].push(constraint);
            data.primal_dof_indices[corner.patch].push(primal);
        }
        debug!(
            "Corners as primals: {} corner occurrences, {} primal DOFs",
            corners.len(),
            data.num_primal_dofs
        );
        Ok(())
    }

    /// Adds a batch of constraints that together define one new primal DOF.
    pub fn custom_primal_constraints(&mut self, constraints: Vec<(usize, SparseVector<T>)>) -> Result<(), IetiError> {
        let data = self.data_mut()?;
        let num_patches = data.local.len();
        for (patch, constraint) in &constraints {
            if *patch >= num_patches {
                return Err(IetiError::PatchOutOfBounds {
                    patch: *patch,
                    num_patches,
                });
            }
            let expected = data.local[*patch].free_size();
            if constraint.len() != expected {
                return Err(IetiError::ConstraintLengthMismatch {
                    patch: *patch,
                    expected,
                    actual: constraint.len(),
                });
            }
        }

        let primal = data.num_primal_dofs;
        for (patch, constraint) in constraints {
            data.primal_constraints[patch].push(constraint);
            data.primal_dof_indices[patch].push(primal);
        }
        data.num_primal_dofs += 1;
        Ok(())
    }

    /// Local free indices of the globally coupled DOFs of `patch`, in local index order.
    pub fn skeleton_dofs(&self, patch: usize) -> Result<Vec<usize>, IetiError> {
        let data = self.data()?;
        check_patch(patch, data.local.len())?;
        Ok((0..data.global.patch_size(patch))
            .filter(|&i| data.global.is_coupled(i, patch))
            .map(|i| data.local[patch].index(i, 0))
            .collect())
    }

    /// Builds one jump matrix per patch.
    ///
    /// With `fully_redundant`, every pair of occurrences of a coupled DOF gets a multiplier;
    /// otherwise the first occurrence is tied to each of the others. With `exclude_corners`,
    /// coupled DOFs at patch corners get no multipliers.
    pub fn compute_jump_matrices(&mut self, fully_redundant: bool, exclude_corners: bool) -> Result<(), IetiError> {
        let data = self.data_mut()?;
        if data.jump_matrices_computed {
            return Err(IetiError::AlreadyComputed {
                operation: "compute_jump_matrices",
            });
        }
        data.jump_matrices_computed = true;

        let global = &data.global;
        let num_patches = global.num_patches();
        let mut coupling = data.occurrences.clone();

        if exclude_corners {
            for (k, patch_corners) in data.corners.iter().enumerate() {
                for &i in patch_corners {
                    if global.is_coupled(i, k) {
                        coupling[global.cindex(i, k)].clear();
                    }
                }
            }
        }

        let mut predicted = 0;
        for (coupled_index, group) in coupling.iter().enumerate() {
            let n = group.len();
            if n == 1 && !exclude_corners {
                let (patch, local_index) = group[0];
                return Err(IetiError::UnmatchedCoupledDof {
                    coupled_index,
                    patch,
                    local_index,
                });
            }
            if n == 0 {
                continue;
            }
            predicted += if fully_redundant { n * (n - 1) / 2 } else { n - 1 };
        }

        // (multiplier, local free index, sign) per patch
        let mut entries: Vec<Vec<(usize, usize, T)>> = vec![Vec::new(); num_patches];
        let mut multiplier = 0;
        for group in coupling.iter().filter(|group| group.len() > 1) {
            let pairs = if fully_redundant {
                Either::Left(group.iter().tuple_combinations())
            } else {
                Either::Right(group[1..].iter().map(|other| (&group[0], other)))
            };
            for (&(patch1, i1), &(patch2, i2)) in pairs {
                entries[patch1].push((multiplier, data.local[patch1].index(i1, 0), T::one()));
                entries[patch2].push((multiplier, data.local[patch2].index(i2, 0), -T::one()));
                multiplier += 1;
            }
        }
        if multiplier != predicted {
            return Err(IetiError::MultiplierCountMismatch {
                predicted,
                produced: multiplier,
            });
        }

        let coo: Vec<CooMatrix<T>> = data
            .local
            .iter()
            .zip(entries)
            .map(|(local, entries)| {
                let mut coo = CooMatrix::new(predicted, local.free_size());
                for (row, col, value) in entries {
                    coo.push(row, col, value);
                }
                coo
            })
            .collect();

        debug!("Computed jump matrices with {} Lagrange multipliers", multiplier);
        data.jump_matrices = Some(coo.iter().map(CsrMatrix::from).collect());
        Ok(())
    }

    pub fn num_patches(&self) -> Result<usize, IetiError> {
        Ok(self.data()?.local.len())
    }

    pub fn jump_matrices(&self) -> Result<&[CsrMatrix<T>], IetiError> {
        self.data()?
            .jump_matrices
            .as_deref()
            .ok_or(IetiError::NotComputed {
                operation: "compute_jump_matrices",
            })
    }

    pub fn jump_matrix(&self, patch: usize) -> Result<&CsrMatrix<T>, IetiError> {
        let matrices = self.jump_matrices()?;
        check_patch(patch, matrices.len())?;
        Ok(&matrices[patch])
    }

    pub fn num_lagrange_multipliers(&self) -> Result<usize, IetiError> {
        Ok(self.jump_matrices()?.first().map(|b| b.nrows()).unwrap_or(0))
    }

    pub fn num_primal_dofs(&self) -> Result<usize, IetiError> {
        Ok(self.data()?.num_primal_dofs)
    }

    pub fn primal_constraints(&self, patch: usize) -> Result<&[SparseVector<T>], IetiError> {
        let data = self.data()?;
        check_patch(patch, data.local.len())?;
        Ok(&data.primal_constraints[patch])
    }

    pub fn primal_dof_indices(&self, patch: usize) -> Result<&[usize], IetiError> {
        let data = self.data()?;
        check_patch(patch, data.local.len())?;
        Ok(&data.primal_dof_indices[patch])
    }

    pub fn dof_mapper_local(&self, patch: usize) -> Result<&DofMapper, IetiError> {
        let data = self.data()?;
        check_patch(patch, data.local.len())?;
        Ok(&data.local[patch])
    }

    pub fn dof_mapper_global(&self) -> Result<&DofMapper, IetiError> {
        Ok(&self.data()?.global)
    }

    /// Dirichlet values of `patch`, indexed by local boundary position.
    pub fn fixed_part(&self, patch: usize) -> Result<&DMatrix<T>, IetiError> {
        let data = self.data()?;
        check_patch(patch, data.local.len())?;
        Ok(&data.fixed_parts[patch])
    }
}

fn check_patch(patch: usize, num_patches: usize) -> Result<(), IetiError> {
    if patch < num_patches {
        Ok(())
    } else {
        Err(IetiError::PatchOutOfBounds { patch, num_patches })
    }
}
