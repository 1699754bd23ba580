use crate::dof_mapper::DofMapper;
use crate::Real;
use eyre::eyre;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// A global sparse linear system with one DOF block per unknown component.
///
/// Block `b` has its own [`DofMapper`] and occupies the rows and columns starting at the sum of
/// the free sizes of the preceding blocks. Contributions for eliminated DOFs are moved to the
/// right-hand side using the supplied eliminated values.
#[derive(Debug, Clone)]
pub struct SparseSystem<T: Real> {
    mappers: Vec<DofMapper>,
    offsets: Vec<usize>,
    matrix: CooMatrix<T>,
    rhs: DMatrix<T>,
}

impl<T: Real> SparseSystem<T> {
    pub fn new(mappers: Vec<DofMapper>, rhs_cols: usize) -> Self {
        let mut offsets = Vec::with_capacity(mappers.len() + 1);
        offsets.push(0);
        for mapper in &mappers {
            offsets.push(offsets[offsets.len() - 1] + mapper.free_size());
        }
        let n = offsets[offsets.len() - 1];
        Self {
            mappers,
            offsets,
            matrix: CooMatrix::new(n, n),
            rhs: DMatrix::zeros(n, rhs_cols),
        }
    }

    /// A system with a single block.
    pub fn single(mapper: DofMapper, rhs_cols: usize) -> Self {
        Self::new(vec![mapper], rhs_cols)
    }

    pub fn num_blocks(&self) -> usize {
        self.mappers.len()
    }

    pub fn mapper(&self, block: usize) -> &DofMapper {
        &self.mappers[block]
    }

    /// First row (and column) of `block`.
    pub fn block_offset(&self, block: usize) -> usize {
        self.offsets[block]
    }

    /// Number of rows and columns.
    pub fn size(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    pub fn rhs_cols(&self) -> usize {
        self.rhs.ncols()
    }

    /// Maps patch-local function indices to global DOF indices of `block`.
    pub fn map_col_indices(&self, actives: &[usize], patch: usize, block: usize) -> Vec<usize> {
        let mapper = &self.mappers[block];
        actives.iter().map(|&i| mapper.index(i, patch)).collect()
    }

    /// Adds a local matrix to block `(r, c)`.
    ///
    /// `row_dofs` and `col_dofs` are global DOF indices as returned by
    /// [`SparseSystem::map_col_indices`]. Rows of eliminated DOFs are skipped. Entries in
    /// eliminated columns are multiplied by the eliminated values (one row per boundary DOF of
    /// block `c`) and subtracted from the right-hand side. Missing eliminated values count as
    /// zero.
    pub fn push_to_matrix(
        &mut self,
        local: &DMatrix<T>,
        row_dofs: &[usize],
        col_dofs: &[usize],
        eliminated: Option<&DMatrix<T>>,
        r: usize,
        c: usize,
    ) -> eyre::Result<()> {
        self.check_block(r)?;
        self.check_block(c)?;
        if local.nrows() != row_dofs.len() || local.ncols() != col_dofs.len() {
            return Err(eyre!(
                "local matrix has shape {}x{}, but {} row DOFs and {} column DOFs were given",
                local.nrows(),
                local.ncols(),
                row_dofs.len(),
                col_dofs.len()
            ));
        }
        let eliminated = eliminated.filter(|values| values.nrows() > 0);
        if let Some(values) = eliminated {
            if values.nrows() != self.mappers[c].boundary_size() || values.ncols() != self.rhs.ncols() {
                return Err(eyre!(
                    "eliminated values have shape {}x{}, expected {}x{}",
                    values.nrows(),
                    values.ncols(),
                    self.mappers[c].boundary_size(),
                    self.rhs.ncols()
                ));
            }
        }

        let (row_mapper, col_mapper) = (&self.mappers[r], &self.mappers[c]);
        let (row_offset, col_offset) = (self.offsets[r], self.offsets[c]);
        for (i, &gi) in row_dofs.iter().enumerate() {
            if !row_mapper.is_free_index(gi) {
                continue;
            }
            let row = row_offset + gi;
            for (j, &gj) in col_dofs.iter().enumerate() {
                let value = local[(i, j)];
                if col_mapper.is_free_index(gj) {
                    self.matrix.push(row, col_offset + gj, value);
                } else if let Some(values) = eliminated {
                    let b = col_mapper.global_to_bindex(gj);
                    for k in 0..self.rhs.ncols() {
                        self.rhs[(row, k)] -= value * values[(b, k)];
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds a local right-hand side (one row per DOF, one column per right-hand side) to
    /// block `r`.
    pub fn push_to_rhs(&mut self, local: &DMatrix<T>, row_dofs: &[usize], r: usize) -> eyre::Result<()> {
        self.check_block(r)?;
        if local.nrows() != row_dofs.len() || local.ncols() != self.rhs.ncols() {
            return Err(eyre!(
                "local right-hand side has shape {}x{}, expected {}x{}",
                local.nrows(),
                local.ncols(),
                row_dofs.len(),
                self.rhs.ncols()
            ));
        }
        let mapper = &self.mappers[r];
        let offset = self.offsets[r];
        for (i, &gi) in row_dofs.iter().enumerate() {
            if mapper.is_free_index(gi) {
                for k in 0..local.ncols() {
                    self.rhs[(offset + gi, k)] += local[(i, k)];
                }
            }
        }
        Ok(())
    }

    /// Adds a square local matrix and its right-hand side, with the same DOFs for rows and
    /// columns.
    pub fn push(
        &mut self,
        local_matrix: &DMatrix<T>,
        local_rhs: &DMatrix<T>,
        dofs: &[usize],
        eliminated: Option<&DMatrix<T>>,
        r: usize,
        c: usize,
    ) -> eyre::Result<()> {
        self.push_to_matrix(local_matrix, dofs, dofs, eliminated, r, c)?;
        self.push_to_rhs(local_rhs, dofs, r)
    }

    /// The assembled matrix with duplicate entries summed.
    pub fn matrix(&self) -> CsrMatrix<T> {
        CsrMatrix::from(&self.matrix)
    }

    pub fn rhs(&self) -> &DMatrix<T> {
        &self.rhs
    }

    pub fn into_parts(self) -> (CsrMatrix<T>, DMatrix<T>) {
        (CsrMatrix::from(&self.matrix), self.rhs)
    }

    fn check_block(&self, block: usize) -> eyre::Result<()> {
        if block < self.mappers.len() {
            Ok(())
        } else {
            Err(eyre!("block {} out of bounds for a system with {} blocks", block, self.mappers.len()))
        }
    }
}
