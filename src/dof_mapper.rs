//! Mapping of patch-local basis function indices to global degrees of freedom.
//!
//! A [`DofMapper`] is built in two phases. A [`DofMapperBuilder`] records which local
//! functions are glued across patch interfaces ([`DofMapperBuilder::match_dof`]) and which are
//! eliminated by Dirichlet conditions ([`DofMapperBuilder::eliminate_dof`]). Calling
//! [`DofMapperBuilder::finalize`] then produces the immutable numbering:
//!
//! - free DOFs that belong to a single patch occurrence come first,
//! - free DOFs shared by two or more occurrences (*coupled* DOFs) follow at the end of the
//!   free range,
//! - eliminated (*boundary*) DOFs are numbered after all free DOFs.
//!
//! If any member of a group of matched functions is eliminated, the whole group is eliminated.

use std::fmt;

/// Records interface gluing and elimination before the numbering is fixed.
#[derive(Debug, Clone)]
pub struct DofMapperBuilder {
    offsets: Vec<usize>,
    parent: Vec<usize>,
    eliminated: Vec<bool>,
}

impl DofMapperBuilder {
    /// Creates a builder for patches with the given numbers of local basis functions.
    pub fn new(patch_sizes: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(patch_sizes.len() + 1);
        offsets.push(0);
        for size in patch_sizes {
            offsets.push(offsets.last().copied().unwrap_or(0) + size);
        }
        let total = offsets.last().copied().unwrap_or(0);
        Self {
            offsets,
            parent: (0..total).collect(),
            eliminated: vec![false; total],
        }
    }

    pub fn num_patches(&self) -> usize {
        self.offsets.len() - 1
    }

    fn flat_index(&self, local_index: usize, patch: usize) -> usize {
        assert!(patch < self.num_patches(), "patch index {} out of bounds", patch);
        let flat = self.offsets[patch] + local_index;
        assert!(
            flat < self.offsets[patch + 1],
            "local index {} out of bounds for patch {}",
            local_index,
            patch
        );
        flat
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Glues local function `i` of `patch1` to local function `j` of `patch2`.
    pub fn match_dof(&mut self, patch1: usize, i: usize, patch2: usize, j: usize) {
        let a = self.flat_index(i, patch1);
        let b = self.flat_index(j, patch2);
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            // Keep the smallest flat index as representative so numbering is deterministic
            let (low, high) = if root_a < root_b { (root_a, root_b) } else { (root_b, root_a) };
            self.parent[high] = low;
        }
    }

    /// Marks local function `i` of `patch` as eliminated.
    pub fn eliminate_dof(&mut self, i: usize, patch: usize) {
        let flat = self.flat_index(i, patch);
        self.eliminated[flat] = true;
    }

    pub fn finalize(mut self) -> DofMapper {
        let total = self.parent.len();
        let roots: Vec<usize> = (0..total).map(|i| self.find(i)).collect();

        let mut class_size = vec![0usize; total];
        let mut class_eliminated = vec![false; total];
        for (flat, &root) in roots.iter().enumerate() {
            class_size[root] += 1;
            class_eliminated[root] |= self.eliminated[flat];
        }

        // Roots are visited in order of first occurrence, since every root is the
        // smallest member of its class
        let mut class_index = vec![usize::MAX; total];
        let mut next = 0;
        for root in 0..total {
            if roots[root] == root && !class_eliminated[root] && class_size[root] == 1 {
                class_index[root] = next;
                next += 1;
            }
        }
        let coupled_start = next;
        for root in 0..total {
            if roots[root] == root && !class_eliminated[root] && class_size[root] > 1 {
                class_index[root] = next;
                next += 1;
            }
        }
        let free_size = next;
        for root in 0..total {
            if roots[root] == root && class_eliminated[root] {
                class_index[root] = next;
                next += 1;
            }
        }

        let dofs = roots.iter().map(|&root| class_index[root]).collect();
        DofMapper {
            offsets: self.offsets,
            dofs,
            free_size,
            coupled_size: free_size - coupled_start,
            boundary_size: next - free_size,
        }
    }
}

/// An immutable numbering of global degrees of freedom.
#[derive(Clone, PartialEq, Eq)]
pub struct DofMapper {
    offsets: Vec<usize>,
    dofs: Vec<usize>,
    free_size: usize,
    coupled_size: usize,
    boundary_size: usize,
}

impl fmt::Debug for DofMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DofMapper")
            .field("num_patches", &self.num_patches())
            .field("free_size", &self.free_size)
            .field("coupled_size", &self.coupled_size)
            .field("boundary_size", &self.boundary_size)
            .finish()
    }
}

impl DofMapper {
    /// A single-patch mapper where every local function is its own free DOF.
    pub fn identity(n: usize) -> Self {
        DofMapperBuilder::new(&[n]).finalize()
    }

    /// Global index of local function `i` on `patch`.
    pub fn index(&self, i: usize, patch: usize) -> usize {
        assert!(patch < self.num_patches(), "patch index {} out of bounds", patch);
        assert!(i < self.patch_size(patch), "local index {} out of bounds for patch {}", i, patch);
        self.dofs[self.offsets[patch] + i]
    }

    pub fn is_free(&self, i: usize, patch: usize) -> bool {
        self.is_free_index(self.index(i, patch))
    }

    pub fn is_boundary(&self, i: usize, patch: usize) -> bool {
        self.is_boundary_index(self.index(i, patch))
    }

    pub fn is_coupled(&self, i: usize, patch: usize) -> bool {
        self.is_coupled_index(self.index(i, patch))
    }

    pub fn is_free_index(&self, global: usize) -> bool {
        global < self.free_size
    }

    pub fn is_boundary_index(&self, global: usize) -> bool {
        global >= self.free_size && global < self.size()
    }

    pub fn is_coupled_index(&self, global: usize) -> bool {
        global < self.free_size && global >= self.free_size - self.coupled_size
    }

    /// Position of local function `i` on `patch` among the boundary DOFs.
    ///
    /// # Panics
    ///
    /// Panics if the function is not eliminated.
    pub fn bindex(&self, i: usize, patch: usize) -> usize {
        self.global_to_bindex(self.index(i, patch))
    }

    /// Position of local function `i` on `patch` among the coupled DOFs.
    ///
    /// # Panics
    ///
    /// Panics if the function is not coupled.
    pub fn cindex(&self, i: usize, patch: usize) -> usize {
        let global = self.index(i, patch);
        assert!(self.is_coupled_index(global), "DOF {} is not coupled", global);
        global - (self.free_size - self.coupled_size)
    }

    pub fn global_to_bindex(&self, global: usize) -> usize {
        assert!(self.is_boundary_index(global), "DOF {} is not a boundary DOF", global);
        global - self.free_size
    }

    pub fn patch_size(&self, patch: usize) -> usize {
        self.offsets[patch + 1] - self.offsets[patch]
    }

    pub fn num_patches(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of free DOFs, coupled ones included.
    pub fn free_size(&self) -> usize {
        self.free_size
    }

    pub fn coupled_size(&self) -> usize {
        self.coupled_size
    }

    pub fn boundary_size(&self) -> usize {
        self.boundary_size
    }

    /// Total number of distinct DOFs, free and eliminated.
    pub fn size(&self) -> usize {
        self.free_size + self.boundary_size
    }

    /// Sum of the local sizes of all patches.
    pub fn total_local_size(&self) -> usize {
        self.dofs.len()
    }

    /// Global indices of all local functions of `patch`.
    pub fn patch_indices(&self, patch: usize) -> &[usize] {
        &self.dofs[self.offsets[patch]..self.offsets[patch + 1]]
    }

    /// The first `(patch, local index)` occurrence of every free DOF.
    pub fn free_representatives(&self) -> Vec<(usize, usize)> {
        let mut representatives = vec![(usize::MAX, usize::MAX); self.free_size];
        for patch in 0..self.num_patches() {
            for (i, &global) in self.patch_indices(patch).iter().enumerate() {
                if self.is_free_index(global) && representatives[global].0 == usize::MAX {
                    representatives[global] = (patch, i);
                }
            }
        }
        representatives
    }
}
