use crate::Real;
use nalgebra::DVector;

/// A sparse vector with explicitly stored entries.
///
/// Entries are kept in insertion order. Pushing to an index that is already stored
/// accumulates into the existing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector<T> {
    len: usize,
    indices: Vec<usize>,
    values: Vec<T>,
}

impl<T: Real> SparseVector<T> {
    pub fn zeros(len: usize) -> Self {
        Self {
            len,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// The unit vector `e_index` of the given length.
    pub fn unit(len: usize, index: usize) -> Self {
        let mut v = Self::zeros(len);
        v.push(index, T::one());
        v
    }

    pub fn from_dense(dense: &DVector<T>) -> Self {
        let mut v = Self::zeros(dense.len());
        for (i, &x) in dense.iter().enumerate() {
            if x != T::zero() {
                v.push(i, x);
            }
        }
        v
    }

    pub fn push(&mut self, index: usize, value: T) {
        assert!(index < self.len, "index {} out of bounds for sparse vector of length {}", index, self.len);
        match self.indices.iter().position(|&i| i == index) {
            Some(pos) => self.values[pos] += value,
            None => {
                self.indices.push(index);
                self.values.push(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn get(&self, index: usize) -> T {
        self.indices
            .iter()
            .position(|&i| i == index)
            .map(|pos| self.values[pos])
            .unwrap_or_else(T::zero)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn dot(&self, dense: &DVector<T>) -> T {
        assert_eq!(dense.len(), self.len);
        self.iter().fold(T::zero(), |acc, (i, v)| acc + v * dense[i])
    }

    pub fn to_dense(&self) -> DVector<T> {
        let mut dense = DVector::zeros(self.len);
        for (i, v) in self.iter() {
            dense[i] += v;
        }
        dense
    }
}
