use serde::{Deserialize, Serialize};
use crate::index_space::{Index, IndexSpace};




/**
 * A patch is a mapping from a rectangular index space to associated field
 * values. The mapping is backed by a row-major array of data, with the field
 * components of each index stored contiguously. The same type holds
 * cell-centered data and face-centered data; in the latter case the index
 * space enumerates the faces normal to one axis (see `IndexSpace::faces`).
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    space: IndexSpace,
    num_fields: usize,
    data: Vec<f64>,
}




// ============================================================================
impl Patch {




    /**
     * Generate a patch of zeros over the given index space.
     */
    pub fn zeros(num_fields: usize, space: IndexSpace) -> Self {
        Self {
            data: vec![0.0; space.len() * num_fields],
            space,
            num_fields,
        }
    }




    /**
     * Generate a single-field patch covering the given index space, with
     * values defined from a closure.
     */
    pub fn from_function<F>(space: IndexSpace, f: F) -> Self
    where
        F: Fn(Index) -> f64
    {
        Self {
            data: space.iter().map(f).collect(),
            space,
            num_fields: 1,
        }
    }




    /**
     * Generate a multi-field patch covering the given index space. The closure
     * writes the field values for each index into a slice.
     */
    pub fn from_slice_function<F>(num_fields: usize, space: IndexSpace, f: F) -> Self
    where
        F: Fn(Index, &mut [f64])
    {
        let mut patch = Self::zeros(num_fields, space);
        let space = patch.space.clone();

        for (index, slice) in space.iter().zip(patch.data.chunks_exact_mut(num_fields)) {
            f(index, slice)
        }
        patch
    }




    pub fn index_space(&self) -> &IndexSpace {
        &self.space
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }




    /**
     * Return the value of one field at the given index.
     */
    pub fn get(&self, index: Index, field: usize) -> f64 {
        self.data[self.offset(index, field)]
    }

    pub fn set(&mut self, index: Index, field: usize, value: f64) {
        let n = self.offset(index, field);
        self.data[n] = value
    }

    pub fn get_mut(&mut self, index: Index, field: usize) -> &mut f64 {
        let n = self.offset(index, field);
        &mut self.data[n]
    }




    /**
     * Return all field values at the given index.
     */
    pub fn get_slice(&self, index: Index) -> &[f64] {
        let n = self.offset(index, 0);
        &self.data[n..n + self.num_fields]
    }

    pub fn get_slice_mut(&mut self, index: Index) -> &mut [f64] {
        let n = self.offset(index, 0);
        &mut self.data[n..n + self.num_fields]
    }




    /**
     * Set every value of the given field to a constant.
     */
    pub fn fill_field(&mut self, field: usize, value: f64) {
        for slice in self.data.chunks_exact_mut(self.num_fields) {
            slice[field] = value
        }
    }




    /**
     * Copy the given fields of another patch into this one, over the overlap
     * of the two index spaces.
     */
    pub fn copy_fields_from(&mut self, other: &Patch, fields: std::ops::Range<usize>) {
        if let Some(overlap) = self.space.intersect(&other.space) {
            for index in overlap.iter() {
                for q in fields.clone() {
                    self.set(index, q, other.get(index, q))
                }
            }
        }
    }




    fn offset(&self, index: Index, field: usize) -> usize {
        self.validate_index(index);
        self.space.row_major_offset(index) * self.num_fields + field
    }

    fn validate_index(&self, index: Index) {
        if !self.space.contains(index) {
            panic!("index ({} {} {}) out of range on patch ({}..{} {}..{} {}..{})",
                index.0,
                index.1,
                index.2,
                self.space.start().0,
                self.space.end().0,
                self.space.start().1,
                self.space.end().1,
                self.space.start().2,
                self.space.end().2);
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Patch;
    use crate::index_space::IndexSpace;

    #[test]
    fn patch_fields_are_stored_per_index() {
        let space = IndexSpace::new_2d(4..10, 4..10);
        let patch = Patch::from_slice_function(2, space, |(i, j, _), p| {
            p[0] = i as f64;
            p[1] = j as f64;
        });
        assert_eq!(patch.get((5, 7, 0), 0), 5.0);
        assert_eq!(patch.get((5, 7, 0), 1), 7.0);
        assert_eq!(patch.get_slice((9, 4, 0)), &[9.0, 4.0]);
    }

    #[test]
    fn copy_fields_touches_only_the_overlap() {
        let mut a = Patch::zeros(2, IndexSpace::new_1d(0..4));
        let b = Patch::from_slice_function(2, IndexSpace::new_1d(2..8), |_, p| {
            p[0] = 1.0;
            p[1] = 2.0;
        });
        a.copy_fields_from(&b, 1..2);
        assert_eq!(a.get((1, 0, 0), 1), 0.0);
        assert_eq!(a.get((2, 0, 0), 1), 2.0);
        assert_eq!(a.get((3, 0, 0), 0), 0.0);
    }

    #[test]
    #[should_panic]
    fn out_of_range_access_panics() {
        let patch = Patch::zeros(1, IndexSpace::new_1d(0..4));
        patch.get((4, 0, 0), 0);
    }
}
