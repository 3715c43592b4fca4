use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::hierarchy::{Hierarchy, Level};
use crate::index_space::{Axis, Index, IndexSpace};
use crate::patch::Patch;




/**
 * A multi-component, cell-centered field over the boxes of one level. Each
 * patch covers its box extended by `num_ghost` cells on every active axis.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelField {
    num_fields: usize,
    num_ghost: i64,
    valid: Vec<IndexSpace>,
    patches: Vec<Patch>,
}




// ============================================================================
impl LevelField {

    pub fn zeros(level: &Level, num_fields: usize, num_ghost: i64) -> Self {
        let valid = level.boxes().to_vec();
        let patches = valid
            .iter()
            .map(|b| Patch::zeros(num_fields, b.extend_all(num_ghost)))
            .collect();
        Self { num_fields, num_ghost, valid, patches }
    }

    /**
     * Generate a field whose values (ghost cells included) are a function of
     * the cell center.
     */
    pub fn from_function<F>(level: &Level, num_fields: usize, num_ghost: i64, f: F) -> Self
    where
        F: Fn([f64; 3], &mut [f64])
    {
        let geometry = level.geometry();
        let valid = level.boxes().to_vec();
        let patches = valid
            .iter()
            .map(|b| Patch::from_slice_function(num_fields, b.extend_all(num_ghost), |index, p| {
                f(geometry.cell_center(index), p)
            }))
            .collect();
        Self { num_fields, num_ghost, valid, patches }
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    pub fn num_ghost(&self) -> i64 {
        self.num_ghost
    }

    pub fn valid(&self) -> &[IndexSpace] {
        &self.valid
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patches_mut(&mut self) -> &mut [Patch] {
        &mut self.patches
    }

    /**
     * Iterate over the valid box and backing patch of each box.
     */
    pub fn iter(&self) -> impl Iterator<Item = (&IndexSpace, &Patch)> {
        self.valid.iter().zip(&self.patches)
    }

    /**
     * Look up a value in the valid region of the level.
     */
    pub fn value_at(&self, index: Index, field: usize) -> Option<f64> {
        self.iter()
            .find(|(v, _)| v.contains(index))
            .map(|(_, p)| p.get(index, field))
    }

    /**
     * Set one component to a constant everywhere, ghost cells included.
     */
    pub fn fill_field(&mut self, field: usize, value: f64) {
        for patch in &mut self.patches {
            patch.fill_field(field, value)
        }
    }

    /**
     * Sum one component over the valid cells of the level, optionally
     * skipping cells for which `exclude` is true.
     */
    pub fn sum_valid<F>(&self, field: usize, exclude: F) -> f64
    where
        F: Fn(Index) -> bool
    {
        let exclude = &exclude;
        self.iter()
            .flat_map(move |(v, p)| v.iter().filter(move |&i| !exclude(i)).map(move |i| p.get(i, field)))
            .sum()
    }

    /**
     * Largest magnitude of the given components over the valid cells.
     */
    pub fn max_abs(&self, fields: std::ops::Range<usize>) -> f64 {
        self.iter()
            .flat_map(|(v, p)| v.iter().flat_map({
                let fields = fields.clone();
                move |i| fields.clone().map(move |q| p.get(i, q).abs())
            }))
            .fold(0.0, f64::max)
    }
}




/**
 * A face-centered field over the boxes of one level: for each active axis,
 * one patch per box holding the faces normal to that axis. The patches cover
 * the faces of the box extended by `num_ghost` cells.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeField {
    num_fields: usize,
    num_ghost: i64,
    valid: Vec<IndexSpace>,
    faces: Vec<Vec<Patch>>,
}




// ============================================================================
impl EdgeField {

    pub fn zeros(level: &Level, num_fields: usize, num_ghost: i64) -> Self {
        let valid = level.boxes().to_vec();
        let faces = Axis::active(level.geometry().rank())
            .map(|axis| {
                valid
                    .iter()
                    .map(|b| Patch::zeros(num_fields, b.extend_all(num_ghost).faces(axis)))
                    .collect()
            })
            .collect();
        Self { num_fields, num_ghost, valid, faces }
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    pub fn num_ghost(&self) -> i64 {
        self.num_ghost
    }

    pub fn rank(&self) -> usize {
        self.faces.len()
    }

    pub fn valid(&self) -> &[IndexSpace] {
        &self.valid
    }

    /// The face patches normal to `axis`, one per box.
    pub fn faces(&self, axis: Axis) -> &[Patch] {
        &self.faces[axis.number()]
    }

    pub fn faces_mut(&mut self, axis: Axis) -> &mut [Patch] {
        &mut self.faces[axis.number()]
    }

    /**
     * Look up a value on a valid face of the level.
     */
    pub fn value_at(&self, axis: Axis, face: Index, field: usize) -> Option<f64> {
        self.valid
            .iter()
            .zip(self.faces(axis))
            .find(|(v, _)| v.faces(axis).contains(face))
            .map(|(_, p)| p.get(face, field))
    }

    pub fn fill(&mut self, value: f64) {
        for patch in self.faces.iter_mut().flatten() {
            for q in 0..self.num_fields {
                patch.fill_field(q, value)
            }
        }
    }
}




/**
 * Check that a multi-level field has one entry per level of the hierarchy.
 */
pub fn check_levels<T>(field: &[T], hierarchy: &Hierarchy) -> Result<()> {
    if field.len() == hierarchy.num_levels() {
        Ok(())
    } else {
        Err(Error::MismatchedLevels { expected: hierarchy.num_levels(), found: field.len() })
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::geometry::Geometry;

    fn hierarchy() -> Hierarchy {
        let domain = IndexSpace::new_2d(0..8, 0..4);
        let geometry = Geometry::new(domain, [0.0; 3], [2.0, 1.0, 0.0], [true; 3]);
        Hierarchy::new(geometry, vec![IndexSpace::new_2d(0..4, 0..4), IndexSpace::new_2d(4..8, 0..4)])
    }

    #[test]
    fn level_field_patches_include_ghost_cells() {
        let h = hierarchy();
        let field = LevelField::from_function(h.level(0), 1, 2, |x, p| p[0] = x[0]);
        assert_eq!(field.patches()[0].index_space(), &IndexSpace::new_2d(-2..6, -2..6));
        assert_eq!(field.value_at((5, 1, 0), 0), Some(1.375));
        assert_eq!(field.value_at((8, 1, 0), 0), None);
        assert_eq!(field.sum_valid(0, |(i, _, _)| i > 0), 4.0 * 0.125);
    }

    #[test]
    fn edge_field_has_one_face_set_per_axis() {
        let h = hierarchy();
        let mut edges = EdgeField::zeros(h.level(0), 2, 1);
        assert_eq!(edges.rank(), 2);
        assert_eq!(edges.faces(Axis::I)[1].index_space(), &IndexSpace::new_2d(3..10, -1..5));
        edges.fill(3.0);
        assert_eq!(edges.value_at(Axis::J, (7, 4, 0), 1), Some(3.0));
    }

    #[test]
    fn level_count_must_match_the_hierarchy() {
        let h = hierarchy();
        assert!(check_levels(&[0u8], &h).is_ok());
        assert_eq!(check_levels::<u8>(&[], &h), Err(Error::MismatchedLevels { expected: 1, found: 0 }));
    }
}
