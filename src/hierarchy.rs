use serde::{Deserialize, Serialize};
use crate::geometry::Geometry;
use crate::index_space::{Axis, Index, IndexSpace};




/// Refinement ratio between consecutive levels.
pub const REFINEMENT_RATIO: i64 = 2;




/**
 * One refinement level: its geometry and the disjoint boxes of cells it is
 * decomposed into.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level {
    geometry: Geometry,
    boxes: Vec<IndexSpace>,
}

impl Level {

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn boxes(&self) -> &[IndexSpace] {
        &self.boxes
    }
}




/**
 * A properly nested stack of levels. Level 0 covers the whole domain; every
 * finer level is refined by `REFINEMENT_RATIO` and covers a subset of its
 * parent.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    levels: Vec<Level>,
}




// ============================================================================
impl Hierarchy {

    /**
     * Create a single-level hierarchy. The boxes must tile the domain.
     */
    pub fn new(geometry: Geometry, boxes: Vec<IndexSpace>) -> Self {
        debug_assert_eq!(
            boxes.iter().map(IndexSpace::len).sum::<usize>(),
            geometry.domain().len(),
            "base level boxes must tile the domain");

        Self { levels: vec![Level { geometry, boxes }] }
    }

    /**
     * Add a level refined from the current finest one. The boxes are given
     * in the index space of the new level.
     */
    pub fn refine(mut self, boxes: Vec<IndexSpace>) -> Self {
        let geometry = self.levels[self.finest_level()].geometry.refine();

        for b in &boxes {
            debug_assert!(geometry.domain().contains_space(b), "fine box outside the domain");
            debug_assert!(
                Axis::active(b.rank()).all(|a| {
                    let r = b.range(a);
                    r.start.rem_euclid(REFINEMENT_RATIO) == 0 && r.end.rem_euclid(REFINEMENT_RATIO) == 0
                }),
                "fine boxes must align with coarse cells");
        }
        self.levels.push(Level { geometry, boxes });
        self
    }

    pub fn rank(&self) -> usize {
        self.levels[0].geometry.rank()
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn finest_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, level: usize) -> &Level {
        &self.levels[level]
    }

    /**
     * Determine whether a cell of the given level is covered by the next
     * finer level.
     */
    pub fn is_covered(&self, level: usize, index: Index) -> bool {
        self.levels.get(level + 1).map_or(false, |fine| {
            fine.boxes
                .iter()
                .any(|b| b.coarsen_by(REFINEMENT_RATIO).contains(index))
        })
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Hierarchy;
    use crate::geometry::Geometry;
    use crate::index_space::IndexSpace;

    #[test]
    fn refined_levels_halve_the_cell_size() {
        let domain = IndexSpace::new_2d(0..8, 0..8);
        let geometry = Geometry::new(domain.clone(), [0.0; 3], [1.0, 1.0, 0.0], [true; 3]);
        let hierarchy = Hierarchy::new(geometry, vec![domain])
            .refine(vec![IndexSpace::new_2d(4..12, 4..12)]);

        assert_eq!(hierarchy.finest_level(), 1);
        assert_eq!(hierarchy.level(1).geometry().cell_volume(), 1.0 / 256.0);
        assert!(hierarchy.is_covered(0, (2, 2, 0)));
        assert!(hierarchy.is_covered(0, (5, 5, 0)));
        assert!(!hierarchy.is_covered(0, (6, 5, 0)));
        assert!(!hierarchy.is_covered(1, (5, 5, 0)));
    }
}
