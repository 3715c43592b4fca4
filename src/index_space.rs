use core::ops::Range;
use serde::{Deserialize, Serialize};




/// A cell (or face) index. Axes beyond the rank of the index space in use are
/// pinned to zero.
pub type Index = (i64, i64, i64);




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]


/**
 * Identifier for a Cartesian axis
 */
pub enum Axis {
    I,
    J,
    K,
}




// ============================================================================
impl Axis {

    pub const ALL: [Axis; 3] = [Axis::I, Axis::J, Axis::K];


    /**
     * Iterate over the axes which are active in an index space of the given
     * rank.
     */
    pub fn active(rank: usize) -> impl Iterator<Item = Axis> + Clone {
        Self::ALL.iter().copied().take(rank)
    }


    /**
     * Iterate over the active axes other than this one.
     */
    pub fn others(self, rank: usize) -> impl Iterator<Item = Axis> + Clone {
        Self::active(rank).filter(move |&a| a != self)
    }


    pub fn number(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
            Axis::K => 2,
        }
    }


    pub fn from_number(n: usize) -> Self {
        match n {
            0 => Axis::I,
            1 => Axis::J,
            2 => Axis::K,
            _ => panic!("no axis with number {}", n),
        }
    }


    /**
     * Return the third axis, which is neither this one nor `other`. Only
     * meaningful for distinct axes.
     */
    pub fn third(self, other: Axis) -> Axis {
        debug_assert!(self != other);
        Self::from_number(3 - self.number() - other.number())
    }


    pub fn component(self, index: Index) -> i64 {
        match self {
            Axis::I => index.0,
            Axis::J => index.1,
            Axis::K => index.2,
        }
    }


    /**
     * Return the index displaced by `delta` along this axis.
     */
    pub fn shift(self, index: Index, delta: i64) -> Index {
        match self {
            Axis::I => (index.0 + delta, index.1, index.2),
            Axis::J => (index.0, index.1 + delta, index.2),
            Axis::K => (index.0, index.1, index.2 + delta),
        }
    }


    /**
     * Return the index with its component along this axis replaced.
     */
    pub fn with(self, index: Index, value: i64) -> Index {
        match self {
            Axis::I => (value, index.1, index.2),
            Axis::J => (index.0, value, index.2),
            Axis::K => (index.0, index.1, value),
        }
    }
}




/**
 * Return the index of the coarse cell containing the given one, for a
 * refinement ratio `factor`.
 */
pub fn coarsen_index(index: Index, factor: i64) -> Index {
    (index.0.div_euclid(factor), index.1.div_euclid(factor), index.2.div_euclid(factor))
}




#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]


/**
 * Represents a rectangular region in a discrete index space of rank 1, 2, or
 * 3. Inactive axes span the single index 0.
 */
pub struct IndexSpace {
    rank: usize,
    di: Range<i64>,
    dj: Range<i64>,
    dk: Range<i64>,
}




/**
 * Describes a rectangular index space. The index type is signed 64-bit integer.
 */
impl IndexSpace {


    pub fn new(di: Range<i64>, dj: Range<i64>, dk: Range<i64>) -> Self {
        Self::with_rank(3, di, dj, dk)
    }


    pub fn new_1d(di: Range<i64>) -> Self {
        Self::with_rank(1, di, 0..1, 0..1)
    }


    pub fn new_2d(di: Range<i64>, dj: Range<i64>) -> Self {
        Self::with_rank(2, di, dj, 0..1)
    }


    fn with_rank(rank: usize, di: Range<i64>, dj: Range<i64>, dk: Range<i64>) -> Self {

        assert!(
            di.start <= di.end && dj.start <= dj.end && dk.start <= dk.end,
            "index space has negative volume");

        Self { rank, di, dj, dk }
    }


    /**
     * Construct an index space of the given rank from inclusive lower and
     * exclusive upper corners.
     */
    pub fn from_corners(rank: usize, start: Index, end: Index) -> Self {
        let mut space = Self::with_rank(rank, 0..1, 0..1, 0..1);

        for axis in Axis::active(rank) {
            space = space.with_range(axis, axis.component(start)..axis.component(end));
        }
        space
    }


    pub fn rank(&self) -> usize {
        self.rank
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> (usize, usize, usize) {
        ((self.di.end - self.di.start) as usize,
         (self.dj.end - self.dj.start) as usize,
         (self.dk.end - self.dk.start) as usize)
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        let (l, m, n) = self.dim();
        l * m * n
    }


    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn start(&self) -> Index {
        (self.di.start, self.dj.start, self.dk.start)
    }


    /**
     * Return the maximum index (exclusive).
     */
    pub fn end(&self) -> Index {
        (self.di.end, self.dj.end, self.dk.end)
    }


    pub fn range(&self, axis: Axis) -> Range<i64> {
        match axis {
            Axis::I => self.di.clone(),
            Axis::J => self.dj.clone(),
            Axis::K => self.dk.clone(),
        }
    }


    /**
     * Return a copy of this index space with its extent along one axis
     * replaced.
     */
    pub fn with_range(&self, axis: Axis, range: Range<i64>) -> Self {
        let mut result = self.clone();
        match axis {
            Axis::I => result.di = range,
            Axis::J => result.dj = range,
            Axis::K => result.dk = range,
        }
        result
    }


    /**
     * Determine whether this index space contains the given index.
     */
    pub fn contains(&self, index: Index) -> bool {
        self.di.contains(&index.0) && self.dj.contains(&index.1) && self.dk.contains(&index.2)
    }


    /**
     * Determine whether another index space is a subset of this one.
     */
    pub fn contains_space(&self, other: &Self) -> bool {
        Axis::ALL.iter().all(|&a| {
            let (r, s) = (self.range(a), other.range(a));
            s.start >= r.start && s.end <= r.end
        })
    }


    /**
     * Expand this index space by the given number of elements on each active
     * axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        Axis::active(self.rank).fold(self.clone(), |space, axis| {
            let r = space.range(axis);
            space.with_range(axis, r.start - delta..r.end + delta)
        })
    }


    /**
     * Extend just the lower elements of this index space on the given axis.
     */
    pub fn extend_lower(&self, delta: i64, axis: Axis) -> Self {
        let r = self.range(axis);
        self.with_range(axis, r.start - delta..r.end)
    }


    /**
     * Extend just the upper elements of this index space on the given axis.
     */
    pub fn extend_upper(&self, delta: i64, axis: Axis) -> Self {
        let r = self.range(axis);
        self.with_range(axis, r.start..r.end + delta)
    }


    /**
     * Return the index space of the faces normal to `axis` bounding the cells
     * of this one.
     */
    pub fn faces(&self, axis: Axis) -> Self {
        self.extend_upper(1, axis)
    }


    /**
     * Increase the size of this index space by the given factor.
     */
    pub fn refine_by(&self, factor: i64) -> Self {
        Axis::active(self.rank).fold(self.clone(), |space, axis| {
            let r = space.range(axis);
            space.with_range(axis, r.start * factor..r.end * factor)
        })
    }


    /**
     * Return the smallest index space at a coarser level that covers this
     * one.
     */
    pub fn coarsen_by(&self, factor: i64) -> Self {
        Axis::active(self.rank).fold(self.clone(), |space, axis| {
            let r = space.range(axis);
            let lo = r.start.div_euclid(factor);
            let hi = (r.end + factor - 1).div_euclid(factor);
            space.with_range(axis, lo..hi)
        })
    }


    /**
     * Return the overlap of two index spaces, if it is not empty.
     */
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let mut result = self.clone();

        for axis in Axis::ALL {
            let (r, s) = (self.range(axis), other.range(axis));
            let lo = r.start.max(s.start);
            let hi = r.end.min(s.end);

            if lo >= hi {
                return None;
            }
            result = result.with_range(axis, lo..hi);
        }
        Some(result)
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: Index) -> usize {
        let i = (index.0 - self.di.start) as usize;
        let j = (index.1 - self.dj.start) as usize;
        let k = (index.2 - self.dk.start) as usize;
        let (_, m, n) = self.dim();
        (i * m + j) * n + k
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = Index> + '_ {
        self.di.clone().flat_map(move |i| {
            self.dj.clone().flat_map(move |j| self.dk.clone().map(move |k| (i, j, k)))
        })
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{coarsen_index, Axis, IndexSpace};

    #[test]
    fn extend_all_leaves_inactive_axes_alone() {
        let space = IndexSpace::new_2d(0..10, 0..20).extend_all(2);
        assert_eq!(space.range(Axis::I), -2..12);
        assert_eq!(space.range(Axis::J), -2..22);
        assert_eq!(space.range(Axis::K), 0..1);
        assert_eq!(space.len(), 14 * 24);
    }

    #[test]
    fn coarsen_covers_the_fine_space() {
        let fine = IndexSpace::new(-3..5, 2..7, 0..4);
        let coarse = fine.coarsen_by(2);
        assert_eq!(coarse.range(Axis::I), -2..3);
        assert_eq!(coarse.range(Axis::J), 1..4);
        assert_eq!(coarse.range(Axis::K), 0..2);
        assert!(coarse.refine_by(2).contains_space(&fine));
    }

    #[test]
    fn row_major_offset_agrees_with_iteration_order() {
        let space = IndexSpace::new(1..4, -1..2, 5..7);
        for (n, index) in space.iter().enumerate() {
            assert_eq!(space.row_major_offset(index), n);
        }
    }

    #[test]
    fn intersection_of_disjoint_spaces_is_none() {
        let a = IndexSpace::new_2d(0..4, 0..4);
        let b = IndexSpace::new_2d(4..8, 0..4);
        assert!(a.intersect(&b).is_none());
        assert_eq!(a.extend_upper(1, Axis::I).intersect(&b), Some(IndexSpace::new_2d(4..5, 0..4)));
    }

    #[test]
    fn coarsened_indexes_round_toward_negative_infinity() {
        assert_eq!(coarsen_index((-1, 3, 0), 2), (-1, 1, 0));
        assert_eq!(coarsen_index((-2, 4, 5), 2), (-1, 2, 2));
    }

    #[test]
    fn third_axis_is_the_remaining_one() {
        assert_eq!(Axis::I.third(Axis::J), Axis::K);
        assert_eq!(Axis::K.third(Axis::I), Axis::J);
        assert_eq!(Axis::J.third(Axis::K), Axis::I);
    }
}
