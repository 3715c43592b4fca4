use serde::{Deserialize, Serialize};
use crate::boundary::Side;
use crate::index_space::{Axis, Index, IndexSpace};




/**
 * Geometry of one refinement level: the cell index space covering the whole
 * domain, the physical extent of the domain, and which axes are periodic.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    domain: IndexSpace,
    prob_lo: [f64; 3],
    cell_size: [f64; 3],
    periodic: [bool; 3],
}




// ============================================================================
impl Geometry {

    /**
     * Create a geometry from the cell index space of the domain and its
     * physical corners. Inactive axes get unit cell size.
     */
    pub fn new(domain: IndexSpace, prob_lo: [f64; 3], prob_hi: [f64; 3], periodic: [bool; 3]) -> Self {
        let mut cell_size = [1.0; 3];

        for axis in Axis::active(domain.rank()) {
            let n = axis.number();
            let r = domain.range(axis);
            cell_size[n] = (prob_hi[n] - prob_lo[n]) / (r.end - r.start) as f64;
        }
        Self { domain, prob_lo, cell_size, periodic }
    }

    pub fn rank(&self) -> usize {
        self.domain.rank()
    }

    pub fn domain(&self) -> &IndexSpace {
        &self.domain
    }

    pub fn cell_size(&self, axis: Axis) -> f64 {
        self.cell_size[axis.number()]
    }

    pub fn is_periodic(&self, axis: Axis) -> bool {
        self.periodic[axis.number()]
    }

    /// Physical coordinate of the lower domain face along an axis.
    pub fn lower_corner(&self, axis: Axis) -> f64 {
        self.prob_lo[axis.number()]
    }

    pub fn cell_volume(&self) -> f64 {
        Axis::active(self.rank()).map(|a| self.cell_size(a)).product()
    }

    /**
     * Area of a face normal to the given axis.
     */
    pub fn face_area(&self, axis: Axis) -> f64 {
        axis.others(self.rank()).map(|a| self.cell_size(a)).product()
    }

    pub fn cell_center(&self, index: Index) -> [f64; 3] {
        let mut x = [0.0; 3];

        for axis in Axis::active(self.rank()) {
            let n = axis.number();
            x[n] = self.prob_lo[n] + (axis.component(index) as f64 + 0.5) * self.cell_size[n];
        }
        x
    }

    /**
     * Return the geometry of the next finer level (refinement ratio 2).
     */
    pub fn refine(&self) -> Self {
        let mut cell_size = self.cell_size;

        for axis in Axis::active(self.rank()) {
            cell_size[axis.number()] *= 0.5;
        }
        Self {
            domain: self.domain.refine_by(2),
            prob_lo: self.prob_lo,
            cell_size,
            periodic: self.periodic,
        }
    }

    /**
     * Map an index lying outside the domain on a periodic axis to its image
     * inside the domain. Works for cell and face indexes alike.
     */
    pub fn wrap_periodic(&self, index: Index) -> Index {
        Axis::active(self.rank())
            .filter(|&a| self.is_periodic(a))
            .fold(index, |index, axis| {
                let r = self.domain.range(axis);
                let n = r.end - r.start;
                axis.with(index, r.start + (axis.component(index) - r.start).rem_euclid(n))
            })
    }

    /**
     * Return the first non-periodic axis on which the cell index lies outside
     * the domain, and on which side.
     */
    pub fn outside(&self, index: Index) -> Option<(Axis, Side)> {
        Axis::active(self.rank())
            .filter(|&a| !self.is_periodic(a))
            .find_map(|axis| {
                let r = self.domain.range(axis);
                let i = axis.component(index);
                if i < r.start {
                    Some((axis, Side::Lo))
                } else if i >= r.end {
                    Some((axis, Side::Hi))
                } else {
                    None
                }
            })
    }

    /**
     * Whether the given face normal to `axis` lies on the physical (non
     * periodic) boundary of the domain, and on which side.
     */
    pub fn physical_face(&self, face: Index, axis: Axis) -> Option<Side> {
        if self.is_periodic(axis) {
            return None
        }
        let r = self.domain.range(axis);
        let f = axis.component(face);

        if f == r.start {
            Some(Side::Lo)
        } else if f == r.end {
            Some(Side::Hi)
        } else {
            None
        }
    }
}
