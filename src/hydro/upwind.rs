use crate::base_state::Profile;
use crate::boundary::{ComponentBc, PhysicalBoundaries, Side};
use crate::field::EdgeField;
use crate::geometry::Geometry;
use crate::index_space::{Axis, Index, IndexSpace};
use crate::patch::Patch;




/**
 * Select the face value of a normal velocity from its two one-sided states.
 * The sign test is made on the full velocity, which adds the background
 * expansion `w` to each state. The face velocity is zero where the flow
 * diverges from the face, or where the two states nearly cancel.
 */
pub fn riemann(left: f64, right: f64, w: f64, eps: f64) -> f64 {
    if (left + w <= 0.0 && right + w >= 0.0) || (left + right + 2.0 * w).abs() < eps {
        0.0
    } else if 0.5 * (left + right) + w > 0.0 {
        left
    } else {
        right
    }
}




/**
 * Choose the upwind state for an advecting face velocity, or the average of
 * the two if the velocity is negligible.
 */
pub fn upwind(left: f64, right: f64, velocity: f64, eps: f64) -> f64 {
    if velocity.abs() < eps {
        0.5 * (left + right)
    } else if velocity > 0.0 {
        left
    } else {
        right
    }
}




/**
 * The faces normal to `axis` on which one-dimensional predictions are
 * needed: those of the valid box, widened by one cell on the other axes.
 */
pub fn halo_faces(valid: &IndexSpace, axis: Axis) -> IndexSpace {
    valid.extend_all(1).with_range(axis, valid.range(axis)).faces(axis)
}




/**
 * The background expansion velocity normal to a face, as seen by the
 * kernels of one level.
 */
#[derive(Clone, Copy)]
pub enum Expansion<'a> {
    /// No background motion on any face.
    Still,
    /// Planar geometry: an edge-centered profile along the vertical axis.
    Planar { w0: &'a Profile, level: usize, vertical: Axis },
    /// Spherical geometry: the normal velocity mapped onto every face.
    Mapped(&'a EdgeField),
}

impl<'a> Expansion<'a> {

    /**
     * Expansion velocity on a face normal to `axis`, lying in the patch
     * numbered `patch` of the level.
     */
    pub fn at(&self, patch: usize, axis: Axis, face: Index) -> f64 {
        match *self {
            Expansion::Still => 0.0,
            Expansion::Planar { w0, level, vertical } => {
                if axis == vertical {
                    w0.at(level, vertical.component(face))
                } else {
                    0.0
                }
            }
            Expansion::Mapped(w0mac) => w0mac.faces(axis)[patch].get(face, 0),
        }
    }
}




/**
 * Where a face lies on the physical boundary, the value imposed on a
 * velocity component there. `states` is the ghosted cell velocity, from
 * which the ghost value is read, and `(left, right)` are the predicted
 * states on either side of the face.
 */
pub fn velocity_on_boundary(
    boundaries: &PhysicalBoundaries,
    geometry: &Geometry,
    axis: Axis,
    face: Index,
    component: Axis,
    (left, right): (f64, f64),
    states: &Patch) -> Option<f64>
{
    let side = geometry.physical_face(face, axis)?;
    let (interior, ghost) = match side {
        Side::Lo => (right, states.get(axis.shift(face, -1), component.number())),
        Side::Hi => (left, states.get(face, component.number())),
    };
    boundaries.velocity_face_value(axis, side, axis == component, interior, ghost)
}




/**
 * Where a face lies on the physical boundary, the value imposed on
 * component `q` of a transported scalar there.
 */
pub fn scalar_on_boundary(
    bc: &ComponentBc,
    geometry: &Geometry,
    axis: Axis,
    face: Index,
    (left, right): (f64, f64),
    states: &Patch,
    q: usize) -> Option<f64>
{
    let side = geometry.physical_face(face, axis)?;
    let (interior, ghost) = match side {
        Side::Lo => (right, states.get(axis.shift(face, -1), q)),
        Side::Hi => (left, states.get(face, q)),
    };
    bc.code(axis, side).edge_value(interior, ghost)
}




/**
 * Face states predicted along one axis, then corrected for the transverse
 * flux along a second axis. Entry `(normal, transverse)` lives on the faces
 * normal to `normal`. Only distinct pairs of active axes are populated, and
 * only in three dimensions.
 */
pub struct TransverseTable<T> {
    entries: [[Option<T>; 3]; 3],
}




// ============================================================================
impl<T> TransverseTable<T> {

    /**
     * Build every entry of the table. All entries depend only on data that
     * exists before the table is built, so they can be produced in any
     * order.
     */
    pub fn build<F>(rank: usize, mut f: F) -> Self
    where
        F: FnMut(Axis, Axis) -> T
    {
        let mut entries: [[Option<T>; 3]; 3] = Default::default();

        if rank == 3 {
            for normal in Axis::ALL {
                for transverse in normal.others(rank) {
                    entries[normal.number()][transverse.number()] = Some(f(normal, transverse))
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, normal: Axis, transverse: Axis) -> Option<&T> {
        self.entries[normal.number()][transverse.number()].as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::boundary::BoundaryKind;

    #[test]
    fn riemann_gives_zero_in_a_rarefaction() {
        assert_eq!(riemann(-1.0, 1.0, 0.0, 1e-8), 0.0);
        assert_eq!(riemann(2.0, 1.0, 0.0, 1e-8), 2.0);
        assert_eq!(riemann(-2.0, -1.0, 0.0, 1e-8), -1.0);
        assert_eq!(riemann(1.0, -1.0, 0.0, 1e-8), 0.0);
        assert_eq!(riemann(-1.0, -0.5, 2.0, 1e-8), -1.0);
    }

    #[test]
    fn upwind_averages_when_the_velocity_vanishes() {
        assert_eq!(upwind(1.0, 3.0, 0.0, 1e-8), 2.0);
        assert_eq!(upwind(1.0, 3.0, 1.0, 1e-8), 1.0);
        assert_eq!(upwind(1.0, 3.0, -1.0, 1e-8), 3.0);
    }

    #[test]
    fn halo_faces_widen_only_the_other_axes() {
        let valid = IndexSpace::new_2d(0..4, 0..8);
        let faces = halo_faces(&valid, Axis::I);
        assert_eq!(faces.range(Axis::I), 0..5);
        assert_eq!(faces.range(Axis::J), -1..9);
    }

    #[test]
    fn wall_faces_hold_zero_normal_velocity() {
        let geometry = Geometry::new(IndexSpace::new_1d(0..4), [0.0; 3], [1.0, 0.0, 0.0], [false; 3]);
        let boundaries = PhysicalBoundaries::periodic().with_axis(Axis::I, BoundaryKind::SlipWall);
        let states = Patch::zeros(1, IndexSpace::new_1d(-1..5));
        assert_eq!(velocity_on_boundary(&boundaries, &geometry, Axis::I, (0, 0, 0), Axis::I, (1.0, 2.0), &states), Some(0.0));
        assert_eq!(velocity_on_boundary(&boundaries, &geometry, Axis::I, (2, 0, 0), Axis::I, (1.0, 2.0), &states), None);
    }

    #[test]
    fn transverse_table_has_six_entries_in_three_dimensions() {
        let table = TransverseTable::build(3, |n, t| (n, t));
        assert_eq!(table.len(), 6);
        assert_eq!(table.get(Axis::I, Axis::K), Some(&(Axis::I, Axis::K)));
        assert!(table.get(Axis::J, Axis::J).is_none());
        assert!(TransverseTable::build(2, |n, t| (n, t)).is_empty());
    }
}
