use crate::index_space::{Axis, IndexSpace};
use crate::patch::Patch;
use super::LevelContext;
use super::reconstruct::{trace_faces, Advector, LEFT, RIGHT};
use super::upwind::{riemann, velocity_on_boundary, Expansion};




/**
 * Build the transverse ("trans") velocity normal to `axis` on the valid
 * faces of one box. The normal component of `utilde` is traced to both
 * sides of each face, carried by the full velocity `ufull`, and a single
 * value is selected by the sign of the full velocity. Physical faces take
 * the value imposed by the boundary. The expansion velocity is not
 * included; see `add_w0`.
 */
pub fn make_trans(
    ctx: &LevelContext,
    patch: usize,
    valid: &IndexSpace,
    utilde: &Patch,
    ufull: &Patch,
    axis: Axis) -> Patch
{
    let n = axis.number();
    let faces = valid.faces(axis);
    let traced = trace_faces(&ctx.trace_params(), utilde, n, &ctx.velocity_bcs[n], axis, &faces, Advector::Cells(ufull));

    Patch::from_slice_function(1, faces, |f, p| {
        let states = (traced.get(f, LEFT), traced.get(f, RIGHT));

        p[0] = velocity_on_boundary(ctx.boundaries, ctx.geometry, axis, f, axis, states, utilde)
            .unwrap_or_else(|| riemann(states.0, states.1, ctx.expansion.at(patch, axis, f), ctx.eps))
    })
}




/**
 * Add `mult` times the expansion velocity to the normal velocity on the
 * given faces of a face patch. In planar geometry only faces normal to the
 * vertical axis are touched.
 */
pub fn add_w0(faces: &mut Patch, space: &IndexSpace, axis: Axis, expansion: &Expansion, patch: usize, mult: f64) {
    if let Expansion::Planar { vertical, .. } = expansion {
        if axis != *vertical {
            return
        }
    }
    if let Expansion::Still = expansion {
        return
    }
    for f in space.iter() {
        *faces.get_mut(f, 0) += mult * expansion.at(patch, axis, f)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::base_state::Profile;
    use crate::boundary::{BoundaryKind, PhysicalBoundaries};
    use crate::config::Reconstruction;
    use crate::geometry::Geometry;

    fn setup() -> (Geometry, PhysicalBoundaries) {
        let geometry = Geometry::new(IndexSpace::new_1d(0..8), [0.0; 3], [1.0, 0.0, 0.0], [false; 3]);
        let boundaries = PhysicalBoundaries::periodic().with_axis(Axis::I, BoundaryKind::SlipWall);
        (geometry, boundaries)
    }

    #[test]
    fn uniform_flow_is_carried_to_interior_faces_and_stopped_at_walls() {
        let (geometry, boundaries) = setup();
        let bcs = vec![boundaries.velocity_bc(Axis::I, 0.0)];
        let ctx = LevelContext {
            scheme: Reconstruction::Ppm,
            geometry: &geometry,
            boundaries: &boundaries,
            velocity_bcs: &bcs,
            expansion: Expansion::Still,
            dt: 0.1,
            eps: 1e-10,
        };
        let valid = IndexSpace::new_1d(0..8);
        let u = Patch::from_function(valid.extend_all(4), |_| 0.5);
        let trans = make_trans(&ctx, 0, &valid, &u, &u, Axis::I);

        assert_eq!(trans.get((0, 0, 0), 0), 0.0);
        assert_eq!(trans.get((4, 0, 0), 0), 0.5);
        assert_eq!(trans.get((8, 0, 0), 0), 0.0);
    }

    #[test]
    fn expansion_velocity_is_added_on_vertical_faces_only() {
        let w0 = Profile::new(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        let expansion = Expansion::Planar { w0: &w0, level: 0, vertical: Axis::J };
        let space = IndexSpace::new_2d(0..2, 0..3);
        let mut vertical = Patch::zeros(1, space.clone());
        let mut horizontal = Patch::zeros(1, space.clone());

        add_w0(&mut vertical, &space, Axis::J, &expansion, 0, 1.0);
        add_w0(&mut horizontal, &space, Axis::I, &expansion, 0, 1.0);

        assert_eq!(vertical.get((1, 2, 0), 0), 3.0);
        assert_eq!(horizontal.get((1, 2, 0), 0), 0.0);

        add_w0(&mut vertical, &space, Axis::J, &expansion, 0, -1.0);
        assert_eq!(vertical.get((1, 2, 0), 0), 0.0);
    }
}
