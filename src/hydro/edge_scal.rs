use std::ops::Range;
use crate::boundary::ComponentBc;
use crate::index_space::{Axis, Index, IndexSpace};
use crate::patch::Patch;
use super::LevelContext;
use super::reconstruct::{trace_faces, Advector, LEFT, RIGHT};
use super::upwind::{halo_faces, scalar_on_boundary, upwind, velocity_on_boundary, TransverseTable};




/**
 * Which components of a cell patch to predict, and how.
 *
 * `bcs` is indexed by component. In velocity mode the components are the
 * velocity components, the boundary faces take the velocity boundary value,
 * and `bcs` holds the velocity codes. The conservative form predicts a
 * quantity whose flux divergence is taken; the advective form a quantity
 * transported along characteristics.
 */
#[derive(Clone)]
pub struct EdgeScalarRequest<'a> {
    pub components: Range<usize>,
    pub bcs: &'a [ComponentBc],
    pub is_velocity: bool,
    pub conservative: bool,
    pub trace_forces: bool,
}




/**
 * Predict edge states of the requested components of `s` on the valid faces
 * of one box. `umac` holds one face patch per active axis, with at least one
 * ghost face, and `force` is the ghosted forcing with the same layout as
 * `s`. The returned face patches have as many fields as `s`; fields outside
 * the request are zero.
 */
pub fn predict_edge_states(
    ctx: &LevelContext,
    valid: &IndexSpace,
    s: &Patch,
    umac: &[&Patch],
    force: &Patch,
    request: &EdgeScalarRequest) -> Vec<Patch>
{
    let rank = ctx.geometry.rank();
    let mut edges: Vec<Patch> = Axis::active(rank)
        .map(|d| Patch::zeros(s.num_fields(), valid.faces(d)))
        .collect();

    for q in request.components.clone() {
        for (d, edge) in predict_component(ctx, valid, s, umac, force, request, q) {
            let out = &mut edges[d.number()];

            for f in edge.index_space().iter() {
                out.set(f, q, edge.get(f, 0))
            }
        }
    }
    edges
}




fn predict_component(
    ctx: &LevelContext,
    valid: &IndexSpace,
    s: &Patch,
    umac: &[&Patch],
    force: &Patch,
    request: &EdgeScalarRequest,
    q: usize) -> Vec<(Axis, Patch)>
{
    let rank = ctx.geometry.rank();
    let params = ctx.trace_params();
    let bc = &request.bcs[q];
    let dt = ctx.dt;
    let h = |a: Axis| ctx.geometry.cell_size(a);
    let axes: Vec<Axis> = Axis::active(rank).collect();

    let on_boundary = |axis: Axis, f: Index, states: (f64, f64)| {
        if request.is_velocity {
            velocity_on_boundary(ctx.boundaries, ctx.geometry, axis, f, Axis::from_number(q), states, s)
        } else {
            scalar_on_boundary(bc, ctx.geometry, axis, f, states, s, q)
        }
    };

    let traced: Vec<Patch> = axes
        .iter()
        .map(|&d| trace_faces(&params, s, q, bc, d, &halo_faces(valid, d), Advector::Faces(umac[d.number()])))
        .collect();

    let imh: Vec<Patch> = axes
        .iter()
        .map(|&d| {
            let traced = &traced[d.number()];
            Patch::from_slice_function(1, halo_faces(valid, d), |f, p| {
                let states = (traced.get(f, LEFT), traced.get(f, RIGHT));
                p[0] = on_boundary(d, f, states).unwrap_or_else(|| upwind(states.0, states.1, umac[d.number()].get(f, 0), ctx.eps))
            })
        })
        .collect();

    let table = TransverseTable::build(rank, |t, s_axis| {
        let umac_s = umac[s_axis.number()];
        let imh_s = &imh[s_axis.number()];
        let traced = &traced[t.number()];
        let faces = valid
            .extend_all(1)
            .with_range(t, valid.range(t))
            .with_range(s_axis, valid.range(s_axis))
            .faces(t);

        let corr = |c: Index| {
            let cs = s_axis.shift(c, 1);
            if request.conservative {
                dt / (3.0 * h(s_axis)) * (imh_s.get(cs, 0) * umac_s.get(cs, 0) - imh_s.get(c, 0) * umac_s.get(c, 0))
            } else {
                dt / (6.0 * h(s_axis)) * (umac_s.get(cs, 0) + umac_s.get(c, 0)) * (imh_s.get(cs, 0) - imh_s.get(c, 0))
            }
        };

        Patch::from_slice_function(1, faces, |f, p| {
            let l = traced.get(f, LEFT) - corr(t.shift(f, -1));
            let r = traced.get(f, RIGHT) - corr(f);
            p[0] = on_boundary(t, f, (l, r)).unwrap_or_else(|| upwind(l, r, umac[t.number()].get(f, 0), ctx.eps))
        })
    });

    axes.iter()
        .map(|&d| {
            let traced = &traced[d.number()];
            let umac_d = umac[d.number()];
            let faces = valid.faces(d);
            let traced_force = if request.trace_forces {
                Some(trace_faces(&params, force, q, &ctx.boundaries.force_bc(), d, &faces, Advector::Faces(umac_d)))
            } else {
                None
            };

            let transverse = |c: Index| -> f64 {
                let terms: f64 = d.others(rank)
                    .map(|t| {
                        let state = match table.get(t, d.third(t)) {
                            Some(state) => state,
                            None => &imh[t.number()],
                        };
                        let umac_t = umac[t.number()];
                        let ct = t.shift(c, 1);

                        if request.conservative {
                            dt / (2.0 * h(t)) * (state.get(ct, 0) * umac_t.get(ct, 0) - state.get(c, 0) * umac_t.get(c, 0))
                        } else {
                            dt / (4.0 * h(t)) * (umac_t.get(ct, 0) + umac_t.get(c, 0)) * (state.get(ct, 0) - state.get(c, 0))
                        }
                    })
                    .sum();

                if request.conservative {
                    terms + dt / (2.0 * h(d)) * s.get(c, q) * (umac_d.get(d.shift(c, 1), 0) - umac_d.get(c, 0))
                } else {
                    terms
                }
            };

            let edge = Patch::from_slice_function(1, faces.clone(), |f, p| {
                let (cl, cr) = (d.shift(f, -1), f);
                let (fl, fr) = match &traced_force {
                    Some(tf) => (tf.get(f, LEFT), tf.get(f, RIGHT)),
                    None => (force.get(cl, q), force.get(cr, q)),
                };
                let l = traced.get(f, LEFT) - transverse(cl) + 0.5 * dt * fl;
                let r = traced.get(f, RIGHT) - transverse(cr) + 0.5 * dt * fr;

                p[0] = on_boundary(d, f, (l, r)).unwrap_or_else(|| upwind(l, r, umac_d.get(f, 0), ctx.eps))
            });
            (d, edge)
        })
        .collect()
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::boundary::{BoundaryKind, PhysicalBoundaries};
    use crate::config::Reconstruction;
    use crate::geometry::Geometry;
    use crate::hydro::upwind::Expansion;

    fn check<F>(rank: usize, conservative: bool, profile: F, u: [f64; 3]) -> (Vec<Patch>, IndexSpace, Patch)
    where
        F: Fn(Index) -> f64
    {
        let valid = match rank {
            2 => IndexSpace::new_2d(0..8, 0..8),
            _ => IndexSpace::new(0..4, 0..4, 0..4),
        };
        let geometry = Geometry::new(valid.clone(), [0.0; 3], [1.0; 3], [true, true, false]);
        let boundaries = PhysicalBoundaries::periodic().with_axis(Axis::K, BoundaryKind::SlipWall);
        let vbcs: Vec<ComponentBc> = Axis::active(rank).map(|n| boundaries.velocity_bc(n, 0.0)).collect();
        let sbcs = vec![boundaries.scalar_bc(0.0); 2];
        let ctx = LevelContext {
            scheme: Reconstruction::Ppm,
            geometry: &geometry,
            boundaries: &boundaries,
            velocity_bcs: &vbcs,
            expansion: Expansion::Still,
            dt: 0.1,
            eps: 1e-10,
        };
        let cells = valid.extend_all(4);
        let s = Patch::from_slice_function(2, cells.clone(), |i, p| {
            p[0] = 7.0;
            p[1] = profile(i);
        });
        let force = Patch::zeros(2, cells);
        let umac: Vec<Patch> = Axis::active(rank)
            .map(|a| Patch::from_function(valid.extend_all(1).faces(a), |_| u[a.number()]))
            .collect();
        let request = EdgeScalarRequest {
            components: 1..2,
            bcs: &sbcs,
            is_velocity: false,
            conservative,
            trace_forces: false,
        };
        let umac_refs: Vec<&Patch> = umac.iter().collect();
        (predict_edge_states(&ctx, &valid, &s, &umac_refs, &force, &request), valid, s)
    }

    #[test]
    fn uniform_scalar_in_uniform_flow_is_unchanged() {
        for conservative in [false, true] {
            let (edges, valid, _) = check(2, conservative, |_| 2.5, [0.4, -0.3, 0.0]);

            for d in Axis::active(2) {
                for f in valid.faces(d).iter() {
                    assert_eq!(edges[d.number()].get(f, 1), 2.5);
                    assert_eq!(edges[d.number()].get(f, 0), 0.0);
                }
            }
        }
    }

    #[test]
    fn uniform_scalar_is_unchanged_in_three_dimensions() {
        let (edges, valid, _) = check(3, true, |_| 1.5, [0.2, 0.1, 0.0]);
        assert_eq!(edges.len(), 3);

        for f in valid.faces(Axis::K).iter() {
            assert_eq!(edges[2].get(f, 1), 1.5);
        }
    }

    #[test]
    fn flow_along_one_axis_takes_the_upwind_state() {
        let (edges, _, s) = check(2, false, |(i, _, _)| if i < 4 { 1.0 } else { 0.0 }, [1.0, 0.0, 0.0]);
        assert_eq!(edges[0].get((2, 3, 0), 1), s.get((1, 3, 0), 1));
        assert_eq!(edges[1].get((2, 3, 0), 1), 1.0);
    }
}
