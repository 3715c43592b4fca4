use crate::index_space::{Axis, Index, IndexSpace};
use crate::patch::Patch;
use super::LevelContext;
use super::reconstruct::{trace_faces, Advector, LEFT, RIGHT};
use super::upwind::{halo_faces, riemann, upwind, velocity_on_boundary, Expansion, TransverseTable};




/**
 * Inputs of the MAC velocity predictor on one box. `utilde` is the ghosted
 * cell velocity being transported, `ufull` the same velocity with the
 * expansion velocity added, `trans` the transverse face velocities (one
 * face patch per active axis, expansion included), and `force` the ghosted
 * velocity forcing.
 */
pub struct VelocityInputs<'a> {
    pub utilde: &'a Patch,
    pub ufull: &'a Patch,
    pub trans: Vec<&'a Patch>,
    pub force: &'a Patch,
    pub trace_forces: bool,
}




/**
 * Predict the normal velocity at the half time on every valid face of one
 * box, with the unsplit transverse corrections. Returns one single-field
 * face patch per active axis. The result is the transported velocity; the
 * expansion velocity is not added.
 */
pub fn predict_velocity(ctx: &LevelContext, patch: usize, valid: &IndexSpace, inputs: &VelocityInputs) -> Vec<Patch> {
    let rank = ctx.geometry.rank();
    let params = ctx.trace_params();
    let axes: Vec<Axis> = Axis::active(rank).collect();

    // One-dimensional traces of every component along every axis, indexed
    // [axis][component].
    let traced: Vec<Vec<Patch>> = axes
        .iter()
        .map(|&d| {
            let faces = halo_faces(valid, d);
            axes.iter()
                .map(|&n| trace_faces(&params, inputs.utilde, n.number(), &ctx.velocity_bcs[n.number()], d, &faces, Advector::Cells(inputs.ufull)))
                .collect()
        })
        .collect();

    let imh: Vec<Vec<Patch>> = axes
        .iter()
        .map(|&d| {
            axes.iter()
                .map(|&n| {
                    let traced = &traced[d.number()][n.number()];
                    Patch::from_slice_function(1, halo_faces(valid, d), |f, p| {
                        let states = (traced.get(f, LEFT), traced.get(f, RIGHT));
                        p[0] = velocity_on_boundary(ctx.boundaries, ctx.geometry, d, f, n, states, inputs.utilde)
                            .unwrap_or_else(|| if n == d {
                                riemann(states.0, states.1, ctx.expansion.at(patch, d, f), ctx.eps)
                            } else {
                                upwind(states.0, states.1, inputs.trans[d.number()].get(f, 0), ctx.eps)
                            })
                    })
                })
                .collect()
        })
        .collect();

    // Three dimensions only: the state on faces normal to t of the velocity
    // component along the third axis, corrected for transverse flow along s.
    let table = TransverseTable::build(rank, |t, s| {
        let n = t.third(s);
        let hs = ctx.geometry.cell_size(s);
        let trans_s = inputs.trans[s.number()];
        let imh_s = &imh[s.number()][n.number()];
        let traced = &traced[t.number()][n.number()];
        let faces = valid
            .extend_all(1)
            .with_range(t, valid.range(t))
            .with_range(s, valid.range(s))
            .faces(t);

        let corr = |c: Index| {
            let cs = s.shift(c, 1);
            ctx.dt / (6.0 * hs) * (trans_s.get(cs, 0) + trans_s.get(c, 0)) * (imh_s.get(cs, 0) - imh_s.get(c, 0))
        };

        Patch::from_slice_function(1, faces, |f, p| {
            let l = traced.get(f, LEFT) - corr(t.shift(f, -1));
            let r = traced.get(f, RIGHT) - corr(f);
            p[0] = velocity_on_boundary(ctx.boundaries, ctx.geometry, t, f, n, (l, r), inputs.utilde)
                .unwrap_or_else(|| upwind(l, r, inputs.trans[t.number()].get(f, 0), ctx.eps))
        })
    });

    axes.iter()
        .map(|&d| {
            let traced = &traced[d.number()][d.number()];
            let trans_d = inputs.trans[d.number()];
            let faces = valid.faces(d);
            let traced_force = if inputs.trace_forces {
                Some(trace_faces(&params, inputs.force, d.number(), &ctx.boundaries.force_bc(), d, &faces, Advector::Cells(inputs.ufull)))
            } else {
                None
            };

            // Transverse terms for the state in cell c, on the side of the
            // face facing direction d.
            let transverse = |c: Index| -> f64 {
                d.others(rank)
                    .map(|t| {
                        let state = match table.get(t, d.third(t)) {
                            Some(state) => state,
                            None => &imh[t.number()][d.number()],
                        };
                        let trans_t = inputs.trans[t.number()];
                        let ct = t.shift(c, 1);
                        ctx.dt / (4.0 * ctx.geometry.cell_size(t))
                            * (trans_t.get(ct, 0) + trans_t.get(c, 0))
                            * (state.get(ct, 0) - state.get(c, 0))
                    })
                    .sum()
            };

            // The (Utilde . e_r) dw0/dr term in the vertical direction.
            let expansion_term = |c: Index| -> f64 {
                match ctx.expansion {
                    Expansion::Planar { w0, level, vertical } if vertical == d => {
                        let r = d.component(c);
                        let w_lo = w0.at(level, r);
                        let w_hi = w0.at(level, r + 1);
                        let utilde_r = 0.5 * (trans_d.get(d.shift(c, 1), 0) + trans_d.get(c, 0)) - 0.5 * (w_lo + w_hi);
                        0.5 * ctx.dt * utilde_r * (w_hi - w_lo) / ctx.geometry.cell_size(d)
                    }
                    _ => 0.0,
                }
            };

            Patch::from_slice_function(1, faces.clone(), |f, p| {
                let (cl, cr) = (d.shift(f, -1), f);
                let (fl, fr) = match &traced_force {
                    Some(tf) => (tf.get(f, LEFT), tf.get(f, RIGHT)),
                    None => (inputs.force.get(cl, d.number()), inputs.force.get(cr, d.number())),
                };
                let l = traced.get(f, LEFT) - transverse(cl) + 0.5 * ctx.dt * fl - expansion_term(cl);
                let r = traced.get(f, RIGHT) - transverse(cr) + 0.5 * ctx.dt * fr - expansion_term(cr);

                p[0] = velocity_on_boundary(ctx.boundaries, ctx.geometry, d, f, d, (l, r), inputs.utilde)
                    .unwrap_or_else(|| riemann(l, r, ctx.expansion.at(patch, d, f), ctx.eps))
            })
        })
        .collect()
}
