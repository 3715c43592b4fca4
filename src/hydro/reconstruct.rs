use crate::boundary::{BcCode, ComponentBc, Side};
use crate::config::Reconstruction;
use crate::geometry::Geometry;
use crate::index_space::{Axis, Index, IndexSpace};
use crate::patch::Patch;




/// Field holding the state extrapolated from the cell below a face.
pub const LEFT: usize = 0;

/// Field holding the state extrapolated from the cell above a face.
pub const RIGHT: usize = 1;

/// Limiter constant of the extremum-preserving parabola.
const EXTREMUM_LIMITER: f64 = 1.25;




/**
 * The velocity which carries a reconstructed quantity through the half time
 * step: either the cell-centered velocity (whose component along the trace
 * axis is read), or the face-centered velocity normal to the trace axis.
 */
#[derive(Clone, Copy)]
pub enum Advector<'a> {
    Cells(&'a Patch),
    Faces(&'a Patch),
}




/**
 * Parameters shared by every trace on one level.
 */
#[derive(Clone, Copy)]
pub struct TraceParams<'a> {
    pub scheme: Reconstruction,
    pub geometry: &'a Geometry,
    pub dt: f64,
}




/**
 * Reconstruct component `q` of a cell-centered patch along `axis`, and
 * extrapolate it in time to both sides of every face in `faces`. The result
 * is a face patch with two fields, `LEFT` and `RIGHT`. The patch must carry
 * enough ghost cells for the stencil: four beyond the faces for the
 * parabolic schemes.
 */
pub fn trace_faces(
    params: &TraceParams,
    s: &Patch,
    q: usize,
    bc: &ComponentBc,
    axis: Axis,
    faces: &IndexSpace,
    advector: Advector) -> Patch
{
    let line = Line::new(params.scheme, s, q, bc, axis, params.geometry);
    let dtdx = params.dt / params.geometry.cell_size(axis);
    let cells = faces.extend_lower(1, axis);

    let extrapolated = Patch::from_slice_function(2, cells, |c, p| {
        let (u_hi, u_lo) = match advector {
            Advector::Cells(u) => (u.get(c, axis.number()), u.get(c, axis.number())),
            Advector::Faces(u) => (u.get(axis.shift(c, 1), 0), u.get(c, 0)),
        };
        let s0 = line.at(c, 0);

        if params.scheme.is_parabolic() {
            let (sm, sp) = line.profile(c);
            p[LEFT] = integrate_high(s0, sm, sp, u_hi, dtdx);
            p[RIGHT] = integrate_low(s0, sm, sp, u_lo, dtdx);
        } else {
            let slope = line.slope(c);
            let (u_plus, u_minus) = match advector {
                Advector::Cells(_) => (u_hi.max(0.0), u_lo.min(0.0)),
                Advector::Faces(_) => (u_hi, u_lo),
            };
            p[LEFT] = s0 + (0.5 - 0.5 * dtdx * u_plus) * slope;
            p[RIGHT] = s0 - (0.5 + 0.5 * dtdx * u_minus) * slope;
        }
    });

    Patch::from_slice_function(2, faces.clone(), |f, p| {
        p[LEFT] = extrapolated.get(axis.shift(f, -1), LEFT);
        p[RIGHT] = extrapolated.get(f, RIGHT);
    })
}




/**
 * Average of the parabola over the region swept towards the high face of a
 * cell in one half step; the cell value if the flow leaves through the low
 * face.
 */
fn integrate_high(s: f64, sm: f64, sp: f64, u: f64, dtdx: f64) -> f64 {
    if u > 0.0 {
        let sigma = u * dtdx;
        let s6 = 6.0 * s - 3.0 * (sm + sp);
        sp - 0.5 * sigma * (sp - sm - (1.0 - 2.0 / 3.0 * sigma) * s6)
    } else {
        s
    }
}

fn integrate_low(s: f64, sm: f64, sp: f64, u: f64, dtdx: f64) -> f64 {
    if u < 0.0 {
        let sigma = u.abs() * dtdx;
        let s6 = 6.0 * s - 3.0 * (sm + sp);
        sm + 0.5 * sigma * (sp - sm + (1.0 - 2.0 / 3.0 * sigma) * s6)
    } else {
        s
    }
}




/**
 * Monotonized central difference: the centered difference, capped by twice
 * either one-sided difference, and zero at a local extremum.
 */
pub fn mc_slope(sm1: f64, s0: f64, sp1: f64) -> f64 {
    let del = 0.5 * (sp1 - sm1);
    let dpls = 2.0 * (sp1 - s0);
    let dmin = 2.0 * (s0 - sm1);

    if dpls * dmin <= 0.0 {
        0.0
    } else {
        sign(del) * del.abs().min(dpls.abs()).min(dmin.abs())
    }
}

fn sign(x: f64) -> f64 {
    if x >= 0.0 { 1.0 } else { -1.0 }
}




/**
 * Classic monotonicity limiter on the edge values of one cell.
 */
fn limit_monotone(s: f64, sm: f64, sp: f64) -> (f64, f64) {
    if (sp - s) * (s - sm) <= 0.0 {
        (s, s)
    } else if (sp - s).abs() >= 2.0 * (sm - s).abs() {
        (sm, 3.0 * s - 2.0 * sm)
    } else if (sm - s).abs() >= 2.0 * (sp - s).abs() {
        (3.0 * s - 2.0 * sp, sp)
    } else {
        (sm, sp)
    }
}




/**
 * One component of a patch seen along one axis, with the domain extent and
 * boundary codes needed to apply the boundary policy.
 */
struct Line<'a> {
    scheme: Reconstruction,
    s: &'a Patch,
    q: usize,
    axis: Axis,
    lo: i64,
    hi: i64,
    bc_lo: BcCode,
    bc_hi: BcCode,
}




// ============================================================================
impl<'a> Line<'a> {

    fn new(scheme: Reconstruction, s: &'a Patch, q: usize, bc: &ComponentBc, axis: Axis, geometry: &Geometry) -> Self {
        let r = geometry.domain().range(axis);
        Self {
            scheme,
            s,
            q,
            axis,
            lo: r.start,
            hi: r.end,
            bc_lo: bc.code(axis, Side::Lo),
            bc_hi: bc.code(axis, Side::Hi),
        }
    }

    fn at(&self, c: Index, k: i64) -> f64 {
        self.s.get(self.axis.shift(c, k), self.q)
    }

    fn slope(&self, c: Index) -> f64 {
        let i = self.axis.component(c);

        if (i == self.lo && self.bc_lo.zeroes_slope()) || (i == self.hi - 1 && self.bc_hi.zeroes_slope()) {
            0.0
        } else {
            mc_slope(self.at(c, -1), self.at(c, 0), self.at(c, 1))
        }
    }

    /**
     * Interpolated value on the face at the low side of cell `f`, before any
     * per-cell limiting. Next to a prescribed-value boundary the ghost cell
     * holds the face value, and the first interior face uses a one-sided
     * quartic through it.
     */
    fn edge(&self, f: Index) -> f64 {
        let i = self.axis.component(f);

        if self.bc_lo == BcCode::ExtDir {
            if i == self.lo {
                return self.at(f, -1)
            }
            if i == self.lo + 1 {
                let e = -0.2 * self.at(f, -2) + 0.75 * self.at(f, -1) + 0.5 * self.at(f, 0) - 0.05 * self.at(f, 1);
                return clamp_between(e, self.at(f, -1), self.at(f, 0))
            }
        }
        if self.bc_hi == BcCode::ExtDir {
            if i == self.hi {
                return self.at(f, 0)
            }
            if i == self.hi - 1 {
                let e = -0.2 * self.at(f, 1) + 0.75 * self.at(f, 0) + 0.5 * self.at(f, -1) - 0.05 * self.at(f, -2);
                return clamp_between(e, self.at(f, -1), self.at(f, 0))
            }
        }

        match self.scheme {
            Reconstruction::PpmExtremumPreserving => self.edge_extremum_preserving(f),
            _ => self.edge_monotone(f),
        }
    }

    fn edge_monotone(&self, f: Index) -> f64 {
        let (sa, sb) = (self.at(f, -1), self.at(f, 0));
        let dsa = mc_slope(self.at(f, -2), sa, sb);
        let dsb = mc_slope(sa, sb, self.at(f, 1));
        let e = 0.5 * (sa + sb) - (dsb - dsa) / 6.0;
        clamp_between(e, sa, sb)
    }

    fn edge_extremum_preserving(&self, f: Index) -> f64 {
        let (sl, sa, sb, sr) = (self.at(f, -2), self.at(f, -1), self.at(f, 0), self.at(f, 1));
        let e = 7.0 / 12.0 * (sa + sb) - 1.0 / 12.0 * (sl + sr);

        if (e - sa) * (sb - e) < 0.0 {
            let d2 = 3.0 * (sa - 2.0 * e + sb);
            let d2l = sl - 2.0 * sa + sb;
            let d2r = sa - 2.0 * sb + sr;
            let sgn = sign(d2);
            let d2lim = sgn * (sgn * d2).min(EXTREMUM_LIMITER * sgn * d2l).min(EXTREMUM_LIMITER * sgn * d2r).max(0.0);
            0.5 * (sa + sb) - d2lim / 6.0
        } else {
            e
        }
    }

    /**
     * Limited edge values `(sm, sp)` of the parabola in cell `c`.
     */
    fn profile(&self, c: Index) -> (f64, f64) {
        let s = self.at(c, 0);
        let sm = self.edge(c);
        let sp = self.edge(self.axis.shift(c, 1));

        match self.scheme {
            Reconstruction::PpmExtremumPreserving => self.limit_extremum_preserving(c, s, sm, sp),
            _ => limit_monotone(s, sm, sp),
        }
    }

    fn limit_extremum_preserving(&self, c: Index, s: f64, sm: f64, sp: f64) -> (f64, f64) {
        let mut alphap = sp - s;
        let mut alpham = sm - s;
        let bigp = alphap.abs() > 2.0 * alpham.abs();
        let bigm = alpham.abs() > 2.0 * alphap.abs();

        let extremum = if alpham * alphap >= 0.0 {
            true
        } else if bigp || bigm {
            let dafacem = sm - self.edge(self.axis.shift(c, -1));
            let dafacep = self.edge(self.axis.shift(c, 2)) - sp;
            let dabarm = s - self.at(c, -1);
            let dabarp = self.at(c, 1) - s;

            let (dachkm, dachkp) = if dafacem.abs().min(dafacep.abs()) >= dabarm.abs().min(dabarp.abs()) {
                (dafacem, dafacep)
            } else {
                (dabarm, dabarp)
            };
            dachkm * dachkp <= 0.0
        } else {
            false
        };

        if extremum {
            let d2 = 6.0 * (alpham + alphap);
            let d2l = self.at(c, -2) - 2.0 * self.at(c, -1) + s;
            let d2r = s - 2.0 * self.at(c, 1) + self.at(c, 2);
            let d2c = self.at(c, -1) - 2.0 * s + self.at(c, 1);
            let sgn = sign(d2);
            let d2lim = (sgn * d2)
                .min(EXTREMUM_LIMITER * sgn * d2l)
                .min(EXTREMUM_LIMITER * sgn * d2r)
                .min(EXTREMUM_LIMITER * sgn * d2c)
                .max(0.0);
            let scale = d2lim / d2.abs().max(1e-10);
            alpham *= scale;
            alphap *= scale;
        } else {
            if bigp {
                let sgn = sign(alpham);
                let amax = -alphap * alphap / (4.0 * (alpham + alphap));
                let delam = self.at(c, -1) - s;

                if sgn * amax >= sgn * delam {
                    alphap = if sgn * (delam - alpham) >= 1e-10 {
                        -2.0 * delam - 2.0 * sgn * (delam * delam - delam * alpham).max(0.0).sqrt()
                    } else {
                        -2.0 * alpham
                    };
                }
            }
            if bigm {
                let sgn = sign(alphap);
                let amax = -alpham * alpham / (4.0 * (alpham + alphap));
                let delap = self.at(c, 1) - s;

                if sgn * amax >= sgn * delap {
                    alpham = if sgn * (delap - alphap) >= 1e-10 {
                        -2.0 * delap - 2.0 * sgn * (delap * delap - delap * alphap).max(0.0).sqrt()
                    } else {
                        -2.0 * alphap
                    };
                }
            }
        }
        (s + alpham, s + alphap)
    }
}




fn clamp_between(x: f64, a: f64, b: f64) -> f64 {
    x.max(a.min(b)).min(a.max(b))
}
