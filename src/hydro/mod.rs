//! Numerical kernels of the advection scheme. Every kernel works on the
//! patches of a single box: it reads ghosted cell patches and face patches,
//! and returns new face or cell patches. Nothing here touches more than one
//! level, fills ghost cells, or talks to the flux registers; the engine in
//! `crate::advection` does that.

pub mod edge_scal;
pub mod flux;
pub mod prediction;
pub mod reconstruct;
pub mod trans;
pub mod update;
pub mod upwind;
pub mod velpred;

use crate::boundary::{ComponentBc, PhysicalBoundaries};
use crate::config::Reconstruction;
use crate::geometry::Geometry;
use self::reconstruct::TraceParams;
use self::upwind::Expansion;




/**
 * Everything a kernel needs to know about the level it runs on: the
 * reconstruction scheme, the level geometry, the physical boundaries with
 * the codes of each velocity component, the background expansion velocity
 * as seen by the faces of the level, the time step, and the velocity scale
 * below which a face velocity counts as zero.
 */
#[derive(Clone, Copy)]
pub struct LevelContext<'a> {
    pub scheme: Reconstruction,
    pub geometry: &'a Geometry,
    pub boundaries: &'a PhysicalBoundaries,
    pub velocity_bcs: &'a [ComponentBc],
    pub expansion: Expansion<'a>,
    pub dt: f64,
    pub eps: f64,
}

impl<'a> LevelContext<'a> {
    pub fn trace_params(&self) -> TraceParams<'a> {
        TraceParams {
            scheme: self.scheme,
            geometry: self.geometry,
            dt: self.dt,
        }
    }
}
