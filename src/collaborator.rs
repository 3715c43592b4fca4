//! Contracts of the collaborators the advection engine calls but does not
//! implement: the elliptic projection and the microphysics (equation of
//! state and nuclear heating).

use rayon::prelude::*;
use crate::boundary::{BoundaryKind, PhysicalBoundaries, Side};
use crate::error::Result;
use crate::field::{EdgeField, LevelField};
use crate::index_space::Axis;
use crate::layout::ComponentLayout;




/// Condition on the projection potential at one face of the domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionBoundary {
    Periodic,
    /// Outflow: the potential is prescribed.
    Dirichlet,
    /// Walls and symmetry planes: the normal gradient vanishes.
    Neumann,
    /// Prescribed normal velocity.
    Inflow,
}

impl From<BoundaryKind> for ProjectionBoundary {
    fn from(kind: BoundaryKind) -> Self {
        match kind {
            BoundaryKind::Periodic => ProjectionBoundary::Periodic,
            BoundaryKind::Outflow => ProjectionBoundary::Dirichlet,
            BoundaryKind::Inflow => ProjectionBoundary::Inflow,
            BoundaryKind::SlipWall | BoundaryKind::NoSlipWall | BoundaryKind::Symmetry => ProjectionBoundary::Neumann,
        }
    }
}

/**
 * The projection condition on every face of the domain, indexed by axis and
 * side.
 */
pub fn projection_boundaries(boundaries: &PhysicalBoundaries) -> [[ProjectionBoundary; 2]; 3] {
    let mut result = [[ProjectionBoundary::Periodic; 2]; 3];

    for axis in Axis::ALL {
        for side in Side::BOTH {
            result[axis.number()][side.number()] = boundaries.kind(axis, side).into();
        }
    }
    result
}




/// Convergence criteria of the elliptic solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerance {
    pub relative: f64,
    pub absolute: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { relative: 1e-11, absolute: 0.0 }
    }
}




/// The elliptic projection which enforces the divergence constraint on the
/// face velocity.
///
pub trait Projection {
    /// Project the face velocity of every level, weighted by the background
    /// coefficient, and return the corrected velocity with the pressure
    /// correction.
    ///
    fn project(
        &self,
        velocity: &[EdgeField],
        coefficient: &[LevelField],
        boundaries: [[ProjectionBoundary; 2]; 3],
        tolerance: Tolerance) -> Result<(Vec<EdgeField>, Vec<LevelField>)>;
}




/// Equation of state and nuclear heating, evaluated cell by cell.
///
pub trait Microphysics: Sync {
    /// The heating rate per unit volume of a cell, given its scalar state.
    /// The engine does not call it; `enthalpy_forcing` turns it into the
    /// scalar force a caller passes to a step.
    ///
    fn compute_heating(&self, state: &[f64]) -> f64;

    /// The enthalpy density implied by the density, the partial densities of
    /// the species, and the background pressure.
    ///
    fn rhoh_from_eos(&self, rho: f64, rho_x: &[f64], p0: f64) -> f64;
}




/**
 * A scalar force with one component per scalar, holding the heating rate of
 * every valid cell in the enthalpy component and zero elsewhere.
 */
pub fn enthalpy_forcing(microphysics: &dyn Microphysics, state: &[LevelField]) -> Vec<LevelField> {
    state
        .iter()
        .map(|s| {
            let mut force = s.clone();
            (0..force.num_fields()).for_each(|q| force.fill_field(q, 0.0));
            let valid = s.valid().to_vec();

            force.patches_mut()
                .par_iter_mut()
                .zip(s.patches().par_iter())
                .zip(valid.par_iter())
                .for_each(|((f, s), valid)| {
                    for c in valid.iter() {
                        f.set(c, ComponentLayout::RHOH, microphysics.compute_heating(s.get_slice(c)))
                    }
                });
            force
        })
        .collect()
}
