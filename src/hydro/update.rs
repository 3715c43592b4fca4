use crate::field::EdgeField;
use crate::geometry::Geometry;
use crate::index_space::{Axis, Index, IndexSpace};
use crate::layout::ComponentLayout;
use crate::patch::Patch;
use crate::base_state::ExpansionVelocity;




/**
 * What the density and species policy did to one cell.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellOutcome {
    pub floored: bool,
    pub repaired: bool,
}




/**
 * Counts of cells touched by the density and species policy over some set
 * of cells.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PolicyCounts {
    pub floored: usize,
    pub repaired: usize,
}

impl PolicyCounts {
    fn record(&mut self, outcome: CellOutcome) {
        self.floored += outcome.floored as usize;
        self.repaired += outcome.repaired as usize;
    }
}

impl std::ops::Add for PolicyCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            floored: self.floored + other.floored,
            repaired: self.repaired + other.repaired,
        }
    }
}




/**
 * Enforce the density floor, then repair negative partial densities, on the
 * freshly updated partial densities of one cell, and return the density.
 *
 * The floor acts when the density implied by the species falls below half
 * the cutoff density: the species are scaled so that they sum to that floor.
 * Then each species which was negative after the flux update, and is still
 * negative, is set to zero and its deficit is taken from the non-negative
 * species in proportion to their share. This is one pass in component
 * order, not an iteration to a fixed point. The density returned is the sum
 * of the species.
 */
pub fn enforce_species_policy(species: &mut [f64], base_cutoff_density: f64) -> (f64, CellOutcome) {
    let has_negative = species.iter().any(|&x| x < 0.0);
    let floor = 0.5 * base_cutoff_density;
    let rho: f64 = species.iter().sum();
    let mut outcome = CellOutcome::default();

    if rho < floor {
        outcome.floored = true;

        if rho > 0.0 {
            let scale = floor / rho;
            species.iter_mut().for_each(|x| *x *= scale);
        } else {
            let share = floor / species.len() as f64;
            species.iter_mut().for_each(|x| *x = share);
        }
    }

    if has_negative {
        for n in 0..species.len() {
            if species[n] >= 0.0 {
                continue
            }
            outcome.repaired = true;

            let delta = -species[n];
            let sum: f64 = species
                .iter()
                .enumerate()
                .filter(|&(m, &x)| m != n && x >= 0.0)
                .map(|(_, x)| x)
                .sum();

            if sum > 0.0 {
                for m in 0..species.len() {
                    if m != n && species[m] >= 0.0 {
                        species[m] -= species[m] / sum * delta
                    }
                }
            }
            species[n] = 0.0;
        }
    }
    (species.iter().sum(), outcome)
}




/**
 * Divergence of a face-centered flux at cell `c`, for component `q`.
 */
pub fn flux_divergence(geometry: &Geometry, fluxes: &[&Patch], c: Index, q: usize) -> f64 {
    Axis::active(geometry.rank())
        .map(|d| {
            let flux = fluxes[d.number()];
            (flux.get(d.shift(c, 1), q) - flux.get(c, q)) / geometry.cell_size(d)
        })
        .sum()
}




/**
 * Inputs common to the scalar updates of one box.
 */
pub struct ScalarUpdate<'a> {
    pub geometry: &'a Geometry,
    pub dt: f64,
    pub sold: &'a Patch,
    pub fluxes: Vec<&'a Patch>,
    pub force: &'a Patch,
}




/**
 * Advance the partial densities of the valid cells of one box by the flux
 * divergence and forcing, apply the density and species policy, and set the
 * density to the sum of the species.
 */
pub fn update_species(
    layout: &ComponentLayout,
    base_cutoff_density: f64,
    update: &ScalarUpdate,
    valid: &IndexSpace,
    snew: &mut Patch) -> PolicyCounts
{
    let mut counts = PolicyCounts::default();
    let mut species = vec![0.0; layout.num_species()];

    for c in valid.iter() {
        for (x, q) in species.iter_mut().zip(layout.species()) {
            let divergence = flux_divergence(update.geometry, &update.fluxes, c, q);
            *x = update.sold.get(c, q) + update.dt * (update.force.get(c, q) - divergence);
        }
        let (rho, outcome) = enforce_species_policy(&mut species, base_cutoff_density);
        let cell = snew.get_slice_mut(c);

        cell[ComponentLayout::RHO] = rho;
        cell[layout.species()].copy_from_slice(&species);
        counts.record(outcome);
    }
    counts
}




/**
 * Advance the enthalpy density of the valid cells of one box. Where
 * `override_rhoh` returns a value for a cell (given the new state of that
 * cell), it replaces the flux update. The new density and species must
 * already be in `snew`.
 */
pub fn update_enthalpy<F>(update: &ScalarUpdate, valid: &IndexSpace, snew: &mut Patch, override_rhoh: F) -> usize
where
    F: Fn(Index, &[f64]) -> Option<f64>
{
    let q = ComponentLayout::RHOH;
    let mut overridden = 0;

    for c in valid.iter() {
        let divergence = flux_divergence(update.geometry, &update.fluxes, c, q);
        let rhoh = update.sold.get(c, q) + update.dt * (update.force.get(c, q) - divergence);

        let value = match override_rhoh(c, snew.get_slice(c)) {
            Some(value) => {
                overridden += 1;
                value
            }
            None => rhoh,
        };
        snew.set(c, q, value)
    }
    overridden
}




/**
 * The background velocity advecting the velocity field: none, the planar
 * profile averaged to cell centers, or the face-mapped spherical field.
 */
#[derive(Clone, Copy)]
pub enum BackgroundAdvection<'a> {
    None,
    Planar { w0: &'a ExpansionVelocity, level: usize, vertical: Axis },
    Mapped { w0mac: &'a EdgeField, patch: usize },
}




/**
 * Inputs of the velocity update of one box. `uedge` holds the predicted
 * edge velocities (every component, one patch per face direction), `umac`
 * the transported face velocity without the expansion velocity, and
 * `sponge` the optional damping coefficient.
 */
pub struct VelocityUpdate<'a> {
    pub geometry: &'a Geometry,
    pub dt: f64,
    pub uold: &'a Patch,
    pub uedge: Vec<&'a Patch>,
    pub umac: Vec<&'a Patch>,
    pub force: &'a Patch,
    pub background: BackgroundAdvection<'a>,
    pub sponge: Option<&'a Patch>,
}




/**
 * Advance the cell velocity of the valid cells of one box:
 * `unew = uold - dt (ubar . grad) u - dt (w0 . grad) u + dt f`, all times
 * the sponge coefficient if one is given.
 */
pub fn update_velocity(update: &VelocityUpdate, valid: &IndexSpace, unew: &mut Patch) {
    let geometry = update.geometry;
    let rank = geometry.rank();
    let dt = update.dt;

    let difference = |d: Axis, c: Index, n: usize| {
        let uedge = update.uedge[d.number()];
        (uedge.get(d.shift(c, 1), n) - uedge.get(c, n)) / geometry.cell_size(d)
    };

    for c in valid.iter() {
        for n in 0..rank {
            let advective: f64 = Axis::active(rank)
                .map(|d| {
                    let umac = update.umac[d.number()];
                    0.5 * (umac.get(c, 0) + umac.get(d.shift(c, 1), 0)) * difference(d, c, n)
                })
                .sum();

            let background = match update.background {
                BackgroundAdvection::None => 0.0,
                BackgroundAdvection::Planar { w0, level, vertical } => {
                    w0.cell_centered(level, vertical.component(c)) * difference(vertical, c, n)
                }
                BackgroundAdvection::Mapped { w0mac, patch } => {
                    Axis::active(rank)
                        .map(|d| {
                            let w = &w0mac.faces(d)[patch];
                            0.5 * (w.get(c, 0) + w.get(d.shift(c, 1), 0)) * difference(d, c, n)
                        })
                        .sum()
                }
            };

            let mut value = update.uold.get(c, n) - dt * advective - dt * background + dt * update.force.get(c, n);

            if let Some(sponge) = update.sponge {
                value *= sponge.get(c, 0)
            }
            unew.set(c, n, value)
        }
    }
}
