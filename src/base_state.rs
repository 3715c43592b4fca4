//! Time-tagged, read-only snapshots of the one-dimensional background
//! (base) state.
//!
//! The background is supplied by the base-state evolution, which is outside
//! this crate. Profiles are indexed by level and by height cell (or edge) of
//! that level. In spherical geometry the evolution also supplies the
//! profiles mapped onto the Cartesian cells and faces of each level, which
//! is what the advection kernels read there.

use std::marker::PhantomData;
use crate::error::{Error, Result};
use crate::field::{EdgeField, LevelField};
use crate::hierarchy::Hierarchy;
use crate::index_space::Axis;




/// Where the samples of a profile sit within a height cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Centering {
    Cell,
    Edge,
}




/**
 * A radial or vertical profile, one array per level.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    values: Vec<Vec<f64>>,
}

impl Profile {

    /**
     * A profile from its samples on each level. Every level needs at least
     * one sample.
     */
    pub fn new(values: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(level) = values.iter().position(Vec::is_empty) {
            return Err(Error::EmptyProfile { level })
        }
        Ok(Self { values })
    }

    /**
     * Sample a function of height at the cell centers (or edges) of every
     * level of the hierarchy, along the given axis.
     */
    pub fn from_function<F>(hierarchy: &Hierarchy, axis: Axis, centering: Centering, f: F) -> Self
    where
        F: Fn(f64) -> f64
    {
        let values = hierarchy
            .levels()
            .iter()
            .map(|level| {
                let geometry = level.geometry();
                let r = geometry.domain().range(axis);
                let dr = geometry.cell_size(axis);
                let z0 = geometry.lower_corner(axis);

                match centering {
                    Centering::Cell => (r.start..r.end).map(|i| f(z0 + (i as f64 + 0.5) * dr)).collect(),
                    Centering::Edge => (r.start..=r.end).map(|i| f(z0 + i as f64 * dr)).collect(),
                }
            })
            .collect();
        Self { values }
    }

    pub fn uniform(hierarchy: &Hierarchy, axis: Axis, centering: Centering, value: f64) -> Self {
        Self::from_function(hierarchy, axis, centering, |_| value)
    }

    pub fn level(&self, level: usize) -> &[f64] {
        &self.values[level]
    }

    /**
     * Value at height index `r` of a level. Indexes beyond either end of the
     * profile take the end value.
     */
    pub fn at(&self, level: usize, r: i64) -> f64 {
        let v = &self.values[level];
        v[r.clamp(0, v.len() as i64 - 1) as usize]
    }

    /**
     * Arithmetic mean of two profiles, sample by sample.
     */
    pub fn average(&self, other: &Profile) -> Profile {
        let values = self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a.iter().zip(b).map(|(a, b)| 0.5 * (a + b)).collect())
            .collect();
        Profile { values }
    }
}




/**
 * Background fields mapped onto the Cartesian mesh, for spherical geometry.
 * The face maps are face-centered fields with a single component.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct SphericalMaps {
    pub rho0_cart: Vec<LevelField>,
    pub rhoh0_cart: Vec<LevelField>,
    pub p0_cart: Vec<LevelField>,
    pub rho0mac: Vec<EdgeField>,
    pub rhoh0mac: Vec<EdgeField>,
    pub h0mac: Vec<EdgeField>,
}




/// Marker for the background at the start of the step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Old;

/// Marker for the background at the end of the step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct New;




/**
 * The background state at one time level. The epoch parameter (`Old` or
 * `New`) makes the temporal slice part of the type, so that a pair cannot be
 * assembled the wrong way around.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct BaseStateSnapshot<E> {
    pub time: f64,
    pub rho0: Profile,
    pub rho0_edge: Profile,
    pub rhoh0: Profile,
    pub rhoh0_edge: Profile,
    pub p0: Profile,
    pub spherical: Option<SphericalMaps>,
    epoch: PhantomData<E>,
}

impl<E> BaseStateSnapshot<E> {

    pub fn new(time: f64, rho0: Profile, rho0_edge: Profile, rhoh0: Profile, rhoh0_edge: Profile, p0: Profile) -> Self {
        Self {
            time,
            rho0,
            rho0_edge,
            rhoh0,
            rhoh0_edge,
            p0,
            spherical: None,
            epoch: PhantomData,
        }
    }

    pub fn with_spherical_maps(mut self, maps: SphericalMaps) -> Self {
        self.spherical = Some(maps);
        self
    }

    pub fn spherical_maps(&self) -> Result<&SphericalMaps> {
        self.spherical.as_ref().ok_or(Error::MissingSphericalMaps)
    }
}




/**
 * The background expansion velocity over the step. The planar form is an
 * edge-centered profile; the spherical form is the velocity mapped onto cell
 * centers (one component per axis) and onto faces (the normal component).
 */
#[derive(Clone, Debug, PartialEq)]
pub struct ExpansionVelocity {
    pub w0: Profile,
    pub w0_cart: Option<Vec<LevelField>>,
    pub w0mac: Option<Vec<EdgeField>>,
}

impl ExpansionVelocity {

    pub fn planar(w0: Profile) -> Self {
        Self { w0, w0_cart: None, w0mac: None }
    }

    pub fn spherical(w0: Profile, w0_cart: Vec<LevelField>, w0mac: Vec<EdgeField>) -> Self {
        Self { w0, w0_cart: Some(w0_cart), w0mac: Some(w0mac) }
    }

    /**
     * Planar expansion velocity at the center of height cell `r`.
     */
    pub fn cell_centered(&self, level: usize, r: i64) -> f64 {
        0.5 * (self.w0.at(level, r) + self.w0.at(level, r + 1))
    }

    pub fn mapped(&self) -> Result<(&[LevelField], &[EdgeField])> {
        match (&self.w0_cart, &self.w0mac) {
            (Some(cart), Some(mac)) => Ok((cart, mac)),
            _ => Err(Error::MissingSphericalMaps),
        }
    }
}




/**
 * The old and new background snapshots of a step, with the expansion
 * velocity of the step. This is the only way the advection kernels see the
 * background.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundPair {
    pub old: BaseStateSnapshot<Old>,
    pub new: BaseStateSnapshot<New>,
    pub expansion: ExpansionVelocity,
}

impl BackgroundPair {

    pub fn new(old: BaseStateSnapshot<Old>, new: BaseStateSnapshot<New>, expansion: ExpansionVelocity) -> Self {
        debug_assert!(old.time <= new.time, "background snapshots are out of order");
        Self { old, new, expansion }
    }

    /**
     * A pair for a background which does not change over the step.
     */
    pub fn steady(time: f64, rho0: Profile, rho0_edge: Profile, rhoh0: Profile, rhoh0_edge: Profile, p0: Profile, expansion: ExpansionVelocity) -> Self {
        let old = BaseStateSnapshot::new(time, rho0.clone(), rho0_edge.clone(), rhoh0.clone(), rhoh0_edge.clone(), p0.clone());
        let new = BaseStateSnapshot::new(time, rho0, rho0_edge, rhoh0, rhoh0_edge, p0);
        Self::new(old, new, expansion)
    }
}
