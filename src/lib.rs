//! Stratiflow is the advection and update engine of a low-Mach-number
//! solver for stratified flows, such as convection in stellar interiors. The
//! state (density, enthalpy density, partial densities of the species, and
//! velocity) lives on a block-structured hierarchy of refinement levels, and
//! moves relative to a one-dimensional background (base) state which may
//! itself be expanding.
//!
//! Each step predicts face velocities and face states with an unsplit
//! Godunov scheme using piecewise-linear or piecewise-parabolic
//! reconstruction, assembles conservative fluxes, updates the state with
//! floors on the species, and keeps coarse levels consistent with finer ones
//! by refluxing or by averaging down face fluxes. The elliptic projection,
//! the microphysics, and the evolution of the background are supplied by the
//! caller through the traits in `collaborator` and the snapshots in
//! `base_state`.

pub mod advection;
pub mod base_state;
pub mod boundary;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod field;
pub mod geometry;
pub mod hierarchy;
pub mod hydro;
pub mod index_space;
pub mod layout;
pub mod patch;
pub mod reflux;
pub mod substrate;

pub use advection::AdvectionEngine;
pub use config::AdvectionConfig;
pub use error::{Error, Result};
