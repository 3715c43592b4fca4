use thiserror::Error;
use crate::boundary::Side;
use crate::index_space::Axis;




/**
 * Errors raised by the advection engine. Every variant is a configuration or
 * wiring error: none of them is transient, and none is retried.
 */
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("spherical geometry is only valid in three dimensions (got {0})")]
    SphericalRequiresThreeDimensions(usize),

    #[error("unsupported dimension {0}: must be 1, 2, or 3")]
    UnsupportedDimension(usize),

    #[error("configured for {config} dimensions but the mesh has rank {mesh}")]
    DimensionMismatch { config: usize, mesh: usize },

    #[error("no scalar update is defined for components {start}..{end}")]
    UnrecognizedUpdateTarget { start: usize, end: usize },

    #[error("component range {start}..{end} exceeds the {available} components of the field")]
    InvalidComponentRange { start: usize, end: usize, available: usize },

    #[error("field has {found} levels but the hierarchy has {expected}")]
    MismatchedLevels { expected: usize, found: usize },

    #[error("spherical geometry requires the mapped base state fields")]
    MissingSphericalMaps,

    #[error("at least one species is required")]
    NoSpecies,

    #[error("base cutoff density must be non-negative (got {0})")]
    NegativeCutoffDensity(f64),

    #[error("projection failed: {0}")]
    Projection(String),

    #[error("inflow boundary on the {side:?} side of axis {axis:?} needs prescribed boundary values")]
    MissingInflowValues { axis: Axis, side: Side },

    #[error("component {component} of level {level} is not finite after the update")]
    NonFiniteState { level: usize, component: usize },

    #[error("level {level} of the profile has no samples")]
    EmptyProfile { level: usize },
}




pub type Result<T> = std::result::Result<T, Error>;
