use std::ops::Deref;
use log::warn;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::index_space::Axis;




/// Coordinate system of the background stratification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coordinates {
    /// The background varies along the last active axis.
    Planar,
    /// The background varies with distance from the domain center.
    Spherical,
}




/// Scheme used to reconstruct face states from cell averages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reconstruction {
    PiecewiseLinear,
    Ppm,
    PpmExtremumPreserving,
}

impl Reconstruction {
    pub fn is_parabolic(self) -> bool {
        !matches!(self, Reconstruction::PiecewiseLinear)
    }
}




/// Strategy that keeps coarse levels consistent with the fine fluxes.
/// Exactly one is used per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    Reflux,
    AverageDownFaces,
}




/// Which quantities are predicted to faces when advecting the species.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeciesPrediction {
    /// Perturbation density `rho - rho0` and mass fractions `X`.
    RhoPrimeAndX,
    /// Partial densities `rho X`.
    RhoX,
    /// Full density and mass fractions.
    RhoAndX,
}




/// Which quantity is predicted to faces when advecting the enthalpy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnthalpyPrediction {
    RhoH,
    /// Perturbation `rhoh - rhoh0`.
    RhoHPrime,
    /// Specific enthalpy `h = rhoh / rho`.
    H,
}




/**
 * Run configuration of the advection engine. Any combination of values can be
 * constructed or deserialized; `validate` decides whether the engine accepts
 * it.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvectionConfig {
    pub dimension: usize,
    pub coordinates: Coordinates,
    pub reconstruction: Reconstruction,
    pub trace_forces: bool,
    pub consistency: Consistency,
    pub species_prediction: SpeciesPrediction,
    pub enthalpy_prediction: EnthalpyPrediction,
    pub base_cutoff_density: f64,
    pub do_eos_h_above_cutoff: bool,
    pub do_sponge: bool,
    pub use_exact_base_state: bool,
    pub num_species: usize,
}




impl Default for AdvectionConfig {
    fn default() -> Self {
        Self {
            dimension: 2,
            coordinates: Coordinates::Planar,
            reconstruction: Reconstruction::Ppm,
            trace_forces: false,
            consistency: Consistency::Reflux,
            species_prediction: SpeciesPrediction::RhoPrimeAndX,
            enthalpy_prediction: EnthalpyPrediction::RhoHPrime,
            base_cutoff_density: 3.0e6,
            do_eos_h_above_cutoff: true,
            do_sponge: false,
            use_exact_base_state: false,
            num_species: 1,
        }
    }
}




// ============================================================================
impl AdvectionConfig {

    /**
     * Check the configuration for combinations the engine cannot run, and
     * return the accepted configuration.
     */
    pub fn validate(self) -> Result<ValidatedConfig> {
        if !(1..=3).contains(&self.dimension) {
            return Err(Error::UnsupportedDimension(self.dimension))
        }
        if self.coordinates == Coordinates::Spherical && self.dimension != 3 {
            return Err(Error::SphericalRequiresThreeDimensions(self.dimension))
        }
        if self.num_species == 0 {
            return Err(Error::NoSpecies)
        }
        if self.base_cutoff_density < 0.0 {
            return Err(Error::NegativeCutoffDensity(self.base_cutoff_density))
        }
        if self.trace_forces && !self.reconstruction.is_parabolic() {
            warn!("force tracing has no effect with piecewise-linear reconstruction");
        }
        if self.use_exact_base_state && self.coordinates == Coordinates::Planar {
            warn!("the exact base state option only affects spherical geometry");
        }
        Ok(ValidatedConfig(self))
    }
}




/**
 * A configuration which has passed validation. It dereferences to the
 * underlying `AdvectionConfig`.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedConfig(AdvectionConfig);

impl ValidatedConfig {

    /**
     * The axis along which the planar background varies.
     */
    pub fn vertical_axis(&self) -> Axis {
        Axis::from_number(self.0.dimension - 1)
    }

    pub fn is_spherical(&self) -> bool {
        self.0.coordinates == Coordinates::Spherical
    }

    /**
     * Whether the forcing is traced through the parabolic reconstruction.
     */
    pub fn traces_forces(&self) -> bool {
        self.0.trace_forces && self.0.reconstruction.is_parabolic()
    }
}

impl Deref for ValidatedConfig {
    type Target = AdvectionConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
