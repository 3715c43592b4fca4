use std::ops::Range;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};




/**
 * The fixed, ordered mapping from physical quantity to component index in
 * the scalar state: density, enthalpy density, then the partial densities of
 * each species.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLayout {
    num_species: usize,
}




/// Which scalar quantity an update acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateTarget {
    Enthalpy,
    Species,
}




// ============================================================================
impl ComponentLayout {

    pub const RHO: usize = 0;
    pub const RHOH: usize = 1;
    pub const FIRST_SPECIES: usize = 2;

    pub fn new(num_species: usize) -> Self {
        Self { num_species }
    }

    pub fn num_species(&self) -> usize {
        self.num_species
    }

    pub fn num_components(&self) -> usize {
        Self::FIRST_SPECIES + self.num_species
    }

    pub fn species(&self) -> Range<usize> {
        Self::FIRST_SPECIES..Self::FIRST_SPECIES + self.num_species
    }

    /**
     * Resolve the quantity updated by a request for `count` components
     * starting at `start`. Only the enthalpy component alone, or the full set
     * of species, are updatable.
     */
    pub fn update_target(&self, start: usize, count: usize) -> Result<UpdateTarget> {
        if start == Self::RHOH && count == 1 {
            Ok(UpdateTarget::Enthalpy)
        } else if start == Self::FIRST_SPECIES && count == self.num_species {
            Ok(UpdateTarget::Species)
        } else {
            Err(Error::UnrecognizedUpdateTarget { start, end: start + count })
        }
    }

    /**
     * Check that a component range lies within the scalar state.
     */
    pub fn check_range(&self, components: &Range<usize>) -> Result<()> {
        if components.start > components.end || components.end > self.num_components() {
            Err(Error::InvalidComponentRange {
                start: components.start,
                end: components.end,
                available: self.num_components(),
            })
        } else {
            Ok(())
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn update_targets_are_enthalpy_or_all_species() {
        let layout = ComponentLayout::new(3);
        assert_eq!(layout.update_target(1, 1), Ok(UpdateTarget::Enthalpy));
        assert_eq!(layout.update_target(2, 3), Ok(UpdateTarget::Species));
        assert_eq!(layout.update_target(0, 1), Err(Error::UnrecognizedUpdateTarget { start: 0, end: 1 }));
        assert!(layout.update_target(2, 2).is_err());
    }

    #[test]
    fn component_ranges_are_checked() {
        let layout = ComponentLayout::new(2);
        assert_eq!(layout.num_components(), 4);
        assert!(layout.check_range(&(0..4)).is_ok());
        assert!(layout.check_range(&(2..5)).is_err());
    }
}
