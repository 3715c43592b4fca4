//! The quantities actually predicted to faces. The scalar state holds
//! conserved densities, but the edge predictor may work on the density
//! perturbation and mass fractions, or on the enthalpy perturbation or
//! specific enthalpy, which are smoother in a stratified background.

use std::ops::Range;
use crate::base_state::Profile;
use crate::config::{EnthalpyPrediction, SpeciesPrediction};
use crate::field::EdgeField;
use crate::index_space::{Axis, Index};
use crate::layout::ComponentLayout;
use crate::patch::Patch;




/**
 * A background quantity as seen from the cells of one box: a height profile
 * in planar geometry, or the quantity mapped onto the cells in spherical
 * geometry.
 */
#[derive(Clone, Copy)]
pub enum CellBackground<'a> {
    Planar { profile: &'a Profile, level: usize, vertical: Axis },
    Mapped(&'a Patch),
}

impl<'a> CellBackground<'a> {
    pub fn at(&self, c: Index) -> f64 {
        match *self {
            CellBackground::Planar { profile, level, vertical } => profile.at(level, vertical.component(c)),
            CellBackground::Mapped(patch) => patch.get(clamp_to(patch, c), 0),
        }
    }
}




/**
 * A background quantity on the faces of one box, centered in time between
 * the old and new snapshots. In planar geometry faces normal to the vertical
 * axis read the edge profile and the others read the cell profile of their
 * row; in spherical geometry the quantity is mapped onto every face.
 */
#[derive(Clone, Copy)]
pub enum FaceBackground<'a> {
    Planar {
        cell: (&'a Profile, &'a Profile),
        edge: (&'a Profile, &'a Profile),
        level: usize,
        vertical: Axis,
    },
    Mapped {
        faces: (&'a EdgeField, &'a EdgeField),
        patch: usize,
    },
}

impl<'a> FaceBackground<'a> {
    pub fn at(&self, axis: Axis, f: Index) -> f64 {
        match *self {
            FaceBackground::Planar { cell, edge, level, vertical } => {
                let r = vertical.component(f);
                let (old, new) = if axis == vertical { edge } else { cell };
                0.5 * (old.at(level, r) + new.at(level, r))
            }
            FaceBackground::Mapped { faces: (old, new), patch } => {
                let old = &old.faces(axis)[patch];
                let new = &new.faces(axis)[patch];
                0.5 * (old.get(clamp_to(old, f), 0) + new.get(clamp_to(new, f), 0))
            }
        }
    }
}




/**
 * The nearest index to `c` within a patch. Mapped background fields may
 * carry fewer ghost cells than the state.
 */
fn clamp_to(patch: &Patch, c: Index) -> Index {
    let space = patch.index_space();
    Axis::ALL.iter().fold(c, |c, &axis| {
        let r = space.range(axis);
        axis.with(c, axis.component(c).clamp(r.start, r.end - 1))
    })
}




/**
 * A contiguous set of components predicted together.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredictedGroup {
    pub components: Range<usize>,
    pub conservative: bool,
    pub forced: bool,
}




/**
 * The component groups predicted for the species, in the order they are
 * predicted. Density is predicted alongside the species unless the partial
 * densities themselves are predicted.
 */
pub fn species_groups(kind: SpeciesPrediction, layout: &ComponentLayout) -> Vec<PredictedGroup> {
    let rho = ComponentLayout::RHO..ComponentLayout::RHO + 1;

    match kind {
        SpeciesPrediction::RhoPrimeAndX => vec![
            PredictedGroup { components: rho, conservative: false, forced: false },
            PredictedGroup { components: layout.species(), conservative: false, forced: false },
        ],
        SpeciesPrediction::RhoX => vec![
            PredictedGroup { components: layout.species(), conservative: true, forced: true },
        ],
        SpeciesPrediction::RhoAndX => vec![
            PredictedGroup { components: rho, conservative: true, forced: false },
            PredictedGroup { components: layout.species(), conservative: false, forced: false },
        ],
    }
}




/**
 * The enthalpy component group. Forcing applies when the predicted quantity
 * is the enthalpy density or its perturbation.
 */
pub fn enthalpy_group(kind: EnthalpyPrediction) -> PredictedGroup {
    let components = ComponentLayout::RHOH..ComponentLayout::RHOH + 1;

    match kind {
        EnthalpyPrediction::RhoH => PredictedGroup { components, conservative: true, forced: true },
        EnthalpyPrediction::RhoHPrime => PredictedGroup { components, conservative: false, forced: true },
        EnthalpyPrediction::H => PredictedGroup { components, conservative: false, forced: false },
    }
}




/**
 * Convert a ghosted state patch, in place, to the quantities predicted for
 * the species: `rho - rho0` and mass fractions, partial densities (no
 * change), or density and mass fractions.
 */
pub fn to_species_prediction(kind: SpeciesPrediction, layout: &ComponentLayout, s: &mut Patch, rho0: &CellBackground) {
    if kind == SpeciesPrediction::RhoX {
        return
    }
    let space = s.index_space().clone();

    for c in space.iter() {
        let p = s.get_slice_mut(c);
        let rho = p[ComponentLayout::RHO];

        for q in layout.species() {
            p[q] /= rho
        }
        if kind == SpeciesPrediction::RhoPrimeAndX {
            p[ComponentLayout::RHO] = rho - rho0.at(c)
        }
    }
}




/**
 * Convert a ghosted state patch, in place, to the quantity predicted for the
 * enthalpy.
 */
pub fn to_enthalpy_prediction(kind: EnthalpyPrediction, s: &mut Patch, rhoh0: &CellBackground) {
    let space = s.index_space().clone();

    for c in space.iter() {
        let p = s.get_slice_mut(c);

        match kind {
            EnthalpyPrediction::RhoH => {}
            EnthalpyPrediction::RhoHPrime => p[ComponentLayout::RHOH] -= rhoh0.at(c),
            EnthalpyPrediction::H => p[ComponentLayout::RHOH] /= p[ComponentLayout::RHO],
        }
    }
}




/**
 * The forcing used in the prediction of a set of groups: a copy of `force`
 * with every component outside the forced groups set to zero.
 */
pub fn prediction_force(groups: &[PredictedGroup], force: &Patch) -> Patch {
    let mut result = Patch::zeros(force.num_fields(), force.index_space().clone());

    for group in groups.iter().filter(|g| g.forced) {
        result.copy_fields_from(force, group.components.clone())
    }
    result
}
