use crate::base_state::Profile;
use crate::config::{EnthalpyPrediction, SpeciesPrediction};
use crate::index_space::{Axis, Index, IndexSpace};
use crate::layout::ComponentLayout;
use crate::patch::Patch;
use super::prediction::FaceBackground;




/**
 * The background enthalpy density on faces, as used to restore the flux of
 * a predicted perturbation. In spherical geometry it is either mapped
 * directly, or formed from the mapped density and specific enthalpy.
 */
#[derive(Clone, Copy)]
pub enum EnthalpyBackground<'a> {
    Direct(FaceBackground<'a>),
    Product(FaceBackground<'a>, FaceBackground<'a>),
}

impl<'a> EnthalpyBackground<'a> {
    pub fn at(&self, axis: Axis, f: Index) -> f64 {
        match self {
            EnthalpyBackground::Direct(rhoh0) => rhoh0.at(axis, f),
            EnthalpyBackground::Product(rho0, h0) => rho0.at(axis, f) * h0.at(axis, f),
        }
    }
}




/**
 * Species fluxes on the valid faces of one box, from the predicted edge
 * states `sedge` and the full face velocity `umac`. The returned face
 * patches have the layout of the scalar state; the density flux is the sum
 * of the species fluxes, and the other components are zero.
 */
pub fn species_fluxes(
    kind: SpeciesPrediction,
    layout: &ComponentLayout,
    valid: &IndexSpace,
    sedge: &[&Patch],
    umac: &[&Patch],
    rho0: &FaceBackground) -> Vec<Patch>
{
    Axis::active(valid.rank())
        .map(|d| {
            let sedge = sedge[d.number()];
            let umac = umac[d.number()];

            Patch::from_slice_function(layout.num_components(), valid.faces(d), |f, p| {
                let e = sedge.get_slice(f);
                let u = umac.get(f, 0);
                let mut total = 0.0;

                for q in layout.species() {
                    p[q] = u * match kind {
                        SpeciesPrediction::RhoPrimeAndX => (rho0.at(d, f) + e[ComponentLayout::RHO]) * e[q],
                        SpeciesPrediction::RhoX => e[q],
                        SpeciesPrediction::RhoAndX => e[ComponentLayout::RHO] * e[q],
                    };
                    total += p[q];
                }
                p[ComponentLayout::RHO] = total;
            })
        })
        .collect()
}




/**
 * The mass flux through the vertical faces of one box relative to the
 * background: the density flux less the expansion velocity times the
 * predicted background density on the edge. Planar geometry only.
 */
pub fn eta_flux(
    valid: &IndexSpace,
    vertical: Axis,
    level: usize,
    density_flux: &Patch,
    w0: &Profile,
    rho0_predicted_edge: &Profile) -> Patch
{
    Patch::from_function(valid.faces(vertical), |f| {
        let r = vertical.component(f);
        density_flux.get(f, ComponentLayout::RHO) - w0.at(level, r) * rho0_predicted_edge.at(level, r)
    })
}




/**
 * The density on faces implied by the species edge states, for each way of
 * predicting them.
 */
pub fn edge_density(kind: SpeciesPrediction, layout: &ComponentLayout, e: &[f64], rho0: f64) -> f64 {
    match kind {
        SpeciesPrediction::RhoPrimeAndX => rho0 + e[ComponentLayout::RHO],
        SpeciesPrediction::RhoX => layout.species().map(|q| e[q]).sum(),
        SpeciesPrediction::RhoAndX => e[ComponentLayout::RHO],
    }
}




/**
 * Enthalpy fluxes on the valid faces of one box. The edge states must hold
 * the species prediction as well when specific enthalpy is predicted, since
 * the face density is then needed.
 */
pub fn enthalpy_fluxes(
    kind: EnthalpyPrediction,
    species_kind: SpeciesPrediction,
    layout: &ComponentLayout,
    valid: &IndexSpace,
    sedge: &[&Patch],
    umac: &[&Patch],
    rho0: &FaceBackground,
    rhoh0: &EnthalpyBackground) -> Vec<Patch>
{
    Axis::active(valid.rank())
        .map(|d| {
            let sedge = sedge[d.number()];
            let umac = umac[d.number()];

            Patch::from_slice_function(layout.num_components(), valid.faces(d), |f, p| {
                let e = sedge.get_slice(f);
                let u = umac.get(f, 0);

                p[ComponentLayout::RHOH] = u * match kind {
                    EnthalpyPrediction::RhoH => e[ComponentLayout::RHOH],
                    EnthalpyPrediction::RhoHPrime => rhoh0.at(d, f) + e[ComponentLayout::RHOH],
                    EnthalpyPrediction::H => edge_density(species_kind, layout, e, rho0.at(d, f)) * e[ComponentLayout::RHOH],
                };
            })
        })
        .collect()
}
