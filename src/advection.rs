//! The advection engine: drives the kernels of `crate::hydro` over every box
//! of every level, fills ghost cells and faces through the mesh substrate,
//! and keeps coarse levels consistent with the fine fluxes.
//!
//! One step runs, in order: the MAC velocity prediction, the projection of
//! the MAC velocity, the prediction and flux assembly of the species, the
//! species update, the prediction and flux assembly of the enthalpy, the
//! enthalpy update, and finally the velocity update. Each stage is also
//! callable on its own.

use std::ops::Range;
use log::{debug, info, warn};
use rayon::prelude::*;
use crate::base_state::{BackgroundPair, Profile};
use crate::boundary::{ComponentBc, PhysicalBoundaries};
use crate::collaborator::{projection_boundaries, Microphysics, Projection, Tolerance};
use crate::config::{Consistency, ValidatedConfig};
use crate::error::{Error, Result};
use crate::field::{check_levels, EdgeField, LevelField};
use crate::hierarchy::Hierarchy;
use crate::hydro::LevelContext;
use crate::hydro::edge_scal::{predict_edge_states, EdgeScalarRequest};
use crate::hydro::flux::{eta_flux, enthalpy_fluxes, species_fluxes, EnthalpyBackground};
use crate::hydro::prediction::{
    enthalpy_group,
    prediction_force,
    species_groups,
    to_enthalpy_prediction,
    to_species_prediction,
    CellBackground,
    FaceBackground,
    PredictedGroup,
};
use crate::hydro::trans::{self, make_trans};
use crate::hydro::update::{
    update_enthalpy,
    update_species,
    update_velocity,
    BackgroundAdvection,
    PolicyCounts,
    ScalarUpdate,
    VelocityUpdate,
};
use crate::hydro::upwind::Expansion;
use crate::hydro::velpred::{predict_velocity, VelocityInputs};
use crate::index_space::Axis;
use crate::layout::{ComponentLayout, UpdateTarget};
use crate::patch::Patch;
use crate::reflux::FluxRegisters;
use crate::substrate::MeshSubstrate;




/// Number of ghost cells on the cell-centered copies the kernels read.
pub const NUM_GHOST: i64 = 4;




/// Face velocities below this fraction of the largest velocity count as
/// zero in the upwind selections.
const ZERO_VELOCITY_FRACTION: f64 = 1e-8;




/**
 * Which components of a cell field to predict to faces, and in which form.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgePrediction {
    pub components: Range<usize>,
    pub is_velocity: bool,
    pub conservative: bool,
}




/**
 * The inputs of a scalar update. `sflux` holds the fluxes assembled for the
 * step and `force` the scalar forcing at the valid cells.
 */
pub struct ScalarStep<'b> {
    pub sold: &'b [LevelField],
    pub sflux: &'b [EdgeField],
    pub force: &'b [LevelField],
    pub background: &'b BackgroundPair,
    pub dt: f64,
}




/**
 * The inputs of the velocity update. `uedge` holds the predicted edge
 * velocities and `umac` the projected MAC velocity without the expansion
 * velocity.
 */
pub struct VelocityStep<'b> {
    pub uold: &'b [LevelField],
    pub uedge: &'b [EdgeField],
    pub umac: &'b [EdgeField],
    pub force: &'b [LevelField],
    pub background: &'b BackgroundPair,
    pub sponge: Option<&'b [LevelField]>,
    pub dt: f64,
}




/**
 * What a scalar update did: its target, and how many cells the species
 * policy and the equation-of-state override acted on.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateSummary {
    pub target: UpdateTarget,
    pub floored: usize,
    pub repaired: usize,
    pub eos_cells: usize,
}




/**
 * Everything one full step reads. The velocity and scalar states must have
 * one field per level of the hierarchy; `coefficient` is the background
 * weighting handed to the projection.
 */
pub struct StepInputs<'b> {
    pub uold: &'b [LevelField],
    pub sold: &'b [LevelField],
    pub velocity_force: &'b [LevelField],
    pub scalar_force: &'b [LevelField],
    pub background: &'b BackgroundPair,
    pub coefficient: &'b [LevelField],
    pub sponge: Option<&'b [LevelField]>,
    pub rho0_predicted_edge: Option<&'b Profile>,
    pub dt: f64,
}




/**
 * Everything one full step produces. `umac` is the projected MAC velocity
 * with the expansion velocity included, and `etarhoflux` the mass flux
 * relative to the background, for the base-state evolution.
 */
#[derive(Clone, Debug)]
pub struct StepOutputs {
    pub unew: Vec<LevelField>,
    pub snew: Vec<LevelField>,
    pub umac: Vec<EdgeField>,
    pub sflux: Vec<EdgeField>,
    pub etarhoflux: Vec<EdgeField>,
    pub pressure_correction: Vec<LevelField>,
    pub species: UpdateSummary,
    pub enthalpy: UpdateSummary,
}




/**
 * A background quantity on cells, before it is narrowed to one box.
 */
#[derive(Clone, Copy)]
enum CellSource<'b> {
    Planar(&'b Profile),
    Mapped(&'b [LevelField]),
}

impl<'b> CellSource<'b> {
    fn on_box(self, level: usize, patch: usize, vertical: Axis) -> CellBackground<'b> {
        match self {
            CellSource::Planar(profile) => CellBackground::Planar { profile, level, vertical },
            CellSource::Mapped(fields) => CellBackground::Mapped(&fields[level].patches()[patch]),
        }
    }
}




/**
 * A background quantity on faces, before it is narrowed to one box.
 */
#[derive(Clone, Copy)]
enum FaceSource<'b> {
    Planar {
        cell: (&'b Profile, &'b Profile),
        edge: (&'b Profile, &'b Profile),
    },
    Mapped(&'b [EdgeField], &'b [EdgeField]),
}

impl<'b> FaceSource<'b> {
    fn on_box(self, level: usize, patch: usize, vertical: Axis) -> FaceBackground<'b> {
        match self {
            FaceSource::Planar { cell, edge } => FaceBackground::Planar { cell, edge, level, vertical },
            FaceSource::Mapped(old, new) => FaceBackground::Mapped { faces: (&old[level], &new[level]), patch },
        }
    }
}




/**
 * Drives one advection step of the scalar and velocity state over all
 * levels of the hierarchy owned by the substrate.
 */
pub struct AdvectionEngine<'a, S: MeshSubstrate> {
    config: ValidatedConfig,
    substrate: &'a S,
    boundaries: PhysicalBoundaries,
    layout: ComponentLayout,
    scalar_bcs: Vec<ComponentBc>,
    velocity_bcs: Vec<ComponentBc>,
    registers: FluxRegisters,
}




// ============================================================================
impl<'a, S: MeshSubstrate> AdvectionEngine<'a, S> {

    /**
     * Create an engine for the hierarchy of the given substrate. The mesh
     * rank must match the configured dimension. Boundary codes of every
     * component are derived from `boundaries`. Inflow faces need prescribed
     * values, so a domain with an inflow face must be built with
     * `with_boundary_codes` instead.
     */
    pub fn new(config: ValidatedConfig, substrate: &'a S, boundaries: PhysicalBoundaries) -> Result<Self> {
        if let Some((axis, side)) = boundaries.first_inflow() {
            return Err(Error::MissingInflowValues { axis, side })
        }
        let rank = substrate.hierarchy().rank().min(config.dimension);
        let scalar_bcs = vec![boundaries.scalar_bc(0.0); ComponentLayout::new(config.num_species).num_components()];
        let velocity_bcs = Axis::active(rank).map(|axis| boundaries.velocity_bc(axis, 0.0)).collect();
        Self::with_boundary_codes(config, substrate, boundaries, scalar_bcs, velocity_bcs)
    }

    /**
     * Create an engine with explicit boundary codes: one per scalar
     * component, and one per velocity component.
     */
    pub fn with_boundary_codes(
        config: ValidatedConfig,
        substrate: &'a S,
        boundaries: PhysicalBoundaries,
        scalar_bcs: Vec<ComponentBc>,
        velocity_bcs: Vec<ComponentBc>) -> Result<Self>
    {
        let hierarchy = substrate.hierarchy();

        if hierarchy.rank() != config.dimension {
            return Err(Error::DimensionMismatch { config: config.dimension, mesh: hierarchy.rank() })
        }
        if config.consistency == Consistency::Reflux && hierarchy.num_levels() == 1 {
            warn!("reflux consistency on a single-level hierarchy has no effect");
        }
        let layout = ComponentLayout::new(config.num_species);
        let registers = FluxRegisters::new(hierarchy, layout.num_components());

        let engine = Self {
            config,
            substrate,
            boundaries,
            layout,
            scalar_bcs: Vec::new(),
            velocity_bcs: Vec::new(),
            registers,
        };
        engine.with_scalar_bcs(scalar_bcs)?.with_velocity_bcs(velocity_bcs)
    }

    /**
     * Replace the boundary codes of the scalar components, one per
     * component, e.g. to set inflow values.
     */
    pub fn with_scalar_bcs(mut self, bcs: Vec<ComponentBc>) -> Result<Self> {
        if bcs.len() != self.layout.num_components() {
            return Err(Error::InvalidComponentRange { start: 0, end: bcs.len(), available: self.layout.num_components() })
        }
        self.scalar_bcs = bcs;
        Ok(self)
    }

    /**
     * Replace the boundary codes of the velocity components, one per active
     * axis.
     */
    pub fn with_velocity_bcs(mut self, bcs: Vec<ComponentBc>) -> Result<Self> {
        if bcs.len() != self.config.dimension {
            return Err(Error::InvalidComponentRange { start: 0, end: bcs.len(), available: self.config.dimension })
        }
        self.velocity_bcs = bcs;
        Ok(self)
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn layout(&self) -> &ComponentLayout {
        &self.layout
    }

    pub fn registers(&self) -> &FluxRegisters {
        &self.registers
    }

    pub fn hierarchy(&self) -> &'a Hierarchy {
        self.substrate.hierarchy()
    }

    /**
     * Face-centered fields with one component per scalar, on every level, to
     * receive the fluxes of a step.
     */
    pub fn new_fluxes(&self) -> Vec<EdgeField> {
        self.edge_fields(self.layout.num_components(), 0)
    }




    /**
     * Predict the MAC velocity at the half time from the old cell velocity
     * and the velocity forcing. The result is the transported velocity: the
     * expansion velocity is used for upwinding but not included. Ghost faces
     * are filled.
     */
    pub fn advance_premac(&self, uold: &[LevelField], force: &[LevelField], background: &BackgroundPair, dt: f64) -> Result<Vec<EdgeField>> {
        let hierarchy = self.hierarchy();
        check_levels(uold, hierarchy)?;
        check_levels(force, hierarchy)?;

        let rank = hierarchy.rank();
        let time = background.old.time;
        let w0mac = self.ghosted_w0mac(background)?;
        let utilde = self.ghosted(uold, time, &self.velocity_bcs);
        let ufull = self.full_velocity(&utilde, background, time)?;
        let force = self.ghosted(force, time, &self.force_bcs(rank));
        let eps = zero_velocity(uold.iter().map(|u| u.max_abs(0..rank)).fold(0.0, f64::max));

        info!("predicting MAC velocity on {} level(s)", hierarchy.num_levels());

        let mut utrans = Vec::with_capacity(hierarchy.num_levels());

        for level in 0..hierarchy.num_levels() {
            let ctx = self.context(level, self.expansion(background, w0mac.as_deref(), level), dt, eps);
            let per_box: Vec<Vec<Patch>> = hierarchy
                .level(level)
                .boxes()
                .par_iter()
                .enumerate()
                .map(|(b, valid)| {
                    Axis::active(rank)
                        .map(|d| {
                            let mut faces = make_trans(&ctx, b, valid, &utilde[level].patches()[b], &ufull[level].patches()[b], d);
                            let space = faces.index_space().clone();
                            trans::add_w0(&mut faces, &space, d, &ctx.expansion, b, 1.0);
                            faces
                        })
                        .collect()
                })
                .collect();

            let mut edges = EdgeField::zeros(hierarchy.level(level), 1, 1);
            store_faces(&mut edges, per_box, 0..1);
            utrans.push(edges);
        }
        self.substrate.fill_face_ghost(&mut utrans);

        let mut umac = Vec::with_capacity(hierarchy.num_levels());

        for level in 0..hierarchy.num_levels() {
            let ctx = self.context(level, self.expansion(background, w0mac.as_deref(), level), dt, eps);
            let per_box: Vec<Vec<Patch>> = hierarchy
                .level(level)
                .boxes()
                .par_iter()
                .enumerate()
                .map(|(b, valid)| {
                    let inputs = VelocityInputs {
                        utilde: &utilde[level].patches()[b],
                        ufull: &ufull[level].patches()[b],
                        trans: Axis::active(rank).map(|d| &utrans[level].faces(d)[b]).collect(),
                        force: &force[level].patches()[b],
                        trace_forces: self.config.traces_forces(),
                    };
                    predict_velocity(&ctx, b, valid, &inputs)
                })
                .collect();

            let mut edges = EdgeField::zeros(hierarchy.level(level), 1, 1);
            store_faces(&mut edges, per_box, 0..1);
            umac.push(edges);
        }
        self.substrate.fill_face_ghost(&mut umac);
        Ok(umac)
    }

    /**
     * Add `mult` times the expansion velocity to a MAC velocity on the valid
     * faces of every level, then refill its ghost faces. With `mult = 1`
     * this turns the transported velocity into the full one; `-1` undoes
     * it.
     */
    pub fn add_w0(&self, umac: &mut [EdgeField], background: &BackgroundPair, mult: f64) -> Result<()> {
        let hierarchy = self.hierarchy();
        check_levels(umac, hierarchy)?;

        let w0mac = self.ghosted_w0mac(background)?;

        for (level, edges) in umac.iter_mut().enumerate() {
            let expansion = self.expansion(background, w0mac.as_deref(), level);
            let valid = edges.valid().to_vec();

            for d in Axis::active(hierarchy.rank()) {
                edges.faces_mut(d)
                    .par_iter_mut()
                    .zip(valid.par_iter())
                    .enumerate()
                    .for_each(|(b, (faces, valid))| trans::add_w0(faces, &valid.faces(d), d, &expansion, b, mult));
            }
        }
        self.substrate.fill_face_ghost(umac);
        Ok(())
    }

    /**
     * Predict the requested components of a cell field to the valid faces
     * of every level, advected by `umac`, and write them into `sedge`. The
     * state and forcing must carry at least `NUM_GHOST` filled ghost cells
     * and `umac` at least one ghost face. In velocity mode the faces are
     * averaged down afterwards.
     */
    pub fn make_edge_scal(
        &self,
        state: &[LevelField],
        sedge: &mut [EdgeField],
        umac: &[EdgeField],
        force: &[LevelField],
        prediction: &EdgePrediction,
        dt: f64) -> Result<()>
    {
        let hierarchy = self.hierarchy();
        check_levels(state, hierarchy)?;
        check_levels(sedge, hierarchy)?;
        check_levels(umac, hierarchy)?;
        check_levels(force, hierarchy)?;

        let num_fields = state[0].num_fields();
        if prediction.components.end > num_fields || prediction.components.end > sedge[0].num_fields() {
            return Err(Error::InvalidComponentRange {
                start: prediction.components.start,
                end: prediction.components.end,
                available: num_fields.min(sedge[0].num_fields()),
            })
        }
        debug_assert!(state.iter().all(|s| s.num_ghost() >= NUM_GHOST), "edge prediction needs ghosted state");
        debug_assert!(umac.iter().all(|u| u.num_ghost() >= 1), "edge prediction needs MAC ghost faces");

        let rank = hierarchy.rank();
        let eps = zero_velocity(max_face_speed(umac));
        let request = EdgeScalarRequest {
            components: prediction.components.clone(),
            bcs: if prediction.is_velocity { &self.velocity_bcs } else { &self.scalar_bcs },
            is_velocity: prediction.is_velocity,
            conservative: prediction.conservative,
            trace_forces: self.config.traces_forces(),
        };

        for level in 0..hierarchy.num_levels() {
            let ctx = self.context(level, Expansion::Still, dt, eps);
            let per_box: Vec<Vec<Patch>> = hierarchy
                .level(level)
                .boxes()
                .par_iter()
                .enumerate()
                .map(|(b, valid)| {
                    let umac: Vec<&Patch> = Axis::active(rank).map(|d| &umac[level].faces(d)[b]).collect();
                    predict_edge_states(&ctx, valid, &state[level].patches()[b], &umac, &force[level].patches()[b], &request)
                })
                .collect();

            store_faces(&mut sedge[level], per_box, prediction.components.clone());
        }

        if prediction.is_velocity {
            self.substrate.average_down_faces(sedge);
        }
        Ok(())
    }

    /**
     * Predict the species (and the density, depending on the prediction
     * form) to faces from the old state. Returns edge states with the layout
     * of the scalar state, in the predicted form. `umac` is the full MAC
     * velocity.
     */
    pub fn predict_species(
        &self,
        sold: &[LevelField],
        umac: &[EdgeField],
        force: &[LevelField],
        background: &BackgroundPair,
        dt: f64) -> Result<Vec<EdgeField>>
    {
        let hierarchy = self.hierarchy();
        check_levels(sold, hierarchy)?;

        let kind = self.config.species_prediction;
        let groups = species_groups(kind, &self.layout);
        let rho0 = self.rho0_cells(background)?;
        let layout = self.layout;
        let vertical = self.config.vertical_axis();
        let mut state = self.ghosted(sold, background.old.time, &self.scalar_bcs);

        for (level, field) in state.iter_mut().enumerate() {
            field.patches_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(b, patch)| to_species_prediction(kind, &layout, patch, &rho0.on_box(level, b, vertical)));
        }

        info!("predicting species edge states ({:?})", kind);
        let mut sedge = self.edge_fields(self.layout.num_components(), 0);
        self.predict_groups(&state, &mut sedge, umac, force, &groups, background, dt)?;
        Ok(sedge)
    }

    /**
     * Predict the enthalpy to faces from the old state, in the configured
     * form, writing its component of `sedge`.
     */
    pub fn predict_enthalpy(
        &self,
        sold: &[LevelField],
        sedge: &mut [EdgeField],
        umac: &[EdgeField],
        force: &[LevelField],
        background: &BackgroundPair,
        dt: f64) -> Result<()>
    {
        let hierarchy = self.hierarchy();
        check_levels(sold, hierarchy)?;

        let kind = self.config.enthalpy_prediction;
        let rhoh0 = self.rhoh0_cells(background)?;
        let vertical = self.config.vertical_axis();
        let mut state = self.ghosted(sold, background.old.time, &self.scalar_bcs);

        for (level, field) in state.iter_mut().enumerate() {
            field.patches_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(b, patch)| to_enthalpy_prediction(kind, patch, &rhoh0.on_box(level, b, vertical)));
        }

        info!("predicting enthalpy edge states ({:?})", kind);
        self.predict_groups(&state, sedge, umac, force, &[enthalpy_group(kind)], background, dt)
    }

    /**
     * Assemble the species and density fluxes from the predicted edge
     * states and the full MAC velocity, writing them into `sflux`, and
     * return the mass flux relative to the background on the vertical faces
     * (zero in spherical geometry). The species and density accumulators of
     * the flux registers are reset and then receive the fluxes of every
     * level. Accumulated enthalpy fluxes are kept.
     */
    pub fn make_rho_x_flux(
        &mut self,
        sflux: &mut [EdgeField],
        sedge: &[EdgeField],
        umac: &[EdgeField],
        background: &BackgroundPair,
        rho0_predicted_edge: Option<&Profile>,
        dt: f64) -> Result<Vec<EdgeField>>
    {
        let hierarchy = self.hierarchy();
        check_levels(sflux, hierarchy)?;
        check_levels(sedge, hierarchy)?;
        check_levels(umac, hierarchy)?;

        let rank = hierarchy.rank();
        let kind = self.config.species_prediction;
        let layout = self.layout;
        let vertical = self.config.vertical_axis();
        let planar = !self.config.is_spherical();
        let rho0 = self.rho0_faces(background)?;
        let centered_edge = background.old.rho0_edge.average(&background.new.rho0_edge);
        let rho0_predicted_edge = rho0_predicted_edge.unwrap_or(&centered_edge);
        let w0 = &background.expansion.w0;
        let rho = ComponentLayout::RHO..ComponentLayout::RHO + 1;
        let mut etarhoflux = self.edge_fields(1, 0);

        info!("assembling species fluxes");
        self.registers.reset_components(layout.species());
        self.registers.reset_components(rho.clone());

        for level in 0..hierarchy.num_levels() {
            let per_box: Vec<(Vec<Patch>, Option<Patch>)> = hierarchy
                .level(level)
                .boxes()
                .par_iter()
                .enumerate()
                .map(|(b, valid)| {
                    let sedge: Vec<&Patch> = Axis::active(rank).map(|d| &sedge[level].faces(d)[b]).collect();
                    let umac: Vec<&Patch> = Axis::active(rank).map(|d| &umac[level].faces(d)[b]).collect();
                    let fluxes = species_fluxes(kind, &layout, valid, &sedge, &umac, &rho0.on_box(level, b, vertical));
                    let eta = if planar {
                        Some(eta_flux(valid, vertical, level, &fluxes[vertical.number()], w0, rho0_predicted_edge))
                    } else {
                        None
                    };
                    (fluxes, eta)
                })
                .collect();

            let (fluxes, eta): (Vec<_>, Vec<_>) = per_box.into_iter().unzip();
            store_faces(&mut sflux[level], fluxes.clone(), rho.clone());
            store_faces(&mut sflux[level], fluxes, layout.species());

            for (b, eta) in eta.into_iter().enumerate() {
                if let Some(eta) = eta {
                    etarhoflux[level].faces_mut(vertical)[b].copy_fields_from(&eta, 0..1)
                }
            }

            if self.config.consistency == Consistency::Reflux {
                self.registers.contribute(hierarchy, level, &sflux[level], layout.species(), dt);
                self.registers.contribute(hierarchy, level, &sflux[level], rho.clone(), dt);
            }
        }

        if self.config.consistency == Consistency::AverageDownFaces {
            self.substrate.average_down_faces(sflux);
            self.substrate.average_down_faces(&mut etarhoflux);
        }
        Ok(etarhoflux)
    }

    /**
     * Assemble the enthalpy fluxes from the predicted edge states and the
     * full MAC velocity, writing the enthalpy component of `sflux`. The
     * enthalpy accumulators of the flux registers are reset and then receive
     * the enthalpy fluxes of every level. Accumulated species fluxes are
     * kept.
     */
    pub fn make_rhoh_flux(
        &mut self,
        sflux: &mut [EdgeField],
        sedge: &[EdgeField],
        umac: &[EdgeField],
        background: &BackgroundPair,
        dt: f64) -> Result<()>
    {
        let hierarchy = self.hierarchy();
        check_levels(sflux, hierarchy)?;
        check_levels(sedge, hierarchy)?;
        check_levels(umac, hierarchy)?;

        let rank = hierarchy.rank();
        let kind = self.config.enthalpy_prediction;
        let species_kind = self.config.species_prediction;
        let layout = self.layout;
        let vertical = self.config.vertical_axis();
        let rho0 = self.rho0_faces(background)?;
        let rhoh0 = self.rhoh0_faces(background)?;
        let rhoh = ComponentLayout::RHOH..ComponentLayout::RHOH + 1;

        info!("assembling enthalpy fluxes");
        self.registers.reset_components(rhoh.clone());

        for level in 0..hierarchy.num_levels() {
            let per_box: Vec<Vec<Patch>> = hierarchy
                .level(level)
                .boxes()
                .par_iter()
                .enumerate()
                .map(|(b, valid)| {
                    let sedge: Vec<&Patch> = Axis::active(rank).map(|d| &sedge[level].faces(d)[b]).collect();
                    let umac: Vec<&Patch> = Axis::active(rank).map(|d| &umac[level].faces(d)[b]).collect();
                    let rho0 = rho0.on_box(level, b, vertical);
                    let rhoh0 = match rhoh0 {
                        EnthalpySource::Direct(rhoh0) => EnthalpyBackground::Direct(rhoh0.on_box(level, b, vertical)),
                        EnthalpySource::Product(rho0, h0) => {
                            EnthalpyBackground::Product(rho0.on_box(level, b, vertical), h0.on_box(level, b, vertical))
                        }
                    };
                    enthalpy_fluxes(kind, species_kind, &layout, valid, &sedge, &umac, &rho0, &rhoh0)
                })
                .collect();

            store_faces(&mut sflux[level], per_box, rhoh.clone());

            if self.config.consistency == Consistency::Reflux {
                self.registers.contribute(hierarchy, level, &sflux[level], rhoh.clone(), dt);
            }
        }

        if self.config.consistency == Consistency::AverageDownFaces {
            self.substrate.average_down_faces(sflux);
        }
        Ok(())
    }

    /**
     * Update `count` scalar components starting at `start`: either the full
     * set of species (the density follows as their sum) or the enthalpy.
     * Then reflux, average down, and refill the ghost cells of the updated
     * components at the new time. `snew` must already hold the new density
     * and species when the enthalpy is updated.
     */
    pub fn update_scal(
        &mut self,
        start: usize,
        count: usize,
        step: &ScalarStep,
        snew: &mut [LevelField],
        microphysics: &dyn Microphysics) -> Result<UpdateSummary>
    {
        let target = self.layout.update_target(start, count)?;
        let hierarchy = self.hierarchy();
        check_levels(step.sold, hierarchy)?;
        check_levels(step.sflux, hierarchy)?;
        check_levels(step.force, hierarchy)?;
        check_levels(snew, hierarchy)?;

        let rank = hierarchy.rank();
        let layout = self.layout;
        let vertical = self.config.vertical_axis();
        let cutoff = self.config.base_cutoff_density;
        let eos_override = self.config.do_eos_h_above_cutoff;
        let p0_cart = if self.config.is_spherical() && target == UpdateTarget::Enthalpy && eos_override {
            Some(&step.background.new.spherical_maps()?.p0_cart)
        } else {
            None
        };
        let mut summary = UpdateSummary { target, floored: 0, repaired: 0, eos_cells: 0 };

        info!("updating {:?}", target);

        for level in 0..hierarchy.num_levels() {
            let geometry = hierarchy.level(level).geometry();
            let sold = &step.sold[level];
            let sflux = &step.sflux[level];
            let force = &step.force[level];
            let valid = snew[level].valid().to_vec();

            let box_update = |b: usize| ScalarUpdate {
                geometry,
                dt: step.dt,
                sold: &sold.patches()[b],
                fluxes: Axis::active(rank).map(|d| &sflux.faces(d)[b]).collect(),
                force: &force.patches()[b],
            };

            match target {
                UpdateTarget::Species => {
                    let counts = snew[level]
                        .patches_mut()
                        .par_iter_mut()
                        .zip(valid.par_iter())
                        .enumerate()
                        .map(|(b, (patch, valid))| update_species(&layout, cutoff, &box_update(b), valid, patch))
                        .reduce(PolicyCounts::default, |a, b| a + b);

                    if counts != PolicyCounts::default() {
                        debug!("level {}: {} cell(s) floored, {} repaired", level, counts.floored, counts.repaired);
                    }
                    summary.floored += counts.floored;
                    summary.repaired += counts.repaired;
                }
                UpdateTarget::Enthalpy => {
                    let p0 = &step.background.new.p0;
                    let eos_cells: usize = snew[level]
                        .patches_mut()
                        .par_iter_mut()
                        .zip(valid.par_iter())
                        .enumerate()
                        .map(|(b, (patch, valid))| {
                            update_enthalpy(&box_update(b), valid, patch, |c, cell| {
                                let rho = cell[ComponentLayout::RHO];

                                if !eos_override || rho.is_nan() || rho > cutoff {
                                    return None
                                }
                                let p0 = match p0_cart {
                                    Some(p0_cart) => p0_cart[level].patches()[b].get(c, 0),
                                    None => p0.at(level, vertical.component(c)),
                                };
                                Some(microphysics.rhoh_from_eos(rho, &cell[layout.species()], p0))
                            })
                        })
                        .sum();

                    if eos_cells > 0 {
                        debug!("level {}: enthalpy of {} cell(s) set from the equation of state", level, eos_cells);
                    }
                    summary.eos_cells += eos_cells;
                }
            }
        }

        let ranges = match target {
            UpdateTarget::Species => vec![layout.species(), ComponentLayout::RHO..ComponentLayout::RHO + 1],
            UpdateTarget::Enthalpy => vec![ComponentLayout::RHOH..ComponentLayout::RHOH + 1],
        };
        for components in &ranges {
            check_finite(snew, components.clone())?;
        }

        if self.config.consistency == Consistency::Reflux {
            for components in &ranges {
                self.registers.reflux(hierarchy, snew, components.clone());
            }
        }
        for components in &ranges {
            self.substrate.average_down(snew, components.clone());
        }
        if target == UpdateTarget::Species {
            resum_density(&layout, snew);
        }
        for components in ranges {
            self.substrate.fill_ghost(snew, step.background.new.time, components, &self.scalar_bcs);
        }
        Ok(summary)
    }

    /**
     * Predict every velocity component to faces, advected by the full MAC
     * velocity, for the velocity update. The faces are averaged down.
     */
    pub fn make_edge_velocities(
        &self,
        uold: &[LevelField],
        umac: &[EdgeField],
        force: &[LevelField],
        background: &BackgroundPair,
        dt: f64) -> Result<Vec<EdgeField>>
    {
        let hierarchy = self.hierarchy();
        check_levels(uold, hierarchy)?;
        check_levels(force, hierarchy)?;

        let rank = hierarchy.rank();
        let time = background.old.time;
        let state = self.ghosted(uold, time, &self.velocity_bcs);
        let force = self.ghosted(force, time, &self.force_bcs(rank));
        let mut uedge = self.edge_fields(rank, 0);
        let prediction = EdgePrediction { components: 0..rank, is_velocity: true, conservative: false };

        info!("predicting edge velocities");
        self.make_edge_scal(&state, &mut uedge, umac, &force, &prediction, dt)?;
        Ok(uedge)
    }

    /**
     * Update the cell velocity of every level from the edge velocities, the
     * MAC velocity and the forcing, with the background advection term and
     * the optional sponge. Then average down and refill the ghost cells at
     * the new time.
     */
    pub fn update_vel(&self, step: &VelocityStep, unew: &mut [LevelField]) -> Result<()> {
        let hierarchy = self.hierarchy();
        check_levels(step.uold, hierarchy)?;
        check_levels(step.uedge, hierarchy)?;
        check_levels(step.umac, hierarchy)?;
        check_levels(step.force, hierarchy)?;
        check_levels(unew, hierarchy)?;

        let rank = hierarchy.rank();
        let vertical = self.config.vertical_axis();

        if self.config.is_spherical() && rank != 3 {
            return Err(Error::SphericalRequiresThreeDimensions(rank))
        }
        let w0mac = if self.config.is_spherical() {
            Some(step.background.expansion.mapped()?.1)
        } else {
            None
        };
        let sponge = match (self.config.do_sponge, step.sponge) {
            (true, Some(sponge)) => {
                check_levels(sponge, hierarchy)?;
                Some(sponge)
            }
            (true, None) => {
                warn!("sponge enabled but no sponge coefficient given");
                None
            }
            (false, _) => None,
        };

        info!("updating velocity");

        for level in 0..hierarchy.num_levels() {
            let geometry = hierarchy.level(level).geometry();
            let valid = unew[level].valid().to_vec();

            unew[level]
                .patches_mut()
                .par_iter_mut()
                .zip(valid.par_iter())
                .enumerate()
                .for_each(|(b, (patch, valid))| {
                    let background = match w0mac {
                        Some(w0mac) => BackgroundAdvection::Mapped { w0mac: &w0mac[level], patch: b },
                        None => BackgroundAdvection::Planar { w0: &step.background.expansion, level, vertical },
                    };
                    let update = VelocityUpdate {
                        geometry,
                        dt: step.dt,
                        uold: &step.uold[level].patches()[b],
                        uedge: Axis::active(rank).map(|d| &step.uedge[level].faces(d)[b]).collect(),
                        umac: Axis::active(rank).map(|d| &step.umac[level].faces(d)[b]).collect(),
                        force: &step.force[level].patches()[b],
                        background,
                        sponge: sponge.map(|s| &s[level].patches()[b]),
                    };
                    update_velocity(&update, valid, patch)
                });
        }

        self.substrate.average_down(unew, 0..rank);
        self.substrate.fill_ghost(unew, step.background.new.time, 0..rank, &self.velocity_bcs);
        Ok(())
    }

    /**
     * Run one full advection step. The MAC velocity is projected between
     * its prediction and the flux assembly.
     */
    pub fn advance(&mut self, inputs: &StepInputs, projection: &dyn Projection, microphysics: &dyn Microphysics) -> Result<StepOutputs> {
        let hierarchy = self.hierarchy();
        check_levels(inputs.sold, hierarchy)?;
        check_levels(inputs.coefficient, hierarchy)?;

        let background = inputs.background;
        let dt = inputs.dt;

        info!("advancing from t = {} by dt = {}", background.old.time, dt);
        self.registers.reset();

        let predicted = self.advance_premac(inputs.uold, inputs.velocity_force, background, dt)?;
        let (projected, pressure_correction) = projection.project(
            &predicted,
            inputs.coefficient,
            projection_boundaries(&self.boundaries),
            Tolerance::default())?;
        check_levels(&projected, hierarchy)?;
        let umac = self.with_ghost_face(&projected);

        let mut umac_full = umac.clone();
        self.add_w0(&mut umac_full, background, 1.0)?;

        let mut sflux = self.new_fluxes();
        let mut snew = inputs.sold.to_vec();
        let mut sedge = self.predict_species(inputs.sold, &umac_full, inputs.scalar_force, background, dt)?;
        let etarhoflux = self.make_rho_x_flux(&mut sflux, &sedge, &umac_full, background, inputs.rho0_predicted_edge, dt)?;

        let step = ScalarStep { sold: inputs.sold, sflux: &sflux, force: inputs.scalar_force, background, dt };
        let species = self.update_scal(ComponentLayout::FIRST_SPECIES, self.layout.num_species(), &step, &mut snew, microphysics)?;

        self.predict_enthalpy(inputs.sold, &mut sedge, &umac_full, inputs.scalar_force, background, dt)?;
        self.make_rhoh_flux(&mut sflux, &sedge, &umac_full, background, dt)?;

        let step = ScalarStep { sold: inputs.sold, sflux: &sflux, force: inputs.scalar_force, background, dt };
        let enthalpy = self.update_scal(ComponentLayout::RHOH, 1, &step, &mut snew, microphysics)?;

        let uedge = self.make_edge_velocities(inputs.uold, &umac_full, inputs.velocity_force, background, dt)?;
        let mut unew = inputs.uold.to_vec();
        let step = VelocityStep {
            uold: inputs.uold,
            uedge: &uedge,
            umac: &umac,
            force: inputs.velocity_force,
            background,
            sponge: inputs.sponge,
            dt,
        };
        self.update_vel(&step, &mut unew)?;

        Ok(StepOutputs {
            unew,
            snew,
            umac: umac_full,
            sflux,
            etarhoflux,
            pressure_correction,
            species,
            enthalpy,
        })
    }
}




// ============================================================================
impl<'a, S: MeshSubstrate> AdvectionEngine<'a, S> {

    fn context<'b>(&'b self, level: usize, expansion: Expansion<'b>, dt: f64, eps: f64) -> LevelContext<'b> {
        LevelContext {
            scheme: self.config.reconstruction,
            geometry: self.hierarchy().level(level).geometry(),
            boundaries: &self.boundaries,
            velocity_bcs: &self.velocity_bcs,
            expansion,
            dt,
            eps,
        }
    }

    fn expansion<'b>(&self, background: &'b BackgroundPair, w0mac: Option<&'b [EdgeField]>, level: usize) -> Expansion<'b> {
        match w0mac {
            Some(w0mac) => Expansion::Mapped(&w0mac[level]),
            None => Expansion::Planar { w0: &background.expansion.w0, level, vertical: self.config.vertical_axis() },
        }
    }

    fn force_bcs(&self, num_fields: usize) -> Vec<ComponentBc> {
        vec![self.boundaries.force_bc(); num_fields]
    }

    fn edge_fields(&self, num_fields: usize, num_ghost: i64) -> Vec<EdgeField> {
        self.hierarchy()
            .levels()
            .iter()
            .map(|level| EdgeField::zeros(level, num_fields, num_ghost))
            .collect()
    }

    /**
     * A copy of a field with `NUM_GHOST` ghost cells, filled at the given
     * time with the given boundary codes.
     */
    fn ghosted(&self, field: &[LevelField], time: f64, bcs: &[ComponentBc]) -> Vec<LevelField> {
        let num_fields = field.first().map_or(0, LevelField::num_fields);
        let mut result: Vec<LevelField> = self
            .hierarchy()
            .levels()
            .iter()
            .zip(field)
            .map(|(level, source)| {
                let mut ghosted = LevelField::zeros(level, num_fields, NUM_GHOST);

                for (patch, source) in ghosted.patches_mut().iter_mut().zip(source.patches()) {
                    patch.copy_fields_from(source, 0..num_fields)
                }
                ghosted
            })
            .collect();

        self.substrate.fill_ghost(&mut result, time, 0..num_fields, bcs);
        result
    }

    /**
     * The expansion velocity on faces with one filled ghost face, in
     * spherical geometry.
     */
    fn ghosted_w0mac(&self, background: &BackgroundPair) -> Result<Option<Vec<EdgeField>>> {
        if !self.config.is_spherical() {
            return Ok(None)
        }
        let (_, w0mac) = background.expansion.mapped()?;
        check_levels(w0mac, self.hierarchy())?;
        let faces = self.with_ghost_face(w0mac);
        Ok(Some(faces))
    }

    /**
     * A copy of a single-component face field with one ghost face, filled
     * through the substrate.
     */
    fn with_ghost_face(&self, source: &[EdgeField]) -> Vec<EdgeField> {
        let rank = self.hierarchy().rank();
        let mut faces: Vec<EdgeField> = self
            .hierarchy()
            .levels()
            .iter()
            .zip(source)
            .map(|(level, source)| {
                let mut ghosted = EdgeField::zeros(level, 1, 1);

                for d in Axis::active(rank) {
                    for (patch, source) in ghosted.faces_mut(d).iter_mut().zip(source.faces(d)) {
                        patch.copy_fields_from(source, 0..1)
                    }
                }
                ghosted
            })
            .collect();

        self.substrate.fill_face_ghost(&mut faces);
        faces
    }

    /**
     * The ghosted velocity plus the expansion velocity: the planar profile
     * averaged to cell centers on the vertical component, or the mapped
     * cell velocity in spherical geometry.
     */
    fn full_velocity(&self, utilde: &[LevelField], background: &BackgroundPair, time: f64) -> Result<Vec<LevelField>> {
        let rank = self.hierarchy().rank();
        let mut ufull = utilde.to_vec();

        if self.config.is_spherical() {
            let (w0_cart, _) = background.expansion.mapped()?;
            check_levels(w0_cart, self.hierarchy())?;
            let w0_cart = self.ghosted(w0_cart, time, &self.velocity_bcs);

            for (u, w) in ufull.iter_mut().zip(&w0_cart) {
                u.patches_mut().par_iter_mut().zip(w.patches().par_iter()).for_each(|(u, w)| {
                    let space = u.index_space().clone();

                    for c in space.iter() {
                        for n in 0..rank {
                            *u.get_mut(c, n) += w.get(c, n)
                        }
                    }
                });
            }
        } else {
            let vertical = self.config.vertical_axis();
            let w0 = &background.expansion;

            for (level, u) in ufull.iter_mut().enumerate() {
                u.patches_mut().par_iter_mut().for_each(|u| {
                    let space = u.index_space().clone();

                    for c in space.iter() {
                        *u.get_mut(c, vertical.number()) += w0.cell_centered(level, vertical.component(c))
                    }
                });
            }
        }
        Ok(ufull)
    }

    /**
     * Predict groups of components of a converted, ghosted scalar state,
     * with the scalar forcing zeroed outside the forced groups.
     */
    fn predict_groups(
        &self,
        state: &[LevelField],
        sedge: &mut [EdgeField],
        umac: &[EdgeField],
        force: &[LevelField],
        groups: &[PredictedGroup],
        background: &BackgroundPair,
        dt: f64) -> Result<()>
    {
        check_levels(force, self.hierarchy())?;

        let mut force = self.ghosted(force, background.old.time, &self.force_bcs(self.layout.num_components()));

        for field in &mut force {
            field.patches_mut().par_iter_mut().for_each(|patch| *patch = prediction_force(groups, patch));
        }

        for group in groups {
            self.layout.check_range(&group.components)?;
            let prediction = EdgePrediction {
                components: group.components.clone(),
                is_velocity: false,
                conservative: group.conservative,
            };
            self.make_edge_scal(state, sedge, umac, &force, &prediction, dt)?;
        }
        Ok(())
    }

    fn rho0_cells<'b>(&self, background: &'b BackgroundPair) -> Result<CellSource<'b>> {
        if self.config.is_spherical() {
            Ok(CellSource::Mapped(&background.old.spherical_maps()?.rho0_cart))
        } else {
            Ok(CellSource::Planar(&background.old.rho0))
        }
    }

    fn rhoh0_cells<'b>(&self, background: &'b BackgroundPair) -> Result<CellSource<'b>> {
        if self.config.is_spherical() {
            Ok(CellSource::Mapped(&background.old.spherical_maps()?.rhoh0_cart))
        } else {
            Ok(CellSource::Planar(&background.old.rhoh0))
        }
    }

    fn rho0_faces<'b>(&self, background: &'b BackgroundPair) -> Result<FaceSource<'b>> {
        if self.config.is_spherical() {
            let (old, new) = (background.old.spherical_maps()?, background.new.spherical_maps()?);
            Ok(FaceSource::Mapped(&old.rho0mac, &new.rho0mac))
        } else {
            Ok(FaceSource::Planar {
                cell: (&background.old.rho0, &background.new.rho0),
                edge: (&background.old.rho0_edge, &background.new.rho0_edge),
            })
        }
    }

    /**
     * The background enthalpy on faces. In spherical geometry the exact
     * base state maps the enthalpy density directly; otherwise it is formed
     * from the mapped density and specific enthalpy.
     */
    fn rhoh0_faces<'b>(&self, background: &'b BackgroundPair) -> Result<EnthalpySource<'b>> {
        if self.config.is_spherical() {
            let (old, new) = (background.old.spherical_maps()?, background.new.spherical_maps()?);

            if self.config.use_exact_base_state {
                Ok(EnthalpySource::Direct(FaceSource::Mapped(&old.rhoh0mac, &new.rhoh0mac)))
            } else {
                Ok(EnthalpySource::Product(
                    FaceSource::Mapped(&old.rho0mac, &new.rho0mac),
                    FaceSource::Mapped(&old.h0mac, &new.h0mac)))
            }
        } else {
            Ok(EnthalpySource::Direct(FaceSource::Planar {
                cell: (&background.old.rhoh0, &background.new.rhoh0),
                edge: (&background.old.rhoh0_edge, &background.new.rhoh0_edge),
            }))
        }
    }
}




#[derive(Clone, Copy)]
enum EnthalpySource<'b> {
    Direct(FaceSource<'b>),
    Product(FaceSource<'b>, FaceSource<'b>),
}




/**
 * Copy the given components of per-box face patches (one per active axis,
 * in axis order) into an edge field.
 */
fn store_faces(edges: &mut EdgeField, per_box: Vec<Vec<Patch>>, components: Range<usize>) {
    for (b, patches) in per_box.into_iter().enumerate() {
        for (axis, patch) in Axis::ALL.into_iter().zip(patches) {
            edges.faces_mut(axis)[b].copy_fields_from(&patch, components.clone())
        }
    }
}




/**
 * Fail on the first valid cell holding a non-finite value in the given
 * components.
 */
fn check_finite(state: &[LevelField], components: Range<usize>) -> Result<()> {
    for (level, field) in state.iter().enumerate() {
        for (valid, patch) in field.iter() {
            for c in valid.iter() {
                if let Some(component) = components.clone().find(|&q| !patch.get(c, q).is_finite()) {
                    return Err(Error::NonFiniteState { level, component })
                }
            }
        }
    }
    Ok(())
}




/**
 * Set the density of every valid cell to the sum of its species.
 */
fn resum_density(layout: &ComponentLayout, state: &mut [LevelField]) {
    for field in state {
        let valid = field.valid().to_vec();

        field.patches_mut().par_iter_mut().zip(valid.par_iter()).for_each(|(patch, valid)| {
            for c in valid.iter() {
                let cell = patch.get_slice_mut(c);
                cell[ComponentLayout::RHO] = cell[layout.species()].iter().sum();
            }
        });
    }
}




fn max_face_speed(umac: &[EdgeField]) -> f64 {
    umac.iter()
        .flat_map(|edges| Axis::active(edges.rank()).flat_map(move |d| edges.faces(d)))
        .flat_map(|patch| patch.data())
        .fold(0.0, |a: f64, u| a.max(u.abs()))
}




fn zero_velocity(scale: f64) -> f64 {
    (ZERO_VELOCITY_FRACTION * scale).max(f64::MIN_POSITIVE)
}
