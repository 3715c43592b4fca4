use approx::assert_relative_eq;
use stratiflow::advection::{AdvectionEngine, EdgePrediction, ScalarStep, StepInputs, StepOutputs, NUM_GHOST};
use stratiflow::base_state::{BackgroundPair, Centering, ExpansionVelocity, Profile, SphericalMaps};
use stratiflow::boundary::{BoundaryKind, PhysicalBoundaries, Side};
use stratiflow::collaborator::{Microphysics, Projection, ProjectionBoundary, Tolerance};
use stratiflow::config::{AdvectionConfig, Consistency, Coordinates, Reconstruction, SpeciesPrediction, EnthalpyPrediction};
use stratiflow::error::{Error, Result};
use stratiflow::field::{EdgeField, LevelField};
use stratiflow::geometry::Geometry;
use stratiflow::hierarchy::Hierarchy;
use stratiflow::index_space::{Axis, IndexSpace};
use stratiflow::layout::UpdateTarget;
use stratiflow::reflux::FluxRegisters;
use stratiflow::substrate::{MeshSubstrate, NestedSubstrate};

use std::f64::consts::PI;




/// Returns the velocity unchanged, with a zero pressure correction.
struct PassThrough;

impl Projection for PassThrough {
    fn project(
        &self,
        velocity: &[EdgeField],
        coefficient: &[LevelField],
        _boundaries: [[ProjectionBoundary; 2]; 3],
        _tolerance: Tolerance) -> Result<(Vec<EdgeField>, Vec<LevelField>)>
    {
        let mut pressure = coefficient.to_vec();
        pressure.iter_mut().for_each(|p| p.fill_field(0, 0.0));
        Ok((velocity.to_vec(), pressure))
    }
}




struct IdealGas;

impl Microphysics for IdealGas {
    fn compute_heating(&self, _state: &[f64]) -> f64 {
        0.0
    }

    fn rhoh_from_eos(&self, _rho: f64, _rho_x: &[f64], p0: f64) -> f64 {
        2.5 * p0
    }
}




fn periodic_1d() -> Hierarchy {
    let domain = IndexSpace::new_1d(0..16);
    let geometry = Geometry::new(domain.clone(), [0.0; 3], [1.0, 0.0, 0.0], [true; 3]);
    Hierarchy::new(geometry, vec![domain])
}

fn periodic_2d() -> Hierarchy {
    let domain = IndexSpace::new_2d(0..16, 0..16);
    let geometry = Geometry::new(domain, [0.0; 3], [1.0, 1.0, 0.0], [true; 3]);
    Hierarchy::new(geometry, vec![IndexSpace::new_2d(0..8, 0..16), IndexSpace::new_2d(8..16, 0..16)])
}

fn two_level_2d() -> Hierarchy {
    periodic_2d().refine(vec![IndexSpace::new_2d(8..20, 10..22)])
}

fn config(dimension: usize, num_species: usize) -> AdvectionConfig {
    AdvectionConfig {
        dimension,
        num_species,
        base_cutoff_density: 1e-3,
        ..Default::default()
    }
}

fn background(h: &Hierarchy, rho0: f64, rhoh0: f64) -> BackgroundPair {
    let vertical = Axis::from_number(h.rank() - 1);
    let profile = |centering, value| Profile::uniform(h, vertical, centering, value);
    let expansion = ExpansionVelocity::planar(profile(Centering::Edge, 0.0));

    BackgroundPair::steady(
        0.0,
        profile(Centering::Cell, rho0),
        profile(Centering::Edge, rho0),
        profile(Centering::Cell, rhoh0),
        profile(Centering::Edge, rhoh0),
        profile(Centering::Cell, 1.0),
        expansion)
}

/// Partial densities from the density and the mass fractions of the species.
fn scalars(h: &Hierarchy, f: impl Fn([f64; 3]) -> (f64, Vec<f64>) + Copy) -> Vec<LevelField> {
    h.levels()
        .iter()
        .map(|level| {
            let num_species = f([0.0; 3]).1.len();
            LevelField::from_function(level, 2 + num_species, 2, |x, p| {
                let (rho, fractions) = f(x);
                p[0] = rho;
                p[1] = 2.0 * rho;
                for (n, x) in fractions.iter().enumerate() {
                    p[2 + n] = rho * x
                }
            })
        })
        .collect()
}

fn velocity(h: &Hierarchy, f: impl Fn([f64; 3], &mut [f64]) + Copy) -> Vec<LevelField> {
    h.levels()
        .iter()
        .map(|level| LevelField::from_function(level, h.rank(), 2, f))
        .collect()
}

fn zeros(h: &Hierarchy, num_fields: usize) -> Vec<LevelField> {
    h.levels().iter().map(|level| LevelField::zeros(level, num_fields, 0)).collect()
}

fn swirl(x: [f64; 3], p: &mut [f64]) {
    p[0] = 0.3 + 0.1 * (2.0 * PI * x[1]).sin();
    p[1] = 0.2 + 0.1 * (2.0 * PI * x[0]).cos();
}

fn stratified_mixture(x: [f64; 3]) -> (f64, Vec<f64>) {
    let rho = 1.0 + 0.2 * (2.0 * PI * x[0]).sin() * (2.0 * PI * x[1]).sin();
    let x1 = 0.3 + 0.1 * (2.0 * PI * x[0]).sin();
    (rho, vec![x1, 0.2, 0.8 - x1])
}

fn step(engine: &mut AdvectionEngine<NestedSubstrate>, uold: &[LevelField], sold: &[LevelField], sponge: Option<&[LevelField]>, dt: f64) -> StepOutputs {
    let background = background(engine.hierarchy(), 1.0, 2.0);
    step_with(engine, uold, sold, sponge, &background, dt)
}

fn step_with(
    engine: &mut AdvectionEngine<NestedSubstrate>,
    uold: &[LevelField],
    sold: &[LevelField],
    sponge: Option<&[LevelField]>,
    background: &BackgroundPair,
    dt: f64) -> StepOutputs
{
    let h = engine.hierarchy();
    let inputs = StepInputs {
        uold,
        sold,
        velocity_force: &zeros(h, h.rank()),
        scalar_force: &zeros(h, engine.layout().num_components()),
        background,
        coefficient: &zeros(h, 1),
        sponge,
        rho0_predicted_edge: None,
        dt,
    };
    engine.advance(&inputs, &PassThrough, &IdealGas).unwrap()
}

fn total(field: &[LevelField], h: &Hierarchy, q: usize) -> f64 {
    field[0].sum_valid(q, |_| false) * h.level(0).geometry().cell_volume()
}




#[test]
fn uniform_state_at_rest_is_unchanged_in_one_dimension() {
    let h = periodic_1d();
    let substrate = NestedSubstrate::new(h.clone());
    let config = config(1, 1).validate().unwrap();
    let mut engine = AdvectionEngine::new(config, &substrate, PhysicalBoundaries::periodic()).unwrap();
    let uold = velocity(&h, |_, p| p[0] = 0.0);
    let sold = scalars(&h, |_| (1.0, vec![1.0]));

    let out = step(&mut engine, &uold, &sold, None, 0.1);

    for c in h.level(0).geometry().domain().iter() {
        assert_eq!(out.snew[0].value_at(c, 0), Some(1.0));
        assert_eq!(out.snew[0].value_at(c, 2), Some(1.0));
        assert_eq!(out.unew[0].value_at(c, 0), Some(0.0));
    }
    assert_eq!(out.species.floored + out.species.repaired, 0);
}

#[test]
fn density_is_exactly_the_sum_of_the_species() {
    let h = periodic_2d();
    let substrate = NestedSubstrate::new(h.clone());
    let config = config(2, 3).validate().unwrap();
    let mut engine = AdvectionEngine::new(config, &substrate, PhysicalBoundaries::periodic()).unwrap();
    let uold = velocity(&h, swirl);
    let sold = scalars(&h, stratified_mixture);

    let out = step(&mut engine, &uold, &sold, None, 0.01);

    for (valid, patch) in out.snew[0].iter() {
        for c in valid.iter() {
            let cell = patch.get_slice(c);
            let sum: f64 = cell[2..].iter().sum();
            assert_eq!(cell[0], sum);
            assert!(cell[2..].iter().all(|&x| x >= 0.0));
            assert!(cell[0] >= 0.5e-3);
        }
    }
}

#[test]
fn periodic_update_conserves_species_and_enthalpy() {
    let h = periodic_2d();
    let substrate = NestedSubstrate::new(h.clone());

    for species_prediction in [SpeciesPrediction::RhoPrimeAndX, SpeciesPrediction::RhoX, SpeciesPrediction::RhoAndX] {
        let config = AdvectionConfig {
            species_prediction,
            enthalpy_prediction: EnthalpyPrediction::RhoH,
            reconstruction: Reconstruction::PpmExtremumPreserving,
            ..config(2, 3)
        };
        let mut engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
        let uold = velocity(&h, swirl);
        let sold = scalars(&h, stratified_mixture);

        let out = step(&mut engine, &uold, &sold, None, 0.01);

        for q in [0, 1, 2, 3, 4] {
            assert_relative_eq!(total(&out.snew, &h, q), total(&sold, &h, q), max_relative = 1e-12);
        }
    }
}

#[test]
fn refluxed_two_level_update_conserves_the_composite_species() {
    let h = two_level_2d();
    let substrate = NestedSubstrate::new(h.clone());
    let config = AdvectionConfig { consistency: Consistency::Reflux, ..config(2, 2) };
    let mut engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let uold = velocity(&h, swirl);
    let mut sold = scalars(&h, |x| {
        let (rho, fractions) = stratified_mixture(x);
        (rho, vec![fractions[0], 1.0 - fractions[0]])
    });
    substrate.average_down(&mut sold, 0..4);

    let out = step(&mut engine, &uold, &sold, None, 0.005);

    for q in [0, 2, 3] {
        assert_relative_eq!(total(&out.snew, &h, q), total(&sold, &h, q), max_relative = 1e-11);
    }
}

#[test]
fn zero_sponge_stops_the_flow() {
    let h = periodic_2d();
    let substrate = NestedSubstrate::new(h.clone());
    let config = AdvectionConfig { do_sponge: true, ..config(2, 1) };
    let mut engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let uold = velocity(&h, swirl);
    let sold = scalars(&h, |_| (1.0, vec![1.0]));
    let sponge = zeros(&h, 1);

    let out = step(&mut engine, &uold, &sold, Some(&sponge), 0.01);

    for (valid, patch) in out.unew[0].iter() {
        for c in valid.iter() {
            assert_eq!(patch.get_slice(c), &[0.0, 0.0]);
        }
    }
}

fn update_species_of(cells: impl Fn(i64) -> Vec<f64> + Copy, cutoff: f64) -> (Vec<LevelField>, stratiflow::advection::UpdateSummary) {
    let h = periodic_1d();
    let substrate = NestedSubstrate::new(h.clone());
    let num_species = cells(0).len();
    let config = AdvectionConfig { base_cutoff_density: cutoff, ..config(1, num_species) };
    let mut engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let sold: Vec<LevelField> = h.levels()
        .iter()
        .map(|level| LevelField::from_function(level, 2 + num_species, 1, |x, p| {
            let species = cells((x[0] * 16.0) as i64);
            p[0] = species.iter().sum();
            p[2..].copy_from_slice(&species);
        }))
        .collect();
    let sflux = engine.new_fluxes();
    let background = background(&h, 1.0, 2.0);
    let scalar_step = ScalarStep {
        sold: &sold,
        sflux: &sflux,
        force: &zeros(&h, 2 + num_species),
        background: &background,
        dt: 0.1,
    };
    let mut snew = sold.clone();
    let summary = engine.update_scal(2, num_species, &scalar_step, &mut snew, &IdealGas).unwrap();
    (snew, summary)
}

#[test]
fn low_density_cells_are_raised_to_the_floor() {
    let (snew, summary) = update_species_of(|i| if i == 5 { vec![0.1, 0.1] } else { vec![0.5, 0.5] }, 1.0);

    assert_eq!(summary.target, UpdateTarget::Species);
    assert_eq!(summary.floored, 1);
    assert_relative_eq!(snew[0].value_at((5, 0, 0), 2).unwrap(), 0.25, epsilon = 1e-15);
    assert_relative_eq!(snew[0].value_at((5, 0, 0), 3).unwrap(), 0.25, epsilon = 1e-15);
    assert_relative_eq!(snew[0].value_at((5, 0, 0), 0).unwrap(), 0.5, epsilon = 1e-15);
    assert_eq!(snew[0].value_at((6, 0, 0), 0), Some(1.0));
}

#[test]
fn negative_species_is_zeroed_and_its_deficit_shared() {
    let (snew, summary) = update_species_of(|i| if i == 3 { vec![-0.1, 0.6, 0.5] } else { vec![0.2, 0.3, 0.5] }, 1e-3);
    let cell = |q| snew[0].value_at((3, 0, 0), q).unwrap();

    assert_eq!(summary.repaired, 1);
    assert_eq!(cell(2), 0.0);
    assert_relative_eq!(cell(3), 0.6 - 0.1 * 0.6 / 1.1, epsilon = 1e-15);
    assert_relative_eq!(cell(4), 0.5 - 0.1 * 0.5 / 1.1, epsilon = 1e-15);
    assert_relative_eq!(cell(3) / cell(4), 0.6 / 0.5, epsilon = 1e-14);
    assert_relative_eq!(cell(0), 1.0, epsilon = 1e-15);
}

#[test]
fn update_of_an_unknown_target_is_rejected() {
    let h = periodic_1d();
    let substrate = NestedSubstrate::new(h.clone());
    let mut engine = AdvectionEngine::new(config(1, 1).validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let sold = scalars(&h, |_| (1.0, vec![1.0]));
    let sflux = engine.new_fluxes();
    let background = background(&h, 1.0, 2.0);
    let scalar_step = ScalarStep { sold: &sold, sflux: &sflux, force: &zeros(&h, 3), background: &background, dt: 0.1 };
    let mut snew = sold.clone();

    let result = engine.update_scal(0, 1, &scalar_step, &mut snew, &IdealGas);
    assert_eq!(result, Err(Error::UnrecognizedUpdateTarget { start: 0, end: 1 }));
}

#[test]
fn spherical_geometry_is_rejected_below_three_dimensions() {
    let config = AdvectionConfig { coordinates: Coordinates::Spherical, ..config(2, 1) };
    assert_eq!(config.validate(), Err(Error::SphericalRequiresThreeDimensions(2)));
}

#[test]
fn constant_field_has_constant_edge_states_for_every_scheme() {
    let h = periodic_2d();
    let substrate = NestedSubstrate::new(h.clone());

    for reconstruction in [Reconstruction::PiecewiseLinear, Reconstruction::Ppm, Reconstruction::PpmExtremumPreserving] {
        let config = AdvectionConfig { reconstruction, ..config(2, 1) };
        let engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
        let state: Vec<LevelField> = h.levels()
            .iter()
            .map(|level| LevelField::from_function(level, 3, NUM_GHOST, |_, p| p.copy_from_slice(&[1.5, 3.0, 1.5])))
            .collect();
        let force: Vec<LevelField> = h.levels().iter().map(|level| LevelField::zeros(level, 3, NUM_GHOST)).collect();
        let mut umac: Vec<EdgeField> = h.levels().iter().map(|level| EdgeField::zeros(level, 1, 1)).collect();
        umac.iter_mut().for_each(|u| u.fill(0.4));
        let mut sedge = engine.new_fluxes();
        let prediction = EdgePrediction { components: 0..3, is_velocity: false, conservative: false };

        engine.make_edge_scal(&state, &mut sedge, &umac, &force, &prediction, 0.01).unwrap();

        for axis in [Axis::I, Axis::J] {
            for q in 0..3 {
                assert_relative_eq!(sedge[0].value_at(axis, (4, 7, 0), q).unwrap(), state[0].value_at((4, 7, 0), q).unwrap(), epsilon = 1e-14);
            }
        }
    }
}

#[test]
fn second_reflux_without_new_fluxes_changes_nothing() {
    let h = two_level_2d();
    let mut registers = FluxRegisters::new(&h, 1);
    let mut state: Vec<LevelField> = h.levels().iter().map(|level| LevelField::zeros(level, 1, 0)).collect();

    for (level, value) in [(0, 1.0), (1, 1.75)] {
        let mut fluxes = EdgeField::zeros(h.level(level), 1, 0);
        fluxes.fill(value);
        registers.contribute(&h, level, &fluxes, 0..1, 0.1);
    }
    registers.reflux(&h, &mut state, 0..1);
    let once = state.clone();
    registers.reflux(&h, &mut state, 0..1);

    assert_eq!(state, once);
    assert!(once[0].max_abs(0..1) > 0.0);
}

fn bounded_2d(boundaries: &PhysicalBoundaries) -> Hierarchy {
    let domain = IndexSpace::new_2d(0..16, 0..16);
    let geometry = Geometry::new(domain, [0.0; 3], [1.0, 1.0, 0.0], boundaries.periodicity());
    Hierarchy::new(geometry, vec![IndexSpace::new_2d(0..8, 0..16), IndexSpace::new_2d(8..16, 0..16)])
}

fn assert_uniform(field: &[LevelField], q: usize, value: f64, epsilon: f64) {
    for (valid, patch) in field[0].iter() {
        for c in valid.iter() {
            assert_relative_eq!(patch.get(c, q), value, epsilon = epsilon);
        }
    }
}

#[test]
fn inflow_needs_prescribed_boundary_values() {
    let boundaries = PhysicalBoundaries::periodic()
        .with(Axis::J, Side::Lo, BoundaryKind::Inflow)
        .with(Axis::J, Side::Hi, BoundaryKind::Outflow);
    let h = bounded_2d(&boundaries);
    let substrate = NestedSubstrate::new(h.clone());
    let config = config(2, 2).validate().unwrap();

    let result = AdvectionEngine::new(config, &substrate, boundaries);
    assert_eq!(result.err(), Some(Error::MissingInflowValues { axis: Axis::J, side: Side::Lo }));
}

#[test]
fn uniform_inflow_passes_through_to_the_outflow() {
    let boundaries = PhysicalBoundaries::periodic()
        .with(Axis::J, Side::Lo, BoundaryKind::Inflow)
        .with(Axis::J, Side::Hi, BoundaryKind::Outflow);
    let h = bounded_2d(&boundaries);
    let substrate = NestedSubstrate::new(h.clone());
    let scalar_bcs = [1.0, 2.0, 0.5, 0.5].iter().map(|&v| boundaries.scalar_bc(v)).collect();
    let velocity_bcs = vec![boundaries.velocity_bc(Axis::I, 0.0), boundaries.velocity_bc(Axis::J, 0.3)];
    let config = config(2, 2).validate().unwrap();
    let mut engine = AdvectionEngine::with_boundary_codes(config, &substrate, boundaries, scalar_bcs, velocity_bcs).unwrap();
    let uold = velocity(&h, |_, p| p.copy_from_slice(&[0.0, 0.3]));
    let sold = scalars(&h, |_| (1.0, vec![0.5, 0.5]));

    let out = step(&mut engine, &uold, &sold, None, 0.01);

    assert_uniform(&out.snew, 0, 1.0, 1e-12);
    assert_uniform(&out.snew, 2, 0.5, 1e-12);
    assert_uniform(&out.unew, 1, 0.3, 1e-12);
}

#[test]
fn non_finite_fluxes_fail_the_update() {
    let h = periodic_1d();
    let substrate = NestedSubstrate::new(h.clone());
    let mut engine = AdvectionEngine::new(config(1, 1).validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let sold = scalars(&h, |_| (1.0, vec![1.0]));
    let mut sflux = engine.new_fluxes();
    sflux.iter_mut().for_each(|f| f.fill(f64::NAN));
    let background = background(&h, 1.0, 2.0);
    let scalar_step = ScalarStep { sold: &sold, sflux: &sflux, force: &zeros(&h, 3), background: &background, dt: 0.1 };
    let mut snew = sold.clone();

    let result = engine.update_scal(2, 1, &scalar_step, &mut snew, &IdealGas);
    assert_eq!(result, Err(Error::NonFiniteState { level: 0, component: 2 }));
}

#[test]
fn face_averaged_two_level_update_conserves_the_composite_species() {
    let h = two_level_2d();
    let substrate = NestedSubstrate::new(h.clone());
    let config = AdvectionConfig { consistency: Consistency::AverageDownFaces, ..config(2, 2) };
    let mut engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let uold = velocity(&h, swirl);
    let mut sold = scalars(&h, |x| {
        let (rho, fractions) = stratified_mixture(x);
        (rho, vec![fractions[0], 1.0 - fractions[0]])
    });
    substrate.average_down(&mut sold, 0..4);

    let out = step(&mut engine, &uold, &sold, None, 0.005);

    for q in [0, 2, 3] {
        assert_relative_eq!(total(&out.snew, &h, q), total(&sold, &h, q), max_relative = 1e-11);
    }
}

#[test]
fn enthalpy_below_the_cutoff_comes_from_the_equation_of_state() {
    let h = periodic_2d();
    let substrate = NestedSubstrate::new(h.clone());
    let uold = velocity(&h, |_, p| p.copy_from_slice(&[0.0, 0.0]));
    let sold = scalars(&h, |_| (1.0, vec![1.0]));

    for (do_eos_h_above_cutoff, base_cutoff_density, rhoh, eos_cells) in [(true, 1.5, 2.5, 256), (false, 1.5, 2.0, 0), (true, 0.5, 2.0, 0)] {
        let config = AdvectionConfig { base_cutoff_density, do_eos_h_above_cutoff, ..config(2, 1) };
        let mut engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();

        let out = step(&mut engine, &uold, &sold, None, 0.01);

        assert_eq!(out.enthalpy.eos_cells, eos_cells);
        assert_uniform(&out.snew, 1, rhoh, 1e-14);
    }
}

#[test]
fn walls_conserve_species_and_enthalpy() {
    for kind in [BoundaryKind::SlipWall, BoundaryKind::NoSlipWall, BoundaryKind::Symmetry] {
        let boundaries = PhysicalBoundaries::periodic().with_axis(Axis::J, kind);
        let h = bounded_2d(&boundaries);
        let substrate = NestedSubstrate::new(h.clone());
        let mut engine = AdvectionEngine::new(config(2, 3).validate().unwrap(), &substrate, boundaries).unwrap();
        let uold = velocity(&h, |x, p| {
            p[0] = 0.3 + 0.1 * (2.0 * PI * x[1]).sin();
            p[1] = 0.1 * (2.0 * PI * x[0]).cos() * (PI * x[1]).sin();
        });
        let sold = scalars(&h, stratified_mixture);

        let out = step(&mut engine, &uold, &sold, None, 0.01);

        for q in [0, 1, 2, 3, 4] {
            assert_relative_eq!(total(&out.snew, &h, q), total(&sold, &h, q), max_relative = 1e-12);
        }
    }
}

#[test]
fn uniform_state_is_kept_under_a_uniform_expansion_velocity() {
    let h = periodic_2d();
    let substrate = NestedSubstrate::new(h.clone());
    let mut engine = AdvectionEngine::new(config(2, 2).validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let uold = velocity(&h, |_, p| p.copy_from_slice(&[0.2, 0.1]));
    let sold = scalars(&h, |_| (1.0, vec![0.25, 0.75]));
    let profile = |centering, value| Profile::uniform(&h, Axis::J, centering, value);
    let background = BackgroundPair::steady(
        0.0,
        profile(Centering::Cell, 1.0),
        profile(Centering::Edge, 1.0),
        profile(Centering::Cell, 2.0),
        profile(Centering::Edge, 2.0),
        profile(Centering::Cell, 1.0),
        ExpansionVelocity::planar(profile(Centering::Edge, 0.1)));

    let out = step_with(&mut engine, &uold, &sold, None, &background, 0.01);

    assert_uniform(&out.snew, 0, 1.0, 1e-12);
    assert_uniform(&out.snew, 1, 2.0, 1e-12);
    assert_uniform(&out.snew, 3, 0.75, 1e-12);
    assert_uniform(&out.unew, 0, 0.2, 1e-12);
    assert_uniform(&out.unew, 1, 0.1, 1e-12);
}

#[test]
fn uniform_state_is_kept_in_spherical_geometry() {
    let domain = IndexSpace::new(0..8, 0..8, 0..8);
    let geometry = Geometry::new(domain.clone(), [0.0; 3], [1.0; 3], [true; 3]);
    let h = Hierarchy::new(geometry, vec![domain]);
    let substrate = NestedSubstrate::new(h.clone());
    let config = AdvectionConfig { coordinates: Coordinates::Spherical, ..config(3, 2) };
    let mut engine = AdvectionEngine::new(config.validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let uold = velocity(&h, |_, p| p.copy_from_slice(&[0.2, 0.1, 0.3]));
    let sold = scalars(&h, |_| (1.0, vec![0.5, 0.5]));

    let cells = |value| -> Vec<LevelField> {
        let mut field = zeros(&h, 1);
        field.iter_mut().for_each(|f| f.fill_field(0, value));
        field
    };
    let faces = |value| -> Vec<EdgeField> {
        h.levels()
            .iter()
            .map(|level| {
                let mut f = EdgeField::zeros(level, 1, 0);
                f.fill(value);
                f
            })
            .collect()
    };
    let maps = SphericalMaps {
        rho0_cart: cells(1.0),
        rhoh0_cart: cells(2.0),
        p0_cart: cells(1.0),
        rho0mac: faces(1.0),
        rhoh0mac: faces(2.0),
        h0mac: faces(2.0),
    };
    let profile = |centering, value| Profile::uniform(&h, Axis::K, centering, value);
    let expansion = ExpansionVelocity::spherical(profile(Centering::Edge, 0.0), zeros(&h, 3), faces(0.0));
    let mut background = BackgroundPair::steady(
        0.0,
        profile(Centering::Cell, 1.0),
        profile(Centering::Edge, 1.0),
        profile(Centering::Cell, 2.0),
        profile(Centering::Edge, 2.0),
        profile(Centering::Cell, 1.0),
        expansion);
    background.old.spherical = Some(maps.clone());
    background.new.spherical = Some(maps);

    let out = step_with(&mut engine, &uold, &sold, None, &background, 0.01);

    assert_uniform(&out.snew, 0, 1.0, 1e-12);
    assert_uniform(&out.snew, 1, 2.0, 1e-12);
    assert_uniform(&out.snew, 2, 0.5, 1e-12);
    assert_uniform(&out.unew, 2, 0.3, 1e-12);
}

#[test]
fn enthalpy_fluxes_survive_a_later_species_assembly() {
    let h = two_level_2d();
    let substrate = NestedSubstrate::new(h.clone());
    let mut engine = AdvectionEngine::new(config(2, 1).validate().unwrap(), &substrate, PhysicalBoundaries::periodic()).unwrap();
    let background = background(&h, 1.0, 2.0);
    let mut umac: Vec<EdgeField> = h.levels().iter().map(|level| EdgeField::zeros(level, 1, 1)).collect();
    umac.iter_mut().for_each(|u| u.fill(0.5));
    let sedge: Vec<EdgeField> = h.levels()
        .iter()
        .enumerate()
        .map(|(level, l)| {
            let mut f = EdgeField::zeros(l, 3, 0);
            f.fill(1.0 + level as f64);
            f
        })
        .collect();
    let mut sflux = engine.new_fluxes();
    let mut state: Vec<LevelField> = h.levels().iter().map(|level| LevelField::zeros(level, 3, 0)).collect();

    engine.make_rhoh_flux(&mut sflux, &sedge, &umac, &background, 0.01).unwrap();
    engine.make_rho_x_flux(&mut sflux, &sedge, &umac, &background, None, 0.01).unwrap();

    let mut registers = engine.registers().clone();
    registers.reflux(&h, &mut state, 1..2);
    assert!(state[0].max_abs(1..2) > 0.0);
}

