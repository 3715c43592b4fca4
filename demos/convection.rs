use clap::Parser;
use log::{info, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use stratiflow::advection::{AdvectionEngine, StepInputs};
use stratiflow::base_state::{BackgroundPair, BaseStateSnapshot, Centering, ExpansionVelocity, Profile};
use stratiflow::boundary::{BoundaryKind, PhysicalBoundaries};
use stratiflow::collaborator::{enthalpy_forcing, Microphysics, Projection, ProjectionBoundary, Tolerance};
use stratiflow::config::{AdvectionConfig, Reconstruction};
use stratiflow::field::{EdgeField, LevelField};
use stratiflow::geometry::Geometry;
use stratiflow::hierarchy::Hierarchy;
use stratiflow::index_space::{Axis, IndexSpace};
use stratiflow::layout::ComponentLayout;
use stratiflow::substrate::{MeshSubstrate, NestedSubstrate};




const GRAVITY: f64 = 1.0;
const SCALE_HEIGHT: f64 = 0.5;
const GAMMA: f64 = 5.0 / 3.0;
const ASH_HEATING: f64 = 1e-2;




#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Scheme {
    Plm,
    Ppm,
    Ppm2,
}

impl From<Scheme> for Reconstruction {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Plm => Reconstruction::PiecewiseLinear,
            Scheme::Ppm => Reconstruction::Ppm,
            Scheme::Ppm2 => Reconstruction::PpmExtremumPreserving,
        }
    }
}




/**
 * A buoyant bubble of light ash rising through an isothermal atmosphere of
 * fuel.
 */
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Opts {
    #[clap(short = 'n', long, default_value = "32")]
    cells: i64,

    #[clap(short = 's', long, default_value = "20")]
    steps: usize,

    #[clap(long, default_value = "0.5")]
    cfl: f64,

    #[clap(long, default_value = "0.01")]
    max_dt: f64,

    #[clap(long, value_enum, default_value = "ppm")]
    scheme: Scheme,

    /// Add a refined level around the bubble.
    #[clap(long)]
    refine: bool,

    #[clap(short = 'o', long, default_value = "convection.cbor")]
    output: String,

    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}




/// Leaves the velocity unchanged. The demo is short enough that the
/// divergence of the predicted velocity stays small.
struct Unprojected;

impl Projection for Unprojected {
    fn project(
        &self,
        velocity: &[EdgeField],
        coefficient: &[LevelField],
        _boundaries: [[ProjectionBoundary; 2]; 3],
        _tolerance: Tolerance) -> stratiflow::Result<(Vec<EdgeField>, Vec<LevelField>)>
    {
        let mut pressure = coefficient.to_vec();
        pressure.iter_mut().for_each(|p| p.fill_field(0, 0.0));
        Ok((velocity.to_vec(), pressure))
    }
}




/// Ideal gas whose ash keeps releasing heat.
struct IdealGas;

impl Microphysics for IdealGas {
    fn compute_heating(&self, state: &[f64]) -> f64 {
        ASH_HEATING * state[ComponentLayout::FIRST_SPECIES + 1]
    }

    fn rhoh_from_eos(&self, _rho: f64, _rho_x: &[f64], p0: f64) -> f64 {
        GAMMA / (GAMMA - 1.0) * p0
    }
}




#[derive(Serialize)]
struct Output<'a> {
    time: f64,
    steps: usize,
    hierarchy: &'a Hierarchy,
    velocity: &'a [LevelField],
    scalars: &'a [LevelField],
}




fn atmosphere(z: f64) -> f64 {
    (-z / SCALE_HEIGHT).exp()
}

fn bubble(x: [f64; 3]) -> f64 {
    (-((x[0] - 0.5).powi(2) + (x[1] - 0.3).powi(2)) / 0.01).exp()
}

fn hierarchy(cells: i64, refine: bool, boundaries: &PhysicalBoundaries) -> Hierarchy {
    let domain = IndexSpace::new_2d(0..cells, 0..cells);
    let geometry = Geometry::new(domain, [0.0; 3], [1.0, 1.0, 0.0], boundaries.periodicity());
    let half = cells / 2;
    let base = Hierarchy::new(geometry, vec![IndexSpace::new_2d(0..half, 0..cells), IndexSpace::new_2d(half..cells, 0..cells)]);

    if refine {
        base.refine(vec![IndexSpace::new_2d(2 * (cells / 4)..2 * (3 * cells / 4), 0..cells)])
    } else {
        base
    }
}

fn background(h: &Hierarchy, time: f64, dt: f64) -> BackgroundPair {
    let profile = |centering, f: fn(f64) -> f64| Profile::from_function(h, Axis::J, centering, f);
    let rho0 = |c| profile(c, atmosphere);
    let p0 = |c| profile(c, |z| atmosphere(z) * GRAVITY * SCALE_HEIGHT);
    let rhoh0 = |c| profile(c, |z| GAMMA / (GAMMA - 1.0) * atmosphere(z) * GRAVITY * SCALE_HEIGHT);

    let old = BaseStateSnapshot::new(time, rho0(Centering::Cell), rho0(Centering::Edge), rhoh0(Centering::Cell), rhoh0(Centering::Edge), p0(Centering::Cell));
    let new = BaseStateSnapshot::new(time + dt, rho0(Centering::Cell), rho0(Centering::Edge), rhoh0(Centering::Cell), rhoh0(Centering::Edge), p0(Centering::Cell));
    let expansion = ExpansionVelocity::planar(Profile::uniform(h, Axis::J, Centering::Edge, 0.0));
    BackgroundPair::new(old, new, expansion)
}

fn initial_scalars(h: &Hierarchy, layout: &ComponentLayout) -> Vec<LevelField> {
    h.levels()
        .iter()
        .map(|level| LevelField::from_function(level, layout.num_components(), 2, |x, p| {
            let ash = 0.5 * bubble(x);
            let rho = atmosphere(x[1]) * (1.0 - 0.1 * bubble(x));
            let pressure = atmosphere(x[1]) * GRAVITY * SCALE_HEIGHT;

            p[ComponentLayout::RHO] = rho;
            p[ComponentLayout::RHOH] = GAMMA / (GAMMA - 1.0) * pressure;
            p[ComponentLayout::FIRST_SPECIES] = rho * (1.0 - ash);
            p[ComponentLayout::FIRST_SPECIES + 1] = rho * ash;
        }))
        .collect()
}

/**
 * Buoyancy on the vertical velocity: the density deficit relative to the
 * background, over the density.
 */
fn buoyancy(h: &Hierarchy, scalars: &[LevelField]) -> Vec<LevelField> {
    h.levels()
        .iter()
        .zip(scalars)
        .map(|(level, s)| {
            let mut force = LevelField::zeros(level, 2, 0);
            let geometry = level.geometry();

            for ((valid, patch), s) in force.valid().to_vec().iter().zip(force.patches_mut()).zip(s.patches()) {
                for c in valid.iter() {
                    let rho = s.get(c, ComponentLayout::RHO);
                    let rho0 = atmosphere(geometry.cell_center(c)[1]);
                    patch.set(c, 1, -(rho - rho0) / rho * GRAVITY)
                }
            }
            force
        })
        .collect()
}




fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    SimpleLogger::new().with_level(opts.log_level).init()?;
    info!("{:?}", opts);

    let config = AdvectionConfig {
        dimension: 2,
        reconstruction: opts.scheme.into(),
        num_species: 2,
        base_cutoff_density: 1e-4,
        ..Default::default()
    }
    .validate()?;

    let boundaries = PhysicalBoundaries::periodic().with_axis(Axis::J, BoundaryKind::SlipWall);
    let h = hierarchy(opts.cells, opts.refine, &boundaries);
    let substrate = NestedSubstrate::new(h.clone());
    let mut engine = AdvectionEngine::new(config, &substrate, boundaries)?;
    let layout = *engine.layout();

    let mut scalars = initial_scalars(&h, &layout);
    substrate.average_down(&mut scalars, 0..layout.num_components());
    let mut velocity: Vec<LevelField> = h.levels().iter().map(|level| LevelField::zeros(level, 2, 2)).collect();
    let coefficient: Vec<LevelField> = h.levels().iter().map(|level| LevelField::zeros(level, 1, 0)).collect();
    let finest = h.level(h.finest_level()).geometry().cell_size(Axis::I);
    let mut time = 0.0;

    for step in 0..opts.steps {
        let umax = velocity.iter().map(|u| u.max_abs(0..2)).fold(0.0, f64::max);
        let dt = if umax > 0.0 { (opts.cfl * finest / umax).min(opts.max_dt) } else { opts.max_dt };
        let background = background(&h, time, dt);
        let velocity_force = buoyancy(&h, &scalars);
        let scalar_force = enthalpy_forcing(&IdealGas, &scalars);

        let inputs = StepInputs {
            uold: &velocity,
            sold: &scalars,
            velocity_force: &velocity_force,
            scalar_force: &scalar_force,
            background: &background,
            coefficient: &coefficient,
            sponge: None,
            rho0_predicted_edge: None,
            dt,
        };
        let out = engine.advance(&inputs, &Unprojected, &IdealGas)?;

        velocity = out.unew;
        scalars = out.snew;
        time += dt;

        info!("[{}] t={:.4} dt={:.3e} max|u|={:.3e} floored={}", step + 1, time, dt, umax, out.species.floored);
    }

    let file = std::fs::File::create(&opts.output)?;
    let mut buffer = std::io::BufWriter::new(file);
    let output = Output { time, steps: opts.steps, hierarchy: &h, velocity: &velocity, scalars: &scalars };
    ciborium::ser::into_writer(&output, &mut buffer)?;
    info!("wrote {}", opts.output);
    Ok(())
}
