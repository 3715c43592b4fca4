use serde::{Deserialize, Serialize};
use crate::index_space::Axis;




/// Low or high end of the domain along an axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Lo,
    Hi,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Lo, Side::Hi];

    pub fn number(self) -> usize {
        match self {
            Side::Lo => 0,
            Side::Hi => 1,
        }
    }
}




/// Physical condition imposed on one face of the domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    Periodic,
    Inflow,
    Outflow,
    SlipWall,
    NoSlipWall,
    Symmetry,
}




/**
 * Boundary code of a single field component on one domain face. The code
 * decides how ghost cells are filled, whether slopes are allowed to reach
 * across the face, and what value a predicted edge state takes there.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BcCode {
    /// Periodic face; the neighbouring data is interior data.
    Interior,
    /// Prescribed (Dirichlet) value held in the ghost cells.
    ExtDir,
    /// First-order extrapolation (zero gradient).
    FoExtrap,
    /// Mirror image across the face.
    ReflectEven,
    /// Negated mirror image across the face.
    ReflectOdd,
}

impl BcCode {

    /// Reflecting codes forbid one-sided differences across the face.
    pub fn zeroes_slope(self) -> bool {
        matches!(self, BcCode::ReflectEven | BcCode::ReflectOdd)
    }

    /**
     * The face value a predicted scalar edge state takes on a physical face,
     * given the state extrapolated from the interior cell and the adjacent
     * ghost cell value. Returns `None` on periodic faces.
     */
    pub fn edge_value(self, interior: f64, ghost: f64) -> Option<f64> {
        match self {
            BcCode::Interior => None,
            BcCode::ExtDir => Some(ghost),
            BcCode::FoExtrap | BcCode::ReflectEven => Some(interior),
            BcCode::ReflectOdd => Some(0.0),
        }
    }
}




/**
 * Boundary codes of one field component on every face of the domain, along
 * with the values held in `ExtDir` ghost cells.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentBc {
    codes: [[BcCode; 2]; 3],
    values: [[f64; 2]; 3],
}

impl ComponentBc {

    pub fn new(codes: [[BcCode; 2]; 3], values: [[f64; 2]; 3]) -> Self {
        Self { codes, values }
    }

    pub fn code(&self, axis: Axis, side: Side) -> BcCode {
        self.codes[axis.number()][side.number()]
    }

    /// Value held in the ghost cells of an `ExtDir` face.
    pub fn value(&self, axis: Axis, side: Side) -> f64 {
        self.values[axis.number()][side.number()]
    }
}




/**
 * The physical boundary kind on each face of the domain. Component boundary
 * codes for scalars and velocities are derived from it.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalBoundaries {
    kinds: [[BoundaryKind; 2]; 3],
}




// ============================================================================
impl PhysicalBoundaries {

    /**
     * Start from a fully periodic domain.
     */
    pub fn periodic() -> Self {
        Self { kinds: [[BoundaryKind::Periodic; 2]; 3] }
    }

    /**
     * Set the boundary kind on one face. Periodicity must be set on both
     * faces of an axis.
     */
    pub fn with(mut self, axis: Axis, side: Side, kind: BoundaryKind) -> Self {
        self.kinds[axis.number()][side.number()] = kind;
        self
    }

    /**
     * Set the same boundary kind on both faces of an axis.
     */
    pub fn with_axis(self, axis: Axis, kind: BoundaryKind) -> Self {
        self.with(axis, Side::Lo, kind).with(axis, Side::Hi, kind)
    }

    pub fn kind(&self, axis: Axis, side: Side) -> BoundaryKind {
        self.kinds[axis.number()][side.number()]
    }

    pub fn is_periodic(&self, axis: Axis) -> bool {
        self.kind(axis, Side::Lo) == BoundaryKind::Periodic
    }

    pub fn periodicity(&self) -> [bool; 3] {
        [self.is_periodic(Axis::I), self.is_periodic(Axis::J), self.is_periodic(Axis::K)]
    }

    /// The first inflow face, in axis then side order, if any.
    pub fn first_inflow(&self) -> Option<(Axis, Side)> {
        Axis::ALL
            .into_iter()
            .flat_map(|axis| Side::BOTH.into_iter().map(move |side| (axis, side)))
            .find(|&(axis, side)| self.kind(axis, side) == BoundaryKind::Inflow)
    }

    /**
     * Boundary codes for a transported scalar. Inflow faces hold the given
     * value.
     */
    pub fn scalar_bc(&self, inflow: f64) -> ComponentBc {
        self.component_bc(|kind| match kind {
            BoundaryKind::Periodic => (BcCode::Interior, 0.0),
            BoundaryKind::Inflow => (BcCode::ExtDir, inflow),
            BoundaryKind::Outflow => (BcCode::FoExtrap, 0.0),
            BoundaryKind::SlipWall | BoundaryKind::NoSlipWall | BoundaryKind::Symmetry => (BcCode::ReflectEven, 0.0),
        })
    }

    /**
     * Boundary codes for one velocity component. Inflow faces hold the given
     * value; no-slip walls hold zero in the tangential components.
     */
    pub fn velocity_bc(&self, component: Axis, inflow: f64) -> ComponentBc {
        let mut bc = self.component_bc(|kind| match kind {
            BoundaryKind::Periodic => (BcCode::Interior, 0.0),
            BoundaryKind::Inflow => (BcCode::ExtDir, inflow),
            BoundaryKind::Outflow => (BcCode::FoExtrap, 0.0),
            BoundaryKind::SlipWall | BoundaryKind::Symmetry => (BcCode::ReflectEven, 0.0),
            BoundaryKind::NoSlipWall => (BcCode::ExtDir, 0.0),
        });

        for side in Side::BOTH {
            let code = &mut bc.codes[component.number()][side.number()];

            if matches!(self.kind(component, side), BoundaryKind::SlipWall | BoundaryKind::NoSlipWall | BoundaryKind::Symmetry) {
                *code = BcCode::ReflectOdd;
            }
        }
        bc
    }

    /**
     * Boundary codes for a forcing term: extrapolated from the interior on
     * every physical face.
     */
    pub fn force_bc(&self) -> ComponentBc {
        self.component_bc(|kind| match kind {
            BoundaryKind::Periodic => (BcCode::Interior, 0.0),
            _ => (BcCode::FoExtrap, 0.0),
        })
    }

    fn component_bc<F>(&self, code: F) -> ComponentBc
    where
        F: Fn(BoundaryKind) -> (BcCode, f64),
    {
        let mut codes = [[BcCode::Interior; 2]; 3];
        let mut values = [[0.0; 2]; 3];

        for axis in Axis::ALL {
            for side in Side::BOTH {
                let (c, v) = code(self.kind(axis, side));
                codes[axis.number()][side.number()] = c;
                values[axis.number()][side.number()] = v;
            }
        }
        ComponentBc::new(codes, values)
    }

    /**
     * The value a predicted face velocity takes on a physical face. `normal`
     * tells whether the velocity component is normal to the face,
     * `interior` is the state extrapolated from the interior cell, and
     * `ghost` the adjacent ghost cell value. Returns `None` on periodic
     * faces.
     */
    pub fn velocity_face_value(&self, axis: Axis, side: Side, normal: bool, interior: f64, ghost: f64) -> Option<f64> {
        match self.kind(axis, side) {
            BoundaryKind::Periodic => None,
            BoundaryKind::Inflow => Some(ghost),
            BoundaryKind::SlipWall | BoundaryKind::Symmetry => Some(if normal { 0.0 } else { interior }),
            BoundaryKind::NoSlipWall => Some(0.0),
            BoundaryKind::Outflow if normal => Some(match side {
                Side::Lo => interior.min(0.0),
                Side::Hi => interior.max(0.0),
            }),
            BoundaryKind::Outflow => Some(interior),
        }
    }
}
