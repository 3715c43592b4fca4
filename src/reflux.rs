//! Flux registers, which keep a coarse level consistent with the fluxes of
//! the next finer level through the faces of the coarse-fine interface.
//!
//! Over one update the register between levels `L` and `L + 1` receives the
//! coarse fluxes through the interface (negated, scaled by `dt` and the
//! coarse face area), then the fine fluxes through the same faces (scaled by
//! `dt` and the fine face area). The accumulated mismatch is then added to
//! the uncovered coarse cell next to each interface face, divided by its
//! volume.

use std::ops::Range;
use log::debug;
use rayon::prelude::*;
use crate::field::{EdgeField, LevelField};
use crate::geometry::Geometry;
use crate::hierarchy::{Hierarchy, REFINEMENT_RATIO};
use crate::index_space::{Axis, Index, IndexSpace};




/**
 * The lifecycle of a register over one update.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterState {
    Empty,
    CoarseAccumulating,
    FineAccumulating,
    Reconciled,
}




/**
 * One coarse face on the interface between a coarse level and the next
 * finer one.
 */
#[derive(Clone, Debug, PartialEq)]
struct InterfaceFace {
    axis: Axis,
    /// The face, as an index of the coarse level.
    coarse: Index,
    /// The fine faces covering the coarse face.
    fine: IndexSpace,
    /// The uncovered coarse cell, inside the domain.
    cell: Index,
    /// Whether the fine level lies on the high side of the face.
    fine_above: bool,
}




/**
 * The register between level `fine_level - 1` and level `fine_level`. It
 * has one accumulator per interface face and component.
 */
#[derive(Clone, Debug)]
pub struct FluxRegister {
    fine_level: usize,
    num_fields: usize,
    faces: Vec<InterfaceFace>,
    accumulated: Vec<f64>,
    state: RegisterState,
}




// ============================================================================
impl FluxRegister {

    /**
     * Find the interface faces of a fine level and create an empty register
     * for them.
     */
    pub fn new(hierarchy: &Hierarchy, fine_level: usize, num_fields: usize) -> Self {
        debug_assert!(fine_level >= 1 && fine_level <= hierarchy.finest_level());

        let rank = hierarchy.rank();
        let coarse_level = fine_level - 1;
        let geometry = hierarchy.level(coarse_level).geometry();
        let mut faces = Vec::new();

        for fine_box in hierarchy.level(fine_level).boxes() {
            let coarse_box = fine_box.coarsen_by(REFINEMENT_RATIO);

            for axis in Axis::active(rank) {
                let r = coarse_box.range(axis);

                for (face, fine_above) in [(r.start, true), (r.end, false)] {
                    for f in coarse_box.with_range(axis, face..face + 1).iter() {
                        let outside = if fine_above { axis.shift(f, -1) } else { f };

                        if geometry.outside(outside).is_some() {
                            continue
                        }
                        let cell = geometry.wrap_periodic(outside);

                        if hierarchy.is_covered(coarse_level, cell) {
                            continue
                        }
                        let coarse = if fine_above { axis.shift(cell, 1) } else { cell };
                        let fine = IndexSpace::from_corners(rank, f, (f.0 + 1, f.1 + 1, f.2 + 1))
                            .refine_by(REFINEMENT_RATIO)
                            .with_range(axis, face * REFINEMENT_RATIO..face * REFINEMENT_RATIO + 1);

                        faces.push(InterfaceFace { axis, coarse, fine, cell, fine_above });
                    }
                }
            }
        }
        let accumulated = vec![0.0; faces.len() * num_fields];
        Self { fine_level, num_fields, faces, accumulated, state: RegisterState::Empty }
    }

    pub fn fine_level(&self) -> usize {
        self.fine_level
    }

    pub fn state(&self) -> RegisterState {
        self.state
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /**
     * Zero the accumulators and return to the empty state.
     */
    pub fn reset(&mut self) {
        self.accumulated.iter_mut().for_each(|a| *a = 0.0);
        self.state = RegisterState::Empty;
    }

    /**
     * Zero the accumulators of the given components only, and return to the
     * empty state so the next update can register its coarse fluxes. The
     * other components keep what they have accumulated.
     */
    pub fn reset_components(&mut self, components: Range<usize>) {
        for acc in self.accumulated.chunks_mut(self.num_fields) {
            acc[components.clone()].iter_mut().for_each(|a| *a = 0.0)
        }
        self.state = RegisterState::Empty;
    }

    /**
     * Add `lookup(face, q)` to the accumulator of every interface face, for
     * the given components.
     */
    fn accumulate<F>(&mut self, components: Range<usize>, lookup: F)
    where
        F: Fn(&InterfaceFace, usize) -> f64 + Sync
    {
        let num_fields = self.num_fields;
        let faces = &self.faces;

        self.accumulated
            .par_chunks_mut(num_fields)
            .zip(faces.par_iter())
            .for_each(|(acc, face)| {
                for q in components.clone() {
                    acc[q] += lookup(face, q)
                }
            });
    }

    /**
     * Register the coarse-level fluxes: `-dt * area` times the flux through
     * each interface face.
     */
    pub fn crse_init(&mut self, fluxes: &EdgeField, components: Range<usize>, geometry: &Geometry, dt: f64) {
        debug_assert!(
            matches!(self.state, RegisterState::Empty | RegisterState::CoarseAccumulating),
            "coarse fluxes registered after fine fluxes");

        self.accumulate(components, |face, q| {
            let area = geometry.face_area(face.axis);
            -dt * area * fluxes.value_at(face.axis, face.coarse, q).unwrap_or(0.0)
        });
        self.transition(RegisterState::CoarseAccumulating);
    }

    /**
     * Register the fine-level fluxes: `dt * area` times the flux through
     * each fine face covering an interface face.
     */
    pub fn fine_add(&mut self, fluxes: &EdgeField, components: Range<usize>, geometry: &Geometry, dt: f64) {
        debug_assert!(
            self.state != RegisterState::Reconciled,
            "fine fluxes registered after reflux");

        self.accumulate(components, |face, q| {
            let area = geometry.face_area(face.axis);
            face.fine
                .iter()
                .map(|f| dt * area * fluxes.value_at(face.axis, f, q).unwrap_or(0.0))
                .sum()
        });
        self.transition(RegisterState::FineAccumulating);
    }

    /**
     * Apply the accumulated mismatch to the uncovered coarse cells, for the
     * given components, then zero the accumulators. A second reflux with no
     * new contributions changes nothing.
     */
    pub fn reflux(&mut self, coarse: &mut LevelField, components: Range<usize>, volume: f64) {
        let num_fields = self.num_fields;

        let valid = coarse.valid().to_vec();

        for (face, acc) in self.faces.iter().zip(self.accumulated.chunks_mut(num_fields)) {
            let sign = if face.fine_above { -1.0 } else { 1.0 };

            if let Some(n) = valid.iter().position(|v| v.contains(face.cell)) {
                let patch = &mut coarse.patches_mut()[n];

                for q in components.clone() {
                    *patch.get_mut(face.cell, q) += sign * acc[q] / volume
                }
            }
            for q in components.clone() {
                acc[q] = 0.0
            }
        }
        self.transition(RegisterState::Reconciled);
    }

    fn transition(&mut self, state: RegisterState) {
        if self.state != state {
            debug!("flux register {}: {:?} -> {:?}", self.fine_level, self.state, state);
            self.state = state;
        }
    }
}




/**
 * The registers of every coarse-fine level pair of a hierarchy, indexed by
 * fine level.
 */
#[derive(Clone, Debug)]
pub struct FluxRegisters {
    registers: Vec<FluxRegister>,
}




// ============================================================================
impl FluxRegisters {

    pub fn new(hierarchy: &Hierarchy, num_fields: usize) -> Self {
        let registers = (1..hierarchy.num_levels())
            .map(|fine_level| FluxRegister::new(hierarchy, fine_level, num_fields))
            .collect();
        Self { registers }
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// The register whose fine side is the given level.
    pub fn register(&self, fine_level: usize) -> &FluxRegister {
        &self.registers[fine_level - 1]
    }

    pub fn reset(&mut self) {
        self.registers.iter_mut().for_each(FluxRegister::reset)
    }

    pub fn reset_components(&mut self, components: Range<usize>) {
        self.registers.iter_mut().for_each(|r| r.reset_components(components.clone()))
    }

    /**
     * Register the fluxes of one level: as the coarse side of the register
     * above it, if there is a finer level, and as the fine side of the
     * register below it, if there is a coarser level.
     */
    pub fn contribute(&mut self, hierarchy: &Hierarchy, level: usize, fluxes: &EdgeField, components: Range<usize>, dt: f64) {
        let geometry = hierarchy.level(level).geometry();

        if level < hierarchy.finest_level() {
            self.registers[level].crse_init(fluxes, components.clone(), geometry, dt);
        }
        if level > 0 {
            self.registers[level - 1].fine_add(fluxes, components, geometry, dt);
        }
    }

    /**
     * Reflux every level pair, from the finest down to the coarsest.
     */
    pub fn reflux(&mut self, hierarchy: &Hierarchy, state: &mut [LevelField], components: Range<usize>) {
        for register in self.registers.iter_mut().rev() {
            let coarse_level = register.fine_level() - 1;
            let volume = hierarchy.level(coarse_level).geometry().cell_volume();
            register.reflux(&mut state[coarse_level], components.clone(), volume);
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    fn hierarchy(periodic: bool, fine: std::ops::Range<i64>) -> Hierarchy {
        let domain = IndexSpace::new_1d(0..8);
        let geometry = crate::geometry::Geometry::new(domain.clone(), [0.0; 3], [1.0, 0.0, 0.0], [periodic, false, false]);
        Hierarchy::new(geometry, vec![domain]).refine(vec![IndexSpace::new_1d(fine)])
    }

    fn fluxes(h: &Hierarchy, coarse: f64, fine: f64) -> Vec<EdgeField> {
        h.levels()
            .iter()
            .zip([coarse, fine])
            .map(|(level, value)| {
                let mut f = EdgeField::zeros(level, 1, 0);
                f.fill(value);
                f
            })
            .collect()
    }

    #[test]
    fn interface_faces_skip_the_physical_boundary() {
        assert_eq!(FluxRegister::new(&hierarchy(true, 4..8), 1, 1).num_faces(), 2);
        assert_eq!(FluxRegister::new(&hierarchy(false, 0..4), 1, 1).num_faces(), 1);
    }

    #[test]
    fn reflux_corrects_the_cells_next_to_the_interface() {
        let h = hierarchy(true, 4..8);
        let flux = fluxes(&h, 1.0, 1.5);
        let mut registers = FluxRegisters::new(&h, 1);
        let mut state: Vec<LevelField> = h.levels().iter().map(|l| LevelField::zeros(l, 1, 0)).collect();

        for level in 0..2 {
            registers.contribute(&h, level, &flux[level], 0..1, 0.5);
        }
        assert_eq!(registers.register(1).state(), RegisterState::FineAccumulating);

        registers.reflux(&h, &mut state, 0..1);
        assert_eq!(state[0].value_at((1, 0, 0), 0), Some(-2.0));
        assert_eq!(state[0].value_at((4, 0, 0), 0), Some(2.0));
        assert_eq!(state[0].value_at((0, 0, 0), 0), Some(0.0));
        assert_eq!(registers.register(1).state(), RegisterState::Reconciled);
    }

    #[test]
    fn a_second_reflux_changes_nothing() {
        let h = hierarchy(true, 4..8);
        let flux = fluxes(&h, 1.0, 3.0);
        let mut registers = FluxRegisters::new(&h, 1);
        let mut state: Vec<LevelField> = h.levels().iter().map(|l| LevelField::zeros(l, 1, 0)).collect();

        for level in 0..2 {
            registers.contribute(&h, level, &flux[level], 0..1, 0.25);
        }
        registers.reflux(&h, &mut state, 0..1);
        let once = state.clone();
        registers.reflux(&h, &mut state, 0..1);
        assert_eq!(state, once);
    }

    #[test]
    fn matching_fluxes_leave_nothing_to_correct() {
        let h = hierarchy(true, 4..8);
        let flux = fluxes(&h, 2.0, 2.0);
        let mut registers = FluxRegisters::new(&h, 1);
        let mut state: Vec<LevelField> = h.levels().iter().map(|l| LevelField::zeros(l, 1, 0)).collect();

        for level in 0..2 {
            registers.contribute(&h, level, &flux[level], 0..1, 1.0);
        }
        registers.reflux(&h, &mut state, 0..1);
        assert_eq!(state[0].sum_valid(0, |_| false), 0.0);
    }

    #[test]
    fn resetting_one_component_keeps_the_others() {
        let h = hierarchy(true, 4..8);
        let flux: Vec<EdgeField> = h.levels()
            .iter()
            .zip([1.0, 1.5])
            .map(|(level, value)| {
                let mut f = EdgeField::zeros(level, 2, 0);
                f.fill(value);
                f
            })
            .collect();
        let mut registers = FluxRegisters::new(&h, 2);
        let mut state: Vec<LevelField> = h.levels().iter().map(|l| LevelField::zeros(l, 2, 0)).collect();

        for level in 0..2 {
            registers.contribute(&h, level, &flux[level], 1..2, 0.5);
        }
        registers.reset_components(0..1);
        assert_eq!(registers.register(1).state(), RegisterState::Empty);

        for level in 0..2 {
            registers.contribute(&h, level, &flux[level], 0..1, 0.5);
        }
        registers.reflux(&h, &mut state, 0..2);
        assert_eq!(state[0].value_at((1, 0, 0), 0), Some(-2.0));
        assert_eq!(state[0].value_at((1, 0, 0), 1), Some(-2.0));
        assert_eq!(state[0].value_at((4, 0, 0), 1), Some(2.0));
    }
}
