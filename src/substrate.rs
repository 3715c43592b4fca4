use std::ops::Range;
use rayon::prelude::*;
use crate::boundary::{BcCode, ComponentBc, Side};
use crate::field::{EdgeField, LevelField};
use crate::geometry::Geometry;
use crate::hierarchy::{Hierarchy, REFINEMENT_RATIO};
use crate::index_space::{coarsen_index, Axis, Index, IndexSpace};




/// The mesh/state substrate: owns the level structure and provides the
/// collective halo and coarse-fine operations the advection engine relies
/// on. Every operation acts on all levels of a multi-level field at once.
///
pub trait MeshSubstrate: Sync {
    /// The level structure the fields live on.
    ///
    fn hierarchy(&self) -> &Hierarchy;

    /// Fill the ghost cells of the given components at every level, from
    /// same-level neighbours, coarser levels, or the physical boundary
    /// codes. `bcs` is indexed by component. `time` names the time level
    /// of the data being filled.
    ///
    fn fill_ghost(&self, field: &mut [LevelField], time: f64, components: Range<usize>, bcs: &[ComponentBc]);

    /// Replace coarse cells covered by a finer level with the average of the
    /// fine cells, from the finest level down.
    ///
    fn average_down(&self, field: &mut [LevelField], components: Range<usize>);

    /// Replace coarse faces coincident with fine faces by the area average of
    /// the fine faces, from the finest level down.
    ///
    fn average_down_faces(&self, faces: &mut [EdgeField]);

    /// Fill the ghost faces of a face field at every level.
    ///
    fn fill_face_ghost(&self, faces: &mut [EdgeField]);
}




/// A substrate for properly nested hierarchies with refinement ratio 2,
/// holding a single time level: ghost cells are filled from the current
/// data, with piecewise-constant interpolation from coarser levels.
///
#[derive(Clone, Debug)]
pub struct NestedSubstrate {
    hierarchy: Hierarchy,
}

impl NestedSubstrate {
    pub fn new(hierarchy: Hierarchy) -> Self {
        Self { hierarchy }
    }
}




// ============================================================================
impl NestedSubstrate {

    fn geometry(&self, level: usize) -> &Geometry {
        self.hierarchy.level(level).geometry()
    }

    /// Return the value of a component at any index of a level: valid data
    /// where it exists, otherwise the image under the boundary codes, or
    /// the covering coarse cell.
    ///
    fn sample(&self, field: &[LevelField], level: usize, index: Index, q: usize, bc: &ComponentBc) -> f64 {
        let geometry = self.geometry(level);
        let index = geometry.wrap_periodic(index);

        if let Some((axis, side)) = geometry.outside(index) {
            let r = geometry.domain().range(axis);
            let i = axis.component(index);
            let (mirror, nearest) = match side {
                Side::Lo => (2 * r.start - 1 - i, r.start),
                Side::Hi => (2 * r.end - 1 - i, r.end - 1),
            };
            return match bc.code(axis, side) {
                BcCode::ExtDir => bc.value(axis, side),
                BcCode::FoExtrap | BcCode::Interior => self.sample(field, level, axis.with(index, nearest), q, bc),
                BcCode::ReflectEven => self.sample(field, level, axis.with(index, mirror), q, bc),
                BcCode::ReflectOdd => -self.sample(field, level, axis.with(index, mirror), q, bc),
            }
        }

        if let Some(value) = field[level].value_at(index, q) {
            value
        } else if level > 0 {
            self.sample(field, level - 1, coarsen_index(index, REFINEMENT_RATIO), q, bc)
        } else {
            debug_assert!(false, "base level does not cover index {:?}", index);
            0.0
        }
    }

    /// Return the value of a face field at any face of a level. Faces beyond
    /// a physical boundary take the nearest boundary face; faces not covered
    /// by the level are interpolated linearly in the normal direction from
    /// the coarser level.
    ///
    fn sample_face(&self, faces: &[EdgeField], level: usize, axis: Axis, face: Index, q: usize) -> f64 {
        let geometry = self.geometry(level);
        let mut face = geometry.wrap_periodic(face);

        for b in Axis::active(geometry.rank()).filter(|&b| !geometry.is_periodic(b)) {
            let r = geometry.domain().range(b);
            let upper = if b == axis { r.end } else { r.end - 1 };
            face = b.with(face, b.component(face).clamp(r.start, upper));
        }

        if let Some(value) = faces[level].value_at(axis, face, q) {
            value
        } else if level > 0 {
            let f = axis.component(face);
            let coarse = coarsen_index(face, REFINEMENT_RATIO);

            if f.rem_euclid(REFINEMENT_RATIO) == 0 {
                self.sample_face(faces, level - 1, axis, axis.with(coarse, f / REFINEMENT_RATIO), q)
            } else {
                let lo = self.sample_face(faces, level - 1, axis, axis.with(coarse, (f - 1) / REFINEMENT_RATIO), q);
                let hi = self.sample_face(faces, level - 1, axis, axis.with(coarse, (f + 1) / REFINEMENT_RATIO), q);
                0.5 * (lo + hi)
            }
        } else {
            debug_assert!(false, "base level does not cover face {:?}", face);
            0.0
        }
    }
}




/// Return the fine cells (or faces) covered by a coarse cell, as an index
/// space of the fine level.
///
fn children(rank: usize, coarse: Index) -> IndexSpace {
    IndexSpace::from_corners(rank, coarse, (coarse.0 + 1, coarse.1 + 1, coarse.2 + 1)).refine_by(REFINEMENT_RATIO)
}




// ============================================================================
impl MeshSubstrate for NestedSubstrate {

    fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    fn fill_ghost(&self, field: &mut [LevelField], _time: f64, components: Range<usize>, bcs: &[ComponentBc]) {
        debug_assert!(bcs.len() >= components.end, "missing boundary codes");

        for level in 0..field.len() {
            let view: &[LevelField] = field;
            let updates: Vec<Vec<(Index, usize, f64)>> = view[level]
                .valid()
                .par_iter()
                .zip(view[level].patches().par_iter())
                .map(|(valid, patch)| {
                    patch.index_space()
                        .iter()
                        .filter(|&i| !valid.contains(i))
                        .flat_map(|i| components.clone().map(move |q| (i, q)))
                        .map(|(i, q)| (i, q, self.sample(view, level, i, q, &bcs[q])))
                        .collect()
                })
                .collect();

            for (patch, updates) in field[level].patches_mut().iter_mut().zip(updates) {
                for (i, q, value) in updates {
                    patch.set(i, q, value)
                }
            }
        }
    }

    fn average_down(&self, field: &mut [LevelField], components: Range<usize>) {
        let rank = self.hierarchy.rank();
        let volume = (REFINEMENT_RATIO as f64).powi(rank as i32);

        for fine_level in (1..field.len()).rev() {
            let (coarse, fine) = field.split_at_mut(fine_level);
            let fine = &fine[0];
            let coarse = &mut coarse[fine_level - 1];
            let valid = coarse.valid().to_vec();

            coarse.patches_mut().par_iter_mut().zip(valid.par_iter()).for_each(|(patch, valid)| {
                for (fine_box, fine_patch) in fine.iter() {
                    if let Some(overlap) = fine_box.coarsen_by(REFINEMENT_RATIO).intersect(valid) {
                        for c in overlap.iter() {
                            for q in components.clone() {
                                let sum: f64 = children(rank, c).iter().map(|f| fine_patch.get(f, q)).sum();
                                patch.set(c, q, sum / volume)
                            }
                        }
                    }
                }
            });
        }
    }

    fn average_down_faces(&self, faces: &mut [EdgeField]) {
        let rank = self.hierarchy.rank();
        let area = (REFINEMENT_RATIO as f64).powi(rank as i32 - 1);

        for fine_level in (1..faces.len()).rev() {
            let (coarse, fine) = faces.split_at_mut(fine_level);
            let fine = &fine[0];
            let coarse = &mut coarse[fine_level - 1];
            let valid = coarse.valid().to_vec();
            let num_fields = coarse.num_fields();

            for axis in Axis::active(rank) {
                coarse.faces_mut(axis).par_iter_mut().zip(valid.par_iter()).for_each(|(patch, valid)| {
                    for (fine_box, fine_patch) in fine.valid().iter().zip(fine.faces(axis)) {
                        let covered = fine_box.coarsen_by(REFINEMENT_RATIO).faces(axis);

                        if let Some(overlap) = covered.intersect(&valid.faces(axis)) {
                            for c in overlap.iter() {
                                let f = children(rank, c).with_range(axis, {
                                    let n = axis.component(c) * REFINEMENT_RATIO;
                                    n..n + 1
                                });
                                for q in 0..num_fields {
                                    let sum: f64 = f.iter().map(|f| fine_patch.get(f, q)).sum();
                                    patch.set(c, q, sum / area)
                                }
                            }
                        }
                    }
                });
            }
        }
    }

    fn fill_face_ghost(&self, faces: &mut [EdgeField]) {
        let rank = self.hierarchy.rank();

        for level in 0..faces.len() {
            for axis in Axis::active(rank) {
                let view: &[EdgeField] = faces;
                let num_fields = view[level].num_fields();
                let updates: Vec<Vec<(Index, usize, f64)>> = view[level]
                    .valid()
                    .par_iter()
                    .zip(view[level].faces(axis).par_iter())
                    .map(|(valid, patch)| {
                        let valid = valid.faces(axis);
                        patch.index_space()
                            .iter()
                            .filter(|&f| !valid.contains(f))
                            .flat_map(|f| (0..num_fields).map(move |q| (f, q)))
                            .map(|(f, q)| (f, q, self.sample_face(view, level, axis, f, q)))
                            .collect()
                    })
                    .collect();

                for (patch, updates) in faces[level].faces_mut(axis).iter_mut().zip(updates) {
                    for (f, q, value) in updates {
                        patch.set(f, q, value)
                    }
                }
            }
        }
    }
}
