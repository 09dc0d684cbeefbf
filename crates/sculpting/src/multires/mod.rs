//! Multiresolution mesh: a stack of subdivision levels with detail offsets.
//!
//! Level 0 is the coarsest. Every finer level holds the operator that
//! derives it from the level below plus its per-vertex detail offsets.
//! Edits happen on the current level only and are marked dirty; [`Multimesh::sync`]
//! later pushes them down by restriction to even vertices and up by
//! re-synthesis from the stored details.

pub mod detail;
pub mod subdivision;

pub use detail::Frame;
pub use subdivision::{Stencil, Subdivision, subdivide};

use glam::Vec3;
use thiserror::Error;
use tracing::debug;

use crate::history::VertexDiff;
use crate::mesh::{Mesh, MeshError, VertexAttributes, VertexBuffers, VertexId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MultiresError {
    #[error("Level {level} out of range for a stack of {count} levels")]
    LevelOutOfRange { level: usize, count: usize },
    #[error("Cannot subdivide an empty mesh")]
    EmptyMesh,
    #[error("Subdivided mesh is invalid: {0}")]
    Mesh(#[from] MeshError),
}

/// How a level is derived from the one below it
#[derive(Debug, Clone, PartialEq)]
pub struct LevelLink {
    pub subdivision: Subdivision,
    /// Per-vertex offset in the smoothed surface's local frame
    pub details: Vec<Vec3>,
}

#[derive(Debug, Clone)]
pub struct Level {
    pub mesh: Mesh,
    /// `None` for the coarsest level
    pub link: Option<LevelLink>,
}

/// Levels removed by [`Multimesh::delete_lower`], kept for restoring
#[derive(Debug, Clone)]
pub struct LowerLevels {
    pub levels: Vec<Level>,
    /// Link the new base level had before it became level 0
    pub base_link: Option<LevelLink>,
}

/// Values one [`Multimesh::sync_recorded`] rewrote, keyed by level.
///
/// History keeps these so undo can put every level back exactly instead of
/// re-deriving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncChanges {
    pub positions: Vec<(usize, VertexDiff<Vec3>)>,
    pub attributes: Vec<(usize, VertexDiff<VertexAttributes>)>,
    /// Detail offsets recomputed by restriction
    pub details: Vec<(usize, VertexDiff<Vec3>)>,
}

fn merge_levels<T: Copy + PartialEq>(into: &mut Vec<(usize, VertexDiff<T>)>, from: Vec<(usize, VertexDiff<T>)>) {
    for (level, diff) in from {
        match into.iter_mut().find(|(l, _)| *l == level) {
            Some((_, existing)) => existing.merge(&diff),
            None => into.push((level, diff)),
        }
    }
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.attributes.is_empty() && self.details.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.positions.iter().all(|(_, d)| d.is_noop())
            && self.attributes.iter().all(|(_, d)| d.is_noop())
            && self.details.iter().all(|(_, d)| d.is_noop())
    }

    /// Fold a later sync into this one, keeping the earliest old values
    pub fn merge(&mut self, other: SyncChanges) {
        merge_levels(&mut self.positions, other.positions);
        merge_levels(&mut self.attributes, other.attributes);
        merge_levels(&mut self.details, other.details);
    }

    /// Split into the geometric part (positions, details) and the paint part
    pub fn split(self) -> (SyncChanges, SyncChanges) {
        let attributes = SyncChanges {
            attributes: self.attributes,
            ..SyncChanges::default()
        };
        let geometry = SyncChanges {
            positions: self.positions,
            details: self.details,
            ..SyncChanges::default()
        };
        (geometry, attributes)
    }
}

/// Copy of what a sync may overwrite on one level
struct LevelValues {
    positions: Vec<Vec3>,
    attributes: Vec<VertexAttributes>,
    details: Vec<Vec3>,
}

impl LevelValues {
    fn capture(level: &Level) -> Self {
        let mesh = &level.mesh;
        Self {
            positions: mesh.positions().to_vec(),
            attributes: (0..mesh.vertex_count() as u32)
                .map(|v| mesh.attributes(VertexId(v)))
                .collect(),
            details: level.link.as_ref().map(|l| l.details.clone()).unwrap_or_default(),
        }
    }
}

fn diff_values<T: Copy + PartialEq>(old: &[T], new: &[T]) -> VertexDiff<T> {
    let mut diff = VertexDiff::default();
    for (i, (&o, &n)) in old.iter().zip(new).enumerate() {
        if o != n {
            diff.record(VertexId(i as u32), o, n);
        }
    }
    diff
}

fn push_nonempty<T>(into: &mut Vec<(usize, VertexDiff<T>)>, level: usize, diff: VertexDiff<T>)
where
    T: Copy + PartialEq,
{
    if !diff.is_empty() {
        into.push((level, diff));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Dirty {
    level: usize,
    positions: bool,
    attributes: bool,
}

#[derive(Debug, Clone)]
pub struct Multimesh {
    levels: Vec<Level>,
    current: usize,
    dirty: Option<Dirty>,
}

impl Multimesh {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            levels: vec![Level { mesh, link: None }],
            current: 0,
            dirty: None,
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn current_level(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Mesh {
        &self.levels[self.current].mesh
    }

    /// Mutable access to the current level; the caller reports what it
    /// changed through [`Multimesh::mark_dirty`]
    pub fn current_mut(&mut self) -> &mut Mesh {
        &mut self.levels[self.current].mesh
    }

    pub fn level(&self, level: usize) -> Option<&Mesh> {
        self.levels.get(level).map(|l| &l.mesh)
    }

    pub fn level_mut(&mut self, level: usize) -> Option<&mut Mesh> {
        self.levels.get_mut(level).map(|l| &mut l.mesh)
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn details(&self, level: usize) -> Option<&[Vec3]> {
        self.levels
            .get(level)
            .and_then(|l| l.link.as_ref())
            .map(|link| link.details.as_slice())
    }

    pub fn finest(&self) -> &Mesh {
        &self.levels[self.levels.len() - 1].mesh
    }

    fn check_level(&self, level: usize) -> Result<(), MultiresError> {
        if level >= self.levels.len() {
            return Err(MultiresError::LevelOutOfRange {
                level,
                count: self.levels.len(),
            });
        }
        Ok(())
    }

    /// Record that `level` was edited; only one edited level is pending at
    /// a time, so a pending edit elsewhere is synchronised first.
    pub fn mark_dirty(&mut self, level: usize, positions: bool, attributes: bool) {
        if let Some(pending) = self.dirty {
            if pending.level != level {
                self.sync();
            }
        }
        let merged = match self.dirty {
            Some(d) => Dirty {
                level,
                positions: d.positions || positions,
                attributes: d.attributes || attributes,
            },
            None => Dirty {
                level,
                positions,
                attributes,
            },
        };
        self.dirty = Some(merged);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Re-express an edit made at `edited` on every other level
    pub fn propagate_edit(&mut self, edited: usize) -> Result<(), MultiresError> {
        self.check_level(edited)?;
        self.mark_dirty(edited, true, true);
        self.sync();
        Ok(())
    }

    /// Bring every level in line with the pending edited level.
    ///
    /// Returns the levels that were rewritten.
    pub fn sync(&mut self) -> Vec<usize> {
        let Some(dirty) = self.dirty.take() else {
            return Vec::new();
        };
        let mut touched = Vec::new();

        for j in (1..=dirty.level).rev() {
            self.restrict(j, dirty);
            touched.push(j - 1);
        }
        for j in dirty.level + 1..self.levels.len() {
            self.prolong(j, dirty);
            touched.push(j);
        }

        if !touched.is_empty() {
            debug!("Multimesh::sync: from level {} rewrote {:?}", dirty.level, touched);
        }
        touched
    }

    /// [`Multimesh::sync`], also reporting every value it overwrote
    pub fn sync_recorded(&mut self) -> (Vec<usize>, SyncChanges) {
        if self.dirty.is_none() {
            return (Vec::new(), SyncChanges::default());
        }
        let before: Vec<LevelValues> = self.levels.iter().map(LevelValues::capture).collect();
        let touched = self.sync();

        let mut changes = SyncChanges::default();
        for (index, (old, level)) in before.iter().zip(&self.levels).enumerate() {
            let new = LevelValues::capture(level);
            push_nonempty(&mut changes.positions, index, diff_values(&old.positions, &new.positions));
            push_nonempty(&mut changes.attributes, index, diff_values(&old.attributes, &new.attributes));
            push_nonempty(&mut changes.details, index, diff_values(&old.details, &new.details));
        }
        (touched, changes)
    }

    /// Forget the pending edit without propagating it
    pub(crate) fn discard_pending(&mut self) {
        self.dirty = None;
    }

    /// Overwrite stored detail offsets of `level`
    pub(crate) fn write_details(&mut self, level: usize, updates: &[(VertexId, Vec3)]) -> Result<(), MultiresError> {
        self.check_level(level)?;
        if let Some(link) = self.levels[level].link.as_mut() {
            for &(v, d) in updates {
                if let Some(slot) = link.details.get_mut(v.index()) {
                    *slot = d;
                }
            }
        }
        Ok(())
    }

    /// Copy level `j`'s even vertices to level `j - 1`, then recompute the
    /// details of level `j` against the new coarse surface.
    fn restrict(&mut self, j: usize, dirty: Dirty) {
        let (lower, upper) = self.levels.split_at_mut(j);
        let coarse = &mut lower[j - 1].mesh;
        let fine = &mut upper[0];
        let n = coarse.vertex_count();

        if dirty.attributes {
            coarse.replace_attributes(
                fine.mesh.colors()[..n].to_vec(),
                fine.mesh.materials()[..n].to_vec(),
                fine.mesh.masks()[..n].to_vec(),
            );
        }
        if dirty.positions {
            coarse.replace_positions(fine.mesh.positions()[..n].to_vec());
            if let Some(link) = fine.link.as_mut() {
                let smoothed = link.subdivision.smooth.apply(coarse.positions());
                let frames = detail::frames(&smoothed, fine.mesh.faces(), fine.mesh.topology());
                link.details = detail::compute_details(fine.mesh.positions(), &smoothed, &frames);
            }
        }
    }

    /// Rebuild level `j` from level `j - 1` plus stored details
    fn prolong(&mut self, j: usize, dirty: Dirty) {
        let (lower, upper) = self.levels.split_at_mut(j);
        let coarse = &lower[j - 1].mesh;
        let fine = &mut upper[0];
        let Some(link) = fine.link.as_ref() else {
            return;
        };

        if dirty.positions {
            let smoothed = link.subdivision.smooth.apply(coarse.positions());
            let frames = detail::frames(&smoothed, fine.mesh.faces(), fine.mesh.topology());
            let positions = detail::synthesize(&smoothed, &link.details, &frames);
            fine.mesh.replace_positions(positions);
        }
        if dirty.attributes {
            let linear = &link.subdivision.linear;
            fine.mesh.replace_attributes(
                linear.apply(coarse.colors()),
                linear.apply(coarse.materials()),
                linear.apply(coarse.masks()),
            );
        }
    }

    /// Subdivide the finest level into a new level and select it.
    ///
    /// Returns the new level index.
    pub fn add_level(&mut self) -> Result<usize, MultiresError> {
        self.sync();
        let finest = self.finest();
        if finest.is_empty() {
            return Err(MultiresError::EmptyMesh);
        }

        let subdivision = subdivide(finest);
        let buffers = VertexBuffers {
            positions: subdivision.smooth.apply(finest.positions()),
            colors: subdivision.linear.apply(finest.colors()),
            materials: subdivision.linear.apply(finest.materials()),
            masks: subdivision.linear.apply(finest.masks()),
        };
        let mut mesh = Mesh::assemble(buffers, subdivision.faces.clone(), finest.index().leaf_size())?;
        mesh.transform = finest.transform;
        mesh.symmetry = finest.symmetry;

        let details = vec![Vec3::ZERO; mesh.vertex_count()];
        self.push_level(Level {
            mesh,
            link: Some(LevelLink { subdivision, details }),
        });
        debug!(
            "Multimesh::add_level: level {} with {} vertices",
            self.current,
            self.current().vertex_count()
        );
        Ok(self.current)
    }

    /// Append an existing finer level and select it
    pub fn push_level(&mut self, level: Level) {
        self.sync();
        self.levels.push(level);
        self.current = self.levels.len() - 1;
    }

    /// Remove the finest level (never the last remaining one)
    pub fn pop_level(&mut self) -> Option<Level> {
        if self.levels.len() < 2 {
            return None;
        }
        self.sync();
        let level = self.levels.pop();
        self.current = self.current.min(self.levels.len() - 1);
        level
    }

    pub fn select_level(&mut self, level: usize) -> Result<(), MultiresError> {
        self.check_level(level)?;
        self.sync();
        if level != self.current {
            debug!("Multimesh::select_level: {} -> {}", self.current, level);
        }
        self.current = level;
        Ok(())
    }

    /// Drop every level coarser than the current one; the current level
    /// becomes level 0.
    pub fn delete_lower(&mut self) -> LowerLevels {
        self.sync();
        let levels: Vec<Level> = self.levels.drain(..self.current).collect();
        let base_link = self.levels[0].link.take();
        if !levels.is_empty() {
            debug!("Multimesh::delete_lower: removed {} levels", levels.len());
        }
        self.current = 0;
        LowerLevels { levels, base_link }
    }

    /// Reinsert levels removed by [`Multimesh::delete_lower`]
    pub fn restore_lower(&mut self, removed: LowerLevels) {
        self.sync();
        let count = removed.levels.len();
        self.levels[0].link = removed.base_link;
        self.levels.splice(0..0, removed.levels);
        self.current += count;
    }

    /// Drop every level finer than the current one
    pub fn delete_higher(&mut self) -> Vec<Level> {
        self.sync();
        let removed = self.levels.split_off(self.current + 1);
        if !removed.is_empty() {
            debug!("Multimesh::delete_higher: removed {} levels", removed.len());
        }
        removed
    }

    /// Reinsert levels removed by [`Multimesh::delete_higher`], keeping the
    /// current selection
    pub fn restore_higher(&mut self, removed: Vec<Level>) {
        self.sync();
        self.levels.extend(removed);
    }

    /// Replace the single level's mesh (topology edits)
    pub(crate) fn replace_base(&mut self, mesh: Mesh) {
        debug_assert_eq!(self.levels.len(), 1);
        self.dirty = None;
        self.levels[0] = Level { mesh, link: None };
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::VertexId;
    use crate::mesh::fixtures::{quad_grid, unit_cube};

    #[test]
    fn test_add_and_select_levels() {
        let mut stack = Multimesh::new(unit_cube());
        assert_eq!(stack.add_level().unwrap(), 1);
        assert_eq!(stack.add_level().unwrap(), 2);
        assert_eq!(stack.level_count(), 3);
        assert_eq!(stack.current_level(), 2);
        assert_eq!(stack.current().face_count(), 96);
        assert!(stack.details(2).unwrap().iter().all(|d| *d == Vec3::ZERO));

        stack.select_level(0).unwrap();
        assert_eq!(stack.current().vertex_count(), 8);
        assert_eq!(
            stack.select_level(5),
            Err(MultiresError::LevelOutOfRange { level: 5, count: 3 })
        );
        assert_eq!(stack.current_level(), 0);
    }

    #[test]
    fn test_coarse_edit_preserves_fine_detail() {
        let mut stack = Multimesh::new(quad_grid(8, 2.0));
        stack.add_level().unwrap();

        // Carve a small detail into the fine level, away from the coarse edit
        let fine_far = stack
            .current()
            .positions()
            .iter()
            .position(|p| p.distance(Vec3::new(-0.75, 0.0, -0.75)) < 1e-4)
            .unwrap() as u32;
        let p = stack.current().position(VertexId(fine_far));
        stack
            .current_mut()
            .write_positions(&[(VertexId(fine_far), p + Vec3::Y * 0.05)]);
        stack.mark_dirty(1, true, false);

        stack.select_level(0).unwrap();
        let details_before = stack.details(1).unwrap().to_vec();
        let fine_before = stack.level(1).unwrap().positions().to_vec();

        // Lift the coarse centre vertex
        let centre = VertexId(40);
        let c = stack.current().position(centre);
        stack.current_mut().write_positions(&[(centre, c + Vec3::Y * 0.5)]);
        stack.mark_dirty(0, true, false);
        stack.select_level(1).unwrap();

        assert_eq!(stack.details(1).unwrap(), details_before.as_slice());
        let fine = stack.current();
        // The surface near the edit moved
        assert!(fine.position(centre).y > 0.1);
        // The carved detail survives untouched
        assert!(fine.position(VertexId(fine_far)).distance(fine_before[fine_far as usize]) < 1e-6);
        assert!((fine.position(VertexId(fine_far)).y - 0.05).abs() < 1e-4);
    }

    #[test]
    fn test_fine_edit_restricts_to_coarse() {
        let mut stack = Multimesh::new(quad_grid(4, 2.0));
        stack.add_level().unwrap();
        let even = VertexId(12);
        let p = stack.current().position(even);
        stack.current_mut().write_positions(&[(even, p + Vec3::Y)]);
        stack.mark_dirty(1, true, false);
        stack.select_level(0).unwrap();

        assert_eq!(stack.current().position(even), p + Vec3::Y);
        // Re-synthesis from the recomputed details reproduces the edit
        stack.propagate_edit(0).unwrap();
        assert!(stack.level(1).unwrap().position(even).distance(p + Vec3::Y) < 1e-5);
    }

    #[test]
    fn test_sync_recorded_reports_rewritten_values() {
        let mut stack = Multimesh::new(quad_grid(4, 2.0));
        stack.add_level().unwrap();
        assert!(stack.sync_recorded().1.is_empty());

        let even = VertexId(12);
        let p = stack.current().position(even);
        stack.current_mut().write_positions(&[(even, p + Vec3::Y)]);
        stack.mark_dirty(1, true, false);
        let details_before = stack.details(1).unwrap().to_vec();

        let (touched, changes) = stack.sync_recorded();
        assert_eq!(touched, vec![0]);
        assert_eq!(changes.positions.len(), 1);
        let (level, diff) = &changes.positions[0];
        assert_eq!(*level, 0);
        assert_eq!(diff.get(even), Some((p, p + Vec3::Y)));
        assert!(changes.attributes.is_empty());

        // Details of the edited level were recomputed against the new coarse surface
        let (level, details) = &changes.details[0];
        assert_eq!(*level, 1);
        for (v, (old, new)) in details.vertices().map(|v| (v, details.get(v).unwrap())) {
            assert_eq!(old, details_before[v.index()]);
            assert_eq!(new, stack.details(1).unwrap()[v.index()]);
        }
        assert!(!stack.is_dirty());
    }

    #[test]
    fn test_delete_and_restore_levels() {
        let mut stack = Multimesh::new(unit_cube());
        stack.add_level().unwrap();
        stack.add_level().unwrap();
        stack.select_level(1).unwrap();

        let higher = stack.delete_higher();
        assert_eq!(higher.len(), 1);
        assert_eq!(stack.level_count(), 2);
        stack.restore_higher(higher);
        assert_eq!(stack.level_count(), 3);

        let lower = stack.delete_lower();
        assert_eq!(lower.levels.len(), 1);
        assert_eq!(stack.current_level(), 0);
        assert_eq!(stack.current().vertex_count(), 26);
        assert!(stack.details(0).is_none());

        stack.restore_lower(lower);
        assert_eq!(stack.current_level(), 1);
        assert_eq!(stack.level(0).unwrap().vertex_count(), 8);
        assert!(stack.details(1).is_some());
    }

    #[test]
    fn test_paint_propagates_linearly() {
        let mut stack = Multimesh::new(quad_grid(2, 1.0));
        stack.add_level().unwrap();
        stack.select_level(0).unwrap();
        let v = VertexId(4);
        let mut attrs = stack.current().attributes(v);
        attrs.color = Vec3::new(1.0, 0.0, 0.0);
        stack.current_mut().write_attributes(&[(v, attrs)]);
        stack.mark_dirty(0, false, true);
        stack.sync();
        assert_eq!(stack.level(1).unwrap().colors()[4], Vec3::new(1.0, 0.0, 0.0));
    }
}
