//! Bounded linear undo/redo history.
//!
//! Strokes go through an explicit open record: [`History::begin`] hands out
//! a [`RecordHandle`], every dab of the stroke is merged into the open
//! diffs, and [`History::commit`] turns them into at most one record per
//! diff kind. Structural changes (levels, face deletion, scene membership)
//! are pushed directly as whole records.

pub mod record;

pub use record::{HistoryRecord, LevelChange, SceneChange, VertexDiff};

use std::collections::VecDeque;

use glam::Vec3;
use sculpt_config::DEFAULT_MAX_HISTORY;
use tracing::{debug, info, warn};

use crate::mesh::{Mesh, VertexAttributes, VertexId};
use crate::multires::SyncChanges;
use crate::scene::{Scene, SceneError};
use crate::types::MeshId;

/// Ticket for the record opened by [`History::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandle(u64);

/// Diffs accumulated for one stroke, not yet in the history
#[derive(Debug, Clone)]
pub struct OpenRecord {
    handle: RecordHandle,
    pub mesh: MeshId,
    pub level: usize,
    pub positions: VertexDiff<Vec3>,
    pub attributes: VertexDiff<VertexAttributes>,
    /// Other levels rewritten when the stroke was synchronised
    pub synced: SyncChanges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

#[derive(Debug)]
pub struct History {
    records: VecDeque<HistoryRecord>,
    /// Number of applied records; records at `cursor..` are redoable
    cursor: usize,
    max_records: usize,
    open: Option<OpenRecord>,
    next_handle: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: VecDeque::new(),
            cursor: 0,
            max_records: max_records.max(1),
            open: None,
            next_handle: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.records.len()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Open a record for a stroke on one level of one mesh. A record left
    /// open by an earlier stroke is discarded.
    pub fn begin(&mut self, mesh: MeshId, level: usize) -> RecordHandle {
        let handle = RecordHandle(self.next_handle);
        self.next_handle += 1;
        if let Some(stale) = self.open.take() {
            debug!("History::begin: discarding open record {:?}", stale.handle);
        }
        self.open = Some(OpenRecord {
            handle,
            mesh,
            level,
            positions: VertexDiff::default(),
            attributes: VertexDiff::default(),
            synced: SyncChanges::default(),
        });
        handle
    }

    fn open_mut(&mut self, handle: RecordHandle) -> Option<&mut OpenRecord> {
        self.open.as_mut().filter(|open| open.handle == handle)
    }

    /// Merge position writes into the open record. `mesh` must still hold
    /// the values being overwritten. Returns false for a stale handle.
    pub fn record_positions(&mut self, handle: RecordHandle, mesh: &Mesh, updates: &[(VertexId, Vec3)]) -> bool {
        let Some(open) = self.open_mut(handle) else {
            return false;
        };
        for &(v, new) in updates {
            open.positions.record(v, mesh.position(v), new);
        }
        true
    }

    /// Merge attribute writes into the open record
    pub fn record_attributes(
        &mut self,
        handle: RecordHandle,
        mesh: &Mesh,
        updates: &[(VertexId, VertexAttributes)],
    ) -> bool {
        let Some(open) = self.open_mut(handle) else {
            return false;
        };
        for &(v, new) in updates {
            open.attributes.record(v, mesh.attributes(v), new);
        }
        true
    }

    /// Merge what a level synchronisation overwrote into the open record
    pub fn record_sync(&mut self, handle: RecordHandle, changes: SyncChanges) -> bool {
        let Some(open) = self.open_mut(handle) else {
            return false;
        };
        open.synced.merge(changes);
        true
    }

    /// Close the open record, pushing its non-empty diffs. Returns true if
    /// anything was pushed.
    pub fn commit(&mut self, handle: RecordHandle) -> bool {
        if self.open.as_ref().is_none_or(|open| open.handle != handle) {
            return false;
        }
        let Some(open) = self.open.take() else {
            return false;
        };

        let (synced_geometry, synced_attributes) = open.synced.split();
        let mut pushed = false;
        if !open.positions.is_empty() && !open.positions.is_noop() {
            debug!(
                "History::commit: {} vertices moved on {:?} level {}",
                open.positions.len(),
                open.mesh,
                open.level
            );
            self.push(HistoryRecord::Geometry {
                mesh: open.mesh,
                level: open.level,
                diff: open.positions,
                synced: synced_geometry,
            });
            pushed = true;
        }
        if !open.attributes.is_empty() && !open.attributes.is_noop() {
            debug!(
                "History::commit: {} vertices repainted on {:?} level {}",
                open.attributes.len(),
                open.mesh,
                open.level
            );
            self.push(HistoryRecord::Attributes {
                mesh: open.mesh,
                level: open.level,
                diff: open.attributes,
                synced: synced_attributes,
            });
            pushed = true;
        }
        pushed
    }

    /// Drop the open record without pushing it, handing its diffs back so
    /// the caller can restore the old values.
    pub fn cancel(&mut self, handle: RecordHandle) -> Option<OpenRecord> {
        if self.open.as_ref().is_some_and(|open| open.handle == handle) {
            self.open.take()
        } else {
            None
        }
    }

    /// Append a record, discarding the redo tail and evicting the oldest
    /// record on overflow.
    pub fn push(&mut self, record: HistoryRecord) {
        self.records.truncate(self.cursor);
        self.records.push_back(record);
        self.cursor = self.records.len();
        self.evict();
    }

    fn evict(&mut self) {
        while self.records.len() > self.max_records {
            if let Some(oldest) = self.records.pop_front() {
                info!(
                    "History: evicted oldest {} record for {:?} (limit {})",
                    oldest.kind(),
                    oldest.mesh(),
                    self.max_records
                );
            }
            self.cursor = self.cursor.saturating_sub(1);
        }
    }

    pub fn set_max_records(&mut self, max_records: usize) {
        self.max_records = max_records.max(1);
        self.evict();
    }

    /// Revert the record before the cursor. Returns false at the start of
    /// history, while a record is open, or if the record no longer applies;
    /// the cursor only moves on success.
    pub fn undo(&mut self, scene: &mut Scene) -> bool {
        if self.open.is_some() {
            debug!("History::undo: refused while a stroke is open");
            return false;
        }
        if self.cursor == 0 {
            debug!("History::undo: nothing to undo");
            return false;
        }
        let applied = self.apply(self.cursor - 1, scene, Direction::Undo);
        if applied {
            self.cursor -= 1;
        }
        applied
    }

    /// Re-apply the record at the cursor
    pub fn redo(&mut self, scene: &mut Scene) -> bool {
        if self.open.is_some() {
            debug!("History::redo: refused while a stroke is open");
            return false;
        }
        if self.cursor >= self.records.len() {
            debug!("History::redo: nothing to redo");
            return false;
        }
        let applied = self.apply(self.cursor, scene, Direction::Redo);
        if applied {
            self.cursor += 1;
        }
        applied
    }

    fn apply(&self, index: usize, scene: &mut Scene, direction: Direction) -> bool {
        let Some(record) = self.records.get(index) else {
            return false;
        };
        match apply_record(record, scene, direction) {
            Ok(()) => {
                debug!("History::{:?}: {} record for {:?}", direction, record.kind(), record.mesh());
                true
            }
            Err(e) => {
                warn!("History::{:?}: skipping {} record: {}", direction, record.kind(), e);
                false
            }
        }
    }

    /// Remove records whose values all ended where they started
    pub fn clean_noop(&mut self) -> usize {
        let before = self.records.len();
        let mut index = 0;
        let cursor = self.cursor;
        let mut removed_before_cursor = 0;
        self.records.retain(|record| {
            let keep = !record.is_noop();
            if !keep && index < cursor {
                removed_before_cursor += 1;
            }
            index += 1;
            keep
        });
        self.cursor -= removed_before_cursor;
        before - self.records.len()
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.cursor = 0;
        self.open = None;
    }
}

fn side<T: Copy + PartialEq>(diff: &VertexDiff<T>, undo: bool) -> Vec<(VertexId, T)> {
    if undo { diff.old_values() } else { diff.new_values() }
}

/// Diff records write recorded values on every level they list and never
/// re-derive levels, so undo and redo are exact.
fn apply_record(record: &HistoryRecord, scene: &mut Scene, direction: Direction) -> Result<(), SceneError> {
    let undo = direction == Direction::Undo;
    match record {
        HistoryRecord::Geometry { mesh, level, diff, synced } => {
            scene.sync(*mesh)?;
            scene.restore_positions(*mesh, *level, &side(diff, undo))?;
            for (l, d) in &synced.positions {
                scene.restore_positions(*mesh, *l, &side(d, undo))?;
            }
            for (l, d) in &synced.details {
                scene.restore_details(*mesh, *l, &side(d, undo))?;
            }
            Ok(())
        }
        HistoryRecord::Attributes { mesh, level, diff, synced } => {
            scene.sync(*mesh)?;
            scene.restore_attributes(*mesh, *level, &side(diff, undo))?;
            for (l, d) in &synced.attributes {
                scene.restore_attributes(*mesh, *l, &side(d, undo))?;
            }
            Ok(())
        }
        HistoryRecord::Topology { mesh, before, after } => {
            let target = if undo { before } else { after };
            scene.replace_mesh(*mesh, target.as_ref().clone())
        }
        HistoryRecord::Multiresolution { mesh, change } => {
            let stack = scene.stack_mut(*mesh)?;
            match (change, direction) {
                (LevelChange::Added { previous, .. }, Direction::Undo) => {
                    stack.pop_level();
                    stack.select_level(*previous)?;
                }
                (LevelChange::Added { level, .. }, Direction::Redo) => {
                    stack.push_level(level.as_ref().clone());
                }
                (LevelChange::LowerRemoved(lower), Direction::Undo) => {
                    stack.restore_lower(lower.clone());
                }
                (LevelChange::LowerRemoved(lower), Direction::Redo) => {
                    stack.select_level(lower.levels.len())?;
                    stack.delete_lower();
                }
                (LevelChange::HigherRemoved(levels), Direction::Undo) => {
                    stack.restore_higher(levels.clone());
                }
                (LevelChange::HigherRemoved(levels), Direction::Redo) => {
                    for _ in 0..levels.len() {
                        stack.pop_level();
                    }
                }
            }
            scene.mark_full(*mesh);
            Ok(())
        }
        HistoryRecord::Scene(change) => {
            let (mesh, stack, adds) = match change {
                SceneChange::Added { mesh, stack } => (*mesh, stack, !undo),
                SceneChange::Removed { mesh, stack } => (*mesh, stack, undo),
            };
            if adds {
                scene.insert(mesh, stack.as_ref().clone());
                Ok(())
            } else {
                scene.remove(mesh).map(|_| ()).ok_or(SceneError::UnknownMesh(mesh))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::quad_grid;
    use crate::multires::Multimesh;

    fn lift(scene: &mut Scene, history: &mut History, id: MeshId, handle: RecordHandle, updates: &[(VertexId, Vec3)]) {
        let mesh = scene.get(id).unwrap().current();
        assert!(history.record_positions(handle, mesh, updates));
        scene.write_positions(id, 0, updates).unwrap();
    }

    fn positions(scene: &Scene, id: MeshId) -> Vec<Vec3> {
        scene.get(id).unwrap().current().positions().to_vec()
    }

    #[test]
    fn test_stroke_of_many_moves_is_one_record() {
        let mut scene = Scene::default();
        let id = scene.add(quad_grid(2, 1.0));
        let mut history = History::default();
        let start = positions(&scene, id);

        let handle = history.begin(id, 0);
        for step in 1..=5 {
            let dy = Vec3::Y * step as f32 * 0.1;
            let updates = vec![(VertexId(4), start[4] + dy), (VertexId(step % 3), start[(step % 3) as usize] + dy)];
            lift(&mut scene, &mut history, id, handle, &updates);
        }
        let end = positions(&scene, id);
        assert!(history.commit(handle));
        assert_eq!(history.len(), 1);

        let Some(HistoryRecord::Geometry { diff, .. }) = history.records().next() else {
            panic!("expected a geometry record");
        };
        assert_eq!(diff.len(), 4);
        for (v, old) in diff.old_values() {
            assert_eq!(old, start[v.index()]);
        }
        for (v, new) in diff.new_values() {
            assert_eq!(new, end[v.index()]);
        }
    }

    #[test]
    fn test_undo_redo_is_bit_identical() {
        let mut scene = Scene::default();
        let id = scene.add(quad_grid(2, 1.0));
        let mut history = History::default();
        let before = positions(&scene, id);

        let handle = history.begin(id, 0);
        lift(&mut scene, &mut history, id, handle, &[(VertexId(4), Vec3::new(0.013, 0.37, -0.021))]);
        history.commit(handle);
        let after = positions(&scene, id);

        assert!(history.undo(&mut scene));
        assert_eq!(positions(&scene, id), before);
        assert!(!history.undo(&mut scene));
        assert!(history.redo(&mut scene));
        assert_eq!(positions(&scene, id), after);
        assert!(!history.redo(&mut scene));
    }

    #[test]
    fn test_attribute_record_round_trip() {
        let mut scene = Scene::default();
        let id = scene.add(quad_grid(2, 1.0));
        let mut history = History::default();
        let v = VertexId(4);
        let before = scene.get(id).unwrap().current().attributes(v);

        let handle = history.begin(id, 0);
        for mask in [0.5, 0.25] {
            let updates = [(v, VertexAttributes { mask, ..before })];
            assert!(history.record_attributes(handle, scene.get(id).unwrap().current(), &updates));
            scene.write_attributes(id, 0, &updates).unwrap();
        }
        assert!(history.commit(handle));
        let Some(HistoryRecord::Attributes { diff, .. }) = history.records().next() else {
            panic!("expected an attribute record");
        };
        assert_eq!(diff.get(v).map(|(old, new)| (old.mask, new.mask)), Some((before.mask, 0.25)));

        assert!(history.undo(&mut scene));
        assert_eq!(scene.get(id).unwrap().current().attributes(v), before);
        assert!(history.redo(&mut scene));
        assert_eq!(scene.get(id).unwrap().current().mask(v), 0.25);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut scene = Scene::default();
        let id = scene.add(quad_grid(2, 1.0));
        let mut history = History::new(3);

        for step in 0..4 {
            let handle = history.begin(id, 0);
            lift(&mut scene, &mut history, id, handle, &[(VertexId(step), Vec3::Y * 2.0)]);
            assert!(history.commit(handle));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 3);
        let first = history.records().next().map(|r| match r {
            HistoryRecord::Geometry { diff, .. } => diff.contains(VertexId(1)),
            _ => false,
        });
        assert_eq!(first, Some(true));

        for _ in 0..3 {
            assert!(history.can_undo());
            assert!(history.undo(&mut scene));
        }
        assert!(!history.can_undo());
        // Vertex 0's edit can no longer be undone
        assert_eq!(scene.get(id).unwrap().current().position(VertexId(0)), Vec3::Y * 2.0);

        history.set_max_records(1);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_noop_stroke_and_clean_noop() {
        let mut scene = Scene::default();
        let id = scene.add(quad_grid(2, 1.0));
        let mut history = History::default();
        let start = positions(&scene, id);

        // Nothing recorded
        let handle = history.begin(id, 0);
        assert!(!history.commit(handle));

        // Moved there and back
        let handle = history.begin(id, 0);
        lift(&mut scene, &mut history, id, handle, &[(VertexId(4), Vec3::Y)]);
        lift(&mut scene, &mut history, id, handle, &[(VertexId(4), start[4])]);
        assert!(!history.commit(handle));
        assert!(history.is_empty());

        let mut diff = VertexDiff::default();
        diff.record(VertexId(0), Vec3::ZERO, Vec3::ZERO);
        history.push(HistoryRecord::Geometry {
            mesh: id,
            level: 0,
            diff,
            synced: SyncChanges::default(),
        });
        let handle = history.begin(id, 0);
        lift(&mut scene, &mut history, id, handle, &[(VertexId(4), Vec3::Y)]);
        history.commit(handle);
        assert_eq!(history.len(), 2);

        assert_eq!(history.clean_noop(), 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn test_cancel_returns_open_diffs() {
        let mut scene = Scene::default();
        let id = scene.add(quad_grid(2, 1.0));
        let mut history = History::default();

        let handle = history.begin(id, 0);
        lift(&mut scene, &mut history, id, handle, &[(VertexId(4), Vec3::Y)]);
        let open = history.cancel(handle).unwrap();
        assert_eq!(open.positions.len(), 1);
        assert!(!history.commit(handle));
        assert!(history.is_empty());

        let stale = handle;
        let _fresh = history.begin(id, 0);
        assert!(!history.record_positions(stale, scene.get(id).unwrap().current(), &[]));
    }

    #[test]
    fn test_structural_records_round_trip() {
        let mut scene = Scene::default();
        let id = scene.add(quad_grid(2, 1.0));
        let mut history = History::default();

        let stack = scene.get_mut(id).unwrap();
        stack.add_level().unwrap();
        let level = stack.pop_level().unwrap();
        stack.push_level(level.clone());
        history.push(HistoryRecord::Multiresolution {
            mesh: id,
            change: LevelChange::Added {
                level: Box::new(level),
                previous: 0,
            },
        });

        let removed = scene.remove(id).unwrap();
        history.push(HistoryRecord::Scene(SceneChange::Removed {
            mesh: id,
            stack: Box::new(removed),
        }));
        assert!(scene.is_empty());

        assert!(history.undo(&mut scene));
        assert_eq!(scene.get(id).map(Multimesh::level_count), Some(2));
        assert!(history.undo(&mut scene));
        assert_eq!(scene.get(id).map(Multimesh::level_count), Some(1));
        assert!(history.redo(&mut scene));
        assert_eq!(scene.get(id).map(Multimesh::current_level), Some(1));
        assert!(history.redo(&mut scene));
        assert!(!scene.contains(id));
    }

    #[test]
    fn test_missing_mesh_is_skipped() {
        let mut scene = Scene::default();
        let mut history = History::default();
        let mut diff = VertexDiff::default();
        diff.record(VertexId(0), Vec3::ZERO, Vec3::Y);
        history.push(HistoryRecord::Geometry {
            mesh: MeshId(7),
            level: 0,
            diff,
            synced: SyncChanges::default(),
        });

        assert!(!history.undo(&mut scene));
        // The record stays in place so history and scene do not drift apart
        assert!(history.can_undo());
        assert_eq!(history.cursor(), 1);
        assert!(!history.can_redo());
    }
}
