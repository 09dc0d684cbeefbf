//! History record variants and the sparse per-vertex diff they carry.

use std::collections::BTreeMap;

use glam::Vec3;

use crate::mesh::{Mesh, VertexAttributes, VertexId};
use crate::multires::{Level, LowerLevels, Multimesh, SyncChanges};
use crate::types::MeshId;

/// Sparse vertex → (old, new) map.
///
/// Recording a vertex twice keeps the first old value and the latest new
/// one, which is what makes a whole stroke collapse into one diff.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexDiff<T> {
    entries: BTreeMap<VertexId, (T, T)>,
}

impl<T> Default for VertexDiff<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Copy + PartialEq> VertexDiff<T> {
    pub fn record(&mut self, v: VertexId, old: T, new: T) {
        self.entries.entry(v).or_insert((old, new)).1 = new;
    }

    /// Fold a later diff into this one
    pub fn merge(&mut self, later: &VertexDiff<T>) {
        for (&v, &(old, new)) in &later.entries {
            self.record(v, old, new);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.entries.contains_key(&v)
    }

    pub fn get(&self, v: VertexId) -> Option<(T, T)> {
        self.entries.get(&v).copied()
    }

    /// True when every key ended where it started
    pub fn is_noop(&self) -> bool {
        self.entries.values().all(|(old, new)| old == new)
    }

    pub fn old_values(&self) -> Vec<(VertexId, T)> {
        self.entries.iter().map(|(&v, &(old, _))| (v, old)).collect()
    }

    pub fn new_values(&self) -> Vec<(VertexId, T)> {
        self.entries.iter().map(|(&v, &(_, new))| (v, new)).collect()
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.entries.keys().copied()
    }
}

/// Structural change to one mesh's multiresolution stack
#[derive(Debug, Clone)]
pub enum LevelChange {
    /// A finer level was appended; `previous` was the level selected before
    Added { level: Box<Level>, previous: usize },
    /// Levels below the then-current one were dropped
    LowerRemoved(LowerLevels),
    /// Levels above the then-current one were dropped
    HigherRemoved(Vec<Level>),
}

/// Mesh added to or removed from the scene, with a copy of its stack
#[derive(Debug, Clone)]
pub enum SceneChange {
    Added { mesh: MeshId, stack: Box<Multimesh> },
    Removed { mesh: MeshId, stack: Box<Multimesh> },
}

/// One undoable step
#[derive(Debug, Clone)]
pub enum HistoryRecord {
    /// Positions written at `level`, plus what synchronising the other
    /// levels overwrote (positions and detail offsets)
    Geometry {
        mesh: MeshId,
        level: usize,
        diff: VertexDiff<Vec3>,
        synced: SyncChanges,
    },
    Attributes {
        mesh: MeshId,
        level: usize,
        diff: VertexDiff<VertexAttributes>,
        synced: SyncChanges,
    },
    /// Whole-mesh snapshots around a face deletion
    Topology {
        mesh: MeshId,
        before: Box<Mesh>,
        after: Box<Mesh>,
    },
    Multiresolution { mesh: MeshId, change: LevelChange },
    Scene(SceneChange),
}

impl HistoryRecord {
    pub fn mesh(&self) -> MeshId {
        match self {
            HistoryRecord::Geometry { mesh, .. }
            | HistoryRecord::Attributes { mesh, .. }
            | HistoryRecord::Topology { mesh, .. }
            | HistoryRecord::Multiresolution { mesh, .. } => *mesh,
            HistoryRecord::Scene(SceneChange::Added { mesh, .. })
            | HistoryRecord::Scene(SceneChange::Removed { mesh, .. }) => *mesh,
        }
    }

    /// Diff records whose values all ended where they started
    pub fn is_noop(&self) -> bool {
        match self {
            HistoryRecord::Geometry { diff, synced, .. } => diff.is_noop() && synced.is_noop(),
            HistoryRecord::Attributes { diff, synced, .. } => diff.is_noop() && synced.is_noop(),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HistoryRecord::Geometry { .. } => "geometry",
            HistoryRecord::Attributes { .. } => "attributes",
            HistoryRecord::Topology { .. } => "topology",
            HistoryRecord::Multiresolution { .. } => "multiresolution",
            HistoryRecord::Scene(_) => "scene",
        }
    }
}
