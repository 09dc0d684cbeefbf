//! Sculpting pipeline orchestration.
//!
//! This module coordinates one sculpting session:
//! 1. Press → pick → open history record
//! 2. Move → dab (mirrored when symmetry is on) → vertex writes
//! 3. Release → level sync → index refit or rebuild → history commit
//! 4. Undo/redo and structural edits, each recorded as one step
//!
//! Rays come in world space; everything past picking works in the picked
//! mesh's local space.

use std::collections::BTreeSet;

use glam::Vec3;
use sculpt_config::SculptConfig;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::brush::{MoveAnchor, SculptBrushEngine};
use crate::deformation::{DabInfo, ToolEdit, apply_move, apply_tool};
use crate::geometry::{Plane, Ray};
use crate::gpu::DirtyRegion;
use crate::history::{History, HistoryRecord, LevelChange, OpenRecord, RecordHandle, SceneChange};
use crate::mesh::{FaceId, Mesh};
use crate::multires::MultiresError;
use crate::scene::{Scene, SceneError};
use crate::spatial::RadiusHits;
use crate::types::{MeshId, PickResult, ToolKind, ToolSettings};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("A stroke is in progress")]
    StrokeActive,
    #[error("No mesh is selected")]
    NoSelection,
    #[error("Pick does not match the current topology of {mesh:?} level {level}")]
    StalePick { mesh: MeshId, level: usize },
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl From<MultiresError> for PipelineError {
    fn from(e: MultiresError) -> Self {
        PipelineError::Scene(SceneError::Multires(e))
    }
}

fn level_mesh(scene: &Scene, id: MeshId, level: usize) -> Result<&Mesh, SceneError> {
    let stack = scene.get(id).ok_or(SceneError::UnknownMesh(id))?;
    stack.level(level).ok_or(SceneError::UnknownLevel { mesh: id, level })
}

/// A pick held across a topology change can name vertices or faces the
/// mesh no longer has
fn check_pick(pick: &PickResult, mesh: &Mesh) -> Result<(), PipelineError> {
    let vertices = mesh.vertex_count();
    let in_range = pick.face.index() < mesh.face_count()
        && pick.weights.len() == pick.vertices.len()
        && pick
            .vertices
            .iter()
            .chain(&pick.triangle)
            .all(|v| v.index() < vertices);
    if in_range {
        Ok(())
    } else {
        Err(PipelineError::StalePick {
            mesh: pick.mesh,
            level: pick.level,
        })
    }
}

fn pick_hits(pick: &PickResult) -> RadiusHits {
    RadiusHits {
        vertices: pick.vertices.clone(),
        weights: pick.weights.clone(),
    }
}

fn symmetry_plane(mesh: &Mesh, settings: &ToolSettings) -> Option<Plane> {
    settings
        .symmetry
        .then(|| mesh.symmetry.plane())
        .filter(|plane| plane.normal != Vec3::ZERO)
}

fn mirror_dab(dab: &DabInfo, plane: &Plane) -> DabInfo {
    DabInfo {
        center: plane.mirror_point(dab.center),
        normal: plane.mirror_direction(dab.normal),
        previous_pointer: plane.mirror_point(dab.previous_pointer),
        pointer: plane.mirror_point(dab.pointer),
        ..*dab
    }
}

/// The sculpting session: scene, tool engine and history.
#[derive(Debug)]
pub struct SculptingPipeline {
    pub scene: Scene,
    pub history: History,
    pub brush_engine: SculptBrushEngine,
    pub config: SculptConfig,
    open_record: Option<RecordHandle>,
    /// Faces touched by the current stroke, for the refit/rebuild choice
    stroke_faces: BTreeSet<FaceId>,
}

impl Default for SculptingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SculptingPipeline {
    pub fn new() -> Self {
        Self::with_config(SculptConfig::default())
    }

    pub fn with_config(config: SculptConfig) -> Self {
        Self {
            scene: Scene::new(config.spatial.leaf_size),
            history: History::new(config.history.max_records),
            brush_engine: SculptBrushEngine::new(ToolSettings::from(&config.tools)),
            config,
            open_record: None,
            stroke_faces: BTreeSet::new(),
        }
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.brush_engine.settings
    }

    /// Settings changes take effect on the next dab; the tool kind of a
    /// running stroke is fixed at press.
    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.brush_engine.settings
    }

    pub fn set_tool(&mut self, kind: ToolKind) {
        self.brush_engine.settings.kind = kind;
    }

    pub fn is_stroke_active(&self) -> bool {
        self.brush_engine.is_stroking()
    }

    fn ensure_idle(&self) -> Result<(), PipelineError> {
        if self.brush_engine.is_stroking() {
            return Err(PipelineError::StrokeActive);
        }
        Ok(())
    }

    fn selected(&self) -> Result<MeshId, PipelineError> {
        self.scene.selection().ok_or(PipelineError::NoSelection)
    }

    /// Pick with the current brush radius and falloff
    pub fn pick(&self, ray: &Ray) -> Option<PickResult> {
        let settings = &self.brush_engine.settings;
        self.scene.pick(ray, settings.radius, settings.falloff)
    }

    /// Pointer down. Starts a stroke if the ray hits a mesh; tools that
    /// do not need pointer motion apply their first dab immediately.
    pub fn press(&mut self, ray: &Ray) -> bool {
        if self.brush_engine.is_stroking() {
            return false;
        }
        let Some(pick) = self.pick(ray) else {
            debug!("press: nothing under the pointer");
            return false;
        };
        let Some(transform) = self.scene.get(pick.mesh).map(|s| s.current().transform) else {
            return false;
        };
        let view_dir = transform.inverse().transform_vector3(ray.direction).normalize_or_zero();

        let (id, level) = (pick.mesh, pick.level);
        self.scene.select(Some(id));
        if let Err(e) = self.scene.sync(id) {
            warn!("press: {}", e);
        }
        let handle = self.history.begin(id, level);
        self.open_record = Some(handle);
        self.stroke_faces.clear();

        let settings = self.brush_engine.settings.clone();
        let stroke_id = self.brush_engine.begin_stroke(pick.clone(), view_dir);
        debug!(
            "press: stroke {} {:?} on {:?} level {}",
            stroke_id, settings.kind, id, level
        );

        let result = match settings.kind {
            ToolKind::Move => self.capture_anchors(&pick, &settings).map(|()| DirtyRegion::default()),
            kind if kind.uses_pointer_delta() => Ok(DirtyRegion::default()),
            _ => {
                let dab = DabInfo::new(pick.point, pick.normal, pick.radius, &settings);
                self.apply_symmetric(handle, id, level, &settings, dab, pick_hits(&pick))
            }
        };
        self.finish_event(result);
        true
    }

    /// Pointer move while pressed; returns what this event changed
    pub fn drag(&mut self, ray: &Ray) -> DirtyRegion {
        let result = self.drag_inner(ray);
        self.finish_event(result)
    }

    fn drag_inner(&mut self, ray: &Ray) -> Result<DirtyRegion, SceneError> {
        let (Some(stroke), Some(handle)) = (self.brush_engine.stroke(), self.open_record) else {
            return Ok(DirtyRegion::default());
        };
        let (id, level, tool) = (stroke.mesh, stroke.level, stroke.tool);
        let (center, normal, radius) = (stroke.center, stroke.last_pick.normal, stroke.last_pick.radius);
        let (previous, press) = (stroke.last_pointer, stroke.press_pointer);

        let transform = level_mesh(&self.scene, id, level)?.transform;
        let local_ray = ray.transformed(&transform.inverse());
        let Some(pointer) = stroke.project(&local_ray) else {
            return Ok(DirtyRegion::default());
        };

        let settings = self.brush_engine.settings.clone().with_kind(tool);
        let dab = DabInfo::new(center, normal, radius, &settings).with_pointer(previous, pointer);

        let region = match tool {
            ToolKind::Move => self.move_anchors(handle, id, level, pointer - press)?,
            ToolKind::Transform => self.apply_dab(handle, id, level, &settings, &dab, &RadiusHits::default())?,
            ToolKind::Drag | ToolKind::Twist | ToolKind::LocalScale => {
                let hits = self.scene.pick_sphere(id, center, radius, settings.falloff)?;
                self.apply_symmetric(handle, id, level, &settings, dab, hits)?
            }
            _ => {
                let Some(pick) = self.scene.pick_mesh(id, ray, settings.radius, settings.falloff) else {
                    return Ok(DirtyRegion::default());
                };
                let dab = DabInfo::new(pick.point, pick.normal, pick.radius, &settings).with_pointer(previous, pointer);
                let hits = pick_hits(&pick);
                if let Some(stroke) = self.brush_engine.stroke_mut() {
                    stroke.center = pick.point;
                    stroke.last_pick = pick;
                }
                self.apply_symmetric(handle, id, level, &settings, dab, hits)?
            }
        };

        if let Some(stroke) = self.brush_engine.stroke_mut() {
            stroke.last_pointer = pointer;
            if tool == ToolKind::Drag {
                stroke.center += pointer - previous;
            }
        }
        Ok(region)
    }

    /// Re-apply the last dab while the pointer is held still, for
    /// continuous tools
    pub fn tick(&mut self) -> DirtyRegion {
        if !self.brush_engine.settings.continuous {
            return DirtyRegion::default();
        }
        let (Some(stroke), Some(handle)) = (self.brush_engine.stroke(), self.open_record) else {
            return DirtyRegion::default();
        };
        if !stroke.tool.supports_continuous() {
            return DirtyRegion::default();
        }
        let pick = stroke.last_pick.clone();
        let settings = self.brush_engine.settings.clone().with_kind(stroke.tool);
        let dab = DabInfo::new(pick.point, pick.normal, pick.radius, &settings);
        let result = self.apply_symmetric(handle, pick.mesh, pick.level, &settings, dab, pick_hits(&pick));
        self.finish_event(result)
    }

    /// Pointer up. Synchronises levels, refreshes the picking index and
    /// commits the stroke; returns true if a history record was pushed.
    pub fn release(&mut self) -> bool {
        let Some(stroke) = self.brush_engine.end_stroke() else {
            return false;
        };
        let Some(handle) = self.open_record.take() else {
            return false;
        };
        self.sync_into_record(handle, stroke.mesh);
        self.refresh_index(stroke.mesh, stroke.level);
        let pushed = self.history.commit(handle);
        debug!(
            "release: stroke {} after {} dabs, recorded: {}",
            stroke.stroke_id, stroke.dabs, pushed
        );
        pushed
    }

    /// Abandon the stroke and put back every value it changed
    pub fn cancel(&mut self) -> bool {
        let Some(stroke) = self.brush_engine.cancel_stroke() else {
            return false;
        };
        self.stroke_faces.clear();
        let Some(open) = self.open_record.take().and_then(|h| self.history.cancel(h)) else {
            return true;
        };
        if let Err(e) = self.revert(&open) {
            warn!("cancel: stroke {} could not be reverted: {}", stroke.stroke_id, e);
        }
        debug!("cancel: stroke {}", stroke.stroke_id);
        true
    }

    /// Other levels were not synchronised yet, so restoring the edited
    /// level and dropping the pending edit is exact
    fn revert(&mut self, open: &OpenRecord) -> Result<(), SceneError> {
        if !open.positions.is_empty() {
            self.scene
                .restore_positions(open.mesh, open.level, &open.positions.old_values())?;
        }
        if !open.attributes.is_empty() {
            self.scene
                .restore_attributes(open.mesh, open.level, &open.attributes.old_values())?;
        }
        self.scene.discard_pending(open.mesh)
    }

    /// Synchronise levels and keep what that overwrote with the stroke
    fn sync_into_record(&mut self, handle: RecordHandle, id: MeshId) {
        match self.scene.sync_recorded(id) {
            Ok(changes) => {
                self.history.record_sync(handle, changes);
            }
            Err(e) => warn!("Sculpting: level sync failed: {}", e),
        }
    }

    /// One dab of `tool` at an existing pick, outside the press/release
    /// cycle. Merges into the open stroke when it targets the same level,
    /// otherwise records a step of its own.
    pub fn apply_stroke(
        &mut self,
        tool: ToolKind,
        pick: &PickResult,
        settings: &ToolSettings,
    ) -> Result<DirtyRegion, PipelineError> {
        if tool.uses_pointer_delta() {
            debug!("apply_stroke: {:?} needs pointer motion", tool);
            return Ok(DirtyRegion::default());
        }
        let stack = self.scene.get(pick.mesh).ok_or(SceneError::UnknownMesh(pick.mesh))?;
        if stack.current_level() != pick.level {
            debug!("apply_stroke: pick is not on the current level of {:?}", pick.mesh);
            return Ok(DirtyRegion::default());
        }
        check_pick(pick, stack.current())?;

        let same_target = self
            .brush_engine
            .stroke()
            .is_some_and(|s| s.mesh == pick.mesh && s.level == pick.level);
        let (handle, standalone) = match self.open_record {
            Some(handle) if same_target => (handle, false),
            Some(_) => return Err(PipelineError::StrokeActive),
            None => (self.history.begin(pick.mesh, pick.level), true),
        };

        let settings = settings.clone().with_kind(tool);
        let dab = DabInfo::new(pick.point, pick.normal, pick.radius, &settings);
        let result = self.apply_symmetric(handle, pick.mesh, pick.level, &settings, dab, pick_hits(pick));
        let region = self.finish_event(result);

        if standalone {
            self.sync_into_record(handle, pick.mesh);
            self.refresh_index(pick.mesh, pick.level);
            self.history.commit(handle);
        }
        Ok(region)
    }

    fn finish_event(&mut self, result: Result<DirtyRegion, SceneError>) -> DirtyRegion {
        match result {
            Ok(region) => {
                if !region.is_empty() {
                    self.stroke_faces.extend(region.faces.iter().copied());
                    if let Some(stroke) = self.brush_engine.stroke_mut() {
                        stroke.dabs += 1;
                    }
                }
                region
            }
            Err(e) => {
                warn!("Sculpting: dab skipped: {}", e);
                DirtyRegion::default()
            }
        }
    }

    fn capture_anchors(&mut self, pick: &PickResult, settings: &ToolSettings) -> Result<(), SceneError> {
        let mesh = level_mesh(&self.scene, pick.mesh, pick.level)?;
        let mut anchors = vec![MoveAnchor::capture(mesh, &pick_hits(pick), None)];
        if let Some(plane) = symmetry_plane(mesh, settings) {
            let hits = self
                .scene
                .pick_sphere(pick.mesh, plane.mirror_point(pick.point), pick.radius, settings.falloff)?;
            anchors.push(MoveAnchor::capture(mesh, &hits, Some(plane)));
        }
        if let Some(stroke) = self.brush_engine.stroke_mut() {
            stroke.anchors = anchors;
        }
        Ok(())
    }

    fn move_anchors(
        &mut self,
        handle: RecordHandle,
        id: MeshId,
        level: usize,
        total_delta: Vec3,
    ) -> Result<DirtyRegion, SceneError> {
        let updates: Vec<_> = self
            .brush_engine
            .stroke()
            .map(|s| s.anchors.iter().flat_map(|a| apply_move(a, total_delta)).collect())
            .unwrap_or_default();
        let edit = if updates.is_empty() { ToolEdit::None } else { ToolEdit::Positions(updates) };
        self.write_edit(handle, id, level, edit)
    }

    /// Apply a dab and, with symmetry on, its mirror image
    fn apply_symmetric(
        &mut self,
        handle: RecordHandle,
        id: MeshId,
        level: usize,
        settings: &ToolSettings,
        dab: DabInfo,
        hits: RadiusHits,
    ) -> Result<DirtyRegion, SceneError> {
        let mut region = self.apply_dab(handle, id, level, settings, &dab, &hits)?;
        let plane = symmetry_plane(level_mesh(&self.scene, id, level)?, settings);
        if let Some(plane) = plane {
            let mirrored = mirror_dab(&dab, &plane);
            let hits = self.scene.pick_sphere(id, mirrored.center, dab.radius, settings.falloff)?;
            let other = self.apply_dab(handle, id, level, settings, &mirrored, &hits)?;
            region.merge(&other);
        }
        Ok(region)
    }

    fn apply_dab(
        &mut self,
        handle: RecordHandle,
        id: MeshId,
        level: usize,
        settings: &ToolSettings,
        dab: &DabInfo,
        hits: &RadiusHits,
    ) -> Result<DirtyRegion, SceneError> {
        let edit = apply_tool(level_mesh(&self.scene, id, level)?, settings, dab, hits);
        trace!("apply_dab: {:?} {} in radius, {} written", settings.kind, hits.len(), edit.len());
        self.write_edit(handle, id, level, edit)
    }

    /// Record old values into the open record, then write
    fn write_edit(
        &mut self,
        handle: RecordHandle,
        id: MeshId,
        level: usize,
        edit: ToolEdit,
    ) -> Result<DirtyRegion, SceneError> {
        match edit {
            ToolEdit::None => Ok(DirtyRegion::default()),
            ToolEdit::Positions(updates) => {
                self.history
                    .record_positions(handle, level_mesh(&self.scene, id, level)?, &updates);
                self.scene.write_positions(id, level, &updates)
            }
            ToolEdit::Attributes(updates) => {
                self.history
                    .record_attributes(handle, level_mesh(&self.scene, id, level)?, &updates);
                self.scene.write_attributes(id, level, &updates)
            }
        }
    }

    /// Refit was done per dab; rebuild when the stroke touched more than
    /// the configured share of faces
    fn refresh_index(&mut self, id: MeshId, level: usize) {
        let touched = std::mem::take(&mut self.stroke_faces).len();
        let leaf_size = self.config.spatial.leaf_size;
        let limit = self.config.spatial.refit_limit;
        let Some(mesh) = self.scene.get_mut(id).and_then(|s| s.level_mut(level)) else {
            return;
        };
        let faces = mesh.face_count();
        if faces > 0 && touched as f32 / faces as f32 > limit {
            debug!("refresh_index: {} of {} faces touched, rebuilding", touched, faces);
            mesh.rebuild_index(leaf_size);
        }
    }

    pub fn undo(&mut self) -> bool {
        if self.brush_engine.is_stroking() {
            debug!("undo: refused during a stroke");
            return false;
        }
        self.history.undo(&mut self.scene)
    }

    pub fn redo(&mut self) -> bool {
        if self.brush_engine.is_stroking() {
            debug!("redo: refused during a stroke");
            return false;
        }
        self.history.redo(&mut self.scene)
    }

    /// Add a mesh to the scene as an undoable step; it becomes selected
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = self.scene.add(mesh);
        if let Some(stack) = self.scene.get(id) {
            self.history.push(HistoryRecord::Scene(SceneChange::Added {
                mesh: id,
                stack: Box::new(stack.clone()),
            }));
        }
        id
    }

    pub fn remove_mesh(&mut self, id: MeshId) -> Result<(), PipelineError> {
        self.ensure_idle()?;
        let stack = self.scene.remove(id).ok_or(SceneError::UnknownMesh(id))?;
        self.history.push(HistoryRecord::Scene(SceneChange::Removed {
            mesh: id,
            stack: Box::new(stack),
        }));
        Ok(())
    }

    /// Subdivide the selected mesh's finest level and select the result
    pub fn add_level(&mut self) -> Result<usize, PipelineError> {
        self.ensure_idle()?;
        let id = self.selected()?;
        let stack = self.scene.stack_mut(id)?;
        let previous = stack.current_level();
        let level = stack.add_level()?;
        let added = stack.levels()[level].clone();
        self.scene.mark_full(id);
        self.history.push(HistoryRecord::Multiresolution {
            mesh: id,
            change: LevelChange::Added {
                level: Box::new(added),
                previous,
            },
        });
        Ok(level)
    }

    pub fn select_level(&mut self, level: usize) -> Result<(), PipelineError> {
        self.ensure_idle()?;
        let id = self.selected()?;
        self.scene.stack_mut(id)?.select_level(level)?;
        self.scene.mark_full(id);
        Ok(())
    }

    /// Drop the levels below the current one; returns how many went
    pub fn delete_lower(&mut self) -> Result<usize, PipelineError> {
        self.ensure_idle()?;
        let id = self.selected()?;
        let removed = self.scene.stack_mut(id)?.delete_lower();
        let count = removed.levels.len();
        if count > 0 {
            self.scene.mark_full(id);
            self.history.push(HistoryRecord::Multiresolution {
                mesh: id,
                change: LevelChange::LowerRemoved(removed),
            });
        }
        Ok(count)
    }

    /// Drop the levels above the current one; returns how many went
    pub fn delete_higher(&mut self) -> Result<usize, PipelineError> {
        self.ensure_idle()?;
        let id = self.selected()?;
        let removed = self.scene.stack_mut(id)?.delete_higher();
        let count = removed.len();
        if count > 0 {
            self.scene.mark_full(id);
            self.history.push(HistoryRecord::Multiresolution {
                mesh: id,
                change: LevelChange::HigherRemoved(removed),
            });
        }
        Ok(count)
    }

    pub fn current_level(&self) -> Option<usize> {
        self.scene.get(self.scene.selection()?).map(|s| s.current_level())
    }

    pub fn level_count(&self) -> Option<usize> {
        self.scene.get(self.scene.selection()?).map(|s| s.level_count())
    }

    /// Delete faces of a single-level mesh as an undoable step
    pub fn delete_faces(&mut self, id: MeshId, faces: &[FaceId]) -> Result<(), PipelineError> {
        self.ensure_idle()?;
        let (before, after) = self.scene.delete_faces(id, faces)?;
        if before.face_count() != after.face_count() {
            self.history.push(HistoryRecord::Topology {
                mesh: id,
                before: Box::new(before),
                after: Box::new(after),
            });
        }
        Ok(())
    }

    /// Regions changed since the last call, for partial GPU uploads
    pub fn take_dirty(&mut self) -> Vec<DirtyRegion> {
        self.scene.take_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::VertexId;
    use crate::mesh::fixtures::{grid_center, quad_grid};

    const N: u32 = 8;

    fn down_at(x: f32, z: f32) -> Ray {
        Ray::new(Vec3::new(x, 5.0, z), Vec3::NEG_Y)
    }

    fn session(kind: ToolKind) -> (SculptingPipeline, MeshId) {
        let mut pipeline = SculptingPipeline::new();
        let id = pipeline.add_mesh(quad_grid(N, 2.0));
        pipeline.history.reset();
        let settings = pipeline.settings_mut();
        settings.kind = kind;
        settings.radius = 0.3;
        settings.intensity = 1.0;
        settings.symmetry = false;
        (pipeline, id)
    }

    fn positions(pipeline: &SculptingPipeline, id: MeshId) -> Vec<Vec3> {
        pipeline.scene.get(id).unwrap().current().positions().to_vec()
    }

    #[test]
    fn test_pipeline_uses_config() {
        let mut config = SculptConfig::default();
        config.history.max_records = 7;
        config.tools.radius = 0.5;
        let pipeline = SculptingPipeline::with_config(config);
        assert_eq!(pipeline.history.max_records(), 7);
        assert_eq!(pipeline.settings().radius, 0.5);
        assert!(!pipeline.is_stroke_active());
    }

    #[test]
    fn test_brush_up_then_down_returns_within_epsilon() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        let original = positions(&pipeline, id);
        let center = grid_center(N) as usize;

        let pick = pipeline.pick(&down_at(0.0, 0.0)).unwrap();
        let settings = pipeline.settings().clone();
        let region = pipeline.apply_stroke(ToolKind::Brush, &pick, &settings).unwrap();
        assert!(!region.is_empty());

        let raised = positions(&pipeline, id);
        // Weight 1 at the centre, intensity 1, region normal +Y
        assert!((raised[center].y - 1.0).abs() < 1e-5);

        let negative = ToolSettings {
            negative: true,
            ..settings
        };
        pipeline.apply_stroke(ToolKind::Brush, &pick, &negative).unwrap();
        for (p, o) in positions(&pipeline, id).iter().zip(&original) {
            assert!(p.distance(*o) < 1e-5);
        }
        assert_eq!(pipeline.history.len(), 2);
    }

    #[test]
    fn test_stroke_is_one_record_and_undo_redo_bit_identical() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        pipeline.settings_mut().intensity = 0.05;
        let before = positions(&pipeline, id);

        assert!(pipeline.press(&down_at(0.0, 0.0)));
        assert!(pipeline.is_stroke_active());
        assert!(!pipeline.undo());
        for step in 1..6 {
            pipeline.drag(&down_at(step as f32 * 0.05, 0.0));
        }
        assert!(pipeline.release());
        let after = positions(&pipeline, id);
        assert_ne!(before, after);
        assert_eq!(pipeline.history.len(), 1);

        assert!(pipeline.undo());
        assert_eq!(positions(&pipeline, id), before);
        assert!(pipeline.redo());
        assert_eq!(positions(&pipeline, id), after);
    }

    #[test]
    fn test_stroke_without_pick_is_noop() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        let before = positions(&pipeline, id);
        pipeline.take_dirty();

        assert!(!pipeline.press(&down_at(5.0, 5.0)));
        assert!(pipeline.drag(&down_at(0.0, 0.0)).is_empty());
        assert!(!pipeline.release());

        assert!(pipeline.history.is_empty());
        assert_eq!(positions(&pipeline, id), before);
        assert!(pipeline.take_dirty().is_empty());
    }

    #[test]
    fn test_move_follows_total_pointer_delta() {
        let (mut pipeline, id) = session(ToolKind::Move);
        let center = VertexId(grid_center(N));

        assert!(pipeline.press(&down_at(0.0, 0.0)));
        assert_eq!(positions(&pipeline, id)[center.index()], Vec3::ZERO);
        pipeline.drag(&down_at(0.05, 0.0));
        pipeline.drag(&down_at(0.1, 0.0));
        let moved = pipeline.scene.get(id).unwrap().current().position(center);
        assert!(moved.distance(Vec3::new(0.1, 0.0, 0.0)) < 1e-5);
        assert!(pipeline.release());
        assert_eq!(pipeline.history.len(), 1);
    }

    #[test]
    fn test_symmetry_mirrors_the_dab() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        pipeline.settings_mut().symmetry = true;
        pipeline.settings_mut().intensity = 0.2;

        assert!(pipeline.press(&down_at(0.5, 0.0)));
        pipeline.release();
        let p = positions(&pipeline, id);
        // (0.5, 0, 0) is vertex 42, its mirror (-0.5, 0, 0) is vertex 38
        assert!(p[42].y > 0.1);
        assert!((p[42].y - p[38].y).abs() < 1e-5);
        assert_eq!(pipeline.history.len(), 1);
    }

    #[test]
    fn test_cancel_restores_positions() {
        let (mut pipeline, id) = session(ToolKind::Inflate);
        let before = positions(&pipeline, id);
        assert!(pipeline.press(&down_at(0.0, 0.0)));
        assert_ne!(positions(&pipeline, id), before);
        assert!(pipeline.cancel());
        assert_eq!(positions(&pipeline, id), before);
        assert!(pipeline.history.is_empty());
        assert!(!pipeline.cancel());
    }

    #[test]
    fn test_continuous_tick() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        pipeline.settings_mut().intensity = 0.1;
        pipeline.settings_mut().continuous = true;
        assert!(pipeline.press(&down_at(0.0, 0.0)));
        let first = positions(&pipeline, id)[grid_center(N) as usize].y;
        assert!(!pipeline.tick().is_empty());
        let second = positions(&pipeline, id)[grid_center(N) as usize].y;
        assert!(second > first);
        pipeline.release();
        assert_eq!(pipeline.history.len(), 1);

        pipeline.set_tool(ToolKind::Drag);
        assert!(pipeline.press(&down_at(0.0, 0.0)));
        assert!(pipeline.tick().is_empty());
        pipeline.cancel();
    }

    #[test]
    fn test_levels_and_topology_are_undoable() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        assert_eq!(pipeline.add_level().unwrap(), 1);
        assert_eq!(pipeline.level_count(), Some(2));
        assert_eq!(pipeline.current_level(), Some(1));

        pipeline.select_level(0).unwrap();
        assert_eq!(
            pipeline.delete_faces(id, &[FaceId(0)]),
            Err(PipelineError::Scene(SceneError::MultiresolutionTopology { mesh: id, levels: 2 }))
        );
        assert_eq!(pipeline.delete_higher().unwrap(), 1);
        assert_eq!(pipeline.level_count(), Some(1));

        pipeline.delete_faces(id, &[FaceId(0)]).unwrap();
        assert_eq!(pipeline.scene.get(id).unwrap().current().face_count(), 63);

        assert!(pipeline.undo());
        assert_eq!(pipeline.scene.get(id).unwrap().current().face_count(), 64);
        assert!(pipeline.undo());
        assert_eq!(pipeline.level_count(), Some(2));
        assert!(pipeline.undo());
        assert_eq!(pipeline.level_count(), Some(1));
        assert!(!pipeline.undo());

        assert!(pipeline.redo());
        assert_eq!(pipeline.current_level(), Some(1));
    }

    #[test]
    fn test_mesh_add_and_remove_are_undoable() {
        let mut pipeline = SculptingPipeline::new();
        let id = pipeline.add_mesh(quad_grid(2, 1.0));
        pipeline.remove_mesh(id).unwrap();
        assert!(pipeline.scene.is_empty());
        assert_eq!(pipeline.current_level(), None);
        assert_eq!(pipeline.add_level(), Err(PipelineError::NoSelection));

        assert!(pipeline.undo());
        assert!(pipeline.scene.contains(id));
        assert!(pipeline.undo());
        assert!(pipeline.scene.is_empty());
        assert!(pipeline.redo());
        assert!(pipeline.scene.contains(id));
    }

    fn level_positions(pipeline: &SculptingPipeline, id: MeshId) -> Vec<Vec<Vec3>> {
        let stack = pipeline.scene.get(id).unwrap();
        (0..stack.level_count())
            .map(|l| stack.level(l).unwrap().positions().to_vec())
            .collect()
    }

    fn level_attributes(pipeline: &SculptingPipeline, id: MeshId) -> Vec<(Vec<Vec3>, Vec<f32>)> {
        let stack = pipeline.scene.get(id).unwrap();
        (0..stack.level_count())
            .map(|l| {
                let mesh = stack.level(l).unwrap();
                (mesh.colors().to_vec(), mesh.masks().to_vec())
            })
            .collect()
    }

    #[test]
    fn test_coarse_undo_restores_every_level_exactly() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        pipeline.settings_mut().intensity = 0.2;
        pipeline.add_level().unwrap();

        // Carve on the fine level first so it holds real detail
        assert!(pipeline.press(&down_at(0.13, 0.21)));
        assert!(pipeline.release());
        pipeline.select_level(0).unwrap();
        let before = level_positions(&pipeline, id);

        assert!(pipeline.press(&down_at(0.0, 0.0)));
        pipeline.drag(&down_at(0.1, 0.0));
        assert!(pipeline.release());
        let after = level_positions(&pipeline, id);
        assert_ne!(before[1], after[1]);

        assert!(pipeline.undo());
        assert_eq!(level_positions(&pipeline, id), before);
        assert!(pipeline.redo());
        assert_eq!(level_positions(&pipeline, id), after);
        assert!(pipeline.undo());
        assert_eq!(level_positions(&pipeline, id), before);

        // The fine carve is still undoable on top of the restored state
        pipeline.select_level(1).unwrap();
        assert!(pipeline.undo());
        assert!(pipeline.redo());
        assert_eq!(level_positions(&pipeline, id), before);
    }

    #[test]
    fn test_paint_undo_redo_on_every_level() {
        let (mut pipeline, id) = session(ToolKind::Paint);
        pipeline.settings_mut().color = Vec3::new(1.0, 0.0, 0.0);
        pipeline.add_level().unwrap();
        pipeline.select_level(0).unwrap();
        let before = level_attributes(&pipeline, id);

        assert!(pipeline.press(&down_at(0.0, 0.0)));
        assert!(pipeline.release());
        let after = level_attributes(&pipeline, id);
        assert_ne!(before[0].0, after[0].0);
        // Colour reached the fine level through the linear operator
        assert_ne!(before[1].0, after[1].0);
        assert_eq!(pipeline.history.len(), 2);

        assert!(pipeline.undo());
        assert_eq!(level_attributes(&pipeline, id), before);
        assert!(pipeline.redo());
        assert_eq!(level_attributes(&pipeline, id), after);
    }

    #[test]
    fn test_masking_undo_redo_on_every_level() {
        let (mut pipeline, id) = session(ToolKind::Masking);
        pipeline.add_level().unwrap();
        let before = level_attributes(&pipeline, id);

        assert!(pipeline.press(&down_at(0.0, 0.0)));
        assert!(pipeline.release());
        let after = level_attributes(&pipeline, id);
        let center = grid_center(N) as usize;
        assert!(after[1].1[center] < 1e-4);
        // Restriction carried the mask down to the coarse level
        assert_eq!(after[0].1[center], after[1].1[center]);

        assert!(pipeline.undo());
        assert_eq!(level_attributes(&pipeline, id), before);
        assert!(pipeline.redo());
        assert_eq!(level_attributes(&pipeline, id), after);

        // A frozen vertex ignores the brush
        pipeline.set_tool(ToolKind::Brush);
        assert!(pipeline.press(&down_at(0.0, 0.0)));
        pipeline.release();
        let fine = pipeline.scene.get(id).unwrap().current();
        assert!(fine.position(VertexId(center as u32)).y.abs() < 1e-4);
    }

    #[test]
    fn test_apply_stroke_rejects_stale_pick() {
        let (mut pipeline, id) = session(ToolKind::Brush);
        let pick = pipeline.pick(&down_at(0.0, 0.0)).unwrap();
        let settings = pipeline.settings().clone();

        let doomed: Vec<FaceId> = (0..32).map(FaceId).collect();
        pipeline.delete_faces(id, &doomed).unwrap();
        let before = positions(&pipeline, id);

        assert_eq!(
            pipeline.apply_stroke(ToolKind::Brush, &pick, &settings),
            Err(PipelineError::StalePick { mesh: id, level: 0 })
        );
        assert_eq!(positions(&pipeline, id), before);
        assert_eq!(pipeline.history.len(), 1);
    }
}
