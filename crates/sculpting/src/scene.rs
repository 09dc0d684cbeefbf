//! Scene of sculptable meshes.
//!
//! Each mesh is a [`Multimesh`] owned by the scene under a stable
//! [`MeshId`]. The scene performs picking across all meshes, routes vertex
//! writes to a level of one stack, and accumulates [`DirtyRegion`]s for the
//! renderer.

use std::collections::{BTreeMap, BTreeSet};

use glam::{Mat4, Vec3};
use sculpt_config::DEFAULT_LEAF_SIZE;
use thiserror::Error;
use tracing::debug;

use crate::brush::FalloffCurve;
use crate::geometry::{EPSILON, Ray};
use crate::gpu::DirtyRegion;
use crate::mesh::{FaceId, Mesh, MeshError, VertexAttributes, VertexId};
use crate::multires::{MultiresError, Multimesh, SyncChanges};
use crate::spatial::{RadiusHits, RayHit};
use crate::types::{MeshId, PickResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("Unknown mesh {0:?}")]
    UnknownMesh(MeshId),
    #[error("Mesh {mesh:?} has no level {level}")]
    UnknownLevel { mesh: MeshId, level: usize },
    #[error("Mesh {mesh:?} has no vertex {vertex:?}")]
    UnknownVertex { mesh: MeshId, vertex: VertexId },
    #[error("Topology edits need a single-level mesh, {mesh:?} has {levels} levels")]
    MultiresolutionTopology { mesh: MeshId, levels: usize },
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Multires(#[from] MultiresError),
}

fn check_vertices(id: MeshId, mesh: &Mesh, mut vertices: impl Iterator<Item = VertexId>) -> Result<(), SceneError> {
    let count = mesh.vertex_count();
    match vertices.find(|v| v.index() >= count) {
        Some(vertex) => Err(SceneError::UnknownVertex { mesh: id, vertex }),
        None => Ok(()),
    }
}

/// Largest axis scale of an affine transform
fn max_scale(transform: &Mat4) -> f32 {
    let (scale, _, _) = transform.to_scale_rotation_translation();
    scale.abs().max_element()
}

#[derive(Debug)]
pub struct Scene {
    meshes: BTreeMap<MeshId, Multimesh>,
    next_id: u32,
    selection: Option<MeshId>,
    dirty: Vec<DirtyRegion>,
    leaf_size: usize,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(DEFAULT_LEAF_SIZE)
    }
}

impl Scene {
    pub fn new(leaf_size: usize) -> Self {
        Self {
            meshes: BTreeMap::new(),
            next_id: 0,
            selection: None,
            dirty: Vec::new(),
            leaf_size,
        }
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// Take ownership of a mesh, select it and return its new id
    pub fn add(&mut self, mut mesh: Mesh) -> MeshId {
        if mesh.index().leaf_size() != self.leaf_size {
            mesh.rebuild_index(self.leaf_size);
        }
        let id = MeshId(self.next_id);
        self.insert(id, Multimesh::new(mesh));
        self.selection = Some(id);
        debug!("Scene::add: {:?}", id);
        id
    }

    /// Put a stack back under a known id (undo/redo)
    pub fn insert(&mut self, id: MeshId, stack: Multimesh) {
        self.next_id = self.next_id.max(id.0 + 1);
        let level = stack.current_level();
        self.dirty.push(DirtyRegion::full(id, level, stack.current()));
        self.meshes.insert(id, stack);
    }

    /// Detach a mesh from the scene
    pub fn remove(&mut self, id: MeshId) -> Option<Multimesh> {
        let stack = self.meshes.remove(&id)?;
        if self.selection == Some(id) {
            self.selection = None;
        }
        self.dirty.retain(|d| d.mesh != Some(id));
        debug!("Scene::remove: {:?}", id);
        Some(stack)
    }

    pub fn contains(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }

    pub fn get(&self, id: MeshId) -> Option<&Multimesh> {
        self.meshes.get(&id)
    }

    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut Multimesh> {
        self.meshes.get_mut(&id)
    }

    pub(crate) fn stack_mut(&mut self, id: MeshId) -> Result<&mut Multimesh, SceneError> {
        self.meshes.get_mut(&id).ok_or(SceneError::UnknownMesh(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.meshes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn selection(&self) -> Option<MeshId> {
        self.selection
    }

    pub fn select(&mut self, id: Option<MeshId>) {
        self.selection = id.filter(|id| self.meshes.contains_key(id));
    }

    /// Nearest hit of a world-space ray against the current level of every
    /// mesh, with the vertices inside `radius` (world units) of the hit.
    ///
    /// A radius of zero selects exactly the hit face's vertices at weight 1.
    pub fn pick(&self, ray: &Ray, radius: f32, falloff: FalloffCurve) -> Option<PickResult> {
        let mut best: Option<(MeshId, RayHit)> = None;
        for (&id, stack) in &self.meshes {
            let Some(hit) = cast(stack.current(), ray) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, b)| hit.t < b.t) {
                best = Some((id, hit));
            }
        }
        let (id, hit) = best?;
        Some(self.complete_pick(id, hit, ray, radius, falloff))
    }

    /// Like [`Scene::pick`] but only against one mesh
    pub fn pick_mesh(&self, id: MeshId, ray: &Ray, radius: f32, falloff: FalloffCurve) -> Option<PickResult> {
        let hit = cast(self.meshes.get(&id)?.current(), ray)?;
        Some(self.complete_pick(id, hit, ray, radius, falloff))
    }

    fn complete_pick(&self, id: MeshId, hit: RayHit, ray: &Ray, radius: f32, falloff: FalloffCurve) -> PickResult {
        let stack = &self.meshes[&id];
        let mesh = stack.current();
        let local_radius = radius / max_scale(&mesh.transform).max(EPSILON);

        let hits = if local_radius <= EPSILON {
            hit_face_vertices(mesh, hit.face)
        } else {
            mesh.index()
                .query_radius(mesh.positions(), mesh.faces(), hit.point, local_radius, falloff)
        };

        PickResult {
            mesh: id,
            level: stack.current_level(),
            face: hit.face,
            point: hit.point,
            world_point: mesh.transform.transform_point3(hit.point),
            normal: mesh.face_normal(hit.face),
            distance: hit.t * ray.direction.length(),
            triangle: hit.triangle,
            barycentric: hit.barycentric,
            vertices: hits.vertices,
            weights: hits.weights,
            radius: local_radius,
        }
    }

    /// Vertices of a mesh's current level inside a local-space sphere
    pub fn pick_sphere(
        &self,
        id: MeshId,
        center: Vec3,
        local_radius: f32,
        falloff: FalloffCurve,
    ) -> Result<RadiusHits, SceneError> {
        let mesh = self.meshes.get(&id).ok_or(SceneError::UnknownMesh(id))?.current();
        Ok(mesh
            .index()
            .query_radius(mesh.positions(), mesh.faces(), center, local_radius, falloff))
    }

    fn level_mesh(&mut self, id: MeshId, level: usize) -> Result<&mut Multimesh, SceneError> {
        let stack = self.stack_mut(id)?;
        if level >= stack.level_count() {
            return Err(SceneError::UnknownLevel { mesh: id, level });
        }
        Ok(stack)
    }

    /// Write positions at one level and mark it for synchronisation
    pub fn write_positions(
        &mut self,
        id: MeshId,
        level: usize,
        updates: &[(VertexId, Vec3)],
    ) -> Result<DirtyRegion, SceneError> {
        self.write_level_positions(id, level, updates, true)
    }

    /// Put recorded positions back on one level without scheduling a sync
    pub(crate) fn restore_positions(
        &mut self,
        id: MeshId,
        level: usize,
        updates: &[(VertexId, Vec3)],
    ) -> Result<DirtyRegion, SceneError> {
        self.write_level_positions(id, level, updates, false)
    }

    fn write_level_positions(
        &mut self,
        id: MeshId,
        level: usize,
        updates: &[(VertexId, Vec3)],
        schedule_sync: bool,
    ) -> Result<DirtyRegion, SceneError> {
        let stack = self.level_mesh(id, level)?;
        let Some(mesh) = stack.level_mut(level) else {
            return Err(SceneError::UnknownLevel { mesh: id, level });
        };
        check_vertices(id, mesh, updates.iter().map(|&(v, _)| v))?;
        let touched = mesh.write_positions(updates);
        if schedule_sync {
            stack.mark_dirty(level, true, false);
        }

        let region = DirtyRegion::new(id, level, touched.vertices, touched.faces);
        self.dirty.push(region.clone());
        Ok(region)
    }

    /// Write paint attributes at one level and mark it for synchronisation
    pub fn write_attributes(
        &mut self,
        id: MeshId,
        level: usize,
        updates: &[(VertexId, VertexAttributes)],
    ) -> Result<DirtyRegion, SceneError> {
        self.write_level_attributes(id, level, updates, true)
    }

    /// Put recorded attributes back on one level without scheduling a sync
    pub(crate) fn restore_attributes(
        &mut self,
        id: MeshId,
        level: usize,
        updates: &[(VertexId, VertexAttributes)],
    ) -> Result<DirtyRegion, SceneError> {
        self.write_level_attributes(id, level, updates, false)
    }

    fn write_level_attributes(
        &mut self,
        id: MeshId,
        level: usize,
        updates: &[(VertexId, VertexAttributes)],
        schedule_sync: bool,
    ) -> Result<DirtyRegion, SceneError> {
        let stack = self.level_mesh(id, level)?;
        let Some(mesh) = stack.level_mut(level) else {
            return Err(SceneError::UnknownLevel { mesh: id, level });
        };
        check_vertices(id, mesh, updates.iter().map(|&(v, _)| v))?;
        mesh.write_attributes(updates);
        if schedule_sync {
            stack.mark_dirty(level, false, true);
        }

        let region = DirtyRegion::new(id, level, updates.iter().map(|&(v, _)| v).collect(), Vec::new());
        self.dirty.push(region.clone());
        Ok(region)
    }

    /// Put recorded detail offsets back on one level
    pub(crate) fn restore_details(
        &mut self,
        id: MeshId,
        level: usize,
        updates: &[(VertexId, Vec3)],
    ) -> Result<(), SceneError> {
        self.stack_mut(id)?.write_details(level, updates)?;
        Ok(())
    }

    /// Drop a mesh's pending edit without propagating it to other levels
    pub(crate) fn discard_pending(&mut self, id: MeshId) -> Result<(), SceneError> {
        self.stack_mut(id)?.discard_pending();
        Ok(())
    }

    /// Synchronise a mesh's levels and report every rewritten level
    pub fn sync(&mut self, id: MeshId) -> Result<(), SceneError> {
        let touched = self.stack_mut(id)?.sync();
        self.mark_synced(id, touched);
        Ok(())
    }

    /// [`Scene::sync`], also returning the values it overwrote
    pub fn sync_recorded(&mut self, id: MeshId) -> Result<SyncChanges, SceneError> {
        let (touched, changes) = self.stack_mut(id)?.sync_recorded();
        self.mark_synced(id, touched);
        Ok(changes)
    }

    fn mark_synced(&mut self, id: MeshId, touched: Vec<usize>) {
        let Some(stack) = self.meshes.get(&id) else {
            return;
        };
        let regions = touched.into_iter().filter_map(|level| {
            let mesh = stack.level(level)?;
            let mut region = DirtyRegion::full(id, level, mesh);
            region.topology_changed = false;
            Some(region)
        });
        self.dirty.extend(regions);
    }

    /// Mark a whole level for re-upload, index buffer included
    pub(crate) fn mark_full(&mut self, id: MeshId) {
        if let Some(stack) = self.meshes.get(&id) {
            self.dirty
                .push(DirtyRegion::full(id, stack.current_level(), stack.current()));
        }
    }

    /// Replace a single-level mesh outright (topology edits and their undo)
    pub(crate) fn replace_mesh(&mut self, id: MeshId, mesh: Mesh) -> Result<(), SceneError> {
        let stack = self.stack_mut(id)?;
        if stack.level_count() != 1 {
            return Err(SceneError::MultiresolutionTopology {
                mesh: id,
                levels: stack.level_count(),
            });
        }
        stack.replace_base(mesh);
        self.mark_full(id);
        Ok(())
    }

    /// Delete faces from a single-level mesh, pruning vertices left
    /// without faces. Returns the meshes before and after.
    pub fn delete_faces(&mut self, id: MeshId, faces: &[FaceId]) -> Result<(Mesh, Mesh), SceneError> {
        let stack = self.stack_mut(id)?;
        stack.sync();
        if stack.level_count() != 1 {
            return Err(SceneError::MultiresolutionTopology {
                mesh: id,
                levels: stack.level_count(),
            });
        }

        let before = stack.current().clone();
        let doomed: BTreeSet<FaceId> = faces.iter().copied().collect();
        let kept = before
            .faces()
            .iter()
            .enumerate()
            .filter(|(i, _)| !doomed.contains(&FaceId(*i as u32)))
            .map(|(_, f)| *f)
            .collect();
        let attributes: Vec<VertexAttributes> = (0..before.vertex_count() as u32)
            .map(|v| before.attributes(VertexId(v)))
            .collect();

        let mut after = Mesh::with_attributes(before.positions().to_vec(), kept, &attributes)?;
        after.transform = before.transform;
        after.symmetry = before.symmetry;
        after.rebuild_index(self.leaf_size);

        self.replace_mesh(id, after.clone())?;
        debug!(
            "Scene::delete_faces: {:?} {} -> {} faces",
            id,
            before.face_count(),
            after.face_count()
        );
        Ok((before, after))
    }

    /// Drain the dirty regions accumulated since the last call, merging
    /// regions that target the same level.
    pub fn take_dirty(&mut self) -> Vec<DirtyRegion> {
        let mut merged: Vec<DirtyRegion> = Vec::new();
        for region in self.dirty.drain(..) {
            match merged.iter_mut().find(|m| m.same_target(&region)) {
                Some(existing) => existing.merge(&region),
                None => merged.push(region),
            }
        }
        merged
    }
}

/// Cast a world-space ray against a mesh in its local space
fn cast(mesh: &Mesh, ray: &Ray) -> Option<RayHit> {
    let local_ray = ray.transformed(&mesh.transform.inverse());
    mesh.index().cast_ray(mesh.positions(), mesh.faces(), &local_ray)
}

fn hit_face_vertices(mesh: &Mesh, face: FaceId) -> RadiusHits {
    let mut vertices: Vec<VertexId> = mesh.face(face).map(|f| f.vertices().to_vec()).unwrap_or_default();
    vertices.sort_unstable();
    RadiusHits {
        weights: vec![1.0; vertices.len()],
        vertices,
    }
}
