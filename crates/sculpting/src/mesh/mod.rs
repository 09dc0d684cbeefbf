//! Indexed triangle/quad mesh for one resolution level.
//!
//! A [`Mesh`] owns its vertex attributes, faces, adjacency, derived normals
//! and the [`Bvh`] used for picking. Position edits go through
//! [`Mesh::write_positions`], which keeps normals and the index in sync for
//! the touched region only; topology changes always construct a new mesh.

mod construction;
#[cfg(test)]
pub(crate) mod fixtures;
mod normals;
mod topology;
mod types;
mod validation;

pub(crate) use construction::VertexBuffers;
pub use normals::{face_area_normal, face_center, vertex_normals};
pub use topology::{Edge, Topology};
pub use types::{
    DEFAULT_COLOR, DEFAULT_MASK, DEFAULT_MATERIAL, Face, FaceId, MeshData, MeshError, Symmetry,
    TRI_SENTINEL, VertexAttributes, VertexId,
};

use glam::{Mat4, Vec2, Vec3};

use crate::spatial::{Aabb, Bvh};

/// What a position write changed beyond the written vertices themselves
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Touched {
    /// Moved vertices plus every vertex whose normal was recomputed
    pub vertices: Vec<VertexId>,
    pub faces: Vec<FaceId>,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    colors: Vec<Vec3>,
    materials: Vec<Vec2>,
    masks: Vec<f32>,
    faces: Vec<Face>,
    face_normals: Vec<Vec3>,
    face_centers: Vec<Vec3>,
    topology: Topology,
    bounds: Aabb,
    index: Bvh,
    /// Mesh to world transform
    pub transform: Mat4,
    pub symmetry: Symmetry,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn position(&self, v: VertexId) -> Vec3 {
        self.positions[v.index()]
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn normal(&self, v: VertexId) -> Vec3 {
        self.normals[v.index()]
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    pub fn materials(&self) -> &[Vec2] {
        &self.materials
    }

    pub fn masks(&self) -> &[f32] {
        &self.masks
    }

    pub fn mask(&self, v: VertexId) -> f32 {
        self.masks[v.index()]
    }

    pub fn attributes(&self, v: VertexId) -> VertexAttributes {
        VertexAttributes {
            color: self.colors[v.index()],
            material: self.materials[v.index()],
            mask: self.masks[v.index()],
        }
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn face(&self, f: FaceId) -> Option<&Face> {
        self.faces.get(f.index())
    }

    pub fn face_normal(&self, f: FaceId) -> Vec3 {
        self.face_normals[f.index()]
    }

    pub fn face_center(&self, f: FaceId) -> Vec3 {
        self.face_centers[f.index()]
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn index(&self) -> &Bvh {
        &self.index
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Sphere around the bounding box: (center, radius)
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        if self.bounds.is_empty() {
            return (Vec3::ZERO, 0.0);
        }
        let center = self.bounds.center();
        (center, self.bounds.size().length() * 0.5)
    }

    /// Overwrite vertex positions and refresh normals, bounds and the index
    /// around them. Returns the vertices and faces whose derived data changed.
    pub fn write_positions(&mut self, updates: &[(VertexId, Vec3)]) -> Touched {
        for &(v, p) in updates {
            self.positions[v.index()] = p;
        }
        let moved: Vec<VertexId> = updates.iter().map(|&(v, _)| v).collect();
        let touched = self.refresh_normals_around(&moved);
        self.index.refit(&self.positions, &self.faces, &touched.faces);
        self.bounds = self.index.bounds();
        touched
    }

    /// Overwrite per-vertex paint attributes. Geometry is untouched.
    pub fn write_attributes(&mut self, updates: &[(VertexId, VertexAttributes)]) {
        for &(v, attrs) in updates {
            self.colors[v.index()] = attrs.color;
            self.materials[v.index()] = attrs.material;
            self.masks[v.index()] = attrs.mask;
        }
    }

    /// Replace every position at once (level synchronisation)
    pub(crate) fn replace_positions(&mut self, positions: Vec<Vec3>) {
        debug_assert_eq!(positions.len(), self.positions.len());
        self.positions = positions;
        self.recompute_normals();
        let all: Vec<FaceId> = (0..self.faces.len() as u32).map(FaceId).collect();
        self.index.refit(&self.positions, &self.faces, &all);
        self.bounds = self.index.bounds();
    }

    pub(crate) fn replace_attributes(&mut self, colors: Vec<Vec3>, materials: Vec<Vec2>, masks: Vec<f32>) {
        debug_assert_eq!(colors.len(), self.positions.len());
        self.colors = colors;
        self.materials = materials;
        self.masks = masks;
    }

    /// Rebuild the picking index with a new leaf size
    pub fn rebuild_index(&mut self, leaf_size: usize) {
        self.index = Bvh::build(&self.positions, &self.faces, leaf_size);
        self.bounds = self.index.bounds();
    }

    /// Recompute every derived quantity from positions
    pub fn refresh_geometry(&mut self) {
        self.recompute_normals();
        let leaf_size = self.index.leaf_size();
        self.rebuild_index(leaf_size);
    }
}
