//! Face and vertex normal computation.

use std::collections::BTreeSet;

use glam::Vec3;

use super::types::{Face, VertexId};
use super::{Mesh, Touched};

/// Normal of a face scaled by twice its area, summed over a fan from the
/// first corner so slightly non-planar quads average both halves.
pub fn face_area_normal(positions: &[Vec3], face: &Face) -> Vec3 {
    let verts = face.vertices();
    let origin = positions[verts[0].index()];
    let mut normal = Vec3::ZERO;
    for i in 1..verts.len() - 1 {
        let a = positions[verts[i].index()] - origin;
        let b = positions[verts[i + 1].index()] - origin;
        normal += a.cross(b);
    }
    normal
}

pub fn face_center(positions: &[Vec3], face: &Face) -> Vec3 {
    let verts = face.vertices();
    verts.iter().map(|v| positions[v.index()]).sum::<Vec3>() / verts.len() as f32
}

/// Area-weighted vertex normals for an arbitrary position set over `faces`
pub fn vertex_normals(positions: &[Vec3], faces: &[Face]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for face in faces {
        let n = face_area_normal(positions, face);
        for v in face.vertices() {
            normals[v.index()] += n;
        }
    }
    for n in normals.iter_mut() {
        *n = n.normalize_or_zero();
    }
    normals
}

impl Mesh {
    /// Recompute every face and vertex normal
    pub fn recompute_normals(&mut self) {
        let raw: Vec<Vec3> = self
            .faces
            .iter()
            .map(|f| face_area_normal(&self.positions, f))
            .collect();

        self.face_centers = self
            .faces
            .iter()
            .map(|f| face_center(&self.positions, f))
            .collect();

        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for (face, n) in self.faces.iter().zip(&raw) {
            for v in face.vertices() {
                normals[v.index()] += *n;
            }
        }
        self.normals = normals.into_iter().map(Vec3::normalize_or_zero).collect();
        self.face_normals = raw.into_iter().map(Vec3::normalize_or_zero).collect();
    }

    /// Update normals after `moved` vertices changed position.
    ///
    /// Face normals change for every face incident to a moved vertex, and
    /// vertex normals for every corner of those faces. Returns both sets in
    /// ascending order.
    pub(crate) fn refresh_normals_around(&mut self, moved: &[VertexId]) -> Touched {
        let mut touched_faces = BTreeSet::new();
        for &v in moved {
            touched_faces.extend(self.topology.vertex_faces(v).iter().copied());
        }

        let mut touched_vertices: BTreeSet<VertexId> = moved.iter().copied().collect();
        for &f in &touched_faces {
            let face = &self.faces[f.index()];
            let n = face_area_normal(&self.positions, face);
            self.face_normals[f.index()] = n.normalize_or_zero();
            self.face_centers[f.index()] = face_center(&self.positions, face);
            touched_vertices.extend(face.vertices().iter().copied());
        }

        for &v in &touched_vertices {
            let sum: Vec3 = self
                .topology
                .vertex_faces(v)
                .iter()
                .map(|f| face_area_normal(&self.positions, &self.faces[f.index()]))
                .sum();
            self.normals[v.index()] = sum.normalize_or_zero();
        }

        Touched {
            vertices: touched_vertices.into_iter().collect(),
            faces: touched_faces.into_iter().collect(),
        }
    }
}
