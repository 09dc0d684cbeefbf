//! Structural checks for mesh construction.

use super::Mesh;
use super::types::{Face, MeshError};

/// Check every face references in-range, distinct vertices
pub(crate) fn validate_faces(faces: &[Face], vertex_count: usize) -> Result<(), MeshError> {
    for (i, face) in faces.iter().enumerate() {
        let verts = face.vertices();
        for (k, v) in verts.iter().enumerate() {
            if v.index() >= vertex_count {
                return Err(MeshError::IndexOutOfRange {
                    face: i,
                    index: v.0,
                    vertex_count,
                });
            }
            if verts[..k].contains(v) {
                return Err(MeshError::RepeatedVertex { face: i, index: v.0 });
            }
        }
    }
    Ok(())
}

impl Mesh {
    /// Recheck the construction invariants on a live mesh.
    ///
    /// Validates that:
    /// 1. Every face references distinct in-range vertices
    /// 2. Every vertex belongs to at least one face
    /// 3. Attribute and derived buffers match the vertex and face counts
    pub fn validate(&self) -> Result<(), MeshError> {
        let n = self.positions.len();
        validate_faces(&self.faces, n)?;

        if let Some(orphan) = (0..n).find(|&v| self.topology.vertex_faces[v].is_empty()) {
            return Err(MeshError::OrphanVertex(orphan as u32));
        }

        for (name, len) in [
            ("normals", self.normals.len()),
            ("colors", self.colors.len()),
            ("materials", self.materials.len()),
            ("masks", self.masks.len()),
        ] {
            if len != n {
                return Err(MeshError::AttributeLength {
                    name,
                    actual: len,
                    expected: n,
                });
            }
        }

        if self.face_normals.len() != self.faces.len() || self.index.face_count() != self.faces.len() {
            return Err(MeshError::InvalidTopology(format!(
                "derived face data out of date: {} normals, {} indexed, {} faces",
                self.face_normals.len(),
                self.index.face_count(),
                self.faces.len()
            )));
        }
        Ok(())
    }
}
