//! Render-side view of sculpted meshes.
//!
//! The renderer is an external collaborator; this module gives it what it
//! needs for partial uploads:
//!
//! - **Dirty regions**: which vertices and faces of which level changed
//! - **Vertex packing**: `Pod` vertices ready for a GPU buffer copy
//!
//! A region flagged `topology_changed` means the index buffer must be
//! rebuilt as well; otherwise patching the listed vertex range is enough.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::mesh::{FaceId, Mesh, VertexId};
use crate::types::MeshId;

/// Vertices and faces of one mesh level changed since the last upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtyRegion {
    pub mesh: Option<MeshId>,
    pub level: usize,
    /// Sorted, unique
    pub vertices: Vec<VertexId>,
    /// Sorted, unique
    pub faces: Vec<FaceId>,
    pub topology_changed: bool,
}

fn merge_sorted<T: Ord + Copy>(a: &mut Vec<T>, b: &[T]) {
    a.extend_from_slice(b);
    a.sort_unstable();
    a.dedup();
}

impl DirtyRegion {
    pub fn new(mesh: MeshId, level: usize, mut vertices: Vec<VertexId>, mut faces: Vec<FaceId>) -> Self {
        vertices.sort_unstable();
        vertices.dedup();
        faces.sort_unstable();
        faces.dedup();
        Self {
            mesh: Some(mesh),
            level,
            vertices,
            faces,
            topology_changed: false,
        }
    }

    /// Everything in `mesh` changed, index buffer included
    pub fn full(id: MeshId, level: usize, mesh: &Mesh) -> Self {
        Self {
            mesh: Some(id),
            level,
            vertices: (0..mesh.vertex_count() as u32).map(VertexId).collect(),
            faces: (0..mesh.face_count() as u32).map(FaceId).collect(),
            topology_changed: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.faces.is_empty() && !self.topology_changed
    }

    /// Whether `other` can be folded into this region
    pub fn same_target(&self, other: &DirtyRegion) -> bool {
        self.mesh == other.mesh && self.level == other.level
    }

    pub fn merge(&mut self, other: &DirtyRegion) {
        if self.mesh.is_none() {
            self.mesh = other.mesh;
            self.level = other.level;
        }
        debug_assert!(self.same_target(other));
        merge_sorted(&mut self.vertices, &other.vertices);
        merge_sorted(&mut self.faces, &other.faces);
        self.topology_changed |= other.topology_changed;
    }

    /// Smallest contiguous vertex range covering the region
    pub fn vertex_range(&self) -> Option<Range<u32>> {
        Some(self.vertices.first()?.0..self.vertices.last()?.0 + 1)
    }

    /// Smallest contiguous face range covering the region
    pub fn face_range(&self) -> Option<Range<u32>> {
        Some(self.faces.first()?.0..self.faces.last()?.0 + 1)
    }
}

/// Interleaved vertex as uploaded to the GPU
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct RenderVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    /// Roughness, metalness, mask
    pub material: [f32; 3],
}

impl Mesh {
    /// Pack a range of vertices for upload (clamped to the vertex count)
    pub fn render_vertices(&self, range: Range<u32>) -> Vec<RenderVertex> {
        let end = (range.end as usize).min(self.vertex_count());
        let start = (range.start as usize).min(end);
        (start..end)
            .map(|i| {
                let material = self.materials()[i];
                RenderVertex {
                    position: self.positions()[i].to_array(),
                    normal: self.normals()[i].to_array(),
                    color: self.colors()[i].to_array(),
                    material: [material.x, material.y, self.masks()[i]],
                }
            })
            .collect()
    }

    /// Triangle list index buffer; quads contribute two triangles each
    pub fn triangle_indices(&self) -> Vec<u32> {
        self.faces()
            .iter()
            .flat_map(|f| f.triangles().flat_map(|t| t.map(|v| v.0)).collect::<Vec<_>>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::unit_cube;

    #[test]
    fn test_region_merge_and_ranges() {
        let mut region = DirtyRegion::new(MeshId(1), 0, vec![VertexId(9), VertexId(4)], vec![FaceId(2)]);
        region.merge(&DirtyRegion::new(MeshId(1), 0, vec![VertexId(4), VertexId(6)], vec![FaceId(0)]));
        assert_eq!(region.vertices, vec![VertexId(4), VertexId(6), VertexId(9)]);
        assert_eq!(region.vertex_range(), Some(4..10));
        assert_eq!(region.face_range(), Some(0..3));
        assert!(!region.topology_changed);

        let mut empty = DirtyRegion::default();
        assert!(empty.is_empty());
        assert_eq!(empty.vertex_range(), None);
        empty.merge(&region);
        assert_eq!(empty.mesh, Some(MeshId(1)));
    }

    #[test]
    fn test_render_buffers_for_cube() {
        let cube = unit_cube();
        assert_eq!(cube.triangle_indices().len(), 36);

        let vertices = cube.render_vertices(0..100);
        assert_eq!(vertices.len(), 8);
        assert_eq!(bytemuck::cast_slice::<RenderVertex, u8>(&vertices).len(), 8 * 48);
        assert_eq!(vertices[6].material[2], 1.0);

        let full = DirtyRegion::full(MeshId(0), 0, &cube);
        assert!(full.topology_changed);
        assert_eq!(full.vertex_range(), Some(0..8));
    }
}
