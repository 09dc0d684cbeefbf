//! Construction of meshes from raw arrays and export back to them.

use glam::{Mat4, Vec2, Vec3};
use sculpt_config::DEFAULT_LEAF_SIZE;
use tracing::debug;

use super::Mesh;
use super::topology::Topology;
use super::types::{
    DEFAULT_COLOR, DEFAULT_MASK, DEFAULT_MATERIAL, Face, MeshData, MeshError, Symmetry,
    TRI_SENTINEL, VertexAttributes,
};
use super::validation::validate_faces;
use crate::spatial::Bvh;

/// Per-vertex arrays, all of the same length
pub(crate) struct VertexBuffers {
    pub positions: Vec<Vec3>,
    pub colors: Vec<Vec3>,
    pub materials: Vec<Vec2>,
    pub masks: Vec<f32>,
}

impl VertexBuffers {
    pub fn with_defaults(positions: Vec<Vec3>) -> Self {
        let n = positions.len();
        Self {
            positions,
            colors: vec![DEFAULT_COLOR; n],
            materials: vec![DEFAULT_MATERIAL; n],
            masks: vec![DEFAULT_MASK; n],
        }
    }

    /// Drop vertices no face references and renumber the faces.
    ///
    /// Returns the number of vertices removed.
    fn prune_orphans(&mut self, faces: &mut [Face]) -> usize {
        let mut used = vec![false; self.positions.len()];
        for face in faces.iter() {
            for v in face.vertices() {
                used[v.index()] = true;
            }
        }
        let orphans = used.iter().filter(|u| !**u).count();
        if orphans == 0 {
            return 0;
        }

        let mut remap = vec![u32::MAX; used.len()];
        let mut next = 0u32;
        for (old, _) in used.iter().enumerate().filter(|(_, u)| **u) {
            remap[old] = next;
            self.positions[next as usize] = self.positions[old];
            self.colors[next as usize] = self.colors[old];
            self.materials[next as usize] = self.materials[old];
            self.masks[next as usize] = self.masks[old];
            next += 1;
        }
        let kept = next as usize;
        self.positions.truncate(kept);
        self.colors.truncate(kept);
        self.materials.truncate(kept);
        self.masks.truncate(kept);

        for face in faces.iter_mut() {
            *face = face.remapped(&remap);
        }
        orphans
    }
}

fn attribute_len(name: &'static str, actual: usize, expected: usize) -> Result<(), MeshError> {
    if actual != expected {
        return Err(MeshError::AttributeLength {
            name,
            actual,
            expected,
        });
    }
    Ok(())
}

impl Mesh {
    /// Build a mesh with default attributes
    pub fn new(positions: Vec<Vec3>, faces: Vec<Face>) -> Result<Self, MeshError> {
        Self::assemble(VertexBuffers::with_defaults(positions), faces, DEFAULT_LEAF_SIZE)
    }

    /// Build a mesh with explicit per-vertex attributes
    pub fn with_attributes(
        positions: Vec<Vec3>,
        faces: Vec<Face>,
        attributes: &[VertexAttributes],
    ) -> Result<Self, MeshError> {
        attribute_len("attributes", attributes.len(), positions.len())?;
        let buffers = VertexBuffers {
            positions,
            colors: attributes.iter().map(|a| a.color).collect(),
            materials: attributes.iter().map(|a| a.material).collect(),
            masks: attributes.iter().map(|a| a.mask).collect(),
        };
        Self::assemble(buffers, faces, DEFAULT_LEAF_SIZE)
    }

    /// Build from a flat triangle index list (3 indices per face)
    pub fn from_triangles(positions: Vec<Vec3>, indices: &[u32]) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::FaceArrayLength {
                len: indices.len(),
                stride: 3,
            });
        }
        let faces = indices
            .chunks_exact(3)
            .map(|c| Face::tri(c[0], c[1], c[2]))
            .collect();
        Self::new(positions, faces)
    }

    /// Build from the raw array form used by import codecs
    pub fn from_data(data: &MeshData) -> Result<Self, MeshError> {
        if data.vertices.len() % 3 != 0 {
            return Err(MeshError::VertexArrayLength(data.vertices.len()));
        }
        if data.faces.len() % 4 != 0 {
            return Err(MeshError::FaceArrayLength {
                len: data.faces.len(),
                stride: 4,
            });
        }

        let positions: Vec<Vec3> = data
            .vertices
            .chunks_exact(3)
            .map(Vec3::from_slice)
            .collect();
        let n = positions.len();
        let mut buffers = VertexBuffers::with_defaults(positions);

        if let Some(colors) = &data.colors {
            attribute_len("colors", colors.len(), n * 3)?;
            buffers.colors = colors.chunks_exact(3).map(Vec3::from_slice).collect();
        }
        if let Some(materials) = &data.materials {
            attribute_len("materials", materials.len(), n * 2)?;
            buffers.materials = materials.chunks_exact(2).map(Vec2::from_slice).collect();
        }
        if let Some(masks) = &data.masks {
            attribute_len("masks", masks.len(), n)?;
            buffers.masks = masks.clone();
        }

        let mut faces = Vec::with_capacity(data.faces.len() / 4);
        for (i, c) in data.faces.chunks_exact(4).enumerate() {
            let face = match c {
                [a, b, cc, TRI_SENTINEL] if ![*a, *b, *cc].contains(&TRI_SENTINEL) => {
                    Face::tri(*a, *b, *cc)
                }
                [a, b, cc, d] if ![*a, *b, *cc].contains(&TRI_SENTINEL) => Face::quad(*a, *b, *cc, *d),
                _ => return Err(MeshError::FaceArity { face: i }),
            };
            faces.push(face);
        }

        Self::assemble(buffers, faces, DEFAULT_LEAF_SIZE)
    }

    /// Export to the raw array form, attributes included
    pub fn to_data(&self) -> MeshData {
        MeshData {
            vertices: self.positions.iter().flat_map(|p| p.to_array()).collect(),
            faces: self.faces.iter().flat_map(|f| f.to_array()).collect(),
            colors: Some(self.colors.iter().flat_map(|c| c.to_array()).collect()),
            materials: Some(self.materials.iter().flat_map(|m| m.to_array()).collect()),
            masks: Some(self.masks.clone()),
        }
    }

    /// Validate faces, prune orphans, and derive adjacency, normals and the
    /// picking index.
    pub(crate) fn assemble(
        mut buffers: VertexBuffers,
        mut faces: Vec<Face>,
        leaf_size: usize,
    ) -> Result<Self, MeshError> {
        validate_faces(&faces, buffers.positions.len())?;

        let pruned = buffers.prune_orphans(&mut faces);
        if pruned > 0 {
            debug!("Mesh::assemble: pruned {} orphan vertices", pruned);
        }

        let topology = Topology::build(&faces, buffers.positions.len());
        let index = Bvh::build(&buffers.positions, &faces, leaf_size);
        let mut mesh = Mesh {
            positions: buffers.positions,
            normals: Vec::new(),
            colors: buffers.colors,
            materials: buffers.materials,
            masks: buffers.masks,
            faces,
            face_normals: Vec::new(),
            face_centers: Vec::new(),
            topology,
            bounds: index.bounds(),
            index,
            transform: Mat4::IDENTITY,
            symmetry: Symmetry::default(),
        };
        mesh.recompute_normals();
        Ok(mesh)
    }
}
