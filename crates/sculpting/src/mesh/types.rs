//! Type definitions for the indexed sculpt mesh.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::geometry::Plane;

/// Sentinel used in the flat face array for the missing 4th corner of a triangle
pub const TRI_SENTINEL: u32 = u32::MAX;

/// Type-safe vertex identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

impl VertexId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Type-safe face identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl FaceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A triangle or quad, corners in counter-clockwise order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    Tri([VertexId; 3]),
    Quad([VertexId; 4]),
}

impl Face {
    pub fn tri(a: u32, b: u32, c: u32) -> Self {
        Face::Tri([VertexId(a), VertexId(b), VertexId(c)])
    }

    pub fn quad(a: u32, b: u32, c: u32, d: u32) -> Self {
        Face::Quad([VertexId(a), VertexId(b), VertexId(c), VertexId(d)])
    }

    pub fn vertices(&self) -> &[VertexId] {
        match self {
            Face::Tri(v) => v,
            Face::Quad(v) => v,
        }
    }

    pub fn is_quad(&self) -> bool {
        matches!(self, Face::Quad(_))
    }

    /// Render triangles: one for a triangle, two (split along 0-2) for a quad
    pub fn triangles(&self) -> impl Iterator<Item = [VertexId; 3]> + '_ {
        let (first, second) = match *self {
            Face::Tri([a, b, c]) => ([a, b, c], None),
            Face::Quad([a, b, c, d]) => ([a, b, c], Some([a, c, d])),
        };
        std::iter::once(first).chain(second)
    }

    /// Directed edges (origin, destination) around the face
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        let verts = self.vertices();
        (0..verts.len()).map(move |i| (verts[i], verts[(i + 1) % verts.len()]))
    }

    /// Flat 4-wide representation with [`TRI_SENTINEL`] for triangles
    pub fn to_array(&self) -> [u32; 4] {
        match *self {
            Face::Tri([a, b, c]) => [a.0, b.0, c.0, TRI_SENTINEL],
            Face::Quad([a, b, c, d]) => [a.0, b.0, c.0, d.0],
        }
    }

    pub(crate) fn remapped(&self, map: &[u32]) -> Self {
        let m = |v: VertexId| VertexId(map[v.index()]);
        match *self {
            Face::Tri([a, b, c]) => Face::Tri([m(a), m(b), m(c)]),
            Face::Quad([a, b, c, d]) => Face::Quad([m(a), m(b), m(c), m(d)]),
        }
    }
}

/// Bilateral symmetry specification in mesh space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Symmetry {
    pub origin: Vec3,
    pub normal: Vec3,
    /// Signed offset of the plane along `normal` from `origin`
    pub offset: f32,
}

impl Default for Symmetry {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            normal: Vec3::X,
            offset: 0.0,
        }
    }
}

impl Symmetry {
    pub fn plane(&self) -> Plane {
        let normal = self.normal.normalize_or_zero();
        Plane::new(self.origin + normal * self.offset, normal)
    }
}

/// Per-vertex paint attributes edited by the Paint and Masking tools
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexAttributes {
    pub color: Vec3,
    /// Roughness, metalness
    pub material: Vec2,
    /// Sculpt influence multiplier: 1 editable, 0 frozen
    pub mask: f32,
}

/// Default vertex color (white)
pub const DEFAULT_COLOR: Vec3 = Vec3::ONE;

/// Default vertex material (roughness, metalness)
pub const DEFAULT_MATERIAL: Vec2 = Vec2::new(0.18, 0.08);

/// Default mask (fully editable)
pub const DEFAULT_MASK: f32 = 1.0;

impl Default for VertexAttributes {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR,
            material: DEFAULT_MATERIAL,
            mask: DEFAULT_MASK,
        }
    }
}

/// Raw array form of a mesh, as produced and consumed by import/export codecs.
///
/// `faces` holds 4 indices per face; triangles use [`TRI_SENTINEL`] as the
/// 4th entry. Optional attribute arrays must match the vertex count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    /// xyz per vertex
    pub vertices: Vec<f32>,
    pub faces: Vec<u32>,
    /// rgb per vertex
    pub colors: Option<Vec<f32>>,
    /// roughness, metalness per vertex
    pub materials: Option<Vec<f32>>,
    pub masks: Option<Vec<f32>>,
}

/// Errors that can occur while constructing a mesh
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("Vertex array length {0} is not a multiple of 3")]
    VertexArrayLength(usize),
    #[error("Face array length {len} is not a multiple of {stride}")]
    FaceArrayLength { len: usize, stride: usize },
    #[error("Face {face} has an invalid corner layout")]
    FaceArity { face: usize },
    #[error("Face {face} references vertex {index} but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("Face {face} repeats vertex {index}")]
    RepeatedVertex { face: usize, index: u32 },
    #[error("Attribute '{name}' has {actual} values, expected {expected}")]
    AttributeLength {
        name: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("Vertex {0} is not referenced by any face")]
    OrphanVertex(u32),
    #[error("Invalid mesh topology: {0}")]
    InvalidTopology(String),
}
