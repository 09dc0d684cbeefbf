//! Core sculpting types shared by the tool engine, scene and pipeline.

use glam::{Vec2, Vec3};
use sculpt_config::ToolDefaults;
use serde::{Deserialize, Serialize};

use crate::brush::FalloffCurve;
use crate::mesh::{FaceId, VertexId};

/// Stable identifier of a mesh inside a [`crate::scene::Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeshId(pub u32);

/// The closed set of sculpt tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ToolKind {
    /// Push vertices along the mean normal of the brushed region
    #[default]
    Brush = 0,
    /// Push vertices along their own normals
    Inflate = 1,
    /// Rotate the region around the brush normal following the pointer
    Twist = 2,
    /// Relax vertices toward their ring average
    Smooth = 3,
    /// Project vertices onto the region's mean plane
    Flatten = 4,
    /// Pull vertices toward the brush centre
    Pinch = 5,
    /// Pinch while carving along the normal
    Crease = 6,
    /// Move vertices with the pointer, the brush following along
    Drag = 7,
    /// Blend vertex color and material toward the paint settings
    Paint = 8,
    /// Move the vertices grabbed at press by the total pointer delta
    Move = 9,
    /// Write the per-vertex mask instead of positions
    Masking = 10,
    /// Scale the region about the brush centre
    LocalScale = 11,
    /// Translate the whole level
    Transform = 12,
}

impl ToolKind {
    pub const ALL: [ToolKind; 13] = [
        ToolKind::Brush,
        ToolKind::Inflate,
        ToolKind::Twist,
        ToolKind::Smooth,
        ToolKind::Flatten,
        ToolKind::Pinch,
        ToolKind::Crease,
        ToolKind::Drag,
        ToolKind::Paint,
        ToolKind::Move,
        ToolKind::Masking,
        ToolKind::LocalScale,
        ToolKind::Transform,
    ];

    /// Tools driven by pointer motion; they do nothing until the pointer moves
    pub fn uses_pointer_delta(self) -> bool {
        matches!(
            self,
            ToolKind::Twist | ToolKind::Drag | ToolKind::Move | ToolKind::LocalScale | ToolKind::Transform
        )
    }

    /// Tools that write color/material/mask rather than positions
    pub fn edits_attributes(self) -> bool {
        matches!(self, ToolKind::Paint | ToolKind::Masking)
    }

    /// Tools that may keep applying while the pointer is held still
    pub fn supports_continuous(self) -> bool {
        !self.uses_pointer_delta()
    }
}

/// User-adjustable tool settings, read on every dab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub kind: ToolKind,
    /// Brush radius in world units
    pub radius: f32,
    /// Strength multiplier (0.0 to 1.0)
    pub intensity: f32,
    /// Subtractive instead of additive
    pub negative: bool,
    pub symmetry: bool,
    /// Re-apply while the pointer is stationary
    pub continuous: bool,
    pub falloff: FalloffCurve,
    /// Paint color (linear RGB)
    pub color: Vec3,
    /// Paint material (roughness, metalness)
    pub material: Vec2,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from(&ToolDefaults::default())
    }
}

impl From<&ToolDefaults> for ToolSettings {
    fn from(defaults: &ToolDefaults) -> Self {
        Self {
            kind: ToolKind::default(),
            radius: defaults.radius,
            intensity: defaults.intensity,
            negative: false,
            symmetry: defaults.symmetry,
            continuous: defaults.continuous,
            falloff: FalloffCurve::default(),
            color: Vec3::from_array(defaults.color),
            material: Vec2::from_array(defaults.material),
        }
    }
}

impl ToolSettings {
    pub fn with_kind(mut self, kind: ToolKind) -> Self {
        self.kind = kind;
        self
    }

    /// +1 for additive strokes, -1 for subtractive ones
    pub fn sign(&self) -> f32 {
        if self.negative { -1.0 } else { 1.0 }
    }
}

/// Result of picking the scene with a ray.
///
/// Geometry is in the picked mesh's local space except `world_point`.
#[derive(Debug, Clone, PartialEq)]
pub struct PickResult {
    pub mesh: MeshId,
    /// Level of the multiresolution stack that was picked
    pub level: usize,
    pub face: FaceId,
    pub point: Vec3,
    pub world_point: Vec3,
    /// Geometric normal of the hit face
    pub normal: Vec3,
    /// Ray parameter in world space
    pub distance: f32,
    pub triangle: [VertexId; 3],
    pub barycentric: [f32; 3],
    /// Affected vertices with falloff weights (mask not applied)
    pub vertices: Vec<VertexId>,
    pub weights: Vec<f32>,
    /// Brush radius in local units
    pub radius: f32,
}
