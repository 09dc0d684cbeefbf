//! Sculpt brush engine and stroke state.
//!
//! This module provides the falloff curves used to weight a dab and the
//! per-stroke state machine: `IDLE` while no [`StrokeState`] exists,
//! `ACTIVE` from a successful press until release or cancel.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::{Plane, Ray, line_plane_intersection};
use crate::mesh::{Mesh, VertexId};
use crate::spatial::RadiusHits;
use crate::types::{MeshId, PickResult, ToolKind, ToolSettings};

/// Falloff curve for brush influence.
///
/// Determines how brush strength decreases from center to edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FalloffCurve {
    /// Linear falloff: strength = 1 - distance/radius
    Linear = 0,
    /// Smooth falloff: hermite interpolation
    #[default]
    Smooth = 1,
    /// Sharp falloff: quadratic decay
    Sharp = 2,
    /// Constant: full strength within radius
    Constant = 3,
    /// Sphere: spherical falloff (sqrt-based)
    Sphere = 4,
}

impl FalloffCurve {
    /// Calculate falloff strength at a given normalized distance (0.0 = center, 1.0 = edge).
    pub fn evaluate(&self, normalized_distance: f32) -> f32 {
        let d = normalized_distance.clamp(0.0, 1.0);
        match self {
            FalloffCurve::Linear => 1.0 - d,
            FalloffCurve::Smooth => {
                let t = 1.0 - d;
                t * t * (3.0 - 2.0 * t)
            }
            FalloffCurve::Sharp => {
                let t = 1.0 - d;
                t * t
            }
            FalloffCurve::Constant => 1.0,
            FalloffCurve::Sphere => (1.0 - d * d).max(0.0).sqrt(),
        }
    }
}

/// Vertices grabbed by the Move tool at press, with their press positions.
///
/// Weights already include the vertex mask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveAnchor {
    pub vertices: Vec<VertexId>,
    pub weights: Vec<f32>,
    pub origins: Vec<Vec3>,
    /// Reflects pointer deltas for the mirrored half of a symmetric stroke
    pub mirror: Option<Plane>,
}

impl MoveAnchor {
    pub fn capture(mesh: &Mesh, hits: &RadiusHits, mirror: Option<Plane>) -> Self {
        Self {
            vertices: hits.vertices.clone(),
            weights: hits.iter().map(|(v, w)| w * mesh.mask(v)).collect(),
            origins: hits.vertices.iter().map(|&v| mesh.position(v)).collect(),
            mirror,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// State for an active stroke.
#[derive(Debug, Clone)]
pub struct StrokeState {
    pub stroke_id: u64,
    pub mesh: MeshId,
    pub level: usize,
    pub tool: ToolKind,
    /// Mesh-space plane through the press hit facing the viewer; pointer
    /// rays are projected onto it to derive deltas
    pub view_plane: Plane,
    /// Current brush centre in mesh space
    pub center: Vec3,
    pub press_pointer: Vec3,
    pub last_pointer: Vec3,
    /// Most recent successful pick, reused by continuous application
    pub last_pick: PickResult,
    pub anchors: Vec<MoveAnchor>,
    /// Dabs that produced an edit
    pub dabs: u32,
}

impl StrokeState {
    /// Project a mesh-space ray onto the view plane
    pub fn project(&self, ray: &Ray) -> Option<Vec3> {
        line_plane_intersection(ray.origin, ray.direction, self.view_plane.point, self.view_plane.normal)
    }

    /// Pointer displacement since press
    pub fn total_delta(&self) -> Vec3 {
        self.last_pointer - self.press_pointer
    }
}

/// Drives one stroke at a time for the current tool settings.
#[derive(Debug, Default)]
pub struct SculptBrushEngine {
    pub settings: ToolSettings,
    active_stroke: Option<StrokeState>,
    next_stroke_id: u64,
}

impl SculptBrushEngine {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Check if a stroke is currently active.
    pub fn is_stroking(&self) -> bool {
        self.active_stroke.is_some()
    }

    /// Enter `ACTIVE` from a successful pick.
    ///
    /// `view_dir` is the mesh-space pick ray direction. Returns the stroke ID.
    pub fn begin_stroke(&mut self, pick: PickResult, view_dir: Vec3) -> u64 {
        let stroke_id = self.next_stroke_id;
        self.next_stroke_id += 1;

        let normal = if view_dir.length_squared() > 0.0 { -view_dir } else { pick.normal };
        self.active_stroke = Some(StrokeState {
            stroke_id,
            mesh: pick.mesh,
            level: pick.level,
            tool: self.settings.kind,
            view_plane: Plane::new(pick.point, normal),
            center: pick.point,
            press_pointer: pick.point,
            last_pointer: pick.point,
            last_pick: pick,
            anchors: Vec::new(),
            dabs: 0,
        });

        stroke_id
    }

    pub fn stroke(&self) -> Option<&StrokeState> {
        self.active_stroke.as_ref()
    }

    pub fn stroke_mut(&mut self) -> Option<&mut StrokeState> {
        self.active_stroke.as_mut()
    }

    /// Leave `ACTIVE`, handing back the finished stroke
    pub fn end_stroke(&mut self) -> Option<StrokeState> {
        self.active_stroke.take()
    }

    /// Abandon the current stroke
    pub fn cancel_stroke(&mut self) -> Option<StrokeState> {
        self.active_stroke.take()
    }
}
