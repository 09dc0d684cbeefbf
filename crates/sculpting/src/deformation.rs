//! Vertex deformation algorithms for sculpting.
//!
//! Every tool is a pure function of a read-only [`Mesh`], the weighted
//! vertex set of one dab and a [`DabInfo`]; it returns the new values for
//! the vertices it changes. [`apply_tool`] is the single dispatch point.
//! Writing the results back (and recording them for undo) is the caller's
//! job, so all tools see a consistent snapshot within one dab.

use glam::{Quat, Vec3};

use crate::brush::MoveAnchor;
use crate::geometry::EPSILON;
use crate::mesh::{Mesh, VertexAttributes, VertexId};
use crate::spatial::RadiusHits;
use crate::types::{ToolKind, ToolSettings};

/// Information about one dab, in mesh space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DabInfo {
    pub center: Vec3,
    /// Geometric normal at the pick, used when the region normal vanishes
    pub normal: Vec3,
    pub radius: f32,
    pub intensity: f32,
    /// +1 or -1
    pub sign: f32,
    /// Pointer on the view plane before and after this event
    pub previous_pointer: Vec3,
    pub pointer: Vec3,
}

impl DabInfo {
    pub fn new(center: Vec3, normal: Vec3, radius: f32, settings: &ToolSettings) -> Self {
        Self {
            center,
            normal,
            radius,
            intensity: settings.intensity,
            sign: settings.sign(),
            previous_pointer: center,
            pointer: center,
        }
    }

    pub fn with_pointer(mut self, previous: Vec3, current: Vec3) -> Self {
        self.previous_pointer = previous;
        self.pointer = current;
        self
    }

    pub fn pointer_delta(&self) -> Vec3 {
        self.pointer - self.previous_pointer
    }
}

/// Values produced by one tool application
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ToolEdit {
    #[default]
    None,
    Positions(Vec<(VertexId, Vec3)>),
    Attributes(Vec<(VertexId, VertexAttributes)>),
}

impl ToolEdit {
    pub fn len(&self) -> usize {
        match self {
            ToolEdit::None => 0,
            ToolEdit::Positions(p) => p.len(),
            ToolEdit::Attributes(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn positions(updates: Vec<(VertexId, Vec3)>) -> Self {
        if updates.is_empty() { ToolEdit::None } else { ToolEdit::Positions(updates) }
    }
}

/// Falloff weights gated by the vertex mask; the Masking tool ignores the
/// mask so it can always undo itself. Zero-weight vertices are dropped.
pub fn effective_weights(mesh: &Mesh, hits: &RadiusHits, kind: ToolKind) -> Vec<(VertexId, f32)> {
    hits.iter()
        .map(|(v, w)| {
            let gate = if kind == ToolKind::Masking { 1.0 } else { mesh.mask(v) };
            (v, w * gate)
        })
        .filter(|&(_, w)| w > 0.0)
        .collect()
}

/// Weighted mean vertex normal of the region
pub fn area_normal(mesh: &Mesh, weighted: &[(VertexId, f32)], fallback: Vec3) -> Vec3 {
    let sum: Vec3 = weighted.iter().map(|&(v, w)| mesh.normal(v) * w).sum();
    let n = sum.normalize_or_zero();
    if n == Vec3::ZERO { fallback.normalize_or_zero() } else { n }
}

/// Weighted mean position of the region
pub fn area_center(mesh: &Mesh, weighted: &[(VertexId, f32)]) -> Option<Vec3> {
    let total: f32 = weighted.iter().map(|&(_, w)| w).sum();
    if total <= EPSILON {
        return None;
    }
    let sum: Vec3 = weighted.iter().map(|&(v, w)| mesh.position(v) * w).sum();
    Some(sum / total)
}

/// Brush: push along the region normal.
pub fn apply_brush(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let n = area_normal(mesh, weighted, dab.normal);
    weighted
        .iter()
        .map(|&(v, w)| (v, mesh.position(v) + n * (dab.intensity * w * dab.sign)))
        .collect()
}

/// Inflate: push along each vertex's own normal.
pub fn apply_inflate(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    weighted
        .iter()
        .map(|&(v, w)| (v, mesh.position(v) + mesh.normal(v) * (dab.intensity * w * dab.sign)))
        .collect()
}

/// Smooth: relax toward the ring average. All targets are computed from
/// the unmodified positions.
pub fn apply_smooth(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let topology = mesh.topology();
    weighted
        .iter()
        .filter_map(|&(v, w)| {
            let ring = topology.neighbors(v);
            if ring.is_empty() {
                return None;
            }
            let avg = ring.iter().map(|&n| mesh.position(n)).sum::<Vec3>() / ring.len() as f32;
            let t = (dab.intensity * w).clamp(0.0, 1.0);
            Some((v, mesh.position(v).lerp(avg, t)))
        })
        .collect()
}

/// Flatten: project onto the plane through the region's mean position.
pub fn apply_flatten(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let Some(c) = area_center(mesh, weighted) else {
        return Vec::new();
    };
    let n = area_normal(mesh, weighted, dab.normal);
    weighted
        .iter()
        .map(|&(v, w)| {
            let p = mesh.position(v);
            let t = (dab.intensity * w).clamp(0.0, 1.0);
            (v, p - n * ((p - c).dot(n) * t))
        })
        .collect()
}

/// Pinch: pull toward the brush centre within the tangent plane.
pub fn apply_pinch(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let n = area_normal(mesh, weighted, dab.normal);
    weighted
        .iter()
        .map(|&(v, w)| (v, mesh.position(v) + pinch_offset(mesh.position(v), n, dab, w)))
        .collect()
}

fn pinch_offset(p: Vec3, n: Vec3, dab: &DabInfo, w: f32) -> Vec3 {
    let to_center = dab.center - p;
    let tangential = to_center - n * to_center.dot(n);
    tangential * (dab.intensity * w * dab.sign * 0.5)
}

/// Crease: pinch plus a cut into the surface.
pub fn apply_crease(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let n = area_normal(mesh, weighted, dab.normal);
    weighted
        .iter()
        .map(|&(v, w)| {
            let p = mesh.position(v);
            let carve = -n * (dab.intensity * w * dab.sign * dab.radius * 0.25);
            (v, p + pinch_offset(p, n, dab, w) + carve)
        })
        .collect()
}

/// Drag: follow the pointer delta, weighted by falloff.
pub fn apply_drag(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let delta = dab.pointer_delta();
    if delta.length_squared() == 0.0 {
        return Vec::new();
    }
    weighted
        .iter()
        .map(|&(v, w)| (v, mesh.position(v) + delta * w))
        .collect()
}

/// Twist: rotate about the region normal by the pointer's swept angle.
pub fn apply_twist(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let n = area_normal(mesh, weighted, dab.normal);
    let flatten = |d: Vec3| d - n * d.dot(n);
    let from = flatten(dab.previous_pointer - dab.center);
    let to = flatten(dab.pointer - dab.center);
    if from.length_squared() <= EPSILON || to.length_squared() <= EPSILON {
        return Vec::new();
    }
    let angle = n.dot(from.cross(to)).atan2(from.dot(to));
    if angle == 0.0 {
        return Vec::new();
    }
    weighted
        .iter()
        .map(|&(v, w)| {
            let rotation = Quat::from_axis_angle(n, angle * w * dab.sign * dab.intensity);
            (v, dab.center + rotation * (mesh.position(v) - dab.center))
        })
        .collect()
}

/// LocalScale: scale about the centre by the ratio of pointer distances.
pub fn apply_local_scale(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let before = dab.previous_pointer.distance(dab.center);
    let after = dab.pointer.distance(dab.center);
    if before <= EPSILON || after <= EPSILON || before == after {
        return Vec::new();
    }
    let k = if dab.sign < 0.0 { before / after } else { after / before };
    weighted
        .iter()
        .map(|&(v, w)| {
            let p = mesh.position(v);
            (v, dab.center + (p - dab.center) * (1.0 + (k - 1.0) * w))
        })
        .collect()
}

/// Transform: translate the whole level, gated by the mask only.
pub fn apply_transform(mesh: &Mesh, dab: &DabInfo) -> Vec<(VertexId, Vec3)> {
    let delta = dab.pointer_delta();
    if delta.length_squared() == 0.0 {
        return Vec::new();
    }
    (0..mesh.vertex_count() as u32)
        .map(VertexId)
        .filter(|&v| mesh.mask(v) > 0.0)
        .map(|v| (v, mesh.position(v) + delta * mesh.mask(v)))
        .collect()
}

/// Move: place grabbed vertices at their press position plus the total
/// pointer delta (mirrored for the symmetric anchor).
pub fn apply_move(anchor: &MoveAnchor, total_delta: Vec3) -> Vec<(VertexId, Vec3)> {
    let delta = match anchor.mirror {
        Some(plane) => plane.mirror_direction(total_delta),
        None => total_delta,
    };
    anchor
        .vertices
        .iter()
        .zip(&anchor.weights)
        .zip(&anchor.origins)
        .filter(|((_, w), _)| **w > 0.0)
        .map(|((&v, &w), &origin)| (v, origin + delta * w))
        .collect()
}

/// Paint: blend color and material toward the settings.
pub fn apply_paint(
    mesh: &Mesh,
    weighted: &[(VertexId, f32)],
    dab: &DabInfo,
    settings: &ToolSettings,
) -> Vec<(VertexId, VertexAttributes)> {
    weighted
        .iter()
        .map(|&(v, w)| {
            let t = (dab.intensity * w).clamp(0.0, 1.0);
            let mut attrs = mesh.attributes(v);
            attrs.color = attrs.color.lerp(settings.color, t);
            attrs.material = attrs.material.lerp(settings.material, t);
            (v, attrs)
        })
        .collect()
}

/// Masking: positive strokes lower the mask, negative strokes restore it.
pub fn apply_masking(mesh: &Mesh, weighted: &[(VertexId, f32)], dab: &DabInfo) -> Vec<(VertexId, VertexAttributes)> {
    weighted
        .iter()
        .map(|&(v, w)| {
            let mut attrs = mesh.attributes(v);
            attrs.mask = (attrs.mask - dab.intensity * w * dab.sign).clamp(0.0, 1.0);
            (v, attrs)
        })
        .collect()
}

/// Apply one dab of `settings.kind`.
///
/// Move is not handled here: it works from the [`MoveAnchor`] captured at
/// press, see [`apply_move`].
pub fn apply_tool(mesh: &Mesh, settings: &ToolSettings, dab: &DabInfo, hits: &RadiusHits) -> ToolEdit {
    if settings.kind == ToolKind::Transform {
        return ToolEdit::positions(apply_transform(mesh, dab));
    }

    let weighted = effective_weights(mesh, hits, settings.kind);
    if weighted.is_empty() {
        return ToolEdit::None;
    }

    match settings.kind {
        ToolKind::Brush => ToolEdit::positions(apply_brush(mesh, &weighted, dab)),
        ToolKind::Inflate => ToolEdit::positions(apply_inflate(mesh, &weighted, dab)),
        ToolKind::Twist => ToolEdit::positions(apply_twist(mesh, &weighted, dab)),
        ToolKind::Smooth => ToolEdit::positions(apply_smooth(mesh, &weighted, dab)),
        ToolKind::Flatten => ToolEdit::positions(apply_flatten(mesh, &weighted, dab)),
        ToolKind::Pinch => ToolEdit::positions(apply_pinch(mesh, &weighted, dab)),
        ToolKind::Crease => ToolEdit::positions(apply_crease(mesh, &weighted, dab)),
        ToolKind::Drag => ToolEdit::positions(apply_drag(mesh, &weighted, dab)),
        ToolKind::LocalScale => ToolEdit::positions(apply_local_scale(mesh, &weighted, dab)),
        ToolKind::Paint => ToolEdit::Attributes(apply_paint(mesh, &weighted, dab, settings)),
        ToolKind::Masking => ToolEdit::Attributes(apply_masking(mesh, &weighted, dab)),
        ToolKind::Move | ToolKind::Transform => ToolEdit::None,
    }
}
