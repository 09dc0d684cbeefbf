//! Detail offsets of a fine level relative to its smoothed coarse surface.
//!
//! Offsets are stored in a per-vertex orthonormal frame of the smoothed
//! surface so that they rotate with it when a coarse level is edited.

use glam::Vec3;

use crate::mesh::{Face, Topology, VertexId, vertex_normals};

/// Tangent, bitangent and normal of the smoothed surface at one vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
}

impl Frame {
    const WORLD: Frame = Frame {
        tangent: Vec3::X,
        bitangent: Vec3::Y,
        normal: Vec3::Z,
    };

    fn to_local(&self, d: Vec3) -> Vec3 {
        Vec3::new(d.dot(self.tangent), d.dot(self.bitangent), d.dot(self.normal))
    }

    fn to_world(&self, d: Vec3) -> Vec3 {
        self.tangent * d.x + self.bitangent * d.y + self.normal * d.z
    }
}

/// Frames of the smoothed surface, computed on the fine topology
pub fn frames(smoothed: &[Vec3], faces: &[Face], topology: &Topology) -> Vec<Frame> {
    let normals = vertex_normals(smoothed, faces);
    normals
        .iter()
        .enumerate()
        .map(|(i, &normal)| {
            if normal == Vec3::ZERO {
                return Frame::WORLD;
            }
            let toward = topology
                .neighbors(VertexId(i as u32))
                .first()
                .map_or(Vec3::ZERO, |n| smoothed[n.index()] - smoothed[i]);
            let projected = (toward - normal * toward.dot(normal)).normalize_or_zero();
            let tangent = if projected == Vec3::ZERO {
                normal.any_orthonormal_vector()
            } else {
                projected
            };
            Frame {
                tangent,
                bitangent: normal.cross(tangent),
                normal,
            }
        })
        .collect()
}

/// Local offsets of `actual` from `smoothed`
pub fn compute_details(actual: &[Vec3], smoothed: &[Vec3], frames: &[Frame]) -> Vec<Vec3> {
    actual
        .iter()
        .zip(smoothed)
        .zip(frames)
        .map(|((p, s), frame)| frame.to_local(*p - *s))
        .collect()
}

/// Positions obtained by re-adding `details` on top of `smoothed`
pub fn synthesize(smoothed: &[Vec3], details: &[Vec3], frames: &[Frame]) -> Vec<Vec3> {
    smoothed
        .iter()
        .zip(details)
        .zip(frames)
        .map(|((s, d), frame)| *s + frame.to_world(*d))
        .collect()
}
