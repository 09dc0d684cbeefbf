//! Bounding volume hierarchy over mesh faces.
//!
//! Nodes are stored flat with children always placed after their parent,
//! which lets a refit walk dirty nodes in descending index order and see
//! every child before its parent. Refits only move boxes; the tree shape is
//! rebuilt when the face count changes.

use std::collections::BTreeSet;

use glam::Vec3;
use tracing::trace;

use super::Aabb;
use crate::brush::FalloffCurve;
use crate::geometry::{EPSILON, Ray, ray_triangle_intersection};
use crate::mesh::{Face, FaceId, VertexId};

const NO_PARENT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    /// Range into `Bvh::faces`
    Leaf { start: u32, count: u32 },
    Internal { left: u32, right: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BvhNode {
    pub bounds: Aabb,
    kind: NodeKind,
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// Nearest intersection found by [`Bvh::cast_ray`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub face: FaceId,
    /// Ray parameter of the hit
    pub t: f32,
    pub point: Vec3,
    /// Render triangle of `face` that was hit
    pub triangle: [VertexId; 3],
    /// Weights of `triangle`'s corners, summing to one
    pub barycentric: [f32; 3],
}

/// Vertices inside a query sphere with their falloff weights, sorted by index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadiusHits {
    pub vertices: Vec<VertexId>,
    pub weights: Vec<f32>,
}

impl RadiusHits {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VertexId, f32)> + '_ {
        self.vertices.iter().copied().zip(self.weights.iter().copied())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    /// Face ids grouped by leaf
    faces: Vec<FaceId>,
    /// Leaf node owning each face
    face_leaf: Vec<u32>,
    parents: Vec<u32>,
    leaf_size: usize,
}

fn face_bounds(positions: &[Vec3], face: &Face) -> Aabb {
    Aabb::from_points(face.vertices().iter().map(|v| positions[v.index()]))
}

impl Bvh {
    /// Build a hierarchy over every face of the mesh.
    ///
    /// Splits at the centroid median along the longest axis until a node
    /// holds at most `leaf_size` faces.
    pub fn build(positions: &[Vec3], faces: &[Face], leaf_size: usize) -> Self {
        let leaf_size = leaf_size.max(1);
        let mut bvh = Self {
            nodes: Vec::new(),
            faces: (0..faces.len() as u32).map(FaceId).collect(),
            face_leaf: vec![0; faces.len()],
            parents: Vec::new(),
            leaf_size,
        };
        if faces.is_empty() {
            return bvh;
        }

        let boxes: Vec<Aabb> = faces.iter().map(|f| face_bounds(positions, f)).collect();
        let centroids: Vec<Vec3> = boxes.iter().map(Aabb::center).collect();

        bvh.build_node(&boxes, &centroids, 0, faces.len(), NO_PARENT);
        bvh
    }

    fn build_node(
        &mut self,
        boxes: &[Aabb],
        centroids: &[Vec3],
        start: usize,
        end: usize,
        parent: u32,
    ) -> u32 {
        let node_index = self.nodes.len() as u32;
        let bounds = self.faces[start..end]
            .iter()
            .fold(Aabb::empty(), |acc, f| acc.union(&boxes[f.index()]));
        self.nodes.push(BvhNode {
            bounds,
            kind: NodeKind::Leaf {
                start: start as u32,
                count: (end - start) as u32,
            },
        });
        self.parents.push(parent);

        let count = end - start;
        if count <= self.leaf_size {
            for f in &self.faces[start..end] {
                self.face_leaf[f.index()] = node_index;
            }
            return node_index;
        }

        let centroid_bounds = Aabb::from_points(self.faces[start..end].iter().map(|f| centroids[f.index()]));
        let axis = centroid_bounds.longest_axis();
        let mid = start + count / 2;
        self.faces[start..end].select_nth_unstable_by(count / 2, |a, b| {
            centroids[a.index()][axis]
                .total_cmp(&centroids[b.index()][axis])
                .then(a.cmp(b))
        });

        let left = self.build_node(boxes, centroids, start, mid, node_index);
        let right = self.build_node(boxes, centroids, mid, end, node_index);
        self.nodes[node_index as usize].kind = NodeKind::Internal { left, right };
        node_index
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// Number of faces the tree was built over
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Bounds of the whole tree
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or_else(Aabb::empty, |n| n.bounds)
    }

    /// Recompute the boxes of the given faces' leaves and all their ancestors.
    ///
    /// Returns the number of nodes touched.
    pub fn refit(&mut self, positions: &[Vec3], faces: &[Face], touched: &[FaceId]) -> usize {
        let mut dirty = BTreeSet::new();
        for face in touched {
            let Some(&leaf) = self.face_leaf.get(face.index()) else {
                continue;
            };
            let mut node = leaf;
            while node != NO_PARENT && dirty.insert(node) {
                node = self.parents[node as usize];
            }
        }

        for &node_index in dirty.iter().rev() {
            let bounds = match self.nodes[node_index as usize].kind {
                NodeKind::Leaf { start, count } => self.faces[start as usize..(start + count) as usize]
                    .iter()
                    .fold(Aabb::empty(), |acc, f| acc.union(&face_bounds(positions, &faces[f.index()]))),
                NodeKind::Internal { left, right } => self.nodes[left as usize]
                    .bounds
                    .union(&self.nodes[right as usize].bounds),
            };
            self.nodes[node_index as usize].bounds = bounds;
        }

        trace!("Bvh::refit: {} faces, {} nodes", touched.len(), dirty.len());
        dirty.len()
    }

    /// Nearest positive-distance intersection of `ray` with the mesh.
    ///
    /// Equal distances resolve to the lowest face index. An empty tree never
    /// hits.
    pub fn cast_ray(&self, positions: &[Vec3], faces: &[Face], ray: &Ray) -> Option<RayHit> {
        if self.nodes.is_empty() || ray.direction.length_squared() == 0.0 {
            return None;
        }
        let inv_dir = ray.direction.recip();
        let mut best: Option<RayHit> = None;
        let mut stack = vec![0u32];

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            let Some(t_enter) = node.bounds.intersect_ray(ray.origin, inv_dir) else {
                continue;
            };
            if best.is_some_and(|b| t_enter > b.t + tie_tolerance(b.t)) {
                continue;
            }

            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for &face_id in &self.faces[start as usize..(start + count) as usize] {
                        let face = &faces[face_id.index()];
                        for triangle in face.triangles() {
                            let [a, b, c] = triangle.map(|v| positions[v.index()]);
                            let Some(hit) = ray_triangle_intersection(ray.origin, ray.direction, a, b, c)
                            else {
                                continue;
                            };
                            let closer = match best {
                                None => true,
                                Some(current) => {
                                    let tol = tie_tolerance(current.t);
                                    hit.t < current.t - tol
                                        || (hit.t <= current.t + tol && face_id < current.face)
                                }
                            };
                            if closer {
                                best = Some(RayHit {
                                    face: face_id,
                                    t: hit.t,
                                    point: ray.at(hit.t),
                                    triangle,
                                    barycentric: hit.barycentric(),
                                });
                            }
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        best
    }

    /// Every vertex within `radius` of `center`, weighted by `falloff`.
    pub fn query_radius(
        &self,
        positions: &[Vec3],
        faces: &[Face],
        center: Vec3,
        radius: f32,
        falloff: FalloffCurve,
    ) -> RadiusHits {
        let mut hits = RadiusHits::default();
        if self.nodes.is_empty() || radius < 0.0 {
            return hits;
        }

        let radius_sq = radius * radius;
        let mut seen = vec![false; positions.len()];
        let mut found: Vec<VertexId> = Vec::new();
        let mut stack = vec![0u32];

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            if !node.bounds.intersects_sphere(center, radius) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for face_id in &self.faces[start as usize..(start + count) as usize] {
                        for &v in faces[face_id.index()].vertices() {
                            if seen[v.index()] {
                                continue;
                            }
                            seen[v.index()] = true;
                            if positions[v.index()].distance_squared(center) <= radius_sq {
                                found.push(v);
                            }
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }

        found.sort_unstable();
        hits.weights = found
            .iter()
            .map(|v| {
                if radius <= EPSILON {
                    1.0
                } else {
                    falloff.evaluate(positions[v.index()].distance(center) / radius)
                }
            })
            .collect();
        hits.vertices = found;
        hits
    }
}

fn tie_tolerance(t: f32) -> f32 {
    EPSILON * t.abs().max(1.0)
}
