//! Adjacency rings and unique edges for an indexed mesh.
//!
//! Rebuilt from scratch whenever the face list changes; position-only edits
//! never touch it.

use std::collections::HashMap;

use tracing::debug;

use super::types::{Face, FaceId, VertexId};

/// An undirected edge with up to two incident faces.
///
/// Edges shared by more than two faces are kept but flagged non-manifold and
/// treated like boundary edges by the smoothing operators.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Endpoints in the order they were first seen
    pub vertices: [VertexId; 2],
    pub faces: [Option<FaceId>; 2],
    pub manifold: bool,
}

impl Edge {
    pub fn is_boundary(&self) -> bool {
        self.faces[1].is_none() || !self.manifold
    }
}

/// Per-vertex adjacency plus the mesh's unique edge list
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub(crate) vertex_faces: Vec<Vec<FaceId>>,
    pub(crate) vertex_neighbors: Vec<Vec<VertexId>>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) edge_lookup: HashMap<(VertexId, VertexId), u32>,
    pub(crate) boundary: Vec<bool>,
}

fn edge_key(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl Topology {
    /// Build adjacency for `faces` over `vertex_count` vertices.
    ///
    /// Every face index must already be validated against `vertex_count`.
    pub fn build(faces: &[Face], vertex_count: usize) -> Self {
        let mut vertex_faces = vec![Vec::new(); vertex_count];
        let mut vertex_neighbors: Vec<Vec<VertexId>> = vec![Vec::new(); vertex_count];
        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_lookup = HashMap::new();
        let mut non_manifold = 0usize;

        for (face_index, face) in faces.iter().enumerate() {
            let face_id = FaceId(face_index as u32);
            for &v in face.vertices() {
                vertex_faces[v.index()].push(face_id);
            }

            for (a, b) in face.edges() {
                let key = edge_key(a, b);
                match edge_lookup.get(&key) {
                    Some(&edge_index) => {
                        let edge: &mut Edge = &mut edges[edge_index as usize];
                        if edge.faces[1].is_none() {
                            edge.faces[1] = Some(face_id);
                        } else {
                            edge.manifold = false;
                            non_manifold += 1;
                        }
                    }
                    None => {
                        edge_lookup.insert(key, edges.len() as u32);
                        edges.push(Edge {
                            vertices: [a, b],
                            faces: [Some(face_id), None],
                            manifold: true,
                        });
                        vertex_neighbors[a.index()].push(b);
                        vertex_neighbors[b.index()].push(a);
                    }
                }
            }
        }

        if non_manifold > 0 {
            debug!("Topology::build: {} non-manifold edge incidences", non_manifold);
        }

        let mut boundary = vec![false; vertex_count];
        for edge in edges.iter().filter(|e| e.is_boundary()) {
            boundary[edge.vertices[0].index()] = true;
            boundary[edge.vertices[1].index()] = true;
        }

        Self {
            vertex_faces,
            vertex_neighbors,
            edges,
            edge_lookup,
            boundary,
        }
    }

    /// Faces incident to a vertex
    pub fn vertex_faces(&self, v: VertexId) -> &[FaceId] {
        self.vertex_faces.get(v.index()).map_or(&[], Vec::as_slice)
    }

    /// Vertices connected to `v` by an edge
    pub fn neighbors(&self, v: VertexId) -> &[VertexId] {
        self.vertex_neighbors.get(v.index()).map_or(&[], Vec::as_slice)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Index of the undirected edge (a, b) in [`Topology::edges`]
    pub fn edge_index(&self, a: VertexId, b: VertexId) -> Option<usize> {
        self.edge_lookup.get(&edge_key(a, b)).map(|&i| i as usize)
    }

    pub fn is_boundary_vertex(&self, v: VertexId) -> bool {
        self.boundary.get(v.index()).copied().unwrap_or(false)
    }

    /// Neighbors of `v` reached through boundary edges
    pub fn boundary_neighbors(&self, v: VertexId) -> Vec<VertexId> {
        self.neighbors(v)
            .iter()
            .copied()
            .filter(|&n| {
                self.edge_index(v, n)
                    .is_some_and(|e| self.edges[e].is_boundary())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_triangles_share_an_edge() {
        let faces = [Face::tri(0, 1, 2), Face::tri(0, 2, 3)];
        let topo = Topology::build(&faces, 4);

        assert_eq!(topo.edges().len(), 5);
        let diagonal = topo.edge_index(VertexId(2), VertexId(0)).unwrap();
        assert!(!topo.edges()[diagonal].is_boundary());
        assert_eq!(topo.edges()[diagonal].faces, [Some(FaceId(0)), Some(FaceId(1))]);

        assert_eq!(topo.vertex_faces(VertexId(0)), &[FaceId(0), FaceId(1)]);
        assert_eq!(topo.neighbors(VertexId(0)).len(), 3);
        assert_eq!(topo.neighbors(VertexId(1)).len(), 2);
        assert!(topo.is_boundary_vertex(VertexId(1)));
        assert_eq!(topo.boundary_neighbors(VertexId(0)).len(), 2);
    }

    #[test]
    fn test_closed_quad_cube_has_no_boundary() {
        let faces = [
            Face::quad(0, 3, 2, 1),
            Face::quad(4, 5, 6, 7),
            Face::quad(0, 1, 5, 4),
            Face::quad(1, 2, 6, 5),
            Face::quad(2, 3, 7, 6),
            Face::quad(3, 0, 4, 7),
        ];
        let topo = Topology::build(&faces, 8);
        assert_eq!(topo.edges().len(), 12);
        assert!(topo.edges().iter().all(|e| !e.is_boundary()));
        for v in 0..8 {
            assert_eq!(topo.neighbors(VertexId(v)).len(), 3);
            assert_eq!(topo.vertex_faces(VertexId(v)).len(), 3);
        }
    }

    #[test]
    fn test_non_manifold_edge_is_flagged() {
        let faces = [Face::tri(0, 1, 2), Face::tri(1, 0, 3), Face::tri(0, 1, 4)];
        let topo = Topology::build(&faces, 5);
        let shared = topo.edge_index(VertexId(0), VertexId(1)).unwrap();
        assert!(!topo.edges()[shared].manifold);
        assert!(topo.edges()[shared].is_boundary());
    }
}
