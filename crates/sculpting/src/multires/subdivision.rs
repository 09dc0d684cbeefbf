//! One-to-four subdivision of mixed triangle/quad meshes.
//!
//! Fine vertex layout:
//! - `[0, nv)` even vertices, same index as their coarse vertex
//! - `[nv, nv + ne)` one odd vertex per unique coarse edge
//! - then one face point per coarse quad, in face order
//!
//! Coarse face `f` produces fine faces `4f..4f + 4`.
//!
//! Smoothed weights: interior edge points take 3/8 of each endpoint and
//! 1/8 of the average of each adjacent face's off-edge corners (Loop on
//! triangle pairs, Catmull-Clark on quad pairs); interior even vertices use
//! Warren's Loop weights; boundary and non-manifold edges use the cubic
//! B-spline curve rule. Attributes use the linear operator.

use std::ops::{Add, Mul};

use crate::mesh::{Face, Mesh, Topology, VertexId};

/// Sparse row-major operator mapping coarse values to fine values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stencil {
    offsets: Vec<u32>,
    indices: Vec<u32>,
    weights: Vec<f32>,
}

impl Stencil {
    fn new() -> Self {
        Self {
            offsets: vec![0],
            ..Default::default()
        }
    }

    fn push_row(&mut self, entries: &[(u32, f32)]) {
        for &(i, w) in entries {
            self.indices.push(i);
            self.weights.push(w);
        }
        self.offsets.push(self.indices.len() as u32);
    }

    /// Number of fine values produced
    pub fn rows(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Coarse indices and weights contributing to fine value `row`
    pub fn row(&self, row: usize) -> impl Iterator<Item = (u32, f32)> + '_ {
        let range = self.offsets[row] as usize..self.offsets[row + 1] as usize;
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.weights[range].iter().copied())
    }

    pub fn apply<T>(&self, coarse: &[T]) -> Vec<T>
    where
        T: Copy + Default + Add<Output = T> + Mul<f32, Output = T>,
    {
        (0..self.rows())
            .map(|r| {
                self.row(r)
                    .fold(T::default(), |acc, (i, w)| acc + coarse[i as usize] * w)
            })
            .collect()
    }
}

/// Fine topology plus the operators that derive fine values from coarse ones
#[derive(Debug, Clone, PartialEq)]
pub struct Subdivision {
    pub faces: Vec<Face>,
    /// Position operator producing the smoothed surface
    pub smooth: Stencil,
    /// Attribute operator (midpoints and face averages)
    pub linear: Stencil,
    /// Coarse vertex count; fine vertices below it are even
    pub even_count: usize,
}

fn loop_beta(valence: usize) -> f32 {
    if valence == 3 {
        3.0 / 16.0
    } else {
        3.0 / (8.0 * valence as f32)
    }
}

/// Corners of `face` that are not on the edge (a, b)
fn off_edge(face: &Face, a: VertexId, b: VertexId) -> Vec<u32> {
    face.vertices()
        .iter()
        .filter(|&&v| v != a && v != b)
        .map(|v| v.0)
        .collect()
}

fn even_rows(topology: &Topology, vertex_count: usize, smooth: &mut Stencil, linear: &mut Stencil) {
    for i in 0..vertex_count as u32 {
        let v = VertexId(i);
        linear.push_row(&[(i, 1.0)]);

        if topology.is_boundary_vertex(v) {
            match topology.boundary_neighbors(v).as_slice() {
                [b0, b1] => smooth.push_row(&[(i, 0.75), (b0.0, 0.125), (b1.0, 0.125)]),
                _ => smooth.push_row(&[(i, 1.0)]),
            }
            continue;
        }

        let ring = topology.neighbors(v);
        if ring.is_empty() {
            smooth.push_row(&[(i, 1.0)]);
            continue;
        }
        let beta = loop_beta(ring.len());
        let mut row = Vec::with_capacity(ring.len() + 1);
        row.push((i, 1.0 - ring.len() as f32 * beta));
        row.extend(ring.iter().map(|n| (n.0, beta)));
        smooth.push_row(&row);
    }
}

fn edge_rows(mesh: &Mesh, smooth: &mut Stencil, linear: &mut Stencil) {
    for edge in mesh.topology().edges() {
        let [a, b] = edge.vertices;
        linear.push_row(&[(a.0, 0.5), (b.0, 0.5)]);

        let (Some(f0), Some(f1)) = (edge.faces[0], edge.faces[1]) else {
            smooth.push_row(&[(a.0, 0.5), (b.0, 0.5)]);
            continue;
        };
        if !edge.manifold {
            smooth.push_row(&[(a.0, 0.5), (b.0, 0.5)]);
            continue;
        }

        let mut row = vec![(a.0, 0.375), (b.0, 0.375)];
        for face_id in [f0, f1] {
            if let Some(face) = mesh.face(face_id) {
                let others = off_edge(face, a, b);
                let w = 0.125 / others.len().max(1) as f32;
                row.extend(others.into_iter().map(|o| (o, w)));
            }
        }
        smooth.push_row(&row);
    }
}

/// Compute the fine topology and operators for one subdivision step.
pub fn subdivide(mesh: &Mesh) -> Subdivision {
    let topology = mesh.topology();
    let nv = mesh.vertex_count();
    let ne = topology.edges().len();

    let mut smooth = Stencil::new();
    let mut linear = Stencil::new();
    even_rows(topology, nv, &mut smooth, &mut linear);
    edge_rows(mesh, &mut smooth, &mut linear);

    let odd = |a: VertexId, b: VertexId| -> u32 {
        // Every face edge is registered in the topology the mesh was built with
        let e = topology.edge_index(a, b).unwrap_or_default();
        (nv + e) as u32
    };

    let mut faces = Vec::with_capacity(mesh.face_count() * 4);
    let mut next_face_point = (nv + ne) as u32;
    for face in mesh.faces() {
        match *face {
            Face::Tri([a, b, c]) => {
                let (ab, bc, ca) = (odd(a, b), odd(b, c), odd(c, a));
                faces.push(Face::tri(a.0, ab, ca));
                faces.push(Face::tri(ab, b.0, bc));
                faces.push(Face::tri(ca, bc, c.0));
                faces.push(Face::tri(ab, bc, ca));
            }
            Face::Quad([a, b, c, d]) => {
                let corners = [(a.0, 0.25), (b.0, 0.25), (c.0, 0.25), (d.0, 0.25)];
                smooth.push_row(&corners);
                linear.push_row(&corners);
                let f = next_face_point;
                next_face_point += 1;

                let (ab, bc, cd, da) = (odd(a, b), odd(b, c), odd(c, d), odd(d, a));
                faces.push(Face::quad(a.0, ab, f, da));
                faces.push(Face::quad(ab, b.0, bc, f));
                faces.push(Face::quad(f, bc, c.0, cd));
                faces.push(Face::quad(da, f, cd, d.0));
            }
        }
    }

    Subdivision {
        faces,
        smooth,
        linear,
        even_count: nv,
    }
}
