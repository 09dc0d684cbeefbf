//! Small meshes shared by unit tests.

use glam::Vec3;

use super::{Face, Mesh};

/// Unit cube centred at the origin: 8 vertices, 6 outward-facing quads
pub(crate) fn unit_cube() -> Mesh {
    let positions = vec![
        Vec3::new(-0.5, -0.5, -0.5),
        Vec3::new(0.5, -0.5, -0.5),
        Vec3::new(0.5, 0.5, -0.5),
        Vec3::new(-0.5, 0.5, -0.5),
        Vec3::new(-0.5, -0.5, 0.5),
        Vec3::new(0.5, -0.5, 0.5),
        Vec3::new(0.5, 0.5, 0.5),
        Vec3::new(-0.5, 0.5, 0.5),
    ];
    let faces = vec![
        Face::quad(0, 3, 2, 1), // -z
        Face::quad(4, 5, 6, 7), // +z
        Face::quad(0, 1, 5, 4), // -y
        Face::quad(3, 7, 6, 2), // +y
        Face::quad(1, 2, 6, 5), // +x
        Face::quad(0, 4, 7, 3), // -x
    ];
    Mesh::new(positions, faces).expect("cube fixture is valid")
}

/// Flat n x n quad grid spanning [-size/2, size/2] in XZ, facing +Y
pub(crate) fn quad_grid(n: u32, size: f32) -> Mesh {
    let row = n + 1;
    let mut positions = Vec::with_capacity((row * row) as usize);
    for j in 0..row {
        for i in 0..row {
            let x = (i as f32 / n as f32 - 0.5) * size;
            let z = (j as f32 / n as f32 - 0.5) * size;
            positions.push(Vec3::new(x, 0.0, z));
        }
    }
    let mut faces = Vec::with_capacity((n * n) as usize);
    for j in 0..n {
        for i in 0..n {
            let a = j * row + i;
            faces.push(Face::quad(a, a + row, a + row + 1, a + 1));
        }
    }
    Mesh::new(positions, faces).expect("grid fixture is valid")
}

/// Index of the grid vertex closest to the origin
pub(crate) fn grid_center(n: u32) -> u32 {
    let row = n + 1;
    (n / 2) * row + n / 2
}
