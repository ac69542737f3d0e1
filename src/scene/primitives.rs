use glam::Vec3;
use std::f32::consts::PI;

use crate::renderer::vertex::{v, Vertex};

/// Unit-radius UV sphere, counter-clockwise when viewed from outside.
pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();
            let tangent = [-theta.sin(), 0.0, theta.cos(), 1.0];
            vertices.push(v(
                [x, y, z],
                [x, y, z],
                [segment as f32 / segments as f32, ring as f32 / rings as f32],
                tangent,
            ));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend_from_slice(&[current, current + 1, next]);
            indices.extend_from_slice(&[current + 1, next + 1, next]);
        }
    }

    (vertices, indices)
}

/// Scale that makes a sphere tessellated with `sphere_mesh(segments, rings)` enclose the
/// true unit sphere, so a scaled proxy never under-covers the light volume.
pub fn sphere_circumscribe_scale(segments: u32, rings: u32) -> f32 {
    let segments = segments.max(3) as f32;
    let rings = rings.max(2) as f32;
    let around = (PI / segments).cos();
    let along = (PI / (2.0 * rings)).cos();
    1.0 / (around * along)
}

/// Unit cube centered on the origin.
pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, tangent) per face; bitangent = normal x tangent.
    const FACES: [([f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent) in FACES {
        let n = Vec3::from(normal);
        let t = Vec3::from(tangent);
        let b = n.cross(t);
        let base = vertices.len() as u32;
        for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let pos = (n + t * du + b * dv) * 0.5;
            vertices.push(v(
                pos.into(),
                normal,
                [(du + 1.0) * 0.5, (1.0 - dv) * 0.5],
                [tangent[0], tangent[1], tangent[2], 1.0],
            ));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Square in the XZ plane facing +Y, `size` units across with UVs tiled `uv_repeat` times.
pub fn plane_mesh(size: f32, uv_repeat: f32) -> (Vec<Vertex>, Vec<u32>) {
    let h = size * 0.5;
    let t = [1.0, 0.0, 0.0, 1.0];
    let n = [0.0, 1.0, 0.0];
    let vertices = vec![
        v([-h, 0.0, h], n, [0.0, uv_repeat], t),
        v([h, 0.0, h], n, [uv_repeat, uv_repeat], t),
        v([h, 0.0, -h], n, [uv_repeat, 0.0], t),
        v([-h, 0.0, -h], n, [0.0, 0.0], t),
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward_winding(vertices: &[Vertex], indices: &[u32]) {
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(vertices[i as usize].pos));
            let normal = (b - a).cross(c - a);
            if normal.length_squared() < 1e-10 {
                continue; // degenerate pole triangle
            }
            let centroid = (a + b + c) / 3.0;
            let outward = Vec3::from(vertices[tri[0] as usize].normal) + centroid;
            assert!(normal.dot(outward) > 0.0, "triangle {tri:?} winds inward");
        }
    }

    #[test]
    fn cube_counts_look_right() {
        let (v, i) = cube_mesh();
        assert_eq!(v.len(), 24);
        assert_eq!(i.len(), 36);
    }

    #[test]
    fn cube_faces_wind_counter_clockwise() {
        let (v, i) = cube_mesh();
        assert_outward_winding(&v, &i);
    }

    #[test]
    fn sphere_faces_wind_counter_clockwise() {
        let (v, i) = sphere_mesh(16, 8);
        assert_outward_winding(&v, &i);
    }

    #[test]
    fn circumscribed_sphere_covers_unit_sphere() {
        let scale = sphere_circumscribe_scale(16, 8);
        assert!(scale > 1.0);
        let (v, i) = sphere_mesh(16, 8);
        // Every face centroid of the scaled hull must lie on or outside the unit sphere.
        for tri in i.chunks(3) {
            let c = tri
                .iter()
                .map(|&k| Vec3::from(v[k as usize].pos) * scale)
                .sum::<Vec3>()
                / 3.0;
            assert!(c.length() >= 0.999, "centroid {c} inside unit sphere");
        }
    }
}
