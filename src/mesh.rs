use glam::{Mat4, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position: position.to_array(), normal: normal.to_array() }
    }

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub bounds: MeshBounds,
}

#[derive(Clone, Debug)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl MeshBounds {
    pub fn from_vertices(vertices: &[MeshVertex]) -> Self {
        if vertices.is_empty() {
            return Self { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, radius: 0.0 };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for vertex in vertices {
            let p = Vec3::from_array(vertex.position);
            min = min.min(p);
            max = max.max(p);
        }
        let center = (min + max) * 0.5;
        let radius = (max - center).length();
        Self { min, max, center, radius }
    }
}

impl Mesh {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        let bounds = MeshBounds::from_vertices(&vertices);
        Self { vertices, indices, bounds }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Axis-aligned box centered on the origin. The task card shape.
    pub fn card(width: f32, height: f32, depth: f32) -> Self {
        let hw = width * 0.5;
        let hh = height * 0.5;
        let hd = depth * 0.5;
        // (normal, four corners counter-clockwise seen from outside)
        let faces: [(Vec3, [Vec3; 4]); 6] = [
            (
                Vec3::Z,
                [
                    Vec3::new(-hw, -hh, hd),
                    Vec3::new(hw, -hh, hd),
                    Vec3::new(hw, hh, hd),
                    Vec3::new(-hw, hh, hd),
                ],
            ),
            (
                Vec3::NEG_Z,
                [
                    Vec3::new(hw, -hh, -hd),
                    Vec3::new(-hw, -hh, -hd),
                    Vec3::new(-hw, hh, -hd),
                    Vec3::new(hw, hh, -hd),
                ],
            ),
            (
                Vec3::X,
                [
                    Vec3::new(hw, -hh, hd),
                    Vec3::new(hw, -hh, -hd),
                    Vec3::new(hw, hh, -hd),
                    Vec3::new(hw, hh, hd),
                ],
            ),
            (
                Vec3::NEG_X,
                [
                    Vec3::new(-hw, -hh, -hd),
                    Vec3::new(-hw, -hh, hd),
                    Vec3::new(-hw, hh, hd),
                    Vec3::new(-hw, hh, -hd),
                ],
            ),
            (
                Vec3::Y,
                [
                    Vec3::new(-hw, hh, hd),
                    Vec3::new(hw, hh, hd),
                    Vec3::new(hw, hh, -hd),
                    Vec3::new(-hw, hh, -hd),
                ],
            ),
            (
                Vec3::NEG_Y,
                [
                    Vec3::new(-hw, -hh, -hd),
                    Vec3::new(hw, -hh, -hd),
                    Vec3::new(hw, -hh, hd),
                    Vec3::new(-hw, -hh, hd),
                ],
            ),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, corners) in faces {
            let base = vertices.len() as u32;
            for corner in corners {
                vertices.push(MeshVertex::new(corner, normal));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Mesh::new(vertices, indices)
    }

    /// Flat quad in the XZ plane, normal up. The ground helper.
    pub fn ground_plane(extent: f32) -> Self {
        let e = extent * 0.5;
        let vertices = vec![
            MeshVertex::new(Vec3::new(-e, 0.0, -e), Vec3::Y),
            MeshVertex::new(Vec3::new(-e, 0.0, e), Vec3::Y),
            MeshVertex::new(Vec3::new(e, 0.0, e), Vec3::Y),
            MeshVertex::new(Vec3::new(e, 0.0, -e), Vec3::Y),
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        Mesh::new(vertices, indices)
    }

    /// Thin box stretched along `axis`, starting at the origin. The
    /// orientation helper.
    pub fn axis_rod(axis: Vec3, length: f32, thickness: f32) -> Self {
        let dir = axis.normalize_or_zero();
        let mut rod = Mesh::card(thickness, thickness, length);
        // card() extends along z; rotate z onto the requested axis, then
        // push the rod so it starts at the origin.
        let rotation = glam::Quat::from_rotation_arc(Vec3::Z, dir);
        let transform =
            Mat4::from_translation(dir * (length * 0.5)) * Mat4::from_quat(rotation);
        rod.apply_transform(transform);
        rod
    }

    /// Flat triangle soup at `z`, facing +z. Used for tessellated label
    /// outlines.
    pub fn from_flat_triangles(positions: &[[f32; 2]], indices: Vec<u32>, z: f32) -> Self {
        let vertices = positions
            .iter()
            .map(|&[x, y]| MeshVertex::new(Vec3::new(x, y, z), Vec3::Z))
            .collect::<Vec<_>>();
        Mesh::new(vertices, indices)
    }

    pub fn apply_transform(&mut self, transform: Mat4) {
        let normal_matrix = transform.inverse().transpose();
        for vertex in &mut self.vertices {
            let p = transform.transform_point3(Vec3::from_array(vertex.position));
            let n = normal_matrix.transform_vector3(Vec3::from_array(vertex.normal)).normalize_or_zero();
            vertex.position = p.to_array();
            vertex.normal = n.to_array();
        }
        self.bounds = MeshBounds::from_vertices(&self.vertices);
    }

    /// Recenters the vertices so the bounding box midpoint sits at the
    /// origin. Labels are built pen-left-to-right and centered afterwards.
    pub fn recenter(&mut self) {
        let offset = self.bounds.center;
        if offset.length_squared() <= f32::EPSILON {
            return;
        }
        for vertex in &mut self.vertices {
            let p = Vec3::from_array(vertex.position) - offset;
            vertex.position = p.to_array();
        }
        self.bounds = MeshBounds::from_vertices(&self.vertices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_bounds_match_extents() {
        let mesh = Mesh::card(2.0, 1.0, 0.25);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!(mesh.bounds.min.distance(Vec3::new(-1.0, -0.5, -0.125)) < 1e-6);
        assert!(mesh.bounds.max.distance(Vec3::new(1.0, 0.5, 0.125)) < 1e-6);
        assert!(mesh.bounds.center.length() < 1e-6);
    }

    #[test]
    fn recenter_moves_bounds_to_origin() {
        let mut mesh = Mesh::from_flat_triangles(&[[1.0, 1.0], [3.0, 1.0], [3.0, 2.0]], vec![0, 1, 2], 0.0);
        mesh.recenter();
        assert!(mesh.bounds.center.length() < 1e-6);
    }

    #[test]
    fn axis_rod_points_along_axis() {
        let rod = Mesh::axis_rod(Vec3::X, 2.0, 0.05);
        assert!(rod.bounds.max.x > 1.9, "rod should extend along +x, got {:?}", rod.bounds.max);
        assert!(rod.bounds.min.x > -0.1, "rod should start near the origin");
    }

    #[test]
    fn empty_mesh_has_zero_bounds() {
        let mesh = Mesh::new(Vec::new(), Vec::new());
        assert!(mesh.is_empty());
        assert_eq!(mesh.bounds.radius, 0.0);
    }
}
