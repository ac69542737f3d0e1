use glam::Vec3;
use wgpu::util::DeviceExt;

use super::bounds::Aabb;
use crate::error::{RenderError, Result};
use crate::renderer::material::MaterialBinding;
use crate::renderer::vertex::Vertex;

/// Contiguous index range drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPart {
    pub index_start: u32,
    pub index_count: u32,
    pub material: usize,
}

#[derive(Debug)]
pub struct MeshBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub bounds: Aabb,
    pub parts: Vec<MeshPart>,
    buffers: Option<MeshBuffers>,
}

impl Mesh {
    pub fn upload(
        device: &wgpu::Device,
        name: impl Into<String>,
        vertices: &[Vertex],
        indices: &[u32],
        parts: Vec<MeshPart>,
    ) -> Self {
        let name = name.into();
        let bounds = Aabb::from_points(vertices.iter().map(|v| Vec3::from(v.pos)))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} Vertices")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} Indices")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            name,
            bounds,
            parts,
            buffers: Some(MeshBuffers {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
            }),
        }
    }

    /// Mesh described by bounds and parts only; it takes part in culling and planning
    /// but records nothing.
    pub fn without_buffers(name: impl Into<String>, bounds: Aabb, parts: Vec<MeshPart>) -> Self {
        Self {
            name: name.into(),
            bounds,
            parts,
            buffers: None,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.buffers.is_some()
    }

    /// Draws every part with its material bound at `material_group`. Returns the number
    /// of draw calls issued.
    pub fn record_parts(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        materials: &[Material],
        fallback: &wgpu::BindGroup,
        material_group: u32,
    ) -> u32 {
        let Some(buffers) = &self.buffers else {
            return 0;
        };
        pass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
        pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        let mut draws = 0;
        for part in &self.parts {
            let bind_group = materials
                .get(part.material)
                .and_then(Material::bind_group)
                .unwrap_or(fallback);
            pass.set_bind_group(material_group, bind_group, &[]);
            pass.draw_indexed(part.index_start..part.index_start + part.index_count, 0, 0..1);
            draws += 1;
        }
        draws
    }

    /// Draws the whole index range without materials (depth-only passes).
    pub fn record_geometry(&self, pass: &mut wgpu::RenderPass<'_>) -> u32 {
        let Some(buffers) = &self.buffers else {
            return 0;
        };
        pass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
        pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..buffers.index_count, 0, 0..1);
        1
    }
}

/// Shading parameters written to the material uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialProperties {
    pub diffuse_color: [f32; 4],
    pub specular_color: [f32; 3],
    pub specular_power: f32,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            diffuse_color: [1.0; 4],
            specular_color: [0.5; 3],
            specular_power: 32.0,
        }
    }
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub properties: MaterialProperties,
    binding: Option<MaterialBinding>,
}

impl Material {
    pub fn new(name: impl Into<String>, properties: MaterialProperties, binding: MaterialBinding) -> Self {
        Self {
            name: name.into(),
            properties,
            binding: Some(binding),
        }
    }

    pub fn without_binding(name: impl Into<String>, properties: MaterialProperties) -> Self {
        Self {
            name: name.into(),
            properties,
            binding: None,
        }
    }

    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.binding.as_ref().map(MaterialBinding::bind_group)
    }
}

/// Immutable geometry asset: meshes plus the materials their parts reference.
#[derive(Debug)]
pub struct Model {
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    bounds: Aabb,
}

impl Model {
    pub fn new(meshes: Vec<Mesh>, materials: Vec<Material>) -> Result<Self> {
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            for (part_index, part) in mesh.parts.iter().enumerate() {
                if part.material >= materials.len() {
                    return Err(RenderError::InvalidMaterialIndex {
                        mesh: mesh_index,
                        part: part_index,
                        material: part.material,
                        material_count: materials.len(),
                    });
                }
            }
        }

        let bounds = meshes
            .iter()
            .map(|m| m.bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));

        Ok(Self {
            meshes,
            materials,
            bounds,
        })
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Union of all mesh bounds in model space.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn record_mesh(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        mesh: usize,
        fallback_material: &wgpu::BindGroup,
        material_group: u32,
    ) -> u32 {
        self.meshes
            .get(mesh)
            .map(|m| m.record_parts(pass, &self.materials, fallback_material, material_group))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(material: usize) -> MeshPart {
        MeshPart {
            index_start: 0,
            index_count: 3,
            material,
        }
    }

    #[test]
    fn rejects_out_of_range_material() {
        let mesh = Mesh::without_buffers("m", Aabb::new(Vec3::ZERO, Vec3::ONE), vec![part(0), part(2)]);
        let materials = vec![
            Material::without_binding("a", MaterialProperties::default()),
            Material::without_binding("b", MaterialProperties::default()),
        ];
        let err = Model::new(vec![mesh], materials).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidMaterialIndex {
                mesh: 0,
                part: 1,
                material: 2,
                material_count: 2
            }
        ));
    }

    #[test]
    fn bounds_are_union_of_meshes() {
        let a = Mesh::without_buffers("a", Aabb::new(Vec3::ZERO, Vec3::ONE), vec![part(0)]);
        let b = Mesh::without_buffers(
            "b",
            Aabb::new(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(-2.0, 4.0, 1.0)),
            vec![part(0)],
        );
        let model = Model::new(
            vec![a, b],
            vec![Material::without_binding("m", MaterialProperties::default())],
        )
        .unwrap();
        assert_eq!(model.bounds().min, Vec3::new(-3.0, 0.0, 0.0));
        assert_eq!(model.bounds().max, Vec3::new(1.0, 4.0, 1.0));
        assert_eq!(model.mesh_count(), 2);
    }
}
