use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::renderer::states::SamplerKind;
use crate::renderer::texture::Texture;
use crate::renderer::uniforms::{sampler_entry, texture_entry, uniform_entry};
use crate::scene::model::MaterialProperties;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaterialUniform {
    pub diffuse_color: [f32; 4],
    /// rgb specular color, w specular power.
    pub specular: [f32; 4],
}

impl From<&MaterialProperties> for MaterialUniform {
    fn from(p: &MaterialProperties) -> Self {
        Self {
            diffuse_color: p.diffuse_color,
            specular: [
                p.specular_color[0],
                p.specular_color[1],
                p.specular_color[2],
                p.specular_power,
            ],
        }
    }
}

/// Textures owned by one material. Missing maps fall back to the layout defaults.
#[derive(Debug, Default)]
pub struct MaterialTextures {
    pub diffuse: Option<Texture>,
    pub normal: Option<Texture>,
    pub specular: Option<Texture>,
}

#[derive(Debug)]
pub struct MaterialBinding {
    bind_group: wgpu::BindGroup,
    _uniform: wgpu::Buffer,
    _textures: MaterialTextures,
}

impl MaterialBinding {
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

/// Bind group layout for geometry-pass materials (group 1), with the sampler and
/// 1x1 fallback textures every material shares.
#[derive(Debug, Clone)]
pub struct MaterialLayout {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white: wgpu::TextureView,
    flat_normal: wgpu::TextureView,
}

impl MaterialLayout {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Layout"),
            entries: &[
                uniform_entry::<MaterialUniform>(0, wgpu::ShaderStages::FRAGMENT, false),
                texture_entry(1, true),
                texture_entry(2, true),
                texture_entry(3, true),
                sampler_entry(4, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let sampler = device.create_sampler(&SamplerKind::AnisotropicWrap.descriptor());
        let white = Texture::solid(device, queue, [255; 4], true, "White Texture").view;
        let flat_normal =
            Texture::solid(device, queue, [128, 128, 255, 255], false, "Flat Normal Texture").view;
        Self {
            layout,
            sampler,
            white,
            flat_normal,
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn create_binding(
        &self,
        device: &wgpu::Device,
        label: &str,
        properties: &MaterialProperties,
        textures: MaterialTextures,
    ) -> MaterialBinding {
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&MaterialUniform::from(properties)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let diffuse = textures.diffuse.as_ref().map_or(&self.white, |t| &t.view);
        let normal = textures.normal.as_ref().map_or(&self.flat_normal, |t| &t.view);
        let specular = textures.specular.as_ref().map_or(&self.white, |t| &t.view);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(diffuse),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(normal),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(specular),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        MaterialBinding {
            bind_group,
            _uniform: uniform,
            _textures: textures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specular_power_lands_in_w() {
        let props = MaterialProperties {
            specular_power: 64.0,
            ..Default::default()
        };
        assert_eq!(MaterialUniform::from(&props).specular[3], 64.0);
        assert_eq!(std::mem::size_of::<MaterialUniform>() % 16, 0);
    }
}
