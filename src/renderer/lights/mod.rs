//! Light types and the per-type renderers that accumulate them into the light buffer.

pub mod ambient;
pub mod directional;
pub mod point;
pub mod spot;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

pub use ambient::AmbientLightRenderer;
pub use directional::DirectionalLightRenderer;
pub use point::PointLightRenderer;
pub use spot::SpotLightRenderer;

use crate::error::{RenderError, Result};
use crate::renderer::frame::{FrameStats, LightDraw, LightKind, LightRef, ShadowMapPass, VolumeFacing};
use crate::renderer::gbuffer::{create_read_layout, GBufferViews};
use crate::renderer::lifecycle::DeviceLifecycle;
use crate::renderer::states::SamplerKind;
use crate::renderer::uniforms::{depth_texture_entry, sampler_entry, CameraBuffer, CameraUniform};
use crate::scene::bounds::{Aabb, BoundingSphere};
use crate::scene::camera::CameraView;
use crate::scene::instance::ModelInstance;
use crate::scene::primitives;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Points toward the light.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    /// Direction the cone opens toward.
    pub direction: Vec3,
    pub range: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient(AmbientLight),
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    pub fn kind(&self) -> LightKind {
        match self {
            Light::Ambient(_) => LightKind::Ambient,
            Light::Directional(_) => LightKind::Directional,
            Light::Point(_) => LightKind::Point,
            Light::Spot(_) => LightKind::Spot,
        }
    }
}

/// Lights of one type registered for the current frame.
#[derive(Debug, Clone)]
pub struct LightCollection<T> {
    unshadowed: Vec<T>,
    shadowed: Vec<T>,
}

impl<T> Default for LightCollection<T> {
    fn default() -> Self {
        Self {
            unshadowed: Vec::new(),
            shadowed: Vec::new(),
        }
    }
}

impl<T> LightCollection<T> {
    pub fn add(&mut self, light: T, casts_shadow: bool) {
        if casts_shadow {
            self.shadowed.push(light);
        } else {
            self.unshadowed.push(light);
        }
    }

    pub fn clear(&mut self) {
        self.unshadowed.clear();
        self.shadowed.clear();
    }

    pub fn unshadowed(&self) -> &[T] {
        &self.unshadowed
    }

    pub fn shadowed(&self) -> &[T] {
        &self.shadowed
    }

    pub fn len(&self) -> usize {
        self.unshadowed.len() + self.shadowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, light: LightRef) -> Option<&T> {
        if light.shadowed {
            self.shadowed.get(light.index)
        } else {
            self.unshadowed.get(light.index)
        }
    }

    /// Unshadowed lights first, then shadowed.
    pub fn iter(&self) -> impl Iterator<Item = (LightRef, &T)> {
        let plain = self.unshadowed.iter().enumerate().map(|(index, light)| {
            (
                LightRef {
                    shadowed: false,
                    index,
                },
                light,
            )
        });
        let shadowed = self.shadowed.iter().enumerate().map(|(index, light)| {
            (
                LightRef {
                    shadowed: true,
                    index,
                },
                light,
            )
        });
        plain.chain(shadowed)
    }
}

/// Per-frame inputs shared by every light renderer.
pub struct LightFrame<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub camera: &'a CameraView,
    pub camera_uniform: &'a CameraUniform,
    pub gbuffer: GBufferViews<'a>,
    /// Union of the registered instances' world boxes.
    pub scene_bounds: Option<Aabb>,
}

pub trait LightRenderer: DeviceLifecycle {
    fn kind(&self) -> LightKind;

    /// Drops the lights registered for the previous frame.
    fn clear(&mut self);

    fn plan_shadow_maps(&self, camera: &CameraView) -> Result<Vec<ShadowMapPass>>;

    fn plan_lights(
        &self,
        camera: &CameraView,
        shadow_maps: &[ShadowMapPass],
    ) -> Result<Vec<LightDraw>>;

    /// Uploads per-draw uniforms. Runs before any pass of the frame is recorded.
    fn prepare(
        &mut self,
        frame: &LightFrame<'_>,
        shadow_maps: &[ShadowMapPass],
        draws: &[LightDraw],
        casters: &mut [&mut ModelInstance],
    ) -> Result<()>;

    fn render_shadow_maps(
        &self,
        _encoder: &mut wgpu::CommandEncoder,
        _shadow_maps: &[ShadowMapPass],
        _casters: &[&mut ModelInstance],
        _stats: &mut FrameStats,
    ) -> Result<()> {
        Ok(())
    }

    fn render_lights(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        draws: &[LightDraw],
        stats: &mut FrameStats,
    ) -> Result<()>;
}

/// Camera buffer and G-buffer bindings each light renderer owns (groups 0 and 1).
pub(crate) struct LightingBindings {
    pub camera: CameraBuffer,
    pub gbuffer_layout: wgpu::BindGroupLayout,
    gbuffer_group: Option<wgpu::BindGroup>,
}

impl LightingBindings {
    pub fn new(device: &wgpu::Device, label: &str) -> Self {
        Self {
            camera: CameraBuffer::new(device),
            gbuffer_layout: create_read_layout(device, label),
            gbuffer_group: None,
        }
    }

    pub fn update(&mut self, frame: &LightFrame<'_>, label: &str) {
        self.camera.write(frame.queue, frame.camera_uniform);
        self.gbuffer_group = Some(frame.gbuffer.create_bind_group(
            frame.device,
            &self.gbuffer_layout,
            label,
        ));
    }

    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) -> Result<()> {
        let gbuffer = self
            .gbuffer_group
            .as_ref()
            .ok_or(RenderError::NotCreated("light g-buffer bindings"))?;
        pass.set_bind_group(0, &self.camera.bind_group, &[]);
        pass.set_bind_group(1, gbuffer, &[]);
        Ok(())
    }
}

/// Layout for a shadow map and its comparison sampler (group 3 of shadowed light shaders).
pub(crate) fn shadow_map_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            depth_texture_entry(0),
            sampler_entry(1, SamplerKind::ShadowCompare.binding_type()),
        ],
    })
}

pub(crate) fn shadow_map_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

pub(crate) const VOLUME_SEGMENTS: u32 = 16;
pub(crate) const VOLUME_RINGS: u32 = 12;

/// Decides whether a spherical light volume is drawn and how. `None` when the sphere is
/// outside the camera frustum.
pub fn volume_facing(center: Vec3, radius: f32, camera: &CameraView) -> Option<VolumeFacing> {
    let hull_radius = radius * primitives::sphere_circumscribe_scale(VOLUME_SEGMENTS, VOLUME_RINGS);
    let bounds = BoundingSphere::new(center, hull_radius);
    if !camera.frustum.contains_sphere(&bounds).is_visible() {
        return None;
    }
    // Grown by the near distance so a volume clipped by the near plane is drawn from inside.
    let near_guard = BoundingSphere::new(center, hull_radius + camera.near);
    if near_guard.contains_point(camera.position) {
        Some(VolumeFacing::Inside)
    } else {
        Some(VolumeFacing::Outside)
    }
}

/// World transform placing the unit proxy sphere over a light of `radius`.
pub fn volume_world(center: Vec3, radius: f32) -> Mat4 {
    let scale = radius * primitives::sphere_circumscribe_scale(VOLUME_SEGMENTS, VOLUME_RINGS);
    Mat4::from_scale_rotation_translation(Vec3::splat(scale), glam::Quat::IDENTITY, center)
}

/// Unit sphere used as the proxy geometry for point and spot lights.
pub(crate) struct LightVolumeMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl LightVolumeMesh {
    pub fn new(device: &wgpu::Device, label: &str) -> Self {
        let (vertices, indices) = primitives::sphere_mesh(VOLUME_SEGMENTS, VOLUME_RINGS);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::camera::PerspectiveCamera;

    #[test]
    fn collection_lists_unshadowed_first() {
        let mut lights = LightCollection::default();
        lights.add('s', true);
        lights.add('a', false);
        lights.add('b', false);
        let order: Vec<char> = lights.iter().map(|(_, l)| *l).collect();
        assert_eq!(order, vec!['a', 'b', 's']);
        assert_eq!(
            lights.get(LightRef {
                shadowed: true,
                index: 0
            }),
            Some(&'s')
        );
    }

    #[test]
    fn camera_inside_volume_selects_inside_facing() {
        let camera = PerspectiveCamera::default().snapshot();
        let facing = volume_facing(camera.position + Vec3::new(0.0, 0.0, -0.5), 2.0, &camera);
        assert_eq!(facing, Some(VolumeFacing::Inside));
    }

    #[test]
    fn distant_visible_volume_is_outside() {
        let camera = PerspectiveCamera::default().snapshot();
        let facing = volume_facing(camera.position + Vec3::new(0.0, 0.0, -20.0), 2.0, &camera);
        assert_eq!(facing, Some(VolumeFacing::Outside));
    }

    #[test]
    fn volume_behind_camera_is_skipped() {
        let camera = PerspectiveCamera::default().snapshot();
        let facing = volume_facing(camera.position + Vec3::new(0.0, 0.0, 20.0), 2.0, &camera);
        assert_eq!(facing, None);
    }
}
