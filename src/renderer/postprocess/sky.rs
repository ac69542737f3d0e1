use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::{
    uniform_layout, FullScreenPass, PostProcess, PostProcessContext, UniformBinding, PARAM_EPSILON,
};
use crate::error::{RenderError, Result};
use crate::renderer::gbuffer::create_read_layout;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::states::BlendMode;
use crate::renderer::uniforms::{texture_entry, CameraBuffer};

pub const MAX_SUN_INTENSITY: f32 = 25.0;
pub const MAX_SUN_WIDTH: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyParams {
    pub sky_color: Vec3,
    pub sun_enabled: bool,
    pub sun_color: Vec3,
    pub sun_intensity: f32,
    /// Points toward the sun.
    pub sun_direction: Vec3,
    /// Angular radius of the disc in radians.
    pub sun_width: f32,
}

impl Default for SkyParams {
    fn default() -> Self {
        Self {
            sky_color: Vec3::new(0.2, 0.5, 1.0),
            sun_enabled: true,
            sun_color: Vec3::new(1.0, 0.8, 0.5),
            sun_intensity: 2.0,
            sun_direction: Vec3::new(0.0, 0.5, -1.0).normalize(),
            sun_width: 0.05,
        }
    }
}

/// Sun weight for a view ray, mirroring `sun_disc` in the sky shader.
pub fn sun_disc(ray: Vec3, sun_direction: Vec3, sun_width: f32) -> f32 {
    let angle = ray.dot(sun_direction).clamp(-1.0, 1.0).acos();
    let t = (1.0 - angle / sun_width.max(PARAM_EPSILON)).clamp(0.0, 1.0);
    t * t
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SkyUniform {
    sky_color: [f32; 3],
    sun_enabled: u32,
    sun_color: [f32; 3],
    sun_intensity: f32,
    sun_direction: [f32; 3],
    sun_width: f32,
}

impl From<&SkyParams> for SkyUniform {
    fn from(p: &SkyParams) -> Self {
        Self {
            sky_color: p.sky_color.to_array(),
            sun_enabled: p.sun_enabled as u32,
            sun_color: p.sun_color.to_array(),
            sun_intensity: p.sun_intensity,
            sun_direction: p.sun_direction.to_array(),
            sun_width: p.sun_width,
        }
    }
}

struct SkyResources {
    camera: CameraBuffer,
    gbuffer_layout: wgpu::BindGroupLayout,
    scene_layout: wgpu::BindGroupLayout,
    params: UniformBinding,
    pass: FullScreenPass,
}

/// Background color and sun disc behind everything the geometry pass left at far depth.
pub struct SkyPostProcess {
    params: SkyParams,
    resources: Option<SkyResources>,
}

impl Default for SkyPostProcess {
    fn default() -> Self {
        Self::new(SkyParams::default())
    }
}

impl SkyPostProcess {
    pub fn new(params: SkyParams) -> Self {
        let mut sky = Self {
            params,
            resources: None,
        };
        sky.set_sun_intensity(params.sun_intensity);
        sky.set_sun_direction(params.sun_direction);
        sky.set_sun_width(params.sun_width);
        sky
    }

    pub fn params(&self) -> &SkyParams {
        &self.params
    }

    pub fn set_sky_color(&mut self, color: Vec3) {
        self.params.sky_color = color.max(Vec3::ZERO);
    }

    pub fn set_sun_enabled(&mut self, enabled: bool) {
        self.params.sun_enabled = enabled;
    }

    pub fn set_sun_color(&mut self, color: Vec3) {
        self.params.sun_color = color.max(Vec3::ZERO);
    }

    pub fn set_sun_intensity(&mut self, intensity: f32) {
        self.params.sun_intensity = intensity.clamp(0.0, MAX_SUN_INTENSITY);
    }

    /// Zero-length directions keep the current one.
    pub fn set_sun_direction(&mut self, direction: Vec3) {
        if let Some(direction) = direction.try_normalize() {
            self.params.sun_direction = direction;
        }
    }

    pub fn set_sun_width(&mut self, width: f32) {
        self.params.sun_width = width.clamp(PARAM_EPSILON, MAX_SUN_WIDTH);
    }
}

impl PostProcess for SkyPostProcess {
    fn name(&self) -> &'static str {
        "sky"
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()> {
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("sky"))?;
        resources.camera.write(ctx.queue, ctx.camera_uniform);
        resources
            .params
            .write(ctx.queue, &SkyUniform::from(&self.params));
        let gbuffer = ctx
            .gbuffer
            .create_bind_group(ctx.device, &resources.gbuffer_layout, "Sky GBuffer");
        let scene = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sky Scene"),
            layout: &resources.scene_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(input),
            }],
        });
        resources.pass.draw(
            ctx.device,
            ctx.encoder,
            output,
            output_format,
            &[
                &resources.camera.bind_group,
                &gbuffer,
                &scene,
                resources.params.bind_group(),
            ],
            Some(wgpu::Color::BLACK),
        )
    }
}

impl DeviceLifecycle for SkyPostProcess {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let camera = CameraBuffer::new(device);
        let gbuffer_layout = create_read_layout(device, "Sky GBuffer Layout");
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sky Scene Layout"),
            entries: &[texture_entry(0, false)],
        });
        let params_layout = uniform_layout::<SkyUniform>(device, "Sky Params Layout");
        let params = UniformBinding::new(
            device,
            &params_layout,
            "Sky Params",
            &SkyUniform::from(&self.params),
        );
        let pass = FullScreenPass::new(
            device,
            "Sky Pass",
            &[
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/sky.wgsl"),
            ],
            "fs_main",
            &[
                &camera.bind_layout,
                &gbuffer_layout,
                &scene_layout,
                &params_layout,
            ],
            BlendMode::Opaque,
        )?;
        self.resources = Some(SkyResources {
            camera,
            gbuffer_layout,
            scene_layout,
            params,
            pass,
        });
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        _device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        Ok(())
    }

    fn on_releasing_swap_chain(&mut self) {}

    fn on_destroy_device(&mut self) {
        self.resources = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disc_is_full_at_center_and_empty_outside() {
        let sun = Vec3::new(0.0, 1.0, -1.0).normalize();
        assert!(sun_disc(sun, sun, 0.05) > 0.95);
        assert_eq!(sun_disc(Vec3::X, sun, 0.05), 0.0);
    }

    #[test]
    fn setters_clamp_and_normalize() {
        let mut sky = SkyPostProcess::default();
        sky.set_sun_width(2.0);
        assert_eq!(sky.params().sun_width, MAX_SUN_WIDTH);
        sky.set_sun_width(0.0);
        assert_eq!(sky.params().sun_width, PARAM_EPSILON);
        sky.set_sun_intensity(100.0);
        assert_eq!(sky.params().sun_intensity, MAX_SUN_INTENSITY);
        sky.set_sun_direction(Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(sky.params().sun_direction, Vec3::Y);
        sky.set_sun_direction(Vec3::ZERO);
        assert_eq!(sky.params().sun_direction, Vec3::Y);
        sky.set_sky_color(Vec3::new(-1.0, 0.5, 2.0));
        assert_eq!(sky.params().sky_color, Vec3::new(0.0, 0.5, 2.0));
        sky.set_sun_color(Vec3::splat(-3.0));
        assert_eq!(sky.params().sun_color, Vec3::ZERO);
        sky.set_sun_enabled(false);
        assert!(!sky.params().sun_enabled);
    }

    #[test]
    fn uniform_layout_matches_shader_struct() {
        assert_eq!(std::mem::size_of::<SkyUniform>(), 48);
    }
}
