use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

use super::{
    sampled_texture_bind_group, sampled_texture_layout, uniform_layout, FullScreenPass,
    PostProcess, PostProcessContext, UniformBinding,
};
use crate::error::{RenderError, Result};
use crate::renderer::gbuffer::create_read_layout;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::states::{BlendMode, SamplerKind};
use crate::renderer::uniforms::CameraBuffer;

pub const MAX_MOTION_SAMPLES: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionBlurParams {
    pub amount: f32,
    pub sample_count: u32,
}

impl Default for MotionBlurParams {
    fn default() -> Self {
        Self {
            amount: 1.0,
            sample_count: 8,
        }
    }
}

/// Screen-space motion of the surface at `uv`/`depth` since the previous frame, in uv units.
pub fn pixel_velocity(uv: Vec2, depth: f32, inverse_view_proj: Mat4, previous_view_proj: Mat4) -> Vec2 {
    let ndc = glam::Vec4::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth, 1.0);
    let world = inverse_view_proj * ndc;
    let world = world / world.w;
    let previous = previous_view_proj * world;
    let previous_ndc = previous.truncate().truncate() / previous.w;
    let previous_uv = Vec2::new(previous_ndc.x * 0.5 + 0.5, 0.5 - previous_ndc.y * 0.5);
    uv - previous_uv
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MotionBlurUniform {
    previous_view_proj: [[f32; 4]; 4],
    amount: f32,
    sample_count: u32,
    _padding: [f32; 2],
}

struct MotionBlurResources {
    camera: CameraBuffer,
    gbuffer_layout: wgpu::BindGroupLayout,
    scene_layout: wgpu::BindGroupLayout,
    params: UniformBinding,
    pass: FullScreenPass,
}

/// Blur from camera movement only; velocity comes from depth and last frame's view-projection.
pub struct MotionBlurPostProcess {
    params: MotionBlurParams,
    previous_view_proj: Option<Mat4>,
    resources: Option<MotionBlurResources>,
}

impl Default for MotionBlurPostProcess {
    fn default() -> Self {
        Self::new(MotionBlurParams::default())
    }
}

impl MotionBlurPostProcess {
    pub fn new(params: MotionBlurParams) -> Self {
        let mut blur = Self {
            params: MotionBlurParams::default(),
            previous_view_proj: None,
            resources: None,
        };
        blur.set_amount(params.amount);
        blur.set_sample_count(params.sample_count);
        blur
    }

    pub fn params(&self) -> &MotionBlurParams {
        &self.params
    }

    pub fn set_amount(&mut self, amount: f32) {
        self.params.amount = amount.max(0.0);
    }

    pub fn set_sample_count(&mut self, count: u32) {
        self.params.sample_count = count.clamp(1, MAX_MOTION_SAMPLES);
    }

    pub fn previous_view_proj(&self) -> Option<Mat4> {
        self.previous_view_proj
    }

    /// Forgets the previous camera, e.g. after a teleport.
    pub fn reset(&mut self) {
        self.previous_view_proj = None;
    }
}

impl PostProcess for MotionBlurPostProcess {
    fn name(&self) -> &'static str {
        "motion_blur"
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()> {
        let current = ctx.camera.view_proj;
        let previous = self.previous_view_proj.unwrap_or(current);
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("motion blur"))?;
        resources.camera.write(ctx.queue, ctx.camera_uniform);
        resources.params.write(
            ctx.queue,
            &MotionBlurUniform {
                previous_view_proj: previous.to_cols_array_2d(),
                amount: self.params.amount,
                sample_count: self.params.sample_count,
                _padding: [0.0; 2],
            },
        );
        let gbuffer = ctx
            .gbuffer
            .create_bind_group(ctx.device, &resources.gbuffer_layout, "Motion Blur GBuffer");
        let scene = sampled_texture_bind_group(
            ctx.device,
            &resources.scene_layout,
            input,
            ctx.sampler(SamplerKind::LinearClamp)?,
            "Motion Blur Scene",
        );
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
        )?;
        self.previous_view_proj = Some(current);
        Ok(())
    }
}

impl DeviceLifecycle for MotionBlurPostProcess {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let camera = CameraBuffer::new(device);
        let gbuffer_layout = create_read_layout(device, "Motion Blur GBuffer Layout");
        let scene_layout = sampled_texture_layout(device, "Motion Blur Scene Layout");
        let params_layout = uniform_layout::<MotionBlurUniform>(device, "Motion Blur Params Layout");
        let params = UniformBinding::new(
            device,
            &params_layout,
            "Motion Blur Params",
            &MotionBlurUniform {
                previous_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                amount: self.params.amount,
                sample_count: self.params.sample_count,
                _padding: [0.0; 2],
            },
        );
        let pass = FullScreenPass::new(
            device,
            "Motion Blur Pass",
            &[
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/motion_blur.wgsl"),
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
        self.resources = Some(MotionBlurResources {
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
        self.previous_view_proj = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn static_camera_has_no_velocity() {
        let view_proj = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
        let velocity = pixel_velocity(Vec2::new(0.3, 0.7), 0.95, view_proj.inverse(), view_proj);
        assert!(velocity.length() < 1e-4);
    }

    #[test]
    fn sideways_motion_produces_horizontal_velocity() {
        let proj = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        let previous = proj * Mat4::look_to_rh(Vec3::new(-0.5, 0.0, 5.0), Vec3::NEG_Z, Vec3::Y);
        let current = proj * Mat4::look_to_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, Vec3::Y);
        let velocity = pixel_velocity(Vec2::splat(0.5), 0.9, current.inverse(), previous);
        assert!(velocity.x.abs() > 1e-3);
        assert!(velocity.y.abs() < 1e-4);
    }

    #[test]
    fn sample_count_is_clamped() {
        let mut blur = MotionBlurPostProcess::default();
        blur.set_sample_count(0);
        assert_eq!(blur.params().sample_count, 1);
        blur.set_sample_count(1000);
        assert_eq!(blur.params().sample_count, MAX_MOTION_SAMPLES);
        blur.set_amount(-3.0);
        assert_eq!(blur.params().amount, 0.0);
    }
}
