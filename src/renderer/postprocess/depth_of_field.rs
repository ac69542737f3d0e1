use bytemuck::{Pod, Zeroable};

use super::blur::SeparableBlur;
use super::{
    uniform_layout, FullScreenPass, PostProcess, PostProcessContext, UniformBinding, PARAM_EPSILON,
};
use crate::error::{RenderError, Result};
use crate::renderer::gbuffer::create_read_layout;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle, RenderTarget, TargetDesc};
use crate::renderer::light_buffer::HDR_FORMAT;
use crate::renderer::states::{BlendMode, SamplerKind};
use crate::renderer::uniforms::{sampler_entry, texture_entry, CameraBuffer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthOfFieldParams {
    pub focal_distance: f32,
    pub focal_falloff: f32,
    pub blur_sigma: f32,
}

impl Default for DepthOfFieldParams {
    fn default() -> Self {
        Self {
            focal_distance: 10.0,
            focal_falloff: 5.0,
            blur_sigma: 1.5,
        }
    }
}

/// Blend weight of the blurred image: 0 at the focal distance, 1 a falloff away from it.
pub fn circle_of_confusion(linear_depth: f32, focal_distance: f32, focal_falloff: f32) -> f32 {
    ((linear_depth - focal_distance).abs() / focal_falloff.max(PARAM_EPSILON)).clamp(0.0, 1.0)
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct DepthOfFieldUniform {
    focal_distance: f32,
    focal_falloff: f32,
    _padding: [f32; 2],
}

struct DepthOfFieldResources {
    camera: CameraBuffer,
    gbuffer_layout: wgpu::BindGroupLayout,
    images_layout: wgpu::BindGroupLayout,
    params: UniformBinding,
    blur: SeparableBlur,
    composite: FullScreenPass,
}

struct BlurTargets {
    blurred: RenderTarget,
    scratch: RenderTarget,
}

pub struct DepthOfFieldPostProcess {
    params: DepthOfFieldParams,
    resources: Option<DepthOfFieldResources>,
    targets: Option<BlurTargets>,
}

impl Default for DepthOfFieldPostProcess {
    fn default() -> Self {
        Self::new(DepthOfFieldParams::default())
    }
}

impl DepthOfFieldPostProcess {
    pub fn new(params: DepthOfFieldParams) -> Self {
        let mut dof = Self {
            params,
            resources: None,
            targets: None,
        };
        dof.set_focal_distance(params.focal_distance);
        dof.set_focal_falloff(params.focal_falloff);
        dof.set_blur_sigma(params.blur_sigma);
        dof
    }

    pub fn params(&self) -> &DepthOfFieldParams {
        &self.params
    }

    pub fn set_focal_distance(&mut self, distance: f32) {
        self.params.focal_distance = distance.max(0.0);
    }

    pub fn set_focal_falloff(&mut self, falloff: f32) {
        self.params.focal_falloff = falloff.max(PARAM_EPSILON);
    }

    pub fn set_blur_sigma(&mut self, sigma: f32) {
        self.params.blur_sigma = sigma.max(PARAM_EPSILON);
    }

    pub fn target_descriptors(back_buffer: &BackBufferDesc) -> [TargetDesc; 2] {
        let half = back_buffer.scaled(2);
        [
            TargetDesc::color("Depth Of Field Blur", half, HDR_FORMAT),
            TargetDesc::color("Depth Of Field Scratch", half, HDR_FORMAT),
        ]
    }
}

impl PostProcess for DepthOfFieldPostProcess {
    fn name(&self) -> &'static str {
        "depth_of_field"
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
            .ok_or(RenderError::NotCreated("depth of field"))?;
        let targets = self
            .targets
            .as_ref()
            .ok_or(RenderError::NotCreated("depth of field targets"))?;
        let linear = ctx.sampler(SamplerKind::LinearClamp)?;
        resources.camera.write(ctx.queue, ctx.camera_uniform);
        resources.params.write(
            ctx.queue,
            &DepthOfFieldUniform {
                focal_distance: self.params.focal_distance,
                focal_falloff: self.params.focal_falloff,
                _padding: [0.0; 2],
            },
        );
        resources.blur.set_sigma(ctx.queue, self.params.blur_sigma);

        resources.blur.resample(
            ctx.device,
            ctx.encoder,
            linear,
            input,
            &targets.blurred.view,
            HDR_FORMAT,
        )?;
        resources.blur.blur(
            ctx.device,
            ctx.encoder,
            linear,
            &targets.blurred.view,
            &targets.scratch.view,
            HDR_FORMAT,
        )?;

        let gbuffer = ctx.gbuffer.create_bind_group(
            ctx.device,
            &resources.gbuffer_layout,
            "Depth Of Field GBuffer",
        );
        let images = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Depth Of Field Images"),
            layout: &resources.images_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.blurred.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(linear),
                },
            ],
        });
        resources.composite.draw(
            ctx.device,
            ctx.encoder,
            output,
            output_format,
            &[
                &resources.camera.bind_group,
                &gbuffer,
                &images,
                resources.params.bind_group(),
            ],
            Some(wgpu::Color::BLACK),
        )
    }
}

impl DeviceLifecycle for DepthOfFieldPostProcess {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let camera = CameraBuffer::new(device);
        let gbuffer_layout = create_read_layout(device, "Depth Of Field GBuffer Layout");
        let images_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Depth Of Field Images Layout"),
            entries: &[
                texture_entry(0, false),
                texture_entry(1, true),
                sampler_entry(2, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let params_layout =
            uniform_layout::<DepthOfFieldUniform>(device, "Depth Of Field Params Layout");
        let params = UniformBinding::new(
            device,
            &params_layout,
            "Depth Of Field Params",
            &DepthOfFieldUniform {
                focal_distance: self.params.focal_distance,
                focal_falloff: self.params.focal_falloff,
                _padding: [0.0; 2],
            },
        );
        let blur = SeparableBlur::new(device, self.params.blur_sigma)?;
        let composite = FullScreenPass::new(
            device,
            "Depth Of Field Pass",
            &[
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/depth_of_field.wgsl"),
            ],
            "fs_main",
            &[
                &camera.bind_layout,
                &gbuffer_layout,
                &images_layout,
                &params_layout,
            ],
            BlendMode::Opaque,
        )?;
        self.resources = Some(DepthOfFieldResources {
            camera,
            gbuffer_layout,
            images_layout,
            params,
            blur,
            composite,
        });
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let [blurred, scratch] =
            Self::target_descriptors(back_buffer).map(|desc| desc.create(device));
        self.targets = Some(BlurTargets { blurred, scratch });
        Ok(())
    }

    fn on_releasing_swap_chain(&mut self) {
        self.targets = None;
    }

    fn on_destroy_device(&mut self) {
        self.resources = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focal_plane_is_sharp() {
        assert_eq!(circle_of_confusion(10.0, 10.0, 5.0), 0.0);
        assert_eq!(circle_of_confusion(12.5, 10.0, 5.0), 0.5);
        assert_eq!(circle_of_confusion(100.0, 10.0, 5.0), 1.0);
        assert_eq!(circle_of_confusion(0.0, 10.0, 5.0), 1.0);
    }

    #[test]
    fn zero_falloff_does_not_divide_by_zero() {
        let mut dof = DepthOfFieldPostProcess::default();
        dof.set_focal_falloff(0.0);
        assert_eq!(dof.params().focal_falloff, PARAM_EPSILON);
        assert!(circle_of_confusion(10.0, 10.0, 0.0).is_finite());
    }
}
