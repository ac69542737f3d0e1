//! Eye adaptation, bloom and tone mapping of the HDR light buffer.

use bytemuck::{Pod, Zeroable};

use super::blur::SeparableBlur;
use super::{
    sampled_texture_bind_group, uniform_layout, FullScreenPass, PostProcess, PostProcessContext,
    UniformBinding, PARAM_EPSILON,
};
use crate::error::{RenderError, Result};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle, RenderTarget, TargetDesc};
use crate::renderer::light_buffer::HDR_FORMAT;
use crate::renderer::states::{BlendMode, SamplerKind};
use crate::renderer::uniforms::texture_entry;

pub const LUMINANCE_SIZE: u32 = 256;
pub const LUMINANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

/// Mip levels from `size` down to a single texel.
pub fn luminance_mip_count(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

/// Fraction of the gap to the measured luminance closed over `time_delta` seconds.
pub fn adaptation_factor(time_delta: f32, rate: f32) -> f32 {
    1.0 - (-time_delta.max(0.0) * rate.max(0.0)).exp()
}

/// Extended Reinhard on luminance; `white_point` maps to 1.
pub fn tone_map_luminance(luminance: f32, white_point: f32) -> f32 {
    let white = white_point.max(PARAM_EPSILON);
    luminance * (1.0 + luminance / (white * white)) / (1.0 + luminance)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HdrParams {
    pub key: f32,
    pub white_point: f32,
    pub bloom_threshold: f32,
    pub bloom_magnitude: f32,
    pub bloom_blur_sigma: f32,
    pub adaptation_rate: f32,
}

impl Default for HdrParams {
    fn default() -> Self {
        Self {
            key: 0.18,
            white_point: 3.0,
            bloom_threshold: 1.0,
            bloom_magnitude: 0.5,
            bloom_blur_sigma: 0.8,
            adaptation_rate: 0.5,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct HdrUniform {
    key: f32,
    white_point: f32,
    bloom_threshold: f32,
    bloom_magnitude: f32,
    adaptation: f32,
    _padding: [f32; 3],
}

struct HdrResources {
    sampled_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    params: UniformBinding,
    luminance: RenderTarget,
    adapted: [RenderTarget; 2],
    log_luminance: FullScreenPass,
    adapt: FullScreenPass,
    bright_pass: FullScreenPass,
    tone_map: FullScreenPass,
    blur: SeparableBlur,
}

struct BloomTargets {
    bloom: RenderTarget,
    scratch: RenderTarget,
}

pub struct HdrPostProcess {
    params: HdrParams,
    time_delta: f32,
    /// Index of the adapted-luminance target written last frame.
    current: usize,
    resources: Option<HdrResources>,
    targets: Option<BloomTargets>,
}

impl Default for HdrPostProcess {
    fn default() -> Self {
        Self::new(HdrParams::default())
    }
}

impl HdrPostProcess {
    pub fn new(params: HdrParams) -> Self {
        let mut hdr = Self {
            params: HdrParams::default(),
            time_delta: 0.0,
            current: 0,
            resources: None,
            targets: None,
        };
        hdr.set_key(params.key);
        hdr.set_white_point(params.white_point);
        hdr.set_bloom_threshold(params.bloom_threshold);
        hdr.set_bloom_magnitude(params.bloom_magnitude);
        hdr.set_bloom_blur_sigma(params.bloom_blur_sigma);
        hdr.set_adaptation_rate(params.adaptation_rate);
        hdr
    }

    pub fn params(&self) -> &HdrParams {
        &self.params
    }

    pub fn set_key(&mut self, key: f32) {
        self.params.key = key.max(PARAM_EPSILON);
    }

    pub fn set_white_point(&mut self, white_point: f32) {
        self.params.white_point = white_point.max(PARAM_EPSILON);
    }

    pub fn set_bloom_threshold(&mut self, threshold: f32) {
        self.params.bloom_threshold = threshold.max(0.0);
    }

    pub fn set_bloom_magnitude(&mut self, magnitude: f32) {
        self.params.bloom_magnitude = magnitude.max(0.0);
    }

    pub fn set_bloom_blur_sigma(&mut self, sigma: f32) {
        self.params.bloom_blur_sigma = sigma.max(PARAM_EPSILON);
    }

    pub fn set_adaptation_rate(&mut self, rate: f32) {
        self.params.adaptation_rate = rate.max(0.0);
    }

    /// Frame time used to advance eye adaptation on the next render.
    pub fn set_time_delta(&mut self, time_delta: f32) {
        self.time_delta = time_delta.max(0.0);
    }

    pub fn target_descriptors(back_buffer: &BackBufferDesc) -> [TargetDesc; 2] {
        let half = back_buffer.scaled(2);
        [
            TargetDesc::color("Bloom", half, HDR_FORMAT),
            TargetDesc::color("Bloom Scratch", half, HDR_FORMAT),
        ]
    }

    pub fn descriptors(&self) -> Option<[TargetDesc; 2]> {
        self.targets
            .as_ref()
            .map(|t| [t.bloom.desc, t.scratch.desc])
    }

    fn uniform(&self) -> HdrUniform {
        HdrUniform {
            key: self.params.key,
            white_point: self.params.white_point,
            bloom_threshold: self.params.bloom_threshold,
            bloom_magnitude: self.params.bloom_magnitude,
            adaptation: adaptation_factor(self.time_delta, self.params.adaptation_rate),
            _padding: [0.0; 3],
        }
    }

    fn texture_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Adapted Luminance"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        })
    }
}

impl PostProcess for HdrPostProcess {
    fn name(&self) -> &'static str {
        "hdr"
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()> {
        let uniform = self.uniform();
        let previous = self.current;
        let next = 1 - previous;
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("hdr"))?;
        let targets = self
            .targets
            .as_ref()
            .ok_or(RenderError::NotCreated("hdr targets"))?;
        let device = ctx.device;
        let linear = ctx.sampler(SamplerKind::LinearClamp)?;
        resources.params.write(ctx.queue, &uniform);
        resources.blur.set_sigma(ctx.queue, self.params.bloom_blur_sigma);

        let scene = sampled_texture_bind_group(
            device,
            &resources.sampled_layout,
            input,
            linear,
            "HDR Scene",
        );
        resources.log_luminance.draw(
            device,
            ctx.encoder,
            &resources.luminance.mip_view(0),
            LUMINANCE_FORMAT,
            &[&scene],
            Some(wgpu::Color::BLACK),
        )?;
        for level in 1..resources.luminance.desc.mip_levels {
            resources.blur.resample(
                device,
                ctx.encoder,
                linear,
                &resources.luminance.mip_view(level - 1),
                &resources.luminance.mip_view(level),
                LUMINANCE_FORMAT,
            )?;
        }

        let average = sampled_texture_bind_group(
            device,
            &resources.sampled_layout,
            &resources.luminance.mip_view(resources.luminance.desc.mip_levels - 1),
            linear,
            "HDR Average Luminance",
        );
        let previous_group =
            Self::texture_group(device, &resources.texture_layout, &resources.adapted[previous].view);
        resources.adapt.draw(
            device,
            ctx.encoder,
            &resources.adapted[next].view,
            LUMINANCE_FORMAT,
            &[&average, &previous_group, resources.params.bind_group()],
            Some(wgpu::Color::BLACK),
        )?;

        let adapted_group =
            Self::texture_group(device, &resources.texture_layout, &resources.adapted[next].view);
        resources.bright_pass.draw(
            device,
            ctx.encoder,
            &targets.bloom.view,
            HDR_FORMAT,
            &[&scene, &adapted_group, resources.params.bind_group()],
            Some(wgpu::Color::BLACK),
        )?;
        resources.blur.blur(
            device,
            ctx.encoder,
            linear,
            &targets.bloom.view,
            &targets.scratch.view,
            HDR_FORMAT,
        )?;

        let bloom = sampled_texture_bind_group(
            device,
            &resources.sampled_layout,
            &targets.bloom.view,
            linear,
            "HDR Bloom",
        );
        resources.tone_map.draw(
            device,
            ctx.encoder,
            output,
            output_format,
            &[&scene, &adapted_group, resources.params.bind_group(), &bloom],
            Some(wgpu::Color::BLACK),
        )?;
        self.current = next;
        Ok(())
    }
}

impl DeviceLifecycle for HdrPostProcess {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let blur = SeparableBlur::new(device, self.params.bloom_blur_sigma)?;
        let sampled_layout = super::sampled_texture_layout(device, "HDR Source Layout");
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HDR Luminance Layout"),
            entries: &[texture_entry(0, false)],
        });
        let params_layout = uniform_layout::<HdrUniform>(device, "HDR Params Layout");
        let params = UniformBinding::new(device, &params_layout, "HDR Params", &self.uniform());

        let luminance = TargetDesc::color(
            "Log Luminance",
            (LUMINANCE_SIZE, LUMINANCE_SIZE),
            LUMINANCE_FORMAT,
        )
        .with_mips(luminance_mip_count(LUMINANCE_SIZE))
        .create(device);
        let adapted = [
            TargetDesc::color("Adapted Luminance A", (1, 1), LUMINANCE_FORMAT).create(device),
            TargetDesc::color("Adapted Luminance B", (1, 1), LUMINANCE_FORMAT).create(device),
        ];

        let source = include_str!("../../shader/hdr.wgsl");
        let log_luminance = FullScreenPass::new(
            device,
            "Log Luminance Pass",
            &[source],
            "fs_log_luminance",
            &[&sampled_layout],
            BlendMode::Opaque,
        )?;
        let adapt = FullScreenPass::new(
            device,
            "Adaptation Pass",
            &[source],
            "fs_adapt",
            &[&sampled_layout, &texture_layout, &params_layout],
            BlendMode::Opaque,
        )?;
        let bright_pass = FullScreenPass::new(
            device,
            "Bright Pass",
            &[source],
            "fs_bright_pass",
            &[&sampled_layout, &texture_layout, &params_layout],
            BlendMode::Opaque,
        )?;
        let tone_map = FullScreenPass::new(
            device,
            "Tone Map Pass",
            &[source],
            "fs_tone_map",
            &[&sampled_layout, &texture_layout, &params_layout, &sampled_layout],
            BlendMode::Opaque,
        )?;
        log::info!(
            "HDR luminance chain: {}x{} with {} mips",
            LUMINANCE_SIZE,
            LUMINANCE_SIZE,
            luminance.desc.mip_levels
        );

        self.resources = Some(HdrResources {
            sampled_layout,
            texture_layout,
            params,
            luminance,
            adapted,
            log_luminance,
            adapt,
            bright_pass,
            tone_map,
            blur,
        });
        self.current = 0;
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let [bloom, scratch] =
            Self::target_descriptors(back_buffer).map(|desc| desc.create(device));
        self.targets = Some(BloomTargets { bloom, scratch });
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
    fn luminance_chain_reaches_one_texel() {
        assert_eq!(luminance_mip_count(256), 9);
        assert_eq!(luminance_mip_count(1), 1);
    }

    #[test]
    fn adaptation_is_monotonic_in_time() {
        assert_eq!(adaptation_factor(0.0, 0.5), 0.0);
        let short = adaptation_factor(0.016, 0.5);
        let long = adaptation_factor(1.0, 0.5);
        assert!(short > 0.0 && short < long && long < 1.0);
        assert_eq!(adaptation_factor(-1.0, 0.5), 0.0);
    }

    #[test]
    fn white_point_maps_to_one() {
        assert!((tone_map_luminance(3.0, 3.0) - 1.0).abs() < 1e-6);
        assert!(tone_map_luminance(0.5, 3.0) < 0.5);
    }

    #[test]
    fn setters_clamp() {
        let mut hdr = HdrPostProcess::default();
        hdr.set_key(-1.0);
        hdr.set_white_point(0.0);
        hdr.set_bloom_magnitude(-2.0);
        hdr.set_bloom_blur_sigma(-5.0);
        assert_eq!(hdr.params().key, PARAM_EPSILON);
        assert_eq!(hdr.params().white_point, PARAM_EPSILON);
        assert_eq!(hdr.params().bloom_magnitude, 0.0);
        assert_eq!(hdr.params().bloom_blur_sigma, PARAM_EPSILON);
    }

    #[test]
    fn bloom_targets_are_half_resolution() {
        let bb = BackBufferDesc::new(1920, 1080, wgpu::TextureFormat::Bgra8UnormSrgb);
        let [bloom, scratch] = HdrPostProcess::target_descriptors(&bb);
        assert_eq!((bloom.width, bloom.height), (960, 540));
        assert_eq!(bloom.format, HDR_FORMAT);
        assert_eq!(scratch.width, bloom.width);
    }
}
