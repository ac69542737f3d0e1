//! Screen-space ambient occlusion.
//!
//! Raw occlusion is computed at full or half resolution, reduced to 1/4 and 1/8, blurred
//! there with a separable Gaussian, brought back up through 1/4 and 1/2, and finally
//! multiplied into the scene color.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use half::f16;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::blur::SeparableBlur;
use super::{
    sampled_texture_bind_group, FullScreenPass, PostProcess, PostProcessContext, UniformBinding,
    PARAM_EPSILON,
};
use crate::error::{RenderError, Result};
use crate::renderer::gbuffer::create_read_layout;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle, RenderTarget, TargetDesc};
use crate::renderer::states::{BlendMode, SamplerKind};
use crate::renderer::uniforms::{texture_entry, uniform_entry, CameraBuffer};

/// Selectable sample counts; the sample-count index addresses this table.
pub const SAMPLE_COUNTS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];
pub const MAX_SAMPLES: usize = 64;
pub const DEFAULT_SAMPLE_COUNT_INDEX: usize = 3;
pub const ROTATION_TEXTURE_SIZE: u32 = 16;
pub const MIN_SAMPLE_LENGTH: f32 = 0.1;
pub const OCCLUSION_BIAS: f32 = 0.025;
pub const AO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

const DIRECTION_SEED: u64 = 0x55a0;
const ROTATION_SEED: u64 = 0x70f4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsaoParams {
    pub sample_radius: f32,
    pub blur_sigma: f32,
    pub sample_power: f32,
    pub sample_count_index: usize,
    pub half_resolution: bool,
}

impl Default for SsaoParams {
    fn default() -> Self {
        Self {
            sample_radius: 0.5,
            blur_sigma: 0.45,
            sample_power: 4.5,
            sample_count_index: DEFAULT_SAMPLE_COUNT_INDEX,
            half_resolution: true,
        }
    }
}

/// `MAX_SAMPLES` random directions with lengths in `[MIN_SAMPLE_LENGTH, 1]`.
pub fn sample_directions(seed: u64) -> Vec<Vec4> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..MAX_SAMPLES)
        .map(|_| {
            let direction = random_unit_vector(&mut rng);
            let length = rng.gen_range(MIN_SAMPLE_LENGTH..=1.0);
            (direction * length).extend(0.0)
        })
        .collect()
}

/// Texels of the rotation texture as half-float bits, row major.
pub fn rotation_texels(seed: u64) -> Vec<[u16; 4]> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..ROTATION_TEXTURE_SIZE * ROTATION_TEXTURE_SIZE)
        .map(|_| {
            let v = random_unit_vector(&mut rng);
            [
                f16::from_f32(v.x).to_bits(),
                f16::from_f32(v.y).to_bits(),
                f16::from_f32(v.z).to_bits(),
                f16::from_f32(1.0).to_bits(),
            ]
        })
        .collect()
}

fn random_unit_vector(rng: &mut SmallRng) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let length_squared = v.length_squared();
        if length_squared > 1e-4 && length_squared <= 1.0 {
            return v / length_squared.sqrt();
        }
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Occlusion one sample contributes, in view space where larger z is nearer the camera.
/// Matches the occlusion shader.
pub fn sample_occlusion(radius: f32, center_z: f32, sample_z: f32, scene_z: f32) -> f32 {
    if radius <= 0.0 || scene_z < sample_z + OCCLUSION_BIAS {
        return 0.0;
    }
    smoothstep(0.0, 1.0, radius / (center_z - scene_z).abs().max(1e-6))
}

pub fn visibility(occlusion_sum: f32, sample_count: u32, power: f32) -> f32 {
    let count = sample_count.max(1) as f32;
    (1.0 - occlusion_sum / count).clamp(0.0, 1.0).powf(power)
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SsaoUniform {
    radius: f32,
    power: f32,
    bias: f32,
    _padding: f32,
    samples: [[f32; 4]; MAX_SAMPLES],
}

impl SsaoUniform {
    fn new(params: &SsaoParams, directions: &[Vec4]) -> Self {
        let mut samples = [[0.0; 4]; MAX_SAMPLES];
        for (slot, direction) in samples.iter_mut().zip(directions) {
            *slot = direction.to_array();
        }
        Self {
            radius: params.sample_radius,
            power: params.sample_power,
            bias: OCCLUSION_BIAS,
            _padding: 0.0,
            samples,
        }
    }
}

struct SsaoTargets {
    occlusion: RenderTarget,
    quarter: RenderTarget,
    eighth: RenderTarget,
    eighth_scratch: RenderTarget,
    quarter_up: RenderTarget,
    upscaled: RenderTarget,
}

struct SsaoResources {
    camera: CameraBuffer,
    gbuffer_layout: wgpu::BindGroupLayout,
    params_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    params: UniformBinding,
    rotation_group: wgpu::BindGroup,
    _rotation: wgpu::Texture,
    /// One occlusion pass per entry of `SAMPLE_COUNTS`, compiled when first selected.
    occlusion: [Option<FullScreenPass>; SAMPLE_COUNTS.len()],
    blur: SeparableBlur,
    composite: FullScreenPass,
}

pub struct SsaoPostProcess {
    params: SsaoParams,
    directions: Vec<Vec4>,
    params_dirty: bool,
    targets_dirty: bool,
    back_buffer: Option<BackBufferDesc>,
    resources: Option<SsaoResources>,
    targets: Option<SsaoTargets>,
}

impl Default for SsaoPostProcess {
    fn default() -> Self {
        Self::new(SsaoParams::default())
    }
}

impl SsaoPostProcess {
    pub fn new(params: SsaoParams) -> Self {
        let mut ssao = Self {
            params: SsaoParams::default(),
            directions: sample_directions(DIRECTION_SEED),
            params_dirty: true,
            targets_dirty: false,
            back_buffer: None,
            resources: None,
            targets: None,
        };
        ssao.set_sample_radius(params.sample_radius);
        ssao.set_blur_sigma(params.blur_sigma);
        ssao.set_sample_power(params.sample_power);
        ssao.set_sample_count_index(params.sample_count_index);
        ssao.set_half_resolution(params.half_resolution);
        ssao
    }

    pub fn params(&self) -> &SsaoParams {
        &self.params
    }

    pub fn sample_radius(&self) -> f32 {
        self.params.sample_radius
    }

    pub fn set_sample_radius(&mut self, radius: f32) {
        self.params.sample_radius = radius.max(0.0);
        self.params_dirty = true;
    }

    pub fn blur_sigma(&self) -> f32 {
        self.params.blur_sigma
    }

    pub fn set_blur_sigma(&mut self, sigma: f32) {
        self.params.blur_sigma = sigma.max(PARAM_EPSILON);
        self.params_dirty = true;
    }

    pub fn sample_power(&self) -> f32 {
        self.params.sample_power
    }

    pub fn set_sample_power(&mut self, power: f32) {
        self.params.sample_power = power.max(PARAM_EPSILON);
        self.params_dirty = true;
    }

    pub fn sample_count_index(&self) -> usize {
        self.params.sample_count_index
    }

    pub fn set_sample_count_index(&mut self, index: usize) {
        self.params.sample_count_index = index.min(SAMPLE_COUNTS.len() - 1);
    }

    pub fn sample_count(&self) -> u32 {
        SAMPLE_COUNTS[self.params.sample_count_index]
    }

    pub fn half_resolution(&self) -> bool {
        self.params.half_resolution
    }

    pub fn set_half_resolution(&mut self, half_resolution: bool) {
        if self.params.half_resolution != half_resolution {
            self.params.half_resolution = half_resolution;
            self.targets_dirty = true;
        }
    }

    /// Occlusion and the final upscale run at the working resolution; the blur chain in
    /// between works at quarter and eighth size of the back buffer.
    pub fn target_descriptors(back_buffer: &BackBufferDesc, half_resolution: bool) -> [TargetDesc; 6] {
        let work = back_buffer.scaled(if half_resolution { 2 } else { 1 });
        [
            TargetDesc::color("SSAO Occlusion", work, AO_FORMAT),
            TargetDesc::color("SSAO Quarter", back_buffer.scaled(4), AO_FORMAT),
            TargetDesc::color("SSAO Eighth", back_buffer.scaled(8), AO_FORMAT),
            TargetDesc::color("SSAO Eighth Scratch", back_buffer.scaled(8), AO_FORMAT),
            TargetDesc::color("SSAO Quarter Up", back_buffer.scaled(4), AO_FORMAT),
            TargetDesc::color("SSAO Upscaled", work, AO_FORMAT),
        ]
    }

    /// The blurred occlusion target the composite samples.
    pub fn composite_source(back_buffer: &BackBufferDesc, half_resolution: bool) -> TargetDesc {
        let [.., upscaled] = Self::target_descriptors(back_buffer, half_resolution);
        upscaled
    }

    pub fn descriptors(&self) -> Option<[TargetDesc; 6]> {
        self.targets.as_ref().map(|t| {
            [
                t.occlusion.desc,
                t.quarter.desc,
                t.eighth.desc,
                t.eighth_scratch.desc,
                t.quarter_up.desc,
                t.upscaled.desc,
            ]
        })
    }

    fn create_targets(&mut self, device: &wgpu::Device, back_buffer: &BackBufferDesc) {
        let [occlusion, quarter, eighth, eighth_scratch, quarter_up, upscaled] =
            Self::target_descriptors(back_buffer, self.params.half_resolution)
                .map(|desc| desc.create(device));
        log::info!(
            "SSAO targets: {}x{} occlusion ({} resolution)",
            occlusion.desc.width,
            occlusion.desc.height,
            if self.params.half_resolution { "half" } else { "full" }
        );
        self.targets = Some(SsaoTargets {
            occlusion,
            quarter,
            eighth,
            eighth_scratch,
            quarter_up,
            upscaled,
        });
        self.targets_dirty = false;
    }

    fn create_occlusion_pass(
        device: &wgpu::Device,
        resources: &SsaoResources,
        sample_count: u32,
    ) -> Result<FullScreenPass> {
        let constant = format!("const SAMPLE_COUNT: u32 = {}u;", sample_count);
        log::info!("Compiling SSAO occlusion for {} samples", sample_count);
        FullScreenPass::new(
            device,
            "SSAO Occlusion Pass",
            &[
                &constant,
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/ssao.wgsl"),
            ],
            "fs_occlusion",
            &[
                &resources.camera.bind_layout,
                &resources.gbuffer_layout,
                &resources.params_layout,
                &resources.texture_layout,
            ],
            BlendMode::Opaque,
        )
    }

    fn create_rotation_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width: ROTATION_TEXTURE_SIZE,
            height: ROTATION_TEXTURE_SIZE,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("SSAO Rotation"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texels = rotation_texels(ROTATION_SEED);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(8 * ROTATION_TEXTURE_SIZE),
                rows_per_image: Some(ROTATION_TEXTURE_SIZE),
            },
            size,
        );
        texture
    }
}

impl PostProcess for SsaoPostProcess {
    fn name(&self) -> &'static str {
        "ssao"
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()> {
        if self.targets_dirty || self.targets.is_none() {
            let back_buffer = self.back_buffer.unwrap_or(ctx.back_buffer);
            self.create_targets(ctx.device, &back_buffer);
        }
        let index = self.params.sample_count_index;
        let sample_count = self.sample_count();
        let params_dirty = std::mem::take(&mut self.params_dirty);
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("ssao"))?;
        let targets = self
            .targets
            .as_ref()
            .ok_or(RenderError::NotCreated("ssao targets"))?;
        if params_dirty {
            resources
                .params
                .write(ctx.queue, &SsaoUniform::new(&self.params, &self.directions));
            resources.blur.set_sigma(ctx.queue, self.params.blur_sigma);
        }
        resources.camera.write(ctx.queue, ctx.camera_uniform);
        let sampler = ctx.sampler(SamplerKind::LinearClamp)?;

        if resources.occlusion[index].is_none() {
            let pass = Self::create_occlusion_pass(ctx.device, resources, sample_count)?;
            resources.occlusion[index] = Some(pass);
        }
        let gbuffer_group =
            ctx.gbuffer
                .create_bind_group(ctx.device, &resources.gbuffer_layout, "SSAO GBuffer");
        if let Some(occlusion) = resources.occlusion[index].as_mut() {
            occlusion.draw(
                ctx.device,
                ctx.encoder,
                &targets.occlusion.view,
                AO_FORMAT,
                &[
                    &resources.camera.bind_group,
                    &gbuffer_group,
                    resources.params.bind_group(),
                    &resources.rotation_group,
                ],
                Some(wgpu::Color::WHITE),
            )?;
        }

        let blur = &mut resources.blur;
        blur.resample(
            ctx.device,
            ctx.encoder,
            sampler,
            &targets.occlusion.view,
            &targets.quarter.view,
            AO_FORMAT,
        )?;
        blur.resample(
            ctx.device,
            ctx.encoder,
            sampler,
            &targets.quarter.view,
            &targets.eighth.view,
            AO_FORMAT,
        )?;
        blur.blur(
            ctx.device,
            ctx.encoder,
            sampler,
            &targets.eighth.view,
            &targets.eighth_scratch.view,
            AO_FORMAT,
        )?;
        blur.resample(
            ctx.device,
            ctx.encoder,
            sampler,
            &targets.eighth.view,
            &targets.quarter_up.view,
            AO_FORMAT,
        )?;
        blur.resample(
            ctx.device,
            ctx.encoder,
            sampler,
            &targets.quarter_up.view,
            &targets.upscaled.view,
            AO_FORMAT,
        )?;

        let occlusion_group = sampled_texture_bind_group(
            ctx.device,
            blur.sampled_layout(),
            &targets.upscaled.view,
            sampler,
            "SSAO Blurred Occlusion",
        );
        let scene_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Scene"),
            layout: &resources.texture_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(input),
            }],
        });
        resources.composite.draw(
            ctx.device,
            ctx.encoder,
            output,
            output_format,
            &[&occlusion_group, &scene_group],
            Some(wgpu::Color::BLACK),
        )
    }
}

impl DeviceLifecycle for SsaoPostProcess {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let camera = CameraBuffer::new(device);
        let gbuffer_layout = create_read_layout(device, "SSAO GBuffer Layout");
        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Params Layout"),
            entries: &[uniform_entry::<SsaoUniform>(
                0,
                wgpu::ShaderStages::FRAGMENT,
                false,
            )],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Texture Layout"),
            entries: &[texture_entry(0, false)],
        });
        let params = UniformBinding::new(
            device,
            &params_layout,
            "SSAO Params",
            &SsaoUniform::new(&self.params, &self.directions),
        );
        let rotation = Self::create_rotation_texture(device, queue);
        let rotation_view = rotation.create_view(&wgpu::TextureViewDescriptor::default());
        let rotation_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Rotation"),
            layout: &texture_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&rotation_view),
            }],
        });
        let blur = SeparableBlur::new(device, self.params.blur_sigma)?;
        let composite = FullScreenPass::new(
            device,
            "SSAO Composite Pass",
            &[include_str!("../../shader/ssao_composite.wgsl")],
            "fs_main",
            &[blur.sampled_layout(), &texture_layout],
            BlendMode::Opaque,
        )?;

        let mut resources = SsaoResources {
            camera,
            gbuffer_layout,
            params_layout,
            texture_layout,
            params,
            rotation_group,
            _rotation: rotation,
            occlusion: Default::default(),
            blur,
            composite,
        };
        let index = self.params.sample_count_index;
        resources.occlusion[index] = Some(Self::create_occlusion_pass(
            device,
            &resources,
            SAMPLE_COUNTS[index],
        )?);
        self.resources = Some(resources);
        self.params_dirty = false;
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        self.back_buffer = Some(*back_buffer);
        self.create_targets(device, back_buffer);
        Ok(())
    }

    fn on_releasing_swap_chain(&mut self) {
        self.targets = None;
        self.back_buffer = None;
    }

    fn on_destroy_device(&mut self) {
        self.resources = None;
        self.params_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let ssao = SsaoPostProcess::default();
        assert_eq!(ssao.sample_radius(), 0.5);
        assert_eq!(ssao.blur_sigma(), 0.45);
        assert_eq!(ssao.sample_power(), 4.5);
        assert_eq!(ssao.sample_count(), 8);
        assert!(ssao.half_resolution());
    }

    #[test]
    fn setters_clamp() {
        let mut ssao = SsaoPostProcess::default();
        ssao.set_blur_sigma(-5.0);
        assert_eq!(ssao.blur_sigma(), PARAM_EPSILON);
        ssao.set_sample_power(0.0);
        assert_eq!(ssao.sample_power(), PARAM_EPSILON);
        ssao.set_sample_radius(-1.0);
        assert_eq!(ssao.sample_radius(), 0.0);
        ssao.set_sample_count_index(99);
        assert_eq!(ssao.sample_count(), 64);
    }

    #[test]
    fn directions_have_bounded_length() {
        let directions = sample_directions(7);
        assert_eq!(directions.len(), MAX_SAMPLES);
        for d in directions {
            let length = d.truncate().length();
            assert!((MIN_SAMPLE_LENGTH - 1e-5..=1.0 + 1e-5).contains(&length));
            assert_eq!(d.w, 0.0);
        }
    }

    #[test]
    fn rotation_texture_is_16_by_16_unit_vectors() {
        let texels = rotation_texels(3);
        assert_eq!(texels.len(), 256);
        for texel in texels {
            let v = Vec3::new(
                f16::from_bits(texel[0]).to_f32(),
                f16::from_bits(texel[1]).to_f32(),
                f16::from_bits(texel[2]).to_f32(),
            );
            assert!((v.length() - 1.0).abs() < 1e-2);
        }
    }

    #[test]
    fn half_resolution_shrinks_only_the_working_targets() {
        let bb = BackBufferDesc::new(1280, 720, wgpu::TextureFormat::Bgra8UnormSrgb);
        let full = SsaoPostProcess::target_descriptors(&bb, false);
        let half = SsaoPostProcess::target_descriptors(&bb, true);
        assert_eq!((full[0].width, full[0].height), (1280, 720));
        assert_eq!((half[0].width, half[0].height), (640, 360));
        assert_eq!(full[1..5], half[1..5]);
        assert_eq!((half[2].width, half[2].height), (160, 90));
    }

    #[test]
    fn composite_samples_occlusion_at_working_resolution() {
        let bb = BackBufferDesc::new(1280, 720, wgpu::TextureFormat::Bgra8UnormSrgb);
        let full = SsaoPostProcess::composite_source(&bb, false);
        assert_eq!((full.width, full.height), (1280, 720));
        let half = SsaoPostProcess::composite_source(&bb, true);
        assert_eq!((half.width, half.height), (640, 360));
        let [occlusion, ..] = SsaoPostProcess::target_descriptors(&bb, false);
        assert_eq!((full.width, full.height), (occlusion.width, occlusion.height));
    }
}
