//! Full-screen effects chained after light accumulation.

pub mod antialias;
pub mod blur;
pub mod copy;
pub mod depth_of_field;
pub mod hdr;
pub mod motion_blur;
pub mod sky;
pub mod ssao;
pub mod ui;

pub use antialias::AntiAliasPostProcess;
pub use copy::CopyPass;
pub use depth_of_field::DepthOfFieldPostProcess;
pub use hdr::HdrPostProcess;
pub use motion_blur::MotionBlurPostProcess;
pub use sky::SkyPostProcess;
pub use ssao::SsaoPostProcess;
pub use ui::{CrosshairOverlay, UiOverlay, UiPostProcess};

use crate::error::Result;
use crate::renderer::gbuffer::GBufferViews;
use crate::renderer::lifecycle::{color_attachment, BackBufferDesc, DeviceLifecycle};
use crate::renderer::pipeline_builder::{create_shader, pipeline_layout, PipelineBuilder, PipelineCache};
use crate::renderer::states::{BlendMode, CullMode, DepthMode, PipelineKey, SamplerKind, SamplerPool};
use crate::renderer::uniforms::{sampler_entry, texture_entry, CameraUniform};
use crate::scene::camera::CameraView;

/// Lower bound for parameters that must stay strictly positive.
pub const PARAM_EPSILON: f32 = 1e-4;

/// Everything a stage may read while recording its passes.
pub struct PostProcessContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub camera: &'a CameraView,
    pub camera_uniform: &'a CameraUniform,
    pub gbuffer: GBufferViews<'a>,
    pub samplers: &'a SamplerPool,
    pub back_buffer: BackBufferDesc,
}

impl<'a> PostProcessContext<'a> {
    pub fn sampler(&self, kind: SamplerKind) -> Result<&'a wgpu::Sampler> {
        self.samplers.get(kind)
    }
}

pub trait PostProcess: DeviceLifecycle {
    fn name(&self) -> &'static str;

    /// Additive stages draw over a copy of their input instead of replacing it.
    fn is_additive(&self) -> bool {
        false
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()>;
}

/// Layout of a filterable texture at binding 0 and its sampler at binding 1.
pub fn sampled_texture_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            texture_entry(0, true),
            sampler_entry(1, wgpu::SamplerBindingType::Filtering),
        ],
    })
}

pub fn sampled_texture_bind_group(
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

/// Layout of a single uniform buffer at binding 0, fragment visible.
pub fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[crate::renderer::uniforms::uniform_entry::<T>(
            0,
            wgpu::ShaderStages::FRAGMENT,
            false,
        )],
    })
}

/// A uniform buffer with its bind group, for per-stage parameters.
pub struct UniformBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformBinding {
    pub fn new<T: bytemuck::Pod>(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        value: &T,
    ) -> Self {
        let buffer = wgpu::util::DeviceExt::create_buffer_init(
            device,
            &wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            },
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }

    pub fn write<T: bytemuck::Pod>(&self, queue: &wgpu::Queue, value: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

/// One full-screen triangle pass. Pipelines are built per target format on first use,
/// since the last stage of the chain writes the swap-chain format.
pub struct FullScreenPass {
    label: &'static str,
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    fragment_entry: &'static str,
    blend: BlendMode,
    pipelines: PipelineCache,
}

impl FullScreenPass {
    /// `sources` are appended after the shared full-screen vertex shader.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        sources: &[&str],
        fragment_entry: &'static str,
        bind_group_layouts: &[&wgpu::BindGroupLayout],
        blend: BlendMode,
    ) -> Result<Self> {
        let mut all = vec![
            include_str!("../../shader/common.wgsl"),
            include_str!("../../shader/fullscreen.wgsl"),
        ];
        all.extend_from_slice(sources);
        let shader = create_shader(device, label, &all)?;
        let layout = pipeline_layout(device, label, bind_group_layouts);
        Ok(Self {
            label,
            shader,
            layout,
            fragment_entry,
            blend,
            pipelines: PipelineCache::new(),
        })
    }

    pub fn key(&self, format: wgpu::TextureFormat) -> PipelineKey {
        PipelineKey {
            blend: self.blend,
            depth: DepthMode::Disabled,
            cull: CullMode::None,
            format,
        }
    }

    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> Result<&wgpu::RenderPipeline> {
        let key = self.key(format);
        let (label, layout, shader, entry) =
            (self.label, &self.layout, &self.shader, self.fragment_entry);
        self.pipelines.get_or_build(key, |key| {
            PipelineBuilder::new(device, layout, shader)
                .with_label(label)
                .with_vertex_entry("vs_fullscreen")
                .with_fragment_entry(entry)
                .with_key(key, None)
                .build()
        })
    }

    /// Draws into `target`. `clear` of `None` keeps the existing contents.
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        bind_groups: &[&wgpu::BindGroup],
        clear: Option<wgpu::Color>,
    ) -> Result<()> {
        let label = self.label;
        let pipeline = self.pipeline(device, format)?;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[color_attachment(target, clear)],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        for (index, group) in bind_groups.iter().enumerate() {
            pass.set_bind_group(index as u32, *group, &[]);
        }
        pass.draw(0..3, 0..1);
        Ok(())
    }
}
