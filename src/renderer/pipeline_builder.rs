use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::{RenderError, Result};
use crate::renderer::states::{BlendMode, CullMode, DepthMode, PipelineKey};

/// Fluent render pipeline construction with the fixed-function presets from `states`.
///
/// Defaults: `vs_main` / `fs_main`, back-face culling, no depth, no color targets.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    vertex_entry: &'a str,
    fragment_entry: Option<&'a str>,
    vertex_buffers: Vec<wgpu::VertexBufferLayout<'a>>,
    color_targets: Vec<Option<wgpu::ColorTargetState>>,
    depth_stencil: Option<wgpu::DepthStencilState>,
    primitive: wgpu::PrimitiveState,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            label: "Pipeline",
            layout,
            shader,
            vertex_entry: "vs_main",
            fragment_entry: Some("fs_main"),
            vertex_buffers: Vec::new(),
            color_targets: Vec::new(),
            depth_stencil: None,
            primitive: CullMode::Back.primitive(),
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }

    pub fn with_vertex_entry(mut self, entry: &'a str) -> Self {
        self.vertex_entry = entry;
        self
    }

    pub fn with_fragment_entry(mut self, entry: &'a str) -> Self {
        self.fragment_entry = Some(entry);
        self
    }

    /// Depth-only pipeline.
    pub fn without_fragment(mut self) -> Self {
        self.fragment_entry = None;
        self
    }

    pub fn with_vertex_buffer(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    pub fn with_color_target(mut self, format: wgpu::TextureFormat, blend: BlendMode) -> Self {
        self.color_targets.push(Some(wgpu::ColorTargetState {
            format,
            blend: blend.state(),
            write_mask: wgpu::ColorWrites::ALL,
        }));
        self
    }

    pub fn with_depth(mut self, format: wgpu::TextureFormat, mode: DepthMode) -> Self {
        self.depth_stencil = Some(mode.state(format));
        self
    }

    /// Depth with rasterizer bias, for shadow maps.
    pub fn with_depth_biased(
        mut self,
        format: wgpu::TextureFormat,
        mode: DepthMode,
        constant_bias: i32,
        slope_bias: f32,
    ) -> Self {
        let mut state = mode.state(format);
        state.bias = wgpu::DepthBiasState {
            constant: constant_bias,
            slope_scale: slope_bias,
            clamp: 0.0,
        };
        self.depth_stencil = Some(state);
        self
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.primitive = cull.primitive();
        self
    }

    pub fn with_topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.primitive.topology = topology;
        self
    }

    /// Single color target plus depth/cull, all taken from `key`.
    pub fn with_key(self, key: PipelineKey, depth_format: Option<wgpu::TextureFormat>) -> Self {
        let builder = self
            .with_color_target(key.format, key.blend)
            .with_cull(key.cull);
        match depth_format {
            Some(format) => builder.with_depth(format, key.depth),
            None => builder,
        }
    }

    pub fn build(self) -> Result<wgpu::RenderPipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.label),
            layout: Some(self.layout),
            vertex: wgpu::VertexState {
                module: self.shader,
                entry_point: Some(self.vertex_entry),
                buffers: &self.vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: self.fragment_entry.map(|entry| wgpu::FragmentState {
                module: self.shader,
                entry_point: Some(entry),
                targets: &self.color_targets,
                compilation_options: Default::default(),
            }),
            primitive: self.primitive,
            depth_stencil: self.depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(RenderError::ResourceCreation {
                label: self.label.to_string(),
                message: err.to_string(),
            }),
            None => Ok(pipeline),
        }
    }
}

/// Pipelines built on demand from one shader, one per distinct `PipelineKey`.
#[derive(Default)]
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &mut self,
        key: PipelineKey,
        build: impl FnOnce(PipelineKey) -> Result<wgpu::RenderPipeline>,
    ) -> Result<&wgpu::RenderPipeline> {
        match self.pipelines.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                log::debug!("Building pipeline for {:?}", key);
                Ok(entry.insert(build(key)?))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
    }
}

/// Compiles WGSL assembled from `sources`, reporting validation failures as errors.
pub fn create_shader(
    device: &wgpu::Device,
    label: &str,
    sources: &[&str],
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(sources.join("\n").into()),
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(RenderError::ShaderCompilation {
            label: label.to_string(),
            message: err.to_string(),
        }),
        None => Ok(module),
    }
}

pub fn pipeline_layout(
    device: &wgpu::Device,
    label: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    })
}
