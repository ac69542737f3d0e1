//! Wireframe oriented and axis-aligned boxes of the visible instances, drawn into the
//! light buffer after accumulation.

use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::{RenderError, Result};
use crate::renderer::frame::{FrameStats, GeometryPlan};
use crate::renderer::light_buffer::HDR_FORMAT;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::pipeline_builder::{create_shader, pipeline_layout, PipelineBuilder};
use crate::renderer::states::{BlendMode, CullMode, DepthMode, DEPTH_FORMAT};
use crate::renderer::uniforms::{CameraBuffer, CameraUniform};
use crate::scene::bounds::{Aabb, OrientedBox};
use crate::scene::instance::ModelInstance;

pub const ORIENTED_COLOR: Vec3 = Vec3::new(1.0, 0.85, 0.1);
pub const AXIS_ALIGNED_COLOR: Vec3 = Vec3::new(0.1, 0.8, 1.0);

/// Two vertices per edge, twelve edges per box.
pub const VERTICES_PER_BOX: usize = 24;

const INITIAL_BOXES: usize = 64;

/// Corner pairs differing in exactly one of the x/y/z bits of the corner index.
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl LineVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Line-list vertices for the twelve edges of a box given by `Aabb::corners` ordering.
pub fn box_lines(corners: &[Vec3; 8], color: Vec3) -> [LineVertex; VERTICES_PER_BOX] {
    let mut lines = [LineVertex::zeroed(); VERTICES_PER_BOX];
    for (i, &(a, b)) in BOX_EDGES.iter().enumerate() {
        lines[2 * i] = LineVertex {
            position: corners[a].to_array(),
            color: color.to_array(),
        };
        lines[2 * i + 1] = LineVertex {
            position: corners[b].to_array(),
            color: color.to_array(),
        };
    }
    lines
}

pub fn instance_lines(oriented: &OrientedBox, axis_aligned: &Aabb, out: &mut Vec<LineVertex>) {
    out.extend(box_lines(&oriented.corners(), ORIENTED_COLOR));
    out.extend(box_lines(&axis_aligned.corners(), AXIS_ALIGNED_COLOR));
}

/// Instances with at least one mesh surviving culling, ascending.
pub fn visible_instances(geometry: &GeometryPlan) -> Vec<usize> {
    let mut instances: Vec<usize> = geometry.draws.iter().map(|draw| draw.instance).collect();
    instances.sort_unstable();
    instances.dedup();
    instances
}

struct BoundsResources {
    camera: CameraBuffer,
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    capacity: usize,
}

impl BoundsResources {
    fn create_vertex_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bounds Vertex Buffer"),
            size: (capacity * mem::size_of::<LineVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

/// Off by default; toggled at runtime.
#[derive(Default)]
pub struct BoundsRenderer {
    enabled: bool,
    resources: Option<BoundsResources>,
    vertices: Vec<LineVertex>,
}

impl BoundsRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        instances: &[usize],
        models: &mut [&mut ModelInstance],
        camera_uniform: &CameraUniform,
    ) -> Result<()> {
        self.vertices.clear();
        if instances.is_empty() {
            return Ok(());
        }
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("bounds renderer"))?;
        for &index in instances {
            if let Some(instance) = models.get_mut(index) {
                let oriented = instance.oriented_box();
                let axis_aligned = instance.axis_aligned_box();
                instance_lines(&oriented, &axis_aligned, &mut self.vertices);
            }
        }
        if self.vertices.len() > resources.capacity {
            let capacity = self.vertices.len().max(resources.capacity * 2);
            log::info!(
                "Growing bounds vertex buffer: {} -> {} vertices",
                resources.capacity,
                capacity
            );
            resources.vertex_buffer = BoundsResources::create_vertex_buffer(device, capacity);
            resources.capacity = capacity;
        }
        queue.write_buffer(
            &resources.vertex_buffer,
            0,
            bytemuck::cast_slice(&self.vertices),
        );
        resources.camera.write(queue, camera_uniform);
        Ok(())
    }

    /// Records into the light accumulation pass, depth-tested against the scene.
    pub fn render(&self, pass: &mut wgpu::RenderPass<'_>, stats: &mut FrameStats) -> Result<()> {
        if self.vertices.is_empty() {
            return Ok(());
        }
        let resources = self
            .resources
            .as_ref()
            .ok_or(RenderError::NotCreated("bounds renderer"))?;
        let bytes = (self.vertices.len() * mem::size_of::<LineVertex>()) as u64;
        pass.set_pipeline(&resources.pipeline);
        pass.set_bind_group(0, &resources.camera.bind_group, &[]);
        pass.set_vertex_buffer(0, resources.vertex_buffer.slice(..bytes));
        pass.draw(0..self.vertices.len() as u32, 0..1);
        stats.bounding_boxes += (self.vertices.len() / VERTICES_PER_BOX) as u32;
        Ok(())
    }
}

impl DeviceLifecycle for BoundsRenderer {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let camera = CameraBuffer::new(device);
        let shader = create_shader(
            device,
            "Bounds Shader",
            &[
                include_str!("../shader/common.wgsl"),
                include_str!("../shader/bounds.wgsl"),
            ],
        )?;
        let layout = pipeline_layout(device, "Bounds Pipeline Layout", &[&camera.bind_layout]);
        let pipeline = PipelineBuilder::new(device, &layout, &shader)
            .with_label("Bounds Pipeline")
            .with_vertex_buffer(LineVertex::layout())
            .with_color_target(HDR_FORMAT, BlendMode::Opaque)
            .with_depth(DEPTH_FORMAT, DepthMode::TestOnly)
            .with_cull(CullMode::None)
            .with_topology(wgpu::PrimitiveTopology::LineList)
            .build()?;
        let capacity = INITIAL_BOXES * 2 * VERTICES_PER_BOX;
        self.resources = Some(BoundsResources {
            camera,
            pipeline,
            vertex_buffer: BoundsResources::create_vertex_buffer(device, capacity),
            capacity,
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
        self.vertices.clear();
    }
}
