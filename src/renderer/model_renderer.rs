use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::error::{RenderError, Result};
use crate::renderer::frame::{FrameStats, GeometryPlan, MeshDraw};
use crate::renderer::gbuffer::{GBuffer, COLOR_FORMATS};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::material::{MaterialBinding, MaterialLayout, MaterialTextures};
use crate::renderer::pipeline_builder::{create_shader, pipeline_layout, PipelineBuilder};
use crate::renderer::states::{BlendMode, CullMode, DepthMode, DEPTH_FORMAT};
use crate::renderer::uniforms::{CameraBuffer, CameraUniform, DynamicUniforms};
use crate::renderer::vertex::Vertex;
use crate::scene::bounds::{Containment, Frustum};
use crate::scene::instance::ModelInstance;
use crate::scene::model::MaterialProperties;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ObjectUniform {
    pub world: [[f32; 4]; 4],
    pub world_view_proj: [[f32; 4]; 4],
}

impl ObjectUniform {
    pub fn new(world: Mat4, view_proj: Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            world_view_proj: (view_proj * world).to_cols_array_2d(),
        }
    }
}

/// Frustum culling for the geometry pass. An instance whose aggregate box is outside is
/// skipped; one wholly inside draws every mesh untested; otherwise each mesh box is tested.
pub fn plan_geometry(frustum: &Frustum, instances: &mut [&mut ModelInstance]) -> GeometryPlan {
    let mut plan = GeometryPlan::default();
    for (index, instance) in instances.iter_mut().enumerate() {
        let mesh_count = instance.model().mesh_count();
        match frustum.contains_oriented_box(&instance.oriented_box()) {
            Containment::Disjoint => {
                plan.culled_instances += 1;
            }
            Containment::Contains => {
                plan.fully_inside_instances += 1;
                plan.draws
                    .extend((0..mesh_count).map(|mesh| MeshDraw { instance: index, mesh }));
            }
            Containment::Intersects => {
                for mesh in 0..mesh_count {
                    let visible = instance
                        .mesh_oriented_box(mesh)
                        .is_some_and(|b| frustum.contains_oriented_box(&b).is_visible());
                    if visible {
                        plan.draws.push(MeshDraw { instance: index, mesh });
                    } else {
                        plan.culled_meshes += 1;
                    }
                }
            }
        }
    }
    plan
}

struct GeometryResources {
    camera: CameraBuffer,
    material_layout: MaterialLayout,
    fallback_material: MaterialBinding,
    objects: DynamicUniforms<ObjectUniform>,
    pipeline: wgpu::RenderPipeline,
}

/// Draws model instances into the G-buffer.
#[derive(Default)]
pub struct ModelRenderer {
    resources: Option<GeometryResources>,
    /// Dynamic offset per instance for the current frame, `None` when nothing is drawn.
    offsets: Vec<Option<u32>>,
}

impl ModelRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn resources(&self) -> Result<&GeometryResources> {
        self.resources
            .as_ref()
            .ok_or(RenderError::NotCreated("model renderer"))
    }

    /// Layout shared with the content loader so loaded materials bind at group 1.
    pub fn material_layout(&self) -> Result<&MaterialLayout> {
        Ok(&self.resources()?.material_layout)
    }

    /// Writes the camera and one transform slot per instance that has at least one
    /// visible mesh.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        plan: &GeometryPlan,
        instances: &mut [&mut ModelInstance],
        camera: &CameraUniform,
    ) -> Result<()> {
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("model renderer"))?;
        resources.camera.write(queue, camera);
        let view_proj = Mat4::from_cols_array_2d(&camera.view_proj);
        resources.objects.begin_frame();
        self.offsets.clear();
        self.offsets.resize(instances.len(), None);
        for draw in &plan.draws {
            if self.offsets[draw.instance].is_some() {
                continue;
            }
            let world = instances[draw.instance].world();
            let offset = resources.objects.push(&ObjectUniform::new(world, view_proj));
            self.offsets[draw.instance] = Some(offset);
        }
        resources.objects.flush(device, queue);
        Ok(())
    }

    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBuffer,
        plan: &GeometryPlan,
        instances: &[&mut ModelInstance],
        stats: &mut FrameStats,
    ) -> Result<()> {
        let resources = self.resources()?;
        let mut pass = gbuffer.begin_geometry_pass(encoder)?;
        pass.set_pipeline(&resources.pipeline);
        pass.set_bind_group(0, &resources.camera.bind_group, &[]);

        for draw in &plan.draws {
            let Some(offset) = self.offsets.get(draw.instance).copied().flatten() else {
                continue;
            };
            pass.set_bind_group(2, resources.objects.bind_group(), &[offset]);
            let model = instances[draw.instance].model();
            stats.geometry_draws += model.record_mesh(
                &mut pass,
                draw.mesh,
                resources.fallback_material.bind_group(),
                1,
            );
        }
        stats.culled_instances += plan.culled_instances as u32;
        stats.culled_meshes += plan.culled_meshes as u32;
        Ok(())
    }
}

impl DeviceLifecycle for ModelRenderer {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let camera = CameraBuffer::new(device);
        let material_layout = MaterialLayout::new(device, queue);
        let fallback_material = material_layout.create_binding(
            device,
            "Fallback Material",
            &MaterialProperties::default(),
            MaterialTextures::default(),
        );
        let objects = DynamicUniforms::new(
            device,
            "Object Uniforms",
            wgpu::ShaderStages::VERTEX,
            64,
        );
        let shader = create_shader(
            device,
            "Geometry Shader",
            &[
                include_str!("../shader/common.wgsl"),
                include_str!("../shader/geometry.wgsl"),
            ],
        )?;
        let layout = pipeline_layout(
            device,
            "Geometry Pipeline Layout",
            &[
                &camera.bind_layout,
                material_layout.layout(),
                objects.bind_layout(),
            ],
        );
        let mut builder = PipelineBuilder::new(device, &layout, &shader)
            .with_label("Geometry Pipeline")
            .with_vertex_buffer(Vertex::layout())
            .with_cull(CullMode::Back)
            .with_depth(DEPTH_FORMAT, DepthMode::WriteEnabled);
        for format in COLOR_FORMATS {
            builder = builder.with_color_target(format, BlendMode::Opaque);
        }
        let pipeline = builder.build()?;

        self.resources = Some(GeometryResources {
            camera,
            material_layout,
            fallback_material,
            objects,
            pipeline,
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
        self.offsets.clear();
    }
}
