use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::{
    shadow_map_bind_group, shadow_map_layout, DirectionalLight, LightCollection, LightFrame,
    LightRenderer, LightingBindings,
};
use crate::error::{RenderError, Result};
use crate::renderer::frame::{FrameStats, LightDraw, LightKind, ShadowMapPass};
use crate::renderer::light_buffer::HDR_FORMAT;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::pipeline_builder::{create_shader, pipeline_layout, PipelineBuilder};
use crate::renderer::states::{BlendMode, CullMode, DepthMode, SamplerKind, DEPTH_FORMAT};
use crate::renderer::uniforms::DynamicUniforms;
use crate::renderer::vertex::Vertex;
use crate::scene::bounds::{Aabb, Frustum};
use crate::scene::camera::CameraView;
use crate::scene::instance::ModelInstance;

pub const MAX_DIRECTIONAL_SHADOW_MAPS: usize = 2;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct DirectionalUniform {
    direction: [f32; 3],
    intensity: f32,
    color: [f32; 3],
    shadowed: f32,
    light_view_proj: [[f32; 4]; 4],
    shadow_texel: f32,
    _padding: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct ShadowCasterUniform {
    world_light_view_proj: [[f32; 4]; 4],
}

/// Orthographic light transform whose volume encloses `bounds` as seen along `direction`
/// (pointing toward the light).
pub fn fit_shadow_projection(direction: Vec3, bounds: &Aabb) -> Mat4 {
    let to_light = direction.try_normalize().unwrap_or(Vec3::Y);
    let sphere = bounds.bounding_sphere();
    let radius = sphere.radius.max(1e-3);
    let eye = sphere.center + to_light * radius * 2.0;
    let up = if to_light.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_at_rh(eye, sphere.center, up);
    let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, radius * 0.5, radius * 3.5);
    proj * view
}

struct ShadowDraw {
    slot: usize,
    instance: usize,
    offset: u32,
}

struct ShadowMapSlot {
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

struct DirectionalResources {
    bindings: LightingBindings,
    lights: DynamicUniforms<DirectionalUniform>,
    casters: DynamicUniforms<ShadowCasterUniform>,
    pipeline: wgpu::RenderPipeline,
    shadowed_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    slots: Vec<ShadowMapSlot>,
}

/// Full-screen Blinn-Phong for directional lights, with optional orthographic shadow maps.
pub struct DirectionalLightRenderer {
    lights: LightCollection<DirectionalLight>,
    shadow_map_size: u32,
    resources: Option<DirectionalResources>,
    offsets: Vec<u32>,
    shadow_draws: Vec<ShadowDraw>,
}

impl DirectionalLightRenderer {
    pub fn new(shadow_map_size: u32) -> Self {
        Self {
            lights: LightCollection::default(),
            shadow_map_size: shadow_map_size.max(1),
            resources: None,
            offsets: Vec::new(),
            shadow_draws: Vec::new(),
        }
    }

    pub fn add(&mut self, light: DirectionalLight, casts_shadow: bool) {
        self.lights.add(light, casts_shadow);
    }

    pub fn lights(&self) -> &LightCollection<DirectionalLight> {
        &self.lights
    }

    pub fn shadow_map_size(&self) -> u32 {
        self.shadow_map_size
    }

    fn resources(&self) -> Result<&DirectionalResources> {
        self.resources
            .as_ref()
            .ok_or(RenderError::NotCreated("directional light renderer"))
    }

    fn create_slot(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> ShadowMapSlot {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Directional Shadow Map"),
            size: wgpu::Extent3d {
                width: self.shadow_map_size,
                height: self.shadow_map_size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = shadow_map_bind_group(
            device,
            layout,
            &view,
            sampler,
            "Directional Shadow Bind Group",
        );
        ShadowMapSlot { view, bind_group }
    }
}

impl LightRenderer for DirectionalLightRenderer {
    fn kind(&self) -> LightKind {
        LightKind::Directional
    }

    fn clear(&mut self) {
        self.lights.clear();
    }

    fn plan_shadow_maps(&self, _camera: &CameraView) -> Result<Vec<ShadowMapPass>> {
        let shadowed = self.lights.shadowed().len();
        if shadowed > MAX_DIRECTIONAL_SHADOW_MAPS {
            log::debug!(
                "{} shadowed directional lights, {} render unshadowed",
                shadowed,
                shadowed - MAX_DIRECTIONAL_SHADOW_MAPS
            );
        }
        Ok(self
            .lights
            .iter()
            .filter(|(light, _)| light.shadowed)
            .take(MAX_DIRECTIONAL_SHADOW_MAPS)
            .enumerate()
            .map(|(slot, (light, _))| ShadowMapPass {
                kind: LightKind::Directional,
                light,
                slot,
            })
            .collect())
    }

    fn plan_lights(
        &self,
        _camera: &CameraView,
        shadow_maps: &[ShadowMapPass],
    ) -> Result<Vec<LightDraw>> {
        Ok(self
            .lights
            .iter()
            .map(|(light, _)| LightDraw {
                kind: LightKind::Directional,
                light,
                shadow_slot: shadow_maps
                    .iter()
                    .find(|pass| pass.light == light)
                    .map(|pass| pass.slot),
                volume: None,
            })
            .collect())
    }

    fn prepare(
        &mut self,
        frame: &LightFrame<'_>,
        shadow_maps: &[ShadowMapPass],
        draws: &[LightDraw],
        casters: &mut [&mut ModelInstance],
    ) -> Result<()> {
        let texel = 1.0 / self.shadow_map_size as f32;
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("directional light renderer"))?;
        resources.bindings.update(frame, "Directional GBuffer Bind Group");

        let mut slot_matrices = [Mat4::IDENTITY; MAX_DIRECTIONAL_SHADOW_MAPS];
        resources.casters.begin_frame();
        self.shadow_draws.clear();
        for pass in shadow_maps {
            let (Some(light), Some(bounds)) = (self.lights.get(pass.light), frame.scene_bounds)
            else {
                continue;
            };
            let light_view_proj = fit_shadow_projection(light.direction, &bounds);
            if let Some(matrix) = slot_matrices.get_mut(pass.slot) {
                *matrix = light_view_proj;
            }
            let frustum = Frustum::from_view_projection(light_view_proj);
            for (instance, caster) in casters.iter_mut().enumerate() {
                if !frustum.contains_aabb(&caster.axis_aligned_box()).is_visible() {
                    continue;
                }
                let offset = resources.casters.push(&ShadowCasterUniform {
                    world_light_view_proj: (light_view_proj * caster.world()).to_cols_array_2d(),
                });
                self.shadow_draws.push(ShadowDraw {
                    slot: pass.slot,
                    instance,
                    offset,
                });
            }
        }
        resources.casters.flush(frame.device, frame.queue);

        resources.lights.begin_frame();
        self.offsets.clear();
        for draw in draws {
            let Some(light) = self.lights.get(draw.light) else {
                continue;
            };
            let light_view_proj = draw
                .shadow_slot
                .and_then(|slot| slot_matrices.get(slot).copied())
                .unwrap_or(Mat4::IDENTITY);
            self.offsets.push(resources.lights.push(&DirectionalUniform {
                direction: light.direction.normalize_or_zero().to_array(),
                intensity: light.intensity,
                color: light.color.to_array(),
                shadowed: if draw.shadow_slot.is_some() { 1.0 } else { 0.0 },
                light_view_proj: light_view_proj.to_cols_array_2d(),
                shadow_texel: texel,
                _padding: [0.0; 3],
            }));
        }
        resources.lights.flush(frame.device, frame.queue);
        Ok(())
    }

    fn render_shadow_maps(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        shadow_maps: &[ShadowMapPass],
        casters: &[&mut ModelInstance],
        stats: &mut FrameStats,
    ) -> Result<()> {
        if shadow_maps.is_empty() {
            return Ok(());
        }
        let resources = self.resources()?;
        for shadow_map in shadow_maps {
            let slot = resources
                .slots
                .get(shadow_map.slot)
                .ok_or(RenderError::NotCreated("directional shadow map"))?;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Directional Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &slot.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            stats.record_shadow_target_bind(LightKind::Directional);
            pass.set_pipeline(&resources.shadow_pipeline);
            for draw in self.shadow_draws.iter().filter(|d| d.slot == shadow_map.slot) {
                let Some(caster) = casters.get(draw.instance) else {
                    continue;
                };
                pass.set_bind_group(0, resources.casters.bind_group(), &[draw.offset]);
                for mesh in caster.model().meshes() {
                    stats.shadow_draws += mesh.record_geometry(&mut pass);
                }
            }
        }
        Ok(())
    }

    fn render_lights(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        draws: &[LightDraw],
        stats: &mut FrameStats,
    ) -> Result<()> {
        if draws.is_empty() {
            return Ok(());
        }
        let resources = self.resources()?;
        resources.bindings.bind(pass)?;
        for (draw, offset) in draws.iter().zip(&self.offsets) {
            match draw.shadow_slot.and_then(|slot| resources.slots.get(slot)) {
                Some(slot) => {
                    pass.set_pipeline(&resources.shadowed_pipeline);
                    pass.set_bind_group(3, &slot.bind_group, &[]);
                }
                None => pass.set_pipeline(&resources.pipeline),
            }
            pass.set_bind_group(2, resources.lights.bind_group(), &[*offset]);
            pass.draw(0..3, 0..1);
            stats.record_light_draw(LightKind::Directional);
        }
        Ok(())
    }
}

impl DeviceLifecycle for DirectionalLightRenderer {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let bindings = LightingBindings::new(device, "Directional GBuffer Layout");
        let lights = DynamicUniforms::new(
            device,
            "Directional Light Uniforms",
            wgpu::ShaderStages::FRAGMENT,
            4,
        );
        let casters = DynamicUniforms::new(
            device,
            "Directional Shadow Casters",
            wgpu::ShaderStages::VERTEX,
            64,
        );
        let shadow_layout = shadow_map_layout(device, "Directional Shadow Layout");
        let sampler = device.create_sampler(&SamplerKind::ShadowCompare.descriptor());

        let shader = create_shader(
            device,
            "Directional Light Shader",
            &[
                include_str!("../../shader/common.wgsl"),
                include_str!("../../shader/fullscreen.wgsl"),
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/directional_light.wgsl"),
                include_str!("../../shader/directional_shadowed.wgsl"),
            ],
        )?;
        let layout = pipeline_layout(
            device,
            "Directional Light Pipeline Layout",
            &[
                &bindings.camera.bind_layout,
                &bindings.gbuffer_layout,
                lights.bind_layout(),
            ],
        );
        let shadowed_layout = pipeline_layout(
            device,
            "Directional Shadowed Light Pipeline Layout",
            &[
                &bindings.camera.bind_layout,
                &bindings.gbuffer_layout,
                lights.bind_layout(),
                &shadow_layout,
            ],
        );
        let pipeline = PipelineBuilder::new(device, &layout, &shader)
            .with_label("Directional Light Pipeline")
            .with_vertex_entry("vs_fullscreen")
            .with_color_target(HDR_FORMAT, BlendMode::Additive)
            .with_depth(DEPTH_FORMAT, DepthMode::Disabled)
            .with_cull(CullMode::None)
            .build()?;
        let shadowed_pipeline = PipelineBuilder::new(device, &shadowed_layout, &shader)
            .with_label("Directional Shadowed Light Pipeline")
            .with_vertex_entry("vs_fullscreen")
            .with_fragment_entry("fs_shadowed")
            .with_color_target(HDR_FORMAT, BlendMode::Additive)
            .with_depth(DEPTH_FORMAT, DepthMode::Disabled)
            .with_cull(CullMode::None)
            .build()?;

        let depth_shader = create_shader(
            device,
            "Directional Shadow Shader",
            &[include_str!("../../shader/shadow_depth.wgsl")],
        )?;
        let depth_layout = pipeline_layout(
            device,
            "Directional Shadow Pipeline Layout",
            &[casters.bind_layout()],
        );
        let shadow_pipeline = PipelineBuilder::new(device, &depth_layout, &depth_shader)
            .with_label("Directional Shadow Pipeline")
            .with_vertex_buffer(Vertex::position_layout())
            .without_fragment()
            .with_depth_biased(DEPTH_FORMAT, DepthMode::WriteEnabled, 2, 2.0)
            .with_cull(CullMode::None)
            .build()?;

        let slots = (0..MAX_DIRECTIONAL_SHADOW_MAPS)
            .map(|_| self.create_slot(device, &shadow_layout, &sampler))
            .collect();
        log::info!(
            "Directional shadow maps: {} x {}px",
            MAX_DIRECTIONAL_SHADOW_MAPS,
            self.shadow_map_size
        );

        self.resources = Some(DirectionalResources {
            bindings,
            lights,
            casters,
            pipeline,
            shadowed_pipeline,
            shadow_pipeline,
            slots,
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
        self.shadow_draws.clear();
    }
}
