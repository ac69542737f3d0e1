use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::{
    shadow_map_bind_group, shadow_map_layout, volume_facing, volume_world, LightCollection,
    LightFrame, LightRenderer, LightVolumeMesh, LightingBindings, PointLight,
};
use crate::error::{RenderError, Result};
use crate::renderer::frame::{FrameStats, LightDraw, LightKind, ShadowMapPass, VolumeFacing};
use crate::renderer::light_buffer::HDR_FORMAT;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::pipeline_builder::{create_shader, pipeline_layout, PipelineBuilder};
use crate::renderer::states::{BlendMode, CullMode, DepthMode, SamplerKind, DEPTH_FORMAT};
use crate::renderer::uniforms::DynamicUniforms;
use crate::renderer::vertex::Vertex;
use crate::scene::bounds::BoundingSphere;
use crate::scene::camera::CameraView;
use crate::scene::instance::ModelInstance;

pub const MAX_POINT_SHADOW_MAPS: usize = 4;
pub const SHADOW_NEAR: f32 = 0.1;
pub const SHADOW_BIAS: f32 = 0.01;

/// Front hemisphere sign, then back.
const HEMISPHERES: [f32; 2] = [1.0, -1.0];

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct PointUniform {
    world_view_proj: [[f32; 4]; 4],
    shadow_view: [[f32; 4]; 4],
    position: [f32; 3],
    radius: f32,
    color: [f32; 3],
    intensity: f32,
    shadow_near: f32,
    shadow_far: f32,
    shadow_bias: f32,
    _padding: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct ParaboloidUniform {
    world_view: [[f32; 4]; 4],
    direction: f32,
    near: f32,
    far: f32,
    _padding: f32,
}

/// View used for both hemispheres of a point light's shadow map.
pub fn shadow_view(light: &PointLight) -> Mat4 {
    Mat4::look_to_rh(light.position, Vec3::X, Vec3::Y)
}

/// Width and height of a point shadow texture; each hemisphere takes a square half.
pub fn shadow_map_extent(size: u32) -> (u32, u32) {
    let size = size.max(2) & !1;
    (size, size / 2)
}

struct ShadowDraw {
    slot: usize,
    instance: usize,
    offsets: [u32; 2],
}

struct ShadowMapSlot {
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

fn facing_index(facing: VolumeFacing) -> usize {
    match facing {
        VolumeFacing::Outside => 0,
        VolumeFacing::Inside => 1,
    }
}

/// Culling and depth test that rasterize a light volume correctly from either side.
pub fn volume_states(facing: VolumeFacing) -> (CullMode, DepthMode) {
    match facing {
        VolumeFacing::Outside => (CullMode::Back, DepthMode::TestOnly),
        VolumeFacing::Inside => (CullMode::Front, DepthMode::Reverse),
    }
}

pub(crate) fn build_volume_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    label: &str,
    fragment_entry: &str,
    facing: VolumeFacing,
) -> Result<wgpu::RenderPipeline> {
    let (cull, depth) = volume_states(facing);
    PipelineBuilder::new(device, layout, shader)
        .with_label(label)
        .with_fragment_entry(fragment_entry)
        .with_vertex_buffer(Vertex::position_layout())
        .with_color_target(HDR_FORMAT, BlendMode::Additive)
        .with_depth(DEPTH_FORMAT, depth)
        .with_cull(cull)
        .build()
}

struct PointResources {
    bindings: LightingBindings,
    volume: LightVolumeMesh,
    lights: DynamicUniforms<PointUniform>,
    casters: DynamicUniforms<ParaboloidUniform>,
    /// Indexed by facing, unshadowed.
    pipelines: [wgpu::RenderPipeline; 2],
    /// Indexed by facing, shadowed.
    shadowed_pipelines: [wgpu::RenderPipeline; 2],
    shadow_pipeline: wgpu::RenderPipeline,
    slots: Vec<ShadowMapSlot>,
}

/// Point lights drawn as sphere proxies, with dual-paraboloid shadows for up to
/// `MAX_POINT_SHADOW_MAPS` lights per frame.
pub struct PointLightRenderer {
    lights: LightCollection<PointLight>,
    shadow_map_size: u32,
    resources: Option<PointResources>,
    offsets: Vec<u32>,
    shadow_draws: Vec<ShadowDraw>,
}

impl PointLightRenderer {
    pub fn new(shadow_map_size: u32) -> Self {
        Self {
            lights: LightCollection::default(),
            shadow_map_size,
            resources: None,
            offsets: Vec::new(),
            shadow_draws: Vec::new(),
        }
    }

    pub fn add(&mut self, light: PointLight, casts_shadow: bool) {
        self.lights.add(light, casts_shadow);
    }

    pub fn lights(&self) -> &LightCollection<PointLight> {
        &self.lights
    }

    fn resources(&self) -> Result<&PointResources> {
        self.resources
            .as_ref()
            .ok_or(RenderError::NotCreated("point light renderer"))
    }

    fn create_slot(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> ShadowMapSlot {
        let (width, height) = shadow_map_extent(self.shadow_map_size);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Point Shadow Map"),
            size: wgpu::Extent3d {
                width,
                height,
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
        let bind_group =
            shadow_map_bind_group(device, layout, &view, sampler, "Point Shadow Bind Group");
        ShadowMapSlot { view, bind_group }
    }
}

impl LightRenderer for PointLightRenderer {
    fn kind(&self) -> LightKind {
        LightKind::Point
    }

    fn clear(&mut self) {
        self.lights.clear();
    }

    /// Slots go to the first `MAX_POINT_SHADOW_MAPS` shadowed lights whose volume is in
    /// view, in registration order. Off-screen shadowed lights never take a slot; the
    /// excess render unshadowed.
    fn plan_shadow_maps(&self, camera: &CameraView) -> Result<Vec<ShadowMapPass>> {
        let visible: Vec<_> = self
            .lights
            .iter()
            .filter(|(light, point)| {
                light.shadowed && volume_facing(point.position, point.radius, camera).is_some()
            })
            .map(|(light, _)| light)
            .collect();
        if visible.len() > MAX_POINT_SHADOW_MAPS {
            log::debug!(
                "{} visible shadowed point lights, {} render unshadowed",
                visible.len(),
                visible.len() - MAX_POINT_SHADOW_MAPS
            );
        }
        Ok(visible
            .into_iter()
            .take(MAX_POINT_SHADOW_MAPS)
            .enumerate()
            .map(|(slot, light)| ShadowMapPass {
                kind: LightKind::Point,
                light,
                slot,
            })
            .collect())
    }

    fn plan_lights(
        &self,
        camera: &CameraView,
        shadow_maps: &[ShadowMapPass],
    ) -> Result<Vec<LightDraw>> {
        Ok(self
            .lights
            .iter()
            .filter_map(|(light, point)| {
                let facing = volume_facing(point.position, point.radius, camera)?;
                Some(LightDraw {
                    kind: LightKind::Point,
                    light,
                    shadow_slot: shadow_maps
                        .iter()
                        .find(|pass| pass.light == light)
                        .map(|pass| pass.slot),
                    volume: Some(facing),
                })
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
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("point light renderer"))?;
        resources.bindings.update(frame, "Point GBuffer Bind Group");

        resources.casters.begin_frame();
        self.shadow_draws.clear();
        for pass in shadow_maps {
            let Some(light) = self.lights.get(pass.light) else {
                continue;
            };
            let view = shadow_view(light);
            let reach = BoundingSphere::new(light.position, light.radius);
            for (instance, caster) in casters.iter_mut().enumerate() {
                if !caster.axis_aligned_box().intersects_sphere(&reach) {
                    continue;
                }
                let world_view = (view * caster.world()).to_cols_array_2d();
                let offsets = HEMISPHERES.map(|direction| {
                    resources.casters.push(&ParaboloidUniform {
                        world_view,
                        direction,
                        near: SHADOW_NEAR,
                        far: light.radius.max(SHADOW_NEAR * 2.0),
                        _padding: 0.0,
                    })
                });
                self.shadow_draws.push(ShadowDraw {
                    slot: pass.slot,
                    instance,
                    offsets,
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
            let world = volume_world(light.position, light.radius);
            self.offsets.push(resources.lights.push(&PointUniform {
                world_view_proj: (frame.camera.view_proj * world).to_cols_array_2d(),
                shadow_view: shadow_view(light).to_cols_array_2d(),
                position: light.position.to_array(),
                radius: light.radius,
                color: light.color.to_array(),
                intensity: light.intensity,
                shadow_near: SHADOW_NEAR,
                shadow_far: light.radius.max(SHADOW_NEAR * 2.0),
                shadow_bias: SHADOW_BIAS,
                _padding: 0.0,
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
        let (width, height) = shadow_map_extent(self.shadow_map_size);
        let half = (width / 2) as f32;
        for shadow_map in shadow_maps {
            let slot = resources
                .slots
                .get(shadow_map.slot)
                .ok_or(RenderError::NotCreated("point shadow map"))?;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Point Shadow Pass"),
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
            stats.record_shadow_target_bind(LightKind::Point);
            pass.set_pipeline(&resources.shadow_pipeline);
            for hemisphere in 0..HEMISPHERES.len() {
                pass.set_viewport(half * hemisphere as f32, 0.0, half, height as f32, 0.0, 1.0);
                for draw in self.shadow_draws.iter().filter(|d| d.slot == shadow_map.slot) {
                    let Some(caster) = casters.get(draw.instance) else {
                        continue;
                    };
                    pass.set_bind_group(
                        0,
                        resources.casters.bind_group(),
                        &[draw.offsets[hemisphere]],
                    );
                    for mesh in caster.model().meshes() {
                        stats.shadow_draws += mesh.record_geometry(&mut pass);
                    }
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
        resources.volume.bind(pass);
        for (draw, offset) in draws.iter().zip(&self.offsets) {
            let facing = facing_index(draw.volume.unwrap_or(VolumeFacing::Outside));
            match draw.shadow_slot.and_then(|slot| resources.slots.get(slot)) {
                Some(slot) => {
                    pass.set_pipeline(&resources.shadowed_pipelines[facing]);
                    pass.set_bind_group(3, &slot.bind_group, &[]);
                }
                None => pass.set_pipeline(&resources.pipelines[facing]),
            }
            pass.set_bind_group(2, resources.lights.bind_group(), &[*offset]);
            resources.volume.draw(pass);
            stats.record_light_draw(LightKind::Point);
        }
        Ok(())
    }
}

impl DeviceLifecycle for PointLightRenderer {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let bindings = LightingBindings::new(device, "Point GBuffer Layout");
        let volume = LightVolumeMesh::new(device, "Point Light Volume");
        let lights = DynamicUniforms::new(
            device,
            "Point Light Uniforms",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            16,
        );
        let casters = DynamicUniforms::new(
            device,
            "Paraboloid Shadow Casters",
            wgpu::ShaderStages::VERTEX,
            64,
        );
        let shadow_layout = shadow_map_layout(device, "Point Shadow Layout");
        let sampler = device.create_sampler(&SamplerKind::ShadowCompare.descriptor());

        let shader = create_shader(
            device,
            "Point Light Shader",
            &[
                include_str!("../../shader/common.wgsl"),
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/point_light.wgsl"),
                include_str!("../../shader/point_shadowed.wgsl"),
            ],
        )?;
        let layout = pipeline_layout(
            device,
            "Point Light Pipeline Layout",
            &[
                &bindings.camera.bind_layout,
                &bindings.gbuffer_layout,
                lights.bind_layout(),
            ],
        );
        let shadowed_layout = pipeline_layout(
            device,
            "Point Shadowed Light Pipeline Layout",
            &[
                &bindings.camera.bind_layout,
                &bindings.gbuffer_layout,
                lights.bind_layout(),
                &shadow_layout,
            ],
        );
        let pipelines = [
            build_volume_pipeline(
                device,
                &layout,
                &shader,
                "Point Light Pipeline (outside)",
                "fs_main",
                VolumeFacing::Outside,
            )?,
            build_volume_pipeline(
                device,
                &layout,
                &shader,
                "Point Light Pipeline (inside)",
                "fs_main",
                VolumeFacing::Inside,
            )?,
        ];
        let shadowed_pipelines = [
            build_volume_pipeline(
                device,
                &shadowed_layout,
                &shader,
                "Point Shadowed Light Pipeline (outside)",
                "fs_shadowed",
                VolumeFacing::Outside,
            )?,
            build_volume_pipeline(
                device,
                &shadowed_layout,
                &shader,
                "Point Shadowed Light Pipeline (inside)",
                "fs_shadowed",
                VolumeFacing::Inside,
            )?,
        ];

        let paraboloid_shader = create_shader(
            device,
            "Paraboloid Shadow Shader",
            &[include_str!("../../shader/paraboloid_shadow.wgsl")],
        )?;
        let paraboloid_layout = pipeline_layout(
            device,
            "Paraboloid Shadow Pipeline Layout",
            &[casters.bind_layout()],
        );
        // No color targets; the fragment stage only discards the far hemisphere.
        let shadow_pipeline = PipelineBuilder::new(device, &paraboloid_layout, &paraboloid_shader)
            .with_label("Paraboloid Shadow Pipeline")
            .with_vertex_buffer(Vertex::position_layout())
            .with_depth(DEPTH_FORMAT, DepthMode::WriteEnabled)
            .with_cull(CullMode::None)
            .build()?;

        let slots = (0..MAX_POINT_SHADOW_MAPS)
            .map(|_| self.create_slot(device, &shadow_layout, &sampler))
            .collect();
        let (width, height) = shadow_map_extent(self.shadow_map_size);
        log::info!(
            "Point shadow maps: {} x {}x{}",
            MAX_POINT_SHADOW_MAPS,
            width,
            height
        );

        self.resources = Some(PointResources {
            bindings,
            volume,
            lights,
            casters,
            pipelines,
            shadowed_pipelines,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::camera::PerspectiveCamera;

    fn light_at(position: Vec3) -> PointLight {
        PointLight {
            position,
            radius: 3.0,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }

    #[test]
    fn shadow_texture_is_two_square_hemispheres() {
        assert_eq!(shadow_map_extent(1024), (1024, 512));
        assert_eq!(shadow_map_extent(513), (512, 256));
    }

    #[test]
    fn unshadowed_lights_are_drawn_first() {
        let mut renderer = PointLightRenderer::new(512);
        renderer.add(light_at(Vec3::new(0.0, 0.0, -5.0)), true);
        renderer.add(light_at(Vec3::new(1.0, 0.0, -5.0)), false);
        let camera = PerspectiveCamera::default().snapshot();
        let passes = renderer.plan_shadow_maps(&camera).unwrap();
        let draws = renderer.plan_lights(&camera, &passes).unwrap();
        assert_eq!(draws.len(), 2);
        assert!(!draws[0].light.shadowed && draws[0].shadow_slot.is_none());
        assert!(draws[1].light.shadowed && draws[1].shadow_slot == Some(0));
    }

    #[test]
    fn shadow_slots_are_capped() {
        let mut renderer = PointLightRenderer::new(512);
        for i in 0..MAX_POINT_SHADOW_MAPS + 2 {
            renderer.add(light_at(Vec3::new(i as f32, 0.0, -6.0)), true);
        }
        let camera = PerspectiveCamera::default().snapshot();
        let passes = renderer.plan_shadow_maps(&camera).unwrap();
        assert_eq!(passes.len(), MAX_POINT_SHADOW_MAPS);
        let draws = renderer.plan_lights(&camera, &passes).unwrap();
        assert_eq!(draws.len(), MAX_POINT_SHADOW_MAPS + 2);
        assert_eq!(
            draws.iter().filter(|d| d.shadow_slot.is_none()).count(),
            2
        );
    }

    #[test]
    fn invisible_shadowed_light_gets_no_shadow_map() {
        let mut renderer = PointLightRenderer::new(512);
        renderer.add(light_at(Vec3::new(0.0, 2.0, 40.0)), true);
        let camera = PerspectiveCamera::default().snapshot();
        assert!(renderer.plan_shadow_maps(&camera).unwrap().is_empty());
        assert!(renderer.plan_lights(&camera, &[]).unwrap().is_empty());
    }

    #[test]
    fn inside_volume_flips_culling_and_depth() {
        assert_eq!(
            volume_states(VolumeFacing::Inside),
            (CullMode::Front, DepthMode::Reverse)
        );
        assert_eq!(
            volume_states(VolumeFacing::Outside),
            (CullMode::Back, DepthMode::TestOnly)
        );
    }
}
