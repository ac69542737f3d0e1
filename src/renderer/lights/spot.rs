use bytemuck::{Pod, Zeroable};

use super::point::build_volume_pipeline;
use super::{
    volume_facing, volume_world, LightCollection, LightFrame, LightRenderer, LightVolumeMesh,
    LightingBindings, SpotLight,
};
use crate::error::{RenderError, Result};
use crate::renderer::frame::{FrameStats, LightDraw, LightKind, ShadowMapPass, VolumeFacing};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::pipeline_builder::{create_shader, pipeline_layout};
use crate::renderer::uniforms::DynamicUniforms;
use crate::scene::camera::CameraView;
use crate::scene::instance::ModelInstance;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct SpotUniform {
    world_view_proj: [[f32; 4]; 4],
    position: [f32; 3],
    range: f32,
    direction: [f32; 3],
    cos_inner: f32,
    color: [f32; 3],
    cos_outer: f32,
    intensity: f32,
    _padding: [f32; 3],
}

impl SpotUniform {
    fn new(light: &SpotLight, view_proj: glam::Mat4) -> Self {
        let outer = light.outer_angle.max(0.0);
        let inner = light.inner_angle.clamp(0.0, outer);
        Self {
            world_view_proj: (view_proj * volume_world(light.position, light.range))
                .to_cols_array_2d(),
            position: light.position.to_array(),
            range: light.range,
            direction: light.direction.normalize_or_zero().to_array(),
            cos_inner: inner.cos(),
            color: light.color.to_array(),
            cos_outer: outer.cos(),
            intensity: light.intensity,
            _padding: [0.0; 3],
        }
    }
}

struct SpotResources {
    bindings: LightingBindings,
    volume: LightVolumeMesh,
    lights: DynamicUniforms<SpotUniform>,
    pipelines: [wgpu::RenderPipeline; 2],
}

/// Spot lights bounded by a sphere of `range`, shaded with a cone falloff. Shadows are
/// not supported.
#[derive(Default)]
pub struct SpotLightRenderer {
    lights: LightCollection<SpotLight>,
    resources: Option<SpotResources>,
    offsets: Vec<u32>,
}

impl SpotLightRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, light: SpotLight, casts_shadow: bool) {
        self.lights.add(light, casts_shadow);
    }

    pub fn lights(&self) -> &LightCollection<SpotLight> {
        &self.lights
    }
}

impl LightRenderer for SpotLightRenderer {
    fn kind(&self) -> LightKind {
        LightKind::Spot
    }

    fn clear(&mut self) {
        self.lights.clear();
    }

    fn plan_shadow_maps(&self, _camera: &CameraView) -> Result<Vec<ShadowMapPass>> {
        if !self.lights.shadowed().is_empty() {
            return Err(RenderError::NotImplemented("spot light shadows"));
        }
        Ok(Vec::new())
    }

    fn plan_lights(
        &self,
        camera: &CameraView,
        _shadow_maps: &[ShadowMapPass],
    ) -> Result<Vec<LightDraw>> {
        if !self.lights.shadowed().is_empty() {
            return Err(RenderError::NotImplemented("spot light shadows"));
        }
        Ok(self
            .lights
            .iter()
            .filter_map(|(light, spot)| {
                let facing = volume_facing(spot.position, spot.range, camera)?;
                Some(LightDraw {
                    kind: LightKind::Spot,
                    light,
                    shadow_slot: None,
                    volume: Some(facing),
                })
            })
            .collect())
    }

    fn prepare(
        &mut self,
        frame: &LightFrame<'_>,
        _shadow_maps: &[ShadowMapPass],
        draws: &[LightDraw],
        _casters: &mut [&mut ModelInstance],
    ) -> Result<()> {
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("spot light renderer"))?;
        resources.bindings.update(frame, "Spot GBuffer Bind Group");
        resources.lights.begin_frame();
        self.offsets.clear();
        for draw in draws {
            let Some(light) = self.lights.get(draw.light) else {
                continue;
            };
            self.offsets
                .push(resources.lights.push(&SpotUniform::new(light, frame.camera.view_proj)));
        }
        resources.lights.flush(frame.device, frame.queue);
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
        let resources = self
            .resources
            .as_ref()
            .ok_or(RenderError::NotCreated("spot light renderer"))?;
        resources.bindings.bind(pass)?;
        resources.volume.bind(pass);
        for (draw, offset) in draws.iter().zip(&self.offsets) {
            let pipeline = match draw.volume {
                Some(VolumeFacing::Inside) => &resources.pipelines[1],
                _ => &resources.pipelines[0],
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(2, resources.lights.bind_group(), &[*offset]);
            resources.volume.draw(pass);
            stats.record_light_draw(LightKind::Spot);
        }
        Ok(())
    }
}

impl DeviceLifecycle for SpotLightRenderer {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let bindings = LightingBindings::new(device, "Spot GBuffer Layout");
        let volume = LightVolumeMesh::new(device, "Spot Light Volume");
        let lights = DynamicUniforms::new(
            device,
            "Spot Light Uniforms",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            16,
        );
        let shader = create_shader(
            device,
            "Spot Light Shader",
            &[
                include_str!("../../shader/common.wgsl"),
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/spot_light.wgsl"),
            ],
        )?;
        let layout = pipeline_layout(
            device,
            "Spot Light Pipeline Layout",
            &[
                &bindings.camera.bind_layout,
                &bindings.gbuffer_layout,
                lights.bind_layout(),
            ],
        );
        let pipelines = [
            build_volume_pipeline(
                device,
                &layout,
                &shader,
                "Spot Light Pipeline (outside)",
                "fs_main",
                VolumeFacing::Outside,
            )?,
            build_volume_pipeline(
                device,
                &layout,
                &shader,
                "Spot Light Pipeline (inside)",
                "fs_main",
                VolumeFacing::Inside,
            )?,
        ];
        self.resources = Some(SpotResources {
            bindings,
            volume,
            lights,
            pipelines,
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
    }
}
