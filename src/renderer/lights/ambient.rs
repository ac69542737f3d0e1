use bytemuck::{Pod, Zeroable};

use super::{AmbientLight, LightCollection, LightFrame, LightRenderer, LightingBindings};
use crate::error::{RenderError, Result};
use crate::renderer::frame::{FrameStats, LightDraw, LightKind, ShadowMapPass};
use crate::renderer::light_buffer::HDR_FORMAT;
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::pipeline_builder::{create_shader, pipeline_layout, PipelineBuilder};
use crate::renderer::states::{BlendMode, CullMode, DepthMode, DEPTH_FORMAT};
use crate::renderer::uniforms::DynamicUniforms;
use crate::scene::camera::CameraView;
use crate::scene::instance::ModelInstance;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct AmbientUniform {
    color: [f32; 3],
    intensity: f32,
}

struct AmbientResources {
    bindings: LightingBindings,
    lights: DynamicUniforms<AmbientUniform>,
    pipeline: wgpu::RenderPipeline,
}

/// Full-screen albedo times ambient color.
#[derive(Default)]
pub struct AmbientLightRenderer {
    lights: LightCollection<AmbientLight>,
    resources: Option<AmbientResources>,
    offsets: Vec<u32>,
}

impl AmbientLightRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, light: AmbientLight) {
        self.lights.add(light, false);
    }

    pub fn lights(&self) -> &LightCollection<AmbientLight> {
        &self.lights
    }
}

impl LightRenderer for AmbientLightRenderer {
    fn kind(&self) -> LightKind {
        LightKind::Ambient
    }

    fn clear(&mut self) {
        self.lights.clear();
    }

    fn plan_shadow_maps(&self, _camera: &CameraView) -> Result<Vec<ShadowMapPass>> {
        Ok(Vec::new())
    }

    fn plan_lights(
        &self,
        _camera: &CameraView,
        _shadow_maps: &[ShadowMapPass],
    ) -> Result<Vec<LightDraw>> {
        Ok(self
            .lights
            .iter()
            .map(|(light, _)| LightDraw {
                kind: LightKind::Ambient,
                light,
                shadow_slot: None,
                volume: None,
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
            .ok_or(RenderError::NotCreated("ambient light renderer"))?;
        resources.bindings.update(frame, "Ambient GBuffer Bind Group");
        resources.lights.begin_frame();
        self.offsets.clear();
        for draw in draws {
            let Some(light) = self.lights.get(draw.light) else {
                continue;
            };
            self.offsets.push(resources.lights.push(&AmbientUniform {
                color: light.color.to_array(),
                intensity: light.intensity,
            }));
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
            .ok_or(RenderError::NotCreated("ambient light renderer"))?;
        pass.set_pipeline(&resources.pipeline);
        resources.bindings.bind(pass)?;
        for (_, offset) in draws.iter().zip(&self.offsets) {
            pass.set_bind_group(2, resources.lights.bind_group(), &[*offset]);
            pass.draw(0..3, 0..1);
            stats.record_light_draw(LightKind::Ambient);
        }
        Ok(())
    }
}

impl DeviceLifecycle for AmbientLightRenderer {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let bindings = LightingBindings::new(device, "Ambient GBuffer Layout");
        let lights = DynamicUniforms::new(
            device,
            "Ambient Light Uniforms",
            wgpu::ShaderStages::FRAGMENT,
            4,
        );
        let shader = create_shader(
            device,
            "Ambient Light Shader",
            &[
                include_str!("../../shader/common.wgsl"),
                include_str!("../../shader/fullscreen.wgsl"),
                include_str!("../../shader/lighting.wgsl"),
                include_str!("../../shader/ambient_light.wgsl"),
            ],
        )?;
        let layout = pipeline_layout(
            device,
            "Ambient Light Pipeline Layout",
            &[
                &bindings.camera.bind_layout,
                &bindings.gbuffer_layout,
                lights.bind_layout(),
            ],
        );
        let pipeline = PipelineBuilder::new(device, &layout, &shader)
            .with_label("Ambient Light Pipeline")
            .with_vertex_entry("vs_fullscreen")
            .with_color_target(HDR_FORMAT, BlendMode::Additive)
            .with_depth(DEPTH_FORMAT, DepthMode::Disabled)
            .with_cull(CullMode::None)
            .build()?;
        self.resources = Some(AmbientResources {
            bindings,
            lights,
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::camera::PerspectiveCamera;
    use glam::Vec3;

    #[test]
    fn every_ambient_light_is_one_full_screen_draw() {
        let mut renderer = AmbientLightRenderer::new();
        renderer.add(AmbientLight {
            color: Vec3::ONE,
            intensity: 0.2,
        });
        renderer.add(AmbientLight {
            color: Vec3::X,
            intensity: 0.1,
        });
        let camera = PerspectiveCamera::default().snapshot();
        let draws = renderer.plan_lights(&camera, &[]).unwrap();
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|d| d.volume.is_none() && d.shadow_slot.is_none()));
    }
}
