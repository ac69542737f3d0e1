//! Frame orchestration: geometry pass, shadow maps, light accumulation, then the
//! post-process chain.

use glam::Vec2;

use crate::error::{RenderError, Result};
use crate::renderer::bounds_renderer::{visible_instances, BoundsRenderer};
use crate::renderer::frame::{chain_targets, FramePlan, FrameStats, LightKind, PostProcessStep};
use crate::renderer::gbuffer::GBuffer;
use crate::renderer::light_buffer::{ChainTarget, LightBuffer, HDR_FORMAT};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle, TargetDesc};
use crate::renderer::lights::{
    AmbientLightRenderer, DirectionalLightRenderer, Light, LightFrame, LightRenderer,
    PointLightRenderer, SpotLightRenderer,
};
use crate::renderer::material::MaterialLayout;
use crate::renderer::model_renderer::{plan_geometry, ModelRenderer};
use crate::renderer::postprocess::{CopyPass, PostProcess, PostProcessContext};
use crate::renderer::states::SamplerPool;
use crate::renderer::uniforms::CameraUniform;
use crate::scene::camera::CameraView;
use crate::scene::instance::ModelInstance;
use crate::settings::RenderSettings;

/// Owns the G-buffer, the light buffer and one renderer per light type.
pub struct DeferredRenderer {
    samplers: SamplerPool,
    gbuffer: GBuffer,
    light_buffer: LightBuffer,
    model_renderer: ModelRenderer,
    ambient: AmbientLightRenderer,
    directional: DirectionalLightRenderer,
    point: PointLightRenderer,
    spot: SpotLightRenderer,
    bounds: BoundsRenderer,
    copy: Option<CopyPass>,
    back_buffer: Option<BackBufferDesc>,
}

impl DeferredRenderer {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            samplers: SamplerPool::new(),
            gbuffer: GBuffer::new(),
            light_buffer: LightBuffer::new(),
            model_renderer: ModelRenderer::new(),
            ambient: AmbientLightRenderer::new(),
            directional: DirectionalLightRenderer::new(settings.directional_shadow_map_size),
            point: PointLightRenderer::new(settings.point_shadow_map_size),
            spot: SpotLightRenderer::new(),
            bounds: BoundsRenderer::new(),
            copy: None,
            back_buffer: None,
        }
    }

    /// Every back-buffer sized target the renderer creates on resize.
    pub fn target_descriptors(back_buffer: &BackBufferDesc) -> Vec<TargetDesc> {
        let mut descs = GBuffer::target_descriptors(back_buffer).to_vec();
        descs.extend(LightBuffer::target_descriptors(back_buffer));
        descs
    }

    /// Descriptors of the targets currently alive, `None` outside resize/releasing.
    pub fn descriptors(&self) -> Option<Vec<TargetDesc>> {
        let mut descs = self.gbuffer.descriptors()?.to_vec();
        descs.extend(self.light_buffer.descriptors()?);
        Some(descs)
    }

    pub fn back_buffer(&self) -> Option<BackBufferDesc> {
        self.back_buffer
    }

    pub fn material_layout(&self) -> Result<&MaterialLayout> {
        self.model_renderer.material_layout()
    }

    /// Wireframe oriented and axis-aligned boxes of every visible instance.
    pub fn set_draw_bounding_objects(&mut self, enabled: bool) {
        self.bounds.set_enabled(enabled);
    }

    pub fn draws_bounding_objects(&self) -> bool {
        self.bounds.is_enabled()
    }

    /// Starts a frame. Lights registered for the previous frame are dropped.
    pub fn begin<'f>(&mut self) -> Frame<'_, 'f> {
        for renderer in self.light_renderers_mut() {
            renderer.clear();
        }
        Frame {
            renderer: self,
            models: Vec::new(),
            post_processes: Vec::new(),
        }
    }

    fn light_renderers(&self) -> [&dyn LightRenderer; 4] {
        [&self.ambient, &self.directional, &self.point, &self.spot]
    }

    fn light_renderers_mut(&mut self) -> [&mut dyn LightRenderer; 4] {
        [
            &mut self.ambient,
            &mut self.directional,
            &mut self.point,
            &mut self.spot,
        ]
    }
}

impl DeviceLifecycle for DeferredRenderer {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        self.samplers.on_create_device(device, queue, back_buffer)?;
        self.gbuffer.on_create_device(device, queue, back_buffer)?;
        self.light_buffer.on_create_device(device, queue, back_buffer)?;
        self.model_renderer
            .on_create_device(device, queue, back_buffer)?;
        for renderer in self.light_renderers_mut() {
            renderer.on_create_device(device, queue, back_buffer)?;
        }
        self.bounds.on_create_device(device, queue, back_buffer)?;
        self.copy = Some(CopyPass::new(device)?);
        log::info!("Deferred renderer created");
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        self.samplers
            .on_resized_swap_chain(device, queue, back_buffer)?;
        self.gbuffer
            .on_resized_swap_chain(device, queue, back_buffer)?;
        self.light_buffer
            .on_resized_swap_chain(device, queue, back_buffer)?;
        self.model_renderer
            .on_resized_swap_chain(device, queue, back_buffer)?;
        for renderer in self.light_renderers_mut() {
            renderer.on_resized_swap_chain(device, queue, back_buffer)?;
        }
        self.bounds
            .on_resized_swap_chain(device, queue, back_buffer)?;
        self.back_buffer = Some(*back_buffer);
        log::info!(
            "Deferred targets resized to {}x{}",
            back_buffer.width,
            back_buffer.height
        );
        Ok(())
    }

    fn on_releasing_swap_chain(&mut self) {
        self.samplers.on_releasing_swap_chain();
        self.gbuffer.on_releasing_swap_chain();
        self.light_buffer.on_releasing_swap_chain();
        self.model_renderer.on_releasing_swap_chain();
        for renderer in self.light_renderers_mut() {
            renderer.on_releasing_swap_chain();
        }
        self.bounds.on_releasing_swap_chain();
        self.back_buffer = None;
    }

    fn on_destroy_device(&mut self) {
        self.samplers.on_destroy_device();
        self.gbuffer.on_destroy_device();
        self.light_buffer.on_destroy_device();
        self.model_renderer.on_destroy_device();
        for renderer in self.light_renderers_mut() {
            renderer.on_destroy_device();
        }
        self.bounds.on_destroy_device();
        self.copy = None;
        self.back_buffer = None;
    }
}

/// One frame's registrations. Post-processes run in the order they were added.
pub struct Frame<'r, 'f> {
    renderer: &'r mut DeferredRenderer,
    models: Vec<&'f mut ModelInstance>,
    post_processes: Vec<&'f mut dyn PostProcess>,
}

impl<'f> Frame<'_, 'f> {
    pub fn add_model(&mut self, instance: &'f mut ModelInstance) {
        self.models.push(instance);
    }

    /// Ambient lights never cast shadows; the flag is ignored for them.
    pub fn add_light(&mut self, light: Light, casts_shadow: bool) {
        match light {
            Light::Ambient(ambient) => self.renderer.ambient.add(ambient),
            Light::Directional(directional) => {
                self.renderer.directional.add(directional, casts_shadow)
            }
            Light::Point(point) => self.renderer.point.add(point, casts_shadow),
            Light::Spot(spot) => self.renderer.spot.add(spot, casts_shadow),
        }
    }

    pub fn add_post_process(&mut self, stage: &'f mut dyn PostProcess) {
        self.post_processes.push(stage);
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Decides every pass of the frame without touching the GPU.
    pub fn plan(&mut self, camera: &CameraView) -> Result<FramePlan> {
        let geometry = plan_geometry(&camera.frustum, &mut self.models);

        let renderers = self.renderer.light_renderers();
        let mut shadow_maps = Vec::new();
        for renderer in renderers {
            shadow_maps.extend(renderer.plan_shadow_maps(camera)?);
        }

        let mut lights = Vec::new();
        for renderer in renderers {
            let kind = renderer.kind();
            let own: Vec<_> = shadow_maps
                .iter()
                .filter(|pass| pass.kind == kind)
                .copied()
                .collect();
            lights.extend(renderer.plan_lights(camera, &own)?);
        }

        let post_processes = chain_targets(self.post_processes.len())
            .into_iter()
            .zip(&self.post_processes)
            .map(|((source, destination), stage)| PostProcessStep {
                name: stage.name(),
                source,
                destination,
                additive: stage.is_additive(),
            })
            .collect();

        let bounding_boxes = if self.renderer.bounds.is_enabled() {
            visible_instances(&geometry)
        } else {
            Vec::new()
        };

        Ok(FramePlan {
            geometry,
            shadow_maps,
            lights,
            bounding_boxes,
            post_processes,
        })
    }

    /// Records and submits the whole frame into `target`, following `plan` pass for pass:
    /// the returned stats count exactly the shadow maps, light draws and post passes it lists.
    pub fn end(
        mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        camera: &CameraView,
    ) -> Result<FrameStats> {
        let plan = self.plan(camera)?;
        let Frame {
            renderer,
            mut models,
            mut post_processes,
        } = self;
        let back_buffer = renderer
            .back_buffer
            .ok_or(RenderError::NotCreated("deferred renderer targets"))?;
        let camera_uniform = CameraUniform::new(
            camera,
            Vec2::new(back_buffer.width as f32, back_buffer.height as f32),
        );

        let DeferredRenderer {
            samplers,
            gbuffer,
            light_buffer,
            model_renderer,
            ambient,
            directional,
            point,
            spot,
            bounds,
            copy,
            ..
        } = renderer;
        let copy = copy.as_mut().ok_or(RenderError::NotCreated("copy pass"))?;

        model_renderer.prepare(device, queue, &plan.geometry, &mut models, &camera_uniform)?;

        let scene_bounds = models
            .iter_mut()
            .map(|instance| instance.axis_aligned_box())
            .reduce(|a, b| a.union(&b));
        let gbuffer_views = gbuffer.views()?;
        let light_frame = LightFrame {
            device,
            queue,
            camera,
            camera_uniform: &camera_uniform,
            gbuffer: gbuffer_views,
            scene_bounds,
        };
        let mut light_renderers: [&mut dyn LightRenderer; 4] = [ambient, directional, point, spot];
        for renderer in light_renderers.iter_mut() {
            let kind = renderer.kind();
            renderer.prepare(
                &light_frame,
                &plan.shadow_maps_of(kind),
                &plan.lights_of(kind),
                &mut models,
            )?;
        }

        bounds.prepare(device, queue, &plan.bounding_boxes, &mut models, &camera_uniform)?;

        let mut stats = FrameStats::default();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Deferred Frame Encoder"),
        });

        model_renderer.render(&mut encoder, gbuffer, &plan.geometry, &models, &mut stats)?;

        for (kind, shadow_maps) in plan.shadow_map_batches() {
            if let Some(renderer) = light_renderers.iter().find(|r| r.kind() == kind) {
                renderer.render_shadow_maps(&mut encoder, &shadow_maps, &models, &mut stats)?;
            }
        }
        for kind in LightKind::ALL {
            debug_assert_eq!(
                stats.shadow_target_binds(kind) as usize,
                plan.shadow_map_passes(kind)
            );
        }

        {
            let mut pass =
                light_buffer.begin_light_pass(&mut encoder, gbuffer.depth_stencil_view()?)?;
            for renderer in light_renderers.iter() {
                let draws = plan.lights_of(renderer.kind());
                if draws.is_empty() {
                    continue;
                }
                renderer.render_lights(&mut pass, &draws, &mut stats)?;
            }
            bounds.render(&mut pass, &mut stats)?;
        }

        if plan.needs_present_copy() {
            let lit = light_buffer.view(ChainTarget::LightBuffer)?;
            copy.copy(device, &mut encoder, lit, target, target_format)?;
        }

        for (step, stage) in plan.post_processes.iter().zip(post_processes.iter_mut()) {
            let input = light_buffer.view(step.source)?;
            let (output, output_format) = match step.destination {
                ChainTarget::BackBuffer => (target, target_format),
                intermediate => (light_buffer.view(intermediate)?, HDR_FORMAT),
            };
            if step.additive {
                copy.copy(device, &mut encoder, input, output, output_format)?;
            }
            let mut ctx = PostProcessContext {
                device,
                queue,
                encoder: &mut encoder,
                camera,
                camera_uniform: &camera_uniform,
                gbuffer: gbuffer_views,
                samplers: &*samplers,
                back_buffer,
            };
            stage.render(&mut ctx, input, output, output_format)?;
            stats.post_process_passes += 1;
        }

        queue.submit(Some(encoder.finish()));

        log::debug!(
            "frame: {} geometry draws, {} culled instances, {} light draws, {} shadow draws, {} post passes",
            stats.geometry_draws,
            stats.culled_instances,
            stats.total_light_draws(),
            stats.shadow_draws,
            stats.post_process_passes
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::renderer::lights::{AmbientLight, DirectionalLight, PointLight, SpotLight};
    use crate::renderer::postprocess::{AntiAliasPostProcess, UiPostProcess};
    use crate::scene::bounds::Aabb;
    use crate::scene::camera::PerspectiveCamera;
    use crate::scene::model::{Material, MaterialProperties, Mesh, MeshPart, Model};

    fn camera() -> CameraView {
        PerspectiveCamera::default().snapshot()
    }

    fn point_at(position: Vec3) -> Light {
        Light::Point(PointLight {
            position,
            radius: 2.0,
            color: Vec3::ONE,
            intensity: 1.0,
        })
    }

    #[test]
    fn descriptors_absent_before_resize() {
        let renderer = DeferredRenderer::new(&RenderSettings::default());
        assert!(renderer.descriptors().is_none());
        assert!(renderer.back_buffer().is_none());
    }

    #[test]
    fn target_descriptors_follow_back_buffer() {
        let bb = BackBufferDesc::new(800, 600, wgpu::TextureFormat::Bgra8UnormSrgb);
        let descs = DeferredRenderer::target_descriptors(&bb);
        assert_eq!(descs.len(), 8);
        assert!(descs.iter().all(|d| d.width == 800 && d.height == 600));
    }

    #[test]
    fn directional_only_frame_plans_no_shadow_maps() {
        let mut renderer = DeferredRenderer::new(&RenderSettings::default());
        let mut frame = renderer.begin();
        frame.add_light(
            Light::Directional(DirectionalLight {
                direction: Vec3::Y,
                color: Vec3::ONE,
                intensity: 1.0,
            }),
            false,
        );
        let plan = frame.plan(&camera()).unwrap();
        assert!(plan.shadow_maps.is_empty());
        assert!(plan.shadow_map_batches().is_empty());
        for kind in LightKind::ALL {
            assert_eq!(plan.shadow_map_passes(kind), 0);
        }
        assert_eq!(plan.light_draws(LightKind::Directional), 1);
        assert_eq!(plan.light_draws(LightKind::Point), 0);
        assert!(plan.needs_present_copy());
    }

    #[test]
    fn begin_drops_previous_lights() {
        let mut renderer = DeferredRenderer::new(&RenderSettings::default());
        {
            let mut frame = renderer.begin();
            frame.add_light(
                Light::Ambient(AmbientLight {
                    color: Vec3::ONE,
                    intensity: 0.2,
                }),
                true,
            );
            assert_eq!(frame.plan(&camera()).unwrap().lights.len(), 1);
        }
        let mut frame = renderer.begin();
        assert!(frame.plan(&camera()).unwrap().lights.is_empty());
    }

    #[test]
    fn point_light_outside_frustum_is_not_drawn() {
        let view = camera();
        let mut renderer = DeferredRenderer::new(&RenderSettings::default());
        let mut frame = renderer.begin();
        frame.add_light(point_at(view.position + Vec3::new(0.0, 0.0, 50.0)), true);
        frame.add_light(point_at(view.position + Vec3::new(0.0, 0.0, -10.0)), false);
        let plan = frame.plan(&view).unwrap();
        assert_eq!(plan.light_draws(LightKind::Point), 1);
        assert_eq!(plan.shadow_map_passes(LightKind::Point), 0);
    }

    #[test]
    fn shadowed_spot_light_is_not_implemented() {
        let mut renderer = DeferredRenderer::new(&RenderSettings::default());
        let mut frame = renderer.begin();
        frame.add_light(
            Light::Spot(SpotLight {
                position: Vec3::ZERO,
                direction: Vec3::NEG_Z,
                range: 5.0,
                inner_angle: 0.3,
                outer_angle: 0.5,
                color: Vec3::ONE,
                intensity: 1.0,
            }),
            true,
        );
        let err = frame.plan(&camera()).unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[test]
    fn post_processes_chain_in_registration_order() {
        let mut aa = AntiAliasPostProcess::default();
        let mut ui = UiPostProcess::new();
        let mut renderer = DeferredRenderer::new(&RenderSettings::default());
        let mut frame = renderer.begin();
        frame.add_post_process(&mut aa);
        frame.add_post_process(&mut ui);
        let plan = frame.plan(&camera()).unwrap();
        let names: Vec<_> = plan.post_processes.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["antialias", "ui"]);
        assert_eq!(plan.post_processes[0].source, ChainTarget::LightBuffer);
        assert_eq!(plan.post_processes[1].destination, ChainTarget::BackBuffer);
        assert!(plan.post_processes[1].additive);
        assert!(!plan.needs_present_copy());
    }

    fn cube() -> Arc<Model> {
        let part = MeshPart {
            index_start: 0,
            index_count: 36,
            material: 0,
        };
        let mesh = Mesh::without_buffers("cube", Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)), vec![part]);
        let material = Material::without_binding("default", MaterialProperties::default());
        Arc::new(Model::new(vec![mesh], vec![material]).unwrap())
    }

    #[test]
    fn bounding_objects_follow_visibility_when_enabled() {
        let cube = cube();
        let mut visible = ModelInstance::new(cube.clone());
        let mut hidden = ModelInstance::new(cube);
        hidden.set_position(Vec3::new(0.0, 2.0, 30.0));

        let mut renderer = DeferredRenderer::new(&RenderSettings::default());
        assert!(!renderer.draws_bounding_objects());
        {
            let mut frame = renderer.begin();
            frame.add_model(&mut hidden);
            frame.add_model(&mut visible);
            assert!(frame.plan(&camera()).unwrap().bounding_boxes.is_empty());
        }

        renderer.set_draw_bounding_objects(true);
        let mut frame = renderer.begin();
        frame.add_model(&mut hidden);
        frame.add_model(&mut visible);
        assert_eq!(frame.plan(&camera()).unwrap().bounding_boxes, vec![1]);
    }

    #[test]
    fn shadowed_directional_lights_batch_per_kind() {
        let mut renderer = DeferredRenderer::new(&RenderSettings::default());
        let mut frame = renderer.begin();
        let sun = Light::Directional(DirectionalLight {
            direction: Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
        });
        frame.add_light(sun, true);
        frame.add_light(point_at(Vec3::new(0.0, 1.0, 0.0)), true);
        let plan = frame.plan(&camera()).unwrap();
        let batches: Vec<_> = plan
            .shadow_map_batches()
            .into_iter()
            .map(|(kind, passes)| (kind, passes.len()))
            .collect();
        assert_eq!(batches, vec![(LightKind::Directional, 1), (LightKind::Point, 1)]);
    }
}
