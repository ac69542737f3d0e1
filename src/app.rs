// app.rs
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{Key, KeyCode, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

use crate::demo::{DemoScene, DemoWorld};
use crate::error::Result;
use crate::input::{InputCollector, InputState};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::postprocess::{
    AntiAliasPostProcess, CrosshairOverlay, DepthOfFieldPostProcess, HdrPostProcess,
    MotionBlurPostProcess, PostProcess, SkyPostProcess, SsaoPostProcess, UiPostProcess,
};
use crate::renderer::{DeferredRenderer, RenderContext};
use crate::scene::content::ContentManager;
use crate::settings::RenderSettings;
use crate::time::{FrameClock, FrameTime};

/// Which optional stages run this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageToggles {
    pub ssao: bool,
    pub motion_blur: bool,
    pub depth_of_field: bool,
    pub antialias: bool,
}

impl StageToggles {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            ssao: settings.ssao.enabled,
            motion_blur: settings.motion_blur.enabled,
            depth_of_field: settings.depth_of_field.enabled,
            antialias: settings.antialias,
        }
    }
}

/// The post-process stages the demo owns. Order of `active` is the chain order.
pub struct PostStages {
    pub ssao: SsaoPostProcess,
    pub sky: SkyPostProcess,
    pub motion_blur: MotionBlurPostProcess,
    pub depth_of_field: DepthOfFieldPostProcess,
    pub hdr: HdrPostProcess,
    pub antialias: AntiAliasPostProcess,
    pub ui: UiPostProcess,
}

impl PostStages {
    pub fn new(settings: &RenderSettings) -> Self {
        let mut ui = UiPostProcess::new();
        ui.add_overlay(Box::new(CrosshairOverlay::default()));
        Self {
            ssao: SsaoPostProcess::new(settings.ssao.params()),
            sky: SkyPostProcess::new(settings.sky.params()),
            motion_blur: MotionBlurPostProcess::new(settings.motion_blur.params()),
            depth_of_field: DepthOfFieldPostProcess::new(settings.depth_of_field.params()),
            hdr: HdrPostProcess::new(settings.hdr.params()),
            antialias: AntiAliasPostProcess::default(),
            ui,
        }
    }

    fn all_mut(&mut self) -> [&mut dyn PostProcess; 7] {
        [
            &mut self.ssao,
            &mut self.sky,
            &mut self.motion_blur,
            &mut self.depth_of_field,
            &mut self.hdr,
            &mut self.antialias,
            &mut self.ui,
        ]
    }

    pub fn active(&mut self, toggles: StageToggles) -> Vec<&mut dyn PostProcess> {
        let mut stages: Vec<&mut dyn PostProcess> = Vec::with_capacity(7);
        if toggles.ssao {
            stages.push(&mut self.ssao);
        }
        stages.push(&mut self.sky);
        if toggles.motion_blur {
            stages.push(&mut self.motion_blur);
        }
        if toggles.depth_of_field {
            stages.push(&mut self.depth_of_field);
        }
        stages.push(&mut self.hdr);
        if toggles.antialias {
            stages.push(&mut self.antialias);
        }
        stages.push(&mut self.ui);
        stages
    }
}

impl DeviceLifecycle for PostStages {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        for stage in self.all_mut() {
            stage.on_create_device(device, queue, back_buffer)?;
        }
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        for stage in self.all_mut() {
            stage.on_resized_swap_chain(device, queue, back_buffer)?;
        }
        Ok(())
    }

    fn on_releasing_swap_chain(&mut self) {
        for stage in self.all_mut() {
            stage.on_releasing_swap_chain();
        }
    }

    fn on_destroy_device(&mut self) {
        for stage in self.all_mut() {
            stage.on_destroy_device();
        }
    }
}

struct Running {
    window: Arc<Window>,
    context: RenderContext,
    renderer: DeferredRenderer,
    stages: PostStages,
    world: DemoWorld,
    content: ContentManager,
}

impl Running {
    fn new(window: Arc<Window>, settings: &RenderSettings, scene: &DemoScene) -> Result<Self> {
        let context = pollster::block_on(RenderContext::new(window.clone(), settings))?;
        let back_buffer = context.back_buffer();

        let mut renderer = DeferredRenderer::new(settings);
        let mut stages = PostStages::new(settings);
        renderer.on_create_device(&context.device, &context.queue, &back_buffer)?;
        stages.on_create_device(&context.device, &context.queue, &back_buffer)?;
        renderer.on_resized_swap_chain(&context.device, &context.queue, &back_buffer)?;
        stages.on_resized_swap_chain(&context.device, &context.queue, &back_buffer)?;

        let mut content = ContentManager::new();
        content.add_search_path("assets");
        let mut world = DemoWorld::build(
            scene,
            &context.device,
            &context.queue,
            renderer.material_layout()?,
            &mut content,
        )?;
        world.camera.set_aspect_ratio(back_buffer.aspect_ratio());

        Ok(Self {
            window,
            context,
            renderer,
            stages,
            world,
            content,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if !self.context.resize(size) {
            return Ok(());
        }
        let back_buffer = self.context.back_buffer();
        log::info!("Resizing to {}x{}", back_buffer.width, back_buffer.height);

        self.renderer.on_releasing_swap_chain();
        self.stages.on_releasing_swap_chain();
        let (device, queue) = (&self.context.device, &self.context.queue);
        self.renderer.on_resized_swap_chain(device, queue, &back_buffer)?;
        self.stages.on_resized_swap_chain(device, queue, &back_buffer)?;

        self.world.camera.set_aspect_ratio(back_buffer.aspect_ratio());
        self.stages.motion_blur.reset();
        Ok(())
    }

    fn on_frame_move(&mut self, time: FrameTime, input: &InputState) {
        self.world.move_camera(input, time.delta);
        self.world.update(time);
        self.stages.hdr.set_time_delta(time.delta);
        self.stages.ui.frame_move(time.total, time.delta);
    }

    fn on_frame_render(&mut self, toggles: StageToggles) -> Result<()> {
        let Running {
            context,
            renderer,
            stages,
            world,
            ..
        } = self;

        let surface_texture = context.acquire()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let camera = world.camera.snapshot();

        let mut frame = renderer.begin();
        for instance in world.instances.iter_mut() {
            frame.add_model(instance);
        }
        for (light, casts_shadow) in &world.lights {
            frame.add_light(*light, *casts_shadow);
        }
        for stage in stages.active(toggles) {
            frame.add_post_process(stage);
        }
        frame.end(
            &context.device,
            &context.queue,
            &view,
            context.config.format,
            &camera,
        )?;

        surface_texture.present();
        Ok(())
    }

    fn destroy(&mut self) {
        self.stages.on_releasing_swap_chain();
        self.renderer.on_releasing_swap_chain();
        self.stages.on_destroy_device();
        self.renderer.on_destroy_device();
        self.content.release_all();
    }
}

pub struct App {
    settings: RenderSettings,
    scene: DemoScene,
    clock: FrameClock,
    input: InputCollector,
    toggles: StageToggles,
    running: Option<Running>,
}

impl App {
    pub fn new(scene: DemoScene) -> Self {
        let settings = RenderSettings::load();
        let toggles = StageToggles::from_settings(&settings);
        Self {
            settings,
            scene,
            clock: FrameClock::new(),
            input: InputCollector::default(),
            toggles,
            running: None,
        }
    }

    /// Toggles and window commands driven by this frame's key presses.
    fn handle_bindings(&mut self, input: &InputState) {
        let keys = &input.keyboard;
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if keys.just_pressed(KeyCode::KeyB) {
            let enabled = !running.renderer.draws_bounding_objects();
            running.renderer.set_draw_bounding_objects(enabled);
            log::info!("Bounding boxes {}", on_off(enabled));
            if enabled {
                running.world.log_bounds();
            }
        }
        if keys.just_pressed(KeyCode::Digit1) {
            self.toggles.ssao = !self.toggles.ssao;
            log::info!("SSAO {}", on_off(self.toggles.ssao));
        }
        if keys.just_pressed(KeyCode::Digit2) {
            self.toggles.motion_blur = !self.toggles.motion_blur;
            running.stages.motion_blur.reset();
            log::info!("Motion blur {}", on_off(self.toggles.motion_blur));
        }
        if keys.just_pressed(KeyCode::F11) {
            let window = &running.window;
            if window.fullscreen().is_some() {
                window.set_fullscreen(None);
            } else {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            }
        }
        if keys.just_pressed(KeyCode::KeyM) {
            let window = &running.window;
            window.set_maximized(!window.is_maximized());
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let time = self.clock.tick();
        let input = self.input.snapshot().clone();
        self.handle_bindings(&input);

        let toggles = self.toggles;
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        running.on_frame_move(time, &input);
        running.on_frame_render(toggles)?;
        running.window.request_redraw();
        Ok(())
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        let resolution = &self.settings.resolution;
        let attributes = Window::default_attributes()
            .with_title("deferred renderer")
            .with_inner_size(PhysicalSize::new(resolution.width, resolution.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        match Running::new(window, &self.settings, &self.scene) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(err) => {
                log::error!("Failed to initialise renderer: {}", err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match self.running.as_ref() {
            Some(running) if running.window.id() == id => {}
            _ => return,
        }
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(running) = self.running.as_mut() {
                    if let Err(err) = running.resize(size) {
                        log::error!("Resize failed: {}", err);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::Focused(focused) => {
                self.clock.set_active(focused);
            }
            WindowEvent::Occluded(occluded) => {
                self.clock.set_active(!occluded);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    log::error!("Frame failed: {}", err);
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut running) = self.running.take() {
            running.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(stages: &mut PostStages, toggles: StageToggles) -> Vec<&'static str> {
        stages.active(toggles).iter().map(|s| s.name()).collect()
    }

    #[test]
    fn default_chain_order() {
        let settings = RenderSettings::default();
        let mut stages = PostStages::new(&settings);
        let toggles = StageToggles::from_settings(&settings);
        assert_eq!(
            names(&mut stages, toggles),
            vec!["ssao", "sky", "hdr", "antialias", "ui"]
        );
    }

    #[test]
    fn every_stage_enabled() {
        let mut stages = PostStages::new(&RenderSettings::default());
        let toggles = StageToggles {
            ssao: true,
            motion_blur: true,
            depth_of_field: true,
            antialias: true,
        };
        assert_eq!(
            names(&mut stages, toggles),
            vec![
                "ssao",
                "sky",
                "motion_blur",
                "depth_of_field",
                "hdr",
                "antialias",
                "ui"
            ]
        );
    }

    #[test]
    fn sky_hdr_and_ui_always_run() {
        let mut stages = PostStages::new(&RenderSettings::default());
        let toggles = StageToggles {
            ssao: false,
            motion_blur: false,
            depth_of_field: false,
            antialias: false,
        };
        assert_eq!(names(&mut stages, toggles), vec!["sky", "hdr", "ui"]);
    }
}
