//! Overlay stage. The chain copies its input to the output first, so overlays only draw
//! what they add.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use super::{uniform_layout, FullScreenPass, PostProcess, PostProcessContext, UniformBinding};
use crate::error::{RenderError, Result};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::states::BlendMode;

/// Something drawn over the finished frame, such as a HUD or an external GUI renderer.
pub trait UiOverlay: DeviceLifecycle {
    fn frame_move(&mut self, _total_time: f64, _delta_time: f32) {}

    /// Draws onto `target` without clearing it.
    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()>;
}

#[derive(Default)]
pub struct UiPostProcess {
    overlays: Vec<Box<dyn UiOverlay>>,
}

impl UiPostProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays added after device creation must be brought up by the caller.
    pub fn add_overlay(&mut self, overlay: Box<dyn UiOverlay>) {
        self.overlays.push(overlay);
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn frame_move(&mut self, total_time: f64, delta_time: f32) {
        for overlay in &mut self.overlays {
            overlay.frame_move(total_time, delta_time);
        }
    }
}

impl PostProcess for UiPostProcess {
    fn name(&self) -> &'static str {
        "ui"
    }

    fn is_additive(&self) -> bool {
        true
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        _input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()> {
        for overlay in &mut self.overlays {
            overlay.render(ctx, output, output_format)?;
        }
        Ok(())
    }
}

impl DeviceLifecycle for UiPostProcess {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        for overlay in &mut self.overlays {
            overlay.on_create_device(device, queue, back_buffer)?;
        }
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        for overlay in &mut self.overlays {
            overlay.on_resized_swap_chain(device, queue, back_buffer)?;
        }
        Ok(())
    }

    fn on_releasing_swap_chain(&mut self) {
        for overlay in &mut self.overlays {
            overlay.on_releasing_swap_chain();
        }
    }

    fn on_destroy_device(&mut self) {
        for overlay in &mut self.overlays {
            overlay.on_destroy_device();
        }
    }
}

/// Whether a pixel `offset` from the screen center lies on the crosshair.
pub fn crosshair_covers(offset: Vec2, half_length: f32, half_thickness: f32) -> bool {
    let d = offset.abs();
    (d.x <= half_thickness && d.y <= half_length) || (d.y <= half_thickness && d.x <= half_length)
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CrosshairUniform {
    color: [f32; 4],
    screen_size: [f32; 2],
    half_length: f32,
    half_thickness: f32,
}

struct CrosshairResources {
    params: UniformBinding,
    pass: FullScreenPass,
}

/// Screen-center crosshair, alpha blended.
pub struct CrosshairOverlay {
    pub color: Vec4,
    pub half_length: f32,
    pub half_thickness: f32,
    resources: Option<CrosshairResources>,
}

impl Default for CrosshairOverlay {
    fn default() -> Self {
        Self {
            color: Vec4::new(1.0, 1.0, 1.0, 0.8),
            half_length: 8.0,
            half_thickness: 1.0,
            resources: None,
        }
    }
}

impl CrosshairOverlay {
    fn uniform(&self, back_buffer: &BackBufferDesc) -> CrosshairUniform {
        CrosshairUniform {
            color: self.color.to_array(),
            screen_size: [back_buffer.width as f32, back_buffer.height as f32],
            half_length: self.half_length,
            half_thickness: self.half_thickness,
        }
    }
}

impl UiOverlay for CrosshairOverlay {
    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        let uniform = self.uniform(&ctx.back_buffer);
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("crosshair"))?;
        resources.params.write(ctx.queue, &uniform);
        resources.pass.draw(
            ctx.device,
            ctx.encoder,
            target,
            format,
            &[resources.params.bind_group()],
            None,
        )
    }
}

impl DeviceLifecycle for CrosshairOverlay {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let layout = uniform_layout::<CrosshairUniform>(device, "Crosshair Layout");
        let params = UniformBinding::new(device, &layout, "Crosshair", &self.uniform(back_buffer));
        let pass = FullScreenPass::new(
            device,
            "Crosshair Pass",
            &[include_str!("../../shader/crosshair.wgsl")],
            "fs_main",
            &[&layout],
            BlendMode::AlphaBlend,
        )?;
        self.resources = Some(CrosshairResources { params, pass });
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

    #[test]
    fn ui_stage_is_additive() {
        let ui = UiPostProcess::new();
        assert!(ui.is_additive());
        assert_eq!(ui.name(), "ui");
    }

    #[test]
    fn crosshair_covers_center_lines_only() {
        assert!(crosshair_covers(Vec2::ZERO, 8.0, 1.0));
        assert!(crosshair_covers(Vec2::new(0.5, -7.0), 8.0, 1.0));
        assert!(crosshair_covers(Vec2::new(-7.5, 0.0), 8.0, 1.0));
        assert!(!crosshair_covers(Vec2::new(4.0, 4.0), 8.0, 1.0));
        assert!(!crosshair_covers(Vec2::new(0.0, 9.0), 8.0, 1.0));
    }

    #[test]
    fn overlays_are_collected() {
        let mut ui = UiPostProcess::new();
        ui.add_overlay(Box::new(CrosshairOverlay::default()));
        assert_eq!(ui.overlay_count(), 1);
    }
}
