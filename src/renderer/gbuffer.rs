use crate::error::{RenderError, Result};
use crate::renderer::lifecycle::{
    color_attachment, BackBufferDesc, DeviceLifecycle, RenderTarget, TargetDesc,
};
use crate::renderer::states::DEPTH_FORMAT;
use crate::renderer::uniforms::texture_entry;

pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const SPECULAR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Post-projection depth copied into a color target so later passes can read it while
/// the hardware depth buffer stays bound for testing.
pub const LINEAR_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

pub const COLOR_FORMATS: [wgpu::TextureFormat; 4] =
    [ALBEDO_FORMAT, NORMAL_FORMAT, SPECULAR_FORMAT, LINEAR_DEPTH_FORMAT];

struct GBufferTargets {
    albedo: RenderTarget,
    normal: RenderTarget,
    specular: RenderTarget,
    depth: RenderTarget,
    depth_stencil: RenderTarget,
}

/// Layout every consumer uses to read the G-buffer: albedo, normal, specular and depth at
/// bindings 0..=3, all unfiltered (`textureLoad`).
pub fn create_read_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            texture_entry(0, false),
            texture_entry(1, false),
            texture_entry(2, false),
            texture_entry(3, false),
        ],
    })
}

#[derive(Clone, Copy)]
pub struct GBufferViews<'a> {
    pub albedo: &'a wgpu::TextureView,
    pub normal: &'a wgpu::TextureView,
    pub specular: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
}

impl GBufferViews<'_> {
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &str,
    ) -> wgpu::BindGroup {
        let entry = |binding, view| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        };
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                entry(0, self.albedo),
                entry(1, self.normal),
                entry(2, self.specular),
                entry(3, self.depth),
            ],
        })
    }
}

/// Geometry-pass render targets, sized to the back buffer.
#[derive(Default)]
pub struct GBuffer {
    targets: Option<GBufferTargets>,
}

impl GBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_descriptors(back_buffer: &BackBufferDesc) -> [TargetDesc; 5] {
        let size = (back_buffer.width, back_buffer.height);
        let mut depth_stencil = TargetDesc::color("GBuffer Depth Stencil", size, DEPTH_FORMAT);
        depth_stencil.usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        [
            TargetDesc::color("GBuffer Albedo", size, ALBEDO_FORMAT),
            TargetDesc::color("GBuffer Normal", size, NORMAL_FORMAT),
            TargetDesc::color("GBuffer Specular", size, SPECULAR_FORMAT),
            TargetDesc::color("GBuffer Depth", size, LINEAR_DEPTH_FORMAT),
            depth_stencil,
        ]
    }

    fn targets(&self) -> Result<&GBufferTargets> {
        self.targets.as_ref().ok_or(RenderError::NotCreated("g-buffer"))
    }

    pub fn views(&self) -> Result<GBufferViews<'_>> {
        let t = self.targets()?;
        Ok(GBufferViews {
            albedo: &t.albedo.view,
            normal: &t.normal.view,
            specular: &t.specular.view,
            depth: &t.depth.view,
        })
    }

    pub fn depth_stencil_view(&self) -> Result<&wgpu::TextureView> {
        Ok(&self.targets()?.depth_stencil.view)
    }

    pub fn descriptors(&self) -> Option<[TargetDesc; 5]> {
        self.targets.as_ref().map(|t| {
            [
                t.albedo.desc,
                t.normal.desc,
                t.specular.desc,
                t.depth.desc,
                t.depth_stencil.desc,
            ]
        })
    }

    /// Starts the geometry pass: every target cleared, depth reset to far.
    pub fn begin_geometry_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
    ) -> Result<wgpu::RenderPass<'e>> {
        let t = self.targets()?;
        Ok(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Geometry Pass"),
            color_attachments: &[
                color_attachment(&t.albedo.view, Some(wgpu::Color::TRANSPARENT)),
                color_attachment(&t.normal.view, Some(wgpu::Color::TRANSPARENT)),
                color_attachment(&t.specular.view, Some(wgpu::Color::TRANSPARENT)),
                color_attachment(&t.depth.view, Some(wgpu::Color::WHITE)),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &t.depth_stencil.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        }))
    }
}

impl DeviceLifecycle for GBuffer {
    fn on_create_device(
        &mut self,
        _device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        Ok(())
    }

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let [albedo, normal, specular, depth, depth_stencil] =
            Self::target_descriptors(back_buffer).map(|desc| desc.create(device));
        log::info!(
            "G-buffer resized to {}x{}",
            back_buffer.width,
            back_buffer.height
        );
        self.targets = Some(GBufferTargets {
            albedo,
            normal,
            specular,
            depth,
            depth_stencil,
        });
        Ok(())
    }

    fn on_releasing_swap_chain(&mut self) {
        self.targets = None;
    }

    fn on_destroy_device(&mut self) {
        self.targets = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_follow_back_buffer() {
        let bb = BackBufferDesc::new(1920, 1080, wgpu::TextureFormat::Bgra8Unorm);
        let descs = GBuffer::target_descriptors(&bb);
        assert!(descs.iter().all(|d| d.width == 1920 && d.height == 1080));
        assert_eq!(descs[4].format, DEPTH_FORMAT);
        assert_eq!(
            descs[..4].iter().map(|d| d.format).collect::<Vec<_>>(),
            COLOR_FORMATS.to_vec()
        );
    }
}
