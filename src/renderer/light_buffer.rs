use crate::error::{RenderError, Result};
use crate::renderer::lifecycle::{
    color_attachment, BackBufferDesc, DeviceLifecycle, RenderTarget, TargetDesc,
};

pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Where a post-process step reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTarget {
    LightBuffer,
    PingPong(usize),
    BackBuffer,
}

struct LightTargets {
    accumulation: RenderTarget,
    ping_pong: [RenderTarget; 2],
}

/// Additive lighting accumulation plus the two intermediates the post-process chain
/// alternates between.
#[derive(Default)]
pub struct LightBuffer {
    targets: Option<LightTargets>,
}

impl LightBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_descriptors(back_buffer: &BackBufferDesc) -> [TargetDesc; 3] {
        let size = (back_buffer.width, back_buffer.height);
        [
            TargetDesc::color("Light Buffer", size, HDR_FORMAT),
            TargetDesc::color("Post Process Ping", size, HDR_FORMAT),
            TargetDesc::color("Post Process Pong", size, HDR_FORMAT),
        ]
    }

    pub fn descriptors(&self) -> Option<[TargetDesc; 3]> {
        self.targets.as_ref().map(|t| {
            [
                t.accumulation.desc,
                t.ping_pong[0].desc,
                t.ping_pong[1].desc,
            ]
        })
    }

    fn targets(&self) -> Result<&LightTargets> {
        self.targets
            .as_ref()
            .ok_or(RenderError::NotCreated("light buffer"))
    }

    /// View for a chain target other than the back buffer.
    pub fn view(&self, target: ChainTarget) -> Result<&wgpu::TextureView> {
        let t = self.targets()?;
        match target {
            ChainTarget::LightBuffer => Ok(&t.accumulation.view),
            ChainTarget::PingPong(i) => t
                .ping_pong
                .get(i)
                .map(|target| &target.view)
                .ok_or(RenderError::NotCreated("post-process target")),
            ChainTarget::BackBuffer => Err(RenderError::NotCreated("back buffer view")),
        }
    }

    /// Clears the accumulation target and binds the scene depth for light-volume testing.
    pub fn begin_light_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        scene_depth: &wgpu::TextureView,
    ) -> Result<wgpu::RenderPass<'e>> {
        let t = self.targets()?;
        Ok(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Light Accumulation Pass"),
            color_attachments: &[color_attachment(&t.accumulation.view, Some(wgpu::Color::BLACK))],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: scene_depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        }))
    }
}

impl DeviceLifecycle for LightBuffer {
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
        let [accumulation, ping, pong] =
            Self::target_descriptors(back_buffer).map(|desc| desc.create(device));
        self.targets = Some(LightTargets {
            accumulation,
            ping_pong: [ping, pong],
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
