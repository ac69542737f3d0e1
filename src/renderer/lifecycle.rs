use crate::error::Result;

/// Size and format of the swap-chain back buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackBufferDesc {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl BackBufferDesc {
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Dimensions divided by `divisor`, never below one texel.
    pub fn scaled(&self, divisor: u32) -> (u32, u32) {
        let divisor = divisor.max(1);
        ((self.width / divisor).max(1), (self.height / divisor).max(1))
    }
}

/// Device and swap-chain hooks. Back-buffer-sized resources are created only in
/// `on_resized_swap_chain` and dropped in `on_releasing_swap_chain`.
pub trait DeviceLifecycle {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()>;

    fn on_resized_swap_chain(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        back_buffer: &BackBufferDesc,
    ) -> Result<()>;

    fn on_releasing_swap_chain(&mut self);

    fn on_destroy_device(&mut self);
}

/// Everything needed to recreate a render target; compared to check resize idempotence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub mip_levels: u32,
    pub usage: wgpu::TextureUsages,
}

impl TargetDesc {
    pub fn color(label: &'static str, (width, height): (u32, u32), format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            width,
            height,
            format,
            mip_levels: 1,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        }
    }

    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    pub fn create(&self, device: &wgpu::Device) -> RenderTarget {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.label),
            size: wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: self.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: self.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        RenderTarget {
            desc: *self,
            texture,
            view,
        }
    }
}

#[derive(Debug)]
pub struct RenderTarget {
    pub desc: TargetDesc,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    /// View of a single mip level, for rendering into a mip chain.
    pub fn mip_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.desc.label),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }
}

/// Color attachment that stores its result; `clear` of `None` loads the existing contents.
pub fn color_attachment(
    view: &wgpu::TextureView,
    clear: Option<wgpu::Color>,
) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        depth_slice: None,
        resolve_target: None,
        ops: wgpu::Operations {
            load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
            store: wgpu::StoreOp::Store,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_never_reaches_zero() {
        let bb = BackBufferDesc::new(5, 3, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(bb.scaled(8), (1, 1));
        assert_eq!(bb.scaled(2), (2, 1));
    }

    #[test]
    fn zero_sized_back_buffer_is_clamped() {
        let bb = BackBufferDesc::new(0, 0, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!((bb.width, bb.height), (1, 1));
    }
}
