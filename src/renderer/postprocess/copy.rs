use super::FullScreenPass;
use crate::error::Result;
use crate::renderer::states::BlendMode;
use crate::renderer::uniforms::texture_entry;

/// Texel-exact copy between two same-sized targets of any color formats.
pub struct CopyPass {
    layout: wgpu::BindGroupLayout,
    pass: FullScreenPass,
}

impl CopyPass {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Copy Source Layout"),
            entries: &[texture_entry(0, false)],
        });
        let pass = FullScreenPass::new(
            device,
            "Copy Pass",
            &[include_str!("../../shader/copy.wgsl")],
            "fs_main",
            &[&layout],
            BlendMode::Opaque,
        )?;
        Ok(Self { layout, pass })
    }

    pub fn copy(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Copy Source"),
            layout: &self.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(source),
            }],
        });
        self.pass
            .draw(device, encoder, target, format, &[&group], Some(wgpu::Color::BLACK))
    }
}
