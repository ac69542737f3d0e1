//! Reusable fixed-function state, keyed by how it is used.

use crate::error::{RenderError, Result};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthMode {
    /// Test and write with `Less`.
    WriteEnabled,
    /// Test with `LessEqual`, no writes.
    TestOnly,
    /// Test with `GreaterEqual`, no writes. Light volumes seen from inside.
    Reverse,
    /// Attachment present but ignored.
    Disabled,
}

impl DepthMode {
    pub fn state(self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        let (write, compare) = match self {
            DepthMode::WriteEnabled => (true, wgpu::CompareFunction::Less),
            DepthMode::TestOnly => (false, wgpu::CompareFunction::LessEqual),
            DepthMode::Reverse => (false, wgpu::CompareFunction::GreaterEqual),
            DepthMode::Disabled => (false, wgpu::CompareFunction::Always),
        };
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: write,
            depth_compare: compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    Additive,
    AlphaBlend,
}

impl BlendMode {
    pub fn state(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::Additive => {
                let add = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                };
                Some(wgpu::BlendState {
                    color: add,
                    alpha: add,
                })
            }
            BlendMode::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    Back,
    Front,
    None,
}

impl CullMode {
    pub fn face(self) -> Option<wgpu::Face> {
        match self {
            CullMode::Back => Some(wgpu::Face::Back),
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::None => None,
        }
    }

    pub fn primitive(self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: self.face(),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        }
    }
}

/// Everything that distinguishes two pipelines built from the same shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: CullMode,
    pub format: wgpu::TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    PointClamp,
    LinearClamp,
    LinearWrap,
    AnisotropicWrap,
    /// `LessEqual` comparison sampler for shadow maps.
    ShadowCompare,
}

impl SamplerKind {
    pub const ALL: [SamplerKind; 5] = [
        SamplerKind::PointClamp,
        SamplerKind::LinearClamp,
        SamplerKind::LinearWrap,
        SamplerKind::AnisotropicWrap,
        SamplerKind::ShadowCompare,
    ];

    pub fn descriptor(self) -> wgpu::SamplerDescriptor<'static> {
        let clamp = wgpu::AddressMode::ClampToEdge;
        let wrap = wgpu::AddressMode::Repeat;
        let linear = wgpu::FilterMode::Linear;
        let nearest = wgpu::FilterMode::Nearest;
        let (label, address, filter, anisotropy, compare) = match self {
            SamplerKind::PointClamp => ("Point Clamp Sampler", clamp, nearest, 1, None),
            SamplerKind::LinearClamp => ("Linear Clamp Sampler", clamp, linear, 1, None),
            SamplerKind::LinearWrap => ("Linear Wrap Sampler", wrap, linear, 1, None),
            SamplerKind::AnisotropicWrap => ("Anisotropic Sampler", wrap, linear, 16, None),
            SamplerKind::ShadowCompare => (
                "Shadow Sampler",
                clamp,
                linear,
                1,
                Some(wgpu::CompareFunction::LessEqual),
            ),
        };
        wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            anisotropy_clamp: anisotropy,
            compare,
            ..Default::default()
        }
    }

    pub fn binding_type(self) -> wgpu::SamplerBindingType {
        match self {
            SamplerKind::PointClamp => wgpu::SamplerBindingType::NonFiltering,
            SamplerKind::ShadowCompare => wgpu::SamplerBindingType::Comparison,
            _ => wgpu::SamplerBindingType::Filtering,
        }
    }
}

/// Samplers shared by every pass, created once per device.
#[derive(Debug, Default)]
pub struct SamplerPool {
    samplers: Option<Vec<wgpu::Sampler>>,
}

impl SamplerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: SamplerKind) -> Result<&wgpu::Sampler> {
        let samplers = self
            .samplers
            .as_ref()
            .ok_or(RenderError::NotCreated("sampler pool"))?;
        let index = SamplerKind::ALL
            .iter()
            .position(|k| *k == kind)
            .ok_or(RenderError::NotCreated("sampler"))?;
        samplers
            .get(index)
            .ok_or(RenderError::NotCreated("sampler"))
    }
}

impl DeviceLifecycle for SamplerPool {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        self.samplers = Some(
            SamplerKind::ALL
                .iter()
                .map(|kind| device.create_sampler(&kind.descriptor()))
                .collect(),
        );
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
        self.samplers = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_depth_never_writes() {
        let state = DepthMode::Reverse.state(DEPTH_FORMAT);
        assert!(!state.depth_write_enabled);
        assert_eq!(state.depth_compare, wgpu::CompareFunction::GreaterEqual);
    }

    #[test]
    fn additive_blend_sums_source_and_destination() {
        let blend = BlendMode::Additive.state().unwrap();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::One);
        assert!(BlendMode::Opaque.state().is_none());
    }

    #[test]
    fn front_cull_selects_front_face() {
        assert_eq!(CullMode::Front.primitive().cull_mode, Some(wgpu::Face::Front));
        assert_eq!(CullMode::None.primitive().cull_mode, None);
    }

    #[test]
    fn pool_reports_missing_device() {
        let pool = SamplerPool::new();
        assert!(pool.get(SamplerKind::LinearClamp).is_err());
    }

    #[test]
    fn anisotropic_sampler_filters_linearly() {
        let desc = SamplerKind::AnisotropicWrap.descriptor();
        assert_eq!(desc.anisotropy_clamp, 16);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Linear);
    }
}
