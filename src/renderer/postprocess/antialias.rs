use bytemuck::{Pod, Zeroable};

use super::{
    sampled_texture_bind_group, sampled_texture_layout, uniform_layout, FullScreenPass,
    PostProcess, PostProcessContext, UniformBinding,
};
use crate::error::{RenderError, Result};
use crate::renderer::lifecycle::{BackBufferDesc, DeviceLifecycle};
use crate::renderer::states::{BlendMode, SamplerKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntiAliasParams {
    /// Minimum luma contrast treated as an edge.
    pub contrast_threshold: f32,
    /// Edge threshold relative to the brightest neighbor.
    pub relative_threshold: f32,
    pub subpixel_blending: f32,
}

impl Default for AntiAliasParams {
    fn default() -> Self {
        Self {
            contrast_threshold: 0.0312,
            relative_threshold: 0.063,
            subpixel_blending: 0.75,
        }
    }
}

/// Whether a neighborhood with the given luma extremes gets blended.
pub fn is_edge(lowest: f32, highest: f32, params: &AntiAliasParams) -> bool {
    highest - lowest >= params.contrast_threshold.max(params.relative_threshold * highest)
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FxaaUniform {
    contrast_threshold: f32,
    relative_threshold: f32,
    subpixel_blending: f32,
    _padding: f32,
}

impl From<&AntiAliasParams> for FxaaUniform {
    fn from(p: &AntiAliasParams) -> Self {
        Self {
            contrast_threshold: p.contrast_threshold,
            relative_threshold: p.relative_threshold,
            subpixel_blending: p.subpixel_blending,
            _padding: 0.0,
        }
    }
}

struct AntiAliasResources {
    source_layout: wgpu::BindGroupLayout,
    params: UniformBinding,
    pass: FullScreenPass,
}

/// Luma edge detection with a single directional blend per pixel.
pub struct AntiAliasPostProcess {
    params: AntiAliasParams,
    resources: Option<AntiAliasResources>,
}

impl Default for AntiAliasPostProcess {
    fn default() -> Self {
        Self::new(AntiAliasParams::default())
    }
}

impl AntiAliasPostProcess {
    pub fn new(params: AntiAliasParams) -> Self {
        let mut aa = Self {
            params,
            resources: None,
        };
        aa.set_contrast_threshold(params.contrast_threshold);
        aa.set_relative_threshold(params.relative_threshold);
        aa.set_subpixel_blending(params.subpixel_blending);
        aa
    }

    pub fn params(&self) -> &AntiAliasParams {
        &self.params
    }

    pub fn set_contrast_threshold(&mut self, threshold: f32) {
        self.params.contrast_threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn set_relative_threshold(&mut self, threshold: f32) {
        self.params.relative_threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn set_subpixel_blending(&mut self, blending: f32) {
        self.params.subpixel_blending = blending.clamp(0.0, 1.0);
    }
}

impl PostProcess for AntiAliasPostProcess {
    fn name(&self) -> &'static str {
        "antialias"
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<'_>,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()> {
        let resources = self
            .resources
            .as_mut()
            .ok_or(RenderError::NotCreated("antialias"))?;
        resources
            .params
            .write(ctx.queue, &FxaaUniform::from(&self.params));
        let source = sampled_texture_bind_group(
            ctx.device,
            &resources.source_layout,
            input,
            ctx.sampler(SamplerKind::LinearClamp)?,
            "FXAA Source",
        );
        resources.pass.draw(
            ctx.device,
            ctx.encoder,
            output,
            output_format,
            &[&source, resources.params.bind_group()],
            Some(wgpu::Color::BLACK),
        )
    }
}

impl DeviceLifecycle for AntiAliasPostProcess {
    fn on_create_device(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _back_buffer: &BackBufferDesc,
    ) -> Result<()> {
        let source_layout = sampled_texture_layout(device, "FXAA Source Layout");
        let params_layout = uniform_layout::<FxaaUniform>(device, "FXAA Params Layout");
        let params = UniformBinding::new(
            device,
            &params_layout,
            "FXAA Params",
            &FxaaUniform::from(&self.params),
        );
        let pass = FullScreenPass::new(
            device,
            "FXAA Pass",
            &[include_str!("../../shader/fxaa.wgsl")],
            "fs_main",
            &[&source_layout, &params_layout],
            BlendMode::Opaque,
        )?;
        self.resources = Some(AntiAliasResources {
            source_layout,
            params,
            pass,
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

    #[test]
    fn flat_regions_are_not_edges() {
        let params = AntiAliasParams::default();
        assert!(!is_edge(0.5, 0.51, &params));
        assert!(is_edge(0.1, 0.9, &params));
    }

    #[test]
    fn dark_regions_use_absolute_threshold() {
        let params = AntiAliasParams::default();
        assert!(!is_edge(0.0, 0.02, &params));
        assert!(is_edge(0.0, 0.04, &params));
    }
}
