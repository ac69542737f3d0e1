use bytemuck::{Pod, Zeroable};

use super::{
    sampled_texture_bind_group, sampled_texture_layout, uniform_layout, FullScreenPass,
    UniformBinding, PARAM_EPSILON,
};
use crate::error::Result;
use crate::renderer::states::BlendMode;

/// Taps on each side of the center never exceed this.
pub const MAX_BLUR_RADIUS: u32 = 8;

/// Normalizing term of the Gaussian, `1 / sqrt(2 pi sigma^2)`.
pub fn gaussian_numerator(sigma: f32) -> f32 {
    let sigma = sigma.max(PARAM_EPSILON);
    1.0 / (2.0 * std::f32::consts::PI * sigma * sigma).sqrt()
}

pub fn gaussian_weight(sigma: f32, offset: f32) -> f32 {
    let sigma = sigma.max(PARAM_EPSILON);
    gaussian_numerator(sigma) * (-(offset * offset) / (2.0 * sigma * sigma)).exp()
}

/// Taps needed to cover three standard deviations, at least one.
pub fn tap_radius(sigma: f32) -> u32 {
    ((sigma.max(PARAM_EPSILON) * 3.0).ceil() as u32).clamp(1, MAX_BLUR_RADIUS)
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct BlurParams {
    pub numerator: f32,
    pub denominator: f32,
    pub radius: f32,
    pub _padding: f32,
}

impl BlurParams {
    pub fn from_sigma(sigma: f32) -> Self {
        let sigma = sigma.max(PARAM_EPSILON);
        Self {
            numerator: gaussian_numerator(sigma),
            denominator: 2.0 * sigma * sigma,
            radius: tap_radius(sigma) as f32,
            _padding: 0.0,
        }
    }
}

/// Linear resampling plus a two-pass separable Gaussian, shared by the effects that blur
/// at reduced resolution.
pub struct SeparableBlur {
    sampled_layout: wgpu::BindGroupLayout,
    params: UniformBinding,
    resample: FullScreenPass,
    horizontal: FullScreenPass,
    vertical: FullScreenPass,
}

impl SeparableBlur {
    pub fn new(device: &wgpu::Device, sigma: f32) -> Result<Self> {
        let sampled_layout = sampled_texture_layout(device, "Blur Source Layout");
        let params_layout = uniform_layout::<BlurParams>(device, "Blur Params Layout");
        let params = UniformBinding::new(
            device,
            &params_layout,
            "Blur Params",
            &BlurParams::from_sigma(sigma),
        );
        let source = include_str!("../../shader/blur.wgsl");
        let resample = FullScreenPass::new(
            device,
            "Resample Pass",
            &[source],
            "fs_resample",
            &[&sampled_layout],
            BlendMode::Opaque,
        )?;
        let horizontal = FullScreenPass::new(
            device,
            "Blur Horizontal Pass",
            &[source],
            "fs_blur_horizontal",
            &[&sampled_layout, &params_layout],
            BlendMode::Opaque,
        )?;
        let vertical = FullScreenPass::new(
            device,
            "Blur Vertical Pass",
            &[source],
            "fs_blur_vertical",
            &[&sampled_layout, &params_layout],
            BlendMode::Opaque,
        )?;
        Ok(Self {
            sampled_layout,
            params,
            resample,
            horizontal,
            vertical,
        })
    }

    pub fn set_sigma(&self, queue: &wgpu::Queue, sigma: f32) {
        self.params.write(queue, &BlurParams::from_sigma(sigma));
    }

    pub fn sampled_layout(&self) -> &wgpu::BindGroupLayout {
        &self.sampled_layout
    }

    /// Bilinear copy of `source` into `target`, scaling to the target's size.
    pub fn resample(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        sampler: &wgpu::Sampler,
        source: &wgpu::TextureView,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        let group =
            sampled_texture_bind_group(device, &self.sampled_layout, source, sampler, "Resample");
        self.resample
            .draw(device, encoder, target, format, &[&group], Some(wgpu::Color::BLACK))
    }

    /// Blurs `target` in place, using `scratch` (same size and format) for the
    /// intermediate horizontal result.
    pub fn blur(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        sampler: &wgpu::Sampler,
        target: &wgpu::TextureView,
        scratch: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        let from_target =
            sampled_texture_bind_group(device, &self.sampled_layout, target, sampler, "Blur Source");
        self.horizontal.draw(
            device,
            encoder,
            scratch,
            format,
            &[&from_target, self.params.bind_group()],
            Some(wgpu::Color::BLACK),
        )?;
        let from_scratch =
            sampled_texture_bind_group(device, &self.sampled_layout, scratch, sampler, "Blur Scratch");
        self.vertical.draw(
            device,
            encoder,
            target,
            format,
            &[&from_scratch, self.params.bind_group()],
            Some(wgpu::Color::BLACK),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerator_matches_normal_density() {
        let sigma = 0.45;
        let expected = 1.0 / (2.0 * std::f32::consts::PI * sigma * sigma).sqrt();
        assert!((gaussian_numerator(sigma) - expected).abs() < 1e-6);
        assert!((gaussian_weight(sigma, 0.0) - expected).abs() < 1e-6);
    }

    #[test]
    fn weights_fall_off_with_distance() {
        let sigma = 2.0;
        assert!(gaussian_weight(sigma, 1.0) > gaussian_weight(sigma, 2.0));
        assert!(gaussian_weight(sigma, 2.0) > gaussian_weight(sigma, 5.0));
    }

    #[test]
    fn nonpositive_sigma_stays_finite() {
        for sigma in [0.0, -5.0] {
            let params = BlurParams::from_sigma(sigma);
            assert!(params.numerator.is_finite());
            assert!(params.denominator > 0.0);
            assert_eq!(params.radius, 1.0);
        }
    }

    #[test]
    fn radius_covers_three_sigma_up_to_cap() {
        assert_eq!(tap_radius(0.45), 2);
        assert_eq!(tap_radius(2.0), 6);
        assert_eq!(tap_radius(100.0), MAX_BLUR_RADIUS);
    }
}
