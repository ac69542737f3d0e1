use glam::Vec3;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::postprocess::depth_of_field::DepthOfFieldParams;
use crate::renderer::postprocess::hdr::HdrParams;
use crate::renderer::postprocess::motion_blur::MotionBlurParams;
use crate::renderer::postprocess::sky::SkyParams;
use crate::renderer::postprocess::ssao::{SsaoParams, SAMPLE_COUNTS};
use crate::renderer::postprocess::PARAM_EPSILON;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
    #[serde(default = "RenderSettings::default_directional_shadow_map_size")]
    pub directional_shadow_map_size: u32,
    #[serde(default = "RenderSettings::default_point_shadow_map_size")]
    pub point_shadow_map_size: u32,
    #[serde(default)]
    pub ssao: SsaoSettings,
    #[serde(default)]
    pub hdr: HdrSettings,
    #[serde(default)]
    pub motion_blur: MotionBlurSettings,
    #[serde(default)]
    pub sky: SkySettings,
    #[serde(default)]
    pub depth_of_field: DepthOfFieldSettings,
    #[serde(default = "RenderSettings::default_antialias")]
    pub antialias: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            present_mode: PresentModeSetting::default(),
            directional_shadow_map_size: Self::default_directional_shadow_map_size(),
            point_shadow_map_size: Self::default_point_shadow_map_size(),
            ssao: SsaoSettings::default(),
            hdr: HdrSettings::default(),
            motion_blur: MotionBlurSettings::default(),
            sky: SkySettings::default(),
            depth_of_field: DepthOfFieldSettings::default(),
            antialias: Self::default_antialias(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    /// Parses and validates; fields missing from `json` take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RenderSettings>(json).map(Self::validate)
    }

    pub fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if self.directional_shadow_map_size == 0 {
            warn!("Directional shadow map size must be greater than zero. Using default value.");
            self.directional_shadow_map_size = Self::default_directional_shadow_map_size();
        }

        // Each paraboloid half needs at least one texel column.
        if self.point_shadow_map_size < 2 {
            warn!("Point shadow map size must be at least 2. Using default value.");
            self.point_shadow_map_size = Self::default_point_shadow_map_size();
        }

        self.ssao = self.ssao.validate();
        self.hdr = self.hdr.validate();
        self.motion_blur = self.motion_blur.validate();
        self.depth_of_field = self.depth_of_field.validate();
        self
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    const fn default_directional_shadow_map_size() -> u32 {
        2048
    }

    const fn default_point_shadow_map_size() -> u32 {
        1024
    }

    const fn default_antialias() -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub sample_radius: f32,
    pub blur_sigma: f32,
    pub sample_power: f32,
    pub sample_count_index: usize,
    pub half_resolution: bool,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        let params = SsaoParams::default();
        Self {
            enabled: true,
            sample_radius: params.sample_radius,
            blur_sigma: params.blur_sigma,
            sample_power: params.sample_power,
            sample_count_index: params.sample_count_index,
            half_resolution: params.half_resolution,
        }
    }
}

impl SsaoSettings {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if !(self.sample_radius >= 0.0) {
            warn!("SSAO sample radius must not be negative. Using default value.");
            self.sample_radius = defaults.sample_radius;
        }
        if !(self.blur_sigma >= PARAM_EPSILON) {
            warn!("SSAO blur sigma must be positive. Using default value.");
            self.blur_sigma = defaults.blur_sigma;
        }
        if !(self.sample_power >= PARAM_EPSILON) {
            warn!("SSAO sample power must be positive. Using default value.");
            self.sample_power = defaults.sample_power;
        }
        if self.sample_count_index >= SAMPLE_COUNTS.len() {
            warn!(
                "SSAO sample count index {} is out of range. Using default value.",
                self.sample_count_index
            );
            self.sample_count_index = defaults.sample_count_index;
        }
        self
    }

    pub fn params(&self) -> SsaoParams {
        SsaoParams {
            sample_radius: self.sample_radius,
            blur_sigma: self.blur_sigma,
            sample_power: self.sample_power,
            sample_count_index: self.sample_count_index,
            half_resolution: self.half_resolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdrSettings {
    pub key: f32,
    pub white_point: f32,
    pub bloom_threshold: f32,
    pub bloom_magnitude: f32,
    pub bloom_blur_sigma: f32,
    pub adaptation_rate: f32,
}

impl Default for HdrSettings {
    fn default() -> Self {
        let params = HdrParams::default();
        Self {
            key: params.key,
            white_point: params.white_point,
            bloom_threshold: params.bloom_threshold,
            bloom_magnitude: params.bloom_magnitude,
            bloom_blur_sigma: params.bloom_blur_sigma,
            adaptation_rate: params.adaptation_rate,
        }
    }
}

impl HdrSettings {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if !(self.key >= PARAM_EPSILON) {
            warn!("HDR key must be positive. Using default value.");
            self.key = defaults.key;
        }
        if !(self.white_point >= PARAM_EPSILON) {
            warn!("HDR white point must be positive. Using default value.");
            self.white_point = defaults.white_point;
        }
        if !(self.bloom_blur_sigma >= PARAM_EPSILON) {
            warn!("Bloom blur sigma must be positive. Using default value.");
            self.bloom_blur_sigma = defaults.bloom_blur_sigma;
        }
        self
    }

    pub fn params(&self) -> HdrParams {
        HdrParams {
            key: self.key,
            white_point: self.white_point,
            bloom_threshold: self.bloom_threshold,
            bloom_magnitude: self.bloom_magnitude,
            bloom_blur_sigma: self.bloom_blur_sigma,
            adaptation_rate: self.adaptation_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionBlurSettings {
    pub enabled: bool,
    pub amount: f32,
    pub sample_count: u32,
}

impl Default for MotionBlurSettings {
    fn default() -> Self {
        let params = MotionBlurParams::default();
        Self {
            enabled: false,
            amount: params.amount,
            sample_count: params.sample_count,
        }
    }
}

impl MotionBlurSettings {
    fn validate(mut self) -> Self {
        if self.sample_count == 0 {
            warn!("Motion blur sample count must be greater than zero. Using default value.");
            self.sample_count = Self::default().sample_count;
        }
        self
    }

    pub fn params(&self) -> MotionBlurParams {
        MotionBlurParams {
            amount: self.amount,
            sample_count: self.sample_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkySettings {
    pub sky_color: [f32; 3],
    pub sun_enabled: bool,
    pub sun_color: [f32; 3],
    pub sun_intensity: f32,
    pub sun_direction: [f32; 3],
    pub sun_width: f32,
}

impl Default for SkySettings {
    fn default() -> Self {
        let params = SkyParams::default();
        Self {
            sky_color: params.sky_color.to_array(),
            sun_enabled: params.sun_enabled,
            sun_color: params.sun_color.to_array(),
            sun_intensity: params.sun_intensity,
            sun_direction: params.sun_direction.to_array(),
            sun_width: params.sun_width,
        }
    }
}

impl SkySettings {
    pub fn params(&self) -> SkyParams {
        SkyParams {
            sky_color: Vec3::from_array(self.sky_color),
            sun_enabled: self.sun_enabled,
            sun_color: Vec3::from_array(self.sun_color),
            sun_intensity: self.sun_intensity,
            sun_direction: Vec3::from_array(self.sun_direction),
            sun_width: self.sun_width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfFieldSettings {
    pub enabled: bool,
    pub focal_distance: f32,
    pub focal_falloff: f32,
    pub blur_sigma: f32,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        let params = DepthOfFieldParams::default();
        Self {
            enabled: false,
            focal_distance: params.focal_distance,
            focal_falloff: params.focal_falloff,
            blur_sigma: params.blur_sigma,
        }
    }
}

impl DepthOfFieldSettings {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if !(self.focal_falloff >= PARAM_EPSILON) {
            warn!("Focal falloff must be positive. Using default value.");
            self.focal_falloff = defaults.focal_falloff;
        }
        if !(self.blur_sigma >= PARAM_EPSILON) {
            warn!("Depth of field blur sigma must be positive. Using default value.");
            self.blur_sigma = defaults.blur_sigma;
        }
        self
    }

    pub fn params(&self) -> DepthOfFieldParams {
        DepthOfFieldParams {
            focal_distance: self.focal_distance,
            focal_falloff: self.focal_falloff,
            blur_sigma: self.blur_sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let invalid = RenderSettings {
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            directional_shadow_map_size: 0,
            point_shadow_map_size: 1,
            ..RenderSettings::default()
        };
        let validated = invalid.validate();
        let defaults = RenderSettings::default();

        assert_eq!(validated.resolution, defaults.resolution);
        assert_eq!(
            validated.directional_shadow_map_size,
            defaults.directional_shadow_map_size
        );
        assert_eq!(validated.point_shadow_map_size, defaults.point_shadow_map_size);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            directional_shadow_map_size: 4096,
            point_shadow_map_size: 512,
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        assert_eq!(valid.clone().validate(), valid);
    }

    #[test]
    fn present_mode_returns_desired_when_available() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Mailbox
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn present_mode_uses_first_available_when_fifo_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Immediate];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Immediate
        );
    }

    #[test]
    fn invalid_ssao_values_fall_back() {
        let settings = SsaoSettings {
            blur_sigma: -1.0,
            sample_count_index: 42,
            ..SsaoSettings::default()
        }
        .validate();
        assert_eq!(settings.blur_sigma, SsaoSettings::default().blur_sigma);
        assert_eq!(settings.sample_count_index, 3);
    }
}
