//! Validated, immutable effect parameters and intermediate buffer format mapping.

use sunshaft_config::{ColorFormat, EffectConfig};

/// Errors raised when building [`EffectParameters`] from configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    /// The value lies outside the parameter's allowed interval.
    #[error("{name} = {value} is outside {range}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        range: &'static str,
    },

    /// The value is NaN or infinite.
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f32 },
}

/// Parameters of the light scattering effect, captured once per pipeline build.
///
/// Fields are private: once constructed through [`TryFrom<&EffectConfig>`] the
/// set cannot change for the lifetime of the effect instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectParameters {
    resolution_scale: f32,
    intensity: f32,
    blur_width: f32,
    diffuse_enabled: bool,
    diffuse_radius: f32,
    light_quality: f32,
    horizontal_step: f32,
    vertical_step: f32,
    color_format: ColorFormat,
}

const UNIT: &str = "[0, 1]";

fn finite(name: &'static str, value: f32) -> Result<f32, ParameterError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParameterError::NotFinite { name, value })
    }
}

/// Check `value ∈ [0, max]`.
fn closed(
    name: &'static str,
    value: f32,
    max: f32,
    range: &'static str,
) -> Result<f32, ParameterError> {
    let value = finite(name, value)?;
    if (0.0..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ParameterError::OutOfRange { name, value, range })
    }
}

impl TryFrom<&EffectConfig> for EffectParameters {
    type Error = ParameterError;

    fn try_from(config: &EffectConfig) -> Result<Self, Self::Error> {
        let resolution_scale = finite("resolution_scale", config.resolution_scale)?;
        if !(resolution_scale > 0.0 && resolution_scale <= 1.0) {
            return Err(ParameterError::OutOfRange {
                name: "resolution_scale",
                value: resolution_scale,
                range: "(0, 1]",
            });
        }

        let light_quality = finite("light_quality", config.light_quality)?;
        if light_quality <= 0.0 {
            return Err(ParameterError::OutOfRange {
                name: "light_quality",
                value: light_quality,
                range: "(0, inf)",
            });
        }

        Ok(Self {
            resolution_scale,
            intensity: closed("intensity", config.intensity, 1.0, UNIT)?,
            blur_width: closed("blur_width", config.blur_width, 1.0, UNIT)?,
            diffuse_enabled: config.diffuse_enabled,
            diffuse_radius: closed("diffuse_radius", config.diffuse_radius, 30.0, "[0, 30]")?,
            light_quality,
            horizontal_step: closed("horizontal_step", config.horizontal_step, 1.0, UNIT)?,
            vertical_step: closed("vertical_step", config.vertical_step, 1.0, UNIT)?,
            color_format: config.color_format,
        })
    }
}

impl Default for EffectParameters {
    fn default() -> Self {
        let defaults = EffectConfig::default();
        Self {
            resolution_scale: defaults.resolution_scale,
            intensity: defaults.intensity,
            blur_width: defaults.blur_width,
            diffuse_enabled: defaults.diffuse_enabled,
            diffuse_radius: defaults.diffuse_radius,
            light_quality: defaults.light_quality,
            horizontal_step: defaults.horizontal_step,
            vertical_step: defaults.vertical_step,
            color_format: defaults.color_format,
        }
    }
}

impl EffectParameters {
    pub fn resolution_scale(&self) -> f32 {
        self.resolution_scale
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn blur_width(&self) -> f32 {
        self.blur_width
    }

    pub fn diffuse_enabled(&self) -> bool {
        self.diffuse_enabled
    }

    pub fn diffuse_radius(&self) -> f32 {
        self.diffuse_radius
    }

    /// Gaussian `resolution` uniform; a sample-density proxy.
    pub fn light_quality(&self) -> f32 {
        self.light_quality
    }

    pub fn horizontal_step(&self) -> f32 {
        self.horizontal_step
    }

    pub fn vertical_step(&self) -> f32 {
        self.vertical_step
    }

    pub fn color_format(&self) -> ColorFormat {
        self.color_format
    }
}

/// Texture format of the intermediate occlusion buffer.
///
/// Unknown [`ColorFormat`] variants keep the camera target's own format.
pub fn intermediate_format(
    color_format: ColorFormat,
    camera_format: wgpu::TextureFormat,
) -> wgpu::TextureFormat {
    match color_format {
        ColorFormat::Default => wgpu::TextureFormat::Rgba8Unorm,
        ColorFormat::Hdr => wgpu::TextureFormat::Rgba16Float,
        _ => camera_format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(config: EffectConfig) -> Result<EffectParameters, ParameterError> {
        EffectParameters::try_from(&config)
    }

    #[test]
    fn test_default_config_is_valid() {
        let params = build(EffectConfig::default()).unwrap();
        assert_eq!(params, EffectParameters::default());
        assert_eq!(params.resolution_scale(), 0.5);
        assert_eq!(params.blur_width(), 0.85);
        assert_eq!(params.light_quality(), 1800.0);
    }

    #[test]
    fn test_resolution_scale_excludes_zero() {
        let err = build(EffectConfig {
            resolution_scale: 0.0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ParameterError::OutOfRange {
                name: "resolution_scale",
                ..
            }
        ));
    }

    #[test]
    fn test_resolution_scale_includes_one() {
        let params = build(EffectConfig {
            resolution_scale: 1.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(params.resolution_scale(), 1.0);
    }

    #[test]
    fn test_intensity_above_one_rejected() {
        let err = build(EffectConfig {
            intensity: 1.5,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "intensity = 1.5 is outside [0, 1]");
    }

    #[test]
    fn test_diffuse_radius_bounds() {
        assert!(
            build(EffectConfig {
                diffuse_radius: 30.0,
                ..Default::default()
            })
            .is_ok()
        );
        assert!(
            build(EffectConfig {
                diffuse_radius: 30.5,
                ..Default::default()
            })
            .is_err()
        );
    }

    #[test]
    fn test_light_quality_must_be_positive() {
        assert!(
            build(EffectConfig {
                light_quality: 0.0,
                ..Default::default()
            })
            .is_err()
        );
        let params = build(EffectConfig {
            light_quality: 1.0e6,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(params.light_quality(), 1.0e6);
    }

    #[test]
    fn test_nan_rejected() {
        let err = build(EffectConfig {
            vertical_step: f32::NAN,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ParameterError::NotFinite {
                name: "vertical_step",
                ..
            }
        ));
    }

    #[test]
    fn test_format_mapping() {
        let camera = wgpu::TextureFormat::Bgra8UnormSrgb;
        assert_eq!(
            intermediate_format(ColorFormat::Default, camera),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            intermediate_format(ColorFormat::Hdr, camera),
            wgpu::TextureFormat::Rgba16Float
        );
    }
}
