//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "sunshaft";
const CONFIG_FILE_NAME: &str = "config.ron";

/// Color format requested for the intermediate occlusion buffer.
///
/// New variants may be added; consumers map unknown variants to the camera's
/// own target format.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[non_exhaustive]
pub enum ColorFormat {
    /// 8-bit-per-channel low dynamic range.
    Default,
    /// Half-float high dynamic range.
    #[default]
    Hdr,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Light scattering effect tunables.
    pub effect: EffectConfig,
    /// Demo scene and camera settings.
    pub scene: SceneConfig,
    /// Output settings for the demo.
    pub output: OutputConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// User-facing tunables of the light scattering effect.
///
/// Values are validated when the effect is built, not here, so a config file
/// with out-of-range values still loads and reports the problem at build time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EffectConfig {
    /// Intermediate buffer scale relative to the camera target. Range (0, 1].
    pub resolution_scale: f32,
    /// Radial blur intensity. Range [0, 1].
    pub intensity: f32,
    /// Radial blur width. Range [0, 1].
    pub blur_width: f32,
    /// Run the separable Gaussian pass before the radial pass.
    pub diffuse_enabled: bool,
    /// Gaussian blur radius. Range [0, 30].
    pub diffuse_radius: f32,
    /// Gaussian blur resolution (sample density proxy). Positive.
    pub light_quality: f32,
    /// Gaussian horizontal step. Range [0, 1].
    pub horizontal_step: f32,
    /// Gaussian vertical step. Range [0, 1].
    pub vertical_step: f32,
    /// Intermediate buffer color format.
    pub color_format: ColorFormat,
}

/// Scene and camera used by the headless demo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Camera target width in pixels.
    pub width: u32,
    /// Camera target height in pixels.
    pub height: u32,
    /// Number of frames to render.
    pub frames: u32,
    /// Camera position in world space.
    pub camera_position: [f32; 3],
    /// Point the camera looks at.
    pub camera_target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Forward direction of the dominant directional light.
    pub light_forward: [f32; 3],
    /// Color the sky is drawn with in the occlusion mask (linear RGBA).
    pub sky_color: [f32; 4],
}

/// Demo output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Write the final camera color target here as PNG.
    pub png_path: Option<PathBuf>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            resolution_scale: 0.5,
            intensity: 1.0,
            blur_width: 0.85,
            diffuse_enabled: true,
            diffuse_radius: 30.0,
            light_quality: 1800.0,
            horizontal_step: 0.1,
            vertical_step: 0.1,
            color_format: ColorFormat::Hdr,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frames: 3,
            camera_position: [0.0, 1.5, -8.0],
            camera_target: [0.0, 1.5, 0.0],
            fov_y_degrees: 60.0,
            light_forward: [0.15, 0.2, 1.0],
            sky_color: [1.0, 0.95, 0.85, 1.0],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Platform configuration directory for Sunshaft (`<config>/sunshaft`).
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Path of the config file inside `config_dir`.
    pub fn file_path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE_NAME)
    }

    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// when the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::file_path(config_dir);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default sunshaft config to {}", path.display());
            return Ok(config);
        }
        let config = read_config(&path)?;
        log::info!("Loaded sunshaft config from {}", path.display());
        Ok(config)
    }

    /// Write this config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = Self::file_path(config_dir);
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let encoded = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(&path, encoded).map_err(write_err)
    }

    /// Re-read the file. `Some` only when its contents differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&Self::file_path(config_dir))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Sunshaft config changed on disk");
        Ok(Some(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_effect_matches_reference_tuning() {
        let effect = EffectConfig::default();
        assert_eq!(effect.resolution_scale, 0.5);
        assert_eq!(effect.intensity, 1.0);
        assert_eq!(effect.blur_width, 0.85);
        assert!(effect.diffuse_enabled);
        assert_eq!(effect.diffuse_radius, 30.0);
        assert_eq!(effect.light_quality, 1800.0);
        assert_eq!(effect.horizontal_step, 0.1);
        assert_eq!(effect.vertical_step, 0.1);
        assert_eq!(effect.color_format, ColorFormat::Hdr);
    }

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("resolution_scale: 0.5"));
        assert!(ron_str.contains("color_format: Hdr"));
        assert!(ron_str.contains("width: 1280"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(effect: (intensity: 0.4))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.effect.intensity, 0.4);
        assert_eq!(config.effect.blur_width, 0.85);
        assert_eq!(config.scene, SceneConfig::default());
    }

    #[test]
    fn test_color_format_parses_by_name() {
        let config: Config = ron::from_str("(effect: (color_format: Default))").unwrap();
        assert_eq!(config.effect.color_format, ColorFormat::Default);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_out_of_range_values_still_load() {
        let config: Config = ron::from_str("(effect: (resolution_scale: 4.0))").unwrap();
        assert_eq!(config.effect.resolution_scale, 4.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.effect.diffuse_enabled = false;
        config.scene.width = 1920;
        config.output.png_path = Some(PathBuf::from("out.png"));

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(Config::file_path(dir.path()).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.effect.blur_width = 0.5;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.effect.blur_width), Some(0.5));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_corrupt_file_reports_parse_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::file_path(dir.path()), "{{not valid}}").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err:?}");
        assert!(err.to_string().contains("config.ron"));
    }

    #[test]
    fn test_reload_of_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }), "got {err:?}");
    }
}
