//! Command-line argument parsing for the Sunshaft demo.

use std::path::PathBuf;

use clap::Parser;

use crate::{ColorFormat, Config};

/// Sunshaft command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "sunshaft", about = "Screen-space volumetric light scattering demo")]
pub struct CliArgs {
    /// Camera target width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Camera target height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Number of frames to render.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Intermediate buffer resolution scale (0.1 - 1.0).
    #[arg(long)]
    pub resolution_scale: Option<f32>,

    /// Radial blur intensity (0 - 1).
    #[arg(long)]
    pub intensity: Option<f32>,

    /// Radial blur width (0 - 1).
    #[arg(long)]
    pub blur_width: Option<f32>,

    /// Disable the diffuse Gaussian pass.
    #[arg(long)]
    pub no_diffuse: bool,

    /// Intermediate buffer color format.
    #[arg(long, value_enum)]
    pub color_format: Option<ColorFormat>,

    /// Write the final frame to this PNG file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.scene.width = w;
        }
        if let Some(h) = args.height {
            self.scene.height = h;
        }
        if let Some(frames) = args.frames {
            self.scene.frames = frames;
        }
        if let Some(scale) = args.resolution_scale {
            self.effect.resolution_scale = scale;
        }
        if let Some(intensity) = args.intensity {
            self.effect.intensity = intensity;
        }
        if let Some(width) = args.blur_width {
            self.effect.blur_width = width;
        }
        if args.no_diffuse {
            self.effect.diffuse_enabled = false;
        }
        if let Some(format) = args.color_format {
            self.effect.color_format = format;
        }
        if let Some(ref path) = args.output {
            self.output.png_path = Some(path.clone());
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            resolution_scale: Some(0.25),
            no_diffuse: true,
            color_format: Some(ColorFormat::Default),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.scene.width, 1920);
        assert_eq!(config.effect.resolution_scale, 0.25);
        assert!(!config.effect.diffuse_enabled);
        assert_eq!(config.effect.color_format, ColorFormat::Default);
        // Non-overridden fields retain defaults
        assert_eq!(config.scene.height, 720);
        assert_eq!(config.effect.blur_width, 0.85);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "sunshaft",
            "--width",
            "640",
            "--no-diffuse",
            "--color-format",
            "hdr",
            "--output",
            "frame.png",
        ]);
        assert_eq!(args.width, Some(640));
        assert!(args.no_diffuse);
        assert_eq!(args.color_format, Some(ColorFormat::Hdr));
        assert_eq!(args.output, Some(PathBuf::from("frame.png")));
    }
}
