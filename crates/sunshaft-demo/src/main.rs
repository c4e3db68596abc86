//! Headless demo that renders volumetric light scattering over a small occluder scene.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p sunshaft-demo -- --output shafts.png` to write the last frame.

mod scene;

use std::path::{Path, PathBuf};

use clap::Parser;
use glam::Vec3;
use sunshaft_config::{CliArgs, Config, default_config_dir};
use sunshaft_render::{
    AllocationError, BackendError, Camera, CameraFrame, EffectParameters, FilterMode,
    HeadlessContextError, LightScatteringEffect, ParameterError, Readback,
    RenderBackend, RenderStage, TargetDescriptor, TextureId, WgpuBackend,
    init_headless_blocking,
};
use tracing::{error, info, warn};

/// Background the camera target is cleared to before the effect runs.
const BACKGROUND: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.03,
    b: 0.05,
    a: 1.0,
};

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("invalid effect parameters: {0}")]
    Parameters(#[from] ParameterError),

    #[error("GPU initialization failed: {0}")]
    Gpu(#[from] HeadlessContextError),

    #[error("camera target allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to encode PNG: {0}")]
    Png(#[from] png::EncodingError),

    #[error("failed to create {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => match default_config_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Failed to resolve config directory: {e}");
                std::process::exit(1);
            }
        },
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config
        .debug
        .log_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("logs"));
    sunshaft_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), DemoError> {
    let params = EffectParameters::try_from(&config.effect)?;
    let ctx = init_headless_blocking()?;
    let mut backend = WgpuBackend::new(ctx.device.clone(), ctx.queue.clone());
    backend.set_sky_color(config.scene.sky_color);
    render(&mut backend, config, params)
}

/// Render the configured frames into a camera target and free it afterwards,
/// whether or not rendering succeeded.
fn render(
    backend: &mut WgpuBackend,
    config: &Config,
    params: EffectParameters,
) -> Result<(), DemoError> {
    let camera_desc = TargetDescriptor {
        width: config.scene.width,
        height: config.scene.height,
        depth_bits: 0,
        format: wgpu::TextureFormat::Rgba8Unorm,
    };
    let color_target = backend.allocate_target(&camera_desc, FilterMode::Bilinear, "camera-color")?;
    let result = render_into(backend, config, params, color_target, &camera_desc);
    backend.release_target(color_target);
    result
}

fn render_into(
    backend: &mut WgpuBackend,
    config: &Config,
    params: EffectParameters,
    color_target: TextureId,
    camera_desc: &TargetDescriptor,
) -> Result<(), DemoError> {
    let programs = backend.create_default_programs();
    let effect = LightScatteringEffect::new(params, programs);
    let scene = scene::build_scene(backend.device());

    let camera = Camera::look_at(
        Vec3::from_array(config.scene.camera_position),
        Vec3::from_array(config.scene.camera_target),
        Vec3::Y,
    )
    .with_perspective(
        config.scene.fov_y_degrees,
        camera_desc.width,
        camera_desc.height,
    );
    let light_forward = Vec3::from_array(config.scene.light_forward).normalize_or_zero();
    if light_forward == Vec3::ZERO {
        warn!("Light direction is zero; the radial blur will be centred on the camera origin");
    }

    info!(
        width = camera_desc.width,
        height = camera_desc.height,
        frames = config.scene.frames,
        "Rendering light scattering"
    );

    for frame_index in 0..config.scene.frames {
        backend.clear_target(color_target, BACKGROUND)?;

        let mut frame = effect.prepare(&mut *backend, camera_desc);
        let inputs = CameraFrame::<WgpuBackend> {
            color_target,
            draw_list: scene.as_slice(),
            camera: camera.view(),
            light_forward,
        };
        effect.execute(&mut *backend, &mut frame, &inputs);
        let phase = frame.phase();
        let light = frame.light_position();
        effect.release(&mut *backend, frame);
        backend.submit();

        info!(frame = frame_index, ?phase, ?light, "Frame rendered");
    }

    if let Some(path) = &config.output.png_path {
        let readback = backend.read_rgba8(color_target)?;
        write_png(path, &readback)?;
        info!(path = %path.display(), "Wrote final frame");
    }
    Ok(())
}

fn write_png(path: &Path, readback: &Readback) -> Result<(), DemoError> {
    let file = std::fs::File::create(path).map_err(|source| DemoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut encoder = png::Encoder::new(
        std::io::BufWriter::new(file),
        readback.width,
        readback.height,
    );
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&readback.pixels)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_png_round_trips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let readback = Readback {
            width: 3,
            height: 2,
            pixels: vec![128; 3 * 2 * 4],
        };
        write_png(&path, &readback).unwrap();

        let decoder = png::Decoder::new(std::fs::File::open(&path).unwrap());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (3, 2));
        assert_eq!(info.color_type, png::ColorType::Rgba);
    }

    #[test]
    fn test_write_png_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("frame.png");
        let readback = Readback {
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        };
        let err = write_png(&path, &readback).unwrap_err();
        assert!(matches!(err, DemoError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn test_render_releases_every_target() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let mut backend = WgpuBackend::new(ctx.device.clone(), ctx.queue.clone());
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scene.width = 64;
        config.scene.height = 48;
        config.scene.frames = 2;
        config.output.png_path = Some(dir.path().join("frame.png"));
        let params = EffectParameters::try_from(&config.effect).unwrap();

        render(&mut backend, &config, params).unwrap();
        assert_eq!(backend.live_target_count(), 0);
        assert!(dir.path().join("frame.png").exists());
    }

    #[test]
    fn test_render_releases_camera_target_when_output_fails() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let mut backend = WgpuBackend::new(ctx.device.clone(), ctx.queue.clone());
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scene.width = 32;
        config.scene.height = 32;
        config.scene.frames = 1;
        config.output.png_path = Some(dir.path().join("missing").join("frame.png"));
        let params = EffectParameters::try_from(&config.effect).unwrap();

        let err = render(&mut backend, &config, params).unwrap_err();
        assert!(matches!(err, DemoError::Io { .. }), "got {err:?}");
        assert_eq!(backend.live_target_count(), 0);
    }

    #[test]
    fn test_invalid_config_is_reported_before_gpu_init() {
        let mut config = Config::default();
        config.effect.resolution_scale = 0.0;
        let err = run(&config).unwrap_err();
        assert!(matches!(err, DemoError::Parameters(_)), "got {err:?}");
    }
}
