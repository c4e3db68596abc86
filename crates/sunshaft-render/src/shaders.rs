//! WGSL programs for the reference wgpu backend, and naga-based validation.
//!
//! The radial and Gaussian programs share the fullscreen vertex stage and the
//! bind group layout `@group(0)` = uniform block, `@group(1)` = mask texture +
//! sampler. The occluder program takes `@group(0)` = camera block and a
//! `vec3<f32>` world-space position at `@location(0)`.

use thiserror::Error;

/// Error types for shader validation.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{label}' failed to parse: {message}")]
    Parse { label: String, message: String },

    #[error("shader '{label}' failed validation: {message}")]
    Validation { label: String, message: String },
}

/// Unlit occluder: every fragment black.
pub const OCCLUDER_SHADER_SOURCE: &str = r#"
struct OccluderCamera {
    world_to_clip: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> camera: OccluderCamera;

@vertex
fn vs_occluder(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.world_to_clip * vec4<f32>(position, 1.0);
}

@fragment
fn fs_occluder() -> @location(0) vec4<f32> {
    return vec4<f32>(0.0, 0.0, 0.0, 1.0);
}
"#;

/// Radial streak blur around `_Center`.
///
/// `_Center` is viewport-normalized with y up; texture coordinates run y down.
pub const RADIAL_BLUR_SHADER_SOURCE: &str = r#"
struct RadialBlurParams {
    center: vec4<f32>,
    intensity: f32,
    blur_width: f32,
    _pad: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

const NUM_SAMPLES: i32 = 100;

@group(0) @binding(0) var<uniform> params: RadialBlurParams;
@group(1) @binding(0) var mask_tex: texture_2d<f32>;
@group(1) @binding(1) var mask_sampler: sampler;

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@fragment
fn fs_radial_blur(in: VertexOutput) -> @location(0) vec4<f32> {
    let center = vec2<f32>(params.center.x, 1.0 - params.center.y);
    let ray = in.uv - center;
    var color = vec4<f32>(0.0);
    for (var i = 0; i < NUM_SAMPLES; i++) {
        let scale = 1.0 - params.blur_width * (f32(i) / f32(NUM_SAMPLES - 1));
        color += textureSampleLevel(mask_tex, mask_sampler, ray * scale + center, 0.0);
    }
    color /= f32(NUM_SAMPLES);
    return color * params.intensity;
}
"#;

/// Separable 9-tap Gaussian along `(hstep, vstep)`, tap spacing `radius / resolution`.
pub const GAUSSIAN_BLUR_SHADER_SOURCE: &str = r#"
struct GaussianBlurParams {
    radius: f32,
    resolution: f32,
    hstep: f32,
    vstep: f32,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: GaussianBlurParams;
@group(1) @binding(0) var mask_tex: texture_2d<f32>;
@group(1) @binding(1) var mask_sampler: sampler;

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn tap(uv: vec2<f32>, offset: f32, weight: f32) -> vec4<f32> {
    let dir = vec2<f32>(params.hstep, params.vstep);
    let blur = params.radius / params.resolution;
    return textureSampleLevel(mask_tex, mask_sampler, uv + offset * blur * dir, 0.0) * weight;
}

@fragment
fn fs_gaussian_blur(in: VertexOutput) -> @location(0) vec4<f32> {
    var sum = tap(in.uv, 0.0, 0.2270270270);
    sum += tap(in.uv, -1.0, 0.1945945946) + tap(in.uv, 1.0, 0.1945945946);
    sum += tap(in.uv, -2.0, 0.1216216216) + tap(in.uv, 2.0, 0.1216216216);
    sum += tap(in.uv, -3.0, 0.0540540541) + tap(in.uv, 3.0, 0.0540540541);
    sum += tap(in.uv, -4.0, 0.0162162162) + tap(in.uv, 4.0, 0.0162162162);
    return vec4<f32>(sum.rgb, 1.0);
}
"#;

/// Parse and validate WGSL with naga.
pub fn validate_wgsl(label: &str, source: &str) -> Result<naga::Module, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Parse {
        label: label.to_string(),
        message: e.emit_to_string(source),
    })?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| ShaderError::Validation {
        label: label.to_string(),
        message: e.to_string(),
    })?;
    Ok(module)
}
