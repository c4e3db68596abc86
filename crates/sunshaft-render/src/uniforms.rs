//! Uniform contract of the radial-blur and Gaussian-blur programs.
//!
//! Uniform names are resolved once, at compile time, into [`UniformSlot`]s. Each
//! slot knows its shader-side name and its byte offset inside the owning
//! program's uniform block ([`RadialBlurParams`] or [`GaussianBlurParams`]).

use bytemuck::{Pod, Zeroable};

/// GPU uniform block of the radial-blur program (32 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RadialBlurParams {
    /// `_Center`: xy = viewport light position, zw = 0.
    pub center: [f32; 4],
    /// `_Intensity`.
    pub intensity: f32,
    /// `_BlurWidth`.
    pub blur_width: f32,
    pub _pad: [f32; 2],
}

/// GPU uniform block of the Gaussian-blur program (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GaussianBlurParams {
    pub radius: f32,
    pub resolution: f32,
    pub hstep: f32,
    pub vstep: f32,
}

/// A named uniform input of one of the compositing programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    /// Radial blur center (vec4).
    Center,
    /// Radial blur intensity.
    Intensity,
    /// Radial blur width.
    BlurWidth,
    /// Gaussian radius.
    Radius,
    /// Gaussian resolution.
    Resolution,
    /// Gaussian horizontal step.
    HorizontalStep,
    /// Gaussian vertical step.
    VerticalStep,
}

impl UniformSlot {
    /// Uniform name as declared by the shader program.
    pub const fn name(self) -> &'static str {
        match self {
            UniformSlot::Center => "_Center",
            UniformSlot::Intensity => "_Intensity",
            UniformSlot::BlurWidth => "_BlurWidth",
            UniformSlot::Radius => "radius",
            UniformSlot::Resolution => "resolution",
            UniformSlot::HorizontalStep => "hstep",
            UniformSlot::VerticalStep => "vstep",
        }
    }

    /// Byte offset inside the owning program's uniform block.
    pub const fn offset(self) -> usize {
        match self {
            UniformSlot::Center => std::mem::offset_of!(RadialBlurParams, center),
            UniformSlot::Intensity => std::mem::offset_of!(RadialBlurParams, intensity),
            UniformSlot::BlurWidth => std::mem::offset_of!(RadialBlurParams, blur_width),
            UniformSlot::Radius => std::mem::offset_of!(GaussianBlurParams, radius),
            UniformSlot::Resolution => std::mem::offset_of!(GaussianBlurParams, resolution),
            UniformSlot::HorizontalStep => std::mem::offset_of!(GaussianBlurParams, hstep),
            UniformSlot::VerticalStep => std::mem::offset_of!(GaussianBlurParams, vstep),
        }
    }
}

/// Value written into a [`UniformSlot`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vector(glam::Vec4),
}

impl UniformValue {
    /// Size of the value in bytes.
    pub fn size(&self) -> usize {
        match self {
            UniformValue::Float(_) => 4,
            UniformValue::Vector(_) => 16,
        }
    }

    /// Raw bit patterns, for exact comparisons that also hold for NaN payloads.
    pub fn to_bits(&self) -> [u32; 4] {
        match self {
            UniformValue::Float(v) => [v.to_bits(), 0, 0, 0],
            UniformValue::Vector(v) => v.to_array().map(f32::to_bits),
        }
    }

    /// Copy the value into `block` at `offset`.
    ///
    /// Returns `false` (and leaves `block` untouched) if the value does not fit.
    pub fn write_to(&self, block: &mut [u8], offset: usize) -> bool {
        let Some(dst) = block.get_mut(offset..offset + self.size()) else {
            return false;
        };
        match self {
            UniformValue::Float(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vector(v) => {
                dst.copy_from_slice(bytemuck::cast_slice(&v.to_array()));
            }
        }
        true
    }
}
