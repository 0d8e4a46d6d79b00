//! Color-space policy and sRGB transfer functions

use serde::{Deserialize, Serialize};

/// RGBA color with components in `[0, 1]`
pub type Rgba = [f32; 4];

/// 8-bit RGBA surface formats the stereo pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    /// Hardware decodes on read and encodes on write
    Rgba8UnormSrgb,
}

impl TextureFormat {
    #[inline]
    pub fn is_srgb(self) -> bool {
        self == TextureFormat::Rgba8UnormSrgb
    }
}

/// Where linear-to-sRGB conversion happens; fixed for the life of the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpacePolicy {
    /// sRGB surface formats; the hardware converts
    #[default]
    HardwareSrgb,
    /// Linear surfaces; the weaver converts in its shader on read and write
    ShaderSrgb,
    /// Linear surfaces; colors are pre-encoded on the CPU
    #[serde(rename = "default", alias = "linear")]
    Linear,
}

impl ColorSpacePolicy {
    /// Format of the view texture and the swapchain backbuffer
    pub fn surface_format(self) -> TextureFormat {
        match self {
            ColorSpacePolicy::HardwareSrgb => TextureFormat::Rgba8UnormSrgb,
            ColorSpacePolicy::ShaderSrgb | ColorSpacePolicy::Linear => TextureFormat::Rgba8Unorm,
        }
    }

    /// `(read, write)` flags for the weaver's shader conversion, if enabled
    pub fn shader_conversion(self) -> Option<(bool, bool)> {
        match self {
            ColorSpacePolicy::ShaderSrgb => Some((true, true)),
            _ => None,
        }
    }

    /// Prepare a linear scalar for upload
    #[inline]
    pub fn encode_scalar(self, value: f32) -> f32 {
        match self {
            ColorSpacePolicy::Linear => linear_to_srgb(value),
            _ => value,
        }
    }

    /// Prepare a linear color for upload; alpha is never converted
    pub fn encode(self, color: Rgba) -> Rgba {
        [
            self.encode_scalar(color[0]),
            self.encode_scalar(color[1]),
            self.encode_scalar(color[2]),
            color[3],
        ]
    }
}

/// Linear to sRGB transfer, clamped to `[0, 1]`
pub fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.0 {
        0.0
    } else if value >= 1.0 {
        1.0
    } else if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB to linear transfer, clamped to `[0, 1]`
pub fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.0 {
        0.0
    } else if value >= 1.0 {
        1.0
    } else if value <= 0.040_45 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// Quantize a `[0, 1]` value to an 8-bit channel
#[inline]
pub fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn from_unorm8(value: u8) -> f32 {
    value as f32 / 255.0
}
