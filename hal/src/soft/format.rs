//! Texel encoding and decoding.
//!
//! Every supported format decodes to an RGBA `Vec4`. Single-channel and
//! depth formats fill `x` and leave `(0, 0, 1)` in the rest.

use glam::Vec4;

use crate::error::BackendError;
use crate::types::TextureFormat;

/// Fail for formats the software driver cannot store.
pub(crate) fn check_supported(format: TextureFormat) -> Result<(), BackendError> {
    match format {
        TextureFormat::R16Float | TextureFormat::Rgba16Float | TextureFormat::Depth24PlusStencil8 => Err(
            BackendError::Unsupported(format!("texture format {format:?} in the software driver")),
        ),
        _ => Ok(()),
    }
}

fn read_f32(bytes: &[u8], index: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[index * 4..index * 4 + 4])
}

fn write_f32(bytes: &mut [u8], index: usize, value: f32) {
    bytes[index * 4..index * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub(crate) fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub(crate) fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Decode one texel. `bytes` holds exactly one block.
pub(crate) fn decode(format: TextureFormat, bytes: &[u8]) -> Vec4 {
    let rgba8 = |order: [usize; 4], srgb: bool| {
        let c = |i: usize| bytes[order[i]] as f32 / 255.0;
        let (r, g, b) = (c(0), c(1), c(2));
        if srgb {
            Vec4::new(srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), c(3))
        } else {
            Vec4::new(r, g, b, c(3))
        }
    };

    match format {
        TextureFormat::R8Unorm => Vec4::new(bytes[0] as f32 / 255.0, 0.0, 0.0, 1.0),
        TextureFormat::R32Float | TextureFormat::Depth32Float => Vec4::new(read_f32(bytes, 0), 0.0, 0.0, 1.0),
        TextureFormat::R32Uint => {
            let value: u32 = bytemuck::pod_read_unaligned(&bytes[..4]);
            Vec4::new(value as f32, 0.0, 0.0, 1.0)
        }
        TextureFormat::Rgba8Unorm => rgba8([0, 1, 2, 3], false),
        TextureFormat::Rgba8UnormSrgb => rgba8([0, 1, 2, 3], true),
        TextureFormat::Bgra8Unorm => rgba8([2, 1, 0, 3], false),
        TextureFormat::Bgra8UnormSrgb => rgba8([2, 1, 0, 3], true),
        TextureFormat::Rg32Float => Vec4::new(read_f32(bytes, 0), read_f32(bytes, 1), 0.0, 1.0),
        TextureFormat::Rgba32Float => Vec4::new(
            read_f32(bytes, 0),
            read_f32(bytes, 1),
            read_f32(bytes, 2),
            read_f32(bytes, 3),
        ),
        TextureFormat::Depth16Unorm => {
            let value: u16 = bytemuck::pod_read_unaligned(&bytes[..2]);
            Vec4::new(value as f32 / u16::MAX as f32, 0.0, 0.0, 1.0)
        }
        TextureFormat::Depth24Plus => {
            let value: u32 = bytemuck::pod_read_unaligned(&bytes[..4]);
            Vec4::new((value & 0x00ff_ffff) as f32 / 0x00ff_ffff as f32, 0.0, 0.0, 1.0)
        }
        TextureFormat::R16Float | TextureFormat::Rgba16Float | TextureFormat::Depth24PlusStencil8 => Vec4::ZERO,
    }
}

/// Encode one texel into `out`, which holds exactly one block.
pub(crate) fn encode(format: TextureFormat, value: Vec4, out: &mut [u8]) {
    let rgba8 = |out: &mut [u8], order: [usize; 4], srgb: bool| {
        let rgb = if srgb {
            [linear_to_srgb(value.x), linear_to_srgb(value.y), linear_to_srgb(value.z)]
        } else {
            [value.x, value.y, value.z]
        };
        for (i, c) in rgb.into_iter().enumerate() {
            out[order[i]] = unorm8(c);
        }
        out[order[3]] = unorm8(value.w);
    };

    match format {
        TextureFormat::R8Unorm => out[0] = unorm8(value.x),
        TextureFormat::R32Float | TextureFormat::Depth32Float => write_f32(out, 0, value.x),
        TextureFormat::R32Uint => out[..4].copy_from_slice(&(value.x.max(0.0) as u32).to_le_bytes()),
        TextureFormat::Rgba8Unorm => rgba8(out, [0, 1, 2, 3], false),
        TextureFormat::Rgba8UnormSrgb => rgba8(out, [0, 1, 2, 3], true),
        TextureFormat::Bgra8Unorm => rgba8(out, [2, 1, 0, 3], false),
        TextureFormat::Bgra8UnormSrgb => rgba8(out, [2, 1, 0, 3], true),
        TextureFormat::Rg32Float => {
            write_f32(out, 0, value.x);
            write_f32(out, 1, value.y);
        }
        TextureFormat::Rgba32Float => {
            for (i, c) in value.to_array().into_iter().enumerate() {
                write_f32(out, i, c);
            }
        }
        TextureFormat::Depth16Unorm => {
            let depth = (value.x.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16;
            out[..2].copy_from_slice(&depth.to_le_bytes());
        }
        TextureFormat::Depth24Plus => {
            let depth = (value.x.clamp(0.0, 1.0) * 0x00ff_ffff as f32).round() as u32;
            out[..4].copy_from_slice(&depth.to_le_bytes());
        }
        TextureFormat::R16Float | TextureFormat::Rgba16Float | TextureFormat::Depth24PlusStencil8 => {}
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::r8(TextureFormat::R8Unorm, Vec4::new(1.0, 0.0, 0.0, 1.0))]
    #[case::rgba8(TextureFormat::Rgba8Unorm, Vec4::new(1.0, 0.0, 0.2, 1.0))]
    #[case::bgra8(TextureFormat::Bgra8Unorm, Vec4::new(0.0, 0.6, 1.0, 0.4))]
    #[case::r32f(TextureFormat::R32Float, Vec4::new(42.42, 0.0, 0.0, 1.0))]
    #[case::r32u(TextureFormat::R32Uint, Vec4::new(7.0, 0.0, 0.0, 1.0))]
    #[case::rgba32f(TextureFormat::Rgba32Float, Vec4::new(-1.5, 2.0, 1e6, 0.25))]
    #[case::depth32(TextureFormat::Depth32Float, Vec4::new(0.75, 0.0, 0.0, 1.0))]
    fn test_texel_survives_encoding(#[case] format: TextureFormat, #[case] value: Vec4) {
        let mut block = vec![0u8; format.block_size() as usize];
        encode(format, value, &mut block);
        let decoded = decode(format, &block);
        assert!((decoded - value).abs().max_element() < 1.0 / 255.0, "{decoded} vs {value}");
    }

    #[test]
    fn test_bgra_byte_order() {
        let mut block = [0u8; 4];
        encode(TextureFormat::Bgra8Unorm, Vec4::new(1.0, 0.0, 0.0, 1.0), &mut block);
        assert_eq!(block, [0, 0, 255, 255]);
    }

    #[test]
    fn test_srgb_round_trip_is_stable() {
        for c in [0.0, 0.01, 0.5, 1.0] {
            assert!((srgb_to_linear(linear_to_srgb(c)) - c).abs() < 1e-4);
        }
    }

    #[test]
    fn test_half_float_formats_rejected() {
        assert!(check_supported(TextureFormat::Rgba16Float).is_err());
        assert!(check_supported(TextureFormat::Rgba8Unorm).is_ok());
    }
}
