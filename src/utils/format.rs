//! Per-texel format descriptions used when packing image data into staging
//! memory.
//!
//! Only formats with byte-addressable texels are described; block-compressed
//! formats never go through the texel-expansion path and report a size of 0.

use ash::vk;

/// Byte pattern for a component value of 1.0 (or the integer maximum),
/// repeated across 16 bytes so any component of any described format can be
/// sliced out of it.
const ONE_UNORM8: [u8; 16] = [0xff; 16];
const ONE_SNORM8: [u8; 16] = [0x7f; 16];
#[rustfmt::skip]
const ONE_SNORM16: [u8; 16] = [0xff, 0x7f, 0xff, 0x7f, 0xff, 0x7f, 0xff, 0x7f, 0xff, 0x7f, 0xff, 0x7f, 0xff, 0x7f, 0xff, 0x7f];
#[rustfmt::skip]
const ONE_SFLOAT16: [u8; 16] = [0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c];
#[rustfmt::skip]
const ONE_SINT32: [u8; 16] = [0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff, 0x7f];
#[rustfmt::skip]
const ONE_SFLOAT32: [u8; 16] = [0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x80, 0x3f];

/// Description of a single texel of a format: its byte size and the byte
/// pattern used to fill components that the source data does not provide
/// (for example the alpha channel when widening RGB data to an RGBA format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTraits {
    /// Bytes per texel. 0 for formats this table does not describe.
    pub size: u32,
    /// Component-repeated "one" value. When a texel is widened, the bytes at
    /// `[source_size..target_size]` of this pattern become the fill.
    pub default_value: [u8; 16],
}

impl FormatTraits {
    const UNDESCRIBED: FormatTraits = FormatTraits {
        size: 0,
        default_value: [0; 16],
    };
}

/// Looks up the traits for `format`.
///
/// Formats without a byte-addressable texel description (block-compressed,
/// multi-planar) return a zero-sized entry.
#[rustfmt::skip]
pub fn format_traits(format: vk::Format) -> FormatTraits {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB | vk::Format::R8_UINT | vk::Format::R8_USCALED => FormatTraits { size: 1, default_value: ONE_UNORM8 },
        vk::Format::R8_SNORM | vk::Format::R8_SINT | vk::Format::R8_SSCALED => FormatTraits { size: 1, default_value: ONE_SNORM8 },
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SRGB | vk::Format::R8G8_UINT | vk::Format::R8G8_USCALED => FormatTraits { size: 2, default_value: ONE_UNORM8 },
        vk::Format::R8G8_SNORM | vk::Format::R8G8_SINT | vk::Format::R8G8_SSCALED => FormatTraits { size: 2, default_value: ONE_SNORM8 },
        vk::Format::R8G8B8_UNORM | vk::Format::R8G8B8_SRGB | vk::Format::R8G8B8_UINT | vk::Format::R8G8B8_USCALED
        | vk::Format::B8G8R8_UNORM | vk::Format::B8G8R8_SRGB | vk::Format::B8G8R8_UINT => FormatTraits { size: 3, default_value: ONE_UNORM8 },
        vk::Format::R8G8B8_SNORM | vk::Format::R8G8B8_SINT | vk::Format::B8G8R8_SNORM | vk::Format::B8G8R8_SINT => FormatTraits { size: 3, default_value: ONE_SNORM8 },
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB | vk::Format::R8G8B8A8_UINT | vk::Format::R8G8B8A8_USCALED
        | vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB | vk::Format::B8G8R8A8_UINT
        | vk::Format::A8B8G8R8_UNORM_PACK32 | vk::Format::A8B8G8R8_SRGB_PACK32 => FormatTraits { size: 4, default_value: ONE_UNORM8 },
        vk::Format::R8G8B8A8_SNORM | vk::Format::R8G8B8A8_SINT | vk::Format::B8G8R8A8_SNORM | vk::Format::B8G8R8A8_SINT => FormatTraits { size: 4, default_value: ONE_SNORM8 },
        vk::Format::R16_UNORM | vk::Format::R16_UINT | vk::Format::R16_USCALED => FormatTraits { size: 2, default_value: ONE_UNORM8 },
        vk::Format::R16_SNORM | vk::Format::R16_SINT | vk::Format::R16_SSCALED => FormatTraits { size: 2, default_value: ONE_SNORM16 },
        vk::Format::R16_SFLOAT => FormatTraits { size: 2, default_value: ONE_SFLOAT16 },
        vk::Format::R16G16_UNORM | vk::Format::R16G16_UINT => FormatTraits { size: 4, default_value: ONE_UNORM8 },
        vk::Format::R16G16_SNORM | vk::Format::R16G16_SINT => FormatTraits { size: 4, default_value: ONE_SNORM16 },
        vk::Format::R16G16_SFLOAT => FormatTraits { size: 4, default_value: ONE_SFLOAT16 },
        vk::Format::R16G16B16_UNORM | vk::Format::R16G16B16_UINT => FormatTraits { size: 6, default_value: ONE_UNORM8 },
        vk::Format::R16G16B16_SNORM | vk::Format::R16G16B16_SINT => FormatTraits { size: 6, default_value: ONE_SNORM16 },
        vk::Format::R16G16B16_SFLOAT => FormatTraits { size: 6, default_value: ONE_SFLOAT16 },
        vk::Format::R16G16B16A16_UNORM | vk::Format::R16G16B16A16_UINT => FormatTraits { size: 8, default_value: ONE_UNORM8 },
        vk::Format::R16G16B16A16_SNORM | vk::Format::R16G16B16A16_SINT => FormatTraits { size: 8, default_value: ONE_SNORM16 },
        vk::Format::R16G16B16A16_SFLOAT => FormatTraits { size: 8, default_value: ONE_SFLOAT16 },
        vk::Format::R32_UINT => FormatTraits { size: 4, default_value: ONE_UNORM8 },
        vk::Format::R32_SINT => FormatTraits { size: 4, default_value: ONE_SINT32 },
        vk::Format::R32_SFLOAT => FormatTraits { size: 4, default_value: ONE_SFLOAT32 },
        vk::Format::R32G32_UINT => FormatTraits { size: 8, default_value: ONE_UNORM8 },
        vk::Format::R32G32_SINT => FormatTraits { size: 8, default_value: ONE_SINT32 },
        vk::Format::R32G32_SFLOAT => FormatTraits { size: 8, default_value: ONE_SFLOAT32 },
        vk::Format::R32G32B32_UINT => FormatTraits { size: 12, default_value: ONE_UNORM8 },
        vk::Format::R32G32B32_SINT => FormatTraits { size: 12, default_value: ONE_SINT32 },
        vk::Format::R32G32B32_SFLOAT => FormatTraits { size: 12, default_value: ONE_SFLOAT32 },
        vk::Format::R32G32B32A32_UINT => FormatTraits { size: 16, default_value: ONE_UNORM8 },
        vk::Format::R32G32B32A32_SINT => FormatTraits { size: 16, default_value: ONE_SINT32 },
        vk::Format::R32G32B32A32_SFLOAT => FormatTraits { size: 16, default_value: ONE_SFLOAT32 },
        vk::Format::D16_UNORM => FormatTraits { size: 2, default_value: ONE_UNORM8 },
        vk::Format::D32_SFLOAT => FormatTraits { size: 4, default_value: ONE_SFLOAT32 },
        _ => FormatTraits::UNDESCRIBED,
    }
}

/// Widens tightly packed texels from `source_size` to `target_size` bytes,
/// filling the extra component bytes from `default_value`.
///
/// `src` must hold a whole number of source texels and `dst` must hold the
/// same number of target texels.
pub fn widen_texels(
    src: &[u8],
    source_size: usize,
    target_size: usize,
    default_value: &[u8; 16],
    dst: &mut [u8],
) {
    assert!(source_size > 0 && source_size < target_size && target_size <= default_value.len());
    assert_eq!(src.len() % source_size, 0);
    let value_count = src.len() / source_size;
    assert_eq!(dst.len(), value_count * target_size);

    let fill = &default_value[source_size..target_size];
    for (src_texel, dst_texel) in src
        .chunks_exact(source_size)
        .zip(dst.chunks_exact_mut(target_size))
    {
        dst_texel[..source_size].copy_from_slice(src_texel);
        dst_texel[source_size..].copy_from_slice(fill);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_sizes() {
        assert_eq!(format_traits(vk::Format::R8G8B8_UNORM).size, 3);
        assert_eq!(format_traits(vk::Format::R8G8B8A8_UNORM).size, 4);
        assert_eq!(format_traits(vk::Format::R32G32B32A32_SFLOAT).size, 16);
        assert_eq!(format_traits(vk::Format::BC1_RGB_UNORM_BLOCK).size, 0);
    }

    #[test]
    fn test_widen_rgb8_to_rgba8() {
        let src: Vec<u8> = (0..48).collect(); // 16 RGB8 texels
        let mut dst = vec![0u8; 64];
        let traits = format_traits(vk::Format::R8G8B8A8_UNORM);
        widen_texels(&src, 3, 4, &traits.default_value, &mut dst);
        for (i, texel) in dst.chunks_exact(4).enumerate() {
            assert_eq!(&texel[..3], &src[i * 3..i * 3 + 3]);
            assert_eq!(texel[3], traits.default_value[3]);
            assert_eq!(texel[3], 0xff);
        }
    }

    #[test]
    fn test_widen_rgb16f_to_rgba16f() {
        let src = vec![0u8; 12]; // 2 RGB16F texels
        let mut dst = vec![0u8; 16];
        let traits = format_traits(vk::Format::R16G16B16A16_SFLOAT);
        widen_texels(&src, 6, 8, &traits.default_value, &mut dst);
        // alpha component is half-float 1.0
        assert_eq!(&dst[6..8], &[0x00, 0x3c]);
        assert_eq!(&dst[14..16], &[0x00, 0x3c]);
    }
}
