//! Pixel Assembly: reordering the channels of raw 4-byte pixels.
//!
//! Pixels are independent, so conversions run in parallel over disjoint
//! output chunks. Channel values are moved, never altered.

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use rayon::prelude::*;
use std::time::Instant;
use thiserror::Error;

/// Byte order of the four channels inside one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
    Argb,
    Abgr,
}

impl ChannelOrder {
    /// Byte offsets of red, green, blue and alpha.
    const fn offsets(self) -> [usize; 4] {
        match self {
            ChannelOrder::Rgba => [0, 1, 2, 3],
            ChannelOrder::Bgra => [2, 1, 0, 3],
            ChannelOrder::Argb => [1, 2, 3, 0],
            ChannelOrder::Abgr => [3, 2, 1, 0],
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("{0} bytes is not a whole number of 4-byte pixels")]
    PartialPixel(usize),
    #[error("destination holds {dst} bytes but the source has {src}")]
    LengthMismatch { src: usize, dst: usize },
}

/// Converts `src` from one channel order to another into `dst`.
///
/// # Errors
///
/// [`AssemblyError`] when `src` is not a multiple of 4 bytes or `dst` has a
/// different length.
pub fn assemble_into(
    src: &[u8],
    from: ChannelOrder,
    to: ChannelOrder,
    dst: &mut [u8],
) -> Result<(), AssemblyError> {
    if src.len() % 4 != 0 {
        return Err(AssemblyError::PartialPixel(src.len()));
    }
    if dst.len() != src.len() {
        return Err(AssemblyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let from = from.offsets();
    let to = to.offsets();
    dst.par_chunks_exact_mut(4)
        .zip(src.par_chunks_exact(4))
        .for_each(|(out, pixel)| {
            for channel in 0..4 {
                out[to[channel]] = pixel[from[channel]];
            }
        });
    Ok(())
}

/// Allocating form of [`assemble_into`].
///
/// # Errors
///
/// [`AssemblyError::PartialPixel`] when `src` is not a multiple of 4 bytes.
pub fn assemble(src: &[u8], from: ChannelOrder, to: ChannelOrder) -> Result<Vec<u8>, AssemblyError> {
    let mut dst = vec![0; src.len()];
    assemble_into(src, from, to, &mut dst)?;
    Ok(dst)
}

/// Builds an RGBA image from a `width * height` buffer in `order`.
///
/// # Errors
///
/// [`AssemblyError`] when the buffer does not hold exactly `width * height`
/// pixels.
pub fn to_image(
    width: u32,
    height: u32,
    src: &[u8],
    order: ChannelOrder,
) -> Result<RgbaImage, AssemblyError> {
    let expected = width as usize * height as usize * 4;
    if src.len() != expected {
        return Err(AssemblyError::LengthMismatch {
            src: src.len(),
            dst: expected,
        });
    }
    let rgba = assemble(src, order, ChannelOrder::Rgba)?;
    RgbaImage::from_raw(width, height, rgba).ok_or(AssemblyError::LengthMismatch {
        src: src.len(),
        dst: expected,
    })
}

/// A typed RGBA pixel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Flattens typed pixels into BGRA bytes.
#[must_use]
pub fn pixels_to_bgra(pixels: &[Pixel]) -> Vec<u8> {
    let start = Instant::now();
    let mut out = vec![0; pixels.len() * 4];
    out.par_chunks_exact_mut(4)
        .zip(pixels.par_iter())
        .for_each(|(bytes, p)| bytes.copy_from_slice(&[p.b, p.g, p.r, p.a]));
    tracing::debug!(
        pixels = pixels.len(),
        elapsed_us = start.elapsed().as_micros(),
        "pixels converted to bgra"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_to_rgba_swaps_red_and_blue() {
        let out = assemble(&[1, 2, 3, 4, 5, 6, 7, 8], ChannelOrder::Bgra, ChannelOrder::Rgba).unwrap();
        assert_eq!(out, [3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn argb_to_abgr() {
        let out = assemble(&[10, 20, 30, 40], ChannelOrder::Argb, ChannelOrder::Abgr).unwrap();
        assert_eq!(out, [10, 40, 30, 20]);
    }

    const ORDERS: [ChannelOrder; 4] = [
        ChannelOrder::Rgba,
        ChannelOrder::Bgra,
        ChannelOrder::Argb,
        ChannelOrder::Abgr,
    ];

    fn sorted(pixel: &[u8]) -> [u8; 4] {
        let mut bytes = [pixel[0], pixel[1], pixel[2], pixel[3]];
        bytes.sort_unstable();
        bytes
    }

    #[test]
    fn every_order_pair_permutes_without_altering() {
        let src: Vec<u8> = (0..37u32 * 4).map(|i| (i * 97 % 251) as u8).collect();
        for from in ORDERS {
            for to in ORDERS {
                let out = assemble(&src, from, to).unwrap();
                assert_eq!(out.len(), src.len(), "{from:?} -> {to:?}");
                assert_eq!(assemble(&out, to, from).unwrap(), src, "{from:?} -> {to:?}");
                for (a, b) in src.chunks_exact(4).zip(out.chunks_exact(4)) {
                    assert_eq!(sorted(a), sorted(b), "{from:?} -> {to:?}");
                }
                if from == to {
                    assert_eq!(out, src);
                }
            }
        }
    }

    #[test]
    fn partial_pixels_are_rejected() {
        assert_eq!(
            assemble(&[0; 7], ChannelOrder::Rgba, ChannelOrder::Bgra),
            Err(AssemblyError::PartialPixel(7))
        );
    }

    #[test]
    fn typed_pixels_become_bgra() {
        let bytes = pixels_to_bgra(&[Pixel::new(1, 2, 3, 4), Pixel::new(9, 8, 7, 6)]);
        assert_eq!(bytes, [3, 2, 1, 4, 7, 8, 9, 6]);
    }

    #[test]
    fn image_size_must_match() {
        assert!(to_image(2, 2, &[0; 12], ChannelOrder::Bgra).is_err());
        let image = to_image(1, 1, &[3, 2, 1, 4], ChannelOrder::Bgra).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [1, 2, 3, 4]);
    }
}
