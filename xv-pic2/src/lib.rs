/*!
A memory-safe, pure-Rust codec for the arithmetic-coded pixel blocks of PIC2
images.

A block is a rectangle of packed RGB pixels with an equal number of bits per
channel. The coded form starts with a table of 128 context probabilities
(big-endian 16-bit values), followed by the output of an adaptive binary
arithmetic coder. The coder decides for every pixel whether it repeats the
pixel above, predicts runs across rows through short chains and codes new
colors either through a cache of recent colors or as small deltas from
their neighbors.

Encoding needs two passes over the block: one to collect the statistics for
the probability table and one to code the pixels with it. [`encode_block`]
runs both. [`collect_statistics`] and [`encode_with_table`] expose them
separately.

# Example
```
let pixels = [0o000, 0o777, 0o777, 0o000, 0o777, 0o777];

let encoded = xv_pic2::encode_block(&pixels, 3, 2, 9)?;
let decoded = xv_pic2::decode_block(&encoded, 3, 2, 9)?;
assert_eq!(decoded.pixels(), pixels);
# Ok::<(), xv_pic2::Pic2Error>(())
```

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod arith;
mod decode;
mod encode;
mod error;
mod model;
mod number;
mod table;

use error::{bail, err};

pub use decode::BlockDecoder;
pub use encode::{collect_statistics, encode_with_table};
pub use error::{Pic2Error, Result};
pub use model::BlockStats;
pub use table::{CONTEXTS, PROLOGUE_LEN, ProbabilityTable};

/// The size and bit depth of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// The width in pixels.
    pub width: u32,
    /// The height in pixels.
    pub height: u32,
    /// The number of bits per pixel, split evenly across red, green and blue.
    pub depth: u32,
}

impl Geometry {
    /// Create a new geometry.
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// The number of pixels in the block.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Validate the geometry and return the layout of its pixels.
    pub fn color_format(&self) -> Result<ColorFormat> {
        if self.width == 0
            || self.height == 0
            || (self.width as usize).checked_mul(self.height as usize).is_none()
        {
            bail!(Pic2Error::InvalidDimensions);
        }

        match self.depth {
            3..=24 if self.depth % 3 == 0 => Ok(ColorFormat {
                bits: self.depth / 3,
            }),
            _ => err!(Pic2Error::InvalidDepth),
        }
    }
}

/// The layout of a packed pixel: red in the high bits, then green, then blue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorFormat {
    bits: u32,
}

impl ColorFormat {
    /// The number of bits per channel.
    pub fn bits_per_channel(&self) -> u32 {
        self.bits
    }

    /// The largest value of a channel.
    pub fn max(&self) -> u32 {
        (1 << self.bits) - 1
    }

    /// The largest packed pixel value.
    pub fn pixel_max(&self) -> u32 {
        ((1_u64 << (3 * self.bits)) - 1) as u32
    }

    /// Split a pixel into its red, green and blue channels.
    pub fn split(&self, pixel: u32) -> [u32; 3] {
        let max = self.max();
        [
            (pixel >> (2 * self.bits)) & max,
            (pixel >> self.bits) & max,
            pixel & max,
        ]
    }

    /// Pack red, green and blue channels into a pixel.
    pub fn join(&self, [r, g, b]: [u32; 3]) -> u32 {
        (r << (2 * self.bits)) | (g << self.bits) | b
    }

    /// The per-channel average of two pixels, rounded down.
    pub(crate) fn average(&self, a: u32, b: u32) -> u32 {
        let (a, b) = (self.split(a), self.split(b));
        self.join([0, 1, 2].map(|c| (a[c] + b[c]) / 2))
    }

    /// The top three bits of every channel, packed into a number below 512.
    pub(crate) fn bucket(&self, pixel: u32) -> usize {
        let top = |c: u32| {
            if self.bits >= 3 {
                c >> (self.bits - 3)
            } else {
                c << (3 - self.bits)
            }
        };
        let [r, g, b] = self.split(pixel).map(top);

        ((r << 6) | (g << 3) | b) as usize
    }
}

/// The decoded pixels of a block, row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    geometry: Geometry,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    /// The geometry of the block.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// All pixels, row by row.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// The pixels of row `y`.
    pub fn row(&self, y: u32) -> Option<&[u32]> {
        let width = self.geometry.width as usize;
        self.pixels.chunks_exact(width).nth(y as usize)
    }

    /// The pixel at `x`, `y`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.geometry.width {
            return None;
        }

        self.row(y).map(|row| row[x as usize])
    }

    /// Return the pixels, row by row.
    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }
}

/// Decode a whole block of `width` by `height` pixels with `depth` bits each.
pub fn decode_block(data: &[u8], width: u32, height: u32, depth: u32) -> Result<PixelBuffer> {
    let geometry = Geometry::new(width, height, depth);
    let mut decoder = BlockDecoder::new(data, geometry)?;
    // Grows with the decoded rows, so truncated data fails before the
    // declared size is ever allocated.
    let mut pixels = Vec::new();

    while let Some(row) = decoder.decode_row()? {
        pixels.extend_from_slice(row);
    }

    Ok(PixelBuffer { geometry, pixels })
}

/// Encode a whole block of `width` by `height` pixels with `depth` bits each.
///
/// `pixels` holds the packed pixels row by row.
pub fn encode_block(pixels: &[u32], width: u32, height: u32, depth: u32) -> Result<Vec<u8>> {
    let geometry = Geometry::new(width, height, depth);
    let table = collect_statistics(pixels, geometry)?;

    encode_with_table(pixels, geometry, &table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depths() {
        assert_eq!(
            Geometry::new(1, 1, 0).color_format(),
            Err(Pic2Error::InvalidDepth)
        );
        assert_eq!(
            Geometry::new(1, 1, 16).color_format(),
            Err(Pic2Error::InvalidDepth)
        );
        assert_eq!(
            Geometry::new(1, 1, 27).color_format(),
            Err(Pic2Error::InvalidDepth)
        );
        assert_eq!(
            Geometry::new(0, 1, 3).color_format(),
            Err(Pic2Error::InvalidDimensions)
        );

        let format = Geometry::new(1, 1, 24).color_format().unwrap();
        assert_eq!(format.max(), 255);
        assert_eq!(format.pixel_max(), 0xff_ffff);
    }

    #[test]
    fn channels() {
        let format = Geometry::new(1, 1, 15).color_format().unwrap();
        assert_eq!(format.split(0b10001_00010_11111), [17, 2, 31]);
        assert_eq!(format.join([17, 2, 31]), 0b10001_00010_11111);
        assert_eq!(
            format.average(format.join([3, 4, 31]), format.join([4, 7, 0])),
            format.join([3, 5, 15])
        );
        assert_eq!(format.bucket(format.join([31, 8, 3])), 0b111_010_000);
    }

    #[test]
    fn buckets_of_shallow_channels() {
        let format = Geometry::new(1, 1, 6).color_format().unwrap();
        assert_eq!(format.bucket(format.join([3, 1, 2])), 0b110_010_100);
    }

    #[test]
    fn pixel_buffer_access() {
        let buffer = PixelBuffer {
            geometry: Geometry::new(2, 2, 3),
            pixels: vec![1, 2, 3, 4],
        };

        assert_eq!(buffer.row(1), Some(&[3, 4][..]));
        assert_eq!(buffer.row(2), None);
        assert_eq!(buffer.pixel(1, 0), Some(2));
        assert_eq!(buffer.pixel(2, 0), None);
    }
}
