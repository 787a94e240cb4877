/*!
A memory-safe, pure-Rust codec for CCITT Group 3 and Group 4 fax data, as
specified in ITU-T T.4 and T.6.

Images are handled as packed rows with one bit per pixel, most significant
bit first, where a set bit is a black pixel. Each row occupies
`ceil(columns / 8)` bytes.

Both directions work one row at a time through [`FaxDecoder`] and
[`FaxEncoder`]. For whole strips held in memory, [`decode`] and [`encode`]
are simpler to use.

# Example
```
use xv_ccitt::{FaxFlags, StripInfo};

let info = StripInfo::group3(16, 2, FaxFlags::TWO_D_ENCODING, 196);
let image = [0x00, 0xff, 0x0f, 0xf0];

let encoded = xv_ccitt::encode(&image, &info)?;
let decoded = xv_ccitt::decode(&encoded, &info)?;
assert_eq!(decoded, image);
# Ok::<(), xv_ccitt::FaxError>(())
```

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod decode;
mod encode;
mod error;
mod span;
mod states;

use bitflags::bitflags;
use error::{bail, err};
use log::debug;

pub use decode::{FaxDecoder, RowStatus};
pub use encode::FaxEncoder;
pub use error::{FaxError, Result};

/// The encoding scheme of a strip.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncodingMode {
    /// Group 3 1D (modified Huffman). Every row is run-length coded and
    /// preceded by an EOL code.
    Group3_1D,
    /// Group 3 2D (modified READ). A tag bit after each EOL selects 1D or 2D
    /// coding for the row. After each 1D row, at most `k - 1` rows are 2D
    /// coded.
    Group3_2D {
        /// The K parameter.
        k: u32,
    },
    /// Group 4 (modified modified READ). Every row is 2D coded and there are
    /// no EOL codes.
    Group4,
}

bitflags! {
    /// Options altering how rows are framed in the bit stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FaxFlags: u32 {
        /// Use 2D coding. Only consulted by [`StripInfo::group3`].
        const TWO_D_ENCODING = 1 << 0;
        /// Every row starts on a byte boundary.
        const BYTE_ALIGN = 1 << 1;
        /// Every row starts on a 16-bit boundary.
        const WORD_ALIGN = 1 << 2;
        /// Group 3 data without EOL codes.
        const NO_EOL = 1 << 3;
        /// TIFF Class F framing: no return-to-control trailer.
        const CLASS_F = 1 << 4;
        /// Pad with zero bits before each EOL so it ends on a byte boundary.
        const FILL_BITS = 1 << 5;
    }
}

/// The parameters of a fax strip.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StripInfo {
    /// The width of a row in pixels.
    pub columns: u32,
    /// The number of rows, or 0 if unknown. Decoding stops after this many
    /// rows.
    pub rows: u32,
    /// The encoding scheme.
    pub encoding: EncodingMode,
    /// Row framing options.
    pub flags: FaxFlags,
}

impl StripInfo {
    /// Create strip parameters with no framing options.
    pub fn new(columns: u32, rows: u32, encoding: EncodingMode) -> Self {
        Self {
            columns,
            rows,
            encoding,
            flags: FaxFlags::empty(),
        }
    }

    /// Create Group 3 strip parameters.
    ///
    /// The strip is 2D coded if `flags` contains
    /// [`FaxFlags::TWO_D_ENCODING`], in which case K is derived from the
    /// vertical resolution: 2 for standard resolution (at most 200 lines
    /// per inch) and 4 for fine resolution.
    pub fn group3(columns: u32, rows: u32, flags: FaxFlags, y_resolution_lpi: u32) -> Self {
        let encoding = if flags.contains(FaxFlags::TWO_D_ENCODING) {
            let k = if y_resolution_lpi <= 200 { 2 } else { 4 };
            EncodingMode::Group3_2D { k }
        } else {
            EncodingMode::Group3_1D
        };

        Self {
            columns,
            rows,
            encoding,
            flags,
        }
    }

    /// Create Group 4 strip parameters.
    pub fn group4(columns: u32, rows: u32, flags: FaxFlags) -> Self {
        Self {
            columns,
            rows,
            encoding: EncodingMode::Group4,
            flags,
        }
    }

    /// The number of bytes of a packed row.
    pub fn row_bytes(&self) -> usize {
        (self.columns as usize).div_ceil(8)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.columns == 0 {
            bail!(FaxError::InvalidDimensions);
        }

        match self.encoding {
            EncodingMode::Group3_2D { k: 0 } => err!(FaxError::InvalidDimensions),
            _ => Ok(()),
        }
    }

    /// Whether rows are delimited by EOL codes.
    pub(crate) fn uses_eol(&self) -> bool {
        !matches!(self.encoding, EncodingMode::Group4) && !self.flags.contains(FaxFlags::NO_EOL)
    }

    pub(crate) fn is_group3_2d(&self) -> bool {
        matches!(self.encoding, EncodingMode::Group3_2D { .. })
    }

    /// The boundary in bits every row is aligned to.
    pub(crate) fn row_alignment(&self) -> u32 {
        if self.flags.contains(FaxFlags::WORD_ALIGN) {
            16
        } else if self.flags.contains(FaxFlags::BYTE_ALIGN) {
            8
        } else {
            1
        }
    }
}

/// Decode a whole strip held in memory.
///
/// If `info.rows` is known, the result always has that many rows; rows
/// missing from the data are white. Otherwise decoding continues until the
/// end of the data or a trailer code is reached. Corrupt rows are handled as
/// described in [`FaxDecoder::decode_rows`].
///
/// The output grows with the rows found in the data. Padding a short strip
/// to a row count that cannot be allocated fails with
/// [`FaxError::InvalidDimensions`].
pub fn decode(data: &[u8], info: &StripInfo) -> Result<Vec<u8>> {
    let mut decoder = FaxDecoder::new(data, *info)?;
    let row_bytes = info.row_bytes();

    let mut out = Vec::new();
    let mut row = vec![0; row_bytes];

    while decoder.decode_row_recovering(&mut row)? == RowStatus::Decoded {
        out.extend_from_slice(&row);
    }

    if info.rows != 0 {
        let Some(len) = (info.rows as usize).checked_mul(row_bytes) else {
            bail!(FaxError::InvalidDimensions);
        };

        if out.len() < len {
            debug!(
                "fax data holds {} of {} rows, padding with white",
                decoder.rows_decoded(),
                info.rows
            );

            if out.try_reserve_exact(len - out.len()).is_err() {
                bail!(FaxError::InvalidDimensions);
            }
            out.resize(len, 0);
        }
    }

    Ok(out)
}

/// Encode a whole strip held in memory.
///
/// `image` holds packed rows. If `info.rows` is 0, every complete row of
/// `image` is encoded.
pub fn encode(image: &[u8], info: &StripInfo) -> Result<Vec<u8>> {
    let row_bytes = info.row_bytes().max(1);
    let rows = if info.rows == 0 {
        image.len() / row_bytes
    } else {
        info.rows as usize
    };

    let Some(image) = image.get(..rows * row_bytes) else {
        bail!(FaxError::BufferTooSmall);
    };

    let mut encoder = FaxEncoder::new(Vec::new(), *info)?;
    for row in image.chunks_exact(row_bytes) {
        encoder.encode_row(row)?;
    }

    encoder.finish()
}
