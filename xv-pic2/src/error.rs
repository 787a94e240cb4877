//! Error types for PIC2 block decoding and encoding.

use core::fmt;
use std::io;
use xv_common::bit::BitError;

/// The error type for PIC2 block operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pic2Error {
    /// The bit depth is not a multiple of 3 between 3 and 24.
    InvalidDepth,
    /// The block is empty or does not match the pixel buffer.
    InvalidDimensions,
    /// A pixel value does not fit into the bit depth.
    PixelOutOfRange,
    /// The data is truncated or decodes to impossible values.
    CorruptFile,
    /// The underlying byte source or sink failed.
    Io(io::ErrorKind),
}

impl fmt::Display for Pic2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDepth => write!(f, "bit depth must be a multiple of 3 up to 24"),
            Self::InvalidDimensions => write!(f, "invalid block dimensions"),
            Self::PixelOutOfRange => write!(f, "pixel value exceeds the bit depth"),
            Self::CorruptFile => write!(f, "corrupt or truncated block data"),
            Self::Io(kind) => write!(f, "i/o error: {kind}"),
        }
    }
}

impl core::error::Error for Pic2Error {}

impl From<BitError> for Pic2Error {
    fn from(e: BitError) -> Self {
        match e {
            BitError::EndOfStream => Self::CorruptFile,
            BitError::Io(kind) => Self::Io(kind),
        }
    }
}

impl From<io::Error> for Pic2Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::CorruptFile,
            kind => Self::Io(kind),
        }
    }
}

/// Result type for PIC2 block operations.
pub type Result<T> = core::result::Result<T, Pic2Error>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;
