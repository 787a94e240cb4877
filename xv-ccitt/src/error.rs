//! Error types for fax decoding and encoding.

use core::fmt;
use std::io;
use xv_common::bit::BitError;

/// The error type for fax decoding and encoding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaxError {
    /// The data ended in the middle of a row.
    UnexpectedEof,
    /// A bit sequence matched no run-length or mode code.
    InvalidCode,
    /// An EOL code appeared before the row was complete.
    PrematureEol,
    /// The decoded runs of a row overshoot the row width.
    BadLineLength,
    /// An extension code (uncompressed mode) was encountered.
    UnsupportedExtension,
    /// The strip has zero columns or an invalid K parameter.
    InvalidDimensions,
    /// A row buffer is shorter than one packed row.
    BufferTooSmall,
    /// The underlying byte source or sink failed.
    Io(io::ErrorKind),
}

impl FaxError {
    /// Whether decoding can continue with the next row after this error,
    /// provided the stream contains EOL codes to resynchronize on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidCode
                | Self::PrematureEol
                | Self::BadLineLength
                | Self::UnsupportedExtension
        )
    }
}

impl fmt::Display for FaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of data"),
            Self::InvalidCode => write!(f, "invalid run-length or mode code"),
            Self::PrematureEol => write!(f, "premature end of line"),
            Self::BadLineLength => write!(f, "row runs exceed the row width"),
            Self::UnsupportedExtension => write!(f, "unsupported extension code"),
            Self::InvalidDimensions => write!(f, "invalid strip dimensions"),
            Self::BufferTooSmall => write!(f, "row buffer too small"),
            Self::Io(kind) => write!(f, "i/o error: {kind}"),
        }
    }
}

impl core::error::Error for FaxError {}

impl From<BitError> for FaxError {
    fn from(e: BitError) -> Self {
        match e {
            BitError::EndOfStream => Self::UnexpectedEof,
            BitError::Io(kind) => Self::Io(kind),
        }
    }
}

impl From<io::Error> for FaxError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.kind())
    }
}

/// Result type for fax operations.
pub type Result<T> = core::result::Result<T, FaxError>;

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
