//! A bit reader and writer over byte sources and sinks.
//!
//! Both directions work most-significant-bit first. The reader pulls bytes
//! from any [`Read`] implementation in chunks and refills transparently, so
//! the bits it yields never depend on how the source splits its data. The
//! writer collects completed bytes and hands them to a [`Write`] sink.

use core::fmt;
use std::io::{self, Read, Write};

/// The size of the internal byte buffers.
const CHUNK_SIZE: usize = 4096;

/// An error raised while reading or writing bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitError {
    /// The source was exhausted before the requested bits were available.
    EndOfStream,
    /// The underlying byte source or sink failed.
    Io(io::ErrorKind),
}

impl fmt::Display for BitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "unexpected end of bit stream"),
            Self::Io(kind) => write!(f, "i/o error: {kind}"),
        }
    }
}

impl core::error::Error for BitError {}

impl From<io::Error> for BitError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.kind())
    }
}

/// Result type for bit stream operations.
pub type Result<T> = core::result::Result<T, BitError>;

/// Get the mask for the given bit size.
#[inline]
pub fn bit_mask(bit_size: u32) -> u32 {
    ((1_u64 << bit_size) - 1) as u32
}

/// A bit reader.
#[derive(Debug)]
pub struct BitReader<R> {
    source: R,
    buf: Box<[u8]>,
    buf_pos: usize,
    buf_len: usize,
    /// Unconsumed bits, right-aligned. Only the low `acc_bits` bits are valid.
    acc: u64,
    acc_bits: u32,
    consumed: u64,
    exhausted: bool,
}

impl<R: Read> BitReader<R> {
    /// Create a new bit reader pulling bytes from `source`.
    pub fn new(source: R) -> Self {
        Self {
            source,
            buf: vec![0; CHUNK_SIZE].into_boxed_slice(),
            buf_pos: 0,
            buf_len: 0,
            acc: 0,
            acc_bits: 0,
            consumed: 0,
            exhausted: false,
        }
    }

    /// Read the next `num_bits` bits (at most 32).
    ///
    /// On [`BitError::EndOfStream`] nothing is consumed.
    #[inline]
    pub fn read_bits(&mut self, num_bits: u32) -> Result<u32> {
        let value = self.peek_bits(num_bits)?;
        self.consume(num_bits);

        Ok(value)
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Look at the next `num_bits` bits (at most 32) without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, num_bits: u32) -> Result<u32> {
        debug_assert!(num_bits <= 32);

        if num_bits == 0 {
            return Ok(0);
        }

        if !self.fill(num_bits)? {
            return Err(BitError::EndOfStream);
        }

        Ok(((self.acc >> (self.acc_bits - num_bits)) as u32) & bit_mask(num_bits))
    }

    /// Look at the next `num_bits` bits, padding with zeros past the end of the
    /// stream.
    ///
    /// Returns the padded value together with the number of bits that were
    /// actually available.
    #[inline]
    pub fn peek_bits_padded(&mut self, num_bits: u32) -> Result<(u32, u32)> {
        debug_assert!(num_bits <= 32);

        if self.fill(num_bits)? {
            return Ok((self.peek_bits(num_bits)?, num_bits));
        }

        let available = self.acc_bits;
        let value =
            ((self.acc & u64::from(bit_mask(available))) << (num_bits - available)) as u32;

        Ok((value, available))
    }

    /// Skip `num_bits` bits.
    pub fn skip_bits(&mut self, mut num_bits: u32) -> Result<()> {
        while num_bits > 0 {
            let take = num_bits.min(32);
            self.read_bits(take)?;
            num_bits -= take;
        }

        Ok(())
    }

    /// Advance to the next multiple of `boundary` bits, counted from the start
    /// of the stream.
    ///
    /// Padding bits missing at the very end of the stream are not an error.
    pub fn align_to(&mut self, boundary: u32) -> Result<()> {
        let boundary = u64::from(boundary.max(1));
        let pad = ((boundary - self.consumed % boundary) % boundary) as u32;

        self.fill(pad)?;
        self.consume(pad.min(self.acc_bits));

        Ok(())
    }

    /// Advance to the next byte boundary.
    #[inline]
    pub fn align(&mut self) -> Result<()> {
        self.align_to(8)
    }

    /// Whether all bits of the source have been consumed.
    pub fn at_end(&mut self) -> Result<bool> {
        Ok(!self.fill(1)?)
    }

    /// The number of bits consumed so far.
    #[inline]
    pub fn bits_consumed(&self) -> u64 {
        self.consumed
    }

    /// Consume the reader and return the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }

    #[inline]
    fn consume(&mut self, num_bits: u32) {
        debug_assert!(num_bits <= self.acc_bits);

        self.acc_bits -= num_bits;
        self.consumed += u64::from(num_bits);
    }

    /// Make sure at least `num_bits` bits are buffered. Returns `false` if the
    /// source ran dry first.
    #[inline]
    fn fill(&mut self, num_bits: u32) -> Result<bool> {
        while self.acc_bits < num_bits {
            let Some(byte) = self.next_byte()? else {
                return Ok(false);
            };

            self.acc = (self.acc << 8) | u64::from(byte);
            self.acc_bits += 8;
        }

        Ok(true)
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.buf_pos == self.buf_len {
            if self.exhausted {
                return Ok(None);
            }

            loop {
                match self.source.read(&mut self.buf) {
                    Ok(0) => {
                        self.exhausted = true;
                        return Ok(None);
                    }
                    Ok(n) => {
                        self.buf_pos = 0;
                        self.buf_len = n;
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let byte = self.buf[self.buf_pos];
        self.buf_pos += 1;

        Ok(Some(byte))
    }
}

/// A bit writer.
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    sink: W,
    pending: Vec<u8>,
    /// Bits of the incomplete byte, right-aligned.
    acc: u64,
    acc_bits: u32,
    written: u64,
}

impl<W: Write> BitWriter<W> {
    /// Create a new bit writer emitting bytes into `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            pending: Vec::with_capacity(CHUNK_SIZE),
            acc: 0,
            acc_bits: 0,
            written: 0,
        }
    }

    /// Append the low `num_bits` bits (at most 32) of `value`.
    #[inline]
    pub fn write_bits(&mut self, value: u32, num_bits: u32) -> Result<()> {
        debug_assert!(num_bits <= 32);

        if num_bits == 0 {
            return Ok(());
        }

        self.acc = (self.acc << num_bits) | u64::from(value & bit_mask(num_bits));
        self.acc_bits += num_bits;
        self.written += u64::from(num_bits);

        while self.acc_bits >= 8 {
            self.pending.push((self.acc >> (self.acc_bits - 8)) as u8);
            self.acc_bits -= 8;
        }

        if self.pending.len() >= CHUNK_SIZE {
            self.drain()?;
        }

        Ok(())
    }

    /// Append a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(u32::from(bit), 1)
    }

    /// Pad with zero bits up to the next multiple of `boundary` bits.
    pub fn align_to(&mut self, boundary: u32) -> Result<()> {
        let boundary = u64::from(boundary.max(1));
        let mut pad = ((boundary - self.written % boundary) % boundary) as u32;

        while pad > 0 {
            let take = pad.min(32);
            self.write_bits(0, take)?;
            pad -= take;
        }

        Ok(())
    }

    /// Pad the current byte with zeros and push everything written so far
    /// into the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.align_to(8)?;
        self.drain()?;
        self.sink.flush()?;

        Ok(())
    }

    /// The number of bits written so far, including padding.
    #[inline]
    pub fn bits_written(&self) -> u64 {
        self.written
    }

    /// Flush and return the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;

        Ok(self.sink)
    }

    fn drain(&mut self) -> Result<()> {
        self.sink.write_all(&self.pending)?;
        self.pending.clear();

        Ok(())
    }
}
