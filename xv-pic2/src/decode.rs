//! Row-by-row decoding of arithmetic-coded blocks.

use crate::arith::ArithDecoder;
use crate::error::Result;
use crate::model::{BlockStats, Model};
use crate::table::{PROLOGUE_LEN, ProbabilityTable};
use crate::{ColorFormat, Geometry};
use log::debug;
use std::io::Read;
use xv_common::bit::BitReader;

/// A decoder for a single arithmetic-coded block.
pub struct BlockDecoder<R: Read> {
    decoder: ArithDecoder<R>,
    model: Model,
    geometry: Geometry,
    format: ColorFormat,
}

impl<R: Read> BlockDecoder<R> {
    /// Read the probability table from `source` and prepare decoding the
    /// rows that follow it.
    pub fn new(mut source: R, geometry: Geometry) -> Result<Self> {
        let format = geometry.color_format()?;

        let mut prologue = [0; PROLOGUE_LEN];
        source.read_exact(&mut prologue)?;
        let table = ProbabilityTable::from_bytes(&prologue)?;

        Ok(Self {
            decoder: ArithDecoder::new(BitReader::new(source), &table)?,
            model: Model::new(format, geometry.width as usize, geometry.height as usize),
            geometry,
            format,
        })
    }

    /// The geometry of the block.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// The channel layout of the pixels.
    pub fn color_format(&self) -> ColorFormat {
        self.format
    }

    /// The number of rows decoded so far.
    pub fn rows_decoded(&self) -> u32 {
        self.model.rows_coded() as u32
    }

    /// How the pixels decoded so far were coded.
    pub fn stats(&self) -> BlockStats {
        self.model.stats()
    }

    /// Decode the next row, or return `None` once all rows are decoded.
    pub fn decode_row(&mut self) -> Result<Option<&[u32]>> {
        if self.rows_decoded() >= self.geometry.height {
            return Ok(None);
        }

        self.model.code_row(&mut self.decoder, None)?;

        if self.model.rows_coded() == self.geometry.height as usize {
            debug!(
                "decoded {}x{} block from {} bits: {:?}",
                self.geometry.width,
                self.geometry.height,
                self.decoder.bits_consumed(),
                self.model.stats()
            );
        }

        Ok(Some(self.model.last_row()))
    }
}
