//! Row-by-row encoding of fax data.

use crate::error::{FaxError, Result, bail};
use crate::span::{find_diff2, find0span, find1span, reference_changes};
use crate::states::{
    COMMON_MAKEUP, EOFB, EOFB_LEN, EOL, EOL_LEN, HORIZONTAL_CODE, PASS_CODE, RTC_EOLS,
    run_tables, vertical_code,
};
use crate::{EncodingMode, FaxFlags, StripInfo};
use log::{debug, trace};
use std::io::Write;
use xv_common::bit::BitWriter;

/// An encoder for a strip of fax data.
pub struct FaxEncoder<W: Write> {
    writer: BitWriter<W>,
    info: StripInfo,
    reference: Vec<u8>,
    /// The number of rows since the last 1D row, modulo K.
    k_counter: u32,
    rows_encoded: u32,
}

impl<W: Write> FaxEncoder<W> {
    /// Prepare encoding a strip into `sink`.
    pub fn new(sink: W, info: StripInfo) -> Result<Self> {
        info.validate()?;

        Ok(Self {
            writer: BitWriter::new(sink),
            info,
            reference: vec![0; info.row_bytes()],
            k_counter: 0,
            rows_encoded: 0,
        })
    }

    /// Encode the next row. Pixels of `row` past the row width are ignored.
    pub fn encode_row(&mut self, row: &[u8]) -> Result<()> {
        let Some(row) = row.get(..self.info.row_bytes()) else {
            bail!(FaxError::BufferTooSmall);
        };

        match self.info.encoding {
            EncodingMode::Group3_1D => {
                if self.info.uses_eol() {
                    self.put_eol()?;
                }

                self.encode_1d(row)?;
            }
            EncodingMode::Group3_2D { k } => {
                let one_d = self.k_counter == 0;
                if self.info.uses_eol() {
                    self.put_eol()?;
                }

                self.writer.write_bit(one_d)?;
                if one_d {
                    self.encode_1d(row)?;
                } else {
                    self.encode_2d(row)?;
                }

                self.k_counter = (self.k_counter + 1) % k;
            }
            EncodingMode::Group4 => self.encode_2d(row)?,
        }

        self.reference.copy_from_slice(row);
        self.rows_encoded += 1;

        let alignment = self.info.row_alignment();
        if alignment > 1 {
            self.writer.align_to(alignment)?;
        }

        Ok(())
    }

    /// Write the trailer of the strip, flush and return the sink.
    ///
    /// Group 3 strips end with a return-to-control sequence unless they are
    /// Class F or have no EOL codes. Group 4 strips end with an EOFB unless
    /// they are Class F.
    pub fn finish(mut self) -> Result<W> {
        let class_f = self.info.flags.contains(FaxFlags::CLASS_F);

        match self.info.encoding {
            EncodingMode::Group4 => {
                if !class_f {
                    self.writer.write_bits(EOFB, EOFB_LEN)?;
                }
            }
            EncodingMode::Group3_1D | EncodingMode::Group3_2D { .. } => {
                if !class_f && self.info.uses_eol() {
                    for _ in 0..RTC_EOLS {
                        self.writer.write_bits(EOL, EOL_LEN)?;
                        if self.info.is_group3_2d() {
                            self.writer.write_bit(true)?;
                        }
                    }
                }
            }
        }

        debug!(
            "encoded {} fax rows into {} bits",
            self.rows_encoded,
            self.writer.bits_written()
        );

        Ok(self.writer.finish()?)
    }

    fn put_eol(&mut self) -> Result<()> {
        if self.info.flags.contains(FaxFlags::FILL_BITS) {
            // The EOL should end on a byte boundary.
            let pos = (self.writer.bits_written() % 8) as u32;
            self.writer.write_bits(0, (12 - pos) % 8)?;
        }

        Ok(self.writer.write_bits(EOL, EOL_LEN)?)
    }

    fn put_code(&mut self, (_, len, code): (u16, u8, u16)) -> Result<()> {
        Ok(self
            .writer
            .write_bits(u32::from(code), u32::from(len))?)
    }

    /// Write the codes for a run of `span` pixels.
    fn put_span(&mut self, mut span: usize, black: bool) -> Result<()> {
        let (terminating, make_up) = run_tables(black);

        while span >= 2624 {
            self.put_code(COMMON_MAKEUP[12])?;
            span -= 2560;
        }

        if span >= 64 {
            let code = if span >= 1792 {
                COMMON_MAKEUP[(span >> 6) - 28]
            } else {
                make_up[(span >> 6) - 1]
            };

            self.put_code(code)?;
            span -= usize::from(code.0);
        }

        self.put_code(terminating[span])
    }

    fn encode_1d(&mut self, row: &[u8]) -> Result<()> {
        let width = self.info.columns as usize;
        let mut a0 = 0;
        let mut black = false;

        while a0 < width {
            let span = if black {
                find1span(row, a0, width)
            } else {
                find0span(row, a0, width)
            };

            self.put_span(span, black)?;
            a0 += span;
            black = !black;
        }

        Ok(())
    }

    fn encode_2d(&mut self, row: &[u8]) -> Result<()> {
        let width = self.info.columns as usize;
        let mut a0 = 0;
        let mut black = false;
        let mut start = true;
        let mut modes = [0_u32; 3];

        while a0 < width {
            let a1 = find_diff2(row, a0, width, black);
            let (b1, b2) = reference_changes(&self.reference, a0, width, black, start);

            if b2 < a1 {
                self.put_code(PASS_CODE)?;
                modes[0] += 1;
                a0 = b2;
            } else {
                let offset = a1 as isize - b1 as isize;

                if (-3..=3).contains(&offset) {
                    self.put_code(vertical_code(offset as i8))?;
                    modes[2] += 1;
                    a0 = a1;
                    black = !black;
                } else {
                    let a2 = find_diff2(row, a1, width, !black);
                    self.put_code(HORIZONTAL_CODE)?;
                    self.put_span(a1 - a0, black)?;
                    self.put_span(a2 - a1, !black)?;
                    modes[1] += 1;
                    a0 = a2;
                }
            }

            start = false;
        }

        trace!(
            "row {}: {} pass, {} horizontal, {} vertical",
            self.rows_encoded, modes[0], modes[1], modes[2]
        );

        Ok(())
    }
}
