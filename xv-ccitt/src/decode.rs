//! Row-by-row decoding of fax data.

use crate::error::{FaxError, Result, bail};
use crate::span::{fill_black, reference_changes};
use crate::states::{
    Action, BLACK_TABLE, ByteTable, EOFB, EOFB_LEN, EOL, EOL_LEN, MODE_TABLE, Mode, WHITE_TABLE,
};
use crate::{EncodingMode, StripInfo};
use log::{debug, trace, warn};
use std::io::Read;
use xv_common::bit::BitReader;

/// The outcome of decoding a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// A row was written into the output buffer.
    Decoded,
    /// The data is exhausted or a trailer (RTC or EOFB) was reached. The
    /// output buffer is left untouched.
    EndOfData,
}

enum Eol {
    Found,
    Missing,
    End,
}

/// A decoder for a strip of fax data.
pub struct FaxDecoder<R: Read> {
    reader: BitReader<R>,
    info: StripInfo,
    reference: Vec<u8>,
    rows_decoded: u32,
    finished: bool,
}

impl<R: Read> FaxDecoder<R> {
    /// Prepare decoding a strip read from `source`.
    pub fn new(source: R, info: StripInfo) -> Result<Self> {
        info.validate()?;

        debug!(
            "decoding {:?} fax strip, {} columns, flags {:?}",
            info.encoding, info.columns, info.flags
        );

        Ok(Self {
            reader: BitReader::new(source),
            info,
            // The line before the first row is white.
            reference: vec![0; info.row_bytes()],
            rows_decoded: 0,
            finished: false,
        })
    }

    /// The number of bytes of a packed row.
    pub fn row_bytes(&self) -> usize {
        self.info.row_bytes()
    }

    /// The number of rows decoded so far, including partially decoded ones.
    pub fn rows_decoded(&self) -> u32 {
        self.rows_decoded
    }

    /// Decode the next row into `row`, which must hold at least
    /// [`row_bytes`](Self::row_bytes) bytes.
    ///
    /// Errors are returned as they occur. Whatever part of the row was decoded
    /// before the error stays in `row` (the rest is white) and serves as the
    /// reference line for the next row.
    pub fn decode_row(&mut self, row: &mut [u8]) -> Result<RowStatus> {
        let row_bytes = self.info.row_bytes();
        let Some(row) = row.get_mut(..row_bytes) else {
            bail!(FaxError::BufferTooSmall);
        };

        if self.finished || (self.info.rows != 0 && self.rows_decoded >= self.info.rows) {
            return Ok(RowStatus::EndOfData);
        }

        let Some(two_d) = self.begin_row()? else {
            debug!("end of fax data after {} rows", self.rows_decoded);
            self.finished = true;

            return Ok(RowStatus::EndOfData);
        };

        trace!(
            "row {}: {} coded",
            self.rows_decoded,
            if two_d { "2D" } else { "1D" }
        );

        row.fill(0);
        let result = if two_d {
            self.decode_2d(row)
        } else {
            self.decode_1d(row)
        };

        self.reference.copy_from_slice(row);
        self.rows_decoded += 1;
        result?;

        let alignment = self.info.row_alignment();
        if alignment > 1 {
            self.reader.align_to(alignment)?;
        }

        Ok(RowStatus::Decoded)
    }

    /// Decode rows into `buf` until it is full, the row count of the strip is
    /// reached or the data ends. Returns the number of rows decoded.
    ///
    /// Corrupt data is handled as follows:
    /// - If the data ends inside a row, the rest of that row is white and
    ///   decoding stops.
    /// - If a row contains an invalid code or a premature EOL, the rest of it
    ///   is white and decoding resumes at the next EOL. Without EOL codes
    ///   (Group 4 or [`FaxFlags::NO_EOL`](crate::FaxFlags::NO_EOL)), the error
    ///   is returned instead.
    ///
    /// Rows of `buf` after the end of the data are filled with white.
    pub fn decode_rows(&mut self, buf: &mut [u8]) -> Result<usize> {
        let row_bytes = self.info.row_bytes();
        if buf.len() < row_bytes {
            bail!(FaxError::BufferTooSmall);
        }

        let mut decoded = 0;
        for row in buf.chunks_exact_mut(row_bytes) {
            match self.decode_row_recovering(row)? {
                RowStatus::Decoded => decoded += 1,
                RowStatus::EndOfData => row.fill(0),
            }
        }

        debug!("decoded {decoded} fax rows");

        Ok(decoded)
    }

    /// Consume the decoder and return the underlying source.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    pub(crate) fn decode_row_recovering(&mut self, row: &mut [u8]) -> Result<RowStatus> {
        match self.decode_row(row) {
            Err(FaxError::UnexpectedEof) => {
                warn!(
                    "fax data ended inside row {}, padding with white",
                    self.rows_decoded
                );
                self.finished = true;

                Ok(RowStatus::Decoded)
            }
            Err(e) if e.is_recoverable() && self.info.uses_eol() => {
                warn!(
                    "{e} in row {}, skipping to the next EOL",
                    self.rows_decoded
                );
                self.skip_to_eol()?;

                Ok(RowStatus::Decoded)
            }
            other => other,
        }
    }

    /// Read everything preceding the codes of a row. Returns whether the row
    /// is 2D coded, or `None` at the end of the data.
    fn begin_row(&mut self) -> Result<Option<bool>> {
        if self.at_padding_end()? {
            return Ok(None);
        }

        if let EncodingMode::Group4 = self.info.encoding {
            // A cut-off EOFB also ends the data.
            let (bits, available) = self.reader.peek_bits_padded(EOFB_LEN)?;
            let missing = EOFB_LEN - available;
            if bits >> missing == EOFB >> missing {
                self.reader.skip_bits(available)?;
                return Ok(None);
            }

            return Ok(Some(true));
        }

        if self.info.uses_eol() {
            match self.read_eol()? {
                Eol::Found => {
                    if self.at_rtc()? || self.at_padding_end()? {
                        return Ok(None);
                    }
                }
                Eol::Missing => warn!("missing EOL before row {}", self.rows_decoded),
                Eol::End => return Ok(None),
            }
        }

        if self.info.is_group3_2d() {
            // A set tag bit announces a 1D row.
            return Ok(Some(!self.reader.read_bit()?));
        }

        Ok(Some(false))
    }

    /// Read an EOL code, skipping any fill bits in front of it.
    fn read_eol(&mut self) -> Result<Eol> {
        loop {
            let (bits, available) = self.reader.peek_bits_padded(EOL_LEN)?;

            if available == EOL_LEN && bits == EOL {
                self.reader.skip_bits(EOL_LEN)?;
                return Ok(Eol::Found);
            }

            if bits != 0 {
                return Ok(Eol::Missing);
            }

            if available < EOL_LEN {
                return Ok(Eol::End);
            }

            self.reader.skip_bits(1)?;
        }
    }

    /// Check whether the EOL just read starts a return-to-control sequence,
    /// and consume the rest of it if so.
    fn at_rtc(&mut self) -> Result<bool> {
        // In 2D mode every EOL of the sequence carries a set tag bit.
        let (code, len) = if self.info.is_group3_2d() {
            ((1 << EOL_LEN) | EOL, EOL_LEN + 1)
        } else {
            (EOL, EOL_LEN)
        };

        let mut eols = 1;
        loop {
            let (bits, available) = self.reader.peek_bits_padded(len)?;
            if available < len || bits != code {
                break;
            }

            self.reader.skip_bits(len)?;
            eols += 1;
        }

        if eols == 1 {
            return Ok(false);
        }

        if self.info.is_group3_2d() && self.reader.peek_bits_padded(1)? == (1, 1) {
            self.reader.skip_bits(1)?;
        }

        debug!(
            "return to control ({eols} EOLs) after {} rows",
            self.rows_decoded
        );

        Ok(true)
    }

    /// Whether only zero bits too few to hold a row are left.
    fn at_padding_end(&mut self) -> Result<bool> {
        let (bits, available) = self.reader.peek_bits_padded(32)?;

        Ok(available < 32 && bits == 0)
    }

    /// Skip to the next EOL code without consuming it, or to the end of the
    /// data.
    fn skip_to_eol(&mut self) -> Result<()> {
        loop {
            let (bits, available) = self.reader.peek_bits_padded(EOL_LEN)?;

            if available < EOL_LEN {
                return Ok(self.reader.skip_bits(available)?);
            }

            if bits == EOL {
                return Ok(());
            }

            self.reader.skip_bits(1)?;
        }
    }

    fn decode_1d(&mut self, row: &mut [u8]) -> Result<()> {
        let width = self.info.columns as usize;
        let mut a0 = 0;
        let mut black = false;

        while a0 < width {
            let end = a0 + self.decode_run(black, width)?;
            if end > width {
                bail!(FaxError::BadLineLength);
            }

            if black {
                fill_black(row, a0, end);
            }

            a0 = end;
            black = !black;
        }

        Ok(())
    }

    fn decode_2d(&mut self, row: &mut [u8]) -> Result<()> {
        let width = self.info.columns as usize;
        let mut a0 = 0;
        let mut black = false;
        // Whether a0 still sits on the imaginary pixel before the first column.
        let mut start = true;

        while a0 < width {
            let (b1, b2) = reference_changes(&self.reference, a0, width, black, start);
            let (id, _) = self.decode_code(&MODE_TABLE)?;
            let Some(mode) = Mode::from_id(id) else {
                bail!(FaxError::InvalidCode);
            };

            match mode {
                Mode::Pass => {
                    if black {
                        fill_black(row, a0, b2);
                    }

                    a0 = b2;
                }
                Mode::Horizontal => {
                    let a1 = a0 + self.decode_run(black, width)?;
                    let a2 = a1 + self.decode_run(!black, width)?;
                    if a2 > width {
                        bail!(FaxError::BadLineLength);
                    }

                    if black {
                        fill_black(row, a0, a1);
                    } else {
                        fill_black(row, a1, a2);
                    }

                    a0 = a2;
                }
                Mode::Vertical(offset) => {
                    let a1 = b1 as isize + isize::from(offset);
                    let min = if start { a0 as isize } else { a0 as isize + 1 };
                    if a1 < min || a1 > width as isize {
                        bail!(FaxError::BadLineLength);
                    }

                    let a1 = a1 as usize;
                    if black {
                        fill_black(row, a0, a1);
                    }

                    a0 = a1;
                    black = !black;
                }
                Mode::Extension => {
                    // The three bits after the prefix select the extension.
                    self.reader.skip_bits(3)?;
                    bail!(FaxError::UnsupportedExtension);
                }
            }

            start = false;
        }

        Ok(())
    }

    /// Decode a run length, including any make-up codes.
    fn decode_run(&mut self, black: bool, width: usize) -> Result<usize> {
        let table = if black { &BLACK_TABLE } else { &WHITE_TABLE };
        let mut total = 0;

        loop {
            let (value, make_up) = self.decode_code(table)?;
            total += usize::from(value);

            if total > width {
                bail!(FaxError::BadLineLength);
            }

            if !make_up {
                return Ok(total);
            }
        }
    }

    /// Decode a single code. Returns its value and whether it is a make-up
    /// code.
    fn decode_code(&mut self, table: &ByteTable) -> Result<(u16, bool)> {
        let mut state = 0;
        let mut first_byte = true;

        loop {
            let (byte, available) = self.reader.peek_bits_padded(8)?;
            let transition = table.lookup(state, byte as u8);

            let (bits, decoded) = match transition.action {
                Action::Incomplete => {
                    if available < 8 {
                        bail!(FaxError::UnexpectedEof);
                    }

                    self.reader.skip_bits(8)?;
                    state = transition.next;
                    first_byte = false;
                    continue;
                }
                Action::Terminating { value, bits } => (bits, (value, false)),
                Action::MakeUp { value, bits } => (bits, (value, true)),
                Action::Invalid { bits } => {
                    if u32::from(bits) > available {
                        bail!(FaxError::UnexpectedEof);
                    }

                    if first_byte && self.at_eol_prefix()? {
                        bail!(FaxError::PrematureEol);
                    }

                    bail!(FaxError::InvalidCode);
                }
            };

            if u32::from(bits) > available {
                bail!(FaxError::UnexpectedEof);
            }

            self.reader.skip_bits(u32::from(bits))?;

            return Ok(decoded);
        }
    }

    /// Whether the next bits are the eleven zeros an EOL starts with.
    fn at_eol_prefix(&mut self) -> Result<bool> {
        let (bits, available) = self.reader.peek_bits_padded(EOL_LEN)?;

        Ok(available >= EOL_LEN - 1 && bits >> 1 == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FaxFlags;

    /// Pack a string of `0` and `1` characters MSB first, ignoring spaces.
    fn bits(s: &str) -> Vec<u8> {
        let digits: Vec<u8> = s.bytes().filter(|b| *b != b' ').collect();
        digits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0_u8, |acc, (i, b)| acc | ((b - b'0') << (7 - i)))
            })
            .collect()
    }

    fn decoder(data: &[u8], info: StripInfo) -> FaxDecoder<&[u8]> {
        FaxDecoder::new(data, info).unwrap()
    }

    #[test]
    fn white_row_without_leading_eol() {
        // White run 16, then EOL.
        let data = bits("101010 000000000001");
        let mut decoder = decoder(&data, StripInfo::new(16, 0, EncodingMode::Group3_1D));
        let mut row = [0xaa; 2];

        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::Decoded));
        assert_eq!(row, [0, 0]);
        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::EndOfData));
    }

    #[test]
    fn one_d_runs() {
        // EOL, white 3 (1000), black 2 (11), white 3 (1000).
        let data = bits("000000000001 1000 11 1000");
        let mut decoder = decoder(&data, StripInfo::new(8, 1, EncodingMode::Group3_1D));
        let mut row = [0; 1];

        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::Decoded));
        assert_eq!(row, [0b0001_1000]);
    }

    #[test]
    fn make_up_codes() {
        // White 64 + 6 (11011 1110), black 2 (11).
        let data = bits("11011 1110 11");
        let info = StripInfo {
            flags: FaxFlags::NO_EOL,
            ..StripInfo::new(72, 1, EncodingMode::Group3_1D)
        };
        let mut decoder = decoder(&data, info);
        let mut row = [0; 9];

        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::Decoded));
        assert_eq!(row, [0, 0, 0, 0, 0, 0, 0, 0, 0b0000_0011]);
    }

    #[test]
    fn fill_bits_before_eol() {
        let data = bits("0000 000000000001 1000 11 1000");
        let mut decoder = decoder(&data, StripInfo::new(8, 1, EncodingMode::Group3_1D));
        let mut row = [0; 1];

        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::Decoded));
        assert_eq!(row, [0b0001_1000]);
    }

    #[test]
    fn group4_vertical_and_pass() {
        // Row 1 against a white reference: horizontal (001) white 2 (0111),
        // black 3 (10), then V0 (1) for the end of the row.
        // Row 2: V0 (1), V0 (1), then the white run continues to the end: V0.
        let data = bits("001 0111 10 1 1 1 1");
        let mut decoder = decoder(&data, StripInfo::group4(8, 2, FaxFlags::empty()));
        let mut row = [0; 1];

        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::Decoded));
        assert_eq!(row, [0b0011_1000]);
        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::Decoded));
        assert_eq!(row, [0b0011_1000]);
        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::EndOfData));
    }

    #[test]
    fn group4_end_of_block() {
        // V0 for an all-white row, then EOFB.
        let data = bits("1 000000000001 000000000001");
        let mut decoder = decoder(&data, StripInfo::group4(8, 0, FaxFlags::empty()));
        let mut row = [0xff; 1];

        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::Decoded));
        assert_eq!(row, [0]);
        assert_eq!(decoder.decode_row(&mut row), Ok(RowStatus::EndOfData));
    }

    #[test]
    fn premature_eol() {
        // White 3, then an EOL in the middle of the row.
        let data = bits("000000000001 1000 000000000001 10111");
        let mut decoder = decoder(&data, StripInfo::new(8, 2, EncodingMode::Group3_1D));
        let mut row = [0; 1];

        assert_eq!(decoder.decode_row(&mut row), Err(FaxError::PrematureEol));
        assert_eq!(decoder.rows_decoded(), 1);
    }

    #[test]
    fn extension_is_unsupported() {
        let data = bits("0000001 111 1111");
        let mut decoder = decoder(&data, StripInfo::group4(8, 1, FaxFlags::empty()));
        let mut row = [0; 1];

        assert_eq!(
            decoder.decode_row(&mut row),
            Err(FaxError::UnsupportedExtension)
        );
    }

    #[test]
    fn overlong_run() {
        // White 9 (10100) in an 8 pixel row.
        let data = bits("10100 000");
        let info = StripInfo {
            flags: FaxFlags::NO_EOL,
            ..StripInfo::new(8, 1, EncodingMode::Group3_1D)
        };
        let mut decoder = decoder(&data, info);
        let mut row = [0; 1];

        assert_eq!(decoder.decode_row(&mut row), Err(FaxError::BadLineLength));
    }

    #[test]
    fn recovery_resyncs_on_eol() {
        // An invalid black code (0000000 0...) in the first row, then a
        // good second row.
        let data = bits("000000000001 1000 00000000 1 000000000001 0111 11 1011");
        let mut decoder = decoder(&data, StripInfo::new(8, 2, EncodingMode::Group3_1D));
        let mut buf = [0xff; 2];

        assert_eq!(decoder.decode_rows(&mut buf), Ok(2));
        assert_eq!(buf, [0, 0b0011_0000]);
    }

    #[test]
    fn truncated_row_is_padded() {
        // EOL, white 2 (0111), black 3 (10), then the data ends.
        let data = bits("000000000001 0111 10");
        let mut decoder = decoder(&data, StripInfo::new(16, 3, EncodingMode::Group3_1D));
        let mut buf = [0xff; 6];

        assert_eq!(decoder.decode_rows(&mut buf), Ok(1));
        assert_eq!(buf, [0b0011_1000, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn small_buffer() {
        let data = bits("101010");
        let mut decoder = decoder(&data, StripInfo::new(16, 1, EncodingMode::Group3_1D));

        assert_eq!(
            decoder.decode_row(&mut [0; 1]),
            Err(FaxError::BufferTooSmall)
        );
    }
}
