//! The adaptive binary arithmetic coder.
//!
//! Both directions work on a 16-bit interval `aa` that is split for every
//! decision according to the probability of the decision's context. A zero
//! takes the lower part of the interval and a one the upper part. Whenever
//! the interval drops below half its range, it is doubled and one bit is
//! moved between the coder and the bit stream.
//!
//! The encoder can produce a carry into bits it has already emitted. Output
//! therefore holds back the most recent zero bit and the run of ones that
//! follows it, since a carry turns `0111` into `1000`.

use crate::error::Result;
use crate::table::{CONTEXTS, ProbabilityTable};
use log::warn;
use std::io::{Read, Write};
use xv_common::bit::{BitReader, BitWriter};

const HALF: u32 = 0x8000;
const FULL: u32 = 0xffff;

/// A coder of binary decisions.
///
/// Encoders code `bit` and return it. Decoders ignore `bit` and return the
/// decoded decision. This lets a single model drive every direction.
pub(crate) trait Coder {
    /// Code one decision in `context`.
    fn code(&mut self, context: usize, bit: bool) -> Result<bool>;
}

/// The precomputed interval splits for a probability table.
///
/// Indexed by the seven bits of `aa` below its top bit and the context.
pub(crate) struct MuluTable(Box<[u16]>);

impl MuluTable {
    pub(crate) fn new(table: &ProbabilityTable) -> Self {
        let mut splits = vec![0; 128 * CONTEXTS].into_boxed_slice();

        for j in 0..128_u32 {
            for (context, &p) in table.probabilities().iter().enumerate() {
                let split = (((0x80 | j) * u32::from(p)) >> 8).max(1);
                splits[(j as usize) << 7 | context] = split as u16;
            }
        }

        Self(splits)
    }

    /// The size of the lower sub-interval of `aa` for a zero decision.
    #[inline]
    fn split(&self, aa: u32, context: usize) -> u32 {
        u32::from(self.0[(((aa >> 8) & 0x7f) as usize) << 7 | context])
    }
}

/// An arithmetic decoder.
pub(crate) struct ArithDecoder<R> {
    reader: BitReader<R>,
    mulu: MuluTable,
    aa: u32,
    /// The offset of the code value from the bottom of the interval.
    dd: u32,
}

impl<R: Read> ArithDecoder<R> {
    pub(crate) fn new(mut reader: BitReader<R>, table: &ProbabilityTable) -> Result<Self> {
        let dd = reader.read_bits(16)?;

        Ok(Self {
            reader,
            mulu: MuluTable::new(table),
            aa: FULL,
            dd,
        })
    }

    pub(crate) fn bits_consumed(&self) -> u64 {
        self.reader.bits_consumed()
    }
}

impl<R: Read> Coder for ArithDecoder<R> {
    #[inline]
    fn code(&mut self, context: usize, _: bool) -> Result<bool> {
        let pp = self.mulu.split(self.aa, context);

        let bit = if self.dd >= pp {
            self.dd -= pp;
            self.aa -= pp;
            true
        } else {
            self.aa = pp;
            false
        };

        while self.aa < HALF {
            self.aa <<= 1;
            self.dd = ((self.dd << 1) | u32::from(self.reader.read_bit()?)) & FULL;
        }

        Ok(bit)
    }
}

/// An arithmetic encoder.
pub(crate) struct ArithEncoder<W: Write> {
    writer: BitWriter<W>,
    mulu: MuluTable,
    aa: u32,
    /// The bottom of the interval.
    cc: u32,
    /// Whether a zero bit is held back.
    zero: bool,
    /// The number of one bits held back after the zero bit.
    pending: u64,
    carries: u64,
}

impl<W: Write> ArithEncoder<W> {
    pub(crate) fn new(writer: BitWriter<W>, table: &ProbabilityTable) -> Self {
        Self {
            writer,
            mulu: MuluTable::new(table),
            aa: FULL,
            cc: 0,
            zero: false,
            pending: 0,
            carries: 0,
        }
    }

    /// The number of carries propagated into emitted bits so far.
    pub(crate) fn carries(&self) -> u64 {
        self.carries
    }

    /// Emit the final 16 bits of the interval, flush and return the sink.
    pub(crate) fn finish(mut self) -> Result<W> {
        for shift in (0..16).rev() {
            self.emit((self.cc >> shift) & 1 == 1)?;
        }

        self.release()?;

        Ok(self.writer.finish()?)
    }

    #[inline]
    fn emit(&mut self, bit: bool) -> Result<()> {
        if bit {
            if self.zero {
                self.pending += 1;
            } else {
                self.writer.write_bit(true)?;
            }
        } else {
            self.release()?;
            self.zero = true;
        }

        Ok(())
    }

    /// Write out the held zero bit and the ones after it.
    fn release(&mut self) -> Result<()> {
        if self.zero {
            self.writer.write_bit(false)?;
            self.write_run(true, self.pending)?;
            self.zero = false;
            self.pending = 0;
        }

        Ok(())
    }

    fn carry(&mut self) -> Result<()> {
        self.carries += 1;

        if !self.zero {
            warn!("arithmetic carry without a pending zero bit");
            return Ok(());
        }

        // 0111 becomes 1000. The last of the new zeros is held back again.
        self.writer.write_bit(true)?;
        if self.pending == 0 {
            self.zero = false;
        } else {
            self.write_run(false, self.pending - 1)?;
            self.pending = 0;
        }

        Ok(())
    }

    fn write_run(&mut self, bit: bool, mut count: u64) -> Result<()> {
        let word = if bit { u32::MAX } else { 0 };

        while count > 0 {
            let take = count.min(32) as u32;
            self.writer.write_bits(word, take)?;
            count -= u64::from(take);
        }

        Ok(())
    }
}

impl<W: Write> Coder for ArithEncoder<W> {
    #[inline]
    fn code(&mut self, context: usize, bit: bool) -> Result<bool> {
        let pp = self.mulu.split(self.aa, context);

        if bit {
            self.cc += pp;
            self.aa -= pp;

            if self.cc > FULL {
                self.carry()?;
                self.cc &= FULL;
            }
        } else {
            self.aa = pp;
        }

        while self.aa < HALF {
            self.emit(self.cc & HALF != 0)?;
            self.cc = (self.cc << 1) & FULL;
            self.aa <<= 1;
        }

        Ok(bit)
    }
}

/// Counts the decisions of every context without coding them.
pub(crate) struct StatisticsCollector {
    counts: Box<[[u32; 2]; CONTEXTS]>,
}

impl StatisticsCollector {
    pub(crate) fn new() -> Self {
        Self {
            counts: Box::new([[0; 2]; CONTEXTS]),
        }
    }

    pub(crate) fn into_table(self) -> ProbabilityTable {
        ProbabilityTable::from_counts(&self.counts)
    }
}

impl Coder for StatisticsCollector {
    #[inline]
    fn code(&mut self, context: usize, bit: bool) -> Result<bool> {
        let count = &mut self.counts[context][usize::from(bit)];
        *count = count.saturating_add(1);

        Ok(bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Pic2Error;

    /// A xorshift generator, so that the sequences are reproducible.
    struct Noise(u32);

    impl Noise {
        fn next(&mut self) -> u32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 17;
            self.0 ^= self.0 << 5;
            self.0
        }
    }

    fn skewed_table() -> ProbabilityTable {
        let mut counts = [[0; 2]; CONTEXTS];
        counts[0] = [7, 1];
        counts[1] = [1, 7];
        counts[2] = [1, 1];
        ProbabilityTable::from_counts(&counts)
    }

    fn encode(decisions: &[(usize, bool)], table: &ProbabilityTable) -> (Vec<u8>, u64) {
        let mut encoder = ArithEncoder::new(BitWriter::new(Vec::new()), table);
        for &(context, bit) in decisions {
            encoder.code(context, bit).unwrap();
        }

        let carries = encoder.carries();
        (encoder.finish().unwrap(), carries)
    }

    fn decode(data: &[u8], contexts: &[usize], table: &ProbabilityTable) -> Vec<bool> {
        let mut decoder = ArithDecoder::new(BitReader::new(data), table).unwrap();
        contexts
            .iter()
            .map(|&context| decoder.code(context, false).unwrap())
            .collect()
    }

    #[test]
    fn carries_are_propagated() {
        let table = skewed_table();
        let mut noise = Noise(0x2545_f491);
        let decisions: Vec<_> = (0..20_000)
            .map(|_| {
                let n = noise.next();
                ((n % 3) as usize, (n >> 8) % 2 == 0)
            })
            .collect();

        let (data, carries) = encode(&decisions, &table);
        assert!(carries > 0);

        let contexts: Vec<_> = decisions.iter().map(|d| d.0).collect();
        let bits: Vec<_> = decisions.iter().map(|d| d.1).collect();
        assert_eq!(decode(&data, &contexts, &table), bits);
    }

    #[test]
    fn long_runs_of_likely_decisions() {
        let table = skewed_table();
        let decisions: Vec<_> = (0..5_000).map(|i| (0, i % 97 == 0)).collect();

        let (data, _) = encode(&decisions, &table);
        assert!(data.len() < 5_000 / 8);

        let contexts = vec![0; decisions.len()];
        let bits: Vec<_> = decisions.iter().map(|d| d.1).collect();
        assert_eq!(decode(&data, &contexts, &table), bits);
    }

    #[test]
    fn decoder_consumes_every_emitted_bit() {
        let table = ProbabilityTable::default();
        let decisions = [(5, true), (5, false), (6, true)];

        // Two renormalizations (one after a carry) and the final 16 bits.
        let (data, carries) = encode(&decisions, &table);
        assert_eq!(carries, 1);
        assert_eq!(data, [0b1001_1111, 0b1000_0000, 0b0000_0000]);

        let mut decoder = ArithDecoder::new(BitReader::new(&data[..]), &table).unwrap();
        for (context, bit) in decisions {
            assert_eq!(decoder.code(context, false), Ok(bit));
        }
        assert_eq!(decoder.bits_consumed(), 18);
    }

    #[test]
    fn truncated_stream() {
        let table = ProbabilityTable::default();
        assert!(matches!(
            ArithDecoder::new(BitReader::new(&[0xab][..]), &table),
            Err(Pic2Error::CorruptFile)
        ));

        let mut decoder = ArithDecoder::new(BitReader::new(&[0xab, 0xcd][..]), &table).unwrap();
        assert_eq!(decoder.code(0, false), Ok(true));
        assert_eq!(decoder.code(0, false), Err(Pic2Error::CorruptFile));
    }

    #[test]
    fn statistics() {
        let mut collector = StatisticsCollector::new();
        for bit in [false, false, false, true] {
            assert_eq!(collector.code(3, bit), Ok(bit));
        }

        let table = collector.into_table();
        assert_eq!(table.probability(3), 0xc000);
        assert_eq!(table.probability(4), 0x8000);
    }
}
