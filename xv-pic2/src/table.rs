//! The probability table stored in front of every arithmetic-coded block.

use crate::error::{Pic2Error, Result, bail};

/// The number of coding contexts.
pub const CONTEXTS: usize = 128;

/// The size of the serialized table in bytes.
pub const PROLOGUE_LEN: usize = CONTEXTS * 2;

const MIN_PROBABILITY: u32 = 0x0040;
const MAX_PROBABILITY: u32 = 0xffc0;

/// For every context, the probability of a zero decision as a 16-bit
/// fraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbabilityTable {
    probabilities: [u16; CONTEXTS],
}

impl Default for ProbabilityTable {
    fn default() -> Self {
        Self {
            probabilities: [0x8000; CONTEXTS],
        }
    }
}

impl ProbabilityTable {
    /// Derive a table from per-context counts of zero and one decisions.
    ///
    /// Contexts that were never used get an even split. All others are
    /// clamped so that neither outcome becomes impossible to code.
    pub fn from_counts(counts: &[[u32; 2]; CONTEXTS]) -> Self {
        let mut table = Self::default();

        for (probability, [zeros, ones]) in table.probabilities.iter_mut().zip(counts) {
            let total = u64::from(*zeros) + u64::from(*ones);
            if total == 0 {
                continue;
            }

            let p = (u64::from(*zeros) * 0x10000 + total / 2) / total;
            *probability = (p as u32).clamp(MIN_PROBABILITY, MAX_PROBABILITY) as u16;
        }

        table
    }

    /// The probability of a zero decision in `context`.
    pub fn probability(&self, context: usize) -> u16 {
        self.probabilities[context]
    }

    /// All probabilities, indexed by context.
    pub fn probabilities(&self) -> &[u16; CONTEXTS] {
        &self.probabilities
    }

    /// Parse a table from the first [`PROLOGUE_LEN`] bytes of `data`, stored as
    /// big-endian 16-bit values.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let Some(data) = data.get(..PROLOGUE_LEN) else {
            bail!(Pic2Error::CorruptFile);
        };

        let mut table = Self::default();
        for (probability, bytes) in table.probabilities.iter_mut().zip(data.chunks_exact(2)) {
            *probability = u16::from_be_bytes([bytes[0], bytes[1]]);
        }

        Ok(table)
    }

    /// Serialize the table as big-endian 16-bit values.
    pub fn to_bytes(&self) -> [u8; PROLOGUE_LEN] {
        let mut out = [0; PROLOGUE_LEN];
        for (bytes, probability) in out.chunks_exact_mut(2).zip(&self.probabilities) {
            bytes.copy_from_slice(&probability.to_be_bytes());
        }

        out
    }
}
