//! Coding of small non-negative numbers and of channel values relative to a
//! prediction.

use crate::arith::Coder;
use crate::error::{Pic2Error, Result, bail};

/// The number of magnitude buckets. Bucket `b` holds `2^b - 1 ..= 2^(b+1) - 2`.
const BUCKETS: u32 = 9;

/// The largest number [`code_nn`] can represent.
pub(crate) const MAX_NUMBER: u32 = (1 << BUCKETS) - 2;

/// Code a number of at most [`MAX_NUMBER`] using 15 contexts from `base` on.
///
/// The bucket is coded in unary on `base..base + 8`, followed by the offset
/// into the bucket on a context chosen by the bucket size. Decoders ignore
/// `value`. Returns the number that was coded.
pub(crate) fn code_nn<C: Coder>(coder: &mut C, base: usize, value: u32) -> Result<u32> {
    debug_assert!(value <= MAX_NUMBER);

    let hint = (value + 1).ilog2();
    let mut bucket = 0;

    while bucket < BUCKETS - 1 {
        if !coder.code(base + bucket as usize, bucket < hint)? {
            break;
        }

        bucket += 1;
    }

    let context = base + 7 + bucket.min(7) as usize;
    let hint_offset = (value + 1).wrapping_sub(1 << bucket);
    let mut offset = 0;

    for shift in (0..bucket).rev() {
        let bit = coder.code(context, (hint_offset >> shift) & 1 == 1)?;
        offset = (offset << 1) | u32::from(bit);
    }

    Ok((1 << bucket) - 1 + offset)
}

/// Map a channel value `c` to a small code given its prediction `bef`.
///
/// Values close to the prediction alternate around it (`bef`, `bef + 1`,
/// `bef - 1`, ...). Once one side runs out of room the remaining values keep
/// their own magnitude. Predictions in the upper half are mirrored first.
pub(crate) fn fold(c: u32, bef: u32, max: u32) -> u32 {
    if bef > max / 2 {
        return fold(max - c, max - bef, max);
    }

    let d = i64::from(c) - i64::from(bef);
    if d.unsigned_abs() > u64::from(bef) {
        c
    } else if d > 0 {
        (2 * d - 1) as u32
    } else {
        (-2 * d) as u32
    }
}

/// The inverse of [`fold`].
pub(crate) fn unfold(code: u32, bef: u32, max: u32) -> Result<u32> {
    if bef > max / 2 {
        return Ok(max - unfold(code, max - bef, max)?);
    }

    if code <= 2 * bef {
        Ok(if code % 2 == 1 {
            bef + code.div_ceil(2)
        } else {
            bef - code / 2
        })
    } else if code <= max {
        Ok(code)
    } else {
        bail!(Pic2Error::CorruptFile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    /// Records the decisions it is asked to code.
    #[derive(Default)]
    struct Recorder(Vec<(usize, bool)>);

    impl Coder for Recorder {
        fn code(&mut self, context: usize, bit: bool) -> Result<bool> {
            self.0.push((context, bit));
            Ok(bit)
        }
    }

    /// Replays recorded decisions.
    struct Replay(std::vec::IntoIter<(usize, bool)>);

    impl Coder for Replay {
        fn code(&mut self, context: usize, _: bool) -> Result<bool> {
            let (expected, bit) = self.0.next().ok_or(Pic2Error::CorruptFile)?;
            assert_eq!(context, expected);
            Ok(bit)
        }
    }

    fn decisions(value: u32) -> Vec<(usize, bool)> {
        let mut recorder = Recorder::default();
        assert_eq!(code_nn(&mut recorder, 0, value), Ok(value));
        recorder.0
    }

    #[test]
    fn buckets() {
        assert_eq!(decisions(0), [(0, false)]);
        assert_eq!(decisions(1), [(0, true), (1, false), (8, false)]);
        assert_eq!(decisions(2), [(0, true), (1, false), (8, true)]);
        assert_eq!(
            decisions(5),
            [(0, true), (1, true), (2, false), (9, true), (9, false)]
        );

        // The last bucket has no terminating decision.
        let max = decisions(MAX_NUMBER);
        assert_eq!(max.len(), 8 + 8);
        assert!(max.iter().all(|&(_, bit)| bit));
        assert!(max[8..].iter().all(|&(context, _)| context == 14));
    }

    #[test]
    fn folding_near_the_edges() {
        // Prediction 1 out of 0..=7: 1, 2, 0 first, then the rest in order.
        let codes: Vec<_> = (0..=7).map(|c| fold(c, 1, 7)).collect();
        assert_eq!(codes, [2, 0, 1, 3, 4, 5, 6, 7]);

        // Prediction 6 is mirrored.
        let codes: Vec<_> = (0..=7).map(|c| fold(c, 6, 7)).collect();
        assert_eq!(codes, [7, 6, 5, 4, 3, 1, 0, 2]);

        assert_eq!(unfold(8, 1, 7), Err(Pic2Error::CorruptFile));
    }

    quickcheck! {
        fn numbers_replay(value: u16) -> bool {
            let value = u32::from(value) % (MAX_NUMBER + 1);
            let mut replay = Replay(decisions(value).into_iter());
            code_nn(&mut replay, 0, 0) == Ok(value)
        }

        fn fold_is_a_bijection(bits: u8, bef: u8) -> bool {
            let max = (1_u32 << (bits % 8 + 1)) - 1;
            let bef = u32::from(bef) & max;
            let mut seen = vec![false; max as usize + 1];

            (0..=max).all(|c| {
                let code = fold(c, bef, max);
                code <= max
                    && !std::mem::replace(&mut seen[code as usize], true)
                    && unfold(code, bef, max) == Ok(c)
            })
        }
    }
}
