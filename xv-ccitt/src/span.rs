//! Scanning packed rows for runs and changing elements.
//!
//! Rows are packed MSB first with one bit per pixel, where a set bit is a
//! black pixel.

/// The number of pixels from `bs` (inclusive) to `be` (exclusive) that are
/// white before the first black pixel.
#[inline]
pub(crate) fn find0span(bp: &[u8], bs: usize, be: usize) -> usize {
    span(bp, bs, be, false)
}

/// The number of pixels from `bs` (inclusive) to `be` (exclusive) that are
/// black before the first white pixel.
#[inline]
pub(crate) fn find1span(bp: &[u8], bs: usize, be: usize) -> usize {
    span(bp, bs, be, true)
}

/// The position of the first pixel at or after `bs` whose color is not
/// `black`, or `be` if there is none.
#[inline]
pub(crate) fn find_diff(bp: &[u8], bs: usize, be: usize, black: bool) -> usize {
    bs + span(bp, bs, be, black)
}

/// Like [`find_diff`], but `be` is also returned if `bs` is already past the
/// end of the row.
#[inline]
pub(crate) fn find_diff2(bp: &[u8], bs: usize, be: usize, black: bool) -> usize {
    if bs < be { find_diff(bp, bs, be, black) } else { be }
}

/// Whether the pixel at `x` is black.
#[inline(always)]
pub(crate) fn pixel(bp: &[u8], x: usize) -> bool {
    (bp[x >> 3] >> (7 - (x & 7))) & 1 == 1
}

/// Set the pixels in `start..end` to black.
pub(crate) fn fill_black(bp: &mut [u8], start: usize, end: usize) {
    if start >= end {
        return;
    }

    let first = start >> 3;
    let last = (end - 1) >> 3;
    let head = 0xff_u8 >> (start & 7);
    let tail = 0xff_u8 << (7 - ((end - 1) & 7));

    if first == last {
        bp[first] |= head & tail;
        return;
    }

    bp[first] |= head;
    bp[first + 1..last].fill(0xff);
    bp[last] |= tail;
}

/// The changing elements `b1` and `b2` on the reference line `rp`.
///
/// `b1` is the first changing element to the right of `a0` whose color is
/// the opposite of `color`, `b2` the next changing element after it. At the
/// start of a row, `a0` sits on an imaginary white pixel before the first
/// column, so a black first pixel is itself a changing element.
pub(crate) fn reference_changes(
    rp: &[u8],
    a0: usize,
    width: usize,
    black: bool,
    start: bool,
) -> (usize, usize) {
    let b1 = if start {
        find_diff(rp, 0, width, false)
    } else {
        let b = find_diff2(rp, a0, width, !black);
        find_diff2(rp, b, width, black)
    };
    let b2 = find_diff2(rp, b1, width, !black);

    (b1, b2)
}

fn span(bp: &[u8], bs: usize, be: usize, black: bool) -> usize {
    if bs >= be {
        return 0;
    }

    let invert = if black { 0xff_u8 } else { 0 };
    let mut pos = bs;

    // Partial leading byte.
    let bit = pos & 7;
    if bit != 0 {
        let byte = (bp[pos >> 3] ^ invert) << bit;
        let n = (byte.leading_zeros() as usize).min(8 - bit);
        pos += n;

        if n < 8 - bit || pos >= be {
            return pos.min(be) - bs;
        }
    }

    // Whole words while the run is long.
    let word_invert = if black { u64::MAX } else { 0 };
    while be - pos >= 64 {
        let idx = pos >> 3;
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(&bp[idx..idx + 8]);
        let word = u64::from_be_bytes(bytes) ^ word_invert;

        if word != 0 {
            pos += word.leading_zeros() as usize;
            return pos.min(be) - bs;
        }

        pos += 64;
    }

    // Whole bytes.
    while be - pos >= 8 {
        let byte = bp[pos >> 3] ^ invert;

        if byte != 0 {
            pos += byte.leading_zeros() as usize;
            return pos.min(be) - bs;
        }

        pos += 8;
    }

    // Partial trailing byte.
    if pos < be {
        let byte = bp[pos >> 3] ^ invert;
        pos += (byte.leading_zeros() as usize).min(be - pos);
    }

    pos.min(be) - bs
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    fn naive_span(bp: &[u8], bs: usize, be: usize, black: bool) -> usize {
        (bs..be).take_while(|x| pixel(bp, *x) == black).count()
    }

    #[test]
    fn spans_in_one_byte() {
        let row = [0b0001_1100];
        assert_eq!(find0span(&row, 0, 8), 3);
        assert_eq!(find1span(&row, 3, 8), 3);
        assert_eq!(find0span(&row, 6, 8), 2);
        assert_eq!(find1span(&row, 0, 8), 0);
    }

    #[test]
    fn span_stops_at_end() {
        let row = [0x00, 0x00, 0xff];
        assert_eq!(find0span(&row, 2, 12), 10);
        assert_eq!(find0span(&row, 0, 24), 16);
        assert_eq!(find1span(&row, 16, 20), 4);
        assert_eq!(find0span(&row, 5, 5), 0);
    }

    #[test]
    fn long_spans() {
        let mut row = vec![0xff_u8; 40];
        row[37] = 0b1110_1111;
        assert_eq!(find1span(&row, 1, 320), 298);
        assert_eq!(find_diff(&row, 1, 320, true), 299);
        assert_eq!(find0span(&row, 299, 320), 1);
    }

    #[test]
    fn fill() {
        let mut row = [0_u8; 3];
        fill_black(&mut row, 3, 5);
        assert_eq!(row, [0b0001_1000, 0, 0]);
        fill_black(&mut row, 6, 20);
        assert_eq!(row, [0b0001_1011, 0xff, 0b1111_0000]);
        fill_black(&mut row, 9, 9);
        assert_eq!(row, [0b0001_1011, 0xff, 0b1111_0000]);
    }

    #[test]
    fn changing_elements() {
        // Columns 2..5 black.
        let rp = [0b0011_1000];
        assert_eq!(reference_changes(&rp, 0, 8, false, true), (2, 5));
        // After a black a0 at column 3, b1 is the next white changing element.
        assert_eq!(reference_changes(&rp, 3, 8, true, false), (5, 8));
        // A black first pixel is a changing element at the start of a row.
        let rp = [0b1000_0000];
        assert_eq!(reference_changes(&rp, 0, 8, false, true), (0, 1));
        assert_eq!(reference_changes(&rp, 7, 8, false, false), (8, 8));
    }

    quickcheck! {
        fn spans_match_naive_scan(data: Vec<u8>, start: usize, len: usize) -> bool {
            let bits = data.len() * 8;
            if bits == 0 {
                return true;
            }

            let bs = start % bits;
            let be = (bs + len % (bits + 1)).min(bits);

            find0span(&data, bs, be) == naive_span(&data, bs, be, false)
                && find1span(&data, bs, be) == naive_span(&data, bs, be, true)
        }

        fn long_runs_match_naive_scan(len: u16, start: u8, black: bool) -> bool {
            // Exercise the word scan with runs of a few hundred pixels.
            let run = usize::from(len % 600);
            let bits = run + 80;
            let mut data = vec![0_u8; bits.div_ceil(8)];
            if !black {
                data.fill(0xff);
            }
            let bs = usize::from(start % 8);
            for x in bs..(bs + run).min(bits) {
                let mask = 1 << (7 - (x & 7));
                if black {
                    data[x >> 3] |= mask;
                } else {
                    data[x >> 3] &= !mask;
                }
            }

            span(&data, bs, bits, black) == naive_span(&data, bs, bits, black)
        }
    }
}
