//! Code tables and decoding state machines (T.4 section 4, T.6 section 2).
//!
//! The code tables are turned into binary tries at compile time. Since the
//! decoder consumes input a byte at a time, each trie is then unrolled into a
//! `[state][byte]` transition table once, on first use.

use std::sync::LazyLock;

/// A 2D coding mode (T.4 4.2.1.3.2, Table 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Pass,
    Horizontal,
    /// Vertical mode with `a1 - b1` in -3..=3.
    Vertical(i8),
    /// The prefix of an extension code (`0000001xxx`).
    Extension,
}

// Trie encoding:
// - 0x0000-0x3FFF: next state index
// - 0x8000 | value: decoded run length or mode id (value & 0x1FFF)
// - 0xFFFF: invalid/unused
const VALUE_FLAG: u16 = 0x8000;
const VALUE_MASK: u16 = 0x1FFF;
const INVALID: u16 = 0xFFFF;

/// The end-of-line code, `000000000001`.
pub(crate) const EOL: u32 = 0x001;
pub(crate) const EOL_LEN: u32 = 12;
/// The end-of-facsimile-block marker of T.6, two EOLs.
pub(crate) const EOFB: u32 = 0x001001;
pub(crate) const EOFB_LEN: u32 = 24;
/// The number of EOLs forming a return-to-control sequence.
pub(crate) const RTC_EOLS: usize = 6;

/// A trie node: the entry to follow for a 0 bit and for a 1 bit.
type Node = [u16; 2];

const EMPTY: Node = [INVALID; 2];

/// Add `code` (`len` bits, MSB first) to the trie, allocating inner nodes
/// from `used` on. Returns the number of nodes in use afterwards.
const fn insert_code<const N: usize>(
    nodes: &mut [Node; N],
    mut used: usize,
    value: u16,
    len: u8,
    code: u16,
) -> usize {
    let mut node = 0;
    let mut remaining = len;

    while remaining > 1 {
        remaining -= 1;
        let bit = ((code >> remaining) & 1) as usize;
        let child = nodes[node][bit];

        node = if child == INVALID || child & VALUE_FLAG != 0 {
            nodes[node][bit] = used as u16;
            used += 1;
            used - 1
        } else {
            child as usize
        };
    }

    nodes[node][(code & 1) as usize] = VALUE_FLAG | (value & VALUE_MASK);

    used
}

/// Table 2/T.6 - White terminating codes.
pub(crate) const WHITE_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 8, 0b00110101),
    (1, 6, 0b000111),
    (2, 4, 0b0111),
    (3, 4, 0b1000),
    (4, 4, 0b1011),
    (5, 4, 0b1100),
    (6, 4, 0b1110),
    (7, 4, 0b1111),
    (8, 5, 0b10011),
    (9, 5, 0b10100),
    (10, 5, 0b00111),
    (11, 5, 0b01000),
    (12, 6, 0b001000),
    (13, 6, 0b000011),
    (14, 6, 0b110100),
    (15, 6, 0b110101),
    (16, 6, 0b101010),
    (17, 6, 0b101011),
    (18, 7, 0b0100111),
    (19, 7, 0b0001100),
    (20, 7, 0b0001000),
    (21, 7, 0b0010111),
    (22, 7, 0b0000011),
    (23, 7, 0b0000100),
    (24, 7, 0b0101000),
    (25, 7, 0b0101011),
    (26, 7, 0b0010011),
    (27, 7, 0b0100100),
    (28, 7, 0b0011000),
    (29, 8, 0b00000010),
    (30, 8, 0b00000011),
    (31, 8, 0b00011010),
    (32, 8, 0b00011011),
    (33, 8, 0b00010010),
    (34, 8, 0b00010011),
    (35, 8, 0b00010100),
    (36, 8, 0b00010101),
    (37, 8, 0b00010110),
    (38, 8, 0b00010111),
    (39, 8, 0b00101000),
    (40, 8, 0b00101001),
    (41, 8, 0b00101010),
    (42, 8, 0b00101011),
    (43, 8, 0b00101100),
    (44, 8, 0b00101101),
    (45, 8, 0b00000100),
    (46, 8, 0b00000101),
    (47, 8, 0b00001010),
    (48, 8, 0b00001011),
    (49, 8, 0b01010010),
    (50, 8, 0b01010011),
    (51, 8, 0b01010100),
    (52, 8, 0b01010101),
    (53, 8, 0b00100100),
    (54, 8, 0b00100101),
    (55, 8, 0b01011000),
    (56, 8, 0b01011001),
    (57, 8, 0b01011010),
    (58, 8, 0b01011011),
    (59, 8, 0b01001010),
    (60, 8, 0b01001011),
    (61, 8, 0b00110010),
    (62, 8, 0b00110011),
    (63, 8, 0b00110100),
];

/// Table 3/T.6 - White make-up codes.
pub(crate) const WHITE_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 5, 0b11011),
    (128, 5, 0b10010),
    (192, 6, 0b010111),
    (256, 7, 0b0110111),
    (320, 8, 0b00110110),
    (384, 8, 0b00110111),
    (448, 8, 0b01100100),
    (512, 8, 0b01100101),
    (576, 8, 0b01101000),
    (640, 8, 0b01100111),
    (704, 9, 0b011001100),
    (768, 9, 0b011001101),
    (832, 9, 0b011010010),
    (896, 9, 0b011010011),
    (960, 9, 0b011010100),
    (1024, 9, 0b011010101),
    (1088, 9, 0b011010110),
    (1152, 9, 0b011010111),
    (1216, 9, 0b011011000),
    (1280, 9, 0b011011001),
    (1344, 9, 0b011011010),
    (1408, 9, 0b011011011),
    (1472, 9, 0b010011000),
    (1536, 9, 0b010011001),
    (1600, 9, 0b010011010),
    (1664, 6, 0b011000),
    (1728, 9, 0b010011011),
];

/// Table 2/T.6 - Black terminating codes.
pub(crate) const BLACK_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 10, 0b0000110111),
    (1, 3, 0b010),
    (2, 2, 0b11),
    (3, 2, 0b10),
    (4, 3, 0b011),
    (5, 4, 0b0011),
    (6, 4, 0b0010),
    (7, 5, 0b00011),
    (8, 6, 0b000101),
    (9, 6, 0b000100),
    (10, 7, 0b0000100),
    (11, 7, 0b0000101),
    (12, 7, 0b0000111),
    (13, 8, 0b00000100),
    (14, 8, 0b00000111),
    (15, 9, 0b000011000),
    (16, 10, 0b0000010111),
    (17, 10, 0b0000011000),
    (18, 10, 0b0000001000),
    (19, 11, 0b00001100111),
    (20, 11, 0b00001101000),
    (21, 11, 0b00001101100),
    (22, 11, 0b00000110111),
    (23, 11, 0b00000101000),
    (24, 11, 0b00000010111),
    (25, 11, 0b00000011000),
    (26, 12, 0b000011001010),
    (27, 12, 0b000011001011),
    (28, 12, 0b000011001100),
    (29, 12, 0b000011001101),
    (30, 12, 0b000001101000),
    (31, 12, 0b000001101001),
    (32, 12, 0b000001101010),
    (33, 12, 0b000001101011),
    (34, 12, 0b000011010010),
    (35, 12, 0b000011010011),
    (36, 12, 0b000011010100),
    (37, 12, 0b000011010101),
    (38, 12, 0b000011010110),
    (39, 12, 0b000011010111),
    (40, 12, 0b000001101100),
    (41, 12, 0b000001101101),
    (42, 12, 0b000011011010),
    (43, 12, 0b000011011011),
    (44, 12, 0b000001010100),
    (45, 12, 0b000001010101),
    (46, 12, 0b000001010110),
    (47, 12, 0b000001010111),
    (48, 12, 0b000001100100),
    (49, 12, 0b000001100101),
    (50, 12, 0b000001010010),
    (51, 12, 0b000001010011),
    (52, 12, 0b000000100100),
    (53, 12, 0b000000110111),
    (54, 12, 0b000000111000),
    (55, 12, 0b000000100111),
    (56, 12, 0b000000101000),
    (57, 12, 0b000001011000),
    (58, 12, 0b000001011001),
    (59, 12, 0b000000101011),
    (60, 12, 0b000000101100),
    (61, 12, 0b000001011010),
    (62, 12, 0b000001100110),
    (63, 12, 0b000001100111),
];

/// Table 3/T.6 - Black make-up codes.
pub(crate) const BLACK_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 10, 0b0000001111),
    (128, 12, 0b000011001000),
    (192, 12, 0b000011001001),
    (256, 12, 0b000001011011),
    (320, 12, 0b000000110011),
    (384, 12, 0b000000110100),
    (448, 12, 0b000000110101),
    (512, 13, 0b0000001101100),
    (576, 13, 0b0000001101101),
    (640, 13, 0b0000001001010),
    (704, 13, 0b0000001001011),
    (768, 13, 0b0000001001100),
    (832, 13, 0b0000001001101),
    (896, 13, 0b0000001110010),
    (960, 13, 0b0000001110011),
    (1024, 13, 0b0000001110100),
    (1088, 13, 0b0000001110101),
    (1152, 13, 0b0000001110110),
    (1216, 13, 0b0000001110111),
    (1280, 13, 0b0000001010010),
    (1344, 13, 0b0000001010011),
    (1408, 13, 0b0000001010100),
    (1472, 13, 0b0000001010101),
    (1536, 13, 0b0000001011010),
    (1600, 13, 0b0000001011011),
    (1664, 13, 0b0000001100100),
    (1728, 13, 0b0000001100101),
];

/// Table 3/T.6 - Common make-up codes.
pub(crate) const COMMON_MAKEUP: [(u16, u8, u16); 13] = [
    (1792, 11, 0b00000001000),
    (1856, 11, 0b00000001100),
    (1920, 11, 0b00000001101),
    (1984, 12, 0b000000010010),
    (2048, 12, 0b000000010011),
    (2112, 12, 0b000000010100),
    (2176, 12, 0b000000010101),
    (2240, 12, 0b000000010110),
    (2304, 12, 0b000000010111),
    (2368, 12, 0b000000011100),
    (2432, 12, 0b000000011101),
    (2496, 12, 0b000000011110),
    (2560, 12, 0b000000011111),
];

/// Table 4/T.4 - Mode codes for 2D coding, plus the extension prefix.
pub(crate) const MODE_CODES: [(u16, u8, u16); 10] = [
    (0, 4, 0b0001),    // Pass
    (1, 3, 0b001),     // Horizontal
    (2, 1, 0b1),       // Vertical_0
    (3, 3, 0b011),     // Vertical_R1
    (4, 6, 0b000011),  // Vertical_R2
    (5, 7, 0b0000011), // Vertical_R3
    (6, 3, 0b010),     // Vertical_L1
    (7, 6, 0b000010),  // Vertical_L2
    (8, 7, 0b0000010), // Vertical_L3
    (9, 7, 0b0000001), // Extension
];

pub(crate) const PASS_CODE: (u16, u8, u16) = MODE_CODES[0];
pub(crate) const HORIZONTAL_CODE: (u16, u8, u16) = MODE_CODES[1];

/// The mode code for vertical mode with `a1 - b1 = offset`.
pub(crate) const fn vertical_code(offset: i8) -> (u16, u8, u16) {
    match offset {
        0..=3 => MODE_CODES[2 + offset as usize],
        _ => MODE_CODES[5 + offset.unsigned_abs() as usize],
    }
}

impl Mode {
    pub(crate) fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            0 => Self::Pass,
            1 => Self::Horizontal,
            2 => Self::Vertical(0),
            3 => Self::Vertical(1),
            4 => Self::Vertical(2),
            5 => Self::Vertical(3),
            6 => Self::Vertical(-1),
            7 => Self::Vertical(-2),
            8 => Self::Vertical(-3),
            9 => Self::Extension,
            _ => return None,
        })
    }
}

const fn insert_codes<const N: usize, const M: usize>(
    nodes: &mut [Node; N],
    mut used: usize,
    codes: &[(u16, u8, u16); M],
) -> usize {
    let mut i = 0;
    while i < codes.len() {
        let (value, len, code) = codes[i];
        used = insert_code(nodes, used, value, len, code);
        i += 1;
    }
    used
}

const fn build_run_states<const N: usize, const T: usize, const M: usize>(
    terminating: &[(u16, u8, u16); T],
    makeup: &[(u16, u8, u16); M],
) -> [Node; N] {
    let mut nodes = [EMPTY; N];
    let used = insert_codes(&mut nodes, 1, terminating);
    let used = insert_codes(&mut nodes, used, makeup);
    insert_codes(&mut nodes, used, &COMMON_MAKEUP);
    nodes
}

const WHITE_STATES: [Node; 104] = build_run_states(&WHITE_TERMINATING, &WHITE_MAKEUP);
const BLACK_STATES: [Node; 104] = build_run_states(&BLACK_TERMINATING, &BLACK_MAKEUP);

const MODE_STATES: [Node; 10] = {
    let mut nodes = [EMPTY; 10];
    insert_codes(&mut nodes, 1, &MODE_CODES);
    nodes
};

/// What happened after feeding one byte into a [`ByteTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// All eight bits were used up without completing a code.
    Incomplete,
    /// A terminating code (or a mode code) completed after `bits` bits.
    Terminating { value: u16, bits: u8 },
    /// A make-up code completed after `bits` bits; decoding continues.
    MakeUp { value: u16, bits: u8 },
    /// No code matches. The mismatch was detected at bit `bits`.
    Invalid { bits: u8 },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Transition {
    pub(crate) next: u8,
    pub(crate) action: Action,
}

/// A trie unrolled into `(state, byte) -> (next state, action)` transitions.
pub(crate) struct ByteTable {
    rows: Box<[[Transition; 256]]>,
}

impl ByteTable {
    fn build(states: &[Node]) -> Self {
        let empty = Transition {
            next: 0,
            action: Action::Incomplete,
        };
        let mut rows = vec![[empty; 256]; states.len()].into_boxed_slice();

        for (start, row) in rows.iter_mut().enumerate() {
            for (byte, transition) in row.iter_mut().enumerate() {
                *transition = Self::walk(states, start, byte as u8);
            }
        }

        Self { rows }
    }

    fn walk(states: &[Node], start: usize, byte: u8) -> Transition {
        let mut state = start;

        for i in 0..8_u8 {
            let bit = (byte >> (7 - i)) & 1;
            let next = states[state][usize::from(bit)];
            let bits = i + 1;

            let action = if next == INVALID {
                Action::Invalid { bits }
            } else if next & VALUE_FLAG != 0 {
                let value = next & VALUE_MASK;

                // Run lengths below 64 (and all mode ids) terminate a code.
                if value < 64 {
                    Action::Terminating { value, bits }
                } else {
                    Action::MakeUp { value, bits }
                }
            } else {
                state = next as usize;
                continue;
            };

            return Transition { next: 0, action };
        }

        Transition {
            next: state as u8,
            action: Action::Incomplete,
        }
    }

    #[inline(always)]
    pub(crate) fn lookup(&self, state: u8, byte: u8) -> Transition {
        self.rows[state as usize][byte as usize]
    }
}

pub(crate) static WHITE_TABLE: LazyLock<ByteTable> =
    LazyLock::new(|| ByteTable::build(&WHITE_STATES));
pub(crate) static BLACK_TABLE: LazyLock<ByteTable> =
    LazyLock::new(|| ByteTable::build(&BLACK_STATES));
pub(crate) static MODE_TABLE: LazyLock<ByteTable> =
    LazyLock::new(|| ByteTable::build(&MODE_STATES));

/// The terminating and make-up tables for the given color (`true` = black).
pub(crate) fn run_tables(
    black: bool,
) -> (&'static [(u16, u8, u16); 64], &'static [(u16, u8, u16); 27]) {
    if black {
        (&BLACK_TERMINATING, &BLACK_MAKEUP)
    } else {
        (&WHITE_TERMINATING, &WHITE_MAKEUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(table: &ByteTable, byte: u8) -> Action {
        table.lookup(0, byte).action
    }

    #[test]
    fn tables_are_indexed_by_run_length() {
        for (i, (run, _, _)) in WHITE_TERMINATING.iter().enumerate() {
            assert_eq!(*run as usize, i);
        }
        for (i, (run, _, _)) in BLACK_MAKEUP.iter().enumerate() {
            assert_eq!(*run as usize, (i + 1) * 64);
        }
        for (i, (run, _, _)) in COMMON_MAKEUP.iter().enumerate() {
            assert_eq!(*run as usize, 1792 + i * 64);
        }
    }

    #[test]
    fn white_codes_in_one_byte() {
        // 0111 -> white run 2, followed by garbage.
        assert_eq!(
            feed(&WHITE_TABLE, 0b0111_1111),
            Action::Terminating { value: 2, bits: 4 }
        );
        // 101010 -> white run 16.
        assert_eq!(
            feed(&WHITE_TABLE, 0b1010_1000),
            Action::Terminating { value: 16, bits: 6 }
        );
        // 11011 -> make-up 64.
        assert_eq!(
            feed(&WHITE_TABLE, 0b1101_1000),
            Action::MakeUp { value: 64, bits: 5 }
        );
    }

    #[test]
    fn long_black_code_spans_two_bytes() {
        // Black run 0: 0000110111.
        let first = BLACK_TABLE.lookup(0, 0b0000_1101);
        assert_eq!(first.action, Action::Incomplete);
        assert_eq!(
            BLACK_TABLE.lookup(first.next, 0b1100_0000).action,
            Action::Terminating { value: 0, bits: 2 }
        );
    }

    #[test]
    fn eol_prefix_is_invalid_within_first_byte() {
        assert_eq!(feed(&WHITE_TABLE, 0), Action::Invalid { bits: 8 });
        assert_eq!(feed(&BLACK_TABLE, 0), Action::Invalid { bits: 8 });
        assert_eq!(feed(&MODE_TABLE, 0), Action::Invalid { bits: 7 });
    }

    #[test]
    fn mode_codes() {
        assert_eq!(
            feed(&MODE_TABLE, 0b1000_0000),
            Action::Terminating { value: 2, bits: 1 }
        );
        assert_eq!(
            feed(&MODE_TABLE, 0b0000_0010),
            Action::Terminating { value: 9, bits: 7 }
        );
        assert_eq!(Mode::from_id(8), Some(Mode::Vertical(-3)));
        assert_eq!(Mode::from_id(10), None);
    }

    #[test]
    fn vertical_codes() {
        assert_eq!(vertical_code(0), (2, 1, 0b1));
        assert_eq!(vertical_code(3), (5, 7, 0b0000011));
        assert_eq!(vertical_code(-1), (6, 3, 0b010));
        assert_eq!(vertical_code(-3), (8, 7, 0b0000010));
    }
}
