#![no_main]

use libfuzzer_sys::fuzz_target;
use xv_ccitt::{EncodingMode, FaxDecoder, FaxFlags, StripInfo};

// Header layout (8 bytes):
// [0..2]  columns (u16 LE)
// [2..4]  rows (u16 LE), 0 for unknown
// [4]     encoding mode (0=Group4, 1=Group3_1D, 2+=Group3_2D)
// [5]     k parameter for Group3_2D
// [6]     flags (FaxFlags bits)
// [7]     1 to decode with the recovering row loop
// [8..]   CCITT encoded data

const HEADER_SIZE: usize = 8;

fuzz_target!(|data: &[u8]| {
    if data.len() < HEADER_SIZE {
        return;
    }

    let columns = u32::from(u16::from_le_bytes([data[0], data[1]]).clamp(1, 4096));
    let rows = u32::from(u16::from_le_bytes([data[2], data[3]]) % 2048);
    let encoding = match data[4] % 3 {
        0 => EncodingMode::Group4,
        1 => EncodingMode::Group3_1D,
        _ => EncodingMode::Group3_2D {
            k: u32::from(data[5].max(1)),
        },
    };
    let flags = FaxFlags::from_bits_truncate(u32::from(data[6]));

    let info = StripInfo {
        columns,
        rows,
        encoding,
        flags,
    };
    let body = &data[HEADER_SIZE..];

    if data[7] == 1 {
        let _ = xv_ccitt::decode(body, &info);
        return;
    }

    let Ok(mut decoder) = FaxDecoder::new(body, info) else {
        return;
    };
    let mut row = vec![0; info.row_bytes()];
    for _ in 0..2048 {
        match decoder.decode_row(&mut row) {
            Ok(xv_ccitt::RowStatus::Decoded) => {}
            _ => break,
        }
    }
});
