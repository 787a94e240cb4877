#![no_main]

use libfuzzer_sys::fuzz_target;

// Header layout (5 bytes):
// [0..2]  width (u16 LE)
// [2..4]  height (u16 LE)
// [4]     depth
// [5..]   probability table and coded pixels

const HEADER_SIZE: usize = 5;

fuzz_target!(|data: &[u8]| {
    if data.len() < HEADER_SIZE {
        return;
    }

    let width = u32::from(u16::from_le_bytes([data[0], data[1]]) % 1024);
    let height = u32::from(u16::from_le_bytes([data[2], data[3]]) % 1024);
    let depth = u32::from(data[4]);

    let _ = xv_pic2::decode_block(&data[HEADER_SIZE..], width, height, depth);
});
