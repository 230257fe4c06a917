//! 8x8 integer inverse DCT
//!
//! Coefficients are stored in the IPU's permuted order (see the scan tables in `block`), which
//! is why the butterfly inputs below are not in natural frequency order. Output is bit-exact with
//! the hardware's fixed-point pipeline.

// 2048 * sqrt(2) * cos(k * pi / 16)
const W1: i32 = 2841;
const W2: i32 = 2676;
const W3: i32 = 2408;
const W5: i32 = 1609;
const W6: i32 = 1108;
const W7: i32 = 565;

const CLIP_MIN: i32 = -384;
const CLIP_TABLE_LEN: usize = 1024;

// Legal streams stay within [-384, 384); corrupted streams can exceed the table domain, so
// lookups clamp the index as well
const CLIP_TABLE: [u8; CLIP_TABLE_LEN] = {
    let mut table = [0; CLIP_TABLE_LEN];

    let mut i = 0;
    while i < CLIP_TABLE_LEN {
        let value = i as i32 + CLIP_MIN;
        table[i] = if value < 0 {
            0
        } else if value > 255 {
            255
        } else {
            value as u8
        };
        i += 1;
    }

    table
};

/// A block where only the first coefficient is set and that ended after this many coefficient
/// positions takes the DC shortcut in `idct_add`
pub const DC_ONLY_LAST: u32 = 129;

#[inline]
fn clip(value: i16) -> u8 {
    let index = (i32::from(value) - CLIP_MIN).clamp(0, CLIP_TABLE_LEN as i32 - 1);
    CLIP_TABLE[index as usize]
}

#[inline]
fn butterfly(w0: i32, w1: i32, d0: i32, d1: i32) -> (i32, i32) {
    let tmp = w0 * (d0 + d1);
    (tmp + (w1 - w0) * d1, tmp - (w1 + w0) * d0)
}

fn idct_row(row: &mut [i16]) {
    if row[1..].iter().all(|&coefficient| coefficient == 0) {
        row.fill(i32::from(row[0]).wrapping_shl(3) as i16);
        return;
    }

    let [r0, r1, r2, r3, r4, r5, r6, r7] = [0, 1, 2, 3, 4, 5, 6, 7].map(|i| i32::from(row[i]));

    let d0 = (r0 << 11) + 128;
    let d2 = r2 << 11;
    let (t0, t1) = (d0 + d2, d0 - d2);
    let (t2, t3) = butterfly(W6, W2, r3, r1);
    let (a0, a1, a2, a3) = (t0 + t2, t1 + t3, t1 - t3, t0 - t2);

    let (t0, t1) = butterfly(W7, W1, r7, r4);
    let (t2, t3) = butterfly(W3, W5, r5, r6);
    let (b0, b3) = (t0 + t2, t1 + t3);
    let (t0, t1) = (t0 - t2, t1 - t3);
    // Saturated input can push these products past 32 bits
    let b1 = (t0 + t1).wrapping_mul(181) >> 8;
    let b2 = (t0 - t1).wrapping_mul(181) >> 8;

    let outputs = [
        a0.wrapping_add(b0),
        a1.wrapping_add(b1),
        a2.wrapping_add(b2),
        a3.wrapping_add(b3),
        a3.wrapping_sub(b3),
        a2.wrapping_sub(b2),
        a1.wrapping_sub(b1),
        a0.wrapping_sub(b0),
    ];
    for (out, value) in row.iter_mut().zip(outputs) {
        *out = (value >> 8) as i16;
    }
}

fn idct_column(block: &mut [i16; 64], column: usize) {
    let [c0, c1, c2, c3, c4, c5, c6, c7] =
        [0, 1, 2, 3, 4, 5, 6, 7].map(|i| i32::from(block[column + 8 * i]));

    let d0 = (c0 << 11) + 65536;
    let d2 = c2 << 11;
    let (t0, t1) = (d0 + d2, d0 - d2);
    let (t2, t3) = butterfly(W6, W2, c3, c1);
    let (a0, a1, a2, a3) = (t0 + t2, t1 + t3, t1 - t3, t0 - t2);

    let (t0, t1) = butterfly(W7, W1, c7, c4);
    let (t2, t3) = butterfly(W3, W5, c5, c6);
    let (b0, b3) = (t0 + t2, t1 + t3);
    let (t0, t1) = ((t0 - t2) >> 8, (t1 - t3) >> 8);
    let b1 = (t0 + t1) * 181;
    let b2 = (t0 - t1) * 181;

    let outputs = [a0 + b0, a1 + b1, a2 + b2, a3 + b3, a3 - b3, a2 - b2, a1 - b1, a0 - b0];
    for (i, value) in outputs.into_iter().enumerate() {
        block[column + 8 * i] = (value >> 17) as i16;
    }
}

pub fn idct(block: &mut [i16; 64]) {
    for row in block.chunks_exact_mut(8) {
        idct_row(row);
    }

    for column in 0..8 {
        idct_column(block, column);
    }
}

/// Transform the block and write it into an 8-bit plane with saturation, leaving the block zeroed
pub fn idct_copy(block: &mut [i16; 64], dest: &mut [u8], offset: usize, stride: usize) {
    idct(block);

    for (i, row) in block.chunks_exact(8).enumerate() {
        let start = offset + i * stride;
        for (out, &value) in dest[start..start + 8].iter_mut().zip(row) {
            *out = clip(value);
        }
    }

    block.fill(0);
}

/// Transform the block and add it onto a 16-bit plane, leaving the block zeroed
pub fn idct_add(last: u32, block: &mut [i16; 64], dest: &mut [i16], offset: usize, stride: usize) {
    if last != DC_ONLY_LAST || block[0] & 7 == 4 {
        idct(block);

        for (i, row) in block.chunks_exact(8).enumerate() {
            let start = offset + i * stride;
            for (out, &value) in dest[start..start + 8].iter_mut().zip(row) {
                *out = out.wrapping_add(value);
            }
        }

        block.fill(0);
    } else {
        let dc = ((i32::from(block[0]) + 4) >> 3) as i16;
        block[0] = 0;
        block[63] = 0;

        for i in 0..8 {
            let start = offset + i * stride;
            for out in &mut dest[start..start + 8] {
                *out = out.wrapping_add(dc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn dc_block(dc: i16) -> [i16; 64] {
        let mut block = [0; 64];
        block[0] = dc;
        block
    }

    #[test]
    fn clip_table_bounds() {
        assert_eq!(clip(-384), 0);
        assert_eq!(clip(-1), 0);
        assert_eq!(clip(0), 0);
        assert_eq!(clip(200), 200);
        assert_eq!(clip(255), 255);
        assert_eq!(clip(639), 255);
        assert_eq!(clip(i16::MIN), 0);
        assert_eq!(clip(i16::MAX), 255);
    }

    #[test]
    fn dc_only_copy_is_flat() {
        for dc in [-100_i16, 0, 8, 1024, 1100, 2040, 4000] {
            let mut block = dc_block(dc);
            let mut dest = [0xAA; 16 * 16];
            idct_copy(&mut block, &mut dest, 0, 16);

            let expected = clip((dc + 4) >> 3);
            for row in 0..8 {
                assert!(dest[row * 16..row * 16 + 8].iter().all(|&v| v == expected), "dc={dc}");
                assert!(dest[row * 16 + 8..row * 16 + 16].iter().all(|&v| v == 0xAA));
            }
            assert_eq!(block, [0; 64]);
        }
    }

    #[test]
    fn horizontal_ramp() {
        let mut block = dc_block(1024);
        block[4] = 100;

        let mut dest = [0; 64];
        idct_copy(&mut block, &mut dest, 0, 8);

        let expected_row = [145, 143, 138, 131, 125, 118, 113, 111];
        for row in dest.chunks_exact(8) {
            assert_eq!(row, expected_row);
        }
    }

    #[test]
    fn two_dimensional_pattern() {
        let mut block = dc_block(800);
        block[1] = -60;
        block[8] = 40;
        idct(&mut block);

        assert_eq!(block[..8], [97, 102, 111, 116, 116, 111, 102, 97]);
        assert_eq!(block[24..32], [84, 89, 98, 103, 103, 98, 89, 84]);
        assert_eq!(block[56..], [97, 102, 111, 116, 116, 111, 102, 97]);
    }

    #[test]
    fn dc_shortcut_matches_full_transform() {
        for dc in [-77_i16, 16, 100, 1023] {
            let mut shortcut = [7_i16; 64];
            let mut block = dc_block(dc);
            idct_add(DC_ONLY_LAST, &mut block, &mut shortcut, 0, 8);
            assert_eq!(block, [0; 64]);

            let mut full = [7_i16; 64];
            let mut block = dc_block(dc);
            idct_add(5, &mut block, &mut full, 0, 8);
            assert_eq!(block, [0; 64]);

            assert_eq!(shortcut, full, "dc={dc}");
            assert_eq!(full[0], 7 + ((dc + 4) >> 3));
        }
    }

    #[test]
    fn add_respects_stride() {
        let mut dest = [1_i16; 16 * 16];
        let mut block = dc_block(80);
        idct_add(0, &mut block, &mut dest, 8, 32);

        for row in 0..16 {
            for col in 0..16 {
                let inside = col >= 8 && row % 2 == 0;
                let expected = if inside { 11 } else { 1 };
                assert_eq!(dest[row * 16 + col], expected, "({col}, {row})");
            }
        }
    }
}
