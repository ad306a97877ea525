//! Integer DCT/DST with HEVC scaling, and scalar quantization.

mod quant;
#[cfg(test)]
mod tests;

pub use quant::{QuantParams, chroma_qp, dequant, quant};

/// HEVC transform basis values `C(m)`, `m` in 0..=32.
const COS_TABLE: [i32; 33] = [
    64, 90, 90, 90, 89, 88, 87, 85, 83, 82, 80, 78, 75, 73, 70, 67, 64, 61, 57, 54, 50, 46, 43, 38,
    36, 31, 25, 22, 18, 13, 9, 4, 0,
];

const DST_MATRIX: [[i32; 4]; 4] = [
    [29, 55, 74, 84],
    [74, 74, 0, -74],
    [84, -29, -74, 55],
    [55, -84, 74, -29],
];

/// Basis value of the 32-point DCT at angle index `m` (period 128).
const fn dct_value(m: usize) -> i32 {
    let m = m % 128;
    let m = if m > 64 { 128 - m } else { m };
    if m > 32 {
        -COS_TABLE[64 - m]
    } else {
        COS_TABLE[m]
    }
}

const fn build_dct32() -> [[i32; 32]; 32] {
    let mut t = [[0; 32]; 32];
    let mut k = 0;
    while k < 32 {
        let mut n = 0;
        while n < 32 {
            t[k][n] = if k == 0 { 64 } else { dct_value(k * (2 * n + 1)) };
            n += 1;
        }
        k += 1;
    }
    t
}

static DCT32: [[i32; 32]; 32] = build_dct32();

/// Coefficient `k`, sample `n` of the N-point basis.
#[inline]
fn basis(k: usize, n: usize, log2: usize, dst: bool) -> i32 {
    if dst {
        DST_MATRIX[k][n]
    } else {
        DCT32[k << (5 - log2)][n]
    }
}

/// Forward 2D transform of a residual block. Both buffers are row-major with
/// a stride of the block size.
///
/// `dst` selects the 4x4 DST used for intra luma.
///
/// # Panics
///
/// - If `log2` is outside 2..=5 or the buffers are too short.
#[inline]
pub fn forward_transform(
    resi: &[i16],
    coeff: &mut [i32],
    log2: usize,
    dst: bool,
    bit_depth: usize,
) {
    assert!((2..=5).contains(&log2));
    let n = 1usize << log2;
    assert!(resi.len() >= n * n && coeff.len() >= n * n);
    let dst = dst && log2 == 2;
    let shift1 = log2 + bit_depth - 9;
    let shift2 = log2 + 6;
    let round1 = 1i64 << (shift1 - 1);
    let round2 = 1i64 << (shift2 - 1);

    // Rows first: tmp[y][k] holds horizontal frequency k of row y.
    let mut tmp = [0i64; 32 * 32];
    for y in 0..n {
        for k in 0..n {
            let sum: i64 = (0..n)
                .map(|x| i64::from(basis(k, x, log2, dst)) * i64::from(resi[y * n + x]))
                .sum();
            tmp[y * n + k] = (sum + round1) >> shift1;
        }
    }
    for kv in 0..n {
        for kh in 0..n {
            let sum: i64 = (0..n)
                .map(|y| i64::from(basis(kv, y, log2, dst)) * tmp[y * n + kh])
                .sum();
            coeff[kv * n + kh] = ((sum + round2) >> shift2) as i32;
        }
    }
}

/// Inverse 2D transform back to residual samples.
///
/// # Panics
///
/// - If `log2` is outside 2..=5 or the buffers are too short.
#[inline]
pub fn inverse_transform(
    coeff: &[i32],
    resi: &mut [i16],
    log2: usize,
    dst: bool,
    bit_depth: usize,
) {
    assert!((2..=5).contains(&log2));
    let n = 1usize << log2;
    assert!(resi.len() >= n * n && coeff.len() >= n * n);
    let dst = dst && log2 == 2;
    let shift1 = 7;
    let shift2 = 20 - bit_depth;
    let round2 = 1i64 << (shift2 - 1);

    // Columns first: tmp[y][kh] holds horizontal frequency kh of row y.
    let mut tmp = [0i64; 32 * 32];
    for y in 0..n {
        for kh in 0..n {
            let sum: i64 = (0..n)
                .map(|kv| i64::from(basis(kv, y, log2, dst)) * i64::from(coeff[kv * n + kh]))
                .sum();
            tmp[y * n + kh] = ((sum + 64) >> shift1).clamp(i64::from(i16::MIN), i64::from(i16::MAX));
        }
    }
    for y in 0..n {
        for x in 0..n {
            let sum: i64 = (0..n)
                .map(|kh| i64::from(basis(kh, x, log2, dst)) * tmp[y * n + kh])
                .sum();
            resi[y * n + x] =
                ((sum + round2) >> shift2).clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;
        }
    }
}
