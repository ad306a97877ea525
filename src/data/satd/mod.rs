
use v_frame::pixel::{CastFromPrimitive, Pixel};

use super::{
    hadamard::{hadamard4x4, hadamard8x8},
    plane::PlaneRegion,
    sad::get_sad_zero,
};

/// Sum of absolute Hadamard-transformed differences, accumulated over 4x4
/// blocks.
///
/// # Panics
///
/// - If `w` or `h` is not a multiple of 4.
pub(crate) fn get_satd<T: Pixel>(
    src: &PlaneRegion<'_, T>,
    dst: &PlaneRegion<'_, T>,
    w: usize,
    h: usize,
) -> u32 {
    assert!(w % 4 == 0 && h % 4 == 0);
    let mut sum = 0u32;
    let mut buf = [0i32; 16];
    for y in (0..h).step_by(4) {
        for x in (0..w).step_by(4) {
            for (row, chunk) in buf.chunks_exact_mut(4).enumerate() {
                let org = &src[y + row][x..x + 4];
                let rec = &dst[y + row][x..x + 4];
                for ((d, &a), &b) in chunk.iter_mut().zip(org).zip(rec) {
                    *d = i32::cast_from(a) - i32::cast_from(b);
                }
            }
            hadamard4x4(&mut buf);
            sum += buf.iter().map(|a| a.unsigned_abs()).sum::<u32>() >> 1;
        }
    }
    sum
}

/// Hadamard difference on 8x8 blocks, falling back to [`get_satd`] when the
/// block is not 8-aligned.
pub(crate) fn get_sa8d<T: Pixel>(
    src: &PlaneRegion<'_, T>,
    dst: &PlaneRegion<'_, T>,
    w: usize,
    h: usize,
) -> u32 {
    if w % 8 != 0 || h % 8 != 0 {
        return get_satd(src, dst, w, h);
    }
    let mut sum = 0u32;
    let mut buf = [0i32; 64];
    for y in (0..h).step_by(8) {
        for x in (0..w).step_by(8) {
            for (row, chunk) in buf.chunks_exact_mut(8).enumerate() {
                let org = &src[y + row][x..x + 8];
                let rec = &dst[y + row][x..x + 8];
                for ((d, &a), &b) in chunk.iter_mut().zip(org).zip(rec) {
                    *d = i32::cast_from(a) - i32::cast_from(b);
                }
            }
            hadamard8x8(&mut buf);
            sum += (buf.iter().map(|a| a.unsigned_abs()).sum::<u32>() + 2) >> 2;
        }
    }
    sum
}

/// AC energy of a block: its Hadamard magnitude minus the DC estimate.
fn ac_energy<T: Pixel>(block: &PlaneRegion<'_, T>, zero: &PlaneRegion<'_, T>) -> i64 {
    let (w, h) = (block.width(), block.height());
    let sa8d = i64::from(get_sa8d(block, zero, w, h));
    let sad = i64::from(get_sad_zero(block));
    sa8d - (sad >> 2)
}

/// Psycho-visual energy difference between source and reconstruction.
///
/// `zero` must be an all-zero region of at least the same size.
pub(crate) fn psy_cost<T: Pixel>(
    source: &PlaneRegion<'_, T>,
    recon: &PlaneRegion<'_, T>,
    zero: &PlaneRegion<'_, T>,
) -> u32 {
    let zero = zero.subregion(0, 0, source.width(), source.height());
    (ac_energy(source, &zero) - ac_energy(recon, &zero)).unsigned_abs() as u32
}
