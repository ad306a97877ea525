#[cfg(test)]
mod tests;

use v_frame::pixel::{CastFromPrimitive, Pixel};

use super::{motion::MotionVector, plane::PlaneBuf, plane::PlaneRegionMut};

/// Precision of the interpolation intermediates.
pub const IF_INTERNAL_PREC: usize = 14;
const IF_FILTER_PREC: usize = 6;

const LUMA_FILTERS: [[i32; 8]; 4] = [
    [0, 0, 0, 64, 0, 0, 0, 0],
    [-1, 4, -10, 58, 17, -5, 1, 0],
    [-1, 4, -11, 40, 40, -11, 4, -1],
    [0, 1, -5, 17, 58, -10, 4, -1],
];

const CHROMA_FILTERS: [[i32; 4]; 8] = [
    [0, 64, 0, 0],
    [-2, 58, 10, -2],
    [-4, 54, 16, -2],
    [-6, 46, 28, -4],
    [-4, 36, 36, -4],
    [-4, 28, 46, -6],
    [-2, 16, 54, -4],
    [-2, 10, 58, -2],
];

/// Location of a block in a reference plane after applying a motion vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpelPos {
    pub x: isize,
    pub y: isize,
    /// Fractional phase, in quarter samples for luma and eighth samples for
    /// chroma.
    pub frac_x: usize,
    pub frac_y: usize,
    pub luma: bool,
}

impl SubpelPos {
    /// Splits `mv` for a block at `(x, y)` of a plane decimated by
    /// `(xdec, ydec)`.
    #[inline]
    pub fn new(x: usize, y: usize, mv: MotionVector, xdec: usize, ydec: usize, luma: bool) -> Self {
        let (col, row) = (i32::from(mv.col), i32::from(mv.row));
        let (int_x, frac_x) = (col >> (2 + xdec), col & ((4 << xdec) - 1));
        let (int_y, frac_y) = (row >> (2 + ydec), row & ((4 << ydec) - 1));
        if luma {
            SubpelPos {
                x: x as isize + int_x as isize,
                y: y as isize + int_y as isize,
                frac_x: frac_x as usize,
                frac_y: frac_y as usize,
                luma,
            }
        } else {
            SubpelPos {
                x: x as isize + int_x as isize,
                y: y as isize + int_y as isize,
                frac_x: (frac_x << (1 - xdec)) as usize,
                frac_y: (frac_y << (1 - ydec)) as usize,
                luma,
            }
        }
    }
}

fn filter_taps(pos: SubpelPos, frac: usize) -> &'static [i32] {
    if pos.luma {
        &LUMA_FILTERS[frac]
    } else {
        &CHROMA_FILTERS[frac]
    }
}

/// Interpolates a `w` x `h` block into 14-bit intermediates stored with
/// stride `w`. Reads outside the plane are clamped to its edge.
///
/// # Panics
///
/// - If `dst` is shorter than `w * h`.
#[inline]
pub fn predict_hp<T: Pixel>(
    src: &PlaneBuf<T>,
    pos: SubpelPos,
    w: usize,
    h: usize,
    bit_depth: usize,
    dst: &mut [i32],
) {
    assert!(dst.len() >= w * h);
    let head_room = IF_INTERNAL_PREC - bit_depth;
    let shift = IF_FILTER_PREC - head_room;
    let sample = |x: isize, y: isize| i32::cast_from(src.clamped(x, y));

    match (pos.frac_x, pos.frac_y) {
        (0, 0) => {
            for y in 0..h {
                for x in 0..w {
                    dst[y * w + x] = sample(pos.x + x as isize, pos.y + y as isize) << head_room;
                }
            }
        }
        (fx, 0) => {
            let taps = filter_taps(pos, fx);
            let half = taps.len() as isize / 2 - 1;
            for y in 0..h {
                for x in 0..w {
                    let sum: i32 = taps
                        .iter()
                        .enumerate()
                        .map(|(i, c)| c * sample(pos.x + x as isize + i as isize - half, pos.y + y as isize))
                        .sum();
                    dst[y * w + x] = sum >> shift;
                }
            }
        }
        (0, fy) => {
            let taps = filter_taps(pos, fy);
            let half = taps.len() as isize / 2 - 1;
            for y in 0..h {
                for x in 0..w {
                    let sum: i32 = taps
                        .iter()
                        .enumerate()
                        .map(|(i, c)| c * sample(pos.x + x as isize, pos.y + y as isize + i as isize - half))
                        .sum();
                    dst[y * w + x] = sum >> shift;
                }
            }
        }
        (fx, fy) => {
            let taps_x = filter_taps(pos, fx);
            let taps_y = filter_taps(pos, fy);
            let half = taps_x.len() as isize / 2 - 1;
            let rows = h + taps_y.len() - 1;
            let mut intermediate = vec![0i32; w * rows];
            for r in 0..rows {
                let sy = pos.y + r as isize - half;
                for x in 0..w {
                    let sum: i32 = taps_x
                        .iter()
                        .enumerate()
                        .map(|(i, c)| c * sample(pos.x + x as isize + i as isize - half, sy))
                        .sum();
                    intermediate[r * w + x] = sum >> shift;
                }
            }
            for y in 0..h {
                for x in 0..w {
                    let sum: i32 = taps_y
                        .iter()
                        .enumerate()
                        .map(|(i, c)| c * intermediate[(y + i) * w + x])
                        .sum();
                    dst[y * w + x] = sum >> IF_FILTER_PREC;
                }
            }
        }
    }
}

/// Converts intermediates of a single prediction to samples.
#[inline]
pub fn store_uni<T: Pixel>(src: &[i32], dst: &mut PlaneRegionMut<'_, T>, bit_depth: usize) {
    let shift = IF_INTERNAL_PREC - bit_depth;
    let offset = (1 << shift) >> 1;
    let max = (1 << bit_depth) - 1;
    let w = dst.rect().width;
    for (y, row) in dst.rows_iter_mut().enumerate() {
        for (x, p) in row.iter_mut().enumerate() {
            *p = T::cast_from(((src[y * w + x] + offset) >> shift).clamp(0, max));
        }
    }
}

/// Averages the intermediates of two predictions into samples.
#[inline]
pub fn store_bi<T: Pixel>(
    src0: &[i32],
    src1: &[i32],
    dst: &mut PlaneRegionMut<'_, T>,
    bit_depth: usize,
) {
    let shift = IF_INTERNAL_PREC - bit_depth;
    let max = (1 << bit_depth) - 1;
    let w = dst.rect().width;
    for (y, row) in dst.rows_iter_mut().enumerate() {
        for (x, p) in row.iter_mut().enumerate() {
            let i = y * w + x;
            *p = T::cast_from(((src0[i] + src1[i] + (1 << shift)) >> (shift + 1)).clamp(0, max));
        }
    }
}
