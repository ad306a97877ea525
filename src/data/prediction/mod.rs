//! HEVC intra prediction on a prepared reference edge.
//!
//! The edge is a single array running from the bottom-left sample up the
//! left column, through the top-left corner, then along the above row:
//! `[left (2N, bottom to top) | corner | above (2N)]`.

#[cfg(test)]
mod tests;

use v_frame::pixel::{ChromaSampling, Pixel};

use super::plane::PlaneRegionMut;

pub const PLANAR_IDX: u8 = 0;
pub const DC_IDX: u8 = 1;
pub const HOR_IDX: u8 = 10;
pub const VER_IDX: u8 = 26;
pub const DIA_IDX: u8 = 34;
/// Chroma mode that inherits the luma direction.
pub const DM_CHROMA_IDX: u8 = 36;
pub const NUM_INTRA_MODES: u8 = 35;
pub const NUM_CHROMA_CANDIDATES: usize = 5;

const INTRA_PRED_ANGLE: [i32; 33] = [
    32, 26, 21, 17, 13, 9, 5, 2, 0, -2, -5, -9, -13, -17, -21, -26, -32, -26, -21, -17, -13, -9,
    -5, -2, 0, 2, 5, 9, 13, 17, 21, 26, 32,
];

/// Inverse angles for the negative entries of [`INTRA_PRED_ANGLE`], indexed
/// by `-angle`.
const fn inv_angle(angle: i32) -> i32 {
    match angle {
        -2 => -4096,
        -5 => -1638,
        -9 => -910,
        -13 => -630,
        -17 => -482,
        -21 => -390,
        -26 => -315,
        _ => -256,
    }
}

/// Angular chroma directions used for 4:2:2 content, indexed by the
/// derived mode.
const MODE_422_MAP: [u8; 36] = [
    0, 1, 2, 2, 2, 2, 3, 5, 7, 8, 10, 11, 13, 15, 16, 18, 19, 20, 21, 22, 23, 23, 24, 24, 25, 25,
    26, 27, 27, 28, 28, 29, 29, 30, 31, DM_CHROMA_IDX,
];

/// Length of the reference edge for a block of `1 << log2` samples.
#[inline]
pub const fn edge_len(log2: usize) -> usize {
    (4 << log2) + 1
}

/// Replaces unavailable reference samples following the HEVC substitution
/// process. With no sample available the edge takes the mid-grey value.
///
/// # Panics
///
/// - If `edge` and `available` differ in length.
#[inline]
pub fn substitute_reference(edge: &mut [i32], available: &[bool], bit_depth: usize) {
    assert_eq!(edge.len(), available.len());
    let Some(first) = available.iter().position(|&a| a) else {
        edge.fill(1 << (bit_depth - 1));
        return;
    };
    if first > 0 {
        edge[0] = edge[first];
    }
    for i in 1..edge.len() {
        if !available[i] {
            edge[i] = edge[i - 1];
        }
    }
}

/// Whether the [1 2 1] reference smoothing applies to a block.
#[inline]
pub fn use_filtered_reference(mode: u8, log2: usize) -> bool {
    if mode == DC_IDX || log2 < 3 || log2 > 5 {
        return false;
    }
    let dist = (i32::from(mode) - i32::from(VER_IDX))
        .abs()
        .min((i32::from(mode) - i32::from(HOR_IDX)).abs());
    let threshold = match log2 {
        3 => 7,
        4 => 1,
        _ => 0,
    };
    dist > threshold
}

/// [1 2 1] smoothing along the edge. The two end samples are kept.
#[inline]
pub fn filter_reference(edge: &[i32], out: &mut [i32]) {
    let n = edge.len();
    out[0] = edge[0];
    out[n - 1] = edge[n - 1];
    for i in 1..n - 1 {
        out[i] = (edge[i - 1] + 2 * edge[i] + edge[i + 1] + 2) >> 2;
    }
}

#[inline]
fn clip_pixel(v: i32, bit_depth: usize) -> i32 {
    v.clamp(0, (1 << bit_depth) - 1)
}

/// Predicts a square block from its reference edge.
///
/// `boundary_filters` enables the DC and pure horizontal/vertical edge
/// filters, which HEVC only applies to luma blocks smaller than 32x32.
///
/// # Panics
///
/// - If the edge is too short for `log2`, or `mode` is not a luma direction.
#[inline]
pub fn predict_intra<T: Pixel>(
    edge: &[i32],
    dst: &mut PlaneRegionMut<'_, T>,
    log2: usize,
    mode: u8,
    boundary_filters: bool,
    bit_depth: usize,
) {
    assert!(edge.len() >= edge_len(log2));
    assert!(mode < NUM_INTRA_MODES);
    let n = 1usize << log2;
    let corner = 2 * n;
    let left = |y: usize| edge[corner - 1 - y];
    let above = |x: usize| edge[corner + 1 + x];

    match mode {
        PLANAR_IDX => {
            let top_right = above(n);
            let bottom_left = left(n);
            for y in 0..n {
                let row = &mut dst[y];
                for (x, p) in row.iter_mut().enumerate().take(n) {
                    let v = ((n - 1 - x) as i32 * left(y)
                        + (x + 1) as i32 * top_right
                        + (n - 1 - y) as i32 * above(x)
                        + (y + 1) as i32 * bottom_left
                        + n as i32)
                        >> (log2 + 1);
                    *p = T::cast_from(v);
                }
            }
        }
        DC_IDX => {
            let sum: i32 = (0..n).map(|i| above(i) + left(i)).sum();
            let dc = (sum + n as i32) >> (log2 + 1);
            for y in 0..n {
                dst[y][..n].fill(T::cast_from(dc));
            }
            if boundary_filters && n < 32 {
                dst[0][0] = T::cast_from((left(0) + 2 * dc + above(0) + 2) >> 2);
                for x in 1..n {
                    dst[0][x] = T::cast_from((above(x) + 3 * dc + 2) >> 2);
                }
                for y in 1..n {
                    dst[y][0] = T::cast_from((left(y) + 3 * dc + 2) >> 2);
                }
            }
        }
        _ => predict_angular(edge, dst, log2, mode, boundary_filters, bit_depth),
    }
}

fn predict_angular<T: Pixel>(
    edge: &[i32],
    dst: &mut PlaneRegionMut<'_, T>,
    log2: usize,
    mode: u8,
    boundary_filters: bool,
    bit_depth: usize,
) {
    let n = 1usize << log2;
    let corner = 2 * n;
    let is_vertical = mode >= 18;
    let angle = INTRA_PRED_ANGLE[mode as usize - 2];

    // Main reference at offset `n`, so indices in [-n, 2n] are valid.
    let mut refs = [0i32; 3 * 64 + 1];
    let main = |i: usize| {
        if is_vertical {
            edge[corner + i]
        } else {
            edge[corner - i]
        }
    };
    let side = |i: usize| {
        if is_vertical {
            edge[corner - i]
        } else {
            edge[corner + i]
        }
    };
    for i in 0..=2 * n {
        refs[n + i] = main(i);
    }
    if angle < 0 {
        let last = (n as i32 * angle) >> 5;
        if last < -1 {
            let inv = inv_angle(angle);
            for k in (last..=-1).rev() {
                let idx = ((k * inv + 128) >> 8) as usize;
                refs[(n as i32 + k) as usize] = side(idx);
            }
        }
    }

    for y in 0..n {
        let pos = (y as i32 + 1) * angle;
        let idx = pos >> 5;
        let fact = pos & 31;
        for x in 0..n {
            let base = (n as i32 + x as i32 + idx + 1) as usize;
            let v = if fact != 0 {
                ((32 - fact) * refs[base] + fact * refs[base + 1] + 16) >> 5
            } else {
                refs[base]
            };
            let (row, col) = if is_vertical { (y, x) } else { (x, y) };
            dst[row][col] = T::cast_from(v);
        }
    }

    if boundary_filters && angle == 0 && n < 32 {
        for i in 0..n {
            let v = clip_pixel(main(1) + ((side(i + 1) - side(0)) >> 1), bit_depth);
            let (row, col) = if is_vertical { (i, 0) } else { (0, i) };
            dst[row][col] = T::cast_from(v);
        }
    }
}

/// Candidate chroma directions. A candidate equal to the luma direction is
/// replaced with the diagonal mode. The last entry is DM.
#[inline]
pub fn chroma_candidates(luma_mode: u8) -> [u8; NUM_CHROMA_CANDIDATES] {
    let mut modes = [PLANAR_IDX, VER_IDX, HOR_IDX, DC_IDX, DM_CHROMA_IDX];
    for m in modes.iter_mut().take(NUM_CHROMA_CANDIDATES - 1) {
        if *m == luma_mode {
            *m = DIA_IDX;
        }
    }
    modes
}

/// Direction actually used to predict chroma for a signalled chroma mode.
#[inline]
pub fn derive_chroma_mode(chroma_mode: u8, luma_mode: u8, cs: ChromaSampling) -> u8 {
    let mode = if chroma_mode == DM_CHROMA_IDX {
        luma_mode
    } else {
        chroma_mode
    };
    if cs == ChromaSampling::Cs422 {
        MODE_422_MAP[mode as usize]
    } else {
        mode
    }
}

/// Most probable modes from the left and above luma directions. Unavailable
/// or non-intra neighbours are passed as DC.
#[inline]
pub fn most_probable_modes(left: u8, above: u8) -> [u8; 3] {
    if left == above {
        if left < 2 {
            [PLANAR_IDX, DC_IDX, VER_IDX]
        } else {
            [left, 2 + ((left + 29) % 32), 2 + ((left - 2 + 1) % 32)]
        }
    } else {
        let third = if left != PLANAR_IDX && above != PLANAR_IDX {
            PLANAR_IDX
        } else if left != DC_IDX && above != DC_IDX {
            DC_IDX
        } else {
            VER_IDX
        };
        [left, above, third]
    }
}
