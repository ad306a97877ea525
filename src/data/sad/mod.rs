#[cfg(test)]
mod tests;

use v_frame::pixel::{CastFromPrimitive, Pixel};

use super::plane::PlaneRegion;

/// Sum of absolute differences over the top-left `w` x `h` samples.
pub(crate) fn get_sad<T: Pixel>(
    plane_org: &PlaneRegion<'_, T>,
    plane_ref: &PlaneRegion<'_, T>,
    w: usize,
    h: usize,
) -> u32 {
    debug_assert!(w <= 64 && h <= 64);
    let plane_org = plane_org.subregion(0, 0, w, h);
    let plane_ref = plane_ref.subregion(0, 0, w, h);

    plane_org
        .rows_iter()
        .zip(plane_ref.rows_iter())
        .map(|(src, dst)| {
            src.iter()
                .zip(dst)
                .map(|(&p1, &p2)| i32::cast_from(p1).abs_diff(i32::cast_from(p2)))
                .sum::<u32>()
        })
        .sum()
}

/// Sum of squared differences over the top-left `w` x `h` samples.
pub(crate) fn get_sse<T: Pixel>(
    plane_org: &PlaneRegion<'_, T>,
    plane_ref: &PlaneRegion<'_, T>,
    w: usize,
    h: usize,
) -> u64 {
    let plane_org = plane_org.subregion(0, 0, w, h);
    let plane_ref = plane_ref.subregion(0, 0, w, h);

    plane_org
        .rows_iter()
        .zip(plane_ref.rows_iter())
        .map(|(src, dst)| {
            src.iter()
                .zip(dst)
                .map(|(&p1, &p2)| {
                    let d = u64::from(i32::cast_from(p1).abs_diff(i32::cast_from(p2)));
                    d * d
                })
                .sum::<u64>()
        })
        .sum()
}

/// Squared error between two residual blocks.
pub(crate) fn get_resi_sse(a: &PlaneRegion<'_, i16>, b: &PlaneRegion<'_, i16>) -> u64 {
    a.rows_iter()
        .zip(b.rows_iter())
        .map(|(a, b)| {
            a.iter()
                .zip(b)
                .map(|(&p1, &p2)| {
                    let d = u64::from(i32::from(p1).abs_diff(i32::from(p2)));
                    d * d
                })
                .sum::<u64>()
        })
        .sum()
}

/// Energy of a residual block, i.e. its distortion when coded as all zero.
pub(crate) fn get_resi_energy(resi: &PlaneRegion<'_, i16>) -> u64 {
    resi.rows_iter()
        .map(|row| {
            row.iter()
                .map(|&r| {
                    let r = u64::from(r.unsigned_abs());
                    r * r
                })
                .sum::<u64>()
        })
        .sum()
}

/// Sum of absolute sample values, the SAD against a zero block.
pub(crate) fn get_sad_zero<T: Pixel>(plane: &PlaneRegion<'_, T>) -> u32 {
    plane
        .rows_iter()
        .map(|row| row.iter().map(|&p| u32::cast_from(p)).sum::<u32>())
        .sum()
}
