
/// In-place 2D Hadamard transform of a row-major 4x4 block.
///
/// Used by SATD, which sums half the transformed magnitudes of each 4x4
/// difference block.
#[inline]
pub fn hadamard4x4(data: &mut [i32; 16]) {
    hadamard2d::<4>(data);
}

/// In-place 2D Hadamard transform of a row-major 8x8 block.
///
/// Used by SA8D, which covers 8-aligned blocks with one transform per 8x8.
/// Psy energy is measured with it.
#[inline]
pub fn hadamard8x8(data: &mut [i32; 64]) {
    hadamard2d::<8>(data);
}

/// Columns first, then rows. Coefficients come out in natural order.
fn hadamard2d<const N: usize>(data: &mut [i32]) {
    for col in 0..N {
        walsh_1d::<N>(data, col, N);
    }
    for row in 0..N {
        walsh_1d::<N>(data, row * N, 1);
    }
}

/// Radix-2 butterflies over `N` samples starting at `start`, `stride` apart.
fn walsh_1d<const N: usize>(data: &mut [i32], start: usize, stride: usize) {
    let mut span = 1;
    while span < N {
        for base in (0..N).step_by(2 * span) {
            for k in base..base + span {
                let i = start + k * stride;
                let j = i + span * stride;
                let (a, b) = (data[i], data[j]);
                data[i] = a + b;
                data[j] = a - b;
            }
        }
        span <<= 1;
    }
}
