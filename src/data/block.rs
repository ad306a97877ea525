use std::fmt::{self, Display};

use thiserror::Error;
use v_frame::pixel::ChromaSampling;

/// Sizes are tracked in units of 4x4 luma samples.
pub const LOG2_UNIT_SIZE: usize = 2;
/// Largest coding unit is 64x64.
pub const MAX_LOG2_CU_SIZE: usize = 6;
/// Side of the largest coding unit.
pub const MAX_CU_SIZE: usize = 1 << MAX_LOG2_CU_SIZE;
/// Smallest coding unit is 8x8.
pub const MIN_LOG2_CU_SIZE: usize = 3;
/// Number of 4x4 units in the largest coding unit.
pub const NUM_CU_PARTITIONS: usize = 1 << ((MAX_LOG2_CU_SIZE - LOG2_UNIT_SIZE) * 2);

/// Smallest transform is 4x4.
pub const MIN_TR_LOG2_SIZE: usize = 2;
/// Largest transform is 32x32.
pub const MAX_TR_LOG2_SIZE: usize = 5;
/// Side of the largest transform.
pub const MAX_TR_SIZE: usize = 1 << MAX_TR_LOG2_SIZE;
/// One coefficient layer per transform size, 4x4 through 32x32.
pub const NUM_LAYERS: usize = MAX_TR_LOG2_SIZE - MIN_TR_LOG2_SIZE + 1;

/// Prediction partition shapes of a coding unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[expect(non_camel_case_types)]
pub enum PartSize {
    /// One partition covering the unit.
    #[default]
    SIZE_2Nx2N,
    /// Two halves, stacked.
    SIZE_2NxN,
    /// Two halves, side by side.
    SIZE_Nx2N,
    /// Four quarters.
    SIZE_NxN,
    /// Top quarter and bottom three quarters.
    SIZE_2NxnU,
    /// Top three quarters and bottom quarter.
    SIZE_2NxnD,
    /// Left quarter and right three quarters.
    SIZE_nLx2N,
    /// Left three quarters and right quarter.
    SIZE_nRx2N,
}

/// Location of one prediction partition inside its coding unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PartGeometry {
    /// Offset from the coding unit origin, in luma samples.
    pub x: usize,
    /// Vertical offset from the coding unit origin.
    pub y: usize,
    /// Partition width in luma samples.
    pub width: usize,
    /// Partition height in luma samples.
    pub height: usize,
    /// Partition height in luma samples.
    /// Z-order index of the first 4x4 unit.
    pub abs_part_idx: usize,
}

impl PartSize {
    /// Number of prediction partitions for this shape.
    #[inline]
    pub const fn num_parts(self) -> usize {
        match self {
            PartSize::SIZE_2Nx2N => 1,
            PartSize::SIZE_NxN => 4,
            _ => 2,
        }
    }

    /// Horizontal split shapes (two partitions stacked vertically).
    #[inline]
    pub const fn is_horizontal(self) -> bool {
        matches!(
            self,
            PartSize::SIZE_2NxN | PartSize::SIZE_2NxnU | PartSize::SIZE_2NxnD
        )
    }

    /// Vertical split shapes (two partitions side by side).
    #[inline]
    pub const fn is_vertical(self) -> bool {
        matches!(
            self,
            PartSize::SIZE_Nx2N | PartSize::SIZE_nLx2N | PartSize::SIZE_nRx2N
        )
    }

    /// Asymmetric motion partitions.
    #[inline]
    pub const fn is_amp(self) -> bool {
        matches!(
            self,
            PartSize::SIZE_2NxnU | PartSize::SIZE_2NxnD | PartSize::SIZE_nLx2N | PartSize::SIZE_nRx2N
        )
    }

    /// Geometry of partition `part_idx` inside a coding unit of `cu_size` luma
    /// samples.
    ///
    /// # Panics
    ///
    /// - If `part_idx` is not a partition of this shape.
    #[inline]
    pub fn geometry(self, part_idx: usize, cu_size: usize) -> PartGeometry {
        assert!(part_idx < self.num_parts());
        let half = cu_size / 2;
        let quarter = cu_size / 4;
        let (x, y, width, height) = match (self, part_idx) {
            (PartSize::SIZE_2Nx2N, _) => (0, 0, cu_size, cu_size),
            (PartSize::SIZE_2NxN, 0) => (0, 0, cu_size, half),
            (PartSize::SIZE_2NxN, _) => (0, half, cu_size, half),
            (PartSize::SIZE_Nx2N, 0) => (0, 0, half, cu_size),
            (PartSize::SIZE_Nx2N, _) => (half, 0, half, cu_size),
            (PartSize::SIZE_NxN, i) => ((i & 1) * half, (i >> 1) * half, half, half),
            (PartSize::SIZE_2NxnU, 0) => (0, 0, cu_size, quarter),
            (PartSize::SIZE_2NxnU, _) => (0, quarter, cu_size, cu_size - quarter),
            (PartSize::SIZE_2NxnD, 0) => (0, 0, cu_size, cu_size - quarter),
            (PartSize::SIZE_2NxnD, _) => (0, cu_size - quarter, cu_size, quarter),
            (PartSize::SIZE_nLx2N, 0) => (0, 0, quarter, cu_size),
            (PartSize::SIZE_nLx2N, _) => (quarter, 0, cu_size - quarter, cu_size),
            (PartSize::SIZE_nRx2N, 0) => (0, 0, cu_size - quarter, cu_size),
            (PartSize::SIZE_nRx2N, _) => (cu_size - quarter, 0, quarter, cu_size),
        };
        PartGeometry {
            x,
            y,
            width,
            height,
            abs_part_idx: raster_to_zscan(x >> LOG2_UNIT_SIZE, y >> LOG2_UNIT_SIZE),
        }
    }

    /// Index of the partition covering the 4x4 unit at `(x4, y4)`.
    #[inline]
    pub fn part_at(self, x4: usize, y4: usize, cu_size: usize) -> usize {
        let (x, y) = (x4 << LOG2_UNIT_SIZE, y4 << LOG2_UNIT_SIZE);
        (0..self.num_parts())
            .find(|&i| {
                let g = self.geometry(i, cu_size);
                x >= g.x && x < g.x + g.width && y >= g.y && y < g.y + g.height
            })
            .unwrap_or(0)
    }
}

/// Color planes, in coding order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorPlane {
    /// Luma.
    Y,
    /// Blue-difference chroma.
    Cb,
    /// Red-difference chroma.
    Cr,
}

impl ColorPlane {
    /// Planes in coding order.
    pub const ALL: [ColorPlane; 3] = [ColorPlane::Y, ColorPlane::Cb, ColorPlane::Cr];
    /// The two chroma planes.
    pub const CHROMA: [ColorPlane; 2] = [ColorPlane::Cb, ColorPlane::Cr];

    /// Position of the plane in per-plane arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` for the luma plane.
    #[inline]
    pub const fn is_luma(self) -> bool {
        matches!(self, ColorPlane::Y)
    }
}

/// Horizontal and vertical chroma decimation, `None` for monochrome.
#[inline]
pub const fn chroma_shift(cs: ChromaSampling) -> Option<(usize, usize)> {
    match cs {
        ChromaSampling::Cs420 => Some((1, 1)),
        ChromaSampling::Cs422 => Some((1, 0)),
        ChromaSampling::Cs444 => Some((0, 0)),
        ChromaSampling::Cs400 => None,
    }
}

/// Decimation applied to `plane`. Luma is never decimated.
#[inline]
pub const fn plane_shift(cs: ChromaSampling, plane: ColorPlane) -> (usize, usize) {
    match (plane, chroma_shift(cs)) {
        (ColorPlane::Y, _) | (_, None) => (0, 0),
        (_, Some(shift)) => shift,
    }
}

/// Interleave unit coordinates into a z-order index.
#[inline]
pub const fn raster_to_zscan(x4: usize, y4: usize) -> usize {
    let mut z = 0;
    let mut bit = 0;
    while bit < MAX_LOG2_CU_SIZE - LOG2_UNIT_SIZE {
        z |= ((x4 >> bit) & 1) << (2 * bit);
        z |= ((y4 >> bit) & 1) << (2 * bit + 1);
        bit += 1;
    }
    z
}

/// Inverse of [`raster_to_zscan`].
#[inline]
pub const fn zscan_to_raster(z: usize) -> (usize, usize) {
    let mut x4 = 0;
    let mut y4 = 0;
    let mut bit = 0;
    while bit < MAX_LOG2_CU_SIZE - LOG2_UNIT_SIZE {
        x4 |= ((z >> (2 * bit)) & 1) << bit;
        y4 |= ((z >> (2 * bit + 1)) & 1) << bit;
        bit += 1;
    }
    (x4, y4)
}

/// Legal transform sizes for a coding unit, expressed as log2 sizes.
///
/// A node of size `log2` may be coded whole when `log2 <= max_log2` and may be
/// split when `log2 > min_log2`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DepthRange {
    /// Smallest node size, as log2 of the side.
    pub min_log2: usize,
    /// Largest node size that may be coded unsplit.
    pub max_log2: usize,
}

impl DepthRange {
    /// # Panics
    ///
    /// - If the range is empty or outside the supported transform sizes.
    #[inline]
    pub fn new(min_log2: usize, max_log2: usize) -> Self {
        assert!(min_log2 <= max_log2, "malformed transform depth range");
        assert!(min_log2 >= MIN_TR_LOG2_SIZE && max_log2 <= MAX_TR_LOG2_SIZE);
        DepthRange { min_log2, max_log2 }
    }

    /// A node of this size may be coded without splitting.
    #[inline]
    pub const fn check_full(self, log2: usize) -> bool {
        log2 <= self.max_log2
    }

    /// A node of this size may be split into four.
    #[inline]
    pub const fn check_split(self, log2: usize) -> bool {
        log2 > self.min_log2
    }
}

/// A partition size that does not fit the coding unit.
#[derive(Debug, Copy, Clone, Error, Eq, PartialEq)]
pub struct InvalidBlockSize;

impl Display for InvalidBlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid block size")
    }
}

/// Log2 of a square coding unit size.
///
/// # Errors
///
/// - Returns `InvalidBlockSize` unless `w == h` and the size is a power of two
///   between 8 and 64.
#[inline]
pub fn cu_log2_size(w: usize, h: usize) -> Result<usize, InvalidBlockSize> {
    if w != h || !w.is_power_of_two() {
        return Err(InvalidBlockSize);
    }
    let log2 = w.trailing_zeros() as usize;
    if (MIN_LOG2_CU_SIZE..=MAX_LOG2_CU_SIZE).contains(&log2) {
        Ok(log2)
    } else {
        Err(InvalidBlockSize)
    }
}
