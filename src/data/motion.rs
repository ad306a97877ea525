use std::ops;

/// Largest magnitude a motion vector component may take, in quarter-pel units.
pub const MV_MAX: i32 = (1 << 15) - 1;
/// Smallest value a motion vector component may take.
pub const MV_MIN: i32 = -(1 << 15);

/// Merge candidate list length.
pub const MRG_MAX_NUM_CANDS: usize = 5;
/// Motion vector predictor list length.
pub const AMVP_NUM_CANDS: usize = 2;
/// Cost of signalling the predictor index, in bits.
pub const MVP_IDX_BITS: u32 = 1;

/// Motion vector in quarter-pel units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct MotionVector {
    /// Vertical component.
    pub row: i16,
    /// Horizontal component.
    pub col: i16,
}

impl MotionVector {
    /// The zero vector.
    pub const ZERO: MotionVector = MotionVector { row: 0, col: 0 };

    /// Vector from quarter-pel components.
    #[inline]
    pub const fn new(row: i16, col: i16) -> Self {
        MotionVector { row, col }
    }

    /// Vector from a full-pel displacement.
    #[inline]
    pub const fn from_fullpel(row: i32, col: i32) -> Self {
        MotionVector {
            row: clip_mv(row << 2),
            col: clip_mv(col << 2),
        }
    }

    /// Rounds toward zero to the full-pel grid.
    #[inline]
    pub const fn quantize_to_fullpel(self) -> Self {
        Self {
            row: (self.row / 4) * 4,
            col: (self.col / 4) * 4,
        }
    }

    /// Both components land on full-pel positions.
    #[inline]
    pub const fn is_fullpel(self) -> bool {
        self.row & 3 == 0 && self.col & 3 == 0
    }

    /// Clamps each component into `[min, max]`.
    #[inline]
    pub fn clamp(self, min: MotionVector, max: MotionVector) -> Self {
        MotionVector {
            row: self.row.clamp(min.row, max.row),
            col: self.col.clamp(min.col, max.col),
        }
    }

    /// Both components lie within `[min, max]`.
    #[inline]
    pub const fn in_range(self, min: MotionVector, max: MotionVector) -> bool {
        self.row >= min.row && self.row <= max.row && self.col >= min.col && self.col <= max.col
    }
}

#[inline]
pub const fn clip_mv(v: i32) -> i16 {
    (if v < MV_MIN {
        MV_MIN
    } else if v > MV_MAX {
        MV_MAX
    } else {
        v
    }) as i16
}

impl ops::Mul<i16> for MotionVector {
    type Output = MotionVector;

    #[inline]
    fn mul(self, rhs: i16) -> MotionVector {
        MotionVector {
            row: self.row * rhs,
            col: self.col * rhs,
        }
    }
}

impl ops::Shr<u8> for MotionVector {
    type Output = MotionVector;

    #[inline]
    fn shr(self, rhs: u8) -> MotionVector {
        MotionVector {
            row: self.row >> rhs,
            col: self.col >> rhs,
        }
    }
}

impl ops::Shl<u8> for MotionVector {
    type Output = MotionVector;

    #[inline]
    fn shl(self, rhs: u8) -> MotionVector {
        MotionVector {
            row: self.row << rhs,
            col: self.col << rhs,
        }
    }
}

impl ops::Add<MotionVector> for MotionVector {
    type Output = MotionVector;

    #[inline]
    fn add(self, rhs: MotionVector) -> MotionVector {
        MotionVector {
            row: self.row.saturating_add(rhs.row),
            col: self.col.saturating_add(rhs.col),
        }
    }
}

impl ops::Sub<MotionVector> for MotionVector {
    type Output = MotionVector;

    #[inline]
    fn sub(self, rhs: MotionVector) -> MotionVector {
        MotionVector {
            row: self.row.saturating_sub(rhs.row),
            col: self.col.saturating_sub(rhs.col),
        }
    }
}

/// Motion of one prediction unit: one vector and reference per list.
///
/// A negative `ref_idx` marks an unused list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct MvField {
    /// Vector per reference list.
    pub mv: [MotionVector; 2],
    /// Reference index per list, `-1` when the list is unused.
    pub ref_idx: [i8; 2],
}

impl Default for MvField {
    #[inline]
    fn default() -> Self {
        MvField {
            mv: [MotionVector::ZERO; 2],
            ref_idx: [-1; 2],
        }
    }
}

impl MvField {
    /// Bit 0 set when list 0 is used, bit 1 when list 1 is used.
    #[inline]
    pub const fn inter_dir(&self) -> u8 {
        (self.ref_idx[0] >= 0) as u8 | (((self.ref_idx[1] >= 0) as u8) << 1)
    }

    /// List `list` takes part in the prediction.
    #[inline]
    pub const fn uses_list(&self, list: usize) -> bool {
        self.ref_idx[list] >= 0
    }

    /// Both lists take part in the prediction.
    #[inline]
    pub const fn is_bi(&self) -> bool {
        self.ref_idx[0] >= 0 && self.ref_idx[1] >= 0
    }

    /// Keeps only list 0 motion.
    #[inline]
    pub const fn to_list0(self) -> Self {
        MvField {
            mv: [self.mv[0], MotionVector::ZERO],
            ref_idx: [self.ref_idx[0], -1],
        }
    }
}

/// Result of an explicit motion search for one list and reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotionData {
    pub mv: MotionVector,
    pub mvp: MotionVector,
    pub mvp_idx: u8,
    pub ref_idx: i8,
    pub cost: u64,
    pub bits: u32,
}

/// Final motion decision of one prediction unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct PuMotion {
    /// Chosen motion.
    pub field: MvField,
    /// Predictor index per list, for explicit motion.
    pub mvp_idx: [u8; 2],
    /// Motion vector difference per list, for explicit motion.
    pub mvd: [MotionVector; 2],
    /// Set when the motion came from a merge candidate.
    pub merge: bool,
    /// Index into the merge list when `merge` is set.
    pub merge_idx: u8,
}

