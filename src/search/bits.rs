//! Bit cost estimates that do not need the entropy coder state.

#[cfg(test)]
mod tests;

use arrayvec::ArrayVec;

use crate::data::{block::PartSize, entropy::exp_golomb_bins, motion::MotionVector};

/// Largest number of intra modes kept for the full RD pass, before the most
/// probable modes are appended.
pub const MAX_RD_MODE_CANDS: usize = 8;

/// Bits of a truncated unary index.
#[inline]
pub const fn get_tu_bits(idx: usize, num_idx: usize) -> u32 {
    debug_assert!(idx < num_idx);
    if idx + 1 == num_idx {
        idx as u32
    } else {
        idx as u32 + 1
    }
}

/// Bits of one MVD component: greater0, greater1, the EG1 remainder and the
/// sign.
#[inline]
pub const fn mvd_component_bits(d: i16) -> u32 {
    let mag = d.unsigned_abs() as u32;
    match mag {
        0 => 1,
        1 => 3,
        _ => 3 + exp_golomb_bins(mag - 2, 1),
    }
}

/// Bits of a motion vector difference, both components.
#[inline]
pub const fn mvd_bits(mvd: MotionVector) -> u32 {
    mvd_component_bits(mvd.col) + mvd_component_bits(mvd.row)
}

/// Bits of coding `mv` against the predictor `mvp`.
#[inline]
pub fn mv_cost_bits(mv: MotionVector, mvp: MotionVector) -> u32 {
    mvd_bits(mv - mvp)
}

/// Fixed-capacity list of `(mode, cost)` kept sorted by increasing cost.
///
/// Equal costs keep insertion order, so the earlier mode wins ties.
#[derive(Debug, Clone)]
pub struct CandList {
    capacity: usize,
    entries: ArrayVec<(u8, u64), { MAX_RD_MODE_CANDS + 3 }>,
}

impl CandList {
    /// # Panics
    ///
    /// - If `capacity` is zero or larger than [`MAX_RD_MODE_CANDS`].
    #[inline]
    pub fn new(capacity: usize) -> Self {
        assert!((1..=MAX_RD_MODE_CANDS).contains(&capacity));
        CandList {
            capacity,
            entries: ArrayVec::new(),
        }
    }

    /// Capacity used for a prediction block of `1 << log2` samples.
    #[inline]
    pub const fn capacity_for(log2: usize) -> usize {
        if log2 <= 3 { MAX_RD_MODE_CANDS } else { 3 }
    }

    /// Inserts a mode unless the list is full of cheaper or equal entries.
    #[inline]
    pub fn insert(&mut self, mode: u8, cost: u64) {
        let pos = self.entries.partition_point(|&(_, c)| c <= cost);
        if pos >= self.capacity {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop();
        }
        self.entries.insert(pos, (mode, cost));
    }

    /// Appends a mode at the end, past the ranked entries. Used for the most
    /// probable modes.
    #[inline]
    pub fn append(&mut self, mode: u8) {
        if !self.contains(mode) {
            self.entries.push((mode, u64::MAX));
        }
    }

    /// Returns `true` if `mode` is on the list.
    #[inline]
    pub fn contains(&self, mode: u8) -> bool {
        self.entries.iter().any(|&(m, _)| m == mode)
    }

    /// Number of candidates kept.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no candidate has been kept.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidate modes, cheapest first.
    #[inline]
    pub fn modes(&self) -> impl Iterator<Item = u8> + '_ {
        self.entries.iter().map(|&(m, _)| m)
    }

    /// Costs matching [`CandList::modes`].
    #[inline]
    pub fn costs(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|&(_, c)| c)
    }
}

/// Approximate signalling bits of the L0, L1 and bi-predictive choices of a
/// partition, given the choice made for the previous partition.
#[inline]
pub fn get_blk_bits(part_size: PartSize, p_slice: bool, part_idx: usize, last_mode: usize) -> [u32; 3] {
    const HORIZONTAL: [[[u32; 3]; 3]; 2] = [
        [[0, 0, 3], [0, 0, 0], [0, 0, 0]],
        [[5, 7, 7], [7, 5, 7], [9 - 3, 9 - 3, 9 - 3]],
    ];
    const VERTICAL: [[[u32; 3]; 3]; 2] = [
        [[0, 2, 3], [0, 0, 0], [0, 0, 0]],
        [[5, 7, 7], [7 - 2, 7 - 2, 9 - 2], [9 - 3, 9 - 3, 9 - 3]],
    ];

    match part_size {
        PartSize::SIZE_2Nx2N | PartSize::SIZE_NxN => [if p_slice { 1 } else { 3 }, 3, 5],
        _ if p_slice => [3, 0, 0],
        p if p.is_horizontal() => HORIZONTAL[part_idx.min(1)][last_mode.min(2)],
        _ => VERTICAL[part_idx.min(1)][last_mode.min(2)],
    }
}
