//! Trial CABAC state used to estimate the bit cost of syntax elements.
//!
//! Nothing is written to a bitstream. Each coded bin only adapts its context
//! model and adds its estimated cost, in Q15 fractional bits, to an
//! accumulator. Search code brackets each hypothesis with
//! [`Entropy::checkpoint`] and [`Entropy::rollback`].

#[cfg(test)]
mod tests;

mod tables;

use arrayvec::ArrayVec;

use self::tables::*;
use super::{
    block::{MIN_LOG2_CU_SIZE, PartSize},
    cu::SliceType,
    motion::MotionVector,
};

/// Fractional bits per whole bit.
pub const FRAC_BITS_SCALE: u64 = 1 << 15;
const COEF_REMAIN_BIN_REDUCTION: u32 = 3;
const C1FLAG_NUMBER: usize = 8;

/// Rounds Q15 fractional bits to whole bits.
#[inline]
pub const fn frac_to_bits(frac: u64) -> u32 {
    ((frac + (1 << 14)) >> 15) as u32
}

/// Number of bypass bins of a k-th order Exp-Golomb code.
#[inline]
pub const fn exp_golomb_bins(mut symbol: u32, mut k: u32) -> u32 {
    let k0 = k;
    while symbol >= (1 << k) {
        symbol -= 1 << k;
        k += 1;
    }
    (k - k0) + 1 + k
}

/// Number of bypass bins of `coeff_abs_level_remaining`.
#[inline]
pub const fn coeff_remain_bins(symbol: u32, rice: u32) -> u32 {
    if symbol < (COEF_REMAIN_BIN_REDUCTION << rice) {
        (symbol >> rice) + 1 + rice
    } else {
        let mut code = symbol - (COEF_REMAIN_BIN_REDUCTION << rice);
        let mut length = rice;
        while code >= (1 << length) {
            code -= 1 << length;
            length += 1;
        }
        (COEF_REMAIN_BIN_REDUCTION + length + 1 - rice) + length
    }
}

/// Context model state: `(state << 1) | mps`.
#[inline]
const fn init_context(init_value: u8, qp: i32) -> u8 {
    let slope = (init_value as i32 >> 4) * 5 - 45;
    let offset = ((init_value as i32 & 15) << 3) - 16;
    let qp = if qp < 0 {
        0
    } else if qp > 51 {
        51
    } else {
        qp
    };
    let mut pre = ((slope * qp) >> 4) + offset;
    if pre < 1 {
        pre = 1;
    } else if pre > 126 {
        pre = 126;
    }
    if pre <= 63 {
        ((63 - pre) << 1) as u8
    } else {
        (((pre - 64) << 1) | 1) as u8
    }
}

/// Saved context models and bit count of an [`Entropy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntropyCheckpoint {
    contexts: [u8; NUM_CONTEXTS],
    frac_bits: u64,
}

/// Trial entropy coder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entropy {
    contexts: [u8; NUM_CONTEXTS],
    frac_bits: u64,
}

impl Entropy {
    /// Context models initialized for a slice.
    #[inline]
    pub fn new(slice_type: SliceType, qp: i32) -> Self {
        let init = init_values(slice_type);
        let mut contexts = [0u8; NUM_CONTEXTS];
        for (ctx, &v) in contexts.iter_mut().zip(init.iter()) {
            *ctx = init_context(v, qp);
        }
        Entropy {
            contexts,
            frac_bits: 0,
        }
    }

    /// Snapshot of the contexts and the bit count.
    #[inline]
    pub fn checkpoint(&self) -> EntropyCheckpoint {
        EntropyCheckpoint {
            contexts: self.contexts,
            frac_bits: self.frac_bits,
        }
    }

    /// Restores a snapshot taken by [`Entropy::checkpoint`].
    #[inline]
    pub fn rollback(&mut self, checkpoint: &EntropyCheckpoint) {
        self.contexts = checkpoint.contexts;
        self.frac_bits = checkpoint.frac_bits;
    }

    /// Zeroes the bit count, leaving the contexts alone.
    #[inline]
    pub fn reset_bits(&mut self) {
        self.frac_bits = 0;
    }

    /// Accumulated cost in Q15 fractional bits.
    #[inline]
    pub const fn frac_bits(&self) -> u64 {
        self.frac_bits
    }

    /// Accumulated cost rounded to whole bits.
    #[inline]
    pub const fn bits(&self) -> u32 {
        frac_to_bits(self.frac_bits)
    }

    fn encode_bin(&mut self, bin: bool, ctx: usize) {
        let model = self.contexts[ctx];
        let (state, mps) = (model >> 1, model & 1 == 1);
        self.frac_bits += u64::from(ENTROPY_BITS[((state as usize) << 1) | usize::from(bin != mps)]);
        self.contexts[ctx] = if bin == mps {
            (state.saturating_add(1).min(62) << 1) | u8::from(mps)
        } else {
            let mps = if state == 0 { !mps } else { mps };
            (NEXT_STATE_LPS[state as usize] << 1) | u8::from(mps)
        };
    }

    #[inline]
    fn encode_bins_ep(&mut self, num_bins: u32) {
        self.frac_bits += u64::from(num_bins) * FRAC_BITS_SCALE;
    }

    /// `cu_skip_flag`; `ctx_inc` counts the skipped left and above
    /// neighbours.
    #[inline]
    pub fn code_skip_flag(&mut self, skip: bool, ctx_inc: usize) {
        debug_assert!(ctx_inc < 3);
        self.encode_bin(skip, OFF_SKIP_FLAG + ctx_inc);
    }

    /// `pred_mode_flag`.
    #[inline]
    pub fn code_pred_mode(&mut self, intra: bool) {
        self.encode_bin(intra, OFF_PRED_MODE);
    }

    /// `part_mode`. Intra coding units only signal it at the minimum size.
    #[inline]
    pub fn code_part_size(&mut self, part: PartSize, intra: bool, log2_cu: usize, amp: bool) {
        if intra {
            if log2_cu == MIN_LOG2_CU_SIZE {
                self.encode_bin(part == PartSize::SIZE_2Nx2N, OFF_PART_SIZE);
            }
            return;
        }
        let amp = amp && log2_cu > MIN_LOG2_CU_SIZE;
        match part {
            PartSize::SIZE_2Nx2N => self.encode_bin(true, OFF_PART_SIZE),
            PartSize::SIZE_NxN => {
                self.encode_bin(false, OFF_PART_SIZE);
                self.encode_bin(false, OFF_PART_SIZE + 1);
                if log2_cu > MIN_LOG2_CU_SIZE {
                    self.encode_bin(false, OFF_PART_SIZE + 2);
                }
            }
            _ => {
                let horizontal = part.is_horizontal();
                self.encode_bin(false, OFF_PART_SIZE);
                self.encode_bin(horizontal, OFF_PART_SIZE + 1);
                if amp {
                    self.encode_bin(!part.is_amp(), OFF_PART_SIZE + 3);
                    if part.is_amp() {
                        self.encode_bins_ep(1);
                    }
                }
            }
        }
    }

    /// `prev_intra_luma_pred_flag` followed by `mpm_idx` or
    /// `rem_intra_luma_pred_mode`.
    #[inline]
    pub fn code_intra_dir_luma(&mut self, dir: u8, mpms: [u8; 3]) {
        match mpms.iter().position(|&m| m == dir) {
            Some(idx) => {
                self.encode_bin(true, OFF_PREV_INTRA_LUMA_PRED);
                self.encode_bins_ep(if idx == 0 { 1 } else { 2 });
            }
            None => {
                self.encode_bin(false, OFF_PREV_INTRA_LUMA_PRED);
                self.encode_bins_ep(5);
            }
        }
    }

    /// `intra_chroma_pred_mode`; `dm` is the luma-derived candidate.
    #[inline]
    pub fn code_intra_dir_chroma(&mut self, dm: bool) {
        self.encode_bin(!dm, OFF_CHROMA_PRED_MODE);
        if !dm {
            self.encode_bins_ep(2);
        }
    }

    /// `merge_flag`.
    #[inline]
    pub fn code_merge_flag(&mut self, merge: bool) {
        self.encode_bin(merge, OFF_MERGE_FLAG);
    }

    /// Truncated unary merge index, first bin context coded.
    #[inline]
    pub fn code_merge_idx(&mut self, idx: usize, num_cands: usize) {
        for ui in 0..num_cands.saturating_sub(1) {
            let more = ui != idx;
            if ui == 0 {
                self.encode_bin(more, OFF_MERGE_IDX);
            } else {
                self.encode_bins_ep(1);
            }
            if !more {
                break;
            }
        }
    }

    /// `inter_pred_idc`: 1 for list 0, 2 for list 1, 3 for bi-prediction.
    /// 8x4 and 4x8 partitions cannot signal bi-prediction.
    #[inline]
    pub fn code_inter_dir(&mut self, dir: u8, width: usize, height: usize, cu_depth: usize) {
        debug_assert!((1..=3).contains(&dir));
        if width + height != 12 {
            self.encode_bin(dir == 3, OFF_INTER_DIR + cu_depth.min(3));
            if dir == 3 {
                return;
            }
        }
        self.encode_bin(dir == 2, OFF_INTER_DIR + 4);
    }

    /// Truncated unary reference index. Nothing is coded for a single reference.
    #[inline]
    pub fn code_ref_idx(&mut self, ref_idx: usize, num_refs: usize) {
        if num_refs <= 1 {
            return;
        }
        self.encode_bin(ref_idx > 0, OFF_REF_IDX);
        if ref_idx == 0 {
            return;
        }
        let target = ref_idx - 1;
        for ui in 0..num_refs - 2 {
            let more = ui != target;
            if ui == 0 {
                self.encode_bin(more, OFF_REF_IDX + 1);
            } else {
                self.encode_bins_ep(1);
            }
            if !more {
                break;
            }
        }
    }

    /// Motion vector difference, horizontal component first.
    #[inline]
    pub fn code_mvd(&mut self, mvd: MotionVector) {
        let comps = [i32::from(mvd.col), i32::from(mvd.row)];
        for c in comps {
            self.encode_bin(c != 0, OFF_MVD);
        }
        for c in comps.into_iter().filter(|&c| c != 0) {
            self.encode_bin(c.abs() > 1, OFF_MVD + 1);
        }
        for c in comps.into_iter().filter(|&c| c != 0) {
            if c.abs() > 1 {
                self.encode_bins_ep(exp_golomb_bins(c.unsigned_abs() - 2, 1));
            }
            self.encode_bins_ep(1);
        }
    }

    /// `mvp_lX_flag`.
    #[inline]
    pub fn code_mvp_idx(&mut self, idx: u8) {
        self.encode_bin(idx != 0, OFF_MVP_IDX);
    }

    /// `rqt_root_cbf`.
    #[inline]
    pub fn code_root_cbf(&mut self, cbf: bool) {
        self.encode_bin(cbf, OFF_QT_ROOT_CBF);
    }

    /// `split_transform_flag`, context chosen by the node size.
    #[inline]
    pub fn code_split_transform(&mut self, split: bool, log2: usize) {
        debug_assert!((3..=5).contains(&log2));
        self.encode_bin(split, OFF_SPLIT_TRANSFORM + 5 - log2);
    }

    /// `cbf_luma`.
    #[inline]
    pub fn code_cbf_luma(&mut self, cbf: bool, tr_depth: usize) {
        self.encode_bin(cbf, OFF_CBF_LUMA + usize::from(tr_depth == 0));
    }

    /// `cbf_cb` or `cbf_cr`.
    #[inline]
    pub fn code_cbf_chroma(&mut self, cbf: bool, tr_depth: usize) {
        self.encode_bin(cbf, OFF_CBF_CHROMA + tr_depth.min(4));
    }

    fn code_last_position(&mut self, x: usize, y: usize, log2: usize, luma: bool) {
        let (offset, shift) = if luma {
            (3 * (log2 - 2) + ((log2 - 1) >> 2), (log2 + 1) >> 2)
        } else {
            (15, log2 - 2)
        };
        let max_group = GROUP_IDX[(1 << log2) - 1] as usize;
        for (pos, base) in [(x, OFF_LAST_X), (y, OFF_LAST_Y)] {
            let group = GROUP_IDX[pos] as usize;
            for i in 0..group {
                self.encode_bin(true, base + offset + (i >> shift));
            }
            if group < max_group {
                self.encode_bin(false, base + offset + (group >> shift));
            }
        }
        for pos in [x, y] {
            let group = u32::from(GROUP_IDX[pos]);
            if group > 3 {
                self.encode_bins_ep((group - 2) >> 1);
            }
        }
    }

    /// Codes the residual of one transform block given in raster order, over
    /// the diagonal scan. An all-zero block codes nothing.
    ///
    /// # Panics
    ///
    /// - If `coeff` is shorter than the block.
    #[inline]
    pub fn code_coeff(&mut self, coeff: &[i16], log2: usize, luma: bool) {
        let n = 1usize << log2;
        assert!(coeff.len() >= n * n);
        let cgs_w = n >> 2;
        let cg_scan: &[u8] = match log2 {
            2 => &SCAN_2X2[..1],
            3 => &SCAN_2X2[..4],
            4 => &SCAN_4X4[..16],
            _ => &SCAN_8X8[..64],
        };
        let pos = |scan_pos: usize| {
            let cg = cg_scan[scan_pos >> 4] as usize;
            let p = SCAN_4X4[scan_pos & 15] as usize;
            ((cg % cgs_w) * 4 + (p & 3), (cg / cgs_w) * 4 + (p >> 2))
        };
        let level = |scan_pos: usize| {
            let (x, y) = pos(scan_pos);
            coeff[y * n + x]
        };

        let Some(last) = (0..n * n).rev().find(|&s| level(s) != 0) else {
            return;
        };
        let (last_x, last_y) = pos(last);
        self.code_last_position(last_x, last_y, log2, luma);

        let mut coded_groups = [false; 64];
        let last_cg = last >> 4;
        let mut c1 = 1usize;
        for cg_idx in (0..=last_cg).rev() {
            let cg = cg_scan[cg_idx] as usize;
            let (cgx, cgy) = (cg % cgs_w, cg / cgs_w);
            let first = cg_idx << 4;
            let right = cgx + 1 < cgs_w && coded_groups[cg + 1];
            let below = cgy + 1 < cgs_w && coded_groups[cg + cgs_w];

            if cg_idx == last_cg || cg_idx == 0 {
                coded_groups[cg] = true;
            } else {
                let sig = (first..first + 16).any(|s| level(s) != 0);
                let ctx = usize::from(right || below) + if luma { 0 } else { 2 };
                self.encode_bin(sig, OFF_CODED_SUB_BLOCK + ctx);
                coded_groups[cg] = sig;
            }
            if !coded_groups[cg] {
                continue;
            }

            let pattern = usize::from(right) | (usize::from(below) << 1);
            let mut abs_levels = ArrayVec::<u32, 16>::new();
            let top = if cg_idx == last_cg {
                abs_levels.push(u32::from(level(last).unsigned_abs()));
                (last & 15) as isize - 1
            } else {
                15
            };
            for i in (0..=top).rev() {
                let s = first + i as usize;
                let sig = level(s) != 0;
                if i > 0 || cg_idx == 0 || !abs_levels.is_empty() {
                    let (x, y) = pos(s);
                    let ctx = sig_ctx(x, y, log2, pattern, luma);
                    self.encode_bin(sig, OFF_SIG_FLAG + ctx);
                }
                if sig {
                    abs_levels.push(u32::from(level(s).unsigned_abs()));
                }
            }
            if abs_levels.is_empty() {
                continue;
            }

            let mut ctx_set = if cg_idx > 0 && luma { 2 } else { 0 };
            if c1 == 0 {
                ctx_set += 1;
            }
            c1 = 1;
            let g1_base = OFF_GREATER1 + if luma { 0 } else { 16 };
            let mut first_c2 = None;
            for (idx, &a) in abs_levels.iter().take(C1FLAG_NUMBER).enumerate() {
                self.encode_bin(a > 1, g1_base + ctx_set * 4 + c1);
                if a > 1 {
                    c1 = 0;
                    first_c2.get_or_insert(idx);
                } else if c1 > 0 && c1 < 3 {
                    c1 += 1;
                }
            }
            if let Some(idx) = first_c2 {
                let g2_base = OFF_GREATER2 + if luma { 0 } else { 4 };
                self.encode_bin(abs_levels[idx] > 2, g2_base + ctx_set);
            }

            // signs
            self.encode_bins_ep(abs_levels.len() as u32);

            let mut rice = 0;
            let mut first_coeff2 = true;
            for (idx, &a) in abs_levels.iter().enumerate() {
                let base = if idx < C1FLAG_NUMBER {
                    if first_coeff2 { 3 } else { 2 }
                } else {
                    1
                };
                if a >= base {
                    self.encode_bins_ep(coeff_remain_bins(a - base, rice));
                    if a > 3 << rice {
                        rice = (rice + 1).min(4);
                    }
                }
                if a >= 2 {
                    first_coeff2 = false;
                }
            }
        }
    }
}

/// Context increment of `sig_coeff_flag` at `(x, y)`. `pattern` holds the
/// coded flags of the right (bit 0) and below (bit 1) coefficient groups.
fn sig_ctx(x: usize, y: usize, log2: usize, pattern: usize, luma: bool) -> usize {
    let chroma_offset = if luma { 0 } else { 27 };
    if x + y == 0 {
        return chroma_offset;
    }
    if log2 == 2 {
        return chroma_offset + CTX_IND_MAP_4X4[4 * y + x] as usize;
    }
    let offset = match (log2, luma) {
        (3, _) => 9,
        (_, true) => 21,
        (_, false) => 12,
    };
    let (px, py) = (x & 3, y & 3);
    let cnt = match pattern {
        0 => match px + py {
            0 => 2,
            1 | 2 => 1,
            _ => 0,
        },
        1 => match py {
            0 => 2,
            1 => 1,
            _ => 0,
        },
        2 => match px {
            0 => 2,
            1 => 1,
            _ => 0,
        },
        _ => 2,
    };
    let group = if luma && (x >> 2) + (y >> 2) > 0 { 3 } else { 0 };
    chroma_offset + group + offset + cnt
}
