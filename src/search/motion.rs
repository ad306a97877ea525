//! Motion estimation of one prediction unit against one reference picture.


use v_frame::pixel::{CastFromPrimitive, Pixel};

use super::{bits::mv_cost_bits, rdcost::RdCost};
use crate::{
    SearchMethod,
    data::{
        block::MAX_CU_SIZE,
        cu::CodingUnit,
        mc::{SubpelPos, predict_hp, store_uni},
        motion::{MV_MAX, MV_MIN, MotionVector},
        plane::{PlaneBuf, PlaneRegion, Rect},
        sad::get_sad,
        satd::get_satd,
    },
};

/// Declares an array of motion vectors in structure of arrays syntax.
macro_rules! search_pattern_subpel {
    ($field_a:ident: [$($ll_a:expr),*], $field_b:ident: [$($ll_b:expr),*]) => {
      [ $(MotionVector { $field_a: $ll_a, $field_b: $ll_b } ),*]
    };
}

/// Declares an array of motion vectors in structure of arrays syntax.
/// Compared to [`search_pattern_subpel`], this version creates motion vectors
/// in fullpel resolution (x4).
macro_rules! search_pattern {
    ($field_a:ident: [$($ll_a:expr),*], $field_b:ident: [$($ll_b:expr),*]) => {
      [ $(MotionVector { $field_a: $ll_a << 2, $field_b: $ll_b << 2 } ),*]
    };
}

/// Diamond pattern of radius 1.
/// ```text
///  X
/// XoX
///  X
/// ```
const DIAMOND_R1_PATTERN: [MotionVector; 4] = search_pattern!(
  col: [  0,  1,  0, -1],
  row: [  1,  0, -1,  0]
);

/// Uneven multi-hexagon search pattern around a center point.
/// ```text
///      X
///    X   X
///  X       X
///  X       X
///  X   o   X
///  X       X
///  X       X
///    X   X
///      X
/// ```
const UMH_PATTERN: [MotionVector; 16] = search_pattern!(
  col: [ -2, -1,  0,  1,  2,  3,  4,  3,  2,  1,  0, -1, -2, -3, -4, -3],
  row: [  4,  4,  4,  4,  4,  2,  0, -2, -4, -4, -4, -4, -4, -2,  0,  2]
);

/// A hexagon pattern around a center point, in clockwise order so that the
/// offsets already covered by the previous step can be pruned.
/// ```text
///   21012
/// 2  X X
/// 1
/// 0 X o X
/// 1
/// 2  X X
/// ```
const HEXAGON_PATTERN: [MotionVector; 6] = search_pattern!(
  col: [  0,  2,  2,  0, -2, -2],
  row: [ -2, -1,  1,  2,  1, -1]
);

/// A small square pattern around a center point.
/// ```text
///   101
/// 1 XXX
/// 0 XoX
/// 1 XXX
/// ```
const SQUARE_REFINE_PATTERN: [MotionVector; 8] = search_pattern!(
  col: [ -1,  0,  1, -1,  1, -1,  0,  1],
  row: [  1,  1,  1,  0,  0, -1, -1, -1]
);

/// [`SQUARE_REFINE_PATTERN`] in quarter samples, scaled by the step size.
const SQUARE_SUBPEL_PATTERN: [MotionVector; 8] = search_pattern_subpel!(
  col: [ -1,  0,  1, -1,  1, -1,  0,  1],
  row: [  1,  1,  1,  0,  0, -1, -1, -1]
);

/// Largest reach of the uneven multi-hexagon stages, in full samples.
const UMH_MAX_RANGE: usize = 1024;

/// Result of motion search.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct MotionSearchResult {
    /// Motion vector chosen by the motion search.
    pub mv: MotionVector,
    /// Rate distortion data associated with `mv`.
    pub rd: MVCandidateRD,
}

impl MotionSearchResult {
    /// Creates an 'empty' value, replaced by any valid result.
    pub(crate) const fn empty() -> MotionSearchResult {
        MotionSearchResult {
            mv: MotionVector::ZERO,
            rd: MVCandidateRD::empty(),
        }
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.rd.cost == u64::MAX
    }
}

/// Holds data from computing rate distortion of a motion vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct MVCandidateRD {
    /// `dist` plus the lambda weighted vector bits.
    pub cost: u64,
    /// SAD at full sample positions, SATD once refined.
    pub dist: u32,
}

impl MVCandidateRD {
    const fn empty() -> MVCandidateRD {
        MVCandidateRD {
            dist: u32::MAX,
            cost: u64::MAX,
        }
    }
}

/// Inputs and scratch of one motion search.
pub(crate) struct MeContext<'a, T: Pixel> {
    /// Source block, `w` x `h` luma samples.
    pub org: PlaneRegion<'a, T>,
    /// Luma plane of the reference picture.
    pub reference: &'a PlaneBuf<T>,
    /// Luma position of the block in the picture.
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
    pub bit_depth: usize,
    pub rd: &'a RdCost,
    /// Predictor the vector bits are measured against.
    pub mvp: MotionVector,
    /// Inclusive window of accepted vectors.
    pub mv_min: MotionVector,
    pub mv_max: MotionVector,
    /// Interpolation intermediates, at least `w * h` entries.
    pub hp: &'a mut [i32],
    /// Interpolated block.
    pub tmp: &'a mut PlaneBuf<T>,
    /// Vectors evaluated so far.
    pub candidates: u64,
}

impl<T: Pixel> MeContext<'_, T> {
    fn mv_cost(&self, dist: u32, mv: MotionVector) -> MVCandidateRD {
        MVCandidateRD {
            cost: u64::from(dist) + self.rd.sad_cost(mv_cost_bits(mv, self.mvp)),
            dist,
        }
    }

    /// SAD cost of a full sample vector. Reads outside the reference picture
    /// repeat its edge samples.
    pub(crate) fn fullpel_rd(&mut self, mv: MotionVector) -> MVCandidateRD {
        if !mv.in_range(self.mv_min, self.mv_max) {
            return MVCandidateRD::empty();
        }
        self.candidates += 1;

        let (w, h) = (self.w, self.h);
        let x = self.x as isize + isize::from(mv.col >> 2);
        let y = self.y as isize + isize::from(mv.row >> 2);
        let inside = x >= 0
            && y >= 0
            && x as usize + w <= self.reference.width()
            && y as usize + h <= self.reference.height();
        let sad = if inside {
            let block = self.reference.region(Rect::new(x as usize, y as usize, w, h));
            get_sad(&self.org, &block, w, h)
        } else {
            let reference = self.reference;
            self.org
                .rows_iter()
                .take(h)
                .enumerate()
                .map(|(r, row)| {
                    row[..w]
                        .iter()
                        .enumerate()
                        .map(|(c, &p)| {
                            let q = reference.clamped(x + c as isize, y + r as isize);
                            i32::cast_from(p).abs_diff(i32::cast_from(q))
                        })
                        .sum::<u32>()
                })
                .sum()
        };
        self.mv_cost(sad, mv)
    }

    /// SATD cost of a quarter sample vector against the interpolated
    /// reference.
    pub(crate) fn subpel_rd(&mut self, mv: MotionVector) -> MVCandidateRD {
        if !mv.in_range(self.mv_min, self.mv_max) {
            return MVCandidateRD::empty();
        }
        self.candidates += 1;

        let (w, h) = (self.w, self.h);
        let pos = SubpelPos::new(self.x, self.y, mv, 0, 0, true);
        predict_hp(self.reference, pos, w, h, self.bit_depth, self.hp);
        let rect = Rect::new(0, 0, w, h);
        store_uni(&self.hp[..w * h], &mut self.tmp.region_mut(rect), self.bit_depth);
        let satd = get_satd(&self.org, &self.tmp.region(rect), w, h);
        self.mv_cost(satd, mv)
    }

    /// Best of `predictors`, rounded to full samples and moved into the
    /// window.
    fn best_predictor(&mut self, predictors: &[MotionVector]) -> MotionSearchResult {
        let mut best = MotionSearchResult::empty();
        for &init_mv in predictors {
            let mv = init_mv.quantize_to_fullpel().clamp(self.mv_min, self.mv_max);
            let rd = self.fullpel_rd(mv);
            if rd.cost < best.rd.cost {
                best = MotionSearchResult { mv, rd };
            }
        }
        best
    }

    /// Diamond search of radius 2, then 1, moving until the center wins.
    fn diamond_search(&mut self, current: &mut MotionSearchResult) {
        let (mut radius_log2, radius_end_log2) = (1u8, 0u8);
        loop {
            let mut best_cand = MotionSearchResult::empty();
            for &offset in &DIAMOND_R1_PATTERN {
                let cand_mv = current.mv + (offset << radius_log2);
                let rd = self.fullpel_rd(cand_mv);
                if rd.cost < best_cand.rd.cost {
                    best_cand = MotionSearchResult { mv: cand_mv, rd };
                }
            }

            if current.rd.cost <= best_cand.rd.cost {
                if radius_log2 == radius_end_log2 {
                    break;
                }
                radius_log2 -= 1;
            } else {
                *current = best_cand;
            }
        }
    }

    /// Hexagon search, then a square refinement.
    ///
    /// After the first step only the three hexagon points not covered by the
    /// previous step are tested.
    fn hexagon_search(&mut self, current: &mut MotionSearchResult) {
        let mut best_cand_idx = 0;
        let mut best_cand = MotionSearchResult::empty();
        for (i, &pattern_mv) in HEXAGON_PATTERN.iter().enumerate() {
            let cand_mv = current.mv + pattern_mv;
            let rd = self.fullpel_rd(cand_mv);
            if rd.cost < best_cand.rd.cost {
                best_cand_idx = i;
                best_cand = MotionSearchResult { mv: cand_mv, rd };
            }
        }

        while best_cand.rd.cost < current.rd.cost {
            *current = best_cand;
            best_cand = MotionSearchResult::empty();
            let center_cand_idx = best_cand_idx;
            for idx_offset_mod6 in 5..=7 {
                let i = (center_cand_idx + idx_offset_mod6) % 6;
                let cand_mv = current.mv + HEXAGON_PATTERN[i];
                let rd = self.fullpel_rd(cand_mv);
                if rd.cost < best_cand.rd.cost {
                    best_cand_idx = i;
                    best_cand = MotionSearchResult { mv: cand_mv, rd };
                }
            }
        }

        let mut best_cand = MotionSearchResult::empty();
        for &offset in &SQUARE_REFINE_PATTERN {
            let cand_mv = current.mv + offset;
            let rd = self.fullpel_rd(cand_mv);
            if rd.cost < best_cand.rd.cost {
                best_cand = MotionSearchResult { mv: cand_mv, rd };
            }
        }
        if best_cand.rd.cost < current.rd.cost {
            *current = best_cand;
        }
    }

    /// Uneven multi-hexagon search: an unsymmetrical cross, a 5x5 full
    /// search, hexagons at growing scales, then [`Self::hexagon_search`].
    fn uneven_multi_hex_search(&mut self, current: &mut MotionSearchResult, me_range: i16) {
        const HORIZONTAL_LINE: [MotionVector; 2] = search_pattern!(
          col: [-1, 1],
          row: [ 0, 0]
        );
        const VERTICAL_LINE: [MotionVector; 2] = search_pattern!(
          col: [ 0, 0],
          row: [-1, 1]
        );

        // Motion is mostly horizontal, so that arm of the cross is twice as
        // long.
        let center = current.mv;
        for i in (1..=me_range).step_by(2) {
            for &offset in &HORIZONTAL_LINE {
                self.try_candidate(current, center + offset * i);
            }
        }
        for i in (1..=me_range >> 1).step_by(2) {
            for &offset in &VERTICAL_LINE {
                self.try_candidate(current, center + offset * i);
            }
        }

        let center = current.mv;
        for row in -2i16..=2 {
            for col in -2i16..=2 {
                if row == 0 && col == 0 {
                    continue;
                }
                self.try_candidate(current, center + MotionVector::new(row << 2, col << 2));
            }
        }

        let center = current.mv;
        for i in 1..=me_range >> 2 {
            for &offset in &UMH_PATTERN {
                self.try_candidate(current, center + offset * i);
            }
        }

        self.hexagon_search(current);
    }

    /// Every full sample vector of the window.
    fn full_search(&mut self, current: &mut MotionSearchResult) {
        let (min, max) = (self.mv_min, self.mv_max);
        for row in (min.row..=max.row).step_by(4) {
            for col in (min.col..=max.col).step_by(4) {
                self.try_candidate(current, MotionVector::new(row, col));
            }
        }
    }

    fn try_candidate(&mut self, current: &mut MotionSearchResult, mv: MotionVector) {
        let rd = self.fullpel_rd(mv);
        if rd.cost < current.rd.cost {
            *current = MotionSearchResult { mv, rd };
        }
    }

    /// Square refinement at half, then quarter sample steps. `subpel_refine`
    /// is the number of steps run.
    fn subpel_search(&mut self, current: &mut MotionSearchResult, subpel_refine: u8) {
        if subpel_refine == 0 || current.is_empty() {
            return;
        }
        current.rd = self.subpel_rd(current.mv);
        for step in [2i16, 1].into_iter().take(usize::from(subpel_refine)) {
            let center = current.mv;
            let mut best_cand = MotionSearchResult::empty();
            for &offset in &SQUARE_SUBPEL_PATTERN {
                let cand_mv = center + offset * step;
                let rd = self.subpel_rd(cand_mv);
                if rd.cost < best_cand.rd.cost {
                    best_cand = MotionSearchResult { mv: cand_mv, rd };
                }
            }
            if best_cand.rd.cost < current.rd.cost {
                *current = best_cand;
            }
        }
    }

    /// Runs `method` from the best of `starts`, then the sub-sample
    /// refinement.
    pub(crate) fn motion_search(
        &mut self,
        method: SearchMethod,
        starts: &[MotionVector],
        search_range: usize,
        subpel_refine: u8,
    ) -> MotionSearchResult {
        let mut best = self.best_predictor(starts);
        if best.is_empty() {
            return best;
        }
        match method {
            SearchMethod::Dia => self.diamond_search(&mut best),
            SearchMethod::Hex => self.hexagon_search(&mut best),
            SearchMethod::Umh => {
                let me_range = search_range.min(UMH_MAX_RANGE) as i16;
                self.uneven_multi_hex_search(&mut best, me_range);
            }
            SearchMethod::Full => self.full_search(&mut best),
        }
        self.subpel_search(&mut best, subpel_refine);
        best
    }
}

/// Window of vectors searched around `mvp`, in quarter samples aligned to
/// full samples.
///
/// The window reaches `search_range` full samples around the predictor and
/// is clipped so that no block lands more than a coding unit and a margin
/// outside the picture. With `max_row`, downward vectors are further limited
/// to that many rows.
pub(crate) fn set_search_range(
    cu: &CodingUnit,
    mvp: MotionVector,
    search_range: usize,
    pic_width: usize,
    pic_height: usize,
    max_row: Option<usize>,
) -> (MotionVector, MotionVector) {
    const MARGIN: i32 = 8;
    let dist = (search_range as i32) << 2;
    let (cx, cy) = (cu.x as i32, cu.y as i32);
    let cu_size = MAX_CU_SIZE as i32;

    let x_max = (pic_width as i32 + MARGIN - cx - 1) << 2;
    let x_min = -(cu_size + MARGIN + cx - 1) << 2;
    let mut y_max = (pic_height as i32 + MARGIN - cy - 1) << 2;
    let y_min = -(cu_size + MARGIN + cy - 1) << 2;
    if let Some(lag) = max_row {
        y_max = y_max.min((lag as i32) << 2);
    }

    let up = |v: i32| (v.clamp(MV_MIN, MV_MAX) + 3) & !3;
    let down = |v: i32| v.clamp(MV_MIN, MV_MAX) & !3;
    let window = |center: i16, lo: i32, hi: i32| {
        let center = i32::from(center);
        let min = up((center - dist).clamp(lo, hi));
        let max = down((center + dist).clamp(lo, hi)).max(min);
        (min.min(MV_MAX & !3) as i16, max.min(MV_MAX & !3) as i16)
    };
    let (row_min, row_max) = window(mvp.row, y_min, y_max);
    let (col_min, col_max) = window(mvp.col, x_min, x_max);
    (
        MotionVector::new(row_min, col_min),
        MotionVector::new(row_max, col_max),
    )
}
