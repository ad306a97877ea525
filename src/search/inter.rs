//! Inter prediction: merge and skip, explicit motion search and the coding
//! of inter residuals.


use aligned::{A64, Aligned};
use arrayvec::ArrayVec;
use log::{debug, trace};
use v_frame::pixel::{ChromaSampling, Pixel};

use super::{
    ModeBuffers,
    ModeCost,
    Search,
    SliceContext,
    bits::{get_blk_bits, get_tu_bits, mvd_bits},
    motion::{MeContext, set_search_range},
    residual::{reconstruct, subtract},
};
use crate::data::{
    block::{ColorPlane, MAX_CU_SIZE, PartGeometry, PartSize, plane_shift},
    candidates::{amvp_candidates, merge_candidates},
    cu::{CodingUnit, PredMode, SliceType},
    entropy::frac_to_bits,
    mc::{SubpelPos, predict_hp, store_bi, store_uni},
    motion::{
        AMVP_NUM_CANDS, MRG_MAX_NUM_CANDS, MV_MAX, MV_MIN, MVP_IDX_BITS, MotionData, MotionVector,
        MvField, PuMotion,
    },
    plane::{Rect, Yuv},
    sad::get_sad,
    satd::get_satd,
};

const MC_BUF_SIZE: usize = MAX_CU_SIZE * MAX_CU_SIZE;

type HpBuffers = [Aligned<A64, [i32; MC_BUF_SIZE]>; 2];

/// Interpolation buffers and a trial prediction covering a coding unit.
pub(crate) struct McScratch<T> {
    hp: Box<HpBuffers>,
    tmp_pred: Yuv<T>,
}

impl<T: Pixel> McScratch<T> {
    pub(crate) fn new(cs: ChromaSampling) -> Self {
        McScratch {
            hp: Box::new([Aligned([0; MC_BUF_SIZE]), Aligned([0; MC_BUF_SIZE])]),
            tmp_pred: Yuv::new(MAX_CU_SIZE, MAX_CU_SIZE, cs, T::cast_from(0)),
        }
    }

    /// Motion compensates partition `g` of `cu` into `dst`.
    #[allow(clippy::too_many_arguments)]
    fn predict(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &CodingUnit,
        field: &MvField,
        g: &PartGeometry,
        dst: &mut Yuv<T>,
        planes: &[ColorPlane],
        bit_depth: usize,
    ) {
        motion_compensate(&mut self.hp, ctx, cu, field, g, dst, planes, bit_depth);
    }

    /// Motion compensates partition `g` of `cu` into the trial prediction.
    fn predict_tmp(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &CodingUnit,
        field: &MvField,
        g: &PartGeometry,
        planes: &[ColorPlane],
        bit_depth: usize,
    ) {
        motion_compensate(&mut self.hp, ctx, cu, field, g, &mut self.tmp_pred, planes, bit_depth);
    }
}

#[allow(clippy::too_many_arguments)]
fn motion_compensate<T: Pixel>(
    hp: &mut HpBuffers,
    ctx: &SliceContext<'_, T>,
    cu: &CodingUnit,
    field: &MvField,
    g: &PartGeometry,
    dst: &mut Yuv<T>,
    planes: &[ColorPlane],
    bit_depth: usize,
) {
    for &plane in planes {
        let (xdec, ydec) = plane_shift(cu.chroma_sampling, plane);
        let rect = Rect::new(g.x >> xdec, g.y >> ydec, g.width >> xdec, g.height >> ydec);
        let (px, py) = ((cu.x + g.x) >> xdec, (cu.y + g.y) >> ydec);
        let n = rect.width * rect.height;

        let mut used = [false; 2];
        for list in 0..2 {
            let reference = usize::try_from(field.ref_idx[list])
                .ok()
                .and_then(|r| ctx.ref_pics[list].get(r));
            let Some(reference) = reference else {
                continue;
            };
            let pos = SubpelPos::new(px, py, field.mv[list], xdec, ydec, plane.is_luma());
            predict_hp(
                reference.plane(plane),
                pos,
                rect.width,
                rect.height,
                bit_depth,
                &mut hp[list][..n],
            );
            used[list] = true;
        }

        let mut dst = dst.plane_mut(plane).region_mut(rect);
        match used {
            [true, true] => store_bi(&hp[0][..n], &hp[1][..n], &mut dst, bit_depth),
            [true, false] => store_uni(&hp[0][..n], &mut dst, bit_depth),
            [false, true] => store_uni(&hp[1][..n], &mut dst, bit_depth),
            [false, false] => dst.fill(T::cast_from(1 << (bit_depth - 1))),
        }
    }
}

/// SATD of partition `g` over `planes`, or SAD where the block is not a
/// multiple of 4 samples.
fn part_distortion<T: Pixel>(
    cs: ChromaSampling,
    fenc: &Yuv<T>,
    pred: &Yuv<T>,
    g: &PartGeometry,
    planes: &[ColorPlane],
) -> u32 {
    planes
        .iter()
        .map(|&plane| {
            let (xdec, ydec) = plane_shift(cs, plane);
            let rect = Rect::new(g.x >> xdec, g.y >> ydec, g.width >> xdec, g.height >> ydec);
            let (w, h) = (rect.width, rect.height);
            let org = fenc.plane(plane).region(rect);
            let prd = pred.plane(plane).region(rect);
            if w % 4 == 0 && h % 4 == 0 {
                get_satd(&org, &prd, w, h)
            } else {
                get_sad(&org, &prd, w, h)
            }
        })
        .sum()
}

/// Picks the predictor of `mv` with the cheaper difference. Ties keep index
/// 0.
pub(crate) fn check_best_mvp(amvp: [MotionVector; AMVP_NUM_CANDS], mv: MotionVector) -> (u8, u32) {
    let bits0 = mvd_bits(mv - amvp[0]);
    let bits1 = mvd_bits(mv - amvp[1]);
    if bits1 < bits0 { (1, bits1) } else { (0, bits0) }
}

/// Identity of a merge candidate list: the partition, and the motion of the
/// first partition that the second one depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergeKey {
    poc: i32,
    x: usize,
    y: usize,
    log2_size: usize,
    abs_part_idx: usize,
    width: usize,
    height: usize,
    first: Option<MvField>,
}

/// Merge candidates of the last partition they were derived for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeData {
    key: MergeKey,
    cands: ArrayVec<MvField, MRG_MAX_NUM_CANDS>,
}

impl MergeData {
    /// Merge candidates, in merge index order.
    #[inline]
    pub fn candidates(&self) -> &[MvField] {
        &self.cands
    }
}

/// Winner of the merge estimation of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergeChoice {
    pub idx: usize,
    pub field: MvField,
    pub cost: u64,
}

impl<T: Pixel> Search<T> {
    /// Merge candidates of partition `part_idx`, reused while the partition
    /// and its dependencies are unchanged.
    pub(crate) fn get_merge_cands(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &CodingUnit,
        part_idx: usize,
    ) -> ArrayVec<MvField, MRG_MAX_NUM_CANDS> {
        let g = cu.part_size.geometry(part_idx, cu.size());
        let key = MergeKey {
            poc: ctx.poc,
            x: cu.x,
            y: cu.y,
            log2_size: cu.log2_size,
            abs_part_idx: g.abs_part_idx,
            width: g.width,
            height: g.height,
            first: (part_idx == 1).then_some(cu.motion[0].field),
        };
        if let Some(data) = &self.merge_cache {
            if data.key == key {
                return data.cands.clone();
            }
        }
        let cands = merge_candidates(cu, part_idx, &ctx.candidate_context(), self.cfg.max_num_merge_cand);
        self.merge_cache = Some(MergeData {
            key,
            cands: cands.clone(),
        });
        cands
    }

    /// Whether a merge candidate reads reference rows that a concurrently
    /// encoded picture may not have reconstructed yet.
    fn exceeds_parallel_lag(&self, field: &MvField) -> bool {
        if !self.cfg.frame_parallel {
            return false;
        }
        let limit = ((self.cfg.search_range + 1) * 4) as i32;
        (0..2).any(|l| field.uses_list(l) && i32::from(field.mv[l].row) >= limit)
    }

    /// Picks the merge candidate of partition `part_idx` with the cheapest
    /// prediction error plus index bits.
    pub(crate) fn merge_estimation(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &CodingUnit,
        part_idx: usize,
        fenc: &Yuv<T>,
        chroma: bool,
    ) -> Option<MergeChoice> {
        let g = cu.part_size.geometry(part_idx, cu.size());
        let cands = self.get_merge_cands(ctx, cu, part_idx);
        let num_cands = cands.len();
        let planes: &[ColorPlane] = if chroma { cu.planes() } else { &ColorPlane::ALL[..1] };
        let bi_allowed = g.width + g.height != 12;

        let mut best: Option<MergeChoice> = None;
        for (idx, cand) in cands.iter().enumerate() {
            if self.exceeds_parallel_lag(cand) {
                continue;
            }
            let field = if bi_allowed || !cand.is_bi() {
                *cand
            } else {
                cand.to_list0()
            };
            self.mc
                .predict_tmp(ctx, cu, &field, &g, planes, self.cfg.bit_depth);
            self.stats.motion_compensations += 1;
            let dist = part_distortion(cu.chroma_sampling, fenc, &self.mc.tmp_pred, &g, planes);
            let cost = u64::from(dist) + self.rd.sad_cost(get_tu_bits(idx, num_cands));
            if best.is_none_or(|b| cost < b.cost) {
                best = Some(MergeChoice { idx, field, cost });
            }
        }
        best
    }

    /// Motion search of partition `part_idx` in one reference picture.
    ///
    /// The predictor is the AMVP candidate whose own prediction matches the
    /// source best; the search starts from it, the other candidate and the
    /// zero vector.
    #[allow(clippy::too_many_arguments)]
    fn explicit_search(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &CodingUnit,
        part_idx: usize,
        fenc: &Yuv<T>,
        list: usize,
        ref_idx: usize,
        blk_bits: u32,
    ) -> Option<MotionData> {
        let reference = ctx.ref_pics[list].get(ref_idx)?;
        let g = cu.part_size.geometry(part_idx, cu.size());
        let amvp = amvp_candidates(cu, part_idx, list, ref_idx, &ctx.candidate_context());
        let luma = reference.plane(ColorPlane::Y);
        let max_row = self.cfg.frame_parallel.then_some(self.cfg.search_range);

        let mut me = MeContext {
            org: fenc.plane(ColorPlane::Y).region(Rect::new(g.x, g.y, g.width, g.height)),
            reference: luma,
            x: cu.x + g.x,
            y: cu.y + g.y,
            w: g.width,
            h: g.height,
            bit_depth: self.cfg.bit_depth,
            rd: &self.rd,
            mvp: MotionVector::ZERO,
            mv_min: MotionVector::new(MV_MIN as i16, MV_MIN as i16),
            mv_max: MotionVector::new(MV_MAX as i16, MV_MAX as i16),
            hp: &mut self.mc.hp[0][..],
            tmp: self.mc.tmp_pred.plane_mut(ColorPlane::Y),
            candidates: 0,
        };

        let mvp_idx = if amvp[0] == amvp[1] {
            0
        } else {
            let d0 = me.subpel_rd(amvp[0]).dist;
            let d1 = me.subpel_rd(amvp[1]).dist;
            usize::from(d1 < d0)
        };
        let mvp = amvp[mvp_idx];
        let (mv_min, mv_max) =
            set_search_range(cu, mvp, self.cfg.search_range, luma.width(), luma.height(), max_row);
        me.mvp = mvp;
        me.mv_min = mv_min;
        me.mv_max = mv_max;

        let starts = [mvp, amvp[1 - mvp_idx], MotionVector::ZERO];
        let result = me.motion_search(
            self.cfg.search_method,
            &starts,
            self.cfg.search_range,
            self.cfg.subpel_refine,
        );
        let evaluated = me.candidates;
        self.stats.me_candidates += evaluated;
        if result.is_empty() {
            return None;
        }

        let (mvp_idx, mvd_bits) = check_best_mvp(amvp, result.mv);
        let bits = blk_bits + MVP_IDX_BITS + get_tu_bits(ref_idx, ctx.num_refs(list)) + mvd_bits;
        trace!(
            "me list {} ref {} part {}: mv {:?} mvp {} bits {} ({} vectors)",
            list, ref_idx, part_idx, result.mv, mvp_idx, bits, evaluated
        );
        Some(MotionData {
            mv: result.mv,
            mvp: amvp[usize::from(mvp_idx)],
            mvp_idx,
            ref_idx: ref_idx as i8,
            cost: u64::from(result.rd.dist) + self.rd.sad_cost(bits),
            bits,
        })
    }

    /// Best explicit motion of a partition: per list the cheapest reference,
    /// then uni- or bi-prediction. Returns the motion and its cost, and
    /// updates `last_mode` with the chosen direction.
    fn pred_inter_search(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &CodingUnit,
        part_idx: usize,
        fenc: &Yuv<T>,
        last_mode: &mut usize,
    ) -> Option<(PuMotion, u64)> {
        let g = cu.part_size.geometry(part_idx, cu.size());
        let p_slice = ctx.slice_type == SliceType::P;
        let blk = get_blk_bits(cu.part_size, p_slice, part_idx, *last_mode);

        let mut uni: [Option<MotionData>; 2] = [None, None];
        for list in 0..ctx.slice_type.num_lists() {
            for ref_idx in 0..ctx.num_refs(list) {
                let Some(md) = self.explicit_search(ctx, cu, part_idx, fenc, list, ref_idx, blk[list]) else {
                    continue;
                };
                if uni[list].is_none_or(|b| md.cost < b.cost) {
                    uni[list] = Some(md);
                }
            }
        }

        let motion_of = |mds: &[(usize, MotionData)]| {
            let mut pu = PuMotion::default();
            for &(list, md) in mds {
                pu.field.mv[list] = md.mv;
                pu.field.ref_idx[list] = md.ref_idx;
                pu.mvp_idx[list] = md.mvp_idx;
                pu.mvd[list] = md.mv - md.mvp;
            }
            pu
        };

        let bi = match uni {
            [Some(b0), Some(b1)]
                if ctx.slice_type == SliceType::B && self.cfg.bframe_bipred && g.width + g.height != 12 =>
            {
                let pu = motion_of(&[(0, b0), (1, b1)]);
                self.mc
                    .predict_tmp(ctx, cu, &pu.field, &g, &ColorPlane::ALL[..1], self.cfg.bit_depth);
                self.stats.motion_compensations += 1;
                let satd = part_distortion(
                    cu.chroma_sampling,
                    fenc,
                    &self.mc.tmp_pred,
                    &g,
                    &ColorPlane::ALL[..1],
                );
                let bits = (b0.bits + b1.bits + blk[2]).saturating_sub(blk[0] + blk[1]);
                Some((pu, u64::from(satd) + self.rd.sad_cost(bits)))
            }
            _ => None,
        };

        let cost0 = uni[0].map_or(u64::MAX, |m| m.cost);
        let cost1 = uni[1].map_or(u64::MAX, |m| m.cost);
        let choice = match (bi, uni) {
            (Some((pu, cost)), _) if cost < cost0 && cost < cost1 => {
                *last_mode = 2;
                (pu, cost)
            }
            (_, [Some(m0), _]) if cost0 <= cost1 => {
                *last_mode = 0;
                (motion_of(&[(0, m0)]), cost0)
            }
            (_, [_, Some(m1)]) => {
                *last_mode = 1;
                (motion_of(&[(1, m1)]), cost1)
            }
            _ => return None,
        };
        Some(choice)
    }

    /// Codes the prediction syntax of an inter coding unit that is not
    /// skipped.
    fn code_inter_header(&mut self, ctx: &SliceContext<'_, T>, cu: &CodingUnit) {
        self.entropy.code_skip_flag(false, cu.skip_ctx());
        self.entropy.code_pred_mode(false);
        self.entropy
            .code_part_size(cu.part_size, false, cu.log2_size, self.cfg.enable_amp);
        for part in 0..cu.part_size.num_parts() {
            let m = cu.motion[part];
            self.entropy.code_merge_flag(m.merge);
            if m.merge {
                self.entropy
                    .code_merge_idx(usize::from(m.merge_idx), self.cfg.max_num_merge_cand);
                continue;
            }
            if ctx.slice_type == SliceType::B {
                let g = cu.part_size.geometry(part, cu.size());
                self.entropy
                    .code_inter_dir(m.field.inter_dir(), g.width, g.height, cu.depth);
            }
            for list in 0..2 {
                if !m.field.uses_list(list) {
                    continue;
                }
                self.entropy
                    .code_ref_idx(m.field.ref_idx[list] as usize, ctx.num_refs(list));
                self.entropy.code_mvd(m.mvd[list]);
                self.entropy.code_mvp_idx(m.mvp_idx[list]);
            }
        }
    }

    fn code_skip(&mut self, cu: &CodingUnit) {
        self.entropy.code_skip_flag(true, cu.skip_ctx());
        self.entropy
            .code_merge_idx(usize::from(cu.motion[0].merge_idx), self.cfg.max_num_merge_cand);
    }

    /// Codes the residual of a motion compensated coding unit.
    ///
    /// The residual quad-tree is searched, then coding it is weighed against
    /// dropping it; the empty residual wins ties, and a 2Nx2N merge without
    /// residual becomes a skip. `out.pred` must hold the prediction.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub(crate) fn encode_res_and_calc_rd_inter_cu(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
    ) -> ModeCost {
        let start = self.entropy.checkpoint();
        let area = Rect::new(0, 0, cu.size(), cu.size());
        cu.skip = false;
        for &plane in cu.planes() {
            subtract(
                &fenc.region_for(plane, area),
                &out.pred.region_for(plane, area),
                &mut self.cu_resi.region_for_mut(plane, area),
            );
        }
        let log2 = cu.log2_size;
        let range = self.tu_depth_range(cu, false);
        let qt = self.estimate_residual_qt(cu, fenc, &out.pred, 0, 0, log2, range);

        let merge_skip = cu.part_size == PartSize::SIZE_2Nx2N && cu.motion[0].merge;
        let zero_psy = self.recon_psy(cu, fenc, &out.pred);
        self.entropy.rollback(&start);
        let frac_start = self.entropy.frac_bits();
        if merge_skip {
            self.code_skip(cu);
        } else {
            self.code_inter_header(ctx, cu);
            self.entropy.code_root_cbf(false);
        }
        let zero_bits = frac_to_bits(self.entropy.frac_bits() - frac_start);
        let zero_cost = self.rd.calc_psy_rd_cost(qt.zero_dist, zero_bits, zero_psy);

        let residual_cost = if cu.root_cbf() {
            self.set_residual_qt_data(cu, None, 0, 0, log2);
            self.entropy.rollback(&start);
            let frac_start = self.entropy.frac_bits();
            self.code_inter_header(ctx, cu);
            self.entropy.code_root_cbf(true);
            for &plane in cu.planes() {
                self.encode_residual_qt(cu, 0, 0, log2, range, plane);
            }
            let bits = frac_to_bits(self.entropy.frac_bits() - frac_start);
            self.rd.calc_psy_rd_cost(qt.dist, bits, qt.psy)
        } else {
            u64::MAX
        };

        if zero_cost <= residual_cost {
            cu.clear_residual();
            cu.skip = merge_skip;
            for &plane in cu.planes() {
                out.resi.plane_mut(plane).fill(0);
            }
            out.recon.copy_area_from(&out.pred, area);
        } else {
            self.set_residual_qt_data(cu, Some(&mut out.resi), 0, 0, log2);
            for &plane in cu.planes() {
                reconstruct(
                    &out.pred.region_for(plane, area),
                    &out.resi.region_for(plane, area),
                    &mut out.recon.region_for_mut(plane, area),
                    self.cfg.bit_depth,
                );
            }
        }

        self.entropy.rollback(&start);
        let frac_start = self.entropy.frac_bits();
        if cu.skip {
            self.code_skip(cu);
        } else {
            self.code_inter_header(ctx, cu);
            let root = cu.root_cbf();
            self.entropy.code_root_cbf(root);
            if root {
                for &plane in cu.planes() {
                    self.encode_residual_qt(cu, 0, 0, log2, range, plane);
                }
            }
        }
        let bits = frac_to_bits(self.entropy.frac_bits() - frac_start);
        let distortion = self.recon_distortion(cu, fenc, &out.recon);
        let psy = self.recon_psy(cu, fenc, &out.recon);
        ModeCost {
            cost: self.rd.calc_psy_rd_cost(distortion, bits, psy),
            bits,
            distortion,
        }
    }

    /// Codes `cu` as skipped: the prediction is the reconstruction.
    pub(crate) fn encode_res_and_calc_rd_skip_cu(
        &mut self,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
    ) -> ModeCost {
        let area = Rect::new(0, 0, cu.size(), cu.size());
        cu.skip = true;
        cu.clear_residual();
        for &plane in cu.planes() {
            out.resi.plane_mut(plane).fill(0);
        }
        out.recon.copy_area_from(&out.pred, area);

        let frac_start = self.entropy.frac_bits();
        self.code_skip(cu);
        let bits = frac_to_bits(self.entropy.frac_bits() - frac_start);
        let distortion = self.recon_distortion(cu, fenc, &out.recon);
        let psy = self.recon_psy(cu, fenc, &out.recon);
        ModeCost {
            cost: self.rd.calc_psy_rd_cost(distortion, bits, psy),
            bits,
            distortion,
        }
    }

    fn set_merge_motion(cu: &mut CodingUnit, idx: usize, field: MvField) {
        cu.motion[0] = PuMotion {
            field,
            merge: true,
            merge_idx: idx as u8,
            ..PuMotion::default()
        };
    }

    /// Tries every merge candidate of the 2Nx2N partition, both skipped and
    /// with a residual, and keeps the cheapest.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    #[inline]
    pub fn check_skip(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
    ) -> Option<ModeCost> {
        cu.reset(PredMode::Inter, PartSize::SIZE_2Nx2N);
        let g = cu.part_size.geometry(0, cu.size());
        let cands = self.get_merge_cands(ctx, cu, 0);
        let start = self.entropy.checkpoint();
        let bit_depth = self.cfg.bit_depth;

        let mut best: Option<(usize, bool, u64)> = None;
        for (idx, cand) in cands.iter().enumerate() {
            if self.exceeds_parallel_lag(cand) {
                continue;
            }
            for with_residual in [false, true] {
                cu.reset(PredMode::Inter, PartSize::SIZE_2Nx2N);
                Self::set_merge_motion(cu, idx, *cand);
                self.mc
                    .predict(ctx, cu, cand, &g, &mut out.pred, cu.planes(), bit_depth);
                self.stats.motion_compensations += 1;
                self.entropy.rollback(&start);
                let cost = if with_residual {
                    self.encode_res_and_calc_rd_inter_cu(ctx, cu, fenc, out)
                } else {
                    self.encode_res_and_calc_rd_skip_cu(cu, fenc, out)
                };
                trace!("merge {} residual={}: cost {}", idx, with_residual, cost.cost);
                if best.is_none_or(|(_, _, c)| cost.cost < c) {
                    best = Some((idx, with_residual, cost.cost));
                }
            }
        }

        let (idx, with_residual, _) = best?;
        cu.reset(PredMode::Inter, PartSize::SIZE_2Nx2N);
        Self::set_merge_motion(cu, idx, cands[idx]);
        self.mc
            .predict(ctx, cu, &cands[idx], &g, &mut out.pred, cu.planes(), bit_depth);
        self.stats.motion_compensations += 1;
        self.entropy.rollback(&start);
        let cost = if with_residual {
            self.encode_res_and_calc_rd_inter_cu(ctx, cu, fenc, out)
        } else {
            self.encode_res_and_calc_rd_skip_cu(cu, fenc, out)
        };
        debug!(
            "merge 2Nx2N at ({}, {}): candidate {} skip={} cost {}",
            cu.x, cu.y, idx, cu.skip, cost.cost
        );
        Some(cost)
    }

    /// Codes `cu` as inter with partitioning `part_size`.
    ///
    /// Each partition takes the cheaper of its best merge candidate and its
    /// best explicit motion, merge winning ties; with `merge_only` the
    /// explicit search is skipped. Returns `None` when no partition can be
    /// predicted.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    #[inline]
    pub fn check_inter(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        part_size: PartSize,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        merge_only: bool,
    ) -> Option<ModeCost> {
        if ctx.num_refs(0) == 0 {
            return None;
        }
        cu.reset(PredMode::Inter, part_size);
        let bit_depth = self.cfg.bit_depth;
        let mut last_mode = 0;

        for part in 0..part_size.num_parts() {
            let g = part_size.geometry(part, cu.size());
            let merge = self.merge_estimation(ctx, cu, part, fenc, true);
            let explicit = if merge_only {
                None
            } else {
                self.pred_inter_search(ctx, cu, part, fenc, &mut last_mode)
            };

            let motion = match (merge, explicit) {
                (Some(m), Some((_, cost))) if m.cost <= cost => PuMotion {
                    field: m.field,
                    merge: true,
                    merge_idx: m.idx as u8,
                    ..PuMotion::default()
                },
                (Some(m), None) => PuMotion {
                    field: m.field,
                    merge: true,
                    merge_idx: m.idx as u8,
                    ..PuMotion::default()
                },
                (_, Some((pu, _))) => pu,
                (None, None) => return None,
            };
            trace!(
                "{:?} part {} at ({}, {}): merge={} field {:?}",
                part_size, part, cu.x, cu.y, motion.merge, motion.field
            );
            cu.motion[part] = motion;
            self.mc
                .predict(ctx, cu, &motion.field, &g, &mut out.pred, cu.planes(), bit_depth);
            self.stats.motion_compensations += 1;
        }

        let cost = self.encode_res_and_calc_rd_inter_cu(ctx, cu, fenc, out);
        debug!(
            "inter {:?} at ({}, {}): cost {} bits {}",
            part_size, cu.x, cu.y, cost.cost, cost.bits
        );
        Some(cost)
    }

    /// Recomputes the coefficients and reconstruction of a decided coding
    /// unit along its transform tree, without any rate-distortion decision.
    ///
    /// Intra units are predicted again from their directions, inter units
    /// reuse the prediction in `out`, and skipped units are reconstructed from
    /// the prediction alone. The entropy state is left unchanged.
    #[inline]
    pub fn generate_coeff_recon(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
    ) {
        let log2 = cu.log2_size;
        if cu.pred_mode == PredMode::Intra {
            let start = self.entropy.checkpoint();
            for cbf in &mut cu.cbf {
                cbf.fill(0);
            }
            self.residual_transform_quant_intra(ctx, cu, fenc, out, 0, 0, log2);
            if cu.has_chroma() {
                self.recur_intra_chroma(ctx, cu, fenc, out, 0, 0, log2);
            }
            self.entropy.rollback(&start);
            return;
        }
        let area = Rect::new(0, 0, cu.size(), cu.size());
        if cu.skip {
            cu.clear_residual();
            for &plane in cu.planes() {
                out.resi.plane_mut(plane).fill(0);
            }
            out.recon.copy_area_from(&out.pred, area);
            return;
        }

        for &plane in cu.planes() {
            subtract(
                &fenc.region_for(plane, area),
                &out.pred.region_for(plane, area),
                &mut self.cu_resi.region_for_mut(plane, area),
            );
        }
        self.residual_transform_quant_inter(cu, &mut out.resi, 0, 0, log2);
        for &plane in cu.planes() {
            reconstruct(
                &out.pred.region_for(plane, area),
                &out.resi.region_for(plane, area),
                &mut out.recon.region_for_mut(plane, area),
                self.cfg.bit_depth,
            );
        }
    }
}
