//! Residual quad-tree search for inter coding units, and the walks that
//! materialize and signal a decided transform tree.
//!
//! Every node of the tree owns a disjoint region of the coefficient layer
//! that matches its size, so the no-split and split hypotheses of a node
//! never overwrite each other. The winner is copied into the coding unit
//! afterwards by [`Search::set_residual_qt_data`].

#[cfg(test)]
mod tests;

use std::ops::AddAssign;

use aligned::{A64, Aligned};
use log::trace;
use v_frame::pixel::{CastFromPrimitive, ChromaSampling, Pixel};

use super::{Search, SearchStats, tu_rect};
use crate::data::{
    block::{
        ColorPlane, DepthRange, MAX_CU_SIZE, MAX_TR_SIZE, MIN_TR_LOG2_SIZE, NUM_LAYERS, PartSize,
        chroma_shift,
    },
    cu::{CodingUnit, PredMode},
    entropy::{Entropy, frac_to_bits},
    plane::{PlaneBuf, PlaneRegion, PlaneRegionMut, Rect, Yuv},
    sad::{get_resi_energy, get_resi_sse},
    satd::psy_cost,
    transform::{QuantParams, chroma_qp, dequant, forward_transform, inverse_transform, quant},
};

/// Cost record of a transform subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct QtResult {
    /// Rate-distortion cost.
    pub cost: u64,
    /// Distortion, SSE weighted per plane.
    pub dist: u64,
    /// Signalling bits.
    pub bits: u32,
    /// Psycho-visual energy, zero unless psy-rd is enabled.
    pub psy: u64,
    /// Distortion of the subtree if every coefficient were zero.
    pub zero_dist: u64,
}

impl AddAssign for QtResult {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.cost += rhs.cost;
        self.dist += rhs.dist;
        self.bits += rhs.bits;
        self.psy += rhs.psy;
        self.zero_dist += rhs.zero_dist;
    }
}

/// Coefficients and reconstructed residual of one transform size.
#[derive(Debug, Clone)]
pub(crate) struct QtLayer {
    pub coeff: [Vec<i16>; 3],
    pub resi: Yuv<i16>,
}

/// Scratch coefficient layers, one per transform size from 4x4 to 32x32.
#[derive(Debug, Clone)]
pub struct QtLayers {
    layers: [QtLayer; NUM_LAYERS],
}

impl QtLayers {
    pub(crate) fn new(cs: ChromaSampling) -> Self {
        let luma = MAX_CU_SIZE * MAX_CU_SIZE;
        let chroma = match chroma_shift(cs) {
            Some((xdec, ydec)) => luma >> (xdec + ydec),
            None => 0,
        };
        QtLayers {
            layers: std::array::from_fn(|_| QtLayer {
                coeff: [vec![0; luma], vec![0; chroma], vec![0; chroma]],
                resi: Yuv::new(MAX_CU_SIZE, MAX_CU_SIZE, cs, 0),
            }),
        }
    }

    /// Layer holding the transform blocks of a node of `1 << log2` luma
    /// samples.
    #[inline]
    pub(crate) fn layer(&self, log2: usize) -> &QtLayer {
        &self.layers[log2 - MIN_TR_LOG2_SIZE]
    }

    #[inline]
    pub(crate) fn layer_mut(&mut self, log2: usize) -> &mut QtLayer {
        &mut self.layers[log2 - MIN_TR_LOG2_SIZE]
    }
}

/// Fixed-size buffers used while transforming one block.
pub(crate) struct TuScratch {
    resi: Box<Aligned<A64, [i16; MAX_TR_SIZE * MAX_TR_SIZE]>>,
    coeff: Box<Aligned<A64, [i32; MAX_TR_SIZE * MAX_TR_SIZE]>>,
    recon: Box<Aligned<A64, [i16; MAX_TR_SIZE * MAX_TR_SIZE]>>,
}

impl TuScratch {
    pub(crate) fn new() -> Self {
        TuScratch {
            resi: Box::new(Aligned([0; MAX_TR_SIZE * MAX_TR_SIZE])),
            coeff: Box::new(Aligned([0; MAX_TR_SIZE * MAX_TR_SIZE])),
            recon: Box::new(Aligned([0; MAX_TR_SIZE * MAX_TR_SIZE])),
        }
    }
}

/// Transforms, quantizes and reconstructs one square residual block.
///
/// Returns the number of nonzero levels. With none, `recon` is cleared and
/// the inverse transform is skipped.
pub(crate) fn transform_quant(
    scratch: &mut TuScratch,
    stats: &mut SearchStats,
    resi: &PlaneRegion<'_, i16>,
    params: QuantParams,
    dst: bool,
    levels: &mut [i16],
    recon: &mut PlaneRegionMut<'_, i16>,
) -> u32 {
    let log2 = params.log2;
    let n = 1usize << log2;
    debug_assert!(resi.width() == n && resi.height() == n);
    stats.transforms += 1;

    for (dst_row, src_row) in scratch.resi.chunks_exact_mut(n).zip(resi.rows_iter()) {
        dst_row.copy_from_slice(src_row);
    }
    forward_transform(
        &scratch.resi[..n * n],
        &mut scratch.coeff[..n * n],
        log2,
        dst,
        params.bit_depth,
    );
    let levels = &mut levels[..n * n];
    let num_sig = quant(&scratch.coeff[..n * n], levels, params);
    if num_sig == 0 {
        recon.fill(0);
        return 0;
    }
    dequant(levels, &mut scratch.coeff[..n * n], params);
    inverse_transform(
        &scratch.coeff[..n * n],
        &mut scratch.recon[..n * n],
        log2,
        dst,
        params.bit_depth,
    );
    for (dst_row, src_row) in recon.rows_iter_mut().zip(scratch.recon.chunks_exact(n)) {
        dst_row.copy_from_slice(src_row);
    }
    num_sig
}

/// `dst = fenc - pred`.
pub(crate) fn subtract<T: Pixel>(
    fenc: &PlaneRegion<'_, T>,
    pred: &PlaneRegion<'_, T>,
    dst: &mut PlaneRegionMut<'_, i16>,
) {
    for ((d, f), p) in dst.rows_iter_mut().zip(fenc.rows_iter()).zip(pred.rows_iter()) {
        for ((d, &f), &p) in d.iter_mut().zip(f).zip(p) {
            *d = (i32::cast_from(f) - i32::cast_from(p)) as i16;
        }
    }
}

/// `dst = clip(pred + resi)`.
pub(crate) fn reconstruct<T: Pixel>(
    pred: &PlaneRegion<'_, T>,
    resi: &PlaneRegion<'_, i16>,
    dst: &mut PlaneRegionMut<'_, T>,
    bit_depth: usize,
) {
    let max = (1i32 << bit_depth) - 1;
    for ((d, p), r) in dst.rows_iter_mut().zip(pred.rows_iter()).zip(resi.rows_iter()) {
        for ((d, &p), &r) in d.iter_mut().zip(p).zip(r) {
            *d = T::cast_from((i32::cast_from(p) + i32::from(r)).clamp(0, max));
        }
    }
}

/// Psycho-visual energy of `pred + resi` against the source block. `tmp`
/// must be at least as large as the block.
pub(crate) fn recon_psy_energy<T: Pixel>(
    fenc: &PlaneRegion<'_, T>,
    pred: &PlaneRegion<'_, T>,
    resi: &PlaneRegion<'_, i16>,
    tmp: &mut PlaneBuf<T>,
    zero: &PlaneBuf<T>,
    bit_depth: usize,
) -> u64 {
    let rect = Rect::new(0, 0, fenc.width(), fenc.height());
    reconstruct(pred, resi, &mut tmp.region_mut(rect), bit_depth);
    u64::from(psy_cost(fenc, &tmp.region(rect), &zero.as_region()))
}

/// Luma log2 size of the chroma transform blocks coded at a node, or `None`
/// when the node carries no chroma of its own.
#[inline]
pub(crate) fn chroma_log2(cs: ChromaSampling, log2: usize) -> Option<usize> {
    let (xdec, _) = chroma_shift(cs)?;
    if xdec == 1 && log2 == MIN_TR_LOG2_SIZE {
        None
    } else {
        Some(log2 - xdec)
    }
}

/// Whether chroma of an 8x8 node is coded at the node even when its luma
/// splits into 4x4 blocks.
#[inline]
pub(crate) fn chroma_shared(cs: ChromaSampling, log2: usize) -> bool {
    matches!(chroma_shift(cs), Some((1, _))) && log2 == MIN_TR_LOG2_SIZE + 1
}

/// Number of stacked square chroma blocks per transform unit.
#[inline]
pub(crate) fn chroma_sub_tus(cs: ChromaSampling) -> usize {
    if cs == ChromaSampling::Cs422 { 2 } else { 1 }
}

/// Rectangle and log2 size, in samples of `plane`, of sub-block `sub` of the
/// transform unit covering `luma` at a node of size `log2`.
#[inline]
pub(crate) fn block_rect(cs: ChromaSampling, plane: ColorPlane, luma: Rect, log2: usize, sub: usize) -> (Rect, usize) {
    if plane.is_luma() {
        return (luma, log2);
    }
    let Some(log2c) = chroma_log2(cs, log2) else {
        return (luma, log2);
    };
    let n = 1 << log2c;
    let (xdec, ydec) = chroma_shift(cs).unwrap_or((0, 0));
    (
        Rect::new(luma.x >> xdec, (luma.y >> ydec) + sub * n, n, n),
        log2c,
    )
}

/// Stores the flags of the two stacked 4:2:2 chroma blocks of a transform
/// unit: their OR at `tr_depth`, and each block's own flag one level down in
/// its half of the units.
pub(crate) fn offset_sub_tu_cbfs(
    cu: &mut CodingUnit,
    plane: ColorPlane,
    sub_cbf: [bool; 2],
    tr_depth: usize,
    abs_part_idx: usize,
    num_units: usize,
) {
    let half = num_units / 2;
    let combined = u8::from(sub_cbf[0] || sub_cbf[1]) << tr_depth;
    for (i, c) in cu.cbf[plane.index()][abs_part_idx..abs_part_idx + num_units]
        .iter_mut()
        .enumerate()
    {
        let sub = sub_cbf[usize::from(i >= half)];
        *c = combined | (u8::from(sub) << (tr_depth + 1));
    }
}

/// Flags of the sub-blocks of a chroma transform unit, read back from the
/// coding unit.
#[inline]
pub(crate) fn sub_tu_cbfs(
    cu: &CodingUnit,
    plane: ColorPlane,
    tr_depth: usize,
    abs_part_idx: usize,
    num_units: usize,
) -> [bool; 2] {
    if cu.chroma_sampling == ChromaSampling::Cs422 {
        [
            cu.cbf_at(plane, abs_part_idx, tr_depth + 1),
            cu.cbf_at(plane, abs_part_idx + num_units / 2, tr_depth + 1),
        ]
    } else {
        [cu.cbf_at(plane, abs_part_idx, tr_depth), false]
    }
}

/// Stores decided chroma flags of a transform unit.
pub(crate) fn store_chroma_cbfs(
    cu: &mut CodingUnit,
    plane: ColorPlane,
    sub_cbf: [bool; 2],
    tr_depth: usize,
    abs_part_idx: usize,
    num_units: usize,
) {
    if cu.chroma_sampling == ChromaSampling::Cs422 {
        offset_sub_tu_cbfs(cu, plane, sub_cbf, tr_depth, abs_part_idx, num_units);
    } else {
        cu.set_cbf_leaf(plane, sub_cbf[0], tr_depth, abs_part_idx, num_units);
    }
}

#[inline]
pub(crate) const fn units_of(log2: usize) -> usize {
    1 << (2 * (log2 - MIN_TR_LOG2_SIZE))
}

#[inline]
pub(crate) fn code_cbf(entropy: &mut Entropy, plane: ColorPlane, cbf: bool, tr_depth: usize) {
    if plane.is_luma() {
        entropy.code_cbf_luma(cbf, tr_depth);
    } else {
        entropy.code_cbf_chroma(cbf, tr_depth);
    }
}

/// Bits spent by `f`, with the coder state restored afterwards.
#[inline]
pub(crate) fn trial_bits(entropy: &mut Entropy, f: impl FnOnce(&mut Entropy)) -> u32 {
    let checkpoint = entropy.checkpoint();
    let start = entropy.frac_bits();
    f(entropy);
    let bits = frac_to_bits(entropy.frac_bits() - start);
    entropy.rollback(&checkpoint);
    bits
}

/// Decision for one transform block of one plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BlockTu {
    cbf: bool,
    dist: u64,
    zero_dist: u64,
    psy: u64,
}

/// Chroma blocks of a transform unit, per chroma plane and sub-block.
type ChromaTu = [[BlockTu; 2]; 2];

impl<T: Pixel> Search<T> {
    /// Transforms one block of `plane` into the layer of the node and keeps
    /// the cheaper of its quantized and all-zero versions.
    #[allow(clippy::too_many_arguments)]
    fn inter_block(
        &mut self,
        cu: &CodingUnit,
        fenc: &Yuv<T>,
        pred: &Yuv<T>,
        plane: ColorPlane,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
        sub: usize,
    ) -> BlockTu {
        let cs = cu.chroma_sampling;
        let bit_depth = self.cfg.bit_depth;
        let (rect, log2b) = block_rect(cs, plane, tu_rect(abs_part_idx, log2), log2, sub);
        let n2 = 1 << (2 * log2b);
        let off = cu.coeff_offset(plane, abs_part_idx) + sub * n2;

        let resi = self.cu_resi.plane(plane).region(rect);
        let layer = self.layers.layer_mut(log2);
        let levels = &mut layer.coeff[plane.index()][off..off + n2];
        let mut recon = layer.resi.plane_mut(plane).region_mut(rect);

        let psy_on = plane.is_luma() && self.rd.psy_enabled();
        let fenc_r = fenc.plane(plane).region(rect);
        let pred_r = pred.plane(plane).region(rect);
        let zero_psy = if psy_on {
            u64::from(psy_cost(&fenc_r, &pred_r, &self.zero.as_region()))
        } else {
            0
        };

        let energy = get_resi_energy(&resi);
        if energy == 0 {
            levels.fill(0);
            recon.fill(0);
            return BlockTu {
                psy: zero_psy,
                ..BlockTu::default()
            };
        }

        let qp = if plane.is_luma() {
            self.qp
        } else {
            chroma_qp(self.qp, cs)
        };
        let params = QuantParams::new(qp, log2b, bit_depth, false);
        let num_sig = transform_quant(
            &mut self.scratch,
            &mut self.stats,
            &resi,
            params,
            false,
            levels,
            &mut recon,
        );
        let zero_dist = self.rd.scale_chroma_dist(plane, energy);
        let zero = BlockTu {
            cbf: false,
            dist: zero_dist,
            zero_dist,
            psy: zero_psy,
        };
        if num_sig == 0 {
            return zero;
        }

        let dist = self
            .rd
            .scale_chroma_dist(plane, get_resi_sse(&resi, &recon.as_const()));
        let psy = if psy_on {
            recon_psy_energy(
                &fenc_r,
                &pred_r,
                &recon.as_const(),
                &mut self.tmp_recon,
                &self.zero,
                bit_depth,
            )
        } else {
            0
        };
        let nonzero_bits = trial_bits(&mut self.entropy, |e| {
            code_cbf(e, plane, true, tr_depth);
            e.code_coeff(&levels[..], log2b, plane.is_luma());
        });
        let zero_bits = trial_bits(&mut self.entropy, |e| code_cbf(e, plane, false, tr_depth));

        let nonzero_cost = self.rd.calc_psy_rd_cost(dist, nonzero_bits, psy);
        let zero_cost = self.rd.calc_psy_rd_cost(zero_dist, zero_bits, zero_psy);
        if zero_cost <= nonzero_cost {
            levels.fill(0);
            recon.fill(0);
            zero
        } else {
            BlockTu {
                cbf: true,
                dist,
                zero_dist,
                psy,
            }
        }
    }

    /// Codes a decided block from the layers into the entropy state.
    fn code_layer_block(
        &mut self,
        cu: &CodingUnit,
        plane: ColorPlane,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
        sub: usize,
        cbf: bool,
    ) {
        code_cbf(&mut self.entropy, plane, cbf, tr_depth);
        if cbf {
            let (_, log2b) = block_rect(cu.chroma_sampling, plane, Rect::default(), log2, sub);
            let n2 = 1 << (2 * log2b);
            let off = cu.coeff_offset(plane, abs_part_idx) + sub * n2;
            let levels = &self.layers.layer(log2).coeff[plane.index()][off..off + n2];
            self.entropy.code_coeff(levels, log2b, plane.is_luma());
        }
    }

    /// Decides and codes the chroma blocks of a node.
    fn inter_chroma(
        &mut self,
        cu: &CodingUnit,
        fenc: &Yuv<T>,
        pred: &Yuv<T>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
    ) -> ChromaTu {
        let mut chroma = ChromaTu::default();
        for (p, &plane) in ColorPlane::CHROMA.iter().enumerate() {
            for sub in 0..chroma_sub_tus(cu.chroma_sampling) {
                chroma[p][sub] = self.inter_block(cu, fenc, pred, plane, abs_part_idx, tr_depth, log2, sub);
            }
        }
        self.code_chroma(cu, &chroma, abs_part_idx, tr_depth, log2);
        chroma
    }

    fn code_chroma(&mut self, cu: &CodingUnit, chroma: &ChromaTu, abs_part_idx: usize, tr_depth: usize, log2: usize) {
        for (p, &plane) in ColorPlane::CHROMA.iter().enumerate() {
            for sub in 0..chroma_sub_tus(cu.chroma_sampling) {
                self.code_layer_block(cu, plane, abs_part_idx, tr_depth, log2, sub, chroma[p][sub].cbf);
            }
        }
    }

    /// Searches the residual quad-tree of the node at `abs_part_idx`.
    ///
    /// The residual to code is read from the search's residual buffer, filled
    /// with `fenc - pred` by the caller. Decisions are written to the transform
    /// depths and flags of `cu`; coefficients stay in the layers until
    /// [`Search::set_residual_qt_data`] runs. The entropy state is left as
    /// after coding the winning hypothesis.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn estimate_residual_qt(
        &mut self,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        pred: &Yuv<T>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
        range: DepthRange,
    ) -> QtResult {
        let cs = cu.chroma_sampling;
        let full = range.check_full(log2);
        let can_split = range.check_split(log2) && log2 > MIN_TR_LOG2_SIZE;
        let flag_coded = full && can_split;
        let num_units = units_of(log2);
        let own_chroma = chroma_log2(cs, log2).is_some();
        let shared = can_split && chroma_shared(cs, log2);

        let start = self.entropy.checkpoint();
        // Chroma shared by both hypotheses is decided once, from the state at
        // the node entry.
        let shared_chroma = if shared {
            let mut chroma = ChromaTu::default();
            for (p, &plane) in ColorPlane::CHROMA.iter().enumerate() {
                for sub in 0..chroma_sub_tus(cs) {
                    chroma[p][sub] = self.inter_block(cu, fenc, pred, plane, abs_part_idx, tr_depth, log2, sub);
                }
            }
            Some(chroma)
        } else {
            None
        };
        let chroma_sum = |chroma: &ChromaTu| {
            chroma
                .iter()
                .flatten()
                .fold((0u64, 0u64), |(d, z), b| (d + b.dist, z + b.zero_dist))
        };

        let mut no_split = None;
        if full {
            let frac_start = self.entropy.frac_bits();
            if flag_coded {
                self.entropy.code_split_transform(false, log2);
            }
            let luma = self.inter_block(cu, fenc, pred, ColorPlane::Y, abs_part_idx, tr_depth, log2, 0);
            self.code_layer_block(cu, ColorPlane::Y, abs_part_idx, tr_depth, log2, 0, luma.cbf);

            let chroma = match shared_chroma {
                Some(chroma) => {
                    self.code_chroma(cu, &chroma, abs_part_idx, tr_depth, log2);
                    Some(chroma)
                }
                None if own_chroma => Some(self.inter_chroma(cu, fenc, pred, abs_part_idx, tr_depth, log2)),
                None => None,
            };
            let (chroma_dist, chroma_zero) = chroma.as_ref().map_or((0, 0), chroma_sum);

            let bits = frac_to_bits(self.entropy.frac_bits() - frac_start);
            let dist = luma.dist + chroma_dist;
            let result = QtResult {
                cost: self.rd.calc_psy_rd_cost(dist, bits, luma.psy),
                dist,
                bits,
                psy: luma.psy,
                zero_dist: luma.zero_dist + chroma_zero,
            };

            cu.set_tr_idx(tr_depth, abs_part_idx, num_units);
            cu.set_cbf_leaf(ColorPlane::Y, luma.cbf, tr_depth, abs_part_idx, num_units);
            if let Some(chroma) = &chroma {
                for (p, &plane) in ColorPlane::CHROMA.iter().enumerate() {
                    let sub_cbf = [chroma[p][0].cbf, chroma[p][1].cbf];
                    store_chroma_cbfs(cu, plane, sub_cbf, tr_depth, abs_part_idx, num_units);
                }
            }
            no_split = Some((result, luma.cbf, chroma, self.entropy.checkpoint()));
        }

        if !can_split {
            debug_assert!(full);
            return no_split.map(|(result, ..)| result).unwrap_or_default();
        }

        if full {
            self.entropy.rollback(&start);
        }
        let frac_start = self.entropy.frac_bits();
        if flag_coded {
            self.entropy.code_split_transform(true, log2);
        }
        let mut own_frac = self.entropy.frac_bits() - frac_start;

        let child_units = num_units / 4;
        let mut children = QtResult::default();
        for i in 0..4 {
            let child = abs_part_idx + i * child_units;
            children += self.estimate_residual_qt(cu, fenc, pred, child, tr_depth + 1, log2 - 1, range);
        }

        let frac_children = self.entropy.frac_bits();
        let mut own_dist = 0;
        let mut own_zero = 0;
        if let Some(chroma) = &shared_chroma {
            self.code_chroma(cu, chroma, abs_part_idx, tr_depth, log2);
            (own_dist, own_zero) = chroma_sum(chroma);
        } else if own_chroma {
            for plane in ColorPlane::CHROMA {
                let any = (0..4).any(|i| cu.cbf_at(plane, abs_part_idx + i * child_units, tr_depth + 1));
                self.entropy.code_cbf_chroma(any, tr_depth);
            }
        }
        own_frac += self.entropy.frac_bits() - frac_children;
        let own_bits = frac_to_bits(own_frac);

        let split = QtResult {
            cost: children.cost + self.rd.calc_rd_cost(own_dist, own_bits),
            dist: children.dist + own_dist,
            bits: children.bits + own_bits,
            psy: children.psy,
            zero_dist: children.zero_dist + own_zero,
        };

        match no_split {
            Some((result, luma_cbf, chroma, checkpoint)) if result.cost <= split.cost => {
                trace!(
                    "residual qt: keep {}x{} at depth {} ({} <= {})",
                    1 << log2,
                    1 << log2,
                    tr_depth,
                    result.cost,
                    split.cost
                );
                self.entropy.rollback(&checkpoint);
                cu.set_tr_idx(tr_depth, abs_part_idx, num_units);
                cu.set_cbf_leaf(ColorPlane::Y, luma_cbf, tr_depth, abs_part_idx, num_units);
                if let Some(chroma) = &chroma {
                    for (p, &plane) in ColorPlane::CHROMA.iter().enumerate() {
                        let sub_cbf = [chroma[p][0].cbf, chroma[p][1].cbf];
                        store_chroma_cbfs(cu, plane, sub_cbf, tr_depth, abs_part_idx, num_units);
                    }
                }
                result
            }
            _ => {
                trace!(
                    "residual qt: split {}x{} at depth {} (cost {})",
                    1 << log2,
                    1 << log2,
                    tr_depth,
                    split.cost
                );
                let planes: &[ColorPlane] = if own_chroma && !shared {
                    &ColorPlane::ALL
                } else {
                    &ColorPlane::ALL[..1]
                };
                for &plane in planes {
                    let any = (0..4).any(|i| cu.cbf_at(plane, abs_part_idx + i * child_units, tr_depth + 1));
                    cu.or_cbf(plane, any, tr_depth, abs_part_idx, num_units);
                }
                if let Some(chroma) = &shared_chroma {
                    for (p, &plane) in ColorPlane::CHROMA.iter().enumerate() {
                        let sub_cbf = [chroma[p][0].cbf, chroma[p][1].cbf];
                        store_chroma_cbfs(cu, plane, sub_cbf, tr_depth, abs_part_idx, num_units);
                    }
                }
                split
            }
        }
    }

    /// Copies the coefficients of the decided transform tree from the layers
    /// into `cu`. With `resi` given, the reconstructed residual samples are
    /// copied as well.
    pub(crate) fn set_residual_qt_data(
        &self,
        cu: &mut CodingUnit,
        mut resi: Option<&mut Yuv<i16>>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
    ) {
        let cs = cu.chroma_sampling;
        let split = usize::from(cu.tr_idx[abs_part_idx]) > tr_depth;
        let luma_rect = tu_rect(abs_part_idx, log2);

        let copy = |cu: &mut CodingUnit, plane: ColorPlane, sub: usize, resi: Option<&mut Yuv<i16>>| {
            let layer = self.layers.layer(log2);
            let (rect, log2b) = block_rect(cs, plane, luma_rect, log2, sub);
            let n2 = 1 << (2 * log2b);
            let off = cu.coeff_offset(plane, abs_part_idx) + sub * n2;
            cu.coeff[plane.index()][off..off + n2].copy_from_slice(&layer.coeff[plane.index()][off..off + n2]);
            if let Some(resi) = resi {
                let src = layer.resi.plane(plane).region(rect);
                resi.plane_mut(plane).region_mut(rect).copy_from(&src);
            }
        };

        if !split {
            copy(cu, ColorPlane::Y, 0, resi.as_deref_mut());
        }
        let chroma_here = if split {
            chroma_shared(cs, log2)
        } else {
            chroma_log2(cs, log2).is_some()
        };
        if chroma_here {
            for plane in ColorPlane::CHROMA {
                for sub in 0..chroma_sub_tus(cs) {
                    copy(cu, plane, sub, resi.as_deref_mut());
                }
            }
        }
        if split {
            let child_units = units_of(log2) / 4;
            for i in 0..4 {
                self.set_residual_qt_data(
                    cu,
                    resi.as_deref_mut(),
                    abs_part_idx + i * child_units,
                    tr_depth + 1,
                    log2 - 1,
                );
            }
        }
    }

    /// Codes the transform tree of one plane from the coefficients stored in
    /// `cu`: split flags and luma flags for luma, the chroma flag hierarchy
    /// for chroma, and the coefficients of coded leaves.
    pub(crate) fn encode_residual_qt(
        &mut self,
        cu: &CodingUnit,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
        range: DepthRange,
        plane: ColorPlane,
    ) {
        let cs = cu.chroma_sampling;
        let split = usize::from(cu.tr_idx[abs_part_idx]) > tr_depth;
        let num_units = units_of(log2);
        let child_units = num_units / 4;

        if plane.is_luma() {
            let implicit = cu.pred_mode == PredMode::Intra
                && cu.part_size == PartSize::SIZE_NxN
                && tr_depth == 0;
            if range.check_full(log2) && range.check_split(log2) && !implicit {
                self.entropy.code_split_transform(split, log2);
            }
            if split {
                for i in 0..4 {
                    self.encode_residual_qt(cu, abs_part_idx + i * child_units, tr_depth + 1, log2 - 1, range, plane);
                }
                return;
            }
            let cbf = cu.cbf_at(plane, abs_part_idx, tr_depth);
            let coded = cu.pred_mode == PredMode::Intra
                || tr_depth != 0
                || cu.cbf_at(ColorPlane::Cb, abs_part_idx, 0)
                || cu.cbf_at(ColorPlane::Cr, abs_part_idx, 0);
            if coded {
                self.entropy.code_cbf_luma(cbf, tr_depth);
            }
            if cbf {
                let n2 = 1 << (2 * log2);
                let off = cu.coeff_offset(plane, abs_part_idx);
                self.entropy.code_coeff(&cu.coeff[0][off..off + n2], log2, true);
            }
            return;
        }

        let shared = split && chroma_shared(cs, log2);
        if chroma_log2(cs, log2).is_none() && !shared {
            return;
        }
        let leaf = !split || shared;
        let parent_set = tr_depth == 0 || cu.cbf_at(plane, abs_part_idx, tr_depth - 1);
        let sub_cbf = sub_tu_cbfs(cu, plane, tr_depth, abs_part_idx, num_units);
        if parent_set {
            if leaf && cs == ChromaSampling::Cs422 {
                self.entropy.code_cbf_chroma(sub_cbf[0], tr_depth);
                self.entropy.code_cbf_chroma(sub_cbf[1], tr_depth);
            } else {
                self.entropy.code_cbf_chroma(cu.cbf_at(plane, abs_part_idx, tr_depth), tr_depth);
            }
        }
        if leaf {
            for (sub, &cbf) in sub_cbf.iter().enumerate().take(chroma_sub_tus(cs)) {
                if cbf {
                    let (_, log2b) = block_rect(cs, plane, Rect::default(), log2, sub);
                    let n2 = 1 << (2 * log2b);
                    let off = cu.coeff_offset(plane, abs_part_idx) + sub * n2;
                    self.entropy.code_coeff(&cu.coeff[plane.index()][off..off + n2], log2b, false);
                }
            }
        } else if cu.cbf_at(plane, abs_part_idx, tr_depth) {
            for i in 0..4 {
                self.encode_residual_qt(cu, abs_part_idx + i * child_units, tr_depth + 1, log2 - 1, range, plane);
            }
        }
    }

    /// Transforms and quantizes the residual buffer along the transform tree
    /// already decided in `cu`, without rate-distortion decisions. Flags
    /// follow the quantized levels.
    pub(crate) fn residual_transform_quant_inter(
        &mut self,
        cu: &mut CodingUnit,
        resi_out: &mut Yuv<i16>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
    ) {
        let cs = cu.chroma_sampling;
        let split = usize::from(cu.tr_idx[abs_part_idx]) > tr_depth;
        let num_units = units_of(log2);
        let luma_rect = tu_rect(abs_part_idx, log2);

        let mut code = |this: &mut Self, cu: &mut CodingUnit, plane: ColorPlane, sub: usize| -> bool {
            let (rect, log2b) = block_rect(cs, plane, luma_rect, log2, sub);
            let n2 = 1 << (2 * log2b);
            let off = cu.coeff_offset(plane, abs_part_idx) + sub * n2;
            let resi = this.cu_resi.plane(plane).region(rect);
            let levels = &mut cu.coeff[plane.index()][off..off + n2];
            let mut recon = resi_out.plane_mut(plane).region_mut(rect);
            if get_resi_energy(&resi) == 0 {
                levels.fill(0);
                recon.fill(0);
                return false;
            }
            let qp = if plane.is_luma() { this.qp } else { chroma_qp(this.qp, cs) };
            let params = QuantParams::new(qp, log2b, this.cfg.bit_depth, false);
            transform_quant(&mut this.scratch, &mut this.stats, &resi, params, false, levels, &mut recon) > 0
        };

        if !split {
            let cbf = code(self, cu, ColorPlane::Y, 0);
            cu.set_tr_idx(tr_depth, abs_part_idx, num_units);
            cu.set_cbf_leaf(ColorPlane::Y, cbf, tr_depth, abs_part_idx, num_units);
        }
        let chroma_here = if split {
            chroma_shared(cs, log2)
        } else {
            chroma_log2(cs, log2).is_some()
        };
        if chroma_here {
            for plane in ColorPlane::CHROMA {
                let mut sub_cbf = [false; 2];
                for (sub, cbf) in sub_cbf.iter_mut().enumerate().take(chroma_sub_tus(cs)) {
                    *cbf = code(self, cu, plane, sub);
                }
                store_chroma_cbfs(cu, plane, sub_cbf, tr_depth, abs_part_idx, num_units);
            }
        }
        if split {
            let child_units = num_units / 4;
            for i in 0..4 {
                self.residual_transform_quant_inter(cu, resi_out, abs_part_idx + i * child_units, tr_depth + 1, log2 - 1);
            }
            let planes: &[ColorPlane] = if chroma_log2(cs, log2).is_some() && !chroma_here {
                &ColorPlane::ALL
            } else {
                &ColorPlane::ALL[..1]
            };
            for &plane in planes {
                let any = (0..4).any(|i| cu.cbf_at(plane, abs_part_idx + i * child_units, tr_depth + 1));
                cu.or_cbf(plane, any, tr_depth, abs_part_idx, num_units);
            }
        }
    }
}
