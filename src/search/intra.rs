//! Intra mode search: luma direction ranking and transform tree, then the
//! chroma mode along the decided tree.

#[cfg(test)]
mod tests;

use std::mem;

use log::{debug, trace};
use v_frame::pixel::{CastFromPrimitive, ChromaSampling, Pixel};

use super::{
    ModeBuffers,
    ModeCost,
    Search,
    SliceContext,
    bits::CandList,
    residual::{
        block_rect,
        chroma_log2,
        chroma_shared,
        chroma_sub_tus,
        reconstruct,
        store_chroma_cbfs,
        subtract,
        transform_quant,
        trial_bits,
        units_of,
    },
    tu_rect,
};
use crate::data::{
    block::{
        ColorPlane, DepthRange, MAX_TR_LOG2_SIZE, MAX_TR_SIZE, MIN_TR_LOG2_SIZE, NUM_LAYERS, PartSize,
        plane_shift,
    },
    cu::{CodingUnit, PredMode},
    entropy::{EntropyCheckpoint, frac_to_bits},
    plane::{PlaneBuf, PlaneRegionMut, Rect, Yuv},
    prediction::{
        DM_CHROMA_IDX, NUM_INTRA_MODES, chroma_candidates, derive_chroma_mode, edge_len,
        filter_reference, predict_intra, substitute_reference, use_filtered_reference,
    },
    sad::{get_resi_energy, get_sse},
    satd::{get_satd, psy_cost},
    transform::{QuantParams, chroma_qp},
};

/// Cost record of an intra transform subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NodeCost {
    pub cost: u64,
    pub dist: u64,
    pub bits: u32,
    pub psy: u64,
}

/// No-split hypothesis of an intra luma node, kept while the split is
/// evaluated.
struct QtSave<T> {
    coeff: Vec<i16>,
    recon: PlaneBuf<T>,
    resi: PlaneBuf<i16>,
    cbf: bool,
    checkpoint: Option<EntropyCheckpoint>,
}

impl<T: Pixel> Default for QtSave<T> {
    fn default() -> Self {
        QtSave {
            coeff: Vec::new(),
            recon: PlaneBuf::new(0, 0, T::cast_from(0)),
            resi: PlaneBuf::new(0, 0, 0),
            cbf: false,
            checkpoint: None,
        }
    }
}

impl<T: Pixel> QtSave<T> {
    fn allocated() -> Self {
        QtSave {
            coeff: vec![0; MAX_TR_SIZE * MAX_TR_SIZE],
            recon: PlaneBuf::new(MAX_TR_SIZE, MAX_TR_SIZE, T::cast_from(0)),
            resi: PlaneBuf::new(MAX_TR_SIZE, MAX_TR_SIZE, 0),
            cbf: false,
            checkpoint: None,
        }
    }

    fn store(&mut self, cu: &CodingUnit, out: &ModeBuffers<T>, abs_part_idx: usize, log2: usize) {
        let rect = tu_rect(abs_part_idx, log2);
        let local = Rect::new(0, 0, rect.width, rect.height);
        let n2 = 1 << (2 * log2);
        let off = cu.coeff_offset(ColorPlane::Y, abs_part_idx);
        self.coeff[..n2].copy_from_slice(&cu.coeff[0][off..off + n2]);
        self.recon
            .region_mut(local)
            .copy_from(&out.recon.plane(ColorPlane::Y).region(rect));
        self.resi
            .region_mut(local)
            .copy_from(&out.resi.plane(ColorPlane::Y).region(rect));
    }

    fn restore(&self, cu: &mut CodingUnit, out: &mut ModeBuffers<T>, abs_part_idx: usize, log2: usize) {
        let rect = tu_rect(abs_part_idx, log2);
        let local = Rect::new(0, 0, rect.width, rect.height);
        let n2 = 1 << (2 * log2);
        let off = cu.coeff_offset(ColorPlane::Y, abs_part_idx);
        cu.coeff[0][off..off + n2].copy_from_slice(&self.coeff[..n2]);
        out.recon
            .plane_mut(ColorPlane::Y)
            .region_mut(rect)
            .copy_from(&self.recon.region(local));
        out.resi
            .plane_mut(ColorPlane::Y)
            .region_mut(rect)
            .copy_from(&self.resi.region(local));
    }
}

/// Reference edges and saved hypotheses of the intra search.
pub(crate) struct IntraScratch<T> {
    edge: Vec<i32>,
    filtered: Vec<i32>,
    avail: Vec<bool>,
    /// One slot per transform depth.
    saves: Vec<QtSave<T>>,
    /// Trial prediction of the ranking passes.
    pred: PlaneBuf<T>,
}

impl<T: Pixel> IntraScratch<T> {
    pub(crate) fn new() -> Self {
        let len = edge_len(MAX_TR_LOG2_SIZE);
        IntraScratch {
            edge: vec![0; len],
            filtered: vec![0; len],
            avail: vec![false; len],
            saves: (0..=NUM_LAYERS).map(|_| QtSave::allocated()).collect(),
            pred: PlaneBuf::new(MAX_TR_SIZE, MAX_TR_SIZE, T::cast_from(0)),
        }
    }

    /// Gathers and substitutes the reference edge of the square block `rect`
    /// of `plane`, given in samples of that plane relative to the coding unit.
    ///
    /// Samples outside the coding unit come from `outer`, the reconstruction
    /// of the picture, when the neighbour unit holding them exists. Inside the
    /// coding unit, units before `start_z` in z-order are read from `inner`,
    /// as are samples of the transform unit `start_z..start_z + tu_units`
    /// above the block.
    #[allow(clippy::too_many_arguments)]
    fn build_edge(
        &mut self,
        cu: &CodingUnit,
        outer: &Yuv<T>,
        inner: &Yuv<T>,
        plane: ColorPlane,
        rect: Rect,
        start_z: usize,
        tu_units: usize,
        bit_depth: usize,
    ) {
        let n = rect.width;
        let len = edge_len(n.trailing_zeros() as usize);
        let corner = 2 * n;
        let (xdec, ydec) = plane_shift(cu.chroma_sampling, plane);
        let outer = outer.plane(plane);
        let inner = inner.plane(plane);
        let (ox, oy) = ((cu.x >> xdec) as isize, (cu.y >> ydec) as isize);
        let cu_size = cu.size() as isize;
        let (bx, by) = (rect.x as isize, rect.y as isize);

        let sample_at = |px: isize, py: isize| -> Option<i32> {
            let dx = if px < 0 { -1 } else { px << xdec };
            let dy = if py < 0 { -1 } else { py << ydec };
            if dx < 0 || dy < 0 {
                cu.neighbors.unit_at(dx, dy)?;
                let (x, y) = (ox + px, oy + py);
                if x < 0 || y < 0 || x >= outer.width() as isize || y >= outer.height() as isize {
                    return None;
                }
                return Some(i32::cast_from(outer[y as usize][x as usize]));
            }
            if dx >= cu_size || dy >= cu_size {
                return None;
            }
            let z = cu.zscan_at(dx as usize, dy as usize);
            let above_in_tu = (start_z..start_z + tu_units).contains(&z) && py < by;
            (z < start_z || above_in_tu).then(|| i32::cast_from(inner[py as usize][px as usize]))
        };

        for i in 0..len {
            let (px, py) = match i {
                _ if i < corner => (bx - 1, by + (corner - 1 - i) as isize),
                _ if i == corner => (bx - 1, by - 1),
                _ => (bx + (i - corner - 1) as isize, by - 1),
            };
            match sample_at(px, py) {
                Some(v) => {
                    self.edge[i] = v;
                    self.avail[i] = true;
                }
                None => self.avail[i] = false,
            }
        }
        substitute_reference(&mut self.edge[..len], &self.avail[..len], bit_depth);
    }

    /// Predicts a block from the last built edge. `mode` is the direction
    /// actually used, after chroma derivation.
    fn predict(
        &mut self,
        plane: ColorPlane,
        cs: ChromaSampling,
        log2: usize,
        mode: u8,
        dst: &mut PlaneRegionMut<'_, T>,
        bit_depth: usize,
    ) {
        let len = edge_len(log2);
        let smooth = (plane.is_luma() || cs == ChromaSampling::Cs444) && use_filtered_reference(mode, log2);
        let edge = if smooth {
            filter_reference(&self.edge[..len], &mut self.filtered[..len]);
            &self.filtered[..len]
        } else {
            &self.edge[..len]
        };
        predict_intra(edge, dst, log2, mode, plane.is_luma(), bit_depth);
    }
}

/// Square tiles of at most 32x32 covering `area`, in z-order, with the luma
/// position of each tile.
fn tiles(area: Rect, xdec: usize, ydec: usize) -> impl Iterator<Item = (Rect, usize, usize)> {
    let t = area.width.min(area.height).min(MAX_TR_SIZE);
    (0..area.height / t).flat_map(move |ty| {
        (0..area.width / t).map(move |tx| {
            let r = Rect::new(area.x + tx * t, area.y + ty * t, t, t);
            (r, r.x << xdec, r.y << ydec)
        })
    })
}

impl<T: Pixel> Search<T> {
    /// Bits of signalling luma direction `mode` against the MPMs.
    pub(crate) fn mode_bits_intra(&mut self, mode: u8, mpms: [u8; 3]) -> u32 {
        trial_bits(&mut self.entropy, |e| e.code_intra_dir_luma(mode, mpms))
    }

    /// Bits of signalling any direction outside the MPMs. All of them cost
    /// the same.
    pub(crate) fn mode_bits_rem_intra(&mut self, mpms: [u8; 3]) -> u32 {
        let mode = (0..NUM_INTRA_MODES).find(|m| !mpms.contains(m)).unwrap_or_default();
        self.mode_bits_intra(mode, mpms)
    }

    /// Predicts, codes and reconstructs one luma transform block. The flag
    /// and coefficients are coded into the entropy state.
    ///
    /// Returns the flag, the squared error and the psy energy.
    #[allow(clippy::too_many_arguments)]
    fn intra_luma_tu(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
        mode: u8,
    ) -> (bool, u64, u64) {
        let bit_depth = self.cfg.bit_depth;
        let plane = ColorPlane::Y;
        let rect = tu_rect(abs_part_idx, log2);
        let n = rect.width;

        self.intra.build_edge(
            cu,
            ctx.recon,
            &out.recon,
            plane,
            rect,
            abs_part_idx,
            units_of(log2),
            bit_depth,
        );
        self.intra.predict(
            plane,
            cu.chroma_sampling,
            log2,
            mode,
            &mut out.pred.plane_mut(plane).region_mut(rect),
            bit_depth,
        );
        self.stats.intra_predictions += 1;

        let fenc_r = fenc.plane(plane).region(rect);
        subtract(
            &fenc_r,
            &out.pred.plane(plane).region(rect),
            &mut self.cu_resi.plane_mut(plane).region_mut(rect),
        );
        let n2 = n * n;
        let off = cu.coeff_offset(plane, abs_part_idx);
        let params = QuantParams::new(self.qp, log2, bit_depth, true);
        let resi = self.cu_resi.plane(plane).region(rect);
        let num_sig = if get_resi_energy(&resi) == 0 {
            cu.coeff[0][off..off + n2].fill(0);
            out.resi.plane_mut(plane).region_mut(rect).fill(0);
            0
        } else {
            transform_quant(
                &mut self.scratch,
                &mut self.stats,
                &resi,
                params,
                log2 == MIN_TR_LOG2_SIZE,
                &mut cu.coeff[0][off..off + n2],
                &mut out.resi.plane_mut(plane).region_mut(rect),
            )
        };
        let cbf = num_sig > 0;
        self.entropy.code_cbf_luma(cbf, tr_depth);
        if cbf {
            self.entropy.code_coeff(&cu.coeff[0][off..off + n2], log2, true);
        }

        reconstruct(
            &out.pred.plane(plane).region(rect),
            &out.resi.plane(plane).region(rect),
            &mut out.recon.plane_mut(plane).region_mut(rect),
            bit_depth,
        );
        let recon_r = out.recon.plane(plane).region(rect);
        let dist = get_sse(&fenc_r, &recon_r, n, n);
        let psy = if self.rd.psy_enabled() {
            u64::from(psy_cost(&fenc_r, &recon_r, &self.zero.as_region()))
        } else {
            0
        };
        (cbf, dist, psy)
    }

    /// Searches the luma transform tree of one direction.
    ///
    /// With `check_first`, a node that may be coded whole is not split. The
    /// entropy state is left as after coding the winner.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn recur_intra_coding_qt(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
        range: DepthRange,
        mode: u8,
        check_first: bool,
    ) -> NodeCost {
        let mut full = range.check_full(log2);
        let mut can_split = range.check_split(log2) && log2 > MIN_TR_LOG2_SIZE;
        if check_first && full {
            can_split = false;
        }
        let penalized = !ctx.slice_type.is_intra() && log2 == MAX_TR_LOG2_SIZE;
        if penalized && can_split && self.cfg.rd_penalty == 2 {
            full = false;
        }
        let flag_coded = full && can_split;
        let num_units = units_of(log2);
        let start = self.entropy.checkpoint();

        let mut no_split = None;
        let mut save = None;
        if full {
            let frac_start = self.entropy.frac_bits();
            if flag_coded {
                self.entropy.code_split_transform(false, log2);
            }
            let (cbf, dist, psy) = self.intra_luma_tu(ctx, cu, fenc, out, abs_part_idx, tr_depth, log2, mode);
            let bits = frac_to_bits(self.entropy.frac_bits() - frac_start);
            let mut cost = self.rd.calc_psy_rd_cost(dist, bits, psy);
            if penalized && self.cfg.rd_penalty == 1 {
                cost *= 4;
            }
            cu.set_tr_idx(tr_depth, abs_part_idx, num_units);
            cu.set_cbf_leaf(ColorPlane::Y, cbf, tr_depth, abs_part_idx, num_units);
            if can_split {
                let mut slot = mem::take(&mut self.intra.saves[tr_depth]);
                slot.store(cu, out, abs_part_idx, log2);
                slot.cbf = cbf;
                slot.checkpoint = Some(self.entropy.checkpoint());
                save = Some(slot);
            }
            no_split = Some(NodeCost { cost, dist, bits, psy });
        }

        if !can_split {
            debug_assert!(full);
            return no_split.unwrap_or_default();
        }

        if full {
            self.entropy.rollback(&start);
        }
        let frac_start = self.entropy.frac_bits();
        if flag_coded {
            self.entropy.code_split_transform(true, log2);
        }
        let own_bits = frac_to_bits(self.entropy.frac_bits() - frac_start);

        let child_units = num_units / 4;
        let mut children = NodeCost::default();
        for i in 0..4 {
            let child = self.recur_intra_coding_qt(
                ctx,
                cu,
                fenc,
                out,
                abs_part_idx + i * child_units,
                tr_depth + 1,
                log2 - 1,
                range,
                mode,
                check_first,
            );
            children.cost += child.cost;
            children.dist += child.dist;
            children.bits += child.bits;
            children.psy += child.psy;
        }
        let split = NodeCost {
            cost: children.cost + self.rd.calc_rd_cost(0, own_bits),
            bits: children.bits + own_bits,
            ..children
        };

        match (no_split, save) {
            (Some(ns), Some(slot)) if ns.cost <= split.cost => {
                trace!(
                    "intra qt: keep {}x{} mode {} at depth {} ({} <= {})",
                    1 << log2,
                    1 << log2,
                    mode,
                    tr_depth,
                    ns.cost,
                    split.cost
                );
                slot.restore(cu, out, abs_part_idx, log2);
                cu.set_tr_idx(tr_depth, abs_part_idx, num_units);
                cu.set_cbf_leaf(ColorPlane::Y, slot.cbf, tr_depth, abs_part_idx, num_units);
                if let Some(checkpoint) = &slot.checkpoint {
                    self.entropy.rollback(checkpoint);
                }
                self.intra.saves[tr_depth] = slot;
                ns
            }
            (_, slot) => {
                if let Some(slot) = slot {
                    self.intra.saves[tr_depth] = slot;
                }
                let any = (0..4).any(|i| cu.cbf_at(ColorPlane::Y, abs_part_idx + i * child_units, tr_depth + 1));
                cu.or_cbf(ColorPlane::Y, any, tr_depth, abs_part_idx, num_units);
                split
            }
        }
    }

    /// Decides the luma direction and transform tree of partition `part_idx`.
    ///
    /// All directions are ranked by SATD plus direction bits, the short list
    /// and the MPMs get a no-split RD pass, and the winner is coded again with
    /// the full transform tree.
    pub(crate) fn estimate_intra(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        part_idx: usize,
        range: DepthRange,
    ) -> NodeCost {
        let bit_depth = self.cfg.bit_depth;
        let g = cu.part_size.geometry(part_idx, cu.size());
        let log2 = g.width.trailing_zeros() as usize;
        let tr_depth = usize::from(cu.part_size == PartSize::SIZE_NxN);
        let mpms = cu.intra_dir_predictors(part_idx);
        let start = self.entropy.checkpoint();

        let rem_bits = self.mode_bits_rem_intra(mpms);
        let mpm_mask = mpms.iter().fold(0u64, |mask, &m| mask | (1 << m));
        let mut mode_bits = [rem_bits; NUM_INTRA_MODES as usize];
        for &m in &mpms {
            mode_bits[usize::from(m)] = self.mode_bits_intra(m, mpms);
        }

        // Blocks above 32x32 are ranked per 32x32 tile, with the source standing
        // in for the reconstruction of earlier tiles.
        let part_area = Rect::new(g.x, g.y, g.width, g.height);
        let tiled = g.width > MAX_TR_SIZE;
        let mut satd = [0u32; NUM_INTRA_MODES as usize];
        for (tile, lx, ly) in tiles(part_area, 0, 0) {
            let inner = if tiled { fenc } else { &out.recon };
            let start_z = cu.zscan_at(lx, ly);
            self.intra
                .build_edge(cu, ctx.recon, inner, ColorPlane::Y, tile, start_z, 0, bit_depth);
            let tlog2 = tile.width.trailing_zeros() as usize;
            let local = Rect::new(0, 0, tile.width, tile.height);
            for mode in 0..NUM_INTRA_MODES {
                let mut pred = mem::replace(&mut self.intra.pred, PlaneBuf::new(0, 0, T::cast_from(0)));
                self.intra.predict(
                    ColorPlane::Y,
                    cu.chroma_sampling,
                    tlog2,
                    mode,
                    &mut pred.region_mut(local),
                    bit_depth,
                );
                self.stats.intra_predictions += 1;
                satd[usize::from(mode)] += get_satd(
                    &fenc.plane(ColorPlane::Y).region(tile),
                    &pred.region(local),
                    tile.width,
                    tile.height,
                );
                self.intra.pred = pred;
            }
        }

        let mut cands = CandList::new(CandList::capacity_for(log2));
        for mode in 0..NUM_INTRA_MODES {
            let bits = if mpm_mask & (1 << mode) != 0 {
                mode_bits[usize::from(mode)]
            } else {
                rem_bits
            };
            cands.insert(mode, self.rd.calc_rd_sad_cost(satd[usize::from(mode)], bits));
        }
        for &m in &mpms {
            cands.append(m);
        }

        let mut best_mode = mpms[0];
        let mut best_cost = u64::MAX;
        for mode in cands.modes().collect::<Vec<_>>() {
            self.entropy.rollback(&start);
            cu.luma_dir[part_idx] = mode;
            self.entropy.code_intra_dir_luma(mode, mpms);
            let node = self.recur_intra_coding_qt(
                ctx,
                cu,
                fenc,
                out,
                g.abs_part_idx,
                tr_depth,
                log2,
                range,
                mode,
                true,
            );
            let cost = node.cost + self.rd.calc_rd_cost(0, mode_bits[usize::from(mode)]);
            if cost < best_cost {
                best_cost = cost;
                best_mode = mode;
            }
        }

        self.entropy.rollback(&start);
        cu.luma_dir[part_idx] = best_mode;
        self.entropy.code_intra_dir_luma(best_mode, mpms);
        let node = self.recur_intra_coding_qt(
            ctx,
            cu,
            fenc,
            out,
            g.abs_part_idx,
            tr_depth,
            log2,
            range,
            best_mode,
            false,
        );
        trace!(
            "intra part {} of ({}, {}): mode {} of {} candidates, cost {}",
            part_idx,
            cu.x,
            cu.y,
            best_mode,
            cands.len(),
            node.cost
        );
        node
    }

    /// Predicts, codes and reconstructs one chroma block. Returns the flag and
    /// the weighted squared error.
    #[allow(clippy::too_many_arguments)]
    fn intra_chroma_tu(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        plane: ColorPlane,
        abs_part_idx: usize,
        log2: usize,
        sub: usize,
        mode: u8,
    ) -> (bool, u64) {
        let cs = cu.chroma_sampling;
        let bit_depth = self.cfg.bit_depth;
        let (rect, log2c) = block_rect(cs, plane, tu_rect(abs_part_idx, log2), log2, sub);
        let n = rect.width;

        self.intra.build_edge(
            cu,
            ctx.recon,
            &out.recon,
            plane,
            rect,
            abs_part_idx,
            units_of(log2),
            bit_depth,
        );
        self.intra.predict(
            plane,
            cs,
            log2c,
            mode,
            &mut out.pred.plane_mut(plane).region_mut(rect),
            bit_depth,
        );
        self.stats.intra_predictions += 1;

        let fenc_r = fenc.plane(plane).region(rect);
        subtract(
            &fenc_r,
            &out.pred.plane(plane).region(rect),
            &mut self.cu_resi.plane_mut(plane).region_mut(rect),
        );
        let n2 = n * n;
        let off = cu.coeff_offset(plane, abs_part_idx) + sub * n2;
        let params = QuantParams::new(chroma_qp(self.qp, cs), log2c, bit_depth, true);
        let resi = self.cu_resi.plane(plane).region(rect);
        let num_sig = if get_resi_energy(&resi) == 0 {
            cu.coeff[plane.index()][off..off + n2].fill(0);
            out.resi.plane_mut(plane).region_mut(rect).fill(0);
            0
        } else {
            transform_quant(
                &mut self.scratch,
                &mut self.stats,
                &resi,
                params,
                false,
                &mut cu.coeff[plane.index()][off..off + n2],
                &mut out.resi.plane_mut(plane).region_mut(rect),
            )
        };
        reconstruct(
            &out.pred.plane(plane).region(rect),
            &out.resi.plane(plane).region(rect),
            &mut out.recon.plane_mut(plane).region_mut(rect),
            bit_depth,
        );
        let dist = get_sse(&fenc_r, &out.recon.plane(plane).region(rect), n, n);
        (num_sig > 0, self.rd.scale_chroma_dist(plane, dist))
    }

    /// Predicts, transforms and quantizes luma along the transform tree and
    /// directions already decided in `cu`. Flags follow the quantized levels.
    pub(crate) fn residual_transform_quant_intra(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
    ) {
        let num_units = units_of(log2);
        if usize::from(cu.tr_idx[abs_part_idx]) == tr_depth {
            let part = if cu.part_size == PartSize::SIZE_NxN {
                abs_part_idx / (cu.num_units() / 4)
            } else {
                0
            };
            let mode = cu.luma_dir[part];
            let (cbf, ..) = self.intra_luma_tu(ctx, cu, fenc, out, abs_part_idx, tr_depth, log2, mode);
            cu.set_cbf_leaf(ColorPlane::Y, cbf, tr_depth, abs_part_idx, num_units);
            return;
        }

        let child_units = num_units / 4;
        for i in 0..4 {
            let child = abs_part_idx + i * child_units;
            self.residual_transform_quant_intra(ctx, cu, fenc, out, child, tr_depth + 1, log2 - 1);
        }
        let any = (0..4).any(|i| cu.cbf_at(ColorPlane::Y, abs_part_idx + i * child_units, tr_depth + 1));
        cu.or_cbf(ColorPlane::Y, any, tr_depth, abs_part_idx, num_units);
    }

    /// Codes chroma with the signalled chroma mode of `cu` along its decided
    /// luma transform tree. Returns the weighted squared error.
    pub(crate) fn recur_intra_chroma(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        abs_part_idx: usize,
        tr_depth: usize,
        log2: usize,
    ) -> u64 {
        let cs = cu.chroma_sampling;
        let split = usize::from(cu.tr_idx[abs_part_idx]) > tr_depth;
        let here = if split {
            chroma_shared(cs, log2)
        } else {
            chroma_log2(cs, log2).is_some()
        };
        let num_units = units_of(log2);
        let mut dist = 0;

        if here {
            let part = if cu.part_size == PartSize::SIZE_NxN {
                abs_part_idx / (cu.num_units() / 4)
            } else {
                0
            };
            let mode = derive_chroma_mode(cu.chroma_dir, cu.luma_dir[part], cs);
            for plane in ColorPlane::CHROMA {
                let mut sub_cbf = [false; 2];
                for (sub, cbf) in sub_cbf.iter_mut().enumerate().take(chroma_sub_tus(cs)) {
                    let (c, d) = self.intra_chroma_tu(ctx, cu, fenc, out, plane, abs_part_idx, log2, sub, mode);
                    *cbf = c;
                    dist += d;
                }
                store_chroma_cbfs(cu, plane, sub_cbf, tr_depth, abs_part_idx, num_units);
            }
        }
        if split {
            let child_units = num_units / 4;
            for i in 0..4 {
                dist += self.recur_intra_chroma(ctx, cu, fenc, out, abs_part_idx + i * child_units, tr_depth + 1, log2 - 1);
            }
            if !here && chroma_log2(cs, log2).is_some() {
                for plane in ColorPlane::CHROMA {
                    let any = (0..4).any(|i| cu.cbf_at(plane, abs_part_idx + i * child_units, tr_depth + 1));
                    cu.or_cbf(plane, any, tr_depth, abs_part_idx, num_units);
                }
            }
        }
        dist
    }

    /// Chooses the chroma mode by the SATD of its prediction over the whole
    /// coding unit plus its signalling bits.
    pub(crate) fn get_best_intra_mode_chroma(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &CodingUnit,
        fenc: &Yuv<T>,
    ) -> u8 {
        let cs = cu.chroma_sampling;
        let bit_depth = self.cfg.bit_depth;
        let mut best = (DM_CHROMA_IDX, u64::MAX);
        for chroma_dir in chroma_candidates(cu.luma_dir[0]) {
            let mode = derive_chroma_mode(chroma_dir, cu.luma_dir[0], cs);
            let mut satd = 0;
            for plane in ColorPlane::CHROMA {
                let (xdec, ydec) = plane_shift(cs, plane);
                let area = Rect::new(0, 0, cu.size() >> xdec, cu.size() >> ydec);
                for (tile, lx, ly) in tiles(area, xdec, ydec) {
                    let start_z = cu.zscan_at(lx, ly);
                    self.intra
                        .build_edge(cu, ctx.recon, fenc, plane, tile, start_z, 0, bit_depth);
                    let local = Rect::new(0, 0, tile.width, tile.height);
                    let mut pred = mem::replace(&mut self.intra.pred, PlaneBuf::new(0, 0, T::cast_from(0)));
                    self.intra.predict(
                        plane,
                        cs,
                        tile.width.trailing_zeros() as usize,
                        mode,
                        &mut pred.region_mut(local),
                        bit_depth,
                    );
                    self.stats.intra_predictions += 1;
                    satd += get_satd(&fenc.plane(plane).region(tile), &pred.region(local), tile.width, tile.height);
                    self.intra.pred = pred;
                }
            }
            let bits = trial_bits(&mut self.entropy, |e| e.code_intra_dir_chroma(chroma_dir == DM_CHROMA_IDX));
            let cost = self.rd.calc_rd_sad_cost(satd, bits);
            if cost < best.1 {
                best = (chroma_dir, cost);
            }
        }
        best.0
    }

    /// Chooses the chroma mode with a full RD pass over the candidates along
    /// the decided luma tree, and leaves its coefficients and reconstruction
    /// in place.
    pub(crate) fn estimate_intra_chroma(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
        range: DepthRange,
    ) -> u64 {
        let start = self.entropy.checkpoint();
        let log2 = cu.log2_size;
        let mut best = (DM_CHROMA_IDX, u64::MAX);
        for chroma_dir in chroma_candidates(cu.luma_dir[0]) {
            self.entropy.rollback(&start);
            cu.chroma_dir = chroma_dir;
            let dist = self.recur_intra_chroma(ctx, cu, fenc, out, 0, 0, log2);
            let frac_start = self.entropy.frac_bits();
            self.entropy.code_intra_dir_chroma(chroma_dir == DM_CHROMA_IDX);
            for plane in ColorPlane::CHROMA {
                self.encode_residual_qt(cu, 0, 0, log2, range, plane);
            }
            let bits = frac_to_bits(self.entropy.frac_bits() - frac_start);
            let cost = self.rd.calc_rd_cost(dist, bits);
            trace!("intra chroma mode {}: cost {}", chroma_dir, cost);
            if cost < best.1 {
                best = (chroma_dir, cost);
            }
        }
        self.entropy.rollback(&start);
        cu.chroma_dir = best.0;
        self.recur_intra_chroma(ctx, cu, fenc, out, 0, 0, log2)
    }

    /// Codes `cu` as intra with partitioning `part_size`.
    ///
    /// Prediction, residual, reconstruction and coefficients are left in `out`
    /// and `cu`. The reported bits cover the whole coding unit, including the
    /// skip flag and prediction mode of inter slices.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    #[inline]
    pub fn check_intra(
        &mut self,
        ctx: &SliceContext<'_, T>,
        cu: &mut CodingUnit,
        part_size: PartSize,
        fenc: &Yuv<T>,
        out: &mut ModeBuffers<T>,
    ) -> ModeCost {
        let start = self.entropy.checkpoint();
        cu.reset(PredMode::Intra, part_size);
        let range = self.tu_depth_range(cu, true);

        for part in 0..part_size.num_parts() {
            self.estimate_intra(ctx, cu, fenc, out, part, range);
        }
        if part_size == PartSize::SIZE_NxN {
            let quarter = cu.num_units() / 4;
            let any = (0..4).any(|i| cu.cbf_at(ColorPlane::Y, i * quarter, 1));
            cu.or_cbf(ColorPlane::Y, any, 0, 0, cu.num_units());
        }

        if cu.has_chroma() {
            if self.cfg.chroma_rd {
                self.estimate_intra_chroma(ctx, cu, fenc, out, range);
            } else {
                cu.chroma_dir = self.get_best_intra_mode_chroma(ctx, cu, fenc);
                let log2 = cu.log2_size;
                self.recur_intra_chroma(ctx, cu, fenc, out, 0, 0, log2);
            }
        }

        self.entropy.rollback(&start);
        let frac_start = self.entropy.frac_bits();
        if !ctx.slice_type.is_intra() {
            self.entropy.code_skip_flag(false, cu.skip_ctx());
            self.entropy.code_pred_mode(true);
        }
        self.entropy
            .code_part_size(part_size, true, cu.log2_size, self.cfg.enable_amp);
        for part in 0..part_size.num_parts() {
            let mpms = cu.intra_dir_predictors(part);
            self.entropy.code_intra_dir_luma(cu.luma_dir[part], mpms);
        }
        if cu.has_chroma() {
            self.entropy
                .code_intra_dir_chroma(cu.chroma_dir == DM_CHROMA_IDX);
        }
        for &plane in cu.planes() {
            self.encode_residual_qt(cu, 0, 0, cu.log2_size, range, plane);
        }
        let bits = frac_to_bits(self.entropy.frac_bits() - frac_start);

        let distortion = self.recon_distortion(cu, fenc, &out.recon);
        let psy = self.recon_psy(cu, fenc, &out.recon);
        let cost = self.rd.calc_psy_rd_cost(distortion, bits, psy);
        debug!(
            "intra {:?} at ({}, {}): luma {:?} chroma {} cost {} bits {}",
            part_size,
            cu.x,
            cu.y,
            &cu.luma_dir[..part_size.num_parts()],
            cu.chroma_dir,
            cost,
            bits
        );
        ModeCost {
            cost,
            bits,
            distortion,
        }
    }
}
