//! Rate-distortion mode decision for one coding unit.
//!
//! A [`Search`] owns every scratch buffer the decision needs and is meant to
//! be used by a single worker. The partition driver calls it once per
//! candidate coding unit.

mod bits;
mod inter;
mod intra;
mod motion;
mod rdcost;
mod residual;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use log::debug;
use v_frame::pixel::{ChromaSampling, Pixel};

pub use self::{
    bits::{CandList, MAX_RD_MODE_CANDS, get_blk_bits, get_tu_bits, mv_cost_bits, mvd_bits},
    inter::MergeData,
    rdcost::{QP_MAX, QP_MIN, RdCost},
    residual::{QtLayers, QtResult},
};
use self::{inter::McScratch, intra::IntraScratch, residual::TuScratch};
use crate::{
    SearchConfig,
    data::{
        block::{ColorPlane, DepthRange, LOG2_UNIT_SIZE, MAX_CU_SIZE, PartSize, zscan_to_raster},
        candidates::CandidateContext,
        cu::{CodingUnit, SliceType},
        entropy::{Entropy, EntropyCheckpoint},
        plane::{PlaneBuf, Rect, Yuv},
        sad::get_sse,
    },
    error::SearchError,
};

/// Cost of a coded hypothesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ModeCost {
    /// Lagrangian cost, including the psy-rd term when enabled.
    pub cost: u64,
    /// Estimated bits of the whole coding unit.
    pub bits: u32,
    /// Squared error of the reconstruction, chroma weighted.
    pub distortion: u64,
}

/// Counters of the primitive invocations made by a [`Search`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SearchStats {
    /// Forward transforms.
    pub transforms: u64,
    /// Intra predictions of one block.
    pub intra_predictions: u64,
    /// Motion compensations of one partition.
    pub motion_compensations: u64,
    /// Motion vectors evaluated by motion estimation.
    pub me_candidates: u64,
}

/// Per-hypothesis sample buffers covering the coding unit, with the coding
/// unit origin at `(0, 0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeBuffers<T> {
    /// Prediction.
    pub pred: Yuv<T>,
    /// Reconstructed residual.
    pub resi: Yuv<i16>,
    /// Reconstruction.
    pub recon: Yuv<T>,
}

impl<T: Pixel> ModeBuffers<T> {
    /// Buffers for a coding unit of `1 << log2_size` luma samples.
    #[inline]
    pub fn new(log2_size: usize, chroma_sampling: ChromaSampling) -> Self {
        let size = 1 << log2_size;
        let zero = T::cast_from(0);
        ModeBuffers {
            pred: Yuv::new(size, size, chroma_sampling, zero),
            resi: Yuv::new(size, size, chroma_sampling, 0),
            recon: Yuv::new(size, size, chroma_sampling, zero),
        }
    }
}

/// Slice level inputs shared by every coding unit of a slice.
#[derive(Debug, Clone, Copy)]
pub struct SliceContext<'a, T: Pixel> {
    /// Coding type of the slice.
    pub slice_type: SliceType,
    /// Picture order count of the current picture.
    pub poc: i32,
    /// Picture order counts of the reference pictures, per list.
    pub ref_pocs: [&'a [i32]; 2],
    /// Reference pictures, per list, in the same order as `ref_pocs`.
    pub ref_pics: [&'a [Arc<Yuv<T>>]; 2],
    /// Reconstruction of the current picture. Samples left of and above the
    /// coding unit are read from it for intra prediction.
    pub recon: &'a Yuv<T>,
    /// Whether temporal motion vector prediction is enabled.
    pub enable_tmvp: bool,
}

impl<T: Pixel> SliceContext<'_, T> {
    /// Number of usable references in `list`.
    #[inline]
    pub fn num_refs(&self, list: usize) -> usize {
        if list >= self.slice_type.num_lists() {
            return 0;
        }
        self.ref_pics[list].len().min(self.ref_pocs[list].len())
    }

    pub(crate) fn candidate_context(&self) -> CandidateContext<'_> {
        CandidateContext {
            slice_type: self.slice_type,
            poc: self.poc,
            ref_pocs: self.ref_pocs,
            enable_tmvp: self.enable_tmvp,
        }
    }
}

/// Winner of [`Search::check_best_mode`].
#[derive(Debug, Clone)]
pub struct BestMode<T> {
    /// The coding unit with every decision applied.
    pub cu: CodingUnit,
    /// Prediction, residual and reconstruction of the winner.
    pub buffers: ModeBuffers<T>,
    /// Cost breakdown of the winner.
    pub cost: ModeCost,
    entropy: EntropyCheckpoint,
}

/// Luma rectangle, relative to the coding unit, of the transform node at
/// `abs_part_idx` with `1 << log2` samples.
#[inline]
pub(crate) fn tu_rect(abs_part_idx: usize, log2: usize) -> Rect {
    let (x4, y4) = zscan_to_raster(abs_part_idx);
    let n = 1 << log2;
    Rect::new(x4 << LOG2_UNIT_SIZE, y4 << LOG2_UNIT_SIZE, n, n)
}

/// Mode decision engine of one worker.
pub struct Search<T: Pixel> {
    cfg: SearchConfig,
    rd: RdCost,
    qp: i32,
    entropy: Entropy,
    stats: SearchStats,

    layers: QtLayers,
    scratch: TuScratch,
    intra: IntraScratch<T>,
    mc: McScratch<T>,
    merge_cache: Option<MergeData>,
    /// `fenc - pred` of the coding unit under evaluation.
    cu_resi: Yuv<i16>,
    tmp_recon: PlaneBuf<T>,
    /// All-zero block used as the reference of the psy energy.
    zero: PlaneBuf<T>,
}

impl<T: Pixel> Search<T> {
    /// Allocates a search for `cfg`. The QP starts at 32 and the entropy state
    /// at the I-slice initialization.
    ///
    /// # Errors
    ///
    /// - If `cfg` fails [`SearchConfig::validate`].
    #[inline]
    pub fn new(cfg: SearchConfig) -> Result<Self, SearchError> {
        cfg.validate()?;
        let cs = cfg.chroma_sampling;
        let zero = T::cast_from(0);
        let mut search = Search {
            cfg,
            rd: RdCost::default(),
            qp: 32,
            entropy: Entropy::new(SliceType::I, 32),
            stats: SearchStats::default(),
            layers: QtLayers::new(cs),
            scratch: TuScratch::new(),
            intra: IntraScratch::new(),
            mc: McScratch::new(cs),
            merge_cache: None,
            cu_resi: Yuv::new(MAX_CU_SIZE, MAX_CU_SIZE, cs, 0),
            tmp_recon: PlaneBuf::new(MAX_CU_SIZE, MAX_CU_SIZE, zero),
            zero: PlaneBuf::new(MAX_CU_SIZE, MAX_CU_SIZE, zero),
        };
        search.set_qp(32)?;
        Ok(search)
    }

    /// Options the search was created with.
    #[inline]
    pub const fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// Sets the QP of the following decisions and derives the lambdas from
    /// it.
    ///
    /// # Errors
    ///
    /// - If `qp` is outside `QP_MIN..=QP_MAX`.
    #[inline]
    pub fn set_qp(&mut self, qp: i32) -> Result<(), SearchError> {
        if !(QP_MIN..=QP_MAX).contains(&qp) {
            return Err(SearchError::Qp(qp));
        }
        self.qp = qp;
        self.rd.set_qp(qp, self.cfg.chroma_sampling);
        self.rd.set_psy_rd(self.cfg.psy_rd);
        Ok(())
    }

    /// QP the lambdas were last derived from.
    #[inline]
    pub const fn qp(&self) -> i32 {
        self.qp
    }

    /// Lambdas and chroma weights in use.
    #[inline]
    pub const fn rd_cost(&self) -> &RdCost {
        &self.rd
    }

    /// Overrides the lambdas derived from the QP.
    #[inline]
    pub fn set_lambda(&mut self, lambda2: f64, lambda: f64) {
        self.rd.set_lambda(lambda2, lambda);
    }

    /// Continues from the entropy state of the driver.
    #[inline]
    pub fn load_entropy(&mut self, entropy: Entropy) {
        self.entropy = entropy;
    }

    /// Resets the entropy state to the initialization of a new slice at the
    /// current QP.
    #[inline]
    pub fn reset_entropy(&mut self, slice_type: SliceType) {
        self.entropy = Entropy::new(slice_type, self.qp);
    }

    /// Current entropy state.
    #[inline]
    pub const fn entropy(&self) -> &Entropy {
        &self.entropy
    }

    /// Counters accumulated since the last [`Search::reset_stats`].
    #[inline]
    pub const fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Zeroes the counters.
    #[inline]
    pub fn reset_stats(&mut self) {
        self.stats = SearchStats::default();
    }

    /// Transform size range usable by `cu` with its current partitioning.
    #[inline]
    pub fn tu_depth_range(&self, cu: &CodingUnit, intra: bool) -> DepthRange {
        let (min, max) = (self.cfg.tu_log2_min_size, self.cfg.tu_log2_max_size);
        let max_depth = if intra {
            self.cfg.max_tu_depth_intra
        } else {
            self.cfg.max_tu_depth_inter
        };
        let split_flag = if intra {
            cu.part_size == PartSize::SIZE_NxN
        } else {
            max_depth == 1 && cu.part_size != PartSize::SIZE_2Nx2N
        };
        let reach = max_depth - 1 + usize::from(split_flag);
        let log2_min = cu.log2_size.saturating_sub(reach).clamp(min, max);
        DepthRange::new(log2_min, max)
    }

    /// Squared error of a reconstruction against the source, chroma weighted.
    pub(crate) fn recon_distortion(&self, cu: &CodingUnit, fenc: &Yuv<T>, recon: &Yuv<T>) -> u64 {
        let size = cu.size();
        cu.planes()
            .iter()
            .map(|&plane| {
                let area = Rect::new(0, 0, size, size);
                let org = fenc.region_for(plane, area);
                let rec = recon.region_for(plane, area);
                let sse = get_sse(&org, &rec, org.width(), org.height());
                self.rd.scale_chroma_dist(plane, sse)
            })
            .sum()
    }

    /// Luma psy energy of a reconstruction, zero when psy-rd is disabled.
    pub(crate) fn recon_psy(&self, cu: &CodingUnit, fenc: &Yuv<T>, recon: &Yuv<T>) -> u64 {
        if !self.rd.psy_enabled() {
            return 0;
        }
        let area = Rect::new(0, 0, cu.size(), cu.size());
        u64::from(crate::data::satd::psy_cost(
            &fenc.region_for(ColorPlane::Y, area),
            &recon.region_for(ColorPlane::Y, area),
            &self.zero.as_region(),
        ))
    }

    /// Evaluates the modes of `cu` allowed by the slice and the configuration
    /// and returns the cheapest.
    ///
    /// Skip is tried first; with `early_skip_zero_residual` a skip winner
    /// ends the search. Inter partitions follow, then intra. The entropy state
    /// is left as after coding the winner.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    #[inline]
    pub fn check_best_mode(&mut self, ctx: &SliceContext<'_, T>, cu: &CodingUnit, fenc: &Yuv<T>) -> BestMode<T> {
        let start = self.entropy.checkpoint();
        let cs = cu.chroma_sampling;
        let mut best: Option<BestMode<T>> = None;
        self.merge_cache = None;

        let consider = |best: &mut Option<BestMode<T>>,
                        this: &Self,
                        cu: CodingUnit,
                        buffers: ModeBuffers<T>,
                        cost: ModeCost| {
            if best.as_ref().is_none_or(|b| cost.cost < b.cost.cost) {
                *best = Some(BestMode {
                    cu,
                    buffers,
                    cost,
                    entropy: this.entropy.checkpoint(),
                });
            }
        };

        if !ctx.slice_type.is_intra() && ctx.num_refs(0) > 0 {
            let mut cand = cu.clone();
            let mut buffers = ModeBuffers::new(cu.log2_size, cs);
            self.entropy.rollback(&start);
            if let Some(cost) = self.check_skip(ctx, &mut cand, fenc, &mut buffers) {
                let skipped = cand.skip;
                consider(&mut best, self, cand, buffers, cost);
                if skipped && self.cfg.early_skip_zero_residual {
                    debug!("early skip at ({}, {}), cost {}", cu.x, cu.y, cost.cost);
                    return self.finish_best(best, &start);
                }
            }

            let mut parts = vec![PartSize::SIZE_2Nx2N, PartSize::SIZE_2NxN, PartSize::SIZE_Nx2N];
            if self.cfg.enable_amp && cu.log2_size > 3 {
                parts.extend([
                    PartSize::SIZE_2NxnU,
                    PartSize::SIZE_2NxnD,
                    PartSize::SIZE_nLx2N,
                    PartSize::SIZE_nRx2N,
                ]);
            }
            for part in parts {
                let mut cand = cu.clone();
                let mut buffers = ModeBuffers::new(cu.log2_size, cs);
                self.entropy.rollback(&start);
                if let Some(cost) = self.check_inter(ctx, &mut cand, part, fenc, &mut buffers, false) {
                    consider(&mut best, self, cand, buffers, cost);
                }
            }
        }

        let mut intra_parts = vec![PartSize::SIZE_2Nx2N];
        if cu.log2_size == 3 && self.cfg.tu_log2_min_size == 2 {
            intra_parts.push(PartSize::SIZE_NxN);
        }
        for part in intra_parts {
            let mut cand = cu.clone();
            let mut buffers = ModeBuffers::new(cu.log2_size, cs);
            self.entropy.rollback(&start);
            let cost = self.check_intra(ctx, &mut cand, part, fenc, &mut buffers);
            consider(&mut best, self, cand, buffers, cost);
        }

        self.finish_best(best, &start)
    }

    /// Restores the entropy state of the winner.
    fn finish_best(&mut self, best: Option<BestMode<T>>, start: &EntropyCheckpoint) -> BestMode<T> {
        let best = best.unwrap_or_else(|| BestMode {
            cu: CodingUnit::new(0, 0, 3, 0, self.cfg.chroma_sampling),
            buffers: ModeBuffers::new(3, self.cfg.chroma_sampling),
            cost: ModeCost {
                cost: u64::MAX,
                ..ModeCost::default()
            },
            entropy: start.clone(),
        });
        self.entropy.rollback(&best.entropy);
        debug!(
            "best mode at ({}, {}): {:?} {:?} skip={} cost={}",
            best.cu.x, best.cu.y, best.cu.pred_mode, best.cu.part_size, best.cu.skip, best.cost.cost
        );
        best
    }
}
