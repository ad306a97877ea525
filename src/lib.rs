//! Rate-distortion optimized mode decision for HEVC-family block encoders.
//!
//! For every coding unit the partition driver proposes, a [`Search`]
//! decides between intra and inter prediction, the partition shape, the
//! motion vectors and their predictors, the merge or skip candidate and the
//! residual quad-tree. Each hypothesis is priced with the Lagrangian cost
//! `distortion + lambda * bits`, where bits come from a trial CABAC state
//! and never reach a bitstream.
//!
//! The crate has no picture-level logic. References, the reconstruction of
//! the current picture and the neighbour data of the coding unit are
//! provided by the caller.

mod data;
mod error;
pub mod search;

#[cfg(test)]
mod tests;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use v_frame::pixel::{ChromaSampling, Pixel};

pub use crate::{
    data::{
        block::{
            ColorPlane, DepthRange, InvalidBlockSize, MAX_CU_SIZE, NUM_CU_PARTITIONS, PartGeometry, PartSize,
            cu_log2_size,
        },
        cu::{CodingUnit, ColocatedMotion, NeighborUnit, Neighborhood, PredMode, SliceType},
        entropy::{Entropy, EntropyCheckpoint},
        motion::{MotionVector, MvField, PuMotion},
        plane::{PlaneBuf, Rect, Yuv},
    },
    error::SearchError,
    search::{BestMode, ModeBuffers, ModeCost, Search, SearchStats, SliceContext},
};

/// Largest search range accepted by [`SearchConfig::validate`], in full
/// samples.
pub const MAX_SEARCH_RANGE: usize = 32767 >> 2;

/// Motion estimation pattern of the full-sample search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum SearchMethod {
    /// Diamond of radius 2, then 1.
    Dia,
    /// Hexagon with a square refinement.
    #[default]
    Hex,
    /// Uneven multi-hexagon.
    Umh,
    /// Exhaustive search of the window.
    Full,
}

/// Options of a [`Search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Bits per sample, 8 to 12.
    pub bit_depth: usize,
    /// Chroma layout of the content.
    pub chroma_sampling: ChromaSampling,
    /// Largest transform, log2 of its size.
    pub tu_log2_max_size: usize,
    /// Smallest transform, log2 of its size.
    pub tu_log2_min_size: usize,
    /// Number of transform depths tried below an intra coding unit.
    pub max_tu_depth_intra: usize,
    /// Number of transform depths tried below an inter coding unit.
    pub max_tu_depth_inter: usize,
    /// Integer motion search pattern.
    pub search_method: SearchMethod,
    /// Motion search range around the predictor, in full samples.
    pub search_range: usize,
    /// Sub-sample refinement: 0 for none, 1 for half samples, 2 for quarter
    /// samples.
    pub subpel_refine: u8,
    /// Number of merge candidates signalled in the slice, 1 to 5.
    pub max_num_merge_cand: usize,
    /// Limits vertical motion so that rows of a reference picture still being
    /// encoded by another thread are never read.
    pub frame_parallel: bool,
    /// Penalty for 32x32 intra transforms in inter slices: 0 is off, 1
    /// multiplies their cost by 4 and 2 forbids them when a split is possible.
    pub rd_penalty: u8,
    /// Psycho-visual strength in FIX8. Zero disables psy-rd.
    pub psy_rd: u32,
    /// Stops the decision as soon as skip wins against merge with residual.
    pub early_skip_zero_residual: bool,
    /// Tries the asymmetric partitions above 8x8.
    pub enable_amp: bool,
    /// Allows bi-predictive motion search in B slices.
    pub bframe_bipred: bool,
    /// Selects the chroma intra mode with a full RD pass instead of a SATD
    /// ranking.
    pub chroma_rd: bool,
}

impl Default for SearchConfig {
    #[inline]
    fn default() -> Self {
        SearchConfig {
            bit_depth: 8,
            chroma_sampling: ChromaSampling::Cs420,
            tu_log2_max_size: 5,
            tu_log2_min_size: 2,
            max_tu_depth_intra: 1,
            max_tu_depth_inter: 2,
            search_method: SearchMethod::Hex,
            search_range: 57,
            subpel_refine: 2,
            max_num_merge_cand: 5,
            frame_parallel: false,
            rd_penalty: 0,
            psy_rd: 0,
            early_skip_zero_residual: false,
            enable_amp: false,
            bframe_bipred: true,
            chroma_rd: true,
        }
    }
}

impl SearchConfig {
    /// # Errors
    ///
    /// - If a field is outside its documented range.
    #[inline]
    pub fn validate(&self) -> Result<(), SearchError> {
        if !(8..=12).contains(&self.bit_depth) {
            return Err(SearchError::BitDepth(self.bit_depth));
        }
        if self.tu_log2_min_size < 2 || self.tu_log2_max_size > 5 || self.tu_log2_min_size > self.tu_log2_max_size {
            return Err(SearchError::TuSizeBounds {
                min: self.tu_log2_min_size,
                max: self.tu_log2_max_size,
            });
        }
        for depth in [self.max_tu_depth_intra, self.max_tu_depth_inter] {
            if !(1..=4).contains(&depth) {
                return Err(SearchError::TuDepth(depth));
            }
        }
        if self.search_range == 0 || self.search_range > MAX_SEARCH_RANGE {
            return Err(SearchError::SearchRange(self.search_range));
        }
        if !(1..=5).contains(&self.max_num_merge_cand) {
            return Err(SearchError::MergeCandidates(self.max_num_merge_cand));
        }
        if self.rd_penalty > 2 {
            return Err(SearchError::RdPenalty(self.rd_penalty));
        }
        Ok(())
    }
}

/// One coding unit to decide.
#[derive(Debug, Clone)]
pub struct SearchJob<'a, T: Pixel> {
    /// Slice the coding unit belongs to.
    pub ctx: SliceContext<'a, T>,
    /// Geometry and neighbours of the coding unit.
    pub cu: CodingUnit,
    /// Source samples of the coding unit, origin at `(0, 0)`.
    pub fenc: Yuv<T>,
    /// Quantizer of the coding unit.
    pub qp: i32,
    /// Entropy state before the coding unit.
    pub entropy: Entropy,
}

/// Decides independent coding units on a pool of `threads` workers.
///
/// Every worker owns one [`Search`]. Results are in the order of `jobs` and
/// do not depend on the number of threads.
///
/// # Errors
///
/// - If `config` is invalid, a job has an invalid QP, or the thread pool
///   cannot be created.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
#[inline]
pub fn search_blocks<T: Pixel>(
    config: SearchConfig,
    jobs: &[SearchJob<'_, T>],
    threads: usize,
) -> anyhow::Result<Vec<BestMode<T>>> {
    config.validate()?;
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    log::debug!("deciding {} coding units on {} threads", jobs.len(), pool.current_num_threads());

    let results = pool.install(|| {
        jobs.par_iter()
            .map_init(
                || Search::<T>::new(config),
                |search, job| -> Result<BestMode<T>, SearchError> {
                    let search = search.as_mut().map_err(|e| *e)?;
                    search.set_qp(job.qp)?;
                    search.reset_stats();
                    search.load_entropy(job.entropy.clone());
                    Ok(search.check_best_mode(&job.ctx, &job.cu, &job.fenc))
                },
            )
            .collect::<Result<Vec<_>, _>>()
    })?;
    Ok(results)
}
