#[cfg(test)]
mod tests;

use v_frame::pixel::ChromaSampling;

use super::{
    block::{
        ColorPlane, LOG2_UNIT_SIZE, MAX_CU_SIZE, NUM_CU_PARTITIONS, PartSize, chroma_shift,
        plane_shift, raster_to_zscan,
    },
    motion::{MotionVector, MvField, PuMotion},
    prediction::{DC_IDX, DM_CHROMA_IDX, most_probable_modes},
};

/// Number of 4x4 units stored along each outer edge of a coding unit: its
/// own edge plus the below-left or above-right extension.
pub const NUM_EDGE_UNITS: usize = (2 * MAX_CU_SIZE) >> LOG2_UNIT_SIZE;

/// Coding type of the slice holding the coding unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum SliceType {
    /// Intra only.
    I,
    /// Uni-predicted from list 0.
    P,
    /// Predicted from lists 0 and 1.
    B,
}

impl SliceType {
    /// Inter modes are not allowed.
    #[inline]
    pub const fn is_intra(self) -> bool {
        matches!(self, SliceType::I)
    }

    /// Number of reference lists usable in the slice.
    #[inline]
    pub const fn num_lists(self) -> usize {
        match self {
            SliceType::I => 0,
            SliceType::P => 1,
            SliceType::B => 2,
        }
    }
}

/// Prediction mode of a coding unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum PredMode {
    /// Motion-compensated, including skip.
    #[default]
    Inter,
    /// Predicted from neighbouring samples.
    Intra,
}

/// Already decided data of a 4x4 unit bordering a coding unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NeighborUnit {
    /// Prediction mode the unit was coded with.
    pub pred_mode: PredMode,
    /// Set when the unit was skipped.
    pub skip: bool,
    /// Luma intra direction; ignored for inter units.
    pub luma_dir: u8,
    /// Motion; ignored for intra units.
    pub motion: MvField,
}

impl NeighborUnit {
    /// An intra coded unit with direction `luma_dir`.
    #[inline]
    pub const fn intra(luma_dir: u8) -> Self {
        NeighborUnit {
            pred_mode: PredMode::Intra,
            skip: false,
            luma_dir,
            motion: MvField {
                mv: [MotionVector::ZERO; 2],
                ref_idx: [-1; 2],
            },
        }
    }

    /// An inter coded unit.
    #[inline]
    pub const fn inter(motion: MvField, skip: bool) -> Self {
        NeighborUnit {
            pred_mode: PredMode::Inter,
            skip,
            luma_dir: DC_IDX,
            motion,
        }
    }
}

/// Motion of the co-located block in the collocated picture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ColocatedMotion {
    /// Motion vector stored for the co-located block.
    pub mv: MotionVector,
    /// POC of the collocated picture.
    pub col_poc: i32,
    /// POC of the picture `mv` points into.
    pub col_ref_poc: i32,
}

/// Neighbour data around a coding unit, provided by the partition driver.
///
/// `left[k]` is the unit at luma offset `(-1, 4 * k)` from the coding unit
/// origin and `above[k]` the one at `(4 * k, -1)`. Entries past the coding
/// unit size are the below-left and above-right extensions. `None` marks a
/// unit outside the picture, slice or tile, or not yet coded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighborhood {
    /// Left column, top to bottom.
    pub left: [Option<NeighborUnit>; NUM_EDGE_UNITS],
    /// Above row, left to right.
    pub above: [Option<NeighborUnit>; NUM_EDGE_UNITS],
    /// Unit at `(-1, -1)`.
    pub above_left: Option<NeighborUnit>,
    /// Temporal candidate, when the slice uses one.
    pub colocated: Option<ColocatedMotion>,
}

impl Neighborhood {
    /// Unit at a luma offset outside the coding unit, to its left or above.
    #[inline]
    pub fn unit_at(&self, dx: isize, dy: isize) -> Option<&NeighborUnit> {
        match (dx < 0, dy < 0) {
            (true, true) => self.above_left.as_ref(),
            (true, false) => self.left.get(dy as usize >> LOG2_UNIT_SIZE)?.as_ref(),
            (false, true) => self.above.get(dx as usize >> LOG2_UNIT_SIZE)?.as_ref(),
            (false, false) => None,
        }
    }
}

/// One coding unit under evaluation.
///
/// Per-unit arrays are indexed by the z-order of the 4x4 luma units inside
/// the coding unit. Coefficients of a transform block start at
/// `abs_part_idx * 16`, scaled down by the chroma decimation for chroma
/// planes, and are stored in raster order.
#[derive(Debug, Clone)]
pub struct CodingUnit {
    /// Luma position in the picture.
    pub x: usize,
    /// Vertical luma position in the picture.
    pub y: usize,
    /// Log2 of the side, 3 to 6.
    pub log2_size: usize,
    /// Depth in the coding tree, 0 for 64x64.
    pub depth: usize,
    /// Chroma layout of the content.
    pub chroma_sampling: ChromaSampling,

    /// Decided prediction mode.
    pub pred_mode: PredMode,
    /// Decided partition shape.
    pub part_size: PartSize,
    /// Set for merge skip.
    pub skip: bool,
    /// Luma intra direction per partition.
    pub luma_dir: [u8; 4],
    /// Signalled chroma intra mode.
    pub chroma_dir: u8,
    /// Inter motion per partition.
    pub motion: [PuMotion; 4],

    /// Transform depth of the unit.
    pub tr_idx: [u8; NUM_CU_PARTITIONS],
    /// Coded block flags per plane; bit `d` holds the flag at transform
    /// depth `d`.
    pub cbf: [[u8; NUM_CU_PARTITIONS]; 3],
    /// Quantized levels per plane.
    pub coeff: [Vec<i16>; 3],

    /// Decided data around the unit.
    pub neighbors: Neighborhood,
}

impl CodingUnit {
    /// # Panics
    ///
    /// - If `log2_size` is not a coding unit size.
    #[inline]
    pub fn new(
        x: usize,
        y: usize,
        log2_size: usize,
        depth: usize,
        chroma_sampling: ChromaSampling,
    ) -> Self {
        assert!((3..=6).contains(&log2_size));
        let luma = 1usize << (2 * log2_size);
        let chroma = match chroma_shift(chroma_sampling) {
            Some((xdec, ydec)) => luma >> (xdec + ydec),
            None => 0,
        };
        CodingUnit {
            x,
            y,
            log2_size,
            depth,
            chroma_sampling,
            pred_mode: PredMode::Inter,
            part_size: PartSize::SIZE_2Nx2N,
            skip: false,
            luma_dir: [DC_IDX; 4],
            chroma_dir: DM_CHROMA_IDX,
            motion: [PuMotion::default(); 4],
            tr_idx: [0; NUM_CU_PARTITIONS],
            cbf: [[0; NUM_CU_PARTITIONS]; 3],
            coeff: [vec![0; luma], vec![0; chroma], vec![0; chroma]],
            neighbors: Neighborhood::default(),
        }
    }

    /// Side in luma samples.
    #[inline]
    pub const fn size(&self) -> usize {
        1 << self.log2_size
    }

    /// Number of 4x4 units covered.
    #[inline]
    pub const fn num_units(&self) -> usize {
        1 << ((self.log2_size - LOG2_UNIT_SIZE) * 2)
    }

    /// Returns `false` for 4:0:0 content.
    #[inline]
    pub fn has_chroma(&self) -> bool {
        self.chroma_sampling != ChromaSampling::Cs400
    }

    /// Planes present in the content.
    #[inline]
    pub fn planes(&self) -> &'static [ColorPlane] {
        if self.has_chroma() {
            &ColorPlane::ALL
        } else {
            &ColorPlane::ALL[..1]
        }
    }

    /// Resets the decision state before a new hypothesis.
    #[inline]
    pub fn reset(&mut self, pred_mode: PredMode, part_size: PartSize) {
        self.pred_mode = pred_mode;
        self.part_size = part_size;
        self.skip = false;
        self.luma_dir = [DC_IDX; 4];
        self.chroma_dir = DM_CHROMA_IDX;
        self.motion = [PuMotion::default(); 4];
        self.clear_residual();
    }

    /// Clears the transform tree and coded block flags.
    #[inline]
    pub fn clear_residual(&mut self) {
        self.tr_idx.fill(0);
        for cbf in &mut self.cbf {
            cbf.fill(0);
        }
    }

    /// Coded block flag of `plane` at transform depth `tr_depth`.
    #[inline]
    pub fn cbf_at(&self, plane: ColorPlane, abs_part_idx: usize, tr_depth: usize) -> bool {
        (self.cbf[plane.index()][abs_part_idx] >> tr_depth) & 1 != 0
    }

    /// Sets the units `abs_part_idx..abs_part_idx + num_units` to a leaf
    /// flag at `tr_depth`.
    #[inline]
    pub fn set_cbf_leaf(
        &mut self,
        plane: ColorPlane,
        cbf: bool,
        tr_depth: usize,
        abs_part_idx: usize,
        num_units: usize,
    ) {
        self.cbf[plane.index()][abs_part_idx..abs_part_idx + num_units]
            .fill(u8::from(cbf) << tr_depth);
    }

    /// ORs a flag at `tr_depth` into the units of a split node.
    #[inline]
    pub fn or_cbf(
        &mut self,
        plane: ColorPlane,
        cbf: bool,
        tr_depth: usize,
        abs_part_idx: usize,
        num_units: usize,
    ) {
        for c in &mut self.cbf[plane.index()][abs_part_idx..abs_part_idx + num_units] {
            *c |= u8::from(cbf) << tr_depth;
        }
    }

    /// Records the transform depth of a run of units.
    #[inline]
    pub fn set_tr_idx(&mut self, tr_depth: usize, abs_part_idx: usize, num_units: usize) {
        self.tr_idx[abs_part_idx..abs_part_idx + num_units].fill(tr_depth as u8);
    }

    /// `rqt_root_cbf` of an inter coding unit.
    #[inline]
    pub fn root_cbf(&self) -> bool {
        self.planes().iter().any(|&p| self.cbf_at(p, 0, 0))
    }

    /// Offset of a transform block's coefficients inside `coeff[plane]`.
    #[inline]
    pub fn coeff_offset(&self, plane: ColorPlane, abs_part_idx: usize) -> usize {
        let (xdec, ydec) = plane_shift(self.chroma_sampling, plane);
        (abs_part_idx << (2 * LOG2_UNIT_SIZE)) >> (xdec + ydec)
    }

    /// Context increment of `cu_skip_flag`.
    #[inline]
    pub fn skip_ctx(&self) -> usize {
        let left = self.neighbors.unit_at(-1, 0).is_some_and(|u| u.skip);
        let above = self.neighbors.unit_at(0, -1).is_some_and(|u| u.skip);
        usize::from(left) + usize::from(above)
    }

    /// Luma direction at an offset from the coding unit origin, as used for
    /// most probable mode derivation. Units inside the coding unit must
    /// belong to an already decided partition.
    fn intra_dir_at(&self, dx: isize, dy: isize) -> u8 {
        if dx >= 0 && dy >= 0 {
            let cu_size = self.size();
            let part = self.part_size.part_at(
                dx as usize >> LOG2_UNIT_SIZE,
                dy as usize >> LOG2_UNIT_SIZE,
                cu_size,
            );
            return self.luma_dir[part];
        }
        match self.neighbors.unit_at(dx, dy) {
            Some(unit) if unit.pred_mode == PredMode::Intra => unit.luma_dir,
            _ => DC_IDX,
        }
    }

    /// Most probable luma directions of partition `part_idx`.
    #[inline]
    pub fn intra_dir_predictors(&self, part_idx: usize) -> [u8; 3] {
        let g = self.part_size.geometry(part_idx, self.size());
        let (x, y) = (g.x as isize, g.y as isize);
        most_probable_modes(self.intra_dir_at(x - 1, y), self.intra_dir_at(x, y - 1))
    }

    /// Inter motion at a luma offset from the coding unit origin, as seen
    /// by partition `part_idx`. Units of later partitions and units right of
    /// or below the coding unit are unavailable.
    #[inline]
    pub fn inter_neighbor(&self, dx: isize, dy: isize, part_idx: usize) -> Option<MvField> {
        let size = self.size() as isize;
        if dx >= 0 && dy >= 0 {
            if dx >= size || dy >= size {
                return None;
            }
            let (x4, y4) = (dx as usize >> LOG2_UNIT_SIZE, dy as usize >> LOG2_UNIT_SIZE);
            let part = self.part_size.part_at(x4, y4, self.size());
            return (part < part_idx).then(|| self.motion[part].field);
        }
        self.neighbors
            .unit_at(dx, dy)
            .filter(|u| u.pred_mode == PredMode::Inter)
            .map(|u| u.motion)
    }

    /// Z-order index of the unit at a luma offset inside the coding unit.
    #[inline]
    pub fn zscan_at(&self, dx: usize, dy: usize) -> usize {
        raster_to_zscan(dx >> LOG2_UNIT_SIZE, dy >> LOG2_UNIT_SIZE)
    }
}
