#![allow(clippy::unwrap_used, reason = "allow in test files")]

use v_frame::pixel::ChromaSampling;

use super::*;
use crate::data::prediction::{PLANAR_IDX, VER_IDX};

fn inter_unit(row: i16, col: i16, skip: bool) -> NeighborUnit {
    NeighborUnit::inter(
        MvField {
            mv: [MotionVector::new(row, col), MotionVector::ZERO],
            ref_idx: [0, -1],
        },
        skip,
    )
}

#[test]
fn skip_context_counts_skipped_neighbours() {
    let mut cu = CodingUnit::new(16, 16, 4, 2, ChromaSampling::Cs420);
    assert_eq!(cu.skip_ctx(), 0);
    cu.neighbors.left[0] = Some(inter_unit(0, 0, true));
    assert_eq!(cu.skip_ctx(), 1);
    cu.neighbors.above[0] = Some(inter_unit(0, 0, true));
    assert_eq!(cu.skip_ctx(), 2);
    cu.neighbors.above[0] = Some(NeighborUnit::intra(VER_IDX));
    assert_eq!(cu.skip_ctx(), 1);
}

#[test]
fn mpm_from_outside_neighbours() {
    let mut cu = CodingUnit::new(8, 8, 3, 3, ChromaSampling::Cs420);
    cu.reset(PredMode::Intra, PartSize::SIZE_2Nx2N);
    cu.neighbors.left[0] = Some(NeighborUnit::intra(10));
    cu.neighbors.above[0] = Some(inter_unit(4, 4, false));
    // Inter neighbours count as DC.
    assert_eq!(cu.intra_dir_predictors(0), [10, DC_IDX, PLANAR_IDX]);
}

#[test]
fn mpm_inside_nxn_uses_earlier_partitions() {
    let mut cu = CodingUnit::new(0, 0, 3, 3, ChromaSampling::Cs420);
    cu.reset(PredMode::Intra, PartSize::SIZE_NxN);
    cu.luma_dir = [18, 26, 2, DC_IDX];
    // Partition 3 has partition 2 on its left and partition 1 above.
    assert_eq!(cu.intra_dir_predictors(3), [2, 26, PLANAR_IDX]);
    // Partition 1 sees partition 0 on its left and nothing above.
    assert_eq!(cu.intra_dir_predictors(1)[..2], [18, DC_IDX]);
}

#[test]
fn inter_neighbour_availability() {
    let mut cu = CodingUnit::new(32, 32, 4, 2, ChromaSampling::Cs420);
    cu.reset(PredMode::Inter, PartSize::SIZE_Nx2N);
    cu.motion[0].field = MvField {
        mv: [MotionVector::new(8, -4), MotionVector::ZERO],
        ref_idx: [0, -1],
    };
    cu.neighbors.left[3] = Some(inter_unit(1, 2, false));
    cu.neighbors.above[5] = Some(NeighborUnit::intra(DC_IDX));

    assert_eq!(cu.inter_neighbor(-1, 15, 0).unwrap().mv[0], MotionVector::new(1, 2));
    // Intra neighbours carry no motion.
    assert!(cu.inter_neighbor(20, -1, 0).is_none());
    // The first partition is visible to the second one only.
    assert!(cu.inter_neighbor(7, 15, 0).is_none());
    assert_eq!(cu.inter_neighbor(7, 15, 1).unwrap().mv[0], MotionVector::new(8, -4));
    // Below the coding unit is never available.
    assert!(cu.inter_neighbor(7, 16, 1).is_none());
}

#[test]
fn cbf_bitfields() {
    let mut cu = CodingUnit::new(0, 0, 4, 2, ChromaSampling::Cs420);
    cu.set_cbf_leaf(ColorPlane::Y, true, 1, 4, 4);
    cu.or_cbf(ColorPlane::Y, true, 0, 0, 16);
    assert!(cu.cbf_at(ColorPlane::Y, 0, 0));
    assert!(!cu.cbf_at(ColorPlane::Y, 0, 1));
    assert!(cu.cbf_at(ColorPlane::Y, 5, 1));
    assert!(cu.root_cbf());

    cu.clear_residual();
    assert!(!cu.root_cbf());
    cu.set_cbf_leaf(ColorPlane::Cr, true, 0, 0, 16);
    assert!(cu.root_cbf());
}

#[test]
fn coefficient_offsets_follow_z_order() {
    let cu = CodingUnit::new(0, 0, 4, 2, ChromaSampling::Cs420);
    assert_eq!(cu.coeff[0].len(), 256);
    assert_eq!(cu.coeff[1].len(), 64);
    assert_eq!(cu.coeff_offset(ColorPlane::Y, 4), 64);
    assert_eq!(cu.coeff_offset(ColorPlane::Cb, 4), 16);

    let mono = CodingUnit::new(0, 0, 3, 3, ChromaSampling::Cs400);
    assert!(mono.coeff[1].is_empty());
    assert_eq!(mono.planes(), &[ColorPlane::Y]);
}
