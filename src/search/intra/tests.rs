#![allow(clippy::unwrap_used, reason = "allow in test files")]

use v_frame::pixel::ChromaSampling;

use super::*;
use crate::{
    SearchConfig,
    data::{
        cu::{NeighborUnit, SliceType},
        prediction::{DC_IDX, PLANAR_IDX, VER_IDX},
    },
    search::{ModeBuffers, SliceContext},
};

fn intra_slice(recon: &Yuv<u8>) -> SliceContext<'_, u8> {
    SliceContext {
        slice_type: SliceType::I,
        poc: 0,
        ref_pocs: [&[], &[]],
        ref_pics: [&[], &[]],
        recon,
        enable_tmvp: false,
    }
}

fn search(cfg: SearchConfig) -> Search<u8> {
    let mut search = Search::new(cfg).unwrap();
    search.set_qp(27).unwrap();
    search
}

#[test]
fn flat_block_needs_no_residual() {
    let cfg = SearchConfig {
        max_tu_depth_intra: 2,
        ..SearchConfig::default()
    };
    let recon = Yuv::new(64, 64, ChromaSampling::Cs420, 128u8);
    for (log2, depth) in [(3, 3), (4, 2)] {
        let mut search = search(cfg);
        let size = 1 << log2;
        let fenc = Yuv::new(size, size, ChromaSampling::Cs420, 128u8);
        let mut cu = CodingUnit::new(0, 0, log2, depth, ChromaSampling::Cs420);
        let mut out = ModeBuffers::new(log2, ChromaSampling::Cs420);

        let cost = search.check_intra(&intra_slice(&recon), &mut cu, PartSize::SIZE_2Nx2N, &fenc, &mut out);

        assert_eq!(cost.distortion, 0);
        assert!(cost.bits > 0);
        assert!(!cu.root_cbf());
        // Splitting costs flag bits for no distortion gain.
        assert_eq!(cu.tr_idx[0], 0);
        assert_eq!(out.recon, fenc);
        assert_eq!(search.stats().transforms, 0);
    }
}

#[test]
fn vertical_stripes_pick_vertical_mode() {
    let mut search = search(SearchConfig::default());
    let mut recon = Yuv::new(64, 64, ChromaSampling::Cs420, 128u8);
    let stripe = |x: usize| if x % 2 == 0 { 40u8 } else { 210 };
    for y in 0..64 {
        for x in 0..64 {
            recon.planes[0][y][x] = stripe(x);
        }
    }
    let mut fenc = Yuv::new(8, 8, ChromaSampling::Cs420, 128u8);
    for y in 0..8 {
        for x in 0..8 {
            fenc.planes[0][y][x] = stripe(x + 8);
        }
    }
    let mut cu = CodingUnit::new(8, 8, 3, 3, ChromaSampling::Cs420);
    for unit in &mut cu.neighbors.above {
        *unit = Some(NeighborUnit::intra(DC_IDX));
    }
    let mut out = ModeBuffers::new(3, ChromaSampling::Cs420);

    let cost = search.check_intra(&intra_slice(&recon), &mut cu, PartSize::SIZE_2Nx2N, &fenc, &mut out);

    assert_eq!(cu.luma_dir[0], VER_IDX);
    assert_eq!(cost.distortion, 0);
    assert_eq!(out.recon.planes[0], fenc.planes[0]);
}

#[test]
fn most_probable_modes_are_cheaper() {
    let mut search = search(SearchConfig::default());
    let mpms = [PLANAR_IDX, DC_IDX, VER_IDX];
    let rem = search.mode_bits_rem_intra(mpms);
    for mode in mpms {
        assert!(search.mode_bits_intra(mode, mpms) < rem);
    }
    // Every direction outside the list costs the same.
    assert_eq!(search.mode_bits_intra(2, mpms), rem);
    assert_eq!(search.mode_bits_intra(34, mpms), rem);
}

#[test]
fn nxn_splits_the_transform_tree() {
    let mut search = search(SearchConfig::default());
    let recon = Yuv::new(64, 64, ChromaSampling::Cs420, 128u8);
    let mut fenc = Yuv::new(8, 8, ChromaSampling::Cs420, 128u8);
    for y in 0..8 {
        for x in 0..8 {
            fenc.planes[0][y][x] = (16 * x + 8 * y) as u8;
        }
    }
    let mut cu = CodingUnit::new(0, 0, 3, 3, ChromaSampling::Cs420);
    let mut out = ModeBuffers::new(3, ChromaSampling::Cs420);

    let cost = search.check_intra(&intra_slice(&recon), &mut cu, PartSize::SIZE_NxN, &fenc, &mut out);

    assert_eq!(cu.part_size, PartSize::SIZE_NxN);
    assert!(cu.tr_idx[..4].iter().all(|&d| d == 1));
    assert!(cost.cost < u64::MAX);
    assert!(search.stats().intra_predictions > 0);
}

#[test]
fn rd_penalty_forbids_largest_transform_in_inter_slices() {
    let recon = Yuv::new(64, 64, ChromaSampling::Cs420, 128u8);
    let fenc = Yuv::new(32, 32, ChromaSampling::Cs420, 128u8);
    let ctx = SliceContext {
        slice_type: SliceType::P,
        ..intra_slice(&recon)
    };

    for (rd_penalty, depth) in [(0, 0), (2, 1)] {
        let cfg = SearchConfig {
            max_tu_depth_intra: 2,
            rd_penalty,
            ..SearchConfig::default()
        };
        let mut search = search(cfg);
        search.reset_entropy(SliceType::P);
        let mut cu = CodingUnit::new(0, 0, 5, 1, ChromaSampling::Cs420);
        let mut out = ModeBuffers::new(5, ChromaSampling::Cs420);

        let cost = search.check_intra(&ctx, &mut cu, PartSize::SIZE_2Nx2N, &fenc, &mut out);

        assert_eq!(cost.distortion, 0);
        assert_eq!(cu.tr_idx[0], depth);
    }
}

#[test]
fn coefficient_regeneration_matches_the_decision() {
    let recon = Yuv::new(64, 64, ChromaSampling::Cs420, 128u8);
    let ctx = intra_slice(&recon);
    let cfg = SearchConfig {
        max_tu_depth_intra: 2,
        ..SearchConfig::default()
    };

    for (log2, depth, part_size) in [(4, 2, PartSize::SIZE_2Nx2N), (3, 3, PartSize::SIZE_NxN)] {
        let size = 1 << log2;
        let mut fenc = Yuv::new(size, size, ChromaSampling::Cs420, 0u8);
        let mut seed = 7u32;
        for plane in &mut fenc.planes {
            for y in 0..plane.height() {
                for x in 0..plane.width() {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    plane[y][x] = (96 + 4 * x + ((seed >> 16) as usize & 31)) as u8;
                }
            }
        }
        let mut search = search(cfg);
        let mut cu = CodingUnit::new(0, 0, log2, depth, ChromaSampling::Cs420);
        let mut out = ModeBuffers::new(log2, ChromaSampling::Cs420);
        search.check_intra(&ctx, &mut cu, part_size, &fenc, &mut out);
        assert!(cu.root_cbf());

        let mut again = cu.clone();
        for coeff in &mut again.coeff {
            coeff.fill(0);
        }
        let mut regenerated = out.clone();
        for plane in &mut regenerated.recon.planes {
            plane.fill(0);
        }
        let entropy = search.entropy().frac_bits();
        search.generate_coeff_recon(&ctx, &mut again, &fenc, &mut regenerated);

        assert_eq!(regenerated.recon, out.recon);
        assert_eq!(again.coeff, cu.coeff);
        assert_eq!(again.cbf, cu.cbf);
        assert_eq!(search.entropy().frac_bits(), entropy);
    }
}
