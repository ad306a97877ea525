#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;
use crate::data::{block::plane_shift, cu::PredMode, entropy::frac_to_bits, motion::MotionVector};

const CS: ChromaSampling = ChromaSampling::Cs420;

fn picture(mut seed: u32) -> Yuv<u8> {
    let mut pic = Yuv::new(64, 64, CS, 0u8);
    for plane in &mut pic.planes {
        for y in 0..plane.height() {
            for x in 0..plane.width() {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                plane[y][x] = (seed >> 16) as u8;
            }
        }
    }
    pic
}

fn crop(pic: &Yuv<u8>, x: usize, y: usize, size: usize) -> Yuv<u8> {
    let mut block = Yuv::new(size, size, CS, 0u8);
    for plane in ColorPlane::ALL {
        let (xdec, ydec) = plane_shift(CS, plane);
        let src = Rect::new(x >> xdec, y >> ydec, size >> xdec, size >> ydec);
        block
            .plane_mut(plane)
            .region_mut(Rect::new(0, 0, src.width, src.height))
            .copy_from(&pic.plane(plane).region(src));
    }
    block
}

fn search(cfg: SearchConfig, slice_type: SliceType) -> Search<u8> {
    let mut search = Search::new(cfg).unwrap();
    search.set_qp(30).unwrap();
    search.reset_entropy(slice_type);
    search
}

#[test]
fn identical_reference_is_skipped() {
    let reference = picture(42);
    let fenc = crop(&reference, 16, 16, 16);
    let refs = [Arc::new(reference)];
    let recon = Yuv::new(64, 64, CS, 128u8);
    let ctx = SliceContext {
        slice_type: SliceType::P,
        poc: 1,
        ref_pocs: [&[0], &[]],
        ref_pics: [&refs, &[]],
        recon: &recon,
        enable_tmvp: false,
    };
    let cu = CodingUnit::new(16, 16, 4, 2, CS);
    let mut search = search(SearchConfig::default(), SliceType::P);

    let best = search.check_best_mode(&ctx, &cu, &fenc);

    assert_eq!(best.cu.pred_mode, PredMode::Inter);
    assert!(best.cu.skip);
    assert_eq!(best.cu.motion[0].field.mv[0], MotionVector::ZERO);
    assert_eq!(best.cost.distortion, 0);
    assert_eq!(best.buffers.recon, fenc);

    let mut intra_cu = cu.clone();
    let mut buffers = ModeBuffers::new(4, CS);
    search.reset_entropy(SliceType::P);
    let intra = search.check_intra(&ctx, &mut intra_cu, PartSize::SIZE_2Nx2N, &fenc, &mut buffers);
    assert!(best.cost.cost < intra.cost);
}

#[test]
fn early_skip_ends_the_decision() {
    let reference = picture(8);
    let fenc = crop(&reference, 32, 0, 16);
    let refs = [Arc::new(reference)];
    let recon = Yuv::new(64, 64, CS, 128u8);
    let ctx = SliceContext {
        slice_type: SliceType::P,
        poc: 1,
        ref_pocs: [&[0], &[]],
        ref_pics: [&refs, &[]],
        recon: &recon,
        enable_tmvp: false,
    };
    let cfg = SearchConfig {
        early_skip_zero_residual: true,
        ..SearchConfig::default()
    };
    let mut search = search(cfg, SliceType::P);

    let best = search.check_best_mode(&ctx, &CodingUnit::new(32, 0, 4, 2, CS), &fenc);

    assert!(best.cu.skip);
    assert_eq!(search.stats().intra_predictions, 0);
    assert_eq!(search.stats().me_candidates, 0);
}

#[test]
fn intra_slices_only_try_intra() {
    let recon = Yuv::new(64, 64, CS, 128u8);
    let fenc = crop(&picture(3), 0, 0, 8);
    let ctx = SliceContext {
        slice_type: SliceType::I,
        poc: 0,
        ref_pocs: [&[], &[]],
        ref_pics: [&[], &[]],
        recon: &recon,
        enable_tmvp: false,
    };
    let mut search = search(SearchConfig::default(), SliceType::I);

    let best = search.check_best_mode(&ctx, &CodingUnit::new(0, 0, 3, 3, CS), &fenc);

    assert_eq!(best.cu.pred_mode, PredMode::Intra);
    assert!(best.cost.cost < u64::MAX);
    assert_eq!(search.stats().motion_compensations, 0);
}

#[test]
fn entropy_state_follows_the_winner() {
    let recon = Yuv::new(64, 64, CS, 128u8);
    let fenc = crop(&picture(77), 0, 0, 8);
    let ctx = SliceContext {
        slice_type: SliceType::I,
        poc: 0,
        ref_pocs: [&[], &[]],
        ref_pics: [&[], &[]],
        recon: &recon,
        enable_tmvp: false,
    };
    let mut search = search(SearchConfig::default(), SliceType::I);
    let start = search.entropy().frac_bits();

    let best = search.check_best_mode(&ctx, &CodingUnit::new(0, 0, 3, 3, CS), &fenc);

    let spent = frac_to_bits(search.entropy().frac_bits() - start);
    assert_eq!(spent, best.cost.bits);
}

#[test]
fn transform_depth_range() {
    let search = search(SearchConfig::default(), SliceType::P);
    let mut cu = CodingUnit::new(0, 0, 5, 1, CS);
    assert_eq!(search.tu_depth_range(&cu, true), DepthRange::new(5, 5));
    assert_eq!(search.tu_depth_range(&cu, false), DepthRange::new(4, 5));

    cu.part_size = PartSize::SIZE_NxN;
    assert_eq!(search.tu_depth_range(&cu, true), DepthRange::new(4, 5));

    let cu = CodingUnit::new(0, 0, 6, 0, CS);
    // 64x64 units never code a transform of their own size.
    assert_eq!(search.tu_depth_range(&cu, true).max_log2, 5);
}
