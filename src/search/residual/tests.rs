#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;
use crate::SearchConfig;

fn search(cs: ChromaSampling) -> Search<u8> {
    let cfg = SearchConfig {
        chroma_sampling: cs,
        max_tu_depth_inter: 3,
        ..SearchConfig::default()
    };
    let mut search = Search::new(cfg).unwrap();
    search.set_qp(30).unwrap();
    search
}

fn prepare(search: &mut Search<u8>, cu: &CodingUnit, fenc: &Yuv<u8>, pred: &Yuv<u8>) {
    let area = Rect::new(0, 0, cu.size(), cu.size());
    for &plane in cu.planes() {
        subtract(
            &fenc.region_for(plane, area),
            &pred.region_for(plane, area),
            &mut search.cu_resi.region_for_mut(plane, area),
        );
    }
}

#[test]
fn zero_residual_skips_transforms() {
    let cs = ChromaSampling::Cs400;
    let mut search = search(cs);
    let fenc = Yuv::new(16, 16, cs, 100u8);
    let pred = fenc.clone();
    let mut cu = CodingUnit::new(0, 0, 4, 2, cs);
    cu.reset(PredMode::Inter, PartSize::SIZE_2Nx2N);
    prepare(&mut search, &cu, &fenc, &pred);

    let range = search.tu_depth_range(&cu, false);
    let qt = search.estimate_residual_qt(&mut cu, &fenc, &pred, 0, 0, 4, range);

    assert_eq!(search.stats().transforms, 0);
    assert_eq!(qt.dist, 0);
    assert_eq!(qt.zero_dist, 0);
    assert!(!cu.root_cbf());
    // Equal distortion either way: the split flag alone decides.
    assert_eq!(cu.tr_idx[0], 0);
}

#[test]
fn reported_distortion_matches_the_decided_tree() {
    let cs = ChromaSampling::Cs400;
    let mut search = search(cs);
    let pred = Yuv::new(16, 16, cs, 128u8);
    let mut fenc = pred.clone();
    for y in 0..16 {
        for x in 0..16 {
            // Strong detail in one quadrant, a faint ramp elsewhere.
            fenc.planes[0][y][x] = if x < 8 && y < 8 {
                if (x + y) % 2 == 0 { 20 } else { 230 }
            } else {
                (128 + (x + y) / 4) as u8
            };
        }
    }
    let mut cu = CodingUnit::new(0, 0, 4, 2, cs);
    cu.reset(PredMode::Inter, PartSize::SIZE_2Nx2N);
    prepare(&mut search, &cu, &fenc, &pred);

    let range = search.tu_depth_range(&cu, false);
    let qt = search.estimate_residual_qt(&mut cu, &fenc, &pred, 0, 0, 4, range);
    assert!(cu.root_cbf());
    assert!(qt.bits > 0);
    assert!(qt.dist < qt.zero_dist);

    let mut resi = Yuv::new(16, 16, cs, 0i16);
    search.set_residual_qt_data(&mut cu, Some(&mut resi), 0, 0, 4);
    let sse: u64 = (0..16)
        .flat_map(|y| (0..16).map(move |x| (y, x)))
        .map(|(y, x)| {
            let d = i64::from(search.cu_resi.planes[0][y][x]) - i64::from(resi.planes[0][y][x]);
            (d * d) as u64
        })
        .sum();
    assert_eq!(qt.dist, sse);
    assert!(search.stats().transforms > 0);
}

#[test]
fn stacked_chroma_flags() {
    let mut cu = CodingUnit::new(0, 0, 3, 3, ChromaSampling::Cs422);
    offset_sub_tu_cbfs(&mut cu, ColorPlane::Cb, [false, true], 1, 0, 4);
    assert_eq!(cu.cbf[1][..4], [2, 2, 6, 6]);
    assert_eq!(sub_tu_cbfs(&cu, ColorPlane::Cb, 1, 0, 4), [false, true]);
    assert!(cu.cbf_at(ColorPlane::Cb, 0, 1));

    store_chroma_cbfs(&mut cu, ColorPlane::Cr, [false, false], 1, 0, 4);
    assert_eq!(cu.cbf[2][..4], [0; 4]);
}

#[test]
fn chroma_placement() {
    assert_eq!(chroma_log2(ChromaSampling::Cs420, 2), None);
    assert_eq!(chroma_log2(ChromaSampling::Cs420, 3), Some(2));
    assert_eq!(chroma_log2(ChromaSampling::Cs444, 2), Some(2));
    assert_eq!(chroma_log2(ChromaSampling::Cs400, 4), None);
    assert!(chroma_shared(ChromaSampling::Cs420, 3));
    assert!(chroma_shared(ChromaSampling::Cs422, 3));
    assert!(!chroma_shared(ChromaSampling::Cs444, 3));
    assert_eq!(chroma_sub_tus(ChromaSampling::Cs422), 2);

    let luma = Rect::new(8, 8, 8, 8);
    assert_eq!(
        block_rect(ChromaSampling::Cs422, ColorPlane::Cr, luma, 3, 1),
        (Rect::new(4, 12, 4, 4), 2)
    );
    assert_eq!(
        block_rect(ChromaSampling::Cs420, ColorPlane::Cb, luma, 3, 0),
        (Rect::new(4, 4, 4, 4), 2)
    );
}

#[test]
fn split_cost_is_the_sum_of_its_children() {
    let cs = ChromaSampling::Cs400;
    let mut search = search(cs);
    let pred = Yuv::new(16, 16, cs, 128u8);
    let mut fenc = pred.clone();
    for y in 0..16 {
        for x in 0..16 {
            fenc.planes[0][y][x] = (96 + (x * 7 + y * 13) % 64) as u8;
        }
    }
    let mut cu = CodingUnit::new(0, 0, 4, 2, cs);
    cu.reset(PredMode::Inter, PartSize::SIZE_2Nx2N);
    prepare(&mut search, &cu, &fenc, &pred);

    // 16x16 cannot be coded whole, so the split is implied and costs no flag.
    let range = DepthRange::new(3, 3);
    let start = search.entropy.checkpoint();
    let whole = search.estimate_residual_qt(&mut cu, &fenc, &pred, 0, 0, 4, range);
    assert_eq!(cu.tr_idx[0], 1);

    search.entropy.rollback(&start);
    let mut children = QtResult::default();
    for i in 0..4 {
        children += search.estimate_residual_qt(&mut cu, &fenc, &pred, i * 4, 1, 3, range);
    }
    assert_eq!(whole, children);
}
