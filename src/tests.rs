#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::sync::Arc;

use super::*;

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
    for (i, plane) in ColorPlane::ALL.into_iter().enumerate() {
        let dec = usize::from(i > 0);
        let src = Rect::new(x >> dec, y >> dec, size >> dec, size >> dec);
        block
            .plane_mut(plane)
            .region_mut(Rect::new(0, 0, src.width, src.height))
            .copy_from(&pic.plane(plane).region(src));
    }
    block
}

#[test]
fn default_config_is_valid() {
    assert_eq!(SearchConfig::default().validate(), Ok(()));
}

#[test]
fn invalid_configs_are_rejected() {
    let base = SearchConfig::default();
    let cases = [
        (
            SearchConfig {
                bit_depth: 7,
                ..base
            },
            SearchError::BitDepth(7),
        ),
        (
            SearchConfig {
                tu_log2_min_size: 4,
                tu_log2_max_size: 3,
                ..base
            },
            SearchError::TuSizeBounds { min: 4, max: 3 },
        ),
        (
            SearchConfig {
                max_tu_depth_inter: 0,
                ..base
            },
            SearchError::TuDepth(0),
        ),
        (
            SearchConfig {
                search_range: MAX_SEARCH_RANGE + 1,
                ..base
            },
            SearchError::SearchRange(MAX_SEARCH_RANGE + 1),
        ),
        (
            SearchConfig {
                max_num_merge_cand: 6,
                ..base
            },
            SearchError::MergeCandidates(6),
        ),
        (
            SearchConfig {
                rd_penalty: 3,
                ..base
            },
            SearchError::RdPenalty(3),
        ),
    ];
    for (cfg, err) in cases {
        assert_eq!(cfg.validate(), Err(err));
        assert!(Search::<u8>::new(cfg).is_err());
    }
}

#[test]
fn qp_outside_range_is_rejected() {
    let mut search = Search::<u16>::new(SearchConfig {
        bit_depth: 10,
        ..SearchConfig::default()
    })
    .unwrap();
    assert_eq!(search.set_qp(52), Err(SearchError::Qp(52)));
    assert_eq!(search.qp(), 32);
    search.set_qp(0).unwrap();
    assert_eq!(search.qp(), 0);
}

#[test]
fn parallel_results_do_not_depend_on_threads() {
    let refs = [Arc::new(picture(4))];
    let current = picture(5);
    let recon = Yuv::new(64, 64, CS, 128u8);
    let jobs: Vec<_> = (0..4)
        .map(|i| {
            let (x, y) = ((i % 2) * 16, (i / 2) * 16);
            SearchJob {
                ctx: SliceContext {
                    slice_type: SliceType::P,
                    poc: 1,
                    ref_pocs: [&[0], &[]],
                    ref_pics: [&refs, &[]],
                    recon: &recon,
                    enable_tmvp: false,
                },
                cu: CodingUnit::new(x, y, 4, 2, CS),
                fenc: crop(&current, x, y, 16),
                qp: 30,
                entropy: Entropy::new(SliceType::P, 30),
            }
        })
        .collect();

    let single = search_blocks(SearchConfig::default(), &jobs, 1).unwrap();
    let multi = search_blocks(SearchConfig::default(), &jobs, 3).unwrap();
    assert_eq!(single.len(), jobs.len());
    for ((a, b), job) in single.iter().zip(&multi).zip(&jobs) {
        assert_eq!((a.cu.x, a.cu.y), (job.cu.x, job.cu.y));
        assert_eq!(a.cost, b.cost);
        assert_eq!(a.buffers, b.buffers);
    }
}

#[test]
fn invalid_job_qp_fails_the_batch() {
    let recon = Yuv::new(64, 64, CS, 128u8);
    let job = SearchJob {
        ctx: SliceContext {
            slice_type: SliceType::I,
            poc: 0,
            ref_pocs: [&[], &[]],
            ref_pics: [&[], &[]],
            recon: &recon,
            enable_tmvp: false,
        },
        cu: CodingUnit::new(0, 0, 3, 3, CS),
        fenc: Yuv::new(8, 8, CS, 128u8),
        qp: 60,
        entropy: Entropy::new(SliceType::I, 30),
    };
    let err = search_blocks(SearchConfig::default(), &[job], 2).unwrap_err();
    assert_eq!(err.downcast_ref::<SearchError>(), Some(&SearchError::Qp(60)));
}
