#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::{hint::black_box, sync::Arc};

use av_rdsearch::{
    CodingUnit, ColorPlane, Entropy, Rect, Search, SearchConfig, SearchJob, SearchMethod, SliceContext, SliceType, Yuv,
    search_blocks,
};
use criterion::{Criterion, criterion_group, criterion_main};
use v_frame::pixel::ChromaSampling;

const CS: ChromaSampling = ChromaSampling::Cs420;
const PIC_SIZE: usize = 128;

/// Smooth gradient with a little noise, so that motion search has a basin to
/// descend into.
fn picture(shift: usize, mut seed: u32) -> Yuv<u8> {
    let mut pic = Yuv::new(PIC_SIZE, PIC_SIZE, CS, 0u8);
    for (p, plane) in pic.planes.iter_mut().enumerate() {
        for y in 0..plane.height() {
            for x in 0..plane.width() {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let smooth = ((x + shift) * 3 + y * 2 + p * 40) % 200;
                plane[y][x] = (smooth + ((seed >> 16) as usize & 15)) as u8;
            }
        }
    }
    pic
}

fn crop(pic: &Yuv<u8>, x: usize, y: usize, size: usize) -> Yuv<u8> {
    let mut block = Yuv::new(size, size, CS, 0u8);
    for plane in ColorPlane::ALL {
        let (xdec, ydec) = if plane == ColorPlane::Y { (0, 0) } else { (1, 1) };
        let src = Rect::new(x >> xdec, y >> ydec, size >> xdec, size >> ydec);
        block
            .plane_mut(plane)
            .region_mut(Rect::new(0, 0, src.width, src.height))
            .copy_from(&pic.plane(plane).region(src));
    }
    block
}

fn p_slice<'a>(refs: &'a [Arc<Yuv<u8>>], recon: &'a Yuv<u8>) -> SliceContext<'a, u8> {
    SliceContext {
        slice_type: SliceType::P,
        poc: 1,
        ref_pocs: [&[0], &[]],
        ref_pics: [refs, &[]],
        recon,
        enable_tmvp: false,
    }
}

fn intra_benchmark(c: &mut Criterion) {
    let current = picture(0, 1);
    let recon = picture(0, 2);
    let fenc = crop(&current, 32, 32, 16);
    let ctx = SliceContext {
        slice_type: SliceType::I,
        poc: 0,
        ref_pocs: [&[], &[]],
        ref_pics: [&[], &[]],
        recon: &recon,
        enable_tmvp: false,
    };
    let mut search = Search::<u8>::new(SearchConfig::default()).unwrap();
    search.set_qp(32).unwrap();
    let cu = CodingUnit::new(32, 32, 4, 2, CS);

    c.bench_function("intra 16x16", |b| {
        b.iter(|| {
            search.reset_entropy(SliceType::I);
            black_box(search.check_best_mode(&ctx, black_box(&cu), &fenc));
        })
    });
}

fn inter_benchmark(c: &mut Criterion) {
    let refs = [Arc::new(picture(3, 5))];
    let current = picture(0, 6);
    let recon = picture(0, 7);
    let ctx = p_slice(&refs, &recon);
    let fenc = crop(&current, 48, 48, 32);
    let cu = CodingUnit::new(48, 48, 5, 1, CS);

    let mut group = c.benchmark_group("inter 32x32");
    for method in [SearchMethod::Dia, SearchMethod::Hex, SearchMethod::Umh] {
        let cfg = SearchConfig {
            search_method: method,
            ..SearchConfig::default()
        };
        let mut search = Search::<u8>::new(cfg).unwrap();
        search.set_qp(32).unwrap();
        group.bench_function(format!("{:?}", method), |b| {
            b.iter(|| {
                search.reset_entropy(SliceType::P);
                black_box(search.check_best_mode(&ctx, black_box(&cu), &fenc));
            })
        });
    }
    group.finish();
}

fn parallel_benchmark(c: &mut Criterion) {
    let refs = [Arc::new(picture(2, 9))];
    let current = picture(0, 10);
    let recon = picture(0, 11);
    let jobs: Vec<_> = (0..16)
        .map(|i| {
            let (x, y) = ((i % 4) * 32, (i / 4) * 32);
            SearchJob {
                ctx: p_slice(&refs, &recon),
                cu: CodingUnit::new(x, y, 5, 1, CS),
                fenc: crop(&current, x, y, 32),
                qp: 32,
                entropy: Entropy::new(SliceType::P, 32),
            }
        })
        .collect();

    let mut group = c.benchmark_group("search blocks");
    group.sample_size(20);
    group.bench_function("16 units, 4 threads", |b| {
        b.iter(|| black_box(search_blocks(SearchConfig::default(), &jobs, 4).unwrap()))
    });
    group.finish();
}

criterion_group!(search_bench, intra_benchmark, inter_benchmark, parallel_benchmark);
criterion_main!(search_bench);
