#![allow(clippy::unwrap_used, reason = "allow in test files")]

use v_frame::pixel::ChromaSampling;

use super::*;

fn pattern(n: usize) -> Vec<i16> {
    (0..n * n)
        .map(|i| {
            let (x, y) = (i % n, i / n);
            (((x * 37 + y * 91 + x * y * 13) % 97) as i16) - 48
        })
        .collect()
}

#[test]
fn basis_rows_match_known_hevc_values() {
    assert_eq!(&DCT32[4][..8], &[89, 75, 50, 18, -18, -50, -75, -89]);
    assert_eq!(&DCT32[8][..4], &[83, 36, -36, -83]);
    assert_eq!(&DCT32[16][..4], &[64, -64, -64, 64]);
    assert_eq!(&DCT32[24][..4], &[36, -83, 83, -36]);
    assert_eq!(DCT32[1][0], 90);
    assert_eq!(DCT32[31][31], -4);
}

#[test]
fn constant_residual_has_only_dc() {
    let resi = [10i16; 16];
    let mut coeff = [0i32; 16];
    forward_transform(&resi, &mut coeff, 2, false, 8);
    assert_eq!(coeff[0], 1280);
    assert!(coeff[1..].iter().all(|&c| c == 0));

    let mut back = [0i16; 16];
    inverse_transform(&coeff, &mut back, 2, false, 8);
    assert_eq!(back, resi);
}

#[test]
fn round_trip_is_near_lossless() {
    for (log2, dst) in [(2, false), (2, true), (3, false), (4, false), (5, false)] {
        let n = 1 << log2;
        let resi = pattern(n);
        let mut coeff = vec![0i32; n * n];
        let mut back = vec![0i16; n * n];
        forward_transform(&resi, &mut coeff, log2, dst, 8);
        inverse_transform(&coeff, &mut back, log2, dst, 8);
        for (a, b) in resi.iter().zip(&back) {
            assert!((a - b).abs() <= 1, "log2 {} dst {}", log2, dst);
        }
    }
}

#[test]
fn quantization_with_dead_zone() {
    let params = QuantParams::new(22, 2, 8, false);
    let coeff = [1000, -1000, 100, 0];
    let mut levels = [0i16; 4];
    assert_eq!(quant(&coeff, &mut levels, params), 2);
    assert_eq!(levels, [4, -4, 0, 0]);

    let mut rec = [0i32; 4];
    dequant(&levels, &mut rec, params);
    assert_eq!(rec, [1024, -1024, 0, 0]);
}

#[test]
fn intra_rounding_offset_is_larger() {
    // 700 sits between the inter and intra decision thresholds at QP 22.
    let coeff = [700];
    let mut levels = [0i16; 1];
    quant(&coeff, &mut levels, QuantParams::new(22, 2, 8, false));
    assert_eq!(levels[0], 2);
    quant(&coeff, &mut levels, QuantParams::new(22, 2, 8, true));
    assert_eq!(levels[0], 3);
}

#[test]
fn chroma_qp_mapping() {
    assert_eq!(chroma_qp(25, ChromaSampling::Cs420), 25);
    assert_eq!(chroma_qp(30, ChromaSampling::Cs420), 29);
    assert_eq!(chroma_qp(37, ChromaSampling::Cs420), 34);
    assert_eq!(chroma_qp(43, ChromaSampling::Cs420), 37);
    assert_eq!(chroma_qp(50, ChromaSampling::Cs420), 44);
    assert_eq!(chroma_qp(37, ChromaSampling::Cs444), 37);
    assert_eq!(chroma_qp(55, ChromaSampling::Cs422), 51);
}
