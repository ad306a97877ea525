#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;

#[test]
fn equiprobable_init_costs_one_bit() {
    // initValue 154 maps to state 0 at every QP.
    for qp in [0, 22, 37, 51] {
        assert_eq!(init_context(154, qp), 1);
    }
    let mut e = Entropy::new(SliceType::I, 32);
    e.code_merge_flag(true);
    assert_eq!(e.frac_bits(), FRAC_BITS_SCALE);
    assert_eq!(e.bits(), 1);
}

#[test]
fn repeated_bins_get_cheaper() {
    let mut e = Entropy::new(SliceType::P, 32);
    let mut last = u64::MAX;
    for _ in 0..8 {
        let before = e.frac_bits();
        e.code_root_cbf(true);
        let cost = e.frac_bits() - before;
        assert!(cost <= last);
        last = cost;
    }
    let before = e.frac_bits();
    e.code_root_cbf(false);
    assert!(e.frac_bits() - before > last);
}

#[test]
fn rollback_restores_models_and_bits() {
    let mut e = Entropy::new(SliceType::B, 27);
    e.code_split_transform(true, 5);
    let checkpoint = e.checkpoint();
    let snapshot = e.clone();

    e.code_mvd(MotionVector::new(-7, 12));
    e.code_coeff(&[3i16; 16], 2, true);
    assert_ne!(e, snapshot);

    e.rollback(&checkpoint);
    assert_eq!(e, snapshot);
}

#[test]
fn bypass_bins_cost_exactly_one_bit() {
    let mut e = Entropy::new(SliceType::I, 30);
    e.encode_bins_ep(5);
    assert_eq!(e.frac_bits(), 5 * FRAC_BITS_SCALE);
}

#[test]
fn golomb_bin_counts() {
    assert_eq!(exp_golomb_bins(0, 1), 2);
    assert_eq!(exp_golomb_bins(1, 1), 2);
    assert_eq!(exp_golomb_bins(2, 1), 4);
    assert_eq!(exp_golomb_bins(5, 1), 4);
    assert_eq!(exp_golomb_bins(6, 1), 6);

    assert_eq!(coeff_remain_bins(0, 0), 1);
    assert_eq!(coeff_remain_bins(2, 0), 3);
    assert_eq!(coeff_remain_bins(3, 0), 4);
    assert_eq!(coeff_remain_bins(4, 0), 6);
    assert_eq!(coeff_remain_bins(2, 1), 3);
}

#[test]
fn zero_mvd_uses_two_context_bins() {
    let mut e = Entropy::new(SliceType::I, 32);
    e.code_mvd(MotionVector::ZERO);
    assert_eq!(e.frac_bits(), 2 * FRAC_BITS_SCALE);
}

#[test]
fn zero_block_codes_nothing() {
    let mut e = Entropy::new(SliceType::P, 32);
    e.code_coeff(&[0i16; 64], 3, true);
    assert_eq!(e.frac_bits(), 0);
}

#[test]
fn more_coefficients_cost_more() {
    let cost = |coeff: &[i16], log2| {
        let mut e = Entropy::new(SliceType::P, 32);
        e.code_coeff(coeff, log2, true);
        e.frac_bits()
    };
    let mut dc = [0i16; 16];
    dc[0] = 1;
    let mut big_dc = dc;
    big_dc[0] = 40;
    let mut two = dc;
    two[5] = -1;
    assert!(cost(&dc, 2) > 0);
    assert!(cost(&big_dc, 2) > cost(&dc, 2));
    assert!(cost(&two, 2) > cost(&dc, 2));

    // A coefficient far into a 32x32 block needs the last position suffix
    // and coded sub-block flags.
    let mut far = vec![0i16; 1024];
    far[0] = 1;
    far[31 * 32 + 31] = 1;
    let mut near = vec![0i16; 1024];
    near[0] = 1;
    assert!(cost(&far, 5) > cost(&near, 5));
}

#[test]
fn chroma_contexts_stay_in_range() {
    let mut e = Entropy::new(SliceType::B, 22);
    for log2 in 2..=5 {
        let n = 1usize << log2;
        let coeff: Vec<i16> = (0..n * n).map(|i| ((i * 7) % 5) as i16 - 2).collect();
        e.code_coeff(&coeff, log2, false);
        e.code_coeff(&coeff, log2, true);
    }
    assert!(e.bits() > 0);
}

#[test]
fn sig_ctx_layout() {
    assert_eq!(sig_ctx(0, 0, 3, 0, true), 0);
    assert_eq!(sig_ctx(0, 0, 3, 0, false), 27);
    assert_eq!(sig_ctx(1, 0, 2, 0, true), 1);
    assert_eq!(sig_ctx(3, 3, 2, 0, false), 27 + 8);
    assert_eq!(sig_ctx(1, 0, 3, 0, true), 9 + 1);
    assert_eq!(sig_ctx(5, 4, 3, 3, true), 9 + 3 + 2);
    assert_eq!(sig_ctx(7, 7, 5, 0, true), 21 + 3);
    assert_eq!(sig_ctx(7, 7, 5, 3, false), 27 + 12 + 2);
}

#[test]
fn scans_are_permutations() {
    for (scan, n) in [(&SCAN_2X2, 2usize), (&SCAN_4X4, 4), (&SCAN_8X8, 8)] {
        let mut seen = vec![false; n * n];
        for &p in &scan[..n * n] {
            assert!(!seen[p as usize]);
            seen[p as usize] = true;
        }
    }
    // up-right diagonal: bottom-left sample of each diagonal first
    assert_eq!(&SCAN_4X4[..6], &[0, 4, 1, 8, 5, 2]);
}

#[test]
fn part_size_bins() {
    let cost = |part, intra, log2, amp| {
        let mut e = Entropy::new(SliceType::I, 32);
        e.code_part_size(part, intra, log2, amp);
        e.frac_bits()
    };
    // The AMP bins use a context initialized to one bit and a bypass bin.
    let step = cost(PartSize::SIZE_2NxN, false, 4, true) - cost(PartSize::SIZE_2NxN, false, 3, true);
    assert_eq!(step, FRAC_BITS_SCALE);
    let amp = cost(PartSize::SIZE_nLx2N, false, 4, true) - cost(PartSize::SIZE_Nx2N, false, 4, true);
    assert_eq!(amp, FRAC_BITS_SCALE);
    assert_eq!(cost(PartSize::SIZE_NxN, true, 4, false), 0);
    assert!(cost(PartSize::SIZE_NxN, true, 3, false) > 0);
}
