#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;

#[test]
fn lambdas_are_truncated_to_fix8() {
    let mut rd = RdCost::default();
    rd.set_lambda(1.999, 0.5);
    assert_eq!(rd.lambda2(), 511);
    assert_eq!(rd.lambda(), 128);
}

#[test]
fn qp_12_gives_base_lambda() {
    let mut rd = RdCost::default();
    rd.set_qp(12, ChromaSampling::Cs420);
    // 0.57 * 256 = 145.92
    assert_eq!(rd.lambda2(), 145);
    // sqrt(0.57) * 256 = 193.27
    assert_eq!(rd.lambda(), 193);
}

#[test]
fn lambda_doubles_every_three_qp() {
    let mut rd = RdCost::default();
    rd.set_qp(24, ChromaSampling::Cs420);
    let low = rd.lambda2();
    rd.set_qp(27, ChromaSampling::Cs420);
    let high = rd.lambda2();
    assert!(high.abs_diff(2 * low) <= 1);
}

#[test]
fn cost_rounding() {
    let mut rd = RdCost::default();
    rd.set_lambda(1.0, 1.0);
    assert_eq!(rd.calc_rd_cost(100, 3), 103);
    assert_eq!(rd.calc_rd_sad_cost(100, 3), 103);

    rd.set_lambda(0.5, 0.25);
    // 3 * 128 + 128 = 512 -> 2
    assert_eq!(rd.calc_rd_cost(0, 3), 2);
    // 3 * 64 + 128 = 320 -> 1
    assert_eq!(rd.sad_cost(3), 1);
}

#[test]
fn psy_term_is_added_only_when_enabled() {
    let mut rd = RdCost::default();
    rd.set_lambda(4.0, 2.0);
    assert_eq!(rd.calc_psy_rd_cost(10, 1, 1000), rd.calc_rd_cost(10, 1));
    rd.set_psy_rd(256);
    // lambda 2.0 * strength 1.0 * 1000
    assert_eq!(rd.calc_psy_rd_cost(10, 1, 1000), rd.calc_rd_cost(10, 1) + 2000);
}

#[test]
fn chroma_weight_follows_qp_offset() {
    let mut rd = RdCost::default();
    rd.set_qp(20, ChromaSampling::Cs420);
    // Below QP 30 chroma uses the luma QP.
    assert_eq!(rd.scale_chroma_dist(ColorPlane::Cb, 1000), 1000);
    assert_eq!(rd.scale_chroma_dist(ColorPlane::Y, 1000), 1000);

    rd.set_qp(45, ChromaSampling::Cs420);
    // qp_c = 39: weight 2^2 = 4
    assert_eq!(rd.scale_chroma_dist(ColorPlane::Cr, 1000), 4000);
}
