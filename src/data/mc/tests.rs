#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;
use crate::data::plane::Rect;

fn ramp_plane(w: usize, h: usize) -> PlaneBuf<u8> {
    let mut plane = PlaneBuf::new(w, h, 0u8);
    for y in 0..h {
        for (x, p) in plane[y].iter_mut().enumerate() {
            *p = ((x * 7 + y * 3) & 255) as u8;
        }
    }
    plane
}

fn predict_uni(src: &PlaneBuf<u8>, pos: SubpelPos, w: usize, h: usize) -> PlaneBuf<u8> {
    let mut tmp = vec![0i32; w * h];
    predict_hp(src, pos, w, h, 8, &mut tmp);
    let mut out = PlaneBuf::new(w, h, 0u8);
    store_uni(&tmp, &mut out.region_mut(Rect::new(0, 0, w, h)), 8);
    out
}

#[test]
fn fullpel_vector_copies_shifted_block() {
    let src = ramp_plane(32, 32);
    let mv = MotionVector::from_fullpel(2, -3);
    let pos = SubpelPos::new(8, 8, mv, 0, 0, true);
    assert_eq!((pos.x, pos.y, pos.frac_x, pos.frac_y), (5, 10, 0, 0));

    let out = predict_uni(&src, pos, 8, 8);
    for y in 0..8 {
        assert_eq!(&out[y], &src[10 + y][5..13]);
    }
}

#[test]
fn subpel_on_flat_area_is_flat() {
    let src = PlaneBuf::new(16, 16, 90u8);
    for (row, col) in [(1, 0), (0, 2), (3, 1), (2, 2)] {
        let pos = SubpelPos::new(4, 4, MotionVector::new(row, col), 0, 0, true);
        let out = predict_uni(&src, pos, 4, 4);
        assert!(out.data().iter().all(|&p| p == 90));
    }
}

#[test]
fn reads_outside_the_plane_are_clamped() {
    let src = ramp_plane(16, 16);
    let pos = SubpelPos::new(0, 0, MotionVector::from_fullpel(-8, -8), 0, 0, true);
    let out = predict_uni(&src, pos, 4, 4);
    assert!(out.data().iter().all(|&p| p == src[0][0]));
}

#[test]
fn half_pel_interpolates_between_neighbours() {
    // Columns alternate 0, 64 so the half-pel filter lands in between.
    let mut src = PlaneBuf::new(32, 8, 0u8);
    for y in 0..8 {
        for x in 0..32 {
            src[y][x] = if x < 16 { 0 } else { 128 };
        }
    }
    let pos = SubpelPos::new(12, 0, MotionVector::new(0, 2), 0, 0, true);
    let out = predict_uni(&src, pos, 8, 1);
    // Symmetric filter at the step edge gives the midpoint.
    assert_eq!(out[0][3], 64);
    assert_eq!(out[0][0], 0);
    assert_eq!(out[0][7], 128);
}

#[test]
fn chroma_phase_for_420() {
    let mv = MotionVector::new(-3, 13);
    let pos = SubpelPos::new(4, 4, mv, 1, 1, false);
    assert_eq!((pos.x, pos.frac_x), (5, 5));
    assert_eq!((pos.y, pos.frac_y), (3, 5));

    let pos = SubpelPos::new(4, 4, MotionVector::new(2, 2), 0, 0, false);
    assert_eq!((pos.x, pos.frac_x, pos.frac_y), (4, 4, 4));
}

#[test]
fn bi_average_of_equal_predictions_is_unchanged() {
    let src = ramp_plane(32, 32);
    let pos = SubpelPos::new(8, 8, MotionVector::new(1, 3), 0, 0, true);
    let mut tmp = vec![0i32; 64];
    predict_hp(&src, pos, 8, 8, 8, &mut tmp);

    let uni = predict_uni(&src, pos, 8, 8);
    let mut bi = PlaneBuf::new(8, 8, 0u8);
    store_bi(&tmp, &tmp, &mut bi.region_mut(Rect::new(0, 0, 8, 8)), 8);
    assert_eq!(uni, bi);
}
