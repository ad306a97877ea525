#![allow(clippy::unwrap_used, reason = "allow in test files")]

use v_frame::pixel::ChromaSampling;

use super::*;
use crate::data::plane::PlaneBuf;

fn predict(edge: &[i32], log2: usize, mode: u8, filters: bool) -> PlaneBuf<u8> {
    let n = 1 << log2;
    let mut dst = PlaneBuf::new(n, n, 0u8);
    let rect = dst.as_region().rect().to_owned();
    predict_intra(edge, &mut dst.region_mut(rect), log2, mode, filters, 8);
    dst
}

/// Edge with left samples `left[y]`, a corner and above samples `above[x]`.
fn make_edge(left: &[i32], corner: i32, above: &[i32]) -> Vec<i32> {
    let mut edge: Vec<i32> = left.iter().rev().copied().collect();
    edge.push(corner);
    edge.extend_from_slice(above);
    edge
}

#[test]
fn flat_edge_predicts_flat_block_in_every_mode() {
    let edge = vec![77; edge_len(3)];
    for mode in 0..NUM_INTRA_MODES {
        let pred = predict(&edge, 3, mode, true);
        assert!(pred.data().iter().all(|&p| p == 77), "mode {}", mode);
    }
}

#[test]
fn dc_averages_left_and_above() {
    let edge = make_edge(&[10; 8], 0, &[30; 8]);
    let pred = predict(&edge, 2, DC_IDX, false);
    assert!(pred.data().iter().all(|&p| p == 20));

    let filtered = predict(&edge, 2, DC_IDX, true);
    assert_eq!(filtered[0][0], ((10 + 40 + 30 + 2) >> 2) as u8);
    assert_eq!(filtered[0][1], ((30 + 60 + 2) >> 2) as u8);
    assert_eq!(filtered[1][0], ((10 + 60 + 2) >> 2) as u8);
    assert_eq!(filtered[1][1], 20);
}

#[test]
fn vertical_and_horizontal_copy_their_reference() {
    let left: Vec<i32> = (0..8).map(|i| 100 + i).collect();
    let above: Vec<i32> = (0..8).map(|i| 50 + 2 * i).collect();
    let edge = make_edge(&left, 100, &above);

    let ver = predict(&edge, 2, VER_IDX, false);
    let hor = predict(&edge, 2, HOR_IDX, false);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(ver[y][x] as i32, above[x]);
            assert_eq!(hor[y][x] as i32, left[y]);
        }
    }

    // The left column of a vertical prediction follows the left gradient.
    let ver = predict(&edge, 2, VER_IDX, true);
    for y in 0..4 {
        assert_eq!(ver[y][0] as i32, above[0] + ((left[y] - 100) >> 1));
    }
}

#[test]
fn pure_diagonal_modes_shift_the_reference() {
    let left: Vec<i32> = (0..8).map(|i| 10 * i).collect();
    let above: Vec<i32> = (0..8).map(|i| 100 + i).collect();
    let edge = make_edge(&left, 5, &above);

    // Mode 34 reads above-right at 45 degrees.
    let pred = predict(&edge, 2, DIA_IDX, false);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(pred[y][x] as i32, above[x + y + 1]);
        }
    }

    // Mode 2 reads below-left at 45 degrees.
    let pred = predict(&edge, 2, 2, false);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(pred[y][x] as i32, left[x + y + 1]);
        }
    }
}

#[test]
fn substitution_fills_gaps_from_below() {
    let mut edge = vec![0, 0, 9, 0, 4, 0];
    let avail = [false, false, true, false, true, false];
    substitute_reference(&mut edge, &avail, 8);
    assert_eq!(edge, vec![9, 9, 9, 9, 4, 4]);

    let mut edge = vec![3; 5];
    substitute_reference(&mut edge, &[false; 5], 10);
    assert_eq!(edge, vec![512; 5]);
}

#[test]
fn smoothing_keeps_end_samples() {
    let edge = [0, 4, 8, 0, 12];
    let mut out = [0; 5];
    filter_reference(&edge, &mut out);
    assert_eq!(out, [0, 4, 5, 5, 12]);
}

#[test]
fn smoothing_decision_by_size_and_mode() {
    assert!(!use_filtered_reference(PLANAR_IDX, 2));
    assert!(use_filtered_reference(PLANAR_IDX, 3));
    assert!(!use_filtered_reference(DC_IDX, 4));
    assert!(use_filtered_reference(2, 3));
    assert!(!use_filtered_reference(VER_IDX - 1, 4));
    assert!(use_filtered_reference(VER_IDX - 2, 4));
    assert!(use_filtered_reference(VER_IDX - 1, 5));
    assert!(!use_filtered_reference(VER_IDX, 5));
}

#[test]
fn mpm_derivation() {
    assert_eq!(most_probable_modes(DC_IDX, DC_IDX), [0, 1, 26]);
    assert_eq!(most_probable_modes(10, 10), [10, 9, 11]);
    assert_eq!(most_probable_modes(2, 2), [2, 33, 3]);
    assert_eq!(most_probable_modes(34, 34), [34, 33, 3]);
    assert_eq!(most_probable_modes(PLANAR_IDX, 26), [0, 26, 1]);
    assert_eq!(most_probable_modes(PLANAR_IDX, DC_IDX), [0, 1, 26]);
    assert_eq!(most_probable_modes(5, 7), [5, 7, 0]);
}

#[test]
fn chroma_candidate_replacement_and_mapping() {
    assert_eq!(chroma_candidates(26), [0, 34, 10, 1, DM_CHROMA_IDX]);
    assert_eq!(chroma_candidates(18), [0, 26, 10, 1, DM_CHROMA_IDX]);
    assert_eq!(derive_chroma_mode(DM_CHROMA_IDX, 18, ChromaSampling::Cs420), 18);
    assert_eq!(derive_chroma_mode(DM_CHROMA_IDX, 18, ChromaSampling::Cs422), 21);
    assert_eq!(derive_chroma_mode(VER_IDX, 3, ChromaSampling::Cs422), VER_IDX);
    assert_eq!(derive_chroma_mode(DIA_IDX, 3, ChromaSampling::Cs422), 31);
    assert_eq!(derive_chroma_mode(HOR_IDX, 3, ChromaSampling::Cs444), HOR_IDX);
}
