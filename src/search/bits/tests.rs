#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;

#[test]
fn truncated_unary_bits() {
    assert_eq!(get_tu_bits(0, 1), 0);
    assert_eq!(get_tu_bits(0, 5), 1);
    assert_eq!(get_tu_bits(3, 5), 4);
    assert_eq!(get_tu_bits(4, 5), 4);
    assert_eq!(get_tu_bits(1, 2), 1);
}

#[test]
fn mvd_binarization() {
    assert_eq!(mvd_component_bits(0), 1);
    assert_eq!(mvd_component_bits(1), 3);
    assert_eq!(mvd_component_bits(-1), 3);
    // greater0, greater1, EG1 of 0 (2 bins), sign
    assert_eq!(mvd_component_bits(2), 5);
    assert_eq!(mvd_component_bits(3), 5);
    // EG1 of 2: one prefix bin, stop bin, two suffix bins
    assert_eq!(mvd_component_bits(-4), 7);
    assert_eq!(mvd_bits(MotionVector::ZERO), 2);
    assert_eq!(mv_cost_bits(MotionVector::new(5, 4), MotionVector::new(4, 4)), 4);
}

#[test]
fn cand_list_keeps_cheapest_sorted() {
    let mut list = CandList::new(3);
    list.insert(10, 50);
    list.insert(11, 30);
    list.insert(12, 40);
    list.insert(13, 60);
    assert_eq!(list.modes().collect::<Vec<_>>(), [11, 12, 10]);
    list.insert(14, 35);
    assert_eq!(list.modes().collect::<Vec<_>>(), [11, 14, 12]);
    assert_eq!(list.costs().collect::<Vec<_>>(), [30, 35, 40]);
}

#[test]
fn cand_list_ties_keep_earlier_mode() {
    let mut list = CandList::new(2);
    list.insert(3, 20);
    list.insert(1, 20);
    assert_eq!(list.modes().collect::<Vec<_>>(), [3, 1]);
    // Full list with an equal cost is a no-op.
    list.insert(0, 20);
    assert_eq!(list.modes().collect::<Vec<_>>(), [3, 1]);
    list.insert(0, 19);
    assert_eq!(list.modes().collect::<Vec<_>>(), [0, 3]);
}

#[test]
fn cand_list_append_skips_present_modes() {
    let mut list = CandList::new(CandList::capacity_for(4));
    assert_eq!(CandList::capacity_for(3), 8);
    list.insert(26, 5);
    list.append(26);
    list.append(0);
    list.append(1);
    assert_eq!(list.len(), 3);
    assert_eq!(list.modes().collect::<Vec<_>>(), [26, 0, 1]);
}

#[test]
fn block_bits_tables() {
    assert_eq!(get_blk_bits(PartSize::SIZE_2Nx2N, true, 0, 0), [1, 3, 5]);
    assert_eq!(get_blk_bits(PartSize::SIZE_2Nx2N, false, 0, 0), [3, 3, 5]);
    assert_eq!(get_blk_bits(PartSize::SIZE_2NxN, true, 1, 2), [3, 0, 0]);
    assert_eq!(get_blk_bits(PartSize::SIZE_2NxN, false, 0, 0), [0, 0, 3]);
    assert_eq!(get_blk_bits(PartSize::SIZE_2NxnU, false, 1, 1), [7, 5, 7]);
    assert_eq!(get_blk_bits(PartSize::SIZE_Nx2N, false, 0, 0), [0, 2, 3]);
    assert_eq!(get_blk_bits(PartSize::SIZE_nRx2N, false, 1, 1), [5, 5, 7]);
    assert_eq!(get_blk_bits(PartSize::SIZE_Nx2N, false, 1, 2), [6, 6, 6]);
}
