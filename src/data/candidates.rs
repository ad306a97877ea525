//! Merge and AMVP candidate lists.


use arrayvec::ArrayVec;

use super::{
    block::PartGeometry,
    cu::{CodingUnit, SliceType},
    motion::{AMVP_NUM_CANDS, MRG_MAX_NUM_CANDS, MotionVector, MvField, clip_mv},
};

/// Picture order information needed to derive candidates.
#[derive(Debug, Clone, Copy)]
pub struct CandidateContext<'a> {
    pub slice_type: SliceType,
    pub poc: i32,
    /// POC of each reference picture, per list.
    pub ref_pocs: [&'a [i32]; 2],
    pub enable_tmvp: bool,
}

impl CandidateContext<'_> {
    #[inline]
    fn ref_poc(&self, list: usize, ref_idx: i8) -> Option<i32> {
        usize::try_from(ref_idx)
            .ok()
            .and_then(|i| self.ref_pocs[list].get(i).copied())
    }
}

/// Scales `mv` from a POC distance `td` to a POC distance `tb`.
#[inline]
pub fn scale_mv(mv: MotionVector, td: i32, tb: i32) -> MotionVector {
    let td = td.clamp(-128, 127);
    let tb = tb.clamp(-128, 127);
    if td == tb || td == 0 {
        return mv;
    }
    let tx = (16384 + (td.abs() >> 1)) / td;
    let factor = ((tb * tx + 32) >> 6).clamp(-4096, 4095);
    let scale = |v: i16| {
        let p = factor * i32::from(v);
        clip_mv(p.signum() * ((p.abs() + 127) >> 8))
    };
    MotionVector {
        row: scale(mv.row),
        col: scale(mv.col),
    }
}

/// Clears the vectors of unused lists so fields compare by value.
#[inline]
fn normalized(mut field: MvField) -> MvField {
    for list in 0..2 {
        if !field.uses_list(list) {
            field.mv[list] = MotionVector::ZERO;
            field.ref_idx[list] = -1;
        }
    }
    field
}

/// Luma offsets from the coding unit origin of the spatial candidate
/// positions A0, A1, B0, B1, B2 of a partition.
fn spatial_positions(g: &PartGeometry) -> [(isize, isize); 5] {
    let (x, y) = (g.x as isize, g.y as isize);
    let (w, h) = (g.width as isize, g.height as isize);
    [
        (x - 1, y + h),
        (x - 1, y + h - 1),
        (x + w, y - 1),
        (x + w - 1, y - 1),
        (x - 1, y - 1),
    ]
}

fn temporal_mv(cu: &CodingUnit, ctx: &CandidateContext<'_>, list: usize, ref_idx: i8) -> Option<MotionVector> {
    if !ctx.enable_tmvp {
        return None;
    }
    let col = cu.neighbors.colocated?;
    let target = ctx.ref_poc(list, ref_idx)?;
    Some(scale_mv(col.mv, col.col_poc - col.col_ref_poc, ctx.poc - target))
}

/// Merge candidates of partition `part_idx`, up to `max_cands` entries.
///
/// Order: A1, B1, B0, A0, B2, temporal, combined bi-predictive, zero.
#[inline]
pub fn merge_candidates(
    cu: &CodingUnit,
    part_idx: usize,
    ctx: &CandidateContext<'_>,
    max_cands: usize,
) -> ArrayVec<MvField, MRG_MAX_NUM_CANDS> {
    let max_cands = max_cands.clamp(1, MRG_MAX_NUM_CANDS);
    let g = cu.part_size.geometry(part_idx, cu.size());
    let [a0, a1, b0, b1, b2] = spatial_positions(&g);
    let second = part_idx == 1;
    let fetch = |(dx, dy): (isize, isize)| cu.inter_neighbor(dx, dy, part_idx).map(normalized);

    let mut list = ArrayVec::<MvField, MRG_MAX_NUM_CANDS>::new();

    let cand_a1 = if second && cu.part_size.is_vertical() {
        None
    } else {
        fetch(a1)
    };
    list.extend(cand_a1);

    let cand_b1 = if second && cu.part_size.is_horizontal() {
        None
    } else {
        fetch(b1).filter(|b| Some(*b) != cand_a1)
    };
    list.extend(cand_b1);

    if let Some(b) = fetch(b0).filter(|b| Some(*b) != cand_b1) {
        list.push(b);
    }
    if let Some(a) = fetch(a0).filter(|a| Some(*a) != cand_a1) {
        list.push(a);
    }
    if list.len() < 4 {
        if let Some(b) = fetch(b2).filter(|b| Some(*b) != cand_a1 && Some(*b) != cand_b1) {
            list.push(b);
        }
    }
    list.truncate(max_cands);

    if list.len() < max_cands {
        let mut field = MvField::default();
        for l in 0..ctx.slice_type.num_lists() {
            if let Some(mv) = temporal_mv(cu, ctx, l, 0) {
                field.mv[l] = mv;
                field.ref_idx[l] = 0;
            }
        }
        if field.inter_dir() != 0 {
            list.push(field);
        }
    }

    if ctx.slice_type == SliceType::B {
        const COMBINATIONS: [(usize, usize); 12] = [
            (0, 1),
            (1, 0),
            (0, 2),
            (2, 0),
            (1, 2),
            (2, 1),
            (0, 3),
            (3, 0),
            (1, 3),
            (3, 1),
            (2, 3),
            (3, 2),
        ];
        let num_orig = list.len();
        if num_orig > 1 && num_orig < max_cands {
            for &(i0, i1) in COMBINATIONS.iter().take(num_orig * (num_orig - 1)) {
                if list.len() >= max_cands {
                    break;
                }
                let (c0, c1) = (list[i0], list[i1]);
                if !c0.uses_list(0) || !c1.uses_list(1) {
                    continue;
                }
                let same_pic = ctx.ref_poc(0, c0.ref_idx[0]) == ctx.ref_poc(1, c1.ref_idx[1]);
                if same_pic && c0.mv[0] == c1.mv[1] {
                    continue;
                }
                list.push(MvField {
                    mv: [c0.mv[0], c1.mv[1]],
                    ref_idx: [c0.ref_idx[0], c1.ref_idx[1]],
                });
            }
        }
    }

    let num_ref_idx = match ctx.slice_type {
        SliceType::B => ctx.ref_pocs[0].len().min(ctx.ref_pocs[1].len()),
        _ => ctx.ref_pocs[0].len(),
    }
    .max(1);
    let mut zero_idx = 0;
    while list.len() < max_cands {
        let r = if zero_idx < num_ref_idx { zero_idx as i8 } else { 0 };
        let mut field = MvField::default();
        field.ref_idx[0] = r;
        if ctx.slice_type == SliceType::B {
            field.ref_idx[1] = r;
        }
        list.push(field);
        zero_idx += 1;
    }
    list
}

/// A spatial neighbour's vector for `list`/`ref_idx` when it points to the
/// same picture, checking list `list` first.
fn same_pic_mv(
    field: &MvField,
    ctx: &CandidateContext<'_>,
    list: usize,
    target_poc: i32,
) -> Option<MotionVector> {
    [list, 1 - list]
        .into_iter()
        .find(|&l| field.uses_list(l) && ctx.ref_poc(l, field.ref_idx[l]) == Some(target_poc))
        .map(|l| field.mv[l])
}

/// A spatial neighbour's vector scaled to the target picture.
fn scaled_mv(
    field: &MvField,
    ctx: &CandidateContext<'_>,
    list: usize,
    target_poc: i32,
) -> Option<MotionVector> {
    [list, 1 - list].into_iter().find_map(|l| {
        if !field.uses_list(l) {
            return None;
        }
        let poc = ctx.ref_poc(l, field.ref_idx[l])?;
        Some(scale_mv(field.mv[l], ctx.poc - poc, ctx.poc - target_poc))
    })
}

/// The two motion vector predictors of partition `part_idx` for a
/// reference picture.
#[inline]
pub fn amvp_candidates(
    cu: &CodingUnit,
    part_idx: usize,
    list: usize,
    ref_idx: usize,
    ctx: &CandidateContext<'_>,
) -> [MotionVector; AMVP_NUM_CANDS] {
    let g = cu.part_size.geometry(part_idx, cu.size());
    let [a0, a1, b0, b1, b2] = spatial_positions(&g);
    let fetch = |(dx, dy): (isize, isize)| cu.inter_neighbor(dx, dy, part_idx);
    let Some(target_poc) = ctx.ref_pocs[list].get(ref_idx).copied() else {
        return [MotionVector::ZERO; AMVP_NUM_CANDS];
    };

    let left: ArrayVec<MvField, 2> = [a0, a1].into_iter().filter_map(fetch).collect();
    let is_scaled = !left.is_empty();
    let mut mv_a = left
        .iter()
        .find_map(|f| same_pic_mv(f, ctx, list, target_poc))
        .or_else(|| left.iter().find_map(|f| scaled_mv(f, ctx, list, target_poc)));

    let above: ArrayVec<MvField, 3> = [b0, b1, b2].into_iter().filter_map(fetch).collect();
    let mut mv_b = above
        .iter()
        .find_map(|f| same_pic_mv(f, ctx, list, target_poc));
    if !is_scaled {
        if mv_a.is_none() {
            mv_a = mv_b;
        }
        mv_b = above.iter().find_map(|f| scaled_mv(f, ctx, list, target_poc));
    }

    let mut cands = ArrayVec::<MotionVector, 3>::new();
    cands.extend(mv_a);
    if let Some(b) = mv_b {
        if mv_a != Some(b) {
            cands.push(b);
        }
    }
    if cands.len() < AMVP_NUM_CANDS {
        cands.extend(temporal_mv(cu, ctx, list, ref_idx as i8));
    }
    let mut out = [MotionVector::ZERO; AMVP_NUM_CANDS];
    for (o, c) in out.iter_mut().zip(cands) {
        *o = c;
    }
    out
}
