#![allow(clippy::unwrap_used, reason = "allow in test files")]

use v_frame::pixel::{CastFromPrimitive, Pixel};

use super::{get_resi_energy, get_resi_sse, get_sad, get_sad_zero, get_sse};
use crate::data::plane::{PlaneBuf, Rect};

// Generate plane data for get_sad tests
fn setup_planes<T: Pixel>() -> (PlaneBuf<T>, PlaneBuf<T>) {
    let mut input_plane = PlaneBuf::new(128, 96, T::cast_from(0u8));
    let mut rec_plane = PlaneBuf::new(128, 96, T::cast_from(0u8));

    for i in 0..input_plane.height() {
        for (j, pixel) in input_plane[i].iter_mut().enumerate() {
            let val = ((j + i) as i32 + 8) & 255i32;
            *pixel = T::cast_from(val);
        }
        for (j, pixel) in rec_plane[i].iter_mut().enumerate() {
            let val = (j as i32 - i as i32 + 8) & 255i32;
            *pixel = T::cast_from(val);
        }
    }

    (input_plane, rec_plane)
}

fn brute_force_sad<T: Pixel>(a: &PlaneBuf<T>, b: &PlaneBuf<T>, rect: Rect) -> u32 {
    let mut sum = 0;
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            sum += i32::cast_from(a[y][x]).abs_diff(i32::cast_from(b[y][x]));
        }
    }
    sum
}

fn get_sad_same_inner<T: Pixel>() {
    let blocks: [(usize, usize); 12] = [
        (4, 4),
        (4, 8),
        (8, 4),
        (8, 8),
        (8, 16),
        (16, 8),
        (16, 16),
        (32, 16),
        (16, 32),
        (32, 32),
        (64, 32),
        (32, 64),
    ];

    let (input_plane, rec_plane) = setup_planes::<T>();

    for (w, h) in blocks {
        let rect = Rect::new(32, 24, w, h);
        let input_region = input_plane.region(rect);
        let rec_region = rec_plane.region(rect);

        assert_eq!(
            brute_force_sad(&input_plane, &rec_plane, rect),
            get_sad(&input_region, &rec_region, w, h)
        );
    }
}

#[test]
fn get_sad_same_u8() {
    get_sad_same_inner::<u8>();
}

#[test]
fn get_sad_same_u16() {
    get_sad_same_inner::<u16>();
}

#[test]
fn sse_of_constant_offset() {
    let a = PlaneBuf::new(8, 8, 100u8);
    let b = PlaneBuf::new(8, 8, 97u8);
    assert_eq!(get_sse(&a.as_region(), &b.as_region(), 8, 8), 64 * 9);
    assert_eq!(get_sse(&a.as_region(), &a.as_region(), 8, 8), 0);
    assert_eq!(get_sad_zero(&b.as_region()), 64 * 97);
}

#[test]
fn residual_energy_matches_sse_against_zero() {
    let mut resi = PlaneBuf::new(4, 4, 0i16);
    resi[0][0] = -3;
    resi[1][2] = 4;
    resi[3][3] = 1;
    let zero = PlaneBuf::new(4, 4, 0i16);
    assert_eq!(get_resi_energy(&resi.as_region()), 26);
    assert_eq!(
        get_resi_sse(&resi.as_region(), &zero.as_region()),
        get_resi_energy(&resi.as_region())
    );
}
