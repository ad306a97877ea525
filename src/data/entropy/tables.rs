//! Context layout, initialization values and bit-cost tables.

use crate::data::cu::SliceType;

pub const OFF_SPLIT_TRANSFORM: usize = 0;
pub const OFF_CBF_LUMA: usize = 3;
pub const OFF_CBF_CHROMA: usize = 5;
pub const OFF_SKIP_FLAG: usize = 10;
pub const OFF_MERGE_FLAG: usize = 13;
pub const OFF_MERGE_IDX: usize = 14;
pub const OFF_PART_SIZE: usize = 15;
pub const OFF_PRED_MODE: usize = 19;
pub const OFF_PREV_INTRA_LUMA_PRED: usize = 20;
pub const OFF_CHROMA_PRED_MODE: usize = 21;
pub const OFF_INTER_DIR: usize = 22;
pub const OFF_REF_IDX: usize = 27;
pub const OFF_MVD: usize = 29;
pub const OFF_MVP_IDX: usize = 31;
pub const OFF_QT_ROOT_CBF: usize = 32;
pub const OFF_LAST_X: usize = 33;
pub const OFF_LAST_Y: usize = 51;
pub const OFF_SIG_FLAG: usize = 69;
pub const OFF_GREATER1: usize = 111;
pub const OFF_GREATER2: usize = 135;
pub const OFF_CODED_SUB_BLOCK: usize = 141;
pub const NUM_CONTEXTS: usize = 145;

const INIT_I: [u8; NUM_CONTEXTS] = [
    153, 138, 138, 111, 141, 94, 138, 182, 154, 154, 154, 154, 154, 154, 154, 184,
    154, 154, 154, 154, 184, 63, 154, 154, 154, 154, 154, 154, 154, 154, 154, 168,
    154, 110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111, 79,
    108, 123, 63, 110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127,
    111, 79, 108, 123, 63, 111, 111, 125, 110, 110, 94, 124, 108, 124, 107, 125,
    141, 179, 153, 125, 107, 125, 141, 179, 153, 125, 107, 125, 141, 179, 153, 125,
    140, 139, 182, 182, 152, 136, 152, 136, 153, 136, 139, 111, 136, 139, 111, 140,
    92, 137, 138, 140, 152, 138, 139, 153, 74, 149, 92, 139, 107, 122, 152, 140,
    179, 166, 182, 140, 227, 122, 197, 138, 153, 136, 167, 152, 152, 91, 171, 134,
    141,
];

const INIT_P: [u8; NUM_CONTEXTS] = [
    124, 138, 94, 153, 111, 149, 107, 167, 154, 154, 197, 185, 201, 110, 122, 154,
    139, 154, 154, 149, 154, 152, 95, 79, 63, 31, 31, 153, 153, 140, 198, 168,
    79, 125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111, 95, 94,
    108, 123, 108, 125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111,
    95, 94, 108, 123, 108, 155, 154, 139, 153, 139, 123, 123, 63, 153, 166, 183,
    140, 136, 153, 154, 166, 183, 140, 136, 153, 154, 166, 183, 140, 136, 153, 154,
    170, 153, 123, 123, 107, 121, 107, 121, 167, 151, 183, 140, 151, 183, 140, 154,
    196, 196, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 137, 169,
    194, 166, 167, 154, 167, 137, 182, 107, 167, 91, 122, 107, 167, 121, 140, 61,
    154,
];

const INIT_B: [u8; NUM_CONTEXTS] = [
    224, 167, 122, 153, 111, 149, 92, 167, 154, 154, 197, 185, 201, 154, 137, 154,
    139, 154, 154, 134, 183, 152, 95, 79, 63, 31, 31, 153, 153, 169, 198, 168,
    79, 125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111, 111, 79,
    108, 123, 93, 125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111,
    111, 79, 108, 123, 93, 170, 154, 139, 153, 139, 123, 123, 63, 124, 166, 183,
    140, 136, 153, 154, 166, 183, 140, 136, 153, 154, 166, 183, 140, 136, 153, 154,
    170, 153, 138, 138, 122, 121, 122, 121, 167, 151, 183, 140, 151, 183, 140, 154,
    196, 167, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 122, 169,
    208, 166, 167, 154, 152, 167, 182, 107, 167, 91, 107, 107, 167, 121, 140, 61,
    154,
];

/// `initValue` of every context for the given slice type.
#[inline]
pub const fn init_values(slice_type: SliceType) -> &'static [u8; NUM_CONTEXTS] {
    match slice_type {
        SliceType::I => &INIT_I,
        SliceType::P => &INIT_P,
        SliceType::B => &INIT_B,
    }
}

pub const NEXT_STATE_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12,
    13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
    24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
    33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

/// Q15 cost of coding a bin, indexed by `(state << 1) | (bin != mps)`.
pub const ENTROPY_BITS: [u32; 128] = [
    32768, 32768, 30426, 35232, 28306, 37696, 26377, 40159,
    24617, 42623, 23005, 45087, 21523, 47551, 20159, 50015,
    18899, 52479, 17734, 54942, 16653, 57406, 15650, 59870,
    14717, 62334, 13849, 64798, 13038, 67262, 12282, 69725,
    11575, 72189, 10914, 74653, 10294, 77117, 9714, 79581,
    9169, 82044, 8658, 84508, 8178, 86972, 7727, 89436,
    7303, 91900, 6903, 94364, 6527, 96827, 6173, 99291,
    5840, 101755, 5525, 104219, 5228, 106683, 4948, 109147,
    4684, 111610, 4435, 114074, 4199, 116538, 3977, 119002,
    3767, 121466, 3568, 123929, 3380, 126393, 3202, 128857,
    3034, 131321, 2876, 133785, 2725, 136249, 2583, 138712,
    2448, 141176, 2321, 143640, 2200, 146104, 2086, 148568,
    1978, 151032, 1875, 153495, 1778, 155959, 1686, 158423,
    1599, 160887, 1517, 163351, 1439, 165814, 1364, 168278,
    1294, 170742, 1228, 173206, 1164, 175670, 1105, 178134,
    1048, 180597, 994, 183061, 943, 185525, 895, 187989,
];

/// Diagonal up-right scan of a square of `size` x `size`, as raster
/// positions `y * size + x`. Entries past `size * size` are unused.
const fn diag_scan(size: usize) -> [u8; 64] {
    let mut scan = [0u8; 64];
    let mut i = 0;
    let mut line = 0;
    while i < size * size {
        let mut x = 0;
        let mut y = line as isize;
        while y >= 0 {
            if x < size && (y as usize) < size {
                scan[i] = (y as usize * size + x) as u8;
                i += 1;
            }
            y -= 1;
            x += 1;
        }
        line += 1;
    }
    scan
}

pub static SCAN_2X2: [u8; 64] = diag_scan(2);
pub static SCAN_4X4: [u8; 64] = diag_scan(4);
pub static SCAN_8X8: [u8; 64] = diag_scan(8);

/// Prefix group of each last-position coordinate.
pub const GROUP_IDX: [u8; 32] = [
    0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
];

/// Significance context of each position of a 4x4 block.
pub const CTX_IND_MAP_4X4: [u8; 16] = [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];
