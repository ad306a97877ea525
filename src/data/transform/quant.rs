use v_frame::pixel::ChromaSampling;

const QUANT_SCALES: [i64; 6] = [26214, 23302, 20560, 18396, 16384, 14564];
const INV_QUANT_SCALES: [i32; 6] = [40, 45, 51, 57, 64, 72];
const QUANT_SHIFT: usize = 14;
const MAX_TR_DYNAMIC_RANGE: i32 = 15;

const CHROMA_QP_420: [i32; 14] = [29, 30, 31, 32, 33, 33, 34, 34, 35, 35, 36, 36, 37, 37];

/// Maps a luma QP to the chroma QP, before the bit-depth offset is added.
#[inline]
pub fn chroma_qp(qp: i32, cs: ChromaSampling) -> i32 {
    if cs != ChromaSampling::Cs420 {
        return qp.min(51);
    }
    if qp < 30 {
        qp
    } else if qp <= 43 {
        CHROMA_QP_420[(qp - 30) as usize]
    } else {
        qp - 6
    }
}

/// Per-block quantizer setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantParams {
    /// QP with the bit-depth offset applied.
    pub qp_scaled: i32,
    pub log2: usize,
    pub bit_depth: usize,
    pub is_intra: bool,
}

impl QuantParams {
    #[inline]
    pub fn new(qp: i32, log2: usize, bit_depth: usize, is_intra: bool) -> Self {
        QuantParams {
            qp_scaled: qp + 6 * (bit_depth as i32 - 8),
            log2,
            bit_depth,
            is_intra,
        }
    }

    #[inline]
    const fn transform_shift(&self) -> i32 {
        MAX_TR_DYNAMIC_RANGE - self.bit_depth as i32 - self.log2 as i32
    }
}

/// Quantizes `coeff` into `levels` with a dead-zone rounding offset.
/// Returns the number of nonzero levels.
#[inline]
pub fn quant(coeff: &[i32], levels: &mut [i16], params: QuantParams) -> u32 {
    let per = params.qp_scaled / 6;
    let rem = params.qp_scaled % 6;
    let qbits = QUANT_SHIFT as i32 + per + params.transform_shift();
    let add = (if params.is_intra { 171i64 } else { 85 }) << (qbits - 9);
    let scale = QUANT_SCALES[rem as usize];

    let mut num_sig = 0;
    for (level, &c) in levels.iter_mut().zip(coeff) {
        let mag = (i64::from(c).abs() * scale + add) >> qbits;
        let mag = mag.min(i64::from(i16::MAX)) as i16;
        *level = if c < 0 { -mag } else { mag };
        num_sig += u32::from(mag != 0);
    }
    num_sig
}

/// Scales quantized levels back to transform coefficients.
#[inline]
pub fn dequant(levels: &[i16], coeff: &mut [i32], params: QuantParams) {
    let per = params.qp_scaled / 6;
    let rem = params.qp_scaled % 6;
    let shift = 6 - params.transform_shift();
    let scale = i64::from(INV_QUANT_SCALES[rem as usize]) << per;
    let round = 1i64 << (shift - 1);

    for (c, &level) in coeff.iter_mut().zip(levels) {
        let v = (i64::from(level) * scale + round) >> shift;
        *c = v.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i32;
    }
}
