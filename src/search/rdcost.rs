//! Lagrangian cost evaluation.
//!
//! All lambdas are held in FIX8 (scaled by 256). Floating point is only used
//! when a QP is converted to lambda.

#[cfg(test)]
mod tests;

use v_frame::pixel::ChromaSampling;

use crate::data::{block::ColorPlane, transform::chroma_qp};

/// Lowest QP accepted by [`RdCost::set_qp`].
pub const QP_MIN: i32 = 0;
/// Highest QP accepted by [`RdCost::set_qp`].
pub const QP_MAX: i32 = 51;

/// FIX8 weight applied when chroma uses the same quantizer as luma.
const UNIT_WEIGHT: u64 = 256;

/// Cost function state for one QP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdCost {
    /// Squared-error lambda, FIX8.
    lambda2: u64,
    /// SAD/SATD lambda, FIX8.
    lambda: u64,
    /// Psycho-visual strength, FIX8. Zero disables the psy term.
    psy_rd: u64,
    /// Distortion weights of Cb and Cr, FIX8.
    chroma_weight: [u64; 2],
}

impl Default for RdCost {
    #[inline]
    fn default() -> Self {
        RdCost {
            lambda2: 0,
            lambda: 0,
            psy_rd: 0,
            chroma_weight: [UNIT_WEIGHT; 2],
        }
    }
}

impl RdCost {
    /// Sets both lambdas. The values are truncated to FIX8.
    #[inline]
    pub fn set_lambda(&mut self, lambda2: f64, lambda: f64) {
        self.lambda2 = (256.0 * lambda2).floor() as u64;
        self.lambda = (256.0 * lambda).floor() as u64;
    }

    /// Sets the psycho-visual strength. Zero disables psy-rd.
    #[inline]
    pub const fn set_psy_rd(&mut self, strength: u32) {
        self.psy_rd = strength as u64;
    }

    /// Returns `true` when psy-rd contributes to the cost.
    #[inline]
    pub const fn psy_enabled(&self) -> bool {
        self.psy_rd != 0
    }

    /// Derives lambdas and chroma weights from a QP.
    ///
    /// `lambda2 = 0.57 * 2^((qp - 12) / 3)` and `lambda = sqrt(lambda2)`.
    /// Chroma distortion is weighted by `2^((qp - qp_c) / 3)`.
    #[inline]
    pub fn set_qp(&mut self, qp: i32, cs: ChromaSampling) {
        debug_assert!((QP_MIN..=QP_MAX).contains(&qp));
        let lambda2 = 0.57 * 2f64.powf(f64::from(qp - 12) / 3.0);
        self.set_lambda(lambda2, lambda2.sqrt());

        let weight = if cs == ChromaSampling::Cs400 {
            UNIT_WEIGHT
        } else {
            let qpc = chroma_qp(qp, cs);
            (256.0 * 2f64.powf(f64::from(qp - qpc) / 3.0)).floor() as u64
        };
        self.chroma_weight = [weight; 2];
    }

    /// Squared lambda in FIX8, used for SSE based costs.
    #[inline]
    pub const fn lambda2(&self) -> u64 {
        self.lambda2
    }

    /// Lambda in FIX8, used for SAD and SATD based costs.
    #[inline]
    pub const fn lambda(&self) -> u64 {
        self.lambda
    }

    /// `dist + lambda2 * bits`.
    #[inline]
    pub const fn calc_rd_cost(&self, dist: u64, bits: u32) -> u64 {
        dist + ((bits as u64 * self.lambda2 + 128) >> 8)
    }

    /// `sad + lambda * bits`, for SAD and SATD based estimates.
    #[inline]
    pub const fn calc_rd_sad_cost(&self, sad: u32, bits: u32) -> u64 {
        sad as u64 + ((bits as u64 * self.lambda + 128) >> 8)
    }

    /// Bits expressed in SAD cost units.
    #[inline]
    pub const fn sad_cost(&self, bits: u32) -> u64 {
        self.calc_rd_sad_cost(0, bits)
    }

    /// RD cost with a psycho-visual energy penalty added.
    #[inline]
    pub const fn calc_psy_rd_cost(&self, dist: u64, bits: u32, psy_energy: u64) -> u64 {
        self.calc_rd_cost(dist, bits) + ((self.lambda * self.psy_rd * psy_energy) >> 16)
    }

    /// Weights a chroma distortion. Luma passes through.
    #[inline]
    pub const fn scale_chroma_dist(&self, plane: ColorPlane, dist: u64) -> u64 {
        match plane {
            ColorPlane::Y => dist,
            ColorPlane::Cb => (dist * self.chroma_weight[0] + 128) >> 8,
            ColorPlane::Cr => (dist * self.chroma_weight[1] + 128) >> 8,
        }
    }
}
