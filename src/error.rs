use thiserror::Error;

/// Invalid search configuration or parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The transform size bounds are outside 4x4..=32x32 or inverted.
    #[error("invalid transform size bounds: log2 min {min}, log2 max {max}")]
    TuSizeBounds {
        /// Configured log2 minimum.
        min: usize,
        /// Configured log2 maximum.
        max: usize,
    },
    /// A maximum transform depth is outside `1..=4`.
    #[error("invalid maximum transform depth {0}, expected 1..=4")]
    TuDepth(usize),
    /// The motion search range is zero or too large for a motion vector.
    #[error("invalid motion search range {0}")]
    SearchRange(usize),
    /// The merge candidate count is outside `1..=5`.
    #[error("invalid merge candidate count {0}, expected 1..=5")]
    MergeCandidates(usize),
    /// The QP is outside `0..=51`.
    #[error("QP {0} out of range")]
    Qp(i32),
    /// Only 8 to 12 bits per sample are supported.
    #[error("unsupported bit depth {0}")]
    BitDepth(usize),
    /// The RD penalty mode is not 0, 1 or 2.
    #[error("invalid rd penalty mode {0}")]
    RdPenalty(u8),
}
