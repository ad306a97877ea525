pub(crate) mod block;
pub(crate) mod candidates;
pub(crate) mod cu;
pub(crate) mod entropy;
pub(crate) mod hadamard;
pub(crate) mod mc;
pub(crate) mod motion;
pub(crate) mod plane;
pub(crate) mod prediction;
pub(crate) mod sad;
pub(crate) mod satd;
pub(crate) mod transform;
