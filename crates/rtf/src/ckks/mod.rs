//! The CKKS layer: complex slot encoding via the special FFT, and the
//! approximate homomorphic evaluator used for aggregation.

mod encoder;
mod evaluator;
mod precision;

pub use encoder::{scale_up_vec_exact, CkksEncoder};
pub use evaluator::CkksEvaluator;
pub use precision::PrecisionStats;
