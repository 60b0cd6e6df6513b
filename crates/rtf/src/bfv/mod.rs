//! The multi-RNS BFV/FV layer: plaintexts, ciphertexts, slot encoding, and
//! the homomorphic evaluator.

mod ciphertext;
mod encoding;
mod evaluator;
mod plaintext;

pub use ciphertext::Ciphertext;
pub use encoding::FvEncoder;
pub use evaluator::FvEvaluator;
pub use plaintext::{Plaintext, PlaintextRingT};
