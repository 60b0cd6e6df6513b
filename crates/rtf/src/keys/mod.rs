//! Key material: sparse secret key, public key, and the switching keys for
//! relinearization and slot rotation.

mod galois_key;
mod key_switching_key;
mod public_key;
mod relinearization_key;
mod secret_key;

pub use galois_key::{GaloisKey, RotationKeySet};
pub use key_switching_key::KeySwitchingKey;
pub(crate) use key_switching_key::{decompose_ntt, mod_down, mul_qp};
pub use public_key::PublicKey;
pub use relinearization_key::RelinearizationKey;
pub use secret_key::SecretKey;
