#![crate_name = "rtf"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Real-to-Finite-field (RtF) transciphering: hybrid homomorphic encryption
//! with the Rubato stream cipher, a multi-RNS BFV layer for homomorphic
//! keystream evaluation, a CKKS layer for approximate arithmetic, and the
//! half-bootstrapping bridge between the two. The crate drives federated
//! averaging of model-weight vectors across data owners.

mod errors;

pub mod bfv;
pub mod ckks;
pub mod halfboot;
pub mod keys;
pub mod params;
pub mod rubato;
pub mod serialization;
pub mod stc;
pub mod transcipher;
pub mod weights;

pub use errors::{Error, ParametersError, Result};
pub use params::{Parameters, ParametersBuilder};
