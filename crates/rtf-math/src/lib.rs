#![crate_name = "rtf_math"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Mathematical layer of the rtf workspace: modular arithmetic, NTT,
//! residue-number systems, and polynomials in R_q = Z_q\[x\]/(x^N + 1).

pub mod ntt;
pub mod rns;
pub mod rq;
pub mod sampler;
pub mod zq;

use thiserror::Error;

/// The errors of the mathematical layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Indicates an invalid modulus.
    #[error("Invalid modulus: {0} is not between 2 and 2^62 - 1")]
    InvalidModulus(u64),

    /// Indicates that there is no more context to switch down to.
    #[error("No more context to switch down to")]
    NoMoreContext,

    /// Indicates an invalid context.
    #[error("Invalid context")]
    InvalidContext,

    /// Indicates that a polynomial has an unexpected representation.
    #[error("Incorrect representation: found {0:?}, expected {1:?}")]
    IncorrectRepresentation(crate::rq::Representation, crate::rq::Representation),

    /// Indicates a serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Indicates a generic error.
    #[error("{0}")]
    Default(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Default(s.to_string())
    }
}

/// The Result type for the mathematical layer.
pub type Result<T> = std::result::Result<T, Error>;
