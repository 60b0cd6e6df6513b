use thiserror::Error;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Indicates that an error from the underlying mathematical library was
    /// encountered.
    #[error("{0}")]
    MathError(rtf_math::Error),

    /// Indicates a serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Indicates an I/O failure; the message carries the offending path.
    #[error("I/O error at {path}: {message}")]
    IoError {
        /// The path of the file that triggered the failure.
        path: String,
        /// The description of the failure.
        message: String,
    },

    /// Indicates that too many values were provided.
    #[error("Too many values provided: {0} exceeds limit {1}")]
    TooManyValues(usize, usize),

    /// Indicates that too few values were provided.
    #[error("Too few values provided: {0} is below limit {1}")]
    TooFewValues(usize, usize),

    /// Indicates that a rotation key for a Galois element is missing.
    #[error("No rotation key for Galois element {0}")]
    MissingRotationKey(u64),

    /// Indicates a level mismatch between operands.
    #[error("Level mismatch: found {0}, expected {1}")]
    LevelMismatch(usize, usize),

    /// Indicates a scale mismatch between operands.
    #[error("Scale mismatch: found {0}, expected {1}")]
    ScaleMismatch(u64, u64),

    /// Indicates that no level is left for the next operation.
    #[error("No level left for the operation")]
    LevelExhausted,

    /// Indicates that an input is invalid.
    #[error("{0}")]
    UnspecifiedInput(String),

    /// Indicates a parameter error.
    #[error("{0}")]
    ParametersError(ParametersError),

    /// Indicates a default error.
    #[error("{0}")]
    DefaultError(String),
}

impl From<rtf_math::Error> for Error {
    fn from(e: rtf_math::Error) -> Self {
        Error::MathError(e)
    }
}

impl Error {
    /// Build an I/O error from a path and a source error.
    pub fn io<P: AsRef<std::path::Path>, E: std::fmt::Display>(path: P, e: E) -> Self {
        Error::IoError {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        }
    }

    /// Build a scale-mismatch error from float scales, carrying their
    /// bit-exact representations.
    pub fn scale_mismatch(found: f64, expected: f64) -> Self {
        Error::ScaleMismatch(found.to_bits(), expected.to_bits())
    }
}

/// Separate enum to indicate parameters-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParametersError {
    /// Indicates that the degree is invalid.
    #[error("Invalid degree: {0} is not a power of 2 larger than 8")]
    InvalidDegree(usize),

    /// Indicates that the moduli sizes are invalid.
    #[error("Invalid modulus size: {0}, expected an integer between {1} and {2}")]
    InvalidModulusSize(usize, usize, usize),

    /// Indicates that there exists not enough primes of this size.
    #[error("Not enough primes of size {0} for polynomials of degree {1}")]
    NotEnoughPrimes(usize, usize),

    /// Indicates that the plaintext is invalid.
    #[error("{0}")]
    InvalidPlaintext(String),

    /// Indicates that too many parameters were specified.
    #[error("{0}")]
    TooManySpecified(String),

    /// Indicates that too few parameters were specified.
    #[error("{0}")]
    TooFewSpecified(String),
}

#[cfg(test)]
mod tests {
    use super::{Error, ParametersError};

    #[test]
    fn error_strings() {
        assert_eq!(
            Error::MathError(rtf_math::Error::InvalidContext).to_string(),
            rtf_math::Error::InvalidContext.to_string()
        );
        assert_eq!(
            Error::TooManyValues(20, 17).to_string(),
            "Too many values provided: 20 exceeds limit 17"
        );
        assert_eq!(
            Error::MissingRotationKey(25).to_string(),
            "No rotation key for Galois element 25"
        );
        assert_eq!(
            Error::io("/tmp/key.bin", "not found").to_string(),
            "I/O error at /tmp/key.bin: not found"
        );
        assert_eq!(
            Error::ParametersError(ParametersError::InvalidDegree(10)).to_string(),
            ParametersError::InvalidDegree(10).to_string()
        );
    }
}
