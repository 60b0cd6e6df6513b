//! Ciphertext type shared by the BFV and CKKS layers.

use crate::{Error, Parameters, Result};
use rtf_math::rq::{Poly, Representation};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A ciphertext of degree len - 1: an ordered sequence of polynomials at the
/// same level, carrying a scale and an NTT-form flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Ciphertext {
    /// The parameters of the scheme.
    pub(crate) par: Arc<Parameters>,

    /// The ciphertext elements.
    pub(crate) c: Vec<Poly>,

    /// The ciphertext level.
    pub(crate) level: usize,

    /// The scale of the encrypted message.
    pub(crate) scale: f64,

    /// Whether the polynomials are in NTT form.
    pub(crate) is_ntt: bool,
}

impl Deref for Ciphertext {
    type Target = [Poly];

    fn deref(&self) -> &Self::Target {
        &self.c
    }
}

impl DerefMut for Ciphertext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.c
    }
}

impl Ciphertext {
    /// Create a ciphertext from a vector of polynomials.
    /// A ciphertext must contain at least two polynomials, and all
    /// polynomials must share a representation and a context.
    pub fn new(c: Vec<Poly>, scale: f64, par: &Arc<Parameters>) -> Result<Self> {
        if c.len() < 2 {
            return Err(Error::TooFewValues(c.len(), 2));
        }

        let ctx = c[0].ctx().clone();
        let repr = *c[0].representation();
        let level = par.level_of_ctx(&ctx)?;
        for ci in c.iter() {
            if ci.representation() != &repr {
                return Err(Error::MathError(rtf_math::Error::IncorrectRepresentation(
                    *ci.representation(),
                    repr,
                )));
            }
            if ci.ctx() != &ctx {
                return Err(Error::MathError(rtf_math::Error::InvalidContext));
            }
        }

        Ok(Self {
            par: par.clone(),
            c,
            level,
            scale,
            is_ntt: repr != Representation::PowerBasis,
        })
    }

    /// Generate a fresh degree-1 zero ciphertext at a given level, in
    /// coefficient form.
    pub fn zero(par: &Arc<Parameters>, level: usize) -> Result<Self> {
        let ctx = par.ctx_q_level(level)?;
        Ok(Self {
            par: par.clone(),
            c: vec![
                Poly::zero(ctx, Representation::PowerBasis),
                Poly::zero(ctx, Representation::PowerBasis),
            ],
            level,
            scale: 1.0,
            is_ntt: false,
        })
    }

    /// The degree of the ciphertext (number of polynomials minus one).
    pub fn degree(&self) -> usize {
        self.c.len() - 1
    }

    /// The level of the ciphertext.
    pub const fn level(&self) -> usize {
        self.level
    }

    /// The scale of the ciphertext.
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Sets the scale of the ciphertext.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// Whether the polynomials are in NTT form.
    pub const fn is_ntt(&self) -> bool {
        self.is_ntt
    }

    /// The parameters of the ciphertext.
    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.par
    }
}

#[cfg(test)]
mod tests {
    use super::Ciphertext;
    use crate::Parameters;
    use rtf_math::rq::{Poly, Representation};

    #[test]
    fn new_validates() {
        let par = Parameters::rubato_test().unwrap();
        let ctx = par.ctx_q_level(2).unwrap();

        let c = vec![
            Poly::zero(ctx, Representation::Ntt),
            Poly::zero(ctx, Representation::Ntt),
        ];
        let ct = Ciphertext::new(c, 1.0, &par).unwrap();
        assert_eq!(ct.level(), 2);
        assert_eq!(ct.degree(), 1);
        assert!(ct.is_ntt());

        // A single polynomial is rejected.
        let c = vec![Poly::zero(ctx, Representation::Ntt)];
        assert!(Ciphertext::new(c, 1.0, &par).is_err());

        // Mismatched representations are rejected.
        let c = vec![
            Poly::zero(ctx, Representation::Ntt),
            Poly::zero(ctx, Representation::PowerBasis),
        ];
        assert!(Ciphertext::new(c, 1.0, &par).is_err());
    }

    #[test]
    fn zero() {
        let par = Parameters::rubato_test().unwrap();
        let ct = Ciphertext::zero(&par, 0).unwrap();
        assert_eq!(ct.level(), 0);
        assert!(!ct.is_ntt());
        assert_eq!(ct.degree(), 1);
    }
}
