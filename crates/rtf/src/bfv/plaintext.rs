//! Plaintext types of the BFV layer.

use crate::{Error, Parameters, Result};
use rtf_math::rq::{Poly, Representation};
use std::sync::Arc;
use zeroize::Zeroize;

/// A plaintext polynomial over the plaintext ring Z_t\[x\]/(x^N + 1),
/// produced by the encoders and by symmetric encryption on the client side.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaintextRingT {
    /// The parameters of the scheme.
    pub(crate) par: Arc<Parameters>,

    /// The polynomial over Z_t, in PowerBasis representation.
    pub(crate) poly: Poly,

    /// The scale carried by the encoded message.
    pub(crate) scale: f64,
}

impl PlaintextRingT {
    /// Creates a zero plaintext over Z_t.
    pub fn zero(par: &Arc<Parameters>) -> Self {
        Self {
            par: par.clone(),
            poly: Poly::zero(&par.ctx_t, Representation::PowerBasis),
            scale: 1.0,
        }
    }

    /// The underlying polynomial over Z_t.
    pub fn poly(&self) -> &Poly {
        &self.poly
    }

    /// Mutable access to the underlying polynomial over Z_t.
    pub fn poly_mut(&mut self) -> &mut Poly {
        &mut self.poly
    }

    /// The scale of the message.
    pub const fn scale(&self) -> f64 {
        self.scale
    }
}

impl Zeroize for PlaintextRingT {
    fn zeroize(&mut self) {
        self.poly.zeroize();
    }
}

/// A plaintext polynomial over R_Q at a level of the moduli chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Plaintext {
    /// The parameters of the scheme.
    pub(crate) par: Arc<Parameters>,

    /// The polynomial over R_Q at `level`.
    pub(crate) poly: Poly,

    /// The level of the plaintext.
    pub(crate) level: usize,

    /// The scale carried by the encoded message.
    pub(crate) scale: f64,

    /// Whether the polynomial is in NTT form.
    pub(crate) is_ntt: bool,
}

impl Plaintext {
    /// Creates a zero plaintext at the given level.
    pub fn zero(par: &Arc<Parameters>, level: usize) -> Result<Self> {
        let ctx = par.ctx_q_level(level)?;
        Ok(Self {
            par: par.clone(),
            poly: Poly::zero(ctx, Representation::PowerBasis),
            level,
            scale: 1.0,
            is_ntt: false,
        })
    }

    /// Creates a plaintext from a polynomial.
    pub fn from_poly(par: &Arc<Parameters>, poly: Poly, scale: f64) -> Result<Self> {
        let level = par.level_of_ctx(poly.ctx())?;
        let is_ntt = poly.representation() != &Representation::PowerBasis;
        Ok(Self {
            par: par.clone(),
            poly,
            level,
            scale,
            is_ntt,
        })
    }

    /// The underlying polynomial.
    pub fn poly(&self) -> &Poly {
        &self.poly
    }

    /// The level of the plaintext.
    pub const fn level(&self) -> usize {
        self.level
    }

    /// The scale of the plaintext.
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Whether the polynomial is in NTT form.
    pub const fn is_ntt(&self) -> bool {
        self.is_ntt
    }

    /// Sets the scale of the plaintext.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// Switches the underlying polynomial to NTT form.
    pub fn to_ntt(&mut self) {
        if !self.is_ntt {
            self.poly.change_representation(Representation::Ntt);
            self.is_ntt = true;
        }
    }

    /// Switches the underlying polynomial to coefficient form.
    pub fn to_coeff(&mut self) {
        if self.is_ntt {
            self.poly.change_representation(Representation::PowerBasis);
            self.is_ntt = false;
        }
    }

    /// Checks that the plaintext is at the expected level.
    pub fn check_level(&self, level: usize) -> Result<()> {
        if self.level != level {
            Err(Error::LevelMismatch(self.level, level))
        } else {
            Ok(())
        }
    }
}

impl Zeroize for Plaintext {
    fn zeroize(&mut self) {
        self.poly.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::{Plaintext, PlaintextRingT};
    use crate::Parameters;

    #[test]
    fn zero() {
        let par = Parameters::rubato_test().unwrap();
        let rt = PlaintextRingT::zero(&par);
        assert!(rt.poly().coefficients().iter().all(|c| *c == 0));

        let pt = Plaintext::zero(&par, 3).unwrap();
        assert_eq!(pt.level(), 3);
        assert_eq!(pt.poly().ctx().moduli().len(), 4);
        assert!(!pt.is_ntt());
        assert!(pt.check_level(3).is_ok());
        assert!(pt.check_level(0).is_err());
    }
}
