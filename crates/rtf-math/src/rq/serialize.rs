//! Byte-level serialization of polynomials: per-residue fixed-width
//! little-endian words, ordered by level then coefficient index.

use super::{Context, Poly, Representation};
use crate::{Error, Result};
use ndarray::Array2;
use rtf_util::{bytes_to_words, words_to_bytes};
use std::sync::Arc;

impl Poly {
    /// Serialize the coefficients into little-endian bytes, level-major.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        words_to_bytes(self.coefficients.as_slice().unwrap())
    }

    /// Deserialize a polynomial from bytes produced by [`Poly::to_bytes`].
    ///
    /// Returns an error when the length does not match the context shape or
    /// when a residue is out of range.
    pub fn from_bytes(
        bytes: &[u8],
        ctx: &Arc<Context>,
        representation: Representation,
    ) -> Result<Self> {
        let expected = ctx.q.len() * ctx.degree * 8;
        if bytes.len() != expected {
            return Err(Error::Serialization(format!(
                "Invalid length: expected {expected} bytes, found {}",
                bytes.len()
            )));
        }
        let words = bytes_to_words(bytes)
            .ok_or_else(|| Error::Serialization("Invalid word alignment".to_string()))?;

        for (i, qi) in ctx.moduli.iter().enumerate() {
            for w in &words[i * ctx.degree..(i + 1) * ctx.degree] {
                if w >= qi {
                    return Err(Error::Serialization(format!(
                        "Residue {w} out of range for modulus {qi}"
                    )));
                }
            }
        }

        let coefficients = Array2::from_shape_vec((ctx.q.len(), ctx.degree), words)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut out = Poly::zero(ctx, Representation::PowerBasis);
        out.coefficients = coefficients;
        out.representation = representation;
        if representation == Representation::NttShoup {
            out.compute_coefficients_shoup();
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Context, Poly, Representation};
    use rand::rng;
    use std::error::Error;

    const MODULI: &[u64; 3] = &[1153, 4611686018326724609, 4611686018309947393];

    #[test]
    fn roundtrip() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let ctx = Context::new_arc(MODULI, 8)?;
        for representation in [Representation::PowerBasis, Representation::Ntt] {
            let p = Poly::random(&ctx, representation, &mut rng);
            let b = p.to_bytes();
            assert_eq!(b.len(), 3 * 8 * 8);
            let q = Poly::from_bytes(&b, &ctx, representation)?;
            assert_eq!(p, q);
        }
        Ok(())
    }

    #[test]
    fn invalid() -> Result<(), Box<dyn Error>> {
        let ctx = Context::new_arc(MODULI, 8)?;
        assert!(Poly::from_bytes(&[0u8; 7], &ctx, Representation::PowerBasis).is_err());

        // An out-of-range residue on the first modulus is rejected.
        let mut bytes = vec![0u8; 3 * 8 * 8];
        bytes[..8].copy_from_slice(&2000u64.to_le_bytes());
        assert!(Poly::from_bytes(&bytes, &ctx, Representation::PowerBasis).is_err());
        Ok(())
    }
}
