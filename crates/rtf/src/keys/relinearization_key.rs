//! Relinearization key: a switching key from s^2 to s.

use crate::keys::{KeySwitchingKey, SecretKey};
use crate::{Parameters, Result};
use rand::{CryptoRng, RngCore};
use rtf_math::rq::Representation;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Relinearization key for reducing degree-2 ciphertexts back to degree 1.
#[derive(Debug, PartialEq, Clone)]
pub struct RelinearizationKey {
    pub(crate) ksk: KeySwitchingKey,
}

impl RelinearizationKey {
    /// Generate a [`RelinearizationKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let ctx_qp = sk.par.ctx_qp_level(sk.par.max_level())?;
        let s = sk.s_poly(ctx_qp)?;
        let mut s2 = Zeroizing::new(s.as_ref() * s.as_ref());
        s2.change_representation(Representation::PowerBasis);
        let ksk = KeySwitchingKey::new(sk, s2.as_ref(), rng)?;
        Ok(Self { ksk })
    }

    /// The parameters of the key.
    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.ksk.par
    }
}

#[cfg(test)]
mod tests {
    use super::RelinearizationKey;
    use crate::keys::SecretKey;
    use crate::Parameters;
    use rand::rng;

    #[test]
    fn generate() {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        assert_eq!(rlk.ksk.c0.len(), par.moduli().len());
        assert_eq!(rlk.ksk.c1.len(), par.moduli().len());
    }
}
