//! Galois keys for slot rotations, and the rotation key set indexed by
//! Galois element.

use crate::keys::{KeySwitchingKey, SecretKey};
use crate::{Error, Parameters, Result};
use rand::{CryptoRng, RngCore};
use rtf_math::rq::{traits::TryConvertFrom, Poly, Representation, SubstitutionExponent};
use std::collections::HashMap;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Galois key: a switching key from s(x^g) to s(x).
#[derive(Debug, PartialEq, Clone)]
pub struct GaloisKey {
    /// The Galois element g.
    pub(crate) element: u64,
    pub(crate) ksk: KeySwitchingKey,
}

impl GaloisKey {
    /// Generate a [`GaloisKey`] for the Galois element `element` from a
    /// [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        element: u64,
        rng: &mut R,
    ) -> Result<Self> {
        let par = &sk.par;
        if element & 1 == 0 || element as usize >= 2 * par.degree() {
            return Err(Error::UnspecifiedInput(format!(
                "Invalid Galois element {element}"
            )));
        }
        let ctx_qp = par.ctx_qp_level(par.max_level())?;
        let exponent =
            SubstitutionExponent::new(ctx_qp, element as usize).map_err(Error::MathError)?;

        let s = Zeroizing::new(Poly::try_convert_from(
            &sk.coeffs as &[i64],
            ctx_qp,
            Representation::PowerBasis,
        )?);
        let s_sub = Zeroizing::new(s.substitute(&exponent)?);

        let ksk = KeySwitchingKey::new(sk, s_sub.as_ref(), rng)?;
        Ok(Self { element, ksk })
    }

    /// The Galois element of the key.
    pub const fn element(&self) -> u64 {
        self.element
    }

    /// The underlying switching key.
    pub(crate) fn switching_key(&self) -> &KeySwitchingKey {
        &self.ksk
    }
}

/// Set of Galois keys indexed by their Galois element. Every rotation amount
/// used at runtime must have a corresponding key; requesting an absent
/// element is an error.
#[derive(Debug, PartialEq, Clone)]
pub struct RotationKeySet {
    pub(crate) par: Arc<Parameters>,
    pub(crate) keys: HashMap<u64, GaloisKey>,
}

impl RotationKeySet {
    /// Generate the keys for a set of Galois elements.
    pub fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        elements: &[u64],
        rng: &mut R,
    ) -> Result<Self> {
        let mut keys = HashMap::new();
        for element in elements {
            if !keys.contains_key(element) {
                keys.insert(*element, GaloisKey::new(sk, *element, rng)?);
            }
        }
        Ok(Self {
            par: sk.par.clone(),
            keys,
        })
    }

    /// Generate the keys for a set of rotation steps, plus the conjugation
    /// element 2N - 1.
    pub fn for_rotations<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        steps: &[isize],
        rng: &mut R,
    ) -> Result<Self> {
        let mut elements = steps
            .iter()
            .map(|step| sk.par.galois_element(*step))
            .collect::<Vec<_>>();
        elements.push(sk.par.galois_element_conjugate());
        Self::new(sk, &elements, rng)
    }

    /// The key for a Galois element.
    pub fn key_for_element(&self, element: u64) -> Result<&GaloisKey> {
        self.keys
            .get(&element)
            .ok_or(Error::MissingRotationKey(element))
    }

    /// The key for a rotation by `step` slots.
    pub fn key_for_step(&self, step: isize) -> Result<&GaloisKey> {
        self.key_for_element(self.par.galois_element(step))
    }

    /// The key for the conjugation.
    pub fn key_for_conjugate(&self) -> Result<&GaloisKey> {
        self.key_for_element(self.par.galois_element_conjugate())
    }

    /// The Galois elements present in the set.
    pub fn elements(&self) -> Vec<u64> {
        let mut elements = self.keys.keys().copied().collect::<Vec<_>>();
        elements.sort_unstable();
        elements
    }
}

#[cfg(test)]
mod tests {
    use super::RotationKeySet;
    use crate::keys::SecretKey;
    use crate::Parameters;
    use rand::rng;

    #[test]
    fn set_and_lookup() {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);

        let rtks = RotationKeySet::for_rotations(&sk, &[1, 2, -1], &mut rng).unwrap();
        assert!(rtks.key_for_step(1).is_ok());
        assert!(rtks.key_for_step(2).is_ok());
        assert!(rtks.key_for_step(-1).is_ok());
        assert!(rtks.key_for_conjugate().is_ok());

        // An unregistered element is a structured failure.
        let missing = rtks.key_for_step(3);
        assert!(missing.is_err());
    }

    #[test]
    fn rejects_even_element() {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        assert!(super::GaloisKey::new(&sk, 4, &mut rng).is_err());
    }
}
