//! Public key for the scheme.

use crate::bfv::{Ciphertext, Plaintext};
use crate::keys::SecretKey;
use crate::{Error, Parameters, Result};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rtf_math::rq::{Poly, Representation};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Public key (-a s + e, a), with a expandable from a seed.
#[derive(Debug, PartialEq, Clone)]
pub struct PublicKey {
    pub(crate) par: Arc<Parameters>,
    pub(crate) seed: Option<<ChaCha8Rng as SeedableRng>::Seed>,
    pub(crate) c0: Poly,
    pub(crate) c1: Poly,
}

impl PublicKey {
    /// Generate a new [`PublicKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let par = &sk.par;
        let ctx = &par.ctx_q;

        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        rng.fill(&mut seed);

        let a = Poly::random_from_seed(ctx, Representation::Ntt, seed);
        let s = sk.s_poly(ctx)?;
        let mut a_s = Zeroizing::new(&a * s.as_ref());

        let mut c0 = Poly::small_gaussian(ctx, Representation::Ntt, par.sigma_err(), rng)?;
        c0 -= a_s.as_mut();

        Ok(Self {
            par: par.clone(),
            seed: Some(seed),
            c0,
            c1: a,
        })
    }

    /// Encrypt a plaintext at the top level of the chain.
    pub fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if pt.level != self.par.max_level() {
            return Err(Error::LevelMismatch(pt.level, self.par.max_level()));
        }

        let ctx = &self.par.ctx_q;
        let u = Zeroizing::new(Poly::small_ternary(
            ctx,
            Representation::Ntt,
            self.par.degree() >> 1,
            rng,
        )?);

        let mut c0 = &self.c0 * u.as_ref();
        let mut c1 = &self.c1 * u.as_ref();

        let e0 = Poly::small_gaussian(ctx, Representation::Ntt, self.par.sigma_err(), rng)?;
        let e1 = Poly::small_gaussian(ctx, Representation::Ntt, self.par.sigma_err(), rng)?;
        c0 += &e0;
        c1 += &e1;

        let mut m = Zeroizing::new(pt.poly.clone());
        if !pt.is_ntt {
            m.change_representation(Representation::Ntt);
        }
        c0 += m.as_ref();

        Ok(Ciphertext {
            par: self.par.clone(),
            c: vec![c0, c1],
            level: pt.level,
            scale: pt.scale,
            is_ntt: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::PublicKey;
    use crate::bfv::FvEncoder;
    use crate::keys::SecretKey;
    use crate::Parameters;
    use rand::{rng, Rng};
    use std::error::Error;

    #[test]
    fn encrypt_decrypt() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let encoder = FvEncoder::new(&par)?;

        for _ in 0..10 {
            let sk = SecretKey::random(&par, &mut rng);
            let pk = PublicKey::new(&sk, &mut rng)?;

            let values = (0..par.fv_slots())
                .map(|_| rng.random_range(0..par.plaintext()))
                .collect::<Vec<_>>();
            let rt = encoder.encode_uint(&values)?;
            let pt = encoder.scale_up(&rt, par.max_level())?;

            let ct = pk.try_encrypt(&pt, &mut rng)?;
            let decrypted = sk.try_decrypt_fv(&ct)?;
            assert_eq!(encoder.decode_uint(&decrypted), values);
        }
        Ok(())
    }

    #[test]
    fn rejects_low_level() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let encoder = FvEncoder::new(&par)?;
        let sk = SecretKey::random(&par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;

        let rt = encoder.encode_uint(&[1, 2, 3])?;
        let pt = encoder.scale_up(&rt, 0)?;
        assert!(pk.try_encrypt(&pt, &mut rng).is_err());
        Ok(())
    }
}
