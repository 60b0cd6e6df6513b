//! Sparse ternary secret key, and encryption/decryption under it.

use crate::bfv::{Ciphertext, Plaintext, PlaintextRingT};
use crate::{Error, Parameters, Result};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rtf_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use rtf_math::sampler::sample_vec_ternary;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Secret key: a ternary polynomial with exactly H nonzero coefficients.
#[derive(Debug, PartialEq, Clone)]
pub struct SecretKey {
    pub(crate) par: Arc<Parameters>,
    pub(crate) coeffs: Box<[i64]>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl SecretKey {
    /// Generate a random sparse [`SecretKey`] with the Hamming weight of the
    /// parameters.
    pub fn random<R: RngCore + CryptoRng>(par: &Arc<Parameters>, rng: &mut R) -> Self {
        let coeffs = sample_vec_ternary(par.degree(), par.hamming_weight(), rng).unwrap();
        Self::new(coeffs, par)
    }

    /// Generate a [`SecretKey`] from its coefficients.
    pub(crate) fn new(coeffs: Vec<i64>, par: &Arc<Parameters>) -> Self {
        Self {
            par: par.clone(),
            coeffs: coeffs.into_boxed_slice(),
        }
    }

    /// The secret polynomial in the given context, in NTT representation.
    pub(crate) fn s_poly(&self, ctx: &Arc<Context>) -> Result<Zeroizing<Poly>> {
        let mut s = Zeroizing::new(Poly::try_convert_from(
            &self.coeffs as &[i64],
            ctx,
            Representation::PowerBasis,
        )?);
        s.change_representation(Representation::Ntt);
        Ok(s)
    }

    /// Encrypt a polynomial in NTT representation, producing a degree-1
    /// ciphertext at the level of the polynomial's context.
    pub(crate) fn encrypt_poly<R: RngCore + CryptoRng>(
        &self,
        p: &Poly,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if p.representation() != &Representation::Ntt {
            return Err(Error::MathError(rtf_math::Error::IncorrectRepresentation(
                *p.representation(),
                Representation::Ntt,
            )));
        }
        let level = self.par.level_of_ctx(p.ctx())?;

        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        rng.fill(&mut seed);

        let s = self.s_poly(p.ctx())?;
        let a = Poly::random_from_seed(p.ctx(), Representation::Ntt, seed);
        let mut a_s = Zeroizing::new(&a * s.as_ref());

        let mut b = Poly::small_gaussian(
            p.ctx(),
            Representation::Ntt,
            self.par.sigma_err(),
            rng,
        )?;
        b -= a_s.as_mut();
        b += p;

        Ok(Ciphertext {
            par: self.par.clone(),
            c: vec![b, a],
            level,
            scale: 1.0,
            is_ntt: true,
        })
    }

    /// Encrypt a BFV plaintext.
    pub fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let mut m = Zeroizing::new(pt.poly.clone());
        if pt.is_ntt {
            // Already in NTT form.
        } else {
            m.change_representation(Representation::Ntt);
        }
        let mut ct = self.encrypt_poly(m.as_ref(), rng)?;
        ct.scale = pt.scale;
        Ok(ct)
    }

    /// Decrypt a ciphertext to the raw message polynomial
    /// c_0 + c_1 s + c_2 s^2 + ..., in PowerBasis representation.
    pub(crate) fn decrypt_poly(&self, ct: &Ciphertext) -> Result<Zeroizing<Poly>> {
        if ct.par != self.par {
            return Err(Error::DefaultError("Incompatible parameters".to_string()));
        }
        let ctx = ct.c[0].ctx();
        let s = self.s_poly(ctx)?;
        let mut si = Zeroizing::new(s.as_ref().clone());

        let mut c = Zeroizing::new(ct.c[0].clone());
        if !ct.is_ntt {
            c.change_representation(Representation::Ntt);
        }
        for i in 1..ct.c.len() {
            let mut cis = Zeroizing::new(ct.c[i].clone());
            if !ct.is_ntt {
                cis.change_representation(Representation::Ntt);
            }
            *cis.as_mut() *= si.as_ref();
            *c.as_mut() += cis.as_ref();
            *si.as_mut() *= s.as_ref();
        }
        c.change_representation(Representation::PowerBasis);
        Ok(c)
    }

    /// Decrypt a BFV ciphertext into a plaintext over Z_t, scaling down by
    /// t / Q.
    pub fn try_decrypt_fv(&self, ct: &Ciphertext) -> Result<PlaintextRingT> {
        let c = self.decrypt_poly(ct)?;
        let scaler = &self.par.scalers_down[ct.level];
        let poly = c.scale(scaler)?;
        Ok(PlaintextRingT {
            par: self.par.clone(),
            poly,
            scale: ct.scale,
        })
    }

    /// Decrypt a CKKS ciphertext into a plaintext over R_Q carrying the
    /// ciphertext scale; the decoding is performed by the CKKS encoder.
    pub fn try_decrypt_ckks(&self, ct: &Ciphertext) -> Result<Plaintext> {
        let c = self.decrypt_poly(ct)?;
        Ok(Plaintext {
            par: self.par.clone(),
            poly: c.as_ref().clone(),
            level: ct.level,
            scale: ct.scale,
            is_ntt: false,
        })
    }

    /// Measure the noise budget of a BFV ciphertext, in bits below Q/2.
    pub fn measure_noise(&self, ct: &Ciphertext) -> Result<usize> {
        let pt = self.try_decrypt_fv(ct)?;
        let m = self
            .par
            .scalers_up
            .get(ct.level)
            .ok_or_else(|| Error::DefaultError(format!("Invalid level: {}", ct.level)))?;
        let m_up = pt.poly.scale(m)?;

        let mut c = self.decrypt_poly(ct)?;
        *c.as_mut() -= &m_up;

        let ciphertext_modulus = ct.c[0].ctx().modulus();
        let mut noise = 0usize;
        for coeff in Vec::<num_bigint::BigUint>::from(c.as_ref()) {
            noise = std::cmp::max(
                noise,
                std::cmp::min(coeff.bits(), (ciphertext_modulus - &coeff).bits()) as usize,
            )
        }
        Ok(ciphertext_modulus.bits() as usize - 1 - noise)
    }
}
