//! Approximate homomorphic evaluator for the CKKS layer.

use super::encoder::scale_up_vec_exact;
use crate::bfv::{Ciphertext, FvEvaluator, Plaintext};
use crate::keys::{RelinearizationKey, RotationKeySet};
use crate::{Error, Parameters, Result};
use rtf_math::rq::{traits::TryConvertFrom, Poly, Representation};
use std::sync::Arc;

/// Relative tolerance when matching the scales of two operands.
const SCALE_TOLERANCE: f64 = 1e-9;

/// Evaluator for ciphertext operations on the CKKS side. Multiplications
/// rescale by one chain modulus each time; scalar multiplications grow the
/// scale instead of consuming a level.
#[derive(Debug, Clone)]
pub struct CkksEvaluator {
    par: Arc<Parameters>,
    base: FvEvaluator,
}

impl CkksEvaluator {
    /// Creates an evaluator with the given evaluation keys.
    pub fn new(
        par: &Arc<Parameters>,
        rlk: Option<RelinearizationKey>,
        rtks: Option<RotationKeySet>,
    ) -> Self {
        Self {
            par: par.clone(),
            base: FvEvaluator::new(par, rlk, rtks),
        }
    }

    fn check_scales(a: f64, b: f64) -> Result<()> {
        if (a - b).abs() > SCALE_TOLERANCE * a.abs().max(b.abs()) {
            return Err(Error::scale_mismatch(b, a));
        }
        Ok(())
    }

    /// Slot-wise homomorphic addition; the operands must carry matching
    /// scales.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        Self::check_scales(a.scale(), b.scale())?;
        self.base.add(a, b)
    }

    /// Slot-wise homomorphic subtraction.
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        Self::check_scales(a.scale(), b.scale())?;
        self.base.sub(a, b)
    }

    /// Homomorphic negation.
    pub fn neg(&self, a: &Ciphertext) -> Ciphertext {
        self.base.neg(a)
    }

    /// Add a plaintext encoded at the same scale and level.
    pub fn add_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        Self::check_scales(ct.scale(), pt.scale())?;
        self.base.add_plain(ct, pt)
    }

    /// Divide by the last modulus of the chain, dropping one level and
    /// dividing the scale accordingly.
    pub fn rescale(&self, ct: &mut Ciphertext) -> Result<()> {
        let q_last = *ct.c[0].ctx().moduli().last().unwrap();
        self.base.mod_switch_to_next_level(ct)?;
        ct.scale /= q_last as f64;
        Ok(())
    }

    /// Mod-switch without rescaling the plaintext scale: drops the last
    /// modulus while keeping the encrypted values; used to align levels.
    pub fn mod_switch_to_next_level(&self, ct: &mut Ciphertext) -> Result<()> {
        // For CKKS the drop divides the underlying integers, so the scale
        // follows.
        self.rescale(ct)
    }

    /// Tensor multiplication of two degree-1 ciphertexts at the same level,
    /// followed by relinearization and one rescale.
    pub fn mul_relin(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        if a.level() != b.level() {
            return Err(Error::LevelMismatch(b.level(), a.level()));
        }
        if a.c.len() != 2 || b.c.len() != 2 {
            return Err(Error::DefaultError(
                "Multiplication can only be performed on degree-1 ciphertexts".to_string(),
            ));
        }
        if !a.is_ntt() || !b.is_ntt() {
            return Err(Error::DefaultError(
                "Multiplication operands must be in NTT form".to_string(),
            ));
        }

        let c0 = &a.c[0] * &b.c[0];
        let mut c1 = &a.c[0] * &b.c[1];
        c1 += &(&a.c[1] * &b.c[0]);
        let c2 = &a.c[1] * &b.c[1];

        let ct = Ciphertext {
            par: self.par.clone(),
            c: vec![c0, c1, c2],
            level: a.level(),
            scale: a.scale() * b.scale(),
            is_ntt: true,
        };
        let mut ct = self.base.relinearize(&ct)?;
        self.rescale(&mut ct)?;
        Ok(ct)
    }

    /// Scale-growing multiplication by a plaintext in NTT form.
    pub fn mul_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        self.base.mul_plain(ct, pt)
    }

    /// Multiply by a real scalar, encoded at the default scale of the
    /// parameters; the ciphertext scale grows by the same factor and no
    /// level is consumed.
    pub fn mul_const(&self, ct: &Ciphertext, value: f64) -> Result<Ciphertext> {
        let const_scale = self.par.scale();
        let ctx = ct.c[0].ctx().clone();

        // The all-`value` slot vector is the constant polynomial.
        let mut w = vec![0.0f64; self.par.degree()];
        w[0] = value;
        let rows = scale_up_vec_exact(&w, const_scale, ctx.moduli());
        let mut poly = Poly::zero(&ctx, Representation::PowerBasis);
        poly.set_coefficients(rows);
        poly.change_representation(Representation::Ntt);

        let mut out = ct.clone();
        for ci in out.c.iter_mut() {
            *ci *= &poly;
        }
        out.scale = ct.scale() * const_scale;
        Ok(out)
    }

    /// Multiply by i^k through the monomial x^(k N/2).
    pub fn mul_by_i_pow(&self, ct: &Ciphertext, k: usize) -> Result<Ciphertext> {
        let k = k % 4;
        if k == 0 {
            return Ok(ct.clone());
        }
        let n = self.par.degree();
        let ctx = ct.c[0].ctx().clone();

        // x^(k n/2) with the negacyclic wrap: x^n = -1.
        let (pos, negate) = if k * (n / 2) < n {
            (k * (n / 2), false)
        } else {
            (k * (n / 2) - n, true)
        };
        let mut coeffs = vec![0i64; n];
        coeffs[pos] = if negate { -1 } else { 1 };
        let mut monomial =
            Poly::try_convert_from(&coeffs as &[i64], &ctx, Representation::PowerBasis)
                .map_err(Error::MathError)?;
        monomial.change_representation(Representation::Ntt);

        let mut out = ct.clone();
        for ci in out.c.iter_mut() {
            *ci *= &monomial;
        }
        Ok(out)
    }

    /// Addition of operands whose scales differ by the negligible relative
    /// drift accumulated through rescaling; the result carries the first
    /// operand's scale. Used by the polynomial-evaluation circuits where the
    /// chain moduli only approximate the scale.
    pub(crate) fn add_lazy(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.base.add(a, b)
    }

    /// Subtraction with the same lazy scale contract as
    /// [`CkksEvaluator::add_lazy`].
    pub(crate) fn sub_lazy(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.base.sub(a, b)
    }

    /// Add a real constant to every slot.
    pub fn add_const(&self, ct: &Ciphertext, value: f64) -> Result<Ciphertext> {
        let ctx = ct.c[0].ctx().clone();
        let mut w = vec![0.0f64; self.par.degree()];
        w[0] = value;
        let rows = scale_up_vec_exact(&w, ct.scale(), ctx.moduli());
        let mut poly = Poly::zero(&ctx, Representation::PowerBasis);
        poly.set_coefficients(rows);
        if ct.is_ntt() {
            poly.change_representation(Representation::Ntt);
        }
        let mut out = ct.clone();
        out.c[0] += &poly;
        Ok(out)
    }

    /// Rotate the slots to the left by `step`.
    pub fn rotate(&self, ct: &Ciphertext, step: isize) -> Result<Ciphertext> {
        self.base.rotate(ct, step)
    }

    /// Apply the complex conjugation to the slots.
    pub fn conjugate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.base.conjugate(ct)
    }

    /// The underlying generic evaluator.
    pub(crate) fn base(&self) -> &FvEvaluator {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::CkksEvaluator;
    use crate::ckks::CkksEncoder;
    use crate::keys::{RelinearizationKey, RotationKeySet, SecretKey};
    use crate::Parameters;
    use num_complex::Complex64;
    use rand::{rng, Rng};
    use std::error::Error;

    fn random_values(n: usize, rng: &mut impl Rng) -> Vec<Complex64> {
        (0..n)
            .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
            .collect()
    }

    #[test]
    fn add_sub_linear() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let encoder = CkksEncoder::new(&par);
        let evaluator = CkksEvaluator::new(&par, None, None);

        let a = random_values(par.slots(), &mut rng);
        let b = random_values(par.slots(), &mut rng);

        let level = par.max_level();
        let mut pa = encoder.encode(&a, par.scale(), level)?;
        let mut pb = encoder.encode(&b, par.scale(), level)?;
        pa.to_ntt();
        pb.to_ntt();
        let ca = sk.try_encrypt(&pa, &mut rng)?;
        let cb = sk.try_encrypt(&pb, &mut rng)?;

        let sum = evaluator.add(&ca, &cb)?;
        let decoded = encoder.decode(&sk.try_decrypt_ckks(&sum)?)?;
        for ((x, y), z) in a.iter().zip(b.iter()).zip(decoded.iter()) {
            assert!((x + y - z).norm() < 2.0f64.powi(-18));
        }

        let diff = evaluator.sub(&ca, &cb)?;
        let decoded = encoder.decode(&sk.try_decrypt_ckks(&diff)?)?;
        for ((x, y), z) in a.iter().zip(b.iter()).zip(decoded.iter()) {
            assert!((x - y - z).norm() < 2.0f64.powi(-18));
        }
        Ok(())
    }

    #[test]
    fn mul_relin_rescales() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let encoder = CkksEncoder::new(&par);
        let rlk = RelinearizationKey::new(&sk, &mut rng)?;
        let evaluator = CkksEvaluator::new(&par, Some(rlk), None);

        let a = random_values(par.slots(), &mut rng);
        let b = random_values(par.slots(), &mut rng);

        let level = par.max_level();
        let mut pa = encoder.encode(&a, par.scale(), level)?;
        let mut pb = encoder.encode(&b, par.scale(), level)?;
        pa.to_ntt();
        pb.to_ntt();
        let ca = sk.try_encrypt(&pa, &mut rng)?;
        let cb = sk.try_encrypt(&pb, &mut rng)?;

        let prod = evaluator.mul_relin(&ca, &cb)?;
        assert_eq!(prod.level(), level - 1);
        assert_eq!(prod.degree(), 1);

        let decoded = encoder.decode(&sk.try_decrypt_ckks(&prod)?)?;
        for ((x, y), z) in a.iter().zip(b.iter()).zip(decoded.iter()) {
            assert!((x * y - z).norm() < 2.0f64.powi(-12));
        }
        Ok(())
    }

    #[test]
    fn mul_const_keeps_level() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let encoder = CkksEncoder::new(&par);
        let evaluator = CkksEvaluator::new(&par, None, None);

        let a = random_values(par.slots(), &mut rng);
        let mut pa = encoder.encode(&a, par.scale(), par.max_level())?;
        pa.to_ntt();
        let ca = sk.try_encrypt(&pa, &mut rng)?;

        let scaled = evaluator.mul_const(&ca, 1.0 / 3.0)?;
        assert_eq!(scaled.level(), ca.level());

        let decoded = encoder.decode(&sk.try_decrypt_ckks(&scaled)?)?;
        for (x, z) in a.iter().zip(decoded.iter()) {
            assert!((x / 3.0 - z).norm() < 2.0f64.powi(-16));
        }
        Ok(())
    }

    #[test]
    fn rotation_round_trip() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let encoder = CkksEncoder::new(&par);
        let rtks = RotationKeySet::for_rotations(&sk, &[2, -2], &mut rng)?;
        let evaluator = CkksEvaluator::new(&par, None, Some(rtks));

        let a = random_values(par.slots(), &mut rng);
        let mut pa = encoder.encode(&a, par.scale(), par.max_level())?;
        pa.to_ntt();
        let ca = sk.try_encrypt(&pa, &mut rng)?;

        let back = evaluator.rotate(&evaluator.rotate(&ca, 2)?, -2)?;
        let decoded = encoder.decode(&sk.try_decrypt_ckks(&back)?)?;
        for (x, z) in a.iter().zip(decoded.iter()) {
            assert!((x - z).norm() < 2.0f64.powi(-18));
        }
        Ok(())
    }
}
