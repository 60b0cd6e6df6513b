//! Hybrid key-switching keys over the extended basis Q‖P.
//!
//! A switching key for a target polynomial s' holds, for each prime q_i of
//! the chain, an RLWE pair encrypting P * g_i * s' under s, where g_i is the
//! i-th garner constant of the Q basis. Switching decomposes the input into
//! its RNS digits, accumulates the digit-times-key products over Q‖P, and
//! divides the accumulators by P with rounding.

use crate::keys::SecretKey;
use crate::{Error, Parameters, Result};
use ndarray::{Array2, Axis};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rtf_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Key switching key over the extended basis Q‖P.
#[derive(Debug, PartialEq, Clone)]
pub struct KeySwitchingKey {
    /// The parameters of the scheme.
    pub(crate) par: Arc<Parameters>,

    /// The seed that generated the c1 chain.
    pub(crate) seed: Option<<ChaCha8Rng as SeedableRng>::Seed>,

    /// The key switching elements c0, one per prime of the Q chain, over
    /// the full Q‖P context.
    pub(crate) c0: Box<[Poly]>,

    /// The key switching elements c1.
    pub(crate) c1: Box<[Poly]>,
}

impl KeySwitchingKey {
    /// Generate a [`KeySwitchingKey`] to this [`SecretKey`] from a
    /// polynomial `from` over the full Q‖P context, in PowerBasis
    /// representation.
    pub fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        from: &Poly,
        rng: &mut R,
    ) -> Result<Self> {
        let par = &sk.par;
        let ctx_qp = par.ctx_qp_level(par.max_level())?;
        if from.ctx() != ctx_qp {
            return Err(Error::DefaultError(
                "Incorrect context for polynomial from".to_string(),
            ));
        }

        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        rng.fill(&mut seed);
        let c1 = Self::generate_c1(ctx_qp, seed, par.moduli().len());
        let c0 = Self::generate_c0(sk, from, &c1, rng)?;

        Ok(Self {
            par: par.clone(),
            seed: Some(seed),
            c0: c0.into_boxed_slice(),
            c1: c1.into_boxed_slice(),
        })
    }

    /// Generate the c1's from the seed.
    pub(crate) fn generate_c1(
        ctx: &Arc<Context>,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
        size: usize,
    ) -> Vec<Poly> {
        let mut c1 = Vec::with_capacity(size);
        let mut rng = ChaCha8Rng::from_seed(seed);
        (0..size).for_each(|_| {
            let mut seed_i = <ChaCha8Rng as SeedableRng>::Seed::default();
            rng.fill(&mut seed_i);
            c1.push(Poly::random_from_seed(ctx, Representation::Ntt, seed_i));
        });
        c1
    }

    /// Generate the c0's from the c1's and the secret key:
    /// c0_i = -c1_i * s + e_i + (P * g_i) * from.
    fn generate_c0<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        from: &Poly,
        c1: &[Poly],
        rng: &mut R,
    ) -> Result<Vec<Poly>> {
        if c1.is_empty() {
            return Err(Error::DefaultError("Empty number of c1's".to_string()));
        }
        if from.representation() != &Representation::PowerBasis {
            return Err(Error::DefaultError(
                "Unexpected representation for from".to_string(),
            ));
        }

        let par = &sk.par;
        let ctx_qp = c1[0].ctx();
        let s = sk.s_poly(ctx_qp)?;

        let mut from_ntt = Zeroizing::new(from.clone());
        from_ntt.change_representation(Representation::Ntt);

        let p_big = par.special_modulus();
        let rns_q = par.ctx_q.rns();

        c1.iter()
            .enumerate()
            .map(|(i, c1i)| {
                let mut a_s = Zeroizing::new(c1i.clone());
                *a_s.as_mut() *= s.as_ref();

                let mut b = Poly::small_gaussian(
                    ctx_qp,
                    Representation::Ntt,
                    par.sigma_err(),
                    rng,
                )?;
                b -= a_s.as_ref();

                let gi = rns_q.get_garner(i).unwrap();
                let factor = gi * &p_big;
                let g_i_from = Zeroizing::new(from_ntt.as_ref() * &factor);
                b += g_i_from.as_ref();

                Ok(b)
            })
            .collect::<Result<Vec<Poly>>>()
    }

    /// Key switch a polynomial in PowerBasis representation at any level of
    /// the Q chain. Returns the pair (c0, c1) over the same level, in NTT
    /// representation, after the division by P.
    pub fn switch(&self, p: &Poly) -> Result<(Poly, Poly)> {
        let level = self.par.level_of_ctx(p.ctx())?;
        let ctx_qp = self.par.ctx_qp_level(level)?;
        let digits = decompose_ntt(p, ctx_qp)?;
        let (c0_qp, c1_qp) = self.switch_digits(&digits, level)?;
        Ok((
            mod_down(&self.par, c0_qp, level)?,
            mod_down(&self.par, c1_qp, level)?,
        ))
    }

    /// Accumulate the digit-times-key products over Q‖P, without the final
    /// division by P. The digits must be in NTT representation over the Q‖P
    /// context of the level.
    pub(crate) fn switch_digits(&self, digits: &[Poly], level: usize) -> Result<(Poly, Poly)> {
        let ctx_qp = self.par.ctx_qp_level(level)?;
        if digits.is_empty() || digits.len() > level + 1 {
            return Err(Error::DefaultError(
                "Incorrect number of decomposition digits".to_string(),
            ));
        }

        let mut acc0 = Poly::zero(ctx_qp, Representation::Ntt);
        let mut acc1 = Poly::zero(ctx_qp, Representation::Ntt);
        for (i, digit) in digits.iter().enumerate() {
            let c0_i = restrict_to_qp_level(&self.par, &self.c0[i], level)?;
            let c1_i = restrict_to_qp_level(&self.par, &self.c1[i], level)?;
            acc0 += &(digit * &c0_i);
            acc1 += &(digit * &c1_i);
        }
        Ok((acc0, acc1))
    }
}

/// Decompose a polynomial in PowerBasis representation into its RNS digits
/// over the Q‖P context: the i-th digit is the broadcast of the i-th residue
/// row, in NTT representation.
pub(crate) fn decompose_ntt(p: &Poly, ctx_qp: &Arc<Context>) -> Result<Vec<Poly>> {
    if p.representation() != &Representation::PowerBasis {
        return Err(Error::MathError(rtf_math::Error::IncorrectRepresentation(
            *p.representation(),
            Representation::PowerBasis,
        )));
    }
    let coeffs = p.coefficients();
    (0..p.ctx().moduli().len())
        .map(|i| {
            let row = coeffs.index_axis(Axis(0), i);
            let mut digit = Poly::try_convert_from(
                row.as_slice().unwrap(),
                ctx_qp,
                Representation::PowerBasis,
            )?;
            digit.change_representation(Representation::Ntt);
            Ok(digit)
        })
        .collect()
}

/// Restrict a polynomial over the full Q‖P context to the Q‖P context of a
/// level, keeping the rows of q_0..q_level and of the special moduli.
pub(crate) fn restrict_to_qp_level(
    par: &Arc<Parameters>,
    p: &Poly,
    level: usize,
) -> Result<Poly> {
    let nq = par.moduli().len();
    let np = par.special_moduli().len();
    if level + 1 == nq {
        return Ok(p.clone());
    }
    let ctx_qp = par.ctx_qp_level(level)?;
    let mut keep: Vec<usize> = (0..=level).collect();
    keep.extend(nq..nq + np);
    let selected = p.coefficients().select(Axis(0), &keep);
    Ok(Poly::try_convert_from(
        selected,
        ctx_qp,
        *p.representation(),
    )?)
}

/// Divide a polynomial over Q‖P by P with rounding, landing in the Q context
/// of the level, in NTT representation.
pub(crate) fn mod_down(par: &Arc<Parameters>, mut p: Poly, level: usize) -> Result<Poly> {
    p.change_representation(Representation::PowerBasis);
    let mut out = p.scale(&par.scalers_mod_down[level])?;
    out.change_representation(Representation::Ntt);
    Ok(out)
}

/// Multiply a polynomial over Q‖P row-wise by a (Q-part, P-part) pair of
/// NttShoup polynomials, as used by the diagonal-matrix accumulation.
pub(crate) fn mul_qp(
    par: &Arc<Parameters>,
    p: &Poly,
    dq: &Poly,
    dp: &Poly,
    level: usize,
) -> Result<Poly> {
    let nq = level + 1;
    let ctx_qp = par.ctx_qp_level(level)?;
    if p.ctx() != ctx_qp {
        return Err(Error::MathError(rtf_math::Error::InvalidContext));
    }

    let degree = par.degree();
    let mut out = Array2::<u64>::zeros((p.coefficients().nrows(), degree));
    let moduli = ctx_qp.moduli_operators();

    let dq_coeffs = dq.coefficients();
    let dq_shoup = dq
        .coefficients_shoup()
        .ok_or_else(|| Error::DefaultError("Missing Shoup coefficients".to_string()))?;
    let dp_coeffs = dp.coefficients();
    let dp_shoup = dp
        .coefficients_shoup()
        .ok_or_else(|| Error::DefaultError("Missing Shoup coefficients".to_string()))?;

    for (i, qi) in moduli.iter().enumerate() {
        let src = p.coefficients();
        let row = src.index_axis(Axis(0), i);
        let (d_row, d_shoup_row) = if i < nq {
            (dq_coeffs.index_axis(Axis(0), i), dq_shoup.index_axis(Axis(0), i))
        } else {
            (
                dp_coeffs.index_axis(Axis(0), i - nq),
                dp_shoup.index_axis(Axis(0), i - nq),
            )
        };
        for j in 0..degree {
            out[[i, j]] = qi.mul_shoup(row[j], d_row[j], d_shoup_row[j]);
        }
    }

    Ok(Poly::try_convert_from(out, ctx_qp, Representation::Ntt)?)
}

#[cfg(test)]
mod tests {
    use super::KeySwitchingKey;
    use crate::keys::SecretKey;
    use crate::Parameters;
    use rand::rng;
    use rtf_math::rq::{traits::TryConvertFrom, Poly, Representation};
    use std::error::Error;

    #[test]
    fn switch_preserves_linear_relation() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let ctx_qp = par.ctx_qp_level(par.max_level())?;

        // Switching key from a second secret s'.
        let sk2 = SecretKey::random(&par, &mut rng);
        let s2 = Poly::try_convert_from(
            &sk2.coeffs as &[i64],
            ctx_qp,
            Representation::PowerBasis,
        )?;
        let ksk = KeySwitchingKey::new(&sk, &s2, &mut rng)?;

        for level in [0, par.max_level()] {
            let ctx = par.ctx_q_level(level)?;
            let p = Poly::random(&ctx.clone(), Representation::PowerBasis, &mut rng);
            let (c0, c1) = ksk.switch(&p)?;

            // c0 + c1 * s = p * s' + e with e small: check that the
            // difference is small compared to q.
            let s = sk.s_poly(ctx)?;
            let s2_q = {
                let mut s2_q = Poly::try_convert_from(
                    &sk2.coeffs as &[i64],
                    ctx,
                    Representation::PowerBasis,
                )?;
                s2_q.change_representation(Representation::Ntt);
                s2_q
            };
            let mut p_ntt = p.clone();
            p_ntt.change_representation(Representation::Ntt);

            let mut lhs = c1.clone();
            lhs *= s.as_ref();
            lhs += &c0;
            let mut rhs = p_ntt;
            rhs *= &s2_q;
            lhs -= &rhs;
            lhs.change_representation(Representation::PowerBasis);

            let q = ctx.modulus();
            let bound = num_bigint::BigUint::from(1u64) << (q.bits() as usize - 8);
            for coeff in Vec::<num_bigint::BigUint>::from(&lhs) {
                let centered = std::cmp::min(coeff.clone(), q - &coeff);
                assert!(centered < bound, "noise too large after key switch");
            }
        }
        Ok(())
    }
}
