#![warn(missing_docs, unused_imports)]
#![allow(clippy::indexing_slicing)]

//! Polynomials in R_q\[x\] = (ZZ_q1 x ... x ZZ_qn)\[x\] where the qi's are
//! prime moduli in zq.

mod context;
mod convert;
mod ops;
mod serialize;

pub mod scaler;
pub mod traits;

use self::{scaler::Scaler, traits::TryConvertFrom};
use crate::sampler::{sample_vec_gaussian, sample_vec_ternary};
use crate::{Error, Result};
pub use context::Context;
pub use ops::dot_product;

use itertools::{izip, Itertools};
use ndarray::{s, Array2, ArrayView2};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

/// Possible representations of the underlying polynomial.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// This is the list of coefficients ci, such that the polynomial is
    /// c0 + c1 * x + ... + c_(degree - 1) * x^(degree - 1)
    #[default]
    PowerBasis,
    /// This is the NTT representation of the PowerBasis representation.
    Ntt,
    /// This is a "Shoup" representation of the Ntt representation used for
    /// faster multiplication; the form in which constant multiplier
    /// polynomials (e.g. encoded diagonal matrices) are stored.
    NttShoup,
}

/// An exponent for a substitution x -> x^i.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionExponent {
    /// The value of the exponent.
    pub exponent: usize,

    ctx: Arc<Context>,
    power_bitrev: Vec<usize>,
}

impl SubstitutionExponent {
    /// Creates a substitution element from an exponent.
    /// Returns an error if the exponent is even modulo 2 * degree.
    pub fn new(ctx: &Arc<Context>, exponent: usize) -> Result<Self> {
        let exponent = exponent % (2 * ctx.degree);
        if exponent & 1 == 0 {
            return Err(Error::Default(
                "The exponent should be odd modulo 2 * degree".to_string(),
            ));
        }
        let mut power = (exponent - 1) / 2;
        let mask = ctx.degree - 1;
        let power_bitrev = (0..ctx.degree)
            .map(|_| {
                let r = (power & mask).reverse_bits() >> (ctx.degree.leading_zeros() + 1);
                power += exponent;
                r
            })
            .collect_vec();
        Ok(Self {
            ctx: ctx.clone(),
            exponent,
            power_bitrev,
        })
    }
}

/// Struct that holds a polynomial for a specific context.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Poly {
    pub(crate) ctx: Arc<Context>,
    pub(crate) representation: Representation,
    pub(crate) coefficients: Array2<u64>,
    pub(crate) coefficients_shoup: Option<Array2<u64>>,
}

impl Zeroize for Poly {
    fn zeroize(&mut self) {
        if let Some(coeffs) = self.coefficients.as_slice_mut() {
            coeffs.zeroize()
        }
        self.zeroize_shoup()
    }
}

impl AsRef<Poly> for Poly {
    fn as_ref(&self) -> &Poly {
        self
    }
}

impl AsMut<Poly> for Poly {
    fn as_mut(&mut self) -> &mut Poly {
        self
    }
}

impl Poly {
    /// Creates a polynomial holding the constant 0.
    #[must_use]
    pub fn zero(ctx: &Arc<Context>, representation: Representation) -> Self {
        Self {
            ctx: ctx.clone(),
            representation,
            coefficients: Array2::zeros((ctx.q.len(), ctx.degree)),
            coefficients_shoup: if representation == Representation::NttShoup {
                Some(Array2::zeros((ctx.q.len(), ctx.degree)))
            } else {
                None
            },
        }
    }

    /// Current representation of the polynomial.
    #[must_use]
    pub const fn representation(&self) -> &Representation {
        &self.representation
    }

    /// Context of the polynomial.
    #[must_use]
    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Zeroize the shoup coefficients.
    fn zeroize_shoup(&mut self) {
        if let Some(coeffs_shoup) = self
            .coefficients_shoup
            .as_mut()
            .and_then(|f| f.as_slice_mut())
        {
            coeffs_shoup.zeroize()
        }
    }

    /// Change the representation of the underlying polynomial.
    pub fn change_representation(&mut self, to: Representation) {
        if self.representation == to {
            return;
        }

        match (&self.representation, &to) {
            (Representation::PowerBasis, Representation::Ntt) => self.ntt_forward(),
            (Representation::PowerBasis, Representation::NttShoup) => {
                self.ntt_forward();
                self.compute_coefficients_shoup()
            }
            (Representation::Ntt, Representation::PowerBasis) => self.ntt_backward(),
            (Representation::Ntt, Representation::NttShoup) => self.compute_coefficients_shoup(),
            (Representation::NttShoup, Representation::PowerBasis) => {
                self.zeroize_shoup();
                self.coefficients_shoup = None;
                self.ntt_backward()
            }
            (Representation::NttShoup, Representation::Ntt) => {
                self.zeroize_shoup();
                self.coefficients_shoup = None;
            }
            _ => unreachable!(),
        }

        self.representation = to;
    }

    /// Compute the Shoup representation of the coefficients.
    fn compute_coefficients_shoup(&mut self) {
        let mut coefficients_shoup = Array2::zeros((self.ctx.q.len(), self.ctx.degree));
        izip!(
            coefficients_shoup.outer_iter_mut(),
            self.coefficients.outer_iter(),
            self.ctx.q.iter()
        )
        .for_each(|(mut v_shoup, v, qi)| {
            v_shoup
                .as_slice_mut()
                .unwrap()
                .copy_from_slice(&qi.shoup_vec(v.as_slice().unwrap()))
        });
        self.coefficients_shoup = Some(coefficients_shoup)
    }

    /// Generate a random polynomial, uniform over the full context.
    pub fn random<R: RngCore + CryptoRng>(
        ctx: &Arc<Context>,
        representation: Representation,
        rng: &mut R,
    ) -> Self {
        let mut p = Poly::zero(ctx, representation);
        izip!(p.coefficients.outer_iter_mut(), ctx.q.iter()).for_each(|(mut v, qi)| {
            v.as_slice_mut()
                .unwrap()
                .copy_from_slice(&qi.random_vec(ctx.degree, rng))
        });
        if p.representation == Representation::NttShoup {
            p.compute_coefficients_shoup()
        }
        p
    }

    /// Generate a random polynomial deterministically from a seed.
    #[must_use]
    pub fn random_from_seed(
        ctx: &Arc<Context>,
        representation: Representation,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Self {
        // Hash the seed into a ChaCha8Rng seed.
        let mut hasher = Sha256::new();
        hasher.update(seed);
        let mut prng =
            ChaCha8Rng::from_seed(<ChaCha8Rng as SeedableRng>::Seed::from(hasher.finalize()));
        let mut p = Poly::zero(ctx, representation);
        izip!(p.coefficients.outer_iter_mut(), ctx.q.iter()).for_each(|(mut v, qi)| {
            v.as_slice_mut()
                .unwrap()
                .copy_from_slice(&qi.random_vec(ctx.degree, &mut prng))
        });
        if p.representation == Representation::NttShoup {
            p.compute_coefficients_shoup()
        }
        p
    }

    /// Generate a polynomial with small discrete-Gaussian coefficients of
    /// deviation `sigma`, truncated at ⌊sigma * sqrt(2π)⌋, and convert it
    /// into the specified representation.
    pub fn small_gaussian<R: RngCore + CryptoRng>(
        ctx: &Arc<Context>,
        representation: Representation,
        sigma: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let coeffs = Zeroizing::new(
            sample_vec_gaussian(ctx.degree, sigma, rng).map_err(|e| Error::Default(e.to_string()))?,
        );
        let mut p = Poly::try_convert_from(
            coeffs.as_ref() as &[i64],
            ctx,
            Representation::PowerBasis,
        )?;
        if representation != Representation::PowerBasis {
            p.change_representation(representation);
        }
        Ok(p)
    }

    /// Generate a ternary polynomial with exactly `hamming_weight` nonzero
    /// coefficients and convert it into the specified representation.
    pub fn small_ternary<R: RngCore + CryptoRng>(
        ctx: &Arc<Context>,
        representation: Representation,
        hamming_weight: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let coeffs = Zeroizing::new(
            sample_vec_ternary(ctx.degree, hamming_weight, rng)
                .map_err(|e| Error::Default(e.to_string()))?,
        );
        let mut p = Poly::try_convert_from(
            coeffs.as_ref() as &[i64],
            ctx,
            Representation::PowerBasis,
        )?;
        if representation != Representation::PowerBasis {
            p.change_representation(representation);
        }
        Ok(p)
    }

    /// Access the polynomial coefficients in RNS representation.
    #[must_use]
    pub fn coefficients(&self) -> ArrayView2<'_, u64> {
        self.coefficients.view()
    }

    /// Access the Shoup representation of the coefficients, present only in
    /// NttShoup representation.
    #[must_use]
    pub fn coefficients_shoup(&self) -> Option<ArrayView2<'_, u64>> {
        self.coefficients_shoup.as_ref().map(|c| c.view())
    }

    /// Overwrite the coefficients, keeping the current representation.
    ///
    /// Aborts if the shape does not match the context in debug mode.
    pub fn set_coefficients(&mut self, coefficients: Array2<u64>) {
        debug_assert_eq!(
            coefficients.shape(),
            [self.ctx.q.len(), self.ctx.degree]
        );
        self.coefficients = coefficients;
        if self.representation == Representation::NttShoup {
            self.compute_coefficients_shoup()
        }
    }

    /// Computes the forward Ntt on the coefficients.
    fn ntt_forward(&mut self) {
        izip!(self.coefficients.outer_iter_mut(), self.ctx.ops.iter())
            .for_each(|(mut v, op)| op.forward(v.as_slice_mut().unwrap()));
    }

    /// Computes the backward Ntt on the coefficients.
    fn ntt_backward(&mut self) {
        izip!(self.coefficients.outer_iter_mut(), self.ctx.ops.iter())
            .for_each(|(mut v, op)| op.backward(v.as_slice_mut().unwrap()));
    }

    /// Substitute x by x^i in a polynomial.
    /// In PowerBasis representation, i can be any odd integer; in Ntt and
    /// NttShoup representation, i must be odd modulo 2 * degree.
    pub fn substitute(&self, i: &SubstitutionExponent) -> Result<Poly> {
        let mut q = Poly::zero(&self.ctx, self.representation);
        match self.representation {
            Representation::Ntt | Representation::NttShoup => {
                izip!(
                    q.coefficients.outer_iter_mut(),
                    self.coefficients.outer_iter()
                )
                .for_each(|(mut q_row, p_row)| {
                    for (j, k) in izip!(self.ctx.bitrev.iter(), i.power_bitrev.iter()) {
                        q_row[*j] = p_row[*k]
                    }
                });
                if self.representation == Representation::NttShoup {
                    izip!(
                        q.coefficients_shoup.as_mut().unwrap().outer_iter_mut(),
                        self.coefficients_shoup.as_ref().unwrap().outer_iter()
                    )
                    .for_each(|(mut q_row, p_row)| {
                        for (j, k) in izip!(self.ctx.bitrev.iter(), i.power_bitrev.iter()) {
                            q_row[*j] = p_row[*k]
                        }
                    });
                }
            }
            Representation::PowerBasis => {
                let mut power = 0usize;
                let mask = self.ctx.degree - 1;
                for j in 0..self.ctx.degree {
                    izip!(
                        self.ctx.q.iter(),
                        q.coefficients.slice_mut(s![.., power & mask]),
                        self.coefficients.slice(s![.., j])
                    )
                    .for_each(|(qi, qij, pij)| {
                        if power & self.ctx.degree != 0 {
                            *qij = qi.sub(*qij, *pij)
                        } else {
                            *qij = qi.add(*qij, *pij)
                        }
                    });
                    power += i.exponent
                }
            }
        }

        Ok(q)
    }

    /// Modulo switch down the polynomial by dividing and rounding by the
    /// last modulus of the chain. The polynomial must be in PowerBasis
    /// representation.
    pub fn mod_switch_down_next(&mut self) -> Result<()> {
        if self.representation != Representation::PowerBasis {
            return Err(Error::IncorrectRepresentation(
                self.representation,
                Representation::PowerBasis,
            ));
        }
        let next_ctx = self.ctx.next_context.as_ref().ok_or(Error::NoMoreContext)?;

        let q_len = self.ctx.q.len();
        let q_last = self.ctx.moduli[q_len - 1];
        let q_last_half = q_last / 2;

        let (coeffs, last_row) = {
            let mut coeffs = Array2::zeros((q_len - 1, self.ctx.degree));
            coeffs.assign(&self.coefficients.slice(s![..q_len - 1, ..]));
            let last_row = self.coefficients.slice(s![q_len - 1, ..]).to_owned();
            (coeffs, last_row)
        };

        let mut new_coeffs = coeffs;
        for (j, (qj, inv, inv_shoup)) in izip!(
            self.ctx.q[..q_len - 1].iter(),
            self.ctx.inv_last_qi_mod_qj.iter(),
            self.ctx.inv_last_qi_mod_qj_shoup.iter()
        )
        .enumerate()
        {
            let mut row = new_coeffs.slice_mut(s![j, ..]);
            izip!(row.iter_mut(), last_row.iter()).for_each(|(xj, x_last)| {
                // Centered representative of the last residue.
                let r = if *x_last > q_last_half {
                    // Negative: r' = x_last - q_last, reduce modulo qj.
                    qj.reduce(*x_last + qj.modulus() * 2 - qj.reduce(q_last))
                } else {
                    qj.reduce(*x_last)
                };
                let diff = qj.sub(qj.reduce(*xj), qj.reduce(r));
                *xj = qj.mul_shoup(diff, *inv, *inv_shoup);
            });
        }

        self.ctx = next_ctx.clone();
        self.coefficients = new_coeffs;
        Ok(())
    }

    /// Modulo switch down the polynomial to a target child context.
    pub fn mod_switch_down_to(&mut self, context: &Arc<Context>) -> Result<()> {
        let niterations = self.ctx.niterations_to(context)?;
        for _ in 0..niterations {
            self.mod_switch_down_next()?;
        }
        debug_assert_eq!(&self.ctx, context);
        Ok(())
    }

    /// Scale the polynomial through an [`Scaler`] into its destination
    /// context, rounding to the nearest integer. The polynomial must be in
    /// PowerBasis representation.
    pub fn scale(&self, scaler: &Scaler) -> Result<Poly> {
        scaler.scale_poly(self)
    }
}
