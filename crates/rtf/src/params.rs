//! Parameters for the RtF transciphering scheme.

use crate::{Error, ParametersError, Result};
use rtf_math::{
    rns::ScalingFactor,
    rq::{scaler::Scaler, Context},
    zq::{primes::generate_prime, Modulus},
};
use rtf_traits::FheParameters;
use num_bigint::BigUint;
use num_traits::One;
use std::fmt::Debug;
use std::sync::Arc;

/// Metadata driving the half-bootstrapping circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfBootMeta {
    /// Degree of the Chebyshev interpolation of the scaled sine.
    pub sine_degree: usize,
    /// Range K of the approximation: the sine is interpolated on [-K, K].
    pub sine_range: usize,
    /// Number of double-angle iterations applied after the interpolation.
    pub double_angle: usize,
    /// Number of merged CoeffsToSlots factors (levels consumed by CtS).
    pub cts_depth: usize,
    /// Ratio between the plaintext modulus and the message scaling.
    pub message_ratio: f64,
}

impl Default for HalfBootMeta {
    fn default() -> Self {
        // Two CtS factors, a degree-31 interpolation and no double-angle
        // iteration consume the seven levels above the base of the
        // authoritative chain.
        Self {
            sine_degree: 31,
            sine_range: 12,
            double_angle: 0,
            cts_depth: 2,
            message_ratio: 256.0,
        }
    }
}

/// Precomputed material for the BFV tensoring at a given level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MultiplicationParameters {
    pub(crate) extended_ctx: Arc<Context>,
    pub(crate) extend: Scaler,
    pub(crate) down: Scaler,
}

/// Parameters for the RtF transciphering scheme.
///
/// This struct consolidates the ring, moduli-chain, plaintext and
/// bootstrapping data, together with the pre-computed contexts and scalers
/// every layer of the scheme consumes.
#[derive(PartialEq)]
pub struct Parameters {
    log_n: usize,
    polynomial_degree: usize,

    /// The coefficient moduli q_i.
    pub(crate) moduli: Box<[u64]>,
    moduli_sizes: Box<[usize]>,

    /// The auxiliary (special) moduli p_j used for key switching.
    pub(crate) special_moduli: Box<[u64]>,

    plaintext_modulus: u64,
    pub(crate) plaintext: Modulus,

    log_slots: usize,
    log_fv_slots: usize,

    scale: f64,
    hamming_weight: usize,
    sigma_err: f64,

    halfboot: HalfBootMeta,

    pub(crate) ctx_q: Arc<Context>,
    pub(crate) ctx_p: Arc<Context>,
    pub(crate) ctx_t: Arc<Context>,
    pub(crate) ctx_qp: Box<[Arc<Context>]>,

    pub(crate) scalers_up: Box<[Scaler]>,
    pub(crate) scalers_down: Box<[Scaler]>,
    pub(crate) scalers_mod_down: Box<[Scaler]>,
    pub(crate) mul_params: Box<[MultiplicationParameters]>,
}

impl Debug for Parameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameters")
            .field("log_n", &self.log_n)
            .field("moduli", &self.moduli)
            .field("special_moduli", &self.special_moduli)
            .field("plaintext_modulus", &self.plaintext_modulus)
            .field("log_slots", &self.log_slots)
            .field("log_fv_slots", &self.log_fv_slots)
            .field("scale", &self.scale)
            .finish()
    }
}

impl FheParameters for Parameters {}

impl Parameters {
    /// Returns the underlying polynomial degree N.
    pub const fn degree(&self) -> usize {
        self.polynomial_degree
    }

    /// Returns log2 of the polynomial degree.
    pub const fn log_n(&self) -> usize {
        self.log_n
    }

    /// Returns a reference to the ciphertext moduli.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Returns a reference to the ciphertext moduli sizes, in bits.
    pub fn moduli_sizes(&self) -> &[usize] {
        &self.moduli_sizes
    }

    /// Returns a reference to the special moduli.
    pub fn special_moduli(&self) -> &[u64] {
        &self.special_moduli
    }

    /// Returns the plaintext modulus.
    pub const fn plaintext(&self) -> u64 {
        self.plaintext_modulus
    }

    /// Returns the number of CKKS slots.
    pub const fn slots(&self) -> usize {
        1 << self.log_slots
    }

    /// Returns log2 of the number of CKKS slots.
    pub const fn log_slots(&self) -> usize {
        self.log_slots
    }

    /// Returns the number of FV slots.
    pub const fn fv_slots(&self) -> usize {
        1 << self.log_fv_slots
    }

    /// Returns log2 of the number of FV slots.
    pub const fn log_fv_slots(&self) -> usize {
        self.log_fv_slots
    }

    /// Returns the default CKKS scale Δ.
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Returns the Hamming weight of the sparse secret key.
    pub const fn hamming_weight(&self) -> usize {
        self.hamming_weight
    }

    /// Returns the standard deviation of the RLWE error.
    pub const fn sigma_err(&self) -> f64 {
        self.sigma_err
    }

    /// Returns the half-bootstrapping metadata.
    pub const fn halfboot(&self) -> &HalfBootMeta {
        &self.halfboot
    }

    /// Returns the message scaling of the client encoding,
    /// t / message_ratio.
    pub fn message_scaling(&self) -> f64 {
        self.plaintext_modulus as f64 / self.halfboot.message_ratio
    }

    /// Returns the maximum level allowed by these parameters.
    pub fn max_level(&self) -> usize {
        self.moduli.len() - 1
    }

    /// Returns the context over the moduli q_0, ..., q_level.
    pub fn ctx_q_level(&self, level: usize) -> Result<&Arc<Context>> {
        if level > self.max_level() {
            return Err(Error::DefaultError(format!("Invalid level: {level}")));
        }
        let mut ctx = &self.ctx_q;
        for _ in 0..self.max_level() - level {
            ctx = ctx.next_context().unwrap();
        }
        Ok(ctx)
    }

    /// Returns the context over q_0, ..., q_level, p_0, ..., used during key
    /// switching at the given level.
    pub fn ctx_qp_level(&self, level: usize) -> Result<&Arc<Context>> {
        self.ctx_qp
            .get(level)
            .ok_or_else(|| Error::DefaultError(format!("Invalid level: {level}")))
    }

    /// Returns the level of a polynomial context in the q chain.
    pub fn level_of_ctx(&self, ctx: &Arc<Context>) -> Result<usize> {
        let down = self.ctx_q.niterations_to(ctx).map_err(Error::MathError)?;
        Ok(self.max_level() - down)
    }

    /// Returns the Galois element corresponding to a rotation by `step`
    /// slots, i.e. 5^step modulo 2N.
    pub fn galois_element(&self, step: isize) -> u64 {
        let m = (2 * self.polynomial_degree) as u64;
        let order = (self.polynomial_degree >> 1) as isize;
        let step = step.rem_euclid(order) as u64;
        let mut g = 1u64;
        let mut base = 5u64 % m;
        let mut e = step;
        while e > 0 {
            if e & 1 == 1 {
                g = (g * base) % m;
            }
            base = (base * base) % m;
            e >>= 1;
        }
        g
    }

    /// Returns the Galois element of the conjugation (row swap), 2N - 1.
    pub const fn galois_element_conjugate(&self) -> u64 {
        (2 * self.polynomial_degree - 1) as u64
    }

    /// The product of the special moduli, as a big integer.
    pub fn special_modulus(&self) -> BigUint {
        self.special_moduli
            .iter()
            .fold(BigUint::one(), |acc, p| acc * *p)
    }

    /// The authoritative RUBATO128L parameter slice: LogN = 16,
    /// LogQ = [55, 45 x 7], LogP = 61, Δ = 2^45, sparse secret of Hamming
    /// weight 192.
    pub fn rubato_128l() -> Result<Arc<Self>> {
        ParametersBuilder::new()
            .set_degree(1 << 16)
            .set_moduli_sizes(&[55, 45, 45, 45, 45, 45, 45, 45])
            .set_special_moduli_sizes(&[61])
            .set_plaintext_modulus(0x1fc0001)
            .set_scale((1u64 << 45) as f64)
            .set_hamming_weight(192)
            .set_log_slots(15)
            .set_log_fv_slots(16)
            .build_arc()
    }

    /// A down-scaled parameter set with the same shape as
    /// [`Parameters::rubato_128l`], for tests.
    pub fn rubato_test() -> Result<Arc<Self>> {
        ParametersBuilder::new()
            .set_degree(1 << 4)
            .set_moduli_sizes(&[40, 30, 30, 30, 30, 30, 30, 30])
            .set_special_moduli_sizes(&[45])
            .set_plaintext_modulus(40961)
            .set_scale((1u64 << 30) as f64)
            .set_hamming_weight(4)
            .set_log_slots(3)
            .set_log_fv_slots(4)
            .set_halfboot(HalfBootMeta {
                sine_degree: 31,
                sine_range: 3,
                double_angle: 0,
                cts_depth: 2,
                message_ratio: 64.0,
            })
            .build_arc()
    }
}

/// Builder for the RtF parameters.
#[derive(Debug)]
pub struct ParametersBuilder {
    degree: usize,
    plaintext: u64,
    sigma_err: f64,
    hamming_weight: usize,
    scale: f64,
    log_slots: Option<usize>,
    log_fv_slots: Option<usize>,
    halfboot: HalfBootMeta,
    moduli: Vec<u64>,
    moduli_sizes: Vec<usize>,
    special_moduli: Vec<u64>,
    special_moduli_sizes: Vec<usize>,
}

impl ParametersBuilder {
    /// Creates a new instance of the builder.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            degree: Default::default(),
            plaintext: Default::default(),
            sigma_err: 3.2,
            hamming_weight: 192,
            scale: (1u64 << 45) as f64,
            log_slots: None,
            log_fv_slots: None,
            halfboot: HalfBootMeta::default(),
            moduli: Default::default(),
            moduli_sizes: Default::default(),
            special_moduli: Default::default(),
            special_moduli_sizes: Default::default(),
        }
    }

    /// Sets the polynomial degree. The degree must be a power of two larger
    /// or equal to 8.
    pub fn set_degree(&mut self, degree: usize) -> &mut Self {
        self.degree = degree;
        self
    }

    /// Sets the plaintext modulus.
    pub fn set_plaintext_modulus(&mut self, plaintext: u64) -> &mut Self {
        self.plaintext = plaintext;
        self
    }

    /// Sets the sizes of the ciphertext moduli.
    /// Only one of `set_moduli_sizes` and `set_moduli` can be specified.
    pub fn set_moduli_sizes(&mut self, sizes: &[usize]) -> &mut Self {
        sizes.clone_into(&mut self.moduli_sizes);
        self
    }

    /// Sets the ciphertext moduli to use.
    /// Only one of `set_moduli_sizes` and `set_moduli` can be specified.
    pub fn set_moduli(&mut self, moduli: &[u64]) -> &mut Self {
        moduli.clone_into(&mut self.moduli);
        self
    }

    /// Sets the sizes of the special moduli.
    pub fn set_special_moduli_sizes(&mut self, sizes: &[usize]) -> &mut Self {
        sizes.clone_into(&mut self.special_moduli_sizes);
        self
    }

    /// Sets the special moduli to use.
    pub fn set_special_moduli(&mut self, moduli: &[u64]) -> &mut Self {
        moduli.clone_into(&mut self.special_moduli);
        self
    }

    /// Sets the standard deviation of the RLWE error.
    pub fn set_sigma_err(&mut self, sigma: f64) -> &mut Self {
        self.sigma_err = sigma;
        self
    }

    /// Sets the Hamming weight of the sparse secret.
    pub fn set_hamming_weight(&mut self, h: usize) -> &mut Self {
        self.hamming_weight = h;
        self
    }

    /// Sets the default CKKS scale.
    pub fn set_scale(&mut self, scale: f64) -> &mut Self {
        self.scale = scale;
        self
    }

    /// Sets the log2 of the CKKS slot count. Defaults to log_n - 1.
    pub fn set_log_slots(&mut self, log_slots: usize) -> &mut Self {
        self.log_slots = Some(log_slots);
        self
    }

    /// Sets the log2 of the FV slot count. Defaults to log_n (full
    /// coefficients).
    pub fn set_log_fv_slots(&mut self, log_fv_slots: usize) -> &mut Self {
        self.log_fv_slots = Some(log_fv_slots);
        self
    }

    /// Sets the half-bootstrapping metadata.
    pub fn set_halfboot(&mut self, meta: HalfBootMeta) -> &mut Self {
        self.halfboot = meta;
        self
    }

    /// Generate ciphertext moduli with the specified sizes.
    fn generate_moduli(
        moduli_sizes: &[usize],
        degree: usize,
        exclude: &[u64],
    ) -> Result<Vec<u64>> {
        let mut moduli: Vec<u64> = vec![];
        for size in moduli_sizes {
            if *size > 62 || *size < 10 {
                return Err(Error::ParametersError(ParametersError::InvalidModulusSize(
                    *size, 10, 62,
                )));
            }

            let mut upper_bound = 1 << size;
            loop {
                if let Some(prime) = generate_prime(*size, 2 * degree as u64, upper_bound) {
                    if !moduli.contains(&prime) && !exclude.contains(&prime) {
                        moduli.push(prime);
                        break;
                    } else {
                        upper_bound = prime;
                    }
                } else {
                    return Err(Error::ParametersError(ParametersError::NotEnoughPrimes(
                        *size, degree,
                    )));
                }
            }
        }

        Ok(moduli)
    }

    /// Build a new `Parameters` inside an `Arc`.
    pub fn build_arc(&self) -> Result<Arc<Parameters>> {
        self.build().map(Arc::new)
    }

    /// Build a new `Parameters`.
    pub fn build(&self) -> Result<Parameters> {
        if self.degree < 8 || !self.degree.is_power_of_two() {
            return Err(Error::ParametersError(ParametersError::InvalidDegree(
                self.degree,
            )));
        }
        let log_n = rtf_util::ilog2(self.degree as u64);

        let plaintext_modulus = Modulus::new(self.plaintext).map_err(|e| {
            Error::ParametersError(ParametersError::InvalidPlaintext(e.to_string()))
        })?;
        if self.plaintext % (2 * self.degree as u64) != 1 {
            return Err(Error::ParametersError(ParametersError::InvalidPlaintext(
                format!(
                    "The plaintext modulus {} is not congruent to 1 modulo {}",
                    self.plaintext,
                    2 * self.degree
                ),
            )));
        }

        if !self.moduli.is_empty() && !self.moduli_sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooManySpecified(
                "Only one of `moduli` and `moduli_sizes` can be specified".to_string(),
            )));
        } else if self.moduli.is_empty() && self.moduli_sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooFewSpecified(
                "One of `moduli` and `moduli_sizes` must be specified".to_string(),
            )));
        }
        if !self.special_moduli.is_empty() && !self.special_moduli_sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooManySpecified(
                "Only one of `special_moduli` and `special_moduli_sizes` can be specified"
                    .to_string(),
            )));
        } else if self.special_moduli.is_empty() && self.special_moduli_sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooFewSpecified(
                "One of `special_moduli` and `special_moduli_sizes` must be specified".to_string(),
            )));
        }

        let moduli = if self.moduli.is_empty() {
            Self::generate_moduli(&self.moduli_sizes, self.degree, &[])?
        } else {
            self.moduli.clone()
        };
        let special_moduli = if self.special_moduli.is_empty() {
            Self::generate_moduli(&self.special_moduli_sizes, self.degree, &moduli)?
        } else {
            self.special_moduli.clone()
        };
        let moduli_sizes = moduli
            .iter()
            .map(|m| 64 - m.leading_zeros() as usize)
            .collect::<Vec<_>>();

        let log_slots = self.log_slots.unwrap_or(log_n - 1);
        let log_fv_slots = self.log_fv_slots.unwrap_or(log_n);
        if log_slots >= log_n || log_fv_slots > log_n {
            return Err(Error::ParametersError(ParametersError::TooManySpecified(
                "The slot counts do not fit the polynomial degree".to_string(),
            )));
        }
        if self.hamming_weight == 0 || self.hamming_weight >= self.degree {
            return Err(Error::ParametersError(ParametersError::TooFewSpecified(
                "The secret Hamming weight must be in [1, degree)".to_string(),
            )));
        }

        let ctx_q = Context::new_arc(&moduli, self.degree)?;
        let ctx_p = Context::new_arc(&special_moduli, self.degree)?;
        let ctx_t = Context::new_arc(&[self.plaintext], self.degree)?;

        let max_level = moduli.len() - 1;
        let p_product = special_moduli
            .iter()
            .fold(BigUint::one(), |acc, p| acc * *p);
        let t_big = BigUint::from(self.plaintext);

        let mut ctx_qp = Vec::with_capacity(max_level + 1);
        let mut scalers_up = Vec::with_capacity(max_level + 1);
        let mut scalers_down = Vec::with_capacity(max_level + 1);
        let mut scalers_mod_down = Vec::with_capacity(max_level + 1);
        let mut mul_params = Vec::with_capacity(max_level + 1);

        // Extra primes for the tensoring basis, shared across levels.
        let total_bits: usize = moduli_sizes.iter().sum();
        let n_extra_max = (total_bits + 60).div_ceil(62);
        let mut exclude = moduli.clone();
        exclude.extend_from_slice(&special_moduli);
        let extra_primes =
            Self::generate_moduli(&vec![62usize; n_extra_max], self.degree, &exclude)?;

        for level in 0..=max_level {
            let moduli_l = &moduli[..=level];
            let ctx_l = {
                let mut c = &ctx_q;
                for _ in 0..max_level - level {
                    c = c.next_context().unwrap();
                }
                c.clone()
            };

            let mut qp_moduli = moduli_l.to_vec();
            qp_moduli.extend_from_slice(&special_moduli);
            let ctx_qp_l = Context::new_arc(&qp_moduli, self.degree)?;

            let q_l_product = moduli_l.iter().fold(BigUint::one(), |acc, q| acc * *q);

            scalers_up.push(Scaler::new(
                &ctx_t,
                &ctx_l,
                ScalingFactor::new(&q_l_product, &t_big),
            )?);
            scalers_down.push(Scaler::new(
                &ctx_l,
                &ctx_t,
                ScalingFactor::new(&t_big, &q_l_product),
            )?);
            scalers_mod_down.push(Scaler::new(
                &ctx_qp_l,
                &ctx_l,
                ScalingFactor::new(&BigUint::one(), &p_product),
            )?);

            // Tensoring basis for level `level`.
            let bits_l: usize = moduli_sizes[..=level].iter().sum();
            let n_extra = (bits_l + 60).div_ceil(62);
            let mut extended = moduli_l.to_vec();
            extended.extend_from_slice(&extra_primes[..n_extra]);
            let extended_ctx = Context::new_arc(&extended, self.degree)?;
            mul_params.push(MultiplicationParameters {
                extended_ctx: extended_ctx.clone(),
                extend: Scaler::new(&ctx_l, &extended_ctx, ScalingFactor::one())?,
                down: Scaler::new(
                    &extended_ctx,
                    &ctx_l,
                    ScalingFactor::new(&t_big, &q_l_product),
                )?,
            });

            ctx_qp.push(ctx_qp_l);
        }

        Ok(Parameters {
            log_n,
            polynomial_degree: self.degree,
            moduli: moduli.into_boxed_slice(),
            moduli_sizes: moduli_sizes.into_boxed_slice(),
            special_moduli: special_moduli.into_boxed_slice(),
            plaintext_modulus: self.plaintext,
            plaintext: plaintext_modulus,
            log_slots,
            log_fv_slots,
            scale: self.scale,
            hamming_weight: self.hamming_weight,
            sigma_err: self.sigma_err,
            halfboot: self.halfboot,
            ctx_q,
            ctx_p,
            ctx_t,
            ctx_qp: ctx_qp.into_boxed_slice(),
            scalers_up: scalers_up.into_boxed_slice(),
            scalers_down: scalers_down.into_boxed_slice(),
            scalers_mod_down: scalers_mod_down.into_boxed_slice(),
            mul_params: mul_params.into_boxed_slice(),
        })
    }
}
