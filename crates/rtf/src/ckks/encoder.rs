//! Complex slot encoding for the CKKS layer: special FFT over the roots of
//! unity of order 2M indexed by the Galois group generated by 5, exact
//! scale-up into the moduli chain, and the coefficient-embedding encoding
//! used by the transciphering client.

use crate::bfv::{Plaintext, PlaintextRingT};
use crate::{Error, Parameters, Result};
use ndarray::Array2;
use num_bigint::{BigInt, BigUint};
use num_complex::Complex64;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use rand::{CryptoRng, RngCore};
use rtf_math::rq::{traits::TryConvertFrom, Poly, Representation};
use rtf_math::sampler::sample_vec_gaussian;
use rtf_util::bit_reverse_in_place;
use std::sync::Arc;

/// Encoder between complex slot vectors and plaintext polynomials.
#[derive(Debug, Clone)]
pub struct CkksEncoder {
    par: Arc<Parameters>,

    /// The 2N-th roots of unity e^(2πik/2N).
    roots: Vec<Complex64>,

    /// rotGroup\[j\] = 5^j mod 2N, indexing the slot orbit.
    rot_group: Vec<usize>,
}

impl CkksEncoder {
    /// Creates an encoder for the given parameters.
    pub fn new(par: &Arc<Parameters>) -> Self {
        let m = 2 * par.degree();
        let mut roots = Vec::with_capacity(m);
        for k in 0..m {
            let angle = 2.0 * std::f64::consts::PI * (k as f64) / (m as f64);
            roots.push(Complex64::new(angle.cos(), angle.sin()));
        }

        let slots = par.slots();
        let mut rot_group = Vec::with_capacity(slots);
        let mut pow5 = 1usize;
        for _ in 0..slots {
            rot_group.push(pow5);
            pow5 = pow5 * 5 % m;
        }

        Self {
            par: par.clone(),
            roots,
            rot_group,
        }
    }

    /// The parameters of the encoder.
    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.par
    }

    /// In-place special FFT of size n on the slot orbit.
    pub(crate) fn special_fft(&self, values: &mut [Complex64], n: usize) {
        let m = 2 * self.par.degree();
        bit_reverse_in_place(values, n);

        let mut len = 2;
        while len <= n {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = m / lenq;
            for i in (0..n).step_by(len) {
                for j in 0..lenh {
                    let idx = (self.rot_group[j] % lenq) * gap;
                    let u = values[i + j];
                    let v = values[i + j + lenh] * self.roots[idx];
                    values[i + j] = u + v;
                    values[i + j + lenh] = u - v;
                }
            }
            len <<= 1;
        }
    }

    /// In-place inverse special FFT of size n on the slot orbit.
    pub(crate) fn special_inv_fft(&self, values: &mut [Complex64], n: usize) {
        let m = 2 * self.par.degree();

        let mut len = n;
        while len >= 2 {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = m / lenq;
            for i in (0..n).step_by(len) {
                for j in 0..lenh {
                    let idx = (lenq - (self.rot_group[j] % lenq)) * gap;
                    let u = values[i + j] + values[i + j + lenh];
                    let v = (values[i + j] - values[i + j + lenh]) * self.roots[idx];
                    values[i + j] = u;
                    values[i + j + lenh] = v;
                }
            }
            len >>= 1;
        }

        let n_inv = 1.0 / n as f64;
        for v in values.iter_mut() {
            *v *= n_inv;
        }
        bit_reverse_in_place(values, n);
    }

    /// Encode a vector of at most `slots` complex values at the given scale
    /// and level; trailing slots are zero.
    pub fn encode(
        &self,
        values: &[Complex64],
        scale: f64,
        level: usize,
    ) -> Result<Plaintext> {
        let slots = self.par.slots();
        if values.len() > slots {
            return Err(Error::TooManyValues(values.len(), slots));
        }

        let mut buffer = vec![Complex64::zero(); slots];
        buffer[..values.len()].copy_from_slice(values);
        self.special_inv_fft(&mut buffer, slots);

        let n = self.par.degree();
        let gap = n / (2 * slots);
        let mut w = vec![0.0f64; n];
        for (j, b) in buffer.iter().enumerate() {
            w[j * gap] = b.re;
            w[j * gap + n / 2] = b.im;
        }

        let ctx = self.par.ctx_q_level(level)?;
        let coefficients = scale_up_vec_exact(&w, scale, ctx.moduli());
        let mut poly = Poly::zero(ctx, Representation::PowerBasis);
        poly.set_coefficients(coefficients);

        Ok(Plaintext {
            par: self.par.clone(),
            poly,
            level,
            scale,
            is_ntt: false,
        })
    }

    /// Decode a plaintext into its complex slot values, dividing the
    /// centered coefficients by the plaintext scale.
    pub fn decode(&self, pt: &Plaintext) -> Result<Vec<Complex64>> {
        self.decode_poly(&pt.poly, pt.scale)
    }

    /// Decode with a Gaussian noise flood of deviation `sigma` added to the
    /// coefficients before reconstruction, bounding the information leaked
    /// by decryption results.
    pub fn decode_with_flood<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        sigma: f64,
        rng: &mut R,
    ) -> Result<Vec<Complex64>> {
        let noise = sample_vec_gaussian(self.par.degree(), sigma, rng)
            .map_err(|e| Error::DefaultError(e.to_string()))?;
        let noise_poly = Poly::try_convert_from(
            &noise as &[i64],
            pt.poly.ctx(),
            Representation::PowerBasis,
        )
        .map_err(Error::MathError)?;
        let mut poly = pt.poly.clone();
        if poly.representation() != &Representation::PowerBasis {
            poly.change_representation(Representation::PowerBasis);
        }
        poly += &noise_poly;
        self.decode_poly(&poly, pt.scale)
    }

    fn decode_poly(&self, poly: &Poly, scale: f64) -> Result<Vec<Complex64>> {
        let mut poly = poly.clone();
        if poly.representation() != &Representation::PowerBasis {
            poly.change_representation(Representation::PowerBasis);
        }

        let q = poly.ctx().modulus().clone();
        let q_half: BigUint = &q >> 1;
        let n = self.par.degree();
        let slots = self.par.slots();
        let gap = n / (2 * slots);

        let coeffs = Vec::<BigUint>::from(&poly);
        let mut w = vec![0.0f64; n];
        for (j, c) in coeffs.into_iter().enumerate() {
            let centered = if c > q_half {
                -BigInt::from(q.clone() - c)
            } else {
                BigInt::from(c)
            };
            w[j] = centered.to_f64().unwrap_or(0.0) / scale;
        }

        let mut buffer = vec![Complex64::zero(); slots];
        for (j, b) in buffer.iter_mut().enumerate() {
            *b = Complex64::new(w[j * gap], w[j * gap + n / 2]);
        }
        self.special_fft(&mut buffer, slots);
        Ok(buffer)
    }

    /// Encode real coefficients directly into the plaintext ring Z_t at the
    /// message scaling: the coefficient embedding used by the transciphering
    /// client before adding the keystream.
    pub fn encode_coeffs_ring_t(
        &self,
        coeffs: &[f64],
        message_scaling: f64,
    ) -> Result<PlaintextRingT> {
        let n = self.par.degree();
        if coeffs.len() > n {
            return Err(Error::TooManyValues(coeffs.len(), n));
        }
        let mut padded = vec![0.0f64; n];
        padded[..coeffs.len()].copy_from_slice(coeffs);

        let t = [self.par.plaintext()];
        let rows = scale_up_vec_exact(&padded, message_scaling, &t);
        let mut poly = Poly::zero(&self.par.ctx_t, Representation::PowerBasis);
        poly.set_coefficients(rows);

        Ok(PlaintextRingT {
            par: self.par.clone(),
            poly,
            scale: message_scaling,
        })
    }

    /// Decode a plaintext over Z_t back to real coefficients, inverting
    /// [`CkksEncoder::encode_coeffs_ring_t`].
    pub fn decode_coeffs_ring_t(&self, rt: &PlaintextRingT) -> Vec<f64> {
        let t = self.par.plaintext();
        let half = t / 2;
        rt.poly
            .coefficients()
            .row(0)
            .iter()
            .map(|c| {
                let centered = if *c > half {
                    *c as f64 - t as f64
                } else {
                    *c as f64
                };
                centered / rt.scale
            })
            .collect()
    }
}

/// Scale a vector of reals by `scale` and project the rounded integers into
/// the given moduli, exactly: values above 2^63 go through big-integer
/// arithmetic.
pub fn scale_up_vec_exact(values: &[f64], scale: f64, moduli: &[u64]) -> Array2<u64> {
    let mut out = Array2::<u64>::zeros((moduli.len(), values.len()));
    for (i, v) in values.iter().enumerate() {
        let x = v * scale;
        if x.abs() > 1.8446744073709552e19 {
            let big = BigInt::from_f64(x.abs().round()).unwrap_or_else(BigInt::zero);
            for (j, q) in moduli.iter().enumerate() {
                let r = (&big % q).to_u64().unwrap();
                out[[j, i]] = if x < 0.0 && r != 0 { q - r } else { r };
            }
        } else {
            let r = x.abs().round() as u64;
            for (j, q) in moduli.iter().enumerate() {
                let rq = r % q;
                out[[j, i]] = if x < 0.0 && rq != 0 { q - rq } else { rq };
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::CkksEncoder;
    use crate::Parameters;
    use num_complex::Complex64;
    use rand::{rng, Rng};

    #[test]
    fn fft_roundtrip() {
        let par = Parameters::rubato_test().unwrap();
        let encoder = CkksEncoder::new(&par);
        let mut rng = rng();

        let slots = par.slots();
        let values: Vec<Complex64> = (0..slots)
            .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
            .collect();

        let mut buffer = values.clone();
        encoder.special_inv_fft(&mut buffer, slots);
        encoder.special_fft(&mut buffer, slots);

        for (a, b) in values.iter().zip(buffer.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let par = Parameters::rubato_test().unwrap();
        let encoder = CkksEncoder::new(&par);
        let mut rng = rng();

        let values: Vec<Complex64> = (0..par.slots())
            .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
            .collect();

        let pt = encoder.encode(&values, par.scale(), par.max_level()).unwrap();
        let decoded = encoder.decode(&pt).unwrap();

        // Within 2^-20 of the input for the default precision.
        for (a, b) in values.iter().zip(decoded.iter()) {
            assert!((a - b).norm() < 2.0f64.powi(-20));
        }
    }

    #[test]
    fn coeffs_ring_t_roundtrip() {
        let par = Parameters::rubato_test().unwrap();
        let encoder = CkksEncoder::new(&par);
        let mut rng = rng();

        let coeffs: Vec<f64> = (0..par.degree())
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();
        let scaling = par.message_scaling();

        let rt = encoder.encode_coeffs_ring_t(&coeffs, scaling).unwrap();
        let decoded = encoder.decode_coeffs_ring_t(&rt);
        for (a, b) in coeffs.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 1.0 / scaling);
        }
    }
}
