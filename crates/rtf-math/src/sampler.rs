#![warn(missing_docs, unused_imports)]

//! Samplers for the distributions used in key generation and noise
//! injection: truncated discrete Gaussians and ternary vectors with a fixed
//! Hamming weight.

use rand::{CryptoRng, Rng, RngCore};
use rand_distr::{Distribution, Normal};

/// Sample a vector of `size` discrete Gaussian values of standard deviation
/// `sigma`, truncated at ⌊sigma * sqrt(2π)⌋.
///
/// Returns an error when sigma is not a finite non-negative value.
pub fn sample_vec_gaussian<R: RngCore + CryptoRng>(
    size: usize,
    sigma: f64,
    rng: &mut R,
) -> Result<Vec<i64>, &'static str> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err("The standard deviation should be finite and non-negative");
    }
    if sigma == 0.0 {
        return Ok(vec![0i64; size]);
    }

    let bound = (sigma * (2.0 * std::f64::consts::PI).sqrt()).floor() as i64;
    let normal = Normal::new(0.0, sigma).map_err(|_| "Invalid Gaussian parameter")?;

    let mut out = Vec::with_capacity(size);
    while out.len() < size {
        let x = normal.sample(rng).round() as i64;
        if x.abs() <= bound {
            out.push(x);
        }
    }
    Ok(out)
}

/// Sample a ternary vector of `size` coefficients in {-1, 0, 1} with exactly
/// `hamming_weight` nonzero coefficients, signs balanced at random.
///
/// Returns an error when the Hamming weight exceeds the size.
pub fn sample_vec_ternary<R: RngCore + CryptoRng>(
    size: usize,
    hamming_weight: usize,
    rng: &mut R,
) -> Result<Vec<i64>, &'static str> {
    if hamming_weight > size {
        return Err("The Hamming weight should not exceed the vector size");
    }

    let mut out = vec![0i64; size];
    let mut placed = 0;
    while placed < hamming_weight {
        let idx = rng.random_range(0..size);
        if out[idx] == 0 {
            out[idx] = if rng.random_bool(0.5) { 1 } else { -1 };
            placed += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{sample_vec_gaussian, sample_vec_ternary};
    use rand::rng;

    #[test]
    fn gaussian_bound() {
        let mut rng = rng();
        let sigma = 3.2;
        let bound = (sigma * (2.0 * std::f64::consts::PI).sqrt()).floor() as i64;
        let v = sample_vec_gaussian(4096, sigma, &mut rng).unwrap();
        assert_eq!(v.len(), 4096);
        assert!(v.iter().all(|x| x.abs() <= bound));
        assert!(v.iter().any(|x| *x != 0));
    }

    #[test]
    fn gaussian_zero_sigma() {
        let mut rng = rng();
        let v = sample_vec_gaussian(128, 0.0, &mut rng).unwrap();
        assert!(v.iter().all(|x| *x == 0));
    }

    #[test]
    fn gaussian_invalid() {
        let mut rng = rng();
        assert!(sample_vec_gaussian(16, -1.0, &mut rng).is_err());
        assert!(sample_vec_gaussian(16, f64::NAN, &mut rng).is_err());
    }

    #[test]
    fn ternary_weight() {
        let mut rng = rng();
        for h in [0usize, 1, 64, 192] {
            let v = sample_vec_ternary(256, h, &mut rng).unwrap();
            assert_eq!(v.iter().filter(|x| **x != 0).count(), h);
            assert!(v.iter().all(|x| x.abs() <= 1));
        }
        assert!(sample_vec_ternary(16, 17, &mut rng).is_err());
    }
}
