//! Precision statistics of decoded slot vectors, used by the parameter
//! sweeps to assert the accuracy of the transciphering pipeline.

use num_complex::Complex64;

/// Precision statistics between a wanted and a measured slot vector: the
/// negative log2 of the error, separately on the real and imaginary parts,
/// and the standard deviation of the error in the slot (time) and
/// coefficient (frequency) domains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionStats {
    /// Minimum precision of the real parts, in bits.
    pub min_precision_real: f64,
    /// Minimum precision of the imaginary parts, in bits.
    pub min_precision_imag: f64,
    /// Mean precision of the real parts, in bits.
    pub mean_precision_real: f64,
    /// Mean precision of the imaginary parts, in bits.
    pub mean_precision_imag: f64,
    /// Log2 of the error standard deviation in the slot domain.
    pub std_time: f64,
    /// Log2 of the error standard deviation across the error spectrum.
    pub std_freq: f64,
}

fn precision_bits(err: f64) -> f64 {
    if err == 0.0 {
        f64::MAX
    } else {
        -err.abs().log2()
    }
}

fn std_log2(errors: &[f64]) -> f64 {
    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let var = errors.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / n;
    if var == 0.0 {
        f64::MIN
    } else {
        var.sqrt().log2()
    }
}

impl PrecisionStats {
    /// Compute the statistics of `have` against `want`.
    pub fn new(want: &[Complex64], have: &[Complex64]) -> Self {
        debug_assert_eq!(want.len(), have.len());

        let errors: Vec<Complex64> = want
            .iter()
            .zip(have.iter())
            .map(|(w, h)| w - h)
            .collect();

        let real: Vec<f64> = errors.iter().map(|e| e.re).collect();
        let imag: Vec<f64> = errors.iter().map(|e| e.im).collect();
        let norms: Vec<f64> = errors.iter().map(|e| e.norm()).collect();

        let min_precision_real = real
            .iter()
            .map(|e| precision_bits(*e))
            .fold(f64::MAX, f64::min);
        let min_precision_imag = imag
            .iter()
            .map(|e| precision_bits(*e))
            .fold(f64::MAX, f64::min);
        let mean_precision_real =
            real.iter().map(|e| precision_bits(*e)).sum::<f64>() / real.len() as f64;
        let mean_precision_imag =
            imag.iter().map(|e| precision_bits(*e)).sum::<f64>() / imag.len() as f64;

        // Frequency-domain deviation of the error spectrum.
        let n = errors.len();
        let mut spectrum = vec![0.0f64; n];
        for (k, s) in spectrum.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for (j, e) in errors.iter().enumerate() {
                let angle = -2.0 * std::f64::consts::PI * (k * j) as f64 / n as f64;
                acc += e * Complex64::new(angle.cos(), angle.sin());
            }
            *s = acc.norm();
        }

        Self {
            min_precision_real,
            min_precision_imag,
            mean_precision_real,
            mean_precision_imag,
            std_time: std_log2(&norms),
            std_freq: std_log2(&spectrum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PrecisionStats;
    use num_complex::Complex64;

    #[test]
    fn exact_vectors_have_max_precision() {
        let v = vec![Complex64::new(0.5, -0.25); 8];
        let stats = PrecisionStats::new(&v, &v);
        assert_eq!(stats.min_precision_real, f64::MAX);
        assert_eq!(stats.min_precision_imag, f64::MAX);
    }

    #[test]
    fn known_error_level() {
        let want = vec![Complex64::new(1.0, 0.0); 16];
        let have: Vec<Complex64> = want
            .iter()
            .map(|w| w + Complex64::new(2.0f64.powi(-20), 0.0))
            .collect();
        let stats = PrecisionStats::new(&want, &have);
        assert!((stats.min_precision_real - 20.0).abs() < 1e-9);
        assert!((stats.mean_precision_real - 20.0).abs() < 1e-9);
        // The imaginary parts are exact.
        assert_eq!(stats.min_precision_imag, f64::MAX);
    }
}
