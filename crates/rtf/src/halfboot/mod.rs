//! The HalfBoot bridge: raises a level-0 ciphertext holding a
//! coefficient-embedded message into a high-level CKKS slot-domain
//! ciphertext, through ModRaise, CoeffsToSlots and EvalMod.

use crate::bfv::Ciphertext;
use crate::ckks::CkksEvaluator;
use crate::keys::{RelinearizationKey, RotationKeySet};
use crate::stc::{bsgs_index, find_best_bsgs_split, PtDiagMatrix};
use crate::{ckks::scale_up_vec_exact, Error, Parameters, Result};
use num_complex::Complex64;
use num_traits::Zero;
use rtf_math::rq::{traits::TryConvertFrom, Poly, Representation};
use rtf_util::bit_reverse_in_place;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// The half-bootstrapper: CoeffsToSlots matrices and the polynomial
/// approximation of the modular reduction, bound to a set of evaluation
/// keys.
#[derive(Debug)]
pub struct HalfBootstrapper {
    par: Arc<Parameters>,
    evaluator: CkksEvaluator,

    /// CoeffsToSlots factor groups; group g is encoded at level
    /// max_level - g and consumed in order.
    cts_matrices: Vec<PtDiagMatrix>,

    /// Chebyshev coefficients of exp(2πi K y / 2^r) on [-1, 1].
    cheb_coeffs: Vec<Complex64>,

    /// Number of double-angle (squaring) iterations after the
    /// interpolation.
    double_angle: usize,

    /// Constant applied when extracting the imaginary part,
    /// message_ratio / 4π.
    post_const: f64,

    /// The expected input scale, 2^round(log2(q_0 / message_ratio)).
    delta_in: f64,
}

impl HalfBootstrapper {
    /// The input scale the transciphering pipeline produces,
    /// 2^round(log2(q_0 / t * message_scaling)).
    pub fn delta_in(par: &Parameters) -> f64 {
        let q0 = par.moduli()[0] as f64;
        let t = par.plaintext() as f64;
        (q0 / t * par.message_scaling()).log2().round().exp2()
    }

    /// The rotation steps required by the CoeffsToSlots factors; the
    /// conjugation key is required as well and is generated alongside by
    /// [`RotationKeySet::for_rotations`].
    pub fn rotations_needed(par: &Arc<Parameters>) -> Vec<isize> {
        let slots = par.slots();
        let groups = cts_clear_factors(par);
        let mut rotations = vec![];
        for group in &groups {
            if group.len() <= 2 {
                rotations.extend(group.keys().filter(|k| **k != 0).map(|k| *k as isize));
                continue;
            }
            let n1 = find_best_bsgs_split(group.keys().copied(), slots, 16.0);
            let index = bsgs_index(group.keys().copied(), slots, n1);
            for (&j, babies) in &index {
                if j != 0 {
                    rotations.push((n1 * j) as isize);
                }
                for &i in babies {
                    if i != 0 {
                        rotations.push(i as isize);
                    }
                }
            }
        }
        rotations.sort_unstable();
        rotations.dedup();
        rotations
    }

    /// Creates a half-bootstrapper from the evaluation keys, generating the
    /// CoeffsToSlots matrices and the sine interpolation.
    pub fn new(
        par: &Arc<Parameters>,
        rlk: RelinearizationKey,
        rtks: RotationKeySet,
    ) -> Result<Self> {
        let meta = *par.halfboot();
        let evaluator = CkksEvaluator::new(par, Some(rlk), Some(rtks));
        let delta_in = Self::delta_in(par);

        let groups = cts_clear_factors(par);
        let mut cts_matrices = Vec::with_capacity(groups.len());
        for (g, group) in groups.iter().enumerate() {
            let level = par.max_level() - g;
            cts_matrices.push(encode_cts_matrix(par, level, group, par.scale())?);
        }

        // Interpolation of the scaled complex exponential on [-1, 1].
        let k = meta.sine_range as f64;
        let r = meta.double_angle as i32;
        let omega = 2.0 * PI * k / 2.0f64.powi(r);
        let cheb_coeffs = chebyshev_coeffs(
            |y| Complex64::new(0.0, omega * y).exp(),
            meta.sine_degree,
        );

        Ok(Self {
            par: par.clone(),
            evaluator,
            cts_matrices,
            cheb_coeffs,
            double_angle: meta.double_angle,
            post_const: meta.message_ratio / (4.0 * PI),
            delta_in,
        })
    }

    /// Half-bootstrap a degree-1 ciphertext holding a coefficient-embedded
    /// message at level 0: ModRaise, CoeffsToSlots, conjugate fold, EvalMod.
    /// Returns the pair of CKKS ciphertexts carrying the first and second
    /// coefficient halves in their slots.
    pub fn half_boot(&self, ct: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        let mut ct = ct.clone();
        // A ciphertext above level 0 is first reduced to it.
        while ct.level() > 0 {
            self.evaluator.base().mod_switch_to_next_level(&mut ct)?;
        }
        // An input scale drifting from the expected one is absorbed into
        // the declared output scale rather than surfaced.
        let drift = ct.scale() / self.delta_in;

        let mut ct = self.mod_raise(&ct)?;

        // CoeffsToSlots.
        for mat in &self.cts_matrices {
            ct = self.evaluator.base().multiply_by_diag_matrix(&ct, mat)?;
            self.evaluator.rescale(&mut ct)?;
        }

        // Conjugate fold: the packed slots z = c_lo + i c_hi split into the
        // real and imaginary parts (the 1/2 is folded into the matrices).
        let conj = self.evaluator.conjugate(&ct)?;
        let ct_re = self.evaluator.add_lazy(&ct, &conj)?;
        let mut ct_im = self.evaluator.sub_lazy(&ct, &conj)?;
        ct_im = self.evaluator.mul_by_i_pow(&ct_im, 3)?;

        let mut out0 = self.eval_mod(&ct_re)?;
        let mut out1 = self.eval_mod(&ct_im)?;
        out0.set_scale(out0.scale() * drift);
        out1.set_scale(out1.scale() * drift);
        Ok((out0, out1))
    }

    /// Reinterpret a level-0 ciphertext at the top of the chain by
    /// re-embedding its residues into every modulus.
    fn mod_raise(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let ctx_top = self.par.ctx_q_level(self.par.max_level())?;
        let mut c = Vec::with_capacity(ct.c.len());
        for ci in ct.c.iter() {
            let mut p = ci.clone();
            p.change_representation(Representation::PowerBasis);
            let row = p.coefficients();
            let row = row.index_axis(ndarray::Axis(0), 0);
            let mut raised = Poly::try_convert_from(
                row.as_slice().unwrap(),
                ctx_top,
                Representation::PowerBasis,
            )
            .map_err(Error::MathError)?;
            raised.change_representation(Representation::Ntt);
            c.push(raised);
        }
        Ok(Ciphertext {
            par: self.par.clone(),
            c,
            level: self.par.max_level(),
            scale: ct.scale(),
            is_ntt: true,
        })
    }

    /// Fold the conjugate slots so a single ciphertext carries real-only
    /// data; used when the parameters pack fewer slots than coefficients.
    #[allow(dead_code)]
    fn sub_sum(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut ct = ct.clone();
        let mut step = self.par.slots();
        while step < self.par.degree() / 2 {
            let rotated = self.evaluator.rotate(&ct, step as isize)?;
            ct = self.evaluator.add_lazy(&ct, &rotated)?;
            step <<= 1;
        }
        Ok(ct)
    }

    /// EvalMod: evaluate the interpolated complex exponential, square it
    /// double_angle times, and extract the imaginary part, approximating
    /// x mod q on the range occupied by fresh ciphertexts.
    fn eval_mod(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut u = self.eval_chebyshev(ct, &self.cheb_coeffs)?;
        for _ in 0..self.double_angle {
            u = self.evaluator.mul_relin(&u, &u)?;
        }

        // Imaginary part: -i (u - conj(u)) = 2 Im(u).
        let conj = self.evaluator.conjugate(&u)?;
        let mut im = self.evaluator.sub_lazy(&u, &conj)?;
        im = self.evaluator.mul_by_i_pow(&im, 3)?;
        self.evaluator.mul_const(&im, self.post_const)
    }

    /// Align two ciphertexts to the lower of their levels.
    fn align(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        while a.level() > b.level() {
            self.evaluator.rescale(a)?;
        }
        while b.level() > a.level() {
            self.evaluator.rescale(b)?;
        }
        Ok(())
    }

    /// Multiply by a complex constant without consuming a level.
    fn mul_const_complex(&self, ct: &Ciphertext, c: Complex64) -> Result<Ciphertext> {
        if c.im == 0.0 {
            return self.evaluator.mul_const(ct, c.re);
        }
        let re = self.evaluator.mul_const(ct, c.re)?;
        let im = self
            .evaluator
            .mul_by_i_pow(&self.evaluator.mul_const(ct, c.im)?, 1)?;
        self.evaluator.add_lazy(&re, &im)
    }

    /// Add a complex constant to every slot.
    fn add_const_complex(&self, ct: &Ciphertext, c: Complex64) -> Result<Ciphertext> {
        let ctx = ct.c[0].ctx().clone();
        let n = self.par.degree();
        // The all-c slot vector is re + im * x^(N/2).
        let mut w = vec![0.0f64; n];
        w[0] = c.re;
        w[n / 2] = c.im;
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

    /// Evaluate a polynomial in the Chebyshev basis through the recursive
    /// baby-step/giant-step split P = R + T_m * Q.
    fn eval_chebyshev(&self, y: &Ciphertext, coeffs: &[Complex64]) -> Result<Ciphertext> {
        // Baby powers T_1, T_2, T_3; giant powers by repeated doubling.
        let mut powers: HashMap<usize, Ciphertext> = HashMap::new();
        powers.insert(1, y.clone());

        let degree = coeffs.len() - 1;
        let mut needed = vec![2usize, 3];
        let mut m = 4;
        while m <= degree {
            needed.push(m);
            m <<= 1;
        }
        for &k in &needed {
            if k == 3 {
                // T_3 = 2 T_2 T_1 - T_1.
                let mut t2 = powers[&2].clone();
                let mut t1 = powers[&1].clone();
                self.align(&mut t2, &mut t1)?;
                let p = self.evaluator.mul_relin(&t2, &t1)?;
                let p2 = self.evaluator.add_lazy(&p, &p)?;
                let mut t1b = powers[&1].clone();
                let mut p2b = p2;
                self.align(&mut p2b, &mut t1b)?;
                powers.insert(3, self.evaluator.sub_lazy(&p2b, &t1b)?);
            } else {
                // T_2k = 2 T_k^2 - 1.
                let half = &powers[&(k / 2)];
                let sq = self.evaluator.mul_relin(half, half)?;
                let doubled = self.evaluator.add_lazy(&sq, &sq)?;
                powers.insert(k, self.evaluator.add_const(&doubled, -1.0)?);
            }
        }

        self.eval_cheb_recurse(coeffs, &powers)
    }

    fn eval_cheb_recurse(
        &self,
        coeffs: &[Complex64],
        powers: &HashMap<usize, Ciphertext>,
    ) -> Result<Ciphertext> {
        let degree = coeffs.len() - 1;
        if degree < 4 {
            // Direct combination over the baby powers.
            let deepest = (1..=degree.max(1))
                .filter(|b| powers.contains_key(b))
                .map(|b| powers[&b].level())
                .min()
                .unwrap();
            let mut acc: Option<Ciphertext> = None;
            for b in 1..=degree {
                let mut tb = powers[&b].clone();
                while tb.level() > deepest {
                    self.evaluator.rescale(&mut tb)?;
                }
                let term = self.mul_const_complex(&tb, coeffs[b])?;
                acc = Some(match acc {
                    None => term,
                    Some(a) => self.evaluator.add_lazy(&a, &term)?,
                });
            }
            let acc = match acc {
                Some(a) => a,
                // A constant-only remainder still needs a carrier at the
                // right level and scale.
                None => {
                    let mut t1 = powers[&1].clone();
                    while t1.level() > deepest {
                        self.evaluator.rescale(&mut t1)?;
                    }
                    self.mul_const_complex(&t1, Complex64::zero())?
                }
            };
            return self.add_const_complex(&acc, coeffs[0]);
        }

        // Split at the power of two m with m <= degree < 2m:
        // P = R + T_m * Q with the Chebyshev product identity
        // T_j = 2 T_m T_{j-m} - T_{2m-j}.
        let mut m = 1usize;
        while 2 * m <= degree {
            m <<= 1;
        }
        let mut rem = coeffs[..m].to_vec();
        let mut quot = vec![Complex64::zero(); degree - m + 1];
        quot[0] = coeffs[m];
        for j in m + 1..=degree {
            quot[j - m] = 2.0 * coeffs[j];
            rem[2 * m - j] -= coeffs[j];
        }

        let q_ct = self.eval_cheb_recurse(&quot, powers)?;
        let r_ct = self.eval_cheb_recurse(&rem, powers)?;

        let mut tm = powers[&m].clone();
        let mut q_ct = q_ct;
        self.align(&mut q_ct, &mut tm)?;
        let prod = self.evaluator.mul_relin(&q_ct, &tm)?;
        let mut r_ct = r_ct;
        let mut prod = prod;
        self.align(&mut prod, &mut r_ct)?;
        self.evaluator.add_lazy(&prod, &r_ct)
    }
}

/// Chebyshev interpolation coefficients of a function on [-1, 1].
pub(crate) fn chebyshev_coeffs<F>(f: F, degree: usize) -> Vec<Complex64>
where
    F: Fn(f64) -> Complex64,
{
    let n = degree + 1;
    let nodes: Vec<f64> = (0..n)
        .map(|k| (PI * (k as f64 + 0.5) / n as f64).cos())
        .collect();
    let values: Vec<Complex64> = nodes.iter().map(|x| f(*x)).collect();

    let mut coeffs = Vec::with_capacity(n);
    for j in 0..n {
        let mut c = Complex64::zero();
        for (k, v) in values.iter().enumerate() {
            c += v * (PI * j as f64 * (k as f64 + 0.5) / n as f64).cos();
        }
        c *= 2.0 / n as f64;
        if j == 0 {
            c *= 0.5;
        }
        coeffs.push(c);
    }
    coeffs
}

/// The clear CoeffsToSlots factors: the butterfly levels of the inverse
/// special FFT, merged into `cts_depth` groups, with the bit-reversal left
/// to the client packing and the normalization constants folded into the
/// last group.
pub(crate) fn cts_clear_factors(par: &Arc<Parameters>) -> Vec<HashMap<usize, Vec<Complex64>>> {
    let slots = par.slots();
    let m = 2 * par.degree();
    let meta = par.halfboot();

    let mut roots = Vec::with_capacity(m);
    for k in 0..m {
        let angle = 2.0 * PI * (k as f64) / (m as f64);
        roots.push(Complex64::new(angle.cos(), angle.sin()));
    }
    let mut rot_group = Vec::with_capacity(slots);
    let mut pow5 = 1usize;
    for _ in 0..slots {
        rot_group.push(pow5);
        pow5 = pow5 * 5 % m;
    }

    // One three-diagonal factor per butterfly level, in application order
    // (len = slots first).
    let mut levels = Vec::new();
    let mut len = slots;
    while len >= 2 {
        let lenh = len >> 1;
        let lenq = len << 2;
        let gap = m / lenq;
        let mut factor: HashMap<usize, Vec<Complex64>> = HashMap::new();
        factor.insert(0, vec![Complex64::zero(); slots]);
        factor.insert(lenh, vec![Complex64::zero(); slots]);
        factor.insert((slots - lenh) % slots, vec![Complex64::zero(); slots]);

        for i in (0..slots).step_by(len) {
            for j in 0..lenh {
                let w = roots[(lenq - (rot_group[j] % lenq)) * gap];
                factor.get_mut(&0).unwrap()[i + j] = Complex64::new(1.0, 0.0);
                factor.get_mut(&lenh).unwrap()[i + j] = Complex64::new(1.0, 0.0);
                factor.get_mut(&0).unwrap()[i + j + lenh] = -w;
                factor.get_mut(&((slots - lenh) % slots)).unwrap()[i + j + lenh] = w;
            }
        }
        levels.push(factor);
        len >>= 1;
    }

    // Merge the butterfly levels into cts_depth contiguous groups.
    let depth = meta.cts_depth.min(levels.len()).max(1);
    let per_group = levels.len().div_ceil(depth);
    let mut groups: Vec<HashMap<usize, Vec<Complex64>>> = Vec::with_capacity(depth);
    let mut iter = levels.into_iter();
    for _ in 0..depth {
        let mut group: Option<HashMap<usize, Vec<Complex64>>> = None;
        for _ in 0..per_group {
            match iter.next() {
                Some(factor) => {
                    group = Some(match group {
                        None => factor,
                        // The earlier factor is applied first.
                        Some(g) => mul_diag_mat_complex(&factor, &g, slots),
                    });
                }
                None => break,
            }
        }
        if let Some(g) = group {
            groups.push(g);
        }
    }

    // Fold the FFT normalization, the conjugate-fold half, and the EvalMod
    // input normalization delta_in / (q_0 K) into the last group.
    let q0 = par.moduli()[0] as f64;
    let delta_in = HalfBootstrapper::delta_in(par);
    let post = (1.0 / slots as f64) * 0.5 * delta_in / (q0 * meta.sine_range as f64);
    if let Some(last) = groups.last_mut() {
        for v in last.values_mut() {
            for x in v.iter_mut() {
                *x *= post;
            }
        }
    }
    groups
}

/// Multiply two cyclic diagonal maps: (A ∘ B), with A applied after B.
pub(crate) fn mul_diag_mat_complex(
    a: &HashMap<usize, Vec<Complex64>>,
    b: &HashMap<usize, Vec<Complex64>>,
    slots: usize,
) -> HashMap<usize, Vec<Complex64>> {
    let mut res: HashMap<usize, Vec<Complex64>> = HashMap::new();
    for (&rot_a, va) in a {
        for (&rot_b, vb) in b {
            let entry = res
                .entry((rot_a + rot_b) % slots)
                .or_insert_with(|| vec![Complex64::zero(); slots]);
            for i in 0..slots {
                entry[i] += va[i] * vb[(i + rot_a) % slots];
            }
        }
    }
    res
}

/// Rotate a cyclic diagonal vector by `k`.
fn rotate_cyclic(v: &[Complex64], k: isize) -> Vec<Complex64> {
    let n = v.len();
    let k = k.rem_euclid(n as isize) as usize;
    (0..n).map(|i| v[(i + k) % n]).collect()
}

/// Encode a clear complex diagonal map into a [`PtDiagMatrix`] at a level:
/// each diagonal is slot-encoded through the inverse special FFT at the
/// given scale, in both the Q chain of the level and the special moduli.
fn encode_cts_matrix(
    par: &Arc<Parameters>,
    level: usize,
    diag: &HashMap<usize, Vec<Complex64>>,
    scale: f64,
) -> Result<PtDiagMatrix> {
    let slots = par.slots();
    let log_slots = par.log_slots();

    let naive = diag.len() <= 2;
    let n1 = if naive {
        0
    } else {
        find_best_bsgs_split(diag.keys().copied(), slots, 16.0)
    };

    let mut vec = HashMap::new();
    for (&rot, entries) in diag {
        let rot = rot % slots;
        let rotated = if naive || n1 == 0 {
            entries.clone()
        } else {
            let j = rot / n1;
            rotate_cyclic(entries, -((n1 * j) as isize))
        };
        vec.insert(rot, encode_ckks_diagonal(par, level, &rotated, scale)?);
    }

    Ok(PtDiagMatrix {
        log_slots,
        n1,
        level,
        scale,
        vec,
        naive,
    })
}

/// Slot-encode a complex diagonal at a scale, in the Q chain of the level
/// and the special moduli, in NTT+Shoup form.
fn encode_ckks_diagonal(
    par: &Arc<Parameters>,
    level: usize,
    values: &[Complex64],
    scale: f64,
) -> Result<(Poly, Poly)> {
    let slots = par.slots();
    let n = par.degree();
    let m = 2 * n;

    // Inverse special FFT in place (mirrors the CKKS encoder, reproduced
    // here to keep the encoder free of diagonal-matrix concerns).
    let mut buffer = vec![Complex64::zero(); slots];
    buffer[..values.len()].copy_from_slice(values);
    let mut rot_group = Vec::with_capacity(slots);
    let mut pow5 = 1usize;
    for _ in 0..slots {
        rot_group.push(pow5);
        pow5 = pow5 * 5 % m;
    }
    let mut roots = Vec::with_capacity(m);
    for k in 0..m {
        let angle = 2.0 * PI * (k as f64) / (m as f64);
        roots.push(Complex64::new(angle.cos(), angle.sin()));
    }
    let mut len = slots;
    while len >= 2 {
        let lenh = len >> 1;
        let lenq = len << 2;
        let gap = m / lenq;
        for i in (0..slots).step_by(len) {
            for j in 0..lenh {
                let idx = (lenq - (rot_group[j] % lenq)) * gap;
                let u = buffer[i + j] + buffer[i + j + lenh];
                let v = (buffer[i + j] - buffer[i + j + lenh]) * roots[idx];
                buffer[i + j] = u;
                buffer[i + j + lenh] = v;
            }
        }
        len >>= 1;
    }
    let n_inv = 1.0 / slots as f64;
    for b in buffer.iter_mut() {
        *b *= n_inv;
    }
    bit_reverse_in_place(&mut buffer, slots);

    let gap = n / (2 * slots);
    let mut w = vec![0.0f64; n];
    for (j, b) in buffer.iter().enumerate() {
        w[j * gap] = b.re;
        w[j * gap + n / 2] = b.im;
    }

    let ctx_q = par.ctx_q_level(level)?;
    let mut q_poly = Poly::zero(ctx_q, Representation::PowerBasis);
    q_poly.set_coefficients(scale_up_vec_exact(&w, scale, ctx_q.moduli()));
    q_poly.change_representation(Representation::NttShoup);

    let mut p_poly = Poly::zero(&par.ctx_p, Representation::PowerBasis);
    p_poly.set_coefficients(scale_up_vec_exact(&w, scale, par.ctx_p.moduli()));
    p_poly.change_representation(Representation::NttShoup);

    Ok((q_poly, p_poly))
}

#[cfg(test)]
mod tests {
    use super::{chebyshev_coeffs, cts_clear_factors, mul_diag_mat_complex};
    use crate::Parameters;
    use num_complex::Complex64;
    use std::collections::HashMap;

    /// The merged factors compose to the inverse special FFT (up to the
    /// folded constants): checked in the clear against the encoder's
    /// transform.
    #[test]
    fn cts_factors_match_inverse_fft() {
        let par = Parameters::rubato_test().unwrap();
        let slots = par.slots();
        let groups = cts_clear_factors(&par);
        let meta = par.halfboot();
        assert_eq!(groups.len(), meta.cts_depth.min(par.log_slots()));

        // Compose all groups into one map.
        let mut composite = groups[0].clone();
        for g in &groups[1..] {
            composite = mul_diag_mat_complex(g, &composite, slots);
        }

        // Apply to a basis vector and compare against the direct butterfly
        // chain of the encoder (without the trailing bit-reversal).
        let encoder = crate::ckks::CkksEncoder::new(&par);
        for basis in 0..slots {
            let mut v = vec![Complex64::new(0.0, 0.0); slots];
            v[basis] = Complex64::new(1.0, 0.0);

            // Expected: inverse FFT then undo its final bit-reversal.
            let mut expected = v.clone();
            encoder.special_inv_fft(&mut expected, slots);
            rtf_util::bit_reverse_in_place(&mut expected, slots);

            // The factors fold in the normalization constant; recover it.
            let q0 = par.moduli()[0] as f64;
            let delta_in = super::HalfBootstrapper::delta_in(&par);
            let post = 0.5 * delta_in / (q0 * meta.sine_range as f64);

            let mut got = vec![Complex64::new(0.0, 0.0); slots];
            for (&rot, entries) in &composite {
                for i in 0..slots {
                    got[i] += entries[i] * v[(i + rot) % slots];
                }
            }
            for (g, e) in got.iter().zip(expected.iter()) {
                assert!((g - e * post).norm() < 1e-9, "basis {basis} diverges");
            }
        }
    }

    #[test]
    fn chebyshev_interpolates() {
        // The interpolation of a smooth function is accurate on the nodes'
        // interval.
        let coeffs = chebyshev_coeffs(|y| Complex64::new(0.0, 2.0 * y).exp(), 15);
        for k in 0..100 {
            let y = -1.0 + 2.0 * (k as f64) / 99.0;
            let mut acc = Complex64::new(0.0, 0.0);
            // Evaluate via the recurrence T_{n+1} = 2y T_n - T_{n-1}.
            let mut t_prev = Complex64::new(1.0, 0.0);
            let mut t_cur = Complex64::new(y, 0.0);
            acc += coeffs[0] * t_prev;
            acc += coeffs[1] * t_cur;
            for c in &coeffs[2..] {
                let t_next = 2.0 * y * t_cur - t_prev;
                t_prev = t_cur;
                t_cur = t_next;
                acc += c * t_next;
            }
            let expected = Complex64::new(0.0, 2.0 * y).exp();
            assert!((acc - expected).norm() < 1e-9);
        }
    }

    #[test]
    fn diag_mat_product_is_composition() {
        let slots = 8;
        let mut a: HashMap<usize, Vec<Complex64>> = HashMap::new();
        let mut b: HashMap<usize, Vec<Complex64>> = HashMap::new();
        a.insert(1, vec![Complex64::new(2.0, 0.0); slots]);
        b.insert(2, vec![Complex64::new(3.0, 0.0); slots]);

        let ab = mul_diag_mat_complex(&a, &b, slots);
        assert_eq!(ab.len(), 1);
        let entry = &ab[&3];
        assert!(entry.iter().all(|x| (x - 6.0).norm() < 1e-12));
    }
}
