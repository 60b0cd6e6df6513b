//! Homomorphic evaluator for the BFV layer: arithmetic, relinearization,
//! modulus switching, slot rotations, and baby-step/giant-step
//! diagonal-matrix multiplication with hoisted rotations.

use super::{Ciphertext, Plaintext};
use crate::keys::{
    decompose_ntt, mod_down, mul_qp, RelinearizationKey, RotationKeySet,
};
use crate::stc::{bsgs_index, PtDiagMatrix};
use crate::{Error, Parameters, Result};
use num_bigint::BigUint;
use rtf_math::rq::{Poly, Representation, SubstitutionExponent};
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluator for ciphertext operations on the BFV side.
#[derive(Debug, Clone)]
pub struct FvEvaluator {
    pub(crate) par: Arc<Parameters>,
    pub(crate) rlk: Option<RelinearizationKey>,
    pub(crate) rtks: Option<RotationKeySet>,
}

impl FvEvaluator {
    /// Creates an evaluator with the given evaluation keys.
    pub fn new(
        par: &Arc<Parameters>,
        rlk: Option<RelinearizationKey>,
        rtks: Option<RotationKeySet>,
    ) -> Self {
        Self {
            par: par.clone(),
            rlk,
            rtks,
        }
    }

    fn rlk(&self) -> Result<&RelinearizationKey> {
        self.rlk
            .as_ref()
            .ok_or_else(|| Error::DefaultError("No relinearization key".to_string()))
    }

    fn rtks(&self) -> Result<&RotationKeySet> {
        self.rtks
            .as_ref()
            .ok_or_else(|| Error::DefaultError("No rotation keys".to_string()))
    }

    /// Mod-switch the higher of the two ciphertexts down so that both lie at
    /// the same level.
    fn align(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        while a.level > b.level {
            self.mod_switch_to_next_level(a)?;
        }
        while b.level > a.level {
            self.mod_switch_to_next_level(b)?;
        }
        Ok(())
    }

    /// Homomorphic addition.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut a = a.clone();
        let mut b = b.clone();
        self.align(&mut a, &mut b)?;
        if a.is_ntt != b.is_ntt {
            return Err(Error::DefaultError(
                "Mismatched NTT forms in addition".to_string(),
            ));
        }
        if a.c.len() < b.c.len() {
            std::mem::swap(&mut a, &mut b);
        }
        for (ai, bi) in a.c.iter_mut().zip(b.c.iter()) {
            *ai += bi;
        }
        Ok(a)
    }

    /// Homomorphic subtraction.
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut a = a.clone();
        let mut b = b.clone();
        self.align(&mut a, &mut b)?;
        if a.is_ntt != b.is_ntt {
            return Err(Error::DefaultError(
                "Mismatched NTT forms in subtraction".to_string(),
            ));
        }
        while a.c.len() < b.c.len() {
            a.c.push(Poly::zero(a.c[0].ctx(), *a.c[0].representation()));
        }
        for (ai, bi) in a.c.iter_mut().zip(b.c.iter()) {
            *ai -= bi;
        }
        Ok(a)
    }

    /// Homomorphic negation.
    pub fn neg(&self, a: &Ciphertext) -> Ciphertext {
        let mut out = a.clone();
        for ci in out.c.iter_mut() {
            *ci = -&*ci;
        }
        out
    }

    /// Add a plaintext (in the same form and level as the ciphertext) to the
    /// first element of the ciphertext.
    pub fn add_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        pt.check_level(ct.level)?;
        if pt.is_ntt != ct.is_ntt {
            return Err(Error::DefaultError(
                "Mismatched NTT forms in plaintext addition".to_string(),
            ));
        }
        let mut out = ct.clone();
        out.c[0] += &pt.poly;
        Ok(out)
    }

    /// Subtract a plaintext from the first element of the ciphertext.
    pub fn sub_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        pt.check_level(ct.level)?;
        if pt.is_ntt != ct.is_ntt {
            return Err(Error::DefaultError(
                "Mismatched NTT forms in plaintext subtraction".to_string(),
            ));
        }
        let mut out = ct.clone();
        out.c[0] -= &pt.poly;
        Ok(out)
    }

    /// Scale-preserving multiplication by a plaintext in NTT form; no degree
    /// growth.
    pub fn mul_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        pt.check_level(ct.level)?;
        if !pt.is_ntt || !ct.is_ntt {
            return Err(Error::DefaultError(
                "Plaintext multiplication requires NTT form".to_string(),
            ));
        }
        let mut out = ct.clone();
        for ci in out.c.iter_mut() {
            *ci *= &pt.poly;
        }
        out.scale = ct.scale * pt.scale;
        Ok(out)
    }

    /// Multiplication by an integer scalar modulo the moduli chain.
    pub fn mul_scalar(&self, ct: &Ciphertext, scalar: u64) -> Ciphertext {
        let mut out = ct.clone();
        let s = BigUint::from(scalar);
        for ci in out.c.iter_mut() {
            *ci = &*ci * &s;
        }
        out
    }

    /// Tensor multiplication of two degree-1 ciphertexts in NTT form: the
    /// operands are lifted to the extended basis, multiplied, and scaled
    /// back down by t/Q, producing a degree-2 ciphertext in NTT form.
    pub fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut a = a.clone();
        let mut b = b.clone();
        self.align(&mut a, &mut b)?;
        if a.c.len() != 2 || b.c.len() != 2 {
            return Err(Error::DefaultError(
                "Multiplication can only be performed on degree-1 ciphertexts".to_string(),
            ));
        }
        if !a.is_ntt || !b.is_ntt {
            return Err(Error::DefaultError(
                "Multiplication operands must be in NTT form".to_string(),
            ));
        }
        let level = a.level;
        let mp = &self.par.mul_params[level];

        // Extend both operands to the tensoring basis.
        let lift = |p: &Poly| -> Result<Poly> {
            let mut p = p.clone();
            p.change_representation(Representation::PowerBasis);
            let mut up = p.scale(&mp.extend)?;
            up.change_representation(Representation::Ntt);
            Ok(up)
        };
        let c00 = lift(&a.c[0])?;
        let c01 = lift(&a.c[1])?;
        let c10 = lift(&b.c[0])?;
        let c11 = lift(&b.c[1])?;

        // Tensor.
        let mut c0 = &c00 * &c10;
        let mut c1 = &c00 * &c11;
        c1 += &(&c01 * &c10);
        let mut c2 = &c01 * &c11;
        c0.change_representation(Representation::PowerBasis);
        c1.change_representation(Representation::PowerBasis);
        c2.change_representation(Representation::PowerBasis);

        // Scale back down by t/Q.
        let down = |p: Poly| -> Result<Poly> {
            let mut q = p.scale(&mp.down)?;
            q.change_representation(Representation::Ntt);
            Ok(q)
        };
        let c = vec![down(c0)?, down(c1)?, down(c2)?];

        Ok(Ciphertext {
            par: self.par.clone(),
            c,
            level,
            scale: a.scale * b.scale,
            is_ntt: true,
        })
    }

    /// Relinearize a degree-2 ciphertext back to degree 1 using the
    /// relinearization key.
    pub fn relinearize(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        if ct.c.len() != 3 {
            return Err(Error::DefaultError(
                "Relinearization expects a degree-2 ciphertext".to_string(),
            ));
        }
        let rlk = self.rlk()?;
        let mut c2 = ct.c[2].clone();
        c2.change_representation(Representation::PowerBasis);
        let (d0, d1) = rlk.ksk.switch(&c2)?;

        let mut out = ct.clone();
        out.c.truncate(2);
        out.c[0] += &d0;
        out.c[1] += &d1;
        Ok(out)
    }

    /// Multiplication followed by relinearization.
    pub fn mul_relin(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let ct = self.mul(a, b)?;
        self.relinearize(&ct)
    }

    /// Divide the ciphertext by the last modulus of its chain and round,
    /// dropping one level.
    pub fn mod_switch_to_next_level(&self, ct: &mut Ciphertext) -> Result<()> {
        if ct.level == 0 {
            return Err(Error::LevelExhausted);
        }
        let was_ntt = ct.is_ntt;
        for ci in ct.c.iter_mut() {
            if was_ntt {
                ci.change_representation(Representation::PowerBasis);
            }
            ci.mod_switch_down_next()?;
            if was_ntt {
                ci.change_representation(Representation::Ntt);
            }
        }
        ct.level -= 1;
        Ok(())
    }

    /// Apply `count` modulus switches.
    pub fn mod_switch_many(&self, ct: &mut Ciphertext, count: usize) -> Result<()> {
        for _ in 0..count {
            self.mod_switch_to_next_level(ct)?;
        }
        Ok(())
    }

    /// Mod-switch the ciphertext down to level 0.
    pub fn mod_switch_to_last_level(&self, ct: &mut Ciphertext) -> Result<()> {
        self.mod_switch_many(ct, ct.level)
    }

    /// Switch every polynomial of the ciphertext to NTT form.
    pub fn transform_to_ntt(&self, ct: &mut Ciphertext) {
        if !ct.is_ntt {
            for ci in ct.c.iter_mut() {
                ci.change_representation(Representation::Ntt);
            }
            ct.is_ntt = true;
        }
    }

    /// Switch every polynomial of the ciphertext to coefficient form.
    pub fn transform_from_ntt(&self, ct: &mut Ciphertext) {
        if ct.is_ntt {
            for ci in ct.c.iter_mut() {
                ci.change_representation(Representation::PowerBasis);
            }
            ct.is_ntt = false;
        }
    }

    /// Apply the Galois automorphism x -> x^element to a degree-1
    /// ciphertext, key switching with the rotation key of the element.
    pub fn apply_galois(&self, ct: &Ciphertext, element: u64) -> Result<Ciphertext> {
        if ct.c.len() != 2 {
            return Err(Error::DefaultError(
                "Rotation expects a degree-1 ciphertext".to_string(),
            ));
        }
        if !ct.is_ntt {
            return Err(Error::DefaultError(
                "Rotation expects the NTT form".to_string(),
            ));
        }
        let gk = self.rtks()?.key_for_element(element)?;
        let ctx = ct.c[0].ctx();
        let sub = SubstitutionExponent::new(ctx, element as usize).map_err(Error::MathError)?;

        let c0 = ct.c[0].substitute(&sub)?;
        let mut c1 = ct.c[1].substitute(&sub)?;
        c1.change_representation(Representation::PowerBasis);
        let (d0, d1) = gk.switching_key().switch(&c1)?;

        let mut out = ct.clone();
        out.c[0] = &c0 + &d0;
        out.c[1] = d1;
        Ok(out)
    }

    /// Rotate the ciphertext slots to the left by `step`.
    pub fn rotate(&self, ct: &Ciphertext, step: isize) -> Result<Ciphertext> {
        if step == 0 {
            return Ok(ct.clone());
        }
        self.apply_galois(ct, self.par.galois_element(step))
    }

    /// Apply the conjugation (row swap) automorphism.
    pub fn conjugate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.apply_galois(ct, self.par.galois_element_conjugate())
    }

    /// Multiply a degree-1 ciphertext in NTT form by a plaintext
    /// diagonal-matrix, using the baby-step/giant-step algorithm with
    /// hoisted inner rotations. When the matrix has at most two diagonals, a
    /// naive rotation-per-diagonal path is used instead.
    pub fn multiply_by_diag_matrix(
        &self,
        ct: &Ciphertext,
        mat: &PtDiagMatrix,
    ) -> Result<Ciphertext> {
        if ct.c.len() != 2 || !ct.is_ntt {
            return Err(Error::DefaultError(
                "Diagonal-matrix multiplication expects a degree-1 NTT ciphertext".to_string(),
            ));
        }
        if mat.level != ct.level {
            return Err(Error::LevelMismatch(mat.level, ct.level));
        }

        if mat.naive {
            return self.multiply_by_diag_matrix_naive(ct, mat);
        }

        let level = ct.level;
        let ctx_q = self.par.ctx_q_level(level)?;
        let ctx_qp = self.par.ctx_qp_level(level)?;
        let n1 = mat.n1;

        // Hoisting: decompose c1 once; each baby-step rotation permutes the
        // digits instead of re-decomposing.
        let mut c1_pb = ct.c[1].clone();
        c1_pb.change_representation(Representation::PowerBasis);
        let digits = decompose_ntt(&c1_pb, ctx_qp)?;

        let index = bsgs_index(mat.vec.keys().copied(), 1 << mat.log_slots, n1);

        // Cache of per-baby-step hoisted products.
        let mut hoisted: HashMap<usize, (Poly, Poly, Poly)> = HashMap::new();
        for babies in index.values() {
            for &i in babies {
                if i == 0 || hoisted.contains_key(&i) {
                    continue;
                }
                let el = self.par.galois_element(i as isize);
                let gk = self.rtks()?.key_for_element(el)?;
                let sub_qp =
                    SubstitutionExponent::new(ctx_qp, el as usize).map_err(Error::MathError)?;
                let digits_rot = digits
                    .iter()
                    .map(|d| d.substitute(&sub_qp))
                    .collect::<rtf_math::Result<Vec<_>>>()?;
                let (h0, h1) = gk.switching_key().switch_digits(&digits_rot, level)?;
                let sub_q =
                    SubstitutionExponent::new(ctx_q, el as usize).map_err(Error::MathError)?;
                let phi_c0 = ct.c[0].substitute(&sub_q)?;
                hoisted.insert(i, (h0, h1, phi_c0));
            }
        }

        let mut out = Ciphertext {
            par: self.par.clone(),
            c: vec![
                Poly::zero(ctx_q, Representation::Ntt),
                Poly::zero(ctx_q, Representation::Ntt),
            ],
            level,
            scale: ct.scale * mat.scale,
            is_ntt: true,
        };

        let mut giants: Vec<usize> = index.keys().copied().collect();
        giants.sort_unstable();
        for j in giants {
            let babies = &index[&j];
            let mut acc_qp0 = Poly::zero(ctx_qp, Representation::Ntt);
            let mut acc_qp1 = Poly::zero(ctx_qp, Representation::Ntt);
            let mut acc_q0 = Poly::zero(ctx_q, Representation::Ntt);
            let mut acc_q1 = Poly::zero(ctx_q, Representation::Ntt);
            let mut used_qp = false;

            for &i in babies {
                let rot = n1 * j + i;
                let (dq, dp) = mat.vec.get(&rot).ok_or_else(|| {
                    Error::DefaultError(format!("Missing diagonal {rot} in the matrix"))
                })?;
                if i == 0 {
                    acc_q0 += &(&ct.c[0] * dq);
                    acc_q1 += &(&ct.c[1] * dq);
                } else {
                    let (h0, h1, phi_c0) = &hoisted[&i];
                    acc_qp0 += &mul_qp(&self.par, h0, dq, dp, level)?;
                    acc_qp1 += &mul_qp(&self.par, h1, dq, dp, level)?;
                    acc_q0 += &(phi_c0 * dq);
                    used_qp = true;
                }
            }

            let mut t0 = acc_q0;
            let mut t1 = acc_q1;
            if used_qp {
                t0 += &mod_down(&self.par, acc_qp0, level)?;
                t1 += &mod_down(&self.par, acc_qp1, level)?;
            }

            if j != 0 {
                let partial = Ciphertext {
                    par: self.par.clone(),
                    c: vec![t0, t1],
                    level,
                    scale: ct.scale,
                    is_ntt: true,
                };
                let rotated = self.rotate(&partial, (n1 * j) as isize)?;
                out.c[0] += &rotated.c[0];
                out.c[1] += &rotated.c[1];
            } else {
                out.c[0] += &t0;
                out.c[1] += &t1;
            }
        }

        Ok(out)
    }

    /// Naive diagonal-matrix multiplication: one rotation per diagonal.
    fn multiply_by_diag_matrix_naive(
        &self,
        ct: &Ciphertext,
        mat: &PtDiagMatrix,
    ) -> Result<Ciphertext> {
        let ctx_q = self.par.ctx_q_level(ct.level)?;
        let mut out = Ciphertext {
            par: self.par.clone(),
            c: vec![
                Poly::zero(ctx_q, Representation::Ntt),
                Poly::zero(ctx_q, Representation::Ntt),
            ],
            level: ct.level,
            scale: ct.scale * mat.scale,
            is_ntt: true,
        };

        let mut rotations: Vec<usize> = mat.vec.keys().copied().collect();
        rotations.sort_unstable();
        for rot in rotations {
            let (dq, _) = &mat.vec[&rot];
            let rotated = if rot == 0 {
                ct.clone()
            } else {
                self.rotate(ct, rot as isize)?
            };
            out.c[0] += &(&rotated.c[0] * dq);
            out.c[1] += &(&rotated.c[1] * dq);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::FvEvaluator;
    use crate::bfv::FvEncoder;
    use crate::keys::{RelinearizationKey, RotationKeySet, SecretKey};
    use crate::Parameters;
    use rand::{rng, Rng};
    use std::error::Error;

    fn setup() -> (
        std::sync::Arc<Parameters>,
        SecretKey,
        FvEncoder,
        FvEvaluator,
    ) {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let encoder = FvEncoder::new(&par).unwrap();
        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        let rtks = RotationKeySet::for_rotations(&sk, &[1, 2, 3, -1], &mut rng).unwrap();
        let evaluator = FvEvaluator::new(&par, Some(rlk), Some(rtks));
        (par, sk, encoder, evaluator)
    }

    #[test]
    fn add_sub() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let (par, sk, encoder, evaluator) = setup();
        let t = par.plaintext();

        let a = (0..par.fv_slots())
            .map(|_| rng.random_range(0..t))
            .collect::<Vec<_>>();
        let b = (0..par.fv_slots())
            .map(|_| rng.random_range(0..t))
            .collect::<Vec<_>>();

        let ct_a = sk.try_encrypt(&encoder.scale_up(&encoder.encode_uint(&a)?, 2)?, &mut rng)?;
        let ct_b = sk.try_encrypt(&encoder.scale_up(&encoder.encode_uint(&b)?, 2)?, &mut rng)?;

        let sum = evaluator.add(&ct_a, &ct_b)?;
        let expected = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x + y) % t)
            .collect::<Vec<_>>();
        assert_eq!(encoder.decode_uint(&sk.try_decrypt_fv(&sum)?), expected);

        let diff = evaluator.sub(&ct_a, &ct_b)?;
        let expected = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x + t - y) % t)
            .collect::<Vec<_>>();
        assert_eq!(encoder.decode_uint(&sk.try_decrypt_fv(&diff)?), expected);
        Ok(())
    }

    #[test]
    fn mul_relin_mod_switch() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let (par, sk, encoder, evaluator) = setup();
        let t = par.plaintext();

        let a = (0..par.fv_slots())
            .map(|_| rng.random_range(0..1000))
            .collect::<Vec<_>>();
        let b = (0..par.fv_slots())
            .map(|_| rng.random_range(0..1000))
            .collect::<Vec<_>>();

        let level = par.max_level();
        let ct_a =
            sk.try_encrypt(&encoder.scale_up(&encoder.encode_uint(&a)?, level)?, &mut rng)?;
        let ct_b =
            sk.try_encrypt(&encoder.scale_up(&encoder.encode_uint(&b)?, level)?, &mut rng)?;

        let mut prod = evaluator.mul_relin(&ct_a, &ct_b)?;
        assert_eq!(prod.degree(), 1);
        evaluator.mod_switch_many(&mut prod, 2)?;
        assert_eq!(prod.level(), level - 2);

        let expected = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x * y) % t)
            .collect::<Vec<_>>();
        assert_eq!(encoder.decode_uint(&sk.try_decrypt_fv(&prod)?), expected);
        Ok(())
    }

    #[test]
    fn mul_plain() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let (par, sk, encoder, evaluator) = setup();
        let t = par.plaintext();

        let a = (0..par.fv_slots())
            .map(|_| rng.random_range(0..t))
            .collect::<Vec<_>>();
        let b = (0..par.fv_slots())
            .map(|_| rng.random_range(0..1000))
            .collect::<Vec<_>>();

        let ct = sk.try_encrypt(
            &encoder.scale_up(&encoder.encode_uint(&a)?, par.max_level())?,
            &mut rng,
        )?;
        let pt = encoder.lift_for_mul(&encoder.encode_uint(&b)?, par.max_level())?;
        let prod = evaluator.mul_plain(&ct, &pt)?;

        let expected = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| ((*x as u128 * *y as u128) % t as u128) as u64)
            .collect::<Vec<_>>();
        assert_eq!(encoder.decode_uint(&sk.try_decrypt_fv(&prod)?), expected);
        Ok(())
    }

    #[test]
    fn rotation_round_trip() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let (par, sk, encoder, evaluator) = setup();

        let a = (0..par.fv_slots())
            .map(|_| rng.random_range(0..par.plaintext()))
            .collect::<Vec<_>>();
        let ct = sk.try_encrypt(
            &encoder.scale_up(&encoder.encode_uint(&a)?, par.max_level())?,
            &mut rng,
        )?;

        let rotated = evaluator.rotate(&ct, 1)?;
        let back = evaluator.rotate(&rotated, -1)?;
        assert_eq!(encoder.decode_uint(&sk.try_decrypt_fv(&back)?), a);

        // A left rotation by 1 moves slot 1 into slot 0 within each row.
        let decoded = encoder.decode_uint(&sk.try_decrypt_fv(&rotated)?);
        let row = par.fv_slots() / 2;
        assert_eq!(decoded[0], a[1]);
        assert_eq!(decoded[row - 1], a[0]);
        Ok(())
    }
}
