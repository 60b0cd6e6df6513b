//! Slots-to-Coefficients transform for the FV side: factorization of the
//! decoding matrix over Z_t into sparse block-diagonal matrices, encoded as
//! plaintext diagonal matrices ready for baby-step/giant-step evaluation.

use crate::bfv::{Ciphertext, FvEncoder, FvEvaluator};
use crate::{Error, Parameters, Result};
use rtf_math::rq::{Poly, Representation};
use rtf_math::zq::Modulus;
use std::collections::HashMap;
use std::sync::Arc;

/// A plaintext-diagonalized matrix ready to be evaluated on a ciphertext
/// through [`FvEvaluator::multiply_by_diag_matrix`]. Each nonzero diagonal
/// is stored as a pair of prepared polynomials, one over the Q chain at
/// `level` and one over the special moduli P, both in NTT+Shoup form.
#[derive(Debug, Clone)]
pub struct PtDiagMatrix {
    /// Log2 of the number of slots of the matrix.
    pub log_slots: usize,
    /// Baby-step radix of the baby-step/giant-step split; divides the slot
    /// count.
    pub n1: usize,
    /// Level of the Q-part polynomials.
    pub level: usize,
    /// Scale carried by the encoded diagonals.
    pub scale: f64,
    /// The indexed nonzero diagonals.
    pub(crate) vec: HashMap<usize, (Poly, Poly)>,
    /// Whether the naive rotation-per-diagonal path should be used.
    pub(crate) naive: bool,
}

impl PtDiagMatrix {
    /// The rotation steps required to evaluate this matrix.
    pub fn rotations(&self) -> Vec<isize> {
        let mut rotations = vec![];
        if self.naive {
            for &rot in self.vec.keys() {
                if rot != 0 {
                    rotations.push(rot as isize);
                }
            }
        } else {
            let index = bsgs_index(self.vec.keys().copied(), 1 << self.log_slots, self.n1);
            for (&j, babies) in &index {
                if j != 0 {
                    rotations.push((self.n1 * j) as isize);
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
}

/// Compute the baby-step/giant-step index of a set of diagonal indices:
/// maps each giant step j to the sorted list of baby steps i such that
/// n1 * j + i is a nonzero diagonal.
pub(crate) fn bsgs_index<I>(keys: I, slots: usize, n1: usize) -> HashMap<usize, Vec<usize>>
where
    I: IntoIterator<Item = usize>,
{
    let mut index: HashMap<usize, Vec<usize>> = HashMap::new();
    for key in keys {
        let key = key & (slots - 1);
        index.entry(key / n1).or_default().push(key % n1);
    }
    for babies in index.values_mut() {
        babies.sort_unstable();
        babies.dedup();
    }
    index
}

/// Choose the baby-step radix minimizing the number of rotations, keeping
/// the ratio between baby and giant steps below `max_ratio`.
pub(crate) fn find_best_bsgs_split<I>(keys: I, slots: usize, max_ratio: f64) -> usize
where
    I: IntoIterator<Item = usize> + Clone,
{
    let mut best_n1 = 1;
    let mut best_cost = usize::MAX;
    let mut n1 = 1usize;
    while n1 <= slots {
        let index = bsgs_index(keys.clone(), slots, n1);
        let giants = index.len();
        let babies = index
            .values()
            .flat_map(|v| v.iter().copied())
            .collect::<std::collections::HashSet<_>>()
            .len();
        let cost = babies + giants;
        if cost < best_cost && (babies as f64) <= max_ratio * (giants as f64).max(1.0) {
            best_cost = cost;
            best_n1 = n1;
        }
        n1 <<= 1;
    }
    best_n1
}

/// Rotate a diagonal vector by `k` positions, independently on each half of
/// the two-row slot layout.
pub(crate) fn rotate_small(v: &[u64], k: isize) -> Vec<u64> {
    let n = v.len();
    let half = n / 2;
    let k = k.rem_euclid(half as isize) as usize;
    let mut out = vec![0u64; n];
    for i in 0..half {
        out[i] = v[(i + k) % half];
        out[i + half] = v[half + (i + k) % half];
    }
    out
}

/// Apply a diagonal-form matrix to a vector in the clear, with the two-row
/// slot semantics used by the factorization.
#[cfg(test)]
pub(crate) fn apply_diag_map_clear(
    diag: &HashMap<usize, Vec<u64>>,
    v: &[u64],
    t: u64,
) -> Vec<u64> {
    let n = v.len();
    let half = n / 2;
    let mut out = vec![0u64; n];
    for (&rot, entries) in diag {
        for i in 0..half {
            out[i] = (out[i]
                + (entries[i] as u128 * v[(i + rot) % half] as u128 % t as u128) as u64)
                % t;
        }
        for i in half..n {
            out[i] = (out[i]
                + (entries[i] as u128 * v[half + (i + rot) % half] as u128 % t as u128) as u64)
                % t;
        }
    }
    out
}

/// Find a generator of the multiplicative group of Z_t for a prime t.
fn primitive_root_zt(t: u64) -> Result<u64> {
    // Factorize t - 1 by trial division.
    let mut factors = vec![];
    let mut rest = t - 1;
    let mut d = 2u64;
    while d * d <= rest {
        if rest % d == 0 {
            factors.push(d);
            while rest % d == 0 {
                rest /= d;
            }
        }
        d += 1;
    }
    if rest > 1 {
        factors.push(rest);
    }

    let modulus = Modulus::new(t).map_err(Error::MathError)?;
    for g in 2..t {
        if factors
            .iter()
            .all(|p| modulus.pow(g, (t - 1) / p) != 1)
        {
            return Ok(g);
        }
    }
    Err(Error::DefaultError(format!(
        "No primitive root modulo {t}"
    )))
}

/// Compute the m-th roots of unity modulo the plaintext modulus.
pub(crate) fn compute_primitive_roots(m: usize, t: u64) -> Result<Vec<u64>> {
    if (t - 1) % m as u64 != 0 {
        return Err(Error::DefaultError(format!(
            "{m} does not divide the order of Z_{t}*"
        )));
    }
    let modulus = Modulus::new(t).map_err(Error::MathError)?;
    let g = primitive_root_zt(t)?;
    let w = modulus.pow(g, (t - 1) / m as u64);

    let mut roots = vec![1u64; m];
    for i in 1..m {
        roots[i] = modulus.mul(roots[i - 1], w);
    }
    Ok(roots)
}

/// Multiply two diagonal block matrices in diagonal form modulo the
/// plaintext modulus.
pub(crate) fn mul_diag_mat(
    a: &HashMap<usize, Vec<u64>>,
    b: &HashMap<usize, Vec<u64>>,
    t: u64,
) -> HashMap<usize, Vec<u64>> {
    let mut res: HashMap<usize, Vec<u64>> = HashMap::new();

    for (&rot_a, va) in a {
        for (&rot_b, vb) in b {
            let n = va.len();
            let half = n / 2;
            let entry = res
                .entry((rot_a + rot_b) % half)
                .or_insert_with(|| vec![0u64; n]);

            for i in 0..half {
                entry[i] = (entry[i]
                    + (va[i] as u128 * vb[(rot_a + i) % half] as u128 % t as u128) as u64)
                    % t;
            }
            for i in half..n {
                entry[i] = (entry[i]
                    + (va[i] as u128 * vb[half + (rot_a + i) % half] as u128 % t as u128) as u64)
                    % t;
            }
        }
    }
    res
}

/// Generate the factorized decomposition of the diagonal decoding matrix
/// using the powers of 5 and the given root table.
pub(crate) fn gen_diag_dec_matrix(
    log_n: usize,
    roots: &[u64],
) -> Vec<HashMap<usize, Vec<u64>>> {
    let n = 1usize << log_n;
    let m = 2 * n;
    let mut pow5 = vec![0usize; m];
    let mut res: Vec<HashMap<usize, Vec<u64>>> = vec![HashMap::new(); log_n];

    let mut exp5 = 1usize;
    for p in pow5.iter_mut().take(n) {
        *p = exp5;
        exp5 = exp5 * 5 % m;
    }

    // Level 0: bandwidth-4 factor.
    for &rot in &[0usize, 1, 2, 3, n / 2 - 1, n / 2 - 2, n / 2 - 3] {
        res[0].insert(rot, vec![0u64; n]);
    }
    for i in (0..n).step_by(4) {
        let r0 = res[0].get_mut(&0).unwrap();
        r0[i] = 1;
        r0[i + 1] = roots[2 * n / 4];
        r0[i + 2] = roots[7 * n / 4];
        r0[i + 3] = roots[n / 4];

        let r1 = res[0].get_mut(&1).unwrap();
        r1[i] = roots[2 * n / 4];
        r1[i + 1] = roots[5 * n / 4];
        r1[i + 2] = roots[5 * n / 4];

        let r2 = res[0].get_mut(&2).unwrap();
        r2[i] = roots[n / 4];
        r2[i + 1] = roots[7 * n / 4];

        res[0].get_mut(&3).unwrap()[i] = roots[3 * n / 4];

        let rm1 = res[0].get_mut(&(n / 2 - 1)).unwrap();
        rm1[i + 1] = 1;
        rm1[i + 2] = roots[6 * n / 4];
        rm1[i + 3] = roots[3 * n / 4];

        let rm2 = res[0].get_mut(&(n / 2 - 2)).unwrap();
        rm2[i + 2] = 1;
        rm2[i + 3] = roots[6 * n / 4];

        res[0].get_mut(&(n / 2 - 3)).unwrap()[i + 3] = 1;
    }

    // Middle levels: diagonals at offsets {0, s, 2s, n/2 - s, n/2 - 2s}.
    for ind in 1..log_n.saturating_sub(2) {
        let s = 1usize << ind;
        let gap = n / s / 4;

        for &rot in &[0usize, s, 2 * s, n / 2 - s, n / 2 - 2 * s] {
            res[ind].entry(rot).or_insert_with(|| vec![0u64; n]);
        }

        for i in (0..n).step_by(4 * s) {
            for j in 0..s {
                let w0 = roots[pow5[j] * gap % m];
                let w1 = roots[pow5[s + j] * gap % m];
                let w0_neg = roots[m - pow5[j] * gap % m];
                let w1_neg = roots[m - pow5[s + j] * gap % m];

                res[ind].get_mut(&(2 * s)).unwrap()[i + j] = w0;
                let rs = res[ind].get_mut(&s).unwrap();
                rs[i + s + j] = w1;
                rs[i + 2 * s + j] = w0_neg;
                let r0 = res[ind].get_mut(&0).unwrap();
                r0[i + j] = 1;
                r0[i + 3 * s + j] = w1_neg;
                let rm = res[ind].get_mut(&(n / 2 - s)).unwrap();
                rm[i + s + j] = 1;
                rm[i + 2 * s + j] = 1;
                res[ind].get_mut(&(n / 2 - 2 * s)).unwrap()[i + 3 * s + j] = 1;
            }
        }
    }

    // Tail levels: the two parallel branches of the top butterfly.
    let s = n / 4;
    for ind in [log_n - 2, log_n - 1] {
        res[ind].insert(0, vec![0u64; n]);
        res[ind].insert(s, vec![0u64; n]);
    }
    for i in 0..s {
        let ra = res[log_n - 2].get_mut(&0).unwrap();
        ra[i] = 1;
        ra[i + 3 * s] = roots[m - pow5[s + i] % m];
        let ra_s = res[log_n - 2].get_mut(&s).unwrap();
        ra_s[i + s] = 1;
        ra_s[i + 2 * s] = roots[m - pow5[i] % m];

        let rb = res[log_n - 1].get_mut(&0).unwrap();
        rb[i] = roots[pow5[i] % m];
        rb[i + 3 * s] = 1;
        let rb_s = res[log_n - 1].get_mut(&s).unwrap();
        rb_s[i + s] = roots[pow5[s + i] % m];
        rb_s[i + 2 * s] = 1;
    }

    res
}

/// Generate the decoding-matrix factorization with radix 1: one factor per
/// level, the two tail branches folded with their predecessor.
pub(crate) fn gen_decoding_mats(
    log_slots: usize,
    t: u64,
) -> Result<Vec<HashMap<usize, Vec<u64>>>> {
    let roots = compute_primitive_roots(1 << (log_slots + 1), t)?;
    let diag_mats = gen_diag_dec_matrix(log_slots, &roots);
    let depth = diag_mats.len() - 1;

    let mut plain_vector = Vec::with_capacity(depth);
    for mat in diag_mats.iter().take(depth.saturating_sub(2)) {
        plain_vector.push(mat.clone());
    }
    plain_vector.push(mul_diag_mat(&diag_mats[depth - 1], &diag_mats[depth - 2], t));
    plain_vector.push(mul_diag_mat(&diag_mats[depth], &diag_mats[depth - 2], t));
    Ok(plain_vector)
}

/// Generate the decoding-matrix factorization with radix 2: adjacent levels
/// merged pairwise.
pub(crate) fn gen_decoding_mats_rad2(
    log_slots: usize,
    t: u64,
) -> Result<Vec<HashMap<usize, Vec<u64>>>> {
    let roots = compute_primitive_roots(1 << (log_slots + 1), t)?;
    let diag_mats = gen_diag_dec_matrix(log_slots, &roots);
    let depth = diag_mats.len() - 1;

    let mut plain_vector = Vec::new();
    if depth % 2 == 0 {
        let mut i = 0;
        while i < depth - 2 {
            plain_vector.push(mul_diag_mat(&diag_mats[i + 1], &diag_mats[i], t));
            i += 2;
        }
    } else {
        plain_vector.push(diag_mats[0].clone());
        let mut i = 1;
        while i < depth - 2 {
            plain_vector.push(mul_diag_mat(&diag_mats[i + 1], &diag_mats[i], t));
            i += 2;
        }
    }
    plain_vector.push(mul_diag_mat(&diag_mats[depth - 1], &diag_mats[depth - 2], t));
    plain_vector.push(mul_diag_mat(&diag_mats[depth], &diag_mats[depth - 2], t));
    Ok(plain_vector)
}

/// Generate the decoding matrix merged into the two tail branches only;
/// requires log_slots = 4.
pub(crate) fn gen_decoding_mats_in_one(
    log_slots: usize,
    t: u64,
) -> Result<Vec<HashMap<usize, Vec<u64>>>> {
    if log_slots != 4 {
        return Err(Error::DefaultError(
            "The merged decoding matrix requires log_slots = 4".to_string(),
        ));
    }
    let roots = compute_primitive_roots(1 << (log_slots + 1), t)?;
    let diag_mats = gen_diag_dec_matrix(log_slots, &roots);

    let tmp = mul_diag_mat(&diag_mats[1], &diag_mats[0], t);
    Ok(vec![
        mul_diag_mat(&diag_mats[2], &tmp, t),
        mul_diag_mat(&diag_mats[3], &tmp, t),
    ])
}

/// Encode a clear diagonal map into a [`PtDiagMatrix`] at a level: each
/// diagonal is slot-encoded over Z_t, lifted to the Q chain of the level and
/// to the special moduli, in NTT+Shoup form.
pub fn encode_diag_matrix(
    par: &Arc<Parameters>,
    encoder: &FvEncoder,
    level: usize,
    diag: &HashMap<usize, Vec<u64>>,
    max_n1_n2_ratio: f64,
) -> Result<PtDiagMatrix> {
    let log_slots = par.log_fv_slots();
    let slots = 1 << log_slots;

    let naive = diag.len() <= 2;
    let n1 = if naive {
        0
    } else {
        find_best_bsgs_split(diag.keys().copied(), slots, max_n1_n2_ratio)
    };

    let mut vec = HashMap::new();
    for (&rot, entries) in diag {
        let rot = rot & (slots - 1);
        let rotated = if naive || n1 == 0 {
            entries.clone()
        } else {
            // Pre-rotate the diagonal by the giant step it will be
            // evaluated under.
            let j = rot / n1;
            rotate_small(entries, -((n1 * j) as isize))
        };
        vec.insert(rot, encode_diagonal(par, encoder, level, &rotated)?);
    }

    Ok(PtDiagMatrix {
        log_slots,
        n1,
        level,
        scale: 1.0,
        vec,
        naive,
    })
}

/// Slot-encode one diagonal over Z_t and lift it, unscaled, to the Q chain
/// of the level and to the special moduli.
fn encode_diagonal(
    par: &Arc<Parameters>,
    encoder: &FvEncoder,
    level: usize,
    entries: &[u64],
) -> Result<(Poly, Poly)> {
    let rt = encoder.encode_uint(entries)?;
    let row = rt.poly().coefficients();
    let row = row.as_slice().unwrap();

    let ctx_q = par.ctx_q_level(level)?;
    let mut q_poly = Poly::try_convert_from(row, ctx_q, Representation::PowerBasis)
        .map_err(Error::MathError)?;
    q_poly.change_representation(Representation::NttShoup);

    let mut p_poly = Poly::try_convert_from(row, &par.ctx_p, Representation::PowerBasis)
        .map_err(Error::MathError)?;
    p_poly.change_representation(Representation::NttShoup);

    Ok((q_poly, p_poly))
}

use rtf_math::rq::traits::TryConvertFrom;

/// The Slots-to-Coefficients transform: the factor chain encoded at every
/// level, and the mod-switch schedule applied between factors.
#[derive(Debug, Clone)]
pub struct SlotsToCoeffs {
    /// matrices\[level\]\[factor\]: the factor chain at each level of the
    /// chain.
    pub(crate) matrices: Vec<Vec<PtDiagMatrix>>,
    /// Number of modulus switches before each factor.
    pub(crate) mod_down: Vec<usize>,
}

impl SlotsToCoeffs {
    /// Generate the transform with the given radix (0, 1 or 2) and
    /// mod-switch schedule.
    pub fn generate(
        par: &Arc<Parameters>,
        encoder: &FvEncoder,
        radix: usize,
        mod_down: &[usize],
    ) -> Result<Self> {
        let t = par.plaintext();
        let log_slots = par.log_fv_slots();
        let clear = match radix {
            0 => gen_decoding_mats_in_one(log_slots, t)?,
            2 => gen_decoding_mats_rad2(log_slots, t)?,
            _ => gen_decoding_mats(log_slots, t)?,
        };

        let mut matrices = Vec::with_capacity(par.max_level() + 1);
        for level in 0..=par.max_level() {
            let mut factors = Vec::with_capacity(clear.len());
            for diag in &clear {
                factors.push(encode_diag_matrix(par, encoder, level, diag, 16.0)?);
            }
            matrices.push(factors);
        }

        let depth = clear.len();
        if mod_down.len() + 1 != depth {
            return Err(Error::DefaultError(format!(
                "The mod-switch schedule has {} entries, expected {}",
                mod_down.len(),
                depth - 1
            )));
        }

        Ok(Self {
            matrices,
            mod_down: mod_down.to_vec(),
        })
    }

    /// Number of factors in the chain.
    pub fn depth(&self) -> usize {
        self.matrices[0].len()
    }

    /// All rotation steps needed to evaluate the transform.
    pub fn rotations(&self) -> Vec<isize> {
        let mut rotations = vec![];
        for mat in &self.matrices[0] {
            rotations.extend(mat.rotations());
        }
        rotations.sort_unstable();
        rotations.dedup();
        rotations
    }

    /// Apply the transform to a ciphertext in slot representation, producing
    /// the coefficient representation. The factor chain runs sequentially;
    /// the two tail branches are evaluated in parallel and summed.
    pub fn apply(&self, eval: &FvEvaluator, ct: &Ciphertext) -> Result<Ciphertext> {
        let depth = self.depth();
        let mut ct = ct.clone();

        for (i, &down) in self.mod_down.iter().enumerate() {
            eval.mod_switch_many(&mut ct, down)?;
            if i < depth - 2 {
                ct = eval.multiply_by_diag_matrix(&ct, &self.matrices[ct.level()][i])?;
            }
        }

        let level = ct.level();
        let ct_a = eval.multiply_by_diag_matrix(&ct, &self.matrices[level][depth - 2])?;
        let ct_b = eval.multiply_by_diag_matrix(&ct, &self.matrices[level][depth - 1])?;
        eval.add(&ct_a, &ct_b)
    }

    /// Apply the transform in the clear to a slot vector, with the same
    /// factor chain and combination as the homomorphic path.
    #[cfg(test)]
    pub(crate) fn apply_clear(
        &self,
        par: &Parameters,
        slots: &[u64],
        clear: &[HashMap<usize, Vec<u64>>],
    ) -> Vec<u64> {
        let t = par.plaintext();
        let depth = clear.len();
        let mut v = slots.to_vec();
        for diag in clear.iter().take(depth - 2) {
            v = apply_diag_map_clear(diag, &v, t);
        }
        let a = apply_diag_map_clear(&clear[depth - 2], &v, t);
        let b = apply_diag_map_clear(&clear[depth - 1], &v, t);
        a.iter().zip(b.iter()).map(|(x, y)| (x + y) % t).collect()
    }
}
