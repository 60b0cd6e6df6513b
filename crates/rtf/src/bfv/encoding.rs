//! Encoding of integer vectors into the FV slot representation, and the
//! exact scale-up from the plaintext ring into R_Q.

use super::{Plaintext, PlaintextRingT};
use crate::{Error, Parameters, Result};
use rtf_math::{
    ntt::NttOperator,
    rq::{traits::TryConvertFrom, Poly, Representation},
    zq::Modulus,
};
use rtf_util::bit_reverse;
use std::sync::Arc;

/// Encoder for the FV side of the scheme: slot encoding of vectors over Z_t
/// via the inverse NTT of Z_t, and the lattice scale-up embedding into R_Q.
#[derive(Debug, Clone)]
pub struct FvEncoder {
    par: Arc<Parameters>,

    /// NTT over Z_t of size fv_slots.
    ntt_t: NttOperator,

    /// Slot index map: slot i lands on coefficient index_matrix\[i\] of the
    /// small ring before the inverse NTT.
    index_matrix: Vec<usize>,
}

impl FvEncoder {
    /// Creates an encoder for the given parameters.
    ///
    /// Returns an error when the plaintext modulus does not support the NTT
    /// of the FV slot count.
    pub fn new(par: &Arc<Parameters>) -> Result<Self> {
        let slots = par.fv_slots();
        let t = Modulus::new(par.plaintext()).map_err(Error::MathError)?;
        let ntt_t = NttOperator::new(&t, slots).ok_or_else(|| {
            Error::DefaultError(format!(
                "The plaintext modulus {} does not support the NTT of size {slots}",
                par.plaintext()
            ))
        })?;

        // The anti-bit-reversal permutation indexed by the powers of the
        // Galois generator 5: slot i of the first row maps to the
        // bit-reversed position of (5^i - 1)/2, slot i of the second row to
        // the bit-reversed position of (2m - 5^i - 1)/2.
        let m = (slots as u64) << 1;
        let log_slots = par.log_fv_slots();
        let mut index_matrix = vec![0usize; slots];
        let mut pos = 1u64;
        for i in 0..slots / 2 {
            let index1 = (pos - 1) >> 1;
            let index2 = (m - pos - 1) >> 1;
            index_matrix[i] = bit_reverse(index1 as usize, log_slots);
            index_matrix[i | (slots >> 1)] = bit_reverse(index2 as usize, log_slots);
            pos = (pos * 5) & (m - 1);
        }

        Ok(Self {
            par: par.clone(),
            ntt_t,
            index_matrix,
        })
    }

    /// The parameters of the encoder.
    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.par
    }

    /// Encode a vector of at most fv_slots values over Z_t into the slot
    /// representation; trailing slots are zero.
    pub fn encode_uint(&self, values: &[u64]) -> Result<PlaintextRingT> {
        let slots = self.par.fv_slots();
        if values.len() > slots {
            return Err(Error::TooManyValues(values.len(), slots));
        }

        let mut small = vec![0u64; slots];
        for (i, v) in values.iter().enumerate() {
            if *v >= self.par.plaintext() {
                return Err(Error::UnspecifiedInput(format!(
                    "Value {v} out of range for the plaintext modulus"
                )));
            }
            small[self.index_matrix[i]] = *v;
        }
        self.ntt_t.backward(&mut small);

        // Spread the small ring into the degree-N plaintext ring.
        let gap = self.par.degree() / slots;
        let mut coeffs = vec![0u64; self.par.degree()];
        for (i, c) in small.iter().enumerate() {
            coeffs[i * gap] = *c;
        }

        let poly = Poly::try_convert_from(
            &coeffs as &[u64],
            &self.par.ctx_t,
            Representation::PowerBasis,
        )?;
        Ok(PlaintextRingT {
            par: self.par.clone(),
            poly,
            scale: 1.0,
        })
    }

    /// Decode a plaintext over Z_t into its slot values.
    pub fn decode_uint(&self, pt: &PlaintextRingT) -> Vec<u64> {
        let slots = self.par.fv_slots();
        let gap = self.par.degree() / slots;

        let mut small = vec![0u64; slots];
        let coeffs = pt.poly.coefficients();
        for (i, s) in small.iter_mut().enumerate() {
            *s = coeffs[[0, i * gap]];
        }
        self.ntt_t.forward(&mut small);

        (0..slots).map(|i| small[self.index_matrix[i]]).collect()
    }

    /// Lift a plaintext over Z_t into R_Q at the given level for use as a
    /// multiplication operand: the coefficients are broadcast to every
    /// residue without scaling, and the result is left in NTT form.
    pub fn lift_for_mul(&self, rt: &PlaintextRingT, level: usize) -> Result<Plaintext> {
        let ctx = self.par.ctx_q_level(level)?;
        let row = rt.poly.coefficients();
        let mut poly = Poly::try_convert_from(
            row.as_slice().unwrap(),
            ctx,
            Representation::PowerBasis,
        )?;
        poly.change_representation(Representation::Ntt);
        Ok(Plaintext {
            par: self.par.clone(),
            poly,
            level,
            scale: rt.scale,
            is_ntt: true,
        })
    }

    /// Scale a plaintext over Z_t up into R_Q at the given level, realizing
    /// the embedding m -> round(Q * m / t) exactly via big-integer
    /// arithmetic.
    pub fn scale_up(&self, rt: &PlaintextRingT, level: usize) -> Result<Plaintext> {
        let scaler = self
            .par
            .scalers_up
            .get(level)
            .ok_or_else(|| Error::DefaultError(format!("Invalid level: {level}")))?;
        let poly = rt.poly.scale(scaler)?;
        Ok(Plaintext {
            par: self.par.clone(),
            poly,
            level,
            scale: rt.scale,
            is_ntt: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::FvEncoder;
    use crate::Parameters;
    use rand::{rng, Rng};

    #[test]
    fn encode_decode_roundtrip() {
        let par = Parameters::rubato_test().unwrap();
        let encoder = FvEncoder::new(&par).unwrap();
        let mut rng = rng();

        for _ in 0..20 {
            let values = (0..par.fv_slots())
                .map(|_| rng.random_range(0..par.plaintext()))
                .collect::<Vec<_>>();
            let pt = encoder.encode_uint(&values).unwrap();
            assert_eq!(encoder.decode_uint(&pt), values);
        }

        // Short vectors are padded with zeros.
        let pt = encoder.encode_uint(&[1, 2, 3]).unwrap();
        let decoded = encoder.decode_uint(&pt);
        assert_eq!(&decoded[..3], &[1, 2, 3]);
        assert!(decoded[3..].iter().all(|v| *v == 0));
    }

    #[test]
    fn encode_rejects_out_of_range() {
        let par = Parameters::rubato_test().unwrap();
        let encoder = FvEncoder::new(&par).unwrap();
        assert!(encoder.encode_uint(&[par.plaintext()]).is_err());
        assert!(encoder
            .encode_uint(&vec![0u64; par.fv_slots() + 1])
            .is_err());
    }

    #[test]
    fn scale_up_constant() {
        let par = Parameters::rubato_test().unwrap();
        let encoder = FvEncoder::new(&par).unwrap();

        // The zero vector scales up to the zero polynomial at every level.
        let rt = encoder.encode_uint(&[]).unwrap();
        for level in 0..=par.max_level() {
            let pt = encoder.scale_up(&rt, level).unwrap();
            assert_eq!(pt.level(), level);
            assert!(pt.poly().coefficients().iter().all(|c| *c == 0));
        }
    }
}
