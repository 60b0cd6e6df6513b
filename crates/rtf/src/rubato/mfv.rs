//! Homomorphic evaluation of the Rubato keystream over BFV: the cipher
//! state is BS parallel ciphertexts, each packing N independent lanes in
//! lockstep with the plaintext reference.

use super::{grid_side, mix_columns_generator, round_constants, RubatoParam};
use crate::bfv::{Ciphertext, FvEncoder, FvEvaluator};
use crate::keys::PublicKey;
use crate::{Error, Parameters, Result};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// Homomorphic Rubato evaluator.
///
/// The evaluator carries the modulus-switch cursor of the schedule; a reused
/// instance must be [`MfvRubato::reset`] before processing the next
/// (nonce, counter) batch.
#[derive(Debug)]
pub struct MfvRubato {
    par: Arc<Parameters>,
    param: RubatoParam,
    encoder: FvEncoder,
    evaluator: FvEvaluator,

    /// Number of modulus switches applied before the first round.
    initial_mod_down: usize,
    /// Total switches applied by the last evaluation; nonzero means the
    /// instance must be reset before the next batch.
    mod_switched: usize,
}

impl MfvRubato {
    /// Creates a homomorphic Rubato evaluator.
    ///
    /// Returns an error when the plaintext modulus of the parameter set does
    /// not match the scheme parameters.
    pub fn new(
        par: &Arc<Parameters>,
        param: RubatoParam,
        encoder: FvEncoder,
        evaluator: FvEvaluator,
        initial_mod_down: usize,
    ) -> Result<Self> {
        if param.plain_modulus != par.plaintext() {
            return Err(Error::UnspecifiedInput(format!(
                "The Rubato plaintext modulus {} does not match the scheme modulus {}",
                param.plain_modulus,
                par.plaintext()
            )));
        }
        Ok(Self {
            par: par.clone(),
            param,
            encoder,
            evaluator,
            initial_mod_down,
            mod_switched: 0,
        })
    }

    /// The parameter set of the evaluator.
    pub const fn param(&self) -> &RubatoParam {
        &self.param
    }

    /// Encrypt the symmetric key under the public key: one ciphertext per
    /// key word, each packing the word in all lanes.
    pub fn enc_key<R: RngCore + CryptoRng>(
        &self,
        key: &[u64],
        pk: &PublicKey,
        rng: &mut R,
    ) -> Result<Vec<Ciphertext>> {
        if key.len() != self.param.block_size {
            return Err(Error::TooFewValues(key.len(), self.param.block_size));
        }
        let lanes = self.par.fv_slots();
        key.iter()
            .map(|k| {
                let rt = self.encoder.encode_uint(&vec![*k; lanes])?;
                let pt = self.encoder.scale_up(&rt, self.par.max_level())?;
                pk.try_encrypt(&pt, rng)
            })
            .collect()
    }

    /// Restore the schedule cursor for the next batch.
    pub fn reset(&mut self, initial_mod_down: usize) {
        self.initial_mod_down = initial_mod_down;
        self.mod_switched = 0;
    }

    /// Evaluate the keystream homomorphically without any modulus
    /// switching beyond the initial one.
    pub fn crypt_no_mod_switch(
        &mut self,
        nonces: &[Vec<u8>],
        counter: &[u8],
        key_ct: &[Ciphertext],
    ) -> Result<Vec<Ciphertext>> {
        let schedule = vec![0usize; self.param.num_round];
        self.crypt_with_schedule(nonces, counter, key_ct, self.initial_mod_down, &schedule)
    }

    /// Evaluate the keystream homomorphically with the given modulus-switch
    /// schedule: entry 0 before the first round, entry r after round r.
    pub fn crypt(
        &mut self,
        nonces: &[Vec<u8>],
        counter: &[u8],
        key_ct: &[Ciphertext],
        mod_down: &[usize],
    ) -> Result<Vec<Ciphertext>> {
        if mod_down.len() != self.param.num_round + 1 {
            return Err(Error::UnspecifiedInput(format!(
                "The schedule has {} entries, expected {}",
                mod_down.len(),
                self.param.num_round + 1
            )));
        }
        self.crypt_with_schedule(nonces, counter, key_ct, mod_down[0], &mod_down[1..])
    }

    fn crypt_with_schedule(
        &mut self,
        nonces: &[Vec<u8>],
        counter: &[u8],
        key_ct: &[Ciphertext],
        initial: usize,
        per_round: &[usize],
    ) -> Result<Vec<Ciphertext>> {
        if self.mod_switched != 0 {
            return Err(Error::DefaultError(
                "The Rubato instance must be reset before the next batch".to_string(),
            ));
        }
        let bs = self.param.block_size;
        let lanes = self.par.fv_slots();
        if nonces.len() != lanes {
            return Err(Error::TooFewValues(nonces.len(), lanes));
        }
        if key_ct.len() != bs {
            return Err(Error::TooFewValues(key_ct.len(), bs));
        }

        // Per-lane round constants, transposed into per-(round, word) lane
        // vectors.
        let num_round = self.param.num_round;
        let mut rc = vec![vec![vec![0u64; lanes]; bs]; num_round + 1];
        for (lane, nonce) in nonces.iter().enumerate() {
            let lane_rc = round_constants(&self.param, nonce, counter);
            for (r, rc_r) in lane_rc.iter().enumerate() {
                for (i, v) in rc_r.iter().enumerate() {
                    rc[r][i][lane] = *v;
                }
            }
        }

        // The key ciphertexts follow the state level.
        let mut key_state = key_ct.to_vec();
        for k in key_state.iter_mut() {
            self.evaluator.mod_switch_many(k, initial)?;
        }
        self.mod_switched += initial;
        let level = key_state[0].level();

        // Trivial encryptions of the initial state (1, ..., BS).
        let mut state = Vec::with_capacity(bs);
        for i in 0..bs {
            let rt = self.encoder.encode_uint(&vec![(i + 1) as u64; lanes])?;
            let pt = self.encoder.scale_up(&rt, level)?;
            let mut ct = Ciphertext::zero(&self.par, level)?;
            ct.c[0] = pt.poly().clone();
            self.evaluator.transform_to_ntt(&mut ct);
            state.push(ct);
        }

        for r in 0..num_round {
            state = self.mix_columns(&state)?;
            self.add_round_key(&mut state, &key_state, &rc[r])?;
            for ct in state.iter_mut() {
                let sq = self.evaluator.mul_relin(ct, ct)?;
                *ct = self.evaluator.mul_relin(&sq, ct)?;
            }
            let down = per_round[r];
            if down > 0 {
                for ct in state.iter_mut() {
                    self.evaluator.mod_switch_many(ct, down)?;
                }
                for k in key_state.iter_mut() {
                    self.evaluator.mod_switch_many(k, down)?;
                }
                self.mod_switched += down;
            }
        }

        // Final linear layer.
        state = self.mix_columns(&state)?;
        self.add_round_key(&mut state, &key_state, &rc[num_round])?;

        state.truncate(self.param.output_size());
        Ok(state)
    }

    /// MixColumns over the ciphertext state: scalar fan-in linear
    /// combination on the grid columns, then on the rows.
    fn mix_columns(&self, state: &[Ciphertext]) -> Result<Vec<Ciphertext>> {
        let bs = self.param.block_size;
        let side = grid_side(bs);
        let gen = mix_columns_generator(bs);
        let t = self.param.plain_modulus;

        let mut tmp: Vec<Option<Ciphertext>> = vec![None; bs];
        for r in 0..side {
            for c in 0..side {
                let mut acc: Option<Ciphertext> = None;
                for k in 0..side {
                    let coeff = gen[(k + side - r) % side] % t;
                    let term = self.evaluator.mul_scalar(&state[k * side + c], coeff);
                    acc = Some(match acc {
                        None => term,
                        Some(a) => self.evaluator.add(&a, &term)?,
                    });
                }
                tmp[r * side + c] = acc;
            }
        }

        let tmp: Vec<Ciphertext> = tmp.into_iter().map(Option::unwrap).collect();
        let mut out: Vec<Option<Ciphertext>> = vec![None; bs];
        for r in 0..side {
            for c in 0..side {
                let mut acc: Option<Ciphertext> = None;
                for k in 0..side {
                    let coeff = gen[(k + side - c) % side] % t;
                    let term = self.evaluator.mul_scalar(&tmp[r * side + k], coeff);
                    acc = Some(match acc {
                        None => term,
                        Some(a) => self.evaluator.add(&a, &term)?,
                    });
                }
                out[r * side + c] = acc;
            }
        }
        Ok(out.into_iter().map(Option::unwrap).collect())
    }

    /// Add the key-mixed round constants: state_i += key_ct_i * rc_i.
    fn add_round_key(
        &self,
        state: &mut [Ciphertext],
        key_state: &[Ciphertext],
        rc: &[Vec<u64>],
    ) -> Result<()> {
        for (i, ct) in state.iter_mut().enumerate() {
            let rt = self.encoder.encode_uint(&rc[i])?;
            let pt = self.encoder.lift_for_mul(&rt, key_state[i].level())?;
            let rk = self.evaluator.mul_plain(&key_state[i], &pt)?;
            *ct = self.evaluator.add(ct, &rk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MfvRubato;
    use crate::bfv::{FvEncoder, FvEvaluator};
    use crate::keys::{PublicKey, RelinearizationKey, SecretKey};
    use crate::rubato::{plain_rubato, RubatoParam};
    use crate::Parameters;
    use rand::rng;
    use std::error::Error;

    /// The plaintext and homomorphic evaluators agree lane-by-lane when no
    /// noise is injected.
    #[test]
    fn agreement_with_plain_path() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let param = RubatoParam::custom(16, 2, par.plaintext(), 0.0);

        let sk = SecretKey::random(&par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        let rlk = RelinearizationKey::new(&sk, &mut rng)?;
        let encoder = FvEncoder::new(&par)?;
        let evaluator = FvEvaluator::new(&par, Some(rlk), None);

        let mut rubato = MfvRubato::new(&par, param, encoder.clone(), evaluator, 0)?;

        let key: Vec<u64> = (1..=16).collect();
        let key_ct = rubato.enc_key(&key, &pk, &mut rng)?;

        let lanes = par.fv_slots();
        let mut nonces = Vec::with_capacity(lanes);
        for i in 0..lanes {
            nonces.push(vec![i as u8; 64]);
        }
        let counter = vec![0u8; 64];

        let keystream_cts = rubato.crypt_no_mod_switch(&nonces, &counter, &key_ct)?;
        assert_eq!(keystream_cts.len(), param.output_size());

        // Decrypt each keystream word and compare against the reference
        // evaluation on every lane.
        let expected: Vec<Vec<u64>> = nonces
            .iter()
            .map(|nonce| plain_rubato(&param, nonce, &counter, &key, &mut rng))
            .collect();

        for (s, ct) in keystream_cts.iter().enumerate() {
            let decoded = encoder.decode_uint(&sk.try_decrypt_fv(ct)?);
            for lane in 0..lanes {
                assert_eq!(
                    decoded[lane], expected[lane][s],
                    "lane {lane} word {s} disagrees"
                );
            }
        }
        Ok(())
    }

    /// A consumed instance must be reset before the next batch.
    #[test]
    fn reset_invariant() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let param = RubatoParam::custom(16, 2, par.plaintext(), 0.0);

        let sk = SecretKey::random(&par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        let rlk = RelinearizationKey::new(&sk, &mut rng)?;
        let encoder = FvEncoder::new(&par)?;
        let evaluator = FvEvaluator::new(&par, Some(rlk), None);
        let mut rubato = MfvRubato::new(&par, param, encoder, evaluator, 1)?;

        let key: Vec<u64> = (1..=16).collect();
        let key_ct = rubato.enc_key(&key, &pk, &mut rng)?;
        let nonces = vec![vec![0u8; 64]; par.fv_slots()];
        let counter = vec![0u8; 64];

        rubato.crypt_no_mod_switch(&nonces, &counter, &key_ct)?;
        assert!(rubato
            .crypt_no_mod_switch(&nonces, &counter, &key_ct)
            .is_err());
        rubato.reset(1);
        assert!(rubato
            .crypt_no_mod_switch(&nonces, &counter, &key_ct)
            .is_ok());
        Ok(())
    }
}
