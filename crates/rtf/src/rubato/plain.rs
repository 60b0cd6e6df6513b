//! Reference evaluation of the Rubato keystream in the clear.

use super::{mix_columns_clear, round_constants, RubatoParam};
use rand::{CryptoRng, RngCore};
use rtf_math::sampler::sample_vec_gaussian;
use rtf_math::zq::Modulus;

/// Evaluate one keystream block for a (nonce, counter) pair: the state
/// starts at (1, ..., BS); each round applies MixColumns, adds the
/// key-mixed round constants, and cubes every coordinate; a final linear
/// layer is appended, Gaussian noise of deviation sigma is added, and the
/// last 4 coordinates are truncated.
///
/// Returns the BS - 4 keystream words.
pub fn plain_rubato<R: RngCore + CryptoRng>(
    param: &RubatoParam,
    nonce: &[u8],
    counter: &[u8],
    key: &[u64],
    rng: &mut R,
) -> Vec<u64> {
    let bs = param.block_size;
    let t = param.plain_modulus;
    debug_assert_eq!(key.len(), bs);
    debug_assert!(key.iter().all(|k| *k < t));

    let modulus = Modulus::new(t).unwrap();
    let rc = round_constants(param, nonce, counter);

    let mut state: Vec<u64> = (1..=bs as u64).collect();

    for r in 0..param.num_round {
        state = mix_columns_clear(&state, t, bs);
        for i in 0..bs {
            let rk = modulus.mul(rc[r][i], key[i]);
            state[i] = modulus.add(state[i], rk);
            let sq = modulus.mul(state[i], state[i]);
            state[i] = modulus.mul(sq, state[i]);
        }
    }

    // Final linear layer.
    state = mix_columns_clear(&state, t, bs);
    for i in 0..bs {
        let rk = modulus.mul(rc[param.num_round][i], key[i]);
        state[i] = modulus.add(state[i], rk);
    }

    // Noise injection; the truncated words absorb it.
    let noise = sample_vec_gaussian(bs, param.sigma, rng).unwrap();
    for (s, e) in state.iter_mut().zip(noise.iter()) {
        *s = modulus.add(*s, modulus.reduce_i64(*e));
    }

    state.truncate(bs - 4);
    state
}

#[cfg(test)]
mod tests {
    use super::plain_rubato;
    use crate::rubato::RubatoParam;
    use rand::rng;

    #[test]
    fn deterministic_without_noise() {
        let mut rng = rng();
        let param = RubatoParam::custom(16, 2, 40961, 0.0);
        let key: Vec<u64> = (1..=16).collect();
        let nonce = [0u8; 64];
        let counter = [0u8; 64];

        let a = plain_rubato(&param, &nonce, &counter, &key, &mut rng);
        let b = plain_rubato(&param, &nonce, &counter, &key, &mut rng);
        assert_eq!(a, b);
        assert_eq!(a.len(), param.output_size());
        assert!(a.iter().all(|x| *x < param.plain_modulus));
    }

    #[test]
    fn nonce_separates_streams() {
        let mut rng = rng();
        let param = RubatoParam::custom(16, 2, 40961, 0.0);
        let key: Vec<u64> = (1..=16).collect();

        let a = plain_rubato(&param, &[0u8; 64], &[0u8; 64], &key, &mut rng);
        let b = plain_rubato(&param, &[1u8; 64], &[0u8; 64], &key, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn key_separates_streams() {
        let mut rng = rng();
        let param = RubatoParam::custom(16, 2, 40961, 0.0);
        let key1: Vec<u64> = (1..=16).collect();
        let key2: Vec<u64> = (2..=17).collect();

        let a = plain_rubato(&param, &[0u8; 64], &[0u8; 64], &key1, &mut rng);
        let b = plain_rubato(&param, &[0u8; 64], &[0u8; 64], &key2, &mut rng);
        assert_ne!(a, b);
    }
}
