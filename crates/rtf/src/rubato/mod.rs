//! The Rubato keystream cipher: parameter registry, round-constant
//! derivation, and the MixColumns linear layer shared by the plaintext and
//! homomorphic evaluators.

mod mfv;
mod plain;

pub use mfv::MfvRubato;
pub use plain::plain_rubato;

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;

/// A named Rubato parameter set: block size, round count, plaintext modulus
/// and keystream-noise deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RubatoParam {
    /// Block size BS of the cipher state.
    pub block_size: usize,
    /// Number of rounds.
    pub num_round: usize,
    /// Plaintext modulus t.
    pub plain_modulus: u64,
    /// Standard deviation of the Gaussian noise added to the keystream.
    pub sigma: f64,
}

impl RubatoParam {
    /// The keystream output width, BS - 4: the truncated words absorb the
    /// added noise.
    pub const fn output_size(&self) -> usize {
        self.block_size - 4
    }

    /// A custom parameter set, for test rings.
    pub const fn custom(
        block_size: usize,
        num_round: usize,
        plain_modulus: u64,
        sigma: f64,
    ) -> Self {
        Self {
            block_size,
            num_round,
            plain_modulus,
            sigma,
        }
    }
}

/// Index of the Rubato80S parameter set.
pub const RUBATO_80S: usize = 0;
/// Index of the Rubato80M parameter set.
pub const RUBATO_80M: usize = 1;
/// Index of the Rubato80L parameter set.
pub const RUBATO_80L: usize = 2;
/// Index of the Rubato128S parameter set.
pub const RUBATO_128S: usize = 3;
/// Index of the Rubato128M parameter set.
pub const RUBATO_128M: usize = 4;
/// Index of the Rubato128L parameter set.
pub const RUBATO_128L: usize = 5;

/// The published Rubato parameter sets.
pub const RUBATO_PARAMS: [RubatoParam; 6] = [
    RubatoParam::custom(16, 2, 0x3ee0001, 1024.0),
    RubatoParam::custom(36, 2, 0x1fc0001, 1024.0),
    RubatoParam::custom(64, 2, 0x1fc0001, 1024.0),
    RubatoParam::custom(16, 5, 0x3ee0001, 1024.0),
    RubatoParam::custom(36, 3, 0x1fc0001, 1024.0),
    RubatoParam::custom(64, 2, 0x1fc0001, 1024.0),
];

/// Modulus-switch schedules for the homomorphic evaluation: the number of
/// switches before the first round and after each round, and the schedule
/// of the Slots-to-Coefficients factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModDownParams {
    /// Switches applied before round r (entry 0 before the first round).
    pub cipher_mod_down: &'static [usize],
    /// Switches applied before each Slots-to-Coefficients factor.
    pub stc_mod_down: &'static [usize],
}

/// The published modulus-switch schedules, one per Rubato parameter set.
pub const RUBATO_MOD_DOWN: [ModDownParams; 6] = [
    ModDownParams {
        cipher_mod_down: &[2, 1, 1],
        stc_mod_down: &[1, 0, 1, 0, 1, 0, 1, 0],
    },
    ModDownParams {
        cipher_mod_down: &[2, 1, 1],
        stc_mod_down: &[1, 0, 1, 0, 1, 0, 1, 0],
    },
    ModDownParams {
        cipher_mod_down: &[2, 1, 1],
        stc_mod_down: &[1, 0, 1, 0, 1, 0, 1, 0],
    },
    ModDownParams {
        cipher_mod_down: &[1, 1, 1, 1, 1, 1],
        stc_mod_down: &[1, 0, 0, 1, 0, 0, 1, 0],
    },
    ModDownParams {
        cipher_mod_down: &[2, 1, 1, 1],
        stc_mod_down: &[1, 0, 1, 0, 0, 1, 0, 0],
    },
    ModDownParams {
        cipher_mod_down: &[2, 1, 1],
        stc_mod_down: &[1, 0, 1, 0, 1, 0, 1, 0],
    },
];

/// The Hera parameter sets, kept as registry data for interoperability.
pub const HERA_PARAMS: [RubatoParam; 2] = [
    RubatoParam::custom(16, 4, 0x3ee0001, 0.0),
    RubatoParam::custom(16, 5, 0x3ee0001, 0.0),
];

/// Circulant generators of the MixColumns matrices, per grid side.
const MIX_COLUMNS_4: [u64; 4] = [2, 3, 1, 1];
const MIX_COLUMNS_6: [u64; 6] = [4, 2, 4, 3, 1, 1];
const MIX_COLUMNS_8: [u64; 8] = [5, 3, 4, 3, 6, 2, 1, 1];

/// The circulant generator of the MixColumns matrix for a block size.
pub(crate) fn mix_columns_generator(block_size: usize) -> &'static [u64] {
    match block_size {
        16 => &MIX_COLUMNS_4,
        36 => &MIX_COLUMNS_6,
        64 => &MIX_COLUMNS_8,
        _ => panic!("Unsupported block size {block_size}"),
    }
}

/// The grid side of the state, sqrt(BS).
pub(crate) fn grid_side(block_size: usize) -> usize {
    match block_size {
        16 => 4,
        36 => 6,
        64 => 8,
        _ => panic!("Unsupported block size {block_size}"),
    }
}

/// XOF over nonce ‖ counter, used to derive round constants.
pub(crate) fn keystream_xof(nonce: &[u8], counter: &[u8]) -> impl XofReader {
    let mut hasher = Shake256::default();
    hasher.update(nonce);
    hasher.update(counter);
    hasher.finalize_xof()
}

/// Uniform rejection sampling in [0, q) from an XOF.
pub(crate) fn sample_zqx(reader: &mut impl XofReader, q: u64) -> u64 {
    let bit_len = 64 - (q - 2).leading_zeros() as usize;
    let byte_len = bit_len.div_ceil(8);
    let b = if bit_len % 8 == 0 { 8 } else { bit_len % 8 };
    let mask = ((1u16 << b) - 1) as u8;

    let mut bytes = vec![0u8; byte_len];
    loop {
        reader.read(&mut bytes);
        bytes[byte_len - 1] &= mask;
        let mut res = 0u64;
        for (i, byte) in bytes.iter().enumerate() {
            res += (*byte as u64) << (8 * i);
        }
        if res < q {
            return res;
        }
    }
}

/// Derive the round-constant schedule for one (nonce, counter) pair:
/// `num_round + 1` vectors of BS values, consumed in (round, index) order.
/// The last vector belongs to the final linear layer.
pub(crate) fn round_constants(
    param: &RubatoParam,
    nonce: &[u8],
    counter: &[u8],
) -> Vec<Vec<u64>> {
    let mut reader = keystream_xof(nonce, counter);
    (0..=param.num_round)
        .map(|_| {
            (0..param.block_size)
                .map(|_| sample_zqx(&mut reader, param.plain_modulus))
                .collect()
        })
        .collect()
}

/// MixColumns over a state in the clear: the state is viewed as a
/// side x side grid; the circulant matrix is applied to the columns, then to
/// the rows.
pub(crate) fn mix_columns_clear(state: &[u64], t: u64, block_size: usize) -> Vec<u64> {
    let side = grid_side(block_size);
    let gen = mix_columns_generator(block_size);

    // Columns.
    let mut tmp = vec![0u64; block_size];
    for r in 0..side {
        for c in 0..side {
            let mut acc = 0u128;
            for k in 0..side {
                acc += gen[(k + side - r) % side] as u128 * state[k * side + c] as u128;
            }
            tmp[r * side + c] = (acc % t as u128) as u64;
        }
    }

    // Rows.
    let mut out = vec![0u64; block_size];
    for r in 0..side {
        for c in 0..side {
            let mut acc = 0u128;
            for k in 0..side {
                acc += gen[(k + side - c) % side] as u128 * tmp[r * side + k] as u128;
            }
            out[r * side + c] = (acc % t as u128) as u64;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_consistency() {
        for (param, mod_down) in RUBATO_PARAMS.iter().zip(RUBATO_MOD_DOWN.iter()) {
            assert!(matches!(param.block_size, 16 | 36 | 64));
            assert!(matches!(param.num_round, 2 | 3 | 4 | 5));
            assert_eq!(param.output_size(), param.block_size - 4);
            // One schedule entry before the first round, one after each
            // round.
            assert_eq!(mod_down.cipher_mod_down.len(), param.num_round + 1);
            // The plaintext modulus is NTT-friendly for the full ring,
            // t = 1 mod 2^17.
            assert_eq!(param.plain_modulus % (1 << 17), 1);
            assert!(rtf_util::is_prime(param.plain_modulus));
        }
    }

    #[test]
    fn xof_is_deterministic() {
        let param = RubatoParam::custom(16, 2, 40961, 0.0);
        let nonce = [1u8; 64];
        let counter = [2u8; 64];

        let a = round_constants(&param, &nonce, &counter);
        let b = round_constants(&param, &nonce, &counter);
        assert_eq!(a, b);
        assert_eq!(a.len(), param.num_round + 1);
        assert!(a.iter().all(|v| v.len() == param.block_size));
        assert!(a
            .iter()
            .all(|v| v.iter().all(|x| *x < param.plain_modulus)));

        // A different nonce gives different constants.
        let c = round_constants(&param, &[3u8; 64], &counter);
        assert_ne!(a, c);
    }

    #[test]
    fn sample_zqx_in_range() {
        let mut reader = keystream_xof(&[0u8; 64], &[0u8; 64]);
        for _ in 0..1000 {
            let x = sample_zqx(&mut reader, 40961);
            assert!(x < 40961);
        }
    }

    #[test]
    fn mix_columns_invertible_shape() {
        // MixColumns of the zero state is zero; of a constant state is a
        // constant state (row sums of a circulant are equal).
        let t = 40961u64;
        let zero = vec![0u64; 16];
        assert_eq!(mix_columns_clear(&zero, t, 16), zero);

        let ones = vec![1u64; 16];
        let mixed = mix_columns_clear(&ones, t, 16);
        let row_sum: u64 = MIX_COLUMNS_4.iter().sum();
        let expected = (row_sum * row_sum) % t;
        assert!(mixed.iter().all(|x| *x == expected));
    }

    #[test]
    fn mix_columns_linear() {
        let t = 40961u64;
        let a = (0..16u64).collect::<Vec<_>>();
        let b = (0..16u64).map(|i| (3 * i + 7) % t).collect::<Vec<_>>();
        let sum = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x + y) % t)
            .collect::<Vec<_>>();
        let ma = mix_columns_clear(&a, t, 16);
        let mb = mix_columns_clear(&b, t, 16);
        let msum = mix_columns_clear(&sum, t, 16);
        let expected = ma
            .iter()
            .zip(mb.iter())
            .map(|(x, y)| (x + y) % t)
            .collect::<Vec<_>>();
        assert_eq!(msum, expected);
    }
}
