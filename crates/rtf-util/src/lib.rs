#![crate_name = "rtf_util"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Utilities for the rtf workspace.

use num_bigint_dig::{prime::probably_prime, BigUint, ModInverse};
use num_traits::cast::ToPrimitive;
use std::mem::size_of;

/// Returns whether the modulus p is prime; this function is 100% accurate.
pub fn is_prime(p: u64) -> bool {
    probably_prime(&BigUint::from(p), 0)
}

/// Computes the modular multiplicative inverse of `a` modulo `p`. Returns
/// `None` if `a` is not invertible modulo `p`.
pub fn inverse(a: u64, p: u64) -> Option<u64> {
    let p = BigUint::from(p);
    let a = BigUint::from(a);
    a.mod_inverse(p)?.to_u64()
}

/// Returns the number of bits b such that 2^b <= value.
/// Panics when `value` is 0.
pub fn ilog2(value: u64) -> usize {
    assert!(value > 0);
    size_of::<u64>() * 8 - 1 - value.leading_zeros() as usize
}

/// Reverses the `nbits` low-order bits of `x`.
///
/// Aborts if `x` does not fit on `nbits` bits in debug mode.
pub fn bit_reverse(x: usize, nbits: usize) -> usize {
    debug_assert!(nbits < usize::BITS as usize);
    debug_assert!(x >> nbits == 0);
    x.reverse_bits() >> (usize::BITS as usize - nbits)
}

/// Applies the bit-reversal permutation of size `n` (a power of two) to the
/// slice in place.
pub fn bit_reverse_in_place<T>(slice: &mut [T], n: usize) {
    debug_assert!(n.is_power_of_two());
    debug_assert!(slice.len() >= n);
    let nbits = ilog2(n as u64);
    for i in 0..n {
        let j = bit_reverse(i, nbits);
        if i < j {
            slice.swap(i, j);
        }
    }
}

/// Transcodes a vector of u64 into little-endian bytes, 8 bytes per word.
pub fn words_to_bytes(a: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() * 8);
    for ai in a {
        out.extend_from_slice(&ai.to_le_bytes());
    }
    out
}

/// Transcodes little-endian bytes into a vector of u64, 8 bytes per word.
/// Returns `None` when the length is not a multiple of 8.
pub fn bytes_to_words(b: &[u8]) -> Option<Vec<u64>> {
    if b.len() % 8 != 0 {
        return None;
    }
    Some(
        b.chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[test]
    fn prime() {
        assert!(is_prime(2));
        assert!(is_prime(3));
        assert!(is_prime(5));
        assert!(is_prime(0x3ee0001));
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(!is_prime(4));
        assert!(!is_prime(0x3ee0000));
    }

    #[test]
    fn inv() {
        assert_eq!(inverse(2, 11), Some(6));
        assert_eq!(inverse(0, 11), None);
        assert_eq!(inverse(4, 8), None);
    }

    #[test]
    fn log2() {
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(2), 1);
        assert_eq!(ilog2(3), 1);
        assert_eq!(ilog2(1 << 16), 16);
    }

    #[test]
    fn bitrev() {
        assert_eq!(bit_reverse(0b0001, 4), 0b1000);
        assert_eq!(bit_reverse(0b0110, 4), 0b0110);
        let mut v = (0..8usize).collect::<Vec<_>>();
        bit_reverse_in_place(&mut v, 8);
        assert_eq!(v, vec![0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn transcode_roundtrip() {
        let mut rng = rand::rng();
        let a = (0..16).map(|_| rng.next_u64()).collect::<Vec<_>>();
        let b = words_to_bytes(&a);
        assert_eq!(b.len(), 128);
        assert_eq!(bytes_to_words(&b), Some(a));
        assert_eq!(bytes_to_words(&b[1..]), None);
    }
}
