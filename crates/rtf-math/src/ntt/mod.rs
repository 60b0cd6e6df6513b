#![warn(missing_docs, unused_imports)]

//! Number-Theoretic Transform in Z_p\[x\]/(x^N + 1).

use crate::zq::Modulus;
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::iter::successors;

/// Returns whether a modulus p supports the Number Theoretic Transform of
/// size n, i.e. p ≡ 1 (mod 2n).
pub fn supports_ntt(p: u64, n: usize) -> bool {
    n.is_power_of_two() && p % ((n as u64) << 1) == 1
}

/// Number-Theoretic Transform operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NttOperator {
    p: Modulus,
    p_twice: u64,
    size: usize,
    omegas: Box<[u64]>,
    omegas_shoup: Box<[u64]>,
    zetas_inv: Box<[u64]>,
    zetas_inv_shoup: Box<[u64]>,
    size_inv: u64,
    size_inv_shoup: u64,
}

impl NttOperator {
    /// Create an NTT operator given a modulus for a specific size.
    ///
    /// Returns None if the modulus does not support the NTT for this specific
    /// size.
    #[must_use]
    pub fn new(p: &Modulus, size: usize) -> Option<Self> {
        if !supports_ntt(p.modulus(), size) {
            None
        } else {
            let size_inv = p.inv(size as u64)?;

            let omega = Self::primitive_root(size, p);
            let omega_inv = p.inv(omega)?;

            let powers = successors(Some(1u64), |n| Some(p.mul(*n, omega)))
                .take(size)
                .collect_vec();
            let powers_inv = successors(Some(omega_inv), |n| Some(p.mul(*n, omega_inv)))
                .take(size)
                .collect_vec();

            let (omegas, zetas_inv): (Vec<u64>, Vec<u64>) = (0..size)
                .map(|i| {
                    let j = i.reverse_bits() >> (size.leading_zeros() + 1);
                    (powers[j], powers_inv[j])
                })
                .unzip();

            let omegas_shoup = p.shoup_vec(&omegas);
            let zetas_inv_shoup = p.shoup_vec(&zetas_inv);

            Some(Self {
                p: p.clone(),
                p_twice: p.modulus() * 2,
                size,
                omegas: omegas.into_boxed_slice(),
                omegas_shoup: omegas_shoup.into_boxed_slice(),
                zetas_inv: zetas_inv.into_boxed_slice(),
                zetas_inv_shoup: zetas_inv_shoup.into_boxed_slice(),
                size_inv,
                size_inv_shoup: p.shoup(size_inv),
            })
        }
    }

    /// Compute the forward NTT in place.
    /// Aborts if a is not of the size handled by the operator.
    pub fn forward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.size);

        let mut l = self.size >> 1;
        let mut k = 1;
        while l > 0 {
            for chunk in a.chunks_exact_mut(2 * l) {
                let omega = self.omegas[k];
                let omega_shoup = self.omegas_shoup[k];
                k += 1;

                let (left, right) = chunk.split_at_mut(l);
                if l == 1 {
                    // The last level should reduce the output
                    self.butterfly(&mut left[0], &mut right[0], omega, omega_shoup);
                    left[0] = self.reduce3(left[0]);
                    right[0] = self.reduce3(right[0]);
                } else {
                    for (x, y) in left.iter_mut().zip(right.iter_mut()) {
                        self.butterfly(x, y, omega, omega_shoup);
                    }
                }
            }
            l >>= 1;
        }
    }

    /// Compute the backward NTT in place.
    /// Aborts if a is not of the size handled by the operator.
    pub fn backward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.size);

        let mut k = 0;
        let mut l = 1;

        while l < self.size {
            for chunk in a.chunks_exact_mut(2 * l) {
                let zeta_inv = self.zetas_inv[k];
                let zeta_inv_shoup = self.zetas_inv_shoup[k];
                k += 1;

                let (left, right) = chunk.split_at_mut(l);
                if l == 1 {
                    self.inv_butterfly(&mut left[0], &mut right[0], zeta_inv, zeta_inv_shoup);
                } else {
                    for (x, y) in left.iter_mut().zip(right.iter_mut()) {
                        self.inv_butterfly(x, y, zeta_inv, zeta_inv_shoup);
                    }
                }
            }
            l <<= 1;
        }

        a.iter_mut()
            .for_each(|ai| *ai = self.p.mul_shoup(*ai, self.size_inv, self.size_inv_shoup));
    }

    /// Reduce a modulo p.
    ///
    /// Aborts if a >= 4 * p.
    const fn reduce3(&self, a: u64) -> u64 {
        debug_assert!(a < 4 * self.p.modulus());

        let y = Modulus::reduce1(a, self.p_twice);
        Modulus::reduce1(y, self.p.modulus())
    }

    /// NTT Butterfly.
    fn butterfly(&self, x: &mut u64, y: &mut u64, w: u64, w_shoup: u64) {
        debug_assert!(*x < 4 * self.p.modulus());
        debug_assert!(*y < 4 * self.p.modulus());
        debug_assert!(w < self.p.modulus());
        debug_assert_eq!(self.p.shoup(w), w_shoup);

        *x = Modulus::reduce1(*x, self.p_twice);
        let t = self.p.lazy_mul_shoup(*y, w, w_shoup);
        *y = *x + self.p_twice - t;
        *x += t;

        debug_assert!(*x < 4 * self.p.modulus());
        debug_assert!(*y < 4 * self.p.modulus());
    }

    /// Inverse NTT butterfly.
    fn inv_butterfly(&self, x: &mut u64, y: &mut u64, z: u64, z_shoup: u64) {
        debug_assert!(*x < self.p_twice);
        debug_assert!(*y < self.p_twice);
        debug_assert!(z < self.p.modulus());
        debug_assert_eq!(self.p.shoup(z), z_shoup);

        let t = *x;
        *x = Modulus::reduce1(*y + t, self.p_twice);
        *y = self.p.lazy_mul_shoup(self.p_twice + t - *y, z, z_shoup);

        debug_assert!(*x < self.p_twice);
        debug_assert!(*y < self.p_twice);
    }

    /// Returns a 2n-th primitive root modulo p.
    ///
    /// Aborts if p does not support the NTT of size n in debug mode.
    fn primitive_root(n: usize, p: &Modulus) -> u64 {
        debug_assert!(supports_ntt(p.modulus(), n));

        let lambda = (p.modulus() - 1) / (2 * n as u64);

        let mut rng: ChaCha8Rng = SeedableRng::seed_from_u64(0);
        for _ in 0..100 {
            let mut root = rng.random_range(0..p.modulus());
            root = p.pow(root, lambda);
            if Self::is_primitive_root(root, 2 * n, p) {
                return root;
            }
        }

        debug_assert!(false, "Couldn't find primitive root");
        0
    }

    /// Returns whether a is a n-th primitive root of unity.
    ///
    /// Aborts if a >= p in debug mode.
    fn is_primitive_root(a: u64, n: usize, p: &Modulus) -> bool {
        debug_assert!(a < p.modulus());

        // A primitive root of unity is such that x^n = 1 mod p, and
        // x^(n/2) != 1 mod p.
        (p.pow(a, n as u64) == 1) && (p.pow(a, (n / 2) as u64) != 1)
    }
}

#[cfg(test)]
mod tests {
    use super::{supports_ntt, NttOperator};
    use crate::zq::Modulus;
    use rand::rng;

    #[test]
    fn support() {
        assert!(supports_ntt(4611686018326724609, 8));
        assert!(supports_ntt(4611686018326724609, 1 << 16));
        assert!(!supports_ntt(4611686018326724610, 8));
        assert!(supports_ntt(1153, 8));
        assert!(!supports_ntt(1153, 128));
    }

    #[test]
    fn construct() {
        for p in [1153u64, 4611686018326724609] {
            let q = Modulus::new(p).unwrap();
            assert!(NttOperator::new(&q, 8).is_some());
        }
        let q = Modulus::new(1153).unwrap();
        assert!(NttOperator::new(&q, 128).is_none());
    }

    #[test]
    fn forward_backward() {
        let mut rng = rng();
        for size in [8usize, 1024] {
            for p in [4611686018326724609u64] {
                let q = Modulus::new(p).unwrap();
                let op = NttOperator::new(&q, size).unwrap();

                for _ in 0..20 {
                    let a = q.random_vec(size, &mut rng);
                    let mut b = a.clone();
                    op.forward(&mut b);
                    assert_ne!(a, b);
                    op.backward(&mut b);
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn linearity() {
        let mut rng = rng();
        let q = Modulus::new(4611686018326724609).unwrap();
        let op = NttOperator::new(&q, 256).unwrap();

        for _ in 0..20 {
            let a = q.random_vec(256, &mut rng);
            let b = q.random_vec(256, &mut rng);

            let mut a_plus_b = a.clone();
            q.add_vec(&mut a_plus_b, &b);
            op.forward(&mut a_plus_b);

            let mut a_ntt = a.clone();
            let mut b_ntt = b.clone();
            op.forward(&mut a_ntt);
            op.forward(&mut b_ntt);
            q.add_vec(&mut a_ntt, &b_ntt);

            assert_eq!(a_plus_b, a_ntt);
        }
    }
}
