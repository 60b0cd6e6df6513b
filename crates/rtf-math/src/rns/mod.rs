#![warn(missing_docs, unused_imports)]

//! Residue-Number System operations.

use crate::{zq::Modulus, Error, Result};
use itertools::izip;
use num_bigint::BigUint;
use num_bigint_dig::{BigInt as BigIntDig, BigUint as BigUintDig, ExtendedGcd, ModInverse};
use num_traits::{cast::ToPrimitive, One, Zero};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

/// Context for a Residue Number System.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct RnsContext {
    moduli_u64: Vec<u64>,
    moduli: Vec<Modulus>,
    q_star: Vec<BigUint>,
    garner: Vec<BigUint>,
    product: BigUint,
}

impl Debug for RnsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RnsContext")
            .field("moduli_u64", &self.moduli_u64)
            .field("product", &self.product)
            .finish()
    }
}

impl RnsContext {
    /// Create a RNS context from a list of moduli.
    ///
    /// Returns an error if the list is empty, or if the moduli are not
    /// coprime.
    pub fn new(moduli_u64: &[u64]) -> Result<Self> {
        if moduli_u64.is_empty() {
            return Err(Error::Default("The list of moduli is empty".to_string()));
        }

        let mut product = BigUint::one();
        for i in 0..moduli_u64.len() {
            for j in 0..moduli_u64.len() {
                if i != j {
                    let (d, _, _) = BigUintDig::from(moduli_u64[i])
                        .extended_gcd(&BigUintDig::from(moduli_u64[j]));
                    if d.cmp(&BigIntDig::from(1)) != Ordering::Equal {
                        return Err(Error::Default("The moduli are not coprime".to_string()));
                    }
                }
            }
            product *= moduli_u64[i];
        }

        let product_dig = moduli_u64
            .iter()
            .fold(BigUintDig::one(), |acc, m| acc * BigUintDig::from(*m));

        let mut moduli = Vec::with_capacity(moduli_u64.len());
        let mut q_star = Vec::with_capacity(moduli_u64.len());
        let mut garner = Vec::with_capacity(moduli_u64.len());
        for modulus in moduli_u64 {
            let m = Modulus::new(*modulus)?;
            let q_star_i = &product / modulus;
            let q_tilde_i = (&product_dig / modulus)
                .mod_inverse(&BigUintDig::from(*modulus))
                .unwrap()
                .to_u64()
                .unwrap();
            garner.push(&q_star_i * q_tilde_i);
            q_star.push(q_star_i);
            moduli.push(m);
        }

        Ok(Self {
            moduli_u64: moduli_u64.to_owned(),
            moduli,
            q_star,
            garner,
            product,
        })
    }

    /// Returns the product of the moduli used when creating the RNS context.
    #[must_use]
    pub const fn modulus(&self) -> &BigUint {
        &self.product
    }

    /// Returns the moduli of the RNS context.
    #[must_use]
    pub fn moduli(&self) -> &[u64] {
        &self.moduli_u64
    }

    /// Project a BigUint into its rests.
    #[must_use]
    pub fn project(&self, a: &BigUint) -> Vec<u64> {
        self.moduli_u64
            .iter()
            .map(|modulus| (a % modulus).to_u64().unwrap())
            .collect()
    }

    /// Lift rests into a BigUint.
    ///
    /// Aborts if the number of rests is different than the number of moduli in
    /// debug mode.
    #[must_use]
    pub fn lift<'a, I>(&self, rests: I) -> BigUint
    where
        I: IntoIterator<Item = &'a u64>,
    {
        let mut result = BigUint::zero();
        izip!(rests, self.garner.iter()).for_each(|(r_i, garner_i)| result += garner_i * *r_i);
        result % &self.product
    }

    /// Getter for the i-th garner coefficient.
    #[must_use]
    pub fn get_garner(&self, i: usize) -> Option<&BigUint> {
        self.garner.get(i)
    }
}

/// Scaling factor when performing a RNS scaling.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ScalingFactor {
    numerator: BigUint,
    denominator: BigUint,
    is_one: bool,
}

impl ScalingFactor {
    /// Create a new scaling factor. Aborts if the denominator is 0.
    pub fn new(numerator: &BigUint, denominator: &BigUint) -> Self {
        assert_ne!(denominator, &BigUint::zero());
        Self {
            numerator: numerator.clone(),
            denominator: denominator.clone(),
            is_one: numerator == denominator,
        }
    }

    /// Returns the identity element of `Self`.
    pub fn one() -> Self {
        Self {
            numerator: BigUint::one(),
            denominator: BigUint::one(),
            is_one: true,
        }
    }
}

/// Scaler in RNS basis: computes round(x * numerator / denominator) between
/// two RNS bases, where x is interpreted centered around 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnsScaler {
    from: Arc<RnsContext>,
    to: Arc<RnsContext>,
    factor: ScalingFactor,
    from_half: BigUint,
}

impl RnsScaler {
    /// Create a RNS scaler by numerator / denominator from one context to
    /// another.
    pub fn new(from: &Arc<RnsContext>, to: &Arc<RnsContext>, factor: ScalingFactor) -> Self {
        Self {
            from: from.clone(),
            to: to.clone(),
            factor,
            from_half: from.modulus() >> 1,
        }
    }

    /// Returns the source context.
    pub fn from_context(&self) -> &Arc<RnsContext> {
        &self.from
    }

    /// Returns the destination context.
    pub fn to_context(&self) -> &Arc<RnsContext> {
        &self.to
    }

    /// Output the RNS representation in the destination context of the rests
    /// scaled by numerator / denominator, rounded to the nearest integer.
    ///
    /// The input is interpreted as a centered representative in
    /// (-q/2, q/2]; the (negative) output is mapped back into the destination
    /// context.
    ///
    /// Aborts if the number of rests differs from the number of moduli of the
    /// source context in debug mode.
    pub fn scale<'a, I>(&self, rests: I) -> Vec<u64>
    where
        I: IntoIterator<Item = &'a u64>,
    {
        let x = self.from.lift(rests);
        let negative = x > self.from_half;

        let magnitude = if negative {
            self.from.modulus() - &x
        } else {
            x
        };

        let scaled = if self.factor.is_one {
            magnitude
        } else {
            (&magnitude * &self.factor.numerator + (&self.factor.denominator >> 1))
                / &self.factor.denominator
        };

        if negative {
            let reduced = &scaled % self.to.modulus();
            if reduced.is_zero() {
                vec![0u64; self.to.moduli_u64.len()]
            } else {
                self.to.project(&(self.to.modulus() - reduced))
            }
        } else {
            self.to.project(&scaled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RnsContext, RnsScaler, ScalingFactor};
    use num_bigint::BigUint;
    use rand::RngCore;
    use std::error::Error;
    use std::sync::Arc;

    #[test]
    fn constructor() {
        assert!(RnsContext::new(&[2]).is_ok());
        assert!(RnsContext::new(&[2, 3]).is_ok());
        assert!(RnsContext::new(&[4, 15, 1153]).is_ok());

        let e = RnsContext::new(&[]);
        assert!(e.is_err());
        assert_eq!(e.unwrap_err().to_string(), "The list of moduli is empty");
        let e = RnsContext::new(&[2, 4]);
        assert!(e.is_err());
        assert_eq!(e.unwrap_err().to_string(), "The moduli are not coprime");
    }

    #[test]
    fn garner() -> Result<(), Box<dyn Error>> {
        let rns = RnsContext::new(&[4, 15, 1153])?;

        for i in 0..3 {
            let gi = rns.get_garner(i);
            assert!(gi.is_some());
            // garner_i = 1 mod q_i and 0 mod q_j for j != i.
            for (j, qj) in rns.moduli().iter().enumerate() {
                let expected = if i == j { 1u64 } else { 0 };
                assert_eq!(gi.unwrap() % qj, BigUint::from(expected));
            }
        }
        assert!(rns.get_garner(3).is_none());

        Ok(())
    }

    #[test]
    fn project_lift() -> Result<(), Box<dyn Error>> {
        let ntests = 100;
        let rns = RnsContext::new(&[4, 15, 1153])?;
        let product = 4u64 * 15 * 1153;

        let mut rests = rns.project(&BigUint::from(0u64));
        assert_eq!(&rests, &[0u64, 0, 0]);
        assert_eq!(rns.lift(&rests), BigUint::from(0u64));

        rests = rns.project(&BigUint::from(4u64));
        assert_eq!(&rests, &[0u64, 4, 4]);
        assert_eq!(rns.lift(&rests), BigUint::from(4u64));

        rests = rns.project(&BigUint::from(product - 1));
        assert_eq!(&rests, &[3u64, 14, 1152]);
        assert_eq!(rns.lift(&rests), BigUint::from(product - 1));

        let mut rng = rand::rng();
        for _ in 0..ntests {
            let b = BigUint::from(rng.next_u64() % product);
            rests = rns.project(&b);
            assert_eq!(rns.lift(&rests), b);
        }

        Ok(())
    }

    #[test]
    fn scale_same_context() -> Result<(), Box<dyn Error>> {
        let ntests = 100;
        let q = Arc::new(RnsContext::new(&[4u64, 4611686018326724609, 1153])?);
        let mut rng = rand::rng();

        for numerator in &[1u64, 2, 3, 100, 1000] {
            for denominator in &[1u64, 2, 3, 4, 100, 101, 1000, 1001] {
                let n = BigUint::from(*numerator);
                let d = BigUint::from(*denominator);
                let scaler = RnsScaler::new(&q, &q, ScalingFactor::new(&n, &d));

                for _ in 0..ntests {
                    let x = vec![
                        rng.next_u64() % q.moduli()[0],
                        rng.next_u64() % q.moduli()[1],
                        rng.next_u64() % q.moduli()[2],
                    ];
                    let mut x_lift = q.lift(&x);
                    let x_sign = x_lift > (q.modulus() >> 1);
                    if x_sign {
                        x_lift = q.modulus() - x_lift;
                    }

                    let z = scaler.scale(&x);
                    let mag = (&x_lift * &n + (&d >> 1)) / &d;
                    let expected = if x_sign {
                        let m = &mag % q.modulus();
                        if m == BigUint::from(0u64) {
                            m
                        } else {
                            q.modulus() - m
                        }
                    } else {
                        mag % q.modulus()
                    };
                    assert_eq!(z, q.project(&expected));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn scale_different_contexts() -> Result<(), Box<dyn Error>> {
        let q = Arc::new(RnsContext::new(&[4611686018326724609u64, 1153])?);
        let r = Arc::new(RnsContext::new(&[4611686018326724609u64, 1153, 4, 15])?);
        let mut rng = rand::rng();

        let scaler = RnsScaler::new(&q, &r, ScalingFactor::one());
        for _ in 0..100 {
            let x = vec![
                rng.next_u64() % q.moduli()[0],
                rng.next_u64() % q.moduli()[1],
            ];
            let mut x_lift = q.lift(&x);
            let x_sign = x_lift > (q.modulus() >> 1);
            if x_sign {
                x_lift = q.modulus() - x_lift;
            }

            let y = scaler.scale(&x);
            let expected = if x_sign {
                r.modulus() - (&x_lift % r.modulus())
            } else {
                x_lift
            };
            assert_eq!(y, r.project(&expected));
        }
        Ok(())
    }
}
