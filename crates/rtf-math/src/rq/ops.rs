//! Arithmetic operations on polynomials.

use super::{Poly, Representation};
use itertools::izip;
use num_bigint::BigUint;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

impl AddAssign<&Poly> for Poly {
    fn add_assign(&mut self, p: &Poly) {
        debug_assert_ne!(
            self.representation,
            Representation::NttShoup,
            "Cannot add to a polynomial in NttShoup representation"
        );
        debug_assert_eq!(self.representation, p.representation);
        debug_assert_eq!(self.ctx, p.ctx);
        izip!(
            self.coefficients.outer_iter_mut(),
            p.coefficients.outer_iter(),
            self.ctx.q.iter()
        )
        .for_each(|(mut v1, v2, qi)| {
            qi.add_vec(v1.as_slice_mut().unwrap(), v2.as_slice().unwrap())
        });
    }
}

impl Add<&Poly> for &Poly {
    type Output = Poly;
    fn add(self, p: &Poly) -> Poly {
        let mut q = self.clone();
        q += p;
        q
    }
}

impl SubAssign<&Poly> for Poly {
    fn sub_assign(&mut self, p: &Poly) {
        debug_assert_ne!(
            self.representation,
            Representation::NttShoup,
            "Cannot subtract from a polynomial in NttShoup representation"
        );
        debug_assert_eq!(self.representation, p.representation);
        debug_assert_eq!(self.ctx, p.ctx);
        izip!(
            self.coefficients.outer_iter_mut(),
            p.coefficients.outer_iter(),
            self.ctx.q.iter()
        )
        .for_each(|(mut v1, v2, qi)| {
            qi.sub_vec(v1.as_slice_mut().unwrap(), v2.as_slice().unwrap())
        });
    }
}

impl Sub<&Poly> for &Poly {
    type Output = Poly;
    fn sub(self, p: &Poly) -> Poly {
        let mut q = self.clone();
        q -= p;
        q
    }
}

impl MulAssign<&Poly> for Poly {
    fn mul_assign(&mut self, p: &Poly) {
        debug_assert_eq!(
            self.representation,
            Representation::Ntt,
            "Multiplication requires an Ntt representation"
        );
        debug_assert_eq!(self.ctx, p.ctx);

        match p.representation {
            Representation::Ntt => {
                izip!(
                    self.coefficients.outer_iter_mut(),
                    p.coefficients.outer_iter(),
                    self.ctx.q.iter()
                )
                .for_each(|(mut v1, v2, qi)| {
                    qi.mul_vec(v1.as_slice_mut().unwrap(), v2.as_slice().unwrap())
                });
            }
            Representation::NttShoup => {
                izip!(
                    self.coefficients.outer_iter_mut(),
                    p.coefficients.outer_iter(),
                    p.coefficients_shoup.as_ref().unwrap().outer_iter(),
                    self.ctx.q.iter()
                )
                .for_each(|(mut v1, v2, v2_shoup, qi)| {
                    qi.mul_shoup_vec(
                        v1.as_slice_mut().unwrap(),
                        v2.as_slice().unwrap(),
                        v2_shoup.as_slice().unwrap(),
                    )
                });
            }
            Representation::PowerBasis => {
                panic!("Cannot multiply by a polynomial in PowerBasis representation")
            }
        }
    }
}

impl Mul<&Poly> for &Poly {
    type Output = Poly;
    fn mul(self, p: &Poly) -> Poly {
        match self.representation {
            Representation::NttShoup => {
                // Commute to use the NttShoup coefficients of self.
                let mut q = p.clone();
                q *= self;
                q
            }
            _ => {
                let mut q = self.clone();
                q *= p;
                q
            }
        }
    }
}

impl Mul<&BigUint> for &Poly {
    type Output = Poly;
    /// Multiply by a scalar, projected in the RNS basis of the context.
    fn mul(self, s: &BigUint) -> Poly {
        let mut q = self.clone();
        if q.representation == Representation::NttShoup {
            q.change_representation(Representation::Ntt);
        }
        let rests = q.ctx.rns.project(s);
        izip!(q.coefficients.outer_iter_mut(), rests.iter(), q.ctx.q.iter()).for_each(
            |(mut v, r, qi)| qi.scalar_mul_vec(v.as_slice_mut().unwrap(), *r),
        );
        q
    }
}

impl Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        debug_assert_ne!(self.representation, Representation::NttShoup);
        let mut out = self.clone();
        izip!(out.coefficients.outer_iter_mut(), out.ctx.q.iter())
            .for_each(|(mut v1, qi)| qi.neg_vec(v1.as_slice_mut().unwrap()));
        out
    }
}

/// Computes the dot product between an iterator of polynomials and an
/// iterator of polynomials. Returns an error if the iterator counts are 0, or
/// if any of the polynomial is not in Ntt or NttShoup representation.
pub fn dot_product<'a, 'b, I, J>(p: I, q: J) -> crate::Result<Poly>
where
    I: Iterator<Item = &'a Poly> + Clone,
    J: Iterator<Item = &'b Poly> + Clone,
{
    let mut iter = izip!(p, q);
    if let Some((first_p, first_q)) = iter.next() {
        let mut out = first_p * first_q;
        for (pi, qi) in iter {
            out += &(pi * qi);
        }
        Ok(out)
    } else {
        Err(crate::Error::Default("Empty iterator".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Context, Poly, Representation};
    use super::dot_product;
    use rand::rng;
    use std::{error::Error, sync::Arc};

    const MODULI: &[u64; 3] = &[1153, 4611686018326724609, 4611686018309947393];

    #[test]
    fn add_sub_neg() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let ctx = Context::new_arc(MODULI, 8)?;
        for _ in 0..20 {
            let p = Poly::random(&ctx, Representation::PowerBasis, &mut rng);
            let q = Poly::random(&ctx, Representation::PowerBasis, &mut rng);

            let r = &p + &q;
            let s = &r - &q;
            assert_eq!(s, p);

            let t = &(-&p) + &p;
            assert!(t.coefficients().iter().all(|c| *c == 0));
        }
        Ok(())
    }

    #[test]
    fn mul_commutes_with_ntt() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let ctx = Context::new_arc(MODULI, 8)?;
        for _ in 0..20 {
            let mut p = Poly::random(&ctx, Representation::Ntt, &mut rng);
            let q = Poly::random(&ctx, Representation::Ntt, &mut rng);

            let mut q_shoup = q.clone();
            q_shoup.change_representation(Representation::NttShoup);

            let r = &p * &q;
            let r_shoup = &p * &q_shoup;
            assert_eq!(r, r_shoup);

            p *= &q;
            assert_eq!(p, r);
        }
        Ok(())
    }

    #[test]
    fn dot() -> Result<(), Box<dyn Error>> {
        let mut rng = rng();
        let ctx = Context::new_arc(MODULI, 8)?;
        let p = (0..4)
            .map(|_| Poly::random(&ctx, Representation::Ntt, &mut rng))
            .collect::<Vec<_>>();
        let q = (0..4)
            .map(|_| Poly::random(&ctx, Representation::Ntt, &mut rng))
            .collect::<Vec<_>>();

        let r = dot_product(p.iter(), q.iter())?;
        let mut expected = Poly::zero(&ctx, Representation::Ntt);
        for (pi, qi) in p.iter().zip(q.iter()) {
            expected += &(pi * qi);
        }
        assert_eq!(r, expected);

        assert!(dot_product(p[..0].iter(), q[..0].iter()).is_err());
        Ok(())
    }
}
