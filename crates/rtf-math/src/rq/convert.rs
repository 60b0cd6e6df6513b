//! Conversions of polynomials from and to other types.

use super::{traits::TryConvertFrom, Context, Poly, Representation};
use crate::{Error, Result};
use itertools::izip;
use ndarray::Array2;
use num_bigint::BigUint;
use std::sync::Arc;

impl TryConvertFrom<&[u64]> for Poly {
    /// Convert a slice of `degree` coefficients: the coefficients are reduced
    /// modulo each modulus of the context.
    fn try_convert_from(
        value: &[u64],
        ctx: &Arc<Context>,
        representation: Representation,
    ) -> Result<Self> {
        if value.len() != ctx.degree {
            return Err(Error::Default(
                "The slice size does not match the degree of the context".to_string(),
            ));
        }
        let mut out = Poly::zero(ctx, Representation::PowerBasis);
        izip!(out.coefficients.outer_iter_mut(), ctx.q.iter()).for_each(|(mut row, qi)| {
            izip!(row.iter_mut(), value.iter()).for_each(|(ri, vi)| *ri = qi.reduce(*vi))
        });
        if representation != Representation::PowerBasis {
            out.change_representation(representation);
        }
        Ok(out)
    }
}

impl TryConvertFrom<&[i64]> for Poly {
    /// Convert a slice of `degree` signed coefficients: the coefficients are
    /// reduced modulo each modulus of the context.
    fn try_convert_from(
        value: &[i64],
        ctx: &Arc<Context>,
        representation: Representation,
    ) -> Result<Self> {
        if value.len() != ctx.degree {
            return Err(Error::Default(
                "The slice size does not match the degree of the context".to_string(),
            ));
        }
        let mut out = Poly::zero(ctx, Representation::PowerBasis);
        izip!(out.coefficients.outer_iter_mut(), ctx.q.iter()).for_each(|(mut row, qi)| {
            row.as_slice_mut()
                .unwrap()
                .copy_from_slice(&qi.reduce_vec_i64(value))
        });
        if representation != Representation::PowerBasis {
            out.change_representation(representation);
        }
        Ok(out)
    }
}

impl TryConvertFrom<&[BigUint]> for Poly {
    /// Convert a slice of `degree` big integers: the coefficients are
    /// projected into the RNS basis of the context.
    fn try_convert_from(
        value: &[BigUint],
        ctx: &Arc<Context>,
        representation: Representation,
    ) -> Result<Self> {
        if value.len() != ctx.degree {
            return Err(Error::Default(
                "The slice size does not match the degree of the context".to_string(),
            ));
        }
        let mut out = Poly::zero(ctx, Representation::PowerBasis);
        for (j, vj) in value.iter().enumerate() {
            for (i, rest) in ctx.rns.project(vj).into_iter().enumerate() {
                out.coefficients[[i, j]] = rest;
            }
        }
        if representation != Representation::PowerBasis {
            out.change_representation(representation);
        }
        Ok(out)
    }
}

impl TryConvertFrom<Array2<u64>> for Poly {
    /// Convert a coefficient matrix of shape (moduli, degree); the residues
    /// must already be reduced.
    fn try_convert_from(
        value: Array2<u64>,
        ctx: &Arc<Context>,
        representation: Representation,
    ) -> Result<Self> {
        if value.shape() != [ctx.q.len(), ctx.degree] {
            return Err(Error::Default(
                "The matrix shape does not match the context".to_string(),
            ));
        }
        let mut out = Poly::zero(ctx, Representation::PowerBasis);
        out.coefficients = value;
        out.representation = representation;
        if representation == Representation::NttShoup {
            out.compute_coefficients_shoup();
        }
        Ok(out)
    }
}

impl From<&Poly> for Vec<BigUint> {
    /// Reconstruct the coefficients of the polynomial as big integers in
    /// [0, q). The polynomial must be in PowerBasis representation.
    fn from(p: &Poly) -> Self {
        debug_assert_eq!(p.representation, Representation::PowerBasis);
        (0..p.ctx.degree)
            .map(|j| p.ctx.rns.lift(p.coefficients.column(j)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Context, Poly, Representation};
    use super::TryConvertFrom;
    use num_bigint::BigUint;
    use std::{error::Error, sync::Arc};

    const MODULI: &[u64; 3] = &[1153, 4611686018326724609, 4611686018309947393];

    #[test]
    fn slice_u64() -> Result<(), Box<dyn Error>> {
        let ctx = Context::new_arc(MODULI, 8)?;
        let v = vec![1u64, 2, 3, 4, 5, 6, 7, 1200];
        let p = Poly::try_convert_from(&v as &[u64], &ctx, Representation::PowerBasis)?;
        // 1200 is reduced modulo 1153 on the first row.
        assert_eq!(p.coefficients()[[0, 7]], 47);
        assert_eq!(p.coefficients()[[1, 7]], 1200);

        assert!(
            Poly::try_convert_from(&v[..4] as &[u64], &ctx, Representation::PowerBasis).is_err()
        );
        Ok(())
    }

    #[test]
    fn slice_i64() -> Result<(), Box<dyn Error>> {
        let ctx = Context::new_arc(MODULI, 8)?;
        let v = vec![-1i64, 2, -3, 4, 5, 6, 7, 8];
        let p = Poly::try_convert_from(&v as &[i64], &ctx, Representation::PowerBasis)?;
        assert_eq!(p.coefficients()[[0, 0]], 1152);
        assert_eq!(p.coefficients()[[1, 0]], 4611686018326724608);
        Ok(())
    }

    #[test]
    fn biguint_roundtrip() -> Result<(), Box<dyn Error>> {
        let ctx = Context::new_arc(MODULI, 8)?;
        let v = (0..8u64)
            .map(|i| BigUint::from(i) * BigUint::from(u64::MAX))
            .collect::<Vec<_>>();
        let p = Poly::try_convert_from(&v as &[BigUint], &ctx, Representation::PowerBasis)?;
        let w = Vec::<BigUint>::from(&p);
        assert_eq!(v, w);
        Ok(())
    }
}
