//! Scaling of polynomials between contexts.

use super::{Context, Poly, Representation};
use crate::rns::{RnsScaler, ScalingFactor};
use crate::{Error, Result};
use std::sync::Arc;

/// Scaler that computes the rounded scaling of the coefficients of a
/// polynomial from one context into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaler {
    from: Arc<Context>,
    to: Arc<Context>,
    scaler: RnsScaler,
}

impl Scaler {
    /// Create a scaler from a context `from` to a context `to` with the
    /// given scaling factor.
    ///
    /// Returns an error when the underlying polynomial degrees differ.
    pub fn new(from: &Arc<Context>, to: &Arc<Context>, factor: ScalingFactor) -> Result<Self> {
        if from.degree != to.degree {
            return Err(Error::Default(
                "Incompatible degrees in the polynomial contexts".to_string(),
            ));
        }
        Ok(Self {
            from: from.clone(),
            to: to.clone(),
            scaler: RnsScaler::new(&from.rns, &to.rns, factor),
        })
    }

    /// The source context.
    pub fn from_context(&self) -> &Arc<Context> {
        &self.from
    }

    /// The destination context.
    pub fn to_context(&self) -> &Arc<Context> {
        &self.to
    }

    pub(crate) fn scale_poly(&self, p: &Poly) -> Result<Poly> {
        if p.ctx != self.from {
            return Err(Error::InvalidContext);
        }
        if p.representation != Representation::PowerBasis {
            return Err(Error::IncorrectRepresentation(
                p.representation,
                Representation::PowerBasis,
            ));
        }
        let mut out = Poly::zero(&self.to, Representation::PowerBasis);
        for j in 0..self.from.degree {
            let rests = self.scaler.scale(p.coefficients.column(j));
            for (i, r) in rests.into_iter().enumerate() {
                out.coefficients[[i, j]] = r;
            }
        }
        Ok(out)
    }
}
