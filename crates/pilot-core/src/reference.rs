use serde::{Deserialize, Serialize};

use crate::{constant, InputError, Real};

/// Desired path `y = f(x)` in the vehicle's local frame.
///
/// The degree is explicit: callers holding a raw coefficient list go through
/// [`ReferencePolynomial::try_from_coeffs`], which rejects anything that is not a
/// quadratic or a cubic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolynomial {
    /// `c0 + c1*x + c2*x²`
    Quadratic([f64; 3]),
    /// `c0 + c1*x + c2*x² + c3*x³`
    Cubic([f64; 4]),
}

impl ReferencePolynomial {
    /// The line `y = 0`.
    pub fn straight() -> Self {
        ReferencePolynomial::Quadratic([0.0; 3])
    }

    pub fn try_from_coeffs(coeffs: &[f64]) -> Result<Self, InputError> {
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(InputError::NonFinite("reference coefficients"));
        }
        match coeffs {
            [c0, c1, c2] => Ok(ReferencePolynomial::Quadratic([*c0, *c1, *c2])),
            [c0, c1, c2, c3] => Ok(ReferencePolynomial::Cubic([*c0, *c1, *c2, *c3])),
            _ => Err(InputError::CoefficientCount(coeffs.len())),
        }
    }

    /// Coefficients in ascending order of power.
    pub fn coeffs(&self) -> &[f64] {
        match self {
            ReferencePolynomial::Quadratic(c) => c,
            ReferencePolynomial::Cubic(c) => c,
        }
    }

    pub fn degree(&self) -> usize {
        self.coeffs().len() - 1
    }

    /// `f(x)`
    pub fn value<T: Real>(&self, x: T) -> T {
        let coeffs = self.coeffs();
        let mut acc: T = constant(coeffs[coeffs.len() - 1]);
        for &c in coeffs.iter().rev().skip(1) {
            acc = acc * x + constant::<T>(c);
        }
        acc
    }

    /// `f'(x)`
    pub fn slope<T: Real>(&self, x: T) -> T {
        let coeffs = self.coeffs();
        let n = coeffs.len() - 1;
        let mut acc: T = constant(n as f64 * coeffs[n]);
        for power in (1..n).rev() {
            acc = acc * x + constant::<T>(power as f64 * coeffs[power]);
        }
        acc
    }

    /// Desired heading `atan(f'(x))`.
    pub fn heading<T: Real>(&self, x: T) -> T {
        self.slope(x).atan()
    }
}

impl TryFrom<&[f64]> for ReferencePolynomial {
    type Error = InputError;

    fn try_from(coeffs: &[f64]) -> Result<Self, Self::Error> {
        Self::try_from_coeffs(coeffs)
    }
}
