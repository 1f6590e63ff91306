use num_dual::DualNum;

/// Scalar the formulation is evaluated over: `f64` for values, dual numbers when the
/// solver needs derivatives.
pub trait Real: DualNum<f64> + Copy {}

impl<T: DualNum<f64> + Copy> Real for T {}

/// Lift an `f64` constant into `T`.
#[inline]
pub fn constant<T: Real>(value: f64) -> T {
    T::from(value)
}
