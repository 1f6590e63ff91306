use anyhow::{anyhow, ensure, Result};
use nalgebra::{DMatrix, DVector, Rotation2};
use pilot_core::Vector2;

/// Least-squares polynomial through `points`, coefficients in ascending order of power.
pub fn fit_polynomial(points: &[Vector2], degree: usize) -> Result<Vec<f64>> {
    ensure!(
        points.len() > degree,
        "need more than {degree} points to fit a degree {degree} polynomial, got {}",
        points.len()
    );
    let vandermonde =
        DMatrix::from_fn(points.len(), degree + 1, |i, j| points[i].x.powi(j as i32));
    let ys = DVector::from_iterator(points.len(), points.iter().map(|p| p.y));
    let coeffs = vandermonde
        .svd(true, true)
        .solve(&ys, 1e-12)
        .map_err(|err| anyhow!("polynomial fit failed: {err}"))?;
    Ok(coeffs.iter().copied().collect())
}

/// Express a world-frame `point` in the frame of a vehicle at `position` with heading
/// `psi`.
pub fn to_vehicle_frame(position: Vector2, psi: f64, point: Vector2) -> Vector2 {
    Rotation2::new(-psi) * (point - position)
}
