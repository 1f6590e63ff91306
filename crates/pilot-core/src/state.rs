use serde::{Deserialize, Serialize};

use crate::{InputError, Vector2};

/// Kinematic state of the vehicle in its local frame.
///
/// Generic over the scalar so the vehicle model can run on plain values and on dual
/// numbers alike.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState<T = f64> {
    /// Position along the local x axis \[m]
    pub x: T,
    /// Position along the local y axis \[m]
    pub y: T,
    /// Heading \[rad]
    pub psi: T,
    /// Speed \[m/s]
    pub v: T,
    /// Cross-track error \[m]
    pub cte: T,
    /// Heading error \[rad]
    pub epsi: T,
}

impl<T: Copy> VehicleState<T> {
    pub fn from_array(values: [T; 6]) -> Self {
        let [x, y, psi, v, cte, epsi] = values;
        Self {
            x,
            y,
            psi,
            v,
            cte,
            epsi,
        }
    }

    /// Components in decision-vector order: x, y, psi, v, cte, epsi.
    pub fn to_array(&self) -> [T; 6] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> VehicleState<U> {
        VehicleState::from_array(self.to_array().map(f))
    }
}

impl VehicleState {
    pub fn new(x: f64, y: f64, psi: f64, v: f64, cte: f64, epsi: f64) -> Self {
        Self::from_array([x, y, psi, v, cte, epsi])
    }

    /// Build a state from `[x, y, psi, v, cte, epsi]`.
    pub fn from_slice(values: &[f64]) -> Result<Self, InputError> {
        let values: [f64; 6] = values
            .try_into()
            .map_err(|_| InputError::StateLength(values.len()))?;
        let state = Self::from_array(values);
        if !state.is_finite() {
            return Err(InputError::NonFinite("vehicle state"));
        }
        Ok(state)
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    pub fn position(&self) -> Vector2 {
        Vector2::new(self.x, self.y)
    }
}
