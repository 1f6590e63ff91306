use serde::{Deserialize, Serialize};

use crate::Vector2;

/// How a [`Command`] was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// First actuation of a converged solve.
    Optimal,
    /// The previous command, repeated because the current solve failed.
    Held,
    /// Safe deceleration after repeated solve failures.
    Braking,
}

/// Actuation emitted for one control cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Steering angle \[rad]
    pub steering: f64,
    /// Longitudinal acceleration command, in the normalized actuator range
    pub acceleration: f64,
    /// Predicted positions for horizon steps `1..N` in the vehicle frame. Only for
    /// display; never fed back into control.
    pub predicted: Vec<Vector2>,
    /// Objective value of the solve that produced this command
    pub objective: Option<f64>,
    pub kind: CommandKind,
}

impl Command {
    /// Whether the command comes from the fallback policy instead of a converged solve.
    pub fn is_degraded(&self) -> bool {
        self.kind != CommandKind::Optimal
    }

    /// Flat layout `[steering, acceleration, x1, y1, x2, y2, ...]`.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(2 + 2 * self.predicted.len());
        out.push(self.steering);
        out.push(self.acceleration);
        for p in &self.predicted {
            out.push(p.x);
            out.push(p.y);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_vec_layout() {
        let cmd = Command {
            steering: -0.1,
            acceleration: 0.5,
            predicted: vec![Vector2::new(1.0, 2.0), Vector2::new(3.0, 4.0)],
            objective: Some(12.0),
            kind: CommandKind::Optimal,
        };
        assert_eq!(cmd.to_vec(), vec![-0.1, 0.5, 1.0, 2.0, 3.0, 4.0]);
        assert!(!cmd.is_degraded());
    }

    #[test]
    fn test_serialize() {
        let cmd = Command {
            steering: 0.0,
            acceleration: 1.0,
            predicted: vec![Vector2::new(1.0, 0.0)],
            objective: None,
            kind: CommandKind::Braking,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
        assert!(json.contains("\"braking\""));
    }
}
