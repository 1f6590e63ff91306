use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{OptionsError, SolverOptions};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("horizon must have at least 2 steps, got {0}")]
    InvalidHorizon(usize),
    #[error("{name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be non-negative and finite, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("max_steering_deg must be in (0, 90), got {0}")]
    InvalidSteeringBound(f64),
    #[error("{0} must be finite")]
    NotFinite(&'static str),
    #[error("invalid solver options: {0}")]
    Options(#[from] OptionsError),
    #[error("failed to access settings file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Weights of the tracking objective.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Weight on the squared cross-track error.
    pub cte: f64,
    /// Weight on the squared heading error.
    pub epsi: f64,
    /// Weight on the squared deviation from the reference speed.
    pub speed: f64,
    /// Weight on the squared steering angle.
    pub steering: f64,
    /// Weight on the squared acceleration.
    pub acceleration: f64,
    /// Weight on the squared change of steering between consecutive steps.
    pub steering_rate: f64,
    /// Weight on the squared change of acceleration between consecutive steps.
    pub acceleration_rate: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 2000.0,
            epsi: 2000.0,
            speed: 1.0,
            steering: 5.0,
            acceleration: 5.0,
            steering_rate: 200.0,
            acceleration_rate: 10.0,
        }
    }
}

impl CostWeights {
    fn validate(&self) -> Result<(), SettingsError> {
        let weights = [
            ("weights.cte", self.cte),
            ("weights.epsi", self.epsi),
            ("weights.speed", self.speed),
            ("weights.steering", self.steering),
            ("weights.acceleration", self.acceleration),
            ("weights.steering_rate", self.steering_rate),
            ("weights.acceleration_rate", self.acceleration_rate),
        ];
        for (name, value) in weights {
            non_negative(name, value)?;
        }
        Ok(())
    }
}

/// What the controller commands when a solve does not converge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Number of consecutive failed cycles during which the last command is held.
    pub hold_cycles: usize,
    /// Acceleration commanded once holding is exhausted. Clamped into the acceleration
    /// bounds.
    pub brake_acceleration: f64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            hold_cycles: 3,
            brake_acceleration: -1.0,
        }
    }
}

/// Initial guess for the actuation sequence. States are always rolled out from the
/// measured state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmStart {
    /// Zero steering and acceleration.
    #[default]
    Zero,
    /// The previous optimal sequence shifted by one step, last actuation repeated.
    Shifted,
}

/// Settings for the MPC controller. Fixed for the lifetime of a controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcSettings {
    /// Number of states in the horizon (N).
    pub horizon: usize,
    /// Time between horizon steps, in seconds.
    pub dt: f64,
    /// Distance between the front axle and the center of gravity, in meters.
    pub lf: f64,
    /// Steering bound in degrees, symmetric around zero.
    pub max_steering_deg: f64,
    /// Acceleration bound, symmetric around zero.
    pub max_acceleration: f64,
    /// Speed the controller tries to hold, in m/s.
    pub ref_v: f64,
    /// Actuation delay in seconds. When positive, the measured state is predicted
    /// forward by this amount with the last command before solving.
    pub latency: f64,
    pub warm_start: WarmStart,
    pub weights: CostWeights,
    pub fallback: FallbackSettings,
    pub solver: SolverOptions,
}

impl Default for MpcSettings {
    fn default() -> Self {
        Self {
            horizon: 10,
            dt: 0.1,
            lf: 2.67,
            max_steering_deg: 25.0,
            max_acceleration: 1.0,
            ref_v: 100.0,
            latency: 0.0,
            warm_start: WarmStart::Zero,
            weights: CostWeights::default(),
            fallback: FallbackSettings::default(),
            solver: SolverOptions::default(),
        }
    }
}

impl MpcSettings {
    /// Steering bound in radians.
    pub fn max_steering(&self) -> f64 {
        self.max_steering_deg.to_radians()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.horizon < 2 {
            return Err(SettingsError::InvalidHorizon(self.horizon));
        }
        positive("dt", self.dt)?;
        positive("lf", self.lf)?;
        positive("max_acceleration", self.max_acceleration)?;
        if !(self.max_steering_deg > 0.0 && self.max_steering_deg < 90.0) {
            return Err(SettingsError::InvalidSteeringBound(self.max_steering_deg));
        }
        if !self.ref_v.is_finite() {
            return Err(SettingsError::NotFinite("ref_v"));
        }
        non_negative("latency", self.latency)?;
        if !self.fallback.brake_acceleration.is_finite() {
            return Err(SettingsError::NotFinite("fallback.brake_acceleration"));
        }
        self.weights.validate()?;
        self.solver.validate()?;
        Ok(())
    }

    /// Load and validate settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let settings: Self = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load the settings from a file, or store the default settings if the file does not
    /// exist.
    pub fn load_or_insert(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        match Self::load(path.as_ref()) {
            Err(SettingsError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                let settings = Self::default();
                log::info!(
                    "Settings file {} not found, writing defaults",
                    path.as_ref().display()
                );
                settings.store(path)?;
                Ok(settings)
            }
            Err(err) => {
                log::error!(
                    "Failed to load settings from {}: {}",
                    path.as_ref().display(),
                    err
                );
                Err(err)
            }
            ok => ok,
        }
    }

    /// Store the settings in the given file.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SettingsError::Negative { name, value })
    }
}
