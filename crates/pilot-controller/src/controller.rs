use pilot_core::{
    Command, CommandKind, InputError, MpcSettings, ReferencePolynomial, SettingsError,
    Vector2, VehicleState, WarmStart,
};
use pilot_solver::{AlmBackend, CancelToken, Optimizer, SolveStatus, Solution, SolverAdapter};

use crate::{SolveError, TrackingProblem, Var, VehicleModel};

/// Receding-horizon controller.
///
/// Every cycle builds a fresh [`TrackingProblem`] from the measured state, solves its
/// condensed form over the actuations and returns the first actuation. When a solve fails, the command is chosen by the
/// fallback policy: the last command is held for `fallback.hold_cycles` cycles, after
/// which the controller brakes with the last steering angle.
pub struct MpcController<B = AlmBackend> {
    settings: MpcSettings,
    model: VehicleModel,
    adapter: SolverAdapter<B>,
    last_command: Option<Command>,
    last_solution: Option<Solution>,
    last_actuations: Option<Vec<f64>>,
    consecutive_failures: usize,
}

impl MpcController<AlmBackend> {
    pub fn new(settings: MpcSettings) -> Result<Self, SettingsError> {
        Self::with_backend(settings, AlmBackend)
    }
}

impl<B: Optimizer> MpcController<B> {
    pub fn with_backend(settings: MpcSettings, backend: B) -> Result<Self, SettingsError> {
        settings.validate()?;
        tracing::debug!(
            horizon = settings.horizon,
            dt = settings.dt,
            "Creating MPC controller"
        );
        Ok(Self {
            model: VehicleModel::from_settings(&settings),
            adapter: SolverAdapter::new(backend, settings.solver.clone()),
            settings,
            last_command: None,
            last_solution: None,
            last_actuations: None,
            consecutive_failures: 0,
        })
    }

    pub fn settings(&self) -> &MpcSettings {
        &self.settings
    }

    /// Command applied in the previous cycle, optimal or not.
    pub fn last_command(&self) -> Option<&Command> {
        self.last_command.as_ref()
    }

    /// Optimizer output of the previous cycle, with `x` the full decision vector.
    pub fn last_solution(&self) -> Option<&Solution> {
        self.last_solution.as_ref()
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Forget the previous command and failure count.
    pub fn reset(&mut self) {
        self.last_command = None;
        self.last_solution = None;
        self.last_actuations = None;
        self.consecutive_failures = 0;
    }

    pub fn solve(
        &mut self,
        state: &VehicleState,
        reference: &ReferencePolynomial,
    ) -> Result<Command, SolveError> {
        self.solve_with_cancel(state, reference, &CancelToken::new())
    }

    /// Solve from a flat state `[x, y, psi, v, cte, epsi]` and reference coefficients in
    /// ascending order of power.
    pub fn solve_raw(&mut self, state: &[f64], coeffs: &[f64]) -> Result<Command, SolveError> {
        let state = VehicleState::from_slice(state)?;
        let reference = ReferencePolynomial::try_from_coeffs(coeffs)?;
        self.solve(&state, &reference)
    }

    /// Like [`MpcController::solve`], but the solve stops early once `cancel` is
    /// triggered. A cancelled solve returns [`SolveStatus::Cancelled`] and does not count
    /// as a failure.
    pub fn solve_with_cancel(
        &mut self,
        state: &VehicleState,
        reference: &ReferencePolynomial,
        cancel: &CancelToken,
    ) -> Result<Command, SolveError> {
        if !state.is_finite() {
            return Err(InputError::NonFinite("vehicle state").into());
        }
        if reference.coeffs().iter().any(|c| !c.is_finite()) {
            return Err(InputError::NonFinite("reference coefficients").into());
        }

        let state = self.compensate_latency(state, reference);
        let problem = TrackingProblem::new(&self.settings, state, *reference);
        let condensed = problem.condensed();
        let nlp = match condensed.to_nlp(self.initial_actuations(&problem)) {
            Ok(nlp) => nlp,
            Err(err) => {
                tracing::error!("Failed to build the tracking problem: {}", err);
                return Err(self.fail(SolveStatus::NumericalError));
            }
        };

        let solution = expand_solution(&problem, self.adapter.solve(&nlp, cancel));
        let status = solution.status;
        let result = if status.is_success() {
            let command = self.extract_command(&problem, &solution);
            self.consecutive_failures = 0;
            self.last_command = Some(command.clone());
            let actuations = &solution.x[problem.layout().start(Var::Delta)..];
            self.last_actuations = Some(actuations.to_vec());
            Ok(command)
        } else if status == SolveStatus::Cancelled {
            Err(SolveError::NotConverged {
                status,
                fallback: self.fallback_command(self.consecutive_failures + 1),
            })
        } else {
            Err(self.fail(status))
        };
        self.last_solution = Some(solution);
        result
    }

    /// Starting actuation sequence for the configured warm start.
    fn initial_actuations(&self, problem: &TrackingProblem) -> Vec<f64> {
        let len = problem.num_actuations();
        match (self.settings.warm_start, &self.last_actuations) {
            (WarmStart::Shifted, Some(previous)) if previous.len() == len => {
                let steps = len / 2;
                previous
                    .chunks(steps)
                    .flat_map(|block| block.iter().skip(1).chain(block.last()))
                    .copied()
                    .collect()
            }
            _ => vec![0.0; len],
        }
    }

    /// Predict the measured state forward by the configured latency, with the command
    /// that is still being applied.
    fn compensate_latency(
        &self,
        state: &VehicleState,
        reference: &ReferencePolynomial,
    ) -> VehicleState {
        if self.settings.latency <= 0.0 {
            return *state;
        }
        let (delta, a) = self
            .last_command
            .as_ref()
            .map_or((0.0, 0.0), |c| (c.steering, c.acceleration));
        self.model
            .predict_forward(state, delta, a, reference, self.settings.latency)
    }

    fn extract_command(&self, problem: &TrackingProblem, solution: &Solution) -> Command {
        let layout = problem.layout();
        let x = &solution.x;
        let max_steering = self.settings.max_steering();
        let max_acceleration = self.settings.max_acceleration;

        Command {
            steering: x[layout.index(Var::Delta, 0)].clamp(-max_steering, max_steering),
            acceleration: x[layout.index(Var::A, 0)].clamp(-max_acceleration, max_acceleration),
            predicted: (1..layout.horizon())
                .map(|t| Vector2::new(x[layout.index(Var::X, t)], x[layout.index(Var::Y, t)]))
                .collect(),
            objective: Some(solution.objective),
            kind: CommandKind::Optimal,
        }
    }

    fn fail(&mut self, status: SolveStatus) -> SolveError {
        self.consecutive_failures += 1;
        let fallback = self.fallback_command(self.consecutive_failures);
        tracing::warn!(
            failures = self.consecutive_failures,
            "MPC solve failed ({}), applying {:?} command",
            status,
            fallback.kind
        );
        self.last_command = Some(fallback.clone());
        SolveError::NotConverged { status, fallback }
    }

    fn fallback_command(&self, failures: usize) -> Command {
        let fallback = &self.settings.fallback;
        match &self.last_command {
            Some(last) if failures <= fallback.hold_cycles && last.kind != CommandKind::Braking => {
                Command {
                    steering: last.steering,
                    acceleration: last.acceleration,
                    predicted: Vec::new(),
                    objective: None,
                    kind: CommandKind::Held,
                }
            }
            last => {
                let limit = self.settings.max_acceleration;
                Command {
                    steering: last.as_ref().map_or(0.0, |c| c.steering),
                    acceleration: fallback.brake_acceleration.clamp(-limit, limit),
                    predicted: Vec::new(),
                    objective: None,
                    kind: CommandKind::Braking,
                }
            }
        }
    }
}

/// Replace the actuations in `solution` with the full decision vector they induce, and
/// check the dynamics against the full problem.
fn expand_solution(problem: &TrackingProblem, mut solution: Solution) -> Solution {
    match problem.to_nlp(&solution.x) {
        Ok(full) => {
            solution.constraint_violation = full.constraint_violation(full.x0());
            solution.x = full.x0().to_vec();
        }
        Err(err) => {
            if solution.status.is_success() {
                tracing::warn!("Optimal actuations give an invalid trajectory: {}", err);
                solution.status = SolveStatus::NumericalError;
            }
            solution.x = problem.expand(&solution.x);
            solution.constraint_violation = f64::INFINITY;
        }
    }
    solution
}
