use anyhow::{Context, Result};
use pilot_controller::{MpcController, SolveError};
use pilot_core::{Command, MpcSettings};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SolveOutput {
    status: String,
    command: Command,
    /// Flat `[steering, acceleration, x1, y1, ...]`
    values: Vec<f64>,
}

pub fn run(settings: MpcSettings, state: &[f64], coeffs: &[f64]) -> Result<()> {
    let mut controller = MpcController::new(settings).context("Invalid settings")?;

    let (status, command) = match controller.solve_raw(state, coeffs) {
        Ok(command) => ("success".to_string(), command),
        Err(SolveError::NotConverged { status, fallback }) => {
            tracing::warn!("Solve did not converge ({}), printing fallback", status);
            (status.to_string(), fallback)
        }
        Err(err @ SolveError::InvalidInput(_)) => return Err(err.into()),
    };
    if let Some(solution) = controller.last_solution() {
        tracing::info!(
            objective = solution.objective,
            outer = solution.outer_iterations,
            inner = solution.inner_iterations,
            "Solved in {:.1} ms",
            solution.solve_time.as_secs_f64() * 1e3
        );
    }

    let output = SolveOutput {
        status,
        values: command.to_vec(),
        command,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
