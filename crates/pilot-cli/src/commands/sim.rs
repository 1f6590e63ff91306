use anyhow::{Context, Result};
use pilot_controller::{MpcController, SolveError, VehicleModel};
use pilot_core::{CommandKind, MpcSettings, ReferencePolynomial, Vector2, VehicleState};
use serde::Serialize;

use crate::fit::{fit_polynomial, to_vehicle_frame};

/// Waypoints sampled behind and ahead of the vehicle each cycle.
const WAYPOINTS_BEHIND: i32 = 2;
const WAYPOINTS_AHEAD: i32 = 12;
const MIN_WAYPOINT_SPACING: f64 = 1.0;

pub struct InitialOffset {
    pub cte0: f64,
    pub epsi0: f64,
    pub v0: f64,
}

#[derive(Debug, Serialize)]
struct SimStep {
    step: usize,
    x: f64,
    y: f64,
    psi: f64,
    v: f64,
    cte: f64,
    epsi: f64,
    steering: f64,
    acceleration: f64,
    kind: CommandKind,
    solve_ms: f64,
}

pub fn run(
    settings: MpcSettings,
    steps: usize,
    coeffs: &[f64],
    initial: InitialOffset,
) -> Result<()> {
    let path = ReferencePolynomial::try_from_coeffs(coeffs).context("Invalid reference")?;
    let model = VehicleModel::from_settings(&settings);
    let mut controller = MpcController::new(settings).context("Invalid settings")?;

    // World-frame pose; cte and epsi are recomputed in the vehicle frame every cycle.
    let mut world = VehicleState::new(
        0.0,
        path.value(0.0) + initial.cte0,
        path.heading(0.0) + initial.epsi0,
        initial.v0,
        0.0,
        0.0,
    );
    let straight = ReferencePolynomial::straight();
    let mut failures = 0;
    let mut cte_sum = 0.0;

    for step in 0..steps {
        let local_path = local_reference(&path, &world, model.dt)?;
        let cte = local_path.value(0.0);
        let epsi = -local_path.heading(0.0);
        let local_state = VehicleState::new(0.0, 0.0, 0.0, world.v, cte, epsi);

        let command = match controller.solve(&local_state, &local_path) {
            Ok(command) => command,
            Err(SolveError::NotConverged { status, fallback }) => {
                tracing::warn!("Step {}: {}, applying {:?}", step, status, fallback.kind);
                fallback
            }
            Err(err) => return Err(err.into()),
        };
        let solve_ms = controller
            .last_solution()
            .map_or(0.0, |s| s.solve_time.as_secs_f64() * 1e3);

        let record = SimStep {
            step,
            x: world.x,
            y: world.y,
            psi: world.psi,
            v: world.v,
            cte,
            epsi,
            steering: command.steering,
            acceleration: command.acceleration,
            kind: command.kind,
            solve_ms,
        };
        println!("{}", serde_json::to_string(&record)?);
        if command.is_degraded() {
            failures += 1;
        }
        cte_sum += cte.abs();

        world = model.step(&world, command.steering, command.acceleration, &straight);
    }

    if steps > 0 {
        tracing::info!(
            failures,
            "Simulated {} steps, mean |cte| {:.3} m",
            steps,
            cte_sum / steps as f64
        );
    }
    Ok(())
}

/// The world-frame path around the vehicle, refitted as a cubic in the vehicle frame.
fn local_reference(
    path: &ReferencePolynomial,
    world: &VehicleState,
    dt: f64,
) -> Result<ReferencePolynomial> {
    let spacing = (world.v.abs() * dt).max(MIN_WAYPOINT_SPACING);
    let position = world.position();
    let waypoints: Vec<Vector2> = (-WAYPOINTS_BEHIND..=WAYPOINTS_AHEAD)
        .map(|i| {
            let x = world.x + i as f64 * spacing;
            to_vehicle_frame(position, world.psi, Vector2::new(x, path.value(x)))
        })
        .collect();
    let coeffs = fit_polynomial(&waypoints, 3)?;
    Ok(ReferencePolynomial::try_from_coeffs(&coeffs)?)
}
