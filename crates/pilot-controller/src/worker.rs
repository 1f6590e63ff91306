use std::{
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use pilot_core::{Command, ReferencePolynomial, VehicleState};
use pilot_solver::{CancelToken, Optimizer};
use thiserror::Error;

use crate::{MpcController, SolveError};

const QUEUE_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("MPC worker queue is full")]
    Busy,
    #[error("MPC worker thread has stopped")]
    Disconnected,
}

struct MpcRequest {
    id: u64,
    state: VehicleState,
    reference: ReferencePolynomial,
    cancel: CancelToken,
}

/// Result of one request submitted to an [`MpcWorker`].
#[derive(Debug)]
pub struct MpcOutcome {
    /// Id returned by [`MpcWorker::submit`]
    pub id: u64,
    pub result: Result<Command, SolveError>,
    pub solve_time: Duration,
}

/// Runs an [`MpcController`] on a dedicated `mpc-worker` thread.
///
/// Only the newest request matters: submitting a request cancels the solve that is
/// still in flight, and requests that were superseded before the worker got to them are
/// dropped.
pub struct MpcWorker {
    request_sender: mpsc::SyncSender<MpcRequest>,
    response_receiver: mpsc::Receiver<MpcOutcome>,
    in_flight: Option<CancelToken>,
    next_id: u64,
    _thread_handle: thread::JoinHandle<()>,
}

impl MpcWorker {
    pub fn spawn<B: Optimizer + Send + 'static>(
        controller: MpcController<B>,
    ) -> Result<Self, std::io::Error> {
        let (request_sender, request_receiver) = mpsc::sync_channel::<MpcRequest>(QUEUE_SIZE);
        let (response_sender, response_receiver) = mpsc::channel::<MpcOutcome>();

        let thread_handle = thread::Builder::new()
            .name("mpc-worker".to_string())
            .spawn(move || worker_thread(controller, request_receiver, response_sender))?;

        Ok(Self {
            request_sender,
            response_receiver,
            in_flight: None,
            next_id: 0,
            _thread_handle: thread_handle,
        })
    }

    /// Queue a solve for `state` and cancel the previous one. Returns the request id.
    ///
    /// When the queue is full the request is dropped and the previous one keeps running.
    pub fn submit(
        &mut self,
        state: VehicleState,
        reference: ReferencePolynomial,
    ) -> Result<u64, WorkerError> {
        let id = self.next_id;
        let cancel = CancelToken::new();
        let request = MpcRequest {
            id,
            state,
            reference,
            cancel: cancel.clone(),
        };
        match self.request_sender.try_send(request) {
            Ok(()) => {
                self.next_id += 1;
                if let Some(previous) = self.in_flight.replace(cancel) {
                    previous.cancel();
                }
                Ok(id)
            }
            Err(mpsc::TrySendError::Full(_)) => {
                tracing::warn!("MPC worker is falling behind, dropping request");
                Err(WorkerError::Busy)
            }
            Err(mpsc::TrySendError::Disconnected(_)) => Err(WorkerError::Disconnected),
        }
    }

    /// A finished outcome, if there is one.
    pub fn try_recv(&self) -> Option<MpcOutcome> {
        self.response_receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next outcome.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MpcOutcome> {
        self.response_receiver.recv_timeout(timeout).ok()
    }
}

impl Drop for MpcWorker {
    fn drop(&mut self) {
        if let Some(cancel) = self.in_flight.take() {
            cancel.cancel();
        }
    }
}

fn worker_thread<B: Optimizer>(
    mut controller: MpcController<B>,
    request_receiver: mpsc::Receiver<MpcRequest>,
    response_sender: mpsc::Sender<MpcOutcome>,
) {
    while let Ok(mut request) = request_receiver.recv() {
        while let Ok(newer) = request_receiver.try_recv() {
            tracing::debug!("Skipping superseded MPC request {}", request.id);
            request = newer;
        }

        let start = Instant::now();
        let result =
            controller.solve_with_cancel(&request.state, &request.reference, &request.cancel);
        let outcome = MpcOutcome {
            id: request.id,
            result,
            solve_time: start.elapsed(),
        };

        if response_sender.send(outcome).is_err() {
            break;
        }
    }
    tracing::debug!("MPC worker stopped");
}
