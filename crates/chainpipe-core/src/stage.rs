//! The contract every active pipeline stage satisfies.
//!
//! A stage owns bounded channels, a lifecycle and exactly one worker task:
//!
//! ```text
//! producer ──mpsc(cap)──▶ worker ──mpsc(cap)──▶ consumer
//!                           │
//!                           └──mpsc──▶ error consumer
//! ```
//!
//! Bounded channels give backpressure: a full buffer suspends the sender
//! until the worker catches up.

use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StageError;
use crate::event::Event;

/// Default capacity of a stage's input and output channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Lifecycle of a stage. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Created,
    Running,
    Stopped,
}

impl StageState {
    /// Move to `next`, or report a misuse if the transition is not allowed.
    ///
    /// Allowed: `Created → Running`, `Created → Stopped`, `Running → Stopped`.
    pub fn transition(&mut self, next: StageState, stage: &str) -> Result<(), StageError> {
        match (*self, next) {
            (Self::Created, Self::Running)
            | (Self::Created, Self::Stopped)
            | (Self::Running, Self::Stopped) => {
                *self = next;
                Ok(())
            }
            (from, to) => Err(StageError::misuse(
                stage,
                format!("cannot move from {from} to {to}"),
            )),
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// An active pipeline unit with its own worker and channels.
pub trait Stage: Send {
    /// Label used in logs and error messages.
    fn label(&self) -> &str;

    fn state(&self) -> StageState;

    /// Spawn the worker. Returns immediately.
    fn start(&mut self) -> Result<(), StageError>;

    /// Close the input, output and error channels.
    ///
    /// Events already pulled from the input but not yet forwarded may be lost.
    fn stop(&mut self) -> Result<(), StageError>;

    /// A send handle onto the stage's input channel.
    fn input_chan(&self) -> Result<mpsc::Sender<Event>, StageError>;

    /// The receive side of the error channel. Handed over once.
    fn error_chan(&mut self) -> Result<mpsc::Receiver<StageError>, StageError>;
}

/// A stage that forwards events to a downstream consumer.
pub trait ForwardingStage: Stage {
    /// The receive side of the output channel. Handed over once.
    fn output_chan(&mut self) -> Result<mpsc::Receiver<Event>, StageError>;
}

/// Handle to the Tokio runtime the caller is running on.
pub fn runtime(stage: &str) -> Result<Handle, StageError> {
    Handle::try_current().map_err(|e| StageError::Runtime {
        stage: stage.to_string(),
        reason: e.to_string(),
    })
}

/// Take a receiver that may only be handed over once.
pub fn hand_over<T>(
    slot: &mut Option<mpsc::Receiver<T>>,
    stage: &str,
    channel: &str,
) -> Result<mpsc::Receiver<T>, StageError> {
    slot.take()
        .ok_or_else(|| StageError::misuse(stage, format!("{channel} channel already handed over")))
}

/// Await a worker handle, mapping a panic or cancellation into a `StageError`.
pub async fn join_worker(
    worker: &mut Option<JoinHandle<()>>,
    stage: &str,
) -> Result<(), StageError> {
    match worker.take() {
        Some(handle) => handle.await.map_err(|e| StageError::Worker {
            stage: stage.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut state = StageState::Created;
        state.transition(StageState::Running, "t").unwrap();
        assert_eq!(state, StageState::Running);

        let err = state.transition(StageState::Running, "t").unwrap_err();
        assert!(err.is_misuse());

        state.transition(StageState::Stopped, "t").unwrap();
        assert!(state.transition(StageState::Stopped, "t").unwrap_err().is_misuse());
        assert!(state.transition(StageState::Running, "t").unwrap_err().is_misuse());
    }

    #[test]
    fn stop_before_start_is_allowed() {
        let mut state = StageState::Created;
        state.transition(StageState::Stopped, "t").unwrap();
        assert_eq!(state, StageState::Stopped);
    }

    #[test]
    fn runtime_required() {
        let err = runtime("t").unwrap_err();
        assert!(matches!(err, StageError::Runtime { .. }));
    }

    #[tokio::test]
    async fn receivers_are_handed_over_once() {
        let (_tx, rx) = mpsc::channel::<u8>(1);
        let mut slot = Some(rx);
        assert!(hand_over(&mut slot, "t", "output").is_ok());
        assert!(hand_over(&mut slot, "t", "output").unwrap_err().is_misuse());
    }

    #[tokio::test]
    async fn join_without_worker_is_noop() {
        let mut worker = None;
        join_worker(&mut worker, "t").await.unwrap();

        let mut worker = Some(runtime("t").unwrap().spawn(async {}));
        join_worker(&mut worker, "t").await.unwrap();
        assert!(worker.is_none());
    }
}
