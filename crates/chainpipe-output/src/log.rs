//! `LogOutput`: writes every event it receives to the log.

use chainpipe_core::stage::{hand_over, join_worker, runtime};
use chainpipe_core::{Event, Stage, StageError, StageState, DEFAULT_CHANNEL_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutputConfigError {
    #[error("Channel capacity must be at least 1")]
    ZeroCapacity,

    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),
}

/// Level events are logged at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = OutputConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(OutputConfigError::UnknownLevel(other.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOutputConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_label() -> String {
    "output.log".into()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for LogOutputConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            level: LogLevel::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl LogOutputConfig {
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn validate(&self) -> Result<(), OutputConfigError> {
        if self.channel_capacity == 0 {
            return Err(OutputConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Terminal stage logging each event as a JSON line.
///
/// Follows the same lifecycle as every other stage. An event that cannot be
/// rendered is reported on the error channel and the stage keeps running.
pub struct LogOutput {
    label: String,
    level: LogLevel,
    state: StageState,
    input_tx: Option<mpsc::Sender<Event>>,
    input_rx: Option<mpsc::Receiver<Event>>,
    error_tx: Option<mpsc::Sender<StageError>>,
    error_rx: Option<mpsc::Receiver<StageError>>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    logged: Arc<AtomicU64>,
}

impl LogOutput {
    pub fn new(config: LogOutputConfig) -> Result<Self, OutputConfigError> {
        config.validate()?;
        let (input_tx, input_rx) = mpsc::channel(config.channel_capacity);
        let (error_tx, error_rx) = mpsc::channel(1);
        Ok(Self {
            label: config.label,
            level: config.level,
            state: StageState::Created,
            input_tx: Some(input_tx),
            input_rx: Some(input_rx),
            error_tx: Some(error_tx),
            error_rx: Some(error_rx),
            shutdown: None,
            worker: None,
            logged: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of events written so far.
    pub fn events_logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }

    pub fn close_input(&mut self) {
        self.input_tx.take();
    }

    pub async fn join(&mut self) -> Result<(), StageError> {
        join_worker(&mut self.worker, &self.label).await
    }
}

impl Stage for LogOutput {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> StageState {
        self.state
    }

    fn start(&mut self) -> Result<(), StageError> {
        if self.state != StageState::Created {
            return Err(StageError::misuse(&self.label, format!("start() while {}", self.state)));
        }
        let handle = runtime(&self.label)?;
        let (Some(input), Some(errors)) = (self.input_rx.take(), self.error_tx.clone()) else {
            return Err(StageError::misuse(&self.label, "stage channels already consumed"));
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = LogWorker {
            label: self.label.clone(),
            level: self.level,
            errors,
            logged: Arc::clone(&self.logged),
        };
        let span = info_span!("stage", label = %self.label);
        self.worker = Some(handle.spawn(worker.run(input, shutdown_rx).instrument(span)));
        self.shutdown = Some(shutdown_tx);
        self.state.transition(StageState::Running, &self.label)?;

        info!(stage = %self.label, level = %self.level, "log output started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StageError> {
        self.state.transition(StageState::Stopped, &self.label)?;

        self.input_tx.take();
        self.input_rx.take();
        self.error_tx.take();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        info!(stage = %self.label, logged = self.events_logged(), "log output stopped");
        Ok(())
    }

    fn input_chan(&self) -> Result<mpsc::Sender<Event>, StageError> {
        self.input_tx
            .clone()
            .ok_or_else(|| StageError::misuse(&self.label, "input channel is closed"))
    }

    fn error_chan(&mut self) -> Result<mpsc::Receiver<StageError>, StageError> {
        hand_over(&mut self.error_rx, &self.label, "error")
    }
}

impl Drop for LogOutput {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

// ─── Worker ───────────────────────────────────────────────────────────────────

struct LogWorker {
    label: String,
    level: LogLevel,
    errors: mpsc::Sender<StageError>,
    logged: Arc<AtomicU64>,
}

impl LogWorker {
    async fn run(self, mut input: mpsc::Receiver<Event>, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                next = input.recv() => match next {
                    Some(event) => event,
                    None => break,
                },
            };

            match serde_json::to_string(&event) {
                Ok(line) => {
                    self.emit(&event.kind, &line);
                    self.logged.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => self.report(StageError::Other(format!(
                    "{}: cannot render {} event: {e}",
                    self.label, event.kind
                ))),
            }
        }
        debug!("log output worker finished");
    }

    fn emit(&self, kind: &str, line: &str) {
        match self.level {
            LogLevel::Trace => trace!(kind, event = %line),
            LogLevel::Debug => debug!(kind, event = %line),
            LogLevel::Info => info!(kind, event = %line),
            LogLevel::Warn => warn!(kind, event = %line),
            LogLevel::Error => error!(kind, event = %line),
        }
    }

    /// Non-blocking: a full or unread error channel must not stall the worker.
    fn report(&self, err: StageError) {
        if let Err(e) = self.errors.try_send(err) {
            warn!(error = %e, "error channel unavailable, dropping error");
        }
    }
}
