//! `ChainSyncFilter`: the active filter stage.
//!
//! # Usage
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use chainpipe_core::{ForwardingStage, Stage};
//! use chainpipe_filter::{ChainSyncFilter, FilterBuilder};
//!
//! let config = FilterBuilder::new().pool_ids(["deadbeef"]).build()?;
//! let mut filter = ChainSyncFilter::new(config)?;
//! filter.start()?;
//!
//! let input = filter.input_chan()?;
//! let mut output = filter.output_chan()?;
//! // ... send events on `input`, receive the matching ones from `output` ...
//! filter.stop()?;
//! # Ok(())
//! # }
//! ```

use chainpipe_core::stage::{hand_over, join_worker, runtime};
use chainpipe_core::{Event, ForwardingStage, Stage, StageError, StageState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{ConfigError, FilterConfig};
use crate::matcher::Matcher;

/// Counters snapshot for a filter stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterMetrics {
    pub events_received: u64,
    pub events_forwarded: u64,
    pub events_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> FilterMetrics {
        FilterMetrics {
            events_received: self.received.load(Ordering::Relaxed),
            events_forwarded: self.forwarded.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Filters chain-sync events by address, policy ID, asset fingerprint and pool.
///
/// One worker task evaluates events in arrival order; the output is the
/// input restricted to matching events, order preserved. Input and output
/// are bounded, so a slow consumer throttles the producer.
///
/// Dropping the stage while it runs stops the worker as `stop()` would.
pub struct ChainSyncFilter {
    label: String,
    state: StageState,
    matcher: Option<Matcher>,
    input_tx: Option<mpsc::Sender<Event>>,
    input_rx: Option<mpsc::Receiver<Event>>,
    output_tx: Option<mpsc::Sender<Event>>,
    output_rx: Option<mpsc::Receiver<Event>>,
    error_tx: Option<mpsc::Sender<StageError>>,
    error_rx: Option<mpsc::Receiver<StageError>>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl ChainSyncFilter {
    /// Create a stage in the `Created` state. Channels exist immediately.
    pub fn new(config: FilterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (input_tx, input_rx) = mpsc::channel(config.channel_capacity);
        let (output_tx, output_rx) = mpsc::channel(config.channel_capacity);
        let (error_tx, error_rx) = mpsc::channel(1);
        Ok(Self {
            label: config.label,
            state: StageState::Created,
            matcher: Some(Matcher::new(config.criteria)),
            input_tx: Some(input_tx),
            input_rx: Some(input_rx),
            output_tx: Some(output_tx),
            output_rx: Some(output_rx),
            error_tx: Some(error_tx),
            error_rx: Some(error_rx),
            shutdown: None,
            worker: None,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn metrics(&self) -> FilterMetrics {
        self.counters.snapshot()
    }

    /// Producer-side close: drop the stage's own input handle.
    ///
    /// The worker drains what is buffered and exits once every cloned input
    /// handle has been dropped as well, which in turn closes the output.
    pub fn close_input(&mut self) {
        self.input_tx.take();
    }

    /// Wait for the worker task to finish.
    pub async fn join(&mut self) -> Result<(), StageError> {
        join_worker(&mut self.worker, &self.label).await
    }
}

impl Stage for ChainSyncFilter {
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
        let (Some(input), Some(output), Some(matcher)) = (
            self.input_rx.take(),
            self.output_tx.take(),
            self.matcher.take(),
        ) else {
            return Err(StageError::misuse(&self.label, "stage channels already consumed"));
        };

        debug!(stage = %self.label, criteria = ?matcher.criteria(), "filter starting");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let span = info_span!("stage", label = %self.label);
        let worker = run_filter(input, output, matcher, Arc::clone(&self.counters), shutdown_rx)
            .instrument(span);
        self.worker = Some(handle.spawn(worker));
        self.shutdown = Some(shutdown_tx);
        self.state.transition(StageState::Running, &self.label)?;

        info!(stage = %self.label, "filter started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StageError> {
        self.state.transition(StageState::Stopped, &self.label)?;

        self.input_tx.take();
        self.input_rx.take();
        self.output_tx.take();
        self.error_tx.take();
        if let Some(shutdown) = self.shutdown.take() {
            // The worker may already have exited on its own.
            let _ = shutdown.send(());
        }

        info!(stage = %self.label, metrics = ?self.metrics(), "filter stopped");
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

impl Drop for ChainSyncFilter {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl ForwardingStage for ChainSyncFilter {
    fn output_chan(&mut self) -> Result<mpsc::Receiver<Event>, StageError> {
        hand_over(&mut self.output_rx, &self.label, "output")
    }
}

// ─── Worker loop ──────────────────────────────────────────────────────────────

async fn run_filter(
    mut input: mpsc::Receiver<Event>,
    output: mpsc::Sender<Event>,
    matcher: Matcher,
    counters: Arc<Counters>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("shutdown requested");
                break;
            }
            next = input.recv() => match next {
                Some(event) => event,
                None => {
                    debug!("input channel closed");
                    break;
                }
            },
        };
        counters.received.fetch_add(1, Ordering::Relaxed);

        if !matcher.evaluate(&event).is_pass() {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(kind = %event.kind, "event dropped");
            continue;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("shutdown requested while forwarding");
                break;
            }
            sent = output.send(event) => {
                if sent.is_err() {
                    warn!("output receiver dropped, filter exiting");
                    break;
                }
                counters.forwarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    debug!("filter worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterBuilder;
    use chainpipe_core::{BlockEvent, TransactionEvent, TxOutput};
    use std::time::Duration;
    use tokio::time::timeout;

    fn block(issuer: &str) -> Event {
        Event::block(BlockEvent {
            issuer_vkey: issuer.into(),
            ..Default::default()
        })
    }

    fn filter(config: FilterConfig) -> ChainSyncFilter {
        ChainSyncFilter::new(config).unwrap()
    }

    #[tokio::test]
    async fn forwards_everything_without_criteria() {
        let mut f = filter(FilterConfig::default());
        f.start().unwrap();
        let input = f.input_chan().unwrap();
        let mut output = f.output_chan().unwrap();

        for i in 0..5 {
            input.send(block(&format!("{i:02x}"))).await.unwrap();
        }
        for i in 0..5 {
            let event = output.recv().await.unwrap();
            assert_eq!(event.payload, block(&format!("{i:02x}")).payload);
        }
        assert_eq!(f.metrics().events_forwarded, 5);
        f.stop().unwrap();
    }

    #[tokio::test]
    async fn drops_non_matching_and_keeps_running() {
        let config = FilterBuilder::new().addresses(["addr1xyz"]).build().unwrap();
        let mut f = filter(config);
        f.start().unwrap();
        let input = f.input_chan().unwrap();
        let mut output = f.output_chan().unwrap();

        let tx = |addr: &str| {
            Event::transaction(TransactionEvent {
                outputs: vec![TxOutput::new(addr, 1)],
                ..Default::default()
            })
        };
        input.send(tx("addr1other")).await.unwrap();
        input.send(tx("addr1xyz")).await.unwrap();

        let got = output.recv().await.unwrap();
        assert_eq!(got.payload, tx("addr1xyz").payload);
        assert_eq!(f.state(), StageState::Running);

        let m = f.metrics();
        assert_eq!(m.events_received, 2);
        assert_eq!(m.events_dropped, 1);
        f.stop().unwrap();
    }

    #[tokio::test]
    async fn closing_input_ends_worker_and_output() {
        let mut f = filter(FilterConfig::default());
        f.start().unwrap();
        let input = f.input_chan().unwrap();
        let mut output = f.output_chan().unwrap();

        input.send(block("aa")).await.unwrap();
        drop(input);
        f.close_input();

        timeout(Duration::from_secs(1), f.join()).await.unwrap().unwrap();
        assert!(output.recv().await.is_some());
        assert!(output.recv().await.is_none());
        f.stop().unwrap();
    }

    #[tokio::test]
    async fn stop_terminates_worker_even_with_live_producers() {
        let mut f = filter(FilterConfig::default());
        f.start().unwrap();
        let input = f.input_chan().unwrap();
        let mut output = f.output_chan().unwrap();

        f.stop().unwrap();
        timeout(Duration::from_secs(1), f.join()).await.unwrap().unwrap();

        assert!(input.send(block("aa")).await.is_err());
        assert!(output.recv().await.is_none());
        assert!(f.input_chan().unwrap_err().is_misuse());
    }

    #[tokio::test]
    async fn stop_unblocks_a_worker_waiting_on_full_output() {
        let config = FilterBuilder::new().channel_capacity(1).build().unwrap();
        let mut f = filter(config);
        f.start().unwrap();
        let input = f.input_chan().unwrap();
        let _output = f.output_chan().unwrap();

        // one event fills the output buffer, the next blocks the worker
        input.send(block("01")).await.unwrap();
        input.send(block("02")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        f.stop().unwrap();
        timeout(Duration::from_secs(1), f.join()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn full_buffers_suspend_the_producer() {
        const CAP: usize = 2;
        let config = FilterBuilder::new().channel_capacity(CAP).build().unwrap();
        let mut f = filter(config);
        f.start().unwrap();
        let input = f.input_chan().unwrap();
        let mut output = f.output_chan().unwrap();

        // CAP events fill the output, one is held by the worker, CAP fill the input
        for i in 0..(2 * CAP + 1) {
            timeout(Duration::from_secs(1), input.send(block(&format!("{i:02x}"))))
                .await
                .unwrap()
                .unwrap();
        }

        let producer = input.clone();
        let mut blocked = tokio::spawn(async move { producer.send(block("ff")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        let first = output.recv().await.unwrap();
        assert_eq!(first.payload, block("00").payload);
        timeout(Duration::from_secs(1), &mut blocked)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(f.metrics().events_dropped, 0);
        f.stop().unwrap();
    }

    #[tokio::test]
    async fn lifecycle_misuse_is_reported() {
        let mut f = filter(FilterConfig::default());
        f.start().unwrap();
        assert!(f.start().unwrap_err().is_misuse());

        let _out = f.output_chan().unwrap();
        assert!(f.output_chan().unwrap_err().is_misuse());
        let _err = f.error_chan().unwrap();
        assert!(f.error_chan().unwrap_err().is_misuse());

        f.stop().unwrap();
        assert!(f.stop().unwrap_err().is_misuse());
        assert!(f.start().unwrap_err().is_misuse());
        assert_eq!(f.state(), StageState::Stopped);
    }

    #[tokio::test]
    async fn error_channel_closes_on_stop() {
        let mut f = filter(FilterConfig::default());
        let mut errors = f.error_chan().unwrap();
        f.start().unwrap();
        f.stop().unwrap();
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn stop_before_start_closes_channels() {
        let mut f = filter(FilterConfig::default());
        let input = f.input_chan().unwrap();
        let mut output = f.output_chan().unwrap();
        f.stop().unwrap();

        assert!(input.send(block("aa")).await.is_err());
        assert!(output.recv().await.is_none());
        assert!(f.start().unwrap_err().is_misuse());
    }

    #[test]
    fn start_outside_runtime_fails_without_changing_state() {
        let mut f = filter(FilterConfig::default());
        let err = f.start().unwrap_err();
        assert!(matches!(err, StageError::Runtime { .. }));
        assert_eq!(f.state(), StageState::Created);
    }

    #[tokio::test]
    async fn dropping_the_stage_stops_the_worker() {
        let mut f = filter(FilterConfig::default());
        f.start().unwrap();
        let input = f.input_chan().unwrap();
        let mut output = f.output_chan().unwrap();
        drop(f);

        assert!(timeout(Duration::from_secs(1), output.recv()).await.unwrap().is_none());
        timeout(Duration::from_secs(1), input.closed()).await.unwrap();
    }

    #[test]
    fn invalid_config_rejected() {
        let config = FilterConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            ChainSyncFilter::new(config),
            Err(ConfigError::ZeroCapacity)
        ));
    }
}
