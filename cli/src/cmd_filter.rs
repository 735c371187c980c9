//! `chainpipe filter`: run a JSON-lines event stream through a filter stage
//! and log the events that pass.
//!
//! Pipeline file format (YAML, every section optional):
//! ```yaml
//! filter:
//!   label: filter.dex
//!   addresses: [addr1…]
//!   pool_ids: [pool1…]
//! output:
//!   level: info
//! log:
//!   level: info
//!   components:
//!     chainpipe-filter: debug
//! ```

use anyhow::{bail, Context, Result};
use chainpipe_core::{Event, ForwardingStage, Stage, StageError, StageState};
use chainpipe_filter::{ChainSyncFilter, FilterBuilder, FilterConfig};
use chainpipe_observability::{init_tracing, LogConfig};
use chainpipe_output::{LogOutput, LogOutputConfig};
use serde::Deserialize;
use std::io::{self, BufRead};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub struct FilterArgs {
    pub input: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub addresses: Vec<String>,
    pub policy_ids: Vec<String>,
    pub asset_fingerprints: Vec<String>,
    pub pool_ids: Vec<String>,
    pub level: Option<String>,
    pub verbose: bool,
    pub json: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    #[serde(default)]
    filter: FilterConfig,
    #[serde(default)]
    output: LogOutputConfig,
    #[serde(default)]
    log: LogConfig,
}

pub async fn run(args: FilterArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            serde_yaml::from_str::<PipelineFile>(&text)
                .with_context(|| format!("invalid pipeline file {}", path.display()))?
        }
        None => PipelineFile::default(),
    };

    let json = args.json || file.log.json;
    let mut log = file.log.json(json);
    if args.verbose {
        log = log.with_level("debug");
    }
    if let Err(e) = init_tracing(&log) {
        eprintln!("logging already initialised: {e}");
    }

    let filter_config = merge_criteria(FilterBuilder::from_config(file.filter), &args)
        .build()
        .context("invalid filter configuration")?;
    let mut output_config = file.output;
    if let Some(level) = &args.level {
        output_config = output_config.with_level(level.parse().context("invalid --level")?);
    }

    let mut filter = ChainSyncFilter::new(filter_config)?;
    let mut output = LogOutput::new(output_config)?;
    watch_errors(filter.error_chan()?);
    watch_errors(output.error_chan()?);

    output.start()?;
    filter.start()?;

    let forward = {
        let mut matched = filter.output_chan()?;
        let sink = output.input_chan()?;
        tokio::spawn(async move {
            while let Some(event) = matched.recv().await {
                if sink.send(event).await.is_err() {
                    warn!("log output closed, stopping forwarder");
                    break;
                }
            }
        })
    };
    output.close_input();

    let input = filter.input_chan()?;
    filter.close_input();

    let lines = match &args.input {
        Some(path) => async_lines(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?,
        ),
        None => blocking_lines(io::BufReader::new(io::stdin()))
            .context("cannot start stdin reader")?,
    };

    tokio::select! {
        fed = feed(lines, input) => fed?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            filter.stop()?;
        }
    }

    filter.join().await?;
    forward.await.context("forwarder task failed")?;
    output.join().await?;

    info!(metrics = ?filter.metrics(), logged = output.events_logged(), "pipeline finished");
    if filter.state() != StageState::Stopped {
        filter.stop()?;
    }
    output.stop()?;
    Ok(())
}

/// Flags replace the corresponding list from the pipeline file.
fn merge_criteria(mut builder: FilterBuilder, args: &FilterArgs) -> FilterBuilder {
    if !args.addresses.is_empty() {
        builder = builder.addresses(args.addresses.iter().cloned());
    }
    if !args.policy_ids.is_empty() {
        builder = builder.policy_ids(args.policy_ids.iter().cloned());
    }
    if !args.asset_fingerprints.is_empty() {
        builder = builder.asset_fingerprints(args.asset_fingerprints.iter().cloned());
    }
    if !args.pool_ids.is_empty() {
        builder = builder.pool_ids(args.pool_ids.iter().cloned());
    }
    builder
}

type Lines = mpsc::Receiver<io::Result<String>>;

const LINE_BUFFER: usize = 64;

/// Lines of an async reader, pumped by a Tokio task.
fn async_lines(reader: impl AsyncRead + Unpin + Send + 'static) -> Lines {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await.transpose() {
            let failed = line.is_err();
            if tx.send(line).await.is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Lines of a blocking reader such as stdin, pumped by a dedicated OS thread.
///
/// The thread is detached: a read parked on a silent terminal never holds up
/// runtime shutdown, and the process exits without waiting for it.
fn blocking_lines(reader: impl BufRead + Send + 'static) -> io::Result<Lines> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    std::thread::Builder::new()
        .name("chainpipe-stdin".into())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Parse events line by line and push them into the filter. Lines that are
/// not valid events are skipped with a warning.
async fn feed(mut lines: Lines, input: mpsc::Sender<Event>) -> Result<()> {
    let mut line_no = 0u64;
    let mut skipped = 0u64;

    while let Some(line) = lines.recv().await {
        let line = line.context("failed to read events")?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping invalid event");
                skipped += 1;
                continue;
            }
        };
        if input.send(event).await.is_err() {
            bail!("filter input closed after {line_no} lines");
        }
    }

    info!(lines = line_no, skipped, "input exhausted");
    Ok(())
}

fn watch_errors(mut errors: mpsc::Receiver<StageError>) {
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            error!(error = %err, "stage error");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> FilterArgs {
        FilterArgs {
            input: None,
            config: None,
            addresses: vec![],
            policy_ids: vec![],
            asset_fingerprints: vec![],
            pool_ids: vec![],
            level: None,
            verbose: false,
            json: false,
        }
    }

    #[test]
    fn pipeline_file_sections_are_optional() {
        let file: PipelineFile = serde_yaml::from_str("output:\n  level: warn\n").unwrap();
        assert!(file.filter.criteria.is_empty());
        assert_eq!(file.output.level, chainpipe_output::LogLevel::Warn);
        assert_eq!(file.log.level, "info");
    }

    #[test]
    fn flags_replace_file_lists() {
        let file: PipelineFile =
            serde_yaml::from_str("filter:\n  addresses: [addr1a]\n  pool_ids: [deadbeef]\n").unwrap();
        let mut args = args();
        args.addresses = vec!["addr1b".into()];

        let cfg = merge_criteria(FilterBuilder::from_config(file.filter), &args)
            .build()
            .unwrap();
        assert_eq!(cfg.criteria.addresses, vec!["addr1b"]);
        assert_eq!(cfg.criteria.pool_ids, vec!["deadbeef"]);
    }

    #[tokio::test]
    async fn feed_skips_invalid_lines() {
        let data = concat!(
            r#"{"type":"chainsync.rollback","timestamp":"2026-01-01T00:00:00Z","payload":{"kind":"rollback","block_hash":"aa","slot_number":1}}"#,
            "\n\nnot json\n",
        );
        let (tx, mut rx) = mpsc::channel(4);
        feed(async_lines(data.as_bytes()), tx).await.unwrap();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn blocking_reader_lines_arrive_in_order() {
        let reader = io::Cursor::new(b"first\nsecond\n".to_vec());
        let mut lines = blocking_lines(reader).unwrap();
        assert_eq!(lines.recv().await.unwrap().unwrap(), "first");
        assert_eq!(lines.recv().await.unwrap().unwrap(), "second");
        assert!(lines.recv().await.is_none());
    }

    /// A reader that parks in `read` until released, like an idle terminal.
    struct Parked(std::sync::mpsc::Receiver<()>);

    impl io::Read for Parked {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn parked_stdin_read_does_not_hold_runtime_shutdown() {
        let (release, parked) = std::sync::mpsc::channel();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let lines = runtime
            .block_on(async { blocking_lines(io::BufReader::new(Parked(parked))) })
            .unwrap();

        let started = std::time::Instant::now();
        drop(runtime);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        drop(lines);
        drop(release);
    }
}
