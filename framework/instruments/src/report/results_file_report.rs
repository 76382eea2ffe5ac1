use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use volley_summary_model::AggregateSummary;

use crate::report::ReportCollector;
use crate::{CheckResult, OperationRecord};

/// Streams every check result and operation to a file, one JSON object per line.
///
/// Lines are serialized on the calling thread and written by a background task so that virtual
/// users never wait on disk I/O. The file is complete once [ReportCollector::finalize] returns.
pub struct ResultsFileReportCollector {
    join_handle: JoinHandle<()>,
    writer: Option<UnboundedSender<String>>,
    flush_complete: Arc<AtomicBool>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ResultLine<'a> {
    Check(&'a CheckResult),
    Operation {
        operation_id: &'a str,
        started_at: DateTime<Utc>,
        elapsed_ms: f64,
        is_error: bool,
    },
}

impl ResultsFileReportCollector {
    pub fn new(runtime: &tokio::runtime::Handle, path: PathBuf) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create results file {}", path.display()))?;

        let flush_complete = Arc::new(AtomicBool::new(false));
        let (join_handle, writer) =
            start_results_write_task(runtime, file, flush_complete.clone());

        Ok(Self {
            join_handle,
            writer: Some(writer),
            flush_complete,
        })
    }

    fn try_send(&self, line: &ResultLine<'_>) {
        let Some(writer) = &self.writer else {
            log::info!("Result recorded after the results file was finalized, ignoring");
            return;
        };

        let line = match serde_json::to_string(line) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Failed to serialize result: {e}");
                return;
            }
        };

        if let Err(e) = writer.send(line) {
            log::warn!("Failed to record result, the write task has finished: {e}");
        }
    }
}

impl ReportCollector for ResultsFileReportCollector {
    fn add_check(&mut self, result: &CheckResult) {
        self.try_send(&ResultLine::Check(result));
    }

    fn add_operation(&mut self, operation_record: &OperationRecord) {
        self.try_send(&ResultLine::Operation {
            operation_id: &operation_record.operation_id,
            started_at: operation_record.started_at,
            elapsed_ms: operation_record.duration().as_secs_f64() * 1000.0,
            is_error: operation_record.is_error,
        });
    }

    fn finalize(&mut self, _summary: &AggregateSummary) {
        // Closing the channel lets the write task drain what is queued and exit.
        self.writer.take();

        let wait_started = Instant::now();
        let mut notify_timer = Instant::now();
        while !self.flush_complete.load(Ordering::Acquire) {
            if notify_timer.elapsed().as_secs() > 10 {
                log::warn!(
                    "Still waiting for results to flush after {} seconds.",
                    wait_started.elapsed().as_secs()
                );
                notify_timer = Instant::now();
            }

            // If the write task has exited then there's no point trying to wait for it to finish
            // any longer.
            if self.join_handle.is_finished() {
                break;
            }

            std::thread::sleep(Duration::from_millis(20));
        }

        log::debug!(
            "Results flushed after {} ms",
            wait_started.elapsed().as_millis()
        );
    }
}

fn start_results_write_task(
    runtime: &tokio::runtime::Handle,
    file: std::fs::File,
    flush_complete: Arc<AtomicBool>,
) -> (JoinHandle<()>, UnboundedSender<String>) {
    let (writer, mut receiver) = tokio::sync::mpsc::unbounded_channel::<String>();
    let join_handle = runtime.spawn(async move {
        let mut file = BufWriter::new(tokio::fs::File::from_std(file));
        let mut written = 0u64;

        while let Some(line) = receiver.recv().await {
            if let Err(e) = write_line(&mut file, &line).await {
                log::warn!("Failed to write result to file: {e}");
                continue;
            }

            written += 1;
            if written % 100_000 == 0 {
                log::debug!("Written {written} results");
            }
        }

        // Ensure everything that's buffered has been written to disk.
        if let Err(e) = file.flush().await {
            log::error!("Failed to flush results file: {e}");
        }

        log::debug!("Wrote {written} results");

        // Signal the 'finalize' method that the write task has finished.
        flush_complete.store(true, Ordering::Release);
    });

    (join_handle, writer)
}

#[inline]
async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    Ok(())
}
