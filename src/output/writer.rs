//! Dedicated record writer
//!
//! The writer owns the sink and runs on a blocking thread, fed through a
//! bounded channel. The coordinator never touches the file directly, so a
//! slow disk only slows the channel, never the scheduling loop.

use crate::output::{OutputError, OutputResult, RecordSink};
use crate::state::Record;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default channel capacity between the coordinator and the writer
pub const DEFAULT_CHANNEL_SIZE: usize = 1024;

/// Message types sent to the writer task
#[derive(Debug)]
pub enum WriterMessage {
    /// Append a record
    Record(Record),

    /// Flush and stop
    Shutdown,
}

/// Number of records the writer has flushed to its sink
///
/// Stays readable after the writer stops, including when it stopped on an
/// error, so the caller can tell which queued records never reached disk.
#[derive(Debug, Clone, Default)]
pub struct WriteProgress(Arc<AtomicU64>);

impl WriteProgress {
    pub fn flushed(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn advance(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Handle to the running writer
pub struct RecordWriter {
    sender: mpsc::Sender<WriterMessage>,
    handle: JoinHandle<OutputResult<u64>>,
    progress: WriteProgress,
}

impl RecordWriter {
    /// Starts a writer that owns `sink`
    pub fn spawn(sink: Box<dyn RecordSink>, channel_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(channel_size.max(1));
        let progress = WriteProgress::default();
        let flushed = progress.clone();
        let handle = tokio::task::spawn_blocking(move || run_writer(sink, receiver, flushed));
        Self {
            sender,
            handle,
            progress,
        }
    }

    /// Shared view of how many records have been flushed
    pub fn progress(&self) -> WriteProgress {
        self.progress.clone()
    }

    /// Queues a record for writing
    pub async fn send(&self, record: Record) -> OutputResult<()> {
        self.sender
            .send(WriterMessage::Record(record))
            .await
            .map_err(|_| OutputError::WriterClosed)
    }

    /// Flushes everything queued so far and stops the writer
    ///
    /// Returns the number of records written, or the error that stopped the
    /// writer early.
    pub async fn finish(self) -> OutputResult<u64> {
        // A closed channel means the writer already stopped; its result
        // carries the reason.
        let _ = self.sender.send(WriterMessage::Shutdown).await;
        drop(self.sender);

        self.handle
            .await
            .map_err(|e| OutputError::WriterPanicked(e.to_string()))?
    }
}

fn run_writer(
    mut sink: Box<dyn RecordSink>,
    mut receiver: mpsc::Receiver<WriterMessage>,
    progress: WriteProgress,
) -> OutputResult<u64> {
    let mut written = 0u64;

    while let Some(message) = receiver.blocking_recv() {
        match message {
            WriterMessage::Record(record) => {
                sink.write_record(&record)?;
                sink.flush()?;
                written += 1;
                progress.advance();
            }
            WriterMessage::Shutdown => break,
        }
    }

    sink.flush()?;
    tracing::debug!("Record writer stopped after {} records", written);
    Ok(written)
}
