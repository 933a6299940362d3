//! # Print Pipeline
//!
//! Turns a [`ReceiptDocument`] into the ordered writes that print it, then
//! replays them against a [`DeviceSession`].
//!
//! ## Write Order
//!
//! | # | Section | Writes |
//! |---|---------|--------|
//! | 1 | reset | `ESC @`, then a settle pause |
//! | 2 | store name | center, bold on, double height on, name, double height off, bold off |
//! | 3 | address | small font, one write per line, normal font |
//! | 4 | | separator |
//! | 5 | info | left, `No:` line, `Tgl:` line |
//! | 6 | | separator |
//! | 7 | items | name line, quantity/subtotal line, per item |
//! | 8 | totals | separator, bold on, `TOTAL` line, bold off, `Bayar:` line |
//! | 9 | footer | separator, center, small font, footer lines, bold signature, normal font |
//! | 10 | finish | `ESC d n`, `GS V 0` |
//!
//! Every command is its own write. A text line is written as its bytes
//! followed by `LF` in a single write.
//!
//! ## Failure
//!
//! The first failed write ends the job. Nothing is retried and nothing
//! already printed is undone; the paper shows a partial receipt.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::config::PrinterConfig;
use super::session::DeviceSession;
use crate::error::{PrintResult, PrinterError};
use crate::protocol::commands::LF;
use crate::protocol::{PrinterCommand, TextEncoding};
use crate::receipt::{ReceiptDocument, ReceiptFormatter};

/// One unit of a [`PrintJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A single transport write
    Write(Vec<u8>),
    /// Let the printer drain before the next write
    Settle(Duration),
}

/// The compiled form of one receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintJob {
    pub steps: Vec<Step>,
}

impl PrintJob {
    pub fn write_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, Step::Write(_)))
            .count()
    }

    /// All bytes the job sends, concatenated.
    pub fn bytes(&self) -> Vec<u8> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Write(data) => Some(data.as_slice()),
                Step::Settle(_) => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    fn command(&mut self, command: PrinterCommand) {
        self.steps.push(Step::Write(command.encode()));
    }

    fn commands(&mut self, commands: &[PrinterCommand]) {
        for &command in commands {
            self.command(command);
        }
    }

    fn line(&mut self, encoding: TextEncoding, text: &str) {
        let mut data = encoding.encode(text);
        data.push(LF);
        self.steps.push(Step::Write(data));
    }

    fn settle(&mut self, pause: Duration) {
        self.steps.push(Step::Settle(pause));
    }
}

/// Where a job stopped.
#[derive(Debug, Error)]
#[error("print aborted at step {step} after {writes_sent} writes: {source}")]
pub struct JobFailure {
    /// Zero-based index into [`PrintJob::steps`]
    pub step: usize,
    /// Writes that completed before the failure
    pub writes_sent: usize,
    pub source: PrinterError,
}

/// Compiles receipts and executes them.
#[derive(Debug, Clone)]
pub struct PrintPipeline {
    formatter: ReceiptFormatter,
    encoding: TextEncoding,
    settle_delay: Duration,
    feed: PrinterCommand,
}

impl Default for PrintPipeline {
    fn default() -> Self {
        Self {
            formatter: ReceiptFormatter::default(),
            encoding: TextEncoding::default(),
            settle_delay: Duration::from_millis(100),
            feed: PrinterCommand::FeedLines(4),
        }
    }
}

impl PrintPipeline {
    pub fn from_config(config: &PrinterConfig) -> PrintResult<Self> {
        Ok(Self {
            formatter: config.formatter(),
            encoding: config.encoding,
            settle_delay: config.settle_delay(),
            feed: PrinterCommand::feed_lines(config.feed_lines)?,
        })
    }

    pub fn formatter(&self) -> &ReceiptFormatter {
        &self.formatter
    }

    /// The receipt as plain text lines, no device needed.
    pub fn print_preview(&self, doc: &ReceiptDocument) -> Vec<String> {
        self.formatter.format(doc)
    }

    pub fn compile(&self, doc: &ReceiptDocument) -> PrintJob {
        use PrinterCommand::*;

        let layout = self.formatter.layout(doc);
        let enc = self.encoding;
        let mut job = PrintJob::default();

        job.command(Initialize);
        job.settle(self.settle_delay);

        job.command(AlignCenter);
        if let Some(name) = &layout.store_name {
            job.commands(&[BoldOn, DoubleHeightOn]);
            job.line(enc, name);
            job.commands(&[DoubleHeightOff, BoldOff]);
        }
        job.command(FontSmall);
        for line in &layout.header_lines {
            job.line(enc, line);
        }
        job.command(FontNormal);
        job.line(enc, &layout.separator);

        job.command(AlignLeft);
        for line in &layout.info_lines {
            job.line(enc, line);
        }
        job.line(enc, &layout.separator);

        for line in &layout.item_lines {
            job.line(enc, line);
        }
        job.line(enc, &layout.separator);

        job.command(BoldOn);
        job.line(enc, &layout.total_line);
        job.command(BoldOff);
        job.line(enc, &layout.payment_line);
        job.line(enc, &layout.separator);

        job.commands(&[AlignCenter, FontSmall]);
        for line in &layout.footer_lines {
            job.line(enc, line);
        }
        if let Some(signature) = &layout.signature {
            job.command(BoldOn);
            job.line(enc, signature);
            job.command(BoldOff);
        }
        job.command(FontNormal);

        job.command(self.feed);
        job.command(CutPaper);
        job
    }

    /// Run `job` step by step, stopping at the first failed write.
    ///
    /// Returns the number of writes sent.
    pub async fn execute(&self, job: &PrintJob, session: &DeviceSession) -> Result<usize, JobFailure> {
        let mut writes_sent = 0;
        for (step, item) in job.steps.iter().enumerate() {
            match item {
                Step::Write(data) => {
                    session.write(data).await.map_err(|source| JobFailure {
                        step,
                        writes_sent,
                        source,
                    })?;
                    writes_sent += 1;
                }
                Step::Settle(pause) => tokio::time::sleep(*pause).await,
            }
        }
        Ok(writes_sent)
    }

    /// Print `doc` on a connected session.
    ///
    /// `Err(NotConnected)` without touching the device when the session is
    /// down; otherwise the error of the first failed write.
    #[instrument(skip_all, fields(transaction = %doc.transaction_id))]
    pub async fn print(&self, session: &DeviceSession, doc: &ReceiptDocument) -> PrintResult<usize> {
        if !session.is_connected() {
            return Err(PrinterError::NotConnected);
        }

        let job = self.compile(doc);
        debug!(steps = job.steps.len(), writes = job.write_count(), "compiled receipt");

        match self.execute(&job, session).await {
            Ok(writes) => {
                info!(writes, "receipt printed");
                Ok(writes)
            }
            Err(failure) => {
                warn!(
                    step = failure.step,
                    writes_sent = failure.writes_sent,
                    error = %failure.source,
                    "receipt aborted"
                );
                Err(failure.source)
            }
        }
    }
}
