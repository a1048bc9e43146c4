//! Tick loop: one pass immediately, then one per interval, until shutdown.
//!
//! Passes run inline on the loop task and never overlap. A pass slower than
//! the interval pushes the next tick back rather than queueing extra ticks.
//! Shutdown is only observed between passes.

use crate::config::Settings;
use crate::duration;
use crate::reader::{ReadError, Verdict};
use crate::writer::WriteError;
use chrono::{TimeDelta, Utc};
use std::future::Future;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// One status line produced by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Wrote {
        timestamp: String,
    },
    Fresh {
        elapsed: TimeDelta,
    },
    Stale {
        elapsed: TimeDelta,
        /// Time since the probe started, to tell "first write not landed yet"
        /// apart from "writer stopped".
        since_start: Duration,
    },
}

impl Outcome {
    /// Stale lines are always shown, even in quiet mode.
    fn is_routine(&self) -> bool {
        !matches!(self, Outcome::Stale { .. })
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Wrote { timestamp } => write!(f, "Wrote data: {timestamp}"),
            Outcome::Fresh { elapsed } => {
                write!(f, "File contents OK ({} old)", duration::format_delta(*elapsed))
            }
            Outcome::Stale {
                elapsed,
                since_start,
            } => write!(
                f,
                "File contents BAD ({} old, {} since start)",
                duration::format_delta(*elapsed),
                duration::format(*since_start)
            ),
        }
    }
}

/// A failure that stops the probe.
#[derive(Debug)]
pub enum ProbeError {
    Write(WriteError),
    Read(ReadError),
    /// Status lines could not be written.
    Output { source: std::io::Error },
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Write(e) => write!(f, "{e}"),
            ProbeError::Read(e) => write!(f, "{e}"),
            ProbeError::Output { source } => write!(f, "failed to write status output: {source}"),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Write(e) => Some(e),
            ProbeError::Read(e) => Some(e),
            ProbeError::Output { source } => Some(source),
        }
    }
}

impl From<WriteError> for ProbeError {
    fn from(e: WriteError) -> Self {
        ProbeError::Write(e)
    }
}

impl From<ReadError> for ProbeError {
    fn from(e: ReadError) -> Self {
        ProbeError::Read(e)
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        ProbeError::Output { source: e }
    }
}

pub struct Scheduler {
    settings: Settings,
    started: Instant,
}

impl Scheduler {
    /// `started` is the run clock, captured once at process start.
    pub fn new(settings: Settings, started: Instant) -> Self {
        Self { settings, started }
    }

    /// Run one pass: write first (if configured), then read (if configured).
    pub fn pass(&self) -> Result<Vec<Outcome>, ProbeError> {
        let mut outcomes = Vec::with_capacity(2);

        if let Some(writer) = &self.settings.writer {
            let timestamp = writer.write(Utc::now())?;
            outcomes.push(Outcome::Wrote { timestamp });
        }

        if let Some(reader) = &self.settings.reader {
            let reading = reader.check(Utc::now(), self.settings.interval)?;
            outcomes.push(match reading.verdict {
                Verdict::Fresh => Outcome::Fresh {
                    elapsed: reading.elapsed,
                },
                Verdict::Stale => {
                    tracing::info!(
                        path = %reader.path().display(),
                        elapsed = %duration::format_delta(reading.elapsed),
                        "marker is stale"
                    );
                    Outcome::Stale {
                        elapsed: reading.elapsed,
                        since_start: self.started.elapsed(),
                    }
                }
            });
        }

        Ok(outcomes)
    }

    /// Run passes until `shutdown` resolves, printing status lines to `out`.
    /// Returns the number of passes run.
    pub async fn run<W, F>(&self, out: &mut W, shutdown: F) -> Result<u64, ProbeError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        self.banner(out)?;
        let passes = drive(self.settings.interval, shutdown, |tick| {
            std::future::ready(self.execute(out, tick))
        })
        .await?;

        writeln!(out, "Done.")?;
        out.flush()?;
        Ok(passes)
    }

    fn banner<W: Write>(&self, out: &mut W) -> Result<(), ProbeError> {
        let every = duration::format(self.settings.interval);
        if self.settings.writer.is_some() {
            writeln!(out, "Writing every {every}")?;
        }
        if self.settings.reader.is_some() {
            writeln!(out, "Reading every {every}")?;
        }
        Ok(())
    }

    fn execute<W: Write>(&self, out: &mut W, tick: u64) -> Result<(), ProbeError> {
        tracing::debug!(tick, "pass starting");
        for outcome in self.pass()? {
            if self.settings.quiet && outcome.is_routine() {
                continue;
            }
            writeln!(out, "{outcome}")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// The tick loop. Calls `pass` once immediately, then once per `interval`,
/// until `shutdown` resolves. Returns the number of passes run.
///
/// `shutdown` is first polled after pass 0 and then only between passes; when
/// it is ready together with a due tick, shutdown wins. A pass that overruns
/// the interval delays the following tick by a full interval instead of
/// firing the missed ones back to back. Any pass error ends the loop.
pub async fn drive<F, P, Fut>(
    interval: Duration,
    shutdown: F,
    mut pass: P,
) -> Result<u64, ProbeError>
where
    F: Future<Output = ()>,
    P: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<(), ProbeError>>,
{
    let mut passes = 0u64;
    pass(passes).await?;
    passes += 1;

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!(passes, "shutdown observed, stopping");
                return Ok(passes);
            }
            _ = ticker.tick() => {
                pass(passes).await?;
                passes += 1;
            }
        }
    }
}
