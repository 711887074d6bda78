//! The measurement loop.

use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::launch::Launcher;
use crate::reporter::ExportError;
use crate::reporter::MetricReporter;
use crate::runner;
use crate::runner::TimedRunner;
use crate::sample::Sample;
use crate::tool::Invocation;

/// The pause between two measurements if none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// The granularity at which the pause between measurements observes
/// cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Options for a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// The pause between the end of one measurement's cleanup and the start
    /// of the next measurement.
    pub interval: Duration,

    /// The number of measurements after which to stop, or `None` to run until
    /// cancelled.
    pub iterations: Option<NonZeroUsize>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            iterations: None,
        }
    }
}

/// Summary of a finished monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorSummary {
    /// The number of samples which were recorded.
    pub iterations: usize,

    /// Whether the session ended because of a cancellation request.
    pub cancelled: bool,
}

/// Progress of a monitoring session as seen by the observer of
/// [`Monitor::run`]. Iterations are counted from one.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    /// The profile is about to be started.
    Starting {
        /// The iteration this attempt belongs to.
        iteration: usize,

        /// The invocation which is being timed.
        invocation: &'a Invocation,
    },

    /// The profile was started and deleted again.
    Measured {
        /// The iteration this sample belongs to.
        iteration: usize,

        /// The measured sample.
        sample: &'a Sample,
    },
}

/// The outcome of [`Monitor::run_to_end`].
#[derive(Debug)]
pub struct Session {
    /// How the measurement loop ended.
    pub result: Result<MonitorSummary, Error>,

    /// The outcome of the final export.
    pub flush: Result<(), ExportError>,
}

/// Repeatedly measures profile starts and hands the samples to a reporter.
///
/// # Failure
/// A failed measurement ends the session immediately, no further measurement
/// is attempted and no sample is recorded for it.
#[derive(Debug)]
pub struct Monitor<'c, L> {
    runner: TimedRunner<'c, L>,
    options: MonitorOptions,
}

impl<'c, L: Launcher> Monitor<'c, L> {
    /// Creates a new monitor.
    pub fn new(runner: TimedRunner<'c, L>, options: MonitorOptions) -> Self {
        Self { runner, options }
    }

    /// Runs the measurement loop like [`Monitor::run`] and shuts the reporter
    /// down once it ended, no matter how.
    pub fn run_to_end<F>(&self, reporter: MetricReporter, observe: F) -> Session
    where
        F: FnMut(Progress<'_>) -> io::Result<()>,
    {
        let result = self.run(&reporter, observe);
        let flush = reporter.shutdown();

        Session { result, flush }
    }

    /// Runs the measurement loop until the iteration limit is reached, a
    /// measurement fails or cancellation is requested.
    ///
    /// Each attempt is announced to `observe` before it starts, each sample is
    /// passed to `observe` and then recorded in the reporter.
    pub fn run<F>(&self, reporter: &MetricReporter, mut observe: F) -> Result<MonitorSummary, Error>
    where
        F: FnMut(Progress<'_>) -> io::Result<()>,
    {
        let mut summary = MonitorSummary::default();

        loop {
            if self.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let iteration = summary.iterations + 1;
            let invocation = self.runner.tool().start();
            observe(Progress::Starting {
                iteration,
                invocation: &invocation,
            })
            .map_err(Error::Observe)?;

            let sample = match self.runner.measure() {
                Ok(sample) => sample,
                Err(err) if err.is_cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                Err(err) => return Err(Error::Measure(err)),
            };

            observe(Progress::Measured {
                iteration,
                sample: &sample,
            })
            .map_err(Error::Observe)?;
            reporter.record(&sample);
            summary.iterations += 1;

            if self
                .options
                .iterations
                .is_some_and(|limit| summary.iterations >= limit.get())
            {
                break;
            }

            tracing::debug!(interval = ?self.options.interval, "sleeping");
            if !self.sleep(self.options.interval) {
                summary.cancelled = true;
                break;
            }
        }

        Ok(summary)
    }

    fn is_cancelled(&self) -> bool {
        self.runner.cancellation().load(Ordering::SeqCst)
    }

    /// Sleeps for the given duration, returns `false` if the sleep was
    /// interrupted by a cancellation request.
    fn sleep(&self, duration: Duration) -> bool {
        sleep_cancellable(duration, self.runner.cancellation())
    }
}

fn sleep_cancellable(duration: Duration, cancellation: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;

    loop {
        if cancellation.load(Ordering::SeqCst) {
            return false;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }

        thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

/// Returned by [`Monitor::run`].
#[derive(Debug, Error)]
pub enum Error {
    /// A measurement failed.
    #[error("a measurement failed")]
    Measure(#[source] runner::Error),

    /// The sample observer failed.
    #[error("couldn't report a sample")]
    Observe(#[source] io::Error),
}
