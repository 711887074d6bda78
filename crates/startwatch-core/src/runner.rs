//! The timed runner, which measures a single profile start.

use std::sync::atomic::AtomicBool;
use std::time::Instant;

use thiserror::Error;

use crate::launch::LaunchError;
use crate::launch::Launcher;
use crate::sample::Sample;
use crate::tool::Invocation;
use crate::tool::Tool;

/// The cleanup invocation is never cancelled, it must always get the chance to
/// tear down the profile.
static NEVER_CANCELLED: AtomicBool = AtomicBool::new(false);

/// Measures how long the tool takes to start a profile.
///
/// Every measurement is followed by exactly one attempt to delete the profile
/// again, regardless of whether the start succeeded, failed or was cancelled.
#[derive(Debug)]
pub struct TimedRunner<'c, L> {
    launcher: L,
    tool: Tool,
    cancellation: &'c AtomicBool,
}

impl<'c, L: Launcher> TimedRunner<'c, L> {
    /// Creates a new runner for the given tool.
    pub fn new(launcher: L, tool: Tool, cancellation: &'c AtomicBool) -> Self {
        Self {
            launcher,
            tool,
            cancellation,
        }
    }

    /// The tool this runner invokes.
    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    /// The cancellation flag this runner observes.
    pub fn cancellation(&self) -> &'c AtomicBool {
        self.cancellation
    }

    /// Starts the profile, measures the wall-clock time this took and deletes
    /// the profile again.
    ///
    /// A failure to delete the profile is logged, but does not affect the
    /// returned sample.
    pub fn measure(&self) -> Result<Sample, Error> {
        let start = self.tool.start();

        let _teardown = Teardown {
            launcher: &self.launcher,
            invocation: self.tool.delete(),
        };

        tracing::info!(invocation = %start, "starting profile");

        let now = Instant::now();
        self.launcher
            .launch(&start, self.cancellation)
            .map_err(|source| Error::Start {
                invocation: start.clone(),
                source,
            })?;
        let elapsed = now.elapsed();

        tracing::info!(seconds = elapsed.as_secs_f64(), "profile started");

        Ok(Sample::new(elapsed))
    }
}

/// Deletes the profile when dropped.
struct Teardown<'l, L: Launcher> {
    launcher: &'l L,
    invocation: Invocation,
}

impl<L: Launcher> Drop for Teardown<'_, L> {
    fn drop(&mut self) {
        tracing::info!(invocation = %self.invocation, "deleting profile");

        if let Err(err) = self.launcher.launch(&self.invocation, &NEVER_CANCELLED) {
            tracing::error!(
                invocation = %self.invocation,
                error = %err,
                "error deleting profile",
            );
        }
    }
}

/// Returned by [`TimedRunner::measure`].
#[derive(Debug, Error)]
pub enum Error {
    /// The start invocation failed, no sample was taken.
    #[error("running `{invocation}` failed")]
    Start {
        /// The invocation which failed.
        invocation: Invocation,

        /// The inner error.
        #[source]
        source: LaunchError,
    },
}

impl Error {
    /// Whether the start invocation was cancelled rather than failing on its
    /// own.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Start { source, .. } => source.is_cancelled(),
        }
    }
}
