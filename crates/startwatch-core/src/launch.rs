//! Launching external processes.

use std::fmt::Debug;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::runtime;
use tokio::time;

use crate::tool::Invocation;

/// How often a running child checks for cancellation, its exit is observed
/// immediately.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs invocations to completion.
///
/// # Cancellation
/// Implementations must observe the cancellation flag while the invocation is
/// in flight and return [`LaunchError::Cancelled`] as soon as possible once it
/// is raised.
pub trait Launcher: Debug {
    /// Runs the invocation and waits for it to exit successfully.
    fn launch(&self, invocation: &Invocation, cancellation: &AtomicBool)
    -> Result<(), LaunchError>;
}

impl<L: Launcher + ?Sized> Launcher for &L {
    fn launch(
        &self,
        invocation: &Invocation,
        cancellation: &AtomicBool,
    ) -> Result<(), LaunchError> {
        L::launch(self, invocation, cancellation)
    }
}

impl<L: Launcher + ?Sized> Launcher for Box<L> {
    fn launch(
        &self,
        invocation: &Invocation,
        cancellation: &AtomicBool,
    ) -> Result<(), LaunchError> {
        L::launch(self, invocation, cancellation)
    }
}

impl<L: Launcher + ?Sized> Launcher for Arc<L> {
    fn launch(
        &self,
        invocation: &Invocation,
        cancellation: &AtomicBool,
    ) -> Result<(), LaunchError> {
        L::launch(self, invocation, cancellation)
    }
}

/// Launches invocations as child processes of this process.
///
/// The child's stdout is redirected to this process's stderr and its stderr
/// is inherited, nothing is captured. Each launch drives the child on its own
/// single threaded runtime, so the launcher itself stays synchronous.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    poll_interval: Duration,
}

impl SystemLauncher {
    /// Creates a new launcher with the default poll interval.
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Creates a new launcher which checks for cancellation at the given
    /// interval.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for SystemLauncher {
    fn launch(
        &self,
        invocation: &Invocation,
        cancellation: &AtomicBool,
    ) -> Result<(), LaunchError> {
        if cancellation.load(Ordering::SeqCst) {
            return Err(LaunchError::Cancelled);
        }

        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(LaunchError::Runtime)?;

        runtime.block_on(self.supervise(invocation, cancellation))
    }
}

impl SystemLauncher {
    async fn supervise(
        &self,
        invocation: &Invocation,
        cancellation: &AtomicBool,
    ) -> Result<(), LaunchError> {
        tracing::debug!(%invocation, "spawning");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(io::stderr()))
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(LaunchError::Spawn)?;

        let mut ticks = time::interval(self.poll_interval);

        let status = loop {
            tokio::select! {
                biased;

                status = child.wait() => break status.map_err(LaunchError::Wait)?,
                _ = ticks.tick() => {
                    if !cancellation.load(Ordering::SeqCst) {
                        continue;
                    }

                    tracing::warn!(%invocation, "cancelled, killing child");

                    // the child may have exited in between, in which case
                    // there is nothing left to kill
                    if let Err(err) = child.kill().await {
                        if err.kind() != io::ErrorKind::InvalidInput {
                            return Err(LaunchError::Wait(err));
                        }
                    }

                    return Err(LaunchError::Cancelled);
                }
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(LaunchError::Exit {
                code: status.code(),
            })
        }
    }
}

/// Returned by [`Launcher::launch`].
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The runtime driving the process could not be created.
    #[error("couldn't create the process runtime")]
    Runtime(#[source] io::Error),

    /// The process could not be spawned.
    #[error("couldn't spawn process")]
    Spawn(#[source] io::Error),

    /// Waiting on the process failed.
    #[error("couldn't wait on process")]
    Wait(#[source] io::Error),

    /// The process exited unsuccessfully.
    #[error("{}", exit_message(.code))]
    Exit {
        /// The exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
    },

    /// The invocation was cancelled before it finished.
    #[error("the invocation was cancelled")]
    Cancelled,
}

fn exit_message(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("process exited with status {code}"),
        None => "process was terminated by a signal".to_owned(),
    }
}

impl LaunchError {
    /// Whether this is [`LaunchError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LaunchError::Cancelled)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh", ["-c", script])
    }

    #[test]
    fn test_launch_success() {
        let launcher = SystemLauncher::new();
        launcher
            .launch(&sh("exit 0"), &AtomicBool::new(false))
            .unwrap();
    }

    #[test]
    fn test_launch_exit_is_not_delayed_by_poll_interval() {
        let launcher = SystemLauncher::with_poll_interval(Duration::from_secs(2));

        let start = Instant::now();
        launcher
            .launch(&sh("exit 0"), &AtomicBool::new(false))
            .unwrap();

        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_launch_exit_code() {
        let launcher = SystemLauncher::new();
        let err = launcher
            .launch(&sh("exit 3"), &AtomicBool::new(false))
            .unwrap_err();

        assert!(matches!(err, LaunchError::Exit { code: Some(3) }));
        assert_eq!(err.to_string(), "process exited with status 3");
    }

    #[test]
    fn test_launch_missing_binary() {
        let launcher = SystemLauncher::new();
        let err = launcher
            .launch(
                &Invocation::new("/this/binary/does/not/exist", ["start"]),
                &AtomicBool::new(false),
            )
            .unwrap_err();

        assert!(matches!(err, LaunchError::Spawn(_)));
    }

    #[test]
    fn test_launch_already_cancelled() {
        let launcher = SystemLauncher::new();
        let err = launcher
            .launch(&sh("exit 0"), &AtomicBool::new(true))
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[test]
    fn test_launch_cancel_in_flight() {
        let launcher = SystemLauncher::with_poll_interval(Duration::from_millis(10));
        let cancellation = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&cancellation);
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        });

        let start = Instant::now();
        let err = launcher.launch(&sh("sleep 10"), &cancellation).unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
