//! The core library of the startwatch latency monitor.
//!
//! A [`Monitor`] repeatedly starts a minikube profile through a
//! [`TimedRunner`], hands every measured [`Sample`] to a [`MetricReporter`]
//! and tears the profile down again after each attempt.

pub mod launch;
pub mod monitor;
pub mod reporter;
pub mod runner;
pub mod sample;
pub mod tool;

pub use launch::{Launcher, SystemLauncher};
pub use monitor::{Monitor, MonitorSummary};
pub use reporter::MetricReporter;
pub use runner::TimedRunner;
pub use sample::{Labels, Sample};
pub use tool::{Invocation, Tool};

/// The tool name, this is used for the log target and the export thread name.
pub const TOOL_NAME: &str = "startwatch";
