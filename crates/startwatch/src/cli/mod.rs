use std::sync::atomic::AtomicBool;

use color_eyre::eyre;
use color_eyre::eyre::WrapErr;
use thiserror::Error;

use crate::ui::Ui;

pub mod options;
pub mod run;

pub use options::CliArguments;

/// Set once Ctrl-C was pressed.
pub static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Interrupted by Ctrl-C, finished the requested measurements or stdout was
/// closed.
pub const EXIT_OK: u8 = 0;

/// Starting the profile failed.
pub const EXIT_MEASUREMENT_FAILURE: u8 = 1;

/// Setting up minikube or the export failed.
pub const EXIT_OPERATION_FAILURE: u8 = 2;

/// Something went wrong that nobody reported yet.
pub const EXIT_ERROR: u8 = 3;

/// Marks a setup failure which was already reported.
#[derive(Debug, Error)]
#[error("an operation failed")]
pub struct OperationFailure;

/// Marks a failed start which was already reported.
#[derive(Debug, Error)]
#[error("a measurement failed")]
pub struct MeasurementFailure;

pub struct Context<'a> {
    /// The parsed arguments.
    pub args: &'a CliArguments,

    /// The terminal ui.
    pub ui: &'a Ui,
}

impl<'a> Context<'a> {
    pub fn new(args: &'a CliArguments, ui: &'a Ui) -> Self {
        Self { args, ui }
    }
}

impl Context<'_> {
    pub fn run(&mut self) -> eyre::Result<()> {
        run::run(self)
    }

    /// Flushes the ui.
    pub fn flush(&self) -> eyre::Result<()> {
        self.ui.flush().wrap_err("flushing output")
    }
}
