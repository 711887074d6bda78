//! Repeatedly starts a minikube profile and reports how long it took.

use std::io;
use std::io::Write;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_tree::HierarchicalLayer;

use crate::cli::CliArguments;
use crate::cli::Context;
use crate::cli::MeasurementFailure;
use crate::cli::OperationFailure;
use crate::ui::Ui;

mod cli;
mod report;
mod ui;

fn main() -> ExitCode {
    match main_impl() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::from(cli::EXIT_ERROR)
        }
    }
}

fn main_impl() -> eyre::Result<ExitCode> {
    let args = CliArguments::parse();

    color_eyre::install()?;

    let ui = Ui::new(args.output.color_choice());

    tracing_subscriber::registry()
        .with(
            HierarchicalLayer::new(2)
                .with_targets(true)
                .with_ansi(ui.supports_color()),
        )
        .with(Targets::new().with_target(startwatch_core::TOOL_NAME, args.output.level()))
        .init();

    if let Err(err) = ctrlc::set_handler(|| {
        cli::CANCELLED.store(true, Ordering::SeqCst);
    }) {
        ui.warn(format_args!("couldn't install the Ctrl-C handler: {err}"))?;
        ui.hint("interrupting now leaves the profile behind")?;
    }

    let mut ctx = Context::new(&args, &ui);
    let exit_code = exit_code(ctx.run(), &ui)?;

    if let Err(err) = ctx.flush() {
        tracing::debug!(?err, "couldn't flush output");
    }

    Ok(ExitCode::from(exit_code))
}

/// Maps the outcome of a run to an exit code, failures marked by the cli were
/// already reported to the user.
fn exit_code(result: eyre::Result<()>, ui: &Ui) -> io::Result<u8> {
    let Err(err) = result else {
        return Ok(cli::EXIT_OK);
    };

    if err.chain().any(|cause| cause.is::<MeasurementFailure>()) {
        return Ok(cli::EXIT_MEASUREMENT_FAILURE);
    }

    if err.chain().any(|cause| cause.is::<OperationFailure>()) {
        return Ok(cli::EXIT_OPERATION_FAILURE);
    }

    // nobody is left to read the latency lines
    if err
        .root_cause()
        .downcast_ref::<io::Error>()
        .is_some_and(|err| err.kind() == io::ErrorKind::BrokenPipe)
    {
        return Ok(cli::EXIT_OK);
    }

    ui.error(format_args!(
        "startwatch failed unexpectedly, please file an issue at {}",
        env!("CARGO_PKG_REPOSITORY")
    ))?;
    writeln!(ui.stderr(), "{err:?}")?;

    Ok(cli::EXIT_ERROR)
}
