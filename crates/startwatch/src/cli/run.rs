use std::error::Error;
use std::iter;
use std::sync::Arc;

use color_eyre::eyre;
use startwatch_core::Labels;
use startwatch_core::MetricReporter;
use startwatch_core::Monitor;
use startwatch_core::SystemLauncher;
use startwatch_core::TimedRunner;
use startwatch_core::Tool;
use startwatch_core::monitor;
use startwatch_core::monitor::MonitorOptions;
use startwatch_core::monitor::Progress;
use startwatch_core::reporter;
use startwatch_core::reporter::ExportConfig;
use startwatch_core::reporter::PushGateway;
use startwatch_core::reporter::Sink;
use startwatch_core::tool;

use super::CANCELLED;
use super::Context;
use super::MeasurementFailure;
use super::OperationFailure;
use crate::report::Reporter;

pub fn run(ctx: &mut Context) -> eyre::Result<()> {
    let tool = match Tool::minikube(None) {
        Ok(tool) => tool,
        Err(err) => {
            ctx.ui.error(&err)?;
            eyre::bail!(OperationFailure);
        }
    };

    if !tool.path().try_exists()? {
        ctx.ui.error(format_args!(
            "minikube not found at '{}'",
            tool.path().display()
        ))?;
        ctx.ui.hint(format_args!(
            "build minikube into $HOME/{}",
            tool::DEFAULT_RELATIVE_PATH.join("/")
        ))?;
        eyre::bail!(OperationFailure);
    }

    let export = ExportConfig::default();
    let metrics = match setup_export(&tool, &export) {
        Ok(metrics) => metrics,
        Err(err) => {
            ctx.ui.error(format_args!(
                "couldn't set up the metric export: {}",
                one_line(&err)
            ))?;
            eyre::bail!(OperationFailure);
        }
    };

    let console = Reporter::new(ctx.ui);
    console.report_start(&tool, monitor::DEFAULT_INTERVAL, &export)?;

    let monitor = Monitor::new(
        TimedRunner::new(SystemLauncher::new(), tool, &CANCELLED),
        MonitorOptions {
            interval: monitor::DEFAULT_INTERVAL,
            iterations: ctx.args.iterations,
        },
    );

    let session = monitor.run_to_end(metrics, |progress| match progress {
        Progress::Starting {
            iteration,
            invocation,
        } => console.report_attempt(iteration, invocation),
        Progress::Measured { iteration, sample } => console.report_sample(iteration, sample),
    });

    if let Err(err) = session.flush {
        tracing::error!(error = %err, "final export failed");
        ctx.ui.warn(format_args!(
            "couldn't push the last sample: {}",
            one_line(&err)
        ))?;
    }

    match session.result {
        Ok(summary) => Ok(console.report_end(&summary)?),
        Err(monitor::Error::Measure(err)) => {
            ctx.ui.error(one_line(&err))?;
            eyre::bail!(MeasurementFailure);
        }
        Err(monitor::Error::Observe(err)) => Err(err.into()),
    }
}

/// Registers the metric and starts pushing it to the gateway.
fn setup_export(tool: &Tool, export: &ExportConfig) -> Result<MetricReporter, reporter::Error> {
    let gateway = PushGateway::new(export)?;
    let mut metrics = MetricReporter::new(
        Labels::new(tool.driver()),
        export.clone(),
        Some(Arc::new(gateway) as Arc<dyn Sink>),
    )?;
    metrics.start()?;

    Ok(metrics)
}

/// Joins an error and its sources into a single line.
fn one_line(err: &(dyn Error + 'static)) -> String {
    iter::successors(Some(err), |&err| err.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
