//! Reporting of monitoring progress on the terminal.

use std::io;
use std::io::Write;
use std::time::Duration;

use chrono::TimeDelta;
use startwatch_core::Invocation;
use startwatch_core::Sample;
use startwatch_core::Tool;
use startwatch_core::monitor::MonitorSummary;
use startwatch_core::reporter::ExportConfig;
use termcolor::Color;

use crate::ui;
use crate::ui::Ui;

/// Reports samples and the monitoring session on the terminal.
///
/// Only the latency lines are written to stdout, everything else goes to
/// stderr.
pub struct Reporter<'ui> {
    ui: &'ui Ui,
}

impl<'ui> Reporter<'ui> {
    pub fn new(ui: &'ui Ui) -> Self {
        Self { ui }
    }
}

impl Reporter<'_> {
    /// Reports the start of a monitoring session.
    pub fn report_start(
        &self,
        tool: &Tool,
        interval: Duration,
        export: &ExportConfig,
    ) -> io::Result<()> {
        let mut w = self.ui.stderr();

        ui::status(&mut w, "Monitoring", Color::Green)?;
        write!(w, "profile ")?;
        ui::paint(&mut w, &ui::bold(None), format_args!("{}", tool.profile()))?;
        write!(w, " with driver ")?;
        ui::paint(&mut w, &ui::bold(None), format_args!("{}", tool.driver()))?;
        writeln!(w, " every {}s", interval.as_secs())?;

        ui::status(&mut w, "Tool", Color::Cyan)?;
        writeln!(w, "{}", tool.path().display())?;

        ui::status(&mut w, "Export", Color::Cyan)?;
        write!(w, "{} as job ", export.endpoint)?;
        ui::paint(&mut w, &ui::bold(None), format_args!("{}", export.project))?;
        writeln!(w, " every {}s", export.interval.as_secs())
    }

    /// Reports that an attempt is about to start the profile.
    pub fn report_attempt(&self, iteration: usize, invocation: &Invocation) -> io::Result<()> {
        let mut w = self.ui.stderr();

        ui::status(&mut w, "Running", Color::Cyan)?;
        write!(w, "#")?;
        ui::paint(&mut w, &ui::bold(None), format_args!("{iteration}"))?;
        writeln!(w, " {invocation}")
    }

    /// Reports a single sample.
    pub fn report_sample(&self, iteration: usize, sample: &Sample) -> io::Result<()> {
        writeln!(self.ui.stdout(), "{sample}")?;

        let mut w = self.ui.stderr();

        ui::status(&mut w, "Measured", Color::Green)?;
        write!(w, "#")?;
        ui::paint(&mut w, &ui::bold(None), format_args!("{iteration}"))?;
        write!(w, " took ")?;
        ui::paint(
            &mut w,
            &ui::fg(duration_color(sample.elapsed())),
            format_args!("{}", HumanDuration(sample.elapsed())),
        )?;
        writeln!(w, " at {}", sample.recorded_at().format("%Y-%m-%d %H:%M:%S UTC"))
    }

    /// Reports the end of a monitoring session.
    pub fn report_end(&self, summary: &MonitorSummary) -> io::Result<()> {
        let (header, color) = if summary.cancelled {
            ("Cancelled", Color::Yellow)
        } else {
            ("Finished", Color::Green)
        };

        let mut w = self.ui.stderr();

        ui::status(&mut w, header, color)?;
        write!(w, "after ")?;
        ui::paint(&mut w, &ui::bold(None), format_args!("{}", summary.iterations))?;
        writeln!(
            w,
            " {}",
            if summary.iterations == 1 {
                "measurement"
            } else {
                "measurements"
            }
        )
    }
}

/// Displays a duration as minutes, seconds and milliseconds.
struct HumanDuration(Duration);

impl std::fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let delta = TimeDelta::from_std(self.0).unwrap_or(TimeDelta::MAX);
        let m = delta.num_minutes();
        let s = delta.num_seconds() % 60;
        let ms = delta.subsec_nanos() / 1_000_000;

        if m > 0 {
            write!(f, "{m}m ")?;
        }

        write!(f, "{s}s {ms:03}ms")
    }
}

/// Returns the color to use for a start duration.
fn duration_color(duration: Duration) -> Color {
    match duration.as_secs() {
        0..30 => Color::Green,
        30..60 => Color::Yellow,
        _ => Color::Red,
    }
}
