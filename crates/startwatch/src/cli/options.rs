use std::num::NonZeroUsize;

use clap::Args;
use clap::ColorChoice;
use clap::Parser;
use tracing::level_filters::LevelFilter;

static AFTER_LONG_HELP: &str = "\
Exit codes:
  0  Interrupted by Ctrl-C
  1  Starting the profile failed
  2  minikube or the metric export couldn't be set up
  3  An unexpected error occurred";

/// Repeatedly start the cloud-monitoring minikube profile and report how long
/// it took
///
/// The profile is started with the docker driver every 30 seconds and deleted
/// again after each attempt. Start times are printed and pushed to the local
/// Prometheus push gateway.
#[derive(Parser, Debug, Clone)]
#[command(version, after_long_help = AFTER_LONG_HELP)]
pub struct CliArguments {
    /// Stop after this many measurements
    #[arg(long, value_name = "N", hide = true)]
    pub iterations: Option<NonZeroUsize>,

    #[command(flatten, next_help_heading = "Output Options")]
    pub output: OutputArgs,
}

/// Options for configuring the CLI output.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// When to use colorful output
    #[arg(
        long,
        value_name = "WHEN",
        require_equals = true,
        num_args = 0..=1,
        default_value = "auto",
        default_missing_value = "always",
    )]
    pub color: ColorChoice,

    /// Log more [-v ... -vvvv]
    ///
    /// Errors are always logged, each flag adds WARN, INFO, DEBUG and TRACE in
    /// that order.
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl OutputArgs {
    /// The most verbose level to log.
    pub fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::ERROR,
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            3 => LevelFilter::DEBUG,
            4.. => LevelFilter::TRACE,
        }
    }

    /// The color choice for termcolor.
    pub fn color_choice(&self) -> termcolor::ColorChoice {
        match self.color {
            ColorChoice::Auto => termcolor::ColorChoice::Auto,
            ColorChoice::Always => termcolor::ColorChoice::Always,
            ColorChoice::Never => termcolor::ColorChoice::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_debug_assert() {
        CliArguments::command().debug_assert();
    }

    #[test]
    fn test_iterations() {
        let args = CliArguments::parse_from(["startwatch"]);
        assert_eq!(args.iterations, None);

        let args = CliArguments::parse_from(["startwatch", "--iterations", "2"]);
        assert_eq!(args.iterations, NonZeroUsize::new(2));

        assert!(CliArguments::try_parse_from(["startwatch", "--iterations", "0"]).is_err());
    }

    #[test]
    fn test_no_measurement_options() {
        for flag in ["--driver", "--profile", "--config", "--endpoint", "--interval"] {
            assert!(
                CliArguments::try_parse_from(["startwatch", flag, "x"]).is_err(),
                "{flag} must not be accepted"
            );
        }

        let help = CliArguments::command().render_long_help().to_string();
        assert!(help.contains("Exit codes:"));
        assert!(!help.contains("--iterations"));
    }

    #[test]
    fn test_verbosity() {
        fn level(args: &[&str]) -> LevelFilter {
            CliArguments::parse_from(args).output.level()
        }

        assert_eq!(level(&["startwatch"]), LevelFilter::ERROR);
        assert_eq!(level(&["startwatch", "-vv"]), LevelFilter::INFO);
        assert_eq!(level(&["startwatch", "-vvvvv"]), LevelFilter::TRACE);
    }
}
