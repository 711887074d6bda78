//! Registration and export of the start time metric.
//!
//! The metric is a gauge, i.e. only the most recently recorded sample is kept
//! and exported. Samples are rendered in the Prometheus text format and pushed
//! to a [`Sink`] at a fixed interval from a background thread. The reporter
//! pushes once more when it is shut down or dropped, so that the last sample
//! isn't lost on exit.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use metrics::Gauge;
use metrics::Key;
use metrics::KeyName;
use metrics::Label;
use metrics::Level;
use metrics::Metadata;
use metrics::Recorder;
use metrics::SharedString;
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusBuilder;
use metrics_exporter_prometheus::PrometheusHandle;
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::sample::Labels;
use crate::sample::Sample;

/// The name of the metric without its prefix.
pub const METRIC_NAME: &str = "start_time";

/// The human readable description of the metric.
pub const METRIC_DESCRIPTION: &str = "Minikube start time";

/// The push gateway used if none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:9091";

/// The project the metric is reported under if none is configured.
pub const DEFAULT_PROJECT: &str = "minikube-performance";

/// The metric prefix used if none is configured.
pub const DEFAULT_PREFIX: &str = "minikube_performance_trace";

/// The export interval used if none is configured.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// The timeout for a single push.
const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// The content type of the Prometheus text exposition format.
const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

static METRIC_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("the metric name regex is valid")
});

/// Where and how often the metric is exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// The base URL of the push gateway.
    pub endpoint: String,

    /// The project the metric belongs to, this is used as the job name.
    pub project: String,

    /// The prefix prepended to the metric name.
    pub prefix: String,

    /// How often recorded samples are pushed.
    pub interval: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            project: DEFAULT_PROJECT.into(),
            prefix: DEFAULT_PREFIX.into(),
            interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl ExportConfig {
    /// The full name of the metric including its prefix.
    pub fn metric_name(&self) -> String {
        if self.prefix.is_empty() {
            METRIC_NAME.into()
        } else {
            format!("{}_{}", self.prefix, METRIC_NAME)
        }
    }
}

/// A destination for rendered metrics.
pub trait Sink: Debug + Send + Sync {
    /// Exports the rendered metrics.
    fn export(&self, body: &str) -> Result<(), ExportError>;
}

/// A sink which pushes to a Prometheus push gateway.
#[derive(Debug, Clone)]
pub struct PushGateway {
    client: Client,
    url: Url,
}

impl PushGateway {
    /// Creates a new push gateway sink for the given config.
    pub fn new(config: &ExportConfig) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason,
        };

        if config.project.is_empty() {
            return Err(Error::EmptyProject);
        }

        let mut url = Url::parse(&config.endpoint).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }

        url.path_segments_mut()
            .map_err(|_| invalid("URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["metrics", "job", config.project.as_str()]);

        let client = Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .map_err(Error::Client)?;

        Ok(Self { client, url })
    }

    /// The URL metrics are pushed to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Sink for PushGateway {
    fn export(&self, body: &str) -> Result<(), ExportError> {
        self.client
            .put(self.url.clone())
            .header(CONTENT_TYPE, TEXT_FORMAT)
            .body(body.to_owned())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(ExportError::Push)?;

        Ok(())
    }
}

/// Records samples of the start time gauge and exports them.
///
/// # Lifecycle
/// The reporter is created with the metric already registered,
/// [`MetricReporter::start`] begins the periodic export and
/// [`MetricReporter::shutdown`] stops it and flushes. Dropping the reporter
/// performs the shutdown as well, logging any error.
pub struct MetricReporter {
    name: String,
    handle: PrometheusHandle,
    gauge: Gauge,
    sink: Option<Arc<dyn Sink>>,
    interval: Duration,
    recorded: Arc<AtomicUsize>,
    exporter: Option<ExportThread>,
    finished: bool,
}

impl Debug for MetricReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricReporter")
            .field("name", &self.name)
            .field("sink", &self.sink)
            .field("interval", &self.interval)
            .field("recorded", &self.recorded())
            .field("running", &self.exporter.is_some())
            .finish_non_exhaustive()
    }
}

impl MetricReporter {
    /// Registers the metric with the given static labels.
    ///
    /// If `sink` is `None` samples are recorded but never exported.
    pub fn new(
        labels: Labels,
        config: ExportConfig,
        sink: Option<Arc<dyn Sink>>,
    ) -> Result<Self, Error> {
        let name = config.metric_name();
        if !METRIC_NAME_RE.is_match(&name) {
            return Err(Error::InvalidMetricName(name));
        }

        if config.interval.is_zero() {
            return Err(Error::ZeroInterval);
        }

        let recorder = PrometheusBuilder::new().build_recorder();

        recorder.describe_gauge(
            KeyName::from(name.clone()),
            Some(Unit::Seconds),
            SharedString::from(METRIC_DESCRIPTION),
        );

        let key = Key::from_parts(
            name.clone(),
            labels
                .pairs()
                .into_iter()
                .map(|(key, value)| Label::new(key, value.to_owned()))
                .collect::<Vec<_>>(),
        );
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));
        let gauge = recorder.register_gauge(&key, &metadata);

        tracing::debug!(metric = %name, ?labels, "registered metric");

        Ok(Self {
            name,
            handle: recorder.handle(),
            gauge,
            sink,
            interval: config.interval,
            recorded: Arc::new(AtomicUsize::new(0)),
            exporter: None,
            finished: false,
        })
    }
}

impl MetricReporter {
    /// The number of samples recorded so far.
    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }

    /// Records a sample, replacing the previous one.
    pub fn record(&self, sample: &Sample) {
        self.gauge.set(sample.seconds());
        self.recorded.fetch_add(1, Ordering::SeqCst);
    }

    /// Renders the current state of the metric in the Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Starts the periodic background export, this does nothing if there is
    /// no sink or the export is already running.
    pub fn start(&mut self) -> Result<(), Error> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };

        if self.exporter.is_some() {
            return Ok(());
        }

        let (stop, stopped) = mpsc::channel();
        let handle = self.handle.clone();
        let sink = Arc::clone(sink);
        let recorded = Arc::clone(&self.recorded);
        let interval = self.interval;

        let thread = thread::Builder::new()
            .name(format!("{}-export", crate::TOOL_NAME))
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if let Err(err) = push(&handle, &*sink, &recorded) {
                        tracing::error!(error = %err, "periodic export failed");
                    }
                }
            })
            .map_err(Error::Spawn)?;

        self.exporter = Some(ExportThread { stop, thread });
        tracing::debug!(interval = ?self.interval, "started export");

        Ok(())
    }

    /// Stops the background export and flushes the last recorded sample.
    pub fn shutdown(mut self) -> Result<(), ExportError> {
        self.finish()
    }

    /// Pushes the current state immediately.
    pub fn flush(&self) -> Result<(), ExportError> {
        match &self.sink {
            Some(sink) => push(&self.handle, &**sink, &self.recorded),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        if let Some(exporter) = self.exporter.take() {
            exporter.stop();
        }

        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.flush()
    }
}

impl Drop for MetricReporter {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            tracing::error!(error = %err, "final export failed");
        }
    }
}

/// Pushes the rendered metrics to the sink, unless nothing was recorded yet.
fn push(
    handle: &PrometheusHandle,
    sink: &dyn Sink,
    recorded: &AtomicUsize,
) -> Result<(), ExportError> {
    if recorded.load(Ordering::SeqCst) == 0 {
        tracing::debug!("nothing recorded yet, skipping export");
        return Ok(());
    }

    handle.run_upkeep();
    let body = handle.render();

    tracing::debug!(bytes = body.len(), "exporting metrics");
    sink.export(&body)
}

#[derive(Debug)]
struct ExportThread {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl ExportThread {
    fn stop(self) {
        // the thread only exits early if it panicked, which join reports
        let _ = self.stop.send(());

        if self.thread.join().is_err() {
            tracing::error!("export thread panicked");
        }
    }
}

/// Returned by [`MetricReporter::new`], [`MetricReporter::start`] and
/// [`PushGateway::new`].
#[derive(Debug, Error)]
pub enum Error {
    /// The metric name is not a valid Prometheus metric name.
    #[error("invalid metric name {0:?}")]
    InvalidMetricName(String),

    /// The export interval was zero.
    #[error("the export interval must not be zero")]
    ZeroInterval,

    /// The project was empty.
    #[error("the project must not be empty")]
    EmptyProject,

    /// The push gateway endpoint is not a valid URL.
    #[error("invalid export endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The configured endpoint.
        endpoint: String,

        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be created.
    #[error("couldn't create the HTTP client")]
    Client(#[source] reqwest::Error),

    /// The export thread could not be spawned.
    #[error("couldn't spawn the export thread")]
    Spawn(#[source] std::io::Error),
}

/// Returned by [`Sink::export`].
#[derive(Debug, Error)]
pub enum ExportError {
    /// Pushing to the gateway failed.
    #[error("couldn't push metrics")]
    Push(#[source] reqwest::Error),

    /// A catch-all variant for user implementations.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// A sink which keeps every exported body.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) bodies: Mutex<Vec<String>>,
    }

    impl Sink for RecordingSink {
        fn export(&self, body: &str) -> Result<(), ExportError> {
            self.bodies.lock().unwrap().push(body.to_owned());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingSink;

    impl Sink for FailingSink {
        fn export(&self, _body: &str) -> Result<(), ExportError> {
            Err(ExportError::Other("backend unavailable".into()))
        }
    }

    fn labels() -> Labels {
        Labels::new("docker")
    }

    #[test]
    fn test_metric_name() {
        assert_eq!(
            ExportConfig::default().metric_name(),
            "minikube_performance_trace_start_time"
        );

        let config = ExportConfig {
            prefix: String::new(),
            ..Default::default()
        };
        assert_eq!(config.metric_name(), "start_time");
    }

    #[test]
    fn test_invalid_metric_name() {
        let config = ExportConfig {
            prefix: "minikube/performance".into(),
            ..Default::default()
        };

        let err = MetricReporter::new(labels(), config, None).unwrap_err();
        assert!(matches!(err, Error::InvalidMetricName(_)));
    }

    #[test]
    fn test_zero_interval() {
        let config = ExportConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };

        let err = MetricReporter::new(labels(), config, None).unwrap_err();
        assert!(matches!(err, Error::ZeroInterval));
    }

    #[test]
    fn test_record_keeps_last_value() {
        let reporter = MetricReporter::new(labels(), ExportConfig::default(), None).unwrap();

        reporter.record(&Sample::new(Duration::from_secs(12)));
        reporter.record(&Sample::new(Duration::from_secs(45)));

        let rendered = reporter.render();
        assert_eq!(reporter.recorded(), 2);
        assert!(rendered.contains("# HELP minikube_performance_trace_start_time"));
        assert!(rendered.contains(r#"driver="docker""#));
        assert!(rendered.contains(&format!(r#"os="{}""#, std::env::consts::OS)));

        let values: Vec<f64> = rendered
            .lines()
            .filter(|line| line.starts_with("minikube_performance_trace_start_time{"))
            .filter_map(|line| line.rsplit(' ').next()?.parse().ok())
            .collect();
        assert_eq!(values, [45.0]);
    }

    #[test]
    fn test_shutdown_flushes() {
        let sink = Arc::new(RecordingSink::default());
        let mut reporter = MetricReporter::new(
            labels(),
            ExportConfig::default(),
            Some(sink.clone() as Arc<dyn Sink>),
        )
        .unwrap();

        reporter.start().unwrap();
        reporter.record(&Sample::new(Duration::from_secs(45)));
        reporter.shutdown().unwrap();

        let bodies = sink.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].contains("minikube_performance_trace_start_time"));
    }

    #[test]
    fn test_drop_flushes() {
        let sink = Arc::new(RecordingSink::default());
        {
            let reporter = MetricReporter::new(
                labels(),
                ExportConfig::default(),
                Some(sink.clone() as Arc<dyn Sink>),
            )
            .unwrap();
            reporter.record(&Sample::new(Duration::from_secs(3)));
        }

        assert_eq!(sink.bodies.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_nothing_recorded_nothing_exported() {
        let sink = Arc::new(RecordingSink::default());
        let mut reporter = MetricReporter::new(
            labels(),
            ExportConfig::default(),
            Some(sink.clone() as Arc<dyn Sink>),
        )
        .unwrap();

        reporter.start().unwrap();
        reporter.shutdown().unwrap();

        assert!(sink.bodies.lock().unwrap().is_empty());
    }

    #[test]
    fn test_periodic_export() {
        let sink = Arc::new(RecordingSink::default());
        let config = ExportConfig {
            interval: Duration::from_millis(20),
            ..Default::default()
        };
        let mut reporter =
            MetricReporter::new(labels(), config, Some(sink.clone() as Arc<dyn Sink>)).unwrap();

        reporter.record(&Sample::new(Duration::from_secs(1)));
        reporter.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        reporter.shutdown().unwrap();

        // at least one periodic push plus the final flush
        assert!(sink.bodies.lock().unwrap().len() >= 2);
    }

    #[test]
    fn test_shutdown_reports_export_failure() {
        let reporter = MetricReporter::new(
            labels(),
            ExportConfig::default(),
            Some(Arc::new(FailingSink) as Arc<dyn Sink>),
        )
        .unwrap();

        reporter.record(&Sample::new(Duration::from_secs(1)));
        assert!(reporter.shutdown().is_err());
    }

    #[test]
    fn test_push_gateway_url() {
        let gateway = PushGateway::new(&ExportConfig::default()).unwrap();
        assert_eq!(
            gateway.url().as_str(),
            "http://localhost:9091/metrics/job/minikube-performance"
        );

        let gateway = PushGateway::new(&ExportConfig {
            endpoint: "https://gateway.example.com/push/".into(),
            project: "perf".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            gateway.url().as_str(),
            "https://gateway.example.com/push/metrics/job/perf"
        );
    }

    #[test]
    fn test_push_gateway_invalid_endpoint() {
        let err = PushGateway::new(&ExportConfig {
            endpoint: "not a url".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));

        let err = PushGateway::new(&ExportConfig {
            endpoint: "ftp://gateway.example.com".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));

        let err = PushGateway::new(&ExportConfig {
            project: String::new(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::EmptyProject));
    }
}
