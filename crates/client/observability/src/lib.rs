use std::fmt::Display;

use fp_resilience::{RequestCounters, RequestObserver, RequestStats};
use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::{global, InstrumentationScope, KeyValue};
use tracing_core::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber: human-readable output, filtered by `RUST_LOG` (default `info`).
pub fn setup_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env()?)
        .try_init()?;
    Ok(())
}

/// Meter for a fastsync crate, tagged with the crate name.
pub fn crate_meter(crate_name: &'static str) -> Meter {
    global::meter_with_scope(
        InstrumentationScope::builder(format!("crates.{crate_name}.opentelemetry"))
            .with_attributes([KeyValue::new("crate", crate_name)])
            .build(),
    )
}

pub trait GaugeType<T> {
    fn register_gauge(meter: &Meter, name: String, description: String, unit: String) -> Gauge<T>;
}

impl GaugeType<f64> for f64 {
    fn register_gauge(meter: &Meter, name: String, description: String, unit: String) -> Gauge<f64> {
        meter.f64_gauge(name).with_description(description).with_unit(unit).build()
    }
}
impl GaugeType<u64> for u64 {
    fn register_gauge(meter: &Meter, name: String, description: String, unit: String) -> Gauge<u64> {
        meter.u64_gauge(name).with_description(description).with_unit(unit).build()
    }
}

pub fn register_gauge_metric_instrument<T: GaugeType<T> + Display>(
    crate_meter: &Meter,
    instrument_name: String,
    desc: String,
    unit: String,
) -> Gauge<T> {
    T::register_gauge(crate_meter, instrument_name, desc, unit)
}

pub trait CounterType<T> {
    fn register_counter(meter: &Meter, name: String, description: String, unit: String) -> Counter<T>;
}

impl CounterType<u64> for u64 {
    fn register_counter(meter: &Meter, name: String, description: String, unit: String) -> Counter<u64> {
        meter.u64_counter(name).with_description(description).with_unit(unit).build()
    }
}

pub fn register_counter_metric_instrument<T: CounterType<T> + Display>(
    crate_meter: &Meter,
    instrument_name: String,
    desc: String,
    unit: String,
) -> Counter<T> {
    T::register_counter(crate_meter, instrument_name, desc, unit)
}

/// [RequestObserver] exporting request outcomes as OpenTelemetry counters.
///
/// In-process totals are kept as well, for the summary logged at the end of a run.
pub struct OtelRequestObserver {
    totals: RequestCounters,
    succeeded: Counter<u64>,
    failed: Counter<u64>,
}

impl OtelRequestObserver {
    pub fn register() -> Self {
        let meter = crate_meter("archive");

        let succeeded = register_counter_metric_instrument(
            &meter,
            "fetch_requests_succeeded".to_string(),
            "Number of successful fetch attempts".to_string(),
            "request".to_string(),
        );
        let failed = register_counter_metric_instrument(
            &meter,
            "fetch_requests_failed".to_string(),
            "Number of failed fetch attempts".to_string(),
            "request".to_string(),
        );

        Self { totals: RequestCounters::default(), succeeded, failed }
    }

    pub fn snapshot(&self) -> RequestStats {
        self.totals.snapshot()
    }
}

impl RequestObserver for OtelRequestObserver {
    fn report_success(&self, operation: &str) {
        self.totals.report_success(operation);
        self.succeeded.add(1, &[KeyValue::new("operation", operation.to_string())]);
    }

    fn report_failure(&self, operation: &str, error_type: &str) {
        self.totals.report_failure(operation, error_type);
        self.failed.add(
            1,
            &[KeyValue::new("operation", operation.to_string()), KeyValue::new("error_type", error_type.to_string())],
        );
    }
}
