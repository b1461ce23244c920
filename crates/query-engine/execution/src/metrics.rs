//! Metrics of the runner.

use prometheus::core::{AtomicU64, GenericCounter};
use prometheus::Histogram;

#[derive(Debug, Clone)]
pub struct Metrics {
    pub query_total: GenericCounter<AtomicU64>,
    pub subquery_total: GenericCounter<AtomicU64>,
    pub query_duration: Histogram,
}

impl Metrics {
    /// Setup the counters and histograms of the runner, registered with the
    /// provided Prometheus registry.
    pub fn initialise(metrics_registry: &mut prometheus::Registry) -> Result<Self, prometheus::Error> {
        let query_total = add_int_counter_metric(
            metrics_registry,
            "query_engine_query_total",
            "Total queries executed, including nested ones.",
        )?;

        let subquery_total = add_int_counter_metric(
            metrics_registry,
            "query_engine_subquery_total",
            "Total nested collection queries executed.",
        )?;

        let query_duration = add_histogram_metric(
            metrics_registry,
            "query_engine_query_duration_seconds",
            "Time spent waiting for the executor, in seconds.",
        )?;

        Ok(Metrics {
            query_total,
            subquery_total,
            query_duration,
        })
    }
}

/// Create a new int counter metric and register it with the provided Prometheus Registry
fn add_int_counter_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericCounter<AtomicU64>, prometheus::Error> {
    let int_counter =
        prometheus::IntCounter::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(int_counter.clone()))?;
    Ok(int_counter)
}

/// Create a new histogram metric and register it with the provided Prometheus Registry
fn add_histogram_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<Histogram, prometheus::Error> {
    let histogram = Histogram::with_opts(prometheus::HistogramOpts::new(
        metric_name,
        metric_description,
    ))?;
    metrics_registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}
