use lazy_static::lazy_static;
pub use prometheus::{Histogram, HistogramTimer, IntCounter, IntGauge, Result};
use prometheus::{HistogramOpts, Opts};

use crate::ForkChoice;

lazy_static! {
    pub static ref FORK_CHOICE_NODES: Result<IntGauge> =
        try_create_int_gauge("fork_choice_nodes", "Current count of proto array nodes");
    pub static ref FORK_CHOICE_INDICES: Result<IntGauge> = try_create_int_gauge(
        "fork_choice_indices",
        "Current count of proto array indices"
    );
    pub static ref FORK_CHOICE_PRUNED_NODES: Result<IntCounter> = try_create_int_counter(
        "fork_choice_pruned_nodes_total",
        "Total count of nodes removed from the proto array by pruning"
    );
    pub static ref FORK_CHOICE_HEAD_CHANGES: Result<IntCounter> = try_create_int_counter(
        "fork_choice_head_changes_total",
        "Total count of times find_head returned a different head"
    );
    pub static ref FORK_CHOICE_ON_BLOCK_TIMES: Result<Histogram> = try_create_histogram(
        "fork_choice_process_block_seconds",
        "The duration in seconds of on_block runs"
    );
    pub static ref FORK_CHOICE_ON_ATTESTATION_TIMES: Result<Histogram> = try_create_histogram(
        "fork_choice_process_attestation_seconds",
        "The duration in seconds of on_attestation runs"
    );
    pub static ref FORK_CHOICE_FIND_HEAD_TIMES: Result<Histogram> = try_create_histogram(
        "fork_choice_find_head_seconds",
        "The duration in seconds of get_head runs"
    );
}

/// Attempts to create an `IntGauge`, returning `Err` if the registry does not accept the gauge
/// (potentially due to naming conflict).
pub fn try_create_int_gauge(name: &str, help: &str) -> Result<IntGauge> {
    let opts = Opts::new(name, help);
    let gauge = IntGauge::with_opts(opts)?;
    prometheus::register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Attempts to create an `IntCounter`, returning `Err` if the registry does not accept the
/// counter (potentially due to naming conflict).
pub fn try_create_int_counter(name: &str, help: &str) -> Result<IntCounter> {
    let opts = Opts::new(name, help);
    let counter = IntCounter::with_opts(opts)?;
    prometheus::register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Attempts to create a `Histogram`, returning `Err` if the registry does not accept the
/// histogram (potentially due to naming conflict).
pub fn try_create_histogram(name: &str, help: &str) -> Result<Histogram> {
    let opts = HistogramOpts::new(name, help);
    let histogram = Histogram::with_opts(opts)?;
    prometheus::register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

/// Starts a timer for the given `Histogram`, stopping when it gets dropped or given to
/// `stop_timer(..)`.
pub fn start_timer(histogram: &Result<Histogram>) -> Option<HistogramTimer> {
    histogram.as_ref().ok().map(|histogram| histogram.start_timer())
}

/// Stops a timer created with `start_timer(..)`.
pub fn stop_timer(timer: Option<HistogramTimer>) {
    if let Some(t) = timer {
        t.observe_duration()
    }
}

pub fn inc_counter_by(counter: &Result<IntCounter>, value: u64) {
    if let Ok(counter) = counter {
        counter.inc_by(value);
    }
}

pub fn set_gauge(gauge: &Result<IntGauge>, value: i64) {
    if let Ok(gauge) = gauge {
        gauge.set(value);
    }
}

/// Update the global metrics `DEFAULT_REGISTRY` with info from the fork choice.
pub fn scrape_for_metrics(fork_choice: &ForkChoice) {
    let proto_array = fork_choice.proto_array();
    let core = proto_array.core_proto_array();
    set_gauge(&FORK_CHOICE_NODES, core.nodes.len() as i64);
    set_gauge(&FORK_CHOICE_INDICES, core.indices.len() as i64);
}
