use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "riverbero_monitor_publish_total",
            Unit::Count,
            "Total number of changed projections published by cache monitors."
        );
        describe_histogram!(
            "riverbero_reduce_ms",
            Unit::Milliseconds,
            "Reduction step latency in milliseconds."
        );
        describe_counter!(
            "riverbero_feed_dropped_total",
            Unit::Count,
            "Total number of feed entries dropped due to a full feed."
        );
        describe_counter!(
            "riverbero_broadcast_total",
            Unit::Count,
            "Total number of broadcasts issued to subscriber pools."
        );
        describe_counter!(
            "riverbero_subscriber_dropped_total",
            Unit::Count,
            "Total number of subscribers disconnected as unresponsive."
        );
        describe_gauge!(
            "riverbero_subscribers_active",
            Unit::Count,
            "Current number of attached subscribers."
        );
    });
}
