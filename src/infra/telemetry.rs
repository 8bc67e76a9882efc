use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the subscriber from [`subscriber`] as the global default and
/// describe the cache metrics.
///
/// Fails if a global subscriber is already installed.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();
    subscriber(logging).try_init().map_err(|err| {
        InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
    })
}

/// Build the subscriber described by `logging` without installing it.
///
/// `RUST_LOG` directives override the configured level.
pub fn subscriber(logging: &LoggingSettings) -> impl Subscriber + Send + Sync + use<> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer(logging.format))
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

/// Register descriptions for every cache metric with the installed recorder.
///
/// Runs once per process; install the recorder first.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "instcache_hit_total",
            Unit::Count,
            "Total number of instance lookups served from the cache."
        );
        describe_counter!(
            "instcache_miss_total",
            Unit::Count,
            "Total number of instance lookups that fell through to a loader."
        );
        describe_counter!(
            "instcache_write_total",
            Unit::Count,
            "Total number of representations written to the cache."
        );
        describe_counter!(
            "instcache_invalidate_total",
            Unit::Count,
            "Total number of change-detected updates that ran an invalidator."
        );
        describe_counter!(
            "instcache_backend_error_total",
            Unit::Count,
            "Total number of cache backend failures degraded to a miss or no-op."
        );
        describe_counter!(
            "instcache_cascade_dropped_total",
            Unit::Count,
            "Total number of cascade jobs dropped by queue overflow or depth limit."
        );
        describe_gauge!(
            "instcache_cascade_queue_len",
            Unit::Count,
            "Current number of pending cascade jobs."
        );
        describe_histogram!(
            "instcache_cascade_consume_ms",
            Unit::Milliseconds,
            "Cascade batch consumption latency in milliseconds."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn subscriber_builds_for_each_format() {
        for format in [LogFormat::Json, LogFormat::Compact] {
            let logging = LoggingSettings {
                level: LevelFilter::DEBUG,
                format,
            };
            tracing::subscriber::with_default(subscriber(&logging), || {
                tracing::debug!(?format, "telemetry smoke test");
            });
        }
    }
}
