use std::sync::Once;

use metrics::{Unit, describe_counter};
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
            "folio_series_append_conflicts_total",
            Unit::Count,
            "Series writes that lost a tail-index race and were retried or abandoned."
        );
        describe_counter!(
            "folio_likes_total",
            Unit::Count,
            "Likes that changed a post's like state."
        );
        describe_counter!(
            "folio_views_counted_total",
            Unit::Count,
            "Views counted after deduplication."
        );
        describe_counter!(
            "folio_views_deduplicated_total",
            Unit::Count,
            "Views dropped as repeats inside the dedup window."
        );
        describe_counter!(
            "folio_cache_invalidations_total",
            Unit::Count,
            "Cache keys handed to the invalidation sink."
        );
        describe_counter!(
            "folio_search_upserts_total",
            Unit::Count,
            "Posts handed to the search index sink."
        );
    });
}
