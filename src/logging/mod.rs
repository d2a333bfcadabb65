use crate::logging::format::Formatter;
use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::Layer;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

mod format;

fn is_own_target(metadata: &tracing::Metadata<'_>) -> bool {
    metadata
        .module_path()
        .map(|it| it == "devicesync" || it.starts_with("devicesync::"))
        .unwrap_or(false)
}

/// Whether the crate's own layer records `metadata` at `level`.
pub(crate) fn is_own_enabled(metadata: &tracing::Metadata<'_>, level: Level) -> bool {
    is_own_target(metadata) && metadata.level() <= &level
}

/// Installs the global subscriber: this crate through the custom formatter at
/// `level`, request traces from `tower_http` compact, everything else at warn.
pub fn registry_logs(level: Level) -> anyhow::Result<()> {
    let own_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(Formatter::new(std::io::stdout().is_terminal()))
        .with_filter(filter::filter_fn(move |metadata| {
            is_own_enabled(metadata, level)
        }));
    let http_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_target(false)
        .with_filter(filter::filter_fn(move |metadata| {
            metadata.target().starts_with("tower_http") && metadata.level() <= &level
        }));
    let other_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(filter::filter_fn(|metadata| {
            !is_own_target(metadata)
                && !metadata.target().starts_with("tower_http")
                && metadata.level() <= &Level::WARN
        }));
    tracing_subscriber::registry()
        .with(own_layer)
        .with(http_layer)
        .with(other_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}
