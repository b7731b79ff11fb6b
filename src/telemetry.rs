use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::workflow::Activity;

/// Install the global subscriber, writing to stderr. `RUST_LOG` wins over
/// the configured level.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    if config.json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()?;
    }

    tracing::debug!(json = config.json, "Telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one cycle
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering the dispatch of one activity
pub fn activity_span(activity: &Activity) -> tracing::Span {
    tracing::info_span!(
        "activity",
        activity.id = %activity.id,
        workflow.id = %activity.workflow_id,
        activity.kind = %activity.kind,
        activity.order = activity.order,
    )
}

/// `<hostname>:<pid>`, recorded on the poll loop span
pub fn instance_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    format!("{}:{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique_uuids() {
        let a = generate_correlation_id();
        let b = generate_correlation_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_instance_id_carries_pid() {
        let id = instance_id();
        assert!(id.ends_with(&format!(":{}", std::process::id())));
    }
}
