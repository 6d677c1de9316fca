//! Telemetry logic.
//! Support logging and metrics.
use std::time::Instant;

use metrics::Unit;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// How an authentication attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Wrong password.
    Rejected,
    /// No entry for this login.
    NotFound,
    /// Blank login or password, nothing sent.
    Skipped,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::NotFound => "not_found",
            Outcome::Skipped => "skipped",
            Outcome::Error => "error",
        }
    }
}

/// Describe metrics to the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "ldap_authentications_total",
        Unit::Count,
        "LDAP authentication attempts by outcome."
    );
    metrics::describe_histogram!(
        "ldap_authentication_duration_seconds",
        Unit::Seconds,
        "Time spent authenticating against the directory."
    );
}

/// Record an authentication attempt started at `start`.
pub fn record_authentication(outcome: Outcome, start: Instant) {
    let latency = start.elapsed().as_secs_f64();

    metrics::counter!(
        "ldap_authentications_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    metrics::histogram!(
        "ldap_authentication_duration_seconds",
        "outcome" => outcome.as_str()
    )
    .record(latency);
}

/// Install a `fmt` subscriber filtered by `RUST_LOG`, or `default_level`.
pub fn setup_logging(default_level: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::NotFound.as_str(), "not_found");
    }

    #[test]
    fn test_record_without_recorder() {
        // No recorder installed: must be a no-op.
        describe_metrics();
        record_authentication(Outcome::Rejected, Instant::now());
    }
}
