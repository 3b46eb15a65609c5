//! Authentication counters.
//!
//! Counters are fire-and-forget. The transport behind them is supplied by the
//! embedding application through [`MetricsSink`]; without a sink every call is
//! a no-op.

use std::sync::Arc;

/// Destination for counter increments.
pub trait MetricsSink: Send + Sync {
    /// Increment the counter `name` by one.
    fn increment(&self, name: &str);
}

/// Sink that emits each increment as a trace event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn increment(&self, name: &str) {
        tracing::trace!(target: "authgate::metrics", metric = name, "increment");
    }
}

/// Basic-auth and callback outcome counters.
#[derive(Clone, Default)]
pub struct AuthMetrics {
    sink: Option<Arc<dyn MetricsSink>>,
}

impl AuthMetrics {
    /// Counters that go nowhere.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Counters sent to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Whether a sink is attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// A caller authenticated as `alias` using `method`.
    ///
    /// Dots in `alias` become dashes so they do not add metric path segments.
    pub fn basic_success(&self, alias: &str, method: &str) {
        let Some(sink) = &self.sink else { return };
        let alias = alias.replace('.', "-");
        sink.increment(&format!("basicAuth.authenticated.{alias}.{method}"));
        sink.increment("basicAuth.authenticated.total");
    }

    /// Credentials were presented with `method` and rejected.
    pub fn basic_failed(&self, method: &str) {
        self.attempt("unauthenticated", method);
    }

    /// An authenticated caller was refused by authorization.
    pub fn authorize_failed(&self, method: &str) {
        self.attempt("unauthorized", method);
    }

    /// The OAuth callback failed.
    pub fn callback_failed(&self, method: &str) {
        self.attempt("callbackfail", method);
    }

    fn attempt(&self, outcome: &str, method: &str) {
        let Some(sink) = &self.sink else { return };
        sink.increment(&format!("basicAuth.{outcome}.attemptedWith.{method}"));
        sink.increment(&format!("basicAuth.{outcome}.total"));
    }
}

impl std::fmt::Debug for AuthMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMetrics")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// In-memory sink for assertions.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) names: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.names.lock().unwrap())
    }
}

#[cfg(test)]
impl MetricsSink for RecordingSink {
    fn increment(&self, name: &str) {
        self.names.lock().unwrap().push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_success() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = AuthMetrics::new(sink.clone());
        metrics.basic_success("john.doe", "GET");
        assert_eq!(
            sink.take(),
            vec![
                "basicAuth.authenticated.john-doe.GET",
                "basicAuth.authenticated.total"
            ]
        );
    }

    #[test]
    fn test_failure_counters() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = AuthMetrics::new(sink.clone());
        metrics.basic_failed("POST");
        metrics.authorize_failed("GET");
        metrics.callback_failed("GET");
        assert_eq!(
            sink.take(),
            vec![
                "basicAuth.unauthenticated.attemptedWith.POST",
                "basicAuth.unauthenticated.total",
                "basicAuth.unauthorized.attemptedWith.GET",
                "basicAuth.unauthorized.total",
                "basicAuth.callbackfail.attemptedWith.GET",
                "basicAuth.callbackfail.total",
            ]
        );
    }

    #[test]
    fn test_disabled_is_noop() {
        let metrics = AuthMetrics::disabled();
        assert!(!metrics.is_enabled());
        metrics.basic_success("user", "GET");
        metrics.callback_failed("GET");
    }
}
