//! Metrics sink
//!
//! Components receive a [`Metrics`] handle at construction and record
//! through its recorder; nothing is registered globally.

use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

const ARI_EVENT_TOTAL: &str = "callcore_ari_event_total";
const ARI_EVENT_PROCESS_SECONDS: &str = "callcore_ari_event_process_seconds";
const ARI_EVENT_FAILED_TOTAL: &str = "callcore_ari_event_failed_total";
const CALL_CREATE_TOTAL: &str = "callcore_call_create_total";
const CALL_HANGUP_TOTAL: &str = "callcore_call_hangup_total";
const HEALTH_CHECK_FAILED_TOTAL: &str = "callcore_health_check_failed_total";

static METADATA: Metadata<'static> = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

#[derive(Clone)]
pub struct Metrics {
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl Metrics {
    pub fn new(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        let metrics = Self { recorder };
        metrics.describe();
        metrics
    }

    /// Metrics backed by a Prometheus recorder, plus the handle rendering it
    pub fn prometheus() -> Result<(Self, PrometheusHandle), BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(ARI_EVENT_PROCESS_SECONDS.to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )?
            .build_recorder();
        let handle = recorder.handle();
        Ok((Self::new(Arc::new(recorder)), handle))
    }

    /// Metrics that record nothing
    pub fn noop() -> Self {
        Self::new(Arc::new(metrics::NoopRecorder))
    }

    fn describe(&self) {
        let counters = [
            (ARI_EVENT_TOTAL, "ARI events received, by type"),
            (ARI_EVENT_FAILED_TOTAL, "ARI events whose handler failed, by type"),
            (CALL_CREATE_TOTAL, "Calls created, by direction"),
            (CALL_HANGUP_TOTAL, "Calls hung up, by reason"),
            (HEALTH_CHECK_FAILED_TOTAL, "Failed health probes, by target"),
        ];
        for (name, description) in counters {
            self.recorder.describe_counter(
                KeyName::from_const_str(name),
                Some(Unit::Count),
                SharedString::const_str(description),
            );
        }
        self.recorder.describe_histogram(
            KeyName::from_const_str(ARI_EVENT_PROCESS_SECONDS),
            Some(Unit::Seconds),
            SharedString::const_str("ARI event processing time, by type"),
        );
    }

    fn increment(&self, name: &'static str, label: &'static str, value: &str) {
        let key = Key::from_parts(name, vec![Label::new(label, value.to_string())]);
        self.recorder.register_counter(&key, &METADATA).increment(1);
    }

    pub fn ari_event_received(&self, event_type: &str) {
        self.increment(ARI_EVENT_TOTAL, "type", event_type);
    }

    pub fn ari_event_failed(&self, event_type: &str) {
        self.increment(ARI_EVENT_FAILED_TOTAL, "type", event_type);
    }

    pub fn ari_event_processed(&self, event_type: &str, elapsed: Duration) {
        let key = Key::from_parts(
            ARI_EVENT_PROCESS_SECONDS,
            vec![Label::new("type", event_type.to_string())],
        );
        self.recorder
            .register_histogram(&key, &METADATA)
            .record(elapsed.as_secs_f64());
    }

    pub fn call_created(&self, direction: &str) {
        self.increment(CALL_CREATE_TOTAL, "direction", direction);
    }

    pub fn call_hungup(&self, reason: &str) {
        self.increment(CALL_HANGUP_TOTAL, "reason", reason);
    }

    pub fn health_check_failed(&self, target: &str) {
        self.increment(HEALTH_CHECK_FAILED_TOTAL, "target", target);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::noop()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingRecorder;
    use super::*;

    #[test]
    fn test_counters_are_labelled() {
        let recorder = Arc::new(CountingRecorder::default());
        let metrics = Metrics::new(recorder.clone());

        metrics.ari_event_received("StasisStart");
        metrics.ari_event_received("StasisStart");
        metrics.ari_event_received("ChannelCreated");
        metrics.ari_event_processed("StasisStart", Duration::from_millis(3));

        assert_eq!(recorder.count(ARI_EVENT_TOTAL, "type", "StasisStart"), 2);
        assert_eq!(recorder.count(ARI_EVENT_TOTAL, "type", "ChannelCreated"), 1);
        assert_eq!(recorder.count(ARI_EVENT_TOTAL, "type", "StasisEnd"), 0);
    }

    #[test]
    fn test_prometheus_render() {
        let (metrics, handle) = Metrics::prometheus().unwrap();
        metrics.call_created("incoming");
        assert!(handle.render().contains(CALL_CREATE_TOTAL));
    }
}
