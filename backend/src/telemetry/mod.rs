use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::config::TelemetrySettings;

pub mod http_sink;

pub use http_sink::HttpTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl TelemetryEvent {
    pub fn new(kind: EventKind, fields: Map<String, Value>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            fields,
        }
    }
}

/// Best-effort event sink. Implementations must return quickly and must never
/// panic or report errors back to the caller.
pub trait Telemetry: Send + Sync {
    fn record_event(&self, event: TelemetryEvent);

    /// `confidence` is the classifier's raw score, before rounding.
    fn record_success(&self, skin_condition: &str, confidence: f64, filename: &str) {
        let mut fields = Map::new();
        fields.insert("skin_condition".into(), json!(skin_condition));
        fields.insert("confidence".into(), json!(confidence));
        fields.insert("filename".into(), json!(filename));
        self.record_event(TelemetryEvent::new(EventKind::Success, fields));
    }

    fn record_failure(&self, error: &str, filename: &str, stage: &str) {
        let mut fields = Map::new();
        fields.insert("error".into(), json!(error));
        fields.insert("filename".into(), json!(filename));
        fields.insert("stage".into(), json!(stage));
        self.record_event(TelemetryEvent::new(EventKind::Failure, fields));
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record_event(&self, _event: TelemetryEvent) {}
}

/// Picks the sink once at startup. Missing credentials disable telemetry rather
/// than stopping the service.
pub fn from_settings(settings: Option<&TelemetrySettings>) -> Arc<dyn Telemetry> {
    match settings {
        Some(settings) => match HttpTelemetry::new(settings.clone()) {
            Ok(sink) => {
                log::info!("Telemetry enabled, sending events to {}", settings.endpoint);
                Arc::new(sink)
            }
            Err(e) => {
                log::warn!("Telemetry client could not be built, disabling telemetry: {}", e);
                Arc::new(NoopTelemetry)
            }
        },
        None => {
            log::warn!("Telemetry is not configured; events will not be exported");
            Arc::new(NoopTelemetry)
        }
    }
}
