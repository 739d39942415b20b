use log::{debug, warn};
use std::time::Duration;

use super::{Telemetry, TelemetryEvent};
use crate::config::TelemetrySettings;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts each event as JSON to an ingest endpoint on a detached task.
#[derive(Clone)]
pub struct HttpTelemetry {
    client: reqwest::Client,
    settings: TelemetrySettings,
}

impl HttpTelemetry {
    pub fn new(settings: TelemetrySettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self { client, settings })
    }
}

impl Telemetry for HttpTelemetry {
    fn record_event(&self, event: TelemetryEvent) {
        let request = self
            .client
            .post(self.settings.endpoint.clone())
            .bearer_auth(&self.settings.token)
            .json(&event);

        actix_web::rt::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Telemetry event {:?} delivered", event.kind);
                }
                Ok(response) => {
                    warn!("Telemetry endpoint rejected event: {}", response.status());
                }
                Err(e) => {
                    warn!("Failed to send telemetry event: {}", e);
                }
            }
        });
    }
}
