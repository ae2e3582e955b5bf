//! HTTP client for the summary collector.

use parking_sim_core::{ParkingSummary, SinkError, SummarySink};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Posts summaries as JSON to the collector endpoint.
///
/// Only `201 Created` counts as delivered. Nothing is retried: a rejected
/// or undeliverable summary is lost.
#[derive(Debug, Clone)]
pub struct HttpSummarySink {
    client: Client,
    url: String,
}

impl HttpSummarySink {
    /// Create a sink for `url`.
    ///
    /// Without a timeout a stalled collector blocks the exit stream until
    /// the connection fails.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, SinkError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SinkError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Collector endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SummarySink for HttpSummarySink {
    async fn submit(&self, summary: &ParkingSummary) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(summary)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    SinkError::Encode(e.to_string())
                } else {
                    SinkError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::CREATED {
            tracing::debug!(vehicle_plate = %summary.vehicle_plate, "Summary accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            vehicle_plate = %summary.vehicle_plate,
            status = status.as_u16(),
            body = %body,
            "Collector rejected summary"
        );
        Err(SinkError::Rejected {
            status: status.as_u16(),
        })
    }
}
