//! Sensor machine readings.
//!
//! Two endpoints return machine data in different shapes, so each has its own
//! type: the latest positions keyed by machine id, and the full sensor log.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::{ApiCall, ApiClient};
use super::de::number_or_string;
use super::envelope::Envelope;
use super::error::ApiResult;

const LATEST_FAILED: &str = "An error occurred while fetching data.";
const LOGS_FAILED: &str = "An error occurred while fetching machine data.";

/// Latest known position of a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineReading {
    #[serde(deserialize_with = "number_or_string")]
    pub lat: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub lng: f64,
    pub host_id: u64,
    /// Numeric machine identifier, despite the name
    pub machine_name: u64,
}

#[derive(Debug, Deserialize)]
struct MachineReadingsResponse {
    #[serde(default)]
    data: Vec<MachineReading>,
}

/// One sensor record from a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineLog {
    pub id: u64,
    pub host_id: u64,
    #[serde(deserialize_with = "number_or_string")]
    pub lat: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub lng: f64,
    pub temp: f64,
    pub humidity: f64,
    pub pressure: f64,
    #[serde(default)]
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MachineLog {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }

    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Parse the backend's timestamps: RFC 3339, or `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Deserialize)]
struct MachineLogsResponse {
    #[serde(default)]
    data: Vec<MachineLog>,
}

impl ApiClient {
    /// Latest machine positions, capped at the configured limit.
    pub async fn fetch_machine_readings(&self) -> ApiResult<Vec<MachineReading>> {
        let path = format!("/api/sos/show/{}", self.endpoints().machine_readings_segment);
        let call = ApiCall::get(path)
            .envelope(Envelope::boolean("success"))
            .fallback(LATEST_FAILED);

        let body = self.send_authenticated(call).await?;
        let mut response: MachineReadingsResponse = ApiClient::decode(body, LATEST_FAILED)?;
        response.data.truncate(self.endpoints().machine_readings_limit);
        debug!(count = response.data.len(), "Fetched latest machine readings");
        Ok(response.data)
    }

    /// Full sensor log for all machines.
    pub async fn fetch_machine_logs(&self) -> ApiResult<Vec<MachineLog>> {
        let path = format!("/api/get/machines/{}", self.endpoints().machine_logs_segment);
        let call = ApiCall::get(path)
            .envelope(
                Envelope::string_true("status")
                    .required()
                    .failure_message("Failed to fetch machine data."),
            )
            .fallback(LOGS_FAILED);

        let body = self.send_authenticated(call).await?;
        let response: MachineLogsResponse = ApiClient::decode(body, LOGS_FAILED)?;
        debug!(count = response.data.len(), "Fetched machine logs");
        Ok(response.data)
    }
}
