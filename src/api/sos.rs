//! SOS reports and submissions.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::{ApiCall, ApiClient};
use super::de::number_or_string;
use super::envelope::Envelope;
use super::error::{ApiError, ApiResult};

const FETCH_FAILED: &str = "An error occurred while fetching SOS data.";
const SUBMIT_FAILED: &str = "An error occurred while posting SOS data.";

/// An SOS raised by a group member, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosReport {
    #[serde(deserialize_with = "number_or_string")]
    pub lat: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub lng: f64,
    pub group_staff_fishermans_id: u64,
    pub staff_nm: String,
}

#[derive(Debug, Deserialize)]
struct SosReportsResponse {
    #[serde(default)]
    data: Vec<SosReport>,
}

/// An SOS sent from this device. The staff name is filled in server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosSubmission {
    pub lat: f64,
    pub lng: f64,
    pub group_staff_fishermans_id: u64,
}

/// Backend acknowledgement of a submitted SOS.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SosReceipt {
    pub message: String,
}

impl ApiClient {
    /// Fetch recent SOS reports visible to `group_id`.
    ///
    /// The backend scopes results by the token and path key; the group id is
    /// not part of the request.
    pub async fn fetch_sos_reports(&self, group_id: u64) -> ApiResult<Vec<SosReport>> {
        let path = format!("/api/sos/show/{}", self.endpoints().sos_reports_segment);
        let call = ApiCall::get(path)
            .envelope(Envelope::boolean("success"))
            .fallback(FETCH_FAILED);

        let body = self.send_authenticated(call).await?;
        let response: SosReportsResponse = ApiClient::decode(body, FETCH_FAILED)?;
        debug!(group_id, count = response.data.len(), "Fetched SOS reports");
        Ok(response.data)
    }

    /// Raise an SOS on behalf of `user_id`.
    pub async fn submit_sos(&self, submission: &SosSubmission, user_id: &str) -> ApiResult<SosReceipt> {
        if user_id.is_empty() {
            return Err(ApiError::Application("A user id is required to send an SOS.".to_string()));
        }
        let path = format!(
            "/api/sos/store/{}/{}",
            self.endpoints().sos_submit_segment,
            user_id
        );
        let body = serde_json::to_value(submission)
            .map_err(|e| ApiError::Network(format!("Invalid SOS payload: {}", e)))?;
        let call = ApiCall::post(path, body).fallback(SUBMIT_FAILED);

        let body = self.send_authenticated(call).await?;
        let receipt: SosReceipt = ApiClient::decode(body, SUBMIT_FAILED)?;
        info!(
            user_id,
            lat = submission.lat,
            lng = submission.lng,
            "SOS submitted"
        );
        Ok(receipt)
    }
}
