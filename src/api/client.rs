//! Authenticated request layer shared by every backend endpoint.
//!
//! Each call gets the JSON headers, and the bearer token unless it is a public
//! call. Outcomes are normalized into [`ApiError`]:
//! - no stored token: `Unauthenticated`, nothing is sent
//! - transport failure, empty or unreadable body: `Network`
//! - in-band failure flag: `Application`
//!
//! HTTP status codes are not inspected. The backend reports failures in the
//! body. Calls are sent once, with no retry.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::envelope::{message_of_bytes, Envelope};
use super::error::{ApiError, ApiResult};
use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::config::EndpointConfig;
use crate::store::CredentialStore;

const NO_DATA: &str = "No data received from the server";
const DEFAULT_FALLBACK: &str = "An error occurred while contacting the server.";

/// Description of one backend call.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub envelope: Envelope,
    /// Message used for network errors when the body offers none
    pub fallback: &'static str,
}

impl ApiCall {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            envelope: Envelope::UNFLAGGED,
            fallback: DEFAULT_FALLBACK,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            envelope: Envelope::UNFLAGGED,
            fallback: DEFAULT_FALLBACK,
        }
    }

    pub fn envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn fallback(mut self, message: &'static str) -> Self {
        self.fallback = message;
        self
    }
}

/// Client for the safety backend.
pub struct ApiClient {
    base_url: String,
    endpoints: EndpointConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        endpoints: EndpointConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints,
            transport,
            credentials,
        }
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Absolute URL for a backend path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send a call with the stored bearer token.
    pub async fn send_authenticated(&self, call: ApiCall) -> ApiResult<Value> {
        let token = match self.credentials.load().await {
            Ok(Some(credential)) => credential.token,
            Ok(None) => return Err(ApiError::Unauthenticated),
            Err(e) => {
                warn!(error = %e, "Failed to read stored credentials");
                return Err(ApiError::Unauthenticated);
            }
        };
        self.send_with_token(call, &token).await
    }

    /// Send a call with an explicit bearer token.
    pub async fn send_with_token(&self, call: ApiCall, token: &str) -> ApiResult<Value> {
        if token.is_empty() {
            return Err(ApiError::Unauthenticated);
        }
        let request = self
            .build_request(&call)
            .header("Authorization", format!("Bearer {}", token));
        self.execute(request, &call).await
    }

    /// Send a call without credentials.
    pub async fn send_public(&self, call: ApiCall) -> ApiResult<Value> {
        let request = self.build_request(&call);
        self.execute(request, &call).await
    }

    /// Decode a checked body, or a part of it, into a typed value.
    ///
    /// The body already passed its success check, so its `message` describes
    /// a success and is not reused for a shape mismatch.
    pub fn decode<T: DeserializeOwned>(value: Value, fallback: &str) -> ApiResult<T> {
        serde_json::from_value(value).map_err(|e| {
            debug!(error = %e, "Response body did not match the expected shape");
            ApiError::network(None, fallback)
        })
    }

    fn build_request(&self, call: &ApiCall) -> HttpRequest {
        let mut request = HttpRequest::new(call.method, self.url(&call.path))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        if let Some(body) = &call.body {
            request = request.json(body.clone());
        }
        request
    }

    async fn execute(&self, request: HttpRequest, call: &ApiCall) -> ApiResult<Value> {
        let method = request.method;
        let response = self.transport.send(request).await.map_err(|e| {
            warn!(method = %method, error = %e, "Backend request failed");
            ApiError::network(None, call.fallback)
        })?;

        let body = parse_body(&response, call.fallback)?;
        call.envelope.check(&body)?;
        Ok(body)
    }
}

fn parse_body(response: &HttpResponse, fallback: &str) -> ApiResult<Value> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::Network(NO_DATA.to_string()));
    }

    match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Null) => Err(ApiError::Network(NO_DATA.to_string())),
        Ok(value) => Ok(value),
        Err(e) => {
            debug!(status = response.status, error = %e, "Response body is not JSON");
            Err(ApiError::network(message_of_bytes(&response.body), fallback))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::api::transport::mock::MockTransport;
    use crate::store::credentials::test_support::sample_credential;
    use crate::store::MemoryStore;

    pub const BASE_URL: &str = "http://backend.test";

    pub fn client_with(transport: Arc<MockTransport>) -> ApiClient {
        let credentials = Arc::new(CredentialStore::new(Arc::new(MemoryStore::new())));
        ApiClient::new(BASE_URL, EndpointConfig::default(), transport, credentials)
    }

    pub async fn signed_in_client(transport: Arc<MockTransport>) -> ApiClient {
        let client = client_with(transport);
        client.credentials().save(&sample_credential()).await.unwrap();
        client
    }
}
