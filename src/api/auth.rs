//! Login and logout calls.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::client::{ApiCall, ApiClient};
use super::envelope::Envelope;
use super::error::{ApiError, ApiResult};
use crate::store::UserProfile;

const LOGIN_PATH: &str = "/api/login";
const LOGIN_FAILED: &str = "An error occurred during login.";
const LOGOUT_FAILED: &str = "An error occurred during logout.";

/// Login request body.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login response body. `status` is a required boolean.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// A login that produced a usable session.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub token: String,
    pub user: UserProfile,
    pub message: String,
}

impl ApiClient {
    /// Exchange email and password for a bearer token and profile.
    ///
    /// Every failure comes back as [`ApiError::Auth`]. Nothing is stored here.
    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<LoginGrant> {
        let body = serde_json::to_value(credentials)
            .map_err(|e| ApiError::Auth(format!("Invalid login request: {}", e)))?;
        let call = ApiCall::post(LOGIN_PATH, body)
            .envelope(
                Envelope::boolean("status")
                    .required()
                    .failure_message(LOGIN_FAILED),
            )
            .fallback(LOGIN_FAILED);

        let body = self.send_public(call).await.map_err(ApiError::into_auth)?;
        let response: LoginResponse =
            ApiClient::decode(body, LOGIN_FAILED).map_err(ApiError::into_auth)?;

        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Auth("Login succeeded but no token was returned.".to_string()))?;
        let user = response
            .user
            .ok_or_else(|| ApiError::Auth("Login succeeded but no user profile was returned.".to_string()))?;

        info!(user_id = user.id, group_id = user.group_id, "Login accepted");
        Ok(LoginGrant {
            token,
            user,
            message: response.message,
        })
    }

    /// Ask the backend to invalidate `token`.
    pub async fn invalidate_token(&self, token: &str) -> ApiResult<()> {
        let path = self.endpoints().logout_path.clone();
        if path.is_empty() {
            return Ok(());
        }
        let call = ApiCall::post(path, json!({})).fallback(LOGOUT_FAILED);
        self.send_with_token(call, token).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::test_support::*;
    use crate::api::transport::mock::MockTransport;
    use crate::api::transport::{Method, TransportError};
    use crate::store::credentials::test_support::sample_profile;
    use std::sync::Arc;
    use tokio_test::assert_err;

    fn credentials() -> LoginCredentials {
        LoginCredentials {
            email: "budi@example.com".to_string(),
            password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_success() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(
            200,
            json!({
                "status": true,
                "message": "Login success",
                "token": "server-token",
                "user": sample_profile(),
            }),
        );
        let client = client_with(transport.clone());

        let grant = client.login(&credentials()).await.unwrap();
        assert_eq!(grant.token, "server-token");
        assert_eq!(grant.user, sample_profile());
        assert_eq!(grant.message, "Login success");

        let request = transport.last_request().unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "http://backend.test/api/login");
        assert_eq!(
            request.body,
            Some(json!({"email": "budi@example.com", "password": "secret"}))
        );
        assert_eq!(request.header_value("Authorization"), None);
    }

    #[tokio::test]
    async fn test_login_rejected_uses_server_message() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(401, json!({"status": false, "message": "Invalid credentials"}));
        let client = client_with(transport);

        let err = client.login(&credentials()).await.unwrap_err();
        assert_eq!(err, ApiError::Auth("Invalid credentials".to_string()));
    }

    #[tokio::test]
    async fn test_login_without_token_fails() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(
            200,
            json!({"status": true, "message": "ok", "token": "", "user": sample_profile()}),
        );
        let client = client_with(transport);

        let err = assert_err!(client.login(&credentials()).await);
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[tokio::test]
    async fn test_login_unreachable_is_auth_error() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(TransportError::Connect("dns".to_string()));
        let client = client_with(transport);

        let err = client.login(&credentials()).await.unwrap_err();
        assert_eq!(err, ApiError::Auth(LOGIN_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_login_missing_status_fails() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(200, json!({"token": "t", "user": sample_profile()}));
        let client = client_with(transport);

        let err = client.login(&credentials()).await.unwrap_err();
        assert_eq!(err, ApiError::Auth(LOGIN_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_login_malformed_profile_does_not_echo_success() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(
            200,
            json!({
                "status": true,
                "message": "Login success",
                "token": "t",
                "user": {
                    "id": 7, "name": "Budi", "email": "budi@example.com",
                    "role": "fisherman", "group_id": null, "group_name": null
                }
            }),
        );
        let client = client_with(transport);

        let err = client.login(&credentials()).await.unwrap_err();
        assert_eq!(err, ApiError::Auth(LOGIN_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_invalidate_token_sends_given_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(200, json!({"message": "Logged out"}));
        let client = client_with(transport.clone());

        client.invalidate_token("old-token").await.unwrap();
        let request = transport.last_request().unwrap();
        assert_eq!(request.url, "http://backend.test/api/logout");
        assert_eq!(request.header_value("Authorization"), Some("Bearer old-token"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        assert!(!format!("{:?}", credentials()).contains("secret"));
    }
}
