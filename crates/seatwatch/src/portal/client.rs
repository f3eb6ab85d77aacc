//! HTTP client for the third-party student portal.
//!
//! The portal is an opaque JSON API: we only depend on the envelope shape
//! and the handful of endpoints the service needs. Every call carries its
//! own timeout; a 401/403 maps to [`PortalError::SessionExpired`] so callers
//! can tell a dead token apart from a transient network failure.

use super::error::PortalError;
use super::types::*;
use super::Portal;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const LOGIN_PATH: &str = "api/auth/login";
const SECTIONS_PATH: &str = "api/dkmh/lop-hoc-phan";
const REGISTERED_PATH: &str = "api/dkmh/lop-da-dang-ky";
const REGISTER_PATH: &str = "api/dkmh/dang-ky";
const CANCEL_PATH: &str = "api/dkmh/huy-dang-ky";

pub struct PortalClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl PortalClient {
    /// Creates an unauthenticated client against the given portal base URL.
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, PortalError> {
        // A trailing slash keeps Url::join from eating the last path segment.
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
            token: None,
        })
    }

    /// Attaches a bearer token for authenticated calls.
    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    /// Authenticates against the portal and returns the access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, PortalError> {
        let url = self.base_url.join(LOGIN_PATH)?;
        debug!(url = %url, "portal login");

        let response = self
            .client
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(PortalError::LoginRejected {
                message: "invalid credentials".to_string(),
            });
        }
        let body: LoginResponse = response.error_for_status()?.json().await?;
        if !body.success {
            return Err(PortalError::LoginRejected {
                message: body.message.unwrap_or_else(|| "login failed".to_string()),
            });
        }
        let access_token = body.access_token.ok_or(PortalError::UnexpectedResponse {
            message: "login response missing access token".to_string(),
        })?;
        info!("portal login succeeded");
        Ok(LoginOutcome {
            access_token,
            student_code: body.student_code.unwrap_or_default(),
        })
    }

    /// Classes the student is currently registered for, with their raw
    /// schedule text (feeds the conflict check).
    pub async fn get_registered_classes(&self) -> Result<Vec<RegisteredClass>, PortalError> {
        let url = self.base_url.join(REGISTERED_PATH)?;
        debug!(url = %url, "fetching registered classes");

        let response = self.authed(self.client.get(url)).send().await?;
        let envelope: PortalEnvelope<Vec<RegisteredClass>> =
            self.check(response).await?.json().await?;
        unwrap_envelope(envelope)
    }

    /// Cancels an existing registration.
    pub async fn cancel_registration(
        &self,
        registration_id: &str,
        verification_token: Option<&str>,
    ) -> Result<AttemptOutcome, PortalError> {
        let url = self.base_url.join(CANCEL_PATH)?;
        debug!(url = %url, registration_id, "cancelling registration");

        let response = self
            .authed(self.client.post(url))
            .json(&serde_json::json!({
                "idDangKy": registration_id,
                "verificationToken": verification_token,
            }))
            .send()
            .await?;
        let envelope: PortalEnvelope<serde_json::Value> =
            self.check(response).await?.json().await?;
        Ok(AttemptOutcome {
            success: envelope.success,
            message: envelope.message.unwrap_or_default(),
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, PortalError> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortalError::SessionExpired),
            status if status.is_success() => Ok(response),
            status => Err(PortalError::UnexpectedResponse {
                message: format!("portal returned status {status}"),
            }),
        }
    }
}

impl Portal for PortalClient {
    async fn get_class_sections(
        &self,
        period_id: &str,
        course_code: &str,
    ) -> Result<Vec<ClassSection>, PortalError> {
        let url = self.base_url.join(SECTIONS_PATH)?;
        debug!(url = %url, period_id, course_code, "fetching class sections");

        let response = self
            .authed(self.client.get(url))
            .query(&[("idDot", period_id), ("maHocPhan", course_code)])
            .send()
            .await?;
        let envelope: PortalEnvelope<Vec<ClassSection>> =
            self.check(response).await?.json().await?;
        unwrap_envelope(envelope)
    }

    async fn register_for_class(
        &self,
        class_id: &str,
        verification_token: Option<&str>,
    ) -> Result<AttemptOutcome, PortalError> {
        let url = self.base_url.join(REGISTER_PATH)?;
        info!(class_id, "submitting registration");

        let response = self
            .authed(self.client.post(url))
            .json(&serde_json::json!({
                "idLopHocPhan": class_id,
                "verificationToken": verification_token,
            }))
            .send()
            .await?;
        let envelope: PortalEnvelope<serde_json::Value> =
            self.check(response).await?.json().await?;
        Ok(AttemptOutcome {
            success: envelope.success,
            message: envelope.message.unwrap_or_default(),
        })
    }
}

fn unwrap_envelope<T>(envelope: PortalEnvelope<T>) -> Result<T, PortalError> {
    if !envelope.success {
        return Err(PortalError::UnexpectedResponse {
            message: envelope
                .message
                .unwrap_or_else(|| "portal reported failure".to_string()),
        });
    }
    envelope.data.ok_or(PortalError::UnexpectedResponse {
        message: "portal response missing data".to_string(),
    })
}
