//! HTTP implementation of the credential verifier. Endpoints live under
//! `/v1/auth` on the configured base URL; every call runs inside an
//! `info_span` and maps non-success statuses to typed errors. Request bodies
//! may carry secrets and are never logged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{Instrument, info_span};
use url::Url;

use super::types::{
    BackupCodesResponse, LoginResponse, OperatorProfile, SessionTokensResponse,
    StepUpVerifyResponse,
};
use super::{
    AuthenticatedSession, CredentialVerifier, LoginOutcome, MfaSetup, MfaStatus, VerifierError,
};
use crate::APP_USER_AGENT;
use crate::config::AuthConfig;
use crate::operator::Operator;
use crate::token::{ActionToken, BearerToken, MfaChallengeToken};

/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;
/// Header carrying a fresh action token on step-up-guarded requests.
const ACTION_TOKEN_HEADER: &str = "X-Pordisto-Action-Token";

pub struct HttpCredentialVerifier {
    client: Client,
    base_url: String,
}

impl HttpCredentialVerifier {
    /// Builds a verifier over the configured base URL.
    ///
    /// # Errors
    /// Returns `VerifierError::Config` if the base URL cannot be parsed, has
    /// an unsupported scheme, or the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self, VerifierError> {
        let base_url = validate_base_url(config.base_url())?;

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_millis(config.timeout_ms()))
            .build()
            .map_err(|err| VerifierError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, VerifierError> {
        let url = self.url("/v1/auth/login");
        let payload = json!({
            "email": email,
            "password": password.expose_secret(),
        });

        let span = info_span!("auth.login", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: LoginResponse = parse_json(response).await?;
                body.into_outcome()
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn verify_mfa(
        &self,
        challenge: &MfaChallengeToken,
        code: &str,
    ) -> Result<AuthenticatedSession, VerifierError> {
        let url = self.url("/v1/auth/mfa/verify");
        let payload = json!({
            "mfa_token": challenge.expose_secret(),
            "code": code,
        });

        let span = info_span!("auth.verify_mfa", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: SessionTokensResponse = parse_json(response).await?;
                Ok(body.into_session())
            }
            StatusCode::BAD_REQUEST => Err(VerifierError::CodeRejected(
                error_message(response).await,
            )),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn verify_step_up(
        &self,
        bearer: &BearerToken,
        code: &str,
    ) -> Result<ActionToken, VerifierError> {
        let url = self.url("/v1/auth/step-up/verify");
        let payload = json!({ "code": code });

        let span = info_span!("auth.step_up_verify", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer.expose_secret())
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: StepUpVerifyResponse = parse_json(response).await?;
                Ok(ActionToken::new(body.action_token))
            }
            StatusCode::BAD_REQUEST => Err(VerifierError::CodeRejected(
                error_message(response).await,
            )),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn fetch_session(&self, bearer: &BearerToken) -> Result<Option<Operator>, VerifierError> {
        let url = self.url("/v1/auth/session");

        let span = info_span!("auth.fetch_session", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let profile: OperatorProfile = parse_json(response).await?;
                Ok(Some(profile.into_operator()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            status => Err(http_error(status, response).await),
        }
    }

    async fn mfa_status(&self, bearer: &BearerToken) -> Result<MfaStatus, VerifierError> {
        let url = self.url("/v1/auth/mfa/status");

        let span = info_span!("auth.mfa_status", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => parse_json(response).await,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn setup_mfa(&self, bearer: &BearerToken) -> Result<MfaSetup, VerifierError> {
        let url = self.url("/v1/auth/mfa/totp/enroll/start");

        let span = info_span!("auth.mfa_enroll_start", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => parse_json(response).await,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn enable_mfa(
        &self,
        bearer: &BearerToken,
        code: &str,
    ) -> Result<Vec<String>, VerifierError> {
        let url = self.url("/v1/auth/mfa/totp/enroll/finish");
        let payload = json!({ "code": code });

        let span = info_span!("auth.mfa_enroll_finish", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer.expose_secret())
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: BackupCodesResponse = parse_json(response).await?;
                Ok(body.backup_codes)
            }
            StatusCode::BAD_REQUEST => Err(VerifierError::CodeRejected(
                error_message(response).await,
            )),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn disable_mfa(&self, bearer: &BearerToken, code: &str) -> Result<(), VerifierError> {
        let url = self.url("/v1/auth/mfa/totp/disable");
        let payload = json!({ "code": code });

        let span = info_span!("auth.mfa_disable", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer.expose_secret())
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => Err(VerifierError::CodeRejected(
                error_message(response).await,
            )),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn backup_codes(
        &self,
        bearer: &BearerToken,
        action: Option<&ActionToken>,
    ) -> Result<Vec<String>, VerifierError> {
        let url = self.url("/v1/auth/mfa/backup-codes");

        let mut request = self.client.get(&url).bearer_auth(bearer.expose_secret());
        if let Some(action) = action {
            request = request.header(ACTION_TOKEN_HEADER, action.expose_secret());
        }

        let span = info_span!("auth.backup_codes", http.method = "GET", url = %url);
        let response = request
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: BackupCodesResponse = parse_json(response).await?;
                Ok(body.backup_codes)
            }
            StatusCode::UNAUTHORIZED => Err(VerifierError::Unauthorized),
            status => Err(http_error(status, response).await),
        }
    }

    async fn logout(&self, bearer: &BearerToken) -> Result<(), VerifierError> {
        let url = self.url("/v1/auth/logout");

        let span = info_span!("auth.logout", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(transport_error)?;

        // An already-revoked token is not a logout failure.
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            let status = response.status();
            Err(http_error(status, response).await)
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<String, VerifierError> {
    let url = Url::parse(base_url)
        .map_err(|err| VerifierError::Config(format!("Invalid base URL: {err}")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(VerifierError::Config(format!(
            "Unsupported scheme: {scheme}"
        )));
    }

    Ok(base_url.trim_end_matches('/').to_string())
}

fn transport_error(err: reqwest::Error) -> VerifierError {
    if err.is_timeout() {
        VerifierError::Timeout(err.to_string())
    } else {
        VerifierError::Network(err.to_string())
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, VerifierError> {
    response
        .json::<T>()
        .await
        .map_err(|err| VerifierError::Parse(format!("Failed to decode response: {err}")))
}

async fn http_error(status: StatusCode, response: Response) -> VerifierError {
    VerifierError::Http {
        status: status.as_u16(),
        message: error_message(response).await,
    }
}

/// Extracts a renderable message from an error body, preferring the JSON
/// `error` field and capping the length.
async fn error_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);

    if message.chars().count() > MAX_ERROR_CHARS {
        message.chars().take(MAX_ERROR_CHARS).collect()
    } else {
        message
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{HttpCredentialVerifier, MAX_ERROR_CHARS};
    use crate::config::AuthConfig;
    use crate::token::{ActionToken, BearerToken, MfaChallengeToken};
    use crate::verifier::{CredentialVerifier, LoginOutcome, VerifierError};
    use anyhow::{Result, anyhow};
    use secrecy::SecretString;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn verifier(server: &MockServer) -> HttpCredentialVerifier {
        HttpCredentialVerifier::new(&AuthConfig::new(server.uri())).unwrap()
    }

    fn operator_json() -> serde_json::Value {
        json!({
            "id": "8c1f3f3a-62ea-44b8-a647-65f0ee6b2b63",
            "email": "ops@permesi.dev",
            "display_name": "Ops",
            "mfa_enabled": true,
            "capabilities": ["VIEW_DASHBOARD", "MANAGE_FEES"]
        })
    }

    #[test]
    fn new_rejects_unsupported_scheme() {
        let result = HttpCredentialVerifier::new(&AuthConfig::new("ftp://example.com".to_string()));
        assert!(matches!(result, Err(VerifierError::Config(_))));
    }

    #[tokio::test]
    async fn login_returns_challenge_when_mfa_required() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/login"))
            .and(body_json(json!({
                "email": "ops@permesi.dev",
                "password": "hunter2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mfa_required": true,
                "mfa_token": "mfa-123"
            })))
            .mount(&server)
            .await;

        let password = SecretString::from("hunter2".to_string());
        let outcome = verifier(&server)
            .login("ops@permesi.dev", &password)
            .await?;
        match outcome {
            LoginOutcome::MfaRequired { challenge } => {
                assert_eq!(challenge.expose_secret(), "mfa-123");
            }
            LoginOutcome::Authenticated(_) => return Err(anyhow!("expected MFA challenge")),
        }
        Ok(())
    }

    #[tokio::test]
    async fn login_returns_session_without_mfa() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "bearer-abc",
                "refresh_token": "refresh-abc",
                "operator": operator_json()
            })))
            .mount(&server)
            .await;

        let password = SecretString::from("hunter2".to_string());
        let outcome = verifier(&server)
            .login("ops@permesi.dev", &password)
            .await?;
        match outcome {
            LoginOutcome::Authenticated(session) => {
                assert_eq!(session.bearer.expose_secret(), "bearer-abc");
                assert_eq!(session.operator.email, "ops@permesi.dev");
                assert!(session.refresh_token.is_some());
            }
            LoginOutcome::MfaRequired { .. } => return Err(anyhow!("expected session")),
        }
        Ok(())
    }

    #[tokio::test]
    async fn login_maps_unauthorized() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "Invalid email or password"
            })))
            .mount(&server)
            .await;

        let password = SecretString::from("wrong".to_string());
        let result = verifier(&server).login("ops@permesi.dev", &password).await;
        assert!(matches!(result, Err(VerifierError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn verify_mfa_returns_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/mfa/verify"))
            .and(body_json(json!({
                "mfa_token": "mfa-123",
                "code": "000111"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "bearer-abc",
                "operator": operator_json()
            })))
            .mount(&server)
            .await;

        let challenge = MfaChallengeToken::new("mfa-123");
        let session = verifier(&server).verify_mfa(&challenge, "000111").await?;
        assert_eq!(session.bearer.expose_secret(), "bearer-abc");
        assert!(session.operator.mfa_enabled);
        Ok(())
    }

    #[tokio::test]
    async fn verify_mfa_maps_rejected_code() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/mfa/verify"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "Invalid TOTP code"
            })))
            .mount(&server)
            .await;

        let challenge = MfaChallengeToken::new("mfa-123");
        let result = verifier(&server).verify_mfa(&challenge, "999999").await;
        match result {
            Err(VerifierError::CodeRejected(message)) => {
                assert_eq!(message, "Invalid TOTP code");
            }
            other => return Err(anyhow!("expected CodeRejected, got {other:?}")),
        }
        Ok(())
    }

    #[tokio::test]
    async fn verify_step_up_returns_action_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/step-up/verify"))
            .and(header("Authorization", "Bearer bearer-abc"))
            .and(body_json(json!({ "code": "000111" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "action_token": "action-1"
            })))
            .mount(&server)
            .await;

        let bearer = BearerToken::new("bearer-abc");
        let token = verifier(&server).verify_step_up(&bearer, "000111").await?;
        assert_eq!(token.expose_secret(), "action-1");
        Ok(())
    }

    #[tokio::test]
    async fn fetch_session_returns_none_on_unauthorized() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/session"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "expired"
            })))
            .mount(&server)
            .await;

        let bearer = BearerToken::new("stale");
        let session = verifier(&server).fetch_session(&bearer).await?;
        assert!(session.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn fetch_session_parses_operator() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/session"))
            .and(header("Authorization", "Bearer bearer-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(operator_json()))
            .mount(&server)
            .await;

        let bearer = BearerToken::new("bearer-abc");
        let operator = verifier(&server)
            .fetch_session(&bearer)
            .await?
            .ok_or_else(|| anyhow!("expected operator"))?;
        assert_eq!(operator.display_name, "Ops");
        assert_eq!(operator.capabilities.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn enable_mfa_returns_backup_codes() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/mfa/totp/enroll/finish"))
            .and(body_json(json!({ "code": "000111" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "backup_codes": ["aaaa-bbbb", "cccc-dddd"]
            })))
            .mount(&server)
            .await;

        let bearer = BearerToken::new("bearer-abc");
        let codes = verifier(&server).enable_mfa(&bearer, "000111").await?;
        assert_eq!(codes, vec!["aaaa-bbbb", "cccc-dddd"]);
        Ok(())
    }

    #[tokio::test]
    async fn backup_codes_sends_action_token_header() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/mfa/backup-codes"))
            .and(header("X-Pordisto-Action-Token", "action-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "backup_codes": ["aaaa-bbbb"]
            })))
            .mount(&server)
            .await;

        let bearer = BearerToken::new("bearer-abc");
        let action = ActionToken::new("action-1");
        let codes = verifier(&server)
            .backup_codes(&bearer, Some(&action))
            .await?;
        assert_eq!(codes, vec!["aaaa-bbbb"]);
        Ok(())
    }

    #[tokio::test]
    async fn logout_tolerates_revoked_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/logout"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let bearer = BearerToken::new("stale");
        verifier(&server).logout(&bearer).await?;
        Ok(())
    }

    #[tokio::test]
    async fn error_bodies_are_truncated() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/mfa/status"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({ "error": "x".repeat(MAX_ERROR_CHARS * 2) })),
            )
            .mount(&server)
            .await;

        let bearer = BearerToken::new("bearer-abc");
        let result = verifier(&server).mfa_status(&bearer).await;
        match result {
            Err(VerifierError::Http { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message.chars().count(), MAX_ERROR_CHARS);
            }
            other => return Err(anyhow!("expected Http error, got {other:?}")),
        }
        Ok(())
    }
}
