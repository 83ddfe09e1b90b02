//! Token endpoint client
//!
//! Handles the four credential-issuing interactions with the Circuit Analyzer
//! API. All of them POST JSON and answer with the same token response:
//! 1. Email/password sign-in (`/api/auth/login`)
//! 2. Account creation (`/api/auth/signup`)
//! 3. Google ID-token sign-in (`/api/auth/google`)
//! 4. Renewal (`/api/auth/refresh`)
//!
//! These calls bypass the session layer entirely: they carry no bearer token
//! and a 401 from them is reported to the caller as-is.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{GOOGLE_LOGIN_PATH, LOGIN_PATH, REFRESH_PATH, SIGNUP_PATH};
use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Response from every token-issuing endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    pub fn into_pair(self) -> CredentialPair {
        CredentialPair::new(self.access_token, self.refresh_token)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignupRequest<'a> {
    email: &'a str,
    name: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct GoogleAuthRequest<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Client for the authentication endpoints of one API deployment.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AuthClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        self.post_for_tokens(LOGIN_PATH, &LoginRequest { email, password })
            .await
    }

    /// Create an email/password account; the server signs it in immediately.
    pub async fn signup(&self, email: &str, name: &str, password: &str) -> Result<TokenResponse> {
        self.post_for_tokens(
            SIGNUP_PATH,
            &SignupRequest {
                email,
                name,
                password,
            },
        )
        .await
    }

    /// Sign in with a Google ID token obtained by the host application.
    pub async fn google(&self, id_token: &str) -> Result<TokenResponse> {
        self.post_for_tokens(GOOGLE_LOGIN_PATH, &GoogleAuthRequest { token: id_token })
            .await
    }

    /// Exchange a refresh token for a fresh pair.
    ///
    /// 401/403 means the refresh token is expired, revoked, or belongs to an
    /// inactive user: `InvalidCredentials`. Anything else non-successful is
    /// `TokenExchange`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.post_for_tokens(REFRESH_PATH, &RefreshRequest { refresh_token })
            .await
    }

    async fn post_for_tokens<B: Serialize>(&self, path: &str, body: &B) -> Result<TokenResponse> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Http(format!(
                        "{path} timed out after {}s",
                        self.timeout.as_secs_f64()
                    ))
                } else {
                    Error::Http(format!("{path} request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            let detail = error_detail(&body);
            warn!(path, status = status.as_u16(), detail = %detail, "token endpoint rejected request");

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "{path} rejected ({status}): {detail}"
                )));
            }
            return Err(Error::TokenExchange(format!(
                "{path} returned {status}: {detail}"
            )));
        }

        debug!(path, "token endpoint issued credentials");
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response from {path}: {e}")))
    }
}

/// Pull the human-readable `detail` out of an API error body.
///
/// The API reports failures as `{"detail": "..."}`; any other body is
/// returned verbatim.
pub fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::net::TcpListener;

    /// Fake auth service: accepts `alice@example.com` / `hunter2`, refresh
    /// token `rt_valid`, Google token `g_valid`; rejects everything else the
    /// way the real API does.
    async fn start_auth_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let tokens = |suffix: &str| {
            serde_json::json!({
                "access_token": format!("at_{suffix}"),
                "refresh_token": format!("rt_{suffix}"),
                "token_type": "bearer",
            })
        };

        tokio::spawn(async move {
            let app = axum::Router::new()
                .route(
                    "/api/auth/login",
                    post(move |Json(body): Json<serde_json::Value>| async move {
                        if body["email"] == "alice@example.com" && body["password"] == "hunter2" {
                            (StatusCode::OK, Json(tokens("login")))
                        } else {
                            (
                                StatusCode::UNAUTHORIZED,
                                Json(serde_json::json!({"detail": "Invalid email or password"})),
                            )
                        }
                    }),
                )
                .route(
                    "/api/auth/signup",
                    post(move |Json(body): Json<serde_json::Value>| async move {
                        if body["email"] == "alice@example.com" {
                            (
                                StatusCode::CONFLICT,
                                Json(serde_json::json!({"detail": "Email already registered"})),
                            )
                        } else {
                            (StatusCode::OK, Json(tokens("signup")))
                        }
                    }),
                )
                .route(
                    "/api/auth/google",
                    post(move |Json(body): Json<serde_json::Value>| async move {
                        if body["token"] == "g_valid" {
                            (StatusCode::OK, Json(tokens("google")))
                        } else {
                            (
                                StatusCode::UNAUTHORIZED,
                                Json(serde_json::json!({"detail": "Invalid Google token"})),
                            )
                        }
                    }),
                )
                .route(
                    "/api/auth/refresh",
                    post(move |Json(body): Json<serde_json::Value>| async move {
                        match body["refresh_token"].as_str() {
                            Some("rt_valid") => (StatusCode::OK, Json(tokens("renewed"))),
                            Some("rt_broken") => (
                                StatusCode::INTERNAL_SERVER_ERROR,
                                Json(serde_json::json!({"detail": "database unavailable"})),
                            ),
                            _ => (
                                StatusCode::UNAUTHORIZED,
                                Json(serde_json::json!({"detail": "Invalid token: Signature has expired."})),
                            ),
                        }
                    }),
                );
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn client(base: String) -> AuthClient {
        AuthClient::new(reqwest::Client::new(), base, Duration::from_secs(5))
    }

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","token_type":"bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.refresh_token, "rt_def");
        assert_eq!(token.token_type, "bearer");
    }

    #[test]
    fn token_type_defaults_to_bearer() {
        let json = r#"{"access_token":"at","refresh_token":"rt"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.token_type, "bearer");
    }

    #[test]
    fn into_pair_keeps_both_tokens() {
        let token = TokenResponse {
            access_token: "at_x".into(),
            refresh_token: "rt_x".into(),
            token_type: "bearer".into(),
        };
        assert_eq!(token.into_pair(), CredentialPair::new("at_x", "rt_x"));
    }

    #[test]
    fn error_detail_prefers_detail_field() {
        assert_eq!(
            error_detail(r#"{"detail":"User not found or inactive"}"#),
            "User not found or inactive"
        );
        assert_eq!(error_detail("upstream exploded"), "upstream exploded");
    }

    #[tokio::test]
    async fn login_returns_pair_for_valid_password() {
        let auth = client(start_auth_server().await);
        let tokens = auth.login("alice@example.com", "hunter2").await.unwrap();
        assert_eq!(tokens.access_token, "at_login");
        assert_eq!(tokens.refresh_token, "rt_login");
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let auth = client(start_auth_server().await);
        let err = auth.login("alice@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
        assert!(err.to_string().contains("Invalid email or password"));
    }

    #[tokio::test]
    async fn signup_conflict_is_token_exchange_error() {
        let auth = client(start_auth_server().await);
        let err = auth
            .signup("alice@example.com", "Alice", "hunter2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
        assert!(err.to_string().contains("Email already registered"));

        let tokens = auth
            .signup("bob@example.com", "Bob", "pw")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at_signup");
    }

    #[tokio::test]
    async fn google_sign_in() {
        let auth = client(start_auth_server().await);
        assert_eq!(
            auth.google("g_valid").await.unwrap().access_token,
            "at_google"
        );
        assert!(matches!(
            auth.google("g_forged").await,
            Err(Error::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn refresh_issues_new_pair() {
        let auth = client(start_auth_server().await);
        let tokens = auth.refresh("rt_valid").await.unwrap();
        assert_eq!(tokens.access_token, "at_renewed");
        assert_eq!(tokens.refresh_token, "rt_renewed");
    }

    #[tokio::test]
    async fn refresh_with_expired_token_is_invalid_credentials() {
        let auth = client(start_auth_server().await);
        let err = auth.refresh("rt_expired").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_server_error_is_token_exchange() {
        let auth = client(start_auth_server().await);
        let err = auth.refresh("rt_broken").await.unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let auth = client(format!("http://{addr}"));
        let err = auth.refresh("rt_valid").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err:?}");
    }
}
