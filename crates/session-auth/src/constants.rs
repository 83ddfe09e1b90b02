//! Circuit Analyzer authentication endpoints and storage slot names
//!
//! The exchange endpoints issue credential pairs themselves, so requests to
//! them are never decorated with a bearer token and a 401 from them is never
//! answered with a renewal attempt.

/// Email/password account creation
pub const SIGNUP_PATH: &str = "/api/auth/signup";

/// Email/password sign-in
pub const LOGIN_PATH: &str = "/api/auth/login";

/// Federated sign-in with a Google ID token
pub const GOOGLE_LOGIN_PATH: &str = "/api/auth/google";

/// Renewal exchange: trades a refresh token for a fresh pair
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Profile of the signed-in user (an ordinary authenticated endpoint)
pub const CURRENT_USER_PATH: &str = "/api/auth/me";

/// Every endpoint that takes part in issuing credentials.
pub const AUTH_EXCHANGE_PATHS: &[&str] = &[SIGNUP_PATH, LOGIN_PATH, GOOGLE_LOGIN_PATH, REFRESH_PATH];

/// Durable slot holding the access token.
pub const ACCESS_TOKEN_SLOT: &str = "access_token";

/// Durable slot holding the refresh (renewal) token.
pub const REFRESH_TOKEN_SLOT: &str = "refresh_token";

/// Whether `path` targets one of the credential-issuing endpoints.
///
/// Paths are compared the way the transport joins them onto the base URL:
/// the leading slash is optional, and query strings, trailing slashes and
/// repeated slashes are ignored.
pub fn is_auth_exchange(path: &str) -> bool {
    let path = normalize(path);
    AUTH_EXCHANGE_PATHS
        .iter()
        .any(|endpoint| normalize(endpoint) == path)
}

/// Path segments joined by single slashes, without leading or trailing ones.
fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
