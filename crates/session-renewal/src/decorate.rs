//! Outbound request decoration
//!
//! Attaches the current access token as a bearer credential just before
//! dispatch. Decoration works on a copy: the caller's descriptor is never
//! mutated, so the same descriptor can be re-authorized for a retry.

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use session_auth::{CredentialPair, is_auth_exchange};
use transport::ApiRequest;

use crate::error::{Error, Result};

/// A request ready for the wire, plus the access token it carries.
#[derive(Debug)]
pub struct Dispatch {
    pub request: ApiRequest,
    /// Token attached by decoration; `None` for auth endpoints or when no
    /// session is stored.
    pub access: Option<Secret<String>>,
}

/// Prepare `request` for dispatch with the stored credentials.
///
/// Credential-issuing endpoints are sent exactly as the caller built them.
/// Everything else gets `Authorization: Bearer <access>` when a pair is
/// stored, replacing any caller-supplied value.
pub fn decorate(request: &ApiRequest, credentials: Option<&CredentialPair>) -> Result<Dispatch> {
    if is_auth_exchange(request.path()) {
        return Ok(Dispatch {
            request: request.clone(),
            access: None,
        });
    }
    match credentials {
        Some(pair) => Ok(Dispatch {
            request: with_bearer(request, &pair.access)?,
            access: Some(pair.access.clone()),
        }),
        None => Ok(Dispatch {
            request: request.clone(),
            access: None,
        }),
    }
}

/// Copy of `request` carrying `access` as its bearer credential.
pub fn with_bearer(request: &ApiRequest, access: &Secret<String>) -> Result<ApiRequest> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", access.as_str()))
        .map_err(|e| Error::InvalidCredential(format!("access token is not a valid header value: {e}")))?;
    value.set_sensitive(true);

    let mut authorized = request.clone();
    authorized.headers_mut().insert(AUTHORIZATION, value);
    Ok(authorized)
}
