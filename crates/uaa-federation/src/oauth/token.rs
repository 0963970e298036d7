//! Token endpoint types.
//!
//! This module provides the request, response, and error types exchanged with
//! the OAuth 2.0 token endpoint of the surrounding authorization server for
//! the federated-login grant.
//!
//! # Grant Type
//!
//! - `idp_token` - Exchange a token issued by an external identity provider
//!   (form parameter `token`) for a local access token

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Grant type of the federated-login token exchange.
pub const IDP_TOKEN_GRANT_TYPE: &str = "idp_token";

/// Request parameter carrying the external token.
pub const TOKEN_PARAM: &str = "token";

/// Token request parameters.
///
/// Every form parameter other than `grant_type` is kept in `params`, so grant
/// handlers can consume the ones they own and pass the rest on as request
/// metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// The grant type.
    pub grant_type: String,

    /// Remaining request parameters.
    #[serde(flatten)]
    pub params: HashMap<String, String>,
}

impl TokenRequest {
    /// Creates a request for the given grant type.
    #[must_use]
    pub fn new(grant_type: impl Into<String>) -> Self {
        Self {
            grant_type: grant_type.into(),
            params: HashMap::new(),
        }
    }

    /// Adds a request parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Removes and returns a parameter.
    pub fn take_param(&mut self, name: &str) -> Option<String> {
        self.params.remove(name)
    }
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "openid"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// Token type, always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Refresh token, if the issuer granted one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Creates a bearer token response.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_in,
            scope: None,
            refresh_token: None,
        }
    }

    /// Adds granted scopes.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Adds a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}

/// Token error response.
///
/// # Example Response
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "No client config found for issuer https://idp.example.com"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenError {
    /// OAuth 2.0 error code.
    pub error: TokenErrorCode,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates a new token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }
}

/// OAuth 2.0 token error codes.
///
/// RFC 6749 Section 5.2, plus `invalid_token` (RFC 6750) for rejected
/// external tokens and `server_error` for collaborator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// The request is missing a required parameter or is otherwise malformed.
    InvalidRequest,

    /// The provided grant is invalid or cannot be mapped to a local user.
    InvalidGrant,

    /// The external token is malformed, expired, or fails verification.
    InvalidToken,

    /// The authorization grant type is not supported.
    UnsupportedGrantType,

    /// The server failed to process an otherwise valid request.
    ServerError,
}

impl TokenErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidToken => "invalid_token",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidToken => 401,
            Self::ServerError => 500,
            Self::InvalidRequest | Self::InvalidGrant | Self::UnsupportedGrantType => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
