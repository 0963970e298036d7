//! Error types for federated login operations.
//!
//! [`IdpError`] covers the token exchange; every variant maps onto an OAuth
//! 2.0 error code so the surrounding token endpoint can render it directly.
//! [`IngestError`] covers configuration documents and never reaches clients.

use super::jwks::JwksError;
use crate::error::{AuthError, ErrorCategory};
use crate::oauth::{TokenError, TokenErrorCode};

/// Errors that can occur while exchanging an external IDP token.
#[derive(Debug, thiserror::Error)]
pub enum IdpError {
    /// The request carried a grant type other than `idp_token`.
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// The request did not carry the external token.
    #[error("Missing required parameter: token")]
    MissingToken,

    /// The external token is not a well-formed JWT.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The token header has no `kid`.
    #[error("Token is missing key ID (kid) header")]
    MissingKeyId,

    /// No signing key with the token's `kid` is known for the tenant.
    #[error("Unknown signing key: {0}")]
    UnknownSigningKey(String),

    /// The signature does not verify against the resolved key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token has expired.
    #[error("Token has expired")]
    TokenExpired,

    /// No applicable client of the tenant is configured for the issuer.
    #[error("No client config found for issuer {0}")]
    NoClientConfigForIssuer(String),

    /// The token lacks the claim that identifies the local user.
    #[error("Token is missing identity claim: {0}")]
    MissingIdentityClaim(String),

    /// No local user carries the token's identity.
    #[error("No local user found for the token identity")]
    UserNotFound,

    /// The matching local user is inactive.
    #[error("User account is inactive")]
    UserInactive,

    /// Resolving signing keys failed.
    #[error("JWKS error: {0}")]
    Jwks(#[from] JwksError),

    /// A collaborator (user lookup, token issuer) failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IdpError {
    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> TokenErrorCode {
        match self {
            Self::UnsupportedGrantType(_) => TokenErrorCode::UnsupportedGrantType,
            Self::MissingToken => TokenErrorCode::InvalidRequest,
            Self::MalformedToken(_)
            | Self::MissingKeyId
            | Self::UnknownSigningKey(_)
            | Self::InvalidSignature
            | Self::TokenExpired => TokenErrorCode::InvalidToken,
            Self::NoClientConfigForIssuer(_)
            | Self::MissingIdentityClaim(_)
            | Self::UserNotFound
            | Self::UserInactive => TokenErrorCode::InvalidGrant,
            Self::Jwks(_) => TokenErrorCode::ServerError,
            Self::Auth(e) if e.is_client_error() => match e.oauth_error_code() {
                "invalid_request" => TokenErrorCode::InvalidRequest,
                "invalid_token" => TokenErrorCode::InvalidToken,
                "unsupported_grant_type" => TokenErrorCode::UnsupportedGrantType,
                _ => TokenErrorCode::InvalidGrant,
            },
            Self::Auth(_) => TokenErrorCode::ServerError,
        }
    }

    /// Returns `true` if the external token itself was rejected.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::MissingKeyId
                | Self::UnknownSigningKey(_)
                | Self::InvalidSignature
                | Self::TokenExpired
        )
    }

    /// Returns `true` if the failure originated outside the exchange itself.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        match self {
            Self::Jwks(_) => true,
            Self::Auth(e) => e.is_server_error(),
            _ => false,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedGrantType(_) | Self::MissingToken => ErrorCategory::Validation,
            Self::MalformedToken(_)
            | Self::MissingKeyId
            | Self::UnknownSigningKey(_)
            | Self::InvalidSignature
            | Self::TokenExpired => ErrorCategory::Token,
            Self::NoClientConfigForIssuer(_) | Self::MissingIdentityClaim(_) => {
                ErrorCategory::Federation
            }
            Self::UserNotFound | Self::UserInactive => ErrorCategory::Authentication,
            Self::Jwks(_) => ErrorCategory::Infrastructure,
            Self::Auth(e) => e.category(),
        }
    }

    /// Converts the error into its wire representation.
    ///
    /// Server-side failures are reported without detail.
    #[must_use]
    pub fn to_token_error(&self) -> TokenError {
        let code = self.oauth_error_code();
        match code {
            TokenErrorCode::ServerError => {
                TokenError::with_description(code, "Internal server error")
            }
            _ => TokenError::with_description(code, self.to_string()),
        }
    }
}

impl From<IdpError> for TokenError {
    fn from(error: IdpError) -> Self {
        error.to_token_error()
    }
}

impl From<jsonwebtoken::errors::Error> for IdpError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match error.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::MalformedToken(error.to_string()),
        }
    }
}

/// Errors raised while ingesting configuration documents.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The document is not valid YAML or has an unexpected shape.
    #[error("Failed to parse configuration document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The path does not match any watched template.
    #[error("Not a watched configuration path: {0}")]
    UnknownPath(String),
}
