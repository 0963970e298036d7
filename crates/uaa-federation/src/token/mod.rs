//! Local token issuance.
//!
//! Minting and persisting local access tokens belongs to the surrounding
//! authorization server. After a successful exchange the federation core hands
//! it the authenticated principal through [`TokenIssuer`].

use async_trait::async_trait;

use crate::AuthResult;
use crate::federation::IdpAuthenticationToken;
use crate::oauth::{TokenRequest, TokenResponse};

/// Mints local tokens for principals authenticated via an external IDP.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issues a local access token for `authentication`.
    ///
    /// `request` is the original token request with the external token
    /// already removed; the remaining parameters (client id, scope, ...) are
    /// available as request metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be created or persisted.
    async fn issue(
        &self,
        authentication: &IdpAuthenticationToken,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse>;
}
