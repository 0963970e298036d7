//! Federated-login token exchange.
//!
//! Implements the `idp_token` grant: a token issued by a tenant's external
//! identity provider is verified and exchanged for a local access token.
//!
//! # Flow
//!
//! 1. The external token is removed from the request parameters
//! 2. The `iss` claim must belong to an applicable client of the tenant
//! 3. Its `kid` header selects a verifier among the keys published by that
//!    client in the tenant's [`JwksCache`]; another client's key never
//!    verifies the token
//! 4. Signature and validity window are verified
//! 5. The client's identity claim (default `email`) selects a local user
//! 6. Token minting is delegated to the [`TokenIssuer`]
//!
//! Every failure is terminal; nothing is retried.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::decode_header;
use serde_json::Value;

use super::error::IdpError;
use super::ingestor::ConfigIngestor;
use super::jwk::Claims;
use super::jwks::JwksCache;
use crate::config::ExchangeConfig;
use crate::oauth::{IDP_TOKEN_GRANT_TYPE, TOKEN_PARAM, TokenRequest, TokenResponse};
use crate::storage::{LocalUser, UserLookup};
use crate::token::TokenIssuer;
use crate::types::{ClientKey, TenantKey};

/// A verified external identity mapped onto a local user.
#[derive(Debug, Clone)]
pub struct IdpAuthenticationToken {
    /// Tenant the login belongs to.
    pub tenant: TenantKey,

    /// IDP client whose issuer signed the token.
    pub client_key: ClientKey,

    /// The local user.
    pub user: LocalUser,

    /// Authorities granted to the principal.
    pub authorities: Vec<String>,

    /// Verified claims of the external token.
    pub claims: Claims,
}

impl IdpAuthenticationToken {
    /// Returns the principal name.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.user.login
    }
}

/// Exchanges external IDP tokens for local access tokens.
pub struct TokenExchanger {
    ingestor: Arc<ConfigIngestor>,
    jwks: Arc<JwksCache>,
    users: Arc<dyn UserLookup>,
    issuer: Arc<dyn TokenIssuer>,
    config: ExchangeConfig,
}

impl TokenExchanger {
    /// Creates a new exchanger.
    #[must_use]
    pub fn new(
        ingestor: Arc<ConfigIngestor>,
        jwks: Arc<JwksCache>,
        users: Arc<dyn UserLookup>,
        issuer: Arc<dyn TokenIssuer>,
        config: ExchangeConfig,
    ) -> Self {
        Self {
            ingestor,
            jwks,
            users,
            issuer,
            config,
        }
    }

    /// Handles an `idp_token` grant request for `tenant`.
    ///
    /// The `token` parameter is consumed; the remaining parameters are passed
    /// on to the token issuer.
    ///
    /// # Errors
    ///
    /// Returns the first failing step as an [`IdpError`]; see
    /// [`IdpError::oauth_error_code`] for the wire mapping.
    pub async fn exchange(
        &self,
        tenant: &TenantKey,
        mut request: TokenRequest,
    ) -> Result<TokenResponse, IdpError> {
        let token = request.take_param(TOKEN_PARAM);

        if request.grant_type != IDP_TOKEN_GRANT_TYPE {
            return Err(IdpError::UnsupportedGrantType(request.grant_type));
        }

        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(IdpError::MissingToken)?;

        let authentication = self.authenticate(tenant, &token).await.inspect_err(|e| {
            tracing::warn!(
                tenant = %tenant,
                error = %e,
                code = %e.oauth_error_code(),
                category = %e.category(),
                "IDP token exchange rejected"
            );
        })?;

        let response = self
            .issuer
            .issue(&authentication, &request)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    tenant = %tenant,
                    error = %e,
                    category = %e.category(),
                    "Local token issuance failed"
                );
            })?;

        tracing::info!(
            tenant = %tenant,
            client = %authentication.client_key,
            user = %authentication.principal(),
            "IDP token exchanged"
        );

        Ok(response)
    }

    /// Verifies an external token and resolves its local user.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be verified, its issuer is not
    /// configured for the tenant, or no active local user matches it.
    pub async fn authenticate(
        &self,
        tenant: &TenantKey,
        token: &str,
    ) -> Result<IdpAuthenticationToken, IdpError> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or(IdpError::MissingKeyId)?;

        // The issuer selects the client; only that client's keys may verify.
        let issuer = unverified_issuer(token)?;
        let client = self
            .ingestor
            .find_client_by_issuer(tenant, &issuer)
            .ok_or_else(|| IdpError::NoClientConfigForIssuer(issuer.clone()))?;

        let holder = self
            .jwks
            .get_client_definition_load_if_necessary(tenant, &client.key, &kid)
            .await?
            .ok_or_else(|| IdpError::UnknownSigningKey(kid.clone()))?;

        let claims = holder
            .verifier
            .verify(token, self.config.clock_skew_tolerance)?;
        tracing::debug!(
            tenant = %tenant,
            client = %client.key,
            kid = %kid,
            "External token signature verified"
        );

        let claim_name = client
            .public
            .as_ref()
            .and_then(|p| p.claims_mapping.user_identity_attribute.as_deref())
            .unwrap_or(&self.config.default_identity_claim);

        let identity = claims
            .get(claim_name)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| IdpError::MissingIdentityClaim(claim_name.to_string()))?;

        let user = self
            .users
            .find_by_identity(tenant, identity)
            .await?
            .ok_or(IdpError::UserNotFound)?;

        if !user.is_active() {
            return Err(IdpError::UserInactive);
        }

        Ok(IdpAuthenticationToken {
            tenant: tenant.clone(),
            client_key: client.key.clone(),
            authorities: user.authorities.clone(),
            user,
            claims,
        })
    }
}

/// Reads `iss` from the payload before the signature is checked.
///
/// The value only selects which client's keys verify the token.
fn unverified_issuer(token: &str) -> Result<String, IdpError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| IdpError::MalformedToken("missing payload".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IdpError::MalformedToken(format!("payload encoding: {e}")))?;
    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| IdpError::MalformedToken(format!("payload: {e}")))?;

    claims
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| IdpError::MalformedToken("missing iss claim".to_string()))
}
