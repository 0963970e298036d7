//! OAuth 2.0 token endpoint types for the federated-login grant.

pub mod token;

pub use token::{
    IDP_TOKEN_GRANT_TYPE, TOKEN_PARAM, TokenError, TokenErrorCode, TokenRequest, TokenResponse,
};
