//! JSON Web Key definitions and signature verifiers.
//!
//! Raw JWK Set documents published by a tenant are parsed into
//! [`JwkDefinition`]s. Only RSA keys can verify signatures; other key types
//! are recognised and reported as [`JwkDefinition::Unsupported`] so callers
//! can skip them without treating them as errors.
//!
//! An RSA definition is turned into a [`SignatureVerifier`] by decoding the
//! base64url modulus and exponent into big integers, validating them as an
//! RSA public key and wrapping the result as a `jsonwebtoken` decoding key.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::Deserialize;

use crate::types::ClientKey;

/// Verified token claims.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Errors raised while parsing a JWK or deriving its verifier.
#[derive(Debug, thiserror::Error)]
pub enum JwkError {
    /// The document is not a JWK Set.
    #[error("Failed to parse JWK Set: {0}")]
    Json(#[from] serde_json::Error),

    /// A required member is missing.
    #[error("JWK is missing required member '{0}'")]
    MissingMember(&'static str),

    /// A key component is not valid base64url.
    #[error("JWK member '{member}' is not valid base64url: {source}")]
    InvalidEncoding {
        /// The offending member.
        member: &'static str,
        /// The decoding error.
        #[source]
        source: base64::DecodeError,
    },

    /// The components do not form a valid RSA public key.
    #[error("Invalid RSA key: {0}")]
    InvalidKey(String),

    /// The declared algorithm cannot be used with an RSA key.
    #[error("Unsupported algorithm for RSA key: {0}")]
    UnsupportedAlgorithm(String),
}

/// JWK key type (`kty`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// `RSA`
    Rsa,
    /// `EC`
    Ec,
    /// `oct`
    Oct,
    /// `OKP`
    Okp,
    /// Any other value.
    Unknown(String),
}

impl KeyType {
    fn parse(kty: &str) -> Self {
        match kty {
            "RSA" => Self::Rsa,
            "EC" => Self::Ec,
            "oct" => Self::Oct,
            "OKP" => Self::Okp,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => write!(f, "RSA"),
            Self::Ec => write!(f, "EC"),
            Self::Oct => write!(f, "oct"),
            Self::Okp => write!(f, "OKP"),
            Self::Unknown(kty) => write!(f, "{kty}"),
        }
    }
}

/// Intended use of a public key (`use`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyUse {
    /// `sig`
    Signature,
    /// `enc`
    Encryption,
    /// Any other value.
    Other(String),
}

impl KeyUse {
    fn parse(value: &str) -> Self {
        match value {
            "sig" => Self::Signature,
            "enc" => Self::Encryption,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A published RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaJwkDefinition {
    /// Key id (`kid`).
    pub key_id: String,
    /// Intended use, if declared.
    pub key_use: Option<KeyUse>,
    /// Declared algorithm, if any.
    pub algorithm: Option<String>,
    /// Base64url modulus (`n`).
    pub modulus: String,
    /// Base64url public exponent (`e`).
    pub exponent: String,
}

impl RsaJwkDefinition {
    /// Returns `true` unless the key is declared for encryption only.
    #[must_use]
    pub fn is_signing_key(&self) -> bool {
        !matches!(self.key_use, Some(KeyUse::Encryption))
    }
}

/// One key of a published JWK Set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwkDefinition {
    /// An RSA key.
    Rsa(RsaJwkDefinition),
    /// A recognised key of a type that cannot verify signatures here.
    Unsupported {
        /// Key id, if present.
        key_id: Option<String>,
        /// The key type.
        key_type: KeyType,
    },
}

impl JwkDefinition {
    /// Returns the key id, if present.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Rsa(rsa) => Some(&rsa.key_id),
            Self::Unsupported { key_id, .. } => key_id.as_deref(),
        }
    }

    /// Returns the key type.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Unsupported { key_type, .. } => key_type.clone(),
        }
    }
}

#[derive(Deserialize)]
struct RawJwkSet {
    #[serde(default)]
    keys: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawJwk {
    kid: Option<String>,
    kty: String,
    #[serde(rename = "use")]
    key_use: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// Parses a JWK Set document.
///
/// The outer error is returned when the document itself is unusable; each
/// key is parsed independently so one malformed key does not hide the others.
///
/// # Errors
///
/// Returns an error if the document is not a JSON object with a `keys` array.
pub fn parse_jwk_set(document: &str) -> Result<Vec<Result<JwkDefinition, JwkError>>, JwkError> {
    let set: RawJwkSet = serde_json::from_str(document)?;
    Ok(set.keys.into_iter().map(parse_jwk).collect())
}

/// Parses a single JWK.
///
/// # Errors
///
/// Returns an error if the key is not an object with `kty`, or if an RSA key
/// lacks `kid`, `n` or `e`.
pub fn parse_jwk(value: serde_json::Value) -> Result<JwkDefinition, JwkError> {
    let raw: RawJwk = serde_json::from_value(value)?;

    match KeyType::parse(&raw.kty) {
        KeyType::Rsa => Ok(JwkDefinition::Rsa(RsaJwkDefinition {
            key_id: raw.kid.ok_or(JwkError::MissingMember("kid"))?,
            key_use: raw.key_use.as_deref().map(KeyUse::parse),
            algorithm: raw.alg,
            modulus: raw.n.ok_or(JwkError::MissingMember("n"))?,
            exponent: raw.e.ok_or(JwkError::MissingMember("e"))?,
        })),
        key_type => Ok(JwkDefinition::Unsupported {
            key_id: raw.kid,
            key_type,
        }),
    }
}

/// Verifies token signatures with one RSA public key.
#[derive(Clone)]
pub struct SignatureVerifier {
    algorithm: Algorithm,
    key: DecodingKey,
}

impl SignatureVerifier {
    /// Derives a verifier from an RSA key definition.
    ///
    /// The algorithm is taken from the key's `alg`; keys without one verify
    /// RS256.
    ///
    /// # Errors
    ///
    /// Returns an error if the components are not valid base64url, do not
    /// form a valid RSA public key, or if `alg` is not an RSA algorithm.
    pub fn from_rsa(definition: &RsaJwkDefinition) -> Result<Self, JwkError> {
        let algorithm = rsa_algorithm(definition.algorithm.as_deref())?;

        let n = decode_component("n", &definition.modulus)?;
        let e = decode_component("e", &definition.exponent)?;
        let public_key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(|e| JwkError::InvalidKey(e.to_string()))?;

        let key = DecodingKey::from_rsa_raw_components(
            &public_key.n().to_bytes_be(),
            &public_key.e().to_bytes_be(),
        );

        Ok(Self { algorithm, key })
    }

    /// Returns the verification algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verifies the token signature and its `exp`/`nbf` claims.
    ///
    /// The audience is not checked; the caller matches the issuer against
    /// its client configuration.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error if the token is malformed, signed
    /// with another algorithm or key, or outside its validity window.
    pub fn verify(
        &self,
        token: &str,
        leeway: Duration,
    ) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = leeway.as_secs();
        validation.validate_aud = false;
        validation.validate_nbf = true;

        decode::<Claims>(token, &self.key, &validation).map(|data| data.claims)
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// An RSA key together with its derived verifier.
///
/// A holder belongs to the IDP client whose JWK Set published it; a token is
/// only accepted by a key of the client its issuer resolves to.
#[derive(Debug, Clone)]
pub struct JwkDefinitionHolder {
    /// Client whose JWK Set published the key.
    pub client_key: ClientKey,
    /// The published key.
    pub definition: RsaJwkDefinition,
    /// Verifier derived from it.
    pub verifier: SignatureVerifier,
}

impl JwkDefinitionHolder {
    /// Builds the holder for an RSA key.
    ///
    /// # Errors
    ///
    /// Returns an error if no verifier can be derived from the key.
    pub fn new(client_key: ClientKey, definition: RsaJwkDefinition) -> Result<Self, JwkError> {
        let verifier = SignatureVerifier::from_rsa(&definition)?;
        Ok(Self {
            client_key,
            definition,
            verifier,
        })
    }

    /// Returns the key id.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.definition.key_id
    }
}

fn rsa_algorithm(alg: Option<&str>) -> Result<Algorithm, JwkError> {
    match alg {
        None => Ok(Algorithm::RS256),
        Some("RS256") => Ok(Algorithm::RS256),
        Some("RS384") => Ok(Algorithm::RS384),
        Some("RS512") => Ok(Algorithm::RS512),
        Some("PS256") => Ok(Algorithm::PS256),
        Some("PS384") => Ok(Algorithm::PS384),
        Some("PS512") => Ok(Algorithm::PS512),
        Some(other) => Err(JwkError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn decode_component(member: &'static str, value: &str) -> Result<Vec<u8>, JwkError> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|source| JwkError::InvalidEncoding { member, source })
}
