//! Bearer token authentication
//!
//! Every command route requires a JWT signed by the configured issuer. The
//! token is taken from the `Authorization: Bearer` header, or from the
//! `access_token` query parameter when the header is absent. A verified
//! token must also carry the configured entry in its `claims` array.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use garage_config::AuthConfig;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ErrorResponse;

/// Claims read from a verified token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub claims: Vec<String>,
}

/// Rejection of a request
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,

    #[error("invalid access token: {0}")]
    InvalidToken(String),

    #[error("access token lacks the '{0}' claim")]
    MissingClaim(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::MissingClaim(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Failure to build a verifier from configuration
#[derive(Debug, Error)]
pub enum AuthSetupError {
    #[error("unsupported algorithm '{0}'")]
    Algorithm(String),

    #[error("{0} is required for the configured algorithm")]
    MissingKey(&'static str),

    #[error("failed to read public key {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key material: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),
}

/// Verifies access tokens against the configured key and claim
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    claim: String,
}

impl TokenVerifier {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthSetupError> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .or_else(|_| Algorithm::from_str(&config.algorithm.to_ascii_uppercase()))
            .map_err(|_| AuthSetupError::Algorithm(config.algorithm.clone()))?;

        let key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = config
                    .secret
                    .as_deref()
                    .ok_or(AuthSetupError::MissingKey("auth.secret"))?;
                DecodingKey::from_secret(secret.as_bytes())
            }
            _ => {
                let path = config
                    .public_key
                    .as_ref()
                    .ok_or(AuthSetupError::MissingKey("auth.public_key"))?;
                let pem = std::fs::read(path).map_err(|e| AuthSetupError::ReadKey {
                    path: path.clone(),
                    source: e,
                })?;
                match algorithm {
                    Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(&pem)?,
                    Algorithm::EdDSA => DecodingKey::from_ed_pem(&pem)?,
                    _ => DecodingKey::from_rsa_pem(&pem)?,
                }
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.validate_exp = !config.ignore_expiration;
        validation.validate_nbf = !config.ignore_not_before;
        if config.ignore_expiration {
            validation.required_spec_claims.remove("exp");
        }

        Ok(Self {
            key,
            validation,
            claim: config.claim.clone(),
        })
    }

    /// Verify signature, issuer, audience, lifetime and the required claim
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if !data.claims.claims.iter().any(|c| c == &self.claim) {
            return Err(AuthError::MissingClaim(self.claim.clone()));
        }
        Ok(data.claims)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    access_token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
}

/// Middleware guarding the command routes
pub async fn require_token(
    State(verifier): State<Arc<TokenVerifier>>,
    query: Option<Query<TokenQuery>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // A malformed query string counts as no token
    let token = bearer_token(request.headers())
        .or_else(|| query.and_then(|Query(q)| q.access_token))
        .ok_or(AuthError::MissingToken)?;

    match verifier.verify(&token) {
        Ok(claims) => {
            debug!(subject = ?claims.sub, path = %request.uri().path(), "Authorized request");
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "Rejected request");
            Err(e)
        }
    }
}
