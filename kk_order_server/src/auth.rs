//! Bearer token authentication.
//!
//! Access tokens are HS256 JWTs issued by the store's auth service and carry the user id in `sub` plus a list of
//! roles. This server only validates them. [`TokenIssuer`] exists for tooling and tests.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use kk_order_engine::objects::Requester;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user id.
    pub sub: String,
    pub roles: Vec<Role>,
    /// Expiry, in seconds since the Unix epoch.
    pub exp: i64,
}

impl JwtClaims {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn requester(&self) -> Requester {
        if self.is_admin() {
            Requester::admin(&self.sub)
        } else {
            Requester::user(&self.sub)
        }
    }
}

/// Handlers take `JwtClaims` as an argument to get the caller's identity. The claims are put into the request
/// extensions by [`crate::middleware::JwtMiddlewareFactory`]; a route outside that middleware never has any.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned();
        ready(claims.ok_or(ServerError::AuthenticationError(AuthError::MissingToken)))
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(config: &AuthConfig) -> Self {
        let key = DecodingKey::from_secret(config.jwt_secret.reveal().as_bytes());
        Self { key, validation: Validation::new(Algorithm::HS256) }
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::ValidationError(e.to_string()),
            _ => AuthError::PoorlyFormattedToken(e.to_string()),
        })?;
        debug!("🔐️ Access token validated for {}", data.claims.sub);
        Ok(data.claims)
    }
}

pub struct TokenIssuer {
    key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self { key: EncodingKey::from_secret(config.jwt_secret.reveal().as_bytes()) }
    }

    /// Issues an access token for `user_id` with the given roles, valid for `duration` (one day by default).
    pub fn issue_token(&self, user_id: &str, roles: Vec<Role>, duration: Option<Duration>) -> Result<String, AuthError> {
        let exp = Utc::now() + duration.unwrap_or_else(|| Duration::hours(24));
        let claims = JwtClaims { sub: user_id.to_string(), roles, exp: exp.timestamp() };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.key).map_err(|e| AuthError::CouldNotIssueToken(e.to_string()))
    }
}
