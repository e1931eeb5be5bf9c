//! JWT authentication.
//!
//! Access tokens are issued by the identity service and signed with a
//! shared HS256 secret. The subject is the user id that carts, orders,
//! profiles and reviews are keyed by; the role decides privileges.
//!
//! ## Extractors
//! ```text
//! Authorization header     Principal            User
//! ─────────────────────    ─────────────────    ─────────────────
//! (absent)                 Anonymous            401
//! Bearer <valid>           User(..)             User
//! Bearer <invalid>         401                  401
//! other scheme             401                  401
//! ```

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use pharma_core::Role;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    pub role: Role,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// JWT token manager.
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &str, access_lifetime_secs: i64) -> Self {
        JwtManager {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_lifetime_secs,
        }
    }

    /// Generate an access token for `user_id`.
    pub fn issue_token(&self, user_id: &str, role: Role) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_lifetime_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))?;

        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::unauthorized("Token has no subject"));
        }
        Ok(data.claims)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Request Principals
// =============================================================================

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub role: Role,
}

impl User {
    /// Catalog writes, all orders, order workflow.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Role {} cannot perform this action",
                self.role
            )))
        }
    }

    /// Stock receipts, adjustments and batch reads.
    pub fn require_inventory(&self) -> Result<(), ApiError> {
        if self.role.can_manage_inventory() {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Role {} cannot manage inventory",
                self.role
            )))
        }
    }
}

/// The caller of a publicly readable endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(User),
}

impl Principal {
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::User(user) => Some(user),
        }
    }
}

fn principal_from_parts(parts: &Parts, jwt: &JwtManager) -> Result<Principal, ApiError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(Principal::Anonymous);
    };
    let header = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Malformed authorization header"))?;
    let token = extract_bearer_token(header)
        .ok_or_else(|| ApiError::unauthorized("Expected a bearer token"))?;
    let claims = jwt.validate_token(token)?;

    Ok(Principal::User(User {
        id: claims.sub,
        role: claims.role,
    }))
}

impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        principal_from_parts(parts, &state.jwt)
    }
}

impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match principal_from_parts(parts, &state.jwt)? {
            Principal::User(user) => Ok(user),
            Principal::Anonymous => Err(ApiError::unauthorized("Authentication required")),
        }
    }
}
