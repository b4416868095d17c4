use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use serde::{Deserialize, Serialize};

/// Role asserted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Driver,
}

/// JWT claims extracted from Authorization: Bearer header (REST) or ?token= (WebSocket).
/// Implements axum's FromRequestParts for use as an extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity provider user id
    pub sub: String,
    pub role: Role,
    /// Registry driver id, present on driver tokens
    #[serde(default)]
    pub driver_id: Option<i64>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Why a connection may not act for a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    /// No driver could be derived from the request or the token.
    Missing,
    /// The token belongs to a different driver.
    Mismatch,
}

impl Claims {
    /// Driver id this identity may act for, given the id carried by a request.
    /// `requested == 0` means "the driver named in the token". Admins may act for anyone.
    pub fn acting_driver(&self, requested: i64) -> Result<i64, IdentityError> {
        if requested == 0 {
            return self.driver_id.ok_or(IdentityError::Missing);
        }
        match (self.role, self.driver_id) {
            (Role::Admin, _) => Ok(requested),
            (Role::Driver, Some(own)) if own == requested => Ok(requested),
            (Role::Driver, Some(_)) => Err(IdentityError::Mismatch),
            (Role::Driver, None) => Err(IdentityError::Missing),
        }
    }
}

impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // Get JWT secret from request extensions (set by middleware layer)
        let jwt_secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

        crate::auth::jwt::validate_access_token(&jwt_secret.0, token)
            .map_err(|_| StatusCode::UNAUTHORIZED)
    }
}

/// JWT secret stored in request extensions for the Claims extractor
#[derive(Clone)]
pub struct JwtSecret(pub Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, driver_id: Option<i64>) -> Claims {
        Claims {
            sub: "u".to_string(),
            role,
            driver_id,
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn driver_may_only_act_for_itself() {
        let driver = claims(Role::Driver, Some(5));
        assert_eq!(driver.acting_driver(0), Ok(5));
        assert_eq!(driver.acting_driver(5), Ok(5));
        assert_eq!(driver.acting_driver(6), Err(IdentityError::Mismatch));
    }

    #[test]
    fn admin_may_act_for_named_driver() {
        let admin = claims(Role::Admin, None);
        assert_eq!(admin.acting_driver(9), Ok(9));
        assert_eq!(admin.acting_driver(0), Err(IdentityError::Missing));
    }
}
