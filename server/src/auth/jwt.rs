use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;

use crate::auth::middleware::{Claims, Role};

/// Resolve the HS256 key shared with the identity provider.
/// A configured secret wins; otherwise a persisted random key from data_dir is used.
pub fn resolve_jwt_secret(
    configured: Option<&str>,
    data_dir: &str,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    match configured {
        Some(secret) if !secret.is_empty() => {
            tracing::info!("JWT verification key taken from configuration");
            Ok(secret.as_bytes().to_vec())
        }
        _ => load_or_generate_jwt_secret(data_dir),
    }
}

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an access token. Tokens are normally minted by the identity provider;
/// this exists for operators and tests that share the key.
pub fn issue_access_token(
    secret: &[u8],
    subject: &str,
    role: Role,
    driver_id: Option<i64>,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        role,
        driver_id,
        iat: now,
        exp: now + ttl_secs,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Validate an access token and return its claims.
pub fn validate_access_token(
    secret: &[u8],
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let secret = b"0123456789abcdef0123456789abcdef";
        let token = issue_access_token(secret, "user-1", Role::Driver, Some(5), 60).unwrap();
        let claims = validate_access_token(secret, &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, Role::Driver);
        assert_eq!(claims.driver_id, Some(5));
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let secret = b"0123456789abcdef0123456789abcdef";
        let expired = issue_access_token(secret, "user-1", Role::Driver, Some(5), -3600).unwrap();
        let err = validate_access_token(secret, &expired).unwrap_err();
        assert!(matches!(
            err.kind(),
            jsonwebtoken::errors::ErrorKind::ExpiredSignature
        ));

        let foreign = issue_access_token(b"another-secret", "user-1", Role::Admin, None, 60).unwrap();
        assert!(validate_access_token(secret, &foreign).is_err());
    }

    #[test]
    fn secret_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let first = load_or_generate_jwt_secret(path).unwrap();
        let second = load_or_generate_jwt_secret(path).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
        assert_eq!(resolve_jwt_secret(Some("shared"), path).unwrap(), b"shared".to_vec());
        assert_eq!(resolve_jwt_secret(Some(""), path).unwrap(), first);
    }
}
