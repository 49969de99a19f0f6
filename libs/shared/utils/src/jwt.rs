use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{JwtClaims, JwtHeader, Role, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT secret is not set")]
    MissingSecret,

    #[error("Invalid token format")]
    Malformed,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Invalid claims: {0}")]
    InvalidClaims(String),
}

/// Issues and verifies HS256 tokens. The signing key is supplied at
/// construction and never read from ambient state.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.jwt_secret.clone(), Duration::hours(config.token_ttl_hours))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: Uuid, role: Role, email: Option<&str>) -> Result<String, TokenError> {
        self.issue_with_ttl(subject, role, email, self.ttl)
    }

    pub fn issue_with_ttl(
        &self,
        subject: Uuid,
        role: Role,
        email: Option<&str>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let now = Utc::now();
        let header = JwtHeader {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = JwtClaims {
            sub: subject.to_string(),
            exp: Some((now + ttl).timestamp().max(0) as u64),
            email: email.map(str::to_string),
            role: Some(role.to_string()),
            iat: Some(now.timestamp() as u64),
        };

        let header_b64 = encode_segment(&header)?;
        let claims_b64 = encode_segment(&claims)?;
        let signing_input = format!("{}.{}", header_b64, claims_b64);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes())?);

        Ok(format!("{}.{}", signing_input, signature))
    }

    pub fn verify(&self, token: &str) -> Result<User, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };

        let header: JwtHeader = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
            debug!("Failed to decode signature: {}", e);
            TokenError::Malformed
        })?;

        let mut mac = self.mac()?;
        mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());
        if mac.verify_slice(&signature).is_err() {
            debug!("Token signature verification failed");
            return Err(TokenError::BadSignature);
        }

        let claims: JwtClaims = decode_segment(claims_b64)?;

        let exp = claims
            .exp
            .ok_or_else(|| TokenError::InvalidClaims("missing exp".to_string()))?;
        let now = Utc::now().timestamp().max(0) as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err(TokenError::Expired);
        }

        let id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| TokenError::InvalidClaims("subject is not a UUID".to_string()))?;
        let role: Role = claims
            .role
            .as_deref()
            .ok_or_else(|| TokenError::InvalidClaims("missing role".to_string()))?
            .parse()
            .map_err(TokenError::InvalidClaims)?;

        let user = User {
            id,
            email: claims.email,
            role,
            issued_at: claims
                .iat
                .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single()),
        };

        debug!("Token validated successfully for user: {}", user.id);
        Ok(user)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| TokenError::MissingSecret)
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = self.mac()?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn encode_segment<T: serde::Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::InvalidClaims(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        debug!("Failed to parse token segment: {}", e);
        TokenError::InvalidClaims(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret-key-for-jwt-validation", Duration::hours(1))
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let tokens = service();
        let subject = Uuid::new_v4();

        let token = tokens.issue(subject, Role::Nurse, Some("nurse@hopital.test")).unwrap();
        let user = tokens.verify(&token).unwrap();

        assert_eq!(user.id, subject);
        assert_eq!(user.role, Role::Nurse);
        assert_eq!(user.email.as_deref(), Some("nurse@hopital.test"));
        assert!(user.issued_at.is_some());
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let other = TokenService::new("another-secret", Duration::hours(1));
        let token = other.issue(Uuid::new_v4(), Role::Admin, None).unwrap();

        assert_eq!(service().verify(&token).unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = service();
        let token = tokens
            .issue_with_ttl(Uuid::new_v4(), Role::Doctor, None, Duration::hours(-1))
            .unwrap();

        assert_eq!(tokens.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let tokens = service();
        assert_eq!(tokens.verify("not-a-token").unwrap_err(), TokenError::Malformed);
        assert_eq!(tokens.verify("a.b").unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn missing_secret_refuses_to_issue_or_verify() {
        let tokens = TokenService::new("", Duration::hours(1));
        assert_eq!(
            tokens.issue(Uuid::new_v4(), Role::Admin, None).unwrap_err(),
            TokenError::MissingSecret
        );
        assert_eq!(tokens.verify("a.b.c").unwrap_err(), TokenError::MissingSecret);
    }

    #[test]
    fn tampered_claims_fail_signature_check() {
        let tokens = service();
        let token = tokens.issue(Uuid::new_v4(), Role::Secretary, None).unwrap();
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();

        let forged = JwtClaims {
            sub: Uuid::new_v4().to_string(),
            exp: Some(u64::MAX / 2),
            email: None,
            role: Some("admin".to_string()),
            iat: None,
        };
        parts[1] = encode_segment(&forged).unwrap();

        assert_eq!(tokens.verify(&parts.join(".")).unwrap_err(), TokenError::BadSignature);
    }
}
