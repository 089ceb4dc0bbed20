//! Session token validation and claims extraction.
//!
//! Session tokens are HS256-signed JWTs issued by the identity service at
//! login. The gateway shares the signing secret and verifies them locally,
//! without a network round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use portico_core::{TeamId, UserId};

use crate::error::{AuthError, Result};

/// Validated claims extracted from a session token.
#[derive(Debug, Clone)]
pub struct SessionClaims {
    /// The user id from the `_id` claim.
    pub user_id: UserId,
    /// The team id from the `teamId` claim.
    pub team_id: TeamId,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Trait for validating session tokens.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a session token and extract claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or cannot be validated.
    async fn validate(&self, token: &str) -> Result<SessionClaims>;
}

/// Raw claims as signed by the identity service.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "teamId")]
    team_id: Option<String>,
    exp: Option<u64>,
}

/// Shared-secret (HS256) session token validator.
pub struct HmacSessionValidator {
    key: DecodingKey,
    validation: Validation,
}

impl HmacSessionValidator {
    /// Create a validator for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    fn verify(&self, token: &str) -> Result<SessionClaims> {
        let token_data =
            decode::<RawClaims>(token, &self.key, &self.validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AuthError::InvalidSignature
                    }
                    jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) => {
                        AuthError::MissingClaim(claim.clone())
                    }
                    _ => AuthError::InvalidToken(e.to_string()),
                }
            })?;

        let claims = token_data.claims;

        let user_id = claims
            .id
            .ok_or_else(|| AuthError::MissingClaim("_id".to_string()))
            .and_then(|id| UserId::new(id).map_err(|_| AuthError::InvalidUserId))?;

        let team_id = claims
            .team_id
            .ok_or_else(|| AuthError::MissingClaim("teamId".to_string()))
            .and_then(|id| TeamId::new(id).map_err(|_| AuthError::InvalidTeamId))?;

        let exp = claims
            .exp
            .ok_or_else(|| AuthError::MissingClaim("exp".to_string()))?;
        let exp_secs = i64::try_from(exp).unwrap_or(i64::MAX);
        let expires_at = DateTime::from_timestamp(exp_secs, 0)
            .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".to_string()))?;

        Ok(SessionClaims {
            user_id,
            team_id,
            expires_at,
        })
    }
}

#[async_trait]
impl SessionValidator for HmacSessionValidator {
    async fn validate(&self, token: &str) -> Result<SessionClaims> {
        self.verify(token)
    }
}

/// A mock session validator for testing.
///
/// Accepts tokens in the format `test-session:<user_id>:<team_id>`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockSessionValidator;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl SessionValidator for MockSessionValidator {
    async fn validate(&self, token: &str) -> Result<SessionClaims> {
        let rest = token.strip_prefix("test-session:").ok_or_else(|| {
            AuthError::InvalidToken("expected test-session:<user>:<team>".to_string())
        })?;

        let (user, team) = rest.split_once(':').ok_or_else(|| {
            AuthError::InvalidToken("expected test-session:<user>:<team>".to_string())
        })?;

        Ok(SessionClaims {
            user_id: UserId::new(user).map_err(|_| AuthError::InvalidUserId)?,
            team_id: TeamId::new(team).map_err(|_| AuthError::InvalidTeamId)?,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"unit-test-secret";

    fn sign(claims: &serde_json::Value, secret: &[u8]) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn exp_in(seconds: i64) -> i64 {
        (Utc::now() + chrono::Duration::seconds(seconds)).timestamp()
    }

    #[tokio::test]
    async fn valid_token_yields_claims() {
        let validator = HmacSessionValidator::new(SECRET);
        let token = sign(
            &json!({ "_id": "user-1", "teamId": "team-1", "exp": exp_in(3600) }),
            SECRET,
        );

        let claims = validator.validate(&token).await.unwrap();
        assert_eq!(claims.user_id.as_str(), "user-1");
        assert_eq!(claims.team_id.as_str(), "team-1");
        assert!(claims.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let validator = HmacSessionValidator::new(SECRET);
        let token = sign(
            &json!({ "_id": "user-1", "teamId": "team-1", "exp": exp_in(-10) }),
            SECRET,
        );

        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let validator = HmacSessionValidator::new(SECRET);
        let token = sign(
            &json!({ "_id": "user-1", "teamId": "team-1", "exp": exp_in(3600) }),
            b"someone-elses-secret",
        );

        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[tokio::test]
    async fn missing_exp_rejected() {
        let validator = HmacSessionValidator::new(SECRET);
        let token = sign(&json!({ "_id": "user-1", "teamId": "team-1" }), SECRET);

        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingClaim(ref c) if c == "exp"));
    }

    #[tokio::test]
    async fn missing_team_rejected() {
        let validator = HmacSessionValidator::new(SECRET);
        let token = sign(&json!({ "_id": "user-1", "exp": exp_in(3600) }), SECRET);

        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingClaim(ref c) if c == "teamId"));
    }

    #[tokio::test]
    async fn garbage_rejected() {
        let validator = HmacSessionValidator::new(SECRET);
        let err = validator.validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert_eq!(err.http_status_code(), 401);
    }

    #[tokio::test]
    async fn mock_validator_works() {
        let claims = MockSessionValidator
            .validate("test-session:user-9:team-9")
            .await
            .unwrap();
        assert_eq!(claims.user_id.as_str(), "user-9");
        assert_eq!(claims.team_id.as_str(), "team-9");
    }

    #[tokio::test]
    async fn mock_validator_rejects_invalid() {
        assert!(MockSessionValidator.validate("nope").await.is_err());
    }
}
