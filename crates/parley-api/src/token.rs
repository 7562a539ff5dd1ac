use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use parley_types::api::Claims;

use crate::error::ApiError;

/// Verify an optional `authToken` from a chat request. Absence is fine
/// (guests), but a token that fails verification is a hard 401.
pub fn verify_auth_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::InvalidToken)
}

/// Issue a signed token for a recruiter. Used by sign-in integrations and
/// by tests; the chat endpoint itself only verifies.
pub fn create_auth_token(secret: &str, recruiter_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: recruiter_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_token() {
        let id = Uuid::new_v4();
        let token = create_auth_token("secret", id, "jane@acme.test").unwrap();
        let claims = verify_auth_token("secret", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.email, "jane@acme.test");
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = create_auth_token("secret-a", Uuid::new_v4(), "x@y.test").unwrap();
        assert!(matches!(
            verify_auth_token("secret-b", &token),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            verify_auth_token("secret", "not-a-jwt"),
            Err(ApiError::InvalidToken)
        ));
    }
}
