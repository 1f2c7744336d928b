//! Handshake authentication. Tokens are issued elsewhere; this side only
//! verifies them and turns the claims into an [`Identity`].

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use kinship_core::messages::Identity;
use kinship_core::{ChatError, UserId};

/// Claims carried by an access token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: i64,
    pub name: String,
    #[serde(
        default,
        rename = "avatarRef",
        alias = "profile_image",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_ref: Option<String>,
    pub exp: u64,
}

impl From<Claims> for Identity {
    fn from(c: Claims) -> Self {
        Identity {
            user_id: UserId::new(c.user_id),
            name: c.name,
            avatar_ref: c.avatar_ref,
        }
    }
}

/// Turns a bearer token into a verified identity. Fails closed.
pub trait IdentityVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> Result<Identity, ChatError>;
}

/// HS256 verifier over a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &SecretString, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, ChatError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| ChatError::auth(format!("invalid token: {e}")))?;
        if data.claims.name.trim().is_empty() {
            return Err(ChatError::auth("token has no display name"));
        }
        Ok(data.claims.into())
    }
}

/// Pull the token from `Authorization: Bearer ...`, falling back to the
/// `token` query parameter (browsers cannot set headers on a WebSocket
/// upgrade).
pub fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    from_header
        .or_else(|| query_token.map(str::trim).filter(|t| !t.is_empty()))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn secret() -> SecretString {
        SecretString::from("test-secret")
    }

    fn token_with(claims: &serde_json::Value, key: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(key.as_bytes())).unwrap()
    }

    fn future_exp() -> u64 {
        (chrono::Utc::now().timestamp() + 3600) as u64
    }

    #[test]
    fn verifies_valid_token() {
        let verifier = JwtVerifier::new(&secret(), 0);
        let token = token_with(
            &serde_json::json!({"userId": 7, "name": "Ada", "profile_image": "ada.png", "exp": future_exp()}),
            "test-secret",
        );
        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity.user_id, UserId::new(7));
        assert_eq!(identity.name, "Ada");
        assert_eq!(identity.avatar_ref.as_deref(), Some("ada.png"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = JwtVerifier::new(&secret(), 0);
        let token = token_with(
            &serde_json::json!({"userId": 7, "name": "Ada", "exp": future_exp()}),
            "other-secret",
        );
        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, ChatError::Auth(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = JwtVerifier::new(&secret(), 0);
        let exp = (chrono::Utc::now().timestamp() - 600) as u64;
        let token = token_with(&serde_json::json!({"userId": 7, "name": "Ada", "exp": exp}), "test-secret");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_garbage_and_missing_claims() {
        let verifier = JwtVerifier::new(&secret(), 0);
        assert!(verifier.verify("not-a-jwt").is_err());
        let token = token_with(&serde_json::json!({"name": "Ada", "exp": future_exp()}), "test-secret");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn header_token_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers, Some("xyz")).as_deref(), Some("abc"));
        assert_eq!(extract_token(&HeaderMap::new(), Some("xyz")).as_deref(), Some("xyz"));
        assert_eq!(extract_token(&HeaderMap::new(), Some("  ")), None);
        assert_eq!(extract_token(&HeaderMap::new(), None), None);
    }
}
