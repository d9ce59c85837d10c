//! JWT verification for bootstrapping tenant context from a token when the
//! core is invoked in-process by a front door. The core only verifies; it
//! never issues tokens (issuance is the front door's concern, out of
//! scope here).

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the authenticated user's id.
    pub sub: Uuid,
    pub exp: i64,
}

pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, algorithm: &str) -> Result<Self> {
        let algorithm = algorithm
            .parse::<Algorithm>()
            .map_err(|e| CoreError::Configuration(format!("unsupported JWT_ALGORITHM: {e}")))?;
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(algorithm),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| CoreError::PermissionDenied(format!("invalid token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(secret: &str, claims: &Claims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn verifies_a_well_formed_token() {
        let verifier = TokenVerifier::new("test-secret-at-least-16b", "HS256").unwrap();
        let claims = Claims { sub: Uuid::new_v4(), exp: (chrono::Utc::now().timestamp() + 3600) };
        let token = sign("test-secret-at-least-16b", &claims);

        let verified = verifier.verify(&token).unwrap();
        assert_eq!(verified.sub, claims.sub);
    }

    #[test]
    fn rejects_token_signed_with_wrong_secret() {
        let verifier = TokenVerifier::new("correct-secret-1234", "HS256").unwrap();
        let claims = Claims { sub: Uuid::new_v4(), exp: (chrono::Utc::now().timestamp() + 3600) };
        let token = sign("wrong-secret-abcdefgh", &claims);

        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = TokenVerifier::new("test-secret-at-least-16b", "HS256").unwrap();
        let claims = Claims { sub: Uuid::new_v4(), exp: (chrono::Utc::now().timestamp() - 10) };
        let token = sign("test-secret-at-least-16b", &claims);

        assert!(verifier.verify(&token).is_err());
    }
}
