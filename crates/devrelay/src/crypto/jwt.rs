// Bearer tokens — HS256 sign/verify via the `jsonwebtoken` crate.
//
// Every token carries `iat` and `exp`; there is no way to mint a
// non-expiring token through this module.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use devrelay_core::error::{RelayError, Result};

/// Sign a payload as an HS256 JWT expiring `expires_in_secs` from now.
pub fn sign_jwt<T: Serialize>(payload: &T, secret: &str, expires_in_secs: u64) -> Result<String> {
    let now = chrono::Utc::now().timestamp() as u64;

    let claims = JwtClaims {
        payload: serde_json::to_value(payload)
            .map_err(|e| RelayError::internal(format!("failed to serialize JWT payload: {e}")))?,
        iat: now,
        exp: now + expires_in_secs,
    };

    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| RelayError::internal(format!("JWT signing failed: {e}")))
}

/// Verify and decode an HS256 JWT. Returns `None` if invalid or expired.
pub fn verify_jwt<T: DeserializeOwned>(token: &str, secret: &str) -> Option<T> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.required_spec_claims.clear();

    let token_data = jsonwebtoken::decode::<JwtClaims>(token, &key, &validation).ok()?;
    serde_json::from_value(token_data.claims.payload).ok()
}

/// Internal JWT claims wrapper.
#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    #[serde(flatten)]
    payload: serde_json::Value,
    iat: u64,
    exp: u64,
}
