// Admin credential store and bearer-token auth.
//
// Passwords are stored as scrypt hashes and verified with a constant-time
// compare; tokens are HS256 JWTs carrying an explicit expiry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use devrelay_core::db::adapter::{Adapter, FindManyQuery, WhereClause};
use devrelay_core::db::models::{collections, AdminRecord};
use devrelay_core::error::{RelayError, Result};
use devrelay_core::utils::id::generate_record_id;
use devrelay_core::utils::time::now_rfc3339;

use crate::crypto::jwt::{sign_jwt, verify_jwt};
use crate::crypto::password::{hash_password, verify_password};

/// Capability claim embedded in admin tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Successful sign-in: the token plus the claims it carries.
#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub token: String,
    pub claims: AdminClaims,
}

/// Admin auth service.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    adapter: Arc<dyn Adapter>,
    secret: String,
    token_ttl_secs: u64,
}

impl AdminAuth {
    pub fn new(adapter: Arc<dyn Adapter>, secret: impl Into<String>, token_ttl_secs: u64) -> Self {
        Self {
            adapter,
            secret: secret.into(),
            token_ttl_secs,
        }
    }

    /// Verify an email/password pair and issue a bearer token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(RelayError::validation("email and password are required"));
        }

        let found = self
            .adapter
            .find_one(collections::ADMIN, &[WhereClause::eq("email", email)])
            .await?;
        let Some(raw) = found else {
            return Err(RelayError::not_found("admin not found"));
        };
        let admin: AdminRecord = serde_json::from_value(raw)
            .map_err(|e| RelayError::internal(format!("malformed admin record: {e}")))?;

        if !verify_password(&admin.password_hash, password)? {
            tracing::info!(email, "admin sign-in rejected");
            return Err(RelayError::unauthorized("invalid credentials"));
        }

        let claims = AdminClaims {
            id: admin.id.unwrap_or_default(),
            email: admin.email,
            role: "Admin".to_string(),
        };
        let token = sign_jwt(&claims, &self.secret, self.token_ttl_secs)?;
        tracing::info!(email = %claims.email, "admin signed in");

        Ok(SignIn { token, claims })
    }

    /// Verify a bearer token and return its claims.
    pub fn check_auth(&self, token: &str) -> Result<AdminClaims> {
        verify_jwt::<AdminClaims>(token, &self.secret)
            .filter(|claims| claims.role == "Admin")
            .ok_or_else(|| RelayError::unauthorized("invalid or expired token"))
    }

    /// Store a new admin credential. Existing emails are left untouched;
    /// returns whether a record was created.
    pub async fn create_admin(&self, email: &str, password: &str) -> Result<bool> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(RelayError::validation("email and password are required"));
        }

        let exists = self
            .adapter
            .find_one(collections::ADMIN, &[WhereClause::eq("email", email)])
            .await?
            .is_some();
        if exists {
            return Ok(false);
        }

        let password_hash = hash_password(password)?;
        self.adapter
            .create(
                collections::ADMIN,
                serde_json::json!({
                    "id": generate_record_id(),
                    "email": email,
                    "passwordHash": password_hash,
                    "createdAt": now_rfc3339(),
                }),
            )
            .await?;
        tracing::info!(email, "admin credential created");
        Ok(true)
    }

    /// All device records, newest first.
    pub async fn list_devices(&self) -> Result<Vec<serde_json::Value>> {
        self.adapter
            .find_many(collections::DEVICE, FindManyQuery::newest_first())
            .await
    }

    /// All message records, newest first.
    pub async fn list_messages(&self) -> Result<Vec<serde_json::Value>> {
        self.adapter
            .find_many(collections::MESSAGE, FindManyQuery::newest_first())
            .await
    }
}
