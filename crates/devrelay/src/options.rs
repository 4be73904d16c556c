// RelayOptions — runtime configuration, loaded from `RELAY_*` env vars.

use serde::{Deserialize, Serialize};

use devrelay_core::error::{RelayError, Result};

const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_PORT: u16 = 8080;

/// Admin credential seeded at startup when configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

/// Top-level configuration for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayOptions {
    /// Secret key for signing bearer tokens.
    pub secret: String,

    /// Lifetime of issued admin tokens, in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Origins allowed by CORS. Empty means same-origin only.
    #[serde(default)]
    pub trusted_origins: Vec<String>,

    /// MongoDB connection string.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// MongoDB database name.
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional admin credential to seed on boot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_seed: Option<AdminSeed>,
}

fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_database_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "devrelay".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl RelayOptions {
    /// Build options with defaults around the one mandatory value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            token_ttl_secs: default_token_ttl(),
            trusted_origins: Vec::new(),
            database_url: default_database_url(),
            database_name: default_database_name(),
            port: default_port(),
            admin_seed: None,
        }
    }

    /// Load options from the environment. `RELAY_SECRET` is mandatory;
    /// everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("RELAY_SECRET")
            .map_err(|_| RelayError::internal("RELAY_SECRET is required"))?;

        let mut options = Self::new(secret);

        if let Ok(ttl) = std::env::var("RELAY_TOKEN_TTL_SECS") {
            options.token_ttl_secs = ttl
                .parse()
                .map_err(|_| RelayError::internal("RELAY_TOKEN_TTL_SECS must be an integer"))?;
        }
        if let Ok(origins) = std::env::var("RELAY_TRUSTED_ORIGINS") {
            options.trusted_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(url) = std::env::var("RELAY_DATABASE_URL") {
            options.database_url = url;
        }
        if let Ok(name) = std::env::var("RELAY_DATABASE_NAME") {
            options.database_name = name;
        }
        if let Ok(port) = std::env::var("RELAY_PORT").or_else(|_| std::env::var("PORT")) {
            options.port = port
                .parse()
                .map_err(|_| RelayError::internal("RELAY_PORT must be a port number"))?;
        }
        if let (Ok(email), Ok(password)) = (
            std::env::var("RELAY_ADMIN_EMAIL"),
            std::env::var("RELAY_ADMIN_PASSWORD"),
        ) {
            options.admin_seed = Some(AdminSeed { email, password });
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = RelayOptions::new("s3cret");
        assert_eq!(options.token_ttl_secs, 24 * 60 * 60);
        assert_eq!(options.port, 8080);
        assert_eq!(options.database_name, "devrelay");
        assert!(options.trusted_origins.is_empty());
        assert!(options.admin_seed.is_none());
    }
}
