use std::env;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub cors_extra_origins: Vec<String>,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,

    /// Shared secret the upstream OAuth gateway presents on identity exchange.
    pub auth_exchange_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{} must be set", key));

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: get("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "20".into())
                .parse()
                .context("DB_MAX_CONNECTIONS must be a number")?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: get("PORT")
                .unwrap_or_else(|| "3000".into())
                .parse()
                .context("PORT must be a number")?,
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            cors_extra_origins: get("CORS_EXTRA_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            jwt_secret: required("JWT_SECRET")?,
            jwt_access_ttl_secs: get("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|| "900".into())
                .parse()
                .context("JWT_ACCESS_TTL_SECS must be a number")?,
            jwt_refresh_ttl_secs: get("JWT_REFRESH_TTL_SECS")
                .unwrap_or_else(|| "604800".into())
                .parse()
                .context("JWT_REFRESH_TTL_SECS must be a number")?,

            auth_exchange_secret: required("AUTH_EXCHANGE_SECRET")?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
