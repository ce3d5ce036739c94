use std::env;

use anyhow::{Context, Result};
use dotenvy::dotenv;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub port: u16,
    /// Origin of the web frontend allowed by CORS.
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let port = match var("PORT") {
            Some(port) => port.parse().with_context(|| format!("invalid PORT {port:?}"))?,
            None => 8081,
        };

        Ok(Self {
            database_url,
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1".to_owned()),
            port,
            cors_origin: var("CORS_ORIGIN").unwrap_or_else(|| "http://127.0.0.1:8080".to_owned()),
        })
    }
}
