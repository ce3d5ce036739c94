use std::env;

use anyhow::{Context, Result};
use dotenvy::dotenv;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8081";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the backend, without the `/api` suffix.
    pub api_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
        }
    }
}

impl ClientConfig {
    /// Reads `TANKMON_API_URL` (a `.env` file is honoured).
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        match env::var("TANKMON_API_URL") {
            Ok(url) => Self::with_url(&url),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn with_url(url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("invalid backend url {url:?}"))?;
        anyhow::ensure!(
            matches!(parsed.scheme(), "http" | "https"),
            "backend url must use http or https, got {url:?}"
        );
        Ok(Self {
            api_url: url.trim_end_matches('/').to_owned(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn url_is_checked_and_normalised() {
        assert_eq!(
            ClientConfig::with_url("https://tanks.example.com/").unwrap().api_url,
            "https://tanks.example.com"
        );
        assert!(ClientConfig::with_url("ftp://tanks.example.com").is_err());
        assert!(ClientConfig::with_url("not a url").is_err());
    }
}
