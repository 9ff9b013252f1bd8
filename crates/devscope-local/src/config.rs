//! Environment-driven configuration.
//!
//! Every key accepts a `DEVSCOPE_`-prefixed name first and the provider's conventional name
//! second. Values that are empty after trimming count as missing.

use crate::cache;
use devscope_core::{Error, Result};
use std::time::Duration;

pub const DEFAULT_PERPLEXITY_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_SEARCH_MODEL: &str = "sonar-pro";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Conventional names, used in user-facing messages.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const PERPLEXITY_API_KEY: &str = "PERPLEXITY_API_KEY";

#[derive(Clone)]
pub struct Config {
    pub perplexity_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub perplexity_endpoint: String,
    pub openai_base_url: String,
    pub search_model: String,
    pub openai_model: String,
    pub page_cache_capacity: usize,
    pub page_cache_ttl: Option<Duration>,
}

// Hand-written so credentials never end up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("perplexity_api_key", &self.perplexity_api_key.is_some())
            .field("openai_api_key", &self.openai_api_key.is_some())
            .field("perplexity_endpoint", &self.perplexity_endpoint)
            .field("openai_base_url", &self.openai_base_url)
            .field("search_model", &self.search_model)
            .field("openai_model", &self.openai_model)
            .field("page_cache_capacity", &self.page_cache_capacity)
            .field("page_cache_ttl", &self.page_cache_ttl)
            .finish()
    }
}

/// Result of a credentials check. Performs no network IO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCheck {
    pub missing: Vec<&'static str>,
}

impl ConfigCheck {
    pub fn ok(&self) -> bool {
        self.missing.is_empty()
    }

    /// Empty when nothing is missing.
    pub fn message(&self) -> String {
        if self.missing.is_empty() {
            return String::new();
        }
        format!("Missing environment variables: {}", self.missing.join(", "))
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        Self {
            perplexity_api_key: get(&["DEVSCOPE_PERPLEXITY_API_KEY", PERPLEXITY_API_KEY]),
            openai_api_key: get(&["DEVSCOPE_OPENAI_API_KEY", OPENAI_API_KEY]),
            perplexity_endpoint: get(&["DEVSCOPE_PERPLEXITY_ENDPOINT"])
                .unwrap_or_else(|| DEFAULT_PERPLEXITY_ENDPOINT.to_string()),
            openai_base_url: get(&["DEVSCOPE_OPENAI_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            search_model: get(&["DEVSCOPE_SEARCH_MODEL"])
                .unwrap_or_else(|| DEFAULT_SEARCH_MODEL.to_string()),
            openai_model: get(&["DEVSCOPE_OPENAI_MODEL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            page_cache_capacity: get(&["DEVSCOPE_PAGE_CACHE_CAPACITY"])
                .and_then(|v| v.parse().ok())
                .unwrap_or(cache::DEFAULT_CAPACITY),
            page_cache_ttl: get(&["DEVSCOPE_PAGE_CACHE_TTL_S"])
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
        }
    }

    pub fn check(&self) -> ConfigCheck {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push(OPENAI_API_KEY);
        }
        if self.perplexity_api_key.is_none() {
            missing.push(PERPLEXITY_API_KEY);
        }
        ConfigCheck { missing }
    }

    /// `Err(Error::NotConfigured)` naming every missing credential.
    pub fn require_credentials(&self) -> Result<()> {
        let check = self.check();
        if check.ok() {
            Ok(())
        } else {
            Err(Error::NotConfigured(check.message()))
        }
    }
}

/// Check credentials in the process environment.
pub fn validate_config() -> ConfigCheck {
    Config::from_env().check()
}
