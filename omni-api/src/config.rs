//! Account configuration: credentials, endpoint and optional response cache.

use crate::error::{Error, Result};
use chrono::Local;
use omni_utils::{dates::format_date, env::affix};
use std::fmt;
use std::path::PathBuf;

/// Default REST endpoint of the 1.4 reporting API.
pub const DEFAULT_ENDPOINT: &str = "https://api.omniture.com/admin/1.4/rest/";

/// Environment key holding the API username (before affixing).
pub const USERNAME_KEY: &str = "OMNITURE_USERNAME";

/// Environment key holding the shared secret (before affixing).
pub const SECRET_KEY: &str = "OMNITURE_SECRET";

/// API username (`user:Company`) and shared secret.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: &str, secret: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Read credentials from the process environment.
    ///
    /// With a prefix and/or suffix the keys become e.g.
    /// `ACME_OMNITURE_USERNAME_PROD`.
    pub fn from_env(prefix: &str, suffix: &str) -> Result<Credentials> {
        Credentials::from_lookup(|key| std::env::var(key).ok(), prefix, suffix)
    }

    /// Read credentials from any key/value source.
    pub fn from_lookup<F>(lookup: F, prefix: &str, suffix: &str) -> Result<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username_key = affix(prefix, USERNAME_KEY, suffix);
        let secret_key = affix(prefix, SECRET_KEY, suffix);
        let username = lookup(&username_key)
            .ok_or_else(|| Error::Config(format!("{} is not set", username_key)))?;
        let secret = lookup(&secret_key)
            .ok_or_else(|| Error::Config(format!("{} is not set", secret_key)))?;
        Ok(Credentials { username, secret })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"***************")
            .finish()
    }
}

/// Where cached responses live and which generation is current.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Generation key; files written under another key are stale
    pub key: String,
}

impl CacheConfig {
    /// Cache keyed by today's date, so entries expire daily.
    pub fn daily(dir: impl Into<PathBuf>) -> CacheConfig {
        CacheConfig {
            dir: dir.into(),
            key: format_date(&Local::now().date_naive()),
        }
    }

    pub fn with_key(dir: impl Into<PathBuf>, key: &str) -> CacheConfig {
        CacheConfig {
            dir: dir.into(),
            key: key.to_string(),
        }
    }
}

/// Everything needed to talk to the service.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountConfig {
    pub credentials: Credentials,
    pub endpoint: String,
    pub cache: Option<CacheConfig>,
}

impl AccountConfig {
    pub fn new(credentials: Credentials) -> AccountConfig {
        AccountConfig {
            credentials,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> AccountConfig {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> AccountConfig {
        self.cache = Some(cache);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OMNITURE_USERNAME", "plain:Acme"),
            ("OMNITURE_SECRET", "plain-secret"),
            ("ACME_OMNITURE_USERNAME_PROD", "prod:Acme"),
            ("ACME_OMNITURE_SECRET_PROD", "prod-secret"),
        ])
    }

    #[test]
    fn test_from_lookup() {
        let env = source();
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());
        let plain = Credentials::from_lookup(lookup, "", "").unwrap();
        assert_eq!(plain, Credentials::new("plain:Acme", "plain-secret"));
        let prod = Credentials::from_lookup(lookup, "ACME", "PROD").unwrap();
        assert_eq!(prod.username, "prod:Acme");
        assert_eq!(prod.secret, "prod-secret");
    }

    #[test]
    fn test_from_lookup_missing() {
        let env = source();
        let err = Credentials::from_lookup(|key| env.get(key).map(|v| v.to_string()), "OTHER", "")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: OTHER_OMNITURE_USERNAME is not set"
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_account_config_defaults() {
        let config = AccountConfig::new(Credentials::new("user", "secret"));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.cache.is_none());
        let config = config
            .with_endpoint("https://api2.omniture.com/admin/1.4/rest/")
            .with_cache(CacheConfig::with_key("/tmp/omni", "2015-06-01"));
        assert_eq!(config.endpoint, "https://api2.omniture.com/admin/1.4/rest/");
        assert_eq!(config.cache.unwrap().key, "2015-06-01");
    }

    #[test]
    fn test_daily_cache_key_is_iso_date() {
        let cache = CacheConfig::daily("/tmp/omni");
        assert_eq!(cache.key.len(), 10);
        assert!(omni_utils::dates::parse_date(&cache.key).is_ok());
    }
}
