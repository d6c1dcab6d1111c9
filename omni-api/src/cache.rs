//! Content-addressed file cache for the catalog listings.
//!
//! Catalog calls are answered from `data_<api>_<method>_<hash>_<key>.json`
//! when present. The key is a generation (today's date by default), so a new
//! key means a fresh fetch and the files of older keys are removed.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::transport::{method_name, Transport};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use log::{debug, warn};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Calls whose answers are cached; everything else passes through.
pub const CACHED_METHODS: [&str; 4] = [
    "Company.GetReportSuites",
    "Report.GetMetrics",
    "Report.GetElements",
    "Segments.Get",
];

/// `data_<api>_<method>_<hash>_` for a request body.
pub fn file_prefix(api: &str, method: &str, body: &Value) -> Result<String> {
    let digest = Sha256::digest(serde_json::to_vec(body)?);
    Ok(format!("data_{}_{}_{}_", api, method, URL_SAFE.encode(digest)))
}

/// Wraps a transport with the file cache.
pub struct CachedTransport<T> {
    inner: T,
    config: CacheConfig,
}

impl<T: Transport> CachedTransport<T> {
    pub fn new(inner: T, config: CacheConfig) -> CachedTransport<T> {
        CachedTransport { inner, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    async fn load(&self, path: &Path) -> Option<Value> {
        match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cannot read cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn store(&self, prefix: &str, path: &Path, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.config.dir).await?;
        let mut entries = fs::read_dir(&self.config.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let stale = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(prefix) && stale != path {
                debug!("Removing stale cache file {}", stale.display());
                if let Err(e) = fs::remove_file(&stale).await {
                    warn!("Cannot remove stale cache file {}: {}", stale.display(), e);
                }
            }
        }
        fs::write(path, serde_json::to_vec(value)?).await?;
        Ok(())
    }

    fn path(&self, prefix: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("{}{}.json", prefix, self.config.key))
    }
}

#[async_trait]
impl<T: Transport> Transport for CachedTransport<T> {
    async fn send(&self, api: &str, method: &str, body: &Value) -> Result<Value> {
        let name = method_name(api, method);
        if !CACHED_METHODS.contains(&name.as_str()) {
            return self.inner.send(api, method, body).await;
        }
        let prefix = file_prefix(api, method, body)?;
        let path = self.path(&prefix);
        if let Some(value) = self.load(&path).await {
            debug!("Cache hit for {}: {}", name, path.display());
            return Ok(value);
        }
        debug!("Cache miss for {}", name);
        let value = self.inner.send(api, method, body).await?;
        if let Err(e) = self.store(&prefix, &path, &value).await {
            warn!("Cannot write cache file {}: {}", path.display(), e);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::testing::{fixture, ScriptedTransport, REPORT_QUEUE};
    use serde_json::json;
    use std::sync::Arc;

    fn cached(dir: &Path, key: &str) -> (CachedTransport<Arc<ScriptedTransport>>, Arc<ScriptedTransport>) {
        let scripted = Arc::new(ScriptedTransport::with_catalogs());
        let cache = CachedTransport::new(scripted.clone(), CacheConfig::with_key(dir, key));
        (cache, scripted)
    }

    fn files(dir: &Path) -> Vec<String> {
        let mut names = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    #[test]
    fn test_file_prefix() {
        let body = json!({"reportSuiteID": "omniture.api-gateway"});
        let prefix = file_prefix("Report", "GetMetrics", &body).unwrap();
        assert!(prefix.starts_with("data_Report_GetMetrics_"));
        assert!(prefix.ends_with('_'));
        // 32 byte digest is 44 base64 characters
        assert_eq!(prefix.len(), "data_Report_GetMetrics_".len() + 44 + 1);
        assert!(!prefix.contains('/'));
        assert_ne!(
            prefix,
            file_prefix("Report", "GetMetrics", &json!({"reportSuiteID": "omniture.dev"})).unwrap()
        );
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, scripted) = cached(dir.path(), "2015-06-01");
        let body = json!({"reportSuiteID": "omniture.api-gateway"});
        let first = cache.send("Report", "GetMetrics", &body).await.unwrap();
        let second = cache.send("Report", "GetMetrics", &body).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(scripted.count("Report.GetMetrics"), 1);
        let names = files(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("data_Report_GetMetrics_"));
        assert!(names[0].ends_with("_2015-06-01.json"));
    }

    #[tokio::test]
    async fn test_other_calls_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, scripted) = cached(dir.path(), "2015-06-01");
        scripted.always("Report.Queue", fixture(REPORT_QUEUE));
        let body = json!({"reportDescription": {}});
        cache.send("Report", "Queue", &body).await.unwrap();
        cache.send("Report", "Queue", &body).await.unwrap();
        assert_eq!(scripted.count("Report.Queue"), 2);
        assert!(files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_new_key_replaces_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({"accessLevel": "shared"});
        let prefix = file_prefix("Segments", "Get", &body).unwrap();
        std::fs::write(dir.path().join(format!("{}2015-05-31.json", prefix)), "[]").unwrap();
        std::fs::write(dir.path().join("unrelated.json"), "{}").unwrap();

        let (cache, scripted) = cached(dir.path(), "2015-06-01");
        let segments = cache.send("Segments", "Get", &body).await.unwrap();
        assert_eq!(segments.as_array().unwrap().len(), 2);
        assert_eq!(scripted.count("Segments.Get"), 1);
        assert_eq!(
            files(dir.path()),
            vec![format!("{}2015-06-01.json", prefix), "unrelated.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({});
        let prefix = file_prefix("Company", "GetReportSuites", &body).unwrap();
        let path = dir.path().join(format!("{}2015-06-01.json", prefix));
        std::fs::write(&path, "{not json").unwrap();

        let (cache, scripted) = cached(dir.path(), "2015-06-01");
        let suites = cache.send("Company", "GetReportSuites", &body).await.unwrap();
        assert!(suites.get("report_suites").is_some());
        assert_eq!(scripted.count("Company.GetReportSuites"), 1);
        let stored: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(stored, suites);
    }

    #[tokio::test]
    async fn test_account_over_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, scripted) = cached(dir.path(), "2015-06-01");
        let cache = Arc::new(cache);
        for _ in 0..2 {
            let account = Account::connect(cache.clone()).await.unwrap();
            let suite = account.suite("API Gateway").unwrap();
            assert_eq!(suite.metrics().await.unwrap().len(), 5);
        }
        assert_eq!(scripted.count("Company.GetReportSuites"), 1);
        assert_eq!(scripted.count("Report.GetMetrics"), 1);
    }
}
