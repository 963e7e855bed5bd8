// SPDX-License-Identifier: Apache-2.0

//! Vouch domain trust evaluation.
//!
//! A vouch domain is trusted if it is already on the persisted list,
//! or if it advertises both a Webmention endpoint and an IndieAuth
//! authorization endpoint, in which case it is promoted onto the list
//! permanently. This is a heuristic trust test, not a cryptographic
//! one: it only establishes that the voucher participates in the same
//! protocols, which is enough to price out throwaway spam domains.

use crate::auth::normalize_identity;
use crate::error::Result;
use crate::remote::EndpointDiscovery;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Append-only, file-backed list of trusted vouch domains.
///
/// One lowercase domain per line. Domains are never removed by this
/// service; pruning is a manual operator action. Appends are
/// serialized behind a mutex and idempotent as set members, so
/// interleaved writers cannot corrupt the list.
pub struct VouchList {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl VouchList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_domains(&self) -> Result<Vec<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(content
            .lines()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| !line.is_empty())
            .collect())
    }

    /// Case-insensitive exact membership check.
    pub async fn contains(&self, domain: &str) -> Result<bool> {
        let needle = domain.trim().to_lowercase();
        Ok(self.read_domains().await?.contains(&needle))
    }

    /// Append a domain unless already present.
    pub async fn append(&self, domain: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let needle = domain.trim().to_lowercase();
        if self.read_domains().await?.contains(&needle) {
            return Ok(());
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", needle).as_bytes()).await?;
        file.flush().await?;
        info!(domain = %needle, "Vouch domain promoted to trusted list");
        Ok(())
    }
}

/// Decides whether a claimed vouch domain is trustworthy.
pub struct VouchEvaluator {
    list: VouchList,
    discovery: Arc<dyn EndpointDiscovery>,
}

impl VouchEvaluator {
    pub fn new(list: VouchList, discovery: Arc<dyn EndpointDiscovery>) -> Self {
        Self { list, discovery }
    }

    /// Evaluate `domain_raw`. Listed domains are trusted without any
    /// network call. Unlisted domains must advertise both a Webmention
    /// and an authorization endpoint to be trusted, and are then
    /// promoted onto the list. Any discovery failure counts as
    /// "endpoint absent".
    pub async fn evaluate(&self, domain_raw: &str) -> Result<bool> {
        let Ok(profile) = normalize_identity(domain_raw) else {
            return Ok(false);
        };
        let Some(host) = profile.host_str().map(|h| h.to_lowercase()) else {
            return Ok(false);
        };

        if self.list.contains(&host).await? {
            debug!(domain = %host, "Vouch domain already trusted");
            return Ok(true);
        }

        if !self.advertises(&profile).await {
            debug!(domain = %host, "Vouch domain untrusted");
            return Ok(false);
        }

        self.list.append(&host).await?;
        Ok(true)
    }

    async fn advertises(&self, profile: &Url) -> bool {
        let webmention = matches!(
            self.discovery.webmention_endpoint(profile).await,
            Ok(Some(_))
        );
        if !webmention {
            return false;
        }
        matches!(self.discovery.auth_endpoint(profile).await, Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_list() -> VouchList {
        let path = std::env::temp_dir().join(format!("vouch-{}.txt", uuid::Uuid::new_v4()));
        VouchList::new(path)
    }

    struct CountingDiscovery {
        webmention: bool,
        auth: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EndpointDiscovery for CountingDiscovery {
        async fn auth_endpoint(&self, _profile: &Url) -> Result<Option<Url>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .auth
                .then(|| Url::parse("https://voucher.example/auth").unwrap()))
        }

        async fn webmention_endpoint(&self, _profile: &Url) -> Result<Option<Url>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .webmention
                .then(|| Url::parse("https://voucher.example/wm").unwrap()))
        }
    }

    #[tokio::test]
    async fn test_listed_domain_trusted_without_network() {
        let list = temp_list();
        list.append("voucher.example").await.unwrap();
        let discovery = Arc::new(CountingDiscovery {
            webmention: false,
            auth: false,
            calls: AtomicUsize::new(0),
        });
        let evaluator = VouchEvaluator::new(list, discovery.clone());

        assert!(evaluator.evaluate("Voucher.Example").await.unwrap());
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_endpoints_promote_domain() {
        let list = temp_list();
        let discovery = Arc::new(CountingDiscovery {
            webmention: true,
            auth: true,
            calls: AtomicUsize::new(0),
        });
        let evaluator = VouchEvaluator::new(list, discovery);

        assert!(evaluator.evaluate("voucher.example").await.unwrap());
        // Promoted: second evaluation hits the list fast path
        assert!(evaluator.list.contains("voucher.example").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_endpoints_means_untrusted_and_unlisted() {
        let list = temp_list();
        let discovery = Arc::new(CountingDiscovery {
            webmention: false,
            auth: false,
            calls: AtomicUsize::new(0),
        });
        let evaluator = VouchEvaluator::new(list, discovery);

        assert!(!evaluator.evaluate("voucher.example").await.unwrap());
        assert!(!evaluator.list.contains("voucher.example").await.unwrap());
    }

    #[tokio::test]
    async fn test_webmention_without_auth_is_untrusted() {
        let list = temp_list();
        let discovery = Arc::new(CountingDiscovery {
            webmention: true,
            auth: false,
            calls: AtomicUsize::new(0),
        });
        let evaluator = VouchEvaluator::new(list, discovery);

        assert!(!evaluator.evaluate("voucher.example").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let list = temp_list();
        list.append("a.example").await.unwrap();
        list.append("A.EXAMPLE").await.unwrap();
        let domains = list.read_domains().await.unwrap();
        assert_eq!(domains, vec!["a.example"]);
    }
}
