// SPDX-License-Identifier: Apache-2.0

//! Fake remote capabilities for exercising the login, token, and
//! webmention flows without any network.

// Each test binary uses a different subset of the fakes.
#![allow(dead_code)]

use async_trait::async_trait;
use indieweb_endpoint::error::{Error, Result};
use indieweb_endpoint::mention::ContentIndex;
use indieweb_endpoint::remote::{
    AuthCodeVerifier, CodeValidation, EndpointDiscovery, FetchedPage, SourceFetcher,
};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Discovery fake: fixed endpoints advertised (or not) by every page.
pub struct FakeDiscovery {
    pub auth: Option<Url>,
    pub webmention: Option<Url>,
}

impl FakeDiscovery {
    pub fn advertising_auth() -> Self {
        Self {
            auth: Some(Url::parse("https://auth.example.com/authorize").unwrap()),
            webmention: None,
        }
    }

    pub fn advertising_both() -> Self {
        Self {
            auth: Some(Url::parse("https://auth.example.com/authorize").unwrap()),
            webmention: Some(Url::parse("https://voucher.example/webmention").unwrap()),
        }
    }

    pub fn advertising_nothing() -> Self {
        Self {
            auth: None,
            webmention: None,
        }
    }
}

#[async_trait]
impl EndpointDiscovery for FakeDiscovery {
    async fn auth_endpoint(&self, _profile: &Url) -> Result<Option<Url>> {
        Ok(self.auth.clone())
    }

    async fn webmention_endpoint(&self, _profile: &Url) -> Result<Option<Url>> {
        Ok(self.webmention.clone())
    }
}

/// Code verifier fake: accepts every code, or rejects every code.
pub struct FakeVerifier {
    pub accept: bool,
    pub scope: String,
}

impl FakeVerifier {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            scope: "post".to_string(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            scope: String::new(),
        }
    }
}

#[async_trait]
impl AuthCodeVerifier for FakeVerifier {
    async fn validate_code(
        &self,
        _code: &str,
        _client_id: &str,
        _redirect_uri: &str,
        _state: Option<&str>,
    ) -> Result<CodeValidation> {
        if self.accept {
            Ok(CodeValidation {
                scope: self.scope.clone(),
            })
        } else {
            Err(Error::CodeRejected)
        }
    }
}

/// Fetcher fake serving canned pages keyed by URL.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, FakePage>,
}

struct FakePage {
    body: String,
    refs: HashSet<String>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`, advertising `refs` as its outbound links.
    pub fn with_page(mut self, url: &str, body: &str, refs: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            FakePage {
                body: body.to_string(),
                refs: refs.iter().map(|r| r.to_string()).collect(),
            },
        );
        self
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn find_references(&self, source: &Url) -> Result<HashSet<String>> {
        self.pages
            .get(source.as_str())
            .map(|page| page.refs.clone())
            .ok_or_else(|| Error::Fetch(format!("no fake page for {}", source)))
    }

    async fn fetch(&self, source: &Url) -> Result<FetchedPage> {
        self.pages
            .get(source.as_str())
            .map(|page| FetchedPage {
                body: page.body.clone(),
                content_type: Some("text/html; charset=utf-8".to_string()),
            })
            .ok_or_else(|| Error::Fetch(format!("no fake page for {}", source)))
    }
}

/// Content index fake: a fixed set of known target URLs.
pub struct FakeIndex {
    existing: HashSet<String>,
}

impl FakeIndex {
    pub fn with_targets(targets: &[&str]) -> Self {
        Self {
            existing: targets.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ContentIndex for FakeIndex {
    async fn exists(&self, target: &Url) -> bool {
        self.existing.contains(target.as_str())
    }
}

/// Fresh path for a vouch list file, unique per test.
pub fn temp_vouch_file() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("vouch-test-{}.txt", uuid::Uuid::new_v4()))
}
