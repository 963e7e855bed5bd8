// SPDX-License-Identifier: Apache-2.0

//! Webmention verification.
//!
//! A mention is a claim by a remote page (`source`) that it links to a
//! piece of local content (`target`). The claim is adversarial input:
//! nothing from the source page is trusted until the backlink has been
//! independently confirmed by scanning the source's outbound
//! references. Per request the machine runs
//! `received → source_fetched → link_confirmed → (vouch_checked) →
//! accepted | rejected`.

use crate::config::WebmentionConfig;
use crate::error::{Error, Result};
use crate::remote::{Mf2Document, MicroformatsParser, SourceFetcher};
use crate::vouch::VouchEvaluator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

/// A verified, accepted webmention, ready for content storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebmentionRecord {
    pub source: String,
    pub target: String,
    pub vouch_domain: Option<String>,
    pub vouched: bool,
    /// Human-readable receipt time, e.g. "07 Mar 2026 18:40".
    pub received: String,
    pub post_date: DateTime<Utc>,
    /// Author name from the source's h-card, empty if none.
    pub author_name: String,
    /// Author URL from the source's h-card, empty if none.
    pub author_url: String,
    /// Raw fetched source content, untrusted text.
    pub content: String,
    pub mf2: Mf2Document,
}

/// Answers whether a target URL resolves to real local content.
#[async_trait]
pub trait ContentIndex: Send + Sync {
    async fn exists(&self, target: &Url) -> bool;
}

/// Receives accepted webmention records for persistence/display.
#[async_trait]
pub trait MentionSink: Send + Sync {
    async fn accept(&self, record: WebmentionRecord);
}

/// Live content index: anything under an article path exists.
/// A full site would consult its content store here.
pub struct ArticleIndex;

#[async_trait]
impl ContentIndex for ArticleIndex {
    async fn exists(&self, target: &Url) -> bool {
        target.path().contains("/article")
    }
}

/// In-memory sink keeping accepted mentions for display.
#[derive(Default)]
pub struct MemorySink {
    accepted: RwLock<Vec<WebmentionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<WebmentionRecord> {
        self.accepted.read().await.clone()
    }
}

#[async_trait]
impl MentionSink for MemorySink {
    async fn accept(&self, record: WebmentionRecord) {
        info!(source = %record.source, target = %record.target, vouched = record.vouched, "Webmention accepted");
        self.accepted.write().await.push(record);
    }
}

/// Verifies webmention claims end to end.
pub struct MentionVerifier {
    fetcher: Arc<dyn SourceFetcher>,
    parser: Arc<dyn MicroformatsParser>,
    content: Arc<dyn ContentIndex>,
    sink: Arc<dyn MentionSink>,
    evaluator: VouchEvaluator,
    require_vouch: bool,
}

impl MentionVerifier {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        parser: Arc<dyn MicroformatsParser>,
        content: Arc<dyn ContentIndex>,
        sink: Arc<dyn MentionSink>,
        evaluator: VouchEvaluator,
        config: &WebmentionConfig,
    ) -> Self {
        Self {
            fetcher,
            parser,
            content,
            sink,
            evaluator,
            require_vouch: config.require_vouch,
        }
    }

    /// Verify a claimed (source, target) pair, optionally carrying a
    /// vouch domain. On success the assembled record has already been
    /// handed to the sink.
    pub async fn verify(
        &self,
        source_raw: &str,
        target_raw: &str,
        vouch_domain: Option<&str>,
    ) -> Result<WebmentionRecord> {
        let target =
            Url::parse(target_raw).map_err(|_| Error::TargetNotFound(target_raw.to_string()))?;
        if !self.content.exists(&target).await {
            return Err(Error::TargetNotFound(target_raw.to_string()));
        }

        // Vouch policy gates the request regardless of backlink validity
        if self.require_vouch && vouch_domain.is_none() {
            return Err(Error::VouchRequired);
        }

        let source = Url::parse(source_raw).map_err(|_| Error::NoBacklink)?;
        if source_raw == target_raw {
            return Err(Error::NoBacklink);
        }

        let refs = self.fetcher.find_references(&source).await?;
        if !refs.contains(target_raw) {
            debug!(source = %source, target = %target, "No backlink found");
            return Err(Error::NoBacklink);
        }

        let page = self.fetcher.fetch(&source).await?;

        let vouched = if self.require_vouch {
            // vouch_domain presence was checked above
            let domain = vouch_domain.unwrap_or_default();
            let trusted = self.evaluator.evaluate(domain).await?;
            if !trusted {
                return Err(Error::VouchUntrusted(domain.to_string()));
            }
            true
        } else {
            false
        };

        // Parse failures downgrade to "no structured data"
        let mf2 = match self.parser.parse(&page.body) {
            Ok(doc) => doc,
            Err(err) => {
                debug!(source = %source, error = %err, "Microformats parse failed");
                Mf2Document::default()
            }
        };
        let (author_name, author_url) = extract_author(&mf2);

        let now = Utc::now();
        let record = WebmentionRecord {
            source: source_raw.to_string(),
            target: target_raw.to_string(),
            vouch_domain: vouch_domain.map(|v| v.to_string()),
            vouched,
            received: now.format("%d %b %Y %H:%M").to_string(),
            post_date: now,
            author_name,
            author_url,
            content: page.body,
            mf2,
        };

        self.sink.accept(record.clone()).await;
        Ok(record)
    }
}

/// Author card from the first `h-card` item: name required for a hit,
/// URL optional. Absence is not an error, fields default to empty.
fn extract_author(doc: &Mf2Document) -> (String, String) {
    for item in &doc.items {
        if !item.types.iter().any(|t| t == "h-card") {
            continue;
        }
        let Some(name) = item.properties.get("name").and_then(|v| v.first()) else {
            continue;
        };
        let url = item
            .properties
            .get("url")
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default();
        return (name.clone(), url);
    }
    (String::new(), String::new())
}
