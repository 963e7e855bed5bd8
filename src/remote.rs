// SPDX-License-Identifier: Apache-2.0

//! Remote capabilities: endpoint discovery, authorization code
//! validation, source fetching, and microformats extraction.
//!
//! The core flows depend only on the traits here so they can be
//! exercised with fakes. [`HttpCapabilities`] is the live
//! reqwest-backed implementation wired up in `main`.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

/// Outcome of remote authorization-code validation.
#[derive(Debug, Clone)]
pub struct CodeValidation {
    /// Scope granted by the authorization endpoint.
    pub scope: String,
}

/// A fetched remote page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    pub content_type: Option<String>,
}

/// Minimal microformats2 document: a flat list of items with their
/// types and property values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mf2Document {
    pub items: Vec<Mf2Item>,
}

/// One microformats2 item (e.g. an `h-card`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mf2Item {
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub properties: HashMap<String, Vec<String>>,
}

/// Discovers IndieAuth and Webmention endpoints advertised by a page.
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// Authorization endpoint advertised by `profile`, if any.
    async fn auth_endpoint(&self, profile: &Url) -> Result<Option<Url>>;

    /// Webmention endpoint advertised by `profile`, if any.
    async fn webmention_endpoint(&self, profile: &Url) -> Result<Option<Url>>;
}

/// Validates an authorization code against the identity's own
/// authorization endpoint.
#[async_trait]
pub trait AuthCodeVerifier: Send + Sync {
    async fn validate_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<CodeValidation>;
}

/// Fetches untrusted remote source pages.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Set of outbound reference URLs found on `source`.
    async fn find_references(&self, source: &Url) -> Result<HashSet<String>>;

    /// Fetch the raw content of `source`.
    async fn fetch(&self, source: &Url) -> Result<FetchedPage>;
}

/// Parses microformats2 structured data out of HTML.
pub trait MicroformatsParser: Send + Sync {
    fn parse(&self, html: &str) -> Result<Mf2Document>;
}

/// Live implementation of all remote capabilities.
///
/// Two HTTP clients: a verifying one for endpoint discovery and code
/// validation, and one that accepts invalid TLS certificates for
/// webmention source fetches. Personal sites routinely run self-signed
/// certificates; the relaxation is a documented risk, scoped to the
/// source-fetch path only. Both clients carry the configured timeout.
pub struct HttpCapabilities {
    client: reqwest::Client,
    lax_client: reqwest::Client,
}

impl HttpCapabilities {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(transport_error)?;
        let lax_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client, lax_client })
    }

    /// Fetch `profile` and return the first endpoint advertised under
    /// `rel`, from the HTTP `Link` header or the document head.
    async fn discover_rel(&self, profile: &Url, rel: &str) -> Result<Option<Url>> {
        let response = self
            .client
            .get(profile.clone())
            .send()
            .await
            .map_err(transport_error)?;

        for value in response.headers().get_all(reqwest::header::LINK) {
            if let Ok(raw) = value.to_str() {
                if let Some(href) = link_header_rel(raw, rel) {
                    let resolved = profile.join(&href).ok();
                    debug!(%profile, rel, endpoint = ?resolved, "Endpoint found in Link header");
                    return Ok(resolved);
                }
            }
        }

        let body = response.text().await.map_err(transport_error)?;
        let endpoint = html_rel_href(&body, rel).and_then(|href| profile.join(&href).ok());
        debug!(%profile, rel, endpoint = ?endpoint, "Endpoint discovery finished");
        Ok(endpoint)
    }
}

#[async_trait]
impl EndpointDiscovery for HttpCapabilities {
    async fn auth_endpoint(&self, profile: &Url) -> Result<Option<Url>> {
        self.discover_rel(profile, "authorization_endpoint").await
    }

    async fn webmention_endpoint(&self, profile: &Url) -> Result<Option<Url>> {
        self.discover_rel(profile, "webmention").await
    }
}

#[async_trait]
impl AuthCodeVerifier for HttpCapabilities {
    async fn validate_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<CodeValidation> {
        let profile = Url::parse(client_id).map_err(|e| Error::Fetch(e.to_string()))?;
        let endpoint = self
            .auth_endpoint(&profile)
            .await?
            .ok_or_else(|| Error::EndpointNotFound(client_id.to_string()))?;

        let mut form = vec![
            ("code", code),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(state) = state {
            form.push(("state", state));
        }

        let response = self
            .client
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            debug!(client_id, status = %response.status(), "Authorization code rejected");
            return Err(Error::CodeRejected);
        }

        let body = response.text().await.map_err(transport_error)?;
        let scope = url::form_urlencoded::parse(body.as_bytes())
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_else(|| "post".to_string());

        Ok(CodeValidation { scope })
    }
}

#[async_trait]
impl SourceFetcher for HttpCapabilities {
    async fn find_references(&self, source: &Url) -> Result<HashSet<String>> {
        let page = self.fetch(source).await?;
        let mut refs = HashSet::new();
        for href in scan_hrefs(&page.body) {
            if let Ok(resolved) = source.join(&href) {
                refs.insert(resolved.to_string());
            }
            refs.insert(href);
        }
        debug!(%source, count = refs.len(), "Scanned outbound references");
        Ok(refs)
    }

    async fn fetch(&self, source: &Url) -> Result<FetchedPage> {
        let response = self
            .lax_client
            .get(source.clone())
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "{} returned {}",
                source,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await.map_err(transport_error)?;
        Ok(FetchedPage { body, content_type })
    }
}

/// Attribute-scanning microformats extractor.
///
/// Recognizes `h-card` items with `p-name` and `u-url` properties.
/// This is a simplified implementation; a production version would use
/// a full mf2 parser. It is enough for author attribution, and verify
/// treats any parse failure as "no structured data" anyway.
pub struct ScanningParser;

impl MicroformatsParser for ScanningParser {
    fn parse(&self, html: &str) -> Result<Mf2Document> {
        let mut items = Vec::new();

        if html_has_class(html, "h-card") {
            let mut properties = HashMap::new();
            if let Some(name) = class_tag_text(html, "p-name") {
                properties.insert("name".to_string(), vec![name]);
            }
            if let Some(url) = class_tag_href_or_text(html, "u-url") {
                properties.insert("url".to_string(), vec![url]);
            }
            items.push(Mf2Item {
                types: vec!["h-card".to_string()],
                properties,
            });
        }

        Ok(Mf2Document { items })
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::NetworkTimeout
    } else {
        Error::Fetch(err.to_string())
    }
}

/// Iterate over the inside of every tag in `html`.
fn tags(html: &str) -> impl Iterator<Item = &str> {
    html.split('<').skip(1).filter_map(|rest| {
        rest.split_once('>').map(|(tag, _)| tag)
    })
}

/// Extract a quoted attribute value from the inside of a tag.
/// Attribute names are matched lowercase, as written in practice.
fn tag_attr(tag: &str, attr: &str) -> Option<String> {
    let at = tag.find(&format!("{}=", attr))?;
    let rest = &tag[at + attr.len() + 1..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        // Unquoted value: read until whitespace
        return rest.split_whitespace().next().map(|s| s.to_string());
    }
    let inner = &rest[1..];
    inner.find(quote).map(|end| inner[..end].to_string())
}

/// Whitespace-separated membership test for rel/class attribute values.
fn attr_contains(value: &str, needle: &str) -> bool {
    value.split_whitespace().any(|v| v.eq_ignore_ascii_case(needle))
}

/// First `href` with the given `rel` among `<link>`/`<a>` tags.
fn html_rel_href(html: &str, rel: &str) -> Option<String> {
    tags(html)
        .filter(|tag| {
            let name = tag
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            name == "link" || name == "a"
        })
        .filter(|tag| tag_attr(tag, "rel").is_some_and(|v| attr_contains(&v, rel)))
        .find_map(|tag| tag_attr(tag, "href"))
}

/// First matching rel target in an HTTP `Link` header value.
fn link_header_rel(header: &str, rel: &str) -> Option<String> {
    for part in header.split(',') {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        for param in segments {
            let param = param.trim();
            if let Some(value) = param
                .strip_prefix("rel=")
                .map(|v| v.trim_matches('"'))
            {
                if attr_contains(value, rel) {
                    return Some(target.to_string());
                }
            }
        }
    }
    None
}

/// All `href` attribute values in the document.
fn scan_hrefs(html: &str) -> Vec<String> {
    tags(html).filter_map(|tag| tag_attr(tag, "href")).collect()
}

fn html_has_class(html: &str, class: &str) -> bool {
    tags(html).any(|tag| tag_attr(tag, "class").is_some_and(|v| attr_contains(&v, class)))
}

/// Inner text of the first tag carrying `class`.
fn class_tag_text(html: &str, class: &str) -> Option<String> {
    let mut remaining = html;
    while let Some(open) = remaining.find('<') {
        let rest = &remaining[open + 1..];
        let Some(close) = rest.find('>') else { break };
        let tag = &rest[..close];
        let after = &rest[close + 1..];
        if tag_attr(tag, "class").is_some_and(|v| attr_contains(&v, class)) {
            let text = after.split('<').next().unwrap_or("").trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
        remaining = after;
    }
    None
}

/// `href` of the first tag carrying `class`, falling back to its text.
fn class_tag_href_or_text(html: &str, class: &str) -> Option<String> {
    let mut remaining = html;
    while let Some(open) = remaining.find('<') {
        let rest = &remaining[open + 1..];
        let Some(close) = rest.find('>') else { break };
        let tag = &rest[..close];
        let after = &rest[close + 1..];
        if tag_attr(tag, "class").is_some_and(|v| attr_contains(&v, class)) {
            if let Some(href) = tag_attr(tag, "href") {
                return Some(href);
            }
            let text = after.split('<').next().unwrap_or("").trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
        remaining = after;
    }
    None
}
