// SPDX-License-Identifier: Apache-2.0

//! IndieAuth login flow coordinator (relying-party side).
//!
//! Drives the redirect handshake: `begin_login` discovers the
//! identity's authorization endpoint and parks a login record in the
//! store; `complete_callback` validates the returned code remotely and
//! mints the session token. At most one login record is live per
//! identity; a new `begin_login` overwrites the prior one and revokes
//! its token. A second concurrent `begin_login` for the same identity
//! races the callback, last writer wins. That is acceptable for
//! single-session use and is not safe for concurrent multi-device
//! login by the same identity.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::remote::{AuthCodeVerifier, EndpointDiscovery};
use crate::store::KvStore;
use crate::token::{token_key, TokenOwner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// Server-side state of one login handshake, keyed `login-<me>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRecord {
    /// Canonicalized identity the record belongs to.
    pub me: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub scope: String,
    /// Where to send the browser after a completed login.
    pub return_to: Option<String>,
    /// Authorization code, set once the callback arrives.
    pub code: Option<String>,
    /// Session token, set once the callback verifies.
    pub token: Option<String>,
}

/// Result of a verified login callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub me: String,
    pub token: String,
    pub scope: String,
    pub return_to: Option<String>,
}

/// Store key for an identity's login record.
pub fn login_key(me: &str) -> String {
    format!("login-{}", me)
}

/// Normalize a claimed identity URL: default the scheme to https,
/// strip query and fragment.
pub fn normalize_identity(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("https://{}", trimmed))
    };
    let mut url = parsed.map_err(|_| Error::EndpointNotFound(raw.to_string()))?;
    if url.host_str().is_none() {
        return Err(Error::EndpointNotFound(raw.to_string()));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Canonical string form of a normalized identity: scheme + host, plus
/// the path when one is present.
pub fn canonical_identity(url: &Url) -> String {
    let s = url.to_string();
    if url.path() == "/" {
        s.trim_end_matches('/').to_string()
    } else {
        s
    }
}

/// Network location of an identity URL, lowercased, no scheme.
pub fn identity_host(me: &str) -> Option<String> {
    normalize_identity(me)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.to_lowercase()))
}

/// Coordinates the multi-step IndieAuth handshake.
pub struct AuthFlow {
    store: KvStore,
    discovery: Arc<dyn EndpointDiscovery>,
    verifier: Arc<dyn AuthCodeVerifier>,
    client_id: String,
    redirect_uri: String,
    timeout: Duration,
}

impl AuthFlow {
    pub fn new(
        store: KvStore,
        discovery: Arc<dyn EndpointDiscovery>,
        verifier: Arc<dyn AuthCodeVerifier>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            discovery,
            verifier,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri(),
            timeout: config.auth.timeout(),
        }
    }

    /// Start a login for `me_raw`. Returns the authorization endpoint
    /// URL with the handshake parameters appended, ready to redirect
    /// the browser to.
    pub async fn begin_login(&self, me_raw: &str, return_to: Option<String>) -> Result<Url> {
        let profile = normalize_identity(me_raw)?;
        let me = canonical_identity(&profile);

        let endpoint = match self.discovery.auth_endpoint(&profile).await {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => return Err(Error::EndpointNotFound(me)),
            // Discovery failure, timeout included, reads as "no endpoint"
            Err(err) => {
                debug!(%me, error = %err, "Endpoint discovery failed");
                return Err(Error::EndpointNotFound(me));
            }
        };

        let key = login_key(&me);
        if let Some(prior) = self.store.get::<LoginRecord>(&key).await? {
            // Overwriting a live login invalidates its token too
            if let Some(token) = prior.token {
                self.store.delete(&token_key(&token)).await;
            }
        }

        let record = LoginRecord {
            me: me.clone(),
            redirect_uri: self.redirect_uri.clone(),
            client_id: self.client_id.clone(),
            scope: "post".to_string(),
            return_to,
            code: None,
            token: None,
        };
        self.store.put(&key, &record, Some(self.timeout)).await?;

        let mut authorize = endpoint;
        authorize
            .query_pairs_mut()
            .append_pair("me", &me)
            .append_pair("redirect_uri", &record.redirect_uri)
            .append_pair("client_id", &record.client_id)
            .append_pair("scope", "post")
            .append_pair("response_type", "id");

        info!(%me, endpoint = %authorize, "Login started");
        Ok(authorize)
    }

    /// Consume the authorization callback for `me_raw` carrying `code`.
    /// On success the login record holds the minted token and its
    /// expiry is reset; on remote rejection all auth state for the
    /// identity is cleared.
    pub async fn complete_callback(&self, me_raw: &str, code: &str) -> Result<CallbackOutcome> {
        let profile = normalize_identity(me_raw)?;
        let me = canonical_identity(&profile);
        let key = login_key(&me);

        let mut record = self
            .store
            .get::<LoginRecord>(&key)
            .await?
            .ok_or_else(|| Error::NoPendingLogin(me.clone()))?;

        let validation = match self
            .verifier
            .validate_code(code, &me, &record.redirect_uri, None)
            .await
        {
            Ok(validation) => validation,
            Err(err) => {
                debug!(%me, error = %err, "Authorization code validation failed");
                if let Some(token) = &record.token {
                    self.store.delete(&token_key(token)).await;
                }
                self.store.delete(&key).await;
                return Err(Error::CodeRejected);
            }
        };

        let token = Uuid::new_v4().to_string();
        record.code = Some(code.to_string());
        record.token = Some(token.clone());
        record.scope = validation.scope.clone();
        self.store.put(&key, &record, Some(self.timeout)).await?;
        self.store
            .put(
                &token_key(&token),
                &TokenOwner::Login { key: key.clone() },
                Some(self.timeout),
            )
            .await?;

        info!(%me, scope = %validation.scope, "Login verified");
        Ok(CallbackOutcome {
            me,
            token,
            scope: validation.scope,
            return_to: record.return_to,
        })
    }

    /// Whether `token` still names a live, matching login record.
    /// The cookie is a hint only; the store record is authoritative.
    pub async fn session_valid(&self, token: &str) -> bool {
        let owner = match self.store.get::<TokenOwner>(&token_key(token)).await {
            Ok(Some(owner)) => owner,
            _ => return false,
        };
        match owner {
            TokenOwner::Login { key } => match self.store.get::<LoginRecord>(&key).await {
                Ok(Some(record)) => record.token.as_deref() == Some(token),
                _ => false,
            },
            // Content-API tokens are not browser sessions
            TokenOwner::App { .. } => false,
        }
    }

    /// Drop the token and the login record it points back to (logout).
    pub async fn clear_auth(&self, token: &str) {
        if let Ok(Some(owner)) = self.store.get::<TokenOwner>(&token_key(token)).await {
            match owner {
                TokenOwner::Login { key } => {
                    self.store.delete(&key).await;
                }
                TokenOwner::App {
                    me,
                    client_id,
                    scope,
                } => {
                    self.store
                        .delete(&crate::token::app_key(&me, &client_id, &scope))
                        .await;
                }
            }
        }
        self.store.delete(&token_key(token)).await;
        debug!("Auth state cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_scheme() {
        let url = normalize_identity("example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_normalize_strips_query_and_fragment() {
        let url = normalize_identity("https://example.com/about?tab=1#top").unwrap();
        assert_eq!(canonical_identity(&url), "https://example.com/about");
    }

    #[test]
    fn test_canonical_bare_host_has_no_trailing_slash() {
        let url = normalize_identity("https://example.com").unwrap();
        assert_eq!(canonical_identity(&url), "https://example.com");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_identity("not a url at all ://").is_err());
    }

    #[test]
    fn test_identity_host() {
        assert_eq!(
            identity_host("https://Example.COM/path").as_deref(),
            Some("example.com")
        );
    }
}
