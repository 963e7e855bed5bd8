// SPDX-License-Identifier: Apache-2.0

//! Configuration for the IndieWeb endpoint service.
//!
//! Defaults mirror the original deployment: 300 second login timeout,
//! vouching optional, vouch list in `vouch_domains.txt`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the IndieWeb endpoint service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Public base URL of this site, no trailing slash
    /// (default: http://localhost:8080)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth client identifier presented to authorization endpoints
    /// (default: the base URL)
    #[serde(default = "default_base_url")]
    pub client_id: String,

    /// Domain this site serves content for; Micropub tokens must
    /// resolve to an identity on this domain (default: localhost)
    #[serde(default = "default_site_domain")]
    pub site_domain: String,

    /// Login flow configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Webmention configuration
    #[serde(default)]
    pub webmention: WebmentionConfig,

    /// Outbound fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Login flow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Seconds a pending login record stays live unless completed
    /// (default: 300)
    #[serde(default = "default_auth_timeout_secs")]
    pub timeout_secs: u64,
}

/// Webmention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebmentionConfig {
    /// Reject mentions that do not carry a trusted vouch domain
    /// (default: false)
    #[serde(default)]
    pub require_vouch: bool,

    /// Path of the append-only vouch domain list
    /// (default: vouch_domains.txt)
    #[serde(default = "default_vouch_file")]
    pub vouch_file: String,
}

/// Outbound fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout applied to every outbound network call in seconds
    /// (default: 10)
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_site_domain() -> String {
    "localhost".to_string()
}

fn default_auth_timeout_secs() -> u64 {
    300
}

fn default_vouch_file() -> String {
    "vouch_domains.txt".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            base_url: default_base_url(),
            client_id: default_base_url(),
            site_domain: default_site_domain(),
            auth: AuthConfig::default(),
            webmention: WebmentionConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_auth_timeout_secs(),
        }
    }
}

impl Default for WebmentionConfig {
    fn default() -> Self {
        Self {
            require_vouch: false,
            vouch_file: default_vouch_file(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Config {
    /// Redirect URI handed to authorization endpoints.
    pub fn redirect_uri(&self) -> String {
        format!("{}/success", self.base_url)
    }
}

impl AuthConfig {
    /// Get the login record TTL.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FetchConfig {
    /// Get the outbound call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
