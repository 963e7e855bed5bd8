// SPDX-License-Identifier: Apache-2.0

//! Error types for the IndieWeb endpoint service.
//!
//! Remote-verification failures (`CodeRejected`, `NoBacklink`,
//! `VouchRequired`) are terminal for the request and never retried.
//! A timeout on any outbound call surfaces as a failure of the
//! containing operation. No error is fatal to the process.

use thiserror::Error;

/// Application error types.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no authorization endpoint advertised by {0}")]
    EndpointNotFound(String),

    #[error("no pending login for {0}")]
    NoPendingLogin(String),

    #[error("authorization code rejected by remote endpoint")]
    CodeRejected,

    #[error("token is not valid")]
    TokenInvalid,

    #[error("target does not resolve to local content: {0}")]
    TargetNotFound(String),

    #[error("source page does not reference the target")]
    NoBacklink,

    #[error("vouch required for webmention")]
    VouchRequired,

    #[error("vouch domain is not trusted: {0}")]
    VouchUntrusted(String),

    #[error("network timeout on outbound call")]
    NetworkTimeout,

    #[error("structured data parse failure: {0}")]
    ParseFailure(String),

    #[error("outbound fetch failed: {0}")]
    Fetch(String),

    #[error("store error: {0}")]
    Store(#[from] serde_json::Error),

    #[error("vouch list error: {0}")]
    VouchList(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
