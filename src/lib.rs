// SPDX-License-Identifier: Apache-2.0

//! IndieWeb endpoint service
//!
//! This crate implements the three inbound protocols a personal
//! IndieWeb site needs:
//!
//! - **IndieAuth** (relying-party side): redirect-based login against
//!   the authorization endpoint advertised by the visitor's own domain
//! - **Token endpoint**: bearer token issuance and validation for
//!   content-API (Micropub) clients
//! - **Webmention** receiver: backlink verification of inbound
//!   mentions, with optional vouch-based trust escalation
//!
//! Remote concerns (endpoint discovery, code validation, source
//! fetching, microformats parsing) sit behind the traits in
//! [`remote`] so every flow is testable with fakes.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mention;
pub mod remote;
pub mod session;
pub mod store;
pub mod token;
pub mod vouch;

pub use config::Config;
pub use error::{Error, Result};
pub use store::KvStore;
