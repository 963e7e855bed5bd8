// SPDX-License-Identifier: Apache-2.0

//! Bearer token issuance and validation for the content API.
//!
//! Issuance is idempotent per `(me, client_id, scope)` tuple: the
//! tuple key `app-<me>-<client>-<scope>` points at its token, and
//! `token-<token>` points back at the owner. Content-API tokens carry
//! no expiry; they stay valid until explicitly revoked. Login-flow
//! tokens share the `token-` keyspace but resolve through their login
//! record and inherit its TTL.

use crate::auth::{canonical_identity, login_key, normalize_identity, LoginRecord};
use crate::error::{Error, Result};
use crate::remote::AuthCodeVerifier;
use crate::store::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What a `token-<token>` entry points back at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenOwner {
    /// Login-flow token: resolves through the owning login record.
    Login { key: String },
    /// Content-API token: carries its issuance tuple inline.
    App {
        me: String,
        client_id: String,
        scope: String,
    },
}

/// Store key for a token's reverse pointer.
pub fn token_key(token: &str) -> String {
    format!("token-{}", token)
}

/// Store key for an issuance tuple.
pub fn app_key(me: &str, client_id: &str, scope: &str) -> String {
    format!("app-{}-{}-{}", me, client_id, scope)
}

/// A freshly issued (or re-fetched) content-API token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub me: String,
    pub scope: String,
    pub access_token: String,
}

/// What a presented bearer token resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub me: String,
    pub client_id: String,
    pub scope: Option<String>,
}

/// Issues and validates content-API bearer tokens.
pub struct TokenService {
    store: KvStore,
    verifier: Arc<dyn AuthCodeVerifier>,
}

impl TokenService {
    pub fn new(store: KvStore, verifier: Arc<dyn AuthCodeVerifier>) -> Self {
        Self { store, verifier }
    }

    /// Exchange a verified authorization code for a bearer token.
    /// Re-issuing for the same `(me, client_id, scope)` tuple returns
    /// the existing token rather than minting a new one.
    pub async fn issue_token(
        &self,
        me_raw: &str,
        client_id: &str,
        redirect_uri: &str,
        state: Option<&str>,
        code: &str,
    ) -> Result<TokenGrant> {
        let me = canonical_identity(&normalize_identity(me_raw)?);

        // Machine-to-machine exchange: the code is re-validated against
        // the identity's own endpoint, independent of the login UI flow.
        let validation = self
            .verifier
            .validate_code(code, &me, redirect_uri, state)
            .await?;
        let scope = validation.scope;

        let tuple = app_key(&me, client_id, &scope);
        if let Some(existing) = self.store.get::<String>(&tuple).await? {
            debug!(%me, client_id, %scope, "Re-issuing existing token");
            return Ok(TokenGrant {
                me,
                scope,
                access_token: existing,
            });
        }

        let token = Uuid::new_v4().to_string();
        self.store.put(&tuple, &token, None).await?;
        self.store
            .put(
                &token_key(&token),
                &TokenOwner::App {
                    me: me.clone(),
                    client_id: client_id.to_string(),
                    scope: scope.clone(),
                },
                None,
            )
            .await?;

        info!(%me, client_id, %scope, "Token issued");
        Ok(TokenGrant {
            me,
            scope,
            access_token: token,
        })
    }

    /// Resolve a presented bearer token to the tuple it was minted for.
    pub async fn validate_token(&self, token: &str) -> Result<TokenInfo> {
        let owner = self
            .store
            .get::<TokenOwner>(&token_key(token))
            .await?
            .ok_or(Error::TokenInvalid)?;

        match owner {
            TokenOwner::App {
                me,
                client_id,
                scope,
            } => Ok(TokenInfo {
                me,
                client_id,
                scope: Some(scope),
            }),
            TokenOwner::Login { key } => {
                let record = self
                    .store
                    .get::<LoginRecord>(&key)
                    .await?
                    .ok_or(Error::TokenInvalid)?;
                if record.token.as_deref() != Some(token) {
                    return Err(Error::TokenInvalid);
                }
                Ok(TokenInfo {
                    me: record.me,
                    client_id: record.client_id,
                    scope: Some(record.scope),
                })
            }
        }
    }

    /// Delete every token mapping reachable from the identity's login
    /// record.
    pub async fn revoke(&self, me_raw: &str) -> Result<()> {
        let me = canonical_identity(&normalize_identity(me_raw)?);
        let key = login_key(&me);
        if let Some(record) = self.store.get::<LoginRecord>(&key).await? {
            if let Some(token) = record.token {
                self.store.delete(&token_key(&token)).await;
            }
        }
        self.store.delete(&key).await;
        info!(%me, "Tokens revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CodeValidation;
    use async_trait::async_trait;

    struct AlwaysValid;

    #[async_trait]
    impl AuthCodeVerifier for AlwaysValid {
        async fn validate_code(
            &self,
            _code: &str,
            _client_id: &str,
            _redirect_uri: &str,
            _state: Option<&str>,
        ) -> Result<CodeValidation> {
            Ok(CodeValidation {
                scope: "post".to_string(),
            })
        }
    }

    struct AlwaysRejects;

    #[async_trait]
    impl AuthCodeVerifier for AlwaysRejects {
        async fn validate_code(
            &self,
            _code: &str,
            _client_id: &str,
            _redirect_uri: &str,
            _state: Option<&str>,
        ) -> Result<CodeValidation> {
            Err(Error::CodeRejected)
        }
    }

    fn service(verifier: Arc<dyn AuthCodeVerifier>) -> TokenService {
        TokenService::new(KvStore::new(), verifier)
    }

    #[tokio::test]
    async fn test_issue_token_is_idempotent_per_tuple() {
        let service = service(Arc::new(AlwaysValid));

        let first = service
            .issue_token("https://me.example", "https://app.example", "https://me.example/cb", None, "c1")
            .await
            .unwrap();
        let second = service
            .issue_token("https://me.example", "https://app.example", "https://me.example/cb", None, "c2")
            .await
            .unwrap();

        assert_eq!(first.access_token, second.access_token);
    }

    #[tokio::test]
    async fn test_issued_token_validates_to_tuple() {
        let service = service(Arc::new(AlwaysValid));

        let grant = service
            .issue_token("https://me.example", "https://app.example", "https://me.example/cb", None, "c")
            .await
            .unwrap();
        let info = service.validate_token(&grant.access_token).await.unwrap();

        assert_eq!(info.me, "https://me.example");
        assert_eq!(info.client_id, "https://app.example");
        assert_eq!(info.scope.as_deref(), Some("post"));
    }

    #[tokio::test]
    async fn test_rejected_code_mints_nothing() {
        let service = service(Arc::new(AlwaysRejects));

        let result = service
            .issue_token("https://me.example", "https://app.example", "https://me.example/cb", None, "bad")
            .await;
        assert!(matches!(result, Err(Error::CodeRejected)));
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let service = service(Arc::new(AlwaysValid));
        let result = service.validate_token("nope").await;
        assert!(matches!(result, Err(Error::TokenInvalid)));
    }
}
