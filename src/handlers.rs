// SPDX-License-Identifier: Apache-2.0

//! HTTP handlers and router for the IndieWeb endpoint service.
//!
//! Status mapping follows the protocol surfaces: login failures are
//! 403 with a human-readable body, bad tokens are 400, a webmention
//! without a required vouch is 449, and an unknown webmention target
//! is 404.

use crate::auth::identity_host;
use crate::config::Config;
use crate::error::Error;
use crate::{auth::AuthFlow, mention::MentionVerifier, session, token::TokenService};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub auth: AuthFlow,
    pub tokens: TokenService,
    pub mentions: MentionVerifier,
    pub config: Config,
}

/// Assemble the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/article/:id", get(article))
        .route("/health", get(health))
        .route("/login", get(login_form).post(login_submit))
        .route("/success", get(login_success))
        .route("/auth", get(introspect_session))
        .route("/logout", get(logout))
        .route("/token", get(token_lookup).post(token_exchange))
        .route("/micropub", get(micropub_query).post(micropub_create))
        .route("/webmention", post(webmention))
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "indieweb-endpoint",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 302 Found redirect. `axum::response::Redirect` issues 303/307; the
/// IndieAuth and Webmention exchanges specify plain 302 responses.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn urlencoded(pairs: &[(&str, &str)]) -> Response {
    let mut body = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        body.append_pair(k, v);
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-www-form-urlencoded")],
        body.finish(),
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Deserialize)]
struct LoginPageParams {
    from_uri: Option<String>,
}

async fn login_form(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoginPageParams>,
) -> Html<String> {
    let from_uri = params.from_uri.as_deref().unwrap_or("");
    Html(format!(
        r#"<!DOCTYPE html>
<html><head><title>Sign In</title></head><body>
<form method="post" action="/login">
  <label>me <input type="text" name="me" placeholder="https://your.domain"></label>
  <input type="hidden" name="client_id" value="{client_id}">
  <input type="hidden" name="redirect_uri" value="{redirect_uri}">
  <input type="hidden" name="from_uri" value="{from_uri}">
  <button type="submit">Sign In</button>
</form>
</body></html>
"#,
        client_id = escape_attr(&state.config.client_id),
        redirect_uri = escape_attr(&state.config.redirect_uri()),
        from_uri = escape_attr(from_uri),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginSubmission {
    me: String,
    #[serde(default)]
    from_uri: Option<String>,
}

async fn login_submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginSubmission>,
) -> Response {
    if form.me.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "me is required").into_response();
    }

    let return_to = form.from_uri.filter(|uri| !uri.is_empty());
    match state.auth.begin_login(&form.me, return_to).await {
        Ok(authorize_url) => found(authorize_url.as_str()),
        Err(err) => {
            info!(me = %form.me, error = %err, "Login rejected");
            (
                StatusCode::FORBIDDEN,
                format!("no authorization endpoint found for {}", form.me),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    me: Option<String>,
    code: Option<String>,
}

async fn login_success(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let (Some(me), Some(code)) = (params.me, params.code) else {
        return (StatusCode::FORBIDDEN, "authentication failed").into_response();
    };

    match state.auth.complete_callback(&me, &code).await {
        Ok(outcome) => {
            let jar = session::bind(jar, &outcome.token, &outcome.scope, &outcome.me);
            let location = outcome.return_to.unwrap_or_else(|| "/".to_string());
            (jar, found(&location)).into_response()
        }
        Err(err) => {
            info!(%me, error = %err, "Login callback rejected");
            (
                StatusCode::FORBIDDEN,
                session::clear(jar),
                "authentication failed",
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectParams {
    token: Option<String>,
}

async fn introspect_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<IntrospectParams>,
) -> Response {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| session::presented(&jar).map(|claims| claims.token));

    match token {
        Some(token) if state.auth.session_valid(&token).await => {
            (StatusCode::OK, "valid").into_response()
        }
        _ => {
            debug!("Session introspection failed");
            (StatusCode::FORBIDDEN, session::clear(jar), "invalid").into_response()
        }
    }
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(claims) = session::presented(&jar) {
        state.auth.clear_auth(&claims.token).await;
    }
    (session::clear(jar), found("/")).into_response()
}

async fn token_lookup(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::BAD_REQUEST, "Token is not valid").into_response();
    };

    match state.tokens.validate_token(&token).await {
        Ok(info) => {
            let mut pairs = vec![("me", info.me.as_str()), ("client_id", info.client_id.as_str())];
            if let Some(scope) = &info.scope {
                pairs.push(("scope", scope.as_str()));
            }
            urlencoded(&pairs)
        }
        Err(_) => (StatusCode::BAD_REQUEST, "Token is not valid").into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct TokenExchange {
    code: String,
    me: String,
    redirect_uri: String,
    client_id: String,
    #[serde(default)]
    state: Option<String>,
}

async fn token_exchange(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TokenExchange>,
) -> Response {
    if form.code.is_empty() || form.me.is_empty() {
        return (StatusCode::BAD_REQUEST, "code and me are required").into_response();
    }

    match state
        .tokens
        .issue_token(
            &form.me,
            &form.client_id,
            &form.redirect_uri,
            form.state.as_deref(),
            &form.code,
        )
        .await
    {
        Ok(grant) => urlencoded(&[
            ("me", grant.me.as_str()),
            ("scope", grant.scope.as_str()),
            ("access_token", grant.access_token.as_str()),
        ]),
        Err(err) => {
            info!(me = %form.me, error = %err, "Token exchange rejected");
            (StatusCode::BAD_REQUEST, "authorization code rejected").into_response()
        }
    }
}

/// Micropub form fields, original protocol set. Most are carried
/// through to the content engine untouched.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct MicropubForm {
    h: Option<String>,
    name: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    category: Option<String>,
    slug: Option<String>,
    location: Option<String>,
    #[serde(rename = "in-reply-to")]
    in_reply_to: Option<String>,
    #[serde(rename = "repost-of")]
    repost_of: Option<String>,
    syndication: Option<String>,
    #[serde(rename = "syndicate-to")]
    syndicate_to: Option<String>,
}

async fn micropub_query() -> Response {
    // Query support (q=syndicate-to etc.) is not implemented
    (StatusCode::NOT_IMPLEMENTED, "not implemented").into_response()
}

async fn micropub_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<MicropubForm>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::BAD_REQUEST, "Invalid access_token").into_response();
    };
    let info = match state.tokens.validate_token(&token).await {
        Ok(info) => info,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Invalid access_token").into_response();
        }
    };

    // The token must belong to an identity on the site's own domain
    if identity_host(&info.me).as_deref() != Some(state.config.site_domain.as_str()) {
        warn!(me = %info.me, "Micropub token for foreign domain");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    match form.h.as_deref() {
        Some("entry") => {
            // Content creation itself is handled by the site's content
            // engine; this endpoint only authorizes and acknowledges.
            let location = state.config.base_url.clone();
            info!(me = %info.me, name = ?form.name, slug = ?form.slug, "Micropub entry accepted");
            (
                StatusCode::ACCEPTED,
                [(header::LOCATION, location.clone())],
                format!("Micropub CREATE entry successful for {}", location),
            )
                .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            "Micropub CREATE requires a valid h parameter",
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct WebmentionForm {
    source: Option<String>,
    target: Option<String>,
    #[serde(default)]
    vouch: Option<String>,
}

async fn webmention(
    State(state): State<Arc<AppState>>,
    Form(form): Form<WebmentionForm>,
) -> Response {
    let (Some(source), Some(target)) = (
        form.source.filter(|s| !s.is_empty()),
        form.target.filter(|t| !t.is_empty()),
    ) else {
        return (StatusCode::BAD_REQUEST, "source and target are required").into_response();
    };
    let vouch = form.vouch.filter(|v| !v.is_empty());

    match state
        .mentions
        .verify(&source, &target, vouch.as_deref())
        .await
    {
        Ok(_) => found(&target),
        Err(Error::TargetNotFound(_)) => {
            (StatusCode::NOT_FOUND, "invalid post").into_response()
        }
        Err(Error::VouchRequired) => (
            StatusCode::from_u16(449).unwrap_or(StatusCode::BAD_REQUEST),
            "Vouch required for webmention",
        )
            .into_response(),
        Err(err) => {
            info!(%source, %target, error = %err, "Webmention rejected");
            (StatusCode::BAD_REQUEST, "Webmention is invalid").into_response()
        }
    }
}

async fn root(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html><head><title>{title}</title></head><body>
<h1>{title}</h1>
<ul>
  <li><a href="/article/1">Article 1</a></li>
  <li><a href="/article/2">Article 2</a></li>
</ul>
</body></html>
"#,
        title = escape_attr(&state.config.site_domain),
    ))
}

async fn article(Path(id): Path<String>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html><head><title>Article {id}</title></head><body>
<article class="h-entry"><h1>Article {id}</h1></article>
</body></html>
"#,
        id = escape_attr(&id),
    ))
}
