// SPDX-License-Identifier: Apache-2.0

//! Session binding: httpOnly cookies pointing a browser at its login
//! token. The cookie is a lookup hint only; every use is re-validated
//! against the store record, which stays authoritative.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// Cookie name for the login token.
pub const TOKEN_COOKIE: &str = "indieauth_token";
/// Cookie name for the granted scope.
pub const SCOPE_COOKIE: &str = "indieauth_scope";
/// Cookie name for the authenticated identity.
pub const ID_COOKIE: &str = "indieauth_id";

/// Claims held by the browser, read back from the cookie jar.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionClaims {
    pub token: String,
    pub me: String,
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, String::new()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

/// Bind a verified login to the browser.
pub fn bind(jar: CookieJar, token: &str, scope: &str, me: &str) -> CookieJar {
    jar.add(session_cookie(TOKEN_COOKIE, token.to_string()))
        .add(session_cookie(SCOPE_COOKIE, scope.to_string()))
        .add(session_cookie(ID_COOKIE, me.to_string()))
}

/// Clear all session cookies.
pub fn clear(jar: CookieJar) -> CookieJar {
    jar.add(expired_cookie(TOKEN_COOKIE))
        .add(expired_cookie(SCOPE_COOKIE))
        .add(expired_cookie(ID_COOKIE))
}

/// Claims the browser presented, if any. Unvalidated.
pub fn presented(jar: &CookieJar) -> Option<SessionClaims> {
    let token = jar.get(TOKEN_COOKIE)?.value().to_string();
    let me = jar.get(ID_COOKIE)?.value().to_string();
    if token.is_empty() || me.is_empty() {
        return None;
    }
    Some(SessionClaims { token, me })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_then_presented() {
        let jar = bind(CookieJar::new(), "t-123", "post", "https://me.example");
        let claims = presented(&jar).unwrap();
        assert_eq!(claims.token, "t-123");
        assert_eq!(claims.me, "https://me.example");
    }

    #[test]
    fn test_clear_hides_claims() {
        let jar = bind(CookieJar::new(), "t-123", "post", "https://me.example");
        let jar = clear(jar);
        assert_eq!(presented(&jar), None);
    }

    #[test]
    fn test_empty_jar_has_no_claims() {
        assert_eq!(presented(&CookieJar::new()), None);
    }
}
