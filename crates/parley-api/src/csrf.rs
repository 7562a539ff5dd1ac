use axum::Json;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;

use parley_types::api::CsrfResponse;

use crate::error::ApiError;
use crate::state::AppState;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Double-submit check: mutating requests must carry a header token equal
/// to the cookie token. Production only; the check runs before any handler
/// body, so a rejected request never touches the database.
pub async fn require_csrf(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mutating = !matches!(
        req.method().as_str(),
        "GET" | "HEAD" | "OPTIONS"
    );

    if state.config.environment.is_production() && mutating {
        let header = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Csrf)?;

        let cookie = jar.get(CSRF_COOKIE).ok_or(ApiError::Csrf)?;

        if cookie.value() != header {
            return Err(ApiError::Csrf);
        }
    }

    Ok(next.run(req).await)
}

/// Mint a fresh token and hand it out both as the response body and the
/// `csrf_token` cookie. The cookie stays readable by the client:
/// double-submit relies on same-origin cookie access, not secrecy.
pub async fn issue_token(jar: CookieJar) -> (CookieJar, Json<CsrfResponse>) {
    let raw: [u8; 32] = rand::random();
    let token = B64.encode(raw);

    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .same_site(SameSite::Strict)
        .http_only(false)
        .build();

    (jar.add(cookie), Json(CsrfResponse { token }))
}
