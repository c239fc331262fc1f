//! Identity extraction
//!
//! Resolves the caller from `X-User` / `X-Role` headers for handlers.

use crate::auth::UserContext;
use crate::state::SharedState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

pub const USER_HEADER: &str = "x-user";
pub const ROLE_HEADER: &str = "x-role";

impl FromRequestParts<SharedState> for UserContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        };

        let username = header(USER_HEADER);
        let role = header(ROLE_HEADER);

        Ok(state.users.resolve(username.as_deref(), role.as_deref()))
    }
}
