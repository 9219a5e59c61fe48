//! Session extractor
//!
//! The session is placed in request extensions by [`SessionMiddleware`].
//!
//! [`SessionMiddleware`]: super::SessionMiddleware

use super::Session;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session not initialized"))
    }
}
