//! Attribution of requests to an actor.
//!
//! Clients name the actor behind a request with the `X-Responsible-Id`
//! header. Every history entry written while serving the request is tagged
//! with it.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

/// Header carrying the responsible actor's id.
pub const RESPONSIBLE_HEADER: &str = "x-responsible-id";

/// Actor named by the request, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Responsible(pub Option<String>);

impl<S> FromRequestParts<S> for Responsible
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(RESPONSIBLE_HEADER) else {
            return Ok(Responsible(None));
        };

        let id = value
            .to_str()
            .map_err(|_| (StatusCode::BAD_REQUEST, "X-Responsible-Id must be visible ASCII"))?
            .trim();

        if id.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Empty X-Responsible-Id header"));
        }

        Ok(Responsible(Some(id.to_string())))
    }
}
