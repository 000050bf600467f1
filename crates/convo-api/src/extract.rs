use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use convo_core::problemdetails::{self, Problem};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the calling user, taken from the `x-user-id` header.
///
/// The header is set by whatever authenticates requests in front of this
/// router; it is trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = Problem;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                problemdetails::new(StatusCode::UNAUTHORIZED)
                    .with_title("Authentication Required")
                    .with_detail(format!("Missing {} header", USER_ID_HEADER))
            })?;

        Ok(CallerId(user_id.to_string()))
    }
}
