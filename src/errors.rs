use super::{api::ApiError, htmx};
use anyhow::Error;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ServerError(Error);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!("{:?}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
            .into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>`
// to turn them into `Result<_, ServerError>`. That way you don't need to do
// that manually.
impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// The backend refused or never answered. The gateway has already queued a
/// notification, so the page is told to pull it right away. The message can
/// carry backend text, so it goes out as JSON rather than markup.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let headers = htmx::trigger_event(HeaderMap::new(), "notify");
        let body = Json(json!({ "message": self.to_string() }));
        (StatusCode::BAD_GATEWAY, headers, body).into_response()
    }
}
