use super::errors::ServerError;
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Handlers render HTML into plain `String`s, which axum labels as
/// text/plain. Relabel those; bodiless responses and anything with another
/// content type pass through.
pub async fn html_headers<B>(
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, ServerError> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    let is_plain = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/plain"));
    if is_plain {
        headers.insert(CONTENT_TYPE, HeaderValue::from_str("text/html")?);
    }

    Ok(response)
}
