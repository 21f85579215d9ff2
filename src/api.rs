//! Gateway to the REST backend that owns the catalog and the notes.
//!
//! Every call either hands back the decoded body or an [ApiError]. Before an
//! error is returned it is also pushed onto the [Notifications] queue, so
//! callers only need to decide what the failure means for *their* state.

use super::{
    models::{note_remote_id, NotePayload, PropertyRecord},
    notify::Notifications,
};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request went out but nothing came back.
    #[error("Unable to reach the server. Please check your connection.")]
    Unreachable,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Access denied")]
    Forbidden,
    #[error("Resource not found")]
    NotFound,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Too many requests. Please try again later.")]
    RateLimited,
    #[error("Server error. Please try again later.")]
    Server(u16),
    /// Any other non-2xx status; the server's own message is shown as-is.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// The request could not be built, or the response made no sense.
    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    pub fn from_status(status: u16, server_message: &str) -> Self {
        match status {
            400 => Self::InvalidRequest(server_message.to_string()),
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            422 => Self::Validation(server_message.to_string()),
            429 => Self::RateLimited,
            500 => Self::Server(status),
            _ => Self::Status {
                status,
                message: if server_message.is_empty() {
                    DEFAULT_ERROR_MESSAGE.to_string()
                } else {
                    server_message.to_string()
                },
            },
        }
    }

    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidRequest(_) => Some(400),
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::NotFound => Some(404),
            Self::Validation(_) => Some(422),
            Self::RateLimited => Some(429),
            Self::Server(status) | Self::Status { status, .. } => Some(*status),
            Self::Unreachable | Self::Unknown(_) => None,
        }
    }
}

/// The calls the store makes against the backend. [ApiClient] is the real
/// implementation; tests swap in a recording fake.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_properties(&self) -> Result<Vec<PropertyRecord>, ApiError>;
    async fn put_note(&self, note: &NotePayload) -> Result<(), ApiError>;
    async fn post_note(&self, note: &NotePayload) -> Result<(), ApiError>;
    async fn delete_note(
        &self,
        property_id: &str,
        user_id: &str,
    ) -> Result<(), ApiError>;
}

/// What we know about a failed call, on its way to becoming a notification.
struct Failure {
    error: ApiError,
    details: String,
}

impl Failure {
    fn new(error: ApiError, details: impl Into<String>) -> Self {
        Self {
            error,
            details: details.into(),
        }
    }
}

pub struct ApiClient {
    base_url: RwLock<String>,
    catalog_path: String,
    http: reqwest::Client,
    notifications: Arc<Notifications>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        catalog_path: &str,
        timeout: Duration,
        notifications: Arc<Notifications>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: RwLock::new(base_url.to_string()),
            catalog_path: catalog_path.to_string(),
            http,
            notifications,
        })
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_base_url(&self, url: &str) {
        *self.base_url.write().unwrap_or_else(|e| e.into_inner()) =
            url.to_string();
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::DELETE, path, None).await
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let result = match self.send(&method, path, body).await {
            Ok(bytes) => decode_body(&bytes).map_err(|e| {
                Failure::new(
                    ApiError::Unknown(format!("Unexpected response body: {e}")),
                    String::from_utf8_lossy(&bytes),
                )
            }),
            Err(failure) => Err(failure),
        };
        self.report(&method, path, result)
    }

    /// For writes whose reply we never read: any 2xx counts, whatever the
    /// body holds.
    async fn request_ignoring_body<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized,
    {
        let result = self.send(&method, path, body).await.map(|_| ());
        self.report(&method, path, result)
    }

    fn report<T>(
        &self,
        method: &Method,
        path: &str,
        result: Result<T, Failure>,
    ) -> Result<T, ApiError> {
        result.map_err(|Failure { error, details }| {
            warn!(%method, path, status = ?error.status(), "api request failed: {error}");
            self.notifications.push(error.to_string(), details);
            error
        })
    }

    /// Send the request and hand back the body of a 2xx response.
    async fn send<B>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>, Failure>
    where
        B: Serialize + ?Sized,
    {
        debug!(%method, path, "api request");
        let url = join_url(&self.base_url(), path)
            .map_err(|e| Failure::new(ApiError::Unknown(e), path))?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_failure)?;

        if !status.is_success() {
            return Err(status_failure(status, &bytes));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn fetch_properties(&self) -> Result<Vec<PropertyRecord>, ApiError> {
        self.get(&self.catalog_path).await
    }
    async fn put_note(&self, note: &NotePayload) -> Result<(), ApiError> {
        let path = format!("/property-note/{}", note.id);
        self.request_ignoring_body(Method::PUT, &path, Some(note))
            .await
    }
    async fn post_note(&self, note: &NotePayload) -> Result<(), ApiError> {
        self.request_ignoring_body(Method::POST, "/property-note", Some(note))
            .await
    }
    async fn delete_note(
        &self,
        property_id: &str,
        user_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/property-note/{}", note_remote_id(property_id, user_id));
        self.request_ignoring_body::<()>(Method::DELETE, &path, None)
            .await
    }
}

fn join_url(base: &str, path: &str) -> Result<Url, String> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| format!("{e}: {joined}"))
}

fn transport_failure(e: reqwest::Error) -> Failure {
    if e.is_builder() {
        Failure::new(ApiError::Unknown(e.to_string()), format!("{e:?}"))
    } else {
        Failure::new(ApiError::Unreachable, e.to_string())
    }
}

fn status_failure(status: StatusCode, body: &[u8]) -> Failure {
    let parsed: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    let server_message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!("Request failed with status code {}", status.as_u16())
        });
    let details = match &parsed {
        Some(v) => serde_json::to_string_pretty(v)
            .unwrap_or_else(|_| v.to_string()),
        None => String::from_utf8_lossy(body).into_owned(),
    };

    Failure::new(ApiError::from_status(status.as_u16(), &server_message), details)
}

/// An empty body is read as JSON `null`, so calls that expect nothing back
/// still decode.
fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_slice(b"null")
    } else {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        routing::{delete, get, post, put},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> String {
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        format!("http://{addr}")
    }

    fn backend_router() -> Router {
        Router::new()
            .route(
                "/sri-data-list",
                get(|| async {
                    Json(json!([{ "propertyID": "P1", "saleID": "S1" }]))
                }),
            )
            .route(
                "/property-note/:id",
                put(|Json(body): Json<Value>| async move { Json(body) }),
            )
            .route(
                "/property-note/:id",
                delete(|| async { StatusCode::NO_CONTENT }),
            )
            .route(
                "/property-note",
                post(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({ "message": "visited must be a boolean" })),
                    )
                }),
            )
            .route(
                "/bad",
                get(|| async {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "message": "priority is wrong" })),
                    )
                }),
            )
            .route("/busy", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
            .route(
                "/boom",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/teapot",
                get(|| async {
                    (
                        StatusCode::IM_A_TEAPOT,
                        Json(json!({ "message": "short and stout" })),
                    )
                }),
            )
            .route("/teapot-bare", get(|| async { StatusCode::IM_A_TEAPOT }))
            .route("/not-json", get(|| async { "<html></html>" }))
    }

    #[tokio::test]
    async fn test_note_writes_accept_any_success_body() {
        let app = Router::new()
            .route("/property-note/:id", put(|| async { "OK" }))
            .route("/property-note", post(|| async { "saved" }));
        let base = serve(app).await;
        let notifications = Arc::new(Notifications::default());
        let api = client(&base, notifications.clone());
        let note = crate::models::Note::blank("P1", "u@x.com").to_payload();

        assert_eq!(api.put_note(&note).await, Ok(()));
        assert_eq!(api.post_note(&note).await, Ok(()));
        assert!(notifications.visible().is_empty());
    }

    fn client(base_url: &str, notifications: Arc<Notifications>) -> ApiClient {
        ApiClient::new(
            base_url,
            "/sri-data-list",
            Duration::from_secs(5),
            notifications,
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn test_fetch_properties() {
        let base = serve(backend_router()).await;
        let notifications = Arc::new(Notifications::default());
        let api = client(&base, notifications.clone());

        let properties = api.fetch_properties().await.expect("catalog");
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].property_id, "P1");
        assert!(notifications.visible().is_empty());
    }

    #[tokio::test]
    async fn test_note_calls() {
        let base = serve(backend_router()).await;
        let notifications = Arc::new(Notifications::default());
        let api = client(&format!("{base}/"), notifications.clone());
        let note = crate::models::Note::blank("P1", "u@x.com").to_payload();

        api.put_note(&note).await.expect("put succeeds");
        // 204 with no body decodes fine
        api.delete_note("P1", "u@x.com").await.expect("delete succeeds");

        let err = api.post_note(&note).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Validation("visited must be a boolean".into())
        );
        assert_eq!(
            err.to_string(),
            "Validation error: visited must be a boolean"
        );
        assert_eq!(notifications.visible().len(), 1);
    }

    #[tokio::test]
    async fn test_typed_verbs_decode_replies() {
        let base = serve(backend_router()).await;
        let notifications = Arc::new(Notifications::default());
        let api = client(&base, notifications.clone());
        let body = json!({ "id": "P1|u@x.com", "priority": "low" });

        let echoed: Value = api.put("/property-note/P1|u@x.com", &body).await.unwrap();
        assert_eq!(echoed, body);
        // 204 with no body decodes as unit
        api.delete::<()>("/property-note/P1|u@x.com").await.unwrap();
        let err = api.post::<Value, _>("/property-note", &body).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(notifications.visible().len(), 1);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let base = serve(backend_router()).await;
        let notifications = Arc::new(Notifications::new(Duration::from_secs(60), 10));
        let api = client(&base, notifications.clone());

        let err = api.get::<Value>("/bad").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: priority is wrong");

        let err = api.get::<Value>("/nowhere").await.unwrap_err();
        assert_eq!(err, ApiError::NotFound);
        assert_eq!(err.to_string(), "Resource not found");

        let err = api.get::<Value>("/busy").await.unwrap_err();
        assert_eq!(err.to_string(), "Too many requests. Please try again later.");

        let err = api.get::<Value>("/boom").await.unwrap_err();
        assert_eq!(err, ApiError::Server(500));
        assert_eq!(err.to_string(), "Server error. Please try again later.");

        let err = api.get::<Value>("/teapot").await.unwrap_err();
        assert_eq!(err.to_string(), "short and stout");
        assert_eq!(err.status(), Some(418));

        let err = api.get::<Value>("/teapot-bare").await.unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status code 418");

        let err = api.get::<Vec<PropertyRecord>>("/not-json").await.unwrap_err();
        assert!(matches!(err, ApiError::Unknown(_)));

        let shown = notifications.visible();
        assert_eq!(shown.len(), 7);
        assert_eq!(shown[0].message, "Invalid request: priority is wrong");
        assert!(shown[0].details.contains("priority is wrong"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifications = Arc::new(Notifications::default());
        let api = client(&format!("http://{addr}"), notifications.clone());
        let err = api.fetch_properties().await.unwrap_err();
        assert_eq!(err, ApiError::Unreachable);
        assert_eq!(
            notifications.visible()[0].message,
            "Unable to reach the server. Please check your connection."
        );
    }

    #[tokio::test]
    async fn test_setup_failure_never_sends() {
        let notifications = Arc::new(Notifications::default());
        let api = client("not a url", notifications.clone());
        let err = api.get::<Value>("/sri-data-list").await.unwrap_err();
        assert!(matches!(err, ApiError::Unknown(_)));
        assert_eq!(notifications.visible().len(), 1);
    }

    #[tokio::test]
    async fn test_set_base_url() {
        let base = serve(backend_router()).await;
        let notifications = Arc::new(Notifications::default());
        let api = client("http://127.0.0.1:1", notifications);
        api.set_base_url(&base);
        assert_eq!(api.base_url(), base);
        assert!(api.fetch_properties().await.is_ok());
    }

    #[test]
    fn test_from_status_fallback_message() {
        assert_eq!(
            ApiError::from_status(503, "").to_string(),
            "An unexpected error occurred"
        );
    }
}
