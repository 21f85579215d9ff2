use super::{
    components,
    components::{Component, View},
    htmx,
    models::{AppState, BaseLayer, LatLng, NoteEdit, Overlay, Priority},
};
use ammonia::clean_text;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const TITLE: &str = "PropertyScout.AI";

#[derive(Debug, Default, Deserialize)]
pub struct ViewParams {
    #[serde(default)]
    view: Option<String>,
}
impl ViewParams {
    /// Anything we don't recognize falls back to the map.
    fn view(&self) -> View {
        self.view
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

pub async fn root(
    State(AppState { store, .. }): State<AppState>,
    Query(params): Query<ViewParams>,
) -> impl IntoResponse {
    let snapshot = store.snapshot();
    let html = components::Page {
        title: TITLE,
        children: Box::new(components::Dashboard {
            snapshot: &snapshot,
            view: params.view(),
        }),
    }
    .render();
    html
}

/// The loading state polls this until the catalog settles.
pub async fn dashboard(
    State(AppState { store, .. }): State<AppState>,
    Query(params): Query<ViewParams>,
) -> impl IntoResponse {
    let snapshot = store.snapshot();
    components::Dashboard {
        snapshot: &snapshot,
        view: params.view(),
    }
    .render()
}

pub async fn main_view(
    State(AppState { store, .. }): State<AppState>,
    Path(view): Path<String>,
) -> Response {
    let Ok(view) = view.parse::<View>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let snapshot = store.snapshot();
    let panel = components::MainPanel {
        snapshot: &snapshot,
        view,
    }
    .render();
    // The drawer's view toggle has to follow along.
    let drawer = components::Drawer {
        snapshot: &snapshot,
        view,
        oob: true,
    }
    .render();
    format!("{panel}{drawer}").into_response()
}

pub async fn drawer(
    State(AppState { store, .. }): State<AppState>,
    Query(params): Query<ViewParams>,
) -> impl IntoResponse {
    let snapshot = store.snapshot();
    components::Drawer {
        snapshot: &snapshot,
        view: params.view(),
        oob: false,
    }
    .render()
}

pub async fn refresh_properties(
    State(AppState { store, .. }): State<AppState>,
    Query(params): Query<ViewParams>,
) -> impl IntoResponse {
    store.fetch_properties().await;
    let snapshot = store.snapshot();
    components::Dashboard {
        snapshot: &snapshot,
        view: params.view(),
    }
    .render()
}

pub async fn property_popup(
    State(AppState { store, .. }): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let snapshot = store.snapshot();
    match snapshot.catalog.find(&id) {
        Some(property) => components::PropertyPopup {
            property,
            note: snapshot.note(&id),
        }
        .render()
        .into_response(),
        None => (StatusCode::NOT_FOUND, "Property not found").into_response(),
    }
}

pub async fn visit_property(
    State(AppState { store, .. }): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let headers = match store.mark_visited(&id).await {
        Some(_) => htmx::trigger_event(HeaderMap::new(), htmx::NOTES_CHANGED),
        None => HeaderMap::new(),
    };
    (StatusCode::NO_CONTENT, headers)
}

#[derive(Debug, Deserialize)]
pub struct NoteForm {
    priority: Option<String>,
    comment: Option<String>,
}
pub async fn save_note(
    State(AppState { store, .. }): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<NoteForm>,
) -> Response {
    let priority = match form.priority {
        Some(raw) => match raw.parse::<Priority>() {
            Ok(priority) => Some(priority),
            Err(e) => return bad_request(&e),
        },
        None => None,
    };
    let edit = NoteEdit {
        priority,
        comment: form.comment,
        visited: None,
    };
    let changed = match store.set_note(&id, edit).await {
        Ok(changed) => changed,
        Err(e) => return e.into_response(),
    };
    let headers = if changed {
        htmx::trigger_event(HeaderMap::new(), htmx::NOTES_CHANGED)
    } else {
        HeaderMap::new()
    };
    let note = store.note(&id);
    (
        headers,
        components::NoteForm {
            property_id: &id,
            note: note.as_ref(),
        }
        .render(),
    )
        .into_response()
}

pub async fn reset_note(
    State(AppState { store, .. }): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = store.reset_note(&id).await {
        return e.into_response();
    }
    let headers = htmx::trigger_event(HeaderMap::new(), htmx::NOTES_CHANGED);
    let snapshot = store.snapshot();
    let body = match snapshot.catalog.find(&id) {
        Some(property) => components::PropertyPopup {
            property,
            note: None,
        }
        .render(),
        None => String::new(),
    };
    (headers, body).into_response()
}

pub async fn select_property(
    State(AppState { store, .. }): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let headers = htmx::trigger_event_with(
        HeaderMap::new(),
        htmx::SELECT_PROPERTY,
        json!({ "id": id }),
    );
    store.set_selected_property(Some(id));
    (StatusCode::NO_CONTENT, headers)
}

#[derive(Debug, Deserialize)]
pub struct MapStateForm {
    lat: f64,
    lng: f64,
    zoom: f64,
}
pub async fn save_map_state(
    State(AppState { store, .. }): State<AppState>,
    Form(MapStateForm { lat, lng, zoom }): Form<MapStateForm>,
) -> impl IntoResponse {
    if !store.set_map_state(LatLng { lat, lng }, zoom) {
        debug!("viewport unchanged");
    }
    StatusCode::NO_CONTENT
}

pub async fn get_markers(
    State(AppState { store, .. }): State<AppState>,
) -> impl IntoResponse {
    Json(components::markers(&store.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct BaseLayerForm {
    layer: String,
}
pub async fn set_base_layer(
    State(AppState { store, .. }): State<AppState>,
    Form(BaseLayerForm { layer }): Form<BaseLayerForm>,
) -> Response {
    match layer.parse::<BaseLayer>() {
        Ok(layer) => {
            store.set_selected_base_layer(layer).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => bad_request(&e),
    }
}

pub async fn toggle_overlay(
    State(AppState { store, .. }): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match id.parse::<Overlay>() {
        Ok(overlay) => {
            let enabled = store.toggle_overlay(overlay).await;
            debug!(%overlay, enabled, "overlay toggled");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => bad_request(&e),
    }
}

/// The message echoes what the client sent, and it goes out as HTML.
fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, clean_text(message)).into_response()
}

pub async fn get_notifications(
    State(AppState { notifications, .. }): State<AppState>,
) -> impl IntoResponse {
    let visible = notifications.visible();
    components::NotificationList {
        notifications: &visible,
    }
    .render()
}

pub async fn dismiss_notification(
    State(AppState { notifications, .. }): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    notifications.dismiss(id);
    ""
}

pub async fn pong() -> impl IntoResponse {
    "pong"
}
