use super::{controllers, models};
use axum::routing::{delete, get, post, Router};

#[rustfmt::skip]
pub fn get_routes() -> Router<models::AppState> {
    Router::new()
        .route("/", get(controllers::root))
        .route("/ping", get(controllers::pong))
        .route("/dashboard", get(controllers::dashboard))
        .route("/view/:view", get(controllers::main_view))
        .route("/drawer", get(controllers::drawer))
        .route("/properties/refresh", post(controllers::refresh_properties))
        .route("/property/:id/popup", get(controllers::property_popup))
        .route("/property/:id/visit", post(controllers::visit_property))
        .route("/property/:id/note", post(controllers::save_note))
        .route("/property/:id/note", delete(controllers::reset_note))
        .route("/property/:id/select", post(controllers::select_property))
        .route("/map-state", post(controllers::save_map_state))
        .route("/map/markers", get(controllers::get_markers))
        .route("/layers/base", post(controllers::set_base_layer))
        .route("/layers/overlay/:id", post(controllers::toggle_overlay))
        .route("/notifications", get(controllers::get_notifications))
        .route("/notifications/:id", delete(controllers::dismiss_notification))
}
