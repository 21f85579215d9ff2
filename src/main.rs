use anyhow::Result;
use axum::middleware::from_fn;
use dotenvy::dotenv;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod catalog;
mod components;
mod config;
mod controllers;
mod errors;
mod htmx;
mod middleware;
mod models;
mod notify;
mod persist;
mod routes;
mod store;
#[cfg(test)]
mod testing;

/// `SCOUT_STATE_FILE=:memory:` keeps notes for the life of the process only.
const IN_MEMORY: &str = ":memory:";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scout=info,tower_http=info")),
        )
        .init();

    let config = config::Config::load();
    let notifications = Arc::new(notify::Notifications::default());
    let backend = Arc::new(api::ApiClient::new(
        &config.api_base_url,
        &config.catalog_path,
        config.request_timeout,
        notifications.clone(),
    )?);
    info!(base_url = %backend.base_url(), "api gateway ready");
    let storage: Arc<dyn persist::StateStorage> =
        if config.state_file.as_os_str() == IN_MEMORY {
            Arc::new(persist::MemoryStorage::default())
        } else {
            Arc::new(persist::JsonFileStorage::new(&config.state_file))
        };
    let store =
        Arc::new(store::MapStore::open(&config.user_id, backend, storage).await?);

    let initial_fetch = store.clone();
    tokio::spawn(async move { initial_fetch.fetch_properties().await });

    let state = models::AppState {
        store,
        notifications,
    };
    let app = routes::get_routes()
        .layer(from_fn(middleware::html_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
