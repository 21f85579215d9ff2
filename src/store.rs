//! `MapStore` is the one place the dashboard's state lives: the catalog, the
//! user's notes, the viewport, the current selection and the map layer
//! preferences. Handlers only ever read a [Snapshot] or call one of the
//! mutation methods below.
//!
//! Explicit note edits are confirmed by the backend before they are
//! committed locally. Marking a property visited is the exception: the note
//! is committed immediately and the backend is told in the background.

use super::{
    api::{ApiError, Backend},
    catalog::{partition_by_visited, Catalog, Partition},
    config,
    models::{
        AnnotationTable, BaseLayer, LatLng, Note, NoteEdit, Overlay, Viewport,
    },
    persist::{PersistedState, StateStorage},
};
use anyhow::Result;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct StoreState {
    viewport: Arc<Viewport>,
    catalog: Catalog,
    notes: Arc<AnnotationTable>,
    selected_property_id: Option<String>,
    selected_base_layer: BaseLayer,
    enabled_overlays: Vec<Overlay>,
}

impl StoreState {
    fn from_persisted(persisted: PersistedState) -> Self {
        let (lat, lng) = config::DEFAULT_CENTER;
        Self {
            viewport: Arc::new(Viewport {
                center: LatLng { lat, lng },
                zoom: config::DEFAULT_ZOOM,
            }),
            catalog: Catalog::default(),
            notes: Arc::new(persisted.property_notes),
            selected_property_id: None,
            selected_base_layer: persisted.selected_base_layer,
            enabled_overlays: persisted.enabled_overlays,
        }
    }
}

/// A consistent, cheap-to-clone read of the store.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub user_id: String,
    pub viewport: Arc<Viewport>,
    pub catalog: Catalog,
    pub notes: Arc<AnnotationTable>,
    pub selected_property_id: Option<String>,
    pub selected_base_layer: BaseLayer,
    pub enabled_overlays: Vec<Overlay>,
}

impl Snapshot {
    /// The active user's note on a property.
    pub fn note(&self, property_id: &str) -> Option<&Note> {
        self.notes.get(property_id, &self.user_id)
    }
    pub fn partition(&self) -> Partition<'_> {
        partition_by_visited(&self.catalog.properties, &self.notes, &self.user_id)
    }
}

pub struct MapStore {
    user_id: String,
    backend: Arc<dyn Backend>,
    storage: Arc<dyn StateStorage>,
    state: Mutex<StoreState>,
    /// Held while a snapshot is taken and written, so saves land in order.
    save_lock: tokio::sync::Mutex<()>,
}

impl MapStore {
    /// Build the store from whatever `storage` has saved.
    pub async fn open(
        user_id: &str,
        backend: Arc<dyn Backend>,
        storage: Arc<dyn StateStorage>,
    ) -> Result<Self> {
        let persisted = storage.load().await?.unwrap_or_default();
        info!(
            user_id,
            notes = persisted.property_notes.for_user(user_id).count(),
            "store opened"
        );
        Ok(Self {
            user_id: user_id.to_string(),
            backend,
            storage,
            state: Mutex::new(StoreState::from_persisted(persisted)),
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            user_id: self.user_id.clone(),
            viewport: state.viewport.clone(),
            catalog: state.catalog.clone(),
            notes: state.notes.clone(),
            selected_property_id: state.selected_property_id.clone(),
            selected_base_layer: state.selected_base_layer,
            enabled_overlays: state.enabled_overlays.clone(),
        }
    }

    pub fn note(&self, property_id: &str) -> Option<Note> {
        self.lock().notes.get(property_id, &self.user_id).cloned()
    }

    pub fn viewport(&self) -> Arc<Viewport> {
        self.lock().viewport.clone()
    }

    /// Merge `edit` onto the current note and write it to the backend. Local
    /// state only changes once the backend has accepted the write. Returns
    /// `Ok(false)` without any network traffic when the edit changes
    /// nothing.
    pub async fn set_note(
        &self,
        property_id: &str,
        edit: NoteEdit,
    ) -> Result<bool, ApiError> {
        let (current, next) = {
            let state = self.lock();
            let current = state
                .notes
                .get(property_id, &self.user_id)
                .cloned()
                .unwrap_or_else(|| Note::blank(property_id, &self.user_id));
            let mut next = current.clone();
            if let Some(priority) = edit.priority {
                next.priority = priority;
            }
            if let Some(comment) = edit.comment {
                next.comment = comment;
            }
            if let Some(visited) = edit.visited {
                next.visited = visited;
            }
            next.last_updated = Utc::now();
            (current, next)
        };
        if current.same_fields(&next) {
            debug!(property_id, "note unchanged, skipping write");
            return Ok(false);
        }

        self.backend.put_note(&next.to_payload()).await?;

        info!(property_id, priority = ?next.priority, visited = next.visited, "note saved");
        Arc::make_mut(&mut self.lock().notes).insert(next);
        self.persist().await;
        Ok(true)
    }

    /// Flag a property as visited. The note is committed right away; the
    /// backend write runs on its own task and a failure there is only
    /// logged. Returns `None` if the property was already visited, otherwise
    /// the handle of that background write.
    pub async fn mark_visited(&self, property_id: &str) -> Option<JoinHandle<()>> {
        let note = {
            let mut state = self.lock();
            let mut note = state
                .notes
                .get(property_id, &self.user_id)
                .cloned()
                .unwrap_or_else(|| Note::blank(property_id, &self.user_id));
            if note.visited {
                return None;
            }
            note.visited = true;
            note.last_updated = Utc::now();
            Arc::make_mut(&mut state.notes).insert(note.clone());
            note
        };
        info!(property_id, "marked visited");
        self.persist().await;

        let backend = self.backend.clone();
        let payload = note.to_payload();
        Some(tokio::spawn(async move {
            if let Err(e) = backend.post_note(&payload).await {
                error!(
                    property_id = %payload.property_id,
                    "Failed to mark property as visited: {e}"
                );
            }
        }))
    }

    /// Delete the note upstream, then locally. If the backend refuses, the
    /// local note stays.
    pub async fn reset_note(&self, property_id: &str) -> Result<(), ApiError> {
        self.backend
            .delete_note(property_id, &self.user_id)
            .await?;

        let removed = Arc::make_mut(&mut self.lock().notes)
            .remove(property_id, &self.user_id);
        info!(property_id, had_note = removed.is_some(), "note reset");
        self.persist().await;
        Ok(())
    }

    pub fn set_selected_property(&self, property_id: Option<String>) {
        self.lock().selected_property_id = property_id;
    }

    /// Returns `false` (and keeps the current viewport allocation) when
    /// nothing moved.
    pub fn set_map_state(&self, center: LatLng, zoom: f64) -> bool {
        let mut state = self.lock();
        if state.viewport.center == center && state.viewport.zoom == zoom {
            return false;
        }
        state.viewport = Arc::new(Viewport { center, zoom });
        true
    }

    pub async fn set_selected_base_layer(&self, layer: BaseLayer) {
        self.lock().selected_base_layer = layer;
        self.persist().await;
    }

    /// Returns whether the overlay is enabled afterwards.
    pub async fn toggle_overlay(&self, overlay: Overlay) -> bool {
        let enabled = {
            let mut state = self.lock();
            if state.enabled_overlays.contains(&overlay) {
                state.enabled_overlays.retain(|o| *o != overlay);
                false
            } else {
                state.enabled_overlays.push(overlay);
                true
            }
        };
        self.persist().await;
        enabled
    }

    /// Load the catalog. Failures end up in the catalog's `error` rather
    /// than being returned; the page renders them.
    pub async fn fetch_properties(&self) {
        self.lock().catalog.begin_fetch();
        let result = self.backend.fetch_properties().await;
        self.lock().catalog.finish_fetch(result);
    }

    async fn persist(&self) {
        let _guard = self.save_lock.lock().await;
        let persisted = {
            let state = self.lock();
            PersistedState {
                property_notes: state.notes.as_ref().clone(),
                selected_base_layer: state.selected_base_layer,
                enabled_overlays: state.enabled_overlays.clone(),
            }
        };
        if let Err(e) = self.storage.save(&persisted).await {
            warn!("failed to save {}: {e:#}", config::STORAGE_NAME);
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::ApiClient,
        models::Priority,
        notify::Notifications,
        persist::MemoryStorage,
        testing::{property, Call, FakeBackend},
    };
    use axum::{
        extract::{Path, State},
        routing::{get, put},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::{net::SocketAddr, time::Duration};

    const USER: &str = "greg@cloudseeder.com";

    async fn store_with(
        backend: Arc<FakeBackend>,
        storage: Arc<MemoryStorage>,
    ) -> MapStore {
        MapStore::open(USER, backend, storage)
            .await
            .expect("store opens")
    }

    async fn fresh() -> (MapStore, Arc<FakeBackend>, Arc<MemoryStorage>) {
        let backend = Arc::new(FakeBackend::with_catalog(vec![property("P1")]));
        let storage = Arc::new(MemoryStorage::default());
        (
            store_with(backend.clone(), storage.clone()).await,
            backend,
            storage,
        )
    }

    fn priority(p: Priority) -> NoteEdit {
        NoteEdit {
            priority: Some(p),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_set_note_writes_then_commits() {
        let (store, backend, storage) = fresh().await;

        assert_eq!(store.set_note("P1", priority(Priority::High)).await, Ok(true));

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        let Call::Put(payload) = &calls[0] else {
            panic!("expected a put, got {calls:?}");
        };
        assert_eq!(payload.id, format!("P1|{USER}"));
        assert_eq!(payload.priority, Priority::High);
        assert!(!payload.visited);

        let note = store.note("P1").expect("note exists");
        assert_eq!(note.priority, Priority::High);
        assert!(!note.visited);
        assert_eq!(note.comment, "");
        assert_eq!(
            storage.saved().unwrap().property_notes.get("P1", USER),
            Some(&note)
        );
    }

    #[tokio::test]
    async fn test_identical_edits_only_write_once() {
        let (store, backend, _) = fresh().await;

        for _ in 0..3 {
            store.set_note("P1", priority(Priority::Low)).await.unwrap();
        }
        assert_eq!(backend.calls().len(), 1);

        // an edit that restates the blank note writes nothing at all
        store
            .set_note(
                "P2",
                NoteEdit {
                    priority: Some(Priority::Unset),
                    comment: Some(String::new()),
                    visited: Some(false),
                },
            )
            .await
            .unwrap();
        assert_eq!(backend.calls().len(), 1);
        assert!(store.note("P2").is_none());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_note_alone() {
        let (store, backend, storage) = fresh().await;
        store.set_note("P1", priority(Priority::Medium)).await.unwrap();
        let before = store.note("P1");

        backend.fail_notes(Some(ApiError::Server(500)));
        let result = store
            .set_note(
                "P1",
                NoteEdit {
                    comment: Some("roof caved in".into()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(result, Err(ApiError::Server(500)));
        assert_eq!(store.note("P1"), before);
        assert_eq!(storage.save_count(), 1);
    }

    #[tokio::test]
    async fn test_set_note_does_not_force_visited() {
        let (store, _, _) = fresh().await;
        store
            .set_note(
                "P1",
                NoteEdit {
                    comment: Some("vacant lot".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!store.note("P1").unwrap().visited);
    }

    #[tokio::test]
    async fn test_mark_visited_is_idempotent() {
        let (store, backend, _) = fresh().await;

        let handle = store.mark_visited("P1").await.expect("first visit");
        handle.await.unwrap();
        assert!(store.mark_visited("P1").await.is_none());

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        let Call::Post(payload) = &calls[0] else {
            panic!("expected a post, got {calls:?}");
        };
        assert!(payload.visited);
        assert_eq!(payload.priority, Priority::Unset);

        let note = store.note("P1").unwrap();
        assert!(note.visited);
        assert_eq!(note.priority, Priority::Unset);
    }

    #[tokio::test]
    async fn test_mark_visited_survives_backend_failure() {
        let (store, backend, storage) = fresh().await;
        backend.fail_notes(Some(ApiError::Unreachable));

        let handle = store.mark_visited("P1").await.expect("first visit");
        // the failure stays inside the task
        handle.await.unwrap();

        assert!(store.note("P1").unwrap().visited);
        assert!(storage
            .saved()
            .unwrap()
            .property_notes
            .get("P1", USER)
            .unwrap()
            .visited);
    }

    #[tokio::test]
    async fn test_mark_visited_keeps_existing_fields() {
        let (store, _, _) = fresh().await;
        store
            .set_note(
                "P1",
                NoteEdit {
                    priority: Some(Priority::High),
                    comment: Some("corner lot".into()),
                    visited: None,
                },
            )
            .await
            .unwrap();
        store.mark_visited("P1").await.unwrap().await.unwrap();

        let note = store.note("P1").unwrap();
        assert!(note.visited);
        assert_eq!(note.priority, Priority::High);
        assert_eq!(note.comment, "corner lot");
    }

    #[tokio::test]
    async fn test_reset_removes_note_and_property() {
        let (store, backend, storage) = fresh().await;
        store.set_note("P1", priority(Priority::High)).await.unwrap();

        store.reset_note("P1").await.unwrap();

        assert!(store.note("P1").is_none());
        assert!(!store.snapshot().notes.contains_property("P1"));
        assert_eq!(
            backend.calls().last(),
            Some(&Call::Delete {
                property_id: "P1".into(),
                user_id: USER.into()
            })
        );
        assert!(!storage
            .saved()
            .unwrap()
            .property_notes
            .contains_property("P1"));
    }

    #[tokio::test]
    async fn test_reset_keeps_other_users_notes() {
        let mut notes = AnnotationTable::default();
        notes.insert(Note::blank("P1", USER));
        notes.insert(Note::blank("P1", "someone@else.com"));
        let storage = Arc::new(MemoryStorage::with_state(PersistedState {
            property_notes: notes,
            ..Default::default()
        }));
        let backend = Arc::new(FakeBackend::with_catalog(vec![]));
        let store = store_with(backend, storage).await;

        store.reset_note("P1").await.unwrap();
        let snapshot = store.snapshot();
        assert!(snapshot.note("P1").is_none());
        assert!(snapshot.notes.contains_property("P1"));
    }

    #[tokio::test]
    async fn test_failed_reset_keeps_note() {
        let (store, backend, _) = fresh().await;
        store.set_note("P1", priority(Priority::High)).await.unwrap();
        backend.fail_notes(Some(ApiError::NotFound));

        assert_eq!(store.reset_note("P1").await, Err(ApiError::NotFound));
        assert_eq!(store.note("P1").unwrap().priority, Priority::High);
    }

    #[tokio::test]
    async fn test_unchanged_viewport_keeps_identity() {
        let (store, _, _) = fresh().await;
        let center = LatLng {
            lat: 39.47,
            lng: -87.39,
        };
        assert!(store.set_map_state(center, 12.0));
        let before = store.viewport();

        assert!(!store.set_map_state(center, 12.0));
        assert!(Arc::ptr_eq(&before, &store.viewport()));

        assert!(store.set_map_state(center, 13.0));
        assert!(!Arc::ptr_eq(&before, &store.viewport()));
    }

    #[tokio::test]
    async fn test_selection_and_layers() {
        let (store, _, storage) = fresh().await;
        store.set_selected_property(Some("P1".into()));
        assert_eq!(store.snapshot().selected_property_id.as_deref(), Some("P1"));
        store.set_selected_property(None);
        assert_eq!(store.snapshot().selected_property_id, None);

        store.set_selected_base_layer(BaseLayer::Terrain).await;
        assert!(store.toggle_overlay(Overlay::Zoning).await);
        assert!(store.toggle_overlay(Overlay::Flood).await);
        assert!(!store.toggle_overlay(Overlay::Zoning).await);

        let saved = storage.saved().unwrap();
        assert_eq!(saved.selected_base_layer, BaseLayer::Terrain);
        assert_eq!(saved.enabled_overlays, vec![Overlay::Flood]);
    }

    #[tokio::test]
    async fn test_state_is_restored_on_open() {
        let (store, backend, storage) = fresh().await;
        store.set_note("P1", priority(Priority::Low)).await.unwrap();
        store.toggle_overlay(Overlay::Parcels).await;
        store.set_map_state(LatLng { lat: 1.0, lng: 2.0 }, 3.0);

        let reopened = store_with(backend, storage).await;
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.note("P1").unwrap().priority, Priority::Low);
        assert_eq!(snapshot.enabled_overlays, vec![Overlay::Parcels]);
        // the viewport is not persisted
        assert_eq!(snapshot.viewport.zoom, config::DEFAULT_ZOOM);
    }

    #[tokio::test]
    async fn test_fetch_properties() {
        let (store, backend, _) = fresh().await;
        store.fetch_properties().await;
        let snapshot = store.snapshot();
        assert!(!snapshot.catalog.is_loading);
        assert_eq!(snapshot.catalog.error, None);
        assert_eq!(snapshot.catalog.properties.len(), 1);

        backend.set_catalog(Err(ApiError::Unreachable));
        store.fetch_properties().await;
        let snapshot = store.snapshot();
        assert!(!snapshot.catalog.is_loading);
        assert_eq!(
            snapshot.catalog.error.as_deref(),
            Some("Unable to reach the server. Please check your connection.")
        );
    }

    #[tokio::test]
    async fn test_partition_tracks_visits() {
        let backend = Arc::new(FakeBackend::with_catalog(vec![
            property("P1"),
            property("P2"),
        ]));
        let store = store_with(backend, Arc::new(MemoryStorage::default())).await;
        store.fetch_properties().await;
        store.mark_visited("P2").await;

        let snapshot = store.snapshot();
        let partition = snapshot.partition();
        assert_eq!(partition.visited.len(), 1);
        assert_eq!(partition.visited[0].property_id, "P2");
        assert_eq!(partition.unvisited[0].property_id, "P1");
    }

    /// Drive the store through the real gateway against a tiny backend that
    /// remembers what it was sent.
    #[tokio::test]
    async fn test_priority_edit_reaches_backend() {
        type Seen = Arc<Mutex<Vec<(String, Value)>>>;
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/sri-data-list",
                get(|| async {
                    Json(json!([{ "propertyID": "P1", "saleID": "S1" }]))
                }),
            )
            .route(
                "/property-note/:id",
                put(
                    |State(seen): State<Seen>,
                     Path(id): Path<String>,
                     Json(body): Json<Value>| async move {
                        seen.lock().unwrap().push((id, body.clone()));
                        Json(body)
                    },
                ),
            )
            .with_state(seen.clone());
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(app.into_make_service());
        let base = format!("http://{}", server.local_addr());
        tokio::spawn(server);

        let api = ApiClient::new(
            &base,
            "/sri-data-list",
            Duration::from_secs(5),
            Arc::new(Notifications::default()),
        )
        .unwrap();
        let store = MapStore::open(USER, Arc::new(api), Arc::new(MemoryStorage::default()))
            .await
            .unwrap();

        store.fetch_properties().await;
        assert_eq!(store.snapshot().catalog.properties[0].sale_id, "S1");

        store.set_note("P1", priority(Priority::High)).await.unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, format!("P1|{USER}"));
        assert_eq!(seen[0].1["priority"], "high");
        assert_eq!(seen[0].1["visited"], false);
        assert_eq!(store.note("P1").unwrap().priority, Priority::High);
    }
}
