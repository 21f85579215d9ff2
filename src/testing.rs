//! Fakes shared by the unit tests.

use super::{
    api::{ApiError, Backend},
    models::{NotePayload, PropertyRecord},
};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    FetchProperties,
    Put(NotePayload),
    Post(NotePayload),
    Delete { property_id: String, user_id: String },
}

/// Records every call and answers from canned results.
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    catalog: Mutex<Result<Vec<PropertyRecord>, ApiError>>,
    note_error: Mutex<Option<ApiError>>,
}

impl FakeBackend {
    pub fn with_catalog(properties: Vec<PropertyRecord>) -> Self {
        Self {
            calls: Mutex::new(vec![]),
            catalog: Mutex::new(Ok(properties)),
            note_error: Mutex::new(None),
        }
    }
    pub fn set_catalog(&self, result: Result<Vec<PropertyRecord>, ApiError>) {
        *self.catalog.lock().unwrap() = result;
    }
    /// Make every note call fail with `error` (or succeed again with `None`).
    pub fn fail_notes(&self, error: Option<ApiError>) {
        *self.note_error.lock().unwrap() = error;
    }
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
    fn record(&self, call: Call) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        match self.note_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_properties(&self) -> Result<Vec<PropertyRecord>, ApiError> {
        self.calls.lock().unwrap().push(Call::FetchProperties);
        self.catalog.lock().unwrap().clone()
    }
    async fn put_note(&self, note: &NotePayload) -> Result<(), ApiError> {
        self.record(Call::Put(note.clone()))
    }
    async fn post_note(&self, note: &NotePayload) -> Result<(), ApiError> {
        self.record(Call::Post(note.clone()))
    }
    async fn delete_note(
        &self,
        property_id: &str,
        user_id: &str,
    ) -> Result<(), ApiError> {
        self.record(Call::Delete {
            property_id: property_id.into(),
            user_id: user_id.into(),
        })
    }
}

pub fn property(id: &str) -> PropertyRecord {
    PropertyRecord {
        property_id: id.into(),
        sale_id: format!("S-{id}"),
        sale_date: "2024-05-01".into(),
        property_street: format!("{id} Wabash Ave"),
        property_city: "Terre Haute".into(),
        property_zip: "47807".into(),
        owner_name: "J. Doe".into(),
        minimum_bid: "$400.00".into(),
        county: "Vigo".into(),
        latitude: Some(39.46),
        longitude: Some(-87.41),
        ..Default::default()
    }
}
