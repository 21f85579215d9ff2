use super::{
    api::ApiError,
    models::{AnnotationTable, PropertyRecord},
};
use std::sync::Arc;
use tracing::{info, warn};

/// The property list for this session, plus where we are in fetching it.
/// The list is only ever replaced wholesale.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub properties: Arc<Vec<PropertyRecord>>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Catalog {
    pub fn begin_fetch(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    /// A response that arrives after a newer fetch started still wins;
    /// there is no request generation to compare against.
    pub fn finish_fetch(&mut self, result: Result<Vec<PropertyRecord>, ApiError>) {
        match result {
            Ok(properties) => {
                info!(count = properties.len(), "catalog loaded");
                self.properties = Arc::new(properties);
            }
            Err(e) => {
                warn!("catalog fetch failed: {e}");
                self.error = Some(e.to_string());
            }
        }
        self.is_loading = false;
    }

    pub fn find(&self, property_id: &str) -> Option<&PropertyRecord> {
        self.properties.iter().find(|p| p.property_id == property_id)
    }
}

pub struct Partition<'a> {
    pub visited: Vec<&'a PropertyRecord>,
    pub unvisited: Vec<&'a PropertyRecord>,
}

/// Split the catalog by whether `user_id` has visited each property. Every
/// property lands in exactly one side, in catalog order.
pub fn partition_by_visited<'a>(
    properties: &'a [PropertyRecord],
    notes: &AnnotationTable,
    user_id: &str,
) -> Partition<'a> {
    let (visited, unvisited): (Vec<_>, Vec<_>) =
        properties.iter().partition(|p| {
            notes
                .get(&p.property_id, user_id)
                .is_some_and(|n| n.visited)
        });
    Partition { visited, unvisited }
}
