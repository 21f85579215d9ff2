use super::{notify::Notifications, store::MapStore};
use chrono::{DateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::HashMap, fmt::Display, str::FromStr, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MapStore>,
    pub notifications: Arc<Notifications>,
}

/// One tax-sale property, exactly as the catalog endpoint serves it. Money is
/// kept as display strings; we never do arithmetic on it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertyRecord {
    pub sale_date: String,
    pub sale_time: String,
    pub sale_location: String,
    pub cause_number: Option<String>,
    #[serde(rename = "saleID")]
    pub sale_id: String,
    pub defendant_name: String,
    pub owner_name: String,
    pub property_street: String,
    pub property_city: String,
    pub property_zip: String,
    #[serde(rename = "propertyID")]
    pub property_id: String,
    pub plaintiff_name: String,
    pub attorney_name: String,
    pub judgment_amount: Option<String>,
    pub minimum_bid: String,
    pub sale_result: String,
    pub legal: String,
    pub sell_redeem_together: String,
    pub display_sale_id: String,
    pub county: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl PropertyRecord {
    /// Where to put the marker. A zero coordinate is as good as missing;
    /// the geocoder upstream writes 0 when it gives up.
    pub fn coordinates(&self) -> Option<LatLng> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => {
                Some(LatLng { lat, lng })
            }
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
    #[default]
    Unset,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::High => Some("high"),
            Self::Medium => Some("medium"),
            Self::Low => Some("low"),
            Self::Unset => None,
        }
    }
    pub fn get_display_name(&self) -> &'static str {
        match self {
            Self::High => "High Priority",
            Self::Medium => "Medium Priority",
            Self::Low => "Low Priority",
            Self::Unset => "No Priority",
        }
    }
    pub fn color(&self) -> Option<&'static str> {
        match self {
            Self::High => Some("#ef4444"),
            Self::Medium => Some("#eab308"),
            Self::Low => Some("#9ca3af"),
            Self::Unset => None,
        }
    }
}

impl FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "" | "none" => Ok(Self::Unset),
            other => Err(format!("{other} is not a valid priority")),
        }
    }
}

/// On the wire a priority is a nullable lowercase string.
impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Self::Unset),
            Some(raw) => raw.parse().map_err(D::Error::custom),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub priority: Priority,
    pub comment: String,
    pub visited: bool,
    pub user_id: String,
    pub property_id: String,
    pub last_updated: DateTime<Utc>,
}

impl Note {
    /// What a note looks like before anybody has touched it.
    pub fn blank(property_id: &str, user_id: &str) -> Self {
        Self {
            priority: Priority::Unset,
            comment: String::new(),
            visited: false,
            user_id: user_id.to_string(),
            property_id: property_id.to_string(),
            last_updated: Utc::now(),
        }
    }
    /// Two notes are the same annotation if the user-editable parts match;
    /// timestamps don't count.
    pub fn same_fields(&self, other: &Note) -> bool {
        self.priority == other.priority
            && self.comment == other.comment
            && self.visited == other.visited
    }
    pub fn remote_id(&self) -> String {
        note_remote_id(&self.property_id, &self.user_id)
    }
    pub fn to_payload(&self) -> NotePayload {
        NotePayload {
            id: self.remote_id(),
            property_id: self.property_id.clone(),
            user_id: self.user_id.clone(),
            priority: self.priority,
            comment: self.comment.clone(),
            updated_at: self.last_updated.timestamp_millis(),
            visited: self.visited,
        }
    }
}

/// The backend addresses a note as `{propertyId}|{userId}`.
pub fn note_remote_id(property_id: &str, user_id: &str) -> String {
    format!("{property_id}|{user_id}")
}

/// Body of the note upsert calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    pub id: String,
    pub property_id: String,
    pub user_id: String,
    pub priority: Priority,
    pub comment: String,
    /// Epoch milliseconds
    pub updated_at: i64,
    pub visited: bool,
}

/// Partial update for [crate::store::MapStore::set_note]; `None` fields are
/// left alone.
#[derive(Clone, Debug, Default)]
pub struct NoteEdit {
    pub priority: Option<Priority>,
    pub comment: Option<String>,
    pub visited: Option<bool>,
}

type NoteMap = HashMap<String, HashMap<String, Note>>;

/// propertyId -> userId -> note. There is never an empty inner map; removing
/// the last note for a property removes the property too.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "NoteMap", into = "NoteMap")]
pub struct AnnotationTable(NoteMap);

impl AnnotationTable {
    pub fn get(&self, property_id: &str, user_id: &str) -> Option<&Note> {
        self.0.get(property_id).and_then(|users| users.get(user_id))
    }
    pub fn insert(&mut self, note: Note) {
        self.0
            .entry(note.property_id.clone())
            .or_default()
            .insert(note.user_id.clone(), note);
    }
    pub fn remove(&mut self, property_id: &str, user_id: &str) -> Option<Note> {
        let users = self.0.get_mut(property_id)?;
        let removed = users.remove(user_id);
        if users.is_empty() {
            self.0.remove(property_id);
        }
        removed
    }
    pub fn contains_property(&self, property_id: &str) -> bool {
        self.0.contains_key(property_id)
    }
    /// Every note the given user has written.
    pub fn for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = &'a Note> + 'a {
        self.0.values().filter_map(move |users| users.get(user_id))
    }
}

impl From<NoteMap> for AnnotationTable {
    fn from(mut map: NoteMap) -> Self {
        map.retain(|_, users| !users.is_empty());
        Self(map)
    }
}

impl From<AnnotationTable> for NoteMap {
    fn from(table: AnnotationTable) -> Self {
        table.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseLayer {
    #[default]
    Streets,
    Satellite,
    Terrain,
}

impl BaseLayer {
    pub const ALL: [BaseLayer; 3] =
        [BaseLayer::Streets, BaseLayer::Satellite, BaseLayer::Terrain];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Streets => "streets",
            Self::Satellite => "satellite",
            Self::Terrain => "terrain",
        }
    }
    pub fn get_display_name(&self) -> &'static str {
        match self {
            Self::Streets => "Streets",
            Self::Satellite => "Satellite",
            Self::Terrain => "Terrain",
        }
    }
    pub fn tile_url(&self) -> &'static str {
        match self {
            Self::Streets => "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            Self::Satellite => "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
            Self::Terrain => "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
        }
    }
    pub fn attribution(&self) -> &'static str {
        match self {
            Self::Streets => r#"&copy; <a href="https://www.openstreetmap.org/copyright">OpenStreetMap</a> contributors"#,
            Self::Satellite => r#"&copy; <a href="https://www.esri.com">Esri</a>"#,
            Self::Terrain => r#"&copy; <a href="https://opentopomap.org">OpenTopoMap</a> contributors"#,
        }
    }
}

impl FromStr for BaseLayer {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.id() == s)
            .ok_or_else(|| format!("{s} is not a base layer"))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overlay {
    Parcels,
    Zoning,
    Flood,
}

impl Overlay {
    pub const ALL: [Overlay; 3] = [Overlay::Parcels, Overlay::Zoning, Overlay::Flood];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Parcels => "parcels",
            Self::Zoning => "zoning",
            Self::Flood => "flood",
        }
    }
    pub fn get_display_name(&self) -> &'static str {
        match self {
            Self::Parcels => "Parcel Boundaries",
            Self::Zoning => "Zoning",
            Self::Flood => "Flood Zones",
        }
    }
    pub fn wms_url(&self) -> &'static str {
        match self {
            Self::Parcels => "https://gis.vigo.in.gov/gis/rest/services/Parcel/MapServer/WMSServer",
            Self::Zoning => "https://gis.vigo.in.gov/gis/rest/services/Zoning/MapServer/WMSServer",
            Self::Flood => "https://hazards.fema.gov/gis/nfhl/rest/services/public/NFHL/MapServer/WMSServer",
        }
    }
    pub fn opacity(&self) -> f64 {
        match self {
            Self::Parcels => 0.7,
            Self::Zoning => 0.6,
            Self::Flood => 0.5,
        }
    }
}

impl FromStr for Overlay {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.id() == s)
            .ok_or_else(|| format!("{s} is not an overlay"))
    }
}

impl Display for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}
