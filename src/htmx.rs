/// HTMX utils
use axum::http::{HeaderMap, HeaderValue};
use serde_json::{json, Map, Value};

const TRIGGER: &str = "Hx-Trigger";

/// Fired whenever the user's notes change; the drawer and the map markers
/// listen for it.
pub const NOTES_CHANGED: &str = "notes-changed";

/// Fired when a property is picked from the drawer; the map recenters on it.
pub const SELECT_PROPERTY: &str = "select-property";

/// Add `event_name` to the Hx-Trigger header, keeping any events already
/// there.
pub fn trigger_event(headers: HeaderMap, event_name: &str) -> HeaderMap {
    trigger_event_with(headers, event_name, Value::Null)
}

/// Like [trigger_event], with a `detail` payload for the client side
/// listener. Once any event carries details the header switches to the JSON
/// form, which can also carry the plain events.
pub fn trigger_event_with(
    mut headers: HeaderMap,
    event_name: &str,
    detail: Value,
) -> HeaderMap {
    let mut events = Map::new();
    if let Some(existing) = headers.get(TRIGGER).and_then(|v| v.to_str().ok()) {
        match serde_json::from_str::<Map<String, Value>>(existing) {
            Ok(parsed) => events = parsed,
            Err(_) => {
                for name in existing.split(',').map(str::trim) {
                    if !name.is_empty() {
                        events.insert(name.to_string(), Value::Null);
                    }
                }
            }
        }
    }
    events.insert(event_name.to_string(), detail);

    let header = if events.values().all(Value::is_null) {
        events.keys().cloned().collect::<Vec<String>>().join(", ")
    } else {
        json!(events).to_string()
    };
    if let Ok(value) = HeaderValue::from_str(&header) {
        headers.insert(TRIGGER, value);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_events_accumulate() {
        let headers = trigger_event(HeaderMap::new(), "a");
        let headers = trigger_event(headers, "b");
        assert_eq!(headers.get(TRIGGER).unwrap(), "a, b");
    }

    #[test]
    fn test_detail_switches_to_json() {
        let headers = trigger_event(HeaderMap::new(), NOTES_CHANGED);
        let headers =
            trigger_event_with(headers, SELECT_PROPERTY, json!({ "id": "P1" }));
        let raw = headers.get(TRIGGER).unwrap().to_str().unwrap();
        let parsed: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed,
            json!({ "notes-changed": null, "select-property": { "id": "P1" } })
        );
    }
}
