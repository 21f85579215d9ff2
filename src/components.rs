// In many cases, we need to do a let binding to satisfy the borrow checker
// and for some reason, clippy identifies those as unnecessary. Maybe there
// are and clippy knows more than me, maybe not.
#![allow(clippy::let_and_return)]

use super::{
    models::{BaseLayer, Note, Overlay, Priority, PropertyRecord},
    notify::Notification,
    store::Snapshot,
};
use ammonia::{clean, clean_text};
use serde::Serialize;
use std::{fmt::Write, str::FromStr};

pub trait Component {
    /// Render the component to a HTML string. By convention, the
    /// implementation should sanitize all string properties at render-time
    fn render(&self) -> String;
}

/// Marker color for properties that are unvisited, or visited without a
/// priority.
pub const UNVISITED_COLOR: &str = "#4b5563";

const PARCEL_LOOKUP_URL: &str = "https://beacon.schneidercorp.com/Application.aspx?AppID=99&LayerID=962&PageTypeID=4&PageID=611&Q=766879730&KeyValue=";

pub struct Page<'a> {
    pub title: &'a str,
    pub children: Box<dyn Component + 'a>,
}

impl Component for Page<'_> {
    fn render(&self) -> String {
        format!(
            r#"
            <html>
                <head>
                    <meta name="viewport" content="width=device-width, initial-scale=1.0"></meta>
                    <title>{title}</title>
                    <script src="https://cdn.tailwindcss.com"></script>
                    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
                    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
                </head>
                <body hx-boost="true" class="bg-gray-50 overflow-hidden">
                    {body_html}
                    {notifications}
                    <script src="https://unpkg.com/htmx.org@1.9.6"></script>
                    <script>
                        htmx.config.defaultSwapStyle = "outerHTML"
                    </script>
                </body>
            </html>
            "#,
            title = clean(self.title),
            body_html = self.children.render(),
            notifications = NotificationList { notifications: &[] }.render()
        )
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Map,
    Table,
}

impl View {
    fn id(&self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Table => "table",
        }
    }
}

impl FromStr for View {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "map" => Ok(Self::Map),
            "table" => Ok(Self::Table),
            other => Err(format!("{other} is not a view")),
        }
    }
}

/// Everything under the app bar. Stands in for the whole dashboard while
/// the catalog is loading or failed to load.
pub struct Dashboard<'a> {
    pub snapshot: &'a Snapshot,
    pub view: View,
}
impl Component for Dashboard<'_> {
    fn render(&self) -> String {
        let catalog = &self.snapshot.catalog;
        if catalog.is_loading {
            return LoadingState { view: self.view }.render();
        }
        if let Some(error) = &catalog.error {
            return ErrorState {
                message: error,
                view: self.view,
            }
            .render();
        }
        let app_bar = AppBar {}.render();
        let main_panel = MainPanel {
            snapshot: self.snapshot,
            view: self.view,
        }
        .render();
        let drawer = Drawer {
            snapshot: self.snapshot,
            view: self.view,
            oob: false,
        }
        .render();
        format!(
            r#"
            <div id="dashboard" class="flex flex-col h-screen">
                {app_bar}
                <div class="flex flex-1 overflow-hidden">
                    <main id="main-panel" class="flex-1 relative overflow-hidden">
                        {main_panel}
                    </main>
                    {drawer}
                </div>
            </div>
            "#
        )
    }
}

pub struct LoadingState {
    pub view: View,
}
impl Component for LoadingState {
    fn render(&self) -> String {
        let view = self.view.id();
        format!(
            r#"
            <div
                id="dashboard"
                hx-get="/dashboard?view={view}"
                hx-trigger="every 1s"
                class="flex h-screen items-center justify-center"
            >
                <div class="w-10 h-10 rounded-full border-4 border-gray-300 border-t-gray-600 animate-spin"></div>
            </div>
            "#
        )
    }
}

pub struct ErrorState<'a> {
    pub message: &'a str,
    /// Where Retry lands once the catalog loads.
    pub view: View,
}
impl Component for ErrorState<'_> {
    fn render(&self) -> String {
        let message = clean(self.message);
        let view = self.view.id();
        format!(
            r#"
            <div id="dashboard" class="flex flex-col gap-4 h-screen items-center justify-center">
                <h2 class="text-lg text-red-600">Error loading properties</h2>
                <p class="text-gray-500">{message}</p>
                <button
                    hx-post="/properties/refresh?view={view}"
                    hx-target="closest div"
                    class="px-4 py-2 rounded bg-gray-600 text-white shadow hover:bg-gray-700"
                >Retry</button>
            </div>
            "#
        )
    }
}

pub struct AppBar;
impl Component for AppBar {
    fn render(&self) -> String {
        r#"
        <header class="flex items-center justify-between h-16 px-4 bg-gray-600 text-white shadow">
            <h1 class="text-xl flex items-center gap-2">PropertyScout.AI</h1>
            <div class="flex items-center justify-center w-8 h-8 rounded-full bg-red-600">U</div>
        </header>
        "#
        .to_string()
    }
}

pub struct MainPanel<'a> {
    pub snapshot: &'a Snapshot,
    pub view: View,
}
impl Component for MainPanel<'_> {
    fn render(&self) -> String {
        match self.view {
            View::Map => PropertyMap {
                snapshot: self.snapshot,
            }
            .render(),
            View::Table => PropertyTable {
                snapshot: self.snapshot,
            }
            .render(),
        }
    }
}

pub struct Drawer<'a> {
    pub snapshot: &'a Snapshot,
    pub view: View,
    /// Render for an out-of-band swap alongside some other fragment.
    pub oob: bool,
}
impl Component for Drawer<'_> {
    fn render(&self) -> String {
        let partition = self.snapshot.partition();
        let toggle = ViewToggle { current: self.view }.render();
        let unvisited_count = partition.unvisited.len();
        let visited_count = partition.visited.len();
        let unvisited = partition
            .unvisited
            .iter()
            .map(|p| DrawerItem { property: p, note: None }.render())
            .collect::<Vec<String>>()
            .join("");
        let visited = partition
            .visited
            .iter()
            .map(|p| {
                DrawerItem {
                    property: p,
                    note: self.snapshot.note(&p.property_id),
                }
                .render()
            })
            .collect::<Vec<String>>()
            .join("");
        let view = self.view.id();
        let oob = if self.oob { r#"hx-swap-oob="true""# } else { "" };
        format!(
            r#"
            <aside
                id="drawer"
                {oob}
                hx-get="/drawer?view={view}"
                hx-trigger="notes-changed from:body"
                class="w-60 shrink-0 overflow-y-auto border-l bg-white"
            >
                {toggle}
                <h3 class="px-4 pt-4 text-sm text-gray-500">Unvisited Properties ({unvisited_count})</h3>
                <ul>{unvisited}</ul>
                <h3 class="px-4 pt-4 text-sm text-gray-500">Visited Properties ({visited_count})</h3>
                <ul>{visited}</ul>
            </aside>
            "#
        )
    }
}

struct ViewToggle {
    current: View,
}
impl Component for ViewToggle {
    fn render(&self) -> String {
        let button = |view: View, label: &str| {
            let id = view.id();
            let style = if view == self.current {
                "bg-gray-600 text-white"
            } else {
                "bg-white hover:bg-gray-100"
            };
            format!(
                r##"
                <button
                    hx-get="/view/{id}"
                    hx-target="#main-panel"
                    hx-swap="innerHTML"
                    class="w-full px-3 py-1 border rounded {style}"
                >{label}</button>
                "##
            )
        };
        format!(
            r#"
            <div class="flex flex-col gap-1 p-4 border-b">
                {map}
                {table}
            </div>
            "#,
            map = button(View::Map, "Map View"),
            table = button(View::Table, "Table View"),
        )
    }
}

struct DrawerItem<'a> {
    property: &'a PropertyRecord,
    /// Only present for visited properties.
    note: Option<&'a Note>,
}
impl Component for DrawerItem<'_> {
    fn render(&self) -> String {
        let id = clean_text(&self.property.property_id);
        let street = clean(&self.property.property_street);
        let city = clean(&self.property.property_city);
        let (icon, last_updated) = match self.note {
            Some(note) => {
                let color = note.priority.color().unwrap_or(UNVISITED_COLOR);
                (
                    format!(r#"<span style="color: {color}">&#10004;</span>"#),
                    format!(
                        r#"<br /><span class="text-gray-400">Last updated: {}</span>"#,
                        note.last_updated.format("%-m/%-d/%Y")
                    ),
                )
            }
            None => ("&#9675;".to_string(), String::new()),
        };
        format!(
            r#"
            <li
                hx-post="/property/{id}/select"
                hx-swap="none"
                class="flex gap-3 px-4 py-1 cursor-pointer hover:bg-gray-100"
            >
                <span class="w-4">{icon}</span>
                <div>
                    <p class="text-sm">{street}</p>
                    <p class="text-xs text-gray-500">{city}{last_updated}</p>
                </div>
            </li>
            "#
        )
    }
}

/// Color of a property's map marker.
pub fn marker_color(note: Option<&Note>) -> &'static str {
    match note {
        Some(note) if note.visited => note.priority.color().unwrap_or(UNVISITED_COLOR),
        _ => UNVISITED_COLOR,
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub property_id: String,
    pub sale_id: String,
    pub lat: f64,
    pub lng: f64,
    pub color: &'static str,
}

/// One marker per sale that has coordinates.
pub fn markers(snapshot: &Snapshot) -> Vec<Marker> {
    snapshot
        .catalog
        .properties
        .iter()
        .filter_map(|p| {
            let at = p.coordinates()?;
            Some(Marker {
                property_id: p.property_id.clone(),
                sale_id: p.sale_id.clone(),
                lat: at.lat,
                lng: at.lng,
                color: marker_color(snapshot.note(&p.property_id)),
            })
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TileConfig {
    id: &'static str,
    name: &'static str,
    url: &'static str,
    attribution: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OverlayConfig {
    id: &'static str,
    name: &'static str,
    url: &'static str,
    opacity: f64,
    enabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapConfig<'a> {
    center: [f64; 2],
    zoom: f64,
    selected: Option<&'a str>,
    selected_base_layer: &'static str,
    base_layers: Vec<TileConfig>,
    overlays: Vec<OverlayConfig>,
}

/// JSON that is safe to drop inside a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "{}".into())
        .replace("</", "<\\/")
}

const MAP_SCRIPT: &str = r##"
<script>
(() => {
    if (window.scoutMapCleanup) window.scoutMapCleanup();
    const config = JSON.parse(document.getElementById('map-config').textContent);
    const map = L.map('map').setView(config.center, config.zoom);

    const baseLayers = {};
    for (const layer of config.baseLayers) {
        const tiles = L.tileLayer(layer.url, { attribution: layer.attribution, layerId: layer.id });
        baseLayers[layer.name] = tiles;
        if (layer.id === config.selectedBaseLayer) tiles.addTo(map);
    }
    const overlays = {};
    for (const overlay of config.overlays) {
        const wms = L.tileLayer.wms(overlay.url, {
            layers: '0', format: 'image/png', transparent: true,
            opacity: overlay.opacity, layerId: overlay.id,
        });
        overlays[overlay.name] = wms;
        if (overlay.enabled) wms.addTo(map);
    }
    L.control.layers(baseLayers, overlays, { position: 'topright' }).addTo(map);

    const post = (path, values) => htmx.ajax('POST', path, { values: values || {}, swap: 'none' });
    map.on('baselayerchange', (e) => post('/layers/base', { layer: e.layer.options.layerId }));
    map.on('overlayadd overlayremove', (e) =>
        post('/layers/overlay/' + encodeURIComponent(e.layer.options.layerId)));
    map.on('moveend zoomend', () => {
        const c = map.getCenter();
        post('/map-state', { lat: c.lat, lng: c.lng, zoom: map.getZoom() });
    });

    const icon = (color) => L.icon({
        iconUrl: 'data:image/svg+xml;base64,' + btoa(
            '<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 41">' +
            '<path fill="' + color + '" stroke="#000" stroke-width="1" ' +
            'd="M12 2C8.13 2 5 5.13 5 9c0 5.25 7 13 7 13s7-7.75 7-13c0-3.87-3.13-7-7-7z"/></svg>'),
        iconSize: [24, 41],
        iconAnchor: [12, 41],
        popupAnchor: [0, -34],
    });
    const bySale = {};
    const byProperty = {};
    const focus = (propertyId) => {
        const marker = byProperty[propertyId];
        if (!marker) return;
        map.setView(marker.getLatLng(), map.getZoom());
        marker.openPopup();
    };
    const loadMarkers = async () => {
        const response = await fetch('/map/markers');
        for (const m of await response.json()) {
            const existing = bySale[m.saleId];
            if (existing) {
                existing.setIcon(icon(m.color));
                continue;
            }
            const marker = L.marker([m.lat, m.lng], { icon: icon(m.color) }).addTo(map);
            const body = document.createElement('div');
            body.className = 'min-w-[300px]';
            body.textContent = 'Loading...';
            marker.bindPopup(body, { maxWidth: 400 });
            const base = '/property/' + encodeURIComponent(m.propertyId);
            marker.on('popupopen', () => {
                htmx.ajax('GET', base + '/popup', { target: body, swap: 'innerHTML' });
                post(base + '/visit');
            });
            bySale[m.saleId] = marker;
            byProperty[m.propertyId] = marker;
        }
    };
    const onSelect = (e) => focus(e.detail.id);
    document.body.addEventListener('notes-changed', loadMarkers);
    document.body.addEventListener('select-property', onSelect);
    window.scoutMapCleanup = () => {
        document.body.removeEventListener('notes-changed', loadMarkers);
        document.body.removeEventListener('select-property', onSelect);
        map.remove();
    };
    loadMarkers().then(() => { if (config.selected) focus(config.selected); });
})();
</script>
"##;

pub struct PropertyMap<'a> {
    pub snapshot: &'a Snapshot,
}
impl Component for PropertyMap<'_> {
    fn render(&self) -> String {
        let snapshot = self.snapshot;
        let viewport = &snapshot.viewport;
        let config = MapConfig {
            center: [viewport.center.lat, viewport.center.lng],
            zoom: viewport.zoom,
            selected: snapshot.selected_property_id.as_deref(),
            selected_base_layer: snapshot.selected_base_layer.id(),
            base_layers: BaseLayer::ALL
                .iter()
                .map(|l| TileConfig {
                    id: l.id(),
                    name: l.get_display_name(),
                    url: l.tile_url(),
                    attribution: l.attribution(),
                })
                .collect(),
            overlays: Overlay::ALL
                .iter()
                .map(|o| OverlayConfig {
                    id: o.id(),
                    name: o.get_display_name(),
                    url: o.wms_url(),
                    opacity: o.opacity(),
                    enabled: snapshot.enabled_overlays.contains(o),
                })
                .collect(),
        };
        let config = script_json(&config);
        format!(
            r#"
            <div id="map" class="h-full w-full"></div>
            <script type="application/json" id="map-config">{config}</script>
            {MAP_SCRIPT}
            "#
        )
    }
}

pub struct PropertyPopup<'a> {
    pub property: &'a PropertyRecord,
    pub note: Option<&'a Note>,
}
impl Component for PropertyPopup<'_> {
    fn render(&self) -> String {
        let p = self.property;
        let id = clean_text(&p.property_id);
        let street = clean(&p.property_street);
        let city = clean(&p.property_city);
        let zip = clean(&p.property_zip);
        let sale_date = clean(&p.sale_date);
        let minimum_bid = clean(&p.minimum_bid);
        let sale_location = clean(&p.sale_location);
        let owner = clean(&p.owner_name);
        let owner_title = clean_text(&p.owner_name);
        let county = clean(&p.county);
        let property_id = clean(&p.property_id);
        let sale_id = clean(&p.sale_id);
        let legal = clean(&p.legal);
        let note_form = NoteForm {
            property_id: &p.property_id,
            note: self.note,
        }
        .render();
        format!(
            r#"
            <div class="popup flex flex-col gap-3">
                <div class="flex justify-between items-start">
                    <div>
                        <h3 class="text-xl font-bold text-gray-900">{street}</h3>
                        <p class="text-sm text-gray-600">{city}, {zip}</p>
                    </div>
                    <button
                        title="Reset property"
                        hx-delete="/property/{id}/note"
                        hx-target="closest .popup"
                        class="text-gray-500 hover:text-gray-900"
                    >&#8634;</button>
                </div>
                <div class="grid grid-cols-2 gap-2 text-sm">
                    <span>{sale_date}</span>
                    <span>{minimum_bid}</span>
                    <span>{sale_location}</span>
                    <span class="truncate" title="{owner_title}">{owner}</span>
                </div>
                <details class="text-sm">
                    <summary class="cursor-pointer">Show More</summary>
                    <div class="mt-2 space-y-2 border-t pt-2">
                        <p><span class="text-gray-500">County</span><br />{county}</p>
                        <p><span class="text-gray-500">Property ID</span><br />{property_id}</p>
                        <p><span class="text-gray-500">Sale ID</span><br />{sale_id}</p>
                        <p><span class="text-gray-500">Legal Description</span><br />{legal}</p>
                    </div>
                </details>
                {note_form}
            </div>
            "#
        )
    }
}

/// Options for a priority `<select>`, with the current one selected.
fn priority_options(current: Priority, long_labels: bool) -> String {
    let mut options = format!(
        r#"<option value="" {}>None</option>"#,
        if current == Priority::Unset { "selected" } else { "" }
    );
    for priority in Priority::ALL {
        let value = priority.as_str().unwrap_or_default();
        let color = priority.color().unwrap_or(UNVISITED_COLOR);
        let selected = if priority == current { "selected" } else { "" };
        let label = if long_labels {
            priority.get_display_name()
        } else {
            priority.get_display_name().trim_end_matches(" Priority")
        };
        let _ = write!(
            options,
            r#"<option value="{value}" style="color: {color}" {selected}>{label}</option>"#
        );
    }
    options
}

pub struct NoteForm<'a> {
    pub property_id: &'a str,
    pub note: Option<&'a Note>,
}
impl Component for NoteForm<'_> {
    fn render(&self) -> String {
        let id = clean_text(self.property_id);
        let priority = self.note.map(|n| n.priority).unwrap_or_default();
        let color = priority.color().unwrap_or("inherit");
        let options = priority_options(priority, true);
        let comment = clean(self.note.map(|n| n.comment.as_str()).unwrap_or(""));
        let last_updated = match self.note {
            Some(note) => format!(
                "<p>Last updated: {}</p>",
                note.last_updated.format("%-m/%-d/%Y")
            ),
            None => String::new(),
        };
        format!(
            r#"
            <form
                hx-post="/property/{id}/note"
                hx-trigger="change"
                class="flex flex-col gap-3 mt-3 pt-3 border-t border-gray-200"
            >
                <label class="text-sm text-gray-500">Priority
                    <select name="priority" class="w-full rounded border p-1" style="color: {color}">
                        {options}
                    </select>
                </label>
                <label class="text-sm text-gray-500">Notes
                    <textarea name="comment" rows="2" class="w-full rounded border p-1">{comment}</textarea>
                </label>
                <div class="text-xs text-gray-500">{last_updated}</div>
            </form>
            "#
        )
    }
}

pub struct PropertyTable<'a> {
    pub snapshot: &'a Snapshot,
}
impl Component for PropertyTable<'_> {
    fn render(&self) -> String {
        let mut rows: Vec<&PropertyRecord> =
            self.snapshot.catalog.properties.iter().collect();
        rows.sort_by(|a, b| a.sale_date.cmp(&b.sale_date));
        let body = rows.iter().fold(String::new(), |mut acc, p| {
            acc.push_str(
                &TableRow {
                    property: p,
                    note: self.snapshot.note(&p.property_id),
                }
                .render(),
            );
            acc
        });
        let headers = [
            "Sale ID", "Address", "City", "ZIP", "Parcel #", "Sale Date",
            "Sale Time", "Location", "Owner", "Min. Bid", "County", "Priority",
            "Comments",
        ]
        .iter()
        .map(|h| format!(r#"<th class="px-2 py-1 text-left">{h}</th>"#))
        .collect::<Vec<String>>()
        .join("");
        format!(
            r#"
            <div class="h-full overflow-auto">
                <table class="min-w-full text-sm">
                    <thead class="sticky top-0 bg-gray-100"><tr>{headers}</tr></thead>
                    <tbody>{body}</tbody>
                </table>
            </div>
            "#
        )
    }
}

struct TableRow<'a> {
    property: &'a PropertyRecord,
    note: Option<&'a Note>,
}
impl Component for TableRow<'_> {
    fn render(&self) -> String {
        let p = self.property;
        let id = clean_text(&p.property_id);
        let priority = self.note.map(|n| n.priority).unwrap_or_default();
        let options = priority_options(priority, false);
        let comment = clean_text(self.note.map(|n| n.comment.as_str()).unwrap_or(""));
        let cells = [
            &p.sale_id,
            &p.property_street,
            &p.property_city,
            &p.property_zip,
        ]
        .iter()
        .map(|v| format!(r#"<td class="px-2 py-1">{}</td>"#, clean(v)))
        .collect::<Vec<String>>()
        .join("");
        let more_cells = [
            &p.sale_date,
            &p.sale_time,
            &p.sale_location,
            &p.owner_name,
            &p.minimum_bid,
            &p.county,
        ]
        .iter()
        .map(|v| format!(r#"<td class="px-2 py-1">{}</td>"#, clean(v)))
        .collect::<Vec<String>>()
        .join("");
        format!(
            r#"
            <tr class="border-b">
                {cells}
                <td class="px-2 py-1">
                    <a class="text-gray-600 hover:underline" href="{PARCEL_LOOKUP_URL}{id}" target="_blank" rel="noopener noreferrer">{id}</a>
                </td>
                {more_cells}
                <td class="px-2 py-1">
                    <select
                        name="priority"
                        hx-post="/property/{id}/note"
                        hx-include="closest tr"
                        hx-swap="none"
                        class="rounded border p-1"
                    >{options}</select>
                </td>
                <td class="px-2 py-1">
                    <input
                        type="text"
                        name="comment"
                        value="{comment}"
                        hx-post="/property/{id}/note"
                        hx-include="closest tr"
                        hx-swap="none"
                        class="w-full rounded border p-1"
                    />
                </td>
            </tr>
            "#
        )
    }
}

pub struct NotificationList<'a> {
    pub notifications: &'a [Notification],
}
impl Component for NotificationList<'_> {
    fn render(&self) -> String {
        let toasts = self.notifications.iter().fold(String::new(), |mut acc, n| {
            let _ = write!(
                acc,
                r#"
                <div class="toast rounded bg-red-600 text-white shadow p-3 max-w-sm">
                    <div class="flex justify-between gap-4">
                        <span>{message}</span>
                        <button
                            hx-delete="/notifications/{id}"
                            hx-target="closest .toast"
                        >&times;</button>
                    </div>
                    <details class="text-xs mt-1">
                        <summary class="underline cursor-pointer">View Details</summary>
                        <pre class="whitespace-pre-wrap">{details}</pre>
                    </details>
                </div>
                "#,
                id = n.id,
                message = clean(&n.message),
                details = clean_text(&n.details),
            );
            acc
        });
        format!(
            r#"
            <div
                id="notifications"
                hx-get="/notifications"
                hx-trigger="every 2s, notify from:body"
                class="fixed bottom-4 right-4 flex flex-col gap-2 z-[1000]"
            >{toasts}</div>
            "#
        )
    }
}
