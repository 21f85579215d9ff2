//! We can have a little hard-coded config, [as a
//! snack](https://knowyourmeme.com/memes/cats-can-have-a-little-salami).
//! Everything that differs between deployments comes out of the environment
//! (or a `.env` file) through [Config::load].

use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};

/// There is no login; every note is written on behalf of this user.
pub const DEMO_USER_ID: &str = "greg@cloudseeder.com";

/// Roughly the middle of Indiana, which is where the sales are.
pub const DEFAULT_CENTER: (f64, f64) = (39.8283, -86.2786);
pub const DEFAULT_ZOOM: f64 = 7.0;

/// Notifications disappear on their own after this long.
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(5000);

/// Older notifications are dropped once this many are on screen.
pub const NOTIFICATION_MAX_VISIBLE: usize = 3;

/// Name of the persisted slice of the store.
pub const STORAGE_NAME: &str = "map-storage";

pub struct Config {
    pub port: u16,
    /// Base URL of the notes / catalog backend. When unset we talk to our
    /// own origin.
    pub api_base_url: String,
    pub catalog_path: String,
    pub user_id: String,
    pub state_file: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    pub fn load() -> Self {
        let port: u16 = try_load("SCOUT_PORT", "8000");
        let own_origin = format!("http://127.0.0.1:{port}");
        Self {
            port,
            api_base_url: try_load("SCOUT_API_BASE_URL", &own_origin),
            catalog_path: try_load("SCOUT_CATALOG_PATH", "/sri-data-list"),
            user_id: try_load("SCOUT_USER_ID", DEMO_USER_ID),
            state_file: try_load::<String>(
                "SCOUT_STATE_FILE",
                &format!("{STORAGE_NAME}.json"),
            )
            .into(),
            request_timeout: Duration::from_secs(try_load(
                "SCOUT_REQUEST_TIMEOUT_SECS",
                "30",
            )),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
