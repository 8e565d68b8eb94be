use std::path::PathBuf;
use std::time::Duration;

use markermap_shared::Calibration;

/// Startup settings, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub assets_dir: PathBuf,
    pub dataset_path: PathBuf,
    pub tiles_dir: PathBuf,
    pub port: u16,
    pub poll_interval: Duration,
    pub icon_cache_capacity: usize,
    /// Largest width or height the icon route will scale to.
    pub icon_max_size: u32,
    pub calibration_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let path = |key: &str, default: &str| PathBuf::from(get(key).unwrap_or_else(|| default.to_string()));

        let port = parse_or(&get, "PORT", 3000u16)?;
        let poll_ms = parse_or(&get, "POLL_INTERVAL_MS", 500u64)?;
        if poll_ms == 0 {
            return Err("POLL_INTERVAL_MS must be at least 1".to_string());
        }

        Ok(Config {
            assets_dir: path("ASSETS_DIR", "assets"),
            dataset_path: path("DATASET_PATH", "data/full_dataset.json"),
            tiles_dir: path("TILES_DIR", "tiles"),
            port,
            poll_interval: Duration::from_millis(poll_ms),
            icon_cache_capacity: parse_or(&get, "ICON_CACHE_CAPACITY", 25usize)?,
            icon_max_size: parse_or(&get, "ICON_MAX_SIZE", 1024u32)?,
            calibration_path: get("CALIBRATION_PATH").map(PathBuf::from),
        })
    }

    /// Built-in calibration, or the one in `CALIBRATION_PATH` when set.
    pub fn load_calibration(&self) -> Result<Calibration, String> {
        let Some(path) = &self.calibration_path else {
            return Ok(Calibration::default());
        };
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let calibration = Calibration::from_json(&data)?;
        tracing::info!(path = %path.display(), "Loaded calibration override");
        Ok(calibration)
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {} {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}
