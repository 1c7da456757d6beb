use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub map: MapConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub geojson: PathBuf,
    pub metrics_csv: PathBuf,
    /// GeoJSON property holding the state postal abbreviation (join key).
    pub join_property: String,
    #[serde(default = "default_name_property")]
    pub name_property: String,
    #[serde(default = "default_population_property")]
    pub population_property: String,
    /// Optional property carrying a precomputed [lon, lat] centroid.
    pub centroid_property: Option<String>,
}

/// Viewport geometry. Defaults match the dashboard layout the map was
/// designed for: a 700x400 frame with a 10px margin on every side.
#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default = "default_margin")]
    pub margin: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            width: default_width(),
            height: default_height(),
            margin: default_margin(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub frame_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

fn default_name_property() -> String {
    "NAME".to_string()
}

fn default_population_property() -> String {
    "population".to_string()
}

fn default_width() -> f64 {
    700.0
}

fn default_height() -> f64 {
    400.0
}

fn default_margin() -> f64 {
    10.0
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
