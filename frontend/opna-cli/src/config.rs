use opna_config::OpnaConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// One second of audio at the native FM sample rate
const DEFAULT_FRAMES: usize = 55_466;

fn default_frames() -> usize {
    DEFAULT_FRAMES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub opna: OpnaConfig,
    #[serde(default = "default_frames")]
    pub frames: usize,
    /// Register writes in REG=VALUE form, applied before any writes given on the command line
    #[serde(default)]
    pub writes: Vec<String>,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).unwrap_or_else(|err| {
            log::error!("Error reading config file '{}': {err}", path.display());
            String::new()
        });

        toml::from_str(&config_str).unwrap_or_else(|err| {
            log::error!("Error deserializing app config: {err}");
            Self::default()
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { opna: OpnaConfig::default(), frames: DEFAULT_FRAMES, writes: vec![] }
    }
}
