use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub dir: String,
    pub debug: bool,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        TemplateSettings {
            dir: "templates".to_string(),
            debug: false,
        }
    }
}

/// Where uploaded files live and how they are addressed from outside.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub root: String,
    pub url: String,
    pub images_dir: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        MediaSettings {
            root: "media".to_string(),
            url: "/media/".to_string(),
            images_dir: "images".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub migrations_dir: Option<String>,
    pub max_body_bytes: usize,
    pub template: TemplateSettings,
    pub media: MediaSettings,
    pub other: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "sqlite://campus.db".to_string(),
            migrations_dir: None,
            max_body_bytes: 5 * 1024 * 1024,
            template: TemplateSettings::default(),
            media: MediaSettings::default(),
            other: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. Keys left out keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
