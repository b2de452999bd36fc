use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::content::{Document, ScriptKind, WorkerCatalog};
use crate::error::{BridgeError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bridge transport configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Content context configuration
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interface the bridge server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Bridge server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Give up waiting for a call after this many milliseconds
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            call_timeout_ms: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    19230
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Page fixture (JSON) loaded into the content context
    #[serde(default)]
    pub document: Option<PathBuf>,

    /// Script for worker urls not listed in `workers`; `"none"` disables it
    #[serde(default = "default_worker_script", with = "script_or_none")]
    pub default_worker_script: Option<ScriptKind>,

    /// Worker url → script
    #[serde(default)]
    pub workers: BTreeMap<String, ScriptKind>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            document: None,
            default_worker_script: default_worker_script(),
            workers: BTreeMap::new(),
        }
    }
}

fn default_worker_script() -> Option<ScriptKind> {
    Some(ScriptKind::Echo)
}

/// Writes a disabled fallback as `"none"` so it survives a save and reload.
mod script_or_none {
    use serde::de::IntoDeserializer;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::content::ScriptKind;

    const NONE: &str = "none";

    pub fn serialize<S: Serializer>(
        value: &Option<ScriptKind>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(kind) => serializer.serialize_str(kind.name()),
            None => serializer.serialize_str(NONE),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<ScriptKind>, D::Error> {
        let name = String::deserialize(deserializer)?;
        if name == NONE {
            return Ok(None);
        }
        ScriptKind::deserialize(name.as_str().into_deserializer()).map(Some)
    }
}

impl Config {
    /// Load configuration from all sources (file, env, defaults)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration using `path` as the config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(path))
            // Merge environment variables (FRAMEBRIDGE_BRIDGE__PORT, ...)
            .merge(Env::prefixed("FRAMEBRIDGE_").split("__"))
            .extract()
            .map_err(|e| BridgeError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("framebridge")
            .join("config.toml")
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::ConfigError(e.to_string()))
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.bridge
            .call_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn bridge_url(&self) -> String {
        format!("ws://{}:{}", self.bridge.host, self.bridge.port)
    }

    /// Worker catalog described by the `[content]` section
    pub fn worker_catalog(&self) -> WorkerCatalog {
        let mut catalog = WorkerCatalog::new();
        for (url, kind) in &self.content.workers {
            catalog.register(url.clone(), *kind);
        }
        catalog.set_fallback(self.content.default_worker_script);
        catalog
    }

    /// Load the configured page fixture, or an empty page
    pub fn load_document(&self) -> Result<Document> {
        match &self.content.document {
            Some(path) => Document::load(path),
            None => Ok(Document::default()),
        }
    }
}
