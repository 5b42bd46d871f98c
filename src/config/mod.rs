//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (applied by the binary on top of the loaded config)
//!
//! Precedence, lowest first: defaults, file, environment, CLI.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NmtError, Result};
use crate::inference::GenerationOverrides;
use crate::server::ServerConfig;

/// File name looked up in the working directory when no `--config` is given.
pub const LOCAL_CONFIG_FILE: &str = "indic-nmt.toml";

/// Languages served when nothing else is configured.
pub const DEFAULT_LANGUAGES: [&str; 4] = ["hi", "ar", "ur", "tl"];

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Model artifact locations
    #[serde(default)]
    pub models: ModelsConfig,

    /// Generation overrides applied on top of each model's own defaults
    #[serde(default)]
    pub generation: GenerationOverrides,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            NmtError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| NmtError::Config(format!("Failed to parse config: {e}")))
    }

    /// Resolve and load the config file.
    ///
    /// An explicit path must exist. Without one, `./indic-nmt.toml` and then
    /// `<config_dir>/indic-nmt/config.toml` are tried; if neither exists the
    /// defaults are used.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidates = [
            Some(PathBuf::from(LOCAL_CONFIG_FILE)),
            dirs::config_dir().map(|d| d.join("indic-nmt").join("config.toml")),
        ];

        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                tracing::debug!("Using config file {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `INDIC_NMT_*` environment variables on top of this config
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply variables from `lookup` (keyed like the environment)
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("INDIC_NMT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("INDIC_NMT_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid INDIC_NMT_PORT={port}"),
            }
        }
        if let Some(root) = lookup("INDIC_NMT_MODELS_DIR") {
            self.models.root = PathBuf::from(root);
        }
        if let Some(languages) = lookup("INDIC_NMT_LANGUAGES") {
            self.models.languages = parse_language_list(&languages);
        }
        if let Some(device) = lookup("INDIC_NMT_DEVICE") {
            self.models.device = device;
        }
        self
    }

    /// Build the runtime server configuration
    pub fn server_config(&self) -> Result<ServerConfig> {
        let addr: SocketAddr = self
            .server
            .listen_addr()
            .parse()
            .map_err(|e| NmtError::Config(format!("Invalid listen address: {e}")))?;

        let mut config = ServerConfig::default()
            .with_addr(addr)
            .with_max_body_size(self.server.max_body_size);
        if !self.server.cors {
            config = config.without_cors();
        }
        if !self.server.request_logging {
            config = config.without_logging();
        }
        Ok(config)
    }
}

/// Split a comma separated language list, dropping blanks
pub fn parse_language_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Apply the cross-origin policy
    pub cors: bool,

    /// Emit request spans
    pub request_logging: bool,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors: true,
            request_logging: true,
            max_body_size: 64 * 1024,
        }
    }
}

impl ServerSettings {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding one subdirectory per language code
    pub root: PathBuf,

    /// Language codes to load at startup
    pub languages: Vec<String>,

    /// Per-language directory overrides
    pub paths: BTreeMap<String, PathBuf>,

    /// Compute device: `cpu`, `cuda[:N]` or `metal[:N]`
    pub device: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./Indian"),
            languages: DEFAULT_LANGUAGES.iter().map(|s| (*s).to_string()).collect(),
            paths: BTreeMap::new(),
            device: "cpu".to_string(),
        }
    }
}

impl ModelsConfig {
    /// Artifact directory for a language
    pub fn path_for(&self, language: &str) -> PathBuf {
        self.paths
            .get(language)
            .cloned()
            .unwrap_or_else(|| self.root.join(language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.models.languages, vec!["hi", "ar", "ur", "tl"]);
        assert_eq!(config.models.path_for("hi"), PathBuf::from("./Indian/hi"));
        assert!(config.server.cors);
    }

    #[test]
    fn test_server_listen_addr() {
        let settings = ServerSettings::default();
        assert_eq!(settings.listen_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 9090

            [models]
            root = "/srv/models"
            languages = ["hi", "ur"]
            device = "cuda:1"

            [models.paths]
            ur = "/opt/urdu"

            [generation]
            num_beams = 2
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert!(config.server.request_logging);
        assert_eq!(config.models.path_for("hi"), PathBuf::from("/srv/models/hi"));
        assert_eq!(config.models.path_for("ur"), PathBuf::from("/opt/urdu"));
        assert_eq!(config.models.device, "cuda:1");
        assert_eq!(config.generation.num_beams, Some(2));
        assert_eq!(config.generation.max_length, None);
    }

    #[test]
    fn test_vars_override_file_values() {
        let config = Config::default().with_vars(|key| match key {
            "INDIC_NMT_PORT" => Some("7000".to_string()),
            "INDIC_NMT_LANGUAGES" => Some("hi, tl,,".to_string()),
            "INDIC_NMT_MODELS_DIR" => Some("/data".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.models.languages, vec!["hi", "tl"]);
        assert_eq!(config.models.path_for("tl"), PathBuf::from("/data/tl"));
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_port_var_is_ignored() {
        let config = Config::default().with_vars(|key| {
            (key == "INDIC_NMT_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indic-nmt.toml");
        std::fs::write(&path, "[server]\nport = 8123\n").unwrap();

        let config = Config::discover(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8123);

        let missing = Config::discover(Some(&dir.path().join("nope.toml")));
        assert!(matches!(missing, Err(NmtError::Config(_))));
    }

    #[test]
    fn test_server_config_from_settings() {
        let mut config = Config::default();
        config.server.cors = false;
        config.server.port = 3001;
        let server = config.server_config().unwrap();
        assert_eq!(server.addr.port(), 3001);
        assert!(!server.cors_enabled);
        assert!(server.logging);
    }
}
