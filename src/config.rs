use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_CONFIG: &str = r#"# Root of the music library tracks are moved into
library = "~/Music"

# Delay between orchestrator cycles while work is pending
poll_interval = "500ms"

[slskd]
urls = ["http://localhost:5030"]
api_key = "changeme"
# Must match the downloads directory slskd itself writes to
download_directory = "~/slskd/downloads"

# Remove this section to disable the video fallback
[metube]
urls = ["http://localhost:8081"]
download_directory = "~/metube/downloads"
quality = "best"
format = "flac"
region = "US"

[http]
port = 3000

[logging]
level = "info"
# otlp_endpoint = "http://localhost:4317"
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    library: String,
    #[serde(default = "default_poll_interval", with = "humantime_serde_compat")]
    pub poll_interval: Duration,
    pub slskd: SlskdConfig,
    #[serde(default)]
    pub metube: Option<MetubeConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlskdConfig {
    /// Tried in order; the first reachable instance answers.
    pub urls: Vec<Url>,
    pub api_key: String,
    pub download_directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetubeConfig {
    pub urls: Vec<Url>,
    pub download_directory: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_format")]
    pub format: String,
    /// Region passed to the YouTube Music search.
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_quality() -> String {
    "best".to_string()
}

fn default_format() -> String {
    "flac".to_string()
}

fn default_region() -> String {
    "US".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_level() -> String {
    "info".to_string()
}

/// `poll_interval = "500ms"` in the file, `Duration` in memory.
mod humantime_serde_compat {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.slskd.urls.is_empty() {
            return Err(eyre!("At least one slskd url must be configured"));
        }
        if let Some(metube) = &config.metube
            && metube.urls.is_empty()
        {
            return Err(eyre!("At least one metube url must be configured"));
        }
        Ok(config)
    }

    /// Default config location, e.g. `~/.config/music-acquirer/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("music-acquirer").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or_else(|| eyre!("No config directory found"))?;
        Self::from_file(&config_path)
    }

    /// Write the default config to `path`, leaving an existing file alone.
    /// Returns whether a file was written.
    pub fn create_default_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(path, DEFAULT_CONFIG)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(true)
    }

    pub fn create_default() -> Result<bool> {
        let config_path = Self::config_path().ok_or_else(|| eyre!("No config directory found"))?;
        Self::create_default_at(&config_path)
    }

    pub fn library_path(&self) -> PathBuf {
        expand_path(&self.library)
    }

    pub fn slskd_download_path(&self) -> PathBuf {
        expand_path(&self.slskd.download_directory)
    }

    pub fn metube_download_path(&self) -> Option<PathBuf> {
        self.metube
            .as_ref()
            .map(|metube| expand_path(&metube.download_directory))
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.slskd.urls.len(), 1);
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.otlp_endpoint.is_none());

        let metube = config.metube.unwrap();
        assert_eq!(metube.format, "flac");
        assert_eq!(metube.region, "US");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
            library = "/music"

            [slskd]
            urls = ["http://a:5030", "http://b:5030"]
            api_key = "key"
            download_directory = "/downloads"
            "#,
        )
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert!(config.metube.is_none());
        assert!(config.metube_download_path().is_none());
        assert_eq!(config.library_path(), PathBuf::from("/music"));
        assert_eq!(config.slskd_download_path(), PathBuf::from("/downloads"));
        assert_eq!(config.slskd.urls[1].as_str(), "http://b:5030/");
    }

    #[test]
    fn test_poll_interval_humantime() {
        let config = Config::from_toml(
            r#"
            library = "/music"
            poll_interval = "2s"

            [slskd]
            urls = ["http://a:5030"]
            api_key = "key"
            download_directory = "/downloads"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_empty_slskd_urls() {
        let result = Config::from_toml(
            r#"
            library = "/music"

            [slskd]
            urls = []
            api_key = "key"
            download_directory = "/downloads"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/Music"), home.join("Music"));
        }
    }

    #[test]
    fn test_create_default_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(Config::create_default_at(&path).unwrap());
        std::fs::write(&path, "custom").unwrap();
        assert!(!Config::create_default_at(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "custom");
    }
}
