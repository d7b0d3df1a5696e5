use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = ".gatorconfig.json";
const CONFIG_PATH_ENV: &str = "GATOR_CONFIG";
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub db_url: String,
    #[serde(default)]
    pub current_user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<u64>,
}

impl Config {
    /// Resolves `~/.gatorconfig.json`, unless `GATOR_CONFIG` points elsewhere.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(CONFIG_FILE_NAME))
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Malformed {
            path: path.display().to_string(),
            source,
        })
    }

    /// Writes the record atomically: temp file first, then rename over the target.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Malformed {
            path: path.display().to_string(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes).map_err(io_err)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            warn!(error = %e, path = %path.display(), "failed to persist config");
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        debug!(path = %path.display(), "config written");
        Ok(())
    }

    /// The logged-in user name exactly as recorded; only an empty string
    /// counts as unset.
    pub fn current_user(&self) -> Option<&str> {
        let name = self.current_user_name.as_str();
        (!name.is_empty()).then_some(name)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    pub fn max_body_bytes(&self) -> u64 {
        self.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES)
    }
}

/// The config record bound to the file it was loaded from. Every mutation is
/// persisted immediately.
#[derive(Debug, Clone)]
pub struct Session {
    config: Config,
    path: PathBuf,
}

impl Session {
    pub fn new(config: Config, path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            path: path.into(),
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = Config::default_path()?;
        Self::load_from(path)
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Config::read_from(&path)?;
        Ok(Self { config, path })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `name` as the current user and writes the file. The in-memory
    /// record is left untouched when the write fails.
    pub fn set_current_user(&mut self, name: &str) -> Result<(), ConfigError> {
        let mut updated = self.config.clone();
        updated.current_user_name = name.to_owned();
        updated.write_to(&self.path)?;
        self.config = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "gator_config_{}_{}",
            tag,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        dir.join(CONFIG_FILE_NAME)
    }

    #[test]
    fn reads_file_without_current_user() {
        let path = temp_config_path("read");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, br#"{"db_url":"postgres://localhost/gator"}"#).unwrap();

        let config = Config::read_from(&path).unwrap();
        assert_eq!(config.db_url, "postgres://localhost/gator");
        assert_eq!(config.current_user(), None);
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.max_body_bytes(), DEFAULT_MAX_BODY_BYTES);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn set_current_user_persists_to_disk() {
        let path = temp_config_path("persist");
        let config = Config {
            db_url: "memory://".into(),
            fetch_timeout_secs: Some(5),
            ..Default::default()
        };
        config.write_to(&path).unwrap();

        let mut session = Session::load_from(&path).unwrap();
        session.set_current_user("kahya").unwrap();
        assert_eq!(session.config().current_user(), Some("kahya"));

        let reloaded = Config::read_from(&path).unwrap();
        assert_eq!(reloaded.current_user_name, "kahya");
        assert_eq!(reloaded.fetch_timeout(), Some(Duration::from_secs(5)));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn current_user_is_not_trimmed() {
        let config = Config {
            current_user_name: " ana".into(),
            ..Default::default()
        };
        assert_eq!(config.current_user(), Some(" ana"));

        let blank = Config {
            current_user_name: "  ".into(),
            ..Default::default()
        };
        assert_eq!(blank.current_user(), Some("  "));
        assert_eq!(Config::default().current_user(), None);
    }

    #[test]
    fn db_url_defaults_to_empty() {
        let path = temp_config_path("no_db_url");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, br#"{"current_user_name":"ana"}"#).unwrap();

        let config = Config::read_from(&path).unwrap();
        assert_eq!(config.db_url, "");
        assert_eq!(config.current_user(), Some("ana"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = temp_config_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ this is not json ").unwrap();

        let err = Config::read_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = temp_config_path("missing");
        let err = Session::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
