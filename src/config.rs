use crate::diary::{DiaryOptions, KdfParams};
use dirs::{config_dir, data_dir};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "QUIETQUILL_CONFIG";
pub const DATA_DIR_ENV: &str = "QUIETQUILL_DATA_DIR";
pub const TEST_KDF_ENV: &str = "QUIETQUILL_TEST_KDF";
pub const LOG_ENV: &str = "QUIETQUILL_LOG";

const APP_DIR: &str = "quietquill";
const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug)]
pub enum ConfigError {
    ConfigDirUnavailable,
    DataDirUnavailable,
    Io(std::io::Error),
    Parse(toml::de::Error),
    InvalidKdf(KdfParams),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ConfigDirUnavailable => {
                write!(f, "unable to determine configuration directory")
            }
            ConfigError::DataDirUnavailable => {
                write!(f, "unable to determine data directory; set {DATA_DIR_ENV}")
            }
            ConfigError::Io(err) => write!(f, "filesystem error: {err}"),
            ConfigError::Parse(err) => write!(f, "failed to parse config: {err}"),
            ConfigError::InvalidKdf(params) => write!(
                f,
                "invalid [kdf] settings: memory_kib={} iterations={} parallelism={}",
                params.memory_kib, params.iterations, params.parallelism
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    idle_timeout_secs: Option<u64>,
    log_filter: Option<String>,
    #[serde(default)]
    kdf: FileKdf,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileKdf {
    memory_kib: Option<u32>,
    iterations: Option<u32>,
    parallelism: Option<u32>,
}

/// Resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiaryConfig {
    pub data_dir: PathBuf,
    pub idle_timeout: Option<Duration>,
    pub log_filter: String,
    pub kdf: KdfParams,
}

impl DiaryConfig {
    /// Load from the config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Same as [`DiaryConfig::load`], reading variables through `env`.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = match env(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => default_config_path()?,
        };
        let file = read_config(&path)?;
        Self::resolve(file, &env)
    }

    pub fn options(&self) -> DiaryOptions {
        DiaryOptions {
            kdf_params: self.kdf,
            idle_timeout: self.idle_timeout,
        }
    }

    fn resolve(
        file: FileConfig,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let data_dir = match env(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => match file.data_dir {
                Some(dir) => dir,
                None => default_data_dir()?,
            },
        };

        let kdf = if env(TEST_KDF_ENV).is_some_and(|v| !v.is_empty() && v != "0") {
            KdfParams::for_tests()
        } else {
            let defaults = KdfParams::recommended();
            let params = KdfParams {
                memory_kib: file.kdf.memory_kib.unwrap_or(defaults.memory_kib),
                iterations: file.kdf.iterations.unwrap_or(defaults.iterations),
                parallelism: file.kdf.parallelism.unwrap_or(defaults.parallelism),
            };
            params
                .validate()
                .map_err(|_| ConfigError::InvalidKdf(params))?;
            params
        };

        let log_filter = env(LOG_ENV)
            .filter(|v| !v.is_empty())
            .or(file.log_filter)
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            data_dir,
            idle_timeout: file
                .idle_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            log_filter,
            kdf,
        })
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut dir = config_dir().ok_or(ConfigError::ConfigDirUnavailable)?;
    dir.push(APP_DIR);
    dir.push(CONFIG_FILE_NAME);
    Ok(dir)
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let mut dir = data_dir().ok_or(ConfigError::DataDirUnavailable)?;
    dir.push(APP_DIR);
    Ok(dir)
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).map_err(ConfigError::Parse),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(err) => Err(ConfigError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn write_config(dir: &Path, contents: &str) -> String {
        let path = dir.join("config.toml");
        fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml").display().to_string();
        let config = DiaryConfig::load_with(env_of(&[
            (CONFIG_ENV, missing.as_str()),
            (DATA_DIR_ENV, "/tmp/qq"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/qq"));
        assert_eq!(config.kdf, KdfParams::recommended());
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn file_values_apply_and_env_overrides_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
data_dir = "/srv/diary"
idle_timeout_secs = 300
log_filter = "quietquill=debug"

[kdf]
memory_kib = 16384
"#,
        );

        let config = DiaryConfig::load_with(env_of(&[(CONFIG_ENV, path.as_str())])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/diary"));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.log_filter, "quietquill=debug");
        assert_eq!(config.kdf.memory_kib, 16384);
        assert_eq!(config.kdf.iterations, KdfParams::recommended().iterations);

        let config = DiaryConfig::load_with(env_of(&[
            (CONFIG_ENV, path.as_str()),
            (DATA_DIR_ENV, "/elsewhere"),
            (TEST_KDF_ENV, "1"),
            (LOG_ENV, "trace"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/elsewhere"));
        assert_eq!(config.kdf, KdfParams::for_tests());
        assert_eq!(config.log_filter, "trace");
        assert_eq!(config.options().idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn invalid_kdf_and_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[kdf]\niterations = 0\n");
        assert!(matches!(
            DiaryConfig::load_with(env_of(&[(CONFIG_ENV, path.as_str()), (DATA_DIR_ENV, "/x")])),
            Err(ConfigError::InvalidKdf(_))
        ));

        let path = write_config(dir.path(), "[kdf]\nmemory_kib = 4294967295\n");
        assert!(matches!(
            DiaryConfig::load_with(env_of(&[(CONFIG_ENV, path.as_str()), (DATA_DIR_ENV, "/x")])),
            Err(ConfigError::InvalidKdf(params)) if params.memory_kib == u32::MAX
        ));

        let path = write_config(dir.path(), "colour = \"blue\"\n");
        assert!(matches!(
            DiaryConfig::load_with(env_of(&[(CONFIG_ENV, path.as_str()), (DATA_DIR_ENV, "/x")])),
            Err(ConfigError::Parse(_))
        ));
    }
}
