//! # Disco Configuration Module
//!
//! This module provides configuration management for Disco, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//!
//! ## Usage
//!
//! ```no_run
//! use discoconfig::Config;
//!
//! let config = Config::load_config("")?;
//!
//! let bitrate = config.get_default_bitrate_kbps()?;
//! let readahead = config.get_readahead_bytes()?;
//! let temp_dir = config.get_temp_dir()?;
//!
//! config.set_leave_grace_ms(500)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Environment overrides
//!
//! Any variable named `DISCO_CONFIG__<PATH>` overrides the value at `<PATH>`,
//! with `__` separating the path segments. Values are parsed as YAML, so
//! `DISCO_CONFIG__CACHE__BACKEND=fs` and `DISCO_CONFIG__PLAYER__LEAVE_GRACE_MS=500`
//! both work.

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::info;

// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("disco.yaml");

const ENV_CONFIG_DIR: &str = "DISCO_CONFIG";
const ENV_PREFIX: &str = "DISCO_CONFIG__";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_BITRATE_KBPS: usize = 64;
const DEFAULT_VOLUME: usize = 100;
const DEFAULT_LEAVE_GRACE_MS: usize = 200;
const DEFAULT_READAHEAD_BYTES: usize = 100 * 1024;
const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
const DEFAULT_APPLICATION: &str = "lowdelay";
const DEFAULT_FRAME_DURATION_MS: usize = 20;
const DEFAULT_RAW_OUTPUT: bool = true;
const DEFAULT_CACHE_BACKEND: &str = "none";
const DEFAULT_CACHE_DIR: &str = "cache_audio";
const DEFAULT_TEMP_DIR: &str = "tmp";
const DEFAULT_TRANSCODE_BITRATE_KBPS: usize = 320;
const DEFAULT_TRANSCODE_EXTENSION: &str = "mp3";

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|v| usize::try_from(v).ok())
                    .unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            let n = Number::from(value);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            match self.get_value($path) {
                Ok(Value::String(s)) => Ok(s),
                _ => Ok($default.to_string()),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration manager for Disco
///
/// Holds the merged YAML document (defaults, `config.yaml`, environment
/// overrides). Every setter writes the whole document back to `config.yaml`.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(".disco").exists() {
            return ".disco".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".disco");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".disco".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `DISCO_CONFIG` environment variable
    /// 3. `.disco` in the current directory
    /// 4. `.disco` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Returns the directory holding `config.yaml`
    pub fn dir(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = {
            let data = self.lock()?;
            serde_yaml::to_string(&*data)?
        };
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("configuration lock poisoned"))
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["player", "leave_grace_ms"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock()?;
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock()?;
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                if let Some(next) = map.get(Value::String(key.to_lowercase())) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a relative or absolute path and creates the directory if needed
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<PathBuf> {
        let path = Path::new(dir_path);

        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }

        Ok(absolute_path)
    }

    /// Returns a directory managed by the configuration
    ///
    /// The directory may be absolute or relative to the configuration
    /// directory. It is created if it doesn't exist.
    ///
    /// ```no_run
    /// use discoconfig::Config;
    ///
    /// let config = Config::load_config("")?;
    /// let cache_dir = config.get_managed_dir(&["cache", "directory"], "cache_audio")?;
    /// println!("Audio cache directory: {}", cache_dir.display());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Sets a directory managed by the configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Directory of the filesystem cache backend
    pub fn get_cache_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["cache", "directory"], DEFAULT_CACHE_DIR)
    }

    /// Scratch directory for freshly fetched tracks awaiting writeback
    pub fn get_temp_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["cache", "temp_directory"], DEFAULT_TEMP_DIR)
    }

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    impl_usize_config!(
        get_default_bitrate_kbps,
        set_default_bitrate_kbps,
        &["player", "default_bitrate_kbps"],
        DEFAULT_BITRATE_KBPS
    );

    impl_usize_config!(
        get_default_volume,
        set_default_volume,
        &["player", "default_volume"],
        DEFAULT_VOLUME
    );

    impl_usize_config!(
        get_leave_grace_ms,
        set_leave_grace_ms,
        &["player", "leave_grace_ms"],
        DEFAULT_LEAVE_GRACE_MS
    );

    impl_usize_config!(
        get_readahead_bytes,
        set_readahead_bytes,
        &["player", "readahead_bytes"],
        DEFAULT_READAHEAD_BYTES
    );

    impl_string_config!(
        get_ffmpeg_path,
        set_ffmpeg_path,
        &["player", "encoder", "ffmpeg_path"],
        DEFAULT_FFMPEG_PATH
    );

    impl_string_config!(
        get_encoder_application,
        set_encoder_application,
        &["player", "encoder", "application"],
        DEFAULT_APPLICATION
    );

    impl_usize_config!(
        get_frame_duration_ms,
        set_frame_duration_ms,
        &["player", "encoder", "frame_duration_ms"],
        DEFAULT_FRAME_DURATION_MS
    );

    impl_bool_config!(
        get_raw_output,
        set_raw_output,
        &["player", "encoder", "raw_output"],
        DEFAULT_RAW_OUTPUT
    );

    impl_string_config!(
        get_cache_backend,
        set_cache_backend,
        &["cache", "backend"],
        DEFAULT_CACHE_BACKEND
    );

    impl_string_config!(
        get_cache_http_endpoint,
        set_cache_http_endpoint,
        &["cache", "http", "endpoint"],
        ""
    );

    impl_string_config!(
        get_cache_http_bucket,
        set_cache_http_bucket,
        &["cache", "http", "bucket"],
        ""
    );

    impl_string_config!(
        get_cache_http_token,
        set_cache_http_token,
        &["cache", "http", "token"],
        ""
    );

    impl_usize_config!(
        get_transcode_bitrate_kbps,
        set_transcode_bitrate_kbps,
        &["cache", "transcode", "bitrate_kbps"],
        DEFAULT_TRANSCODE_BITRATE_KBPS
    );

    impl_string_config!(
        get_transcode_extension,
        set_transcode_extension,
        &["cache", "transcode", "extension"],
        DEFAULT_TRANSCODE_EXTENSION
    );
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default ones.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_are_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);

        assert_eq!(config.get_default_bitrate_kbps().unwrap(), 64);
        assert_eq!(config.get_readahead_bytes().unwrap(), 100 * 1024);
        assert_eq!(config.get_leave_grace_ms().unwrap(), 200);
        assert_eq!(config.get_cache_backend().unwrap(), "none");
        assert!(config.get_raw_output().unwrap());
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn test_external_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "player:\n  leave_grace_ms: 750\ncache:\n  backend: fs\n",
        )
        .unwrap();

        let config = load(&dir);
        assert_eq!(config.get_leave_grace_ms().unwrap(), 750);
        assert_eq!(config.get_cache_backend().unwrap(), "fs");
        // untouched keys keep their default
        assert_eq!(config.get_readahead_bytes().unwrap(), 100 * 1024);
    }

    #[test]
    fn test_setter_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);
        config.set_default_bitrate_kbps(96).unwrap();
        drop(config);

        let reloaded = load(&dir);
        assert_eq!(reloaded.get_default_bitrate_kbps().unwrap(), 96);
    }

    #[test]
    fn test_managed_dir_is_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);

        let temp_dir = config.get_temp_dir().unwrap();
        assert_eq!(temp_dir, dir.path().join("tmp"));
        assert!(temp_dir.is_dir());
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);
        assert!(config.get_value(&["player", "does_not_exist"]).is_err());
    }

    #[test]
    fn test_merge_replaces_scalars() {
        let mut default: Value = serde_yaml::from_str("a: 1\nb:\n  c: 2\n").unwrap();
        let external: Value = serde_yaml::from_str("b:\n  c: 3\n  d: 4\n").unwrap();
        merge_yaml(&mut default, &external);

        let expected: Value = serde_yaml::from_str("a: 1\nb:\n  c: 3\n  d: 4\n").unwrap();
        assert_eq!(default, expected);
    }
}
