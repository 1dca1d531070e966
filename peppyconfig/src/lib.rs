//! # peppyconfig
//!
//! Settings store shared by the PeppyPi binary and the player backends.
//!
//! Values live in one YAML tree built, at startup, from three layers:
//! the defaults compiled into the crate (`peppyplayer.yaml`), the user's
//! `config.yaml` and finally `PEPPY_CONFIG__SECTION__KEY` environment
//! variables. The result is written back so the user can see every
//! available key.
//!
//! ```no_run
//! use peppyconfig::get_config;
//!
//! let config = get_config();
//! let level = config.get_log_min_level()?;
//! config.set_log_enable_console(false)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Domain crates add their own typed accessors through extension traits
//! (see `peppyplayer::PlayerConfigExt`).

mod yaml;

use anyhow::{Context, Result, bail};
use dirs::home_dir;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde_yaml::{Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, error, info, warn};

const DEFAULT_CONFIG: &str = include_str!("peppyplayer.yaml");

const ENV_CONFIG_DIR: &str = "PEPPY_CONFIG";
const ENV_PREFIX: &str = "PEPPY_CONFIG__";
const CONFIG_DIR_NAME: &str = ".peppy";
const CONFIG_FILE_NAME: &str = "config.yaml";

const LOGGER_MIN_LEVEL: &[&str] = &["host", "logger", "min_level"];
const LOGGER_ENABLE_CONSOLE: &[&str] = &["host", "logger", "enable_console"];

lazy_static! {
    static ref CONFIG: Arc<Config> = Arc::new(Config::load_config("").unwrap_or_else(|e| {
        error!("❌ Cannot load configuration, running on built-in defaults: {:#}", e);
        Config::built_in()
    }));
}

/// PeppyPi settings.
///
/// Lookups are case-insensitive. Every setter rewrites `config.yaml`,
/// unless the instance only holds the built-in defaults.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    file: Option<PathBuf>,
    tree: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            file: self.file.clone(),
            tree: Mutex::new(self.tree.lock().clone()),
        }
    }
}

impl Config {
    /// Picks the directory to read: `directory` when given, then
    /// `$PEPPY_CONFIG`, then an existing `./.peppy` or `~/.peppy`.
    ///
    /// The directory is created when missing and must be writable.
    pub fn config_dir(directory: &str) -> Result<String> {
        let chosen = Self::locate(directory);
        Self::ensure_writable(Path::new(&chosen))
            .with_context(|| format!("config directory {} is unusable", chosen))?;
        Ok(chosen)
    }

    fn locate(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }
        if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
            debug!(env_var = ENV_CONFIG_DIR, path = %from_env, "Config directory taken from environment");
            return from_env;
        }
        let candidates = std::iter::once(PathBuf::from(CONFIG_DIR_NAME))
            .chain(home_dir().map(|home| home.join(CONFIG_DIR_NAME)));
        for candidate in candidates {
            if candidate.is_dir() {
                return candidate.to_string_lossy().into_owned();
            }
        }
        CONFIG_DIR_NAME.to_string()
    }

    fn ensure_writable(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }
        let probe = dir.join(".peppy_probe");
        fs::write(&probe, b"")?;
        fs::remove_file(&probe)?;
        Ok(())
    }

    /// Builds the settings tree for `directory` (see [`Config::config_dir`])
    /// and writes the merged result back to its `config.yaml`.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        let file = Path::new(&config_dir).join(CONFIG_FILE_NAME);

        let mut tree = yaml::lowercase_keys(serde_yaml::from_str(DEFAULT_CONFIG)?);
        match fs::read_to_string(&file) {
            Ok(text) => {
                let user: Value = serde_yaml::from_str(&text)
                    .with_context(|| format!("invalid YAML in {}", file.display()))?;
                yaml::overlay(&mut tree, &yaml::lowercase_keys(user));
                info!(config_file = %file.display(), "📄 Configuration file loaded");
            }
            Err(_) => {
                info!(config_file = %file.display(), "📄 No configuration file, starting from defaults");
            }
        }

        for (path, value) in yaml::env_overrides(ENV_PREFIX, env::vars()) {
            let path: Vec<&str> = path.iter().map(String::as_str).collect();
            if let Err(e) = yaml::insert(&mut tree, &path, value) {
                warn!("⚠️ Ignoring environment override {}: {}", path.join("__"), e);
            }
        }

        let config = Self {
            config_dir,
            file: Some(file),
            tree: Mutex::new(tree),
        };
        config.save()?;
        Ok(config)
    }

    /// The compiled-in defaults, detached from any file.
    pub fn built_in() -> Self {
        let tree = serde_yaml::from_str(DEFAULT_CONFIG)
            .map(yaml::lowercase_keys)
            .unwrap_or(Value::Null);
        Self {
            config_dir: String::new(),
            file: None,
            tree: Mutex::new(tree),
        }
    }

    /// Directory holding `config.yaml`.
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Writes the current tree to `config.yaml`.
    pub fn save(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let text = serde_yaml::to_string(&*self.tree.lock())?;
        fs::write(file, text).with_context(|| format!("cannot write {}", file.display()))
    }

    /// Value stored at `path`, e.g. `&["player", "mpd", "port"]`.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        yaml::lookup(&self.tree.lock(), path).cloned()
    }

    /// Replaces the value at `path` and saves.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        yaml::insert(&mut self.tree.lock(), path, value)?;
        self.save()
    }

    /// Scalar at `path` rendered as text, or `default`.
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            Ok(Value::Number(n)) => n.to_string(),
            Ok(Value::Bool(b)) => b.to_string(),
            Ok(other) => {
                warn!(path = %path.join("."), "Expected a scalar, found {:?}; using {}", other, default);
                default.to_string()
            }
            Err(_) => default.to_string(),
        }
    }

    /// Unsigned integer at `path`; numeric strings such as `"6601"` count.
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        let parsed = match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64(),
            Ok(Value::String(s)) => s.trim().parse().ok(),
            _ => return default,
        };
        parsed.unwrap_or_else(|| {
            warn!(path = %path.join("."), "Not an unsigned integer; using {}", default);
            default
        })
    }

    /// Boolean at `path`; also reads `yes`/`no`, `on`/`off` and `1`/`0`.
    pub fn get_bool_or(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            Ok(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    pub fn set_u64(&self, path: &[&str], value: u64) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value)))
    }

    pub fn set_string(&self, path: &[&str], value: &str) -> Result<()> {
        self.set_value(path, Value::String(value.to_string()))
    }

    /// Whether log lines go to the terminal.
    pub fn get_log_enable_console(&self) -> Result<bool> {
        Ok(self.get_bool_or(LOGGER_ENABLE_CONSOLE, true))
    }

    pub fn set_log_enable_console(&self, enabled: bool) -> Result<()> {
        self.set_value(LOGGER_ENABLE_CONSOLE, Value::Bool(enabled))
    }

    /// Lowest level shown when `RUST_LOG` is unset.
    pub fn get_log_min_level(&self) -> Result<String> {
        Ok(self.get_string_or(LOGGER_MIN_LEVEL, "INFO"))
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(LOGGER_MIN_LEVEL, Value::String(level))
    }
}

/// Process-wide settings, loaded on first use.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_defaults() {
        let config = Config::built_in();
        assert_eq!(config.get_u64_or(&["player", "mpd", "port"], 0), 6600);
        assert_eq!(config.directory(), "");
        // nothing to write to
        config.set_u64(&["player", "mpd", "port"], 6601).unwrap();
        assert_eq!(config.get_u64_or(&["player", "mpd", "port"], 0), 6601);
    }

    #[test]
    fn test_clone_is_independent() {
        let config = Config::built_in();
        let copy = config.clone();
        copy.set_string(&["player", "type"], "mpc").unwrap();
        assert_eq!(config.get_string_or(&["player", "type"], ""), "mpd");
        assert_eq!(copy.get_string_or(&["player", "type"], ""), "mpc");
    }
}
