//! Configuration management.
//!
//! The configuration lives in `config.yaml` next to the daemon binary:
//!
//! ```yaml
//! keys:
//!   0:
//!     icon: terminal.png
//!     text: Term
//!     command: alacritty
//!   1:
//!     text: Hi
//! ```

#![allow(dead_code)]

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the configuration, resolved against the program directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Icon directory used when a key does not set `base_icon_dir`.
pub const DEFAULT_ICON_DIR: &str = "icons";

/// Errors loading the configuration. Always fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine program directory: {0}")]
    ProgramDir(#[source] std::io::Error),

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Configuration of a single key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KeyConfig {
    /// Key index on the device.
    #[serde(skip)]
    pub index: u8,

    /// Icon file, relative to the icon directory.
    #[serde(default)]
    pub icon: Option<PathBuf>,

    /// Icon directory, relative to the program directory.
    #[serde(default)]
    pub base_icon_dir: Option<String>,

    /// Label drawn when there is no icon, or the icon cannot be decoded.
    #[serde(default)]
    pub text: Option<String>,

    /// Shell command run when the key is pressed.
    #[serde(default)]
    pub command: Option<String>,
}

impl KeyConfig {
    /// Returns the icon directory name, defaulting to `icons`.
    pub fn base_icon_dir(&self) -> &str {
        self.base_icon_dir.as_deref().unwrap_or(DEFAULT_ICON_DIR)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    keys: BTreeMap<u8, KeyConfig>,
}

#[derive(Deserialize)]
struct RawConfig {
    keys: BTreeMap<KeyIndex, Option<KeyConfig>>,
}

/// Key index accepting both `0:` and `"0":` in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct KeyIndex(u8);

impl<'de> Deserialize<'de> for KeyIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = KeyIndex;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "a key index between 0 and 255")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<KeyIndex, E> {
                u8::try_from(v)
                    .map(KeyIndex)
                    .map_err(|_| E::custom(format!("key index {} out of range", v)))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<KeyIndex, E> {
                u8::try_from(v)
                    .map(KeyIndex)
                    .map_err(|_| E::custom(format!("key index {} out of range", v)))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<KeyIndex, E> {
                v.trim()
                    .parse::<u8>()
                    .map(KeyIndex)
                    .map_err(|_| E::custom(format!("invalid key index {:?}", v)))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

impl Config {
    /// Loads `config.yaml` from the program directory.
    pub fn load(program_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_from(program_dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a YAML file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let raw: RawConfig = serde_yaml::from_str(content)?;
        let keys = raw
            .keys
            .into_iter()
            .map(|(KeyIndex(index), key)| {
                let key = KeyConfig {
                    index,
                    ..key.unwrap_or_default()
                };
                (index, key)
            })
            .collect();
        Ok(Self { keys })
    }

    /// Returns the key configurations ordered by index.
    pub fn keys(&self) -> impl Iterator<Item = &KeyConfig> {
        self.keys.values()
    }

    /// Returns the configuration of one key.
    pub fn key(&self, index: u8) -> Option<&KeyConfig> {
        self.keys.get(&index)
    }

    /// Returns the number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when no keys are configured.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Returns the directory containing the running executable.
///
/// Config and icons are resolved against this, never the working directory.
pub fn program_dir() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(ConfigError::ProgramDir)?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        ConfigError::ProgramDir(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "executable has no parent directory",
        ))
    })
}
