//! Reader configuration
//!
//! Describes the slots of the virtual reader, the ATR historical bytes and
//! the card file hierarchy. Stored as JSON, by default in
//! `~/.vccid/reader.json`; the `VCCID_CONFIG` environment variable points
//! elsewhere.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::atr::{self, DEFAULT_HISTORICAL_BYTES, MAX_HISTORICAL_BYTES};
use crate::card::{FileId, FileSystem, FileSystemError, MF_ID};

/// Custom serde module for base64 encoding of byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("a reader needs at least one slot")]
    NoSlots,

    #[error("{0} slots configured, a reader has at most 255")]
    TooManySlots(usize),

    #[error("{0} historical bytes configured, an ATR carries at most 15")]
    HistoricalBytesTooLong(usize),

    #[error("invalid file hierarchy: {0}")]
    FileSystem(#[from] FileSystemError),
}

/// Kind of file to create in the card hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Df,
    Ef,
}

/// One file below the MF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub fid: FileId,
    #[serde(default = "default_parent")]
    pub parent: FileId,
    pub kind: FileKind,
}

fn default_parent() -> FileId {
    MF_ID
}

/// One reader slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Whether a card sits in the slot when the reader starts
    #[serde(default = "default_card_present")]
    pub card_present: bool,
}

fn default_card_present() -> bool {
    true
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self { card_present: true }
    }
}

/// Complete reader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub slots: Vec<SlotConfig>,
    #[serde(with = "base64_bytes")]
    pub historical_bytes: Vec<u8>,
    /// Files added below the MF, parents before children
    pub files: Vec<FileConfig>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            slots: vec![SlotConfig::default()],
            historical_bytes: DEFAULT_HISTORICAL_BYTES.to_vec(),
            files: Vec::new(),
        }
    }
}

impl ReaderConfig {
    /// Environment variable naming the configuration file
    pub const ENV_VAR: &'static str = "VCCID_CONFIG";
    const DEFAULT_CONFIG_FILE: &'static str = "reader.json";

    /// Where the configuration is read from when no path is given
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_VAR) {
            return PathBuf::from(path);
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".vccid").join(Self::DEFAULT_CONFIG_FILE);
        }
        PathBuf::from("/etc/vccid").join(Self::DEFAULT_CONFIG_FILE)
    }

    /// Load and validate the configuration
    ///
    /// A missing file is not an error: the defaults are used instead.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(Self::default_path);
        if !path.exists() {
            info!("No reader configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_json(&content)?;
        info!("Loaded reader configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_error)?;
        debug!("Saved reader configuration to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slots.is_empty() {
            return Err(ConfigError::NoSlots);
        }
        if self.slots.len() > 255 {
            return Err(ConfigError::TooManySlots(self.slots.len()));
        }
        if self.historical_bytes.len() > MAX_HISTORICAL_BYTES {
            return Err(ConfigError::HistoricalBytesTooLong(self.historical_bytes.len()));
        }
        self.build_filesystem()?;
        Ok(())
    }

    /// Build the card hierarchy described by `files`
    pub fn build_filesystem(&self) -> Result<FileSystem, ConfigError> {
        let mut fs = FileSystem::new();
        for file in &self.files {
            match file.kind {
                FileKind::Df => fs.add_df(file.parent, file.fid)?,
                FileKind::Ef => fs.add_ef(file.parent, file.fid)?,
            }
        }
        Ok(fs)
    }

    /// ATR announced on power on
    pub fn atr(&self) -> Vec<u8> {
        atr::build_atr(&self.historical_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.slots.len(), 1);
        assert!(config.slots[0].card_present);
        assert!(config.validate().is_ok());
        assert_eq!(config.build_filesystem().unwrap().len(), 1);
        assert_eq!(config.atr()[0], 0x3B);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "slots": [{ "card_present": true }, { "card_present": false }, {}],
            "historical_bytes": "AQID",
            "files": [
                { "fid": 20480, "kind": "df" },
                { "fid": 20481, "parent": 20480, "kind": "ef" }
            ]
        }"#;
        let config = ReaderConfig::from_json(json).unwrap();
        assert_eq!(config.slots.len(), 3);
        assert!(!config.slots[1].card_present);
        assert!(config.slots[2].card_present);
        assert_eq!(config.historical_bytes, vec![1, 2, 3]);

        let fs = config.build_filesystem().unwrap();
        assert_eq!(fs.parent_of(0x5001).unwrap().fid(), 0x5000);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = ReaderConfig::from_json("{}").unwrap();
        assert_eq!(config, ReaderConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            ReaderConfig::from_json(r#"{ "slots": [] }"#),
            Err(ConfigError::NoSlots)
        ));

        let long = ReaderConfig {
            historical_bytes: vec![0; 16],
            ..Default::default()
        };
        assert!(matches!(long.validate(), Err(ConfigError::HistoricalBytesTooLong(16))));

        let orphan = r#"{ "files": [{ "fid": 4096, "parent": 8192, "kind": "ef" }] }"#;
        assert!(matches!(
            ReaderConfig::from_json(orphan),
            Err(ConfigError::FileSystem(FileSystemError::ParentNotFound(0x2000)))
        ));

        assert!(matches!(ReaderConfig::from_json("not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ReaderConfig::load(Some(temp_dir.path().join("absent.json"))).unwrap();
        assert_eq!(config, ReaderConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("reader.json");

        let config = ReaderConfig {
            slots: vec![SlotConfig::default(), SlotConfig { card_present: false }],
            historical_bytes: b"test".to_vec(),
            files: vec![FileConfig {
                fid: 0x2F00,
                parent: MF_ID,
                kind: FileKind::Ef,
            }],
        };
        config.save(&path).unwrap();

        let loaded = ReaderConfig::load(Some(path)).unwrap();
        assert_eq!(loaded, config);
    }
}
