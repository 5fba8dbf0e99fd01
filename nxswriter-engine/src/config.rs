//! Process-wide writer defaults.

use nxswriter_core::{Error, Result};
use nxswriter_io::{Deflate, LibVersion};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Defaults applied to every session of a writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriterConfig {
    /// Can-fail policy for fields that do not set their own.
    pub default_canfail: bool,
    /// Truncate an existing output file instead of failing.
    pub overwrite: bool,
    /// Filter knobs for fields requesting compression without their own.
    pub compression: Deflate,
    /// File format bound used when the file is reopened.
    pub libver: LibVersion,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            default_canfail: false,
            overwrite: false,
            compression: Deflate::default(),
            libver: LibVersion::Earliest,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonConfig {
    default_canfail: bool,
    overwrite: bool,
    compression: JsonCompression,
    libver: String,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            default_canfail: false,
            overwrite: false,
            compression: JsonCompression::default(),
            libver: "earliest".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonCompression {
    rate: u8,
    shuffle: bool,
}

impl Default for JsonCompression {
    fn default() -> Self {
        let filter = Deflate::default();
        Self {
            rate: filter.rate(),
            shuffle: filter.shuffle(),
        }
    }
}

impl WriterConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// for malformed or out-of-range settings.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: JsonConfig =
            serde_json::from_reader(reader).map_err(|e| Error::Config(e.to_string()))?;
        Self::from_json_config(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for malformed or out-of-range settings.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: JsonConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        Self::from_json_config(config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let libver = match config.libver.to_ascii_lowercase().as_str() {
            "earliest" => LibVersion::Earliest,
            "latest" => LibVersion::Latest,
            other => return Err(Error::Config(format!("unknown libver {other}"))),
        };
        let compression = Deflate::new(config.compression.rate, config.compression.shuffle)
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            default_canfail: config.default_canfail,
            overwrite: config.overwrite,
            compression,
            libver,
        })
    }
}
