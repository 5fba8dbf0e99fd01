//! Declarative description of an entry: groups, fields and links.
//!
//! This is the JSON stand-in for the XML schema: each field carries its
//! type name, per-step shape, write strategy and optional data source.

use nxswriter_core::{Error, Result, TypeCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// When a field receives its data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strategy {
    /// Once, when the entry is opened.
    #[default]
    Init,
    /// On every step; a field with a source grows along its growth axis.
    Step,
    /// Once, when the entry is closed.
    Final,
    /// Left for post-processing; only the `postrun` label is stored.
    Postrun,
}

impl Strategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Init => "INIT",
            Strategy::Step => "STEP",
            Strategy::Final => "FINAL",
            Strategy::Postrun => "POSTRUN",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INIT" => Ok(Strategy::Init),
            "STEP" => Ok(Strategy::Step),
            "FINAL" => Ok(Strategy::Final),
            "POSTRUN" => Ok(Strategy::Postrun),
            other => Err(Error::Config(format!("unknown strategy {other}"))),
        }
    }
}

fn default_type() -> String {
    "string".to_string()
}

/// Compression requested by a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Deflate level 0-9; the writer default when unset.
    pub rate: Option<u8>,
    /// Byte shuffle before deflate; the writer default when unset.
    pub shuffle: Option<bool>,
}

/// One field of the layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// Portable tag (`float64`) or NeXus type name (`NX_FLOAT64`).
    #[serde(rename = "type", default = "default_type")]
    pub nexus_type: String,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub strategy: Strategy,
    /// Key of the step record supplying this field's data.
    #[serde(default)]
    pub source: Option<String>,
    /// Per-step shape; `[]` for scalars, 0 for an axis of unknown length.
    #[serde(default)]
    pub shape: Vec<usize>,
    /// 1-based growth axis of a growing field; defaults to 1.
    #[serde(default)]
    pub grows: Option<usize>,
    /// Per-field override of the can-fail policy.
    #[serde(default)]
    pub canfail: Option<bool>,
    #[serde(default)]
    pub compression: Option<CompressionConfig>,
    /// Label stored with `POSTRUN` fields.
    #[serde(default)]
    pub postrun: Option<String>,
    /// Static text written when the field has no source.
    #[serde(default)]
    pub content: Option<String>,
    /// Extra string attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl FieldConfig {
    #[must_use]
    pub fn new(name: &str, nexus_type: &str) -> Self {
        Self {
            name: name.to_string(),
            nexus_type: nexus_type.to_string(),
            units: None,
            strategy: Strategy::Init,
            source: None,
            shape: Vec::new(),
            grows: None,
            canfail: None,
            compression: None,
            postrun: None,
            content: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Field filled from `source` on every step.
    #[must_use]
    pub fn step(name: &str, nexus_type: &str, source: &str) -> Self {
        Self::new(name, nexus_type)
            .with_strategy(Strategy::Step)
            .with_source(source)
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = shape.to_vec();
        self
    }

    #[must_use]
    pub fn with_grows(mut self, grows: usize) -> Self {
        self.grows = Some(grows);
        self
    }

    #[must_use]
    pub fn with_canfail(mut self, canfail: bool) -> Self {
        self.canfail = Some(canfail);
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Resolved element type.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] for an unknown type name.
    pub fn dtype(&self) -> Result<TypeCode> {
        TypeCode::resolve(&self.nexus_type)
    }
}

/// Link created inside a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkLayout {
    pub name: String,
    /// `"/path"` or `"file:/path"`.
    pub target: String,
}

/// Group with its children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupLayout {
    pub name: String,
    pub nxclass: String,
    pub groups: Vec<GroupLayout>,
    pub fields: Vec<FieldConfig>,
    pub links: Vec<LinkLayout>,
}

/// Top-level `NXentry` group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryLayout {
    #[serde(default = "default_entry_name")]
    pub name: String,
    #[serde(default)]
    pub groups: Vec<GroupLayout>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub links: Vec<LinkLayout>,
}

fn default_entry_name() -> String {
    "entry".to_string()
}

impl Default for EntryLayout {
    fn default() -> Self {
        Self {
            name: default_entry_name(),
            groups: Vec::new(),
            fields: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl EntryLayout {
    /// Load a layout from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not a valid layout.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|e| Error::Config(format!("layout: {e}")))
    }

    /// Load a layout from a JSON string.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the string is not a valid layout.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("layout: {e}")))
    }

    /// Every field of the entry, depth first.
    #[must_use]
    pub fn all_fields(&self) -> Vec<&FieldConfig> {
        fn collect<'a>(group: &'a GroupLayout, out: &mut Vec<&'a FieldConfig>) {
            out.extend(group.fields.iter());
            for child in &group.groups {
                collect(child, out);
            }
        }
        let mut fields: Vec<&FieldConfig> = self.fields.iter().collect();
        for group in &self.groups {
            collect(group, &mut fields);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_json() {
        let json = r#"{
            "groups": [{
                "name": "instrument",
                "nxclass": "NXinstrument",
                "groups": [{
                    "name": "detector",
                    "nxclass": "NXdetector",
                    "fields": [{
                        "name": "data",
                        "type": "NX_UINT32",
                        "strategy": "STEP",
                        "source": "pilatus",
                        "shape": [195, 487],
                        "compression": {"rate": 2}
                    }]
                }]
            }],
            "fields": [
                {"name": "title", "content": "calibration"},
                {"name": "energy", "type": "NX_FLOAT64", "units": "keV",
                 "strategy": "STEP", "source": "mono", "canfail": true}
            ],
            "links": [{"name": "data", "target": "/entry/instrument/detector/data"}]
        }"#;
        let layout = EntryLayout::from_json(json).unwrap();
        assert_eq!(layout.name, "entry");
        let fields = layout.all_fields();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["title", "energy", "data"]);

        let title = fields[0];
        assert_eq!(title.nexus_type, "string");
        assert_eq!(title.strategy, Strategy::Init);
        assert_eq!(title.dtype().unwrap(), TypeCode::String);

        let data = fields[2];
        assert_eq!(data.dtype().unwrap(), TypeCode::UInt32);
        assert_eq!(data.shape, vec![195, 487]);
        assert_eq!(
            data.compression,
            Some(CompressionConfig {
                rate: Some(2),
                shuffle: None
            })
        );
        assert_eq!(fields[1].canfail, Some(true));
    }

    #[test]
    fn test_bad_layout() {
        let err = EntryLayout::from_json(r#"{"fields": [{"type": "NX_INT"}]}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!("sometimes".parse::<Strategy>().is_err());
        assert_eq!("postrun".parse::<Strategy>().unwrap(), Strategy::Postrun);
    }
}
