//! Attribute table layouts.
//!
//! Attribute tables are runs of 4-byte fields described by YAML files that
//! map a byte offset to a name and a struct type character:
//!
//! ```yaml
//! length: 0x18c      # optional, otherwise last offset + 4
//! 0x00: { name: Initial Walk Velocity, type: f }
//! 0x64: { name: Jumpsquat, type: I }
//! ```
//!
//! `common/<kind>.yml` holds the attributes shared by every character,
//! `unique/<Character>.yml` holds the character's own table under
//! `unique attributes` and its articles under `articles`. Each directory may
//! provide a `_default.yml` fallback. Offsets missing from a table are
//! unnamed floats.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::{DatError, Result};
use crate::layout::RecordLayout;

const UNIQUE_KEY: &str = "unique attributes";
const DEFAULT_FILE: &str = "_default";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttributeEntry {
    pub name: String,
    #[serde(rename = "type", default = "AttributeEntry::default_type")]
    pub ty: char,
}

impl AttributeEntry {
    fn default_type() -> char {
        'f'
    }

    fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            ty: 'f',
        }
    }
}

/// Field names, struct format and byte length of one attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub names: Vec<String>,
    pub format: String,
    pub byte_length: usize,
}

impl TableSchema {
    /// Every 4-byte word from offset 0 to `length`, taking names and types
    /// from `entries` where listed.
    pub fn from_entries(entries: &BTreeMap<usize, AttributeEntry>, length: usize) -> Result<Self> {
        let mut names = Vec::with_capacity(length / 4);
        let mut format = String::from(">");
        let unknown = AttributeEntry::unknown();
        for offset in (0..length).step_by(4) {
            let entry = entries.get(&offset).unwrap_or(&unknown);
            if !matches!(entry.ty, 'f' | 'I' | 'i' | 'L' | 'l') {
                return Err(DatError::Schema(format!(
                    "attribute '{}' at 0x{:X} has type '{}', expected a 4-byte type",
                    entry.name, offset, entry.ty
                )));
            }
            names.push(entry.name.clone());
            format.push(entry.ty);
        }
        Ok(Self {
            names,
            format,
            byte_length: length - length % 4,
        })
    }

    /// Unnamed floats covering `length` bytes.
    pub fn generic(length: usize) -> Self {
        let words = length / 4;
        Self {
            names: vec!["Unknown".to_string(); words],
            format: format!(">{}", "f".repeat(words)),
            byte_length: words * 4,
        }
    }

    pub fn layout(&self) -> Result<RecordLayout> {
        RecordLayout::parse(&self.format, &self.names)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleInfo {
    pub name: String,
    pub variants: Vec<String>,
    pub attributes: BTreeMap<usize, AttributeEntry>,
}

impl ArticleInfo {
    /// Placeholder slots in the article list are named `(empty)`.
    pub fn is_placeholder(&self) -> bool {
        self.name.eq_ignore_ascii_case("(empty)")
    }
}

/// Where attribute layouts come from. `None` means no schema is known and
/// the caller falls back to [`TableSchema::generic`].
pub trait AttributeSource {
    fn common_table(&self, kind: &str) -> Result<Option<TableSchema>>;

    fn unique_table(&self, character: &str) -> Result<Option<TableSchema>>;

    fn article_info(&self, character: &str) -> Result<Vec<ArticleInfo>>;
}

/// No schema data at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAttributes;

impl AttributeSource for NoAttributes {
    fn common_table(&self, _kind: &str) -> Result<Option<TableSchema>> {
        Ok(None)
    }

    fn unique_table(&self, _character: &str) -> Result<Option<TableSchema>> {
        Ok(None)
    }

    fn article_info(&self, _character: &str) -> Result<Vec<ArticleInfo>> {
        Ok(Vec::new())
    }
}

/// Schema files under `<root>/common` and `<root>/unique`.
#[derive(Debug, Clone)]
pub struct YamlAttributes {
    root: PathBuf,
}

impl YamlAttributes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load(&self, dir: &str, name: &str) -> Result<Option<YamlValue>> {
        let path = self.root.join(dir).join(format!("{}.yml", name));
        read_yaml(&path)
    }

    fn load_with_default(&self, dir: &str, name: &str) -> Result<Option<YamlValue>> {
        match self.load(dir, name)? {
            Some(v) => Ok(Some(v)),
            None => {
                log::debug!("no {}/{}.yml, trying {}", dir, name, DEFAULT_FILE);
                self.load(dir, DEFAULT_FILE)
            }
        }
    }
}

fn read_yaml(path: &Path) -> Result<Option<YamlValue>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_yaml::from_str(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl AttributeSource for YamlAttributes {
    fn common_table(&self, kind: &str) -> Result<Option<TableSchema>> {
        self.load_with_default("common", kind)?
            .map(|doc| table_from_yaml(&doc))
            .transpose()
    }

    fn unique_table(&self, character: &str) -> Result<Option<TableSchema>> {
        let Some(doc) = self.load_with_default("unique", character)? else {
            return Ok(None);
        };
        let table = doc
            .get(UNIQUE_KEY)
            .ok_or_else(|| DatError::Schema(format!("unique schema for {} has no '{}'", character, UNIQUE_KEY)))?;
        table_from_yaml(table).map(Some)
    }

    fn article_info(&self, character: &str) -> Result<Vec<ArticleInfo>> {
        let Some(doc) = self.load("unique", character)? else {
            return Ok(Vec::new());
        };
        let Some(YamlValue::Sequence(articles)) = doc.get("articles") else {
            return Ok(Vec::new());
        };
        articles.iter().map(article_from_yaml).collect()
    }
}

fn offset_key(key: &YamlValue) -> Result<usize> {
    let parsed = match key {
        YamlValue::Number(n) => n.as_u64(),
        YamlValue::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    };
    parsed
        .map(|v| v as usize)
        .ok_or_else(|| DatError::Schema(format!("bad attribute offset {:?}", key)))
}

fn entries_from_yaml(map: &Mapping) -> Result<(BTreeMap<usize, AttributeEntry>, Option<usize>)> {
    let mut entries = BTreeMap::new();
    let mut length = None;
    for (key, value) in map {
        if key.as_str() == Some("length") {
            length = Some(offset_key(value)?);
            continue;
        }
        entries.insert(offset_key(key)?, serde_yaml::from_value(value.clone())?);
    }
    Ok((entries, length))
}

fn table_from_yaml(doc: &YamlValue) -> Result<TableSchema> {
    let map = doc
        .as_mapping()
        .ok_or_else(|| DatError::Schema("attribute table is not a mapping".to_string()))?;
    let (entries, length) = entries_from_yaml(map)?;
    let length = length.unwrap_or_else(|| entries.keys().next_back().map_or(0, |last| last + 4));
    TableSchema::from_entries(&entries, length)
}

fn article_from_yaml(doc: &YamlValue) -> Result<ArticleInfo> {
    let name = doc
        .get("name")
        .and_then(YamlValue::as_str)
        .ok_or_else(|| DatError::Schema("article without a name".to_string()))?
        .to_string();
    let variants = match doc.get("variants") {
        Some(v) => serde_yaml::from_value(v.clone())?,
        None => Vec::new(),
    };
    let attributes = match doc.get("attributes").and_then(YamlValue::as_mapping) {
        Some(map) => entries_from_yaml(map)?.0,
        None => BTreeMap::new(),
    };
    Ok(ArticleInfo {
        name,
        variants,
        attributes,
    })
}
