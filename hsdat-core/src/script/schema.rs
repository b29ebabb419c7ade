//! Event type tables.
//!
//! An event schema is a YAML mapping from event code to its layout:
//!
//! ```yaml
//! default:
//!   name: Unknown
//!   length: 4
//! 0x2C:
//!   name: Hitbox
//!   length: 20
//!   fields:
//!     - { name: ID, bits: [6, 8], type: u }
//!     - { name: Damage, bits: [23, 31], type: u }
//! 0x1C:
//!   name: Goto
//!   length: 8
//!   pointer: 4
//! ```
//!
//! Codes are the opcode shifted left by two. Codes that fit a byte use the
//! standard 6-bit opcode; larger codes are custom opcodes whose prefix is
//! `code >> 2`, `bit_length(code) - 2` bits wide unless `code_bits` says
//! otherwise. Field types are `u`, `s`, `h`, `f` and `f-upper`; `pointer` is
//! a byte offset (or list of offsets) of embedded 4-byte pointers.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::bits::read_bits;
use crate::error::{DatError, Result};
use crate::layout::FieldRef;

pub const BASE_CODE_BITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldKind {
    #[default]
    #[serde(rename = "u")]
    Unsigned,
    #[serde(rename = "s")]
    Signed,
    #[serde(rename = "h")]
    Hex,
    #[serde(rename = "f")]
    Float,
    #[serde(rename = "f-upper")]
    FloatUpper,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldDef {
    name: String,
    bits: [usize; 2],
    #[serde(rename = "type", default)]
    kind: FieldKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PointerDef {
    One(usize),
    Many(Vec<usize>),
}

#[derive(Debug, Clone, Deserialize)]
struct EventTypeDef {
    name: String,
    length: usize,
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(default)]
    pointer: Option<PointerDef>,
    #[serde(default)]
    code_bits: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventField {
    pub name: String,
    pub lo: usize,
    pub hi: usize,
    pub kind: FieldKind,
}

impl EventField {
    pub fn new(name: &str, lo: usize, hi: usize, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            lo,
            hi,
            kind,
        }
    }

    pub fn width(&self) -> usize {
        self.hi - self.lo + 1
    }
}

#[derive(Debug, Clone)]
pub struct EventType {
    pub name: String,
    pub length: usize,
    pub fields: Vec<EventField>,
    /// Byte offsets of embedded pointers, relative to the event start.
    pub pointers: Vec<usize>,
    /// Width of the opcode prefix identifying this type.
    pub code_bits: usize,
    by_name: HashMap<String, usize>,
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn default_code_bits(code: u32) -> usize {
    if code <= 0xFF {
        BASE_CODE_BITS
    } else {
        (32 - code.leading_zeros() as usize) - 2
    }
}

impl EventType {
    pub fn new(name: &str, length: usize, fields: Vec<EventField>, mut pointers: Vec<usize>, code_bits: usize) -> Result<Self> {
        pointers.sort_unstable();
        pointers.dedup();
        if length == 0 {
            return Err(DatError::Schema(format!("event '{}' has zero length", name)));
        }
        for f in &fields {
            let ok_width = match f.kind {
                FieldKind::Float => f.width() == 32,
                FieldKind::FloatUpper => f.width() == 16,
                _ => f.width() <= 64,
            };
            if f.lo > f.hi || f.hi >= length * 8 || !ok_width {
                return Err(DatError::Schema(format!(
                    "field '{}' of event '{}' has bad bits [{}, {}] for {:?}",
                    f.name, name, f.lo, f.hi, f.kind
                )));
            }
        }
        if let Some(p) = pointers.iter().find(|p| **p + 4 > length) {
            return Err(DatError::Schema(format!(
                "pointer at +{} does not fit event '{}' of length {}",
                p, name, length
            )));
        }
        let mut by_name = HashMap::new();
        for (i, f) in fields.iter().enumerate() {
            by_name.entry(normalize(&f.name)).or_insert(i);
        }
        Ok(Self {
            name: name.to_string(),
            length,
            fields,
            pointers,
            code_bits,
            by_name,
        })
    }

    /// Field lookup; names ignore case, spaces, dashes and underscores.
    pub fn field_index<'a>(&self, field: impl Into<FieldRef<'a>>) -> Result<usize> {
        match field.into() {
            FieldRef::Index(i) if i < self.fields.len() => Ok(i),
            FieldRef::Index(i) => Err(DatError::IndexOutOfRange {
                index: i,
                len: self.fields.len(),
            }),
            FieldRef::Name(name) => self
                .by_name
                .get(&normalize(name))
                .copied()
                .ok_or_else(|| DatError::UnknownField(format!("{} (in {})", name, self.name))),
        }
    }
}

/// Result of matching the start of an event.
#[derive(Debug, Clone)]
pub enum Lookup {
    Known(u32, Rc<EventType>),
    /// No entry for this code; the schema's default layout applies.
    Unknown(u32, Rc<EventType>),
}

impl Lookup {
    pub fn code(&self) -> u32 {
        match self {
            Lookup::Known(c, _) | Lookup::Unknown(c, _) => *c,
        }
    }

    pub fn event_type(&self) -> &Rc<EventType> {
        match self {
            Lookup::Known(_, t) | Lookup::Unknown(_, t) => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSchema {
    types: HashMap<u32, Rc<EventType>>,
    /// Custom prefix tables, widest first: (width, prefix -> code).
    custom: Vec<(usize, HashMap<u64, u32>)>,
    default: Rc<EventType>,
    lookahead: usize,
}

impl EventSchema {
    fn from_types(types: Vec<(u32, EventType)>, default: EventType) -> Result<Self> {
        let mut by_code = HashMap::new();
        let mut custom: HashMap<usize, HashMap<u64, u32>> = HashMap::new();
        let mut lookahead = 1;
        for (code, ty) in types {
            let width = ty.code_bits;
            if width < BASE_CODE_BITS || width > 64 {
                return Err(DatError::Schema(format!(
                    "event 0x{:X} has an opcode width of {} bits",
                    code, width
                )));
            }
            let prefix = (code >> 2) as u64;
            if width < 64 && prefix >> width != 0 {
                return Err(DatError::Schema(format!(
                    "event 0x{:X} does not fit in {} opcode bits",
                    code, width
                )));
            }
            if width == BASE_CODE_BITS && code & 0x3 != 0 {
                return Err(DatError::Schema(format!("event code 0x{:X} is not a multiple of 4", code)));
            }
            if width > BASE_CODE_BITS {
                custom.entry(width).or_default().insert(prefix, code);
            }
            lookahead = lookahead.max(width.div_ceil(8));
            by_code.insert(code, Rc::new(ty));
        }
        let mut custom: Vec<_> = custom.into_iter().collect();
        custom.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(Self {
            types: by_code,
            custom,
            default: Rc::new(default),
            lookahead,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let root: Mapping = serde_yaml::from_str(text)?;
        let mut types = Vec::new();
        let mut default = None;
        for (key, value) in root {
            let def: EventTypeDef = serde_yaml::from_value(value)?;
            let pointers = match def.pointer {
                None => vec![],
                Some(PointerDef::One(p)) => vec![p],
                Some(PointerDef::Many(ps)) => ps,
            };
            let fields = def
                .fields
                .iter()
                .map(|f| EventField::new(&f.name, f.bits[0], f.bits[1], f.kind))
                .collect();
            match parse_code(&key)? {
                None => {
                    default = Some(EventType::new(&def.name, def.length, fields, pointers, BASE_CODE_BITS)?);
                }
                Some(code) => {
                    let code_bits = def.code_bits.unwrap_or_else(|| default_code_bits(code));
                    types.push((code, EventType::new(&def.name, def.length, fields, pointers, code_bits)?));
                }
            }
        }
        let default = match default {
            Some(d) => d,
            None => EventType::new("Unknown", 4, vec![], vec![], BASE_CODE_BITS)?,
        };
        Self::from_types(types, default)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatError::SchemaMissing(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_yaml_str(&text)
    }

    /// Loads `path`, or falls back to [`EventSchema::minimal`] when there is
    /// no file.
    pub fn load_or_minimal(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::minimal();
        };
        match Self::from_path(path) {
            Err(DatError::SchemaMissing(p)) => {
                log::warn!("event schema {} not found, using control-flow events only", p);
                Self::minimal()
            }
            other => other,
        }
    }

    /// Terminator, return and goto only; everything else decodes as 4-byte
    /// unknown events.
    pub fn minimal() -> Result<Self> {
        let types = vec![
            (0x00, EventType::new("End of Script", 4, vec![], vec![], BASE_CODE_BITS)?),
            (0x18, EventType::new("Return", 4, vec![], vec![], BASE_CODE_BITS)?),
            (
                0x1C,
                EventType::new(
                    "Goto",
                    8,
                    vec![EventField::new("target", 32, 63, FieldKind::Hex)],
                    vec![4],
                    BASE_CODE_BITS,
                )?,
            ),
        ];
        Self::from_types(types, EventType::new("Unknown", 4, vec![], vec![], BASE_CODE_BITS)?)
    }

    pub fn get(&self, code: u32) -> Option<&Rc<EventType>> {
        self.types.get(&code)
    }

    pub fn default_type(&self) -> &Rc<EventType> {
        &self.default
    }

    /// Layout for `code`, falling back to the default entry.
    pub fn event_type(&self, code: u32) -> Rc<EventType> {
        self.types.get(&code).unwrap_or(&self.default).clone()
    }

    /// Bytes needed to identify any opcode in this schema.
    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Identifies the event starting at `window`. Custom prefixes are tried
    /// widest first, then the 6-bit base opcode. `None` for an empty window.
    pub fn identify(&self, window: &[u8]) -> Option<Lookup> {
        for (width, prefixes) in &self.custom {
            if window.len() * 8 < *width {
                continue;
            }
            let prefix = read_bits(window, 0, width - 1);
            if let Some(code) = prefixes.get(&prefix) {
                return Some(Lookup::Known(*code, self.types[code].clone()));
            }
        }
        let code = (*window.first()? & 0xFC) as u32;
        Some(match self.types.get(&code) {
            Some(ty) if ty.code_bits == BASE_CODE_BITS => Lookup::Known(code, ty.clone()),
            _ => Lookup::Unknown(code, self.default.clone()),
        })
    }
}

fn parse_code(key: &YamlValue) -> Result<Option<u32>> {
    let code = match key {
        YamlValue::Number(n) => n.as_u64(),
        YamlValue::String(s) if s == "default" => return Ok(None),
        YamlValue::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse::<u64>().ok(),
        },
        _ => None,
    };
    code.and_then(|c| u32::try_from(c).ok())
        .map(Some)
        .ok_or_else(|| DatError::Schema(format!("bad event code key {:?}", key)))
}
