use std::fmt;
use std::rc::Rc;

use bitvec::prelude::*;
use itertools::Itertools;

use crate::bits::{clamp_signed, clamp_unsigned, mask, read_bits, sign_extend, write_bits};
use crate::error::{DatError, Result};
use crate::layout::FieldRef;
use crate::script::schema::{EventSchema, EventType, FieldKind, Lookup};

/// Decoded value of one event field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Hex(u64),
    Float(f32),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Signed(v) => write!(f, "{}", v),
            FieldValue::Hex(v) => write!(f, "0x{:X}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// One script instruction: its code, its layout and its raw bytes.
///
/// The length is fixed by the layout; fields are read from and written to
/// the raw bytes, so encoding an event returns exactly the bytes it was
/// decoded from.
#[derive(Debug, Clone)]
pub struct Event {
    code: u32,
    kind: Rc<EventType>,
    data: BitVec<u8, Msb0>,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.data == other.data
    }
}

impl Event {
    /// Decodes one event from exactly its own bytes.
    pub fn from_bytes(schema: &EventSchema, bytes: &[u8]) -> Result<Self> {
        let lookup = schema
            .identify(bytes)
            .ok_or(DatError::TruncatedStream { offset: 0 })?;
        Self::with_lookup(lookup, bytes)
    }

    pub(crate) fn with_lookup(lookup: Lookup, bytes: &[u8]) -> Result<Self> {
        if let Lookup::Unknown(code, _) = &lookup {
            log::debug!("unknown event code 0x{:02X}, using default layout", code);
        }
        let code = lookup.code();
        let kind = lookup.event_type().clone();
        if bytes.len() != kind.length {
            return Err(DatError::EventLength {
                name: kind.name.clone(),
                expected: kind.length,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            code,
            kind,
            data: BitVec::from_slice(bytes),
        })
    }

    /// A zeroed event carrying only its opcode.
    pub fn blank(schema: &EventSchema, code: u32) -> Result<Self> {
        let kind = schema
            .get(code)
            .cloned()
            .ok_or_else(|| DatError::InvalidValue(format!("no event with code 0x{:X}", code)))?;
        let mut bytes = vec![0u8; kind.length];
        let width = kind.code_bits;
        write_bits(&mut bytes, 0, width - 1, (code >> 2) as u64 & mask(width));
        Ok(Self {
            code,
            kind,
            data: BitVec::from_vec(bytes),
        })
    }

    pub fn from_fields(schema: &EventSchema, code: u32, values: &[FieldValue]) -> Result<Self> {
        let mut event = Self::blank(schema, code)?;
        if values.len() != event.kind.fields.len() {
            return Err(DatError::InvalidValue(format!(
                "'{}' has {} fields, got {} values",
                event.kind.name,
                event.kind.fields.len(),
                values.len()
            )));
        }
        for (i, v) in values.iter().enumerate() {
            event.set(i, *v)?;
        }
        Ok(event)
    }

    /// Parses hex such as `"0x2C00000A"` or `"2c 00 00 0a"`.
    pub fn from_hex(schema: &EventSchema, text: &str) -> Result<Self> {
        let text = text.trim();
        let text = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
        let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        Self::from_bytes(schema, &hex::decode(digits)?)
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn name(&self) -> &str {
        &self.kind.name
    }

    pub fn event_type(&self) -> &EventType {
        &self.kind
    }

    pub fn len(&self) -> usize {
        self.kind.length
    }

    pub fn is_empty(&self) -> bool {
        self.kind.length == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_raw_slice()
    }

    /// All-zero data: the script terminator.
    pub fn is_terminator(&self) -> bool {
        self.data.not_any()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.kind.fields.iter().map(|f| f.name.as_str())
    }

    /// Byte offsets of embedded pointers, relative to the event start.
    pub fn pointers(&self) -> &[usize] {
        &self.kind.pointers
    }

    /// Raw bits of a field as an unsigned integer.
    pub fn raw<'a>(&self, field: impl Into<FieldRef<'a>>) -> Result<u64> {
        let f = &self.kind.fields[self.kind.field_index(field)?];
        Ok(read_bits(self.as_bytes(), f.lo, f.hi))
    }

    /// Stores raw bits, saturating values wider than the field.
    pub fn set_raw<'a>(&mut self, field: impl Into<FieldRef<'a>>, value: u64) -> Result<()> {
        let f = self.kind.fields[self.kind.field_index(field)?].clone();
        write_bits(self.data.as_raw_mut_slice(), f.lo, f.hi, clamp_unsigned(value, f.width()));
        Ok(())
    }

    pub fn get<'a>(&self, field: impl Into<FieldRef<'a>>) -> Result<FieldValue> {
        let f = &self.kind.fields[self.kind.field_index(field)?];
        let raw = read_bits(self.as_bytes(), f.lo, f.hi);
        Ok(match f.kind {
            FieldKind::Unsigned => FieldValue::Unsigned(raw),
            FieldKind::Signed => FieldValue::Signed(sign_extend(raw, f.width())),
            FieldKind::Hex => FieldValue::Hex(raw),
            FieldKind::Float => FieldValue::Float(f32::from_bits(raw as u32)),
            FieldKind::FloatUpper => FieldValue::Float(f32::from_bits((raw as u32) << 16)),
        })
    }

    /// Stores a value interpreted through the field's type. Integers wider
    /// than the field saturate; negative integers are stored in two's
    /// complement. Half floats keep the upper 16 bits of the float32.
    pub fn set<'a>(&mut self, field: impl Into<FieldRef<'a>>, value: FieldValue) -> Result<()> {
        let f = self.kind.fields[self.kind.field_index(field)?].clone();
        let width = f.width();
        let raw = match (f.kind, value) {
            (FieldKind::Float, FieldValue::Float(v)) => v.to_bits() as u64,
            (FieldKind::FloatUpper, FieldValue::Float(v)) => (v.to_bits() >> 16) as u64,
            (FieldKind::Float | FieldKind::FloatUpper, other) => {
                return Err(DatError::InvalidValue(format!("field '{}' needs a float, got {}", f.name, other)))
            }
            (_, FieldValue::Signed(v)) => clamp_signed(v, width),
            (_, FieldValue::Unsigned(v) | FieldValue::Hex(v)) => clamp_unsigned(v, width),
            (_, FieldValue::Float(v)) => clamp_signed(v as i64, width),
        };
        write_bits(self.data.as_raw_mut_slice(), f.lo, f.hi, raw);
        Ok(())
    }

    pub fn values(&self) -> Result<Vec<FieldValue>> {
        (0..self.kind.fields.len()).map(|i| self.get(i)).collect()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.fields.is_empty() {
            return write!(f, "{}: 0x{}", self.kind.name, hex::encode_upper(self.as_bytes()));
        }
        let fields = self
            .kind
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| match self.get(i) {
                Ok(v) => format!("{}={}", field.name, v),
                Err(_) => format!("{}=?", field.name),
            })
            .join(", ");
        write!(f, "{}({})", self.kind.name, fields)
    }
}
