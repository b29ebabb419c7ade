//! Fixed-size big-endian record layouts.
//!
//! A layout is described by a struct format string (`>IIIf`, `>4I2f`, ...)
//! and an optional list of field names. Offsets and the name lookup table are
//! computed once when the layout is built; views share layouts through `Rc`.

use std::collections::HashMap;
use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{DatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl FieldType {
    pub fn from_format_char(c: char) -> Option<Self> {
        Some(match c {
            'B' => FieldType::U8,
            'b' => FieldType::I8,
            'H' => FieldType::U16,
            'h' => FieldType::I16,
            'I' | 'L' => FieldType::U32,
            'i' | 'l' => FieldType::I32,
            'f' => FieldType::F32,
            _ => return None,
        })
    }

    pub fn size(self) -> usize {
        match self {
            FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 | FieldType::F32 => 4,
        }
    }
}

/// One decoded field value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::U8(_) => FieldType::U8,
            Value::I8(_) => FieldType::I8,
            Value::U16(_) => FieldType::U16,
            Value::I16(_) => FieldType::I16,
            Value::U32(_) => FieldType::U32,
            Value::I32(_) => FieldType::I32,
            Value::F32(_) => FieldType::F32,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v as i64),
            Value::I8(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::F32(_) => None,
        }
    }

    /// The value as an unsigned 32-bit word; pointer fields use this.
    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().map(|v| v as u32)
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Converts between integer widths (wrapping, as a C cast would).
    /// Floats only convert to floats.
    pub fn coerce(self, ty: FieldType) -> Option<Value> {
        Some(match ty {
            FieldType::F32 => Value::F32(self.as_f32()?),
            FieldType::U8 => Value::U8(self.as_i64()? as u8),
            FieldType::I8 => Value::I8(self.as_i64()? as i8),
            FieldType::U16 => Value::U16(self.as_i64()? as u16),
            FieldType::I16 => Value::I16(self.as_i64()? as i16),
            FieldType::U32 => Value::U32(self.as_i64()? as u32),
            FieldType::I32 => Value::I32(self.as_i64()? as i32),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
        }
    }
}

pub type Record = Vec<Value>;

/// Field selector for record access: a position or a field name.
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for FieldRef<'_> {
    fn from(i: usize) -> Self {
        FieldRef::Index(i)
    }
}

impl<'a> From<&'a str> for FieldRef<'a> {
    fn from(name: &'a str) -> Self {
        FieldRef::Name(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub ty: FieldType,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct RecordLayout {
    format: String,
    fields: Vec<RecordField>,
    size: usize,
    by_name: HashMap<String, usize>,
}

impl RecordLayout {
    /// Parses a big-endian struct format. Names are matched to fields in
    /// order; missing names become `field<N>`. Duplicate names resolve to
    /// their first occurrence.
    pub fn parse<S: AsRef<str>>(format: &str, names: &[S]) -> Result<Self> {
        let body = format.strip_prefix('>').unwrap_or(format);
        let mut types = Vec::new();
        let mut count = String::new();
        for c in body.chars() {
            if c.is_ascii_digit() {
                count.push(c);
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            let ty = FieldType::from_format_char(c)
                .ok_or_else(|| DatError::Schema(format!("unsupported format char '{}' in '{}'", c, format)))?;
            let repeat = if count.is_empty() {
                1
            } else {
                count
                    .parse::<usize>()
                    .map_err(|e| DatError::Schema(format!("bad repeat count in '{}': {}", format, e)))?
            };
            count.clear();
            types.extend(std::iter::repeat(ty).take(repeat));
        }
        if !count.is_empty() {
            return Err(DatError::Schema(format!("dangling repeat count in '{}'", format)));
        }

        let mut fields = Vec::with_capacity(types.len());
        let mut by_name = HashMap::new();
        let mut offset = 0;
        for (i, ty) in types.into_iter().enumerate() {
            let name = names
                .get(i)
                .map(|n| n.as_ref().to_string())
                .unwrap_or_else(|| format!("field{}", i));
            by_name.entry(name.clone()).or_insert(i);
            fields.push(RecordField { name, ty, offset });
            offset += ty.size();
        }

        Ok(Self {
            format: format.to_string(),
            fields,
            size: offset,
            by_name,
        })
    }

    /// Unnamed layout.
    pub fn anonymous(format: &str) -> Result<Self> {
        Self::parse::<&str>(format, &[])
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[RecordField] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn index_of<'a>(&self, field: impl Into<FieldRef<'a>>) -> Result<usize> {
        match field.into() {
            FieldRef::Index(i) if i < self.fields.len() => Ok(i),
            FieldRef::Index(i) => Err(DatError::IndexOutOfRange {
                index: i,
                len: self.fields.len(),
            }),
            FieldRef::Name(name) => self
                .by_name
                .get(name)
                .copied()
                .ok_or_else(|| DatError::UnknownField(name.to_string())),
        }
    }

    pub fn offset_of<'a>(&self, field: impl Into<FieldRef<'a>>) -> Result<usize> {
        Ok(self.fields[self.index_of(field)?].offset)
    }

    pub fn unpack(&self, bytes: &[u8]) -> Result<Record> {
        if bytes.len() < self.size {
            return Err(DatError::OutOfBounds {
                offset: 0,
                len: self.size,
                size: bytes.len(),
            });
        }
        Ok(self
            .fields
            .iter()
            .map(|f| {
                let b = &bytes[f.offset..];
                match f.ty {
                    FieldType::U8 => Value::U8(b[0]),
                    FieldType::I8 => Value::I8(b[0] as i8),
                    FieldType::U16 => Value::U16(BigEndian::read_u16(b)),
                    FieldType::I16 => Value::I16(BigEndian::read_i16(b)),
                    FieldType::U32 => Value::U32(BigEndian::read_u32(b)),
                    FieldType::I32 => Value::I32(BigEndian::read_i32(b)),
                    FieldType::F32 => Value::F32(BigEndian::read_f32(b)),
                }
            })
            .collect())
    }

    pub fn pack(&self, values: &[Value]) -> Result<Vec<u8>> {
        if values.len() != self.fields.len() {
            return Err(DatError::InvalidValue(format!(
                "layout '{}' has {} fields, got {} values",
                self.format,
                self.fields.len(),
                values.len()
            )));
        }
        let mut out = vec![0u8; self.size];
        for (f, v) in self.fields.iter().zip(values) {
            self.pack_field(f, *v, &mut out[f.offset..])?;
        }
        Ok(out)
    }

    fn pack_field(&self, field: &RecordField, value: Value, out: &mut [u8]) -> Result<()> {
        let value = value.coerce(field.ty).ok_or_else(|| {
            DatError::InvalidValue(format!("{:?} does not fit field '{}' ({:?})", value, field.name, field.ty))
        })?;
        match value {
            Value::U8(v) => out[0] = v,
            Value::I8(v) => out[0] = v as u8,
            Value::U16(v) => BigEndian::write_u16(out, v),
            Value::I16(v) => BigEndian::write_i16(out, v),
            Value::U32(v) => BigEndian::write_u32(out, v),
            Value::I32(v) => BigEndian::write_i32(out, v),
            Value::F32(v) => BigEndian::write_f32(out, v),
        }
        Ok(())
    }
}
