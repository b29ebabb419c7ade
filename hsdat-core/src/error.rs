use thiserror::Error;

use crate::view::ViewId;

#[derive(Debug, Error)]
pub enum DatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid hex string: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("index {index} out of range for table of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("offset 0x{offset:X} (+{len}) is outside the buffer (size 0x{size:X})")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("pointer 0x{0:X} not found in pointer table")]
    PointerNotFound(u32),

    #[error("value {0} not found in table")]
    ValueNotFound(String),

    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    #[error("view {0:?} is no longer registered with this container")]
    StaleView(ViewId),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("event '{name}' is {expected} bytes long, got {actual}")]
    EventLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("event stream truncated at 0x{offset:X}")]
    TruncatedStream { offset: usize },

    #[error("schema not found: {0}")]
    SchemaMissing(String),

    #[error("schema error: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, DatError>;

impl DatError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DatError::MalformedContainer(msg.into())
    }
}
