//! Editing support for HAL-style relocatable `.dat` containers.
//!
//! [`DatFile`] owns an in-memory copy of a container and keeps it consistent
//! across size-changing edits: stored pointers, the pointer table, node
//! tables, live views and aligned texture data all move with every insertion
//! or removal. [`MovesetDatFile`] walks fighter movesets on top of that, and
//! [`script`] decodes and encodes their bit-packed event scripts.

pub mod align;
pub mod attributes;
pub mod bits;
pub mod builder;
pub mod dat;
pub mod error;
pub mod fsm;
pub mod layout;
pub mod moveset;
pub mod reloc;
pub mod scene;
pub mod script;
pub mod store;
pub mod view;

pub use attributes::{AttributeSource, NoAttributes, TableSchema, YamlAttributes};
pub use builder::DatBuilder;
pub use dat::{DatFile, HEADER_SIZE};
pub use error::{DatError, Result};
pub use fsm::{FsmDatFile, FsmEntry};
pub use layout::{FieldRef, Record, RecordLayout, Value};
pub use moveset::{Article, MovesetDatFile, MovesetQuirk, SubactionEntry};
pub use script::{Event, EventSchema, EventSchemas, FieldValue, Script, ScriptKind};
pub use view::{StructView, TableView, ViewId};
