//! Bit-packed event scripts.
//!
//! A script is a sequence of variable-length events. The first bits of an
//! event select its type from an [`EventSchema`]; the type gives the event
//! length and the bit ranges of its fields.

pub mod codec;
pub mod event;
pub mod schema;

use std::path::Path;
use std::rc::Rc;

pub use codec::{encode_script, iter_script, pointer_offsets, read_event, read_script, script_length, Script};
pub use event::{Event, FieldValue};
pub use schema::{EventField, EventSchema, EventType, FieldKind, Lookup};

use crate::error::Result;

/// Which event table a script is decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Fighter,
    Article,
}

/// Event tables for fighter and article scripts.
#[derive(Debug, Clone)]
pub struct EventSchemas {
    pub fighter: Rc<EventSchema>,
    pub article: Rc<EventSchema>,
}

impl EventSchemas {
    /// Article scripts share the fighter table.
    pub fn shared(schema: EventSchema) -> Self {
        let schema = Rc::new(schema);
        Self {
            fighter: schema.clone(),
            article: schema,
        }
    }

    /// Loads both tables; a missing fighter table falls back to the minimal
    /// control-flow table and a missing article table to the fighter one.
    pub fn load(fighter: Option<&Path>, article: Option<&Path>) -> Result<Self> {
        let fighter = Rc::new(EventSchema::load_or_minimal(fighter)?);
        let article = match article {
            Some(path) if path.exists() => Rc::new(EventSchema::from_path(path)?),
            Some(path) => {
                log::warn!("article event schema {} not found, using the fighter table", path.display());
                fighter.clone()
            }
            None => fighter.clone(),
        };
        Ok(Self { fighter, article })
    }

    pub fn for_kind(&self, kind: ScriptKind) -> &EventSchema {
        match kind {
            ScriptKind::Fighter => &self.fighter,
            ScriptKind::Article => &self.article,
        }
    }
}
