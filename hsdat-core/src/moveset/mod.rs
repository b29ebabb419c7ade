//! Fighter moveset containers.
//!
//! The first root node points at an index of 0x18 pointers. The slots used
//! here are:
//!
//! | slot | contents                                                  |
//! |------|-----------------------------------------------------------|
//! | 0    | common attributes                                         |
//! | 1    | unique attributes                                         |
//! | 3    | local subaction table                                     |
//! | 5    | nonlocal subaction table (ends the local one)             |
//! | 7    | pointer chain to the end of the nonlocal table            |
//! | 12   | hurtbox header (count, table pointer)                     |
//! | 17   | ledge grab box                                            |
//! | 18   | article pointer list                                      |
//! | 23   | model root joint                                          |

mod article;

use std::collections::BTreeSet;
use std::path::Path;
use std::rc::Rc;

use serde::Serialize;

pub use article::Article;

use crate::attributes::{AttributeSource, TableSchema};
use crate::dat::{DatFile, HEADER_SIZE};
use crate::error::{DatError, Result};
use crate::layout::{Record, RecordLayout, Value};
use crate::scene::{SceneGraph, IMAGE_ALIGNMENT};
use crate::script::{pointer_offsets, read_script, script_length, Event, EventSchemas, Script, ScriptKind};
use crate::view::{StructView, TableView};

pub const INDEX_LENGTH: usize = 0x18;
pub const DEFAULT_SUBROUTINE_DEPTH: usize = 5;
const FIGHTER_TITLE_PREFIX: &str = "ftData";
const COMMON_TABLE_KIND: &str = "default";

const SLOT_COMMON_ATTRIBUTES: usize = 0;
const SLOT_UNIQUE_ATTRIBUTES: usize = 1;
const SLOT_SUBACTIONS: usize = 3;
const SLOT_NONLOCAL_SUBACTIONS: usize = 5;
const SLOT_NONLOCAL_END: usize = 7;
const SLOT_HURTBOXES: usize = 12;
const SLOT_LEDGE_GRAB: usize = 17;
const SLOT_ARTICLES: usize = 18;
const SLOT_SCENE_ROOT: usize = 23;

const HURTBOX_FORMAT: &str = ">IIIfffffff";
const HURTBOX_NAMES: [&str; 10] = ["bone", "unknown_0x4", "unknown_0x8", "x1", "y1", "z1", "x2", "y2", "z2", "scale"];
const LEDGE_GRAB_FORMAT: &str = ">IIIIfff";
const LEDGE_GRAB_NAMES: [&str; 7] = [
    "Unknown",
    "Unknown",
    "Unknown",
    "Unknown",
    "Horizontal Scale",
    "Vertical Offset",
    "Vertical Scale",
];

/// Per-character layout differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovesetQuirk {
    Standard,
    /// Characters with more local subactions than usual (Kirby).
    ExtendedSubactions,
}

impl MovesetQuirk {
    pub fn for_character(character: &str) -> Self {
        match character {
            "Kirby" => MovesetQuirk::ExtendedSubactions,
            _ => MovesetQuirk::Standard,
        }
    }

    /// First subaction id served by the nonlocal table.
    pub fn subaction_divider(self) -> usize {
        match self {
            MovesetQuirk::Standard => 0x155,
            MovesetQuirk::ExtendedSubactions => 0x1DF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SubactionEntry {
    pub name_pointer: u32,
    pub animation_offset: u32,
    pub animation_size: u32,
    pub script_pointer: u32,
    pub flags: u32,
    pub reserved: u32,
}

impl SubactionEntry {
    pub const SIZE: usize = 0x18;
    const FORMAT: &'static str = ">IIIIII";
    const NAMES: [&'static str; 6] = [
        "name_pointer",
        "animation_offset",
        "animation_size",
        "script_pointer",
        "flags",
        "reserved",
    ];

    pub fn layout() -> Result<RecordLayout> {
        RecordLayout::parse(Self::FORMAT, &Self::NAMES)
    }

    fn from_record(r: &Record) -> Self {
        let w = |i: usize| r.get(i).and_then(Value::as_u32).unwrap_or(0);
        Self {
            name_pointer: w(0),
            animation_offset: w(1),
            animation_size: w(2),
            script_pointer: w(3),
            flags: w(4),
            reserved: w(5),
        }
    }

    fn to_record(self) -> Record {
        vec![
            Value::U32(self.name_pointer),
            Value::U32(self.animation_offset),
            Value::U32(self.animation_size),
            Value::U32(self.script_pointer),
            Value::U32(self.flags),
            Value::U32(self.reserved),
        ]
    }
}

#[derive(Debug)]
pub struct MovesetDatFile {
    dat: DatFile,
    character: String,
    quirk: MovesetQuirk,
    schemas: EventSchemas,
    index: TableView,
    subactions: TableView,
    nonlocal_subactions: TableView,
    common_attributes: StructView,
    unique_attributes: StructView,
    hurtbox_header: StructView,
    hurtboxes: TableView,
    ledge_grab: StructView,
    articles: Vec<Article>,
    images: Vec<StructView>,
}

fn attribute_struct(dat: &mut DatFile, start: usize, schema: Option<TableSchema>, what: &str) -> Result<StructView> {
    let schema = match schema {
        Some(s) => s,
        None => {
            let length = dat.next_target(start)?.map_or(0, |end| end - start);
            log::warn!("no schema for {} attributes, reading 0x{:X} bytes as floats", what, length);
            TableSchema::generic(length)
        }
    };
    Ok(dat.register_struct(start, Rc::new(schema.layout()?)))
}

/// Registers each image as 32-byte aligned and tracks it with a view so its
/// offset follows later edits.
pub(crate) fn register_images(dat: &mut DatFile, offsets: &[usize]) -> Result<Vec<StructView>> {
    let layout = Rc::new(RecordLayout::anonymous(">I")?);
    offsets
        .iter()
        .map(|image| {
            dat.register_alignment(*image, IMAGE_ALIGNMENT)?;
            Ok(dat.register_struct(*image, layout.clone()))
        })
        .collect()
}

impl MovesetDatFile {
    pub fn open(path: impl AsRef<Path>, attributes: &dyn AttributeSource, schemas: EventSchemas) -> Result<Self> {
        Self::from_dat(DatFile::open(path)?, attributes, schemas)
    }

    pub fn from_dat(mut dat: DatFile, attributes: &dyn AttributeSource, schemas: EventSchemas) -> Result<Self> {
        let title = dat.title(0)?;
        let character = title
            .strip_prefix(FIGHTER_TITLE_PREFIX)
            .ok_or_else(|| DatError::malformed(format!("'{}' is not a fighter moveset root", title)))?
            .to_string();
        let quirk = MovesetQuirk::for_character(&character);

        let index_pointer = dat.root_nodes().get_field(&dat, 0, "pointer")?.as_u32().unwrap_or(0);
        let index = dat.register_table(
            DatFile::pointer(index_pointer),
            INDEX_LENGTH,
            Rc::new(RecordLayout::anonymous(">I")?),
        );
        let slot = |dat: &DatFile, i: usize| -> Result<u32> { Ok(index.get_field(dat, i, 0)?.as_u32().unwrap_or(0)) };

        let local_start = slot(&dat, SLOT_SUBACTIONS)?;
        let nonlocal_start = slot(&dat, SLOT_NONLOCAL_SUBACTIONS)?;
        if nonlocal_start < local_start {
            return Err(DatError::malformed(format!(
                "nonlocal subactions (0x{:X}) precede local subactions (0x{:X})",
                nonlocal_start, local_start
            )));
        }
        let entry_layout = Rc::new(SubactionEntry::layout()?);
        let local_len = (nonlocal_start - local_start) as usize / SubactionEntry::SIZE;
        let subactions = dat.register_table(DatFile::pointer(local_start), local_len, entry_layout.clone());

        let chain = dat.read_pointer(DatFile::pointer(slot(&dat, SLOT_NONLOCAL_END)?))?;
        let nonlocal_end = dat.read_pointer(chain + 4)?;
        let nonlocal_begin = DatFile::pointer(nonlocal_start);
        if nonlocal_end < nonlocal_begin {
            return Err(DatError::malformed(format!(
                "nonlocal subaction table ends at 0x{:X}, before it starts at 0x{:X}",
                nonlocal_end, nonlocal_begin
            )));
        }
        let nonlocal_len = (nonlocal_end - nonlocal_begin) / SubactionEntry::SIZE;
        let nonlocal_subactions = dat.register_table(nonlocal_begin, nonlocal_len, entry_layout);

        let common_start = DatFile::pointer(slot(&dat, SLOT_COMMON_ATTRIBUTES)?);
        let common_attributes = attribute_struct(&mut dat, common_start, attributes.common_table(COMMON_TABLE_KIND)?, "common")?;
        let unique_start = DatFile::pointer(slot(&dat, SLOT_UNIQUE_ATTRIBUTES)?);
        let unique_attributes = attribute_struct(&mut dat, unique_start, attributes.unique_table(&character)?, &character)?;

        let hurtbox_header = dat.register_struct(
            DatFile::pointer(slot(&dat, SLOT_HURTBOXES)?),
            Rc::new(RecordLayout::parse(">II", &["count", "table_pointer"])?),
        );
        let header = hurtbox_header.get(&dat)?;
        let hurtboxes = dat.register_table(
            DatFile::pointer(header[1].as_u32().unwrap_or(0)),
            header[0].as_u32().unwrap_or(0) as usize,
            Rc::new(RecordLayout::parse(HURTBOX_FORMAT, &HURTBOX_NAMES)?),
        );

        let ledge_grab = dat.register_struct(
            DatFile::pointer(slot(&dat, SLOT_LEDGE_GRAB)?),
            Rc::new(RecordLayout::parse(LEDGE_GRAB_FORMAT, &LEDGE_GRAB_NAMES)?),
        );

        let mut articles = Vec::new();
        let article_list = slot(&dat, SLOT_ARTICLES)?;
        if article_list != 0 {
            for (i, info) in attributes.article_info(&character)?.iter().enumerate() {
                if info.is_placeholder() {
                    continue;
                }
                let article_pointer = dat.read_u32(DatFile::pointer(article_list) + 4 * i)?;
                if article_pointer == 0 {
                    log::warn!("article {} ('{}') of {} has a null pointer", i, info.name, character);
                    continue;
                }
                articles.push(Article::parse(&mut dat, DatFile::pointer(article_pointer), info)?);
            }
        }

        let scene_root = slot(&dat, SLOT_SCENE_ROOT)?;
        let images = match scene_root {
            0 => Vec::new(),
            root => {
                let offsets = SceneGraph::walk(&dat, DatFile::pointer(root))?.image_offsets;
                register_images(&mut dat, &offsets)?
            }
        };

        log::info!(
            "loaded {} moveset: {} local and {} nonlocal subactions, {} articles",
            character,
            local_len,
            nonlocal_len,
            articles.len()
        );

        Ok(Self {
            dat,
            character,
            quirk,
            schemas,
            index,
            subactions,
            nonlocal_subactions,
            common_attributes,
            unique_attributes,
            hurtbox_header,
            hurtboxes,
            ledge_grab,
            articles,
            images,
        })
    }

    pub fn dat(&self) -> &DatFile {
        &self.dat
    }

    pub fn dat_mut(&mut self) -> &mut DatFile {
        &mut self.dat
    }

    pub fn into_dat(self) -> DatFile {
        self.dat
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.dat.save(path)
    }

    /// Character short name, e.g. `Mario` for `ftDataMario`.
    pub fn character(&self) -> &str {
        &self.character
    }

    pub fn quirk(&self) -> MovesetQuirk {
        self.quirk
    }

    pub fn schemas(&self) -> &EventSchemas {
        &self.schemas
    }

    pub fn index(&self) -> TableView {
        self.index
    }

    pub fn subaction_table(&self) -> TableView {
        self.subactions
    }

    pub fn nonlocal_subaction_table(&self) -> TableView {
        self.nonlocal_subactions
    }

    pub fn common_attributes(&self) -> StructView {
        self.common_attributes
    }

    pub fn unique_attributes(&self) -> StructView {
        self.unique_attributes
    }

    pub fn hurtbox_header(&self) -> StructView {
        self.hurtbox_header
    }

    pub fn hurtbox_table(&self) -> TableView {
        self.hurtboxes
    }

    pub fn ledge_grab(&self) -> StructView {
        self.ledge_grab
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    /// Current image data offsets of the character model.
    pub fn image_offsets(&self) -> Result<Vec<usize>> {
        self.images.iter().map(|image| image.start(&self.dat)).collect()
    }

    fn locate(&self, id: usize) -> Result<(TableView, usize)> {
        let divider = self.quirk.subaction_divider();
        if id < divider {
            let len = self.subactions.len(&self.dat)?;
            if id >= len {
                return Err(DatError::IndexOutOfRange { index: id, len });
            }
            Ok((self.subactions, id))
        } else {
            Ok((self.nonlocal_subactions, id - divider))
        }
    }

    /// Subaction `id`: ids below the divider are local, the rest index the
    /// nonlocal table.
    pub fn get_subaction(&self, id: usize) -> Result<SubactionEntry> {
        let (table, i) = self.locate(id)?;
        Ok(SubactionEntry::from_record(&table.get(&self.dat, i)?))
    }

    pub fn set_subaction(&mut self, id: usize, entry: SubactionEntry) -> Result<()> {
        let (table, i) = self.locate(id)?;
        table.set(&mut self.dat, i, &entry.to_record())
    }

    /// Every existing subaction id with its entry, local ids first.
    pub fn iter_subactions(&self) -> Result<Vec<(usize, SubactionEntry)>> {
        let local = self.subactions.len(&self.dat)?;
        let divider = self.quirk.subaction_divider();
        let nonlocal = self.nonlocal_subactions.len(&self.dat)?;
        (0..local)
            .chain(divider..divider + nonlocal)
            .map(|id| Ok((id, self.get_subaction(id)?)))
            .collect()
    }

    pub fn subaction_name(&self, id: usize) -> Result<String> {
        let entry = self.get_subaction(id)?;
        if entry.name_pointer == 0 {
            return Ok(String::new());
        }
        self.dat.read_string(DatFile::pointer(entry.name_pointer))
    }

    /// The part of the name between `ACTION_` and `_figatree`.
    pub fn subaction_short_name(&self, id: usize) -> Result<String> {
        let name = self.subaction_name(id)?;
        let start = name.find("ACTION_").map_or(0, |i| i + "ACTION_".len());
        let end = name[start..].find("_figatree").map_or(name.len(), |i| start + i);
        Ok(name[start..end].to_string())
    }

    pub fn script_at(&self, offset: usize) -> Result<Script> {
        self.script_at_kind(offset, ScriptKind::Fighter)
    }

    pub fn script_at_kind(&self, offset: usize, kind: ScriptKind) -> Result<Script> {
        read_script(self.schemas.for_kind(kind), self.dat.as_bytes(), offset, true)
    }

    /// Script of subaction `id`; empty when the subaction has none.
    pub fn subaction_script(&self, id: usize) -> Result<Script> {
        let entry = self.get_subaction(id)?;
        if entry.script_pointer == 0 {
            return Ok(Vec::new());
        }
        self.script_at(DatFile::pointer(entry.script_pointer))
    }

    pub fn article_script(&self, article: usize, variant: usize) -> Result<Option<Script>> {
        let a = self.articles.get(article).ok_or(DatError::IndexOutOfRange {
            index: article,
            len: self.articles.len(),
        })?;
        a.script(&self.dat, &self.schemas.article, variant)
    }

    pub fn replace_subaction_script(&mut self, id: usize, script: &[Event]) -> Result<()> {
        let entry = self.get_subaction(id)?;
        if entry.script_pointer == 0 {
            return Err(DatError::InvalidEdit(format!("subaction {} has no script to replace", id)));
        }
        self.replace_script_at(DatFile::pointer(entry.script_pointer), script)
    }

    /// Overwrites the script at absolute `start`, resizing the file to fit
    /// and moving the script's pointer-table entries from the old embedded
    /// pointers to the new ones.
    pub fn replace_script_at(&mut self, start: usize, script: &[Event]) -> Result<()> {
        let old = self.script_at(start)?;
        let old_len = script_length(&old);
        let new_len = script_length(script);
        if new_len < 4 && new_len < old_len {
            return Err(DatError::InvalidEdit(format!(
                "replacement script at 0x{:X} is {} bytes; at least one event is required",
                start, new_len
            )));
        }

        let old_slots: Vec<u32> = pointer_offsets(&old, start)
            .into_iter()
            .map(|slot| (slot - HEADER_SIZE) as u32)
            .collect();
        let registered = self.dat.pointer_slots()?;
        if let Some(missing) = old_slots.iter().find(|s| !registered.contains(s)) {
            return Err(DatError::PointerNotFound(*missing));
        }
        for slot in old_slots {
            self.dat.delete_pointer(slot)?;
        }

        if new_len < old_len {
            let mut remaining = old_len - new_len;
            while remaining > 0 {
                let step = remaining.min(4);
                self.dat.insert(start + 4, -(step as isize))?;
                remaining -= step;
            }
        } else if new_len > old_len {
            self.dat.insert(start + old_len, (new_len - old_len) as isize)?;
        }

        let bytes: Vec<u8> = script.iter().flat_map(|e| e.as_bytes().iter().copied()).collect();
        self.dat.store_mut().write_at(start, &bytes)?;

        for slot in pointer_offsets(script, start) {
            self.dat.add_pointer((slot - HEADER_SIZE) as u32)?;
        }
        log::debug!("replaced script at 0x{:X}: {} -> {} bytes", start, old_len, new_len);
        Ok(())
    }

    fn collect_targets(&self, start: usize, found: &mut BTreeSet<usize>, frontier: &mut Vec<usize>) -> Result<()> {
        let script = self.script_at(start)?;
        for slot in pointer_offsets(&script, start) {
            let value = self.dat.read_u32(slot)?;
            if value == 0 {
                continue;
            }
            let target = DatFile::pointer(value);
            if found.insert(target) {
                frontier.push(target);
            }
        }
        Ok(())
    }

    /// Targets of subroutine calls and gotos reachable from any subaction
    /// script, following nested calls up to `max_depth` levels. Sorted.
    pub fn find_subroutines(&self, max_depth: usize) -> Result<Vec<usize>> {
        let mut found = BTreeSet::new();
        let mut frontier = Vec::new();
        for (_, entry) in self.iter_subactions()? {
            if entry.script_pointer != 0 {
                self.collect_targets(DatFile::pointer(entry.script_pointer), &mut found, &mut frontier)?;
            }
        }
        for _ in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            for start in std::mem::take(&mut frontier) {
                self.collect_targets(start, &mut found, &mut frontier)?;
            }
        }
        Ok(found.into_iter().collect())
    }

    /// Appends a copy of local subaction `template` and registers its name
    /// and script pointers. Returns the new subaction id.
    pub fn append_subaction(&mut self, template: usize) -> Result<usize> {
        let len = self.subactions.len(&self.dat)?;
        if template >= len {
            return Err(DatError::IndexOutOfRange { index: template, len });
        }
        if len >= self.quirk.subaction_divider() {
            return Err(DatError::InvalidEdit("local subaction table is full".to_string()));
        }
        let row = self.subactions.end(&self.dat)?;
        let placeholder = self.subactions.get(&self.dat, template)?;
        let id = self.subactions.append(&mut self.dat, &placeholder)?;
        // the template's pointers may have moved with the insertion
        let entry = SubactionEntry::from_record(&self.subactions.get(&self.dat, template)?);
        self.subactions.set(&mut self.dat, id, &entry.to_record())?;

        if entry.name_pointer != 0 {
            self.dat.add_pointer((row - HEADER_SIZE) as u32)?;
        }
        if entry.script_pointer != 0 {
            self.dat.add_pointer((row + 0xC - HEADER_SIZE) as u32)?;
        }
        Ok(id)
    }
}
