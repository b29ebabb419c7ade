//! The relocatable container.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! 0x00  header (0x20 bytes)
//!         +0x00 file size
//!         +0x04 data section size
//!         +0x08 pointer count
//!         +0x0C root node count
//!         +0x10 reference node count
//! 0x20  data section
//!       pointer table   u32 * pointer count
//!       root nodes      (u32 pointer, u32 string offset) * root count
//!       ref nodes       (u32 pointer, u32 string offset) * ref count
//!       string table    NUL-terminated names
//! ```
//!
//! Every stored pointer is a data-section offset; adding [`HEADER_SIZE`]
//! gives the absolute offset. Size-changing edits go through
//! [`DatFile::insert`], which keeps pointers, views, header sizes and
//! alignment padding consistent.

use std::path::Path;
use std::rc::Rc;

use crate::align::{AlignmentConstraints, PADDING_BYTES};
use crate::error::{DatError, Result};
use crate::layout::{RecordLayout, Value};
use crate::reloc::Relocator;
use crate::store::ByteStore;
use crate::view::{StructView, TableView, ViewId, ViewRegistry, ViewSlot};

pub const HEADER_SIZE: usize = 0x20;

const FILE_SIZE_OFFSET: usize = 0x00;
const DATA_SIZE_OFFSET: usize = 0x04;
const POINTER_COUNT_OFFSET: usize = 0x08;
const ROOT_COUNT_OFFSET: usize = 0x0C;
const REF_COUNT_OFFSET: usize = 0x10;

#[derive(Debug)]
pub struct DatFile {
    pub(crate) store: ByteStore,
    pub(crate) views: ViewRegistry,
    relocator: Relocator,
    alignment: AlignmentConstraints,
}

impl DatFile {
    /// Absolute offset of a stored pointer value.
    pub fn pointer(value: u32) -> usize {
        value as usize + HEADER_SIZE
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DatError::malformed(format!(
                "file is 0x{:X} bytes, shorter than the header",
                bytes.len()
            )));
        }
        let store = ByteStore::new(bytes);
        let file_size = store.read_u32_at(FILE_SIZE_OFFSET)? as usize;
        let data_size = store.read_u32_at(DATA_SIZE_OFFSET)? as usize;
        let pointer_count = store.read_u32_at(POINTER_COUNT_OFFSET)? as usize;
        let root_count = store.read_u32_at(ROOT_COUNT_OFFSET)? as usize;
        let ref_count = store.read_u32_at(REF_COUNT_OFFSET)? as usize;

        if file_size != store.len() {
            log::warn!(
                "header file size 0x{:X} does not match buffer size 0x{:X}",
                file_size,
                store.len()
            );
        }

        let data_end = HEADER_SIZE + data_size;
        let pointers_end = data_end + 4 * pointer_count;
        let roots_end = pointers_end + 8 * root_count;
        let refs_end = roots_end + 8 * ref_count;
        if refs_end > store.len() {
            return Err(DatError::malformed(format!(
                "tables end at 0x{:X}, past end of file 0x{:X}",
                refs_end,
                store.len()
            )));
        }

        let mut views = ViewRegistry::new();
        let pointer_layout = Rc::new(RecordLayout::parse(">I", &["pointer"])?);
        let node_layout = Rc::new(RecordLayout::parse(">II", &["pointer", "string_pointer"])?);
        let pointer_table = TableView(views.register(ViewSlot {
            start: data_end,
            layout: pointer_layout,
            len: Some(pointer_count),
        }));
        let root_nodes = TableView(views.register(ViewSlot {
            start: pointers_end,
            layout: node_layout.clone(),
            len: Some(root_count),
        }));
        let ref_nodes = TableView(views.register(ViewSlot {
            start: roots_end,
            layout: node_layout,
            len: Some(ref_count),
        }));

        let dat = Self {
            store,
            views,
            relocator: Relocator {
                pointer_table,
                root_nodes,
                ref_nodes,
            },
            alignment: AlignmentConstraints::new(),
        };

        for i in 0..pointer_count {
            let slot = dat.store.read_u32_at(data_end + 4 * i)? as usize;
            if slot + 4 > data_size {
                return Err(DatError::malformed(format!(
                    "pointer table entry {} addresses 0x{:X}, outside the data section",
                    i, slot
                )));
            }
        }

        log::debug!(
            "loaded container: data 0x{:X}, {} pointers, {} root nodes, {} ref nodes",
            data_size,
            pointer_count,
            root_count,
            ref_count
        );
        Ok(dat)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.store.as_slice())?;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.store.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.store.into_inner()
    }

    pub fn store(&self) -> &ByteStore {
        &self.store
    }

    /// Cursor and same-size writes. Size-changing edits must use
    /// [`DatFile::insert`].
    pub fn store_mut(&mut self) -> &mut ByteStore {
        &mut self.store
    }

    pub fn file_size(&self) -> Result<u32> {
        self.store.read_u32_at(FILE_SIZE_OFFSET)
    }

    pub fn data_size(&self) -> Result<u32> {
        self.store.read_u32_at(DATA_SIZE_OFFSET)
    }

    pub fn pointer_count(&self) -> Result<u32> {
        self.store.read_u32_at(POINTER_COUNT_OFFSET)
    }

    pub fn root_count(&self) -> Result<u32> {
        self.store.read_u32_at(ROOT_COUNT_OFFSET)
    }

    pub fn ref_count(&self) -> Result<u32> {
        self.store.read_u32_at(REF_COUNT_OFFSET)
    }

    /// Absolute offset one past the data section.
    pub fn data_end(&self) -> Result<usize> {
        Ok(HEADER_SIZE + self.data_size()? as usize)
    }

    pub fn pointer_table(&self) -> TableView {
        self.relocator.pointer_table
    }

    pub fn root_nodes(&self) -> TableView {
        self.relocator.root_nodes
    }

    pub fn ref_nodes(&self) -> TableView {
        self.relocator.ref_nodes
    }

    pub fn string_table_start(&self) -> Result<usize> {
        self.relocator.ref_nodes.end(self)
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn alignment(&self) -> &AlignmentConstraints {
        &self.alignment
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.store.read_u32_at(offset)
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.store.write_u32_at(offset, value)
    }

    /// Absolute target of the pointer stored at absolute `offset`.
    pub fn read_pointer(&self, offset: usize) -> Result<usize> {
        Ok(Self::pointer(self.read_u32(offset)?))
    }

    pub fn read_string(&self, offset: usize) -> Result<String> {
        Ok(String::from_utf8_lossy(self.store.read_cstr_at(offset)?).into_owned())
    }

    /// Name of root node `index`, read from the string table.
    pub fn title(&self, index: usize) -> Result<String> {
        let string_pointer = self
            .root_nodes()
            .get_field(self, index, "string_pointer")?
            .as_u32()
            .unwrap_or(0);
        self.read_string(self.string_table_start()? + string_pointer as usize)
    }

    /// Starting at offset 0, advances by each chain element in turn and
    /// follows the pointer stored there.
    pub fn follow_chain(&self, chain: &[usize]) -> Result<usize> {
        let mut pos = 0usize;
        for step in chain {
            pos = self.read_pointer(pos + step)?;
        }
        Ok(pos)
    }

    /// Absolute offset of the structure the first root node points at.
    pub fn index_offset(&self) -> Result<usize> {
        self.follow_chain(&[4, 4 * self.pointer_count()? as usize])
    }

    pub fn register_table(&mut self, start: usize, len: usize, layout: Rc<RecordLayout>) -> TableView {
        TableView(self.views.register(ViewSlot {
            start,
            layout,
            len: Some(len),
        }))
    }

    pub fn register_struct(&mut self, start: usize, layout: Rc<RecordLayout>) -> StructView {
        StructView(self.views.register(ViewSlot {
            start,
            layout,
            len: None,
        }))
    }

    pub fn release_view(&mut self, id: ViewId) -> Result<()> {
        self.views.release(id)
    }

    pub fn register_alignment(&mut self, target: usize, alignment: usize) -> Result<()> {
        self.alignment.register(target, alignment)
    }

    /// Inserts `amount` zero bytes at absolute `location`, or removes
    /// `-amount` bytes when negative.
    pub fn insert(&mut self, location: usize, amount: isize) -> Result<()> {
        self.edit(location, amount, None, None)
    }

    pub fn insert_bytes(&mut self, location: usize, data: &[u8]) -> Result<()> {
        self.edit(location, data.len() as isize, Some(data), None)
    }

    /// One size-changing edit followed by alignment repair. `origin` is the
    /// view the edit was made through; it keeps its start offset.
    pub(crate) fn edit(&mut self, location: usize, amount: isize, data: Option<&[u8]>, origin: Option<ViewId>) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.apply_edit(location, amount, data, origin)?;

        for i in self.alignment.moved_by(location, amount) {
            let c = self.alignment.entries()[i];
            let Some(fix) = AlignmentConstraints::padding_fix(&self.store, c, HEADER_SIZE)? else {
                continue;
            };
            log::debug!(
                "realigning 0x{:X} to {}: {} padding bytes at 0x{:X}",
                c.target,
                c.alignment,
                fix.delta,
                fix.location
            );
            if fix.delta > 0 {
                let padding: Vec<u8> = PADDING_BYTES.iter().cycle().take(fix.delta as usize).copied().collect();
                self.apply_edit(fix.location, fix.delta, Some(&padding), None)?;
            } else {
                self.apply_edit(fix.location, fix.delta, None, None)?;
            }
        }
        Ok(())
    }

    fn apply_edit(&mut self, location: usize, amount: isize, data: Option<&[u8]>, origin: Option<ViewId>) -> Result<()> {
        let size = self.store.len();
        let removed = if amount < 0 { amount.unsigned_abs() } else { 0 };
        if location > size || location + removed > size {
            return Err(DatError::OutOfBounds {
                offset: location,
                len: amount.unsigned_abs(),
                size,
            });
        }

        let data_end = self.data_end()?;
        let origin_start = match origin {
            Some(id) => Some(self.views.get(id)?.start),
            None => None,
        };
        let from_trailing_table = origin_start.is_some_and(|start| start >= data_end);
        let in_data = location < data_end || (location == data_end && !from_trailing_table);
        let anchor = origin_start.filter(|start| *start == location);

        self.relocator.relocate(&mut self.store, &self.views, location, amount, anchor)?;
        self.store.splice(location, amount, data)?;

        let file_size = self.store.len() as u32;
        self.store.write_u32_at(FILE_SIZE_OFFSET, file_size)?;
        self.views.shift(location, amount, origin);
        if in_data {
            let data_size = (self.data_size()? as isize + amount) as u32;
            self.store.write_u32_at(DATA_SIZE_OFFSET, data_size)?;
        }
        self.alignment.shift(location, amount);
        Ok(())
    }

    /// Registers `offset` (data-section relative) as a pointer slot.
    pub fn add_pointer(&mut self, offset: u32) -> Result<()> {
        self.pointer_table().insert_sorted(self, &[Value::U32(offset)])?;
        let count = self.pointer_count()? + 1;
        self.store.write_u32_at(POINTER_COUNT_OFFSET, count)
    }

    pub fn delete_pointer(&mut self, offset: u32) -> Result<()> {
        match self.pointer_table().delete_by_value(self, &[Value::U32(offset)]) {
            Ok(_) => {}
            Err(DatError::ValueNotFound(_)) => return Err(DatError::PointerNotFound(offset)),
            Err(e) => return Err(e),
        }
        let count = self.pointer_count()?.saturating_sub(1);
        self.store.write_u32_at(POINTER_COUNT_OFFSET, count)
    }

    /// Pointer-table entries as data-section offsets.
    pub fn pointer_slots(&self) -> Result<Vec<u32>> {
        self.pointer_table()
            .records(self)?
            .into_iter()
            .map(|r| Ok(r[0].as_u32().unwrap_or(0)))
            .collect()
    }

    /// Absolute targets of every registered pointer, in table order.
    pub fn pointer_targets(&self) -> Result<Vec<usize>> {
        self.pointer_slots()?
            .into_iter()
            .map(|slot| self.read_pointer(Self::pointer(slot)))
            .collect()
    }

    /// Smallest absolute pointer target strictly after `location`.
    pub fn next_target(&self, location: usize) -> Result<Option<usize>> {
        Ok(self.pointer_targets()?.into_iter().filter(|t| *t > location).min())
    }

    /// Checks the header against the buffer and every pointer slot and target
    /// against the data section.
    pub fn check_invariants(&self) -> Result<()> {
        let size = self.store.len();
        if self.file_size()? as usize != size {
            return Err(DatError::malformed(format!(
                "file size field 0x{:X} != buffer size 0x{:X}",
                self.file_size()?,
                size
            )));
        }
        let data_end = self.data_end()?;
        if self.pointer_table().start(self)? != data_end {
            return Err(DatError::malformed("pointer table does not follow the data section"));
        }
        if self.pointer_table().len(self)? != self.pointer_count()? as usize {
            return Err(DatError::malformed("pointer count does not match the pointer table"));
        }
        if self.string_table_start()? > size {
            return Err(DatError::malformed("node tables run past end of file"));
        }
        let mut previous = None;
        for slot in self.pointer_slots()? {
            if previous.is_some_and(|p| p > slot) {
                return Err(DatError::malformed("pointer table is not sorted"));
            }
            previous = Some(slot);
            let slot_offset = Self::pointer(slot);
            if slot_offset + 4 > data_end {
                return Err(DatError::malformed(format!("pointer slot 0x{:X} outside data section", slot)));
            }
            let target = self.read_pointer(slot_offset)?;
            if target > size {
                return Err(DatError::malformed(format!(
                    "pointer at 0x{:X} targets 0x{:X}, past end of file",
                    slot, target
                )));
            }
        }
        Ok(())
    }
}
