//! Live views over regions of a container.
//!
//! A view is a handle (`TableView` or `StructView`) into a registry owned by
//! the [`DatFile`]. The registry remembers each view's start offset and
//! layout and shifts the start of every view that lies at or after an edit
//! location, so handles stay valid across size-changing edits. Reads decode
//! on every access; writes go straight to the buffer.

use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::dat::DatFile;
use crate::error::{DatError, Result};
use crate::layout::{FieldRef, Record, RecordLayout, Value};

static NEXT_OWNER: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId {
    owner: u32,
    slot: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct ViewSlot {
    pub start: usize,
    pub layout: Rc<RecordLayout>,
    /// `None` for single-record struct views.
    pub len: Option<usize>,
}

impl ViewSlot {
    pub fn end(&self) -> usize {
        self.start + self.layout.size() * self.len.unwrap_or(1)
    }
}

#[derive(Debug)]
pub struct ViewRegistry {
    owner: u32,
    slots: Vec<Option<ViewSlot>>,
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
        }
    }

    // Slots are never reused, so a released handle can not alias a newer view.
    pub(crate) fn register(&mut self, slot: ViewSlot) -> ViewId {
        self.slots.push(Some(slot));
        ViewId {
            owner: self.owner,
            slot: (self.slots.len() - 1) as u32,
        }
    }

    pub(crate) fn get(&self, id: ViewId) -> Result<&ViewSlot> {
        if id.owner != self.owner {
            return Err(DatError::StaleView(id));
        }
        self.slots
            .get(id.slot as usize)
            .and_then(|s| s.as_ref())
            .ok_or(DatError::StaleView(id))
    }

    pub(crate) fn get_mut(&mut self, id: ViewId) -> Result<&mut ViewSlot> {
        if id.owner != self.owner {
            return Err(DatError::StaleView(id));
        }
        self.slots
            .get_mut(id.slot as usize)
            .and_then(|s| s.as_mut())
            .ok_or(DatError::StaleView(id))
    }

    pub fn release(&mut self, id: ViewId) -> Result<()> {
        self.get(id)?;
        self.slots[id.slot as usize] = None;
        Ok(())
    }

    /// Number of views still registered.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Moves every view starting at or after `location`, except `origin`
    /// (the view an edit was made through, which must keep its own start).
    pub(crate) fn shift(&mut self, location: usize, amount: isize, origin: Option<ViewId>) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            if origin.is_some_and(|o| o.slot as usize == i) {
                continue;
            }
            if slot.start >= location {
                // A view inside a removed region collapses onto the edit point.
                slot.start = (slot.start as isize + amount).max(location as isize) as usize;
            }
        }
    }
}

/// Handle to a table of fixed-size records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableView(pub(crate) ViewId);

impl TableView {
    pub fn id(self) -> ViewId {
        self.0
    }

    pub fn start(self, dat: &DatFile) -> Result<usize> {
        Ok(dat.views.get(self.0)?.start)
    }

    pub fn len(self, dat: &DatFile) -> Result<usize> {
        Ok(dat.views.get(self.0)?.len.unwrap_or(0))
    }

    pub fn end(self, dat: &DatFile) -> Result<usize> {
        Ok(dat.views.get(self.0)?.end())
    }

    pub fn layout(self, dat: &DatFile) -> Result<Rc<RecordLayout>> {
        Ok(dat.views.get(self.0)?.layout.clone())
    }

    /// Absolute offset of record `index`.
    pub fn offset_of(self, dat: &DatFile, index: usize) -> Result<usize> {
        let slot = dat.views.get(self.0)?;
        let len = slot.len.unwrap_or(0);
        if index >= len {
            return Err(DatError::IndexOutOfRange { index, len });
        }
        Ok(slot.start + index * slot.layout.size())
    }

    pub fn get(self, dat: &DatFile, index: usize) -> Result<Record> {
        let offset = self.offset_of(dat, index)?;
        let layout = &dat.views.get(self.0)?.layout;
        layout.unpack(dat.store.read_at(offset, layout.size())?)
    }

    pub fn get_field<'a>(self, dat: &DatFile, index: usize, field: impl Into<FieldRef<'a>>) -> Result<Value> {
        let i = self.layout(dat)?.index_of(field)?;
        Ok(self.get(dat, index)?[i])
    }

    pub fn records(self, dat: &DatFile) -> Result<Vec<Record>> {
        (0..self.len(dat)?).map(|i| self.get(dat, i)).collect()
    }

    pub fn position(self, dat: &DatFile, value: &[Value]) -> Result<Option<usize>> {
        let layout = self.layout(dat)?;
        let wanted = layout.unpack(&layout.pack(value)?)?;
        for i in 0..self.len(dat)? {
            if self.get(dat, i)? == wanted {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    pub fn set(self, dat: &mut DatFile, index: usize, value: &[Value]) -> Result<()> {
        let offset = self.offset_of(dat, index)?;
        let bytes = self.layout(dat)?.pack(value)?;
        dat.store.write_at(offset, &bytes)
    }

    pub fn set_field<'a>(
        self,
        dat: &mut DatFile,
        index: usize,
        field: impl Into<FieldRef<'a>>,
        value: Value,
    ) -> Result<()> {
        let i = self.layout(dat)?.index_of(field)?;
        let mut record = self.get(dat, index)?;
        record[i] = value;
        self.set(dat, index, &record)
    }

    /// Inserts a record before `index`; `index == len` appends.
    pub fn insert(self, dat: &mut DatFile, index: usize, value: &[Value]) -> Result<()> {
        let (start, len, layout) = {
            let slot = dat.views.get(self.0)?;
            (slot.start, slot.len.unwrap_or(0), slot.layout.clone())
        };
        if index > len {
            return Err(DatError::IndexOutOfRange { index, len });
        }
        let bytes = layout.pack(value)?;
        let location = start + index * layout.size();
        dat.edit(location, bytes.len() as isize, Some(&bytes), Some(self.0))?;
        dat.views.get_mut(self.0)?.len = Some(len + 1);
        Ok(())
    }

    /// Inserts before the first record greater than `value`, or appends when
    /// there is none. Returns the index used.
    pub fn insert_sorted(self, dat: &mut DatFile, value: &[Value]) -> Result<usize> {
        let layout = self.layout(dat)?;
        let value = layout.unpack(&layout.pack(value)?)?;
        let len = self.len(dat)?;
        let mut index = len;
        for i in 0..len {
            if self.get(dat, i)? > value {
                index = i;
                break;
            }
        }
        self.insert(dat, index, &value)?;
        Ok(index)
    }

    pub fn append(self, dat: &mut DatFile, value: &[Value]) -> Result<usize> {
        let len = self.len(dat)?;
        self.insert(dat, len, value)?;
        Ok(len)
    }

    pub fn delete(self, dat: &mut DatFile, index: usize) -> Result<()> {
        let location = self.offset_of(dat, index)?;
        let size = self.layout(dat)?.size();
        dat.edit(location, -(size as isize), None, Some(self.0))?;
        let slot = dat.views.get_mut(self.0)?;
        slot.len = slot.len.map(|n| n - 1);
        Ok(())
    }

    /// Deletes the first record equal to `value` and returns its index.
    pub fn delete_by_value(self, dat: &mut DatFile, value: &[Value]) -> Result<usize> {
        let index = self
            .position(dat, value)?
            .ok_or_else(|| DatError::ValueNotFound(format!("{:?}", value)))?;
        self.delete(dat, index)?;
        Ok(index)
    }
}

/// Handle to a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructView(pub(crate) ViewId);

impl StructView {
    pub fn id(self) -> ViewId {
        self.0
    }

    pub fn start(self, dat: &DatFile) -> Result<usize> {
        Ok(dat.views.get(self.0)?.start)
    }

    pub fn layout(self, dat: &DatFile) -> Result<Rc<RecordLayout>> {
        Ok(dat.views.get(self.0)?.layout.clone())
    }

    pub fn get(self, dat: &DatFile) -> Result<Record> {
        let slot = dat.views.get(self.0)?;
        slot.layout.unpack(dat.store.read_at(slot.start, slot.layout.size())?)
    }

    pub fn get_field<'a>(self, dat: &DatFile, field: impl Into<FieldRef<'a>>) -> Result<Value> {
        let i = self.layout(dat)?.index_of(field)?;
        Ok(self.get(dat)?[i])
    }

    pub fn set(self, dat: &mut DatFile, value: &[Value]) -> Result<()> {
        let (start, bytes) = {
            let slot = dat.views.get(self.0)?;
            (slot.start, slot.layout.pack(value)?)
        };
        dat.store.write_at(start, &bytes)
    }

    /// Rewrites the whole record with one field replaced.
    pub fn set_field<'a>(self, dat: &mut DatFile, field: impl Into<FieldRef<'a>>, value: Value) -> Result<()> {
        let i = self.layout(dat)?.index_of(field)?;
        let mut record = self.get(dat)?;
        record[i] = value;
        self.set(dat, &record)
    }

    pub fn field_offset<'a>(self, dat: &DatFile, field: impl Into<FieldRef<'a>>) -> Result<usize> {
        Ok(self.start(dat)? + self.layout(dat)?.offset_of(field)?)
    }

    /// Raw bytes of one field.
    pub fn raw<'a>(self, dat: &DatFile, field: impl Into<FieldRef<'a>>) -> Result<Vec<u8>> {
        let layout = self.layout(dat)?;
        let i = layout.index_of(field)?;
        let offset = self.start(dat)? + layout.fields()[i].offset;
        Ok(dat.store.read_at(offset, layout.fields()[i].ty.size())?.to_vec())
    }
}
