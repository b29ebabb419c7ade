//! Pointer relocation.
//!
//! Pointer values in a container are data-section offsets (absolute offset
//! minus the header size). The pointer table lists, as data-section offsets,
//! every slot holding such a value. Before a size-changing edit at an
//! absolute `location`, every pointer-table entry, every stored pointer and
//! every node pointer whose absolute target is at or after `location` is
//! moved by the edit amount. Relocation runs against the pre-edit buffer.
//!
//! An edit made through a view at the view's own start (a record inserted
//! at or removed from the head of a table) keeps the view in place, so
//! pointers to that start are anchored and left alone as well.

use crate::dat::HEADER_SIZE;
use crate::error::{DatError, Result};
use crate::store::ByteStore;
use crate::view::{TableView, ViewRegistry};

#[derive(Debug, Clone, Copy)]
pub struct Relocator {
    pub pointer_table: TableView,
    pub root_nodes: TableView,
    pub ref_nodes: TableView,
}

fn shifted(value: u32, amount: isize) -> Result<u32> {
    (value as usize)
        .checked_add_signed(amount)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| DatError::malformed(format!("pointer 0x{:X} relocated by {} leaves the file", value, amount)))
}

impl Relocator {
    pub(crate) fn relocate(
        &self,
        store: &mut ByteStore,
        views: &ViewRegistry,
        location: usize,
        amount: isize,
        anchor: Option<usize>,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let moves = |target: usize| target >= location && Some(target) != anchor;

        let table = views.get(self.pointer_table.0)?;
        let (table_start, table_end) = (table.start, table.end());
        let entries = table.len.unwrap_or(0);
        // Edits strictly inside the pointer table leave the data section alone.
        let inside_table = table_start < location && location < table_end;

        for i in 0..entries {
            let entry_offset = table_start + 4 * i;
            let slot = store.read_u32_at(entry_offset)?;
            if slot as usize + HEADER_SIZE >= location {
                store.write_u32_at(entry_offset, shifted(slot, amount)?)?;
            }
            if inside_table {
                continue;
            }
            let slot_offset = slot as usize + HEADER_SIZE;
            let value = store.read_u32_at(slot_offset)?;
            if moves(value as usize + HEADER_SIZE) {
                store.write_u32_at(slot_offset, shifted(value, amount)?)?;
            }
        }

        for nodes in [self.root_nodes, self.ref_nodes] {
            let slot = views.get(nodes.0)?;
            for i in 0..slot.len.unwrap_or(0) {
                let node_offset = slot.start + slot.layout.size() * i;
                let target = store.read_u32_at(node_offset)?;
                if moves(target as usize + HEADER_SIZE) {
                    store.write_u32_at(node_offset, shifted(target, amount)?)?;
                }
            }
        }

        log::debug!("relocated pointers for edit of {} bytes at 0x{:X}", amount, location);
        Ok(())
    }
}
