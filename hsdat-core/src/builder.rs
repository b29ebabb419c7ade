//! Assembles a container from scratch.

use std::collections::BTreeSet;

use byteorder::{BigEndian, ByteOrder};

use crate::dat::HEADER_SIZE;

/// Collects a data section, pointer slots and nodes, then lays them out with
/// a matching header. Offsets passed in are data-section relative.
///
/// The data section has the fixed size given to [`DatBuilder::new`]. The
/// `put_*` writers panic when the written range does not fit inside it.
#[derive(Debug, Clone, Default)]
pub struct DatBuilder {
    data: Vec<u8>,
    pointers: BTreeSet<u32>,
    roots: Vec<(u32, String)>,
    refs: Vec<(u32, String)>,
}

impl DatBuilder {
    pub fn new(data_size: usize) -> Self {
        Self {
            data: vec![0; data_size],
            ..Default::default()
        }
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// # Panics
    ///
    /// If `offset + 4` is past the end of the data section.
    pub fn put_u32(&mut self, offset: usize, value: u32) -> &mut Self {
        BigEndian::write_u32(&mut self.data[offset..offset + 4], value);
        self
    }

    pub fn put_f32(&mut self, offset: usize, value: f32) -> &mut Self {
        BigEndian::write_f32(&mut self.data[offset..offset + 4], value);
        self
    }

    /// # Panics
    ///
    /// If `offset + bytes.len()` is past the end of the data section.
    pub fn put_bytes(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Stores `target` at `slot` and lists `slot` in the pointer table.
    pub fn put_pointer(&mut self, slot: usize, target: usize) -> &mut Self {
        self.put_u32(slot, target as u32);
        self.pointers.insert(slot as u32);
        self
    }

    pub fn root(&mut self, pointer: usize, name: &str) -> &mut Self {
        self.roots.push((pointer as u32, name.to_string()));
        self
    }

    pub fn reference(&mut self, pointer: usize, name: &str) -> &mut Self {
        self.refs.push((pointer as u32, name.to_string()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut strings = Vec::new();
        let mut nodes = Vec::new();
        for (pointer, name) in self.roots.iter().chain(&self.refs) {
            let mut node = [0u8; 8];
            BigEndian::write_u32(&mut node[0..4], *pointer);
            BigEndian::write_u32(&mut node[4..8], strings.len() as u32);
            nodes.extend_from_slice(&node);
            strings.extend_from_slice(name.as_bytes());
            strings.push(0);
        }

        let file_size = HEADER_SIZE + self.data.len() + 4 * self.pointers.len() + nodes.len() + strings.len();
        let mut out = Vec::with_capacity(file_size);
        let mut header = [0u8; HEADER_SIZE];
        BigEndian::write_u32(&mut header[0x00..], file_size as u32);
        BigEndian::write_u32(&mut header[0x04..], self.data.len() as u32);
        BigEndian::write_u32(&mut header[0x08..], self.pointers.len() as u32);
        BigEndian::write_u32(&mut header[0x0C..], self.roots.len() as u32);
        BigEndian::write_u32(&mut header[0x10..], self.refs.len() as u32);
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.data);
        for slot in &self.pointers {
            out.extend_from_slice(&slot.to_be_bytes());
        }
        out.extend_from_slice(&nodes);
        out.extend_from_slice(&strings);
        out
    }
}
