//! Frame speed modifier tables.
//!
//! An FSM entry scales the animation speed of one action state of one
//! character from a given frame on. Entries are 8 bytes, bit-packed:
//!
//! ```text
//! bits  0..=7   character (external id)
//! bits  8..=15  start frame
//! bit   16      subaction flag
//! bits 20..=31  action state id
//! bits 32..=63  speed (float32)
//! ```
//!
//! A table is a run of entries ended by an all-zero entry at the start of the
//! data section of an FSM container. Standalone FSM containers grow and
//! shrink with their list; trophy-hosted ones keep their size.

use std::fmt;

use crate::bits::{clamp_unsigned, read_bits, write_bits};
use crate::dat::{DatFile, HEADER_SIZE};
use crate::error::{DatError, Result};

pub const FSM_ENTRY_SIZE: usize = 8;

const CHARACTER: (usize, usize) = (0, 7);
const START_FRAME: (usize, usize) = (8, 15);
const SUB_FLAG: (usize, usize) = (16, 16);
const ACTION_STATE: (usize, usize) = (20, 31);
const SPEED: (usize, usize) = (32, 63);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsmEntry {
    data: [u8; FSM_ENTRY_SIZE],
}

impl FsmEntry {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: [u8; FSM_ENTRY_SIZE]) -> Self {
        Self { data: bytes }
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let text = text.trim();
        let text = text.strip_prefix("0x").unwrap_or(text);
        let bytes = hex::decode(text)?;
        let data: [u8; FSM_ENTRY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            DatError::InvalidValue(format!("FSM entry needs {} bytes, got {}", FSM_ENTRY_SIZE, bytes.len()))
        })?;
        Ok(Self { data })
    }

    pub fn from_fields(character: u32, sub_flag: bool, action_state: u32, start_frame: u32, speed: f32) -> Self {
        let mut e = Self::blank();
        e.set_character(character);
        e.set_sub_flag(sub_flag);
        e.set_action_state(action_state);
        e.set_start_frame(start_frame);
        e.set_speed(speed);
        e
    }

    pub fn as_bytes(&self) -> &[u8; FSM_ENTRY_SIZE] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }

    fn get(&self, (lo, hi): (usize, usize)) -> u32 {
        read_bits(&self.data, lo, hi) as u32
    }

    fn set(&mut self, (lo, hi): (usize, usize), value: u64) {
        write_bits(&mut self.data, lo, hi, clamp_unsigned(value, hi - lo + 1));
    }

    pub fn character(&self) -> u32 {
        self.get(CHARACTER)
    }

    pub fn set_character(&mut self, value: u32) {
        self.set(CHARACTER, value as u64);
    }

    pub fn start_frame(&self) -> u32 {
        self.get(START_FRAME)
    }

    pub fn set_start_frame(&mut self, value: u32) {
        self.set(START_FRAME, value as u64);
    }

    pub fn sub_flag(&self) -> bool {
        self.get(SUB_FLAG) != 0
    }

    pub fn set_sub_flag(&mut self, value: bool) {
        self.set(SUB_FLAG, value as u64);
    }

    pub fn action_state(&self) -> u32 {
        self.get(ACTION_STATE)
    }

    pub fn set_action_state(&mut self, value: u32) {
        self.set(ACTION_STATE, value as u64);
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.get(SPEED))
    }

    pub fn set_speed(&mut self, value: f32) {
        self.set(SPEED, value.to_bits() as u64);
    }
}

impl fmt::Display for FsmEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FSM: character={}, asid={}, frame={}, speed={}, sub_flag={}",
            self.character(),
            self.action_state(),
            self.start_frame(),
            self.speed(),
            self.sub_flag()
        )
    }
}

/// Entries from the start of `bytes` up to the first all-zero entry or the
/// end of the buffer.
pub fn read_fsm_table(bytes: &[u8]) -> Vec<FsmEntry> {
    bytes
        .chunks_exact(FSM_ENTRY_SIZE)
        .map(|c| {
            let mut data = [0u8; FSM_ENTRY_SIZE];
            data.copy_from_slice(c);
            FsmEntry::from_bytes(data)
        })
        .take_while(|e| !e.is_empty())
        .collect()
}

pub fn encode_fsm_table(entries: &[FsmEntry]) -> Vec<u8> {
    entries.iter().flat_map(|e| e.as_bytes().iter().copied()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmContainerKind {
    /// `FSMDataStandalone`: the list may grow and shrink.
    Standalone,
    /// `FSMDataTrophy`: the file size is fixed.
    Trophy,
}

#[derive(Debug)]
pub struct FsmDatFile {
    dat: DatFile,
    kind: FsmContainerKind,
}

impl FsmDatFile {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_dat(DatFile::open(path)?)
    }

    /// Picks the container kind from the root node name.
    pub fn from_dat(dat: DatFile) -> Result<Self> {
        let kind = match dat.title(0)?.as_str() {
            "FSMDataStandalone" => FsmContainerKind::Standalone,
            "FSMDataTrophy" => FsmContainerKind::Trophy,
            other => {
                return Err(DatError::malformed(format!("'{}' is not an FSM container root", other)));
            }
        };
        Ok(Self { dat, kind })
    }

    pub fn with_kind(dat: DatFile, kind: FsmContainerKind) -> Self {
        Self { dat, kind }
    }

    pub fn kind(&self) -> FsmContainerKind {
        self.kind
    }

    pub fn dat(&self) -> &DatFile {
        &self.dat
    }

    pub fn into_dat(self) -> DatFile {
        self.dat
    }

    pub fn fsm_list(&self) -> Result<Vec<FsmEntry>> {
        let data_end = self.dat.data_end()?;
        Ok(read_fsm_table(&self.dat.as_bytes()[HEADER_SIZE..data_end]))
    }

    /// Writes `entries` over the current list. Standalone containers are
    /// resized by the difference; trophy containers pad a shorter list with
    /// blank entries and reject a list that does not fit.
    pub fn replace_fsm_list(&mut self, entries: &[FsmEntry]) -> Result<()> {
        let previous = self.fsm_list()?.len();
        let mut entries = entries.to_vec();
        match self.kind {
            FsmContainerKind::Trophy => {
                if entries.len() < previous {
                    entries.resize(previous, FsmEntry::blank());
                }
                let capacity = self.dat.data_size()? as usize;
                if entries.len() * FSM_ENTRY_SIZE > capacity {
                    return Err(DatError::InvalidEdit(format!(
                        "{} FSM entries do not fit in 0x{:X} bytes",
                        entries.len(),
                        capacity
                    )));
                }
            }
            FsmContainerKind::Standalone => {
                let added = entries.len() as isize - previous as isize;
                self.dat.insert(HEADER_SIZE, added * FSM_ENTRY_SIZE as isize)?;
            }
        }
        self.dat.store_mut().write_at(HEADER_SIZE, &encode_fsm_table(&entries))
    }
}
