//! Alignment constraints for offsets that must stay on a power-of-two
//! boundary (texture image data) across edits.
//!
//! Padding in front of an aligned target is a run of `0xDEADBEEF` words. After
//! an edit moves a target, the run is grown or shrunk so the target lands on
//! its boundary again.

use crate::error::{DatError, Result};
use crate::store::ByteStore;

pub const PADDING_WORD: u32 = 0xDEAD_BEEF;
pub const PADDING_BYTES: [u8; 4] = PADDING_WORD.to_be_bytes();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AlignmentConstraint {
    pub target: usize,
    pub alignment: usize,
}

/// A padding change that restores one constraint: insert (`delta > 0`)
/// or remove (`delta < 0`) bytes at `location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingFix {
    pub location: usize,
    pub delta: isize,
}

/// Constraints kept sorted by target offset.
#[derive(Debug, Clone, Default)]
pub struct AlignmentConstraints {
    entries: Vec<AlignmentConstraint>,
}

impl AlignmentConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AlignmentConstraint] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers a constraint. Registering the same one twice is a no-op.
    pub fn register(&mut self, target: usize, alignment: usize) -> Result<()> {
        if !alignment.is_power_of_two() || alignment < 4 {
            return Err(DatError::InvalidValue(format!(
                "alignment {} must be a power of two of at least 4",
                alignment
            )));
        }
        let c = AlignmentConstraint { target, alignment };
        if let Err(i) = self.entries.binary_search(&c) {
            self.entries.insert(i, c);
        }
        Ok(())
    }

    /// Moves every target at or after `location`.
    pub(crate) fn shift(&mut self, location: usize, amount: isize) {
        for c in self.entries.iter_mut() {
            if c.target >= location {
                c.target = (c.target as isize + amount).max(location as isize) as usize;
            }
        }
    }

    /// Indices of the constraints moved by an edit of `amount` at
    /// `location`, once [`shift`] has been applied. Ascending, and stable
    /// across further shifts since shifting preserves order.
    ///
    /// [`shift`]: AlignmentConstraints::shift
    pub(crate) fn moved_by(&self, location: usize, amount: isize) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| c.target as isize - amount >= location as isize)
            .map(|(i, _)| i)
            .collect()
    }

    /// Padding change needed to put `c` back on its boundary, if any.
    ///
    /// Scans backwards from the target over padding words; the padding run
    /// starts right after the first non-padding word. The scan stops at
    /// `floor` (the start of the data section).
    pub(crate) fn padding_fix(store: &ByteStore, c: AlignmentConstraint, floor: usize) -> Result<Option<PaddingFix>> {
        let mut padding_start = c.target;
        while padding_start >= floor + 4 && store.read_u32_at(padding_start - 4)? == PADDING_WORD {
            padding_start -= 4;
        }

        let misalign = padding_start % c.alignment;
        let required = if misalign == 0 { 0 } else { c.alignment - misalign };
        let current = c.target - padding_start;
        let delta = required as isize - current as isize;
        if delta == 0 {
            return Ok(None);
        }
        Ok(Some(PaddingFix {
            location: padding_start,
            delta,
        }))
    }
}
