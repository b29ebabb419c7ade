//! Script decoding and encoding over plain byte slices.

use crate::error::{DatError, Result};
use crate::script::event::Event;
use crate::script::schema::EventSchema;

/// Ends a script and returns to the caller.
pub const RETURN_CODE: u32 = 0x18;
/// Ends a script by jumping elsewhere.
pub const GOTO_CODE: u32 = 0x1C;

pub type Script = Vec<Event>;

/// Decodes the event at `offset`. Fails with `TruncatedStream` when the
/// buffer ends before the event does.
pub fn read_event(schema: &EventSchema, bytes: &[u8], offset: usize) -> Result<Event> {
    let rest = bytes.get(offset..).unwrap_or(&[]);
    let window = &rest[..rest.len().min(schema.lookahead())];
    let lookup = schema.identify(window).ok_or(DatError::TruncatedStream { offset })?;
    let length = lookup.event_type().length;
    if rest.len() < length {
        return Err(DatError::TruncatedStream { offset });
    }
    Event::with_lookup(lookup, &rest[..length])
}

/// Decodes events from `start` until a return or goto (kept), or an all-zero
/// terminator (kept only when `include_terminator`). Running out of bytes
/// ends the script without error.
pub fn read_script(schema: &EventSchema, bytes: &[u8], start: usize, include_terminator: bool) -> Result<Script> {
    let mut script = Vec::new();
    let mut offset = start;
    loop {
        let event = match read_event(schema, bytes, offset) {
            Ok(event) => event,
            Err(DatError::TruncatedStream { offset }) => {
                log::debug!("script at 0x{:X} runs off the end of the buffer at 0x{:X}", start, offset);
                return Ok(script);
            }
            Err(e) => return Err(e),
        };
        offset += event.len();
        if event.code() == RETURN_CODE || event.code() == GOTO_CODE {
            script.push(event);
            return Ok(script);
        }
        if event.is_terminator() {
            if include_terminator {
                script.push(event);
            }
            return Ok(script);
        }
        script.push(event);
    }
}

pub fn script_length(script: &[Event]) -> usize {
    script.iter().map(Event::len).sum()
}

pub fn encode_script(script: &[Event]) -> Vec<u8> {
    script.iter().flat_map(|e| e.as_bytes().iter().copied()).collect()
}

/// Events paired with their absolute offsets when the script starts at
/// `start`.
pub fn iter_script(script: &[Event], start: usize) -> impl Iterator<Item = (usize, &Event)> {
    script.iter().scan(start, |offset, event| {
        let at = *offset;
        *offset += event.len();
        Some((at, event))
    })
}

/// Absolute offsets of every embedded pointer slot.
pub fn pointer_offsets(script: &[Event], start: usize) -> Vec<usize> {
    iter_script(script, start)
        .flat_map(|(at, event)| event.pointers().iter().map(move |p| at + p))
        .collect()
}
