//! Wire encoding and resync-tolerant parsing of [`Event`].
//!
//! Layout of one frame, all multi-byte integers little-endian:
//!
//! | offset | bytes | field |
//! |---|---|---|
//! | 0 | 1 | STX = 0x02 |
//! | 1 | 4 | id |
//! | 5 | 1 | sender |
//! | 6 | 1 | receiver |
//! | 7 | 1 | writeback (0/1) |
//! | 8 | 4 | length |
//! | 12 | 4*length | payload words |
//! | 12+4*length | 1 | ETX = 0x03 |

use crate::event::Event;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Bytes from STX through the end of the length field, inclusive of STX.
const HEADER_LEN: usize = 12;

pub enum ParseOutcome {
    Ok(Event),
    /// A frame starting at `new_cursor` is present but not fully buffered
    /// yet (a realistic condition on a non-blocking socket: one write can
    /// land across several reads). The caller must retain bytes from
    /// `new_cursor` onward and retry once more arrive; dropping them would
    /// lose or corrupt the frame. Distinct from [`ParseOutcome::Empty`],
    /// which means the bytes are unrecoverable garbage.
    Truncated,
    /// No further frame can be found; `new_cursor` is the end of input.
    /// These bytes are discarded — the wire format has no checksum, so
    /// garbage without a leading STX cannot be distinguished from noise
    /// and there's nothing to wait for.
    Empty,
}

pub fn encode(event: &Event) -> Vec<u8> {
    let length = event.payload.len();
    let mut out = Vec::with_capacity(HEADER_LEN + 1 + length * 4 + 1);
    out.push(STX);
    out.extend_from_slice(&event.id.to_le_bytes());
    out.push(event.sender as u8);
    out.push(event.receiver as u8);
    out.push(u8::from(event.writeback));
    out.extend_from_slice(&(length as i32).to_le_bytes());
    for word in &event.payload {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.push(ETX);
    out
}

/// Scans `buffer` starting at `cursor` for the next frame, returning the
/// outcome and the cursor position to resume scanning from.
pub fn parse(buffer: &[u8], cursor: usize) -> (ParseOutcome, usize) {
    let Some(stx_at) = buffer[cursor..].iter().position(|&b| b == STX).map(|i| i + cursor) else {
        return (ParseOutcome::Empty, buffer.len());
    };

    let header_start = stx_at + 1;
    if buffer.len() < header_start + HEADER_LEN - 1 {
        return (ParseOutcome::Truncated, stx_at);
    }

    let id = i32::from_le_bytes(buffer[header_start..header_start + 4].try_into().unwrap());
    let sender = buffer[header_start + 4] as i8;
    let receiver = buffer[header_start + 5] as i8;
    let writeback = buffer[header_start + 6] != 0;
    let length = i32::from_le_bytes(buffer[header_start + 7..header_start + 11].try_into().unwrap());

    if length < 0 {
        // Not a plausible frame length: this STX is garbage, not a frame
        // still in flight. Waiting for more bytes would never resolve it,
        // so resync past it instead of reporting Truncated.
        return parse(buffer, stx_at + 1);
    }
    let length = length as usize;

    let payload_start = header_start + 11;
    let payload_end = payload_start + length * 4;
    if buffer.len() < payload_end {
        return (ParseOutcome::Truncated, stx_at);
    }

    let mut payload = Vec::with_capacity(length);
    for word in buffer[payload_start..payload_end].chunks_exact(4) {
        payload.push(i32::from_le_bytes(word.try_into().unwrap()));
    }

    let mut new_cursor = payload_end;
    if buffer.get(payload_end) == Some(&ETX) {
        new_cursor += 1;
    }

    (ParseOutcome::Ok(Event { id, sender, receiver, writeback, payload }), new_cursor)
}

/// Runs `parse` repeatedly over `buffer`, invoking `on_event` for every
/// fully decoded frame, and returns how many leading bytes of `buffer` were
/// consumed. Stops at the first `Truncated` frame or at `Empty`; in the
/// `Truncated` case the returned count stops short of the buffer's end so
/// the caller can retain the unconsumed tail and retry once more bytes
/// arrive, rather than discarding a frame still in flight.
pub fn parse_all(buffer: &[u8], mut on_event: impl FnMut(Event)) -> usize {
    let mut cursor = 0;
    loop {
        match parse(buffer, cursor) {
            (ParseOutcome::Ok(event), new_cursor) => {
                on_event(event);
                cursor = new_cursor;
            }
            (ParseOutcome::Truncated, resume_at) => {
                cursor = resume_at;
                break;
            }
            (ParseOutcome::Empty, end) => {
                cursor = end;
                break;
            }
        }
    }
    cursor
}
