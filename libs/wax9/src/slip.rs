//! SLIP framing (RFC 1055) as spoken by the WAX9.

use tracing::warn;

use crate::error::FrameError;

/// End of packet indicator.
pub const END: u8 = 0xC0;
/// Escape character, the next byte is a substitution.
pub const ESC: u8 = 0xDB;
/// Escaped substitution for [`END`].
pub const ESC_END: u8 = 0xDC;
/// Escaped substitution for [`ESC`].
pub const ESC_ESC: u8 = 0xDD;

/// Maps the byte following an [`ESC`] back to its data value.
///
/// Unknown values are reported as [`FrameError::BadEscape`]; callers store them literally.
pub fn unescape(byte: u8) -> Result<u8, FrameError> {
    match byte {
        ESC_END => Ok(END),
        ESC_ESC => Ok(ESC),
        byte => Err(FrameError::BadEscape { byte }),
    }
}

/// Appends `payload` to `out` as one SLIP frame, with an [`END`] on both sides.
pub fn encode(payload: &[u8], out: &mut Vec<u8>) {
    out.reserve(payload.len() + 2);
    out.push(END);
    for &b in payload {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            b => out.push(b),
        }
    }
    out.push(END);
}

pub fn encode_vec(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode(payload, &mut out);
    out
}

/// Unescapes a frame body that has already been split on [`END`].
///
/// A dangling trailing [`ESC`] is dropped.
pub fn decode(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter().copied();
    while let Some(b) = bytes.next() {
        if b != ESC {
            out.push(b);
            continue;
        }
        let Some(escaped) = bytes.next() else {
            break;
        };
        let b = unescape(escaped).unwrap_or_else(|err| {
            warn!(%err, "passing escaped value through");
            escaped
        });
        out.push(b);
    }
    out
}
