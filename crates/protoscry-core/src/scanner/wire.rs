//! Low-level protobuf wire format walking.
//!
//! The scanner never trusts this module to decode anything. It only needs a
//! rough idea of how far one top-level message extends, so fields are skipped
//! by wire shape without looking at what they mean.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (deprecated, never walked)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Field 1 (`name`) with wire type LEN: `(1 << 3) | 2`
pub const NAME_FIELD_TAG: u8 = 0x0A;

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// Skip a single protobuf field at the start of `data`.
///
/// Returns the field number and total bytes consumed (tag and payload).
/// Group markers are refused: their extent cannot be known without
/// matching the closing marker, so the walk ends there.
pub fn skip_field(data: &[u8]) -> Result<(u32, usize)> {
    if data.is_empty() {
        return Err(Error::invalid_wire_format(0, "empty data"));
    }

    let (tag, tag_len) = decode_varint(data)
        .map_err(|_| Error::invalid_wire_format(0, "failed to decode field tag"))?;

    if tag == 0 {
        return Err(Error::invalid_wire_format(0, "zero field tag"));
    }

    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let field_number = (tag >> 3) as u32;
    let payload = &data[tag_len..];

    let value_len = match wire_type {
        WireType::Varint => {
            let (_, varint_len) = decode_varint(payload).map_err(|_| {
                Error::invalid_wire_format(tag_len, "failed to decode varint value")
            })?;
            varint_len
        }
        WireType::I64 => 8,
        WireType::Len => {
            let (length, length_varint_len) = decode_varint(payload).map_err(|_| {
                Error::invalid_wire_format(tag_len, "failed to decode length prefix")
            })?;

            usize::try_from(length)
                .ok()
                .and_then(|length| length.checked_add(length_varint_len))
                .ok_or_else(|| {
                    Error::invalid_wire_format(tag_len, format!("length {} overflows", length))
                })?
        }
        WireType::StartGroup | WireType::EndGroup => {
            return Err(Error::invalid_wire_format(
                0,
                format!("group marker on field {}", field_number),
            ));
        }
        WireType::I32 => 4,
    };

    if payload.len() < value_len {
        return Err(Error::invalid_wire_format(
            tag_len,
            format!(
                "not enough bytes for field {} (need {}, have {})",
                field_number,
                value_len,
                payload.len()
            ),
        ));
    }

    Ok((field_number, tag_len + value_len))
}

/// Estimate the encoded length of the message starting at `data`.
///
/// Fields are skipped one after another until the data runs out or a field
/// cannot be skipped (truncated varint, group marker, unknown wire type,
/// payload past the end). The offset reached at that point is returned.
///
/// This is a heuristic upper bound for a search window, not a measurement:
/// trailing bytes that happen to look like fields are counted too, and
/// malformed input yields a short answer.
pub fn estimate_message_len(data: &[u8]) -> usize {
    let mut position = 0;

    while position < data.len() {
        match skip_field(&data[position..]) {
            Ok((_, len)) => position += len,
            Err(_) => break,
        }
    }

    position
}
