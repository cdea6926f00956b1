//! Decoding of item tokens embedded in chat lines.
//!
//! Mod clients embed items as runs of supplementary private-use characters.
//! Each character carries one or two payload bytes:
//!
//! - U+F0000 + v (v <= 0xFFFD): the two bytes of `v`, big-endian
//! - U+100000 + b (b <= 0xFF): a single trailing byte, last character only
//! - U+10FFFE / U+10FFFF: the byte pairs 0xFFFE / 0xFFFF
//!
//! The payload is a sequence of blocks, each introduced by an id byte.
//! Only the blocks needed to recover the display name are understood.

use bytes::{Buf, Bytes};

use crate::common::error::DecodeError;

const AREA_A_START: u32 = 0xF0000;
const AREA_A_END: u32 = 0xFFFFD;
const AREA_B_START: u32 = 0x100000;
const AREA_B_END: u32 = 0x10FFFF;
const AREA_B_HIGH_PAIRS: u32 = 0xFFFE;

const BLOCK_START: u8 = 0x00;
const BLOCK_TYPE: u8 = 0x01;
const BLOCK_NAME: u8 = 0x02;
const BLOCK_END: u8 = 0xFF;

const SUPPORTED_VERSION: u8 = 0;

/// Regex matching a maximal run of characters from the encoded ranges.
pub fn encoded_run_pattern() -> String {
    format!(
        r"[\x{{{:X}}}-\x{{{:X}}}\x{{{:X}}}-\x{{{:X}}}]+",
        AREA_A_START, AREA_A_END, AREA_B_START, AREA_B_END
    )
}

/// Result of decoding a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    /// Human-readable item name.
    pub name: String,
    /// Item type id, when the token carries one.
    pub item_type: Option<u8>,
}

/// Resolves an encoded run of characters to display text.
pub trait TokenDecoder: Send + Sync {
    fn decode(&self, token: &str) -> Result<DecodedToken, DecodeError>;
}

/// Decoder for item tokens produced by the mod.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemTokenDecoder;

impl ItemTokenDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TokenDecoder for ItemTokenDecoder {
    fn decode(&self, token: &str) -> Result<DecodedToken, DecodeError> {
        let mut payload = token_bytes(token)?;
        parse_blocks(&mut payload)
    }
}

/// Convert an encoded run to its raw payload bytes.
pub fn token_bytes(token: &str) -> Result<Bytes, DecodeError> {
    let mut out = Vec::with_capacity(token.len());
    let mut chars = token.chars().peekable();

    while let Some(c) = chars.next() {
        let cp = c as u32;
        match cp {
            AREA_A_START..=AREA_A_END => {
                let value = cp - AREA_A_START;
                out.push((value >> 8) as u8);
                out.push((value & 0xFF) as u8);
            }
            AREA_B_START..=AREA_B_END => {
                let value = cp - AREA_B_START;
                if value <= 0xFF {
                    if chars.peek().is_some() {
                        return Err(DecodeError::MisplacedTrailingByte);
                    }
                    out.push(value as u8);
                } else if value >= AREA_B_HIGH_PAIRS {
                    out.push(0xFF);
                    out.push((value & 0xFF) as u8);
                } else {
                    return Err(DecodeError::InvalidCodepoint(cp));
                }
            }
            _ => return Err(DecodeError::InvalidCodepoint(cp)),
        }
    }

    if out.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(Bytes::from(out))
}

fn parse_blocks(payload: &mut Bytes) -> Result<DecodedToken, DecodeError> {
    if !payload.has_remaining() {
        return Err(DecodeError::Empty);
    }

    let id = payload.get_u8();
    if id != BLOCK_START {
        return Err(DecodeError::MissingStart(id));
    }
    if !payload.has_remaining() {
        return Err(DecodeError::MissingName);
    }
    let version = payload.get_u8();
    if version != SUPPORTED_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let mut item_type = None;
    while payload.has_remaining() {
        match payload.get_u8() {
            BLOCK_TYPE => {
                if !payload.has_remaining() {
                    return Err(DecodeError::MissingName);
                }
                item_type = Some(payload.get_u8());
            }
            BLOCK_NAME => {
                let name = read_cstring(payload)?;
                return Ok(DecodedToken { name, item_type });
            }
            BLOCK_END => break,
            other => return Err(DecodeError::UnknownBlock(other)),
        }
    }

    Err(DecodeError::MissingName)
}

fn read_cstring(payload: &mut Bytes) -> Result<String, DecodeError> {
    let end = payload
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::MissingName)?;
    let raw = payload.split_to(end);
    payload.advance(1);
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidName)
}

/// Encode raw bytes as an item token (test fixture builder).
#[cfg(test)]
pub fn encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for pair in bytes.chunks(2) {
        let cp = if pair.len() == 2 {
            let value = ((pair[0] as u32) << 8) | pair[1] as u32;
            if value >= AREA_B_HIGH_PAIRS {
                AREA_B_START + value
            } else {
                AREA_A_START + value
            }
        } else {
            AREA_B_START + pair[0] as u32
        };
        out.push(char::from_u32(cp).expect("encoded ranges are valid scalar values"));
    }
    out
}

/// Build a well-formed item token carrying `name`.
#[cfg(test)]
pub fn encode_item_name(name: &str) -> String {
    let mut bytes = vec![BLOCK_START, SUPPORTED_VERSION, BLOCK_TYPE, 3, BLOCK_NAME];
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    bytes.push(BLOCK_END);
    encode_bytes(&bytes)
}
