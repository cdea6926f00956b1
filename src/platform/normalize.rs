//! Content cleanup for messages relayed from the chat platform.
//!
//! The game client renders some invisible and private-use characters as
//! icons or uses them as markers, so they are removed before the message
//! is sent to in-game sessions.

use crate::common::PlatformMessage;

/// Characters removed from platform message content.
const DISALLOWED: &[char] = &[
    '\u{200C}', // zero width non-joiner
    '\u{2064}', // invisible plus
    '\u{E000}',
    '\u{E012}',
    '\u{E013}',
    '\u{E071}',
    '\u{E07E}',
    '\u{E07F}',
    '\u{E080}',
    '\u{E087}',
    '\u{E088}',
    '\u{E089}',
    '\u{E08B}',
    'Á',
    'À',
    '\u{058E}', // Armenian eternity sign
];

pub fn is_disallowed(c: char) -> bool {
    DISALLOWED.contains(&c)
}

/// Remove every disallowed character.
pub fn normalize_content(content: &str) -> String {
    content.chars().filter(|c| !is_disallowed(*c)).collect()
}

/// Normalize `Content` and keep every other field verbatim.
pub fn normalize_message(mut message: PlatformMessage) -> PlatformMessage {
    message.content = normalize_content(&message.content);
    message
}
