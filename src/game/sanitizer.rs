//! Chat line cleanup before broadcast.
//!
//! Strips in-game formatting codes and replaces embedded item tokens with
//! readable references.

use std::sync::Arc;

use fancy_regex::{Captures, Regex};
use tracing::warn;

use crate::game::encoding::{encoded_run_pattern, ItemTokenDecoder, TokenDecoder};

/// How a resolved item token is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStyle {
    /// `**__Name__**`, used for classified in-game lines.
    Emphasized,
    /// `<Name>`, used for platform passthrough lines.
    Angled,
}

impl TokenStyle {
    fn render(self, name: &str) -> String {
        match self {
            Self::Emphasized => format!("**__{}__**", name),
            Self::Angled => format!("<{}>", name),
        }
    }
}

/// Line sanitizer with a pluggable token decoder.
#[derive(Clone)]
pub struct LineSanitizer {
    /// Pattern for formatting codes (`§` followed by any character).
    formatting_pattern: Regex,
    /// Pattern for maximal runs of encoded characters.
    token_pattern: Regex,
    decoder: Arc<dyn TokenDecoder>,
}

impl Default for LineSanitizer {
    fn default() -> Self {
        Self::new(Arc::new(ItemTokenDecoder::new()))
    }
}

impl LineSanitizer {
    pub fn new(decoder: Arc<dyn TokenDecoder>) -> Self {
        Self {
            formatting_pattern: Regex::new(r"(?s)§.").unwrap(),
            token_pattern: Regex::new(&encoded_run_pattern()).unwrap(),
            decoder,
        }
    }

    /// Remove formatting codes.
    pub fn strip_formatting(&self, line: &str) -> String {
        self.formatting_pattern.replace_all(line, "").to_string()
    }

    /// Replace every encoded run with its decoded name.
    ///
    /// A run that fails to decode is kept as-is.
    pub fn substitute_tokens(&self, line: &str, style: TokenStyle) -> String {
        self.token_pattern
            .replace_all(line, |caps: &Captures| -> String {
                let run = &caps[0];
                match self.decoder.decode(run) {
                    Ok(token) => style.render(&token.name),
                    Err(e) => {
                        warn!(
                            error = %e,
                            length = run.chars().count(),
                            "Failed to decode item token, leaving it literal"
                        );
                        run.to_string()
                    }
                }
            })
            .to_string()
    }

    /// Full cleanup: formatting codes first, then item tokens.
    pub fn sanitize(&self, line: &str, style: TokenStyle) -> String {
        let stripped = self.strip_formatting(line);
        self.substitute_tokens(&stripped, style)
    }
}
