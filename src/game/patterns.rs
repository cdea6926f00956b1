//! Ordered classification rules for in-game chat lines.
//!
//! Each stream has its own rule list. Rules are tried in declaration order
//! and the first match wins. Rules either take the body straight from the
//! `content` capture group or derive it from other groups; derivations may
//! also describe side effects, which are returned as data and executed by
//! the caller.

use std::fmt;

use fancy_regex::{Captures, Regex};
use tracing::warn;

use crate::bridge::sequence::StreamKind;
use crate::common::{EventKind, OutputEvent};

/// Header for territory and loadout changes made by high ranks.
pub const HEADER_TERRITORY: &str = "⚠️ 🤓";
/// Header for general guild information.
pub const HEADER_INFO: &str = "⚠️ Info";
pub const HEADER_RAID: &str = "⚠️ Guild Raid";
pub const HEADER_ASPECT: &str = "⚠️ Aspect";
pub const HEADER_TOME: &str = "⚠️ Tome";
pub const HEADER_EMERALDS: &str = "⚠️ 🤑";

/// Reward credited to every participant of a completed raid.
pub const RAID_REWARD: f64 = 0.5;
/// Reward debited when an aspect is handed out.
pub const ASPECT_COST: f64 = 1.0;

/// Side effect requested by a rule derivation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist a completion (e.g. a raid) shared by several players.
    RecordCompletion {
        participants: Vec<String>,
        label: String,
    },
    /// Change a player's reward balance.
    AdjustReward { identity: String, delta: f64 },
}

/// Body and side effects produced by a derive function.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub body: String,
    pub effects: Vec<Effect>,
}

impl Derivation {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Custom body derivation from the matched groups.
pub type DeriveFn = fn(&Captures<'_>) -> Derivation;

/// Result of classifying a line.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Name of the rule that matched.
    pub rule: &'static str,
    /// Event with the unsanitized body.
    pub event: OutputEvent,
    /// Side effects requested by the rule.
    pub effects: Vec<Effect>,
}

/// A single classification rule.
#[derive(Clone)]
pub struct PatternRule {
    name: &'static str,
    regex: Regex,
    kind: EventKind,
    /// Fixed header, overrides the `header` capture group.
    header: Option<&'static str>,
    derive: Option<DeriveFn>,
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("name", &self.name)
            .field("pattern", &self.regex.as_str())
            .field("kind", &self.kind)
            .field("header", &self.header)
            .field("derived", &self.derive.is_some())
            .finish()
    }
}

impl PatternRule {
    pub fn new(name: &'static str, pattern: &str, kind: EventKind) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            kind,
            header: None,
            derive: None,
        })
    }

    pub fn with_header(mut self, header: &'static str) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_derive(mut self, derive: DeriveFn) -> Self {
        self.derive = Some(derive);
        self
    }

    /// Returns true if the rule matches any line, including empty and multi-line ones.
    pub fn is_catch_all(&self) -> bool {
        ["", "§r", "first\nsecond"]
            .iter()
            .all(|line| self.apply(line).is_some())
    }

    /// Try this rule against a line.
    pub fn apply(&self, line: &str) -> Option<Classification> {
        let caps = match self.regex.captures(line) {
            Ok(Some(caps)) => caps,
            Ok(None) => return None,
            Err(e) => {
                warn!(rule = self.name, error = %e, "Regex match error");
                return None;
            }
        };

        let header = match self.header {
            Some(header) => header.to_string(),
            None => group(&caps, "header").to_string(),
        };

        let (body, effects) = match self.derive {
            Some(derive) => {
                let derived = derive(&caps);
                (derived.body, derived.effects)
            }
            None => (group(&caps, "content").to_string(), Vec::new()),
        };

        Some(Classification {
            rule: self.name,
            event: OutputEvent::new(self.kind, header, body),
            effects,
        })
    }
}

/// Get a named group, or an empty string if it did not participate.
fn group<'t>(caps: &Captures<'t>, name: &str) -> &'t str {
    caps.name(name).map(|m| m.as_str()).unwrap_or("")
}

/// Ordered rule lists for every stream.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    main: Vec<PatternRule>,
    /// Must end with a catch-all rule.
    secondary: Vec<PatternRule>,
    passthrough: PatternRule,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl PatternRegistry {
    pub fn new(main: Vec<PatternRule>, secondary: Vec<PatternRule>, passthrough: PatternRule) -> Self {
        debug_assert!(
            secondary.last().is_some_and(PatternRule::is_catch_all),
            "secondary rules must end with a catch-all"
        );
        Self {
            main,
            secondary,
            passthrough,
        }
    }

    /// The rule set used by the relay.
    pub fn standard() -> Self {
        Self::new(main_rules(), secondary_rules(), passthrough_rule())
    }

    /// Classify a line submitted on one of the in-game streams.
    ///
    /// Returns `None` only on the main stream; the secondary stream always
    /// matches its catch-all.
    pub fn classify(&self, stream: StreamKind, line: &str) -> Option<Classification> {
        let rules = match stream {
            StreamKind::Main => &self.main,
            StreamKind::Secondary => &self.secondary,
        };
        rules.iter().find_map(|rule| rule.apply(line))
    }

    /// Classify a preformatted `header: content` line from the platform side.
    pub fn classify_passthrough(&self, line: &str) -> Option<Classification> {
        self.passthrough.apply(line)
    }

    /// Number of rules for a stream.
    #[cfg(test)]
    pub fn rule_count(&self, stream: StreamKind) -> usize {
        match stream {
            StreamKind::Main => self.main.len(),
            StreamKind::Secondary => self.secondary.len(),
        }
    }
}

fn rule(name: &'static str, pattern: &str, kind: EventKind) -> PatternRule {
    PatternRule::new(name, pattern, kind).unwrap()
}

fn main_rules() -> Vec<PatternRule> {
    vec![
        rule(
            "guild_chat",
            r"^.*§[38](?P<header>.+?)(?:§[38b])?:(?:§[b8])? (?P<content>.*)$",
            EventKind::Wynn,
        ),
        rule(
            "raid_completion",
            r"^§[e8](?P<player1>.*?)§[b8], §[e8](?P<player2>.*?)§[b8], §[e8](?P<player3>.*?)§[b8], and §[e8](?P<player4>.*?)§[b8] finished §[38](?P<raid>.*?)§[b8].*$",
            EventKind::Guild,
        )
        .with_header(HEADER_RAID)
        .with_derive(derive_raid_completion),
        rule(
            "aspect_reward",
            r"^§.(?P<giver>.*?)(?:§.)? rewarded §.an Aspect§. to §.(?P<receiver>.*?)(?:§.)?$",
            EventKind::Guild,
        )
        .with_header(HEADER_ASPECT)
        .with_derive(derive_aspect_reward),
        rule(
            "tome_reward",
            r"^§.(?P<giver>.*?)(?:§.)? rewarded §.a Guild Tome§. to §.(?P<receiver>.*?)(?:§.)?$",
            EventKind::Guild,
        )
        .with_header(HEADER_TOME)
        .with_derive(|caps| {
            Derivation::body(format!(
                "{} has given a tome to {}",
                group(caps, "giver"),
                group(caps, "receiver")
            ))
        }),
        rule(
            "emerald_reward",
            r"^§.(?P<giver>.*?)(?:§.)? rewarded §.1024 Emeralds§. to §.(?P<receiver>.*?)(?:§.)?$",
            EventKind::Guild,
        )
        .with_header(HEADER_EMERALDS)
        .with_derive(|caps| {
            Derivation::body(format!(
                "{} has given 1024 emeralds to {}",
                group(caps, "giver"),
                group(caps, "receiver")
            ))
        }),
    ]
}

fn secondary_rules() -> Vec<PatternRule> {
    vec![
        rule(
            "territory_bonus_set",
            r"^(?P<content>§.(?P<username>.+?)§. set §.(?P<bonus>.+?)§. to level §.(?P<level>.+?)§. on §.(?P<territory>.*))$",
            EventKind::Guild,
        )
        .with_header(HEADER_TERRITORY),
        rule(
            "territory_bonus_removed",
            r"^(?P<content>§.(?P<username>.+?)§. removed §.(?P<changed>.+?)§. from §.(?P<territory>.*))$",
            EventKind::Guild,
        )
        .with_header(HEADER_TERRITORY),
        rule(
            "territory_changed",
            r"^(?P<content>§.(?P<username>.+?)§. changed §.\d+ \w+§. on §3(?P<territory>.*))$",
            EventKind::Guild,
        )
        .with_header(HEADER_TERRITORY),
        rule(
            "territory_overflow",
            r"^(?P<content>Territory §.(?P<territory>.+?)§. is \w+ more resources than it can store!)$",
            EventKind::Guild,
        )
        .with_header(HEADER_TERRITORY),
        rule(
            "territory_stabilised",
            r"^(?P<content>Territory §.(?P<territory>.+?)§. production has stabilised)$",
            EventKind::Guild,
        )
        .with_header(HEADER_TERRITORY),
        rule(
            "loadout_applied",
            r"^(?P<content>§.(?P<username>.+?)§. applied the loadout §(?P<loadout>..+?)§. on §.(?P<territory>.*))$",
            EventKind::Guild,
        )
        .with_header(HEADER_TERRITORY),
        rule(
            "bank_deposit",
            r"^(?P<content>§.(?P<username>.+?)§. \w+ §.(?P<deposited>.+?)§. to the Guild Bank \(§.High Ranked§.\))$",
            EventKind::Guild,
        )
        .with_header(HEADER_INFO),
        rule(
            "tome_found",
            r"^(?P<content>§.A Guild Tome§. has been found and added to the Guild Rewards)$",
            EventKind::Guild,
        )
        .with_header(HEADER_INFO),
        rule("catch_all", r"(?s)^(?P<content>.*)$", EventKind::Guild).with_header(HEADER_INFO),
    ]
}

fn passthrough_rule() -> PatternRule {
    rule(
        "platform_passthrough",
        r"^(?P<header>.+?): (?P<content>.*)$",
        EventKind::Passthrough,
    )
}

fn derive_raid_completion(caps: &Captures<'_>) -> Derivation {
    let participants: Vec<String> = ["player1", "player2", "player3", "player4"]
        .iter()
        .map(|name| group(caps, name).to_string())
        .collect();
    let raid = group(caps, "raid");

    let body = format!(
        "{}, {}, {}, and {} completed {}",
        participants[0], participants[1], participants[2], participants[3], raid
    );

    let mut credited: Vec<&String> = Vec::with_capacity(participants.len());
    for participant in &participants {
        if !credited.contains(&participant) {
            credited.push(participant);
        }
    }
    let rewards: Vec<Effect> = credited
        .into_iter()
        .map(|identity| Effect::AdjustReward {
            identity: identity.clone(),
            delta: RAID_REWARD,
        })
        .collect();

    let mut derivation = Derivation::body(body).with_effect(Effect::RecordCompletion {
        participants: participants.clone(),
        label: raid.to_string(),
    });
    derivation.effects.extend(rewards);
    derivation
}

fn derive_aspect_reward(caps: &Captures<'_>) -> Derivation {
    let giver = group(caps, "giver");
    let receiver = group(caps, "receiver");

    Derivation::body(format!("{} has given an aspect to {}", giver, receiver)).with_effect(
        Effect::AdjustReward {
            identity: receiver.to_string(),
            delta: -ASPECT_COST,
        },
    )
}
