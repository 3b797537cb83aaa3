//! Phone number canonicalization
//!
//! Both platforms name the same person differently: WuzAPI speaks in JIDs
//! (`573001234567@s.whatsapp.net`, `...@g.us` for groups) while Chatwoot
//! stores E.164-ish strings (`+57 300 123 4567`). The canonical digits-only
//! form is the join key between the two.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

const USER_SUFFIX: &str = "@s.whatsapp.net";
const GROUP_SUFFIX: &str = "@g.us";
const GROUP_PREFIX: &str = "group_";

/// Minimum/maximum digit count for an individual number.
const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Canonicalized phone identifier.
///
/// Immutable: the canonical form is derived once at construction.
/// Equality and hashing use the canonical form only; the raw form is kept
/// so outbound gateways can re-apply their own suffix conventions.
#[derive(Debug, Clone)]
pub struct PhoneNumber {
    raw: String,
    canonical: String,
    is_group: bool,
}

impl PhoneNumber {
    /// Parse a phone identifier in either platform's syntax.
    ///
    /// Strips the JID domain suffix, a leading `+`, the `:device` part and
    /// formatting punctuation. Group identifiers (`@g.us` or a `group_`
    /// prefix) keep their internal structure. Newsletter and LID JIDs are
    /// rejected; they do not map to a dialable peer.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidPhoneNumber("empty identifier".to_string()));
        }
        if raw.contains("@newsletter") {
            return Err(Error::InvalidPhoneNumber(format!("newsletter JID: {}", raw)));
        }
        if raw.contains("@lid") {
            return Err(Error::InvalidPhoneNumber(format!("LID JID: {}", raw)));
        }

        // The group_ prefix may arrive behind a leading + (our own
        // formatted/source-id forms echoed back by Chatwoot webhooks).
        let is_group = raw.contains(GROUP_SUFFIX)
            || raw.trim().trim_start_matches('+').starts_with(GROUP_PREFIX);

        let mut clean = raw.trim().to_string();
        clean = clean.replace(USER_SUFFIX, "");
        clean = clean.replace(GROUP_SUFFIX, "");
        clean = clean.replace('+', "");
        if let Some(prefix_less) = clean.strip_prefix(GROUP_PREFIX) {
            clean = prefix_less.to_string();
        }
        // Drop the device part (573166203787:24 -> 573166203787)
        if let Some((number, _device)) = clean.split_once(':') {
            clean = number.to_string();
        }

        let canonical = if is_group {
            // Group ids carry a dash (creator-timestamp); keep it intact.
            clean
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '-')
                .collect::<String>()
        } else {
            clean.chars().filter(char::is_ascii_digit).collect::<String>()
        };

        if !canonical.chars().any(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidPhoneNumber(format!("no digits in: {}", raw)));
        }

        if !is_group {
            let digits = canonical.len();
            if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
                return Err(Error::InvalidPhoneNumber(format!(
                    "bad length ({} digits): {}",
                    digits, raw
                )));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            canonical,
            is_group,
        })
    }

    /// Stable digits-only representation: the cache key and the contact
    /// search key against the inbox platform.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The identifier as it arrived from the wire.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// International presentation form (`+573001234567`, `+group_<id>`).
    pub fn formatted(&self) -> String {
        if self.is_group {
            format!("+{}{}", GROUP_PREFIX, self.canonical)
        } else {
            format!("+{}", self.canonical)
        }
    }

    /// Identifier stored as the inbox conversation's `source_id`.
    ///
    /// Chatwoot echoes this value back verbatim in `message_created`
    /// webhooks, so it must survive a round trip through `parse`: bare
    /// digits for individuals, `group_<id>` for groups (a bare group id
    /// would be indistinguishable from an over-long user number).
    pub fn source_id(&self) -> String {
        if self.is_group {
            format!("{}{}", GROUP_PREFIX, self.canonical)
        } else {
            self.canonical.clone()
        }
    }

    /// Whether this identifies a group chat rather than an individual.
    pub fn is_group(&self) -> bool {
        self.is_group
    }
}

impl PartialEq for PhoneNumber {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for PhoneNumber {}

impl Hash for PhoneNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}
