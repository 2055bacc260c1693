//! Role-tagged parameter keys.
//!
//! Three components may share bare parameter names, so every parameter is
//! published to the search driver under `<name>_<tag>` where the tag is one
//! character per role. This module is the only place that inspects the key
//! text; everything else carries [`Role`] as a value.
//!
//! Names that already end in `_s`, `_e` or `_c` do not round-trip.

use hp_types::{NamingError, Role};

pub const SEPARATOR: char = '_';

pub fn tag(role: Role) -> char {
    match role {
        Role::Searcher => 's',
        Role::Evaluator => 'e',
        Role::Classifier => 'c',
    }
}

/// Build the unique key for `name` in `role`.
pub fn encode(name: &str, role: Role) -> String {
    let mut key = String::with_capacity(name.len() + 2);
    key.push_str(name);
    key.push(SEPARATOR);
    key.push(tag(role));
    key
}

/// Strip the separator and role tag from a unique key.
pub fn decode(key: &str) -> Result<&str, NamingError> {
    let mut tail = key.char_indices().rev();
    match (tail.next(), tail.next(), tail.next()) {
        (Some(_), Some((cut, _)), Some(_)) => Ok(&key[..cut]),
        _ => Err(invalid(key)),
    }
}

/// The role encoded in the last character of a unique key.
pub fn role_of(key: &str) -> Result<Role, NamingError> {
    match key.chars().last() {
        Some('s') => Ok(Role::Searcher),
        Some('e') => Ok(Role::Evaluator),
        Some('c') => Ok(Role::Classifier),
        _ => Err(invalid(key)),
    }
}

fn invalid(key: &str) -> NamingError {
    NamingError::InvalidKey {
        key: key.to_string(),
    }
}
