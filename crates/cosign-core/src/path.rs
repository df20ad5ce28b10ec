//! Labeled BIP-32 derivation paths.
//!
//! Grammar: `m` followed by zero or more `/[label:]index['|h]` components.
//! A bare path without the leading `m` is accepted too (`/1/2` or `1/2`).

use bitcoin::bip32::ChildNumber;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// First hardened child index (2^31).
pub const HARDENED_KEY_START: u32 = 0x8000_0000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty component in derivation path {0:?}")]
    EmptyComponent(String),

    #[error("Invalid index {component:?} in derivation path {path:?}")]
    InvalidIndex { path: String, component: String },

    #[error("Index {0} is out of range (must be below 2^31)")]
    IndexOutOfRange(u64),
}

/// One step of a derivation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathIndex {
    pub index: u32,
    pub hardened: bool,
}

impl PathIndex {
    pub fn normal(index: u32) -> Self {
        Self {
            index,
            hardened: false,
        }
    }

    pub fn hardened(index: u32) -> Self {
        Self {
            index,
            hardened: true,
        }
    }

    /// Raw BIP-32 child number with the hardened bit applied.
    pub fn raw(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED_KEY_START
        } else {
            self.index
        }
    }

    pub fn child_number(&self) -> ChildNumber {
        if self.hardened {
            ChildNumber::Hardened { index: self.index }
        } else {
            ChildNumber::Normal { index: self.index }
        }
    }
}

impl fmt::Display for PathIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// A derivation path that remembers its textual (possibly labeled) form.
///
/// Equality and prefix checks only look at the index sequence.
#[derive(Debug, Clone)]
pub struct HdPath {
    text: String,
    indexes: Vec<PathIndex>,
}

impl HdPath {
    /// The master path `m`.
    pub fn master() -> Self {
        Self {
            text: "m".to_string(),
            indexes: Vec::new(),
        }
    }

    pub fn parse(path: &str) -> Result<Self, PathError> {
        let body = path.strip_prefix('m').unwrap_or(path);
        let body = body.strip_prefix('/').unwrap_or(body);

        let mut indexes = Vec::new();
        if !body.is_empty() {
            for component in body.split('/') {
                indexes.push(parse_component(path, component)?);
            }
        }

        let text = if path.is_empty() {
            "m".to_string()
        } else {
            path.to_string()
        };

        Ok(Self { text, indexes })
    }

    pub fn indexes(&self) -> &[PathIndex] {
        &self.indexes
    }

    pub fn depth(&self) -> usize {
        self.indexes.len()
    }

    /// Append one step, keeping the labels of the existing components.
    pub fn child(&self, index: PathIndex) -> Self {
        let mut indexes = self.indexes.clone();
        indexes.push(index);
        Self {
            text: format!("{}/{}", self.text.trim_end_matches('/'), index),
            indexes,
        }
    }

    pub fn has_prefix(&self, prefix: &HdPath) -> bool {
        self.indexes.starts_with(&prefix.indexes)
    }

    /// Indexes left after stripping `prefix`. Callers check `has_prefix` first.
    pub fn indexes_from(&self, prefix: &HdPath) -> &[PathIndex] {
        let start = prefix.indexes.len().min(self.indexes.len());
        &self.indexes[start..]
    }

    pub fn child_numbers(&self) -> Vec<ChildNumber> {
        self.indexes.iter().map(PathIndex::child_number).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

fn parse_component(path: &str, component: &str) -> Result<PathIndex, PathError> {
    if component.is_empty() {
        return Err(PathError::EmptyComponent(path.to_string()));
    }

    let invalid = || PathError::InvalidIndex {
        path: path.to_string(),
        component: component.to_string(),
    };

    // Labels are informative only.
    let number = match component.rsplit_once(':') {
        Some((label, number)) => {
            let label_ok = !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !label_ok {
                return Err(invalid());
            }
            number
        }
        None => component,
    };

    let (digits, hardened) = match number.strip_suffix('\'').or_else(|| number.strip_suffix('h')) {
        Some(digits) => (digits, true),
        None => (number, false),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value >= u64::from(HARDENED_KEY_START) {
        return Err(PathError::IndexOutOfRange(value));
    }

    Ok(PathIndex {
        index: value as u32,
        hardened,
    })
}

impl PartialEq for HdPath {
    fn eq(&self, other: &Self) -> bool {
        self.indexes == other.indexes
    }
}

impl Eq for HdPath {}

impl fmt::Display for HdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for HdPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for HdPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for HdPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HdPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labeled_path() {
        let path = HdPath::parse("m/schema:1'/recovery:1'/external:1/0").unwrap();
        assert_eq!(
            path.indexes(),
            &[
                PathIndex::hardened(1),
                PathIndex::hardened(1),
                PathIndex::normal(1),
                PathIndex::normal(0),
            ]
        );
        assert_eq!(path.to_string(), "m/schema:1'/recovery:1'/external:1/0");
    }

    #[test]
    fn test_labels_do_not_affect_equality() {
        let labeled = HdPath::parse("m/schema:1'/recovery:1'").unwrap();
        let plain = HdPath::parse("m/1'/1h").unwrap();
        assert_eq!(labeled, plain);
    }

    #[test]
    fn test_master_forms() {
        assert_eq!(HdPath::parse("m").unwrap().depth(), 0);
        assert_eq!(HdPath::parse("").unwrap().depth(), 0);
        assert_eq!(HdPath::parse("m/").unwrap().depth(), 0);
        assert_eq!(HdPath::parse("/1/2").unwrap().depth(), 2);
    }

    #[test]
    fn test_prefix_and_suffix() {
        let base = HdPath::parse("m/schema:1'/recovery:1'").unwrap();
        let full = HdPath::parse("m/1'/1'/change:0/7").unwrap();
        assert!(full.has_prefix(&base));
        assert!(!base.has_prefix(&full));
        assert_eq!(
            full.indexes_from(&base),
            &[PathIndex::normal(0), PathIndex::normal(7)]
        );

        let other = HdPath::parse("m/2'").unwrap();
        assert!(!full.has_prefix(&other));
    }

    #[test]
    fn test_child_keeps_labels() {
        let path = HdPath::parse("m/schema:1'/invoices:4").unwrap();
        let child = path.child(PathIndex::normal(1));
        assert_eq!(child.to_string(), "m/schema:1'/invoices:4/1");
        assert_eq!(child.depth(), 3);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(HdPath::parse("m//1").is_err());
        assert!(HdPath::parse("m/abc").is_err());
        assert!(HdPath::parse("m/:1").is_err());
        assert!(HdPath::parse("m/1''").is_err());
        assert_eq!(
            HdPath::parse("m/2147483648"),
            Err(PathError::IndexOutOfRange(2147483648))
        );
    }

    #[test]
    fn test_raw_index() {
        assert_eq!(PathIndex::hardened(3).raw(), 0x8000_0003);
        assert_eq!(PathIndex::normal(3).raw(), 3);
    }
}
