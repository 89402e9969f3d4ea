//! Subresource-integrity style content digests.
//!
//! An integrity string holds one or more whitespace-separated hashes of the
//! form `<algorithm>-<base64 digest>[?<option>...]`, e.g.
//! `sha512-abc... sha1-def...`.

use std::fmt;

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single hash entry of an integrity string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    /// Hash algorithm, e.g. `sha512`.
    pub algorithm: CompactString,
    /// Encoded digest.
    pub digest: String,
    /// Trailing `?opt` options.
    pub options: Vec<String>,
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, self.digest)?;
        for option in &self.options {
            write!(f, "?{option}")?;
        }
        Ok(())
    }
}

/// A parsed integrity value, grouped by algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Integrity {
    hashes: IndexMap<CompactString, Vec<Hash>>,
}

impl Integrity {
    /// Parse an integrity string, skipping malformed entries.
    ///
    /// Returns `None` when no valid hash is present.
    pub fn parse(value: &str) -> Option<Self> {
        let mut hashes: IndexMap<CompactString, Vec<Hash>> = IndexMap::new();

        for token in value.split_whitespace() {
            let Some((algorithm, rest)) = token.split_once('-') else {
                continue;
            };
            if algorithm.is_empty() || !algorithm.chars().all(|c| c.is_ascii_alphanumeric()) {
                continue;
            }
            let mut parts = rest.split('?');
            let digest = parts.next().unwrap_or_default();
            if digest.is_empty() {
                continue;
            }
            let hash = Hash {
                algorithm: algorithm.into(),
                digest: digest.to_string(),
                options: parts.map(str::to_string).collect(),
            };
            hashes.entry(hash.algorithm.clone()).or_default().push(hash);
        }

        (!hashes.is_empty()).then_some(Self { hashes })
    }

    /// Algorithms present in this integrity value.
    pub fn algorithms(&self) -> impl Iterator<Item = &str> {
        self.hashes.keys().map(CompactString::as_str)
    }

    /// Hashes recorded for one algorithm.
    pub fn hashes(&self, algorithm: &str) -> &[Hash] {
        self.hashes.get(algorithm).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `other` satisfies this integrity value.
    ///
    /// Any algorithm present on both sides with an equal digest is a match.
    pub fn matches(&self, other: &Integrity) -> bool {
        self.hashes.iter().any(|(algorithm, ours)| {
            other.hashes.get(algorithm).is_some_and(|theirs| {
                ours.iter()
                    .any(|hash| theirs.iter().any(|other| other.digest == hash.digest))
            })
        })
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for hash in self.hashes.values().flatten() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{hash}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Integrity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid integrity value: {value:?}"))
    }
}

impl From<Integrity> for String {
    fn from(value: Integrity) -> Self {
        value.to_string()
    }
}
