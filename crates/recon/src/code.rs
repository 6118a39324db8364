use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator between classifier segments in the string form of a code.
pub const SEGMENT_SEPARATOR: char = '/';

/// Hierarchical administrative (KATOTTH) code.
///
/// A classifier row carries up to five code columns; the non-empty ones, in
/// order, form the code. Dropping the last segment yields the parent's code,
/// so the parent's string form is always a prefix of the child's.
///
/// The last segment (the *leaf*) is the identifier external sources know.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdministrativeCode {
    segments: Vec<String>,
}

impl AdministrativeCode {
    /// Build from raw classifier columns, skipping blank ones.
    /// Returns `None` when every column is blank.
    pub fn from_segments<I, S>(columns: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<String> = columns
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    /// Parse the `/`-joined string form.
    pub fn parse(input: &str) -> Option<Self> {
        Self::from_segments(input.split(SEGMENT_SEPARATOR))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn leaf(&self) -> &str {
        // Non-empty by construction.
        &self.segments[self.segments.len() - 1]
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// The code one level up, or `None` for a root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Every proper ancestor, nearest first.
    pub fn ancestors(&self) -> Vec<Self> {
        (1..self.segments.len())
            .rev()
            .map(|n| Self {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    pub fn is_parent_of(&self, other: &Self) -> bool {
        other.segments.len() == self.segments.len() + 1
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl std::fmt::Display for AdministrativeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEGMENT_SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for AdministrativeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AdministrativeCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AdministrativeCode::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom("administrative code must not be empty"))
    }
}
