use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable identifier of a slide: its content path inside the course package.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlideGuid(String);

impl SlideGuid {
    /// Creates a new `SlideGuid`
    #[must_use]
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    /// Guid used for slides that carry no filepath.
    #[must_use]
    pub fn positional(index: usize) -> Self {
        Self(format!("slide-{index}"))
    }

    /// Returns the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of an embedded activity (quiz, ctf, jobe, scenario, consoles).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    /// Creates a new `ActivityId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SlideGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlideGuid({})", self.0)
    }
}

impl fmt::Debug for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivityId({})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for SlideGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Conversions ───────────────────────────────────────────────────────────────

impl From<&str> for SlideGuid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SlideGuid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ActivityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActivityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for SlideGuid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ActivityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn positional_guid_uses_slide_prefix() {
        assert_eq!(SlideGuid::positional(3).as_str(), "slide-3");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ActivityId::new("quiz-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"quiz-1\"");
    }

    #[test]
    fn ids_work_as_json_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(SlideGuid::new("intro.md"), 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"intro.md":1}"#);

        let back: BTreeMap<SlideGuid, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("intro.md"), Some(&1));
    }
}
