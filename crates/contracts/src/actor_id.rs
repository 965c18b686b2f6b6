//! Actor identifiers for both simulators
//!
//! Traffic-side ids are strings handed out by the traffic simulator and are
//! cloned on every tick, so they use `Arc<str>` internally.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Vehicle simulator actor handle
pub type VehicleActorId = u32;

/// Traffic simulator actor id with cheap cloning.
///
/// Ordering is lexicographic on the underlying string; every id-ordered
/// iteration in the workspace relies on it.
///
/// ```
/// use contracts::TrafficActorId;
///
/// let ego: TrafficActorId = "0".into();
/// assert_eq!(ego, "0");
/// assert_eq!(ego.numeric(), Some(0));
/// ```
#[derive(Clone, Default)]
pub struct TrafficActorId(Arc<str>);

impl TrafficActorId {
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id, when the traffic simulator issued a plain integer id
    pub fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Deref for TrafficActorId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for TrafficActorId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TrafficActorId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrafficActorId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for TrafficActorId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for TrafficActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TrafficActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrafficActorId({:?})", self.0)
    }
}

impl PartialEq for TrafficActorId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for TrafficActorId {}

impl PartialEq<str> for TrafficActorId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for TrafficActorId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialOrd for TrafficActorId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrafficActorId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

impl Hash for TrafficActorId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for TrafficActorId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TrafficActorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
