//! Bucket names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named group of keys synchronized with the remote store as one snapshot.
///
/// The unnamed bucket is the *global* bucket and is what callers get when
/// they do not choose one. Bucket names are not validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bucket(Option<String>);

impl Bucket {
    /// Returns the global (unnamed) bucket.
    #[must_use]
    pub const fn global() -> Self {
        Self(None)
    }

    /// Returns a named bucket.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(Some(name.into()))
    }

    /// Returns the bucket name, or `None` for the global bucket.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Returns true for the global bucket.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => f.write_str(name),
            None => f.write_str("<global>"),
        }
    }
}

impl From<&str> for Bucket {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Bucket {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<Option<String>> for Bucket {
    fn from(name: Option<String>) -> Self {
        Self(name)
    }
}

impl From<Option<&str>> for Bucket {
    fn from(name: Option<&str>) -> Self {
        Self(name.map(str::to_owned))
    }
}
