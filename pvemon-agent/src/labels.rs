//! Dimension sets attached to every metric observation
//!
//! A `LabelSet` is built once per entity per tick and never mutated:
//! - cluster labels: `cluster`, `clusterid`
//! - node labels: cluster labels + `node`, `nodeid`, `nodeip`
//! - entity labels: node labels + entity keys (`vmid`, `lxcid`, `nodestorage`, `service`...)
//!
//! Children inherit every parent key and may not redefine one.

use std::fmt;

/// Errors raised while building a label set
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LabelError {
    #[error("label key collision: {0}")]
    Collision(String),
}

/// Ordered, immutable dimension name -> value mapping.
///
/// Values are optional: a cluster without a `cluster` record still carries the
/// `cluster` key, with no value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    entries: Vec<(String, Option<String>)>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a root label set (no parent).
    pub fn root<I, K>(own: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        Self::new().merge(own)
    }

    /// Return a new set holding every parent label followed by `own`.
    pub fn merge<I, K>(&self, own: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        let mut entries = self.entries.clone();
        for (key, value) in own {
            let key = key.into();
            if entries.iter().any(|(existing, _)| *existing == key) {
                return Err(LabelError::Collision(key));
            }
            entries.push((key, value));
        }
        Ok(Self { entries })
    }

    /// Value for `key`; `None` when the key is absent or carries no value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v.unwrap_or("null"))?;
        }
        write!(f, "}}")
    }
}

/// Shorthand for a label with a known value.
pub fn label(key: &'static str, value: impl ToString) -> (&'static str, Option<String>) {
    (key, Some(value.to_string()))
}
