//! Hierarchical names.
//!
//! A name is an ordered list of components rendered as `/a/b/c`. Names are
//! treated as opaque keys by the presence engine; the only structure it relies
//! on is prefix matching and trimming trailing components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Component inserted between a routing prefix and the user prefix it hints.
pub const ROUTING_HINT_SEPARATOR: &str = "%F0.";

/// A hierarchical name made of string components.
///
/// Serializes as its `/a/b/c` string form.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name {
    components: Vec<String>,
}

impl Name {
    /// The empty name, rendered as `/`.
    pub const fn empty() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a name from its `/a/b/c` form.
    ///
    /// Empty segments are skipped, so `"/a//b/"` parses as `/a/b`.
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.chars().any(char::is_control) {
            return Err(CoreError::InvalidName(uri.escape_debug().to_string()));
        }
        let components = uri
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(String::from)
            .collect();
        Ok(Self { components })
    }

    /// Return a copy of this name with one more component.
    pub fn append(&self, component: impl Into<String>) -> Self {
        let mut components = self.components.clone();
        components.push(component.into());
        Self { components }
    }

    /// Return a copy of this name followed by every component of `suffix`.
    pub fn join(&self, suffix: &Name) -> Self {
        let mut components = self.components.clone();
        components.extend(suffix.components.iter().cloned());
        Self { components }
    }

    /// The first `len` components (the whole name if `len` is larger).
    pub fn prefix(&self, len: usize) -> Self {
        let len = len.min(self.components.len());
        Self {
            components: self.components[..len].to_vec(),
        }
    }

    /// The name without its last `count` components.
    pub fn trim(&self, count: usize) -> Self {
        self.prefix(self.components.len().saturating_sub(count))
    }

    /// Whether every component of `self` leads `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a == b)
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The last component, if any.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Iterate over the components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Render as `/a/b/c`.
    pub fn to_uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl FromStr for Name {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Name {
    type Error = CoreError;

    fn try_from(uri: String) -> Result<Self> {
        Self::parse(&uri)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.to_string()
    }
}
