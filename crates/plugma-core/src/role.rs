//! Declared client roles and their routing complement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Category a context declares when it connects (`?source=`).
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum Role {
    /// Standalone preview running in an ordinary browser.
    Browser,
    /// UI surface embedded in the host sandbox.
    PluginWindow,
    /// No role declared, or an unrecognised one.
    #[default]
    Unknown,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::PluginWindow => "plugin-window",
            Self::Unknown => "unknown",
        }
    }

    /// The role messages from `self` are routed to.
    ///
    /// `Unknown` has no complement.
    pub fn complement(self) -> Option<Self> {
        match self {
            Self::Browser => Some(Self::PluginWindow),
            Self::PluginWindow => Some(Self::Browser),
            Self::Unknown => None,
        }
    }

    /// Parse a query-parameter value, falling back to `Unknown`.
    pub fn from_query(value: Option<&str>) -> Self {
        value.map_or(Self::Unknown, |v| v.parse().unwrap_or(Self::Unknown))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "browser" => Self::Browser,
            "plugin-window" => Self::PluginWindow,
            _ => Self::Unknown,
        })
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(Self::Unknown))
    }
}
