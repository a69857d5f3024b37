//! Identifier wrappers shared by every glidegen crate.
//!
//! Remote schema names (tables, columns, types, scopes, instance host names)
//! compare case-insensitively everywhere. The wrappers here carry the
//! original spelling for output while folding case for equality, hashing and
//! ordering, so every map and set in the workspace agrees on identity.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Error returned when parsing an identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

/// Case-folded character stream used by every comparison in this crate.
fn folded(value: &str) -> impl Iterator<Item = char> + '_ {
    value.chars().flat_map(char::to_lowercase)
}

/// Compare two strings ignoring case.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    folded(a).eq(folded(b))
}

/// Order two strings ignoring case.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    folded(a).cmp(folded(b))
}

macro_rules! define_ci_name {
    ($name:ident, $label:expr) => {
        #[doc = concat!("Case-insensitive ", $label, ".")]
        #[derive(Debug, Clone, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse a non-blank value, trimming surrounding whitespace.
            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(IdParseError::new(concat!("Empty ", $label)));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Original spelling.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Lower-cased form, used as a storage key.
            pub fn key(&self) -> String {
                folded(&self.0).collect()
            }

            pub fn matches(&self, other: &str) -> bool {
                eq_ignore_case(&self.0, other)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                eq_ignore_case(&self.0, &other.0)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                for c in folded(&self.0) {
                    c.hash(state);
                }
                0xffu8.hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                cmp_ignore_case(&self.0, &other.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_ci_name!(Name, "schema name");
define_ci_name!(Fqdn, "instance host name");

/// 32-character hexadecimal record identifier assigned by the remote instance.
///
/// Stored in lower case so equality and hashing are plain string operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SysId(String);

impl SysId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        let trimmed = value.trim();
        if trimmed.len() != 32 {
            return Err(IdParseError::new(format!(
                "Invalid sys_id '{}': expected 32 hexadecimal characters",
                trimmed
            )));
        }
        let parsed = Uuid::try_parse(trimmed)
            .map_err(|e| IdParseError::new(format!("Invalid sys_id '{}': {}", trimmed, e)))?;
        Ok(Self(parsed.simple().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SysId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SysId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SysId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SysId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SysId> for String {
    fn from(value: SysId) -> Self {
        value.0
    }
}
