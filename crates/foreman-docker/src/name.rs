//! Container name validation and sanitization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DockerError, Result};

/// Maximum length docker accepts for a container name.
pub const MAX_NAME_LEN: usize = 128;

/// A validated docker container name.
///
/// Valid names are 1 to 128 characters, start with an alphanumeric
/// character, and contain only alphanumerics plus `.`, `_`, and `-`.
/// [`ContainerName::new`] validates strictly; [`ContainerName::sanitized`]
/// derives a valid name from arbitrary input instead of silently accepting
/// or rejecting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Validates `name` strictly.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(DockerError::InvalidName(name))
        }
    }

    /// Derives a valid name from arbitrary input.
    ///
    /// Disallowed characters map to `-`, an invalid first character is
    /// replaced with a random alphanumeric one, the result is truncated to
    /// the maximum length, and empty input is padded with random
    /// alphanumeric characters. Already-valid input comes back unchanged.
    pub fn sanitized(input: &str) -> Self {
        let mut name: String = input
            .chars()
            .take(MAX_NAME_LEN)
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();

        match name.chars().next() {
            None => name = random_alphanumeric(8),
            Some(first) if !first.is_ascii_alphanumeric() => {
                // Every remaining character is ASCII at this point.
                name.replace_range(0..1, &random_alphanumeric(1));
            }
            Some(_) => {}
        }
        Self(name)
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(name: &str) -> bool {
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        name.chars().count() <= MAX_NAME_LEN
            && first.is_ascii_alphanumeric()
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContainerName {
    type Err = DockerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = DockerError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

/// Random alphanumeric padding material, taken from a fresh UUID's hex.
fn random_alphanumeric(len: usize) -> String {
    let mut out = String::new();
    while out.chars().count() < len {
        out.extend(
            Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(len - out.chars().count()),
        );
    }
    out
}
