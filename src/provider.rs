//! Provider identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BoxError, Result};

/// Name of the hypervisor backend a box targets, e.g. `virtualbox`.
///
/// Compared case-sensitively as a single token; surrounding whitespace is
/// stripped when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    pub fn parse(input: &str) -> Result<Self> {
        let token = input.trim();
        let valid = !token.is_empty()
            && token != "."
            && token != ".."
            && !token
                .chars()
                .any(|c| c.is_whitespace() || c == '/' || c == '\\' || c == '\0');
        if !valid {
            return Err(BoxError::InvalidProvider {
                provider: input.to_string(),
            });
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a provider list for messages: `virtualbox, libvirt`.
    pub fn join(providers: &[ProviderId]) -> String {
        providers
            .iter()
            .map(ProviderId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProviderId {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = BoxError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ProviderId> for String {
    fn from(value: ProviderId) -> Self {
        value.0
    }
}
