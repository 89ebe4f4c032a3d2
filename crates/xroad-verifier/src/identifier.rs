//! Participant identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Structured participant identifier: instance, member class, member code
/// and an optional subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId {
    pub instance: String,
    pub member_class: String,
    pub member_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
}

impl ClientId {
    /// Member-level identifier (no subsystem).
    pub fn member(
        instance: impl Into<String>,
        member_class: impl Into<String>,
        member_code: impl Into<String>,
    ) -> Self {
        Self {
            instance: instance.into(),
            member_class: member_class.into(),
            member_code: member_code.into(),
            subsystem: None,
        }
    }

    /// Subsystem-level identifier.
    pub fn subsystem(
        instance: impl Into<String>,
        member_class: impl Into<String>,
        member_code: impl Into<String>,
        subsystem: impl Into<String>,
    ) -> Self {
        Self {
            subsystem: Some(subsystem.into()),
            ..Self::member(instance, member_class, member_code)
        }
    }

    /// Compare on instance, member class and member code, ignoring subsystem.
    pub fn member_equals(&self, other: &ClientId) -> bool {
        self.instance == other.instance
            && self.member_class == other.member_class
            && self.member_code == other.member_code
    }

    /// Same identifier with the subsystem dropped.
    pub fn member_id(&self) -> ClientId {
        Self::member(&self.instance, &self.member_class, &self.member_code)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.instance, self.member_class, self.member_code
        )?;
        if let Some(subsystem) = &self.subsystem {
            write!(f, "/{}", subsystem)?;
        }
        Ok(())
    }
}

/// Error parsing a [`ClientId`] from its `INSTANCE/CLASS/CODE[/SUBSYSTEM]` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid client identifier '{input}': expected INSTANCE/CLASS/CODE[/SUBSYSTEM]")]
pub struct ParseClientIdError {
    pub input: String,
}

impl FromStr for ClientId {
    type Err = ParseClientIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(ParseClientIdError {
                input: s.to_string(),
            });
        }

        match parts.as_slice() {
            [instance, class, code] => Ok(Self::member(*instance, *class, *code)),
            [instance, class, code, subsystem] => {
                Ok(Self::subsystem(*instance, *class, *code, *subsystem))
            }
            _ => Err(ParseClientIdError {
                input: s.to_string(),
            }),
        }
    }
}
