use std::fmt;
use std::str::FromStr;

use crate::error::{CursorError, Result};

/// Read preference mode used when selecting the server for the initial command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreference {
    /// Every registered mode
    pub const ALL: [ReadPreference; 5] = [
        ReadPreference::Primary,
        ReadPreference::PrimaryPreferred,
        ReadPreference::Secondary,
        ReadPreference::SecondaryPreferred,
        ReadPreference::Nearest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        }
    }

    /// Resolve a mode by its registered name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        ReadPreference::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                CursorError::InvalidArgument(format!("invalid read preference mode '{name}'"))
            })
    }

    /// Whether the mode may route reads away from the primary.
    pub fn is_secondary_ok(&self) -> bool {
        !matches!(self, ReadPreference::Primary)
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPreference {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        assert_eq!(
            ReadPreference::from_name("secondaryPreferred").unwrap(),
            ReadPreference::SecondaryPreferred
        );
        assert_eq!(
            ReadPreference::from_name("NEAREST").unwrap(),
            ReadPreference::Nearest
        );
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = ReadPreference::from_name("fastest").unwrap_err();
        assert!(matches!(err, CursorError::InvalidArgument(_)));
    }

    #[test]
    fn test_secondary_ok() {
        assert!(!ReadPreference::Primary.is_secondary_ok());
        assert!(ReadPreference::Nearest.is_secondary_ok());
    }
}
