//! Mount phase
//!
//! A single value summarizing a coordinator's lifecycle flags, for logging
//! and for consumers that want one cell instead of three.

use std::fmt;

/// Where a component is in its mount lifecycle.
///
/// Derived from the coordinator's cells; never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MountPhase {
    Idle,
    Mounting,
    Mounted,
    /// The last mount attempt failed; the error is in `mount_error`.
    Failed,
}

impl MountPhase {
    pub(crate) fn from_flags(is_mounting: bool, is_mounted: bool, has_error: bool) -> Self {
        if is_mounting {
            Self::Mounting
        } else if is_mounted {
            Self::Mounted
        } else if has_error {
            Self::Failed
        } else {
            Self::Idle
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Mounting => "mounting",
            Self::Mounted => "mounted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MountPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mounting_wins_over_other_flags() {
        assert_eq!(MountPhase::from_flags(true, false, false), MountPhase::Mounting);
        assert_eq!(MountPhase::from_flags(true, false, true), MountPhase::Mounting);
        assert_eq!(MountPhase::from_flags(false, true, false), MountPhase::Mounted);
        assert_eq!(MountPhase::from_flags(false, false, true), MountPhase::Failed);
        assert_eq!(MountPhase::from_flags(false, false, false), MountPhase::Idle);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&MountPhase::Mounting).unwrap();
        assert_eq!(json, "\"mounting\"");

        let back: MountPhase = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, MountPhase::Failed);
    }
}
