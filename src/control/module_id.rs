//! Closed set of module identifiers and alias canonicalization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::HmError;

/// Identifier of a pluggable monitoring module.
///
/// `inode` is not a variant of its own: it is accepted wherever a name is
/// parsed and canonicalizes to [`ModuleId::Disk`] before any lookup happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleId {
    Live,
    Target,
    #[serde(alias = "inode")]
    Disk,
    Ram,
    Cpu,
    /// Configuration only: no status, never started or stopped.
    Notify,
}

/// Number of module identifiers.
pub const MODULE_COUNT: usize = 6;

/// Name accepted for [`ModuleId::Disk`] in addition to `disk`.
pub const DISK_ALIAS: &str = "inode";

impl ModuleId {
    /// Every module, in registry order.
    pub const ALL: [Self; MODULE_COUNT] = [
        Self::Live,
        Self::Target,
        Self::Disk,
        Self::Ram,
        Self::Cpu,
        Self::Notify,
    ];

    /// Modules that have workers and a running status.
    pub const CONTROLLABLE: [Self; 5] = [Self::Live, Self::Target, Self::Disk, Self::Ram, Self::Cpu];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Target => "target",
            Self::Disk => "disk",
            Self::Ram => "ram",
            Self::Cpu => "cpu",
            Self::Notify => "notify",
        }
    }

    /// Dense index for array-backed tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Live => 0,
            Self::Target => 1,
            Self::Disk => 2,
            Self::Ram => 3,
            Self::Cpu => 4,
            Self::Notify => 5,
        }
    }

    /// Whether the module exposes status and can be enabled/disabled.
    #[must_use]
    pub const fn is_controllable(self) -> bool {
        !matches!(self, Self::Notify)
    }

    /// Canonicalize a raw name (`inode` -> `disk`). Returns `None` for unknown names.
    #[must_use]
    pub fn canonicalize(raw: &str) -> Option<Self> {
        match raw {
            "live" => Some(Self::Live),
            "target" => Some(Self::Target),
            "disk" | DISK_ALIAS => Some(Self::Disk),
            "ram" => Some(Self::Ram),
            "cpu" => Some(Self::Cpu),
            "notify" => Some(Self::Notify),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleId {
    type Err = HmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::canonicalize(s).ok_or_else(|| HmError::module_not_found(s))
    }
}

/// Addressee of a Signal: one module or every module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalTarget {
    Module(ModuleId),
    All,
}

impl fmt::Display for SignalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(id) => id.fmt(f),
            Self::All => f.write_str("all"),
        }
    }
}

impl From<ModuleId> for SignalTarget {
    fn from(value: ModuleId) -> Self {
        Self::Module(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn inode_resolves_to_disk() {
        assert_eq!("inode".parse::<ModuleId>().unwrap(), ModuleId::Disk);
        assert_eq!("disk".parse::<ModuleId>().unwrap(), ModuleId::Disk);
        let parsed: ModuleId = serde_json::from_str("\"inode\"").unwrap();
        assert_eq!(parsed, ModuleId::Disk);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"disk\"");
    }

    #[test]
    fn unknown_names_are_structured_errors() {
        for raw in ["", "Disk", "gpu", "main", "all", " cpu"] {
            let err = raw.parse::<ModuleId>().expect_err("must not resolve");
            assert!(matches!(err, HmError::ModuleNotFound { .. }), "{raw:?}");
        }
    }

    #[test]
    fn indices_are_dense_and_unique() {
        for (position, id) in ModuleId::ALL.iter().enumerate() {
            assert_eq!(id.index(), position);
        }
        assert!(!ModuleId::Notify.is_controllable());
        assert!(ModuleId::CONTROLLABLE.iter().all(|id| id.is_controllable()));
    }

    proptest! {
        #[test]
        fn canonical_names_round_trip(index in 0usize..6) {
            let id = ModuleId::ALL[index];
            prop_assert_eq!(ModuleId::canonicalize(id.as_str()), Some(id));
            prop_assert_eq!(id.to_string(), id.as_str());
        }

        #[test]
        fn arbitrary_names_never_panic(raw in "\\PC{0,12}") {
            let resolved = ModuleId::canonicalize(&raw);
            if let Some(id) = resolved {
                prop_assert!(raw == id.as_str() || (raw == DISK_ALIAS && id == ModuleId::Disk));
            }
        }
    }
}
