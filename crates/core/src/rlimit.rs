//! Process resource limits declared on tasks.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Kernel resource-limit kinds understood by the cluster protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum RLimitKind {
    As,
    Core,
    Cpu,
    Data,
    Fsize,
    Locks,
    Memlock,
    Msgqueue,
    Nice,
    Nofile,
    Nproc,
    Rss,
    Rtprio,
    Rttime,
    Sigpending,
    Stack,
}

/// Name accepted for validation but with no protocol kind.
pub const RLIMIT_UNKNOWN: &str = "RLIMIT_UNKNOWN";

const RLIMIT_KINDS: &[(&str, RLimitKind)] = &[
    ("RLIMIT_AS", RLimitKind::As),
    ("RLIMIT_CORE", RLimitKind::Core),
    ("RLIMIT_CPU", RLimitKind::Cpu),
    ("RLIMIT_DATA", RLimitKind::Data),
    ("RLIMIT_FSIZE", RLimitKind::Fsize),
    ("RLIMIT_LOCKS", RLimitKind::Locks),
    ("RLIMIT_MEMLOCK", RLimitKind::Memlock),
    ("RLIMIT_MSGQUEUE", RLimitKind::Msgqueue),
    ("RLIMIT_NICE", RLimitKind::Nice),
    ("RLIMIT_NOFILE", RLimitKind::Nofile),
    ("RLIMIT_NPROC", RLimitKind::Nproc),
    ("RLIMIT_RSS", RLimitKind::Rss),
    ("RLIMIT_RTPRIO", RLimitKind::Rtprio),
    ("RLIMIT_RTTIME", RLimitKind::Rttime),
    ("RLIMIT_SIGPENDING", RLimitKind::Sigpending),
    ("RLIMIT_STACK", RLimitKind::Stack),
];

/// Look up the protocol kind for a limit name.
pub fn rlimit_kind(name: &str) -> Option<RLimitKind> {
    RLIMIT_KINDS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, kind)| *kind)
}

/// A named limit with optional soft/hard values.
///
/// Both values are set or neither is; soft never exceeds hard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RLimit {
    /// Limit name, e.g. `RLIMIT_NOFILE`
    pub name: String,
    /// Soft limit
    #[serde(default)]
    pub soft: Option<u64>,
    /// Hard limit
    #[serde(default)]
    pub hard: Option<u64>,
}

impl RLimit {
    /// Create and validate a limit.
    pub fn new(name: impl Into<String>, soft: Option<u64>, hard: Option<u64>) -> Result<Self> {
        let limit = Self {
            name: name.into(),
            soft,
            hard,
        };
        limit.validate()?;
        Ok(limit)
    }

    /// Check the limit name and bounds.
    pub fn validate(&self) -> Result<()> {
        if self.name != RLIMIT_UNKNOWN && rlimit_kind(&self.name).is_none() {
            return Err(CoreError::InvalidRLimit(format!(
                "{} is not a valid rlimit",
                self.name
            )));
        }

        match (self.soft, self.hard) {
            (Some(soft), Some(hard)) if soft > hard => Err(CoreError::InvalidRLimit(
                "soft rlimit must be less than or equal to the hard rlimit".into(),
            )),
            (Some(_), Some(_)) | (None, None) => Ok(()),
            _ => Err(CoreError::InvalidRLimit(
                "soft and hard rlimits must be either both set or both unset".into(),
            )),
        }
    }

    /// Protocol kind, if the name maps to one.
    pub fn kind(&self) -> Option<RLimitKind> {
        rlimit_kind(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names() {
        assert_eq!(rlimit_kind("RLIMIT_NOFILE"), Some(RLimitKind::Nofile));
        assert_eq!(rlimit_kind("RLIMIT_STACK"), Some(RLimitKind::Stack));
        assert_eq!(rlimit_kind(RLIMIT_UNKNOWN), None);
        assert_eq!(rlimit_kind("RLIMIT_BOGUS"), None);
    }

    #[test]
    fn test_valid_limits() {
        assert!(RLimit::new("RLIMIT_NOFILE", Some(1024), Some(4096)).is_ok());
        assert!(RLimit::new("RLIMIT_CPU", None, None).is_ok());
        assert!(RLimit::new(RLIMIT_UNKNOWN, Some(1), Some(1)).is_ok());
    }

    #[test]
    fn test_invalid_limits() {
        assert!(RLimit::new("RLIMIT_BOGUS", None, None).is_err());
        assert!(RLimit::new("RLIMIT_NOFILE", Some(1), None).is_err());
        assert!(RLimit::new("RLIMIT_NOFILE", None, Some(1)).is_err());
        assert!(RLimit::new("RLIMIT_NOFILE", Some(10), Some(1)).is_err());
    }
}
