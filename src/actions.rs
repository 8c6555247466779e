//! Numeric action codes reported by the live progress feed.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed `action code → label` table of the remote contract.
const ACTION_LABELS: &[(i64, &str)] = &[
    (0, "Idle"),
    (1, "Incremental file backup"),
    (2, "Full file backup"),
    (3, "Incremental image backup"),
    (4, "Full image backup"),
    (5, "Resumed incremental file backup"),
    (6, "Resumed full file backup"),
    (7, "File restore"),
    (8, "Image restore"),
    (9, "Client update"),
    (10, "Checking database integrity"),
    (11, "Backing up database"),
    (12, "Recalculating statistics"),
    (13, "Indexing"),
    (14, "Hashing files"),
    (15, "Checking files"),
];

/// Label for an action code. Unknown codes render as `Unknown action (<code>)`.
pub fn action_label(code: i64) -> Cow<'static, str> {
    ACTION_LABELS
        .iter()
        .find(|(c, _)| *c == code)
        .map_or_else(
            || Cow::Owned(format!("Unknown action ({code})")),
            |(_, label)| Cow::Borrowed(*label),
        )
}

/// Whether a live action continues an incremental backup.
pub fn is_incremental(code: i64) -> bool {
    action_label(code).contains("ncremental")
}

/// The two backup job tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    File,
    Image,
}

impl BackupKind {
    /// Kind of the job an action code belongs to.
    pub fn from_action(code: i64) -> Self {
        if action_label(code).to_lowercase().contains("image") {
            Self::Image
        } else {
            Self::File
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Image => "image",
        }
    }

    /// `start_type` value for `start_backup`.
    pub fn start_type(self, full: bool) -> &'static str {
        match (self, full) {
            (Self::File, false) => "incr_file",
            (Self::File, true) => "full_file",
            (Self::Image, false) => "incr_image",
            (Self::Image, true) => "full_image",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_labels() {
        assert_eq!(action_label(0), "Idle");
        assert_eq!(action_label(4), "Full image backup");
        assert_eq!(action_label(13), "Indexing");
    }

    #[test]
    fn test_unknown_label() {
        assert_eq!(action_label(99), "Unknown action (99)");
        assert_eq!(action_label(-1), "Unknown action (-1)");
    }

    #[test]
    fn test_kind_from_action() {
        assert_eq!(BackupKind::from_action(1), BackupKind::File);
        assert_eq!(BackupKind::from_action(3), BackupKind::Image);
        assert_eq!(BackupKind::from_action(8), BackupKind::Image);
        assert_eq!(BackupKind::from_action(13), BackupKind::File);
        assert_eq!(BackupKind::from_action(42), BackupKind::File);
    }

    #[test]
    fn test_incremental_codes() {
        assert!(is_incremental(1));
        assert!(is_incremental(5));
        assert!(!is_incremental(2));
        assert!(!is_incremental(13));
    }

    #[test]
    fn test_start_type() {
        assert_eq!(BackupKind::File.start_type(false), "incr_file");
        assert_eq!(BackupKind::Image.start_type(true), "full_image");
    }
}
