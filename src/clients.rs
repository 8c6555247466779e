//! Online/offline and backup-health classification for clients.
//!
//! Precedence, highest first:
//!
//! 1. A status-API entry that marks the client online → `status_api`.
//! 2. `last_seen` within the online window (inclusive) → `lastseen_recent`.
//!    A `last_seen` in the future is never online (`lastseen_future`).
//! 3. Otherwise offline: `offline_<minutes>min_ago`, or `offline_never`.
//!
//! `file_ok` / `image_ok` come straight from the stored health flags and do
//! not depend on the online decision.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Window used by [`classify`] (10 minutes).
pub const DEFAULT_ONLINE_WINDOW_SECS: i64 = 600;

/// A client as stored by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_ok: bool,
    #[serde(default)]
    pub image_ok: bool,
}

impl ClientRecord {
    /// Build a record from a status-API entry (`lastseen` is unix seconds).
    pub fn from_status_entry(entry: &StatusEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
            last_seen: entry
                .last_seen
                .filter(|secs| *secs > 0)
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            file_ok: entry.file_ok,
            image_ok: entry.image_ok,
        }
    }
}

/// One entry of the remote `status` action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusEntry {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub online: bool,
    #[serde(rename = "lastseen", default)]
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub file_ok: bool,
    #[serde(default)]
    pub image_ok: bool,
}

/// Why a client was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    StatusApi,
    LastSeenRecent,
    LastSeenFuture,
    OfflineMinutesAgo(i64),
    OfflineNever,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusApi => f.write_str("status_api"),
            Self::LastSeenRecent => f.write_str("lastseen_recent"),
            Self::LastSeenFuture => f.write_str("lastseen_future"),
            Self::OfflineMinutesAgo(m) => write!(f, "offline_{m}min_ago"),
            Self::OfflineNever => f.write_str("offline_never"),
        }
    }
}

impl Serialize for StatusReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Derived status, recomputed per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    pub client_id: i64,
    pub online: bool,
    pub file_ok: bool,
    pub image_ok: bool,
    pub reason: StatusReason,
}

/// Classify against the wall clock with the default window.
pub fn classify(client: &ClientRecord, entry: Option<&StatusEntry>) -> ClientStatus {
    classify_at(client, entry, Utc::now(), DEFAULT_ONLINE_WINDOW_SECS)
}

/// Classify at an explicit `now` with a window of `window_secs`.
pub fn classify_at(
    client: &ClientRecord,
    entry: Option<&StatusEntry>,
    now: DateTime<Utc>,
    window_secs: i64,
) -> ClientStatus {
    let (online, reason) = if entry.is_some_and(|e| e.online) {
        (true, StatusReason::StatusApi)
    } else if let Some(last_seen) = client.last_seen {
        let elapsed = now - last_seen;
        if elapsed < Duration::zero() {
            (false, StatusReason::LastSeenFuture)
        } else if elapsed <= Duration::seconds(window_secs) {
            (true, StatusReason::LastSeenRecent)
        } else {
            (false, StatusReason::OfflineMinutesAgo(elapsed.num_seconds() / 60))
        }
    } else {
        (false, StatusReason::OfflineNever)
    };

    ClientStatus {
        client_id: client.id,
        online,
        file_ok: client.file_ok,
        image_ok: client.image_ok,
        reason,
    }
}

/// Classify every client, joining status-API entries by client id.
pub fn classify_all(
    clients: &[ClientRecord],
    entries: &[StatusEntry],
    now: DateTime<Utc>,
    window_secs: i64,
) -> Vec<ClientStatus> {
    let by_id: HashMap<i64, &StatusEntry> = entries.iter().map(|e| (e.id, e)).collect();
    clients
        .iter()
        .map(|c| classify_at(c, by_id.get(&c.id).copied(), now, window_secs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(last_seen: Option<DateTime<Utc>>) -> ClientRecord {
        ClientRecord {
            id: 3,
            name: "workstation".into(),
            last_seen,
            file_ok: true,
            image_ok: false,
        }
    }

    fn entry(online: bool) -> StatusEntry {
        StatusEntry {
            id: 3,
            name: "workstation".into(),
            online,
            last_seen: None,
            file_ok: true,
            image_ok: false,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_status_api_wins() {
        let status = classify_at(&client(None), Some(&entry(true)), now(), 600);
        assert!(status.online);
        assert_eq!(status.reason, StatusReason::StatusApi);
    }

    #[test]
    fn test_offline_status_entry_falls_through() {
        let seen = now() - Duration::seconds(30);
        let status = classify_at(&client(Some(seen)), Some(&entry(false)), now(), 600);
        assert!(status.online);
        assert_eq!(status.reason, StatusReason::LastSeenRecent);
    }

    #[test]
    fn test_window_boundary() {
        let at_edge = classify_at(&client(Some(now() - Duration::seconds(600))), None, now(), 600);
        assert!(at_edge.online);

        let past_edge =
            classify_at(&client(Some(now() - Duration::seconds(601))), None, now(), 600);
        assert!(!past_edge.online);
        assert_eq!(past_edge.reason, StatusReason::OfflineMinutesAgo(10));
        assert_eq!(past_edge.reason.to_string(), "offline_10min_ago");
    }

    #[test]
    fn test_future_last_seen_is_offline() {
        let status = classify_at(&client(Some(now() + Duration::seconds(60))), None, now(), 600);
        assert!(!status.online);
        assert_eq!(status.reason, StatusReason::LastSeenFuture);
    }

    #[test]
    fn test_sub_second_boundaries() {
        let just_past = now() - Duration::milliseconds(600_500);
        let status = classify_at(&client(Some(just_past)), None, now(), 600);
        assert!(!status.online);
        assert_eq!(status.reason, StatusReason::OfflineMinutesAgo(10));

        let slightly_ahead = now() + Duration::milliseconds(500);
        let status = classify_at(&client(Some(slightly_ahead)), None, now(), 600);
        assert!(!status.online);
        assert_eq!(status.reason, StatusReason::LastSeenFuture);
    }

    #[test]
    fn test_never_seen() {
        let status = classify_at(&client(None), None, now(), 600);
        assert!(!status.online);
        assert_eq!(status.reason.to_string(), "offline_never");
    }

    #[test]
    fn test_health_flags_independent_of_online() {
        let status = classify_at(&client(None), None, now(), 600);
        assert!(status.file_ok);
        assert!(!status.image_ok);
    }

    #[test]
    fn test_reason_serializes_as_string() {
        let status = classify_at(&client(None), Some(&entry(true)), now(), 600);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["reason"], "status_api");
    }

    #[test]
    fn test_from_status_entry_and_classify_all() {
        let entries: Vec<StatusEntry> = serde_json::from_str(
            r#"[{"id":3,"name":"workstation","online":false,"lastseen":1714651140,
                 "file_ok":true,"image_ok":true},
                {"id":4,"name":"nas","online":true,"lastseen":0}]"#,
        )
        .unwrap();
        let clients: Vec<ClientRecord> = entries.iter().map(ClientRecord::from_status_entry).collect();
        assert_eq!(clients[1].last_seen, None);

        let statuses = classify_all(&clients, &entries, now(), 600);
        // 1714651140 is 2024-05-02T11:59:00Z
        assert_eq!(statuses[0].reason, StatusReason::LastSeenRecent);
        assert!(statuses[0].image_ok);
        assert_eq!(statuses[1].reason, StatusReason::StatusApi);
    }
}
