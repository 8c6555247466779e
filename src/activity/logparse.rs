//! Parsers for per-file transfer progress lines in the server log.
//!
//! A matching line looks like:
//!
//! ```text
//! 2024-05-02 10:41:07: Loading file "C:\data\disk.vhdz". 50% finished 945.481 MB/1.86345 GB at 132.21 MBit/s
//! ```
//!
//! Sizes use binary multipliers (`KB = 1024`). Speeds are logged in bits per
//! second and converted to bytes.

use std::sync::LazyLock;

use regex::Regex;

use super::models::TransferSnapshot;

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*% finished").expect("valid regex"));
static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid regex"));
static BYTES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*([KMGT]?B)\s*/\s*(\d+(?:\.\d+)?)\s*([KMGT]?B)\b")
        .expect("valid regex")
});
static SPEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([KMGT]?)Bit/s").expect("valid regex"));

/// Binary multiplier for a size unit (`B`, `KB`, `MB`, `GB`, `TB`).
pub fn unit_multiplier(unit: &str) -> Option<f64> {
    match unit {
        "B" => Some(1.0),
        "KB" => Some(1024.0),
        "MB" => Some(1024.0 * 1024.0),
        "GB" => Some(1024.0 * 1024.0 * 1024.0),
        "TB" => Some(1024.0 * 1024.0 * 1024.0 * 1024.0),
        _ => None,
    }
}

/// `"<value> <unit>"` → bytes.
fn to_bytes(value: &str, unit: &str) -> Option<f64> {
    Some(value.parse::<f64>().ok()? * unit_multiplier(unit)?)
}

/// `"<value> <prefix>Bit/s"` → bytes per second.
fn to_bytes_per_sec(value: &str, prefix: &str) -> Option<f64> {
    to_bytes(value, &format!("{prefix}B")).map(|bits| bits / 8.0)
}

/// Parse one progress line. `None` unless it carries an `N% finished` marker.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_transfer_line(line: &str) -> Option<TransferSnapshot> {
    let percent: f64 = PERCENT_RE.captures(line)?[1].parse().ok()?;

    let file_name = FILE_RE.captures(line).map(|c| c[1].to_string());

    let (done, total) = BYTES_RE
        .captures(line)
        .and_then(|c| Some((to_bytes(&c[1], &c[2])?, to_bytes(&c[3], &c[4])?)))
        .unwrap_or((0.0, 0.0));

    let bytes_per_sec = SPEED_RE
        .captures(line)
        .and_then(|c| to_bytes_per_sec(&c[1], &c[2]))
        .unwrap_or(0.0);

    let eta_seconds = (bytes_per_sec > 0.0).then(|| (total - done).max(0.0) / bytes_per_sec);

    Some(TransferSnapshot {
        file_name,
        percent,
        done_bytes: done.round() as u64,
        total_bytes: total.round() as u64,
        speed_bytes_per_ms: bytes_per_sec / 1000.0,
        eta_seconds,
    })
}

/// The most recent parseable progress line, scanning from the end.
pub fn latest_transfer<S: AsRef<str>>(lines: &[S]) -> Option<TransferSnapshot> {
    lines
        .iter()
        .rev()
        .find_map(|line| parse_transfer_line(line.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = MB * 1024.0;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= b.abs() * 1e-9 + 1.0
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_parse_full_line() {
        let line = r#"2024-05-02 10:41:07: Loading file "disk.vhdz". 50% finished 945.481 MB/1.86345 GB at 132.21 MBit/s"#;
        let snap = parse_transfer_line(line).unwrap();
        assert_eq!(snap.file_name.as_deref(), Some("disk.vhdz"));
        assert!((snap.percent - 50.0).abs() < f64::EPSILON);
        assert!(approx(snap.done_bytes as f64, 945.481 * MB));
        assert!(approx(snap.total_bytes as f64, 1.86345 * GB));
        let bytes_per_sec = 132.21 * MB / 8.0;
        assert!((snap.speed_bytes_per_ms - bytes_per_sec / 1000.0).abs() < 1e-6);
        let expected_eta = (1.86345 * GB - 945.481 * MB) / bytes_per_sec;
        assert!((snap.eta_seconds.unwrap() - expected_eta).abs() < 0.01);
    }

    #[test]
    fn test_parse_without_speed_has_no_eta() {
        let snap = parse_transfer_line("12% finished 1 KB/2 KB").unwrap();
        assert_eq!(snap.done_bytes, 1024);
        assert_eq!(snap.total_bytes, 2048);
        assert!(snap.eta_seconds.is_none());
        assert!(snap.file_name.is_none());
    }

    #[test]
    fn test_zero_speed_leaves_eta_unknown() {
        let snap = parse_transfer_line("3% finished 1 MB/2 MB at 0 Bit/s").unwrap();
        assert!(snap.eta_seconds.is_none());
        assert!(snap.speed_bytes_per_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn test_non_progress_line() {
        assert!(parse_transfer_line("Starting incremental file backup...").is_none());
    }

    #[test]
    fn test_unit_table() {
        assert_eq!(unit_multiplier("B"), Some(1.0));
        assert_eq!(unit_multiplier("KB"), Some(1024.0));
        assert_eq!(unit_multiplier("TB"), Some(1024f64.powi(4)));
        assert_eq!(unit_multiplier("PB"), None);
    }

    #[test]
    fn test_latest_transfer_prefers_last_line() {
        let lines = vec![
            r#"Loading "a.bin". 10% finished 1 MB/10 MB at 8 MBit/s"#,
            r#"Loading "b.bin". 20% finished 2 MB/10 MB at 8 MBit/s"#,
            "Backup verification ok",
        ];
        let snap = latest_transfer(&lines).unwrap();
        assert_eq!(snap.file_name.as_deref(), Some("b.bin"));
    }

    #[test]
    fn test_latest_transfer_empty() {
        let lines: Vec<String> = Vec::new();
        assert!(latest_transfer(&lines).is_none());
    }
}
