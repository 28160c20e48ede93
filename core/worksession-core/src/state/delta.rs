//! Human-readable elapsed time ("3m ago", "2h ago").

use chrono::{DateTime, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Rendered when there is no instant to measure from.
pub const UNRESOLVED: &str = "unknown";

/// Buckets `now - then` into now / minutes / hours / days / weeks, rounding down.
/// Future instants (clock skew) render as `now`.
pub fn format_time_delta(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(then).num_seconds();
    if secs < MINUTE {
        "now".to_string()
    } else if secs < HOUR {
        format!("{}m ago", secs / MINUTE)
    } else if secs < DAY {
        format!("{}h ago", secs / HOUR)
    } else if secs < WEEK {
        format!("{}d ago", secs / DAY)
    } else {
        format!("{}w ago", secs / WEEK)
    }
}

pub fn format_optional_delta(then: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    then.map(|t| format_time_delta(t, now))
        .unwrap_or_else(|| UNRESOLVED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ago(secs: i64) -> String {
        let now = Utc::now();
        format_time_delta(now - Duration::seconds(secs), now)
    }

    #[test]
    fn test_buckets() {
        assert_eq!(ago(0), "now");
        assert_eq!(ago(59), "now");
        assert_eq!(ago(60), "1m ago");
        assert_eq!(ago(59 * 60 + 59), "59m ago");
        assert_eq!(ago(2 * 3600), "2h ago");
        assert_eq!(ago(23 * 3600 + 3599), "23h ago");
        assert_eq!(ago(3 * 86_400), "3d ago");
        assert_eq!(ago(7 * 86_400), "1w ago");
        assert_eq!(ago(20 * 86_400), "2w ago");
    }

    #[test]
    fn test_future_renders_now() {
        assert_eq!(ago(-3600), "now");
    }

    #[test]
    fn test_missing_instant() {
        assert_eq!(format_optional_delta(None, Utc::now()), "unknown");
    }
}
