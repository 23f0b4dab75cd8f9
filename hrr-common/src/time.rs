//! Timestamp and duration display utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a millisecond duration as `M:SS` (or `H:MM:SS` past one hour)
///
/// Used in log lines and the status page; sub-second remainders are dropped.
pub fn format_ms(millis: u64) -> String {
    let total_secs = millis / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0), "0:00");
        assert_eq!(format_ms(999), "0:00");
        assert_eq!(format_ms(30_000), "0:30");
        assert_eq!(format_ms(180_000), "3:00");
        assert_eq!(format_ms(185_500), "3:05");
        assert_eq!(format_ms(3_661_000), "1:01:01");
    }
}
