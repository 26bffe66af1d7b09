//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Format a millisecond position as `m:ss` for elapsed-time displays
pub fn format_position(position_ms: u64) -> String {
    let total_secs = position_ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // After 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        let duration = millis_to_duration(1000);
        assert_eq!(duration, Duration::from_secs(1));
    }

    #[test]
    fn test_millis_to_duration_max_u64() {
        let duration = millis_to_duration(u64::MAX);
        assert_eq!(duration.as_millis(), u64::MAX as u128);
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0), "0:00");
        assert_eq!(format_position(9_999), "0:09");
        assert_eq!(format_position(30_000), "0:30");
        assert_eq!(format_position(125_000), "2:05");
    }
}
