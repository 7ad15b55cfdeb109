use chrono::{DateTime, TimeZone, Utc};

/// Convert unix seconds into a UTC timestamp. `None` when out of range.
pub fn from_unix_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_unix_secs() {
        let dt = from_unix_secs(1_700_000_000).unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(from_unix_secs(0).unwrap().timestamp(), 0);
        assert!(from_unix_secs(i64::MAX).is_none());
    }
}
