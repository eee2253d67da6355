use chrono::{DateTime, TimeDelta, Utc};

/// Format the time elapsed between `then` and `now` for display.
///
/// Produces `"Just now"` under a minute, then whole minutes, hours, and days with singular
/// forms for a count of one. Instants in the future are treated as `"Just now"`.
pub fn format_elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_duration(now.signed_duration_since(then))
}

/// Format an already computed elapsed duration, see [`format_elapsed`].
pub fn format_duration(elapsed: TimeDelta) -> String {
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }

    let hours = elapsed.num_hours();
    if hours < 24 {
        return plural(hours, "hour");
    }

    plural(elapsed.num_days(), "day")
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_under_a_minute() {
        assert_eq!(format_elapsed(now() - TimeDelta::seconds(59), now()), "Just now");
        assert_eq!(format_elapsed(now(), now()), "Just now");
    }

    #[test]
    fn test_future_is_just_now() {
        assert_eq!(format_elapsed(now() + TimeDelta::minutes(5), now()), "Just now");
    }

    #[test]
    fn test_minutes() {
        assert_eq!(format_elapsed(now() - TimeDelta::minutes(1), now()), "1 minute ago");
        assert_eq!(format_elapsed(now() - TimeDelta::minutes(59), now()), "59 minutes ago");
    }

    #[test]
    fn test_hours() {
        assert_eq!(format_elapsed(now() - TimeDelta::minutes(60), now()), "1 hour ago");
        assert_eq!(format_elapsed(now() - TimeDelta::hours(23), now()), "23 hours ago");
    }

    #[test]
    fn test_days() {
        assert_eq!(format_elapsed(now() - TimeDelta::hours(24), now()), "1 day ago");
        assert_eq!(format_elapsed(now() - TimeDelta::days(9), now()), "9 days ago");
    }
}
