use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds between two instants, never negative.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn seconds_between_clamps_negative_spans() {
        let start = now();
        assert_eq!(seconds_between(start, start + Duration::seconds(90)), 90);
        assert_eq!(seconds_between(start, start - Duration::seconds(5)), 0);
    }
}
