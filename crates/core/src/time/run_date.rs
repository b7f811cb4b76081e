use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

/// Snapshot date for a run: the explicit `YYYY-MM-DD` argument, or today's UTC date.
pub fn resolve_run_date(date_arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    match date_arg.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date {s:?}, expected YYYY-MM-DD")),
        None => Ok(now_utc.date_naive()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_to_utc_calendar_date() {
        // 23:30 UTC is already the next day in most of Europe; the snapshot stays on the UTC date.
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 23, 30, 0).unwrap();
        let d = resolve_run_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 8, 0, 0).unwrap();
        let d = resolve_run_date(Some("2025-01-01"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn blank_argument_falls_back_to_today() {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 8, 0, 0).unwrap();
        let d = resolve_run_date(Some("  "), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
    }

    #[test]
    fn rejects_other_formats() {
        let now = Utc::now();
        assert!(resolve_run_date(Some("01.01.2025"), now).is_err());
    }
}
