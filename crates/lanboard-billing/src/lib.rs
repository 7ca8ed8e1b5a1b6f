//! Billing math for the dashboard: session amounts, the revenue-by-day
//! rollup, and the quick-pack pre-fill table.
//!
//! Everything here is a pure function. Amounts are kept at full precision;
//! rounding happens at display time only.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone};

use lanboard_core::station::SessionRecord;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Amount owed for one finished session: elapsed hours times the rate.
pub fn session_amount(record: &SessionRecord, hourly_rate: f64) -> f64 {
    let duration_ms = (record.ended_at - record.started_at).num_milliseconds();
    duration_ms.max(0) as f64 / MS_PER_HOUR * hourly_rate
}

/// Revenue grouped by the operator-local calendar date of session end.
///
/// The time zone is a parameter so tests can pin it; production passes
/// `chrono::Local`.
pub fn daily_revenue<Tz: TimeZone>(
    records: &[SessionRecord],
    hourly_rate: f64,
    tz: &Tz,
) -> BTreeMap<NaiveDate, f64> {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        let day = record.ended_at.with_timezone(tz).date_naive();
        *by_day.entry(day).or_insert(0.0) += session_amount(record, hourly_rate);
    }
    by_day
}

/// Day-over-day change in percent. `None` when yesterday was zero.
pub fn percent_change(today: f64, yesterday: f64) -> Option<f64> {
    if yesterday == 0.0 {
        None
    } else {
        Some((today - yesterday) / yesterday * 100.0)
    }
}

/// Round an amount for display. The stored value stays full precision.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

/// A predefined (duration, price) shortcut offered when starting a session.
/// Advisory only: the billed amount is always elapsed time times rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuickPack {
    pub label: &'static str,
    pub minutes: i64,
    pub price: f64,
}

pub const QUICK_PACKS: &[QuickPack] = &[
    QuickPack { label: "Quick 30", minutes: 30, price: 50.0 },
    QuickPack { label: "One hour", minutes: 60, price: 90.0 },
    QuickPack { label: "Three hours", minutes: 180, price: 240.0 },
    QuickPack { label: "Night pass", minutes: 300, price: 350.0 },
];

/// Quick pack matching an exact duration, used to pre-fill the prepaid field.
pub fn quick_pack_for(minutes: i64) -> Option<&'static QuickPack> {
    QUICK_PACKS.iter().find(|p| p.minutes == minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};
    use lanboard_core::ids::SessionId;

    fn record(start: &str, end: &str) -> SessionRecord {
        SessionRecord {
            id: SessionId::new(),
            customer_name: "ada".into(),
            started_at: start.parse().unwrap(),
            ended_at: end.parse().unwrap(),
        }
    }

    #[test]
    fn ninety_minutes_at_hundred_is_one_fifty() {
        let r = record("2026-08-01T10:00:00Z", "2026-08-01T11:30:00Z");
        let amount = session_amount(&r, 100.0);
        assert!((amount - 150.0).abs() < 1e-9, "got {amount}");
    }

    #[test]
    fn amount_is_not_rounded_internally() {
        // 1 minute at 100/hr is 1.666... and must stay that way.
        let r = record("2026-08-01T10:00:00Z", "2026-08-01T10:01:00Z");
        let amount = session_amount(&r, 100.0);
        assert!((amount - 100.0 / 60.0).abs() < 1e-9, "got {amount}");
        assert_eq!(format_amount(amount), "1.67");
    }

    #[test]
    fn negative_duration_clamps_to_zero() {
        let r = record("2026-08-01T11:00:00Z", "2026-08-01T10:00:00Z");
        assert_eq!(session_amount(&r, 100.0), 0.0);
    }

    #[test]
    fn daily_revenue_groups_by_end_date() {
        let records = vec![
            record("2026-08-01T10:00:00Z", "2026-08-01T11:00:00Z"),
            record("2026-08-01T20:00:00Z", "2026-08-01T21:30:00Z"),
            record("2026-08-02T09:00:00Z", "2026-08-02T10:00:00Z"),
        ];
        let by_day = daily_revenue(&records, 100.0, &Utc);

        assert_eq!(by_day.len(), 2);
        let d1 = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
        assert!((by_day[&d1] - 250.0).abs() < 1e-9);
        assert!((by_day[&d2] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn daily_revenue_respects_time_zone() {
        // 23:30 UTC on Aug 1 is already Aug 2 in UTC+5.
        let records = vec![record("2026-08-01T22:00:00Z", "2026-08-01T23:30:00Z")];
        let plus_five = chrono::FixedOffset::east_opt(5 * 3600).unwrap();

        let utc_days = daily_revenue(&records, 100.0, &Utc);
        let local_days = daily_revenue(&records, 100.0, &plus_five);

        assert!(utc_days.contains_key(&NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()));
        assert!(local_days.contains_key(&NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()));
    }

    #[test]
    fn daily_revenue_spans_midnight_on_end_date() {
        // A session crossing midnight bills entirely to the day it ended.
        let records = vec![record("2026-08-01T23:00:00Z", "2026-08-02T01:00:00Z")];
        let by_day = daily_revenue(&records, 100.0, &Utc);
        assert_eq!(by_day.len(), 1);
        assert!(by_day.contains_key(&NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()));
    }

    #[test]
    fn percent_change_basic() {
        let change = percent_change(150.0, 100.0).unwrap();
        assert!((change - 50.0).abs() < 1e-9);
        let drop = percent_change(50.0, 100.0).unwrap();
        assert!((drop + 50.0).abs() < 1e-9);
    }

    #[test]
    fn percent_change_undefined_for_zero_yesterday() {
        assert_eq!(percent_change(100.0, 0.0), None);
    }

    #[test]
    fn quick_pack_lookup() {
        let pack = quick_pack_for(60).unwrap();
        assert_eq!(pack.label, "One hour");
        assert!((pack.price - 90.0).abs() < f64::EPSILON);
        assert!(quick_pack_for(42).is_none());
    }

    #[test]
    fn utc_timestamp_sanity() {
        // Anchor for date_naive conversions used above.
        let ts = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
    }
}
